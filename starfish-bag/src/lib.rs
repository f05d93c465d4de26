//! Work-stealing concurrent bag.
//!
//! A [`ConcurrentBag`] keeps one list per worker. A worker adds to and takes
//! from its own list without locking in the common case and steals the oldest
//! item of another worker's list when its own list runs dry.
//!
//! ```
//! use std::thread;
//!
//! use starfish_bag::{ConcurrentBag, WorkerId};
//!
//! let bag = ConcurrentBag::new();
//!
//! thread::scope(|scope| {
//!     for index in 0..4 {
//!         let bag = &bag;
//!         scope.spawn(move || {
//!             let worker = bag.worker(WorkerId::new(index)).unwrap();
//!             for i in 0..100 {
//!                 worker.add(index * 100 + i);
//!             }
//!         });
//!     }
//! });
//!
//! assert_eq!(bag.count(), 400);
//! ```

pub mod common_tests;
pub mod data_structures;
pub mod error;
pub mod options;
pub mod preemptive_synchronization;

pub use data_structures::{
    BagIter, BagWorker, ConcurrentBag, ProducerConsumerCollection, WorkerId,
};
pub use error::{BagError, BagResult};
pub use options::BagOptions;

/*
Task list:

- [x] Per-worker lists with owner fast path
- [x] Steal protocol with version re-scan
- [x] Freeze guard (count, to_vec, copy_into, iter, clear)
- [x] Explicit worker slots instead of thread-local lists
- [x] serde feature
- [ ] Batch steal (take half of the victim list into the thief's list)

Benchmark:

cargo bench --package starfish-bag --bench bag_benchmark
*/
