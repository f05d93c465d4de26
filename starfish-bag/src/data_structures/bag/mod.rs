//! Work-stealing concurrent bag.
//!
//! # Organization
//!
//! - [`ConcurrentBag`] - the collection, bag-level operations, steal protocol
//! - [`BagWorker`] - a worker's handle on its own list (the fast path)
//! - [`WorkerId`] - worker identity supplied by the runtime
//! - [`BagIter`] - snapshot iterator
//! - `local_list` - per-worker list and its concurrency metadata (internal)
//! - `list_registry` - list chain, worker slots, freeze protocol (internal)

mod bag_iter;
#[cfg(feature = "serde")]
mod bag_serde;
mod bag_worker;
mod concurrent_bag;
mod list_registry;
mod local_list;
mod worker_id;

pub use bag_iter::BagIter;
pub use bag_worker::BagWorker;
pub use concurrent_bag::ConcurrentBag;
pub use worker_id::WorkerId;
