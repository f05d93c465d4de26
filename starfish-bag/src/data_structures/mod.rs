//! Data structures for concurrent collections.
//!
//! # Organization
//!
//! - [`bag`] - Work-stealing concurrent bag (ConcurrentBag, BagWorker)
//! - [`producer_consumer_collection`] - Trait shared by producer/consumer collections

pub mod bag;
pub mod producer_consumer_collection;

// Re-exports for convenience
pub use bag::{BagIter, BagWorker, ConcurrentBag, WorkerId};
pub use producer_consumer_collection::ProducerConsumerCollection;
