//! Producer/consumer collection trait.
//!
//! The shared test bodies in `common_tests` are written against this trait,
//! so any thread-safe collection that hands out items in no particular order
//! can be checked with the same conservation and drain tests as the bag.

// ============================================================================
// ProducerConsumerCollection - Base trait for concurrent producer/consumer use
// ============================================================================

/// A thread-safe collection that producers add to and consumers take from.
///
/// The trait makes no ordering promise. `len`, `to_vec` and `is_empty` are
/// snapshots and may be stale as soon as they return.
///
pub trait ProducerConsumerCollection<T> {
    /// Attempts to add an item. Returns false if the collection rejected it.
    fn try_add(&self, item: T) -> bool;

    /// Attempts to remove and return any item.
    fn try_take(&self) -> Option<T>;

    /// Copies the current contents into a Vec.
    fn to_vec(&self) -> Vec<T>
    where
        T: Clone;

    /// Returns the number of items in the collection.
    fn len(&self) -> usize;

    /// Returns true if the collection is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
