use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;

use super::concurrent_bag::ConcurrentBag;
use super::list_registry::ListClaim;
use super::worker_id::WorkerId;

/// A worker's handle on its own list in a [`ConcurrentBag`].
///
/// Only one live handle exists per [`WorkerId`], which is what allows the
/// handle to push and pop its list without locking. The handle can move to
/// another thread (`Send`) but cannot be shared between threads (`!Sync`).
///
/// Dropping the handle releases the slot. Items left in the list remain in the
/// bag; other workers steal them, and the same id gets the same list back on
/// its next [`ConcurrentBag::worker`] call unless another worker reused it.
///
pub struct BagWorker<'a, T> {
    bag: &'a ConcurrentBag<T>,
    claim: ListClaim<'a, T>,
    id: WorkerId,
    _not_sync: PhantomData<Cell<()>>,
}

impl<'a, T> BagWorker<'a, T> {
    pub(crate) fn new(bag: &'a ConcurrentBag<T>, claim: ListClaim<'a, T>, id: WorkerId) -> Self {
        BagWorker {
            bag,
            claim,
            id,
            _not_sync: PhantomData,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn bag(&self) -> &'a ConcurrentBag<T> {
        self.bag
    }

    pub fn add(&self, item: T) {
        self.bag.add_to(self.claim.list(), item);
    }

    /// Pops the newest item of this worker's list, or steals the oldest item
    /// of another list if this one is empty.
    ///
    pub fn try_take(&self) -> Option<T> {
        self.bag.take_from(Some(self.claim.list()))
    }

    /// Applies `f` to the item `try_take` would most likely return, without
    /// removing it. `f` must not call back into the bag.
    ///
    pub fn peek_with<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&T) -> R,
    {
        self.bag.peek_from(Some(self.claim.list()), f)
    }

    pub fn try_peek(&self) -> Option<T>
    where
        T: Clone,
    {
        self.peek_with(T::clone)
    }

    /// Number of items in this worker's list, net of steals. Not a freeze, the
    /// value can be stale if other workers are stealing.
    ///
    pub fn local_count(&self) -> usize {
        self.claim.list().effective_count()
    }

    pub fn has_local_items(&self) -> bool {
        self.claim.list().has_items()
    }

    /// Releases the worker slot. Same as dropping the handle.
    ///
    pub fn release(self) {}
}

impl<T> fmt::Debug for BagWorker<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BagWorker")
            .field("id", &self.id)
            .field("local_count", &self.local_count())
            .finish()
    }
}

// The claim gives exclusive owner access to one list; moving the handle moves
// that ownership to the receiving thread.
//
unsafe impl<T: Send> Send for BagWorker<'_, T> {}
