use std::fmt;
use std::ptr;
use std::sync::MutexGuard;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::trace;

use super::bag_iter::BagIter;
use super::bag_worker::BagWorker;
use super::list_registry::{FreezeGuard, ListClaim, ListRegistry};
use super::local_list::{ListOperation, LocalList};
use super::worker_id::WorkerId;
use crate::data_structures::ProducerConsumerCollection;
use crate::error::{BagError, BagResult};
use crate::options::BagOptions;
use crate::preemptive_synchronization::SpinWait;

///
/// Unordered concurrent collection with per-worker lists and work stealing.
///
/// Each worker pushes and pops its own list like a stack, without locking as
/// long as the list is long enough that a stealer cannot touch the same nodes.
/// A worker whose list is empty steals the oldest item of another list.
///
/// Whole-collection operations (`count`, `to_vec`, `copy_into`, `iter`,
/// `is_empty`, `clear`) freeze the bag: every list is locked and every fast
/// path is revoked until the operation returns. They are correct but not
/// cheap; use them sparingly on a busy bag.
///
/// ```
/// use starfish_bag::{ConcurrentBag, WorkerId};
///
/// let bag = ConcurrentBag::new();
///
/// let worker = bag.worker(WorkerId::new(0)).unwrap();
/// worker.add(1);
/// worker.add(2);
/// assert_eq!(worker.try_take(), Some(2));
///
/// assert_eq!(bag.count(), 1);
/// assert_eq!(bag.try_take(), Some(1));
/// assert_eq!(bag.try_take(), None);
/// ```
///
// =============================================================================
// OPERATION PATHS
// =============================================================================
//
//   add                                  try_take / try_peek
//    │                                    │
//    ▼                                    ▼
//   publish Add                          own list empty? ──yes──► STEAL
//    │                                    │ no
//    ▼                                    ▼
//   size >= 2 && !need_sync ?            publish Take
//    │ yes            │ no                │
//    ▼                ▼                   ▼
//   push at head     clear marker        size > 2 && !need_sync ?
//   (no lock)        lock list            │ yes           │ no
//                    push + reconcile     ▼               ▼
//                                        pop head        clear marker, lock
//                                        (no lock)       size == 0 ? ──► unlock, STEAL
//                                                        pop head
//
// STEAL: pass 1 walks every list, records its version and tries to steal
// under that list's lock. If nothing was found, pass 2 retries every list
// whose version moved (it became non-empty after pass 1 skipped it). The scan
// repeats until a pass sees no version change; only then is the bag empty.
//
// =============================================================================
pub struct ConcurrentBag<T> {
    registry: ListRegistry<T>,
    need_sync: AtomicBool,
    options: BagOptions,
}

/// A list locked by a stealer that passed `can_steal`.
///
struct StealTarget<'a, T> {
    list: &'a LocalList<T>,
    _guard: MutexGuard<'a, ()>,
}

/// Outcome of the version re-check pass of a steal.
///
enum Rescan<'a, T> {
    Stolen(StealTarget<'a, T>),
    Changed,
    Unchanged,
}

fn is_own<T>(own: Option<&LocalList<T>>, list: &LocalList<T>) -> bool {
    own.is_some_and(|own| ptr::eq(own, list))
}

impl<T> StealTarget<'_, T> {
    fn take(self) -> T {
        unsafe { self.list.steal() }
    }

    fn peek_with<F, R>(self, f: F) -> Option<R>
    where
        F: FnOnce(&T) -> R,
    {
        unsafe { self.list.peek_tail_with(f) }
    }
}

impl<T> ConcurrentBag<T> {
    pub fn new() -> Self {
        Self::with_options(BagOptions::default())
    }

    pub fn with_options(options: BagOptions) -> Self {
        ConcurrentBag {
            registry: ListRegistry::new(),
            need_sync: AtomicBool::new(false),
            options,
        }
    }

    /// Creates a bag seeded with `items`, all placed in one list as if the
    /// constructing thread added them.
    ///
    pub fn from_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let bag = Self::new();
        bag.add_all(items);
        bag
    }

    pub fn options(&self) -> &BagOptions {
        &self.options
    }

    /// Claims the list of worker `id`.
    ///
    /// The handle is the fast path: it keeps its list for as long as it lives.
    /// Dropping the handle releases the slot, the list keeps its items and
    /// stays stealable.
    ///
    pub fn worker(&self, id: WorkerId) -> BagResult<BagWorker<'_, T>> {
        let claim = self.registry.claim(id, self.options.reuse_released_lists)?;
        Ok(BagWorker::new(self, claim, id))
    }

    /// Number of lists registered so far (one per worker slot ever needed).
    ///
    pub fn worker_count(&self) -> usize {
        self.registry.list_count()
    }

    // =========================================================================
    // Bag-level operations (no worker identity)
    // =========================================================================

    /// Adds an item through a borrowed unnamed list.
    ///
    pub fn add(&self, item: T) {
        let claim = self.registry.claim_unnamed();
        self.add_to(claim.list(), item);
    }

    fn add_all<I>(&self, items: I)
    where
        I: IntoIterator<Item = T>,
    {
        let mut items = items.into_iter().peekable();
        if items.peek().is_none() {
            return;
        }

        let claim = self.registry.claim_unnamed();
        for item in items {
            self.add_to(claim.list(), item);
        }
    }

    /// Removes and returns any item, stealing from other lists if needed.
    ///
    pub fn try_take(&self) -> Option<T> {
        let claim = self.registry.try_claim_unnamed();
        self.take_from(claim.as_ref().map(ListClaim::list))
    }

    /// Applies `f` to some item without removing it.
    ///
    /// `f` runs while the item is protected from removal and must not call
    /// back into the bag.
    ///
    pub fn peek_with<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&T) -> R,
    {
        let claim = self.registry.try_claim_unnamed();
        self.peek_from(claim.as_ref().map(ListClaim::list), f)
    }

    pub fn try_peek(&self) -> Option<T>
    where
        T: Clone,
    {
        self.peek_with(T::clone)
    }

    /// Number of items in the bag. Freezes the bag.
    ///
    pub fn count(&self) -> usize {
        if self.registry.is_unused() {
            return 0;
        }
        self.freeze().count()
    }

    pub fn len(&self) -> usize {
        self.count()
    }

    /// Returns true if no list holds an item. Freezes the bag unless no list
    /// was ever created.
    ///
    pub fn is_empty(&self) -> bool {
        if self.registry.is_unused() {
            return true;
        }
        self.freeze().is_empty()
    }

    /// Drops every item in the bag. Freezes the bag.
    ///
    pub fn clear(&self) {
        if self.registry.is_unused() {
            return;
        }
        self.freeze().clear();
    }

    /// Takes items until the bag is observed empty.
    ///
    pub fn drain(&self) -> Vec<T> {
        std::iter::from_fn(|| self.try_take()).collect()
    }

    /// Moves every item out of the bag.
    ///
    pub fn into_vec(self) -> Vec<T> {
        let mut items = Vec::new();
        // Owned bag, no other thread can reach any list.
        //
        for list in self.registry.lists() {
            while list.has_items() {
                items.push(unsafe { list.remove() });
            }
        }
        items
    }

    pub(crate) fn freeze(&self) -> FreezeGuard<'_, T> {
        self.registry.freeze(&self.need_sync, self.options.spin_limit)
    }

    #[inline]
    fn need_sync(&self) -> bool {
        self.need_sync.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Owner paths
    // =========================================================================

    /// Pushes `item` on `list`. The caller must own `list` (hold its claim).
    ///
    pub(crate) fn add_to(&self, list: &LocalList<T>, item: T) {
        let op = list.begin(ListOperation::Add);

        // Two or more items: a concurrent steal touches only the tail side.
        //
        if list.effective_count() >= 2 && !self.need_sync() {
            unsafe { list.add(item, false) };
            return;
        }

        drop(op);
        let _lock = list.lock();
        unsafe { list.add(item, true) };
    }

    /// Pops from `list` if it has items, otherwise steals. The caller must own
    /// `list`.
    ///
    pub(crate) fn take_from(&self, list: Option<&LocalList<T>>) -> Option<T> {
        if let Some(list) = list.filter(|list| list.has_items()) {
            let op = list.begin(ListOperation::Take);

            // More than two items: a concurrent steal cannot reach the head.
            //
            if list.effective_count() > 2 && !self.need_sync() {
                return Some(unsafe { list.remove() });
            }

            drop(op);
            let _lock = list.lock();

            // A stealer may have emptied the list before we got the lock.
            //
            if list.effective_count() > 0 {
                return Some(unsafe { list.remove() });
            }
        }

        let target = self.find_steal_target(list)?;
        trace!(version = target.list.version(), "bag stealing in try_take");
        Some(target.take())
    }

    /// Peeks at the head of `list` if it has items, otherwise peeks at the
    /// tail of some other list. The caller must own `list`.
    ///
    pub(crate) fn peek_from<F, R>(&self, list: Option<&LocalList<T>>, f: F) -> Option<R>
    where
        F: FnOnce(&T) -> R,
    {
        if let Some(list) = list.filter(|list| list.has_items()) {
            let op = list.begin(ListOperation::Take);

            if list.effective_count() > 2 && !self.need_sync() {
                let result = unsafe { list.peek_head_with(f) };
                drop(op);
                return result;
            }

            drop(op);
            let _lock = list.lock();

            if list.effective_count() > 0 {
                return unsafe { list.peek_head_with(f) };
            }
        }

        let target = self.find_steal_target(list)?;
        trace!(version = target.list.version(), "bag stealing in try_peek");
        target.peek_with(f)
    }

    // =========================================================================
    // Steal
    // =========================================================================

    /// Finds a list other than `own` that can be stolen from and returns it
    /// locked.
    ///
    fn find_steal_target(&self, own: Option<&LocalList<T>>) -> Option<StealTarget<'_, T>> {
        let mut versions = Vec::new();

        loop {
            if let Some(target) = self.steal_scan(own, &mut versions) {
                return Some(target);
            }
            match self.steal_rescan(own, &versions) {
                Rescan::Stolen(target) => return Some(target),
                Rescan::Changed => continue,
                Rescan::Unchanged => return None,
            }
        }
    }

    /// First pass: records every list's version in `versions` and tries each
    /// list once.
    ///
    fn steal_scan(
        &self,
        own: Option<&LocalList<T>>,
        versions: &mut Vec<usize>,
    ) -> Option<StealTarget<'_, T>> {
        versions.clear();
        for list in self.registry.lists() {
            versions.push(list.version());
            if is_own(own, list) {
                continue;
            }
            if let Some(target) = self.try_steal_from(list) {
                return Some(target);
            }
        }
        None
    }

    /// Second pass: a list that was empty during the first pass may have been
    /// refilled since. Its version tells. Lists appended after the first pass
    /// have no recorded version and wait for the next scan.
    ///
    fn steal_rescan(&self, own: Option<&LocalList<T>>, versions: &[usize]) -> Rescan<'_, T> {
        let mut changed = false;
        for (list, &version) in self.registry.lists().zip(versions) {
            if list.version() != version && !is_own(own, list) {
                changed = true;
                if let Some(target) = self.try_steal_from(list) {
                    return Rescan::Stolen(target);
                }
            }
        }

        if changed {
            Rescan::Changed
        } else {
            Rescan::Unchanged
        }
    }

    fn try_steal_from<'a>(&self, list: &'a LocalList<T>) -> Option<StealTarget<'a, T>> {
        if !list.has_items() {
            return None;
        }

        let guard = list.lock();
        let mut spin_wait = SpinWait::with_spin_limit(self.options.spin_limit);
        if list.can_steal(&mut spin_wait) {
            Some(StealTarget {
                list,
                _guard: guard,
            })
        } else {
            None
        }
    }
}

impl<T: Clone> ConcurrentBag<T> {
    /// Snapshot of every item. Freezes the bag.
    ///
    pub fn to_vec(&self) -> Vec<T> {
        if self.registry.is_unused() {
            return Vec::new();
        }
        self.freeze().values().cloned().collect()
    }

    /// Clones a snapshot into `destination` starting at `start_index`.
    ///
    /// Returns the number of items written. Fails without writing anything if
    /// `start_index` is past the end or the snapshot does not fit.
    ///
    pub fn copy_into(&self, destination: &mut [T], start_index: usize) -> BagResult<usize> {
        if start_index > destination.len() {
            return Err(BagError::IndexOutOfRange {
                index: start_index,
                len: destination.len(),
            });
        }

        let available = destination.len() - start_index;
        if self.registry.is_unused() {
            return Ok(0);
        }

        let frozen = self.freeze();
        let required = frozen.count();
        if required > available {
            return Err(BagError::DestinationTooSmall {
                required,
                available,
            });
        }

        for (slot, value) in destination[start_index..].iter_mut().zip(frozen.values()) {
            slot.clone_from(value);
        }
        Ok(required)
    }

    /// Iterates over a snapshot taken now. Later changes are not observed.
    ///
    pub fn iter(&self) -> BagIter<T> {
        BagIter::new(self.to_vec())
    }
}

impl<T> Default for ConcurrentBag<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for ConcurrentBag<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.registry.is_unused() {
            return f.debug_list().finish();
        }
        let frozen = self.freeze();
        f.debug_list().entries(frozen.values()).finish()
    }
}

impl<T> FromIterator<T> for ConcurrentBag<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_items(iter)
    }
}

impl<T> Extend<T> for ConcurrentBag<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.add_all(iter);
    }
}

impl<T> IntoIterator for ConcurrentBag<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.into_vec().into_iter()
    }
}

impl<'a, T: Clone> IntoIterator for &'a ConcurrentBag<T> {
    type Item = T;
    type IntoIter = BagIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T> ProducerConsumerCollection<T> for ConcurrentBag<T> {
    fn try_add(&self, item: T) -> bool {
        ConcurrentBag::add(self, item);
        true
    }

    fn try_take(&self) -> Option<T> {
        ConcurrentBag::try_take(self)
    }

    fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        ConcurrentBag::to_vec(self)
    }

    fn len(&self) -> usize {
        ConcurrentBag::count(self)
    }

    fn is_empty(&self) -> bool {
        ConcurrentBag::is_empty(self)
    }
}

// Thread safety
//
// Values move between threads through add/take, never shared by reference
// outside a freeze, so `T: Send` is enough for both.
//
unsafe impl<T: Send> Send for ConcurrentBag<T> {}

unsafe impl<T: Send> Sync for ConcurrentBag<T> {}

// ============================================================================
// Tests
// ============================================================================
