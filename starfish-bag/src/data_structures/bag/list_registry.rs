use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use super::local_list::{ListValues, LocalList};
use super::worker_id::WorkerId;
use crate::error::{BagError, BagResult};
use crate::preemptive_synchronization::SpinWait;

type ListPtr<T> = NonNull<LocalList<T>>;

// =============================================================================
// REGISTRY CHAIN
// =============================================================================
//
//   head                                             tail (under mutex)
//    │                                                │
//    ▼                                                ▼
// ┌──────┐ next_list ┌──────┐ next_list ┌──────┐
// │ L(0) │──────────►│ L(4) │──────────►│ L(-) │──► null
// └──────┘           └──────┘           └──────┘
//
// The chain is append-only. Readers (steal scans) walk it without locking;
// appends, slot claims and freezes serialize on the registry mutex. Lists are
// freed only when the registry itself is dropped, so a `&LocalList` handed
// out by the registry lives as long as the registry.
//
// Slot table: one entry per list, in chain order, recording which worker id
// the list belongs to (if any) and whether a live handle claims it. Unnamed
// lists serve callers without a worker id.
//
// =============================================================================

struct WorkerSlot<T> {
    list: ListPtr<T>,
    owner: Option<WorkerId>,
    claimed: bool,
}

pub(crate) struct RegistryState<T> {
    tail: *mut LocalList<T>,
    slots: Vec<WorkerSlot<T>>,
}

/// Chain of every [`LocalList`] a bag created, plus the worker slot table.
///
pub(crate) struct ListRegistry<T> {
    head: AtomicPtr<LocalList<T>>,
    state: Mutex<RegistryState<T>>,
}

impl<T> ListRegistry<T> {
    pub(crate) fn new() -> Self {
        ListRegistry {
            head: AtomicPtr::new(ptr::null_mut()),
            state: Mutex::new(RegistryState {
                tail: ptr::null_mut(),
                slots: Vec::new(),
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RegistryState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true if no list was ever registered.
    ///
    pub(crate) fn is_unused(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }

    /// Walks the chain without locking.
    ///
    pub(crate) fn lists(&self) -> Lists<'_, T> {
        Lists {
            current: self.head.load(Ordering::Acquire),
            _marker: PhantomData,
        }
    }

    pub(crate) fn list_count(&self) -> usize {
        self.lock_state().slots.len()
    }

    // =========================================================================
    // Slot claims
    // =========================================================================

    /// Claims the list keyed by `id`.
    ///
    /// Lookup order: the list `id` owned before, then (if allowed) any list no
    /// live handle claims, then a new list appended to the chain.
    ///
    pub(crate) fn claim(&self, id: WorkerId, reuse_released: bool) -> BagResult<ListClaim<'_, T>> {
        let mut state = self.lock_state();

        if let Some((index, slot)) = state
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.owner == Some(id))
        {
            if slot.claimed {
                return Err(BagError::WorkerInUse(id));
            }
            slot.claimed = true;
            return Ok(ListClaim::new(self, slot.list, index));
        }

        if reuse_released {
            if let Some((index, slot)) = state
                .slots
                .iter_mut()
                .enumerate()
                .find(|(_, slot)| !slot.claimed)
            {
                debug!(worker = %id, previous_owner = ?slot.owner, "reusing released bag list");
                slot.owner = Some(id);
                slot.claimed = true;
                return Ok(ListClaim::new(self, slot.list, index));
            }
        }

        let (list, index) = Self::append(&self.head, &mut state, Some(id));
        Ok(ListClaim::new(self, list, index))
    }

    /// Claims a list that no worker id owns, for callers without an identity.
    /// Appends a new unnamed list when every unnamed list is busy.
    ///
    pub(crate) fn claim_unnamed(&self) -> ListClaim<'_, T> {
        let mut state = self.lock_state();
        if let Some((list, index)) = Self::claim_free_unnamed(&mut state) {
            return ListClaim::new(self, list, index);
        }
        let (list, index) = Self::append(&self.head, &mut state, None);
        ListClaim::new(self, list, index)
    }

    /// Like [`Self::claim_unnamed`], but never creates a list.
    ///
    pub(crate) fn try_claim_unnamed(&self) -> Option<ListClaim<'_, T>> {
        let mut state = self.lock_state();
        Self::claim_free_unnamed(&mut state).map(|(list, index)| ListClaim::new(self, list, index))
    }

    fn claim_free_unnamed(state: &mut RegistryState<T>) -> Option<(ListPtr<T>, usize)> {
        let (index, slot) = state
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| !slot.claimed && slot.owner.is_none())?;
        slot.claimed = true;
        Some((slot.list, index))
    }

    fn append(
        head: &AtomicPtr<LocalList<T>>,
        state: &mut RegistryState<T>,
        owner: Option<WorkerId>,
    ) -> (ListPtr<T>, usize) {
        let list = NonNull::from(Box::leak(Box::new(LocalList::new())));

        // Publish the fully initialized list at the end of the chain.
        //
        if state.tail.is_null() {
            head.store(list.as_ptr(), Ordering::Release);
        } else {
            unsafe { (*state.tail).set_next_list(list.as_ptr()) };
        }
        state.tail = list.as_ptr();
        state.slots.push(WorkerSlot {
            list,
            owner,
            claimed: true,
        });

        debug!(worker = ?owner, lists = state.slots.len(), "created bag list");
        (list, state.slots.len() - 1)
    }

    /// Frees the slot at `index`. Slots are never removed or reordered while
    /// the registry lives, so the index a claim was handed stays valid.
    ///
    fn release(&self, index: usize) {
        let mut state = self.lock_state();
        let slot = &mut state.slots[index];
        debug_assert!(slot.claimed, "releasing a slot that is not claimed");
        slot.claimed = false;
        if let Some(owner) = slot.owner {
            debug!(worker = %owner, "released bag list");
        }
    }

    // =========================================================================
    // Freeze
    // =========================================================================

    /// Stops every unsynchronized operation and locks every list.
    ///
    /// Steps, in this order:
    /// 1. lock the registry (serializes freezes and new lists);
    /// 2. raise `need_sync` so owners take the locked path from now on;
    /// 3. lock each list in chain order;
    /// 4. wait for owner operations that started before step 2.
    ///
    /// Everything acquired is released when the guard drops, in reverse, even
    /// if a panic unwinds through the guard.
    ///
    pub(crate) fn freeze<'a>(
        &'a self,
        need_sync: &'a AtomicBool,
        spin_limit: u32,
    ) -> FreezeGuard<'a, T> {
        let state = self.lock_state();
        need_sync.store(true, Ordering::SeqCst);

        let mut guard = FreezeGuard {
            registry: self,
            need_sync,
            list_guards: Vec::with_capacity(state.slots.len()),
            _state: state,
        };

        for list in self.lists() {
            guard.list_guards.push(list.lock());
        }

        for list in self.lists() {
            let mut spin_wait = SpinWait::with_spin_limit(spin_limit);
            list.wait_for_operation(&mut spin_wait);
        }

        trace!(lists = guard.list_guards.len(), "froze bag");
        guard
    }
}

impl<T> Drop for ListRegistry<T> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        for slot in state.slots.drain(..) {
            unsafe { drop(Box::from_raw(slot.list.as_ptr())) };
        }
        state.tail = ptr::null_mut();
        *self.head.get_mut() = ptr::null_mut();
    }
}

/// Iterator over the registry chain.
///
pub(crate) struct Lists<'a, T> {
    current: *mut LocalList<T>,
    _marker: PhantomData<&'a LocalList<T>>,
}

impl<'a, T> Iterator for Lists<'a, T> {
    type Item = &'a LocalList<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_null() {
            return None;
        }
        // Lists are never freed before the registry.
        //
        let list = unsafe { &*self.current };
        self.current = list.next_list();
        Some(list)
    }
}

/// A list claimed for exclusive owner access. Dropping it releases the slot.
///
pub(crate) struct ListClaim<'a, T> {
    registry: &'a ListRegistry<T>,
    list: ListPtr<T>,
    slot: usize,
}

impl<'a, T> ListClaim<'a, T> {
    fn new(registry: &'a ListRegistry<T>, list: ListPtr<T>, slot: usize) -> Self {
        ListClaim {
            registry,
            list,
            slot,
        }
    }

    pub(crate) fn list(&self) -> &'a LocalList<T> {
        unsafe { self.list.as_ref() }
    }
}

impl<T> Drop for ListClaim<'_, T> {
    fn drop(&mut self) {
        self.registry.release(self.slot);
    }
}

/// A frozen bag: registry locked, every list locked, no owner operation in
/// flight. Readers may walk every node.
///
pub(crate) struct FreezeGuard<'a, T> {
    registry: &'a ListRegistry<T>,
    need_sync: &'a AtomicBool,
    list_guards: Vec<MutexGuard<'a, ()>>,
    _state: MutexGuard<'a, RegistryState<T>>,
}

impl<'a, T> FreezeGuard<'a, T> {
    /// Sum of every list's effective size.
    ///
    pub(crate) fn count(&self) -> usize {
        self.registry.lists().map(LocalList::effective_count).sum()
    }

    pub(crate) fn is_empty(&self) -> bool {
        !self.registry.lists().any(LocalList::has_items)
    }

    /// Every value in the bag, list by list.
    ///
    pub(crate) fn values(&self) -> FrozenValues<'_, T> {
        FrozenValues {
            lists: self.registry.lists(),
            current: None,
        }
    }

    /// Drops every value in the bag.
    ///
    pub(crate) fn clear(&self) {
        for list in self.registry.lists() {
            unsafe { list.clear() };
        }
    }
}

impl<T> Drop for FreezeGuard<'_, T> {
    fn drop(&mut self) {
        while self.list_guards.pop().is_some() {}
        self.need_sync.store(false, Ordering::SeqCst);
        trace!("unfroze bag");
        // The registry state guard is released after this.
    }
}

pub(crate) struct FrozenValues<'a, T> {
    lists: Lists<'a, T>,
    current: Option<ListValues<'a, T>>,
}

impl<'a, T> Iterator for FrozenValues<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(value) = self.current.as_mut().and_then(Iterator::next) {
                return Some(value);
            }
            let list = self.lists.next()?;
            // Every list is locked and quiescent for the lifetime of the freeze.
            //
            self.current = Some(unsafe { list.values() });
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
