use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicIsize, AtomicPtr, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::preemptive_synchronization::SpinWait;

type NodePtr<T> = *mut Node<T>;

// =============================================================================
// LOCAL LIST LAYOUT
// =============================================================================
//
//   owner pushes/pops here                      stealers pop here
//            │                                          │
//            ▼                                          ▼
//        ┌──────┐  next  ┌──────┐  next  ┌──────┐
// head ─►│  v3  │───────►│  v2  │───────►│  v1  │◄─ tail
//        │      │◄───────│      │◄───────│      │
//        └──────┘  prev  └──────┘  prev  └──────┘
//
// The owner treats the list as a stack (head), stealers take the oldest item
// (tail). With three or more nodes the two ends touch disjoint link fields:
//
//   owner take:  head = v3.next (v2);   v2.prev = null
//   steal:       tail = v1.prev (v2);   v2.next = null
//
// With fewer nodes the ends overlap, so both sides fall back to the list
// mutex. `current_op` lets a stealer holding the mutex detect an owner that
// is still inside an unsynchronized operation on a short list and wait it out.
//
// =============================================================================

/// In-flight operation marker published by the list owner.
///
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListOperation {
    None = 0,
    Add = 1,
    Take = 2,
}

impl ListOperation {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ListOperation::Add,
            2 => ListOperation::Take,
            _ => ListOperation::None,
        }
    }
}

pub(crate) struct Node<T> {
    value: T,
    next: AtomicPtr<Node<T>>,
    prev: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    fn new(value: T) -> Self {
        Node {
            value,
            next: AtomicPtr::new(ptr::null_mut()),
            prev: AtomicPtr::new(ptr::null_mut()),
        }
    }

    fn into_value(self) -> T {
        self.value
    }
}

/// A single worker's list plus the metadata stealers and freezes rely on.
///
/// # Safety Contract
///
/// The unsafe mutators never synchronize on their own. Callers must guarantee:
/// 1. `add`, `remove` and `peek_head_with` are called only by the list owner,
///    either while holding the list mutex or, on the fast path, with
///    `current_op` published and the size thresholds checked.
/// 2. `steal`, `peek_tail_with` are called only while holding the list mutex
///    and after `can_steal` returned true.
/// 3. `clear` and `values` are used only while the bag is frozen.
///
pub(crate) struct LocalList<T> {
    head: AtomicPtr<Node<T>>,
    tail: AtomicPtr<Node<T>>,
    current_op: AtomicU8,
    count: AtomicIsize,
    steal_count: AtomicIsize,
    version: AtomicUsize,
    next_list: AtomicPtr<LocalList<T>>,
    lock: Mutex<()>,
    _marker: PhantomData<Box<Node<T>>>,
}

impl<T> LocalList<T> {
    pub(crate) fn new() -> Self {
        LocalList {
            head: AtomicPtr::new(ptr::null_mut()),
            tail: AtomicPtr::new(ptr::null_mut()),
            current_op: AtomicU8::new(ListOperation::None as u8),
            count: AtomicIsize::new(0),
            steal_count: AtomicIsize::new(0),
            version: AtomicUsize::new(0),
            next_list: AtomicPtr::new(ptr::null_mut()),
            lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    // =========================================================================
    // Metadata accessors
    // =========================================================================

    /// Returns true if the list currently links at least one node.
    ///
    #[inline]
    pub(crate) fn has_items(&self) -> bool {
        !self.head.load(Ordering::Acquire).is_null()
    }

    /// Items added by the owner minus items removed by the owner or stolen.
    ///
    #[inline]
    pub(crate) fn effective_count(&self) -> usize {
        let count = self.count.load(Ordering::SeqCst);
        let stolen = self.steal_count.load(Ordering::SeqCst);
        (count - stolen).max(0) as usize
    }

    #[inline]
    pub(crate) fn version(&self) -> usize {
        self.version.load(Ordering::SeqCst)
    }

    #[inline]
    pub(crate) fn current_op(&self) -> ListOperation {
        ListOperation::from_u8(self.current_op.load(Ordering::SeqCst))
    }

    /// Publishes `op` as in flight until the returned guard is dropped.
    ///
    pub(crate) fn begin(&self, op: ListOperation) -> OperationGuard<'_> {
        self.current_op.swap(op as u8, Ordering::SeqCst);
        OperationGuard {
            marker: &self.current_op,
        }
    }

    /// Waits until the owner has no unsynchronized operation in flight.
    ///
    pub(crate) fn wait_for_operation(&self, spin_wait: &mut SpinWait) {
        spin_wait.spin_until(|| self.current_op() == ListOperation::None);
    }

    /// Decides whether a stealer holding the list mutex may take the tail.
    ///
    /// A short list may still be inside an owner operation that raced with
    /// the lock acquisition; wait for it to resolve before re-checking.
    ///
    pub(crate) fn can_steal(&self, spin_wait: &mut SpinWait) -> bool {
        if self.effective_count() <= 2 && self.current_op() != ListOperation::None {
            self.wait_for_operation(spin_wait);
        }
        self.effective_count() > 0
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    pub(crate) fn next_list(&self) -> *mut LocalList<T> {
        self.next_list.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn set_next_list(&self, list: *mut LocalList<T>) {
        self.next_list.store(list, Ordering::Release)
    }

    // =========================================================================
    // Owner end (head)
    // =========================================================================

    /// Pushes `value` on the head. `reconcile` folds pending steals into
    /// `count` and must only be set while holding the list mutex.
    ///
    pub(crate) unsafe fn add(&self, value: T, reconcile: bool) {
        // Count first, a stealer racing with this push must see the pending
        // item when it decides whether to wait for the owner.
        //
        self.count.fetch_add(1, Ordering::SeqCst);

        let node = Box::into_raw(Box::new(Node::new(value)));
        let head = self.head.load(Ordering::Acquire);

        if head.is_null() {
            self.tail.store(node, Ordering::Release);
            self.head.store(node, Ordering::Release);
            self.version.fetch_add(1, Ordering::SeqCst);
        } else {
            unsafe {
                (*node).next.store(head, Ordering::Relaxed);
                (*head).prev.store(node, Ordering::Release);
            }
            self.head.store(node, Ordering::Release);
        }

        if reconcile {
            let stolen = self.steal_count.swap(0, Ordering::SeqCst);
            self.count.fetch_sub(stolen, Ordering::SeqCst);
        }
    }

    /// Pops the head. The list must not be empty.
    ///
    pub(crate) unsafe fn remove(&self) -> T {
        let head = self.head.load(Ordering::Acquire);
        debug_assert!(!head.is_null(), "remove called on an empty list");

        unsafe {
            let next = (*head).next.load(Ordering::Acquire);
            self.head.store(next, Ordering::Release);
            if next.is_null() {
                self.tail.store(ptr::null_mut(), Ordering::Release);
            } else {
                (*next).prev.store(ptr::null_mut(), Ordering::Release);
            }

            self.count.fetch_sub(1, Ordering::SeqCst);
            Box::from_raw(head).into_value()
        }
    }

    pub(crate) unsafe fn peek_head_with<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&T) -> R,
    {
        let head = self.head.load(Ordering::Acquire);
        if head.is_null() {
            return None;
        }
        unsafe { Some(f(&(*head).value)) }
    }

    // =========================================================================
    // Stealer end (tail)
    // =========================================================================

    /// Pops the tail. The caller holds the list mutex and `can_steal` passed.
    ///
    pub(crate) unsafe fn steal(&self) -> T {
        let tail = self.tail.load(Ordering::Acquire);
        debug_assert!(!tail.is_null(), "steal called on an empty list");

        unsafe {
            let prev = (*tail).prev.load(Ordering::Acquire);
            self.tail.store(prev, Ordering::Release);
            if prev.is_null() {
                self.head.store(ptr::null_mut(), Ordering::Release);
            } else {
                (*prev).next.store(ptr::null_mut(), Ordering::Release);
            }

            self.steal_count.fetch_add(1, Ordering::SeqCst);
            Box::from_raw(tail).into_value()
        }
    }

    pub(crate) unsafe fn peek_tail_with<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&T) -> R,
    {
        let tail = self.tail.load(Ordering::Acquire);
        if tail.is_null() {
            return None;
        }
        unsafe { Some(f(&(*tail).value)) }
    }

    // =========================================================================
    // Whole-list access (frozen bag only)
    // =========================================================================

    /// Iterates values from head (newest) to tail (oldest).
    ///
    pub(crate) unsafe fn values(&self) -> ListValues<'_, T> {
        ListValues {
            current: self.head.load(Ordering::Acquire),
            _marker: PhantomData,
        }
    }

    /// Drops every node and resets the counters.
    ///
    pub(crate) unsafe fn clear(&self) {
        let mut current = self.head.swap(ptr::null_mut(), Ordering::AcqRel);
        self.tail.store(ptr::null_mut(), Ordering::Release);

        while !current.is_null() {
            unsafe {
                let node = Box::from_raw(current);
                current = node.next.load(Ordering::Acquire);
            }
        }

        self.count.store(0, Ordering::SeqCst);
        self.steal_count.store(0, Ordering::SeqCst);
    }
}

impl<T> Drop for LocalList<T> {
    fn drop(&mut self) {
        // Exclusive access, no other thread can observe the list anymore.
        //
        unsafe { self.clear() };
    }
}

/// Clears the published operation marker on drop.
///
/// Keeping the marker in a guard means a panic inside a peek callback cannot
/// leave stealers and freezes spinning on a marker nobody will clear.
///
pub(crate) struct OperationGuard<'a> {
    marker: &'a AtomicU8,
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.marker.store(ListOperation::None as u8, Ordering::SeqCst);
    }
}

pub(crate) struct ListValues<'a, T> {
    current: NodePtr<T>,
    _marker: PhantomData<&'a T>,
}

impl<'a, T> Iterator for ListValues<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_null() {
            return None;
        }
        unsafe {
            let node = &*self.current;
            self.current = node.next.load(Ordering::Acquire);
            Some(&node.value)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
