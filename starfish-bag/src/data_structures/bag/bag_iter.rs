//! Snapshot iterator for ConcurrentBag.

use std::iter::FusedIterator;
use std::vec;

// ============================================================================
// BagIter - Iterator over a snapshot of a ConcurrentBag
// ============================================================================

/// Iterator over the items a [`ConcurrentBag`](super::ConcurrentBag) held when
/// the iterator was created.
///
/// The snapshot is taken under a freeze, so it never contains an item twice
/// and never contains an item removed before the snapshot. Changes made to
/// the bag afterwards are not observed.
///
pub struct BagIter<T> {
    items: vec::IntoIter<T>,
}

impl<T> BagIter<T> {
    pub(crate) fn new(items: Vec<T>) -> Self {
        BagIter {
            items: items.into_iter(),
        }
    }
}

impl<T> Iterator for BagIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.items.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

impl<T> DoubleEndedIterator for BagIter<T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.items.next_back()
    }
}

impl<T> ExactSizeIterator for BagIter<T> {}

impl<T> FusedIterator for BagIter<T> {}

// ============================================================================
// Tests
// ============================================================================
