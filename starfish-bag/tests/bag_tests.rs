use std::sync::{Mutex, PoisonError};

use rstest::rstest;
use starfish_bag::common_tests::bag_core_tests::*;
use starfish_bag::data_structures::{ConcurrentBag, ProducerConsumerCollection};
use tracing_subscriber::EnvFilter;

// Honors RUST_LOG, e.g. RUST_LOG=starfish_bag=trace to see list claims and steals.
//
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// A mutex-guarded stack, used as a reference collection for the generic tests.
//
#[derive(Default)]
struct LockedStack<T> {
    items: Mutex<Vec<T>>,
}

impl<T> LockedStack<T> {
    fn items(&self) -> std::sync::MutexGuard<'_, Vec<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> ProducerConsumerCollection<T> for LockedStack<T> {
    fn try_add(&self, item: T) -> bool {
        self.items().push(item);
        true
    }

    fn try_take(&self) -> Option<T> {
        self.items().pop()
    }

    fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.items().clone()
    }

    fn len(&self) -> usize {
        self.items().len()
    }
}

// Trait for type-level parametrization
trait TestCollection {
    type IntCollection: ProducerConsumerCollection<i32> + Default;
    type IndexCollection: ProducerConsumerCollection<usize> + Default + Send + Sync + 'static;
}

struct UseConcurrentBag;
struct UseLockedStack;

impl TestCollection for UseConcurrentBag {
    type IntCollection = ConcurrentBag<i32>;
    type IndexCollection = ConcurrentBag<usize>;
}

impl TestCollection for UseLockedStack {
    type IntCollection = LockedStack<i32>;
    type IndexCollection = LockedStack<usize>;
}

#[rstest]
#[case::concurrent_bag(UseConcurrentBag)]
#[case::locked_stack(UseLockedStack)]
fn basic_operations<T: TestCollection>(#[case] _type: T) {
    test_basic_operations(&T::IntCollection::default());
}

#[rstest]
#[case::concurrent_bag(UseConcurrentBag)]
#[case::locked_stack(UseLockedStack)]
fn idempotent_drain<T: TestCollection>(#[case] _type: T) {
    test_idempotent_drain::<T::IntCollection>();
}

#[rstest]
#[case::concurrent_bag(UseConcurrentBag)]
#[case::locked_stack(UseLockedStack)]
fn emptiness_equivalence<T: TestCollection>(#[case] _type: T) {
    test_emptiness_equivalence::<T::IntCollection>();
}

#[rstest]
#[case::concurrent_bag(UseConcurrentBag)]
#[case::locked_stack(UseLockedStack)]
fn to_vec_snapshot<T: TestCollection>(#[case] _type: T) {
    test_to_vec_snapshot::<T::IntCollection>();
}

#[rstest]
#[case::concurrent_bag_single(UseConcurrentBag, 1)]
#[case::concurrent_bag_many(UseConcurrentBag, 8)]
#[case::locked_stack(UseLockedStack, 8)]
fn count_conservation<T: TestCollection>(#[case] _type: T, #[case] num_threads: usize) {
    test_count_conservation::<T::IndexCollection>(num_threads, 500);
}

#[rstest]
#[case::empty(0)]
#[case::one(1)]
#[case::two(2)]
#[case::three(3)]
#[case::many(100)]
fn single_worker_lifo(#[case] count: i32) {
    test_single_worker_lifo(&ConcurrentBag::new(), count);
}

#[test]
fn steal_oldest_first() {
    init_tracing();
    test_steal_oldest_first();
}

#[test]
fn peek_local_and_stolen() {
    test_peek_local_and_stolen();
}

#[test]
fn worker_slots() {
    init_tracing();
    test_worker_slots();
}

#[test]
fn copy_into_bounds() {
    test_copy_into_bounds();
}

#[test]
fn collect_and_iterate() {
    let bag: ConcurrentBag<i32> = (0..10).collect();
    assert_eq!(bag.count(), 10);

    let mut seen: Vec<i32> = (&bag).into_iter().collect();
    seen.sort();
    assert_eq!(seen, (0..10).collect::<Vec<_>>());

    let mut owned: Vec<i32> = bag.into_iter().collect();
    owned.sort();
    assert_eq!(owned, (0..10).collect::<Vec<_>>());
}
