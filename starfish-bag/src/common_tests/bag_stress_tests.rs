use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use crate::data_structures::{ConcurrentBag, WorkerId};

// ============================================================================
// Helpers
// ============================================================================

/// Asserts that `taken` holds each of `0..total` exactly once.
fn assert_each_once(mut taken: Vec<usize>, total: usize) {
    assert_eq!(taken.len(), total, "items lost or duplicated");
    taken.sort_unstable();
    for (expected, actual) in taken.into_iter().enumerate() {
        assert_eq!(expected, actual, "item {} missing or duplicated", expected);
    }
}

// ============================================================================
// Stress tests
// ============================================================================

/// Workers add tagged items concurrently, then a full drain must return
/// every tag exactly once.
pub fn test_no_loss_no_duplication(num_workers: usize, items_per_worker: usize) {
    let bag = ConcurrentBag::new();
    let barrier = Barrier::new(num_workers);

    thread::scope(|scope| {
        for worker_index in 0..num_workers {
            let bag = &bag;
            let barrier = &barrier;
            scope.spawn(move || {
                let worker = bag.worker(WorkerId::new(worker_index)).unwrap();
                barrier.wait();
                for i in 0..items_per_worker {
                    worker.add(worker_index * items_per_worker + i);
                }
            });
        }
    });

    assert_eq!(bag.count(), num_workers * items_per_worker);
    assert_each_once(bag.drain(), num_workers * items_per_worker);
    assert!(bag.is_empty());
}

/// Workers interleave adds with takes from their own list and steals from
/// others. Everything taken plus whatever remains is exactly what was added.
pub fn test_concurrent_add_take(num_workers: usize, items_per_worker: usize) {
    let bag = ConcurrentBag::new();
    let barrier = Barrier::new(num_workers);

    let taken: Vec<usize> = thread::scope(|scope| {
        let handles: Vec<_> = (0..num_workers)
            .map(|worker_index| {
                let bag = &bag;
                let barrier = &barrier;
                scope.spawn(move || {
                    let worker = bag.worker(WorkerId::new(worker_index)).unwrap();
                    let mut taken = Vec::new();
                    barrier.wait();
                    for i in 0..items_per_worker {
                        worker.add(worker_index * items_per_worker + i);
                        if i % 3 == 0 {
                            taken.extend(worker.try_take());
                        }
                    }
                    // Drain the local list, then keep stealing from the others.
                    //
                    while let Some(item) = worker.try_take() {
                        taken.push(item);
                    }
                    taken
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect()
    });

    let mut all = taken;
    all.extend(bag.drain());
    assert_each_once(all, num_workers * items_per_worker);
}

/// A single producer fills its list while thieves with empty lists steal.
/// Every item is taken exactly once.
pub fn test_steal_contention(num_thieves: usize, total_items: usize) {
    let bag = ConcurrentBag::new();
    let producer_done = AtomicBool::new(false);

    let (produced_back, stolen): (Vec<usize>, Vec<usize>) = thread::scope(|scope| {
        let thieves: Vec<_> = (0..num_thieves)
            .map(|thief_index| {
                let bag = &bag;
                let producer_done = &producer_done;
                scope.spawn(move || {
                    let thief = bag.worker(WorkerId::new(thief_index + 1)).unwrap();
                    let mut stolen = Vec::new();
                    loop {
                        // Read the flag first so a miss after it was set
                        // means the producer list is really empty.
                        //
                        let done = producer_done.load(Ordering::SeqCst);
                        match thief.try_take() {
                            Some(item) => stolen.push(item),
                            None if done => break,
                            None => thread::yield_now(),
                        }
                    }
                    stolen
                })
            })
            .collect();

        let producer = {
            let bag = &bag;
            let producer_done = &producer_done;
            scope.spawn(move || {
                let worker = bag.worker(WorkerId::new(0)).unwrap();
                let mut kept = Vec::new();
                for i in 0..total_items {
                    worker.add(i);
                    if i % 7 == 0 {
                        kept.extend(worker.try_take());
                    }
                }
                producer_done.store(true, Ordering::SeqCst);
                kept
            })
        };

        let kept = producer.join().unwrap();
        let stolen = thieves
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        (kept, stolen)
    });

    let mut all = produced_back;
    all.extend(stolen);
    all.extend(bag.drain());
    assert_each_once(all, total_items);
}

/// A producer keeps its list hovering between empty and one item while
/// thieves scan for work. Every refill is an empty to non-empty transition a
/// scan may have just skipped; every item must still be taken exactly once.
pub fn test_refill_during_steals(num_thieves: usize, rounds: usize) {
    let bag = ConcurrentBag::new();
    let taken = AtomicUsize::new(0);

    let stolen: Vec<usize> = thread::scope(|scope| {
        let thieves: Vec<_> = (0..num_thieves)
            .map(|thief_index| {
                let bag = &bag;
                let taken = &taken;
                scope.spawn(move || {
                    let thief = bag.worker(WorkerId::new(thief_index + 1)).unwrap();
                    let mut stolen = Vec::new();
                    while taken.load(Ordering::SeqCst) < rounds {
                        match thief.try_take() {
                            Some(item) => {
                                stolen.push(item);
                                taken.fetch_add(1, Ordering::SeqCst);
                            }
                            None => thread::yield_now(),
                        }
                    }
                    stolen
                })
            })
            .collect();

        let bag = &bag;
        let taken = &taken;
        scope.spawn(move || {
            let producer = bag.worker(WorkerId::new(0)).unwrap();
            for item in 0..rounds {
                producer.add(item);
                while taken.load(Ordering::SeqCst) <= item {
                    thread::yield_now();
                }
            }
        });

        thieves
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect()
    });

    assert_each_once(stolen, rounds);
    assert!(bag.is_empty());
}

/// A snapshot never holds duplicates, and never holds an item whose removal
/// completed before the snapshot started.
pub fn test_snapshot_consistency(num_workers: usize, items_per_worker: usize, snapshots: usize) {
    let total = num_workers * items_per_worker;
    let bag = ConcurrentBag::new();
    let removed: Vec<AtomicBool> = (0..total).map(|_| AtomicBool::new(false)).collect();
    let active_workers = AtomicUsize::new(num_workers);

    thread::scope(|scope| {
        for worker_index in 0..num_workers {
            let bag = &bag;
            let removed = &removed;
            let active_workers = &active_workers;
            scope.spawn(move || {
                let worker = bag.worker(WorkerId::new(worker_index)).unwrap();
                for i in 0..items_per_worker {
                    worker.add(worker_index * items_per_worker + i);
                    if i % 2 == 1 {
                        if let Some(item) = worker.try_take() {
                            removed[item].store(true, Ordering::SeqCst);
                        }
                    }
                }
                active_workers.fetch_sub(1, Ordering::SeqCst);
            });
        }

        let bag = &bag;
        let removed = &removed;
        let active_workers = &active_workers;
        scope.spawn(move || {
            let mut taken = 0;
            while taken < snapshots || active_workers.load(Ordering::SeqCst) > 0 {
                let removed_before: HashSet<usize> = (0..total)
                    .filter(|&item| removed[item].load(Ordering::SeqCst))
                    .collect();

                let snapshot = bag.to_vec();
                let unique: HashSet<usize> = snapshot.iter().copied().collect();
                assert_eq!(unique.len(), snapshot.len(), "duplicate item in snapshot");
                for item in &snapshot {
                    assert!(
                        !removed_before.contains(item),
                        "snapshot holds item {} removed before it started",
                        item
                    );
                }
                taken += 1;
            }
        });
    });

    let remaining = bag.drain();
    let removed_count = removed.iter().filter(|r| r.load(Ordering::SeqCst)).count();
    assert_eq!(remaining.len() + removed_count, total);
}

/// With adds only, count() observed during traffic never exceeds what has
/// been added so far, and settles on the exact total.
pub fn test_count_during_traffic(num_workers: usize, items_per_worker: usize) {
    let bag = ConcurrentBag::new();
    let added = AtomicUsize::new(0);
    let active_workers = AtomicUsize::new(num_workers);

    thread::scope(|scope| {
        for worker_index in 0..num_workers {
            let bag = &bag;
            let added = &added;
            let active_workers = &active_workers;
            scope.spawn(move || {
                let worker = bag.worker(WorkerId::new(worker_index)).unwrap();
                for i in 0..items_per_worker {
                    added.fetch_add(1, Ordering::SeqCst);
                    worker.add(i);
                }
                active_workers.fetch_sub(1, Ordering::SeqCst);
            });
        }

        let bag = &bag;
        let added = &added;
        let active_workers = &active_workers;
        scope.spawn(move || {
            let mut last = 0;
            while active_workers.load(Ordering::SeqCst) > 0 {
                let count = bag.count();
                assert!(count <= added.load(Ordering::SeqCst));
                assert!(count >= last, "count went backwards without takes");
                last = count;
            }
        });
    });

    assert_eq!(bag.count(), num_workers * items_per_worker);
}

/// Many threads take from an empty bag at once. None of them gets anything
/// and the bag stays empty.
pub fn test_concurrent_empty_takes(num_threads: usize, attempts: usize) {
    let bag: Arc<ConcurrentBag<usize>> = Arc::new(ConcurrentBag::new());
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|thread_index| {
            let bag = Arc::clone(&bag);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let worker = bag.worker(WorkerId::new(thread_index)).unwrap();
                barrier.wait();
                for _ in 0..attempts {
                    assert_eq!(worker.try_take(), None);
                    assert_eq!(bag.try_take(), None);
                    assert_eq!(worker.try_peek(), None);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(bag.is_empty());
    assert_eq!(bag.count(), 0);
}
