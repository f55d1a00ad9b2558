//! Stress tests: publish serialization, reader/writer storms, and
//! end-to-end handle accounting.
//!
//! Thread counts are kept to 2–4 writers/readers per test because the
//! harness runs tests in parallel; iteration counts carry the load
//! instead, mirroring a bounded pool doing many operations.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use ayna::{Mirror, Reclaimer};

struct Counted {
    value: u64,
    counter: Arc<AtomicUsize>,
}

impl Counted {
    fn new(value: u64, counter: Arc<AtomicUsize>) -> Self {
        Self { value, counter }
    }
}

impl Drop for Counted {
    fn drop(&mut self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Publish serialization
// ============================================================================

#[test]
#[cfg_attr(miri, ignore)]
fn concurrent_publishes_are_all_counted() {
    const WRITERS: u64 = 10;
    const PUBLISHES: u64 = 1_000;

    let cell = Arc::new(Mirror::from_value(0u64));
    let initial_version = cell.version();

    let mut handles = Vec::new();
    for tid in 0..WRITERS {
        let cell = cell.clone();
        handles.push(thread::spawn(move || {
            for i in 0..PUBLISHES {
                cell.update(Some(Arc::new(tid * PUBLISHES + i + 1)));
            }
            // The last value this writer published.
            tid * PUBLISHES + PUBLISHES
        }));
    }

    let last_per_writer: HashSet<u64> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    // No publish was lost...
    assert_eq!(cell.version(), initial_version + WRITERS * PUBLISHES);

    // ...and the surviving value is the final publish of some writer.
    let survivor = *cell.load();
    assert!(
        last_per_writer.contains(&survivor),
        "survivor {survivor} is not any writer's final publish"
    );
}

#[test]
#[cfg_attr(miri, ignore)]
fn no_handle_leaks_without_a_reclaimer() {
    const WRITERS: u64 = 4;
    const PUBLISHES: u64 = 500;

    let counter = Arc::new(AtomicUsize::new(0));
    let cell = Arc::new(Mirror::<Counted>::empty());

    let mut handles = Vec::new();
    for tid in 0..WRITERS {
        let cell = cell.clone();
        let counter = counter.clone();
        handles.push(thread::spawn(move || {
            for i in 0..PUBLISHES {
                cell.update(Some(Arc::new(Counted::new(
                    tid * PUBLISHES + i,
                    counter.clone(),
                ))));
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // Every superseded value has already been destroyed by the writers;
    // only the current one remains, pinned by the cell.
    let published = (WRITERS * PUBLISHES) as usize;
    assert_eq!(counter.load(Ordering::SeqCst), published - 1);

    drop(cell);
    assert_eq!(counter.load(Ordering::SeqCst), published);
}

// ============================================================================
// Reader / writer storms
// ============================================================================

#[test]
#[cfg_attr(miri, ignore)]
fn readers_and_writers_with_reclaimer_leak_nothing() {
    const READERS: usize = 4;
    const WRITERS: u64 = 2;
    const PUBLISHES: u64 = 2_000;
    const READS: usize = 10_000;

    let counter = Arc::new(AtomicUsize::new(0));
    let reclaimer = Arc::new(Reclaimer::with_options(true, Duration::from_millis(1)));
    let cell = Arc::new(Mirror::with_reclaimer(
        Some(Arc::new(Counted::new(0, counter.clone()))),
        reclaimer.clone(),
    ));

    let mut handles = Vec::new();
    for _ in 0..READERS {
        let cell = cell.clone();
        handles.push(thread::spawn(move || {
            let mut sum = 0u64;
            for _ in 0..READS {
                let snap = cell.load();
                if let Some(value) = snap.get() {
                    sum = sum.wrapping_add(value.value);
                }
            }
            sum
        }));
    }
    for tid in 0..WRITERS {
        let cell = cell.clone();
        let counter = counter.clone();
        handles.push(thread::spawn(move || {
            for i in 0..PUBLISHES {
                cell.update(Some(Arc::new(Counted::new(
                    tid * PUBLISHES + i,
                    counter.clone(),
                ))));
            }
            0
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // Tear everything down: slots die with the cell, the queue drains on
    // reclaimer drop. After that, every value ever published is gone.
    drop(cell);
    drop(reclaimer);

    let published = (WRITERS * PUBLISHES) as usize + 1;
    assert_eq!(counter.load(Ordering::SeqCst), published);
}

#[test]
#[cfg_attr(miri, ignore)]
fn sustained_reads_during_publish_bursts() {
    const READERS: usize = 4;
    const PUBLISHES: u64 = 5_000;

    let cell = Arc::new(Mirror::from_value(0u64));
    let mut handles = Vec::new();

    for _ in 0..READERS {
        let cell = cell.clone();
        handles.push(thread::spawn(move || {
            let mut last = 0u64;
            loop {
                let seen = *cell.load();
                assert!(seen >= last, "went backwards: {seen} after {last}");
                last = seen;
                if seen == PUBLISHES {
                    break;
                }
            }
        }));
    }

    for i in 1..=PUBLISHES {
        cell.update(Some(Arc::new(i)));
    }

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn pinned_scopes_stay_stable_under_publish_storm() {
    const ITERATIONS: usize = 2_000;

    let cell = Arc::new(Mirror::from_value(vec![0u64; 3]));
    let stop = Arc::new(AtomicUsize::new(0));

    let writer = {
        let cell = cell.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            let mut round = 0u64;
            while stop.load(Ordering::Acquire) == 0 {
                round += 1;
                cell.update(Some(Arc::new(vec![round; 3])));
            }
        })
    };

    for _ in 0..ITERATIONS {
        let outer = cell.load();
        // Everything read inside this scope must be the same vector,
        // publishes notwithstanding.
        let nested = cell.load();
        assert_eq!(&*nested, &*outer);
        assert_eq!(nested[0], nested[2]);
    }

    stop.store(1, Ordering::Release);
    writer.join().unwrap();
}
