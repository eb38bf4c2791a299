//! Worker-backed awaits and concurrent forcing.

use awaitable::{Await, Error};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
fn concurrent_forces_run_producer_once() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let aw: Await<u64> = Await::from_fn("slow", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        Ok(99)
    });

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let aw = aw.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                aw.force()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), Ok(99));
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(aw.stats().requests, 8);
}

#[test]
fn spawned_producer_starts_before_force() {
    let started = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&started);
    let aw: Await<i64> = Await::spawn(
        "delayed",
        move |x: i64| {
            flag.store(1, Ordering::SeqCst);
            Ok(2 * (x + 1))
        },
        4,
    );

    for _ in 0..200 {
        if started.load(Ordering::SeqCst) == 1 {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(aw.force(), Ok(10));
    assert_eq!(aw.force(), Ok(10));
    assert_eq!(aw.stats().producer_runs, 1);
}

#[test]
fn spawned_failure_retries_inline() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let aw: Await<i64> = Await::spawn(
        "flaky",
        move |()| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::producer("first attempt fails"))
            } else {
                Ok(1)
            }
        },
        (),
    );

    assert!(aw.force().is_err());
    assert_eq!(aw.force(), Ok(1));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn panicking_producer_can_be_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let aw: Await<i64> = Await::from_fn("panics once", move || {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("first attempt panics");
        }
        Ok(3)
    });

    let forcing = aw.clone();
    let result = thread::spawn(move || forcing.force()).join();
    assert!(result.is_err());
    assert!(!aw.is_forced());
    assert_eq!(aw.force(), Ok(3));
}

#[test]
fn peek_does_not_wait_for_running_producer() {
    let started = Arc::new(AtomicBool::new(false));
    let release = Arc::new(AtomicBool::new(false));
    let (started_flag, release_flag) = (Arc::clone(&started), Arc::clone(&release));
    let aw: Await<u64> = Await::from_fn("gated", move || {
        started_flag.store(true, Ordering::SeqCst);
        for _ in 0..400 {
            if release_flag.load(Ordering::SeqCst) {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        Ok(7)
    });

    let forcing = {
        let aw = aw.clone();
        thread::spawn(move || aw.force())
    };
    while !started.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(1));
    }

    assert_eq!(aw.peek(), None);
    assert!(!release.load(Ordering::SeqCst));
    release.store(true, Ordering::SeqCst);

    assert_eq!(forcing.join().unwrap(), Ok(7));
    assert_eq!(aw.peek(), Some(7));
}
