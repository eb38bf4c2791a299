//! Forcing semantics: laziness, caching, nesting and failure retry.

use awaitable::{Await, Error, Mode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn counted<T: Clone + Send + Sync + 'static>(value: T) -> (Await<T>, Arc<AtomicUsize>) {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let aw = Await::call(
        "counted",
        move |v: T| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(v)
        },
        value,
    );
    (aw, runs)
}

#[test]
fn force_equals_direct_call() {
    let foo = |x: i64| -> Result<i64, Error> { Ok(x + 13) };
    let aw: Await<i64> = Await::call("foo", foo, 13);
    assert_eq!(aw.args::<i64>(), Some(&13));
    assert_eq!(aw.producer_name(), Some("foo"));
    assert_eq!(aw.force(), foo(13));
}

#[test]
fn producer_runs_at_most_once() {
    let (aw, runs) = counted(vec![1, 2, 3]);
    let first = aw.force().unwrap();
    let second = aw.force().unwrap();
    assert_eq!(first, second);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(aw.stats().requests, 2);
    assert_eq!(aw.stats().producer_runs, 1);
}

#[test]
fn nowait_has_no_producer() {
    let nw: Await<i64> = Await::nowait(33);
    assert_eq!(nw.mode(), Mode::Ready);
    assert_eq!(nw.producer_name(), None);
    assert_eq!(nw.args::<(i64,)>(), Some(&(33,)));
    assert_eq!(nw.args::<i64>(), None);
    assert_eq!(nw.force(), Ok(33));
}

#[test]
fn nested_awaits_need_two_forces() {
    let outer: Await<Await<i64>> =
        Await::call("delayed", |x: i64| Ok(Await::nowait(x * 2)), 21);

    let inner = outer.force().unwrap();
    assert!(outer.is_forced());
    assert_eq!(inner.force(), Ok(42));

    let again = outer.force().unwrap();
    assert!(again.same(&inner));
}

#[test]
fn nested_inner_stays_lazy() {
    let (inner, runs) = counted(7_i64);
    let outer: Await<Await<i64>> = Await::nowait(inner);

    let forced_once = outer.force().unwrap();
    assert!(!forced_once.is_forced());
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(forced_once.force(), Ok(7));
}

#[test]
fn failed_force_is_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let aw: Await<i64> = Await::from_fn("flaky", move || {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(Error::producer("not yet"))
        } else {
            Ok(5)
        }
    });

    assert_eq!(aw.force(), Err(Error::producer("not yet")));
    assert!(!aw.is_forced());
    assert_eq!(aw.peek(), None);
    assert_eq!(aw.force(), Ok(5));
    assert_eq!(aw.force(), Ok(5));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(aw.stats().failures, 1);
}

#[test]
fn producer_error_type_is_unchanged() {
    #[derive(Debug, Clone, PartialEq)]
    struct Custom(&'static str);

    let aw: Await<i64, Custom> = Await::from_fn("boom", || Err(Custom("boom")));
    assert_eq!(aw.force(), Err(Custom("boom")));
}

#[test]
fn opaque_values_are_never_inspected() {
    // Self-referential shape: nothing about it needs to be describable.
    struct Tree {
        parent: Option<Arc<Tree>>,
        v: i64,
    }

    let aw: Await<Arc<Tree>> = Await::call(
        "delayed",
        |t: Arc<Tree>| {
            Ok(Arc::new(Tree {
                parent: Some(Arc::clone(&t)),
                v: t.v + 1,
            }))
        },
        Arc::new(Tree { parent: None, v: 2 }),
    );
    let t = aw.force().unwrap();
    assert_eq!(t.v, 3);
    assert_eq!(t.parent.as_ref().map(|p| p.v), Some(2));
}
