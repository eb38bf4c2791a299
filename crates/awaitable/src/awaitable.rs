//! The deferred value itself.
//!
//! An [`Await`] is either bound to a producer and its argument tuple, or
//! built already resolved ("no-wait"). Forcing runs the producer at most once
//! successfully and caches the result; every later force clones the cached
//! value. Handles are shared: cloning an `Await` clones the `Arc`, not the
//! state.

use crate::error::Error;
use crate::trace::{CallSite, Tracer};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

static NEXT_AWAIT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one deferred value instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AwaitId(u64);

impl AwaitId {
    fn next() -> Self {
        Self(NEXT_AWAIT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AwaitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "await#{}", self.0)
    }
}

/// Lifecycle state. `Ready` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    ProducerBound,
    Ready,
}

/// Counters kept per instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForceStats {
    /// Force operations requested, including implicit ones from member access.
    pub requests: u64,
    /// Times the producer was actually invoked.
    pub producer_runs: u64,
    /// Producer invocations that returned an error.
    pub failures: u64,
}

type ProducerFn<T, E> = dyn Fn() -> Result<T, E> + Send + Sync;

struct Producer<T, E> {
    name: Arc<str>,
    run: Arc<ProducerFn<T, E>>,
}

impl<T, E> Clone for Producer<T, E> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            run: Arc::clone(&self.run),
        }
    }
}

enum Slot<T, E> {
    Pending(Producer<T, E>),
    /// Producer started on a worker thread at construction.
    Running {
        producer: Producer<T, E>,
        worker: Option<JoinHandle<Result<T, E>>>,
    },
    Ready(T),
}

enum Step<T, E> {
    Cached(T),
    Run(Producer<T, E>),
    Join(Producer<T, E>, JoinHandle<Result<T, E>>),
}

struct Shared<T, E> {
    id: AwaitId,
    producer_name: Option<Arc<str>>,
    args: Arc<dyn Any + Send + Sync>,
    slot: Mutex<Slot<T, E>>,
    forced: AtomicBool,
    requests: AtomicU64,
    producer_runs: AtomicU64,
    failures: AtomicU64,
}

/// A value of type `T` that may not exist yet.
///
/// `E` is the producer's error type; it is returned from [`Await::force`]
/// unchanged.
pub struct Await<T, E = Error> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Clone for Await<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: 'static, E: 'static> Await<T, E> {
    /// Binds `producer` to `args` without invoking it.
    pub fn call<A, F>(name: impl Into<Arc<str>>, producer: F, args: A) -> Self
    where
        A: Clone + Send + Sync + 'static,
        F: Fn(A) -> Result<T, E> + Send + Sync + 'static,
    {
        let stored = Arc::new(args);
        let captured = Arc::clone(&stored);
        let run: Arc<ProducerFn<T, E>> = Arc::new(move || producer((*captured).clone()));
        Self::bound(
            Producer {
                name: name.into(),
                run,
            },
            stored,
        )
    }

    /// Binds a producer that takes no arguments.
    pub fn from_fn<F>(name: impl Into<Arc<str>>, producer: F) -> Self
    where
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
    {
        Self::call(name, move |()| producer(), ())
    }

    /// Builds an already resolved value. Its stored arguments are `(value,)`.
    pub fn nowait(value: T) -> Self
    where
        T: Clone + Send + Sync,
    {
        let args: Arc<dyn Any + Send + Sync> = Arc::new((value.clone(),));
        Self {
            shared: Arc::new(Shared {
                id: AwaitId::next(),
                producer_name: None,
                args,
                slot: Mutex::new(Slot::Ready(value)),
                forced: AtomicBool::new(true),
                requests: AtomicU64::new(0),
                producer_runs: AtomicU64::new(0),
                failures: AtomicU64::new(0),
            }),
        }
    }

    /// Like [`Await::call`], but starts the producer on a worker thread
    /// immediately. `force` joins the worker.
    pub fn spawn<A, F>(name: impl Into<Arc<str>>, producer: F, args: A) -> Self
    where
        A: Clone + Send + Sync + 'static,
        F: Fn(A) -> Result<T, E> + Send + Sync + 'static,
        T: Send,
        E: Send,
    {
        let this = Self::call(name, producer, args);
        this.start_worker();
        this
    }

    fn bound(producer: Producer<T, E>, args: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: AwaitId::next(),
                producer_name: Some(Arc::clone(&producer.name)),
                args,
                slot: Mutex::new(Slot::Pending(producer)),
                forced: AtomicBool::new(false),
                requests: AtomicU64::new(0),
                producer_runs: AtomicU64::new(0),
                failures: AtomicU64::new(0),
            }),
        }
    }

    fn start_worker(&self)
    where
        T: Send,
        E: Send,
    {
        let mut slot = self.lock();
        let Slot::Pending(producer) = &*slot else {
            return;
        };
        let producer = producer.clone();
        let run = Arc::clone(&producer.run);
        let spawned = std::thread::Builder::new()
            .name(format!("{}-{}", self.shared.id, producer.name))
            .spawn(move || run());
        match spawned {
            Ok(worker) => {
                self.shared.producer_runs.fetch_add(1, Ordering::Relaxed);
                log::debug!("{}: producer '{}' started on worker", self.shared.id, producer.name);
                *slot = Slot::Running {
                    producer,
                    worker: Some(worker),
                };
            }
            Err(err) => {
                log::warn!(
                    "{}: could not start worker ({err}), producer will run on force",
                    self.shared.id
                );
            }
        }
    }
}

impl<T, E> Await<T, E> {
    /// Resolves the value, running the producer if it has not succeeded yet.
    ///
    /// A failed producer leaves the value unforced; the next call retries.
    /// The producer must not force the same instance it produces.
    pub fn force(&self) -> Result<T, E>
    where
        T: Clone,
    {
        self.shared.requests.fetch_add(1, Ordering::Relaxed);
        let mut slot = self.lock();

        let step = match &mut *slot {
            Slot::Ready(value) => Step::Cached(value.clone()),
            Slot::Pending(producer) => Step::Run(producer.clone()),
            Slot::Running { producer, worker } => match worker.take() {
                Some(handle) => Step::Join(producer.clone(), handle),
                None => Step::Run(producer.clone()),
            },
        };

        let (producer, outcome) = match step {
            Step::Cached(value) => {
                log::trace!("{}: cached", self.shared.id);
                return Ok(value);
            }
            Step::Run(producer) => {
                self.shared.producer_runs.fetch_add(1, Ordering::Relaxed);
                log::debug!("{}: running producer '{}'", self.shared.id, producer.name);
                let outcome = (producer.run)();
                (producer, outcome)
            }
            Step::Join(producer, handle) => match handle.join() {
                Ok(outcome) => (producer, outcome),
                Err(payload) => {
                    *slot = Slot::Pending(producer);
                    drop(slot);
                    std::panic::resume_unwind(payload);
                }
            },
        };

        match outcome {
            Ok(value) => {
                *slot = Slot::Ready(value.clone());
                self.shared.forced.store(true, Ordering::Release);
                Ok(value)
            }
            Err(err) => {
                self.shared.failures.fetch_add(1, Ordering::Relaxed);
                log::debug!(
                    "{}: producer '{}' failed, value stays unforced",
                    self.shared.id,
                    producer.name
                );
                *slot = Slot::Pending(producer);
                Err(err)
            }
        }
    }

    /// The cached value, without forcing.
    ///
    /// Never waits for a producer that another thread is running: until the
    /// value is ready this returns `None` without touching the slot.
    pub fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        if !self.is_forced() {
            return None;
        }
        match &*self.lock() {
            Slot::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn id(&self) -> AwaitId {
        self.shared.id
    }

    pub fn is_forced(&self) -> bool {
        self.shared.forced.load(Ordering::Acquire)
    }

    /// Built with [`Await::nowait`].
    pub fn is_nowait(&self) -> bool {
        self.shared.producer_name.is_none()
    }

    pub fn mode(&self) -> Mode {
        if self.is_forced() {
            Mode::Ready
        } else {
            Mode::ProducerBound
        }
    }

    /// Producer identity; `None` for no-wait values.
    pub fn producer_name(&self) -> Option<&str> {
        self.shared.producer_name.as_deref()
    }

    /// The stored argument tuple, if it has type `A`.
    pub fn args<A: 'static>(&self) -> Option<&A> {
        (*self.shared.args).downcast_ref::<A>()
    }

    pub fn stats(&self) -> ForceStats {
        ForceStats {
            requests: self.shared.requests.load(Ordering::Relaxed),
            producer_runs: self.shared.producer_runs.load(Ordering::Relaxed),
            failures: self.shared.failures.load(Ordering::Relaxed),
        }
    }

    /// Both handles point at the same instance.
    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub fn call_site(&self) -> CallSite<'_> {
        CallSite {
            id: self.shared.id,
            producer: self.producer_name(),
            nowait: self.is_nowait(),
            forced: self.is_forced(),
        }
    }

    /// Lets a tracer record this value as a call node instead of a concrete
    /// result. Does not force.
    pub fn wrap<R: Tracer>(&self, tracer: &mut R) -> R::Node {
        log::trace!("{}: handed to tracer", self.shared.id);
        let args: &dyn Any = &*self.shared.args;
        tracer.wrap(self.call_site(), args)
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T, E>> {
        // A panicking producer leaves the slot untouched, so the state behind
        // a poisoned lock is still consistent.
        self.shared
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T, E> fmt::Debug for Await<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Await")
            .field("id", &self.shared.id)
            .field("producer", &self.shared.producer_name)
            .field("mode", &self.mode())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn call_is_lazy() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let aw: Await<i64> = Await::call(
            "foo",
            move |x: i64| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(x + 13)
            },
            13,
        );

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(aw.mode(), Mode::ProducerBound);
        assert_eq!(aw.force(), Ok(26));
        assert_eq!(aw.force(), Ok(26));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(aw.mode(), Mode::Ready);
    }

    #[test]
    fn nowait_is_forced_immediately() {
        let nw: Await<i64> = Await::nowait(33);
        assert!(nw.is_forced());
        assert!(nw.is_nowait());
        assert_eq!(nw.args::<(i64,)>(), Some(&(33,)));
        assert_eq!(nw.force(), Ok(33));
        assert_eq!(nw.stats().producer_runs, 0);
    }

    #[test]
    fn clones_share_state() {
        let aw: Await<String> = Await::from_fn("hello", || Ok("hi".to_string()));
        let other = aw.clone();
        assert!(aw.same(&other));
        other.force().unwrap();
        assert!(aw.is_forced());
        assert_eq!(aw.peek().as_deref(), Some("hi"));
    }
}
