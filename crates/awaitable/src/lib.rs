//! Deferred values.
//!
//! An [`Await<T>`] holds a value that is produced lazily: it is created bound
//! to a producer and its arguments ([`Await::call`]) or already resolved
//! ([`Await::nowait`]), and [`Await::force`] resolves it, running the
//! producer at most once successfully. Awaits nest (`Await<Await<U>>` needs
//! two forces), forward member access to their eventual value
//! ([`Members`]), and expose their producer and arguments to external
//! tracers ([`Tracer`]).
//!
//! ```
//! use awaitable::Await;
//!
//! let aw: Await<i64> = Await::call("foo", |x: i64| Ok(x + 13), 13);
//! assert!(!aw.is_forced());
//! assert_eq!(aw.force(), Ok(26));
//! ```

mod awaitable;
mod error;
mod members;
mod trace;

pub use awaitable::{Await, AwaitId, ForceStats, Mode};
pub use error::{Error, MemberKind, MemberNotFound, TypeConstraintError};
pub use members::Members;
pub use trace::{CallRecorder, CallSite, RecordedCall, Tracer};
