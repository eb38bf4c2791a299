//! Hook for external tracers.
//!
//! When a deferred value crosses a traced function boundary the tracer wants
//! a symbolic call node, not the concrete result. The engine does no tracing;
//! it only exposes what a tracer needs to record the call.

use crate::awaitable::AwaitId;
use serde::{Deserialize, Serialize};
use std::any::Any;

/// What a tracer sees of a deferred value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallSite<'a> {
    pub id: AwaitId,
    /// `None` for no-wait values.
    pub producer: Option<&'a str>,
    pub nowait: bool,
    pub forced: bool,
}

/// Implemented by tracers that record deferred values.
///
/// `args` is the stored argument tuple of concrete values; the tracer
/// downcasts it to the type it knows the producer takes. A tracer that
/// tracks symbolic values of its own (nodes for each argument) supplies
/// them itself and can use `args` for anything it did not trace.
pub trait Tracer {
    type Node;

    fn wrap(&mut self, site: CallSite<'_>, args: &dyn Any) -> Self::Node;
}

/// Owned copy of a [`CallSite`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedCall {
    pub id: AwaitId,
    pub producer: Option<String>,
    pub nowait: bool,
}

/// Minimal tracer that only remembers which awaits crossed the boundary.
#[derive(Debug, Default)]
pub struct CallRecorder {
    calls: Vec<RecordedCall>,
}

impl CallRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &[RecordedCall] {
        &self.calls
    }
}

impl Tracer for CallRecorder {
    type Node = usize;

    fn wrap(&mut self, site: CallSite<'_>, _args: &dyn Any) -> usize {
        self.calls.push(RecordedCall {
            id: site.id,
            producer: site.producer.map(str::to_owned),
            nowait: site.nowait,
        });
        self.calls.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Await;

    #[test]
    fn recorder_sees_producer_and_args() {
        struct ArgsSeen(Option<(i64, i64)>);

        impl Tracer for ArgsSeen {
            type Node = ();

            fn wrap(&mut self, _site: CallSite<'_>, args: &dyn Any) {
                self.0 = args.downcast_ref::<(i64, i64)>().copied();
            }
        }

        let aw: Await<i64> = Await::call("add", |(a, b): (i64, i64)| Ok(a + b), (1, 2));
        let mut seen = ArgsSeen(None);
        aw.wrap(&mut seen);
        assert_eq!(seen.0, Some((1, 2)));

        let mut recorder = CallRecorder::new();
        let node = aw.wrap(&mut recorder);
        assert_eq!(node, 0);
        assert_eq!(recorder.calls()[0].producer.as_deref(), Some("add"));
        assert!(!aw.is_forced());
    }
}
