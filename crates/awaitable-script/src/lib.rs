//! A small dynamic host for deferred values.
//!
//! Programs are expression trees over script functions, native functions,
//! classes and opaque numeric builtins. They run eagerly through the
//! [`Evaluator`], or are checked and lowered by the [`Compiler`] first, or are
//! recorded into straight-line programs by the [`tracer`]. In all three paths
//! `awaitable(f, args)` creates an [`awaitable::Await`] whose producer
//! re-enters the evaluator.

pub mod ast;
pub mod builtins;
pub mod compiler;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod module;
pub mod object;
pub mod scenarios;
pub mod test_harness;
pub mod tracer;
pub mod types;
pub mod value;

pub use ast::{AstBuilder, Expr, ExprId, ExprKind, ExprTag, Literal};
pub use compiler::{CompiledModule, Compiler};
pub use config::Config;
pub use error::{Result, ScriptError};
pub use evaluator::{CallArgs, Evaluator, Program};
pub use module::{Function, Module, Param, ScriptFunction};
pub use object::{Class, Object};
pub use scenarios::{Check, Scenario};
pub use test_harness::{Harness, Report};
pub use tracer::{Trace, TraceRecorder};
pub use types::Type;
pub use value::{AwaitValue, DType, Tensor, Value};
