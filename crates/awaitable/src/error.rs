//! Error kinds raised by the deferred value engine.
//!
//! Producer failures are never wrapped: `Await::force` returns whatever error
//! type the producer returns. The types here cover the failures the engine
//! itself (or a host built on top of it) detects.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a missing member was read as a field or called as a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberKind {
    Field,
    Method,
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberKind::Field => write!(f, "field"),
            MemberKind::Method => write!(f, "method"),
        }
    }
}

/// Proxy access to a field or method the forced value does not have.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberNotFound {
    pub type_name: String,
    pub member: String,
    pub kind: MemberKind,
}

impl MemberNotFound {
    pub fn field(type_name: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            member: member.into(),
            kind: MemberKind::Field,
        }
    }

    pub fn method(type_name: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            member: member.into(),
            kind: MemberKind::Method,
        }
    }
}

impl fmt::Display for MemberNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' has no {} named '{}'",
            self.type_name, self.kind, self.member
        )
    }
}

impl std::error::Error for MemberNotFound {}

/// Declared and actual producer types disagree.
///
/// Raised where a host enforces static types; plain Rust callers get this
/// check from the compiler instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeConstraintError {
    /// Where the check happened, e.g. the binding or function name.
    pub context: String,
    pub expected: String,
    pub found: String,
}

impl TypeConstraintError {
    pub fn new(
        context: impl Into<String>,
        expected: impl fmt::Display,
        found: impl fmt::Display,
    ) -> Self {
        Self {
            context: context.into(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

impl fmt::Display for TypeConstraintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: expected {} but found {}",
            self.context, self.expected, self.found
        )
    }
}

impl std::error::Error for TypeConstraintError {}

/// Default error type for awaits that do not bring their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    TypeConstraint(TypeConstraintError),
    MemberNotFound(MemberNotFound),
    /// A producer failed with a plain message.
    Producer(String),
}

impl Error {
    pub fn producer(message: impl Into<String>) -> Self {
        Error::Producer(message.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TypeConstraint(err) => write!(f, "type constraint violated: {err}"),
            Error::MemberNotFound(err) => write!(f, "member not found: {err}"),
            Error::Producer(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::TypeConstraint(err) => Some(err),
            Error::MemberNotFound(err) => Some(err),
            Error::Producer(_) => None,
        }
    }
}

impl From<MemberNotFound> for Error {
    fn from(err: MemberNotFound) -> Self {
        Error::MemberNotFound(err)
    }
}

impl From<TypeConstraintError> for Error {
    fn from(err: TypeConstraintError) -> Self {
        Error::TypeConstraint(err)
    }
}
