//! Errors raised while compiling or evaluating scripts.

use awaitable::{MemberNotFound, TypeConstraintError};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptError {
    TypeConstraint(TypeConstraintError),
    MemberNotFound(MemberNotFound),
    UnknownFunction(String),
    UnknownClass(String),
    UnknownVariable(String),
    /// The class cannot be described statically (e.g. it refers to itself).
    NotScriptable { class: String },
    Arity {
        callee: String,
        expected: usize,
        found: usize,
    },
    /// A builtin kernel got operands it has no rule for.
    InvalidOperand { op: String, found: String },
    Assertion(String),
}

impl ScriptError {
    pub fn type_constraint(
        context: impl Into<String>,
        expected: impl fmt::Display,
        found: impl fmt::Display,
    ) -> Self {
        ScriptError::TypeConstraint(TypeConstraintError::new(context, expected, found))
    }

    pub fn invalid_operand(op: impl Into<String>, found: impl fmt::Display) -> Self {
        ScriptError::InvalidOperand {
            op: op.into(),
            found: found.to_string(),
        }
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::TypeConstraint(err) => write!(f, "type error: {err}"),
            ScriptError::MemberNotFound(err) => write!(f, "{err}"),
            ScriptError::UnknownFunction(name) => write!(f, "unknown function '{name}'"),
            ScriptError::UnknownClass(name) => write!(f, "unknown class '{name}'"),
            ScriptError::UnknownVariable(name) => write!(f, "unknown variable '{name}'"),
            ScriptError::NotScriptable { class } => {
                write!(f, "class '{class}' cannot be compiled, use it eagerly")
            }
            ScriptError::Arity {
                callee,
                expected,
                found,
            } => write!(
                f,
                "'{callee}' takes {expected} argument(s) but {found} were given"
            ),
            ScriptError::InvalidOperand { op, found } => {
                write!(f, "'{op}' is not defined for {found}")
            }
            ScriptError::Assertion(message) => write!(f, "assertion failed: {message}"),
        }
    }
}

impl std::error::Error for ScriptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScriptError::TypeConstraint(err) => Some(err),
            ScriptError::MemberNotFound(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MemberNotFound> for ScriptError {
    fn from(err: MemberNotFound) -> Self {
        ScriptError::MemberNotFound(err)
    }
}

impl From<TypeConstraintError> for ScriptError {
    fn from(err: TypeConstraintError) -> Self {
        ScriptError::TypeConstraint(err)
    }
}

pub type Result<T, E = ScriptError> = std::result::Result<T, E>;
