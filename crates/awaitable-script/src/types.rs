//! Static types used by the compiler.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// Unknown or dynamic; compatible with everything.
    Any,
    Unit,
    Bool,
    Int,
    Float,
    Text,
    Tensor,
    Tuple(Vec<Type>),
    List(Box<Type>),
    /// Instance of a named class
    Class(String),
    Await(Box<Type>),
}

impl Type {
    pub fn await_of(inner: Type) -> Self {
        Type::Await(Box::new(inner))
    }

    pub fn list_of(item: Type) -> Self {
        Type::List(Box::new(item))
    }

    pub fn class(name: impl Into<String>) -> Self {
        Type::Class(name.into())
    }

    /// The type an await of this type resolves to.
    pub fn awaited(&self) -> Option<&Type> {
        match self {
            Type::Await(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn is_await(&self) -> bool {
        matches!(self, Type::Await(_))
    }

    /// Whether a value inferred as `found` may be bound where `self` is declared.
    pub fn accepts(&self, found: &Type) -> bool {
        match (self, found) {
            (Type::Any, _) | (_, Type::Any) => true,
            (Type::Await(declared), Type::Await(found)) => declared.accepts(found),
            (Type::List(declared), Type::List(found)) => declared.accepts(found),
            (Type::Tuple(declared), Type::Tuple(found)) => {
                declared.len() == found.len()
                    && declared.iter().zip(found).all(|(d, f)| d.accepts(f))
            }
            _ => self == found,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Any => write!(f, "Any"),
            Type::Unit => write!(f, "None"),
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::Text => write!(f, "str"),
            Type::Tensor => write!(f, "Tensor"),
            Type::Tuple(items) => {
                write!(f, "Tuple[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Type::List(item) => write!(f, "List[{item}]"),
            Type::Class(name) => write!(f, "{name}"),
            Type::Await(inner) => write!(f, "Await[{inner}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_nested_await() {
        let ty = Type::await_of(Type::await_of(Type::Tensor));
        assert_eq!(ty.to_string(), "Await[Await[Tensor]]");
        assert_eq!(Type::list_of(Type::await_of(Type::Tensor)).to_string(), "List[Await[Tensor]]");
    }

    #[test]
    fn await_is_covariant() {
        let declared = Type::await_of(Type::Any);
        assert!(declared.accepts(&Type::await_of(Type::Tensor)));
        assert!(!Type::await_of(Type::Int).accepts(&Type::await_of(Type::Tensor)));
        assert!(!Type::await_of(Type::Int).accepts(&Type::Int));
    }
}
