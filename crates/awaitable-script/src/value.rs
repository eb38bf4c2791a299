//! Runtime values of the script host.
//!
//! Aggregates are `Arc`-backed so `Clone` is O(1). Tensors are flat `f64`
//! buffers tagged with a dtype; the kernels that operate on them live in
//! `builtins` and are treated as opaque.

use crate::error::{Result, ScriptError};
use crate::object::Object;
use crate::types::Type;
use awaitable::{Await, Members};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// An await whose eventual value is a script value.
pub type AwaitValue = Await<Value, ScriptError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    Float32,
    Int64,
}

impl DType {
    pub fn name(self) -> &'static str {
        match self {
            DType::Float32 => "float32",
            DType::Int64 => "int64",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    data: Arc<[f64]>,
    dtype: DType,
}

impl Tensor {
    pub fn new(data: impl Into<Arc<[f64]>>, dtype: DType) -> Self {
        Self {
            data: data.into(),
            dtype,
        }
    }

    pub fn full(len: usize, value: f64, dtype: DType) -> Self {
        Self::new(vec![value; len], dtype)
    }

    pub fn zeros(len: usize) -> Self {
        Self::full(len, 0.0, DType::Float32)
    }

    pub fn ones(len: usize) -> Self {
        Self::full(len, 1.0, DType::Float32)
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self::new(self.data.iter().map(|&x| f(x)).collect::<Vec<_>>(), self.dtype)
    }

    /// Elementwise combination; a one-element side broadcasts.
    pub fn zip_with(&self, other: &Tensor, f: impl Fn(f64, f64) -> f64) -> Option<Self> {
        let dtype = if self.dtype == DType::Int64 && other.dtype == DType::Int64 {
            DType::Int64
        } else {
            DType::Float32
        };
        let data: Vec<f64> = match (self.numel(), other.numel()) {
            (a, b) if a == b => self.data.iter().zip(other.data.iter()).map(|(&x, &y)| f(x, y)).collect(),
            (_, 1) => self.data.iter().map(|&x| f(x, other.data[0])).collect(),
            (1, _) => other.data.iter().map(|&y| f(self.data[0], y)).collect(),
            _ => return None,
        };
        Some(Self::new(data, dtype))
    }

    pub fn allclose(&self, other: &Tensor) -> bool {
        self.numel() == other.numel()
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(&a, &b)| close(a, b))
    }
}

fn close(a: f64, b: f64) -> bool {
    const RTOL: f64 = 1e-5;
    const ATOL: f64 = 1e-8;
    (a - b).abs() <= ATOL + RTOL * b.abs()
}

#[derive(Clone, Debug)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(Arc<str>),
    Tensor(Tensor),
    Tuple(Arc<[Value]>),
    List(Arc<Vec<Value>>),
    Object(Object),
    Await(AwaitValue),
}

impl Value {
    pub fn text(s: impl Into<Arc<str>>) -> Self {
        Value::Text(s.into())
    }

    pub fn tuple(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Tuple(items.into_iter().collect())
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(Arc::new(items.into_iter().collect()))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Value::Tensor(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_await(&self) -> Option<&AwaitValue> {
        match self {
            Value::Await(aw) => Some(aw),
            _ => None,
        }
    }

    pub fn is_await(&self) -> bool {
        matches!(self, Value::Await(_))
    }

    /// Dynamic type. An unforced await reports `Await[Any]`.
    pub fn type_of(&self) -> Type {
        match self {
            Value::Unit => Type::Unit,
            Value::Bool(_) => Type::Bool,
            Value::Int(_) => Type::Int,
            Value::Float(_) => Type::Float,
            Value::Text(_) => Type::Text,
            Value::Tensor(_) => Type::Tensor,
            Value::Tuple(items) => Type::Tuple(items.iter().map(Value::type_of).collect()),
            Value::List(items) => {
                Type::list_of(items.first().map(Value::type_of).unwrap_or(Type::Any))
            }
            Value::Object(o) => Type::class(o.class().name()),
            Value::Await(aw) => Type::await_of(aw.peek().map(|v| v.type_of()).unwrap_or(Type::Any)),
        }
    }

    /// Numeric comparison with tolerance; objects compare field by field and
    /// awaits only by identity. Object graphs may be cyclic.
    pub fn allclose(&self, other: &Value) -> bool {
        self.allclose_in(other, &mut Vec::new())
    }

    fn allclose_in(&self, other: &Value, visiting: &mut Vec<(usize, usize)>) -> bool {
        let all = |a: &[Value], b: &[Value], visiting: &mut Vec<(usize, usize)>| {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.allclose_in(y, visiting))
        };
        match (self, other) {
            (Value::Tensor(a), Value::Tensor(b)) => a.allclose(b),
            (Value::Float(a), Value::Float(b)) => close(*a, *b),
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => close(*a as f64, *b),
            (Value::Tuple(a), Value::Tuple(b)) => all(a, b, visiting),
            (Value::List(a), Value::List(b)) => all(a, b, visiting),
            (Value::Object(a), Value::Object(b)) => {
                if a.same(b) {
                    return true;
                }
                // A pair already under comparison is assumed equal; any
                // difference shows up where the cycle started.
                let pair = (a.addr(), b.addr());
                if visiting.contains(&pair) {
                    return true;
                }
                if a.class().name() != b.class().name() {
                    return false;
                }
                visiting.push(pair);
                let (fa, fb) = (a.fields(), b.fields());
                let equal = fa.len() == fb.len()
                    && fa
                        .iter()
                        .zip(&fb)
                        .all(|((na, va), (nb, vb))| na == nb && va.allclose_in(vb, visiting));
                visiting.pop();
                equal
            }
            _ => self == other,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Tensor(a), Value::Tensor(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.same(b),
            (Value::Await(a), Value::Await(b)) => a.same(b),
            _ => false,
        }
    }
}

impl From<Tensor> for Value {
    fn from(t: Tensor) -> Self {
        Value::Tensor(t)
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

impl From<AwaitValue> for Value {
    fn from(aw: AwaitValue) -> Self {
        Value::Await(aw)
    }
}

impl Members for Value {
    type Member = Value;
    type Error = ScriptError;

    fn type_name(&self) -> Cow<'_, str> {
        Cow::Owned(self.type_of().to_string())
    }

    fn get_field(&self, name: &str) -> Option<Value> {
        match self {
            Value::Object(o) => o.get(name),
            Value::Tensor(t) => match name {
                "dtype" => Some(Value::text(t.dtype().name())),
                "numel" => Some(Value::Int(t.numel() as i64)),
                _ => None,
            },
            _ => None,
        }
    }

    fn call_method(&self, name: &str, args: &[Value]) -> Option<Result<Value>> {
        match self {
            Value::Object(o) => o.call_method(name, args),
            Value::Tensor(t) if name == "sum" => Some(Ok(Value::Float(t.data().iter().sum()))),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v:?}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Tensor(t) => {
                write!(f, "tensor([")?;
                for (index, x) in t.data().iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    match t.dtype() {
                        DType::Int64 => write!(f, "{}", *x as i64)?,
                        DType::Float32 => write!(f, "{x:.4}")?,
                    }
                }
                write!(f, "], dtype={})", t.dtype().name())
            }
            Value::Tuple(items) => {
                write!(f, "(")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Value::List(items) => {
                write!(f, "[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Object(o) => write!(f, "<{} object>", o.class().name()),
            Value::Await(aw) => match aw.producer_name() {
                Some(producer) => write!(f, "<{} of {producer}>", aw.id()),
                None => write!(f, "<{} nowait>", aw.id()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Class;

    #[test]
    fn tensor_broadcasts_scalars() {
        let t = Tensor::new(vec![1.0, 2.0], DType::Int64);
        let two = Tensor::new(vec![2.0], DType::Int64);
        let product = t.zip_with(&two, |a, b| a * b).unwrap();
        assert_eq!(product.data(), &[2.0, 4.0]);
        assert_eq!(product.dtype(), DType::Int64);
        assert!(t.zip_with(&Tensor::zeros(3), |a, b| a + b).is_none());
    }

    #[test]
    fn allclose_on_cyclic_objects() {
        let node = Arc::new(
            Class::new("Tree")
                .field("parent", Type::Any)
                .field("v", Type::Int)
                .opaque(),
        );
        let cyclic = |v: i64| {
            let tree = node.instantiate(vec![Value::Unit, Value::Int(v)]).unwrap();
            tree.set("parent", Value::Object(tree.clone())).unwrap();
            Value::Object(tree)
        };
        let (a, b, c) = (cyclic(1), cyclic(1), cyclic(2));
        assert!(a.allclose(&b));
        assert!(!a.allclose(&c));
        assert!(a.allclose(&a));
    }

    #[test]
    fn tensor_members() {
        let t = Value::Tensor(Tensor::new(vec![1.0, 1.0], DType::Int64));
        assert_eq!(t.get_field("dtype"), Some(Value::text("int64")));
        assert_eq!(t.get_field("shape"), None);
    }

    #[test]
    fn display() {
        assert_eq!(Value::Tensor(Tensor::ones(2)).to_string(), "tensor([1.0000, 1.0000], dtype=float32)");
        assert_eq!(Value::tuple([Value::Int(33)]).to_string(), "(33,)");
    }
}
