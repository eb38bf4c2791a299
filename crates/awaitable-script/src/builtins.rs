//! Opaque numeric kernels.
//!
//! These stand in for the tensor library. Binary ops accept any mix of
//! ints, floats and tensors; a scalar operand broadcasts over a tensor.
//! `int op int` stays an int and an int64 tensor combined with an int stays
//! int64, everything else promotes to float.

use crate::error::{Result, ScriptError};
use crate::types::Type;
use crate::value::{DType, Tensor, Value};

/// How the static result type of a builtin is derived.
#[derive(Debug, Clone, Copy)]
pub enum Returns {
    Fixed(fn() -> Type),
    /// Numeric promotion over the operand types.
    Promote,
    /// Transcendental: tensors stay tensors, scalars become floats.
    Unary,
    /// The type of the first operand.
    First,
}

pub struct Builtin {
    pub name: &'static str,
    pub arity: usize,
    pub returns: Returns,
    kernel: fn(&[Value]) -> Result<Value>,
}

impl Builtin {
    pub fn invoke(&self, args: &[Value]) -> Result<Value> {
        if args.len() != self.arity {
            return Err(ScriptError::Arity {
                callee: self.name.to_string(),
                expected: self.arity,
                found: args.len(),
            });
        }
        (self.kernel)(args)
    }

    /// Static result type for the given operand types.
    pub fn result_type(&self, operands: &[Type]) -> Result<Type> {
        match self.returns {
            Returns::Fixed(ty) => Ok(ty()),
            Returns::First => Ok(operands.first().cloned().unwrap_or(Type::Any)),
            Returns::Promote => {
                let mut result = Type::Int;
                for operand in operands {
                    result = match (result, operand) {
                        (_, Type::Any) | (Type::Any, _) => Type::Any,
                        (_, Type::Tensor) | (Type::Tensor, _) => Type::Tensor,
                        (Type::Int, Type::Int) => Type::Int,
                        (_, Type::Int | Type::Float) => Type::Float,
                        (_, other) => return Err(ScriptError::invalid_operand(self.name, other)),
                    };
                }
                Ok(result)
            }
            Returns::Unary => match operands.first() {
                Some(Type::Tensor) => Ok(Type::Tensor),
                Some(Type::Any) => Ok(Type::Any),
                Some(Type::Int | Type::Float) => Ok(Type::Float),
                Some(other) => Err(ScriptError::invalid_operand(self.name, other)),
                None => Ok(Type::Any),
            },
        }
    }
}

pub static BUILTINS: &[Builtin] = &[
    Builtin {
        name: "zeros",
        arity: 1,
        returns: Returns::Fixed(|| Type::Tensor),
        kernel: |args| Ok(Tensor::zeros(length("zeros", &args[0])?).into()),
    },
    Builtin {
        name: "ones",
        arity: 1,
        returns: Returns::Fixed(|| Type::Tensor),
        kernel: |args| Ok(Tensor::ones(length("ones", &args[0])?).into()),
    },
    Builtin {
        name: "full",
        arity: 2,
        returns: Returns::Fixed(|| Type::Tensor),
        kernel: |args| {
            let len = length("full", &args[0])?;
            Ok(match &args[1] {
                Value::Int(v) => Tensor::full(len, *v as f64, DType::Int64),
                Value::Float(v) => Tensor::full(len, *v, DType::Float32),
                other => return Err(ScriptError::invalid_operand("full", other.type_of())),
            }
            .into())
        },
    },
    Builtin {
        name: "add",
        arity: 2,
        returns: Returns::Promote,
        kernel: |args| binary("add", &args[0], &args[1], i64::wrapping_add, |a, b| a + b),
    },
    Builtin {
        name: "sub",
        arity: 2,
        returns: Returns::Promote,
        kernel: |args| binary("sub", &args[0], &args[1], i64::wrapping_sub, |a, b| a - b),
    },
    Builtin {
        name: "mul",
        arity: 2,
        returns: Returns::Promote,
        kernel: |args| binary("mul", &args[0], &args[1], i64::wrapping_mul, |a, b| a * b),
    },
    Builtin {
        name: "sin",
        arity: 1,
        returns: Returns::Unary,
        kernel: |args| unary("sin", &args[0], f64::sin),
    },
    Builtin {
        name: "cos",
        arity: 1,
        returns: Returns::Unary,
        kernel: |args| unary("cos", &args[0], f64::cos),
    },
    Builtin {
        name: "relu",
        arity: 1,
        returns: Returns::First,
        kernel: |args| match &args[0] {
            Value::Tensor(t) => Ok(t.map(|x| x.max(0.0)).into()),
            Value::Int(v) => Ok(Value::Int((*v).max(0))),
            Value::Float(v) => Ok(Value::Float(v.max(0.0))),
            other => Err(ScriptError::invalid_operand("relu", other.type_of())),
        },
    },
    Builtin {
        name: "eq",
        arity: 2,
        returns: Returns::Fixed(|| Type::Bool),
        kernel: |args| Ok(Value::Bool(args[0] == args[1])),
    },
    Builtin {
        name: "append",
        arity: 2,
        returns: Returns::First,
        kernel: |args| match &args[0] {
            Value::List(items) => {
                let mut items = items.as_ref().clone();
                items.push(args[1].clone());
                Ok(Value::list(items))
            }
            other => Err(ScriptError::invalid_operand("append", other.type_of())),
        },
    },
];

pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|builtin| builtin.name == name)
}

/// Largest tensor the constructors will allocate.
pub const MAX_TENSOR_LEN: usize = 1 << 24;

fn length(op: &str, value: &Value) -> Result<usize> {
    match value {
        Value::Int(n) => match usize::try_from(*n) {
            Ok(len) if len <= MAX_TENSOR_LEN => Ok(len),
            _ => Err(ScriptError::invalid_operand(op, format!("length {n}"))),
        },
        other => Err(ScriptError::invalid_operand(op, other.type_of())),
    }
}

fn as_tensor(op: &str, value: &Value) -> Result<Tensor> {
    match value {
        Value::Tensor(t) => Ok(t.clone()),
        Value::Int(v) => Ok(Tensor::new(vec![*v as f64], DType::Int64)),
        Value::Float(v) => Ok(Tensor::new(vec![*v], DType::Float32)),
        other => Err(ScriptError::invalid_operand(op, other.type_of())),
    }
}

fn binary(
    op: &str,
    a: &Value,
    b: &Value,
    int: fn(i64, i64) -> i64,
    float: fn(f64, f64) -> f64,
) -> Result<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(int(*x, *y))),
        (Value::Int(x), Value::Float(y)) => Ok(Value::Float(float(*x as f64, *y))),
        (Value::Float(x), Value::Int(y)) => Ok(Value::Float(float(*x, *y as f64))),
        (Value::Float(x), Value::Float(y)) => Ok(Value::Float(float(*x, *y))),
        _ => {
            let (x, y) = (as_tensor(op, a)?, as_tensor(op, b)?);
            x.zip_with(&y, float).map(Value::Tensor).ok_or_else(|| {
                ScriptError::invalid_operand(
                    op,
                    format!("tensors of {} and {} elements", x.numel(), y.numel()),
                )
            })
        }
    }
}

fn unary(op: &str, value: &Value, f: fn(f64) -> f64) -> Result<Value> {
    match value {
        Value::Tensor(t) => Ok(Tensor::new(t.map(f).data().to_vec(), DType::Float32).into()),
        Value::Int(v) => Ok(Value::Float(f(*v as f64))),
        Value::Float(v) => Ok(Value::Float(f(*v))),
        other => Err(ScriptError::invalid_operand(op, other.type_of())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(name: &str, args: &[Value]) -> Result<Value> {
        lookup(name).unwrap().invoke(args)
    }

    #[test]
    fn int_tensor_keeps_dtype() {
        let t = Value::Tensor(Tensor::new(vec![1.0, 1.0], DType::Int64));
        let plus = run("add", &[t, Value::Int(1)]).unwrap();
        let doubled = run("mul", &[Value::Int(2), plus]).unwrap();
        assert_eq!(doubled, Value::Tensor(Tensor::new(vec![4.0, 4.0], DType::Int64)));
    }

    #[test]
    fn promotion() {
        let add = lookup("add").unwrap();
        assert_eq!(add.result_type(&[Type::Int, Type::Int]), Ok(Type::Int));
        assert_eq!(add.result_type(&[Type::Tensor, Type::Int]), Ok(Type::Tensor));
        assert_eq!(add.result_type(&[Type::Int, Type::Float]), Ok(Type::Float));
        assert!(add.result_type(&[Type::Int, Type::await_of(Type::Int)]).is_err());
        assert_eq!(lookup("sin").unwrap().result_type(&[Type::Int]), Ok(Type::Float));
    }

    #[test]
    fn shape_mismatch() {
        let err = run("add", &[Tensor::zeros(2).into(), Tensor::zeros(3).into()]).unwrap_err();
        assert!(matches!(err, ScriptError::InvalidOperand { .. }));
    }

    #[test]
    fn oversized_tensor_rejected() {
        for len in [i64::MAX, -1, MAX_TENSOR_LEN as i64 + 1] {
            match run("zeros", &[Value::Int(len)]) {
                Err(ScriptError::InvalidOperand { op, found }) => {
                    assert_eq!(op, "zeros");
                    assert_eq!(found, format!("length {len}"));
                }
                other => panic!("unexpected: {other:?}"),
            }
        }
        assert!(run("full", &[Value::Int(i64::MAX), Value::Float(1.0)]).is_err());
        assert_eq!(run("ones", &[Value::Int(0)]), Ok(Tensor::ones(0).into()));
    }

    #[test]
    fn arity_checked() {
        assert!(matches!(run("sin", &[]), Err(ScriptError::Arity { .. })));
    }
}
