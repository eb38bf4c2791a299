//! Classes and their instances.

use crate::error::{Result, ScriptError};
use crate::types::Type;
use crate::value::Value;
use awaitable::MemberNotFound;
use indexmap::IndexMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub type MethodFn = dyn Fn(&Object, &[Value]) -> Result<Value> + Send + Sync;

#[derive(Clone)]
pub struct Method {
    pub returns: Type,
    body: Arc<MethodFn>,
}

/// A class declared by the host: named fields with static types and native
/// methods with declared return types.
#[derive(Clone)]
pub struct Class {
    name: String,
    fields: IndexMap<String, Type>,
    methods: IndexMap<String, Method>,
    scriptable: bool,
}

impl Class {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
            methods: IndexMap::new(),
            scriptable: true,
        }
    }

    pub fn field(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.fields.insert(name.into(), ty);
        self
    }

    pub fn method<F>(mut self, name: impl Into<String>, returns: Type, body: F) -> Self
    where
        F: Fn(&Object, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.methods.insert(
            name.into(),
            Method {
                returns,
                body: Arc::new(body),
            },
        );
        self
    }

    /// Usable eagerly but rejected by the compiler.
    pub fn opaque(mut self) -> Self {
        self.scriptable = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_scriptable(&self) -> bool {
        self.scriptable
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Type)> {
        self.fields.iter().map(|(name, ty)| (name.as_str(), ty))
    }

    pub fn field_type(&self, name: &str) -> Option<&Type> {
        self.fields.get(name)
    }

    pub fn method_returns(&self, name: &str) -> Option<&Type> {
        self.methods.get(name).map(|method| &method.returns)
    }

    /// Builds an instance from positional field values.
    pub fn instantiate(self: &Arc<Self>, args: Vec<Value>) -> Result<Object> {
        if args.len() != self.fields.len() {
            return Err(ScriptError::Arity {
                callee: self.name.clone(),
                expected: self.fields.len(),
                found: args.len(),
            });
        }
        let fields = self.fields.keys().cloned().zip(args).collect();
        Ok(Object(Arc::new(ObjectData {
            class: Arc::clone(self),
            fields: Mutex::new(fields),
        })))
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("scriptable", &self.scriptable)
            .finish()
    }
}

struct ObjectData {
    class: Arc<Class>,
    fields: Mutex<IndexMap<String, Value>>,
}

/// Shared, mutable instance of a [`Class`]. Clones alias the same object.
#[derive(Clone)]
pub struct Object(Arc<ObjectData>);

impl Object {
    pub fn class(&self) -> &Arc<Class> {
        &self.0.class
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.lock().get(name).cloned()
    }

    /// Field read for method bodies.
    pub fn field(&self, name: &str) -> Result<Value> {
        self.get(name)
            .ok_or_else(|| MemberNotFound::field(self.0.class.name(), name).into())
    }

    pub fn set(&self, name: &str, value: Value) -> Result<()> {
        match self.lock().get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(MemberNotFound::field(self.0.class.name(), name).into()),
        }
    }

    /// Snapshot of all fields in declaration order.
    pub fn fields(&self) -> Vec<(String, Value)> {
        self.lock()
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    pub fn call_method(&self, name: &str, args: &[Value]) -> Option<Result<Value>> {
        let method = self.0.class.methods.get(name)?;
        Some((method.body)(self, args))
    }

    pub fn same(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Address of the shared instance; stable while any handle is alive.
    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, Value>> {
        self.0.fields.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Field values may reference this object again.
        f.debug_struct("Object")
            .field("class", &self.0.class.name)
            .field("fields", &self.lock().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> Arc<Class> {
        Arc::new(
            Class::new("C")
                .field("_a", Type::Int)
                .field("_b", Type::Int)
                .method("a", Type::Int, |this, _| this.field("_a")),
        )
    }

    #[test]
    fn instantiate_and_call() {
        let c = pair().instantiate(vec![Value::Int(1), Value::Int(2)]).unwrap();
        assert_eq!(c.get("_b"), Some(Value::Int(2)));
        assert_eq!(c.call_method("a", &[]), Some(Ok(Value::Int(1))));
        assert!(c.call_method("b", &[]).is_none());
    }

    #[test]
    fn clones_alias() {
        let c = pair().instantiate(vec![Value::Int(1), Value::Int(2)]).unwrap();
        let alias = c.clone();
        alias.set("_a", Value::Int(5)).unwrap();
        assert_eq!(c.get("_a"), Some(Value::Int(5)));
        assert!(c.set("_c", Value::Unit).is_err());
    }

    #[test]
    fn arity() {
        let err = pair().instantiate(vec![Value::Int(1)]).unwrap_err();
        assert_eq!(
            err,
            ScriptError::Arity {
                callee: "C".into(),
                expected: 2,
                found: 1
            }
        );
    }
}
