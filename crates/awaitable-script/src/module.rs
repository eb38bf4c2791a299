//! Function and class definitions a program runs against.

use crate::ast::Expr;
use crate::error::Result;
use crate::object::Class;
use crate::types::Type;
use crate::value::Value;
use indexmap::{IndexMap, IndexSet};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A function whose body is an expression tree.
#[derive(Debug, Clone)]
pub struct ScriptFunction {
    pub name: String,
    pub params: Vec<Param>,
    /// Declared return type, if any.
    pub returns: Option<Type>,
    pub body: Expr,
}

impl ScriptFunction {
    pub fn new(name: impl Into<String>, params: Vec<Param>, body: Expr) -> Self {
        Self {
            name: name.into(),
            params,
            returns: None,
            body,
        }
    }

    pub fn returns(mut self, ty: Type) -> Self {
        self.returns = Some(ty);
        self
    }
}

pub type NativeFn = dyn Fn(&[Value]) -> Result<Value> + Send + Sync;

/// A host function with a declared signature. Never compiled or inlined.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    pub params: Vec<Type>,
    pub returns: Type,
    body: Arc<NativeFn>,
}

impl NativeFunction {
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        (self.body)(args)
    }
}

#[derive(Clone)]
pub enum Function {
    Script(Arc<ScriptFunction>),
    Native(Arc<NativeFunction>),
}

impl Function {
    pub fn name(&self) -> &str {
        match self {
            Function::Script(function) => &function.name,
            Function::Native(function) => &function.name,
        }
    }

    pub fn param_types(&self) -> Vec<Type> {
        match self {
            Function::Script(function) => function.params.iter().map(|p| p.ty.clone()).collect(),
            Function::Native(function) => function.params.clone(),
        }
    }

    /// Declared return type; `Any` when undeclared.
    pub fn return_type(&self) -> Type {
        match self {
            Function::Script(function) => function.returns.clone().unwrap_or(Type::Any),
            Function::Native(function) => function.returns.clone(),
        }
    }
}

#[derive(Clone, Default)]
pub struct Module {
    functions: IndexMap<String, Function>,
    classes: IndexMap<String, Arc<Class>>,
    wrapped: IndexSet<String>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a script function.
    pub fn define(&mut self, function: ScriptFunction) -> &mut Self {
        self.functions
            .insert(function.name.clone(), Function::Script(Arc::new(function)));
        self
    }

    pub fn define_native<F>(
        &mut self,
        name: impl Into<String>,
        params: Vec<Type>,
        returns: Type,
        body: F,
    ) -> &mut Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        let name = name.into();
        self.functions.insert(
            name.clone(),
            Function::Native(Arc::new(NativeFunction {
                name,
                params,
                returns,
                body: Arc::new(body),
            })),
        );
        self
    }

    pub fn define_class(&mut self, class: Class) -> Arc<Class> {
        let class = Arc::new(class);
        self.classes
            .insert(class.name().to_string(), Arc::clone(&class));
        class
    }

    /// Marks a function as a leaf for tracing: calls to it are recorded, not
    /// inlined.
    pub fn wrap(&mut self, name: impl Into<String>) -> &mut Self {
        self.wrapped.insert(name.into());
        self
    }

    pub fn is_wrapped(&self, name: &str) -> bool {
        self.wrapped.contains(name)
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn script_function(&self, name: &str) -> Option<&Arc<ScriptFunction>> {
        match self.functions.get(name)? {
            Function::Script(function) => Some(function),
            Function::Native(_) => None,
        }
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.values()
    }

    pub fn class(&self, name: &str) -> Option<&Arc<Class>> {
        self.classes.get(name)
    }

    pub fn classes(&self) -> impl Iterator<Item = &Arc<Class>> {
        self.classes.values()
    }

    /// Largest expression id used by any script function.
    pub fn max_expr_id(&self) -> u32 {
        self.functions
            .values()
            .filter_map(|function| match function {
                Function::Script(function) => Some(function.body.max_id()),
                Function::Native(_) => None,
            })
            .max()
            .unwrap_or(0)
    }
}
