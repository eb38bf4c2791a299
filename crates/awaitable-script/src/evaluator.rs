//! Tree-walking evaluator.
//!
//! The same evaluator runs a raw [`Module`] (eager mode) or the output of the
//! compiler. In eager mode member access on an await goes through the
//! engine's member proxy; compiled programs carry explicit waits instead.

use crate::ast::{Expr, ExprKind, Literal};
use crate::builtins;
use crate::compiler::CompiledModule;
use crate::config::Config;
use crate::error::{Result, ScriptError};
use crate::module::{Function, Module, ScriptFunction};
use crate::types::Type;
use crate::value::{AwaitValue, Value};
use awaitable::{MemberNotFound, Members};
use smallvec::SmallVec;
use std::sync::Arc;

/// Argument tuple stored in awaits created by `awaitable(f, ...)`.
pub type CallArgs = SmallVec<[Value; 4]>;

#[derive(Clone)]
pub enum Program {
    Eager(Arc<Module>),
    Compiled(Arc<CompiledModule>),
}

/// Variables visible while evaluating one function body.
#[derive(Default)]
pub struct Env {
    vars: Vec<(String, Value)>,
}

impl Env {
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.vars.push((name.into(), value));
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.vars
            .iter()
            .rev()
            .find(|(bound, _)| bound == name)
            .map(|(_, value)| value)
    }

    fn mark(&self) -> usize {
        self.vars.len()
    }

    fn reset(&mut self, mark: usize) {
        self.vars.truncate(mark);
    }
}

#[derive(Clone)]
pub struct Evaluator {
    program: Program,
    config: Config,
}

impl Evaluator {
    pub fn eager(module: Arc<Module>) -> Self {
        Self {
            program: Program::Eager(module),
            config: Config::global(),
        }
    }

    /// Runs lowered functions; inherits the compilation's config.
    pub fn compiled(compiled: Arc<CompiledModule>) -> Self {
        Self {
            config: compiled.config(),
            program: Program::Compiled(compiled),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn is_compiled(&self) -> bool {
        matches!(self.program, Program::Compiled(_))
    }

    pub fn module(&self) -> &Arc<Module> {
        match &self.program {
            Program::Eager(module) => module,
            Program::Compiled(compiled) => compiled.module(),
        }
    }

    fn script_function(&self, name: &str) -> Option<&Arc<ScriptFunction>> {
        match &self.program {
            Program::Eager(module) => module.script_function(name),
            Program::Compiled(compiled) => compiled
                .function(name)
                .or_else(|| compiled.module().script_function(name)),
        }
    }

    /// Calls a script, native or builtin function by name.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        if let Some(function) = self.script_function(name) {
            return self.call_script(function, args);
        }
        if let Some(Function::Native(function)) = self.module().function(name) {
            log::trace!("native call '{name}'");
            return function.call(args);
        }
        match builtins::lookup(name) {
            Some(builtin) => builtin.invoke(args),
            None => Err(ScriptError::UnknownFunction(name.to_string())),
        }
    }

    fn call_script(&self, function: &ScriptFunction, args: &[Value]) -> Result<Value> {
        if function.params.len() != args.len() {
            return Err(ScriptError::Arity {
                callee: function.name.clone(),
                expected: function.params.len(),
                found: args.len(),
            });
        }
        let mut env = Env::default();
        for (param, arg) in function.params.iter().zip(args) {
            env.bind(param.name.as_str(), arg.clone());
        }
        let result = self.eval(&function.body, &mut env)?;

        // Without a compiler in the way the declared type is only checked
        // once the producer has actually run.
        if let (Program::Eager(_), Some(declared)) = (&self.program, &function.returns) {
            let found = result.type_of();
            if !declared.accepts(&found) {
                return Err(ScriptError::type_constraint(
                    format!("return type of '{}'", function.name),
                    declared,
                    found,
                ));
            }
        }
        Ok(result)
    }

    /// Defers a call to `function`; the producer re-enters this evaluator.
    pub fn awaitable(&self, function: &str, args: CallArgs) -> Result<AwaitValue> {
        if self.script_function(function).is_none()
            && self.module().function(function).is_none()
            && builtins::lookup(function).is_none()
        {
            return Err(ScriptError::UnknownFunction(function.to_string()));
        }
        let evaluator = self.clone();
        let name = function.to_string();
        let producer = move |args: CallArgs| evaluator.call(&name, &args);
        Ok(if self.config.spawn_awaits {
            AwaitValue::spawn(function, producer, args)
        } else {
            AwaitValue::call(function, producer, args)
        })
    }

    fn eval_all(&self, exprs: &[Expr], env: &mut Env) -> Result<CallArgs> {
        exprs.iter().map(|expr| self.eval(expr, env)).collect()
    }

    pub fn eval(&self, expr: &Expr, env: &mut Env) -> Result<Value> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(literal_value(literal)),

            ExprKind::Variable(name) => env
                .lookup(name)
                .cloned()
                .ok_or_else(|| ScriptError::UnknownVariable(name.clone())),

            ExprKind::Block { bindings, output } => {
                let mark = env.mark();
                for (name, value) in bindings {
                    let value = self.eval(value, env)?;
                    env.bind(name.as_str(), value);
                }
                let result = self.eval(output, env);
                env.reset(mark);
                result
            }

            ExprKind::Call(name, args) => {
                let args = self.eval_all(args, env)?;
                self.call(name, &args)
            }

            ExprKind::Construct(class_name, args) => {
                let args = self.eval_all(args, env)?;
                let class = self
                    .module()
                    .class(class_name)
                    .ok_or_else(|| ScriptError::UnknownClass(class_name.clone()))?;
                Ok(Value::Object(class.instantiate(args.into_vec())?))
            }

            ExprKind::GetAttr(receiver, field) => {
                let receiver = self.eval(receiver, env)?;
                get_attr(&receiver, field)
            }

            ExprKind::SetAttr(receiver, field, value) => {
                let receiver = match self.eval(receiver, env)? {
                    Value::Await(aw) => aw.force()?,
                    other => other,
                };
                let value = self.eval(value, env)?;
                match receiver {
                    Value::Object(object) => object.set(field, value)?,
                    other => return Err(MemberNotFound::field(other.type_name(), field.as_str()).into()),
                }
                Ok(Value::Unit)
            }

            ExprKind::CallMethod(receiver, method, args) => {
                let receiver = self.eval(receiver, env)?;
                let args = self.eval_all(args, env)?;
                call_method(&receiver, method, &args)
            }

            ExprKind::Awaitable(function, args) => {
                let args = self.eval_all(args, env)?;
                Ok(Value::Await(self.awaitable(function, args)?))
            }

            ExprKind::AwaitableNoWait(value) => {
                let value = self.eval(value, env)?;
                Ok(Value::Await(AwaitValue::nowait(value)))
            }

            ExprKind::Wait(value) => match self.eval(value, env)? {
                Value::Await(aw) => aw.force(),
                other => Err(ScriptError::type_constraint(
                    "wait",
                    Type::await_of(Type::Any),
                    other.type_of(),
                )),
            },

            ExprKind::IsAwait(value) => Ok(Value::Bool(self.eval(value, env)?.is_await())),

            ExprKind::Assert(condition, message) => match self.eval(condition, env)? {
                Value::Bool(true) => Ok(Value::Unit),
                _ => Err(ScriptError::Assertion(message.clone())),
            },

            // Annotations only matter to the compiler.
            ExprKind::Annotate(value, _) => self.eval(value, env),

            ExprKind::Tuple(items) => Ok(Value::tuple(self.eval_all(items, env)?)),

            ExprKind::List(items) => Ok(Value::list(self.eval_all(items, env)?)),
        }
    }
}

pub fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Int(v) => Value::Int(*v),
        Literal::Float(v) => Value::Float(*v),
        Literal::String(s) => Value::text(s.as_str()),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Unit => Value::Unit,
    }
}

/// Field read; awaits are forced through the member proxy.
pub fn get_attr(receiver: &Value, field: &str) -> Result<Value> {
    match receiver {
        Value::Await(aw) => aw.field(field),
        other => other
            .get_field(field)
            .ok_or_else(|| MemberNotFound::field(other.type_name(), field).into()),
    }
}

/// Method call; awaits are forced through the member proxy.
pub fn call_method(receiver: &Value, method: &str, args: &[Value]) -> Result<Value> {
    match receiver {
        Value::Await(aw) => aw.invoke(method, args),
        other => match other.call_method(method, args) {
            Some(result) => result,
            None => Err(MemberNotFound::method(other.type_name(), method).into()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AstBuilder;
    use crate::module::Param;
    use crate::value::Tensor;

    #[test]
    fn awaitable_is_lazy_until_wait() {
        let mut b = AstBuilder::new();
        let mut module = Module::new();
        let x = b.var("x");
        let one = b.int(1);
        let body = b.add(x, one);
        module.define(ScriptFunction::new("inc", vec![Param::new("x", Type::Int)], body));

        let evaluator = Evaluator::eager(Arc::new(module)).with_config(Config::default());
        let aw = evaluator
            .awaitable("inc", CallArgs::from_vec(vec![Value::Int(41)]))
            .unwrap();
        assert!(!aw.is_forced());
        assert_eq!(aw.producer_name(), Some("inc"));
        assert_eq!(aw.force(), Ok(Value::Int(42)));
    }

    #[test]
    fn eager_return_type_checked_at_force() {
        let mut b = AstBuilder::new();
        let mut module = Module::new();
        let body = b.int(3);
        module.define(ScriptFunction::new("three", vec![], body).returns(Type::Tensor));

        let evaluator = Evaluator::eager(Arc::new(module)).with_config(Config::default());
        let aw = evaluator.awaitable("three", CallArgs::new()).unwrap();
        assert!(matches!(aw.force(), Err(ScriptError::TypeConstraint(_))));
        assert!(!aw.is_forced());
    }

    #[test]
    fn member_access_on_tensor_await() {
        let aw = AwaitValue::nowait(Value::Tensor(Tensor::ones(3)));
        let receiver = Value::Await(aw);
        assert_eq!(get_attr(&receiver, "numel"), Ok(Value::Int(3)));
        assert!(matches!(
            call_method(&receiver, "nope", &[]),
            Err(ScriptError::MemberNotFound(_))
        ));
    }

    #[test]
    fn unknown_awaitable_target() {
        let evaluator = Evaluator::eager(Arc::new(Module::new()));
        assert!(matches!(
            evaluator.awaitable("missing", CallArgs::new()),
            Err(ScriptError::UnknownFunction(_))
        ));
    }
}
