//! Static checking and lowering of script functions.
//!
//! The compiler infers a [`Type`] for every expression of the entry function
//! and of every script function reachable from it. Along the way it:
//!
//! - rejects annotations and declared return types that do not accept the
//!   inferred type (`TypeConstraint`),
//! - rejects `wait` on anything that is not an await,
//! - rejects member access the receiver's class does not declare,
//! - rejects construction of opaque classes (`NotScriptable`),
//! - turns member access on an `Await[..]` receiver into an explicit `wait`
//!   followed by the access.
//!
//! By default every such access gets its own wait. With
//! [`Config::coalesce_waits`] an await held in a variable is waited once,
//! right before the binding of its first access, and the result reused. A
//! first access that comes after a call, a force or a field access in the
//! same binding keeps its wait inline.

use crate::ast::{AstBuilder, Expr, ExprKind, ExprTag};
use crate::builtins;
use crate::config::Config;
use crate::error::{Result, ScriptError};
use crate::module::{Module, Param, ScriptFunction};
use crate::types::Type;
use awaitable::MemberNotFound;
use indexmap::{IndexMap, IndexSet};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// The lowered functions of one compilation, plus the module they came from.
pub struct CompiledModule {
    entry: String,
    module: Arc<Module>,
    functions: IndexMap<String, Arc<ScriptFunction>>,
    config: Config,
}

impl CompiledModule {
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Classes, native functions and wrapped names still come from here.
    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    pub fn config(&self) -> Config {
        self.config
    }

    pub fn function(&self, name: &str) -> Option<&Arc<ScriptFunction>> {
        self.functions.get(name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &Arc<ScriptFunction>> {
        self.functions.values()
    }

    /// Nodes of kind `tag` in the lowered entry function.
    pub fn count(&self, tag: ExprTag) -> usize {
        self.function(&self.entry)
            .map_or(0, |function| function.body.count(tag))
    }

    /// Nodes of kind `tag` across every compiled function.
    pub fn count_all(&self, tag: ExprTag) -> usize {
        self.functions
            .values()
            .map(|function| function.body.count(tag))
            .sum()
    }
}

#[derive(Default)]
struct Frame {
    vars: HashMap<String, Type>,
    /// Await variable -> temporary holding its waited value.
    waited: HashMap<String, String>,
    /// Bindings to emit before the binding currently being lowered.
    prelude: Vec<(String, Expr)>,
}

#[derive(Default)]
struct Scope {
    frames: Vec<Frame>,
}

impl Scope {
    fn push(&mut self) {
        self.frames.push(Frame::default());
    }

    fn pop(&mut self) -> Frame {
        self.frames.pop().unwrap_or_default()
    }

    fn top(&mut self) -> &mut Frame {
        if self.frames.is_empty() {
            self.push();
        }
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn bind(&mut self, name: &str, ty: Type) {
        let frame = self.top();
        frame.waited.remove(name);
        frame.vars.insert(name.to_string(), ty);
    }

    fn lookup(&self, name: &str) -> Option<&Type> {
        self.frames.iter().rev().find_map(|frame| frame.vars.get(name))
    }

    fn waited(&self, name: &str) -> Option<&str> {
        for frame in self.frames.iter().rev() {
            if let Some(temp) = frame.waited.get(name) {
                return Some(temp);
            }
            if frame.vars.contains_key(name) {
                return None;
            }
        }
        None
    }

    fn take_prelude(&mut self) -> Vec<(String, Expr)> {
        std::mem::take(&mut self.top().prelude)
    }
}

pub struct Compiler {
    module: Arc<Module>,
    config: Config,
    builder: AstBuilder,
    functions: IndexMap<String, Arc<ScriptFunction>>,
    queue: VecDeque<String>,
    seen: IndexSet<String>,
    /// Something observable (a call, a force, a field read or write) has
    /// already been lowered in the binding being built.
    effects: bool,
}

impl Compiler {
    /// Compiles `entry` and everything it reaches with the global config.
    pub fn compile(module: Arc<Module>, entry: &str) -> Result<CompiledModule> {
        Self::compile_with(module, entry, Config::global())
    }

    pub fn compile_with(module: Arc<Module>, entry: &str, config: Config) -> Result<CompiledModule> {
        if module.script_function(entry).is_none() {
            return Err(ScriptError::UnknownFunction(entry.to_string()));
        }
        let mut compiler = Compiler {
            builder: AstBuilder::starting_at(module.max_expr_id() + 1),
            module,
            config,
            functions: IndexMap::new(),
            queue: VecDeque::new(),
            seen: IndexSet::new(),
            effects: false,
        };
        compiler.enqueue(entry);
        while let Some(name) = compiler.queue.pop_front() {
            let Some(function) = compiler.module.script_function(&name).cloned() else {
                continue;
            };
            compiler.compile_function(&function)?;
        }
        log::debug!(
            "compiled '{entry}' ({} function(s), coalesce_waits={})",
            compiler.functions.len(),
            config.coalesce_waits
        );
        Ok(CompiledModule {
            entry: entry.to_string(),
            module: compiler.module,
            functions: compiler.functions,
            config,
        })
    }

    fn enqueue(&mut self, name: &str) {
        if self.seen.insert(name.to_string()) {
            self.queue.push_back(name.to_string());
        }
    }

    fn compile_function(&mut self, function: &ScriptFunction) -> Result<()> {
        let mut scope = Scope::default();
        scope.push();
        for param in &function.params {
            scope.bind(&param.name, param.ty.clone());
        }
        self.effects = false;
        let (body, ty) = self.lower(&function.body, &mut scope)?;
        let prelude = scope.take_prelude();
        let body = if prelude.is_empty() {
            body
        } else {
            self.builder.expr(ExprKind::Block {
                bindings: prelude,
                output: Box::new(body),
            })
        };

        if let Some(declared) = &function.returns {
            if !declared.accepts(&ty) {
                return Err(ScriptError::type_constraint(
                    format!("return type of '{}'", function.name),
                    declared,
                    &ty,
                ));
            }
        }

        log::trace!("lowered '{}' -> {ty}:\n{body}", function.name);
        self.functions.insert(
            function.name.clone(),
            Arc::new(ScriptFunction {
                name: function.name.clone(),
                params: function.params.iter().map(|p| Param::new(&p.name, p.ty.clone())).collect(),
                returns: function.returns.clone(),
                body,
            }),
        );
        Ok(())
    }

    fn lower_all(&mut self, exprs: &[Expr], scope: &mut Scope) -> Result<(Vec<Expr>, Vec<Type>)> {
        let mut lowered = Vec::with_capacity(exprs.len());
        let mut types = Vec::with_capacity(exprs.len());
        for expr in exprs {
            let (expr, ty) = self.lower(expr, scope)?;
            lowered.push(expr);
            types.push(ty);
        }
        Ok((lowered, types))
    }

    fn lower(&mut self, expr: &Expr, scope: &mut Scope) -> Result<(Expr, Type)> {
        let id = expr.id;
        let node = |kind| Expr::new(id, kind);

        match &expr.kind {
            ExprKind::Literal(literal) => Ok((expr.clone(), literal.ty())),

            ExprKind::Variable(name) => match scope.lookup(name) {
                Some(ty) => Ok((expr.clone(), ty.clone())),
                None => Err(ScriptError::UnknownVariable(name.clone())),
            },

            ExprKind::Block { bindings, output } => {
                // A prelude lands right before its binding, so the block's
                // own bindings start clean; whatever ran inside still counts
                // for the enclosing binding.
                let outer = self.effects;
                let mut inner = false;
                scope.push();
                let mut lowered = Vec::with_capacity(bindings.len());
                for (name, value) in bindings {
                    self.effects = false;
                    let (value, ty) = self.lower(value, scope)?;
                    inner |= self.effects;
                    lowered.extend(scope.take_prelude());
                    lowered.push((name.clone(), value));
                    scope.bind(name, ty);
                }
                self.effects = false;
                let (output, ty) = self.lower(output, scope)?;
                inner |= self.effects;
                lowered.extend(scope.take_prelude());
                scope.pop();
                self.effects = outer || inner;
                Ok((
                    node(ExprKind::Block {
                        bindings: lowered,
                        output: Box::new(output),
                    }),
                    ty,
                ))
            }

            ExprKind::Call(name, args) => {
                let (args, types) = self.lower_all(args, scope)?;
                let ty = self.call_signature(name, &types)?;
                // Builtin kernels only see values; anything else may mutate.
                if self.module.function(name).is_some() || builtins::lookup(name).is_none() {
                    self.effects = true;
                }
                Ok((node(ExprKind::Call(name.clone(), args)), ty))
            }

            ExprKind::Construct(class_name, args) => {
                let (args, types) = self.lower_all(args, scope)?;
                let class = self
                    .module
                    .class(class_name)
                    .ok_or_else(|| ScriptError::UnknownClass(class_name.clone()))?;
                if !class.is_scriptable() {
                    return Err(ScriptError::NotScriptable {
                        class: class_name.clone(),
                    });
                }
                let fields: Vec<_> = class.fields().collect();
                if fields.len() != types.len() {
                    return Err(ScriptError::Arity {
                        callee: class_name.clone(),
                        expected: fields.len(),
                        found: types.len(),
                    });
                }
                for ((field, declared), found) in fields.iter().zip(&types) {
                    if !declared.accepts(found) {
                        return Err(ScriptError::type_constraint(
                            format!("field '{field}' of '{class_name}'"),
                            declared,
                            found,
                        ));
                    }
                }
                self.effects = true;
                Ok((
                    node(ExprKind::Construct(class_name.clone(), args)),
                    Type::class(class_name.as_str()),
                ))
            }

            ExprKind::GetAttr(receiver, field) => {
                let (receiver, receiver_ty) = self.lower_receiver(receiver, scope)?;
                let ty = self.field_type(&receiver_ty, field)?;
                self.effects = true;
                Ok((node(ExprKind::GetAttr(Box::new(receiver), field.clone())), ty))
            }

            ExprKind::SetAttr(receiver, field, value) => {
                let (receiver, receiver_ty) = self.lower_receiver(receiver, scope)?;
                let declared = self.field_type(&receiver_ty, field)?;
                let (value, found) = self.lower(value, scope)?;
                if !declared.accepts(&found) {
                    return Err(ScriptError::type_constraint(
                        format!("assignment to '{field}'"),
                        &declared,
                        &found,
                    ));
                }
                self.effects = true;
                Ok((
                    node(ExprKind::SetAttr(
                        Box::new(receiver),
                        field.clone(),
                        Box::new(value),
                    )),
                    Type::Unit,
                ))
            }

            ExprKind::CallMethod(receiver, method, args) => {
                let (receiver, receiver_ty) = self.lower_receiver(receiver, scope)?;
                let ty = self.method_type(&receiver_ty, method)?;
                let (args, _) = self.lower_all(args, scope)?;
                self.effects = true;
                Ok((
                    node(ExprKind::CallMethod(Box::new(receiver), method.clone(), args)),
                    ty,
                ))
            }

            ExprKind::Awaitable(function, args) => {
                let (args, types) = self.lower_all(args, scope)?;
                let ty = self.call_signature(function, &types)?;
                self.effects = true;
                Ok((
                    node(ExprKind::Awaitable(function.clone(), args)),
                    Type::await_of(ty),
                ))
            }

            ExprKind::AwaitableNoWait(value) => {
                let (value, ty) = self.lower(value, scope)?;
                Ok((
                    node(ExprKind::AwaitableNoWait(Box::new(value))),
                    Type::await_of(ty),
                ))
            }

            ExprKind::Wait(value) => {
                let (value, ty) = self.lower(value, scope)?;
                let inner = match ty {
                    Type::Await(inner) => *inner,
                    Type::Any => Type::Any,
                    other => {
                        return Err(ScriptError::type_constraint(
                            "wait",
                            Type::await_of(Type::Any),
                            other,
                        ));
                    }
                };
                self.effects = true;
                Ok((node(ExprKind::Wait(Box::new(value))), inner))
            }

            ExprKind::IsAwait(value) => {
                let (value, _) = self.lower(value, scope)?;
                Ok((node(ExprKind::IsAwait(Box::new(value))), Type::Bool))
            }

            ExprKind::Assert(condition, message) => {
                let (condition, ty) = self.lower(condition, scope)?;
                if !Type::Bool.accepts(&ty) {
                    return Err(ScriptError::type_constraint("assert", Type::Bool, ty));
                }
                Ok((
                    node(ExprKind::Assert(Box::new(condition), message.clone())),
                    Type::Unit,
                ))
            }

            ExprKind::Annotate(value, declared) => {
                let (value, found) = self.lower(value, scope)?;
                if !declared.accepts(&found) {
                    return Err(ScriptError::type_constraint("annotation", declared, found));
                }
                // The checked annotation leaves no trace in the lowered program.
                Ok((value, declared.clone()))
            }

            ExprKind::Tuple(items) => {
                let (items, types) = self.lower_all(items, scope)?;
                Ok((node(ExprKind::Tuple(items)), Type::Tuple(types)))
            }

            ExprKind::List(items) => {
                let (items, types) = self.lower_all(items, scope)?;
                let item = types.into_iter().next().unwrap_or(Type::Any);
                Ok((node(ExprKind::List(items)), Type::list_of(item)))
            }
        }
    }

    /// Lowers the receiver of a member access. An `Await[T]` receiver gets
    /// exactly one wait; the member is then looked up on `T`, so a nested
    /// `Await[Await[C]]` still needs an explicit inner wait.
    fn lower_receiver(&mut self, receiver: &Expr, scope: &mut Scope) -> Result<(Expr, Type)> {
        let (lowered, inner) = match self.lower(receiver, scope)? {
            (lowered, Type::Await(inner)) => (lowered, *inner),
            plain => return Ok(plain),
        };
        let lowered = match &receiver.kind {
            ExprKind::Variable(name) if self.config.coalesce_waits => {
                self.coalesced_wait(name, lowered, scope)
            }
            _ => {
                self.effects = true;
                self.builder.wait(lowered)
            }
        };
        Ok((lowered, inner))
    }

    /// Reuses the temporary of an earlier wait on `name`, or hoists a new one
    /// into the prelude of the current binding. Hoisting is only sound while
    /// nothing observable has run yet in that binding; otherwise the wait
    /// stays where the access is.
    fn coalesced_wait(&mut self, name: &str, receiver: Expr, scope: &mut Scope) -> Expr {
        if let Some(temp) = scope.waited(name) {
            let temp = temp.to_string();
            return self.builder.var(temp);
        }
        if self.effects {
            log::trace!("wait on '{name}' kept inline, binding already has effects");
            return self.builder.wait(receiver);
        }
        let temp = format!("{name}$waited");
        let wait = self.builder.wait(receiver);
        let frame = scope.top();
        frame.prelude.push((temp.clone(), wait));
        frame.waited.insert(name.to_string(), temp.clone());
        // The hoisted wait runs the producer before this binding.
        self.effects = true;
        self.builder.var(temp)
    }

    fn call_signature(&mut self, name: &str, args: &[Type]) -> Result<Type> {
        let module = Arc::clone(&self.module);
        if let Some(function) = module.function(name) {
            let params = function.param_types();
            if params.len() != args.len() {
                return Err(ScriptError::Arity {
                    callee: name.to_string(),
                    expected: params.len(),
                    found: args.len(),
                });
            }
            for (index, (declared, found)) in params.iter().zip(args).enumerate() {
                if !declared.accepts(found) {
                    return Err(ScriptError::type_constraint(
                        format!("argument {} of '{name}'", index + 1),
                        declared,
                        found,
                    ));
                }
            }
            if module.script_function(name).is_some() {
                self.enqueue(name);
            }
            return Ok(function.return_type());
        }
        match builtins::lookup(name) {
            Some(builtin) => {
                if builtin.arity != args.len() {
                    return Err(ScriptError::Arity {
                        callee: name.to_string(),
                        expected: builtin.arity,
                        found: args.len(),
                    });
                }
                builtin.result_type(args)
            }
            None => Err(ScriptError::UnknownFunction(name.to_string())),
        }
    }

    fn field_type(&self, receiver: &Type, field: &str) -> Result<Type> {
        match receiver {
            Type::Any => Ok(Type::Any),
            Type::Class(name) => {
                let class = self
                    .module
                    .class(name)
                    .ok_or_else(|| ScriptError::UnknownClass(name.clone()))?;
                if !class.is_scriptable() {
                    return Err(ScriptError::NotScriptable { class: name.clone() });
                }
                class
                    .field_type(field)
                    .cloned()
                    .ok_or_else(|| MemberNotFound::field(name.as_str(), field).into())
            }
            Type::Tensor => match field {
                "dtype" => Ok(Type::Text),
                "numel" => Ok(Type::Int),
                _ => Err(MemberNotFound::field("Tensor", field).into()),
            },
            other => Err(MemberNotFound::field(other.to_string(), field).into()),
        }
    }

    fn method_type(&self, receiver: &Type, method: &str) -> Result<Type> {
        match receiver {
            Type::Any => Ok(Type::Any),
            Type::Class(name) => {
                let class = self
                    .module
                    .class(name)
                    .ok_or_else(|| ScriptError::UnknownClass(name.clone()))?;
                if !class.is_scriptable() {
                    return Err(ScriptError::NotScriptable { class: name.clone() });
                }
                class
                    .method_returns(method)
                    .cloned()
                    .ok_or_else(|| MemberNotFound::method(name.as_str(), method).into())
            }
            Type::Tensor if method == "sum" => Ok(Type::Float),
            other => Err(MemberNotFound::method(other.to_string(), method).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Class;

    fn module_with_await_receiver() -> Module {
        let mut b = AstBuilder::new();
        let mut module = Module::new();
        module.define_class(
            Class::new("C")
                .field("_a", Type::Tensor)
                .method("a", Type::Tensor, |this, _| this.field("_a")),
        );

        let inner = b.var("c");
        module.define(
            ScriptFunction::new("make", vec![Param::new("c", Type::class("C"))], inner)
                .returns(Type::class("C")),
        );

        let x = b.var("x");
        let c = b.construct("C", vec![x]);
        let aw = b.awaitable("make", vec![c]);
        let first = b.var("aw");
        let first = b.get_attr(first, "_a");
        let second = b.var("aw");
        let second = b.call_method(second, "a", vec![]);
        let out = b.add(first, second);
        let body = b.block(vec![("aw", aw)], out);
        module.define(ScriptFunction::new("main", vec![Param::new("x", Type::Tensor)], body));
        module
    }

    #[test]
    fn one_wait_per_member_access() {
        let compiled = Compiler::compile_with(
            Arc::new(module_with_await_receiver()),
            "main",
            Config::default(),
        )
        .unwrap();
        assert_eq!(compiled.count(ExprTag::Wait), 2);
        assert!(compiled.function("make").is_some());
    }

    #[test]
    fn coalesced_waits() {
        let compiled = Compiler::compile_with(
            Arc::new(module_with_await_receiver()),
            "main",
            Config::default().with_coalesce_waits(true),
        )
        .unwrap();
        assert_eq!(compiled.count(ExprTag::Wait), 1);
    }

    #[test]
    fn unknown_entry() {
        let err = Compiler::compile_with(Arc::new(Module::new()), "main", Config::default()).err();
        assert_eq!(err, Some(ScriptError::UnknownFunction("main".into())));
    }
}
