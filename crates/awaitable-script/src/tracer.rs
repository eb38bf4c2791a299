//! Tracing: run a function on example inputs and record what it did as a
//! straight-line program.
//!
//! Script calls are inlined unless the callee is wrapped in the module;
//! wrapped, native and builtin calls become call nodes. Awaits created while
//! tracing are handed to the [`TraceRecorder`] through [`awaitable::Await::wrap`],
//! so the trace re-creates them instead of baking in their results.

use crate::ast::{AstBuilder, Expr, ExprKind, ExprTag};
use crate::error::{Result, ScriptError};
use crate::evaluator::{self, CallArgs, Evaluator};
use crate::module::{Module, Param, ScriptFunction};
use crate::types::Type;
use crate::value::{AwaitValue, Value};
use awaitable::{CallSite, MemberNotFound, Members, RecordedCall, Tracer};
use std::any::Any;
use std::sync::Arc;

/// A recorded straight-line program.
#[derive(Debug, Clone)]
pub struct Trace {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Expr,
    /// What the traced run returned.
    pub result: Value,
    /// Awaits that crossed the trace, in creation order.
    pub awaits: Vec<RecordedCall>,
}

impl Trace {
    pub fn function(&self) -> ScriptFunction {
        ScriptFunction::new(self.name.clone(), self.params.clone(), self.body.clone())
    }

    /// `source` plus the traced function, ready to evaluate or compile.
    pub fn into_module(&self, source: &Module) -> Module {
        let mut module = source.clone();
        module.define(self.function());
        module
    }

    pub fn count(&self, tag: ExprTag) -> usize {
        self.body.count(tag)
    }
}

/// Collects the bindings of a trace in progress.
pub struct TraceRecorder {
    builder: AstBuilder,
    bindings: Vec<(String, Expr)>,
    /// Traced nodes for the arguments of the await about to be wrapped. The
    /// stored argument tuple only holds their concrete values.
    pending_inputs: Vec<Expr>,
    awaits: Vec<RecordedCall>,
}

impl TraceRecorder {
    fn new(first_id: u32) -> Self {
        Self {
            builder: AstBuilder::starting_at(first_id),
            bindings: Vec::new(),
            pending_inputs: Vec::new(),
            awaits: Vec::new(),
        }
    }

    /// Binds `node` to a fresh temporary and returns a reference to it.
    fn emit(&mut self, kind: ExprKind) -> Expr {
        let node = self.builder.expr(kind);
        self.bind(node)
    }

    fn bind(&mut self, node: Expr) -> Expr {
        let temp = format!("t{}", self.bindings.len());
        self.bindings.push((temp.clone(), node));
        self.builder.var(temp)
    }

    fn record(&mut self, aw: &AwaitValue, inputs: Vec<Expr>) -> Expr {
        self.pending_inputs = inputs;
        let node = aw.wrap(self);
        self.bind(node)
    }
}

impl TraceRecorder {
    /// Node for a stored argument that has no traced input, if it can be
    /// written as a literal.
    fn constant(&mut self, value: &Value) -> Option<Expr> {
        Some(match value {
            Value::Unit => self.builder.unit(),
            Value::Bool(b) => self.builder.bool(*b),
            Value::Int(v) => self.builder.int(*v),
            Value::Float(v) => self.builder.float(*v),
            Value::Text(s) => self.builder.string(&**s),
            _ => return None,
        })
    }

    /// Pairs the stored arguments with the traced input nodes. Arguments the
    /// trace did not see become constants.
    fn argument_nodes(&mut self, site: CallSite<'_>, stored: &[Value], inputs: Vec<Expr>) -> Vec<Expr> {
        if inputs.len() == stored.len() {
            return inputs;
        }
        let mut inputs = inputs.into_iter();
        let mut nodes = Vec::with_capacity(stored.len());
        for value in stored {
            let node = match inputs.next() {
                Some(node) => node,
                None => self.constant(value).unwrap_or_else(|| {
                    log::warn!("{}: argument {value} cannot be traced as a constant", site.id);
                    self.builder.unit()
                }),
            };
            nodes.push(node);
        }
        nodes
    }
}

impl Tracer for TraceRecorder {
    type Node = Expr;

    fn wrap(&mut self, site: CallSite<'_>, args: &dyn Any) -> Expr {
        let inputs = std::mem::take(&mut self.pending_inputs);
        self.awaits.push(RecordedCall {
            id: site.id,
            producer: site.producer.map(str::to_owned),
            nowait: site.nowait,
        });
        match site.producer {
            Some(producer) => {
                let inputs = match args.downcast_ref::<CallArgs>() {
                    Some(stored) => self.argument_nodes(site, stored, inputs),
                    None => inputs,
                };
                self.builder
                    .expr(ExprKind::Awaitable(producer.to_string(), inputs))
            }
            None => {
                let stored: &[Value] = match args.downcast_ref::<(Value,)>() {
                    Some((value,)) => std::slice::from_ref(value),
                    None => &[],
                };
                let value = match self.argument_nodes(site, stored, inputs).into_iter().next() {
                    Some(value) => value,
                    None => {
                        log::warn!("{}: no-wait value traced without an input node", site.id);
                        self.builder.unit()
                    }
                };
                self.builder.awaitable_nowait(value)
            }
        }
    }
}

type Slot = (Value, Expr);

#[derive(Default)]
struct TraceEnv {
    vars: Vec<(String, Slot)>,
}

impl TraceEnv {
    fn lookup(&self, name: &str) -> Option<&Slot> {
        self.vars
            .iter()
            .rev()
            .find(|(bound, _)| bound == name)
            .map(|(_, slot)| slot)
    }
}

struct Tracing<'m> {
    module: &'m Module,
    evaluator: Evaluator,
    recorder: TraceRecorder,
}

/// Traces `entry` of `module` on `inputs`.
pub fn trace(module: Arc<Module>, entry: &str, inputs: &[Value]) -> Result<Trace> {
    let function = module
        .script_function(entry)
        .cloned()
        .ok_or_else(|| ScriptError::UnknownFunction(entry.to_string()))?;
    if function.params.len() != inputs.len() {
        return Err(ScriptError::Arity {
            callee: entry.to_string(),
            expected: function.params.len(),
            found: inputs.len(),
        });
    }

    let mut tracing = Tracing {
        module: &module,
        evaluator: Evaluator::eager(Arc::clone(&module)),
        recorder: TraceRecorder::new(module.max_expr_id() + 1),
    };
    let mut env = TraceEnv::default();
    for (param, input) in function.params.iter().zip(inputs) {
        let node = tracing.recorder.builder.var(param.name.as_str());
        env.vars.push((param.name.clone(), (input.clone(), node)));
    }

    let (result, output) = tracing.trace_expr(&function.body, &mut env)?;
    let recorder = tracing.recorder;
    let mut builder = recorder.builder;
    let body = builder.expr(ExprKind::Block {
        bindings: recorder.bindings,
        output: Box::new(output),
    });
    log::debug!(
        "traced '{entry}': {} await(s) recorded",
        recorder.awaits.len()
    );
    Ok(Trace {
        name: format!("{entry}_traced"),
        params: function.params.clone(),
        body,
        result,
        awaits: recorder.awaits,
    })
}

impl Tracing<'_> {
    fn trace_all(&mut self, exprs: &[Expr], env: &mut TraceEnv) -> Result<(CallArgs, Vec<Expr>)> {
        let mut values = CallArgs::new();
        let mut nodes = Vec::with_capacity(exprs.len());
        for expr in exprs {
            let (value, node) = self.trace_expr(expr, env)?;
            values.push(value);
            nodes.push(node);
        }
        Ok((values, nodes))
    }

    fn trace_expr(&mut self, expr: &Expr, env: &mut TraceEnv) -> Result<Slot> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok((evaluator::literal_value(literal), expr.clone())),

            ExprKind::Variable(name) => env
                .lookup(name)
                .cloned()
                .ok_or_else(|| ScriptError::UnknownVariable(name.clone())),

            ExprKind::Block { bindings, output } => {
                let mark = env.vars.len();
                for (name, value) in bindings {
                    let slot = self.trace_expr(value, env)?;
                    env.vars.push((name.clone(), slot));
                }
                let result = self.trace_expr(output, env);
                env.vars.truncate(mark);
                result
            }

            ExprKind::Call(name, args) => {
                let (values, nodes) = self.trace_all(args, env)?;
                let module = self.module;
                match module.script_function(name) {
                    Some(function) if !module.is_wrapped(name) => {
                        log::trace!("inlining '{name}'");
                        self.inline(function, values, nodes)
                    }
                    _ => {
                        let value = self.evaluator.call(name, &values)?;
                        let node = self.recorder.emit(ExprKind::Call(name.clone(), nodes));
                        Ok((value, node))
                    }
                }
            }

            ExprKind::Construct(class_name, args) => {
                let (values, nodes) = self.trace_all(args, env)?;
                let class = self
                    .module
                    .class(class_name)
                    .ok_or_else(|| ScriptError::UnknownClass(class_name.clone()))?;
                let object = class.instantiate(values.into_vec())?;
                let node = self
                    .recorder
                    .emit(ExprKind::Construct(class_name.clone(), nodes));
                Ok((Value::Object(object), node))
            }

            ExprKind::GetAttr(receiver, field) => {
                let (receiver, node) = self.trace_expr(receiver, env)?;
                let value = evaluator::get_attr(&receiver, field)?;
                let node = self
                    .recorder
                    .emit(ExprKind::GetAttr(Box::new(node), field.clone()));
                Ok((value, node))
            }

            ExprKind::SetAttr(receiver, field, value) => {
                let (receiver, receiver_node) = self.trace_expr(receiver, env)?;
                // One layer, as the evaluator does.
                let receiver = match receiver {
                    Value::Await(aw) => aw.force()?,
                    other => other,
                };
                let (value, value_node) = self.trace_expr(value, env)?;
                match receiver {
                    Value::Object(object) => object.set(field, value)?,
                    other => {
                        return Err(MemberNotFound::field(other.type_name(), field.as_str()).into());
                    }
                }
                let node = self.recorder.emit(ExprKind::SetAttr(
                    Box::new(receiver_node),
                    field.clone(),
                    Box::new(value_node),
                ));
                Ok((Value::Unit, node))
            }

            ExprKind::CallMethod(receiver, method, args) => {
                let (receiver, receiver_node) = self.trace_expr(receiver, env)?;
                let (values, nodes) = self.trace_all(args, env)?;
                let value = evaluator::call_method(&receiver, method, &values)?;
                let node = self.recorder.emit(ExprKind::CallMethod(
                    Box::new(receiver_node),
                    method.clone(),
                    nodes,
                ));
                Ok((value, node))
            }

            ExprKind::Awaitable(function, args) => {
                let (values, nodes) = self.trace_all(args, env)?;
                let aw = self.evaluator.awaitable(function, values)?;
                let node = self.recorder.record(&aw, nodes);
                Ok((Value::Await(aw), node))
            }

            ExprKind::AwaitableNoWait(value) => {
                let (value, node) = self.trace_expr(value, env)?;
                let aw = AwaitValue::nowait(value);
                let node = self.recorder.record(&aw, vec![node]);
                Ok((Value::Await(aw), node))
            }

            ExprKind::Wait(value) => {
                let (value, node) = self.trace_expr(value, env)?;
                let value = match value {
                    Value::Await(aw) => aw.force()?,
                    other => {
                        return Err(ScriptError::type_constraint(
                            "wait",
                            Type::await_of(Type::Any),
                            other.type_of(),
                        ));
                    }
                };
                let node = self.recorder.emit(ExprKind::Wait(Box::new(node)));
                Ok((value, node))
            }

            ExprKind::IsAwait(value) => {
                let (value, node) = self.trace_expr(value, env)?;
                let node = self.recorder.emit(ExprKind::IsAwait(Box::new(node)));
                Ok((Value::Bool(value.is_await()), node))
            }

            ExprKind::Assert(condition, message) => {
                let (condition, node) = self.trace_expr(condition, env)?;
                if condition != Value::Bool(true) {
                    return Err(ScriptError::Assertion(message.clone()));
                }
                let node = self
                    .recorder
                    .emit(ExprKind::Assert(Box::new(node), message.clone()));
                Ok((Value::Unit, node))
            }

            ExprKind::Annotate(value, _) => self.trace_expr(value, env),

            ExprKind::Tuple(items) => {
                let (values, nodes) = self.trace_all(items, env)?;
                let node = self.recorder.emit(ExprKind::Tuple(nodes));
                Ok((Value::tuple(values), node))
            }

            ExprKind::List(items) => {
                let (values, nodes) = self.trace_all(items, env)?;
                let node = self.recorder.emit(ExprKind::List(nodes));
                Ok((Value::list(values), node))
            }
        }
    }

    fn inline(&mut self, function: &ScriptFunction, values: CallArgs, nodes: Vec<Expr>) -> Result<Slot> {
        if function.params.len() != values.len() {
            return Err(ScriptError::Arity {
                callee: function.name.clone(),
                expected: function.params.len(),
                found: values.len(),
            });
        }
        let mut env = TraceEnv::default();
        for ((param, value), node) in function.params.iter().zip(values).zip(nodes) {
            env.vars.push((param.name.clone(), (value, node)));
        }
        self.trace_expr(&function.body, &mut env)
    }
}
