//! Catalogue of programs exercising deferred values.
//! Each is built programmatically and paired with the check the harness runs
//! on it. Doc comments show the program in pseudo-source.

use crate::ast::{AstBuilder, Expr};
use crate::module::{Module, Param, ScriptFunction};
use crate::object::Class;
use crate::types::Type;
use crate::value::{DType, Tensor, Value};
use std::sync::Arc;

/// What the harness verifies for a scenario.
#[derive(Debug, Clone)]
pub enum Check {
    /// Eager and compiled runs agree.
    Compare,
    /// Like `Compare`, and every await in the result re-runs its producer on
    /// its stored arguments to the same value.
    Introspect,
    /// Runs eagerly only; compiling must be rejected.
    EagerOnly,
    /// Trace on the scenario inputs, replay on `check_inputs`, optionally
    /// compile the trace as well.
    Traced {
        check_inputs: Vec<Value>,
        compile: bool,
    },
}

impl Check {
    pub fn name(&self) -> &'static str {
        match self {
            Check::Compare => "compare",
            Check::Introspect => "introspect",
            Check::EagerOnly => "eager-only",
            Check::Traced { compile: false, .. } => "traced",
            Check::Traced { compile: true, .. } => "traced+compiled",
        }
    }
}

#[derive(Clone)]
pub struct Scenario {
    pub name: &'static str,
    pub summary: &'static str,
    pub module: Arc<Module>,
    pub entry: &'static str,
    pub inputs: Vec<Value>,
    pub check: Check,
    /// Resolved result the eager run must produce.
    pub expected: Option<Value>,
    /// Explicit waits in the lowered entry, without coalescing.
    pub expected_waits: Option<usize>,
}

impl Scenario {
    fn new(name: &'static str, summary: &'static str, module: Module, entry: &'static str) -> Self {
        Self {
            name,
            summary,
            module: Arc::new(module),
            entry,
            inputs: Vec::new(),
            check: Check::Compare,
            expected: None,
            expected_waits: None,
        }
    }

    fn inputs(mut self, inputs: Vec<Value>) -> Self {
        self.inputs = inputs;
        self
    }

    fn check(mut self, check: Check) -> Self {
        self.check = check;
        self
    }

    fn expect(mut self, value: Value) -> Self {
        self.expected = Some(value);
        self
    }

    fn waits(mut self, count: usize) -> Self {
        self.expected_waits = Some(count);
        self
    }
}

pub fn all() -> Vec<Scenario> {
    vec![
        await_python(),
        await_type(),
        script(),
        nowait(),
        nowait_class(),
        class_arg(),
        awaitable_to_await(),
        class_return(),
        getattr_implicit(),
        nested(),
        non_scriptable(),
        isinstance(),
        eager_lazy(),
        out_of_interpreter(),
        jit_trace(),
        fx_wrap(),
    ]
}

pub fn find(name: &str) -> Option<Scenario> {
    all().into_iter().find(|scenario| scenario.name == name)
}

fn zeros() -> Value {
    Tensor::zeros(2).into()
}

fn float_tensor(value: f64) -> Value {
    Tensor::full(2, value, DType::Float32).into()
}

/// `C(_a: Tensor, _b: Tensor)` without methods.
fn class_c() -> Class {
    Class::new("C")
        .field("_a", Type::Tensor)
        .field("_b", Type::Tensor)
}

fn method_a(class: Class) -> Class {
    class.method("a", Type::Tensor, |this, _| this.field("_a"))
}

/// ```text
/// def delayed(x: Tensor) -> Tensor:
///     return 2 * (x + 1)
/// ```
fn define_delayed(b: &mut AstBuilder, module: &mut Module) {
    let x = b.var("x");
    let one = b.int(1);
    let plus = b.add(x, one);
    let two = b.int(2);
    let body = b.mul(two, plus);
    module.define(
        ScriptFunction::new("delayed", vec![Param::new("x", Type::Tensor)], body)
            .returns(Type::Tensor),
    );
}

/// `ones(2)`
fn ones(b: &mut AstBuilder) -> Expr {
    let two = b.int(2);
    b.call("ones", vec![two])
}

/// `a + b + c`
fn sum3(b: &mut AstBuilder, x: Expr, y: Expr, z: Expr) -> Expr {
    let xy = b.add(x, y);
    b.add(xy, z)
}

/// ```text
/// def foo(x: int) -> int:
///     return x + 13
///
/// def main():
///     return (awaitable(foo, 13), awaitable_nowait(33))
/// ```
fn await_python() -> Scenario {
    let mut b = AstBuilder::new();
    let mut module = Module::new();

    let x = b.var("x");
    let thirteen = b.int(13);
    let body = b.add(x, thirteen);
    module.define(
        ScriptFunction::new("foo", vec![Param::new("x", Type::Int)], body).returns(Type::Int),
    );

    let arg = b.int(13);
    let aw = b.awaitable("foo", vec![arg]);
    let ready = b.int(33);
    let nw = b.awaitable_nowait(ready);
    let body = b.tuple(vec![aw, nw]);
    module.define(ScriptFunction::new("main", vec![], body));

    Scenario::new(
        "await_python",
        "producer and arguments reproduce the forced value; no-wait stores (value,)",
        module,
        "main",
    )
    .check(Check::Introspect)
    .expect(Value::tuple([Value::Int(26), Value::Int(33)]))
    .waits(0)
}

/// ```text
/// def foo() -> Tensor          # native
///
/// def main():
///     awaits = annotate(List[Await[Tensor]], [])
///     awaits = append(awaits, awaitable(foo))
///     return awaits
/// ```
fn await_type() -> Scenario {
    let mut b = AstBuilder::new();
    let mut module = Module::new();
    module.define_native("foo", vec![], Type::Tensor, |_| Ok(Tensor::ones(2).into()));

    let empty = b.list(vec![]);
    let annotated = b.annotate(Type::list_of(Type::await_of(Type::Tensor)), empty);
    let awaits = b.var("awaits");
    let aw = b.awaitable("foo", vec![]);
    let appended = b.call("append", vec![awaits, aw]);
    let out = b.var("awaits");
    let body = b.block(vec![("awaits", annotated), ("awaits", appended)], out);
    module.define(ScriptFunction::new("main", vec![], body));

    Scenario::new(
        "await_type",
        "List[Await[Tensor]] annotation accepts an awaitable of a native producer",
        module,
        "main",
    )
    .expect(Value::list([Value::from(Tensor::ones(2))]))
    .waits(0)
}

/// ```text
/// def delayed(z: int) -> int:
///     return z + 3
///
/// def fn(x: Tensor):
///     aw: Await[int] = awaitable(delayed, 99)
///     a = ones(2)
///     b = wait(aw)
///     return a + b + x
/// ```
fn script() -> Scenario {
    let mut b = AstBuilder::new();
    let mut module = Module::new();

    let z = b.var("z");
    let three = b.int(3);
    let body = b.add(z, three);
    module.define(
        ScriptFunction::new("delayed", vec![Param::new("z", Type::Int)], body).returns(Type::Int),
    );

    let arg = b.int(99);
    let aw = b.awaitable("delayed", vec![arg]);
    let aw = b.annotate(Type::await_of(Type::Int), aw);
    let a = ones(&mut b);
    let aw_var = b.var("aw");
    let waited = b.wait(aw_var);
    let (a_var, b_var, x) = (b.var("a"), b.var("b"), b.var("x"));
    let out = sum3(&mut b, a_var, b_var, x);
    let body = b.block(vec![("aw", aw), ("a", a), ("b", waited)], out);
    module.define(ScriptFunction::new("fn", vec![Param::new("x", Type::Tensor)], body));

    Scenario::new("script", "awaitable of a script function, waited in script", module, "fn")
        .inputs(vec![zeros()])
        .expect(float_tensor(103.0))
        .waits(1)
}

/// ```text
/// def fn(x: Tensor):
///     aw = awaitable_nowait(13)
///     a = ones(2)
///     b = wait(aw)
///     return a + b + x
/// ```
fn nowait() -> Scenario {
    let mut b = AstBuilder::new();
    let mut module = Module::new();

    let value = b.int(13);
    let aw = b.awaitable_nowait(value);
    let a = ones(&mut b);
    let aw_var = b.var("aw");
    let waited = b.wait(aw_var);
    let (a_var, b_var, x) = (b.var("a"), b.var("b"), b.var("x"));
    let out = sum3(&mut b, a_var, b_var, x);
    let body = b.block(vec![("aw", aw), ("a", a), ("b", waited)], out);
    module.define(ScriptFunction::new("fn", vec![Param::new("x", Type::Tensor)], body));

    Scenario::new("nowait", "already resolved await of an int", module, "fn")
        .inputs(vec![zeros()])
        .expect(float_tensor(14.0))
        .waits(1)
}

/// ```text
/// class C: _a, _b; def a(self) -> Tensor
///
/// def fn(x: Tensor):
///     aw = awaitable_nowait(C(zeros(2), ones(2)))
///     _a = ones(2)
///     c = wait(aw)
///     return _a + c.a() + x
/// ```
fn nowait_class() -> Scenario {
    let mut b = AstBuilder::new();
    let mut module = Module::new();
    module.define_class(method_a(class_c()));

    let two = b.int(2);
    let first = b.call("zeros", vec![two]);
    let second = ones(&mut b);
    let c = b.construct("C", vec![first, second]);
    let aw = b.awaitable_nowait(c);
    let a = ones(&mut b);
    let aw_var = b.var("aw");
    let waited = b.wait(aw_var);
    let a_var = b.var("_a");
    let c_var = b.var("c");
    let c_a = b.call_method(c_var, "a", vec![]);
    let x = b.var("x");
    let out = sum3(&mut b, a_var, c_a, x);
    let body = b.block(vec![("aw", aw), ("_a", a), ("c", waited)], out);
    module.define(ScriptFunction::new("fn", vec![Param::new("x", Type::Tensor)], body));

    Scenario::new("nowait_class", "already resolved await of a class instance", module, "fn")
        .inputs(vec![zeros()])
        .expect(float_tensor(1.0))
        .waits(1)
}

/// ```text
/// def delayed(c: C) -> Tensor:
///     return c.a()
///
/// def fn(x: Tensor):
///     c = C(zeros(2), ones(2))
///     aw = awaitable(delayed, c)
///     _a = ones(2)
///     c2_t = wait(aw)
///     return _a + c2_t + x
/// ```
fn class_arg() -> Scenario {
    let mut b = AstBuilder::new();
    let mut module = Module::new();
    module.define_class(method_a(class_c()));

    let c = b.var("c");
    let body = b.call_method(c, "a", vec![]);
    module.define(
        ScriptFunction::new("delayed", vec![Param::new("c", Type::class("C"))], body)
            .returns(Type::Tensor),
    );

    let two = b.int(2);
    let first = b.call("zeros", vec![two]);
    let second = ones(&mut b);
    let c = b.construct("C", vec![first, second]);
    let c_var = b.var("c");
    let aw = b.awaitable("delayed", vec![c_var]);
    let a = ones(&mut b);
    let aw_var = b.var("aw");
    let waited = b.wait(aw_var);
    let (a_var, t_var, x) = (b.var("_a"), b.var("c2_t"), b.var("x"));
    let out = sum3(&mut b, a_var, t_var, x);
    let body = b.block(
        vec![("c", c), ("aw", aw), ("_a", a), ("c2_t", waited)],
        out,
    );
    module.define(ScriptFunction::new("fn", vec![Param::new("x", Type::Tensor)], body));

    Scenario::new("class_arg", "class instance passed as producer argument", module, "fn")
        .inputs(vec![zeros()])
        .expect(float_tensor(1.0))
        .waits(1)
}

/// ```text
/// def C_wait_impl(self: C):
///     return self._a + self._b
///
/// def fn(x: Tensor):
///     aw = awaitable(C_wait_impl, C(zeros(2), ones(2)))
///     _a = ones(2)
///     c_wait_impl_res = wait(aw)
///     return _a + c_wait_impl_res + x
/// ```
fn awaitable_to_await() -> Scenario {
    let mut b = AstBuilder::new();
    let mut module = Module::new();
    module.define_class(class_c());

    let this = b.var("self");
    let a = b.get_attr(this, "_a");
    let this = b.var("self");
    let bb = b.get_attr(this, "_b");
    let body = b.add(a, bb);
    module.define(ScriptFunction::new(
        "C_wait_impl",
        vec![Param::new("self", Type::class("C"))],
        body,
    ));

    let two = b.int(2);
    let first = b.call("zeros", vec![two]);
    let second = ones(&mut b);
    let c = b.construct("C", vec![first, second]);
    let aw = b.awaitable("C_wait_impl", vec![c]);
    let a = ones(&mut b);
    let aw_var = b.var("aw");
    let waited = b.wait(aw_var);
    let (a_var, r_var, x) = (b.var("_a"), b.var("c_wait_impl_res"), b.var("x"));
    let out = sum3(&mut b, a_var, r_var, x);
    let body = b.block(
        vec![("aw", aw), ("_a", a), ("c_wait_impl_res", waited)],
        out,
    );
    module.define(ScriptFunction::new("fn", vec![Param::new("x", Type::Tensor)], body));

    Scenario::new(
        "awaitable_to_await",
        "free function standing in for a class's wait implementation",
        module,
        "fn",
    )
    .inputs(vec![zeros()])
    .expect(float_tensor(2.0))
    .waits(1)
}

/// ```text
/// def C_wait_impl(self: C) -> C:
///     return C(self._a * 2, self._b * 3)
/// ```
fn define_wait_impl_returning_c(b: &mut AstBuilder, module: &mut Module) {
    let this = b.var("self");
    let a = b.get_attr(this, "_a");
    let two = b.int(2);
    let a = b.mul(a, two);
    let this = b.var("self");
    let bb = b.get_attr(this, "_b");
    let three = b.int(3);
    let bb = b.mul(bb, three);
    let body = b.construct("C", vec![a, bb]);
    module.define(
        ScriptFunction::new("C_wait_impl", vec![Param::new("self", Type::class("C"))], body)
            .returns(Type::class("C")),
    );
}

/// `aw: Await[C] = awaitable(C_wait_impl, C(x, x))`
fn await_c_of_x(b: &mut AstBuilder) -> Expr {
    let (x1, x2) = (b.var("x"), b.var("x"));
    let c = b.construct("C", vec![x1, x2]);
    let aw = b.awaitable("C_wait_impl", vec![c]);
    b.annotate(Type::await_of(Type::class("C")), aw)
}

/// ```text
/// def fn_arg_C(x: C) -> Tensor:
///     return x._a + x._b
///
/// def fn(x: Tensor):
///     aw: Await[C] = awaitable(C_wait_impl, C(x, x))
///     _a = ones(2)
///     y = fn_arg_C(wait(aw))
///     return _a + y + x
/// ```
fn class_return() -> Scenario {
    let mut b = AstBuilder::new();
    let mut module = Module::new();
    module.define_class(class_c());
    define_wait_impl_returning_c(&mut b, &mut module);

    let x = b.var("x");
    let a = b.get_attr(x, "_a");
    let x = b.var("x");
    let bb = b.get_attr(x, "_b");
    let body = b.add(a, bb);
    module.define(
        ScriptFunction::new("fn_arg_C", vec![Param::new("x", Type::class("C"))], body)
            .returns(Type::Tensor),
    );

    let aw = await_c_of_x(&mut b);
    let a = ones(&mut b);
    let aw_var = b.var("aw");
    let waited = b.wait(aw_var);
    let y = b.call("fn_arg_C", vec![waited]);
    let (a_var, y_var, x) = (b.var("_a"), b.var("y"), b.var("x"));
    let out = sum3(&mut b, a_var, y_var, x);
    let body = b.block(vec![("aw", aw), ("_a", a), ("y", y)], out);
    module.define(ScriptFunction::new("fn", vec![Param::new("x", Type::Tensor)], body));

    Scenario::new("class_return", "producer returning a class instance", module, "fn")
        .inputs(vec![float_tensor(0.5)])
        .expect(float_tensor(4.0))
        .waits(1)
}

/// ```text
/// class C: _a, _b; def b(self) -> Tensor
///
/// def fn(x: Tensor):
///     aw: Await[C] = awaitable(C_wait_impl, C(x, x))
///     _a = ones(2)
///     ai = aw._a
///     awb = aw.b()
///     c = C(2 * x, 2 * x)
///     return _a + ai + x + c._a + c.b()
/// ```
fn getattr_implicit() -> Scenario {
    let mut b = AstBuilder::new();
    let mut module = Module::new();
    module.define_class(class_c().method("b", Type::Tensor, |this, _| this.field("_b")));
    define_wait_impl_returning_c(&mut b, &mut module);

    let aw = await_c_of_x(&mut b);
    let a = ones(&mut b);
    let aw_var = b.var("aw");
    let ai = b.get_attr(aw_var, "_a");
    let aw_var = b.var("aw");
    let awb = b.call_method(aw_var, "b", vec![]);
    let (two, x) = (b.int(2), b.var("x"));
    let first = b.mul(two, x);
    let (two, x) = (b.int(2), b.var("x"));
    let second = b.mul(two, x);
    let c = b.construct("C", vec![first, second]);

    let (a_var, ai_var, x) = (b.var("_a"), b.var("ai"), b.var("x"));
    let partial = sum3(&mut b, a_var, ai_var, x);
    let c_var = b.var("c");
    let c_a = b.get_attr(c_var, "_a");
    let c_var = b.var("c");
    let c_b = b.call_method(c_var, "b", vec![]);
    let out = sum3(&mut b, partial, c_a, c_b);
    let body = b.block(
        vec![("aw", aw), ("_a", a), ("ai", ai), ("awb", awb), ("c", c)],
        out,
    );
    module.define(ScriptFunction::new("fn", vec![Param::new("x", Type::Tensor)], body));

    Scenario::new(
        "getattr_implicit",
        "member access on Await[C] becomes an explicit wait per access",
        module,
        "fn",
    )
    .inputs(vec![float_tensor(0.5)])
    // 1 + 1.0 + 0.5 + 1.0 + 1.0
    .expect(float_tensor(4.5))
    .waits(2)
}

/// ```text
/// def delayed(c: C) -> Await[Tensor]:
///     return awaitable_nowait(c.a())
///
/// def fn(x: Tensor) -> Await[Await[Tensor]]:
///     return awaitable(delayed, C(x, x))
///
/// def main(x: Tensor) -> Tensor:
///     awaw = fn(x)
///     return wait(wait(awaw))
/// ```
fn nested() -> Scenario {
    let mut b = AstBuilder::new();
    let mut module = Module::new();
    module.define_class(method_a(class_c()));

    let c = b.var("c");
    let a = b.call_method(c, "a", vec![]);
    let body = b.awaitable_nowait(a);
    module.define(
        ScriptFunction::new("delayed", vec![Param::new("c", Type::class("C"))], body)
            .returns(Type::await_of(Type::Tensor)),
    );

    let (x1, x2) = (b.var("x"), b.var("x"));
    let c = b.construct("C", vec![x1, x2]);
    let body = b.awaitable("delayed", vec![c]);
    module.define(
        ScriptFunction::new("fn", vec![Param::new("x", Type::Tensor)], body)
            .returns(Type::await_of(Type::await_of(Type::Tensor))),
    );

    let x = b.var("x");
    let awaw = b.call("fn", vec![x]);
    let awaw_var = b.var("awaw");
    let inner = b.wait(awaw_var);
    let out = b.wait(inner);
    let body = b.block(vec![("awaw", awaw)], out);
    module.define(
        ScriptFunction::new("main", vec![Param::new("x", Type::Tensor)], body)
            .returns(Type::Tensor),
    );

    Scenario::new("nested", "Await[Await[Tensor]] needs two waits", module, "main")
        .inputs(vec![float_tensor(0.5)])
        .expect(float_tensor(0.5))
        .waits(2)
}

/// ```text
/// class Tree:                  # recursive, cannot be compiled
///     parent: Optional[Tree]
///     v
///
/// def delayed(t: Tree):
///     t.v = t.v + 1
///     return t
///
/// def main():
///     aw = awaitable(delayed, Tree(None, 2))
///     t = wait(aw)
///     return t.v
/// ```
fn non_scriptable() -> Scenario {
    let mut b = AstBuilder::new();
    let mut module = Module::new();
    module.define_class(
        Class::new("Tree")
            .field("parent", Type::Any)
            .field("v", Type::Int)
            .opaque(),
    );

    let t = b.var("t");
    let v = b.get_attr(t, "v");
    let one = b.int(1);
    let incremented = b.add(v, one);
    let t = b.var("t");
    let update = b.set_attr(t, "v", incremented);
    let out = b.var("t");
    let body = b.block(vec![("_", update)], out);
    module.define(ScriptFunction::new(
        "delayed",
        vec![Param::new("t", Type::class("Tree"))],
        body,
    ));

    let parent = b.unit();
    let v = b.int(2);
    let tree = b.construct("Tree", vec![parent, v]);
    let aw = b.awaitable("delayed", vec![tree]);
    let aw_var = b.var("aw");
    let waited = b.wait(aw_var);
    let t_var = b.var("t");
    let out = b.get_attr(t_var, "v");
    let body = b.block(vec![("aw", aw), ("t", waited)], out);
    module.define(ScriptFunction::new("main", vec![], body));

    Scenario::new(
        "non_scriptable",
        "awaits work eagerly on classes the compiler rejects",
        module,
        "main",
    )
    .check(Check::EagerOnly)
    .expect(Value::Int(3))
}

/// ```text
/// def main(x: Tensor) -> Tensor:
///     aw = awaitable(delayed, x)
///     assert isinstance(aw, Await)
///     return wait(aw)
/// ```
fn isinstance() -> Scenario {
    let mut b = AstBuilder::new();
    let mut module = Module::new();
    define_delayed(&mut b, &mut module);

    let x = b.var("x");
    let aw = b.awaitable("delayed", vec![x]);
    let aw_var = b.var("aw");
    let check = b.is_await(aw_var);
    let check = b.assert(check, "aw is an Await");
    let aw_var = b.var("aw");
    let out = b.wait(aw_var);
    let body = b.block(vec![("aw", aw), ("_", check)], out);
    module.define(
        ScriptFunction::new("main", vec![Param::new("x", Type::Tensor)], body)
            .returns(Type::Tensor),
    );

    Scenario::new("isinstance", "an awaitable is an Await at runtime", module, "main")
        .inputs(vec![zeros()])
        .expect(float_tensor(2.0))
        .waits(1)
}

/// ```text
/// def main(t: Tensor):
///     aw = awaitable(delayed, t)
///     assert isinstance(aw, Await)
///     return aw.dtype
/// ```
fn eager_lazy() -> Scenario {
    let mut b = AstBuilder::new();
    let mut module = Module::new();
    define_delayed(&mut b, &mut module);

    let t = b.var("t");
    let aw = b.awaitable("delayed", vec![t]);
    let aw_var = b.var("aw");
    let check = b.is_await(aw_var);
    let check = b.assert(check, "aw is an Await");
    let aw_var = b.var("aw");
    let out = b.get_attr(aw_var, "dtype");
    let body = b.block(vec![("aw", aw), ("_", check)], out);
    module.define(ScriptFunction::new("main", vec![Param::new("t", Type::Tensor)], body));

    Scenario::new(
        "eager_lazy",
        "attribute access forwards to the eventual tensor",
        module,
        "main",
    )
    .inputs(vec![Tensor::full(2, 1.0, DType::Int64).into()])
    .expect(Value::text("int64"))
    .waits(1)
}

/// ```text
/// def main(x: Tensor) -> Await[Tensor]:
///     aw = awaitable(delayed, x)
///     assert isinstance(aw, Await)
///     return aw                # forced by the caller
/// ```
fn out_of_interpreter() -> Scenario {
    let mut b = AstBuilder::new();
    let mut module = Module::new();
    define_delayed(&mut b, &mut module);

    let x = b.var("x");
    let aw = b.awaitable("delayed", vec![x]);
    let aw_var = b.var("aw");
    let check = b.is_await(aw_var);
    let check = b.assert(check, "aw is an Await");
    let out = b.var("aw");
    let body = b.block(vec![("aw", aw), ("_", check)], out);
    module.define(
        ScriptFunction::new("main", vec![Param::new("x", Type::Tensor)], body)
            .returns(Type::await_of(Type::Tensor)),
    );

    Scenario::new(
        "out_of_interpreter",
        "an await returned from the program is forced by the host",
        module,
        "main",
    )
    .inputs(vec![zeros()])
    .expect(float_tensor(2.0))
    .waits(0)
}

/// ```text
/// def gap(x: Tensor):
///     return relu(x) + sin(x)
///
/// def delayed(x: Tensor) -> Tensor:
///     return 2 * (cos(x) + 1)
///
/// def main(x: Tensor, y: Tensor) -> Tensor:
///     aw = awaitable(delayed, x)
///     assert isinstance(aw, Await)
///     z = gap(y)
///     k = wait(aw)
///     return y + k
/// ```
fn jit_trace() -> Scenario {
    let mut b = AstBuilder::new();
    let mut module = Module::new();

    let x = b.var("x");
    let relu = b.call("relu", vec![x]);
    let x = b.var("x");
    let sin = b.call("sin", vec![x]);
    let body = b.add(relu, sin);
    module.define(ScriptFunction::new("gap", vec![Param::new("x", Type::Tensor)], body));

    let x = b.var("x");
    let cos = b.call("cos", vec![x]);
    let one = b.int(1);
    let plus = b.add(cos, one);
    let two = b.int(2);
    let body = b.mul(two, plus);
    module.define(
        ScriptFunction::new("delayed", vec![Param::new("x", Type::Tensor)], body)
            .returns(Type::Tensor),
    );

    let x = b.var("x");
    let aw = b.awaitable("delayed", vec![x]);
    let aw_var = b.var("aw");
    let check = b.is_await(aw_var);
    let check = b.assert(check, "aw is an Await");
    let y = b.var("y");
    let z = b.call("gap", vec![y]);
    let aw_var = b.var("aw");
    let k = b.wait(aw_var);
    let (y, k_var) = (b.var("y"), b.var("k"));
    let out = b.add(y, k_var);
    let body = b.block(vec![("aw", aw), ("_", check), ("z", z), ("k", k)], out);
    module.define(
        ScriptFunction::new(
            "main",
            vec![Param::new("x", Type::Tensor), Param::new("y", Type::Tensor)],
            body,
        )
        .returns(Type::Tensor),
    );

    let traced_on = float_tensor(0.25);
    Scenario::new(
        "jit_trace",
        "tracing records the awaitable call, replay matches eager",
        module,
        "main",
    )
    .inputs(vec![traced_on.clone(), traced_on])
    .check(Check::Traced {
        check_inputs: vec![float_tensor(1.0), float_tensor(1.0)],
        compile: false,
    })
    .waits(1)
}

/// ```text
/// class CFX: a, b; def ma(self) -> Tensor
///
/// def cfx_delayed(c: CFX) -> Tensor:
///     return 2 * (c.ma() + 1)
///
/// @wrap
/// def cfx_wrapped(c: CFX) -> Await[Tensor]:
///     return awaitable(cfx_delayed, c)
///
/// def process(aw: Await[Tensor]):
///     return wait(aw)
///
/// def forward(x: Tensor, y: Tensor):
///     aw = cfx_wrapped(CFX(x, y))
///     z = sin(x)
///     r = process(aw)
///     return r + z
/// ```
fn fx_wrap() -> Scenario {
    let mut b = AstBuilder::new();
    let mut module = Module::new();
    module.define_class(
        Class::new("CFX")
            .field("a", Type::Tensor)
            .field("b", Type::Tensor)
            .method("ma", Type::Tensor, |this, _| this.field("a")),
    );

    let c = b.var("c");
    let ma = b.call_method(c, "ma", vec![]);
    let one = b.int(1);
    let plus = b.add(ma, one);
    let two = b.int(2);
    let body = b.mul(two, plus);
    module.define(
        ScriptFunction::new("cfx_delayed", vec![Param::new("c", Type::class("CFX"))], body)
            .returns(Type::Tensor),
    );

    let c = b.var("c");
    let body = b.awaitable("cfx_delayed", vec![c]);
    module.define(
        ScriptFunction::new("cfx_wrapped", vec![Param::new("c", Type::class("CFX"))], body)
            .returns(Type::await_of(Type::Tensor)),
    );
    module.wrap("cfx_wrapped");

    let aw = b.var("aw");
    let body = b.wait(aw);
    module.define(ScriptFunction::new(
        "process",
        vec![Param::new("aw", Type::await_of(Type::Tensor))],
        body,
    ));

    let (x, y) = (b.var("x"), b.var("y"));
    let cfx = b.construct("CFX", vec![x, y]);
    let aw = b.call("cfx_wrapped", vec![cfx]);
    let x = b.var("x");
    let z = b.call("sin", vec![x]);
    let aw_var = b.var("aw");
    let r = b.call("process", vec![aw_var]);
    let (r_var, z_var) = (b.var("r"), b.var("z"));
    let out = b.add(r_var, z_var);
    let body = b.block(vec![("aw", aw), ("z", z), ("r", r)], out);
    module.define(ScriptFunction::new(
        "forward",
        vec![Param::new("x", Type::Tensor), Param::new("y", Type::Tensor)],
        body,
    ));

    let traced_on = float_tensor(0.25);
    Scenario::new(
        "fx_wrap",
        "wrapped function returning an await survives tracing and compiling",
        module,
        "forward",
    )
    .inputs(vec![traced_on.clone(), traced_on])
    .check(Check::Traced {
        check_inputs: vec![float_tensor(0.75), float_tensor(0.75)],
        compile: true,
    })
    .waits(1)
}
