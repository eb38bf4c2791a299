//! Explicit waits inserted by the compiler.

use awaitable_script::scenarios;
use awaitable_script::{
    AstBuilder, Class, Compiler, Config, Evaluator, ExprKind, ExprTag, Module, Param,
    ScriptError, ScriptFunction, Tensor, Type, Value,
};
use std::sync::Arc;

fn waits(name: &str, config: Config) -> usize {
    let scenario = scenarios::find(name).unwrap();
    Compiler::compile_with(Arc::clone(&scenario.module), scenario.entry, config)
        .unwrap()
        .count(ExprTag::Wait)
}

#[test]
fn class_return_keeps_its_single_wait() {
    assert_eq!(waits("class_return", Config::default()), 1);
}

#[test]
fn each_member_access_gets_a_wait() {
    assert_eq!(waits("getattr_implicit", Config::default()), 2);
}

#[test]
fn coalescing_shares_one_wait_per_binding() {
    let config = Config::default().with_coalesce_waits(true);
    assert_eq!(waits("getattr_implicit", config), 1);
    // Explicit waits are never merged.
    assert_eq!(waits("nested", config), 2);
}

#[test]
fn forwarded_tensor_attribute_is_waited() {
    assert_eq!(waits("eager_lazy", Config::default()), 1);
}

#[test]
fn member_access_is_rewritten_to_wait_then_access() {
    let scenario = scenarios::find("getattr_implicit").unwrap();
    let compiled =
        Compiler::compile_with(Arc::clone(&scenario.module), scenario.entry, Config::default())
            .unwrap();
    let entry = compiled.function("fn").unwrap();

    let mut rewritten = 0;
    entry.body.walk(&mut |expr| match &expr.kind {
        ExprKind::GetAttr(receiver, _) | ExprKind::CallMethod(receiver, _, _) => {
            if receiver.tag() == ExprTag::Wait {
                rewritten += 1;
            }
        }
        _ => {}
    });
    assert_eq!(rewritten, 2);
    // Annotations are checked and dropped.
    assert_eq!(compiled.count(ExprTag::Annotate), 0);
}

#[test]
fn reachable_functions_are_compiled() {
    let scenario = scenarios::find("nested").unwrap();
    let compiled =
        Compiler::compile_with(Arc::clone(&scenario.module), "main", Config::default()).unwrap();
    let names: Vec<_> = compiled.functions().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["main", "fn", "delayed"]);
    assert_eq!(compiled.count_all(ExprTag::Awaitable), 1);
    assert_eq!(compiled.count_all(ExprTag::AwaitableNoWait), 1);
}

/// `delayed(c) -> Await[C]` hands back a no-wait of its argument, so
/// `awaitable(delayed, C(x))` is an `Await[Await[C]]`.
fn nested_class_module(explicit_wait: bool) -> Module {
    let mut b = AstBuilder::new();
    let mut module = Module::new();
    module.define_class(Class::new("C").field("_a", Type::Tensor));

    let c = b.var("c");
    let body = b.awaitable_nowait(c);
    module.define(
        ScriptFunction::new("delayed", vec![Param::new("c", Type::class("C"))], body)
            .returns(Type::await_of(Type::class("C"))),
    );

    let x = b.var("x");
    let c = b.construct("C", vec![x]);
    let mut receiver = b.awaitable("delayed", vec![c]);
    if explicit_wait {
        receiver = b.wait(receiver);
    }
    let body = b.get_attr(receiver, "_a");
    module.define(ScriptFunction::new("main", vec![Param::new("x", Type::Tensor)], body));
    module
}

#[test]
fn member_access_waits_one_layer_only() {
    let module = Arc::new(nested_class_module(false));
    let x = Value::from(Tensor::ones(2));

    let compiled = Compiler::compile_with(Arc::clone(&module), "main", Config::default());
    match compiled {
        Err(ScriptError::MemberNotFound(err)) => {
            assert_eq!(err.type_name, "Await[C]");
            assert_eq!(err.member, "_a");
        }
        Err(err) => panic!("unexpected error: {err}"),
        Ok(_) => panic!("nested await was flattened"),
    }

    let eager = Evaluator::eager(module).with_config(Config::default());
    match eager.call("main", &[x]) {
        Err(ScriptError::MemberNotFound(err)) => assert_eq!(err.type_name, "Await[C]"),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn explicit_inner_wait_then_implicit_outer() {
    let module = Arc::new(nested_class_module(true));
    let x = Value::from(Tensor::ones(2));

    let compiled =
        Compiler::compile_with(Arc::clone(&module), "main", Config::default()).unwrap();
    assert_eq!(compiled.count(ExprTag::Wait), 2);

    let eager = Evaluator::eager(module)
        .with_config(Config::default())
        .call("main", &[x.clone()])
        .unwrap();
    let lowered = Evaluator::compiled(Arc::new(compiled)).call("main", &[x]).unwrap();
    assert_eq!(eager, Value::from(Tensor::ones(2)));
    assert!(eager.allclose(&lowered));
}

/// ```text
/// def snapshot(c: C) -> C: return C(c.v)
/// def bump(c: C) -> int: c.v = c.v + 10; return 0
///
/// def main() -> int:
///     c = C(1)
///     aw = awaitable(snapshot, c)
///     return bump(c) + aw.v
/// ```
fn effect_before_access_module() -> Module {
    let mut b = AstBuilder::new();
    let mut module = Module::new();
    module.define_class(Class::new("C").field("v", Type::Int));

    let c = b.var("c");
    let v = b.get_attr(c, "v");
    let body = b.construct("C", vec![v]);
    module.define(
        ScriptFunction::new("snapshot", vec![Param::new("c", Type::class("C"))], body)
            .returns(Type::class("C")),
    );

    let c = b.var("c");
    let v = b.get_attr(c, "v");
    let ten = b.int(10);
    let bumped = b.add(v, ten);
    let c = b.var("c");
    let set = b.set_attr(c, "v", bumped);
    let zero = b.int(0);
    let body = b.block(vec![("_", set)], zero);
    module.define(
        ScriptFunction::new("bump", vec![Param::new("c", Type::class("C"))], body)
            .returns(Type::Int),
    );

    let one = b.int(1);
    let c = b.construct("C", vec![one]);
    let c_var = b.var("c");
    let aw = b.awaitable("snapshot", vec![c_var]);
    let c_var = b.var("c");
    let bump = b.call("bump", vec![c_var]);
    let aw_var = b.var("aw");
    let aw_v = b.get_attr(aw_var, "v");
    let y = b.add(bump, aw_v);
    let out = b.var("y");
    let body = b.block(vec![("c", c), ("aw", aw), ("y", y)], out);
    module.define(ScriptFunction::new("main", vec![], body).returns(Type::Int));
    module
}

#[test]
fn coalescing_keeps_wait_after_earlier_effects() {
    let module = Arc::new(effect_before_access_module());
    let eager = Evaluator::eager(Arc::clone(&module))
        .with_config(Config::default())
        .call("main", &[]);
    assert_eq!(eager, Ok(Value::Int(11)));

    for config in [Config::default(), Config::default().with_coalesce_waits(true)] {
        let compiled = Compiler::compile_with(Arc::clone(&module), "main", config).unwrap();
        assert_eq!(compiled.count(ExprTag::Wait), 1);
        let printed = compiled.function("main").unwrap().body.to_string();
        assert!(!printed.contains("$waited"), "{printed}");
        assert_eq!(
            Evaluator::compiled(Arc::new(compiled)).call("main", &[]),
            Ok(Value::Int(11)),
            "{config:?}"
        );
    }
}
