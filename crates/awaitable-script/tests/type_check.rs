//! Static rejections.

use awaitable::{MemberKind, TypeConstraintError};
use awaitable_script::{
    AstBuilder, Class, Compiler, Config, Module, Param, ScriptError, ScriptFunction, Type,
};
use std::sync::Arc;

fn compile(module: Module, entry: &str) -> Result<(), ScriptError> {
    Compiler::compile_with(Arc::new(module), entry, Config::default()).map(|_| ())
}

fn with_delayed_int(b: &mut AstBuilder) -> Module {
    let mut module = Module::new();
    let z = b.var("z");
    let three = b.int(3);
    let body = b.add(z, three);
    module.define(
        ScriptFunction::new("delayed", vec![Param::new("z", Type::Int)], body).returns(Type::Int),
    );
    module
}

#[test]
fn annotation_mismatch() {
    let mut b = AstBuilder::new();
    let mut module = with_delayed_int(&mut b);
    let arg = b.int(99);
    let aw = b.awaitable("delayed", vec![arg]);
    let body = b.annotate(Type::await_of(Type::Tensor), aw);
    module.define(ScriptFunction::new("main", vec![], body));

    assert_eq!(
        compile(module, "main"),
        Err(ScriptError::TypeConstraint(TypeConstraintError::new(
            "annotation",
            "Await[Tensor]",
            "Await[int]"
        )))
    );
}

#[test]
fn declared_return_mismatch() {
    let mut b = AstBuilder::new();
    let mut module = with_delayed_int(&mut b);
    let arg = b.int(1);
    let body = b.awaitable("delayed", vec![arg]);
    module.define(
        ScriptFunction::new("main", vec![], body).returns(Type::await_of(Type::Tensor)),
    );

    let err = compile(module, "main").unwrap_err();
    let ScriptError::TypeConstraint(err) = err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(err.context, "return type of 'main'");
    assert_eq!(err.found, "Await[int]");
}

#[test]
fn wait_of_plain_value() {
    let mut b = AstBuilder::new();
    let mut module = Module::new();
    let seven = b.int(7);
    let body = b.wait(seven);
    module.define(ScriptFunction::new("main", vec![], body));

    assert!(matches!(
        compile(module, "main"),
        Err(ScriptError::TypeConstraint(err)) if err.context == "wait" && err.found == "int"
    ));
}

#[test]
fn unknown_member_on_awaited_class() {
    let mut b = AstBuilder::new();
    let mut module = Module::new();
    module.define_class(Class::new("C").field("_a", Type::Tensor));
    let zeros_len = b.int(2);
    let zeros = b.call("zeros", vec![zeros_len]);
    let c = b.construct("C", vec![zeros]);
    let aw = b.awaitable_nowait(c);
    let body = b.call_method(aw, "b", vec![]);
    module.define(ScriptFunction::new("main", vec![], body));

    match compile(module, "main") {
        Err(ScriptError::MemberNotFound(err)) => {
            assert_eq!(err.type_name, "C");
            assert_eq!(err.member, "b");
            assert_eq!(err.kind, MemberKind::Method);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn argument_type_checked() {
    let mut b = AstBuilder::new();
    let mut module = with_delayed_int(&mut b);
    let arg = b.string("ninety-nine");
    let body = b.awaitable("delayed", vec![arg]);
    module.define(ScriptFunction::new("main", vec![], body));

    assert!(matches!(
        compile(module, "main"),
        Err(ScriptError::TypeConstraint(err)) if err.context == "argument 1 of 'delayed'"
    ));
}

#[test]
fn opaque_class_not_scriptable() {
    let mut b = AstBuilder::new();
    let mut module = Module::new();
    module.define_class(Class::new("Tree").field("v", Type::Int).opaque());
    let v = b.int(2);
    let body = b.construct("Tree", vec![v]);
    module.define(ScriptFunction::new("main", vec![], body));

    assert_eq!(
        compile(module, "main"),
        Err(ScriptError::NotScriptable {
            class: "Tree".into()
        })
    );
}

#[test]
fn unknown_callee() {
    let mut b = AstBuilder::new();
    let mut module = Module::new();
    let body = b.awaitable("missing", vec![]);
    module.define(ScriptFunction::new("main", vec![], body));
    assert_eq!(
        compile(module, "main"),
        Err(ScriptError::UnknownFunction("missing".into()))
    );
}

#[test]
fn errors_display() {
    let err = ScriptError::type_constraint("annotation", Type::Int, Type::Text);
    assert_eq!(err.to_string(), "type error: annotation: expected int but found str");
}
