//! Member access forwarded through awaits of script values.

use awaitable::Members;
use awaitable_script::evaluator::{call_method, get_attr};
use awaitable_script::{AwaitValue, Class, DType, ScriptError, Tensor, Type, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn class_c() -> Arc<Class> {
    Arc::new(
        Class::new("C")
            .field("_a", Type::Tensor)
            .field("_b", Type::Tensor)
            .method("b", Type::Tensor, |this, _| this.field("_b")),
    )
}

#[test]
fn proxy_forces_once() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let class = class_c();
    let aw = AwaitValue::from_fn("C_wait_impl", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Object(
            class.instantiate(vec![Tensor::ones(2).into(), Tensor::zeros(2).into()])?,
        ))
    });
    let receiver = Value::Await(aw.clone());

    assert_eq!(get_attr(&receiver, "_a"), Ok(Tensor::ones(2).into()));
    assert_eq!(call_method(&receiver, "b", &[]), Ok(Tensor::zeros(2).into()));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(aw.stats().requests, 2);
}

#[test]
fn mutation_through_forced_object_is_visible() {
    let tree = Arc::new(Class::new("Tree").field("v", Type::Int).opaque());
    let object = tree.instantiate(vec![Value::Int(2)]).unwrap();
    let aw = AwaitValue::call(
        "delayed",
        |t: Value| {
            let object = t.as_object().cloned().ok_or(ScriptError::Assertion("tree".into()))?;
            let v = object.field("v")?.as_int().unwrap_or_default();
            object.set("v", Value::Int(v + 1))?;
            Ok(t)
        },
        Value::Object(object.clone()),
    );

    assert_eq!(aw.field("v"), Ok(Value::Int(3)));
    assert_eq!(object.get("v"), Some(Value::Int(3)));
}

#[test]
fn dtype_forwarded_without_explicit_force() {
    let t = Tensor::full(2, 1.0, DType::Int64);
    let aw = AwaitValue::call(
        "delayed",
        |x: Value| Ok(x),
        Value::Tensor(t.clone()),
    );
    assert!(!aw.is_forced());
    assert_eq!(aw.field("dtype"), Ok(Value::text(t.dtype().name())));
    assert!(aw.is_forced());
}

#[test]
fn missing_member_reports_type() {
    let aw = AwaitValue::nowait(Value::Int(1));
    match aw.field("dtype") {
        Err(ScriptError::MemberNotFound(err)) => {
            assert_eq!(err.type_name, "int");
            assert_eq!(err.to_string(), "'int' has no field named 'dtype'");
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(Value::Int(1).type_name(), "int");
}
