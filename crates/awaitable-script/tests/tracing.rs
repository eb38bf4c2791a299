//! Traces keep awaits symbolic.

use awaitable_script::scenarios;
use awaitable_script::tracer::trace;
use awaitable_script::{Compiler, Config, DType, Evaluator, ExprTag, Tensor, Value};
use std::sync::Arc;

fn tensor(value: f64) -> Value {
    Tensor::full(2, value, DType::Float32).into()
}

#[test]
fn jit_trace_records_awaitable_and_inlines_helpers() {
    let scenario = scenarios::find("jit_trace").unwrap();
    let trace = trace(Arc::clone(&scenario.module), "main", &scenario.inputs).unwrap();

    assert_eq!(trace.count(ExprTag::Awaitable), 1);
    assert_eq!(trace.count(ExprTag::Wait), 1);
    // `gap` is inlined into its kernels.
    let calls: Vec<_> = trace
        .function()
        .body
        .to_string()
        .lines()
        .filter(|line| line.contains("gap("))
        .map(str::to_owned)
        .collect();
    assert!(calls.is_empty(), "{calls:?}");
    assert_eq!(trace.awaits.len(), 1);
    assert_eq!(trace.awaits[0].producer.as_deref(), Some("delayed"));
    assert!(!trace.awaits[0].nowait);
}

#[test]
fn replay_matches_eager_on_new_inputs() {
    let scenario = scenarios::find("jit_trace").unwrap();
    let trace = trace(Arc::clone(&scenario.module), "main", &scenario.inputs).unwrap();
    let replay = Evaluator::eager(Arc::new(trace.into_module(&scenario.module)))
        .with_config(Config::default());
    let eager = Evaluator::eager(Arc::clone(&scenario.module)).with_config(Config::default());

    for input in [0.0, 1.0, -2.5] {
        let args = [tensor(input), tensor(input)];
        let expected = eager.call("main", &args).unwrap();
        let actual = replay.call(&trace.name, &args).unwrap();
        assert!(expected.allclose(&actual), "{expected} != {actual}");
    }
}

#[test]
fn wrapped_function_stays_a_call() {
    let scenario = scenarios::find("fx_wrap").unwrap();
    let trace = trace(Arc::clone(&scenario.module), "forward", &scenario.inputs).unwrap();
    let printed = trace.body.to_string();

    assert!(printed.contains("cfx_wrapped("), "{printed}");
    assert!(!printed.contains("process("), "{printed}");
    // The await comes out of the wrapped call, not out of the trace.
    assert_eq!(trace.count(ExprTag::Awaitable), 0);
}

#[test]
fn traced_module_compiles() {
    let scenario = scenarios::find("fx_wrap").unwrap();
    let trace = trace(Arc::clone(&scenario.module), "forward", &scenario.inputs).unwrap();
    let traced = Arc::new(trace.into_module(&scenario.module));
    let compiled = Compiler::compile_with(traced, &trace.name, Config::default()).unwrap();
    assert_eq!(compiled.count(ExprTag::Wait), 1);
    assert!(compiled.function("cfx_delayed").is_some());

    let args = [tensor(0.75), tensor(0.75)];
    let expected = Evaluator::eager(Arc::clone(&scenario.module))
        .with_config(Config::default())
        .call("forward", &args)
        .unwrap();
    let actual = Evaluator::compiled(Arc::new(compiled))
        .call(&trace.name, &args)
        .unwrap();
    assert!(expected.allclose(&actual));
}

#[test]
fn nowait_traced_as_nowait_node() {
    let scenario = scenarios::find("nowait").unwrap();
    let trace = trace(Arc::clone(&scenario.module), "fn", &scenario.inputs).unwrap();
    assert_eq!(trace.count(ExprTag::AwaitableNoWait), 1);
    assert!(trace.awaits[0].nowait);
    assert_eq!(trace.awaits[0].producer, None);
}
