//! Runs scenarios through the eager, compiled and traced paths and reports
//! whether they agree.

use crate::ast::ExprTag;
use crate::compiler::Compiler;
use crate::config::Config;
use crate::error::{Result, ScriptError};
use crate::evaluator::{CallArgs, Evaluator};
use crate::scenarios::{Check, Scenario};
use crate::tracer;
use crate::value::Value;
use serde::Serialize;
use std::sync::Arc;

/// Forces every await in `value`, including awaits nested in tuples and lists.
pub fn resolve(value: Value) -> Result<Value> {
    match value {
        Value::Await(aw) => resolve(aw.force()?),
        Value::Tuple(items) => Ok(Value::tuple(
            items.iter().cloned().map(resolve).collect::<Result<Vec<_>>>()?,
        )),
        Value::List(items) => Ok(Value::list(
            items.iter().cloned().map(resolve).collect::<Result<Vec<_>>>()?,
        )),
        other => Ok(other),
    }
}

/// Outcome of one scenario.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    pub name: String,
    pub check: String,
    /// Resolved eager result.
    pub eager: Option<String>,
    /// Resolved compiled (or replayed) result, or the compiler's rejection.
    pub compiled: Option<String>,
    /// The eager entry returned an unforced await.
    pub deferred: bool,
    pub waits: Option<usize>,
    pub expected_waits: Option<usize>,
    pub matched: bool,
    pub error: Option<String>,
}

pub struct Harness {
    config: Config,
}

impl Harness {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> Config {
        self.config
    }

    /// Runs `scenario`; failures end up in the report, never as panics.
    pub fn check(&self, scenario: &Scenario) -> Report {
        let mut report = Report {
            name: scenario.name.to_string(),
            check: scenario.check.name().to_string(),
            expected_waits: scenario.expected_waits,
            ..Report::default()
        };
        match self.run(scenario, &mut report) {
            Ok(matched) => report.matched = matched,
            Err(err) => {
                log::debug!("{}: {err}", scenario.name);
                report.error = Some(err.to_string());
            }
        }
        report
    }

    fn run(&self, scenario: &Scenario, report: &mut Report) -> Result<bool> {
        match &scenario.check {
            Check::Compare => self.compare(scenario, report),
            Check::Introspect => {
                let compared = self.compare(scenario, report)?;
                let raw = self.eager(scenario).call(scenario.entry, &scenario.inputs)?;
                Ok(compared && self.introspect(scenario, &raw)?)
            }
            Check::EagerOnly => {
                let eager = self.run_eager(scenario, report)?;
                let rejected = match Compiler::compile_with(
                    Arc::clone(&scenario.module),
                    scenario.entry,
                    self.config,
                ) {
                    Ok(_) => false,
                    Err(err) => {
                        report.compiled = Some(format!("rejected: {err}"));
                        matches!(err, ScriptError::NotScriptable { .. })
                    }
                };
                Ok(rejected && self.matches_expected(scenario, &eager))
            }
            Check::Traced {
                check_inputs,
                compile,
            } => self.traced(scenario, check_inputs, *compile, report),
        }
    }

    fn eager(&self, scenario: &Scenario) -> Evaluator {
        Evaluator::eager(Arc::clone(&scenario.module)).with_config(self.config)
    }

    fn run_eager(&self, scenario: &Scenario, report: &mut Report) -> Result<Value> {
        let raw = self.eager(scenario).call(scenario.entry, &scenario.inputs)?;
        report.deferred = raw.is_await();
        let value = resolve(raw)?;
        report.eager = Some(value.to_string());
        Ok(value)
    }

    fn matches_expected(&self, scenario: &Scenario, value: &Value) -> bool {
        scenario
            .expected
            .as_ref()
            .is_none_or(|expected| expected.allclose(value))
    }

    fn matches_waits(&self, scenario: &Scenario, waits: usize) -> bool {
        // Coalescing changes the count on purpose.
        self.config.coalesce_waits || scenario.expected_waits.is_none_or(|expected| expected == waits)
    }

    fn compare(&self, scenario: &Scenario, report: &mut Report) -> Result<bool> {
        let eager = self.run_eager(scenario, report)?;
        let compiled = Compiler::compile_with(
            Arc::clone(&scenario.module),
            scenario.entry,
            self.config,
        )?;
        let waits = compiled.count(ExprTag::Wait);
        report.waits = Some(waits);
        let value = resolve(
            Evaluator::compiled(Arc::new(compiled))
                .with_config(self.config)
                .call(scenario.entry, &scenario.inputs)?,
        )?;
        report.compiled = Some(value.to_string());
        Ok(eager.allclose(&value)
            && self.matches_expected(scenario, &eager)
            && self.matches_waits(scenario, waits))
    }

    /// Every await in `raw` must equal its producer re-run on its stored
    /// arguments; a no-wait value must have stored `(value,)`.
    fn introspect(&self, scenario: &Scenario, raw: &Value) -> Result<bool> {
        let evaluator = self.eager(scenario);
        let awaits: Vec<_> = match raw {
            Value::Await(aw) => vec![aw.clone()],
            Value::Tuple(items) => items.iter().filter_map(|item| item.as_await().cloned()).collect(),
            _ => Vec::new(),
        };
        for aw in awaits {
            let forced = aw.force()?;
            let agrees = match aw.producer_name() {
                Some(producer) => match aw.args::<CallArgs>() {
                    Some(args) => evaluator.call(producer, args)?.allclose(&forced),
                    None => false,
                },
                None => aw
                    .args::<(Value,)>()
                    .is_some_and(|(stored,)| stored.allclose(&forced)),
            };
            if !agrees {
                log::debug!("{}: {} disagrees with its producer", scenario.name, aw.id());
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn traced(
        &self,
        scenario: &Scenario,
        check_inputs: &[Value],
        compile: bool,
        report: &mut Report,
    ) -> Result<bool> {
        let trace = tracer::trace(Arc::clone(&scenario.module), scenario.entry, &scenario.inputs)?;
        let traced = Arc::new(trace.into_module(&scenario.module));

        let direct = resolve(self.eager(scenario).call(scenario.entry, check_inputs)?)?;
        report.eager = Some(direct.to_string());
        let replayed = resolve(
            Evaluator::eager(Arc::clone(&traced))
                .with_config(self.config)
                .call(&trace.name, check_inputs)?,
        )?;
        report.compiled = Some(replayed.to_string());
        let waits = trace.count(ExprTag::Wait);
        report.waits = Some(waits);

        let mut matched = direct.allclose(&replayed) && self.matches_waits(scenario, waits);
        if compile {
            let compiled = Compiler::compile_with(traced, &trace.name, self.config)?;
            let value = resolve(
                Evaluator::compiled(Arc::new(compiled))
                    .with_config(self.config)
                    .call(&trace.name, check_inputs)?,
            )?;
            matched &= direct.allclose(&value);
        }
        Ok(matched && self.matches_expected(scenario, &direct))
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new(Config::global())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::AwaitValue;

    #[test]
    fn resolve_reaches_into_tuples() {
        let inner = AwaitValue::nowait(Value::Int(1));
        let value = Value::tuple([Value::Await(inner), Value::Int(2)]);
        assert_eq!(resolve(value), Ok(Value::tuple([Value::Int(1), Value::Int(2)])));
    }
}
