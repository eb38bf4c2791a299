//! Every catalogued scenario passes through the harness, with and without
//! coalesced waits and worker threads.

use awaitable_script::scenarios;
use awaitable_script::{Config, Harness};

fn run_all(config: Config) {
    let harness = Harness::new(config);
    for scenario in scenarios::all() {
        let report = harness.check(&scenario);
        assert!(
            report.matched,
            "scenario '{}' failed under {config:?}: {report:?}",
            scenario.name
        );
    }
}

#[test]
fn all_scenarios_match() {
    run_all(Config::default());
}

#[test]
fn all_scenarios_match_with_coalesced_waits() {
    run_all(Config::default().with_coalesce_waits(true));
}

#[test]
fn all_scenarios_match_with_spawned_producers() {
    run_all(Config::default().with_spawn_awaits(true));
}

#[test]
fn scenario_names_are_unique() {
    let all = scenarios::all();
    let mut names: Vec<_> = all.iter().map(|s| s.name).collect();
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), all.len());
    assert_eq!(all.len(), 16);
}

#[test]
fn out_of_interpreter_returns_unforced_await() {
    let scenario = scenarios::find("out_of_interpreter").unwrap();
    let report = Harness::new(Config::default()).check(&scenario);
    assert!(report.deferred);
    assert!(report.matched);
}

#[test]
fn non_scriptable_is_rejected_by_compiler() {
    let scenario = scenarios::find("non_scriptable").unwrap();
    let report = Harness::new(Config::default()).check(&scenario);
    assert!(report.matched, "{report:?}");
    assert_eq!(report.eager.as_deref(), Some("3"));
    assert!(report.compiled.unwrap().starts_with("rejected:"));
}

#[test]
fn report_serializes() {
    let scenario = scenarios::find("class_return").unwrap();
    let report = Harness::new(Config::default()).check(&scenario);
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["name"], "class_return");
    assert_eq!(json["waits"], 1);
    assert_eq!(json["matched"], true);
}
