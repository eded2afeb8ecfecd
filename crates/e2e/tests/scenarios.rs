//! Runs each bundled scenario through the full pipeline.

use std::path::PathBuf;

use test_case::test_case;

use silentcheck_e2e::runner::RunnerConfig;
use silentcheck_e2e::{ScenarioRunner, ScenarioSpec};

fn runner() -> ScenarioRunner {
    let tmp = std::env::temp_dir().join("silentcheck-scenario-results");
    ScenarioRunner::with_config(RunnerConfig {
        scenarios_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios"),
        output_dir: tmp,
    })
}

#[test_case("screenshots-only" ; "screenshots alone stay unproven")]
#[test_case("observed-network" ; "network log proves observation")]
#[test_case("mixed-results" ; "mixed expectations")]
#[test_case("policy-suppression" ; "ignore rule suppresses")]
#[test_case("policy-downgrade" ; "downgrade rule lowers status")]
#[test_case("observer-incomplete" ; "incomplete beats findings")]
#[test_case("scope-gating" ; "out of scope routes become silences")]
#[test_case("journey-stall" ; "stalled journey is reported")]
fn scenario_passes(name: &str) {
    let result = runner().run_named(name).unwrap();
    assert!(
        result.success,
        "scenario {} failed: {:?} {:?}",
        name, result.failures, result.error
    );
    assert!(result.run_id.is_some());
}

#[test]
fn every_bundled_scenario_has_a_unique_name() {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios");
    let specs = ScenarioSpec::load_all(&dir).unwrap();
    assert_eq!(specs.len(), 8);

    let mut names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
    names.dedup();
    assert_eq!(names.len(), specs.len());
}

#[test]
fn tagged_run_only_includes_matching_scenarios() {
    let suite = runner().run_tagged("policy").unwrap();
    assert_eq!(suite.total, 2);
    assert_eq!(suite.failed, 0);
}

#[test]
fn unknown_scenario_is_not_found() {
    assert!(runner().run_named("no-such-scenario").is_err());
}

#[test]
fn failing_expectation_is_reported() {
    let yaml = r#"
name: wrong-exit-code
learn:
  expectations:
    - id: e1
      type: navigation
      promise: { kind: navigate, value: /about }
      source: { file: src/App.jsx, line: 3 }
      confidence: 0.9
expect:
  exit_code: 20
"#;
    let spec = ScenarioSpec::from_yaml(yaml).unwrap();
    let result = runner().run_scenario(&spec);

    // a lone coverage gap is informational, so the run exits 0
    assert!(!result.success);
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.failures.len(), 1);
    assert!(result.failures[0].starts_with("exit code"));
}
