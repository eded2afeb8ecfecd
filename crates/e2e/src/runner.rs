//! Scenario runner: drives the pipeline for each scenario and checks the
//! committed artifacts against the scenario's expectations.

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use silentcheck_core::artifacts::ArtifactKind;
use silentcheck_core::integrity::verify_run;
use silentcheck_core::pipeline::Summary;
use silentcheck_core::run_id::RunInputs;
use silentcheck_core::{
    replay_run, run_analysis, AnalysisInput, Config, Finding, RunContext, RunOutcome,
};

use crate::error::{E2eError, E2eResult};
use crate::spec::{ExpectedFinding, ExpectedStats, ScenarioSpec};

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub run_id: Option<String>,
    pub exit_code: Option<i32>,
    pub failures: Vec<String>,
    pub error: Option<String>,
}

/// Result of running all scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

/// Runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub scenarios_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            scenarios_dir: PathBuf::from("scenarios"),
            output_dir: PathBuf::from("test-results"),
        }
    }
}

/// Scenario runner
pub struct ScenarioRunner {
    config: RunnerConfig,
}

impl ScenarioRunner {
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    pub fn with_config(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Run all scenarios in the scenarios directory
    pub fn run_all(&self) -> E2eResult<SuiteResult> {
        let specs = ScenarioSpec::load_all(&self.config.scenarios_dir)?;
        Ok(self.run_specs(&specs))
    }

    /// Run scenarios matching a tag
    pub fn run_tagged(&self, tag: &str) -> E2eResult<SuiteResult> {
        let specs = ScenarioSpec::load_all(&self.config.scenarios_dir)?;
        let filtered: Vec<ScenarioSpec> = ScenarioSpec::filter_by_tag(&specs, tag)
            .into_iter()
            .cloned()
            .collect();
        Ok(self.run_specs(&filtered))
    }

    /// Run a specific scenario by name
    pub fn run_named(&self, name: &str) -> E2eResult<ScenarioResult> {
        let specs = ScenarioSpec::load_all(&self.config.scenarios_dir)?;
        let spec = specs
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::NotFound(name.to_string()))?;
        Ok(self.run_scenario(&spec))
    }

    /// Run a list of scenarios
    pub fn run_specs(&self, specs: &[ScenarioSpec]) -> SuiteResult {
        let start = Instant::now();
        let mut results = Vec::with_capacity(specs.len());

        for spec in specs {
            info!("Running scenario: {}", spec.name);
            let result = self.run_scenario(spec);
            if result.success {
                info!("✓ {} ({}ms)", spec.name, result.duration_ms);
            } else {
                error!("✗ {}", spec.name);
                for failure in &result.failures {
                    error!("    {}", failure);
                }
                if let Some(e) = &result.error {
                    error!("    error: {}", e);
                }
            }
            results.push(result);
        }

        let passed = results.iter().filter(|r| r.success).count();
        SuiteResult {
            total: results.len(),
            passed,
            failed: results.len() - passed,
            duration_ms: start.elapsed().as_millis() as u64,
            results,
        }
    }

    /// Run one scenario in its own temporary output directory
    pub fn run_scenario(&self, spec: &ScenarioSpec) -> ScenarioResult {
        let start = Instant::now();
        let mut result = ScenarioResult {
            name: spec.name.clone(),
            success: false,
            duration_ms: 0,
            run_id: None,
            exit_code: None,
            failures: Vec::new(),
            error: None,
        };

        match execute(spec) {
            Ok((outcome, failures)) => {
                result.run_id = Some(outcome.run_id);
                result.exit_code = Some(outcome.exit_code.code());
                result.success = failures.is_empty();
                result.failures = failures;
            }
            Err(e) => result.error = Some(e.to_string()),
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        result
    }

    /// Write suite results as JSON
    pub fn write_results(&self, suite: &SuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;
        let path = self.config.output_dir.join("scenario-results.json");
        std::fs::write(&path, serde_json::to_string_pretty(suite)?)?;
        Ok(path)
    }
}

impl Default for ScenarioRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Analyze a scenario's inputs into a fresh output directory.
pub fn analyze_scenario(spec: &ScenarioSpec, out_dir: &Path) -> E2eResult<RunOutcome> {
    let mut config = Config::default();
    config.output.out_dir = out_dir.to_path_buf();
    let inputs = RunInputs {
        url: spec.url.clone(),
        base_origin: spec.url.clone(),
        safety_flags: spec.flags.clone(),
        ..Default::default()
    };

    let mut ctx = RunContext::new(config, inputs)?;
    let outcome = run_analysis(
        &mut ctx,
        &AnalysisInput {
            learn: spec.learn.clone(),
            observe: spec.observe.clone(),
            policy: spec.policy.clone(),
            ..Default::default()
        },
    )?;
    Ok(outcome)
}

fn execute(spec: &ScenarioSpec) -> E2eResult<(RunOutcome, Vec<String>)> {
    let tmp = tempfile::TempDir::new()?;
    let outcome = analyze_scenario(spec, tmp.path())?;
    let mut failures = Vec::new();
    let expect = &spec.expect;

    if let Some(code) = expect.exit_code {
        check(&mut failures, "exit code", code, outcome.exit_code.code());
    }
    if let Some(state) = expect.truth_state {
        check(&mut failures, "truth state", state, outcome.truth.truth_state);
    }
    if let Some(stats) = &expect.stats {
        check_stats(&mut failures, stats, &outcome);
    }
    if let Some(count) = expect.finding_count {
        check(&mut failures, "finding count", count, outcome.findings.len());
    }
    for wanted in &expect.findings {
        let matching = outcome
            .findings
            .iter()
            .filter(|f| finding_matches(wanted, f))
            .count();
        if matching != 1 {
            failures.push(format!("{} finding(s) matched {:?}", matching, wanted));
        }
    }

    if !expect.silences.is_empty() {
        let summary: Summary = serde_json::from_slice(&std::fs::read(
            outcome.run_dir.join(ArtifactKind::Summary.file_name()),
        )?)?;
        for silence in &expect.silences {
            if !summary.silences.contains(silence) {
                failures.push(format!("missing silence {:?}", silence));
            }
        }
    }

    let report = verify_run(&outcome.run_dir)?;
    if !report.is_clean() {
        failures.push(format!("integrity violations: {:?}", report.violations));
    }

    if expect.replayable {
        let replay = replay_run(&outcome.run_dir)?;
        if !replay.is_clean() {
            failures.push("replay did not reproduce findings.json".to_string());
        }
    }

    if expect.deterministic {
        let second_tmp = tempfile::TempDir::new()?;
        let second = analyze_scenario(spec, second_tmp.path())?;
        let name = ArtifactKind::Findings.file_name();
        let first_bytes = std::fs::read(outcome.run_dir.join(name))?;
        let second_bytes = std::fs::read(second.run_dir.join(name))?;
        if first_bytes != second_bytes {
            failures.push("findings.json differs between identical runs".to_string());
        }
        check(&mut failures, "run id", &outcome.run_id, &second.run_id);
    }

    debug!("Scenario {} produced {} failure(s)", spec.name, failures.len());
    Ok((outcome, failures))
}

fn check<T: PartialEq + std::fmt::Debug>(failures: &mut Vec<String>, what: &str, expected: T, actual: T) {
    if expected != actual {
        failures.push(format!("{}: expected {:?}, got {:?}", what, expected, actual));
    }
}

fn check_stats(failures: &mut Vec<String>, expected: &ExpectedStats, outcome: &RunOutcome) {
    let actual = outcome.stats;
    let pairs = [
        ("stats.total", expected.total, actual.total),
        ("stats.observed", expected.observed, actual.observed),
        ("stats.silentFailures", expected.silent_failures, actual.silent_failures),
        ("stats.coverageGaps", expected.coverage_gaps, actual.coverage_gaps),
        ("stats.unproven", expected.unproven, actual.unproven),
        ("stats.journeyStalls", expected.journey_stalls, actual.journey_stalls),
    ];
    for (what, wanted, got) in pairs {
        if let Some(wanted) = wanted {
            check(failures, what, wanted, got);
        }
    }
    if !actual.is_balanced() {
        failures.push(format!("stats do not sum to total: {:?}", actual));
    }
}

fn finding_matches(wanted: &ExpectedFinding, finding: &Finding) -> bool {
    wanted
        .expectation_id
        .as_ref()
        .map_or(true, |id| finding.expectation_id.as_ref() == Some(id))
        && wanted.kind.map_or(true, |k| finding.kind == k)
        && wanted
            .classification
            .map_or(true, |c| finding.classification == c)
        && wanted.status.map_or(true, |s| finding.status == s)
        && wanted
            .confidence
            .map_or(true, |c| (finding.confidence - c).abs() < 1e-9)
        && wanted.suppressed.map_or(true, |s| finding.suppressed == s)
        && wanted.downgraded.map_or(true, |d| finding.downgraded == d)
        && wanted
            .reason
            .as_ref()
            .map_or(true, |r| finding.reason == *r)
}
