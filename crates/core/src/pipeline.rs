//! Run pipeline
//!
//! Wires the stages of one analysis run together:
//!
//! ```text
//!   learn.json ──► scope gate ──► detect ──┐
//!                                          ├──► policy ──► determinism guard
//!   observe.json ─► frontier    journey ───┘                     │
//!                                                                ▼
//!            staging ──► self-verify ──► truth ──► summary ──► integrity ──► commit
//! ```
//!
//! All per-run state lives in a [`RunContext`] that is created for one run
//! and dropped with it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::artifacts::ArtifactKind;
use crate::canonical::{to_canonical_json, to_canonical_jsonl};
use crate::config::Config;
use crate::detect::detect;
use crate::error::{Error, ExitCode, Result};
use crate::integrity::{sha256_hex, verify_run, IntegrityManifest, ReplayReport};
use crate::journey;
use crate::policy::{apply_policy, count_non_suppressed_findings, Policy, SeverityCounts};
use crate::run_id::{compute_run_id, InputDigests, RunInputs, RunManifest};
use crate::scope::{
    FrontierDecision, FrontierReason, ScopeClassification, ScopeFrontier, ScopePolicy, ScopeReport,
};
use crate::silence::{sort_silences, SilenceEntry};
use crate::staging::StagedRun;
use crate::truth::{resolve, IncompleteReason, TruthResolution};
use crate::types::{
    DetectionStats, Expectation, ExpectationType, Finding, LearnData, ObserveData, ObserveStatus,
};

// ============================================================================
// Run context
// ============================================================================

/// Memo tables scoped to one run
#[derive(Debug, Default)]
pub struct RunCache {
    scope: BTreeMap<String, ScopeClassification>,
    artifact_hashes: BTreeMap<String, String>,
}

impl RunCache {
    pub fn classify(&mut self, policy: &ScopePolicy, route: &str) -> ScopeClassification {
        *self
            .scope
            .entry(route.to_string())
            .or_insert_with(|| policy.classify(route))
    }

    pub fn record_hash(&mut self, artifact: &str, bytes: &[u8]) {
        self.artifact_hashes
            .insert(artifact.to_string(), sha256_hex(bytes));
    }

    pub fn artifact_hash(&self, artifact: &str) -> Option<&str> {
        self.artifact_hashes.get(artifact).map(String::as_str)
    }

    pub fn scope_entries(&self) -> usize {
        self.scope.len()
    }
}

/// Everything one run needs, owned for the run's lifetime
#[derive(Debug)]
pub struct RunContext {
    config: Config,
    inputs: RunInputs,
    run_id: String,
    scope: ScopePolicy,
    cache: RunCache,
}

impl RunContext {
    pub fn new(config: Config, inputs: RunInputs) -> Result<Self> {
        config.validate()?;
        let run_id = compute_run_id(&inputs, config.output.run_id_length)?;
        let base_origin = Some(inputs.base_origin.as_str()).filter(|o| !o.is_empty());
        let scope = config.scope_policy(base_origin);

        Ok(Self {
            config,
            inputs,
            run_id,
            scope,
            cache: RunCache::default(),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &RunCache {
        &self.cache
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.config.runs_dir()
    }
}

// ============================================================================
// Artifacts
// ============================================================================

/// `findings.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindingsDocument {
    pub findings: Vec<Finding>,
    pub stats: DetectionStats,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageSummary {
    pub expectations_total: usize,
    pub evaluated: usize,
    pub attempted: usize,
    pub observed: usize,
    pub skipped: usize,
    pub out_of_scope: usize,
    /// observed / evaluated
    pub ratio: f64,
}

/// `summary.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub run_id: String,
    #[serde(flatten)]
    pub truth: TruthResolution,
    pub coverage: CoverageSummary,
    pub counts: SeverityCounts,
    pub stats: DetectionStats,
    pub scope: ScopeReport,
    pub frontier: Vec<FrontierDecision>,
    pub silences: Vec<SilenceEntry>,
}

/// `diagnostics.json`, never hashed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub tool_version: String,
    #[serde(default)]
    pub argv: Vec<String>,
    #[serde(default)]
    pub scope_cache_entries: usize,
}

/// Collaborator inputs for one run
#[derive(Debug, Clone, Default)]
pub struct AnalysisInput {
    pub learn: LearnData,
    pub observe: ObserveData,
    pub policy: Option<Policy>,
    /// `learn.json` as handed over, stored instead of `learn` when present
    pub learn_document: Option<Value>,
    /// `observe.json` as handed over, stored instead of `observe` when present
    pub observe_document: Option<Value>,
}

impl AnalysisInput {
    /// Parse collaborator documents, keeping the originals so the run stores
    /// fields this version does not model.
    pub fn from_documents(learn: Value, observe: Value, policy: Option<Policy>) -> Result<Self> {
        Ok(Self {
            learn: serde_json::from_value(learn.clone())
                .map_err(|e| Error::Data(format!("malformed learn data: {}", e)))?,
            observe: serde_json::from_value(observe.clone())
                .map_err(|e| Error::Data(format!("malformed observe data: {}", e)))?,
            policy,
            learn_document: Some(learn),
            observe_document: Some(observe),
        })
    }

    fn learn_bytes(&self) -> Result<Vec<u8>> {
        match &self.learn_document {
            Some(document) => to_canonical_json(document),
            None => to_canonical_json(&self.learn),
        }
    }

    fn observe_bytes(&self) -> Result<Vec<u8>> {
        match &self.observe_document {
            Some(document) => to_canonical_json(document),
            None => to_canonical_json(&self.observe),
        }
    }
}

/// What the CLI and report layer get back
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub findings: Vec<Finding>,
    pub stats: DetectionStats,
    pub counts: SeverityCounts,
    pub truth: TruthResolution,
    pub exit_code: ExitCode,
}

// ============================================================================
// Stages
// ============================================================================

struct ScopeGate {
    evaluated: Vec<Expectation>,
    out_of_scope: usize,
    report: ScopeReport,
    silences: Vec<SilenceEntry>,
}

/// Drop navigation expectations that target out-of-scope routes, recording
/// each one as a silence entry.
fn gate_expectations(ctx: &mut RunContext, learn: &LearnData) -> ScopeGate {
    let mut evaluated = Vec::with_capacity(learn.expectations.len());
    let mut silences = Vec::new();
    let mut routes = Vec::new();

    for expectation in &learn.expectations {
        if expectation.expectation_type != ExpectationType::Navigation {
            evaluated.push(expectation.clone());
            continue;
        }
        let route = expectation.promise.value.as_str();
        routes.push(route);
        let classification = ctx.cache.classify(&ctx.scope, route);
        if classification.is_in_scope() {
            evaluated.push(expectation.clone());
        } else {
            debug!("Expectation {} gated: {} is {}", expectation.id, route, classification);
            silences.push(SilenceEntry::new("scope", classification.as_str(), route));
        }
    }

    for skipped in &learn.skipped {
        let description = match &skipped.source {
            Some(source) if skipped.detail.is_empty() => source.to_string(),
            Some(source) => format!("{} ({})", skipped.detail, source),
            None => skipped.detail.clone(),
        };
        silences.push(SilenceEntry::new("learn", skipped.reason.clone(), description));
    }

    let out_of_scope = learn.expectations.len() - evaluated.len();
    ScopeGate {
        evaluated,
        out_of_scope,
        report: ctx.scope.classify_many(&routes),
        silences,
    }
}

/// Replay the Observer's discovered routes through the runtime frontier.
fn run_frontier(ctx: &RunContext, observe: &ObserveData) -> (Vec<FrontierDecision>, Vec<SilenceEntry>) {
    let mut frontier = ScopeFrontier::new(ctx.scope.clone());
    for route in &observe.discovered_routes {
        frontier.try_add(route);
    }
    let decisions = frontier.into_decisions();
    let silences = decisions
        .iter()
        .filter(|d| d.reason == FrontierReason::OutOfScopeRuntime)
        .map(|d| SilenceEntry::new("frontier", "out_of_scope_runtime", d.route.clone()))
        .collect();
    (decisions, silences)
}

/// Detection, journey analysis and policy over already-gated expectations.
fn evaluate_findings(
    config: &Config,
    expectations: &[Expectation],
    observe: &ObserveData,
    policy: Option<&Policy>,
) -> Result<FindingsDocument> {
    let wanted: BTreeSet<&str> = expectations.iter().map(|e| e.id.as_str()).collect();
    let observations: Vec<_> = observe
        .observations
        .iter()
        .filter(|o| wanted.contains(o.id.as_str()))
        .cloned()
        .collect();

    let outcome = detect(expectations, &observations)?;
    let mut stats = outcome.stats;
    let mut findings = outcome.findings;

    let stalls = journey::analyze(&observe.traces, &config.journey);
    stats.journey_stalls = stalls.len();
    findings.extend(stalls);
    findings.sort_by(|a, b| a.id.cmp(&b.id));

    let mut seen = BTreeSet::new();
    for finding in &findings {
        if !seen.insert(finding.id.as_str()) {
            return Err(Error::InvariantViolation(format!(
                "duplicate finding id {}",
                finding.id
            )));
        }
    }

    let findings = match policy {
        Some(policy) => apply_policy(&findings, policy),
        None => findings,
    };

    Ok(FindingsDocument { findings, stats })
}

/// Compare two independent evaluations of the same inputs.
pub fn check_determinism(first: &[u8], second: &[u8]) -> Option<IncompleteReason> {
    let (a, b) = (sha256_hex(first), sha256_hex(second));
    if a == b {
        None
    } else {
        Some(IncompleteReason::DeterminismViolation(format!(
            "findings hash {} != {}",
            &a[..12],
            &b[..12]
        )))
    }
}

fn coverage(learn: &LearnData, gate: &ScopeGate, observe: &ObserveData) -> CoverageSummary {
    let ids: BTreeSet<&str> = gate.evaluated.iter().map(|e| e.id.as_str()).collect();
    let relevant = observe
        .observations
        .iter()
        .filter(|o| ids.contains(o.id.as_str()));
    let attempted = relevant.clone().filter(|o| o.attempted).count();
    let observed = relevant.filter(|o| o.attempted && o.observed).count();
    let evaluated = gate.evaluated.len();

    CoverageSummary {
        expectations_total: learn.expectations.len(),
        evaluated,
        attempted,
        observed,
        skipped: learn.skipped.len(),
        out_of_scope: gate.out_of_scope,
        ratio: if evaluated == 0 {
            0.0
        } else {
            observed as f64 / evaluated as f64
        },
    }
}

fn write_artifact(ctx: &mut RunContext, staged: &StagedRun, kind: ArtifactKind, bytes: &[u8]) -> Result<()> {
    staged.write(kind.file_name(), bytes)?;
    ctx.cache.record_hash(kind.file_name(), bytes);
    debug!("Staged {} ({} bytes)", kind, bytes.len());
    Ok(())
}

/// Artifacts whose hash in the integrity manifest differs from the one
/// recorded when they were written.
fn manifest_drift(cache: &RunCache, integrity: &IntegrityManifest) -> Vec<String> {
    integrity
        .artifacts
        .iter()
        .filter(|(name, digest)| cache.artifact_hash(name) != Some(digest.sha256.as_str()))
        .map(|(name, _)| name.clone())
        .collect()
}

/// Re-hash staged artifacts from disk and compare against what was written.
fn self_verify(ctx: &RunContext, staged: &StagedRun, kinds: &[ArtifactKind]) -> Result<Vec<String>> {
    let mut mismatched = Vec::new();
    for kind in kinds {
        let on_disk = crate::integrity::hash_file(staged.staging_dir().join(kind.file_name()))?;
        if ctx.cache.artifact_hash(kind.file_name()) != Some(on_disk.as_str()) {
            mismatched.push(kind.file_name().to_string());
        }
    }
    Ok(mismatched)
}

// ============================================================================
// Entry points
// ============================================================================

/// Analyze one run and commit its artifacts under `<out_dir>/runs/<run_id>/`.
pub fn run_analysis(ctx: &mut RunContext, input: &AnalysisInput) -> Result<RunOutcome> {
    let started_at = Utc::now();
    let clock = Instant::now();
    info!("Starting run {} for {}", ctx.run_id, ctx.inputs.url);

    if let Some(policy) = &input.policy {
        policy.validate()?;
    }

    let gate = gate_expectations(ctx, &input.learn);
    let (frontier, frontier_silences) = run_frontier(ctx, &input.observe);

    let policy = input.policy.as_ref();
    let document = evaluate_findings(&ctx.config, &gate.evaluated, &input.observe, policy)?;
    let findings_bytes = to_canonical_json(&document)?;
    let replayed = evaluate_findings(&ctx.config, &gate.evaluated, &input.observe, policy)?;

    let mut incomplete = Vec::new();
    if input.observe.status == ObserveStatus::Incomplete {
        if input.observe.incomplete_reasons.is_empty() {
            incomplete.push(IncompleteReason::Observer(
                "observer reported INCOMPLETE".to_string(),
            ));
        }
        for reason in &input.observe.incomplete_reasons {
            incomplete.push(IncompleteReason::Observer(reason.clone()));
        }
    }
    if let Some(reason) = check_determinism(&findings_bytes, &to_canonical_json(&replayed)?) {
        warn!("Determinism guard tripped for run {}", ctx.run_id);
        incomplete.push(reason);
    }

    let learn_bytes = input.learn_bytes()?;
    let observe_bytes = input.observe_bytes()?;
    let policy_bytes = policy.map(to_canonical_json).transpose()?;
    let manifest = RunManifest {
        run_id: ctx.run_id.clone(),
        tool_version: crate::VERSION.to_string(),
        inputs: ctx.inputs.clone(),
        settings: ctx.config.analysis_settings(),
        input_digests: InputDigests {
            learn: sha256_hex(&learn_bytes),
            observe: sha256_hex(&observe_bytes),
            policy: policy_bytes.as_deref().map(sha256_hex),
        },
    };

    let runs_dir = ctx.runs_dir();
    let mut staged = StagedRun::begin(&runs_dir, &ctx.run_id)?;

    let mut written = vec![
        ArtifactKind::RunManifest,
        ArtifactKind::Learn,
        ArtifactKind::Observe,
        ArtifactKind::Findings,
        ArtifactKind::Traces,
    ];
    write_artifact(ctx, &staged, ArtifactKind::RunManifest, &to_canonical_json(&manifest)?)?;
    write_artifact(ctx, &staged, ArtifactKind::Learn, &learn_bytes)?;
    write_artifact(ctx, &staged, ArtifactKind::Observe, &observe_bytes)?;
    if let Some(bytes) = &policy_bytes {
        write_artifact(ctx, &staged, ArtifactKind::Policy, bytes)?;
        written.push(ArtifactKind::Policy);
    }
    write_artifact(ctx, &staged, ArtifactKind::Findings, &findings_bytes)?;
    write_artifact(
        ctx,
        &staged,
        ArtifactKind::Traces,
        &to_canonical_jsonl(&input.observe.traces)?,
    )?;

    for artifact in self_verify(ctx, &staged, &written)? {
        warn!("Staged artifact {} does not match what was written", artifact);
        incomplete.push(IncompleteReason::IntegrityFailure(artifact));
    }

    let counts = count_non_suppressed_findings(&document.findings);
    let mut truth = resolve(&incomplete, &counts);

    let mut silences = gate.silences.clone();
    silences.extend(frontier_silences);
    sort_silences(&mut silences);

    let mut summary = Summary {
        run_id: ctx.run_id.clone(),
        truth: truth.clone(),
        coverage: coverage(&input.learn, &gate, &input.observe),
        counts,
        stats: document.stats,
        scope: gate.report.clone(),
        frontier,
        silences,
    };
    write_artifact(ctx, &staged, ArtifactKind::Summary, &to_canonical_json(&summary)?)?;

    let mut integrity = IntegrityManifest::build(&ctx.run_id, staged.staging_dir())?;
    let drifted = manifest_drift(&ctx.cache, &integrity);
    if !drifted.is_empty() {
        for name in drifted {
            warn!("{} changed between write and manifest", name);
            incomplete.push(IncompleteReason::IntegrityFailure(name));
        }
        truth = resolve(&incomplete, &counts);
        summary.truth = truth.clone();
        write_artifact(ctx, &staged, ArtifactKind::Summary, &to_canonical_json(&summary)?)?;
        integrity = IntegrityManifest::build(&ctx.run_id, staged.staging_dir())?;
    }
    staged.write(
        ArtifactKind::IntegrityManifest.file_name(),
        &integrity.to_bytes()?,
    )?;

    let finished_at = Utc::now();
    let diagnostics = Diagnostics {
        run_id: ctx.run_id.clone(),
        started_at,
        finished_at,
        duration_ms: clock.elapsed().as_millis() as u64,
        tool_version: crate::VERSION.to_string(),
        argv: ctx.inputs.argv.clone(),
        scope_cache_entries: ctx.cache.scope_entries(),
    };
    staged.write(
        ArtifactKind::Diagnostics.file_name(),
        &to_canonical_json(&diagnostics)?,
    )?;

    let run_dir = staged.commit()?;
    info!(
        "Run {} finished: {} (exit {})",
        ctx.run_id, truth.truth_state, truth.exit_code
    );

    Ok(RunOutcome {
        run_id: ctx.run_id.clone(),
        run_dir,
        findings: document.findings,
        stats: document.stats,
        counts,
        exit_code: truth.truth_state.exit_code(),
        truth,
    })
}

/// Result of a full replay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayOutcome {
    pub integrity: ReplayReport,
    /// None when integrity failed and findings were not recomputed
    pub findings_reproduced: Option<bool>,
}

impl ReplayOutcome {
    pub fn is_clean(&self) -> bool {
        self.integrity.is_clean() && self.findings_reproduced != Some(false)
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.is_clean() {
            ExitCode::Success
        } else {
            ExitCode::Incomplete
        }
    }
}

fn read_artifact<T: serde::de::DeserializeOwned>(dir: &Path, kind: ArtifactKind) -> Result<T> {
    let path = dir.join(kind.file_name());
    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Data(format!("cannot read {}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| Error::Data(format!("malformed {}: {}", path.display(), e)))
}

/// Verify a committed run's integrity, then recompute its findings from the
/// stored inputs and check `findings.json` is reproduced byte for byte.
pub fn replay_run(dir: &Path) -> Result<ReplayOutcome> {
    let mut integrity = verify_run(dir)?;
    if !integrity.is_clean() {
        return Ok(ReplayOutcome {
            integrity,
            findings_reproduced: None,
        });
    }

    let manifest: RunManifest = read_artifact(dir, ArtifactKind::RunManifest)?;
    let learn: LearnData = read_artifact(dir, ArtifactKind::Learn)?;
    let observe: ObserveData = read_artifact(dir, ArtifactKind::Observe)?;
    let policy: Option<Policy> = if dir.join(ArtifactKind::Policy.file_name()).exists() {
        Some(read_artifact(dir, ArtifactKind::Policy)?)
    } else {
        None
    };

    let config = Config::from_settings(&manifest.settings);
    let mut ctx = RunContext::new(config, manifest.inputs)?;
    let gate = gate_expectations(&mut ctx, &learn);
    let document = evaluate_findings(&ctx.config, &gate.evaluated, &observe, policy.as_ref())?;
    let recomputed = to_canonical_json(&document)?;
    let stored = std::fs::read(dir.join(ArtifactKind::Findings.file_name()))?;

    let reproduced = recomputed == stored;
    if !reproduced {
        warn!("Replay of run {} did not reproduce findings.json", integrity.run_id);
        integrity.silences.push(SilenceEntry::new(
            "replay",
            "findings_drift",
            ArtifactKind::Findings.file_name(),
        ));
        sort_silences(&mut integrity.silences);
    }

    Ok(ReplayOutcome {
        integrity,
        findings_reproduced: Some(reproduced),
    })
}
