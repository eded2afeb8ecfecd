//! Run retention
//!
//! Loading historical runs, deciding which may be deleted, and deleting
//! them. Planning is pure; only [`execute_cleanup`] touches the filesystem.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::artifacts::ArtifactKind;
use crate::error::Result;
use crate::pipeline::Diagnostics;
use crate::truth::TruthState;

/// Retention options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupOptions {
    pub keep_last: usize,
    pub older_than_days: Option<u32>,
    pub allow_delete_confirmed: bool,
}

/// One committed run as seen by the retention engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run_id: String,
    pub path: PathBuf,
    pub status: TruthState,
    pub created_at: DateTime<Utc>,
    pub confirmed_findings: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionReason {
    Incomplete,
    ConfirmedFindings,
}

impl std::fmt::Display for ProtectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtectionReason::Incomplete => write!(f, "incomplete run"),
            ProtectionReason::ConfirmedFindings => write!(f, "has confirmed findings"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunClassification {
    pub can_delete: bool,
    pub protected: Option<ProtectionReason>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedRun {
    pub run: RunRecord,
    pub reason: ProtectionReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupPlan {
    pub to_delete: Vec<RunRecord>,
    pub to_keep: Vec<RunRecord>,
    pub protected: Vec<ProtectedRun>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryHeader {
    truth_state: TruthState,
    #[serde(default)]
    counts: ConfirmedCount,
}

#[derive(Default, Deserialize)]
struct ConfirmedCount {
    #[serde(default)]
    confirmed: usize,
}

/// Load every committed run under `runs_dir`, oldest first.
///
/// A run whose summary cannot be read is treated as INCOMPLETE, so it is
/// always protected.
pub fn load_runs(runs_dir: &Path) -> Result<Vec<RunRecord>> {
    if !runs_dir.exists() {
        return Ok(Vec::new());
    }

    let mut runs = Vec::new();
    for entry in WalkDir::new(runs_dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || name.ends_with(".previous") {
            continue;
        }
        runs.push(load_run(entry.path(), name));
    }

    runs.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.run_id.cmp(&b.run_id))
    });
    debug!("Loaded {} run(s) from {}", runs.len(), runs_dir.display());
    Ok(runs)
}

fn load_run(path: &Path, run_id: String) -> RunRecord {
    let summary = std::fs::read_to_string(path.join(ArtifactKind::Summary.file_name()))
        .ok()
        .and_then(|s| serde_json::from_str::<SummaryHeader>(&s).ok());
    let (status, confirmed_findings) = match summary {
        Some(s) => (s.truth_state, s.counts.confirmed),
        None => {
            warn!("Run {} has no readable summary; treating as incomplete", run_id);
            (TruthState::Incomplete, 0)
        }
    };

    let created_at = std::fs::read_to_string(path.join(ArtifactKind::Diagnostics.file_name()))
        .ok()
        .and_then(|s| serde_json::from_str::<Diagnostics>(&s).ok())
        .map(|d| d.started_at)
        .or_else(|| {
            std::fs::metadata(path)
                .and_then(|m| m.modified())
                .ok()
                .map(DateTime::<Utc>::from)
        })
        .unwrap_or_else(|| DateTime::<Utc>::from(std::time::UNIX_EPOCH));

    RunRecord {
        run_id,
        path: path.to_path_buf(),
        status,
        created_at,
        confirmed_findings,
    }
}

/// Decide whether a single run may be deleted.
pub fn classify_run(run: &RunRecord, opts: &CleanupOptions) -> RunClassification {
    let protected = if run.status == TruthState::Incomplete {
        Some(ProtectionReason::Incomplete)
    } else if run.confirmed_findings > 0 && !opts.allow_delete_confirmed {
        Some(ProtectionReason::ConfirmedFindings)
    } else {
        None
    };

    RunClassification {
        can_delete: protected.is_none(),
        protected,
    }
}

/// Partition `runs` (oldest first) into delete / keep / protected.
///
/// The newest `keep_last` runs are kept, runs younger than
/// `older_than_days` are kept, and protection overrides both.
pub fn build_cleanup_plan(runs: &[RunRecord], opts: &CleanupOptions, now: DateTime<Utc>) -> CleanupPlan {
    let mut plan = CleanupPlan::default();
    let keep_from = runs.len().saturating_sub(opts.keep_last);
    let cutoff = opts
        .older_than_days
        .map(|days| now - Duration::days(i64::from(days)));

    for (index, run) in runs.iter().enumerate() {
        let classification = classify_run(run, opts);
        if let Some(reason) = classification.protected {
            plan.protected.push(ProtectedRun {
                run: run.clone(),
                reason,
            });
            continue;
        }

        let within_count = index >= keep_from;
        let within_age = cutoff.map_or(false, |cutoff| run.created_at > cutoff);
        if within_count || within_age {
            plan.to_keep.push(run.clone());
        } else {
            plan.to_delete.push(run.clone());
        }
    }

    plan
}

/// Delete (or, with `dry_run`, only list) the planned runs. Returns the
/// affected run ids, sorted.
pub fn execute_cleanup(plan: &CleanupPlan, dry_run: bool) -> Result<Vec<String>> {
    let mut affected = Vec::with_capacity(plan.to_delete.len());
    for run in &plan.to_delete {
        if dry_run {
            info!("Would delete run {}", run.run_id);
        } else {
            std::fs::remove_dir_all(&run.path)?;
            info!("Deleted run {}", run.run_id);
        }
        affected.push(run.run_id.clone());
    }
    affected.sort();
    Ok(affected)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupSummary {
    pub delete_count: usize,
    pub keep_count: usize,
    pub protected_count: usize,
    pub delete_ids: Vec<String>,
    pub keep_ids: Vec<String>,
    pub protected_ids: Vec<String>,
}

pub fn summarize_cleanup(plan: &CleanupPlan) -> CleanupSummary {
    let sorted = |runs: Vec<&RunRecord>| {
        let mut ids: Vec<String> = runs.into_iter().map(|r| r.run_id.clone()).collect();
        ids.sort();
        ids
    };

    CleanupSummary {
        delete_count: plan.to_delete.len(),
        keep_count: plan.to_keep.len(),
        protected_count: plan.protected.len(),
        delete_ids: sorted(plan.to_delete.iter().collect()),
        keep_ids: sorted(plan.to_keep.iter().collect()),
        protected_ids: sorted(plan.protected.iter().map(|p| &p.run).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn run(id: &str, day: u32, status: TruthState, confirmed: usize) -> RunRecord {
        RunRecord {
            run_id: id.to_string(),
            path: PathBuf::from(id),
            status,
            created_at: Utc.with_ymd_and_hms(2026, 1, day, 0, 0, 0).unwrap(),
            confirmed_findings: confirmed,
        }
    }

    fn opts(keep_last: usize) -> CleanupOptions {
        CleanupOptions {
            keep_last,
            older_than_days: None,
            allow_delete_confirmed: false,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 31, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_incomplete_never_deleted() {
        let runs = vec![
            run("a", 1, TruthState::Incomplete, 0),
            run("b", 2, TruthState::Success, 0),
            run("c", 3, TruthState::Incomplete, 0),
        ];
        for keep_last in 0..4 {
            let plan = build_cleanup_plan(&runs, &opts(keep_last), now());
            assert!(plan
                .to_delete
                .iter()
                .all(|r| r.status != TruthState::Incomplete));
            assert_eq!(plan.protected.len(), 2);
        }
    }

    #[test]
    fn test_keep_last_keeps_newest() {
        let runs = vec![
            run("a", 1, TruthState::Success, 0),
            run("b", 2, TruthState::Findings, 0),
            run("c", 3, TruthState::Success, 0),
        ];
        let summary = summarize_cleanup(&build_cleanup_plan(&runs, &opts(1), now()));
        assert_eq!(summary.delete_ids, vec!["a", "b"]);
        assert_eq!(summary.keep_ids, vec!["c"]);
    }

    #[test]
    fn test_confirmed_protected_unless_allowed() {
        let runs = vec![run("a", 1, TruthState::Findings, 2)];
        let plan = build_cleanup_plan(&runs, &opts(0), now());
        assert_eq!(plan.protected[0].reason, ProtectionReason::ConfirmedFindings);

        let mut allow = opts(0);
        allow.allow_delete_confirmed = true;
        let plan = build_cleanup_plan(&runs, &allow, now());
        assert_eq!(plan.to_delete.len(), 1);
    }

    #[test]
    fn test_age_window_keeps_recent_runs() {
        let runs = vec![
            run("old", 1, TruthState::Success, 0),
            run("recent", 29, TruthState::Success, 0),
        ];
        let mut o = opts(0);
        o.older_than_days = Some(7);
        let summary = summarize_cleanup(&build_cleanup_plan(&runs, &o, now()));
        assert_eq!(summary.delete_ids, vec!["old"]);
        assert_eq!(summary.keep_ids, vec!["recent"]);
    }

    #[test]
    fn test_load_and_execute() {
        let tmp = TempDir::new().unwrap();
        let runs_dir = tmp.path();

        let good = runs_dir.join("good");
        std::fs::create_dir_all(&good).unwrap();
        std::fs::write(
            good.join("summary.json"),
            r#"{"truthState":"SUCCESS","counts":{"confirmed":0}}"#,
        )
        .unwrap();
        std::fs::write(
            good.join("diagnostics.json"),
            r#"{"runId":"good","startedAt":"2026-01-01T00:00:00Z","finishedAt":"2026-01-01T00:00:01Z","durationMs":1000,"toolVersion":"0.1.0"}"#,
        )
        .unwrap();

        let broken = runs_dir.join("broken");
        std::fs::create_dir_all(&broken).unwrap();
        std::fs::create_dir_all(runs_dir.join(".staging")).unwrap();

        let runs = load_runs(runs_dir).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].run_id, "good");
        let broken_run = runs.iter().find(|r| r.run_id == "broken").unwrap();
        assert_eq!(broken_run.status, TruthState::Incomplete);

        let plan = build_cleanup_plan(&runs, &opts(0), now());
        assert_eq!(execute_cleanup(&plan, true).unwrap(), vec!["good"]);
        assert!(good.exists());
        assert_eq!(execute_cleanup(&plan, false).unwrap(), vec!["good"]);
        assert!(!good.exists());
        assert!(broken.exists());
    }
}
