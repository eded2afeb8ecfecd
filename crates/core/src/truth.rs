//! Truth / exit resolution
//!
//! Fixed precedence:
//!
//! ```text
//!   incomplete (observer, determinism, integrity)  ->  INCOMPLETE  exit 30
//!   any non-suppressed CONFIRMED or SUSPECTED       ->  FINDINGS    exit 20
//!   otherwise                                       ->  SUCCESS     exit 0
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ExitCode;
use crate::policy::SeverityCounts;

/// Shown with every INCOMPLETE result.
pub const INCOMPLETE_WARNING: &str =
    "WARNING: this run is INCOMPLETE. The absence of findings does NOT mean the application is safe.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TruthState {
    Success,
    Findings,
    Incomplete,
}

impl TruthState {
    pub fn exit_code(self) -> ExitCode {
        match self {
            TruthState::Success => ExitCode::Success,
            TruthState::Findings => ExitCode::Findings,
            TruthState::Incomplete => ExitCode::Incomplete,
        }
    }
}

impl std::fmt::Display for TruthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TruthState::Success => write!(f, "SUCCESS"),
            TruthState::Findings => write!(f, "FINDINGS"),
            TruthState::Incomplete => write!(f, "INCOMPLETE"),
        }
    }
}

/// Why a run was forced incomplete
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum IncompleteReason {
    /// The Observer reported INCOMPLETE (timeout, budget, crash).
    Observer(String),
    DeterminismViolation(String),
    IntegrityFailure(String),
}

impl IncompleteReason {
    pub fn code(&self) -> &'static str {
        match self {
            IncompleteReason::Observer(_) => "observer_incomplete",
            IncompleteReason::DeterminismViolation(_) => "determinism_violation",
            IncompleteReason::IntegrityFailure(_) => "integrity_failure",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            IncompleteReason::Observer(d)
            | IncompleteReason::DeterminismViolation(d)
            | IncompleteReason::IntegrityFailure(d) => d,
        }
    }
}

/// Final verdict for a run, persisted in `summary.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TruthResolution {
    pub truth_state: TruthState,
    pub exit_code: i32,
    pub reason: String,
    pub action: String,
    #[serde(default)]
    pub incomplete_reasons: Vec<IncompleteReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Combine completeness and severity counts into one truth state.
pub fn resolve(incomplete: &[IncompleteReason], counts: &SeverityCounts) -> TruthResolution {
    let mut reasons = incomplete.to_vec();
    reasons.sort();
    reasons.dedup();

    if !reasons.is_empty() {
        let codes: Vec<&str> = reasons.iter().map(|r| r.code()).collect();
        return TruthResolution {
            truth_state: TruthState::Incomplete,
            exit_code: ExitCode::Incomplete.code(),
            reason: format!("run incomplete: {}", codes.join(", ")),
            action: "Re-run the scan; do not treat this result as a pass.".to_string(),
            incomplete_reasons: reasons,
            warning: Some(INCOMPLETE_WARNING.to_string()),
        };
    }

    if counts.actionable() > 0 {
        return TruthResolution {
            truth_state: TruthState::Findings,
            exit_code: ExitCode::Findings.code(),
            reason: format!(
                "{} confirmed and {} suspected finding(s)",
                counts.confirmed, counts.suspected
            ),
            action: "Review findings.json and fix or suppress each finding.".to_string(),
            incomplete_reasons: Vec::new(),
            warning: None,
        };
    }

    TruthResolution {
        truth_state: TruthState::Success,
        exit_code: ExitCode::Success.code(),
        reason: if counts.suppressed > 0 {
            format!("no actionable findings ({} suppressed by policy)", counts.suppressed)
        } else {
            "no actionable findings".to_string()
        },
        action: "None.".to_string(),
        incomplete_reasons: Vec::new(),
        warning: None,
    }
}

/// Human-readable verdict block.
pub fn render(resolution: &TruthResolution) -> String {
    let mut out = format!(
        "Result: {} (exit {})\nReason: {}\nAction: {}\n",
        resolution.truth_state, resolution.exit_code, resolution.reason, resolution.action
    );
    for reason in &resolution.incomplete_reasons {
        out.push_str(&format!("  - {}: {}\n", reason.code(), reason.detail()));
    }
    if let Some(warning) = &resolution.warning {
        out.push_str(warning);
        out.push('\n');
    }
    out
}
