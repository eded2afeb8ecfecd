//! Confidence engine
//!
//! Pure scoring of a verdict from its signal bundle. Rules are evaluated in
//! a fixed order and the explanation keeps that order, so the same input
//! always produces byte-identical output.

use serde::{Deserialize, Serialize};

use crate::types::{Classification, ExpectationType, Sensors, Signals};

/// Maximum number of explanation lines kept
pub const MAX_EXPLAIN: usize = 8;

/// Strength of the static proof behind an expectation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpectationStrength {
    Unknown,
    Weak,
    Strong,
    Proven,
}

impl ExpectationStrength {
    /// Bucket the Learner's prior (0.0 - 1.0).
    pub fn from_prior(prior: f64) -> Self {
        if !prior.is_finite() || prior <= 0.0 {
            ExpectationStrength::Unknown
        } else if prior >= 0.9 {
            ExpectationStrength::Proven
        } else if prior >= 0.6 {
            ExpectationStrength::Strong
        } else {
            ExpectationStrength::Weak
        }
    }

    fn base_score(self) -> i32 {
        match self {
            ExpectationStrength::Proven => 60,
            ExpectationStrength::Strong => 45,
            ExpectationStrength::Weak => 30,
            ExpectationStrength::Unknown => 15,
        }
    }
}

/// Confidence band derived from the score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLevel {
    Unknown,
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            80..=u8::MAX => ConfidenceLevel::High,
            50..=79 => ConfidenceLevel::Medium,
            1..=49 => ConfidenceLevel::Low,
            0 => ConfidenceLevel::Unknown,
        }
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfidenceLevel::Unknown => write!(f, "UNKNOWN"),
            ConfidenceLevel::Low => write!(f, "LOW"),
            ConfidenceLevel::Medium => write!(f, "MEDIUM"),
            ConfidenceLevel::High => write!(f, "HIGH"),
        }
    }
}

/// Evidence file counts by kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvidenceProfile {
    pub screenshots: usize,
    pub structural: usize,
    pub total: usize,
}

impl EvidenceProfile {
    pub fn screenshots_only(&self) -> bool {
        self.screenshots > 0 && self.structural == 0
    }
}

/// Everything the engine looks at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceParams {
    pub expectation_type: ExpectationType,
    pub strength: ExpectationStrength,
    pub classification: Classification,
    pub signals: Signals,
    pub sensors: Sensors,
    pub evidence: EvidenceProfile,
    /// Independent substantive signal categories backing the verdict
    pub substantive_signals: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceFactors {
    pub expectation_strength: Option<ExpectationStrength>,
    pub sensors_present: usize,
    pub evidence_signals: usize,
    pub penalties: Vec<String>,
    pub boosts: Vec<String>,
}

/// Score, band and the ordered reasons behind them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceResult {
    pub score: u8,
    pub level: ConfidenceLevel,
    pub explain: Vec<String>,
    pub factors: ConfidenceFactors,
}

impl ConfidenceResult {
    /// Result for findings that carry no per-expectation signal bundle.
    pub fn fixed(score: u8, reason: &str) -> Self {
        Self {
            score,
            level: ConfidenceLevel::from_score(score),
            explain: vec![reason.to_string()],
            factors: ConfidenceFactors::default(),
        }
    }
}

struct Ledger {
    score: i32,
    explain: Vec<String>,
    factors: ConfidenceFactors,
}

impl Ledger {
    fn boost(&mut self, label: &str, amount: i32) {
        self.score += amount;
        self.factors.boosts.push(format!("{}:+{}", label, amount));
        self.explain.push(format!("{} (+{})", label, amount));
    }

    fn penalty(&mut self, label: &str, amount: i32) {
        self.score -= amount;
        self.factors.penalties.push(format!("{}:-{}", label, amount));
        self.explain.push(format!("{} (-{})", label, amount));
    }
}

/// Compute the confidence of a verdict. Pure and deterministic.
pub fn compute_confidence(params: &ConfidenceParams) -> ConfidenceResult {
    let sensors_present = params.sensors.count();
    let mut ledger = Ledger {
        score: params.strength.base_score(),
        explain: vec![format!(
            "expectation strength {:?} (base {})",
            params.strength,
            params.strength.base_score()
        )],
        factors: ConfidenceFactors {
            expectation_strength: Some(params.strength),
            sensors_present,
            evidence_signals: params.substantive_signals,
            penalties: Vec::new(),
            boosts: Vec::new(),
        },
    };

    match params.classification {
        Classification::Observed => {
            ledger.boost("expected effect observed", 30);
            if params.evidence.structural > 0 {
                ledger.boost("structural evidence captured", 10);
            }
        }
        Classification::SilentFailure => {
            if expected_sensor_saw_nothing(params) {
                ledger.boost("primary sensor recorded no effect", 15);
            }
            if params.substantive_signals >= 2 {
                ledger.boost("independent signals agree", 10);
            }
            if params.evidence.screenshots > 0 && params.evidence.structural > 0 {
                ledger.boost("screenshots corroborate structural evidence", 5);
            }
            if params.signals.feedback_seen || params.signals.meaningful_dom_change {
                ledger.penalty("partial effect contradicts failure", 20);
            }
            if sensors_present < 2 {
                ledger.penalty("limited sensor coverage", 10);
            }
        }
        Classification::Unproven => {
            if params.evidence.screenshots_only() {
                ledger.penalty("screenshots only, no structural signal", 40);
            } else {
                ledger.penalty("no substantive signal", 30);
            }
        }
        Classification::CoverageGap => {
            ledger.penalty("expectation not exercised", 100);
        }
    }

    let score = ledger.score.clamp(0, 100) as u8;
    let mut explain = ledger.explain;
    explain.truncate(MAX_EXPLAIN);

    ConfidenceResult {
        score,
        level: ConfidenceLevel::from_score(score),
        explain,
        factors: ledger.factors,
    }
}

fn expected_sensor_saw_nothing(params: &ConfidenceParams) -> bool {
    match params.expectation_type {
        ExpectationType::Navigation => {
            params.sensors.navigation && !params.signals.navigation_changed
        }
        ExpectationType::Network => {
            params.sensors.network && !params.signals.correlated_network_activity
        }
        ExpectationType::State => params.sensors.dom && !params.signals.meaningful_dom_change,
    }
}
