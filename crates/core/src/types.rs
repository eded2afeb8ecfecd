//! Core types for silentcheck
//!
//! Inputs handed over by the Learner (expectations) and the Observer
//! (observations, traces), and the findings the pipeline produces.
//! Field names serialize in camelCase to match the collaborator JSON files.

use serde::{Deserialize, Serialize};

use crate::confidence::ConfidenceResult;
use crate::journey::JourneyDetail;
use crate::policy::PolicyTrace;

/// What kind of effect an expectation promises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpectationType {
    Navigation,
    Network,
    State,
}

impl std::fmt::Display for ExpectationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpectationType::Navigation => write!(f, "navigation"),
            ExpectationType::Network => write!(f, "network"),
            ExpectationType::State => write!(f, "state"),
        }
    }
}

/// The promised effect: a kind (e.g. `navigate`, `fetch`) plus a target value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Promise {
    pub kind: String,
    pub value: String,
}

/// Source location an expectation was mined from
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceRef {
    pub file: String,
    #[serde(default)]
    pub line: u32,
}

impl std::fmt::Display for SourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// A claim mined from source code that an interaction should cause an effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expectation {
    pub id: String,
    #[serde(rename = "type")]
    pub expectation_type: ExpectationType,
    pub promise: Promise,
    pub source: SourceRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// Prior strength of the static proof, 0.0 - 1.0
    #[serde(default)]
    pub confidence: f64,
}

/// An expectation the Learner could not extract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedExpectation {
    pub reason: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceRef>,
}

/// Learner output (`learn.json`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnData {
    #[serde(default)]
    pub expectations: Vec<Expectation>,
    #[serde(default)]
    pub skipped: Vec<SkippedExpectation>,
}

/// Structural signals captured by the Observer for one attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signals {
    #[serde(default)]
    pub navigation_changed: bool,
    #[serde(default)]
    pub meaningful_dom_change: bool,
    #[serde(default)]
    pub feedback_seen: bool,
    #[serde(default)]
    pub correlated_network_activity: bool,
}

/// Which sensors were active while an attempt was observed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sensors {
    #[serde(default)]
    pub navigation: bool,
    #[serde(default)]
    pub dom: bool,
    #[serde(default)]
    pub network: bool,
    #[serde(default)]
    pub feedback: bool,
}

impl Sensors {
    pub fn count(&self) -> usize {
        [self.navigation, self.dom, self.network, self.feedback]
            .iter()
            .filter(|s| **s)
            .count()
    }

    /// Sensors active in both sets.
    pub fn intersect(&self, other: &Sensors) -> Self {
        Sensors {
            navigation: self.navigation && other.navigation,
            dom: self.dom && other.dom,
            network: self.network && other.network,
            feedback: self.feedback && other.feedback,
        }
    }

    /// Infer sensors from the kinds of evidence an observation carries.
    pub fn infer(evidence: &[EvidenceRef]) -> Self {
        let mut sensors = Sensors::default();
        for item in evidence {
            match item.kind {
                EvidenceKind::DomSnapshot => {
                    sensors.dom = true;
                    sensors.navigation = true;
                }
                EvidenceKind::NetworkLog => {
                    sensors.network = true;
                    sensors.navigation = true;
                }
                EvidenceKind::ConsoleLog => sensors.feedback = true,
                EvidenceKind::Screenshot | EvidenceKind::Other => {}
            }
        }
        sensors
    }
}

/// The Observer's record of attempting one expectation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub id: String,
    #[serde(default)]
    pub attempted: bool,
    #[serde(default)]
    pub observed: bool,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub evidence_files: Vec<String>,
    #[serde(default)]
    pub signals: Signals,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensors: Option<Sensors>,
}

/// Physical interaction type recorded in a trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Link,
    #[serde(alias = "button")]
    Click,
    Tap,
    Form,
    Hover,
    Input,
    #[serde(other)]
    Other,
}

/// How a single interaction step ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    #[default]
    Success,
    Timeout,
    Blocked,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomSignals {
    #[serde(default)]
    pub before_hash: String,
    #[serde(default)]
    pub after_hash: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiSignals {
    #[serde(default)]
    pub loading_indicator: bool,
    #[serde(default)]
    pub new_actionable_elements: u32,
    #[serde(default)]
    pub feedback_seen: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationSignals {
    #[serde(default)]
    pub url_changed: bool,
}

/// One physical interaction performed by the Observer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    #[serde(default)]
    pub selector: String,
    #[serde(rename = "type")]
    pub interaction: InteractionKind,
    #[serde(default)]
    pub outcome: StepOutcome,
    #[serde(default)]
    pub before_url: String,
    #[serde(default)]
    pub after_url: String,
    #[serde(default)]
    pub dom: DomSignals,
    #[serde(default)]
    pub ui: UiSignals,
    #[serde(default)]
    pub navigation: NavigationSignals,
}

/// Whether the Observer finished its work
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObserveStatus {
    #[default]
    Complete,
    Incomplete,
}

/// Observer output (`observe.json`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObserveData {
    #[serde(default)]
    pub status: ObserveStatus,
    #[serde(default)]
    pub incomplete_reasons: Vec<String>,
    #[serde(default)]
    pub observations: Vec<Observation>,
    #[serde(default)]
    pub traces: Vec<Trace>,
    #[serde(default)]
    pub discovered_routes: Vec<String>,
}

/// Terminal classification of an (expectation, observation) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    Observed,
    SilentFailure,
    CoverageGap,
    Unproven,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::Observed => write!(f, "observed"),
            Classification::SilentFailure => write!(f, "silent-failure"),
            Classification::CoverageGap => write!(f, "coverage-gap"),
            Classification::Unproven => write!(f, "unproven"),
        }
    }
}

/// Reporting status; declaration order is severity order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingStatus {
    Informational,
    Suspected,
    Confirmed,
}

impl FindingStatus {
    /// Whether this status should fail a CI gate.
    pub fn is_actionable(self) -> bool {
        !matches!(self, FindingStatus::Informational)
    }
}

impl std::fmt::Display for FindingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FindingStatus::Informational => write!(f, "INFORMATIONAL"),
            FindingStatus::Suspected => write!(f, "SUSPECTED"),
            FindingStatus::Confirmed => write!(f, "CONFIRMED"),
        }
    }
}

/// Finding type, used by policy rules to match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FindingKind {
    #[serde(rename = "navigation")]
    Navigation,
    #[serde(rename = "network")]
    Network,
    #[serde(rename = "state")]
    State,
    #[serde(rename = "journey-stall-silent-failure")]
    JourneyStall,
}

impl FindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingKind::Navigation => "navigation",
            FindingKind::Network => "network",
            FindingKind::State => "state",
            FindingKind::JourneyStall => "journey-stall-silent-failure",
        }
    }
}

impl From<ExpectationType> for FindingKind {
    fn from(t: ExpectationType) -> Self {
        match t {
            ExpectationType::Navigation => FindingKind::Navigation,
            ExpectationType::Network => FindingKind::Network,
            ExpectationType::State => FindingKind::State,
        }
    }
}

impl std::fmt::Display for FindingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of an evidence file, derived from its path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvidenceKind {
    Screenshot,
    DomSnapshot,
    NetworkLog,
    ConsoleLog,
    Other,
}

impl EvidenceKind {
    /// Classify an evidence path by file name.
    pub fn from_path(path: &str) -> Self {
        let name = path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(path)
            .to_ascii_lowercase();
        let ext = name.rsplit_once('.').map(|(_, e)| e).unwrap_or("");

        match ext {
            "png" | "jpg" | "jpeg" | "webp" | "gif" => EvidenceKind::Screenshot,
            "html" | "htm" => EvidenceKind::DomSnapshot,
            "har" => EvidenceKind::NetworkLog,
            _ if has_token(&name, "network") => EvidenceKind::NetworkLog,
            _ if has_token(&name, "dom") => EvidenceKind::DomSnapshot,
            _ if has_token(&name, "console") => EvidenceKind::ConsoleLog,
            _ => EvidenceKind::Other,
        }
    }

    /// Whether this evidence carries structural (non-cosmetic) signal.
    pub fn is_structural(&self) -> bool {
        matches!(self, EvidenceKind::DomSnapshot | EvidenceKind::NetworkLog)
    }
}

fn has_token(name: &str, token: &str) -> bool {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .any(|part| part.starts_with(token))
}

/// A reference to one evidence file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRef {
    #[serde(rename = "type")]
    pub kind: EvidenceKind,
    pub path: String,
    pub available: bool,
}

impl EvidenceRef {
    /// Build sorted evidence references from an Observer file list.
    pub fn from_paths(paths: &[String]) -> Vec<EvidenceRef> {
        let mut refs: Vec<EvidenceRef> = paths
            .iter()
            .filter(|p| !p.trim().is_empty())
            .map(|p| EvidenceRef {
                kind: EvidenceKind::from_path(p),
                path: p.clone(),
                available: true,
            })
            .collect();
        refs.sort_by(|a, b| a.path.cmp(&b.path));
        refs.dedup_by(|a, b| a.path == b.path);
        refs
    }
}

/// The pipeline's output unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: FindingKind,
    pub classification: Classification,
    pub status: FindingStatus,
    /// Evidence-table confidence, 0.0 - 1.0
    pub confidence: f64,
    pub assessment: ConfidenceResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expectation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promise: Option<Promise>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceRef>,
    pub reason: String,
    #[serde(default)]
    pub evidence: Vec<EvidenceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journey: Option<JourneyDetail>,
    #[serde(default)]
    pub suppressed: bool,
    #[serde(default)]
    pub downgraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicyTrace>,
}

/// Per-run classification counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionStats {
    pub total: usize,
    pub observed: usize,
    pub silent_failures: usize,
    pub coverage_gaps: usize,
    pub unproven: usize,
    pub journey_stalls: usize,
}

impl DetectionStats {
    pub fn record(&mut self, classification: Classification) {
        self.total += 1;
        match classification {
            Classification::Observed => self.observed += 1,
            Classification::SilentFailure => self.silent_failures += 1,
            Classification::CoverageGap => self.coverage_gaps += 1,
            Classification::Unproven => self.unproven += 1,
        }
    }

    /// Whether the per-classification counters add up to `total`.
    pub fn is_balanced(&self) -> bool {
        self.observed + self.silent_failures + self.coverage_gaps + self.unproven == self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("shots/before.png", EvidenceKind::Screenshot)]
    #[test_case("after.JPG", EvidenceKind::Screenshot)]
    #[test_case("snapshots/page.html", EvidenceKind::DomSnapshot)]
    #[test_case("dom-after.json", EvidenceKind::DomSnapshot)]
    #[test_case("network.json", EvidenceKind::NetworkLog)]
    #[test_case("session.har", EvidenceKind::NetworkLog)]
    #[test_case("console.log", EvidenceKind::ConsoleLog)]
    #[test_case("notes.txt", EvidenceKind::Other)]
    #[test_case("random.txt", EvidenceKind::Other)]
    fn test_evidence_kind_from_path(path: &str, expected: EvidenceKind) {
        assert_eq!(EvidenceKind::from_path(path), expected);
    }

    #[test]
    fn test_evidence_refs_are_sorted_and_deduplicated() {
        let refs = EvidenceRef::from_paths(&[
            "b.png".to_string(),
            "a.png".to_string(),
            "b.png".to_string(),
            " ".to_string(),
        ]);
        let paths: Vec<&str> = refs.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["a.png", "b.png"]);
    }

    #[test]
    fn test_sensors_inferred_from_evidence() {
        let refs = EvidenceRef::from_paths(&["before.png".to_string(), "after.png".to_string()]);
        assert_eq!(Sensors::infer(&refs).count(), 0);

        let refs = EvidenceRef::from_paths(&["dom.html".to_string(), "network.json".to_string()]);
        let sensors = Sensors::infer(&refs);
        assert!(sensors.dom && sensors.network && sensors.navigation);

        let declared = Sensors {
            navigation: false,
            dom: true,
            network: true,
            feedback: true,
        };
        let narrowed = declared.intersect(&sensors);
        assert!(narrowed.dom && narrowed.network);
        assert!(!narrowed.navigation && !narrowed.feedback);
    }

    #[test]
    fn test_status_ordering() {
        assert!(FindingStatus::Confirmed > FindingStatus::Suspected);
        assert!(FindingStatus::Suspected > FindingStatus::Informational);
        assert!(!FindingStatus::Informational.is_actionable());
    }

    #[test]
    fn test_parse_observation_defaults() {
        let obs: Observation =
            serde_json::from_str(r#"{"id":"e1","attempted":true}"#).unwrap();
        assert!(!obs.observed);
        assert!(obs.evidence_files.is_empty());
        assert_eq!(obs.signals, Signals::default());
    }

    #[test]
    fn test_unknown_interaction_maps_to_other() {
        let trace: Trace = serde_json::from_str(r#"{"type":"scroll"}"#).unwrap();
        assert_eq!(trace.interaction, InteractionKind::Other);
        let trace: Trace = serde_json::from_str(r#"{"type":"button"}"#).unwrap();
        assert_eq!(trace.interaction, InteractionKind::Click);
    }
}
