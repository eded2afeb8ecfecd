//! Journey stall detection
//!
//! Looks for multi-step journeys where every step "succeeds" on its own but
//! the journey as a whole never progresses: no navigation, no new UI, no DOM
//! movement between consecutive steps.

use std::collections::HashMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::confidence::ConfidenceResult;
use crate::integrity::sha256_hex;
use crate::types::{
    Classification, Finding, FindingKind, FindingStatus, InteractionKind, StepOutcome, Trace,
};

pub const DEFAULT_MAX_SEQUENCE_LENGTH: usize = 20;
pub const DEFAULT_MIN_SEQUENCE_LENGTH: usize = 2;

/// Segmentation limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JourneyConfig {
    pub max_sequence_length: usize,
    pub min_sequence_length: usize,
}

impl Default for JourneyConfig {
    fn default() -> Self {
        Self {
            max_sequence_length: DEFAULT_MAX_SEQUENCE_LENGTH,
            min_sequence_length: DEFAULT_MIN_SEQUENCE_LENGTH,
        }
    }
}

/// An expectation that the next step did not meet
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StallCategory {
    Navigation,
    DomProgress,
    NewUi,
}

impl StallCategory {
    pub fn weight(self) -> u32 {
        match self {
            StallCategory::Navigation => 3,
            StallCategory::DomProgress => 2,
            StallCategory::NewUi => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StallSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl StallSeverity {
    pub fn from_score(score: u32) -> Self {
        match score {
            0..=1 => StallSeverity::Low,
            2..=3 => StallSeverity::Medium,
            4..=5 => StallSeverity::High,
            _ => StallSeverity::Critical,
        }
    }

    fn confidence(self) -> f64 {
        match self {
            StallSeverity::Low => 0.4,
            StallSeverity::Medium => 0.5,
            StallSeverity::High => 0.6,
            StallSeverity::Critical => 0.7,
        }
    }
}

/// One step after which the journey failed to progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StallPoint {
    /// Index of the stalled step within the full trace list
    pub trace_index: usize,
    pub selector: String,
    pub interaction: InteractionKind,
    pub unmet: Vec<StallCategory>,
    pub score: u32,
    pub severity: StallSeverity,
}

/// Journey details attached to a stall finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyDetail {
    pub start_index: usize,
    pub sequence_length: usize,
    pub selectors: Vec<String>,
    pub stall_points: Vec<StallPoint>,
    pub score: u32,
    pub severity: StallSeverity,
}

/// Split traces into journey segments.
///
/// A segment ends at `max_sequence_length`, at a trace whose URL changed,
/// or at the end of the list. Segments shorter than the minimum are dropped.
pub fn segment(traces: &[Trace], config: &JourneyConfig) -> Vec<Range<usize>> {
    let max = config.max_sequence_length.max(1);
    let mut segments = Vec::new();
    let mut start = 0;

    for (i, trace) in traces.iter().enumerate() {
        let len = i + 1 - start;
        if len == max || trace.navigation.url_changed {
            segments.push(start..i + 1);
            start = i + 1;
        }
    }
    if start < traces.len() {
        segments.push(start..traces.len());
    }

    segments.retain(|r| r.len() >= config.min_sequence_length);
    segments
}

fn expects_navigation(trace: &Trace) -> bool {
    matches!(trace.interaction, InteractionKind::Link | InteractionKind::Form)
}

fn expects_new_ui(trace: &Trace) -> bool {
    matches!(
        trace.interaction,
        InteractionKind::Click | InteractionKind::Tap | InteractionKind::Form | InteractionKind::Hover
    )
}

fn expects_dom_progress(trace: &Trace) -> bool {
    matches!(
        trace.interaction,
        InteractionKind::Click | InteractionKind::Tap | InteractionKind::Form
    ) || trace.ui.loading_indicator
}

fn same_known(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && a == b
}

/// Which expectations of `current` the `next` step failed to meet.
/// Unknown data (empty URLs or hashes) counts as met.
fn unmet_between(current: &Trace, next: &Trace) -> Vec<StallCategory> {
    let mut unmet = Vec::new();

    if expects_navigation(current)
        && !current.navigation.url_changed
        && same_known(&current.before_url, &next.before_url)
    {
        unmet.push(StallCategory::Navigation);
    }

    if expects_dom_progress(current)
        && same_known(&current.dom.before_hash, &next.dom.before_hash)
        && (current.dom.after_hash.is_empty() || current.dom.after_hash == current.dom.before_hash)
    {
        unmet.push(StallCategory::DomProgress);
    }

    if expects_new_ui(current) && next.ui.new_actionable_elements == 0 && !next.ui.feedback_seen {
        unmet.push(StallCategory::NewUi);
    }

    unmet
}

fn stall_points(traces: &[Trace], range: Range<usize>) -> Vec<StallPoint> {
    let mut points = Vec::new();
    for i in range.start..range.end.saturating_sub(1) {
        let current = &traces[i];
        let next = &traces[i + 1];
        if current.outcome != StepOutcome::Success {
            continue;
        }

        let unmet = unmet_between(current, next);
        if unmet.is_empty() {
            continue;
        }

        let score = unmet.iter().map(|c| c.weight()).sum();
        points.push(StallPoint {
            trace_index: i,
            selector: current.selector.clone(),
            interaction: current.interaction,
            unmet,
            score,
            severity: StallSeverity::from_score(score),
        });
    }
    points
}

/// Content hash of a stalled segment. `occurrence` counts earlier segments
/// in the same run with identical content and is left out of the preimage
/// for the first one.
fn journey_id(
    sequence_length: usize,
    stall_count: usize,
    selectors: &[String],
    occurrence: usize,
) -> String {
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct IdContent<'a> {
        kind: &'a str,
        sequence_length: usize,
        stall_count: usize,
        selectors: &'a [String],
        #[serde(skip_serializing_if = "Option::is_none")]
        occurrence: Option<usize>,
    }

    let bytes = serde_json::to_vec(&IdContent {
        kind: FindingKind::JourneyStall.as_str(),
        sequence_length,
        stall_count,
        selectors,
        occurrence: (occurrence > 0).then_some(occurrence),
    })
    .unwrap_or_default();
    let mut id = sha256_hex(&bytes);
    id.truncate(crate::detect::FINDING_ID_LEN);
    id
}

/// Analyze an ordered trace list and return one finding per stalled journey.
pub fn analyze(traces: &[Trace], config: &JourneyConfig) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for range in segment(traces, config) {
        let points = stall_points(traces, range.clone());
        if points.is_empty() {
            continue;
        }

        let selectors: Vec<String> = traces[range.clone()]
            .iter()
            .map(|t| t.selector.clone())
            .collect();
        let score: u32 = points.iter().map(|p| p.score).sum();
        let severity = StallSeverity::from_score(score);
        let confidence = severity.confidence();
        let base = journey_id(range.len(), points.len(), &selectors, 0);
        let occurrence = seen.entry(base).or_insert(0);
        let id = journey_id(range.len(), points.len(), &selectors, *occurrence);
        *occurrence += 1;

        debug!(
            "Journey at {}..{} stalled {} time(s), severity {:?}",
            range.start,
            range.end,
            points.len(),
            severity
        );

        findings.push(Finding {
            id,
            kind: FindingKind::JourneyStall,
            classification: Classification::SilentFailure,
            status: FindingStatus::Suspected,
            confidence,
            assessment: ConfidenceResult::fixed(
                (confidence * 100.0).round() as u8,
                &format!("journey stall severity {:?}", severity),
            ),
            expectation_id: None,
            selector: points.first().map(|p| p.selector.clone()),
            promise: None,
            source: None,
            reason: format!("stalled {} of {} steps", points.len(), range.len()),
            evidence: Vec::new(),
            journey: Some(JourneyDetail {
                start_index: range.start,
                sequence_length: range.len(),
                selectors,
                stall_points: points,
                score,
                severity,
            }),
            suppressed: false,
            downgraded: false,
            policy: None,
        });
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DomSignals, NavigationSignals, UiSignals};

    fn step(selector: &str, interaction: InteractionKind, url: &str, dom: &str) -> Trace {
        Trace {
            selector: selector.to_string(),
            interaction,
            outcome: StepOutcome::Success,
            before_url: url.to_string(),
            after_url: url.to_string(),
            dom: DomSignals {
                before_hash: dom.to_string(),
                after_hash: dom.to_string(),
            },
            ui: UiSignals::default(),
            navigation: NavigationSignals::default(),
        }
    }

    #[test]
    fn test_segmentation_rules() {
        let mut traces: Vec<Trace> = (0..5)
            .map(|i| step(&format!("#b{}", i), InteractionKind::Click, "/", "h"))
            .collect();
        traces[1].navigation.url_changed = true;

        let config = JourneyConfig {
            max_sequence_length: 2,
            min_sequence_length: 2,
        };
        // [0,1] ends on url change, [2,3] ends at max, [4] is too short
        assert_eq!(segment(&traces, &config), vec![0..2, 2..4]);
    }

    #[test]
    fn test_stalled_click_journey() {
        let traces = vec![
            step("#add", InteractionKind::Click, "/cart", "h1"),
            step("#add", InteractionKind::Click, "/cart", "h1"),
            step("#checkout", InteractionKind::Link, "/cart", "h1"),
        ];

        let findings = analyze(&traces, &JourneyConfig::default());
        assert_eq!(findings.len(), 1);

        let finding = &findings[0];
        assert_eq!(finding.kind, FindingKind::JourneyStall);
        assert_eq!(finding.status, FindingStatus::Suspected);

        let detail = finding.journey.as_ref().unwrap();
        assert_eq!(detail.stall_points.len(), 2);
        // click: dom-progress + new-ui = 3 per point
        assert_eq!(detail.score, 6);
        assert_eq!(detail.severity, StallSeverity::Critical);
    }

    #[test]
    fn test_progressing_journey_has_no_stall() {
        let mut traces = vec![
            step("#open", InteractionKind::Click, "/", "h1"),
            step("#next", InteractionKind::Click, "/", "h2"),
        ];
        traces[1].ui.new_actionable_elements = 3;

        assert!(analyze(&traces, &JourneyConfig::default()).is_empty());
    }

    #[test]
    fn test_failed_step_is_not_a_stall_point() {
        let mut traces = vec![
            step("#add", InteractionKind::Click, "/", "h1"),
            step("#add", InteractionKind::Click, "/", "h1"),
        ];
        traces[0].outcome = StepOutcome::Timeout;

        assert!(analyze(&traces, &JourneyConfig::default()).is_empty());
    }

    #[test]
    fn test_unknown_data_counts_as_met() {
        let traces = vec![
            step("#go", InteractionKind::Link, "", ""),
            step("#go", InteractionKind::Input, "", ""),
        ];
        assert!(analyze(&traces, &JourneyConfig::default()).is_empty());
    }

    #[test]
    fn test_journey_id_is_content_derived() {
        let traces = vec![
            step("#add", InteractionKind::Click, "/cart", "h1"),
            step("#add", InteractionKind::Click, "/cart", "h1"),
        ];
        let a = analyze(&traces, &JourneyConfig::default());
        let b = analyze(&traces, &JourneyConfig::default());
        assert_eq!(a[0].id, b[0].id);

        let mut renamed = traces.clone();
        renamed[1].selector = "#remove".to_string();
        let c = analyze(&renamed, &JourneyConfig::default());
        assert_ne!(a[0].id, c[0].id);
    }

    #[test]
    fn test_identical_segments_get_distinct_ids() {
        let traces: Vec<Trace> = (0..40)
            .map(|_| step("#add", InteractionKind::Click, "/cart", "h1"))
            .collect();

        let findings = analyze(&traces, &JourneyConfig::default());
        assert_eq!(findings.len(), 2);
        assert_ne!(findings[0].id, findings[1].id);

        // first occurrence keeps the plain content hash
        let single = analyze(&traces[..20], &JourneyConfig::default());
        assert_eq!(single[0].id, findings[0].id);

        let again = analyze(&traces, &JourneyConfig::default());
        assert_eq!(again[1].id, findings[1].id);
    }

    #[test]
    fn test_severity_buckets() {
        assert_eq!(StallSeverity::from_score(1), StallSeverity::Low);
        assert_eq!(StallSeverity::from_score(3), StallSeverity::Medium);
        assert_eq!(StallSeverity::from_score(5), StallSeverity::High);
        assert_eq!(StallSeverity::from_score(6), StallSeverity::Critical);
    }
}
