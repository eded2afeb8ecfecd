//! Detection engine
//!
//! Pairs each expectation with its observation and classifies the pair.
//! A `silent-failure` is only issued when at least one substantive signal
//! backs it: an active sensor that recorded the expected effect as absent.
//! Screenshots alone never suffice; such pairs are `unproven`.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::confidence::{
    compute_confidence, ConfidenceParams, EvidenceProfile, ExpectationStrength,
};
use crate::error::{Error, Result};
use crate::integrity::sha256_hex;
use crate::types::{
    Classification, DetectionStats, EvidenceKind, EvidenceRef, Expectation, ExpectationType,
    Finding, FindingKind, FindingStatus, Observation, Promise, Sensors, Signals, SourceRef,
};

/// Length of the hex content id given to findings
pub const FINDING_ID_LEN: usize = 16;

/// Silent-failure confidence at or above this is CONFIRMED
pub const CONFIRMED_THRESHOLD: f64 = 0.75;

/// A substantive signal category that can back a silent failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UnmetSignal {
    Navigation,
    Dom,
    Network,
}

impl UnmetSignal {
    fn as_str(self) -> &'static str {
        match self {
            UnmetSignal::Navigation => "navigation",
            UnmetSignal::Dom => "dom",
            UnmetSignal::Network => "network",
        }
    }
}

/// Findings plus counters for one detection pass
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionOutcome {
    pub findings: Vec<Finding>,
    pub stats: DetectionStats,
}

/// Deterministic content id: depends on type, selector, promise and source
/// and nothing else.
pub fn finding_id(
    kind: FindingKind,
    selector: Option<&str>,
    promise: Option<&Promise>,
    source: Option<&SourceRef>,
) -> String {
    #[derive(Serialize)]
    struct IdContent<'a> {
        kind: &'a str,
        selector: Option<&'a str>,
        promise: Option<&'a Promise>,
        source: Option<&'a SourceRef>,
    }

    let content = IdContent {
        kind: kind.as_str(),
        selector,
        promise,
        source,
    };
    // serializing a plain struct of strings cannot fail
    let bytes = serde_json::to_vec(&content).unwrap_or_default();
    let mut id = sha256_hex(&bytes);
    id.truncate(FINDING_ID_LEN);
    id
}

/// Fixed evidence-combination table for silent-failure confidence.
pub fn silent_failure_confidence(substantive: usize, with_screenshots: bool) -> f64 {
    match (substantive, with_screenshots) {
        (0, _) => 0.0,
        (1, false) => 0.5,
        (1, true) => 0.6,
        (2, false) => 0.7,
        (2, true) => 0.75,
        (_, false) => 0.85,
        (_, true) => 0.9,
    }
}

/// Substantive unmet signals for an attempted, unobserved expectation.
pub fn unmet_signals(
    expectation_type: ExpectationType,
    signals: &Signals,
    sensors: &Sensors,
) -> Vec<UnmetSignal> {
    let mut unmet = Vec::new();
    if expectation_type == ExpectationType::Navigation
        && sensors.navigation
        && !signals.navigation_changed
    {
        unmet.push(UnmetSignal::Navigation);
    }
    if sensors.dom && !signals.meaningful_dom_change {
        unmet.push(UnmetSignal::Dom);
    }
    if sensors.network && !signals.correlated_network_activity {
        unmet.push(UnmetSignal::Network);
    }
    unmet
}

fn contradicts(expectation_type: ExpectationType, signals: &Signals) -> bool {
    match expectation_type {
        ExpectationType::Navigation => signals.navigation_changed,
        ExpectationType::Network => signals.correlated_network_activity,
        ExpectationType::State => signals.meaningful_dom_change,
    }
}

fn evidence_profile(evidence: &[EvidenceRef]) -> EvidenceProfile {
    EvidenceProfile {
        screenshots: evidence
            .iter()
            .filter(|e| e.kind == EvidenceKind::Screenshot)
            .count(),
        structural: evidence.iter().filter(|e| e.kind.is_structural()).count(),
        total: evidence.len(),
    }
}

/// Classify one expectation against its (possibly missing) observation.
pub fn evaluate(expectation: &Expectation, observation: Option<&Observation>) -> Finding {
    let strength = ExpectationStrength::from_prior(expectation.confidence);
    let evidence = observation
        .map(|o| EvidenceRef::from_paths(&o.evidence_files))
        .unwrap_or_default();
    let profile = evidence_profile(&evidence);
    let signals = observation.map(|o| o.signals).unwrap_or_default();
    // A declared sensor only counts when evidence of its kind was captured
    let inferred = Sensors::infer(&evidence);
    let sensors = observation
        .and_then(|o| o.sensors)
        .map_or(inferred, |declared| declared.intersect(&inferred));

    let (classification, confidence, reason, substantive) = match observation {
        None => (Classification::CoverageGap, 0.0, "no_observation".to_string(), 0),
        Some(o) if !o.attempted => {
            let reason = if o.reason.is_empty() {
                "not_attempted".to_string()
            } else {
                o.reason.clone()
            };
            (Classification::CoverageGap, 0.0, reason, 0)
        }
        Some(o) if o.observed => {
            if evidence.is_empty() {
                (
                    Classification::Unproven,
                    0.0,
                    "observed_without_evidence".to_string(),
                    0,
                )
            } else {
                (Classification::Observed, 1.0, "observed".to_string(), 1)
            }
        }
        Some(_) if contradicts(expectation.expectation_type, &signals) => (
            Classification::Unproven,
            0.0,
            "contradicting_signals".to_string(),
            0,
        ),
        Some(_) => {
            let unmet = unmet_signals(expectation.expectation_type, &signals, &sensors);
            if unmet.is_empty() {
                let reason = if profile.screenshots_only() {
                    "screenshots_only"
                } else {
                    "no_substantive_signal"
                };
                (Classification::Unproven, 0.0, reason.to_string(), 0)
            } else {
                let names: Vec<&str> = unmet.iter().map(|u| u.as_str()).collect();
                (
                    Classification::SilentFailure,
                    silent_failure_confidence(unmet.len(), profile.screenshots > 0),
                    format!("unmet:{}", names.join(",")),
                    unmet.len(),
                )
            }
        }
    };

    let assessment = compute_confidence(&ConfidenceParams {
        expectation_type: expectation.expectation_type,
        strength,
        classification,
        signals,
        sensors,
        evidence: profile,
        substantive_signals: substantive,
    });

    let status = match classification {
        Classification::SilentFailure if confidence >= CONFIRMED_THRESHOLD => {
            FindingStatus::Confirmed
        }
        Classification::SilentFailure => FindingStatus::Suspected,
        _ => FindingStatus::Informational,
    };

    let kind = FindingKind::from(expectation.expectation_type);
    let id = finding_id(
        kind,
        expectation.selector.as_deref(),
        Some(&expectation.promise),
        Some(&expectation.source),
    );

    debug!(
        "Expectation {} ({}) -> {} [{}]",
        expectation.id, expectation.promise.value, classification, reason
    );

    Finding {
        id,
        kind,
        classification,
        status,
        confidence,
        assessment,
        expectation_id: Some(expectation.id.clone()),
        selector: expectation.selector.clone(),
        promise: Some(expectation.promise.clone()),
        source: Some(expectation.source.clone()),
        reason,
        evidence,
        journey: None,
        suppressed: false,
        downgraded: false,
        policy: None,
    }
}

/// Run the detection pass over all expectations.
///
/// Observations are matched by expectation id. Findings come back sorted
/// by id regardless of input order.
pub fn detect(expectations: &[Expectation], observations: &[Observation]) -> Result<DetectionOutcome> {
    let mut by_id: BTreeMap<&str, &Observation> = BTreeMap::new();
    for observation in observations {
        if by_id.insert(observation.id.as_str(), observation).is_some() {
            return Err(Error::Data(format!(
                "observer returned more than one observation for expectation {}",
                observation.id
            )));
        }
    }

    let mut stats = DetectionStats::default();
    let mut findings = Vec::with_capacity(expectations.len());

    for expectation in expectations {
        let finding = evaluate(expectation, by_id.remove(expectation.id.as_str()));
        stats.record(finding.classification);
        findings.push(finding);
    }

    if !by_id.is_empty() {
        warn!(
            "{} observation(s) did not match any expectation",
            by_id.len()
        );
    }

    if !stats.is_balanced() {
        return Err(Error::InvariantViolation(format!(
            "detection counters do not sum to total: {:?}",
            stats
        )));
    }

    findings.sort_by(|a, b| a.id.cmp(&b.id));
    info!(
        "Detection: {} total, {} observed, {} silent failures, {} coverage gaps, {} unproven",
        stats.total, stats.observed, stats.silent_failures, stats.coverage_gaps, stats.unproven
    );

    Ok(DetectionOutcome { findings, stats })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn nav_expectation(id: &str, target: &str) -> Expectation {
        Expectation {
            id: id.to_string(),
            expectation_type: ExpectationType::Navigation,
            promise: Promise {
                kind: "navigate".to_string(),
                value: target.to_string(),
            },
            source: SourceRef {
                file: "src/App.jsx".to_string(),
                line: 12,
            },
            selector: Some(format!("a[href='{}']", target)),
            confidence: 0.95,
        }
    }

    fn attempt(id: &str, observed: bool, files: &[&str]) -> Observation {
        Observation {
            id: id.to_string(),
            attempted: true,
            observed,
            reason: String::new(),
            evidence_files: files.iter().map(|f| f.to_string()).collect(),
            signals: Signals::default(),
            sensors: None,
        }
    }

    #[test]
    fn test_screenshots_only_is_unproven() {
        let exp = nav_expectation("e1", "/about");
        let finding = evaluate(&exp, Some(&attempt("e1", false, &["before.png", "after.png"])));

        assert_eq!(finding.classification, Classification::Unproven);
        assert_eq!(finding.confidence, 0.0);
        assert_eq!(finding.reason, "screenshots_only");
        assert_eq!(finding.status, FindingStatus::Informational);
    }

    #[test]
    fn test_observed_with_evidence() {
        let exp = nav_expectation("e1", "/about");
        let finding = evaluate(&exp, Some(&attempt("e1", true, &["network.json"])));

        assert_eq!(finding.classification, Classification::Observed);
        assert_eq!(finding.confidence, 1.0);
    }

    #[test]
    fn test_observed_without_evidence_is_unproven() {
        let exp = nav_expectation("e1", "/about");
        let finding = evaluate(&exp, Some(&attempt("e1", true, &[])));
        assert_eq!(finding.classification, Classification::Unproven);
    }

    #[test]
    fn test_missing_and_unattempted_are_coverage_gaps() {
        let exp = nav_expectation("e1", "/about");
        assert_eq!(evaluate(&exp, None).classification, Classification::CoverageGap);

        let mut obs = attempt("e1", false, &["dom.html"]);
        obs.attempted = false;
        obs.reason = "budget_exceeded".to_string();
        let finding = evaluate(&exp, Some(&obs));
        assert_eq!(finding.classification, Classification::CoverageGap);
        assert_eq!(finding.reason, "budget_exceeded");
        assert_eq!(finding.confidence, 0.0);
    }

    #[test]
    fn test_structural_evidence_yields_silent_failure() {
        let exp = nav_expectation("e1", "/about");
        let finding = evaluate(
            &exp,
            Some(&attempt("e1", false, &["before.png", "after.png", "dom-after.html"])),
        );

        // dom snapshot activates dom + navigation sensors
        assert_eq!(finding.classification, Classification::SilentFailure);
        assert_eq!(finding.reason, "unmet:navigation,dom");
        assert_eq!(finding.confidence, 0.75);
        assert_eq!(finding.status, FindingStatus::Confirmed);
    }

    #[test]
    fn test_declared_sensors_cannot_upgrade_screenshots() {
        let exp = nav_expectation("e1", "/about");
        let mut obs = attempt("e1", false, &["before.png", "after.png"]);
        obs.sensors = Some(Sensors {
            navigation: true,
            dom: true,
            network: true,
            feedback: false,
        });

        let finding = evaluate(&exp, Some(&obs));
        assert_eq!(finding.classification, Classification::Unproven);
        assert_eq!(finding.reason, "screenshots_only");
        assert_eq!(finding.status, FindingStatus::Informational);
        assert_eq!(finding.confidence, 0.0);
    }

    #[test]
    fn test_declared_sensors_narrow_inferred_ones() {
        let exp = nav_expectation("e1", "/about");
        let mut obs = attempt("e1", false, &["dom-after.html"]);
        obs.sensors = Some(Sensors {
            navigation: false,
            dom: true,
            network: true,
            feedback: false,
        });

        // network was declared but no network log was captured
        let finding = evaluate(&exp, Some(&obs));
        assert_eq!(finding.classification, Classification::SilentFailure);
        assert_eq!(finding.reason, "unmet:dom");
        assert_eq!(finding.confidence, 0.5);
        assert_eq!(finding.status, FindingStatus::Suspected);
    }

    #[test]
    fn test_contradicting_signal_is_unproven() {
        let exp = nav_expectation("e1", "/about");
        let mut obs = attempt("e1", false, &["dom.html"]);
        obs.signals.navigation_changed = true;
        assert_eq!(evaluate(&exp, Some(&obs)).classification, Classification::Unproven);
    }

    #[test_case(1, false, 0.5)]
    #[test_case(1, true, 0.6)]
    #[test_case(2, false, 0.7)]
    #[test_case(2, true, 0.75)]
    #[test_case(3, false, 0.85)]
    #[test_case(3, true, 0.9)]
    fn test_confidence_table(substantive: usize, shots: bool, expected: f64) {
        assert_eq!(silent_failure_confidence(substantive, shots), expected);
    }

    #[test]
    fn test_finding_id_depends_on_content_only() {
        let promise = Promise {
            kind: "navigate".to_string(),
            value: "/about".to_string(),
        };
        let source = SourceRef {
            file: "a.js".to_string(),
            line: 1,
        };
        let base = finding_id(FindingKind::Navigation, Some("#go"), Some(&promise), Some(&source));
        assert_eq!(
            base,
            finding_id(FindingKind::Navigation, Some("#go"), Some(&promise), Some(&source))
        );
        assert_eq!(base.len(), FINDING_ID_LEN);

        assert_ne!(base, finding_id(FindingKind::Network, Some("#go"), Some(&promise), Some(&source)));
        assert_ne!(base, finding_id(FindingKind::Navigation, Some("#other"), Some(&promise), Some(&source)));
        let other_promise = Promise {
            value: "/contact".to_string(),
            ..promise.clone()
        };
        assert_ne!(base, finding_id(FindingKind::Navigation, Some("#go"), Some(&other_promise), Some(&source)));
        let other_source = SourceRef {
            line: 2,
            ..source.clone()
        };
        assert_ne!(base, finding_id(FindingKind::Navigation, Some("#go"), Some(&promise), Some(&other_source)));
    }

    #[test]
    fn test_detect_mixed_results() {
        let expectations = vec![
            nav_expectation("e1", "/about"),
            nav_expectation("e2", "/pricing"),
            nav_expectation("e3", "/contact"),
        ];
        let observations = vec![
            attempt("e1", true, &["network.json"]),
            attempt("e3", false, &["before.png", "after.png"]),
        ];

        let outcome = detect(&expectations, &observations).unwrap();
        assert_eq!(outcome.stats.total, 3);
        assert_eq!(outcome.stats.observed, 1);
        assert_eq!(outcome.stats.coverage_gaps, 1);
        assert_eq!(outcome.stats.unproven, 1);
        assert_eq!(outcome.stats.silent_failures, 0);
        assert!(outcome.stats.is_balanced());

        let ids: Vec<&str> = outcome.findings.iter().map(|f| f.id.as_str()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_duplicate_observations_rejected() {
        let expectations = vec![nav_expectation("e1", "/about")];
        let observations = vec![attempt("e1", true, &["a.png"]), attempt("e1", false, &[])];
        let err = detect(&expectations, &observations).unwrap_err();
        assert!(matches!(err, Error::Data(_)));
    }
}
