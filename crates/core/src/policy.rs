//! Ignore/downgrade policy
//!
//! User-authored rules applied to findings before reporting. Suppressed and
//! downgraded findings are kept in the artifact with a trace of the rule
//! that touched them.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{Finding, FindingKind, FindingStatus};

/// The only policy schema version understood
pub const POLICY_VERSION: u32 = 1;

const KNOWN_TYPES: &[FindingKind] = &[
    FindingKind::Navigation,
    FindingKind::Network,
    FindingKind::State,
    FindingKind::JourneyStall,
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IgnoreRules {
    #[serde(default)]
    pub finding_ids: Vec<String>,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub selector_contains: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DowngradeRule {
    #[serde(rename = "type")]
    pub finding_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector_contains: Option<String>,
    pub to_status: FindingStatus,
    pub reason: String,
}

/// Policy document (`policy.json`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Policy {
    pub version: u32,
    #[serde(default)]
    pub ignore: IgnoreRules,
    #[serde(default)]
    pub downgrade: Vec<DowngradeRule>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            version: POLICY_VERSION,
            ignore: IgnoreRules::default(),
            downgrade: Vec::new(),
        }
    }
}

/// Record of the rule that suppressed or downgraded a finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyTrace {
    pub rule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub original_status: FindingStatus,
}

impl Policy {
    /// Parse and validate a policy document.
    pub fn from_json(content: &str) -> Result<Self> {
        let policy: Policy = serde_json::from_str(content)
            .map_err(|e| Error::Usage(format!("invalid policy document: {}", e)))?;
        policy.validate()?;
        Ok(policy)
    }

    /// Load and validate a policy file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Usage(format!("cannot read policy file {}: {}", path.display(), e))
        })?;
        let policy = Self::from_json(&content)?;
        info!(
            "Loaded policy from {} ({} downgrade rule(s))",
            path.display(),
            policy.downgrade.len()
        );
        Ok(policy)
    }

    /// Validate shape beyond what serde enforces.
    pub fn validate(&self) -> Result<()> {
        if self.version != POLICY_VERSION {
            return Err(Error::Usage(format!(
                "unsupported policy version {} (expected {})",
                self.version, POLICY_VERSION
            )));
        }

        for t in &self.ignore.types {
            check_type(t, "ignore.types")?;
        }
        if self.ignore.finding_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(Error::Usage("ignore.findingIds contains an empty id".to_string()));
        }
        if self.ignore.selector_contains.iter().any(|s| s.is_empty()) {
            return Err(Error::Usage(
                "ignore.selectorContains contains an empty pattern".to_string(),
            ));
        }

        for (i, rule) in self.downgrade.iter().enumerate() {
            let at = format!("downgrade[{}]", i);
            check_type(&rule.finding_type, &at)?;
            if rule.to_status == FindingStatus::Confirmed {
                return Err(Error::Usage(format!("{}: cannot downgrade to CONFIRMED", at)));
            }
            if rule.reason.trim().is_empty() {
                return Err(Error::Usage(format!("{}: reason is required", at)));
            }
            if rule.selector_contains.as_deref() == Some("") {
                return Err(Error::Usage(format!("{}: selectorContains is empty", at)));
            }
        }

        Ok(())
    }

    fn ignore_rule_for(&self, finding: &Finding) -> Option<&'static str> {
        if self.ignore.finding_ids.iter().any(|id| *id == finding.id) {
            return Some("ignore.findingIds");
        }
        if self.ignore.types.iter().any(|t| t == finding.kind.as_str()) {
            return Some("ignore.types");
        }
        if let Some(selector) = &finding.selector {
            if self
                .ignore
                .selector_contains
                .iter()
                .any(|s| selector.contains(s.as_str()))
            {
                return Some("ignore.selectorContains");
            }
        }
        None
    }

    fn downgrade_rule_for(&self, finding: &Finding) -> Option<(usize, &DowngradeRule)> {
        self.downgrade.iter().enumerate().find(|(_, rule)| {
            rule.finding_type == finding.kind.as_str()
                && match &rule.selector_contains {
                    Some(pattern) => finding
                        .selector
                        .as_deref()
                        .is_some_and(|s| s.contains(pattern.as_str())),
                    None => true,
                }
        })
    }
}

fn check_type(t: &str, at: &str) -> Result<()> {
    if KNOWN_TYPES.iter().any(|k| k.as_str() == t) {
        Ok(())
    } else {
        Err(Error::Usage(format!("{}: unknown finding type '{}'", at, t)))
    }
}

/// Apply a policy to findings.
///
/// Pure and idempotent: every decision is recomputed from the finding's
/// original status, so applying the same policy twice changes nothing.
pub fn apply_policy(findings: &[Finding], policy: &Policy) -> Vec<Finding> {
    findings
        .iter()
        .map(|finding| {
            let original = finding
                .policy
                .as_ref()
                .map(|p| p.original_status)
                .unwrap_or(finding.status);

            let mut out = finding.clone();
            out.status = original;
            out.suppressed = false;
            out.downgraded = false;
            out.policy = None;

            if let Some(rule) = policy.ignore_rule_for(&out) {
                debug!("Finding {} suppressed by {}", out.id, rule);
                out.suppressed = true;
                out.policy = Some(PolicyTrace {
                    rule: rule.to_string(),
                    reason: None,
                    original_status: original,
                });
            } else if let Some((index, rule)) = policy.downgrade_rule_for(&out) {
                if rule.to_status < original {
                    debug!(
                        "Finding {} downgraded {} -> {}",
                        out.id, original, rule.to_status
                    );
                    out.status = rule.to_status;
                    out.downgraded = true;
                    out.policy = Some(PolicyTrace {
                        rule: format!("downgrade[{}]", index),
                        reason: Some(rule.reason.clone()),
                        original_status: original,
                    });
                }
            }

            out
        })
        .collect()
}

/// Severity counts over findings that were not suppressed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeverityCounts {
    pub confirmed: usize,
    pub suspected: usize,
    pub informational: usize,
    pub suppressed: usize,
    pub downgraded: usize,
}

impl SeverityCounts {
    pub fn actionable(&self) -> usize {
        self.confirmed + self.suspected
    }
}

/// Count findings by status, excluding suppressed ones from the severity
/// buckets.
pub fn count_non_suppressed_findings(findings: &[Finding]) -> SeverityCounts {
    let mut counts = SeverityCounts::default();
    for finding in findings {
        if finding.downgraded {
            counts.downgraded += 1;
        }
        if finding.suppressed {
            counts.suppressed += 1;
            continue;
        }
        match finding.status {
            FindingStatus::Confirmed => counts.confirmed += 1,
            FindingStatus::Suspected => counts.suspected += 1,
            FindingStatus::Informational => counts.informational += 1,
        }
    }
    counts
}
