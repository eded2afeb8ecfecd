//! Declarative YAML scenarios

use serde::{Deserialize, Serialize};
use std::path::Path;

use silentcheck_core::policy::Policy;
use silentcheck_core::silence::SilenceEntry;
use silentcheck_core::truth::TruthState;
use silentcheck_core::{Classification, FindingKind, FindingStatus, LearnData, ObserveData};

use crate::error::{E2eError, E2eResult};

/// A complete scenario parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    /// Unique name for this scenario
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering scenarios
    #[serde(default)]
    pub tags: Vec<String>,

    /// URL the run is identified by
    #[serde(default = "default_url")]
    pub url: String,

    /// Safety flags recorded in the run identity
    #[serde(default)]
    pub flags: Vec<String>,

    /// Learner output handed to the pipeline
    #[serde(default)]
    pub learn: LearnData,

    /// Observer output handed to the pipeline
    #[serde(default)]
    pub observe: ObserveData,

    /// Optional ignore/downgrade policy
    #[serde(default)]
    pub policy: Option<Policy>,

    /// What the run must produce
    pub expect: ScenarioExpectations,
}

fn default_url() -> String {
    "http://localhost:3000".to_string()
}

/// Assertions checked after the run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioExpectations {
    #[serde(default)]
    pub exit_code: Option<i32>,

    #[serde(default)]
    pub truth_state: Option<TruthState>,

    #[serde(default)]
    pub stats: Option<ExpectedStats>,

    /// Each entry must match exactly one finding
    #[serde(default)]
    pub findings: Vec<ExpectedFinding>,

    /// Exact number of findings, when given
    #[serde(default)]
    pub finding_count: Option<usize>,

    /// Silence entries that must be present in summary.json
    #[serde(default)]
    pub silences: Vec<SilenceEntry>,

    /// Re-run into a fresh directory and require byte-identical findings.json
    #[serde(default = "default_true")]
    pub deterministic: bool,

    /// Require `verify --full` to pass on the committed run
    #[serde(default = "default_true")]
    pub replayable: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpectedStats {
    #[serde(default)]
    pub total: Option<usize>,
    #[serde(default)]
    pub observed: Option<usize>,
    #[serde(default)]
    pub silent_failures: Option<usize>,
    #[serde(default)]
    pub coverage_gaps: Option<usize>,
    #[serde(default)]
    pub unproven: Option<usize>,
    #[serde(default)]
    pub journey_stalls: Option<usize>,
}

/// Partial match against one finding; unset fields are not checked
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpectedFinding {
    #[serde(default)]
    pub expectation_id: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<FindingKind>,
    #[serde(default)]
    pub classification: Option<Classification>,
    #[serde(default)]
    pub status: Option<FindingStatus>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub suppressed: Option<bool>,
    #[serde(default)]
    pub downgraded: Option<bool>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl ScenarioSpec {
    /// Parse a scenario from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        serde_yaml::from_str(yaml).map_err(E2eError::from)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all scenarios from a directory, sorted by name
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut specs = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            specs.push(Self::from_file(entry.path())?);
        }

        specs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(specs)
    }

    /// Filter scenarios by tag
    pub fn filter_by_tag<'a>(specs: &'a [Self], tag: &str) -> Vec<&'a Self> {
        specs.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }
}
