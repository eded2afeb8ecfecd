//! Run artifact registry
//!
//! Fixed table of the files a run directory holds and whether each one is
//! canonical (hashed for verdict purposes) or diagnostic.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    RunManifest,
    Learn,
    Observe,
    Policy,
    Findings,
    Traces,
    Summary,
    IntegrityManifest,
    Diagnostics,
}

impl ArtifactKind {
    /// Every artifact, in write order.
    pub const ALL: [ArtifactKind; 9] = [
        ArtifactKind::RunManifest,
        ArtifactKind::Learn,
        ArtifactKind::Observe,
        ArtifactKind::Policy,
        ArtifactKind::Findings,
        ArtifactKind::Traces,
        ArtifactKind::Summary,
        ArtifactKind::IntegrityManifest,
        ArtifactKind::Diagnostics,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            ArtifactKind::RunManifest => "run-manifest.json",
            ArtifactKind::Learn => "learn.json",
            ArtifactKind::Observe => "observe.json",
            ArtifactKind::Policy => "policy.json",
            ArtifactKind::Findings => "findings.json",
            ArtifactKind::Traces => "traces.jsonl",
            ArtifactKind::Summary => "summary.json",
            ArtifactKind::IntegrityManifest => "integrity.manifest.json",
            ArtifactKind::Diagnostics => "diagnostics.json",
        }
    }

    /// Whether the artifact is listed in the integrity manifest.
    ///
    /// The integrity manifest cannot hash itself; diagnostics carry
    /// timestamps and durations and are never hashed.
    pub fn is_hashed(self) -> bool {
        !matches!(
            self,
            ArtifactKind::IntegrityManifest | ArtifactKind::Diagnostics
        )
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.file_name() == name)
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.file_name())
    }
}
