//! Artifact integrity
//!
//! SHA-256 over raw artifact bytes, the per-run integrity manifest, replay
//! verification of a committed run, and manifest comparison between runs.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::artifacts::ArtifactKind;
use crate::canonical::to_canonical_json;
use crate::error::{Error, Result};
use crate::silence::{sort_silences, SilenceEntry};

pub const INTEGRITY_MANIFEST_VERSION: u32 = 1;

/// Compute SHA-256 hash of data
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute SHA-256 hash of a file
pub fn hash_file(path: impl AsRef<Path>) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDigest {
    pub sha256: String,
    pub size: u64,
}

/// `integrity.manifest.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityManifest {
    pub version: u32,
    pub run_id: String,
    pub artifacts: BTreeMap<String, ArtifactDigest>,
}

impl IntegrityManifest {
    /// Hash every hashed artifact present in `dir`.
    pub fn build(run_id: &str, dir: &Path) -> Result<Self> {
        let mut artifacts = BTreeMap::new();
        for kind in ArtifactKind::ALL.iter().filter(|k| k.is_hashed()) {
            let path = dir.join(kind.file_name());
            if !path.exists() {
                continue;
            }
            let sha256 = hash_file(&path)?;
            let size = std::fs::metadata(&path)?.len();
            debug!("Hashed {} ({} bytes): {}", kind, size, sha256);
            artifacts.insert(kind.file_name().to_string(), ArtifactDigest { sha256, size });
        }

        Ok(Self {
            version: INTEGRITY_MANIFEST_VERSION,
            run_id: run_id.to_string(),
            artifacts,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        to_canonical_json(self)
    }

    /// Load a run's integrity manifest. A missing or unreadable manifest is
    /// a data error.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(ArtifactKind::IntegrityManifest.file_name());
        let content = std::fs::read_to_string(&path).map_err(|e| {
            Error::Data(format!("cannot read {}: {}", path.display(), e))
        })?;
        let manifest: IntegrityManifest = serde_json::from_str(&content).map_err(|e| {
            Error::Data(format!("malformed {}: {}", path.display(), e))
        })?;
        if manifest.version != INTEGRITY_MANIFEST_VERSION {
            return Err(Error::Data(format!(
                "unsupported integrity manifest version {}",
                manifest.version
            )));
        }
        Ok(manifest)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    FileMissing,
    HashMismatch,
}

impl ViolationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationKind::FileMissing => "file_missing",
            ViolationKind::HashMismatch => "hash_mismatch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityViolation {
    pub artifact: String,
    pub kind: ViolationKind,
    pub expected: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
}

impl IntegrityViolation {
    pub fn to_silence(&self) -> SilenceEntry {
        SilenceEntry::new("integrity", self.kind.as_str(), self.artifact.clone())
    }
}

/// Outcome of re-hashing a committed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub run_id: String,
    pub verified: usize,
    pub violations: Vec<IntegrityViolation>,
    pub silences: Vec<SilenceEntry>,
}

impl ReplayReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Check every artifact listed in `manifest` against the files in `dir`.
pub fn check_against(manifest: &IntegrityManifest, dir: &Path) -> Result<ReplayReport> {
    let mut verified = 0;
    let mut violations = Vec::new();

    for (name, digest) in &manifest.artifacts {
        let path = dir.join(name);
        if !path.exists() {
            violations.push(IntegrityViolation {
                artifact: name.clone(),
                kind: ViolationKind::FileMissing,
                expected: digest.sha256.clone(),
                actual: None,
            });
            continue;
        }

        let actual = hash_file(&path)?;
        if actual != digest.sha256 {
            violations.push(IntegrityViolation {
                artifact: name.clone(),
                kind: ViolationKind::HashMismatch,
                expected: digest.sha256.clone(),
                actual: Some(actual),
            });
        } else {
            verified += 1;
        }
    }

    let mut silences: Vec<SilenceEntry> = violations.iter().map(|v| v.to_silence()).collect();
    sort_silences(&mut silences);

    Ok(ReplayReport {
        run_id: manifest.run_id.clone(),
        verified,
        violations,
        silences,
    })
}

/// Replay verification of a committed run directory.
pub fn verify_run(dir: &Path) -> Result<ReplayReport> {
    let manifest = IntegrityManifest::load(dir)?;
    let report = check_against(&manifest, dir)?;

    if report.is_clean() {
        info!("Run {} verified: {} artifact(s)", report.run_id, report.verified);
    } else {
        for v in &report.violations {
            warn!("Integrity violation in {}: {}", v.artifact, v.kind.as_str());
        }
    }
    Ok(report)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftKind {
    Added,
    Removed,
    Changed,
}

/// One artifact that differs between two runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDrift {
    pub artifact: String,
    pub kind: DriftKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<String>,
}

/// Diff two integrity manifests, sorted by artifact name.
pub fn compare_manifests(left: &IntegrityManifest, right: &IntegrityManifest) -> Vec<ArtifactDrift> {
    let names: BTreeSet<&String> = left.artifacts.keys().chain(right.artifacts.keys()).collect();

    names
        .into_iter()
        .filter_map(|name| {
            let l = left.artifacts.get(name).map(|d| d.sha256.clone());
            let r = right.artifacts.get(name).map(|d| d.sha256.clone());
            let kind = match (&l, &r) {
                (Some(a), Some(b)) if a == b => return None,
                (Some(_), Some(_)) => DriftKind::Changed,
                (Some(_), None) => DriftKind::Removed,
                (None, Some(_)) => DriftKind::Added,
                (None, None) => return None,
            };
            Some(ArtifactDrift {
                artifact: name.clone(),
                kind,
                left: l,
                right: r,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_run(dir: &Path) {
        std::fs::write(dir.join("findings.json"), b"{\"findings\":[]}\n").unwrap();
        std::fs::write(dir.join("summary.json"), b"{\"truthState\":\"SUCCESS\"}\n").unwrap();
        std::fs::write(dir.join("diagnostics.json"), b"{\"startedAt\":\"now\"}\n").unwrap();
        let manifest = IntegrityManifest::build("abc", dir).unwrap();
        std::fs::write(dir.join("integrity.manifest.json"), manifest.to_bytes().unwrap()).unwrap();
    }

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_manifest_excludes_diagnostics() {
        let tmp = TempDir::new().unwrap();
        write_run(tmp.path());
        let manifest = IntegrityManifest::load(tmp.path()).unwrap();
        assert_eq!(
            manifest.artifacts.keys().collect::<Vec<_>>(),
            vec!["findings.json", "summary.json"]
        );
    }

    #[test]
    fn test_clean_run_verifies() {
        let tmp = TempDir::new().unwrap();
        write_run(tmp.path());
        // diagnostics may change freely
        std::fs::write(tmp.path().join("diagnostics.json"), b"{}").unwrap();

        let report = verify_run(tmp.path()).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.verified, 2);
    }

    #[test]
    fn test_missing_and_mismatched_files() {
        let tmp = TempDir::new().unwrap();
        write_run(tmp.path());
        std::fs::remove_file(tmp.path().join("summary.json")).unwrap();
        std::fs::write(tmp.path().join("findings.json"), b"{\"findings\":[1]}\n").unwrap();

        let report = verify_run(tmp.path()).unwrap();
        assert_eq!(report.violations.len(), 2);
        assert_eq!(report.violations[0].artifact, "findings.json");
        assert_eq!(report.violations[0].kind, ViolationKind::HashMismatch);
        assert_eq!(report.violations[1].kind, ViolationKind::FileMissing);
        assert_eq!(report.silences.len(), 2);
        assert_eq!(report.silences[0].reason, "file_missing");
    }

    #[test]
    fn test_missing_manifest_is_data_error() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(verify_run(tmp.path()).unwrap_err(), Error::Data(_)));
    }

    #[test]
    fn test_compare_manifests() {
        let digest = |s: &str| ArtifactDigest {
            sha256: s.to_string(),
            size: 1,
        };
        let left = IntegrityManifest {
            version: 1,
            run_id: "r".to_string(),
            artifacts: BTreeMap::from([
                ("a.json".to_string(), digest("1")),
                ("b.json".to_string(), digest("2")),
                ("c.json".to_string(), digest("3")),
            ]),
        };
        let right = IntegrityManifest {
            version: 1,
            run_id: "r".to_string(),
            artifacts: BTreeMap::from([
                ("a.json".to_string(), digest("1")),
                ("b.json".to_string(), digest("9")),
                ("d.json".to_string(), digest("4")),
            ]),
        };

        let drift = compare_manifests(&left, &right);
        let kinds: Vec<(&str, DriftKind)> =
            drift.iter().map(|d| (d.artifact.as_str(), d.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("b.json", DriftKind::Changed),
                ("c.json", DriftKind::Removed),
                ("d.json", DriftKind::Added),
            ]
        );
        assert!(compare_manifests(&left, &left).is_empty());
    }
}
