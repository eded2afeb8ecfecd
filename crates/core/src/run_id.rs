//! Deterministic run identity and the run manifest.

use serde::{Deserialize, Serialize};

use crate::canonical::to_canonical_json;
use crate::config::AnalysisSettings;
use crate::error::{Error, Result};
use crate::integrity::sha256_hex;

pub const DEFAULT_RUN_ID_LENGTH: usize = 16;
pub const MIN_RUN_ID_LENGTH: usize = 8;
pub const MAX_RUN_ID_LENGTH: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanBudget {
    #[serde(default)]
    pub max_pages: u32,
    #[serde(default)]
    pub max_interactions: u32,
}

/// Everything that identifies a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInputs {
    pub url: String,
    #[serde(default)]
    pub base_origin: String,
    #[serde(default)]
    pub safety_flags: Vec<String>,
    #[serde(default)]
    pub scan_budget: ScanBudget,
    #[serde(default)]
    pub manifest_path: String,
    /// Recorded in the run manifest but not part of the identity.
    #[serde(default)]
    pub argv: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdentityMaterial<'a> {
    url: &'a str,
    base_origin: &'a str,
    safety_flags: Vec<&'a str>,
    scan_budget: ScanBudget,
    manifest_path: &'a str,
}

/// Hash the identifying inputs into a hex run id of `length` characters.
///
/// Safety flags are order-insensitive. argv and wall-clock time are not
/// part of the identity.
pub fn compute_run_id(inputs: &RunInputs, length: usize) -> Result<String> {
    if !(MIN_RUN_ID_LENGTH..=MAX_RUN_ID_LENGTH).contains(&length) {
        return Err(Error::Usage(format!(
            "run id length must be between {} and {}, got {}",
            MIN_RUN_ID_LENGTH, MAX_RUN_ID_LENGTH, length
        )));
    }
    if inputs.url.trim().is_empty() {
        return Err(Error::Usage("url is required to identify a run".to_string()));
    }

    let mut flags: Vec<&str> = inputs.safety_flags.iter().map(String::as_str).collect();
    flags.sort_unstable();
    flags.dedup();

    let material = IdentityMaterial {
        url: &inputs.url,
        base_origin: &inputs.base_origin,
        safety_flags: flags,
        scan_budget: inputs.scan_budget,
        manifest_path: &inputs.manifest_path,
    };

    let mut id = sha256_hex(&to_canonical_json(&material)?);
    id.truncate(length);
    Ok(id)
}

/// `run-manifest.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunManifest {
    pub run_id: String,
    pub tool_version: String,
    pub inputs: RunInputs,
    pub settings: AnalysisSettings,
    /// SHA-256 of the stored `learn.json`, `observe.json` and `policy.json`
    pub input_digests: InputDigests,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputDigests {
    pub learn: String,
    pub observe: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> RunInputs {
        RunInputs {
            url: "http://localhost:3000".to_string(),
            base_origin: "http://localhost:3000".to_string(),
            safety_flags: vec!["no-forms".to_string(), "read-only".to_string()],
            scan_budget: ScanBudget {
                max_pages: 10,
                max_interactions: 50,
            },
            manifest_path: ".silentcheck/manifest.json".to_string(),
            argv: vec!["silentcheck".to_string(), "analyze".to_string()],
        }
    }

    #[test]
    fn test_run_id_is_stable() {
        let a = compute_run_id(&inputs(), DEFAULT_RUN_ID_LENGTH).unwrap();
        let b = compute_run_id(&inputs(), DEFAULT_RUN_ID_LENGTH).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), DEFAULT_RUN_ID_LENGTH);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_flag_order_and_argv_do_not_matter() {
        let mut other = inputs();
        other.safety_flags.reverse();
        other.argv = vec!["different".to_string()];
        assert_eq!(
            compute_run_id(&inputs(), 16).unwrap(),
            compute_run_id(&other, 16).unwrap()
        );
    }

    #[test]
    fn test_identity_fields_change_id() {
        let base = compute_run_id(&inputs(), 16).unwrap();

        let mut other = inputs();
        other.url = "http://localhost:4000".to_string();
        assert_ne!(base, compute_run_id(&other, 16).unwrap());

        let mut other = inputs();
        other.scan_budget.max_pages = 11;
        assert_ne!(base, compute_run_id(&other, 16).unwrap());

        let mut other = inputs();
        other.manifest_path = "elsewhere.json".to_string();
        assert_ne!(base, compute_run_id(&other, 16).unwrap());
    }

    #[test]
    fn test_rejects_bad_length_and_empty_url() {
        assert!(matches!(compute_run_id(&inputs(), 4), Err(Error::Usage(_))));
        let mut empty = inputs();
        empty.url = " ".to_string();
        assert!(matches!(compute_run_id(&empty, 16), Err(Error::Usage(_))));
    }
}
