//! silentcheck configuration (`silentcheck.toml`)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cleanup::CleanupOptions;
use crate::error::{Error, Result};
use crate::journey::JourneyConfig;
use crate::run_id::{DEFAULT_RUN_ID_LENGTH, MAX_RUN_ID_LENGTH, MIN_RUN_ID_LENGTH};
use crate::scope::{ScopePolicy, DEFAULT_EXAMPLE_CAP};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub scope: ScopeConfig,
    pub journey: JourneyConfig,
    pub retention: RetentionConfig,
    pub output: OutputConfig,
}

/// Route scoping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Added to the built-in auth/account/admin prefixes
    pub auth_patterns: Vec<String>,

    /// Examples kept per scope category in reports
    pub example_cap: usize,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            auth_patterns: Vec::new(),
            example_cap: DEFAULT_EXAMPLE_CAP,
        }
    }
}

/// The settings that influence findings, recorded in the run manifest so a
/// run can be replayed without the original config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub scope: ScopeConfig,
    pub journey: JourneyConfig,
}

/// Run retention for `silentcheck clean`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub keep_last: usize,
    pub older_than_days: Option<u32>,
    pub allow_delete_confirmed: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            keep_last: 10,
            older_than_days: None,
            allow_delete_confirmed: false,
        }
    }
}

/// Where and how runs are written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub out_dir: PathBuf,
    pub run_id_length: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from(".silentcheck"),
            run_id_length: DEFAULT_RUN_ID_LENGTH,
        }
    }
}

impl Config {
    /// Load configuration. A missing file gives the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)
            .map_err(|e| Error::Usage(format!("{}: {}", path.display(), e)))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::Usage(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.journey.min_sequence_length == 0 {
            return Err(Error::Usage(
                "journey.min_sequence_length must be at least 1".to_string(),
            ));
        }
        if self.journey.min_sequence_length > self.journey.max_sequence_length {
            return Err(Error::Usage(format!(
                "journey.min_sequence_length ({}) exceeds max_sequence_length ({})",
                self.journey.min_sequence_length, self.journey.max_sequence_length
            )));
        }
        if !(MIN_RUN_ID_LENGTH..=MAX_RUN_ID_LENGTH).contains(&self.output.run_id_length) {
            return Err(Error::Usage(format!(
                "output.run_id_length must be between {} and {}",
                MIN_RUN_ID_LENGTH, MAX_RUN_ID_LENGTH
            )));
        }
        if self.scope.example_cap == 0 {
            return Err(Error::Usage("scope.example_cap must be at least 1".to_string()));
        }
        if let Some(pattern) = self
            .scope
            .auth_patterns
            .iter()
            .find(|p| !p.starts_with('/'))
        {
            return Err(Error::Usage(format!(
                "scope.auth_patterns entries must start with '/': {}",
                pattern
            )));
        }
        Ok(())
    }

    /// Scope policy for a run against `base_origin`.
    pub fn scope_policy(&self, base_origin: Option<&str>) -> ScopePolicy {
        ScopePolicy::new(&self.scope.auth_patterns, base_origin, self.scope.example_cap)
    }

    pub fn analysis_settings(&self) -> AnalysisSettings {
        AnalysisSettings {
            scope: self.scope.clone(),
            journey: self.journey,
        }
    }

    /// Config reconstructed from a recorded run's settings.
    pub fn from_settings(settings: &AnalysisSettings) -> Self {
        Self {
            scope: settings.scope.clone(),
            journey: settings.journey,
            ..Self::default()
        }
    }

    pub fn cleanup_options(&self) -> CleanupOptions {
        CleanupOptions {
            keep_last: self.retention.keep_last,
            older_than_days: self.retention.older_than_days,
            allow_delete_confirmed: self.retention.allow_delete_confirmed,
        }
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.output.out_dir.join("runs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = Config::load(tmp.path().join("silentcheck.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.journey.max_sequence_length, 20);
        assert_eq!(config.retention.keep_last, 10);
        assert_eq!(config.runs_dir(), PathBuf::from(".silentcheck/runs"));
    }

    #[test]
    fn test_partial_file() {
        let config = Config::from_toml(
            r#"
[scope]
auth_patterns = ["/internal"]

[retention]
older_than_days = 30
"#,
        )
        .unwrap();
        assert_eq!(config.scope.auth_patterns, vec!["/internal".to_string()]);
        assert_eq!(config.scope.example_cap, 10);
        assert_eq!(config.retention.older_than_days, Some(30));
        assert_eq!(config.output.run_id_length, 16);
    }

    #[test]
    fn test_invalid_values_are_usage_errors() {
        let cases = [
            "[journey]\nmin_sequence_length = 5\nmax_sequence_length = 3\n",
            "[journey]\nmin_sequence_length = 0\n",
            "[output]\nrun_id_length = 4\n",
            "[scope]\nauth_patterns = [\"admin\"]\n",
            "[unknown]\nkey = 1\n",
            "not toml at all = = =",
        ];
        for case in cases {
            assert!(
                matches!(Config::from_toml(case), Err(Error::Usage(_))),
                "accepted: {}",
                case
            );
        }
    }

    #[test]
    fn test_scope_policy_uses_extra_patterns() {
        let config = Config::from_toml("[scope]\nauth_patterns = [\"/internal\"]\n").unwrap();
        let policy = config.scope_policy(None);
        assert!(!policy.classify("/internal/tools").is_in_scope());
        assert!(policy.classify("/about").is_in_scope());
    }
}
