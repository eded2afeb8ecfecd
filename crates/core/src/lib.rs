//! silentcheck core
//!
//! Truth-determination pipeline: turns code-derived expectations and
//! browser-observed traces into deterministic, evidence-backed findings
//! and a single CI exit code.

pub mod artifacts;
pub mod canonical;
pub mod cleanup;
pub mod confidence;
pub mod config;
pub mod detect;
pub mod error;
pub mod integrity;
pub mod journey;
pub mod pipeline;
pub mod policy;
pub mod run_id;
pub mod scope;
pub mod silence;
pub mod staging;
pub mod truth;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, ExitCode, Result};
pub use pipeline::{replay_run, run_analysis, AnalysisInput, RunContext, RunOutcome};
pub use scope::{ScopeClassification, ScopePolicy};
pub use truth::{TruthResolution, TruthState};
pub use types::*;

/// silentcheck version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "silentcheck.toml";
