//! silentcheck E2E scenario framework
//!
//! Runs the full analysis pipeline against declarative YAML scenarios and
//! checks the committed run directory, not just in-memory results:
//! - Parses scenarios (learn data, observe data, optional policy)
//! - Commits each run into a throwaway output directory
//! - Verifies the integrity manifest and replays the run
//! - Re-runs to confirm byte-identical findings
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Scenario Runner (Rust)                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioRunner                                             │
//! │    ├── run_all() / run_tagged(tag) -> SuiteResult           │
//! │    ├── run_scenario(spec) -> ScenarioResult                 │
//! │    │     ├── run_analysis() into a tempdir                  │
//! │    │     ├── verify_run() + replay_run()                    │
//! │    │     └── second run, compare findings.json bytes        │
//! │    └── write_results() -> scenario-results.json             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioSpec (YAML)                                        │
//! │    ├── name, description, tags, url, flags                  │
//! │    ├── learn:   { expectations, skipped }                   │
//! │    ├── observe: { status, observations, traces, ... }       │
//! │    ├── policy:  Option<Policy>                              │
//! │    └── expect:  { exit_code, truth_state, stats,            │
//! │                   findings, silences, ... }                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod runner;
pub mod spec;

pub use error::{E2eError, E2eResult};
pub use runner::{ScenarioResult, ScenarioRunner, SuiteResult};
pub use spec::ScenarioSpec;
