//! silentcheck CLI
//!
//! Command-line surface over the silentcheck core: analyze a run, verify
//! and compare committed runs, inspect scope and policy, and prune old runs.

pub mod commands;
pub mod output;
