//! CLI Commands

pub mod analyze;
pub mod clean;
pub mod compare;
pub mod policy;
pub mod scope;
pub mod verify;

use silentcheck_core::Config;

use crate::output::OutputFormat;

/// Shared state handed to every command
pub struct CommandContext {
    pub config: Config,
    pub format: OutputFormat,
}
