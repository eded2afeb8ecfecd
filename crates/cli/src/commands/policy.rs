//! `silentcheck policy`

use std::path::PathBuf;

use clap::{Args, Subcommand};

use silentcheck_core::policy::Policy;
use silentcheck_core::ExitCode;

use super::CommandContext;
use crate::output::{print_document, print_success, OutputFormat};

#[derive(Subcommand)]
pub enum PolicyCommands {
    /// Validate a policy file
    Check(CheckArgs),
}

#[derive(Args)]
pub struct CheckArgs {
    /// Policy file (policy.json)
    pub path: PathBuf,
}

pub fn execute(cmd: PolicyCommands, ctx: CommandContext) -> anyhow::Result<ExitCode> {
    match cmd {
        PolicyCommands::Check(args) => {
            let policy = Policy::load(&args.path)?;
            match ctx.format {
                OutputFormat::Table => print_success(&format!(
                    "{} is valid: {} ignored id(s), {} ignored type(s), {} selector pattern(s), {} downgrade rule(s)",
                    args.path.display(),
                    policy.ignore.finding_ids.len(),
                    policy.ignore.types.len(),
                    policy.ignore.selector_contains.len(),
                    policy.downgrade.len()
                )),
                format => print_document(&policy, format)?,
            }
            Ok(ExitCode::Success)
        }
    }
}
