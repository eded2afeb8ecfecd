//! `silentcheck compare`

use std::path::PathBuf;

use clap::Args;

use silentcheck_core::integrity::{compare_manifests, IntegrityManifest};
use silentcheck_core::ExitCode;

use super::CommandContext;
use crate::output::{print_list, print_success, print_warning, OutputFormat};

#[derive(Args)]
pub struct CompareArgs {
    /// First run directory
    pub left: PathBuf,

    /// Second run directory
    pub right: PathBuf,
}

pub fn execute(args: CompareArgs, ctx: CommandContext) -> anyhow::Result<ExitCode> {
    let left = IntegrityManifest::load(&args.left)?;
    let right = IntegrityManifest::load(&args.right)?;
    let drift = compare_manifests(&left, &right);

    if drift.is_empty() {
        if matches!(ctx.format, OutputFormat::Table) {
            print_success(&format!(
                "Runs {} and {} have identical artifacts",
                left.run_id, right.run_id
            ));
        } else {
            print_list(&drift, ctx.format)?;
        }
        return Ok(ExitCode::Success);
    }

    print_list(&drift, ctx.format)?;
    if matches!(ctx.format, OutputFormat::Table) {
        print_warning(&format!("{} artifact(s) differ", drift.len()));
    }
    Ok(ExitCode::Incomplete)
}
