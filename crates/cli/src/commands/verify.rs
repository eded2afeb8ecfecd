//! `silentcheck verify`

use std::path::PathBuf;

use clap::Args;

use silentcheck_core::integrity::verify_run;
use silentcheck_core::{replay_run, ExitCode};

use super::CommandContext;
use crate::output::{print_document, print_error, print_list, print_success, OutputFormat};

#[derive(Args)]
pub struct VerifyArgs {
    /// Committed run directory
    pub run_dir: PathBuf,

    /// Also recompute findings from the stored inputs
    #[arg(long)]
    pub full: bool,
}

pub fn execute(args: VerifyArgs, ctx: CommandContext) -> anyhow::Result<ExitCode> {
    if args.full {
        let outcome = replay_run(&args.run_dir)?;
        if !matches!(ctx.format, OutputFormat::Table) {
            print_document(&outcome, ctx.format)?;
            return Ok(outcome.exit_code());
        }

        if !outcome.integrity.is_clean() {
            print_list(&outcome.integrity.violations, ctx.format)?;
            print_error("Integrity check failed; findings were not recomputed");
        } else if outcome.findings_reproduced == Some(false) {
            print_error("Recomputed findings differ from findings.json");
        } else {
            print_success(&format!(
                "Run {} verified and findings reproduced",
                outcome.integrity.run_id
            ));
        }
        return Ok(outcome.exit_code());
    }

    let report = verify_run(&args.run_dir)?;
    if !matches!(ctx.format, OutputFormat::Table) {
        print_document(&report, ctx.format)?;
    } else if report.is_clean() {
        print_success(&format!(
            "Run {}: {} artifact(s) verified",
            report.run_id, report.verified
        ));
    } else {
        print_list(&report.violations, ctx.format)?;
        print_error(&format!(
            "Run {}: {} integrity violation(s)",
            report.run_id,
            report.violations.len()
        ));
    }

    Ok(if report.is_clean() {
        ExitCode::Success
    } else {
        ExitCode::Incomplete
    })
}
