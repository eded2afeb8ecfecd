//! `silentcheck clean`

use std::path::PathBuf;

use chrono::Utc;
use clap::Args;

use silentcheck_core::cleanup::{build_cleanup_plan, execute_cleanup, load_runs, summarize_cleanup};
use silentcheck_core::ExitCode;

use super::CommandContext;
use crate::output::{print_cleanup, print_info};

#[derive(Args)]
pub struct CleanArgs {
    /// Keep this many newest runs
    #[arg(long)]
    pub keep_last: Option<usize>,

    /// Only delete runs older than this many days
    #[arg(long)]
    pub older_than_days: Option<u32>,

    /// Allow deleting runs with confirmed findings
    #[arg(long)]
    pub allow_delete_confirmed: bool,

    /// Show what would be deleted without deleting
    #[arg(long)]
    pub dry_run: bool,

    /// Output directory (overrides config)
    #[arg(long)]
    pub out: Option<PathBuf>,
}

pub fn execute(args: CleanArgs, ctx: CommandContext) -> anyhow::Result<ExitCode> {
    let mut config = ctx.config;
    if let Some(out) = args.out {
        config.output.out_dir = out;
    }

    let mut opts = config.cleanup_options();
    if let Some(keep_last) = args.keep_last {
        opts.keep_last = keep_last;
    }
    if args.older_than_days.is_some() {
        opts.older_than_days = args.older_than_days;
    }
    opts.allow_delete_confirmed |= args.allow_delete_confirmed;

    let runs_dir = config.runs_dir();
    let runs = load_runs(&runs_dir)?;
    if runs.is_empty() {
        print_info(&format!("No runs under {}", runs_dir.display()));
        return Ok(ExitCode::Success);
    }

    let plan = build_cleanup_plan(&runs, &opts, Utc::now());
    execute_cleanup(&plan, args.dry_run)?;
    print_cleanup(&summarize_cleanup(&plan), args.dry_run, ctx.format)?;
    Ok(ExitCode::Success)
}
