//! `silentcheck scope`

use clap::Args;

use silentcheck_core::scope::ScopeFrontier;
use silentcheck_core::ExitCode;

use super::CommandContext;
use crate::output::{print_document, print_info, print_list, OutputFormat};

#[derive(Args)]
pub struct ScopeArgs {
    /// Routes or URLs to classify
    #[arg(required = true)]
    pub routes: Vec<String>,

    /// Base origin; absolute URLs on other origins are external
    #[arg(long)]
    pub origin: Option<String>,
}

pub fn execute(args: ScopeArgs, ctx: CommandContext) -> anyhow::Result<ExitCode> {
    let policy = ctx.config.scope_policy(args.origin.as_deref());
    let report = policy.classify_many(&args.routes);

    if !matches!(ctx.format, OutputFormat::Table) {
        print_document(&report, ctx.format)?;
        return Ok(ExitCode::Success);
    }

    let mut frontier = ScopeFrontier::new(policy);
    for route in &args.routes {
        frontier.try_add(route);
    }
    print_list(frontier.decisions(), ctx.format)?;

    print_info(&format!(
        "{} of {} route(s) in scope",
        report.in_scope.len(),
        report.total
    ));
    for (classification, examples) in &report.examples {
        let count = report.counts.get(classification).copied().unwrap_or(0);
        print_info(&format!(
            "{}: {} (e.g. {})",
            classification,
            count,
            examples.join(", ")
        ));
    }
    Ok(ExitCode::Success)
}
