//! `silentcheck analyze`

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use colored::Colorize;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use silentcheck_core::policy::{Policy, SeverityCounts};
use silentcheck_core::run_id::{RunInputs, ScanBudget};
use silentcheck_core::truth::render;
use silentcheck_core::{
    run_analysis, AnalysisInput, DetectionStats, Error, ExitCode, Finding, RunContext, TruthState,
};

use super::CommandContext;
use crate::output::{print_document, print_list, print_warning, OutputFormat};

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Learner output (expectations)
    #[arg(long)]
    pub learn: PathBuf,

    /// Observer output (observations and traces)
    #[arg(long)]
    pub observe: PathBuf,

    /// URL that was scanned
    #[arg(long)]
    pub url: String,

    /// Base origin for scope decisions (defaults to the URL's origin)
    #[arg(long)]
    pub origin: Option<String>,

    /// Page budget the Observer ran with
    #[arg(long, default_value_t = 0)]
    pub max_pages: u32,

    /// Interaction budget the Observer ran with
    #[arg(long, default_value_t = 0)]
    pub max_interactions: u32,

    /// Safety flag the Observer ran with (repeatable)
    #[arg(long = "flag")]
    pub flags: Vec<String>,

    /// Ignore/downgrade policy
    #[arg(long, env = "SILENTCHECK_POLICY")]
    pub policy: Option<PathBuf>,

    /// Manifest path recorded in the run identity
    #[arg(long, default_value = "")]
    pub manifest_path: String,

    /// Output directory (overrides config)
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeReport<'a> {
    run_id: &'a str,
    run_dir: &'a Path,
    truth_state: TruthState,
    exit_code: i32,
    reason: &'a str,
    action: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<&'a str>,
    stats: DetectionStats,
    counts: SeverityCounts,
    findings: &'a [Finding],
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Data(format!("cannot read {} {}: {}", what, path.display(), e)))?;
    let value = serde_json::from_str(&content)
        .map_err(|e| Error::Data(format!("malformed {} {}: {}", what, path.display(), e)))?;
    Ok(value)
}

/// `scheme://host[:port]` of a URL, or an empty string.
fn origin_of(url: &str) -> String {
    match url.find("://") {
        Some(idx) => {
            let rest = &url[idx + 3..];
            let end = rest
                .find(|c: char| matches!(c, '/' | '?' | '#'))
                .unwrap_or(rest.len());
            format!("{}{}", &url[..idx + 3], &rest[..end])
        }
        None => String::new(),
    }
}

pub fn execute(args: AnalyzeArgs, ctx: CommandContext) -> anyhow::Result<ExitCode> {
    let learn: Value = read_json(&args.learn, "learn data")?;
    let observe: Value = read_json(&args.observe, "observe data")?;
    let policy = args.policy.as_deref().map(Policy::load).transpose()?;
    let input = AnalysisInput::from_documents(learn, observe, policy)?;
    debug!(
        "Loaded {} expectation(s), {} observation(s), {} trace(s)",
        input.learn.expectations.len(),
        input.observe.observations.len(),
        input.observe.traces.len()
    );

    let mut config = ctx.config;
    if let Some(out) = args.out {
        config.output.out_dir = out;
    }

    let inputs = RunInputs {
        base_origin: args.origin.unwrap_or_else(|| origin_of(&args.url)),
        url: args.url,
        safety_flags: args.flags,
        scan_budget: ScanBudget {
            max_pages: args.max_pages,
            max_interactions: args.max_interactions,
        },
        manifest_path: args.manifest_path,
        argv: std::env::args().collect(),
    };

    let mut run = RunContext::new(config, inputs)?;
    let outcome = run_analysis(&mut run, &input)
        .with_context(|| format!("run {} failed", run.run_id()))?;

    match ctx.format {
        OutputFormat::Table => {
            print_list(&outcome.findings, ctx.format)?;
            println!();
            let verdict = render(&outcome.truth);
            match outcome.truth.truth_state {
                TruthState::Success => print!("{}", verdict.green()),
                TruthState::Findings => print!("{}", verdict.yellow()),
                TruthState::Incomplete => print!("{}", verdict.red().bold()),
            }
            println!("Artifacts: {}", outcome.run_dir.display());
            if outcome.counts.suppressed > 0 {
                print_warning(&format!(
                    "{} finding(s) suppressed by policy",
                    outcome.counts.suppressed
                ));
            }
        }
        format => print_document(
            &AnalyzeReport {
                run_id: &outcome.run_id,
                run_dir: &outcome.run_dir,
                truth_state: outcome.truth.truth_state,
                exit_code: outcome.truth.exit_code,
                reason: &outcome.truth.reason,
                action: &outcome.truth.action,
                warning: outcome.truth.warning.as_deref(),
                stats: outcome.stats,
                counts: outcome.counts,
                findings: &outcome.findings,
            },
            format,
        )?,
    }

    Ok(outcome.exit_code)
}
