//! silentcheck CLI - Main Entry Point
//!
//! Turns expectations mined from source and observations recorded in a
//! browser into evidence-backed findings with a CI exit code.

use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{Parser, Subcommand};

use silentcheck_cli::commands::{analyze, clean, compare, policy, scope, verify, CommandContext};
use silentcheck_cli::output::{self, print_error};
use silentcheck_core::{Config, Error, ExitCode, DEFAULT_CONFIG_FILE};

/// silentcheck - silent failure detection for web applications
#[derive(Parser)]
#[command(name = "silentcheck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file
    #[arg(long, global = true, env = "SILENTCHECK_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a run from learn and observe data
    Analyze(analyze::AnalyzeArgs),

    /// Verify a committed run against its integrity manifest
    Verify(verify::VerifyArgs),

    /// Compare the artifacts of two runs
    Compare(compare::CompareArgs),

    /// Classify routes against the scope policy
    Scope(scope::ScopeArgs),

    /// Policy file tools
    #[command(subcommand)]
    Policy(policy::PolicyCommands),

    /// Delete old runs under the retention rules
    Clean(clean::CleanArgs),
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = Config::load(&cli.config)?;
    let ctx = CommandContext {
        config,
        format: cli.format,
    };

    match cli.command {
        Commands::Analyze(args) => analyze::execute(args, ctx),
        Commands::Verify(args) => verify::execute(args, ctx),
        Commands::Compare(args) => compare::execute(args, ctx),
        Commands::Scope(args) => scope::execute(args, ctx),
        Commands::Policy(cmd) => policy::execute(cmd, ctx),
        Commands::Clean(args) => clean::execute(args, ctx),
    }
}

/// Exit code for an error that escaped a command.
fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<Error>() {
        Some(core) => core.exit_code(),
        None if err.downcast_ref::<std::io::Error>().is_some() => ExitCode::DataError,
        None => ExitCode::InvariantViolation,
    }
}

/// Exit code for a command line clap rejected.
fn parse_exit_code(err: &clap::Error) -> ExitCode {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::Success,
        _ => ExitCode::UsageError,
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = parse_exit_code(&e);
            let _ = e.print();
            std::process::exit(code.code());
        }
    };

    // Logs go to stderr so JSON/YAML on stdout stays machine-readable
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            print_error(&format!("{:#}", e));
            exit_code_for(&e)
        }
    };
    std::process::exit(code.code());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_code(argv: &[&str]) -> i32 {
        match Cli::try_parse_from(argv) {
            Ok(_) => ExitCode::Success.code(),
            Err(e) => parse_exit_code(&e).code(),
        }
    }

    #[test]
    fn test_unknown_flag_is_usage_error() {
        assert_eq!(parse_code(&["silentcheck", "analyze", "--bogus"]), 64);
    }

    #[test]
    fn test_missing_required_argument_is_usage_error() {
        assert_eq!(parse_code(&["silentcheck", "analyze", "--learn", "learn.json"]), 64);
        assert_eq!(parse_code(&["silentcheck"]), 64);
    }

    #[test]
    fn test_help_and_version_exit_zero() {
        assert_eq!(parse_code(&["silentcheck", "--help"]), 0);
        assert_eq!(parse_code(&["silentcheck", "--version"]), 0);
    }

    #[test]
    fn test_complete_command_line_parses() {
        let cli = Cli::try_parse_from([
            "silentcheck",
            "analyze",
            "--learn",
            "learn.json",
            "--observe",
            "observe.json",
            "--url",
            "http://localhost:3000",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Analyze(_)));
    }
}
