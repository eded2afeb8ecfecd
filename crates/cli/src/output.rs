//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

use silentcheck_core::cleanup::CleanupSummary;
use silentcheck_core::integrity::{ArtifactDrift, IntegrityViolation};
use silentcheck_core::scope::FrontierDecision;
use silentcheck_core::{Finding, FindingStatus};

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Print any serializable document in a machine format.
pub fn print_document<T: Serialize + ?Sized>(value: &T, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
        OutputFormat::Json | OutputFormat::Table => {
            println!("{}", serde_json::to_string_pretty(value)?)
        }
    }
    Ok(())
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("No items found.");
                return Ok(());
            }
            let mut table = new_table();
            table.set_header(T::headers());
            for item in items {
                table.add_row(item.row());
            }
            println!("{table}");
            Ok(())
        }
        _ => print_document(items, format),
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message.red());
}

/// Print warning message
pub fn print_warning(message: &str) {
    println!("⚠️  {}", message.yellow());
}

/// Print info message
pub fn print_info(message: &str) {
    println!("ℹ️  {}", message);
}

fn status_cell(finding: &Finding) -> String {
    let label = if finding.suppressed {
        format!("{} (suppressed)", finding.status)
    } else if finding.downgraded {
        format!("{} (downgraded)", finding.status)
    } else {
        finding.status.to_string()
    };
    match finding.status {
        _ if finding.suppressed => label.dimmed().to_string(),
        FindingStatus::Confirmed => label.red().bold().to_string(),
        FindingStatus::Suspected => label.yellow().to_string(),
        FindingStatus::Informational => label,
    }
}

impl TableDisplay for Finding {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "TYPE", "CLASSIFICATION", "STATUS", "CONFIDENCE", "TARGET", "REASON"]
    }

    fn row(&self) -> Vec<String> {
        let target = self
            .promise
            .as_ref()
            .map(|p| p.value.clone())
            .or_else(|| self.selector.clone())
            .unwrap_or_else(|| "-".to_string());
        vec![
            self.id.clone(),
            self.kind.to_string(),
            self.classification.to_string(),
            status_cell(self),
            format!("{:.2} ({})", self.confidence, self.assessment.level),
            target,
            self.reason.clone(),
        ]
    }
}

impl TableDisplay for IntegrityViolation {
    fn headers() -> Vec<&'static str> {
        vec!["ARTIFACT", "VIOLATION", "EXPECTED", "ACTUAL"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.artifact.clone(),
            self.kind.as_str().to_string(),
            short_hash(&self.expected),
            self.actual
                .as_deref()
                .map(short_hash)
                .unwrap_or_else(|| "-".to_string()),
        ]
    }
}

impl TableDisplay for ArtifactDrift {
    fn headers() -> Vec<&'static str> {
        vec!["ARTIFACT", "DRIFT", "LEFT", "RIGHT"]
    }

    fn row(&self) -> Vec<String> {
        let hash = |h: &Option<String>| h.as_deref().map(short_hash).unwrap_or_else(|| "-".to_string());
        vec![
            self.artifact.clone(),
            format!("{:?}", self.kind).to_lowercase(),
            hash(&self.left),
            hash(&self.right),
        ]
    }
}

impl TableDisplay for FrontierDecision {
    fn headers() -> Vec<&'static str> {
        vec!["ROUTE", "CLASSIFICATION", "ADDED"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.route.clone(),
            self.classification.to_string(),
            if self.added { "yes".to_string() } else { "no".to_string() },
        ]
    }
}

/// Render a cleanup summary as a two-column table.
pub fn print_cleanup(summary: &CleanupSummary, dry_run: bool, format: OutputFormat) -> anyhow::Result<()> {
    if !matches!(format, OutputFormat::Table) {
        return print_document(summary, format);
    }

    let mut table = new_table();
    table.set_header(vec!["", "COUNT", "RUNS"]);
    let verb = if dry_run { "would delete" } else { "deleted" };
    table.add_row(vec![
        verb.to_string(),
        summary.delete_count.to_string(),
        summary.delete_ids.join(", "),
    ]);
    table.add_row(vec![
        "kept".to_string(),
        summary.keep_count.to_string(),
        summary.keep_ids.join(", "),
    ]);
    table.add_row(vec![
        "protected".to_string(),
        summary.protected_count.to_string(),
        summary.protected_ids.join(", "),
    ]);
    println!("{table}");
    Ok(())
}

fn short_hash(hash: &str) -> String {
    hash.chars().take(12).collect()
}
