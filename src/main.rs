//! forge-report: render YAML/JSON report definitions to Excel workbooks.
//!
//! `render` writes the workbook | `plan` prints every worksheet call without
//! writing | `formats` lists the registered format names.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;

use forge_report::logging;
use forge_report::runner::ReportRunner;
use forge_report::FormatRegistry;

// ─────────────────────────────────────────────────────────────────────────────
// CLI
// ─────────────────────────────────────────────────────────────────────────────

/// CLI arguments for forge-report.
#[derive(Parser)]
#[command(name = "forge-report")]
#[command(about = "Layout and formula engine for Excel reports")]
#[command(version)]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a report definition to an .xlsx workbook.
    Render {
        /// Report definition (.yaml, .yml or .json).
        report: PathBuf,

        /// Output workbook; defaults to the report path with .xlsx.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the worksheet calls a report would make, without writing.
    Plan {
        /// Report definition (.yaml, .yml or .json).
        report: PathBuf,

        /// Emit the calls as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List available format names.
    Formats {
        /// Include the custom formats of this report.
        report: Option<PathBuf>,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(logging::level_for(cli.verbose));

    let result = match &cli.command {
        Command::Render { report, output } => run_render(report, output.as_deref()),
        Command::Plan { report, json } => run_plan(report, *json),
        Command::Formats { report } => run_formats(report.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e:#}", "ERROR:".red().bold());
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

fn run_render(report: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let output = output.map_or_else(|| report.with_extension("xlsx"), Path::to_path_buf);
    let runner = ReportRunner::new(report)?;
    let summary = runner.render(&output)?;

    println!(
        "  {} {} ({} sheet(s), {} table(s), {} cell(s) in {:.2}s)",
        "✓".green().bold(),
        output.display().to_string().white(),
        summary.sheets.to_string().green(),
        summary.tables.to_string().green(),
        summary.cells.to_string().green(),
        summary.elapsed.as_secs_f64()
    );
    Ok(())
}

fn run_plan(report: &Path, json: bool) -> anyhow::Result<()> {
    let runner = ReportRunner::new(report)?;
    let recorded = runner.record()?;

    if json {
        let sheets: Vec<_> = recorded
            .iter()
            .map(|(name, surface)| serde_json::json!({ "sheet": name, "calls": surface.calls }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&sheets)?);
        return Ok(());
    }

    for (name, surface) in &recorded {
        println!();
        println!("{}", "═".repeat(70).cyan());
        println!("  {} {}", "Sheet:".cyan().bold(), name.white().bold());
        println!("{}", "═".repeat(70).cyan());
        for call in &surface.calls {
            println!("  {call}");
        }
        println!(
            "  {} {} call(s), {} cell write(s)",
            "└─".cyan(),
            surface.calls.len(),
            surface.writes().count()
        );
    }
    Ok(())
}

fn run_formats(report: Option<&Path>) -> anyhow::Result<()> {
    let registry = match report {
        Some(path) => ReportRunner::new(path)?.registry().clone(),
        None => FormatRegistry::with_builtins(),
    };

    for name in registry.names() {
        let marker = if registry.is_highlight(name)? {
            "highlight".yellow()
        } else {
            "static".dimmed()
        };
        println!("  {name:<24} {marker}");
    }
    Ok(())
}
