//! HostSched - act coordinator scenario runner
//!
//! CLI entry point for listing and running built-in scenarios.

use actcoord::ActConfig;
use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, info};

use hostsched::cli::{Cli, Command, OutputFormat};
use hostsched::scenario::{self, Scenario, ScenarioReport};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level_str = cli_log_level.or(config_log_level);
    let level = match level_str.map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .try_init()
        .map_err(|e| eyre::eyre!("{e}"))?;

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ActConfig::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::List => {
            debug!("main: matched List command");
            cmd_list()
        }
        Command::Run { names, format } => {
            debug!(?names, ?format, "main: matched Run command");
            cmd_run(&config, &names, format)
        }
    }
}

/// List built-in scenarios
fn cmd_list() -> Result<()> {
    debug!("cmd_list: called");
    for scenario in scenario::all() {
        println!("{:<18} {}", scenario.name.cyan(), scenario.description);
    }
    Ok(())
}

/// Run scenarios and print their reports
fn cmd_run(config: &ActConfig, names: &[String], format: OutputFormat) -> Result<()> {
    debug!(?names, ?format, "cmd_run: called");
    let selected: Vec<&Scenario> = if names.is_empty() {
        scenario::all().iter().collect()
    } else {
        names
            .iter()
            .map(|name| scenario::find(name).ok_or_else(|| eyre::eyre!("Unknown scenario: {}", name)))
            .collect::<Result<_>>()?
    };

    let reports: Vec<ScenarioReport> = selected.iter().map(|s| scenario::run(s, config)).collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Text => print_reports(&reports),
    }

    let failed = reports.iter().filter(|r| !r.passed).count();
    if failed > 0 {
        eyre::bail!("{} of {} scenario(s) failed", failed, reports.len());
    }
    Ok(())
}

fn print_reports(reports: &[ScenarioReport]) {
    for report in reports {
        let status = if report.passed { "✓".green() } else { "✗".red() };
        println!("{} {:<18} {}", status, report.name.bold(), report.detail);
        for diagnostic in &report.diagnostics {
            println!("    {} {}", "warning:".yellow(), diagnostic.message().dimmed());
        }
    }
    let passed = reports.iter().filter(|r| r.passed).count();
    println!("\n{} passed, {} failed", passed, reports.len() - passed);
}
