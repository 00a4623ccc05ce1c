//! CKAN Mirror - scheduled mirror job
//!
//! Fetches the upstream CKAN metadata archive, mirrors the referenced
//! artifacts and publishes a rewritten snapshot plus a status page.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use ckan_mirror::{MirrorConfig, MirrorRun};

/// Exit status when the run completed but some modules were not fully mirrored
const EXIT_PARTIAL: u8 = 2;

/// CLI command
#[derive(Debug)]
enum Command {
    /// Run the mirror once (default)
    Run { config: Option<PathBuf> },
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"CKAN Mirror - mirror a CKAN metadata repository and its downloads

USAGE:
    ckan-mirror                    # Run once with the default config lookup
    ckan-mirror run [CONFIG]       # Run once with an explicit config file
    ckan-mirror help

CONFIG LOOKUP:
    1. CONFIG argument
    2. $CKAN_MIRROR_CONFIG
    3. ./mirror.json
    4. built-in defaults

ENVIRONMENT:
    CKAN_MIRROR_CATALOG_URL   Override catalog_url
    CKAN_MIRROR_OUTPUT_DIR    Override output_dir
    CKAN_MIRROR_URL_PREFIX    Override local_url_prefix
    RUST_LOG                  Log level (trace, debug, info, warn, error)

EXIT STATUS:
    0   every module mirrored or up to date
    1   fatal error, no snapshot published
    2   snapshot published, some modules degraded or missing
"#
    );
}

fn parse_args() -> Command {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        None => Command::Run { config: None },
        Some("run") => Command::Run {
            config: args.get(2).map(PathBuf::from),
        },
        Some("help" | "--help" | "-h") => Command::Help,
        Some(other) => {
            eprintln!("Unknown command: {}", other);
            Command::Help
        }
    }
}

async fn run(config: Option<PathBuf>) -> Result<ckan_mirror::RunReport> {
    let config = MirrorConfig::load(config.as_deref()).context("Failed to load configuration")?;

    info!(
        catalog = %config.catalog_url,
        output = %config.output_dir.display(),
        "Starting mirror run"
    );

    let report = MirrorRun::new(config)
        .run()
        .await
        .context("Mirror run aborted")?;
    Ok(report)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Initialize logging
    let log_level = env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let config = match parse_args() {
        Command::Run { config } => config,
        Command::Help => {
            print_help();
            return ExitCode::SUCCESS;
        }
    };

    match run(config).await {
        Ok(report) if report.has_failures() => {
            warn!(
                degraded = report.counts.degraded,
                failed = report.counts.failed,
                "Snapshot published with failures"
            );
            ExitCode::from(EXIT_PARTIAL)
        }
        Ok(report) => {
            info!(
                modules = report.published.published_modules,
                archive = %report.published.archive.display(),
                "Snapshot published"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = format!("{:#}", e), "Mirror run failed");
            ExitCode::FAILURE
        }
    }
}
