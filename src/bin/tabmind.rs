//! Tabmind CLI Binary
//!
//! Command-line entry point: loads configuration, initializes logging and runs
//! the selected command on a single-threaded tokio runtime.

use anyhow::Context;
use clap::Parser;
use std::process;
use tabmind::cli::{Cli, RunContext};
use tabmind::config::ConfigLoader;
use tabmind::logging::{init_logging, LoggingConfig};
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();

    // Build logging config from CLI args, env vars, and config file
    let logging_config = build_logging_config(&cli);

    // Initialize logging early; stdout stays reserved for command output
    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    info!("Tabmind CLI starting");

    let context = match RunContext::new(cli.config.clone()) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Error loading configuration: {}", e);
            eprintln!("{}", tabmind::cli::map_error(&e));
            process::exit(1);
        }
    };

    match run(&context, &cli) {
        Ok(Ok(output)) => {
            info!("Command completed successfully");
            println!("{}", output);
        }
        Ok(Err(e)) => {
            error!("Command failed: {}", e);
            eprintln!("{}", tabmind::cli::map_error(&e));
            process::exit(1);
        }
        Err(e) => {
            error!("Runtime failure: {:#}", e);
            eprintln!("{:#}", e);
            process::exit(1);
        }
    }
}

fn run(
    context: &RunContext,
    cli: &Cli,
) -> anyhow::Result<Result<String, tabmind::error::ApiError>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    Ok(runtime.block_on(context.execute(&cli.command)))
}

/// Build logging configuration from CLI args, environment, and config file.
/// Precedence: CLI flags override config file override defaults.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let loaded = match cli.config {
        Some(ref config_path) => ConfigLoader::load_from_file(config_path),
        None => ConfigLoader::load(),
    };
    let mut config = loaded.ok().map(|c| c.logging).unwrap_or_default();

    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.clone();
    }
    if let Some(ref file) = cli.log_file {
        config.file = file.clone();
    }

    config
}
