//! CLI parse: clap types for tabmind. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Tabmind - on-device page assistant coordination
#[derive(Parser)]
#[command(name = "tabmind")]
#[command(about = "Coordinate page extraction, suggestions and streaming generation with a local model")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (layered over the user config file)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stderr, stdout, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Report model availability as JSON
    Check,
    /// Run one generation, streaming deltas to stdout
    Prompt {
        /// Prompt text
        prompt: String,
        /// Page text to answer from
        #[arg(long)]
        context: Option<String>,
        /// Session id (generated when omitted)
        #[arg(long)]
        session_id: Option<String>,
    },
    /// Fetch a page and suggest three questions about it
    Suggest {
        /// Page URL
        #[arg(long)]
        url: String,
        /// Page title (defaults to the document title)
        #[arg(long)]
        title: Option<String>,
    },
    /// Serve JSON-lines requests on stdin, answering on stdout
    Serve,
}
