//! Command-line interface parsing for mediafeed
//!
//! This module handles parsing of CLI arguments using clap, including the
//! output format selection.

use clap::Parser;
use thiserror::Error;

use crate::engine::DEFAULT_MAX_RESULTS;

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The specified output format is not recognized
    #[error("Invalid format: '{0}'. Valid formats: text, json")]
    InvalidFormat(String),
}

/// mediafeed - Fetch recent media posts for a user, with caching and provider fallback
#[derive(Parser, Debug)]
#[command(name = "mediafeed")]
#[command(about = "Fetch recent media posts for a user from the primary or fallback provider")]
#[command(version)]
pub struct Cli {
    /// Username to fetch, with or without a leading @
    #[arg(value_name = "USERNAME")]
    pub username: String,

    /// Number of posts to request (providers clamp this to 5..=100)
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_RESULTS,
          value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub max_results: u32,

    /// Output format
    ///
    /// Valid formats: text, json
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    pub format: String,

    /// Skip handing fetched posts to the backup archiver
    #[arg(long)]
    pub no_backup: bool,
}

/// How results are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Parses a format string argument into an OutputFormat.
pub fn parse_format_arg(s: &str) -> Result<OutputFormat, CliError> {
    match s.trim().to_lowercase().as_str() {
        "text" | "txt" => Ok(OutputFormat::Text),
        "json" => Ok(OutputFormat::Json),
        _ => Err(CliError::InvalidFormat(s.to_string())),
    }
}

impl Cli {
    pub fn output_format(&self) -> Result<OutputFormat, CliError> {
        parse_format_arg(&self.format)
    }
}
