//! CLI argument parsing and command dispatch.
//!
//! # Commands
//!
//! - `trace`: Trace lineage from a seed file and export the record sets
//! - `classify`: Classify how a definition uses a table
//! - `validate`: Check an exported links file for anomalies
//!
//! # Global Flags
//!
//! - `--json`: Output in JSON format (applies to all commands)
//!
//! # Example
//!
//! ```bash
//! lineage trace --seeds seeds.jsonl --out-dir out --fallback-db Stage,Mart
//! lineage classify --definition proc.sql --table dbo.Orders
//! lineage validate --links out/links.jsonl
//! ```

mod args;
mod execute;
mod validators;

use anyhow::Result;
use clap::{Parser, Subcommand};

pub use args::{ClassifyArgs, TraceArgs, ValidateArgs};
pub use validators::{TableArg, validate_database_name, validate_table_name};

/// Lineage - SQL Server dependency lineage tracer
///
/// Finds every view, procedure, function and trigger that depends on a set
/// of seed tables, expands their dependencies breadth-first, and exports
/// the result as JSON Lines.
#[derive(Parser, Debug)]
#[command(name = "lineage")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output in JSON format for programmatic use
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Trace lineage from seed tables
    ///
    /// Resolves each seed against its candidate databases, expands the
    /// dependency graph and writes links, edges, objects, failures, paths
    /// and migration order to the output directory.
    Trace(TraceArgs),

    /// Classify a definition's use of a table
    ///
    /// Prints Scrittura, Lettura or Sconosciuto.
    Classify(ClassifyArgs),

    /// Validate an exported links file
    ///
    /// Exits with an error when any anomaly is found.
    Validate(ValidateArgs),
}

impl Cli {
    /// Parse CLI arguments from command line
    #[must_use]
    pub fn parse_args() -> Self {
        <Self as Parser>::parse()
    }

    /// Parse CLI arguments from an iterator (for testing)
    ///
    /// # Errors
    ///
    /// Returns the clap error for invalid arguments.
    pub fn try_parse_from<I, T>(iter: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(iter)
    }

    /// Execute the CLI command
    ///
    /// # Errors
    ///
    /// Returns an error when the command fails.
    pub async fn execute(&self) -> Result<()> {
        use crate::output::OutputMode;

        let output_mode = if self.json {
            OutputMode::Json
        } else {
            OutputMode::Text
        };

        match &self.command {
            Some(Commands::Trace(args)) => execute::execute_trace(args, output_mode).await,
            Some(Commands::Classify(args)) => execute::execute_classify(args, output_mode).await,
            Some(Commands::Validate(args)) => execute::execute_validate(args, output_mode).await,
            None => {
                println!("Lineage dependency tracer");
                println!("Use --help for more information");
                Ok(())
            }
        }
    }
}
