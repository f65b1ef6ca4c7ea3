//! CLI argument structs for all commands.

use clap::Parser;
use std::path::PathBuf;

use super::validators::{TableArg, validate_database_name, validate_table_name};

/// Arguments for the `trace` command
#[derive(Parser, Debug, Clone)]
pub struct TraceArgs {
    /// Seed file (JSON Lines, one flat object per seed)
    #[arg(short, long)]
    pub seeds: PathBuf,

    /// Directory that receives the exported record sets
    #[arg(short, long, default_value = "lineage-out")]
    pub out_dir: PathBuf,

    /// YAML configuration file; flags below override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Trace every seed against this server instead of its own
    #[arg(long)]
    pub server: Option<String>,

    /// Fallback databases tried after each seed's own (comma-separated)
    #[arg(long = "fallback-db", value_delimiter = ',', value_parser = validate_database_name)]
    pub fallback_databases: Vec<String>,

    /// Also try every online database of each seed's server
    #[arg(long)]
    pub scan_all: bool,

    /// Maximum number of objects on an enumerated path
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_depth: Option<u64>,

    /// Connection timeout in seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Connection-string template with {server} and {database}; repeatable,
    /// tried in order
    #[arg(long = "connection-string")]
    pub connection_strings: Vec<String>,

    /// SQL login used for {user}; the password is read from
    /// LINEAGE_SQL_PASSWORD
    #[arg(long)]
    pub sql_user: Option<String>,

    /// Replay a catalog snapshot (JSON or YAML) instead of connecting
    #[arg(long)]
    pub snapshot: Option<PathBuf>,
}

/// Arguments for the `classify` command
#[derive(Parser, Debug, Clone)]
pub struct ClassifyArgs {
    /// File holding the object definition, or `-` for stdin
    #[arg(short, long)]
    pub definition: String,

    /// Target table as [schema.]table
    #[arg(short, long, value_parser = validate_table_name)]
    pub table: TableArg,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug, Clone)]
pub struct ValidateArgs {
    /// Exported links file to check
    #[arg(short, long)]
    pub links: PathBuf,
}
