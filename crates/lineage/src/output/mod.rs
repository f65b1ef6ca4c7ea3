//! Output formatting for CLI commands.
//!
//! Every command prints either human-readable text or JSON. Text writers take
//! any `Write` so tests can render into a buffer.

pub mod color;

use serde::Serialize;
use std::env;
use std::io::{self, Write};

use crate::motive::Motive;
use crate::report::ExportedFile;
use crate::summary::Summary;
use crate::validate::Anomaly;

pub use color::{error, info, success, warning};

use color::{bold, colorize_motive, dimmed};

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable text format
    Text,
    /// JSON format for programmatic use
    Json,
}

/// Settings that control text output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    /// Whether to use colors in output.
    pub use_colors: bool,
}

impl OutputConfig {
    /// Create an `OutputConfig` with explicit values.
    #[must_use]
    pub fn new(use_colors: bool) -> Self {
        Self { use_colors }
    }

    /// Create an `OutputConfig` from the environment.
    ///
    /// Colors are off when `NO_COLOR` is set (any value) or when
    /// `LINEAGE_COLOR` is `0` or `false`.
    #[must_use]
    pub fn from_env() -> Self {
        // https://no-color.org/
        let use_colors = env::var("NO_COLOR").is_err()
            && env::var("LINEAGE_COLOR")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true);
        Self { use_colors }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { use_colors: true }
    }
}

/// Print any serializable value as pretty JSON to stdout.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(handle, "{json}")
}

/// Render a run summary and the exported files.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_summary<W: Write>(
    w: &mut W,
    summary: &Summary,
    files: &[ExportedFile],
    seed_warnings: usize,
    config: &OutputConfig,
) -> io::Result<()> {
    writeln!(w, "{}", bold("Lineage summary", config))?;
    writeln!(w, "{}", dimmed("===============", config))?;
    writeln!(
        w,
        "{} {}",
        dimmed("Objects:      ", config),
        summary.total_objects
    )?;
    writeln!(w, "{} {}", dimmed("Max level:    ", config), summary.max_level)?;
    writeln!(w, "{} {}", dimmed("Edges:        ", config), summary.edges)?;
    writeln!(w, "{} {}", dimmed("Links:        ", config), summary.links)?;
    writeln!(
        w,
        "{} {:.1}%",
        dimmed("Coverage:     ", config),
        summary.coverage_percent
    )?;
    writeln!(
        w,
        "{} {} roots, {} leaves",
        dimmed("Shape:        ", config),
        summary.root_objects,
        summary.leaf_objects
    )?;

    let failures = summary.failures.to_string();
    let failures = if summary.failures == 0 {
        success(&failures, config)
    } else {
        warning(&failures, config)
    };
    writeln!(w, "{} {failures}", dimmed("Failures:     ", config))?;
    if seed_warnings > 0 {
        writeln!(
            w,
            "{} {}",
            dimmed("Seed warnings:", config),
            warning(&seed_warnings.to_string(), config)
        )?;
    }

    if !summary.by_type.is_empty() {
        writeln!(w)?;
        writeln!(w, "{}", bold("By type", config))?;
        for (object_type, count) in &summary.by_type {
            writeln!(w, "  {object_type:<16} {count}")?;
        }
    }
    if !summary.by_database.is_empty() {
        writeln!(w)?;
        writeln!(w, "{}", bold("By database", config))?;
        for (database, count) in &summary.by_database {
            writeln!(w, "  {} {count}", info(&format!("{database:<32}"), config))?;
        }
    }

    if !files.is_empty() {
        writeln!(w)?;
        writeln!(w, "{}", bold("Exports", config))?;
        for file in files {
            writeln!(
                w,
                "  {} ({} records)",
                info(&file.path.display().to_string(), config),
                file.records
            )?;
        }
    }
    Ok(())
}

/// Render validation anomalies, or a clean bill of health.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_anomalies<W: Write>(
    w: &mut W,
    records: usize,
    anomalies: &[Anomaly],
    config: &OutputConfig,
) -> io::Result<()> {
    if anomalies.is_empty() {
        return writeln!(
            w,
            "{} {records} links checked, no anomalies",
            success("OK", config)
        );
    }
    for anomaly in anomalies {
        writeln!(
            w,
            "{} {} {}",
            error(&format!("record {:>5}", anomaly.record), config),
            info(&anomaly.table, config),
            anomaly.message
        )?;
    }
    writeln!(w)?;
    writeln!(
        w,
        "{} anomalies in {records} links",
        error(&anomalies.len().to_string(), config)
    )
}

/// Render a motive classification.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_motive<W: Write>(
    w: &mut W,
    schema: &str,
    table: &str,
    motive: Motive,
    config: &OutputConfig,
) -> io::Result<()> {
    writeln!(
        w,
        "{}.{}: {}",
        schema,
        table,
        colorize_motive(motive, config)
    )
}
