//! CLI input validation functions.
//!
//! These validators are used by clap's `value_parser` attribute to validate
//! user input at parse time, providing immediate feedback for invalid values.

use crate::types::DEFAULT_SCHEMA;

/// A `[schema.]table` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableArg {
    /// Schema, `dbo` when omitted.
    pub schema: String,
    /// Table name.
    pub table: String,
}

fn strip_delimiters(part: &str) -> &str {
    part.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_matches('"')
        .trim()
}

/// Validate a `[schema.]table` name.
///
/// Bracket and double-quote delimiters around either part are removed.
///
/// Examples: `T`, `dbo.T`, `[stg].[Orders]`
pub fn validate_table_name(s: &str) -> Result<TableArg, String> {
    let parts: Vec<&str> = s.split('.').map(strip_delimiters).collect();
    let (schema, table) = match parts.as_slice() {
        [table] => (DEFAULT_SCHEMA, *table),
        [schema, table] => (*schema, *table),
        _ => {
            return Err(format!(
                "Invalid table name: '{}'. Expected [schema.]table",
                s.trim()
            ));
        }
    };
    if table.is_empty() {
        return Err("Table name cannot be empty".to_string());
    }
    if schema.is_empty() {
        return Err("Schema name cannot be empty".to_string());
    }
    Ok(TableArg {
        schema: schema.to_string(),
        table: table.to_string(),
    })
}

/// Validate a database name list entry.
pub fn validate_database_name(s: &str) -> Result<String, String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err("Database name cannot be empty".to_string());
    }
    Ok(trimmed.to_string())
}
