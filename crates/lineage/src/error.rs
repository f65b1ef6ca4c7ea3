//! Error types for lineage operations.
//!
//! Two layers:
//!
//! - **`Error`**: operation errors returned through `Result` (a query that
//!   failed, a config file that did not parse).
//! - **`FailureRecord`**: seed-level or traversal-level problems collected
//!   during a run. A run never aborts on these; they are exported.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ObjectType;

/// Result type for lineage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for lineage operations.
#[derive(Debug, Error)]
pub enum Error {
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// JSONL file handling failed.
    #[error("JSONL error: {0}")]
    Jsonl(#[from] lineage_jsonl::Error),

    /// Invalid configuration, snapshot or arguments.
    #[error("configuration error: {0}")]
    Config(String),

    /// A connection could not be opened.
    #[error("cannot connect to {server}/{database}: {message}")]
    Connection {
        /// Target server.
        server: String,
        /// Target database.
        database: String,
        /// Driver message.
        message: String,
    },

    /// The login lacks rights on a catalog view or object.
    #[error("permission denied: {0}")]
    Permission(String),

    /// A catalog query failed.
    #[error("query failed: {0}")]
    Query(String),
}

impl Error {
    /// Builds a query error, recognizing authorization failures by message.
    ///
    /// SQL Server reports missing rights as errors 229, 230, 297 and 300,
    /// all of which mention "permission" or "denied".
    pub fn from_query_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("permission") || lower.contains("denied") {
            Self::Permission(message)
        } else {
            Self::Query(message)
        }
    }

    /// The failure category a run records for this error.
    #[must_use]
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Connection { .. } => FailureKind::Connectivity,
            Self::Permission(_) => FailureKind::Permission,
            Self::Config(_) => FailureKind::Input,
            Self::Io(_) | Self::Json(_) | Self::Jsonl(_) | Self::Query(_) => FailureKind::Query,
        }
    }
}

/// Categorization of run failures.
///
/// Input problems are fixable in the seed data; the rest come from the
/// database side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    // === Input Problems ===
    /// Seed row lacks a server or table.
    Input,
    /// Valid connection, but nothing references the seed.
    NoResults,

    // === Database Problems ===
    /// No candidate database could be reached.
    Connectivity,
    /// A catalog query was refused.
    Permission,
    /// A catalog query failed for another reason.
    Query,
}

impl FailureKind {
    /// Returns `true` for problems with the seed data itself.
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::Input | Self::NoResults)
    }

    /// Returns `true` for problems on the database side.
    #[must_use]
    pub fn is_database_error(&self) -> bool {
        matches!(self, Self::Connectivity | Self::Permission | Self::Query)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::NoResults => write!(f, "no results"),
            Self::Connectivity => write!(f, "connectivity"),
            Self::Permission => write!(f, "permission"),
            Self::Query => write!(f, "query"),
        }
    }
}

/// A seed or object that could not be traced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Server involved (may be empty for input defects).
    pub server: String,
    /// Database involved, if known.
    pub database: String,
    /// Schema involved.
    pub schema: String,
    /// Table or object involved.
    pub table: String,
    /// Type of the seed or object, when known.
    pub source_type: Option<ObjectType>,
    /// Category.
    pub kind: FailureKind,
    /// Human-readable reason.
    pub reason: String,
}

impl FailureRecord {
    /// Creates a failure record.
    pub fn new(
        server: impl Into<String>,
        database: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
        kind: FailureKind,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            database: database.into(),
            schema: schema.into(),
            table: table.into(),
            source_type: None,
            kind,
            reason: reason.into(),
        }
    }

    /// Attaches the detected type of the failing seed or object.
    #[must_use]
    pub fn with_source_type(mut self, source_type: Option<ObjectType>) -> Self {
        self.source_type = source_type;
        self
    }
}

impl std::fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}.{}: {} ({})",
            self.server, self.database, self.schema, self.table, self.reason, self.kind
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_kind_categorization() {
        assert!(FailureKind::Input.is_input_error());
        assert!(FailureKind::NoResults.is_input_error());
        assert!(!FailureKind::Input.is_database_error());

        assert!(FailureKind::Connectivity.is_database_error());
        assert!(FailureKind::Permission.is_database_error());
        assert!(FailureKind::Query.is_database_error());
        assert!(!FailureKind::Query.is_input_error());
    }

    #[test]
    fn permission_messages_are_recognized() {
        let err = Error::from_query_message(
            "The SELECT permission was denied on the object 'sql_expression_dependencies'",
        );
        assert!(matches!(err, Error::Permission(_)));
        assert_eq!(err.failure_kind(), FailureKind::Permission);

        let err = Error::from_query_message("Invalid object name 'dbo.Gone'");
        assert!(matches!(err, Error::Query(_)));
    }

    #[test]
    fn failure_record_display() {
        let record = FailureRecord::new("SrvA", "", "dbo", "T", FailureKind::NoResults, "no object found");
        assert_eq!(record.to_string(), "SrvA//dbo.T: no object found (no results)");
    }

    #[test]
    fn failure_kind_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&FailureKind::NoResults).unwrap(), "\"no_results\"");
    }
}
