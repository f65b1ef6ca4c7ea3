//! Seed records and the column adapter that reads them.
//!
//! Seed exports come from spreadsheets with inconsistent headers
//! (`Server`, `server_name`, `Path_File`, ...). The adapter resolves each
//! field to a column once, from the set of headers present, and every row is
//! read through that resolution.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::Result;
use lineage_jsonl::{Warning, read_jsonl_resilient};

/// Values that spreadsheet exports use for an empty cell.
const EMPTY_MARKERS: &[&str] = &["nan", "nat", "none", "null"];

/// One seed: a table (or object) to trace lineage from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedRecord {
    /// Originating file/report identifier.
    pub file_id: Option<String>,
    /// Originating file path.
    pub file_path: Option<String>,
    /// Server name.
    pub server: Option<String>,
    /// Database hint.
    pub database: Option<String>,
    /// Schema; `dbo` when absent.
    pub schema: Option<String>,
    /// Table or object name.
    pub table: Option<String>,
}

/// Seed fields and the header spellings accepted for each, most specific first.
const FIELD_ALIASES: [(SeedField, &[&str]); 6] = [
    (SeedField::FileId, &["filename", "fileid", "file", "report"]),
    (SeedField::FilePath, &["pathfile", "filepath", "path"]),
    (SeedField::Server, &["server", "servername"]),
    (SeedField::Database, &["database", "databasename", "db"]),
    (SeedField::Schema, &["schema", "schemaname"]),
    (SeedField::Table, &["table", "tablename", "objectname"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeedField {
    FileId,
    FilePath,
    Server,
    Database,
    Schema,
    Table,
}

/// Header form used for matching: lower-case, no whitespace, `_` or `-`.
fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Cell text, or `None` for blanks and empty markers.
#[must_use]
pub fn normalize_value(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    if text.is_empty() || EMPTY_MARKERS.iter().any(|m| text.eq_ignore_ascii_case(m)) {
        None
    } else {
        Some(text)
    }
}

/// Column resolution for a set of seed headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedAdapter {
    file_id: Option<String>,
    file_path: Option<String>,
    server: Option<String>,
    database: Option<String>,
    schema: Option<String>,
    table: Option<String>,
}

impl SeedAdapter {
    /// Resolves every seed field against the given headers.
    ///
    /// Matching ignores case, whitespace, `_` and `-`. When two headers
    /// normalize the same, the first one wins.
    pub fn from_headers<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let headers: Vec<(&str, String)> = headers
            .into_iter()
            .map(|h| (h, normalize_header(h)))
            .collect();
        let mut adapter = Self::default();

        for (field, aliases) in FIELD_ALIASES {
            let column = aliases.iter().find_map(|alias| {
                headers
                    .iter()
                    .find(|(_, normalized)| normalized == alias)
                    .map(|(original, _)| (*original).to_string())
            });
            let slot = match field {
                SeedField::FileId => &mut adapter.file_id,
                SeedField::FilePath => &mut adapter.file_path,
                SeedField::Server => &mut adapter.server,
                SeedField::Database => &mut adapter.database,
                SeedField::Schema => &mut adapter.schema,
                SeedField::Table => &mut adapter.table,
            };
            *slot = column;
        }
        adapter
    }

    /// Whether the mandatory server and table columns were found.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.server.is_some() && self.table.is_some()
    }

    /// Reads one row through the resolved columns.
    #[must_use]
    pub fn adapt(&self, row: &Map<String, Value>) -> SeedRecord {
        let cell = |column: &Option<String>| {
            column
                .as_deref()
                .and_then(|c| row.get(c))
                .and_then(normalize_value)
        };
        SeedRecord {
            file_id: cell(&self.file_id),
            file_path: cell(&self.file_path),
            server: cell(&self.server),
            database: cell(&self.database),
            schema: cell(&self.schema),
            table: cell(&self.table),
        }
    }
}

/// Loads seed records from a JSONL file of flat objects.
///
/// Lines that are not JSON objects are skipped with a warning.
///
/// # Errors
///
/// Returns an error when the file cannot be read.
pub async fn load_seeds(path: &Path) -> Result<(Vec<SeedRecord>, Vec<Warning>)> {
    let (rows, warnings): (Vec<Map<String, Value>>, _) = read_jsonl_resilient(path).await?;

    let mut headers: Vec<&str> = Vec::new();
    for row in &rows {
        for key in row.keys() {
            if !headers.contains(&key.as_str()) {
                headers.push(key);
            }
        }
    }
    let adapter = SeedAdapter::from_headers(headers);
    if !adapter.is_complete() {
        tracing::warn!(path = %path.display(), "seed file has no server or table column");
    }

    let seeds = rows.iter().map(|row| adapter.adapt(row)).collect();
    Ok((seeds, warnings))
}
