//! Consistency checks over exported report links.
//!
//! Links are read back loosely (every field optional) so that files edited
//! by hand or produced by older runs can still be checked.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::error::Result;
use lineage_jsonl::{Warning, read_jsonl_resilient};

/// Motive labels a link may carry. Empty means not classified.
pub const VALID_MOTIVES: &[&str] = &["", "Lettura", "Scrittura", "Non rilevato", "Sconosciuto"];

/// Root metadata as read back from an export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RootRecord {
    /// Originating file path.
    pub file_path: Option<String>,
    /// Originating file identifier.
    pub file_id: Option<String>,
    /// Seed server.
    pub server: Option<String>,
    /// Seed database.
    pub database: Option<String>,
    /// Seed schema.
    pub schema: Option<String>,
    /// Seed table.
    pub table: Option<String>,
}

/// Discovered object identity as read back from an export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectRecord {
    /// Server.
    pub server: Option<String>,
    /// Database.
    pub database: Option<String>,
    /// Schema.
    pub schema: Option<String>,
    /// Object name.
    pub object: Option<String>,
}

/// A report link with every field optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkRecord {
    /// Seed context.
    pub root: RootRecord,
    /// Discovered object.
    pub object: Option<ObjectRecord>,
    /// Motive label.
    pub motive: Option<String>,
    /// Table dependencies.
    pub dependency_tables: Vec<String>,
    /// Declared table dependency count.
    pub dependency_table_count: Option<usize>,
    /// Object dependencies.
    pub dependency_objects: Vec<String>,
    /// Declared object dependency count.
    pub dependency_object_count: Option<usize>,
}

/// What kind of problem an anomaly is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Mandatory root metadata is blank.
    MissingMetadata,
    /// A seed row carries no discovered object.
    MissingObject,
    /// A dependency list disagrees with its count.
    CountMismatch,
    /// The motive label is not a known one.
    InvalidMotive,
    /// Another record has the same root and object.
    Duplicate,
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MissingMetadata => "missing metadata",
            Self::MissingObject => "missing object",
            Self::CountMismatch => "count mismatch",
            Self::InvalidMotive => "invalid motive",
            Self::Duplicate => "duplicate",
        })
    }
}

/// One problem found in a link file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Anomaly {
    /// 1-based record number.
    pub record: usize,
    /// `schema.table` of the seed.
    pub table: String,
    /// Category.
    pub kind: AnomalyKind,
    /// Description.
    pub message: String,
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record {} ({}): {}", self.record, self.table, self.message)
    }
}

fn filled(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

impl RootRecord {
    fn table_label(&self) -> String {
        format!(
            "{}.{}",
            filled(self.schema.as_ref()).unwrap_or_default(),
            filled(self.table.as_ref()).unwrap_or_default()
        )
    }

    fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("file_path", &self.file_path),
            ("file_id", &self.file_id),
            ("server", &self.server),
            ("database", &self.database),
            ("schema", &self.schema),
            ("table", &self.table),
        ]
        .into_iter()
        .filter(|&(_, value)| filled(value.as_ref()).is_none())
        .map(|(name, _)| name)
        .collect()
    }
}

/// Report file, seed and discovered object of a link, lower-cased.
type DuplicateKey = [String; 7];

impl LinkRecord {
    /// Links are unique per report file and seed; two reports naming the
    /// same table legitimately share an object.
    fn duplicate_key(&self) -> Option<DuplicateKey> {
        let object = self.object.as_ref()?;
        let name = [
            filled(object.server.as_ref()),
            filled(object.database.as_ref()),
            filled(object.schema.as_ref()),
            filled(object.object.as_ref()),
        ]
        .map(|part| part.unwrap_or_default())
        .join(".");
        Some([
            filled(self.root.file_id.as_ref()).unwrap_or_default().to_lowercase(),
            filled(self.root.file_path.as_ref()).unwrap_or_default().to_lowercase(),
            filled(self.root.server.as_ref()).unwrap_or_default().to_lowercase(),
            filled(self.root.database.as_ref()).unwrap_or_default().to_lowercase(),
            filled(self.root.schema.as_ref()).unwrap_or_default().to_lowercase(),
            filled(self.root.table.as_ref()).unwrap_or_default().to_lowercase(),
            name.to_lowercase(),
        ])
    }
}

/// Checks every link and returns the anomalies in record order.
#[must_use]
pub fn validate_links(links: &[LinkRecord]) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();
    let mut groups: HashMap<DuplicateKey, Vec<usize>> = HashMap::new();

    for (index, link) in links.iter().enumerate() {
        let record = index + 1;
        let table = link.root.table_label();
        let mut push = |kind: AnomalyKind, message: String| {
            anomalies.push(Anomaly {
                record,
                table: table.clone(),
                kind,
                message,
            });
        };

        let missing = link.root.missing_fields();
        if !missing.is_empty() {
            push(
                AnomalyKind::MissingMetadata,
                format!("missing root metadata: {}", missing.join(", ")),
            );
        }

        let has_object = link
            .object
            .as_ref()
            .is_some_and(|o| filled(o.object.as_ref()).is_some());
        if filled(link.root.table.as_ref()).is_some() && !has_object {
            push(
                AnomalyKind::MissingObject,
                "table has no discovered object".to_string(),
            );
        }

        for (list, count, label) in [
            (&link.dependency_tables, link.dependency_table_count, "dependency_tables"),
            (&link.dependency_objects, link.dependency_object_count, "dependency_objects"),
        ] {
            let entries = list.iter().filter(|e| !e.trim().is_empty()).count();
            let declared = count.unwrap_or(0);
            if entries != declared {
                push(
                    AnomalyKind::CountMismatch,
                    format!("{label} has {entries} entries but its count is {declared}"),
                );
            }
        }

        if let Some(motive) = link.motive.as_deref().map(str::trim)
            && !VALID_MOTIVES.contains(&motive)
        {
            push(AnomalyKind::InvalidMotive, format!("invalid motive: {motive}"));
        }

        if let Some(key) = link.duplicate_key() {
            groups.entry(key).or_default().push(record);
        }
    }

    for records in groups.values().filter(|records| records.len() > 1) {
        for &record in records {
            anomalies.push(Anomaly {
                record,
                table: links[record - 1].root.table_label(),
                kind: AnomalyKind::Duplicate,
                message: "duplicate link for file/database/schema/table/object".to_string(),
            });
        }
    }

    anomalies.sort_by_key(|a| (a.record, a.kind));
    anomalies
}

/// Reads a link export for validation.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub async fn load_links(path: &Path) -> Result<(Vec<LinkRecord>, Vec<Warning>)> {
    Ok(read_jsonl_resilient(path).await?)
}
