//! Read/write classification of an object's relationship to a table.
//!
//! The definition text is reduced to a canonical form first: comments
//! removed, lower-cased, identifier delimiters (`[]`, `"`, backticks)
//! stripped and whitespace collapsed, including around the dots of
//! qualified names. The targets of write statements are then compared with
//! the two name forms `schema.table` and `table`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use crate::types::DEFAULT_SCHEMA;

static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("Invalid block comment regex"));

static LINE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"--[^\n]*").expect("Invalid line comment regex"));

static DELIMITERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\[\]"`]"#).expect("Invalid delimiter regex"));

static DOTTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\.\s*").expect("Invalid dotted name regex"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

/// Target of an `INSERT`, `UPDATE`, `DELETE` or `MERGE` in canonical text.
static WRITE_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:insert(?:\s+into)?|update|delete(?:\s+from)?|merge(?:\s+into)?)\s+([\w$#@.]+)")
        .expect("Invalid write target regex")
});

/// Target of a `SELECT ... INTO` within one statement.
static SELECT_INTO_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bselect\b[^;]*?\binto\s+([\w$#@.]+)").expect("Invalid select into regex")
});

/// How an object uses a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Motive {
    /// The object inserts, updates, deletes or merges into the table.
    #[serde(rename = "Scrittura")]
    Write,
    /// The definition does not write to the table.
    #[serde(rename = "Lettura")]
    Read,
    /// No definition text to inspect.
    #[serde(rename = "Sconosciuto")]
    Unknown,
}

impl Motive {
    /// The label used in reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Write => "Scrittura",
            Self::Read => "Lettura",
            Self::Unknown => "Sconosciuto",
        }
    }
}

impl fmt::Display for Motive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reduces a definition to the canonical form matching runs against.
#[must_use]
pub fn normalize_sql(text: &str) -> String {
    let text = BLOCK_COMMENT.replace_all(text, " ");
    let text = LINE_COMMENT.replace_all(&text, " ");
    let text = text.to_lowercase();
    let text = DELIMITERS.replace_all(&text, "");
    let text = DOTTED.replace_all(&text, ".");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

fn normalize_name(name: &str) -> String {
    DELIMITERS.replace_all(name, "").trim().to_lowercase()
}

/// Classifies how `definition` uses `schema.table`.
///
/// `schema` defaults to `dbo` when blank. Matching ignores case, comments
/// and identifier delimiters. A write target may carry a database prefix.
/// Any definition without a write to the table is a read.
///
/// # Examples
///
/// ```
/// use lineage::motive::{Motive, classify};
///
/// assert_eq!(classify(Some("INSERT INTO dbo.T (a) VALUES (1)"), "dbo", "T"), Motive::Write);
/// assert_eq!(classify(Some("SELECT * FROM [dbo].[T]"), "dbo", "T"), Motive::Read);
/// assert_eq!(classify(None, "dbo", "T"), Motive::Unknown);
/// ```
#[must_use]
pub fn classify(definition: Option<&str>, schema: &str, table: &str) -> Motive {
    let Some(definition) = definition.filter(|d| !d.trim().is_empty()) else {
        return Motive::Unknown;
    };
    let table = normalize_name(table);
    if table.is_empty() {
        return Motive::Read;
    }
    let schema = match normalize_name(schema) {
        s if s.is_empty() => DEFAULT_SCHEMA.to_string(),
        s => s,
    };
    let qualified = format!("{schema}.{table}");
    let prefixed = format!(".{qualified}");
    let is_target = |name: &str| name == table || name == qualified || name.ends_with(&prefixed);

    let body = normalize_sql(definition);
    let writes = WRITE_TARGET
        .captures_iter(&body)
        .chain(SELECT_INTO_TARGET.captures_iter(&body))
        .filter_map(|captures| captures.get(1))
        .any(|target| is_target(target.as_str()));

    if writes { Motive::Write } else { Motive::Read }
}
