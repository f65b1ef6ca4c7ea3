//! Core domain types for lineage traversal.
//!
//! Identity is case-insensitive: two references that differ only in case
//! name the same catalog object, so every lookup goes through [`ObjectKey`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Schema assumed when a reference or seed leaves it out.
pub const DEFAULT_SCHEMA: &str = "dbo";

/// The kind of a catalog object.
///
/// Serialized as its upper-case label (`"VIEW"`, `"PROCEDURE"`, ...).
/// Descriptors outside the known set are kept verbatim in [`ObjectType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ObjectType {
    /// A base table.
    Table,
    /// A view.
    View,
    /// A scalar, table-valued or CLR function.
    Function,
    /// A stored procedure.
    Procedure,
    /// A DML or DDL trigger.
    Trigger,
    /// A synonym.
    Synonym,
    /// Lives in another database whose catalog was not consulted.
    ExternalObject,
    /// Type could not be resolved.
    Unknown,
    /// Any other descriptor, kept as reported.
    Other(String),
}

impl ObjectType {
    /// Maps a catalog `type_desc` (or one of our own labels) to a type.
    ///
    /// # Examples
    ///
    /// ```
    /// use lineage::types::ObjectType;
    ///
    /// assert_eq!(ObjectType::from_type_desc("USER_TABLE"), ObjectType::Table);
    /// assert_eq!(ObjectType::from_type_desc("sql_stored_procedure"), ObjectType::Procedure);
    /// assert_eq!(ObjectType::from_type_desc("SEQUENCE_OBJECT"), ObjectType::Other("SEQUENCE_OBJECT".into()));
    /// ```
    #[must_use]
    pub fn from_type_desc(desc: &str) -> Self {
        let desc = desc.trim().to_ascii_uppercase();
        match desc.as_str() {
            "USER_TABLE" | "TABLE" | "SYSTEM_TABLE" | "INTERNAL_TABLE" => Self::Table,
            "VIEW" => Self::View,
            "SQL_STORED_PROCEDURE"
            | "CLR_STORED_PROCEDURE"
            | "EXTENDED_STORED_PROCEDURE"
            | "REPLICATION_FILTER_PROCEDURE"
            | "PROCEDURE" => Self::Procedure,
            "SQL_SCALAR_FUNCTION"
            | "SQL_TABLE_VALUED_FUNCTION"
            | "SQL_INLINE_TABLE_VALUED_FUNCTION"
            | "CLR_SCALAR_FUNCTION"
            | "CLR_TABLE_VALUED_FUNCTION"
            | "AGGREGATE_FUNCTION"
            | "FUNCTION" => Self::Function,
            "SQL_TRIGGER" | "CLR_TRIGGER" | "TRIGGER" => Self::Trigger,
            "SYNONYM" => Self::Synonym,
            "EXTERNAL_OBJECT" => Self::ExternalObject,
            "" | "UNKNOWN" => Self::Unknown,
            _ => Self::Other(desc),
        }
    }

    /// The upper-case label used in exports.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Table => "TABLE",
            Self::View => "VIEW",
            Self::Function => "FUNCTION",
            Self::Procedure => "PROCEDURE",
            Self::Trigger => "TRIGGER",
            Self::Synonym => "SYNONYM",
            Self::ExternalObject => "EXTERNAL_OBJECT",
            Self::Unknown => "UNKNOWN",
            Self::Other(label) => label,
        }
    }

    /// Returns `true` for base tables.
    #[must_use]
    pub fn is_table(&self) -> bool {
        matches!(self, Self::Table)
    }
}

impl From<String> for ObjectType {
    fn from(value: String) -> Self {
        Self::from_type_desc(&value)
    }
}

impl From<ObjectType> for String {
    fn from(value: ObjectType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a dependency lives relative to the object that references it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scope {
    /// Same server and database.
    SameDb,
    /// Same server, another database.
    CrossDb,
    /// Another server (linked server reference).
    CrossServer,
    /// Location could not be resolved.
    Unknown,
}

impl Scope {
    /// The upper-case label used in exports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SameDb => "SAME_DB",
            Self::CrossDb => "CROSS_DB",
            Self::CrossServer => "CROSS_SERVER",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A four-part name as reported by the catalog, original casing preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    /// Server (instance) name.
    pub server: String,
    /// Database name.
    pub database: String,
    /// Schema name.
    pub schema: String,
    /// Object name.
    pub object: String,
}

impl QualifiedName {
    /// Creates a qualified name.
    pub fn new(
        server: impl Into<String>,
        database: impl Into<String>,
        schema: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            database: database.into(),
            schema: schema.into(),
            object: object.into(),
        }
    }

    /// Case-insensitive identity of this name.
    #[must_use]
    pub fn key(&self) -> ObjectKey {
        ObjectKey {
            server: self.server.to_lowercase(),
            database: self.database.to_lowercase(),
            schema: self.schema.to_lowercase(),
            object: self.object.to_lowercase(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.server, self.database, self.schema, self.object
        )
    }
}

/// Lower-cased identity of a catalog object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    /// Lower-cased server.
    pub server: String,
    /// Lower-cased database.
    pub database: String,
    /// Lower-cased schema.
    pub schema: String,
    /// Lower-cased object name.
    pub object: String,
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.server, self.database, self.schema, self.object
        )
    }
}

/// One thing an object references: a table or another object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRef {
    /// Where the referenced entity lives.
    pub target: QualifiedName,
    /// Resolved type of the referenced entity.
    pub object_type: ObjectType,
    /// Location relative to the referencing object.
    pub scope: Scope,
}

/// A discovered catalog object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageObject {
    /// Where the object lives.
    pub name: QualifiedName,
    /// Catalog object id, when the object was read from its own database.
    pub object_id: Option<i64>,
    /// Object type.
    pub object_type: ObjectType,
    /// Definition text; absent for encrypted or unreadable objects.
    pub definition: Option<String>,
    /// Distance in dependency hops from the nearest seed (roots are 1).
    pub level: u32,
    /// Tables this object reads or writes.
    pub dep_tables: Vec<DependencyRef>,
    /// Non-table objects this object depends on.
    pub dep_objects: Vec<DependencyRef>,
    /// Whether `dep_tables`/`dep_objects` reflect a completed catalog query.
    #[serde(skip)]
    pub dependencies_fetched: bool,
}

impl LineageObject {
    /// Creates an object with no dependencies recorded yet.
    #[must_use]
    pub fn new(name: QualifiedName, object_type: ObjectType, level: u32) -> Self {
        Self {
            name,
            object_id: None,
            object_type,
            definition: None,
            level,
            dep_tables: Vec::new(),
            dep_objects: Vec::new(),
            dependencies_fetched: false,
        }
    }

    /// Case-insensitive identity of this object.
    #[must_use]
    pub fn key(&self) -> ObjectKey {
        self.name.key()
    }
}

/// Whether an edge points at a table or at another object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// Target is a table.
    Table,
    /// Target is a view, routine, trigger or unresolved object.
    Object,
}

/// A directed "depends on" edge from an owning object to a dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// The owning object.
    pub source: QualifiedName,
    /// Type of the owning object.
    pub source_type: ObjectType,
    /// The dependency.
    pub target: QualifiedName,
    /// Resolved type of the dependency.
    pub target_type: ObjectType,
    /// Location of the dependency relative to the owner.
    pub scope: Scope,
    /// Table or object dependency.
    pub kind: EdgeKind,
}

/// Identifying metadata of the seed row that led to a discovery.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RootContext {
    /// Originating file/report identifier.
    pub file_id: Option<String>,
    /// Originating file path.
    pub file_path: Option<String>,
    /// Seed server (after any override).
    pub server: String,
    /// Database the seed resolved in.
    pub database: String,
    /// Seed schema.
    pub schema: String,
    /// Seed table or object name.
    pub table: String,
    /// Type of the seed itself, when the catalog reported one.
    pub source_type: Option<ObjectType>,
}

/// Binds a seed's context to one object discovered for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootBinding {
    /// Seed context.
    pub context: RootContext,
    /// The discovered level-1 object.
    pub object: ObjectKey,
}
