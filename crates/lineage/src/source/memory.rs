//! In-memory catalog source.
//!
//! A [`MemoryCatalog`] is a snapshot of a few servers' catalogs: databases,
//! their non-system objects, definitions and the references each object's
//! expression makes. [`MemoryConnector`] serves it through the same
//! [`Connector`] seam the live backend uses, so the whole traversal runs
//! against it unchanged. Snapshots load from JSON or YAML for offline replay.
//!
//! Databases can be marked unreachable, offline or query-denied, and single
//! objects can be hidden from the expression-dependency view, which makes the
//! fallback paths of the traversal testable without a server.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{CatalogConnection, CatalogObject, Connector, ReferencedEntity};
use crate::error::{Error, Result};
use crate::types::DEFAULT_SCHEMA;

const MASTER: &str = "master";
const DEFAULT_CLASS: &str = "OBJECT_OR_COLUMN";

/// Object types the referencing-objects query returns.
const REFERENCING_TYPES: &[&str] = &[
    "VIEW",
    "SQL_STORED_PROCEDURE",
    "SQL_SCALAR_FUNCTION",
    "SQL_TABLE_VALUED_FUNCTION",
    "SQL_INLINE_TABLE_VALUED_FUNCTION",
    "SQL_TRIGGER",
];

/// Availability of a snapshot database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DatabaseState {
    /// Connects and answers queries.
    #[default]
    Online,
    /// Listed nowhere; connecting fails.
    Offline,
    /// Connecting fails as if the host could not be reached.
    Unreachable,
    /// Connects, but every catalog query is refused.
    Denied,
}

/// A reference made by an object's expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryReference {
    /// Linked server, for four-part references.
    #[serde(default)]
    pub server: Option<String>,
    /// Database, for three- or four-part references.
    #[serde(default)]
    pub database: Option<String>,
    /// Schema, when spelled out.
    #[serde(default)]
    pub schema: Option<String>,
    /// Referenced name.
    pub name: String,
    /// Class descriptor, `OBJECT_OR_COLUMN` when absent.
    #[serde(default)]
    pub class_desc: Option<String>,
}

/// A non-system object of a snapshot database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryObject {
    /// Schema name.
    #[serde(default = "default_schema")]
    pub schema: String,
    /// Object name.
    pub name: String,
    /// Catalog `type_desc` (`USER_TABLE`, `VIEW`, `SQL_STORED_PROCEDURE`, ...).
    #[serde(rename = "type")]
    pub type_desc: String,
    /// Definition text.
    #[serde(default)]
    pub definition: Option<String>,
    /// References made by the definition.
    #[serde(default)]
    pub references: Vec<MemoryReference>,
    /// Leave this object out of the expression-dependency view.
    #[serde(default)]
    pub hidden_from_expression_view: bool,
}

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

impl MemoryObject {
    /// Creates an object with no definition and no references.
    pub fn new(schema: impl Into<String>, name: impl Into<String>, type_desc: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            type_desc: type_desc.into(),
            definition: None,
            references: Vec::new(),
            hidden_from_expression_view: false,
        }
    }

    /// A user table.
    pub fn table(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(schema, name, "USER_TABLE")
    }

    /// A view.
    pub fn view(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(schema, name, "VIEW")
    }

    /// A T-SQL stored procedure.
    pub fn procedure(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(schema, name, "SQL_STORED_PROCEDURE")
    }

    /// A T-SQL scalar function.
    pub fn function(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(schema, name, "SQL_SCALAR_FUNCTION")
    }

    /// A T-SQL trigger.
    pub fn trigger(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(schema, name, "SQL_TRIGGER")
    }

    /// Sets the definition text.
    #[must_use]
    pub fn with_definition(mut self, definition: impl Into<String>) -> Self {
        self.definition = Some(definition.into());
        self
    }

    /// Adds a two-part reference into the same database.
    #[must_use]
    pub fn references(mut self, schema: impl Into<String>, name: impl Into<String>) -> Self {
        self.references.push(MemoryReference {
            server: None,
            database: None,
            schema: Some(schema.into()),
            name: name.into(),
            class_desc: None,
        });
        self
    }

    /// Adds a reference without schema, bound at execution time.
    #[must_use]
    pub fn references_unqualified(mut self, name: impl Into<String>) -> Self {
        self.references.push(MemoryReference {
            server: None,
            database: None,
            schema: None,
            name: name.into(),
            class_desc: None,
        });
        self
    }

    /// Adds a three- or four-part reference into another database.
    #[must_use]
    pub fn references_external(
        mut self,
        server: Option<&str>,
        database: impl Into<String>,
        schema: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        self.references.push(MemoryReference {
            server: server.map(str::to_string),
            database: Some(database.into()),
            schema: Some(schema.into()),
            name: name.into(),
            class_desc: None,
        });
        self
    }

    /// Adds an arbitrary reference.
    #[must_use]
    pub fn with_reference(mut self, reference: MemoryReference) -> Self {
        self.references.push(reference);
        self
    }

    /// Hides the object from the expression-dependency view.
    #[must_use]
    pub fn hidden_from_expression_view(mut self) -> Self {
        self.hidden_from_expression_view = true;
        self
    }

    fn is_named(&self, schema: &str, name: &str) -> bool {
        self.schema.eq_ignore_ascii_case(schema) && self.name.eq_ignore_ascii_case(name)
    }
}

/// One database of one server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryDatabase {
    /// Server name.
    pub server: String,
    /// Database name.
    pub name: String,
    /// Availability.
    #[serde(default)]
    pub state: DatabaseState,
    /// Closing a connection to this database fails.
    #[serde(default)]
    pub close_fails: bool,
    /// Non-system objects.
    #[serde(default)]
    pub objects: Vec<MemoryObject>,
}

impl MemoryDatabase {
    fn is(&self, server: &str, database: &str) -> bool {
        self.server.eq_ignore_ascii_case(server) && self.name.eq_ignore_ascii_case(database)
    }

    fn object_id(&self, schema: &str, name: &str) -> Option<i64> {
        self.objects
            .iter()
            .position(|o| o.is_named(schema, name))
            .and_then(|index| i64::try_from(index + 1).ok())
    }

    fn object_by_id(&self, object_id: i64) -> Option<&MemoryObject> {
        let index = usize::try_from(object_id).ok()?.checked_sub(1)?;
        self.objects.get(index)
    }

    fn catalog_row(&self, object_id: i64, object: &MemoryObject) -> CatalogObject {
        CatalogObject {
            object_id,
            schema: object.schema.clone(),
            name: object.name.clone(),
            type_desc: object.type_desc.clone(),
            definition: object.definition.clone(),
        }
    }

    /// Whether `reference` points into this database.
    fn is_local(&self, reference: &MemoryReference) -> bool {
        let server_ok = reference
            .server
            .as_deref()
            .is_none_or(|s| s.eq_ignore_ascii_case(&self.server));
        let database_ok = reference
            .database
            .as_deref()
            .is_none_or(|d| d.eq_ignore_ascii_case(&self.name));
        server_ok && database_ok
    }

    /// Unqualified references bind at execution time (caller-dependent),
    /// so like the real catalog they come back without a resolved type.
    fn resolve(&self, reference: &MemoryReference) -> ReferencedEntity {
        let type_desc = match reference.schema.as_deref() {
            Some(schema) if self.is_local(reference) => self
                .objects
                .iter()
                .find(|o| o.is_named(schema, &reference.name))
                .map(|o| o.type_desc.clone()),
            _ => None,
        };
        ReferencedEntity {
            server: reference.server.clone(),
            database: reference.database.clone(),
            schema: reference.schema.clone(),
            name: reference.name.clone(),
            type_desc,
            class_desc: Some(
                reference
                    .class_desc
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CLASS.to_string()),
            ),
        }
    }
}

/// A snapshot of one or more servers' catalogs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryCatalog {
    /// Every database of every server.
    #[serde(default)]
    pub databases: Vec<MemoryDatabase>,
}

impl MemoryCatalog {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a snapshot from a `.json`, `.yaml` or `.yml` file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Config(format!("Failed to read snapshot {}: {e}", path.display()))
        })?;
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
        if is_yaml {
            serde_yaml::from_str(&content)
                .map_err(|e| Error::Config(format!("Failed to parse snapshot: {e}")))
        } else {
            serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("Failed to parse snapshot: {e}")))
        }
    }

    /// Returns the database, creating it empty and online if needed.
    pub fn database_mut(&mut self, server: &str, database: &str) -> &mut MemoryDatabase {
        let index = match self.databases.iter().position(|d| d.is(server, database)) {
            Some(index) => index,
            None => {
                self.databases.push(MemoryDatabase {
                    server: server.to_string(),
                    name: database.to_string(),
                    state: DatabaseState::Online,
                    close_fails: false,
                    objects: Vec::new(),
                });
                self.databases.len() - 1
            }
        };
        &mut self.databases[index]
    }

    /// Adds an object to a database, creating the database if needed.
    pub fn add_object(&mut self, server: &str, database: &str, object: MemoryObject) -> &mut Self {
        self.database_mut(server, database).objects.push(object);
        self
    }

    /// Sets a database's availability.
    pub fn set_state(&mut self, server: &str, database: &str, state: DatabaseState) -> &mut Self {
        self.database_mut(server, database).state = state;
        self
    }

    fn find(&self, server: &str, database: &str) -> Option<&MemoryDatabase> {
        self.databases.iter().find(|d| d.is(server, database))
    }

    fn server_reachable(&self, server: &str) -> bool {
        self.databases
            .iter()
            .any(|d| d.server.eq_ignore_ascii_case(server) && d.state != DatabaseState::Unreachable)
    }
}

/// Counts of connections opened and closed by a [`MemoryConnector`].
#[derive(Debug, Default)]
pub struct ConnectionStats {
    opened: AtomicUsize,
    closed: AtomicUsize,
    attempts: AtomicUsize,
}

impl ConnectionStats {
    /// Connections successfully opened.
    #[must_use]
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::Relaxed)
    }

    /// Connections closed (successfully or not).
    #[must_use]
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::Relaxed)
    }

    /// Connection attempts, failed ones included.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }
}

/// Serves a [`MemoryCatalog`] through the [`Connector`] seam.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    catalog: Arc<MemoryCatalog>,
    stats: Arc<ConnectionStats>,
}

impl MemoryConnector {
    /// Creates a connector over a snapshot.
    #[must_use]
    pub fn new(catalog: MemoryCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
            stats: Arc::new(ConnectionStats::default()),
        }
    }

    /// Shared connection counters.
    #[must_use]
    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, server: &str, database: &str) -> Result<Box<dyn CatalogConnection>> {
        self.stats.attempts.fetch_add(1, Ordering::Relaxed);
        let refuse = |message: &str| Error::Connection {
            server: server.to_string(),
            database: database.to_string(),
            message: message.to_string(),
        };

        if !self.catalog.server_reachable(server) {
            return Err(refuse("server was not found or was not accessible"));
        }

        let index = if database.eq_ignore_ascii_case(MASTER) {
            None
        } else {
            let index = self
                .catalog
                .databases
                .iter()
                .position(|d| d.is(server, database))
                .ok_or_else(|| refuse("cannot open database requested by the login"))?;
            match self.catalog.databases[index].state {
                DatabaseState::Unreachable => return Err(refuse("login timeout expired")),
                DatabaseState::Offline => return Err(refuse("database is offline")),
                DatabaseState::Online | DatabaseState::Denied => Some(index),
            }
        };

        self.stats.opened.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MemoryConnection {
            catalog: Arc::clone(&self.catalog),
            stats: Arc::clone(&self.stats),
            server: server.to_string(),
            database: index,
        }))
    }
}

struct MemoryConnection {
    catalog: Arc<MemoryCatalog>,
    stats: Arc<ConnectionStats>,
    server: String,
    /// Index into the snapshot's databases; `None` for `master`.
    database: Option<usize>,
}

impl MemoryConnection {
    fn db(&self) -> Result<Option<&MemoryDatabase>> {
        let Some(index) = self.database else {
            return Ok(None);
        };
        let db = &self.catalog.databases[index];
        if db.state == DatabaseState::Denied {
            return Err(Error::Permission(format!(
                "The SELECT permission was denied on database '{}'",
                db.name
            )));
        }
        Ok(Some(db))
    }
}

#[async_trait]
impl CatalogConnection for MemoryConnection {
    async fn object_type(&mut self, schema: &str, name: &str) -> Result<Option<String>> {
        Ok(self.db()?.and_then(|db| {
            db.objects
                .iter()
                .find(|o| o.is_named(schema, name))
                .map(|o| o.type_desc.clone())
        }))
    }

    async fn find_object(&mut self, schema: &str, name: &str) -> Result<Option<CatalogObject>> {
        Ok(self.db()?.and_then(|db| {
            let object_id = db.object_id(schema, name)?;
            db.object_by_id(object_id)
                .map(|object| db.catalog_row(object_id, object))
        }))
    }

    async fn referencing_objects(
        &mut self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<CatalogObject>> {
        let Some(db) = self.db()? else {
            return Ok(Vec::new());
        };
        let mut rows: Vec<CatalogObject> = db
            .objects
            .iter()
            .zip(1_i64..)
            .filter(|(object, _)| {
                !object.hidden_from_expression_view
                    && REFERENCING_TYPES
                        .iter()
                        .any(|t| t.eq_ignore_ascii_case(&object.type_desc))
                    && object.references.iter().any(|r| {
                        db.is_local(r)
                            && r.schema
                                .as_deref()
                                .unwrap_or(DEFAULT_SCHEMA)
                                .eq_ignore_ascii_case(schema)
                            && r.name.eq_ignore_ascii_case(table)
                    })
            })
            .map(|(object, object_id)| db.catalog_row(object_id, object))
            .collect();
        rows.sort_by(|a, b| (&a.schema, &a.name).cmp(&(&b.schema, &b.name)));
        Ok(rows)
    }

    async fn expression_dependencies(&mut self, object_id: i64) -> Result<Vec<ReferencedEntity>> {
        let Some(db) = self.db()? else {
            return Ok(Vec::new());
        };
        Ok(db
            .object_by_id(object_id)
            .filter(|object| !object.hidden_from_expression_view)
            .map(|object| object.references.iter().map(|r| db.resolve(r)).collect())
            .unwrap_or_default())
    }

    async fn referenced_entities(&mut self, object_id: i64) -> Result<Vec<ReferencedEntity>> {
        let Some(db) = self.db()? else {
            return Ok(Vec::new());
        };
        Ok(db
            .object_by_id(object_id)
            .map(|object| object.references.iter().map(|r| db.resolve(r)).collect())
            .unwrap_or_default())
    }

    async fn online_databases(&mut self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .catalog
            .databases
            .iter()
            .filter(|d| {
                d.server.eq_ignore_ascii_case(&self.server)
                    && matches!(d.state, DatabaseState::Online | DatabaseState::Denied)
            })
            .map(|d| d.name.clone())
            .collect();
        names.sort_by_key(|name| name.to_lowercase());
        Ok(names)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.stats.closed.fetch_add(1, Ordering::Relaxed);
        match self.database.map(|index| &self.catalog.databases[index]) {
            Some(db) if db.close_fails => Err(Error::Query(format!(
                "connection to {}/{} was already broken",
                db.server, db.name
            ))),
            _ => Ok(()),
        }
    }
}
