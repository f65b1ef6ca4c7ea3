//! Catalog source abstraction.
//!
//! The traversal never talks to a driver directly. It asks a [`Connector`]
//! for a [`CatalogConnection`] to one (server, database) pair and issues the
//! handful of catalog queries the lineage walk needs through it.
//!
//! Two backends exist:
//!
//! - [`mssql::MssqlConnector`]: live SQL Server catalogs over TDS
//! - [`memory::MemoryConnector`]: an in-memory snapshot, for tests and offline replay

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod memory;
pub mod mssql;

pub use memory::{MemoryCatalog, MemoryConnector, MemoryObject};
pub use mssql::MssqlConnector;

/// A non-system object row as read from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogObject {
    /// Catalog object id, unique within its database.
    pub object_id: i64,
    /// Schema name.
    pub schema: String,
    /// Object name.
    pub name: String,
    /// Raw catalog `type_desc`.
    pub type_desc: String,
    /// Definition text, absent for encrypted objects and tables.
    pub definition: Option<String>,
}

/// One entity referenced by an object's expression.
///
/// Absent parts mean the reference did not spell them out.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReferencedEntity {
    /// Linked server named by a four-part reference.
    pub server: Option<String>,
    /// Database named by a three- or four-part reference.
    pub database: Option<String>,
    /// Referenced schema.
    pub schema: Option<String>,
    /// Referenced entity name.
    pub name: String,
    /// `type_desc` of the entity when it resolved in the local catalog.
    pub type_desc: Option<String>,
    /// Class descriptor of the reference (`OBJECT_OR_COLUMN`, `TYPE`, ...).
    pub class_desc: Option<String>,
}

/// An open connection to one database of one server.
///
/// Every method maps to a single catalog query. Implementations return
/// errors rather than panicking; callers decide how failures degrade.
#[async_trait]
pub trait CatalogConnection: Send {
    /// Raw `type_desc` of the non-system object `schema.name`, if any.
    async fn object_type(&mut self, schema: &str, name: &str) -> Result<Option<String>>;

    /// Full row (with definition) of the non-system object `schema.name`.
    async fn find_object(&mut self, schema: &str, name: &str) -> Result<Option<CatalogObject>>;

    /// Views, routines and triggers whose expression references `schema.table`.
    async fn referencing_objects(&mut self, schema: &str, table: &str)
    -> Result<Vec<CatalogObject>>;

    /// Entities referenced by `object_id`, from the expression-dependency view.
    async fn expression_dependencies(&mut self, object_id: i64) -> Result<Vec<ReferencedEntity>>;

    /// Entities referenced by `object_id`, from the reflection function.
    ///
    /// Used when [`expression_dependencies`](Self::expression_dependencies)
    /// returns nothing.
    async fn referenced_entities(&mut self, object_id: i64) -> Result<Vec<ReferencedEntity>>;

    /// Online user databases this login can access, in name order.
    async fn online_databases(&mut self) -> Result<Vec<String>>;

    /// Releases the connection.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Opens connections to (server, database) pairs.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a new connection.
    async fn connect(&self, server: &str, database: &str) -> Result<Box<dyn CatalogConnection>>;
}
