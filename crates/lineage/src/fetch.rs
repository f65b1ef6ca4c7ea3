//! Dependency fetching and classification.
//!
//! For one object the fetcher lists what it references, deciding for each
//! referenced entity whether it is a table or another object, what type it
//! has, and where it lives relative to the referencing object.
//!
//! The expression-dependency view is asked first. When it returns nothing
//! the reflection function is asked instead; the two steps are explicit in
//! [`QueryOutcome`] rather than hidden in error handling.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::pool::ConnectionPool;
use crate::source::{CatalogConnection, CatalogObject, ReferencedEntity};
use crate::types::{
    DEFAULT_SCHEMA, DependencyRef, LineageObject, ObjectKey, ObjectType, QualifiedName, Scope,
};

/// Class descriptor that carries no type information of its own.
const GENERIC_CLASS: &str = "OBJECT_OR_COLUMN";

/// Result of one catalog query step.
#[derive(Debug)]
pub enum QueryOutcome<T> {
    /// The query returned rows.
    Rows(Vec<T>),
    /// The query succeeded with no rows.
    Empty,
    /// The query failed.
    Failed(Error),
}

impl<T> From<Result<Vec<T>>> for QueryOutcome<T> {
    fn from(result: Result<Vec<T>>) -> Self {
        match result {
            Ok(rows) if rows.is_empty() => Self::Empty,
            Ok(rows) => Self::Rows(rows),
            Err(e) => Self::Failed(e),
        }
    }
}

impl<T> QueryOutcome<T> {
    /// Collapses the outcome back into a result, `Empty` becoming no rows.
    ///
    /// # Errors
    ///
    /// Returns the query error of a `Failed` outcome.
    pub fn into_result(self) -> Result<Vec<T>> {
        match self {
            Self::Rows(rows) => Ok(rows),
            Self::Empty => Ok(Vec::new()),
            Self::Failed(e) => Err(e),
        }
    }
}

/// What an object references, split into tables and other objects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies {
    /// Table dependencies.
    pub tables: Vec<DependencyRef>,
    /// Non-table dependencies.
    pub objects: Vec<DependencyRef>,
}

/// An object read from the catalog together with how its dependency fetch went.
#[derive(Debug)]
pub struct FetchedObject {
    /// The object, dependencies filled in when the fetch succeeded.
    pub object: LineageObject,
    /// Set when the object was found but its dependencies could not be read.
    pub dependency_error: Option<Error>,
}

/// Entities referenced by `object_id`, primary view first, reflection second.
///
/// # Errors
///
/// Returns the error of whichever query step failed.
pub async fn referenced_entities(
    connection: &mut dyn CatalogConnection,
    object_id: i64,
) -> Result<Vec<ReferencedEntity>> {
    match QueryOutcome::from(connection.expression_dependencies(object_id).await) {
        QueryOutcome::Rows(rows) => Ok(rows),
        QueryOutcome::Failed(e) => Err(e),
        QueryOutcome::Empty => {
            tracing::debug!(object_id, "expression view empty, trying referenced entities");
            QueryOutcome::from(connection.referenced_entities(object_id).await).into_result()
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Classifies the references of `origin` (object id `object_id`).
///
/// Self-references are dropped and each dependency appears once.
///
/// # Errors
///
/// Returns the error of the dependency query. A failed best-effort type
/// lookup only leaves the entity `UNKNOWN`.
pub async fn object_dependencies(
    connection: &mut dyn CatalogConnection,
    origin: &QualifiedName,
    object_id: i64,
) -> Result<Dependencies> {
    let entities = referenced_entities(connection, object_id).await?;
    let origin_key = origin.key();
    let mut seen: HashSet<ObjectKey> = HashSet::new();
    let mut deps = Dependencies::default();

    for entity in entities {
        let name = entity.name.trim();
        if name.is_empty() {
            continue;
        }
        let named_server = non_blank(entity.server.as_deref());
        let named_database = non_blank(entity.database.as_deref());
        let target = QualifiedName::new(
            named_server.unwrap_or(&origin.server),
            named_database.unwrap_or(&origin.database),
            non_blank(entity.schema.as_deref()).unwrap_or(DEFAULT_SCHEMA),
            name,
        );
        let key = target.key();
        if key == origin_key || !seen.insert(key) {
            continue;
        }

        let foreign_server = named_server.is_some_and(|s| !s.eq_ignore_ascii_case(&origin.server));
        let foreign_database =
            foreign_server || named_database.is_some_and(|d| !d.eq_ignore_ascii_case(&origin.database));

        let object_type = match non_blank(entity.type_desc.as_deref()) {
            Some(desc) => ObjectType::from_type_desc(desc),
            None if foreign_database => ObjectType::ExternalObject,
            None => match non_blank(entity.class_desc.as_deref()) {
                Some(class) if !class.eq_ignore_ascii_case(GENERIC_CLASS) => {
                    ObjectType::Other(class.to_string())
                }
                _ => lookup_type(connection, &target).await,
            },
        };

        let scope = if foreign_server {
            Scope::CrossServer
        } else if foreign_database {
            Scope::CrossDb
        } else if object_type == ObjectType::Unknown {
            Scope::Unknown
        } else {
            Scope::SameDb
        };

        let dependency = DependencyRef {
            target,
            object_type,
            scope,
        };
        if dependency.object_type.is_table() {
            deps.tables.push(dependency);
        } else {
            deps.objects.push(dependency);
        }
    }

    Ok(deps)
}

async fn lookup_type(connection: &mut dyn CatalogConnection, target: &QualifiedName) -> ObjectType {
    match connection.object_type(&target.schema, &target.object).await {
        Ok(Some(desc)) => ObjectType::from_type_desc(&desc),
        Ok(None) => ObjectType::Unknown,
        Err(e) => {
            tracing::debug!(target = %target, error = %e, "type lookup failed");
            ObjectType::Unknown
        }
    }
}

async fn with_dependencies(
    connection: &mut dyn CatalogConnection,
    server: &str,
    database: &str,
    row: CatalogObject,
    level: u32,
) -> FetchedObject {
    let name = QualifiedName::new(server, database, row.schema, row.name);
    let mut object = LineageObject::new(name, ObjectType::from_type_desc(&row.type_desc), level);
    object.object_id = Some(row.object_id);
    object.definition = row.definition;

    let dependency_error = match object_dependencies(connection, &object.name, row.object_id).await {
        Ok(deps) => {
            object.dep_tables = deps.tables;
            object.dep_objects = deps.objects;
            object.dependencies_fetched = true;
            None
        }
        Err(e) => {
            tracing::warn!(object = %object.name, error = %e, "cannot read dependencies");
            Some(e)
        }
    };

    FetchedObject {
        object,
        dependency_error,
    }
}

/// Objects in (server, database) whose expression references `schema.table`,
/// each with its own first-level dependencies.
///
/// # Errors
///
/// Returns the error of the referencing-objects query. Per-object dependency
/// failures are reported in [`FetchedObject::dependency_error`] instead.
pub async fn referencing_objects(
    connection: &mut dyn CatalogConnection,
    server: &str,
    database: &str,
    schema: &str,
    table: &str,
    level: u32,
) -> Result<Vec<FetchedObject>> {
    let rows = connection.referencing_objects(schema, table).await?;
    let mut fetched = Vec::with_capacity(rows.len());
    for row in rows {
        fetched.push(with_dependencies(connection, server, database, row, level).await);
    }
    Ok(fetched)
}

/// The object `schema.name` of (server, database) itself, with dependencies.
///
/// # Errors
///
/// Returns the error of the lookup query.
pub async fn fetch_object(
    connection: &mut dyn CatalogConnection,
    server: &str,
    database: &str,
    schema: &str,
    name: &str,
    level: u32,
) -> Result<Option<FetchedObject>> {
    match connection.find_object(schema, name).await? {
        Some(row) => Ok(Some(
            with_dependencies(connection, server, database, row, level).await,
        )),
        None => Ok(None),
    }
}

/// Re-types `EXTERNAL_OBJECT` dependencies by asking their own database.
///
/// Only databases the pool can reach are consulted; the rest stay external.
/// A dependency that turns out to be a table moves to the table list.
pub async fn resolve_external(pool: &mut ConnectionPool, object: &mut LineageObject) {
    let mut index = 0;
    while index < object.dep_objects.len() {
        let dep = &object.dep_objects[index];
        if dep.object_type != ObjectType::ExternalObject {
            index += 1;
            continue;
        }
        let target = dep.target.clone();
        let resolved = match pool.get(&target.server, &target.database).await {
            Some(connection) => match connection.object_type(&target.schema, &target.object).await {
                Ok(desc) => desc.map(|d| ObjectType::from_type_desc(&d)),
                Err(e) => {
                    tracing::debug!(target = %target, error = %e, "external type lookup failed");
                    None
                }
            },
            None => None,
        };

        match resolved {
            Some(object_type) if object_type.is_table() => {
                let mut dep = object.dep_objects.remove(index);
                dep.object_type = object_type;
                object.dep_tables.push(dep);
            }
            Some(object_type) => {
                object.dep_objects[index].object_type = object_type;
                index += 1;
            }
            None => index += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::memory::{DatabaseState, MemoryReference};
    use crate::source::{Connector, MemoryCatalog, MemoryConnector, MemoryObject};
    use std::sync::Arc;

    fn origin(object: &str) -> QualifiedName {
        QualifiedName::new("SrvA", "DbA", "dbo", object)
    }

    async fn deps_of(catalog: MemoryCatalog, object: &str) -> Result<Dependencies> {
        let connector = MemoryConnector::new(catalog);
        let mut conn = connector.connect("SrvA", "DbA").await.unwrap();
        let row = conn.find_object("dbo", object).await.unwrap().unwrap();
        object_dependencies(conn.as_mut(), &origin(object), row.object_id).await
    }

    #[tokio::test]
    async fn tables_and_objects_are_split() {
        let mut catalog = MemoryCatalog::new();
        catalog
            .add_object("SrvA", "DbA", MemoryObject::table("dbo", "T"))
            .add_object("SrvA", "DbA", MemoryObject::procedure("dbo", "P"))
            .add_object(
                "SrvA",
                "DbA",
                MemoryObject::view("dbo", "V").references("dbo", "T").references("dbo", "P"),
            );

        let deps = deps_of(catalog, "V").await.unwrap();

        assert_eq!(deps.tables.len(), 1);
        assert_eq!(deps.tables[0].target.object, "T");
        assert_eq!(deps.tables[0].scope, Scope::SameDb);
        assert_eq!(deps.objects.len(), 1);
        assert_eq!(deps.objects[0].object_type, ObjectType::Procedure);
    }

    #[tokio::test]
    async fn fallback_query_used_when_expression_view_is_empty() {
        let mut catalog = MemoryCatalog::new();
        catalog
            .add_object("SrvA", "DbA", MemoryObject::table("dbo", "T"))
            .add_object(
                "SrvA",
                "DbA",
                MemoryObject::procedure("dbo", "P")
                    .references("dbo", "T")
                    .hidden_from_expression_view(),
            );

        let deps = deps_of(catalog, "P").await.unwrap();

        assert_eq!(deps.tables.len(), 1);
        assert_eq!(deps.tables[0].object_type, ObjectType::Table);
    }

    #[tokio::test]
    async fn foreign_database_without_type_is_external() {
        let mut catalog = MemoryCatalog::new();
        catalog.add_object(
            "SrvA",
            "DbA",
            MemoryObject::view("dbo", "V")
                .references_external(None, "DbB", "dbo", "X")
                .references_external(Some("SrvZ"), "DbZ", "ops", "Y"),
        );

        let deps = deps_of(catalog, "V").await.unwrap();

        assert_eq!(deps.objects.len(), 2);
        assert_eq!(deps.objects[0].object_type, ObjectType::ExternalObject);
        assert_eq!(deps.objects[0].scope, Scope::CrossDb);
        assert_eq!(deps.objects[0].target.database, "DbB");
        assert_eq!(deps.objects[1].scope, Scope::CrossServer);
        assert_eq!(deps.objects[1].target.server, "SrvZ");
    }

    #[tokio::test]
    async fn class_descriptor_is_kept_verbatim() {
        let mut catalog = MemoryCatalog::new();
        catalog.add_object(
            "SrvA",
            "DbA",
            MemoryObject::procedure("dbo", "P").with_reference(MemoryReference {
                server: None,
                database: None,
                schema: Some("dbo".into()),
                name: "Amount".into(),
                class_desc: Some("TYPE".into()),
            }),
        );

        let deps = deps_of(catalog, "P").await.unwrap();

        assert_eq!(deps.objects[0].object_type, ObjectType::Other("TYPE".into()));
        assert_eq!(deps.objects[0].scope, Scope::SameDb);
    }

    #[tokio::test]
    async fn unresolved_reference_is_looked_up_and_reclassified_as_table() {
        let mut catalog = MemoryCatalog::new();
        catalog
            .add_object("SrvA", "DbA", MemoryObject::table("dbo", "Staging"))
            .add_object(
                "SrvA",
                "DbA",
                MemoryObject::procedure("dbo", "Load")
                    .references_unqualified("Staging")
                    .references_unqualified("TempWork"),
            );

        let deps = deps_of(catalog, "Load").await.unwrap();

        assert_eq!(deps.tables.len(), 1);
        assert_eq!(deps.tables[0].target.object, "Staging");
        assert_eq!(deps.tables[0].scope, Scope::SameDb);
        assert_eq!(deps.objects.len(), 1);
        assert_eq!(deps.objects[0].object_type, ObjectType::Unknown);
        assert_eq!(deps.objects[0].scope, Scope::Unknown);
    }

    #[tokio::test]
    async fn self_references_and_duplicates_are_dropped() {
        let mut catalog = MemoryCatalog::new();
        catalog
            .add_object("SrvA", "DbA", MemoryObject::table("dbo", "T"))
            .add_object(
                "SrvA",
                "DbA",
                MemoryObject::procedure("dbo", "P")
                    .references("dbo", "P")
                    .references("dbo", "T")
                    .references("DBO", "t"),
            );

        let deps = deps_of(catalog, "P").await.unwrap();

        assert_eq!(deps.tables.len(), 1);
        assert!(deps.objects.is_empty());
    }

    #[tokio::test]
    async fn denied_database_surfaces_permission_error() {
        let mut catalog = MemoryCatalog::new();
        catalog.add_object("SrvA", "DbA", MemoryObject::table("dbo", "T"));
        catalog.set_state("SrvA", "DbA", DatabaseState::Denied);
        let connector = MemoryConnector::new(catalog);
        let mut conn = connector.connect("SrvA", "DbA").await.unwrap();

        let result = referencing_objects(conn.as_mut(), "SrvA", "DbA", "dbo", "T", 1).await;

        assert!(matches!(result, Err(Error::Permission(_))));
    }

    #[tokio::test]
    async fn referencing_objects_carry_definitions_and_dependencies() {
        let mut catalog = MemoryCatalog::new();
        catalog
            .add_object("SrvA", "DbA", MemoryObject::table("dbo", "T"))
            .add_object(
                "SrvA",
                "DbA",
                MemoryObject::view("dbo", "V")
                    .with_definition("CREATE VIEW dbo.V AS SELECT * FROM dbo.T")
                    .references("dbo", "T"),
            );
        let connector = MemoryConnector::new(catalog);
        let mut conn = connector.connect("SrvA", "DbA").await.unwrap();

        let found = referencing_objects(conn.as_mut(), "SrvA", "DbA", "dbo", "T", 1)
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        let view = &found[0].object;
        assert!(found[0].dependency_error.is_none());
        assert!(view.dependencies_fetched);
        assert_eq!(view.level, 1);
        assert_eq!(view.object_type, ObjectType::View);
        assert!(view.definition.as_deref().is_some_and(|d| d.contains("FROM dbo.T")));
        assert_eq!(view.dep_tables.len(), 1);
    }

    #[tokio::test]
    async fn external_dependencies_are_resolved_through_the_pool() {
        let mut catalog = MemoryCatalog::new();
        catalog
            .add_object("SrvA", "DbB", MemoryObject::table("dbo", "X"))
            .add_object("SrvA", "DbB", MemoryObject::function("dbo", "F"))
            .add_object(
                "SrvA",
                "DbA",
                MemoryObject::view("dbo", "V")
                    .references_external(None, "DbB", "dbo", "X")
                    .references_external(None, "DbB", "dbo", "F")
                    .references_external(None, "DbGone", "dbo", "Z"),
            );
        let connector = MemoryConnector::new(catalog);
        let mut pool = ConnectionPool::new(Arc::new(connector));
        let connection = pool.get("SrvA", "DbA").await.unwrap();
        let mut fetched = fetch_object(connection, "SrvA", "DbA", "dbo", "V", 1)
            .await
            .unwrap()
            .unwrap();

        resolve_external(&mut pool, &mut fetched.object).await;

        let view = fetched.object;
        assert_eq!(view.dep_tables.len(), 1);
        assert_eq!(view.dep_tables[0].target.object, "X");
        assert_eq!(view.dep_tables[0].scope, Scope::CrossDb);
        assert_eq!(view.dep_objects.len(), 2);
        assert_eq!(view.dep_objects[0].object_type, ObjectType::Function);
        assert_eq!(view.dep_objects[1].object_type, ObjectType::ExternalObject);
    }

    #[test]
    fn outcome_from_result() {
        assert!(matches!(QueryOutcome::<u8>::from(Ok(Vec::new())), QueryOutcome::Empty));
        assert!(matches!(QueryOutcome::<i32>::from(Ok(vec![1])), QueryOutcome::Rows(r) if r == vec![1]));
        assert!(matches!(
            QueryOutcome::<u8>::from(Err(Error::Query("boom".into()))),
            QueryOutcome::Failed(_)
        ));
    }
}
