//! Seed source-type detection.
//!
//! A seed usually names a table, but report sources also point straight at
//! views or procedures. Knowing which decides how the seed is traced: a
//! table is searched for referencing objects, anything else is fetched as
//! itself so it does not show up as its own referrer.

use crate::error::Result;
use crate::source::CatalogConnection;
use crate::types::ObjectType;

/// Catalog type of `schema.name`, or `None` when no such object exists.
///
/// # Errors
///
/// Propagates the catalog query error.
pub async fn detect_source_type(
    connection: &mut dyn CatalogConnection,
    schema: &str,
    name: &str,
) -> Result<Option<ObjectType>> {
    let type_desc = connection.object_type(schema, name).await?;
    Ok(type_desc.map(|desc| ObjectType::from_type_desc(&desc)))
}

/// How a seed should be traced once its type is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedStrategy {
    /// Search for objects that reference the seed.
    FindReferrers,
    /// Fetch the seed object itself.
    FetchObject,
}

impl SeedStrategy {
    /// Tables and unresolved names are searched for referrers.
    #[must_use]
    pub fn for_source(source_type: Option<&ObjectType>) -> Self {
        match source_type {
            None | Some(ObjectType::Table) => Self::FindReferrers,
            Some(_) => Self::FetchObject,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Connector, MemoryCatalog, MemoryConnector, MemoryObject};
    use rstest::rstest;

    #[tokio::test]
    async fn detects_tables_and_views() {
        let mut catalog = MemoryCatalog::new();
        catalog
            .add_object("SrvA", "DbA", MemoryObject::table("dbo", "T"))
            .add_object("SrvA", "DbA", MemoryObject::view("rpt", "V"));
        let connector = MemoryConnector::new(catalog);
        let mut conn = connector.connect("SrvA", "DbA").await.unwrap();

        assert_eq!(
            detect_source_type(conn.as_mut(), "dbo", "t").await.unwrap(),
            Some(ObjectType::Table)
        );
        assert_eq!(
            detect_source_type(conn.as_mut(), "RPT", "V").await.unwrap(),
            Some(ObjectType::View)
        );
        assert_eq!(detect_source_type(conn.as_mut(), "dbo", "Gone").await.unwrap(), None);
    }

    #[rstest]
    #[case(None, SeedStrategy::FindReferrers)]
    #[case(Some(ObjectType::Table), SeedStrategy::FindReferrers)]
    #[case(Some(ObjectType::View), SeedStrategy::FetchObject)]
    #[case(Some(ObjectType::Procedure), SeedStrategy::FetchObject)]
    fn strategy_follows_source_type(
        #[case] source_type: Option<ObjectType>,
        #[case] expected: SeedStrategy,
    ) {
        assert_eq!(SeedStrategy::for_source(source_type.as_ref()), expected);
    }
}
