//! Report records produced by a run, and their JSONL export.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::catalog::ObjectCatalog;
use crate::error::{FailureRecord, Result};
use crate::motive::Motive;
use crate::paths::PathRow;
use crate::types::{DependencyRef, LineageObject, ObjectType, QualifiedName, RootBinding, RootContext};
use lineage_jsonl::write_jsonl_atomic;

/// File names of the exported record sets.
pub const LINKS_FILE: &str = "links.jsonl";
/// Dependency edges.
pub const EDGES_FILE: &str = "edges.jsonl";
/// Object catalog.
pub const OBJECTS_FILE: &str = "objects.jsonl";
/// Failure log.
pub const FAILURES_FILE: &str = "failures.jsonl";
/// Enumerated paths.
pub const PATHS_FILE: &str = "paths.jsonl";
/// Migration order.
pub const MIGRATION_ORDER_FILE: &str = "migration_order.jsonl";

/// One discovered object reported against the seed that led to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportLink {
    /// Seed context.
    pub root: RootContext,
    /// The discovered object.
    pub object: QualifiedName,
    /// Its type.
    pub object_type: ObjectType,
    /// How it uses the seed table.
    pub motive: Motive,
    /// Its extraction level.
    pub level: u32,
    /// Tables it depends on, as `server.database.schema.name`.
    pub dependency_tables: Vec<String>,
    /// Number of entries in `dependency_tables`.
    pub dependency_table_count: usize,
    /// Objects it depends on, as `server.database.schema.name`.
    pub dependency_objects: Vec<String>,
    /// Number of entries in `dependency_objects`.
    pub dependency_object_count: usize,
}

fn render(deps: &[DependencyRef]) -> Vec<String> {
    deps.iter().map(|dep| dep.target.to_string()).collect()
}

impl ReportLink {
    /// Builds the link for `object` discovered from the seed `root`.
    #[must_use]
    pub fn new(root: RootContext, object: &LineageObject, motive: Motive) -> Self {
        let dependency_tables = render(&object.dep_tables);
        let dependency_objects = render(&object.dep_objects);
        Self {
            root,
            object: object.name.clone(),
            object_type: object.object_type.clone(),
            motive,
            level: object.level,
            dependency_table_count: dependency_tables.len(),
            dependency_tables,
            dependency_object_count: dependency_objects.len(),
            dependency_objects,
        }
    }
}

/// Everything one run produced.
#[derive(Debug, Default)]
pub struct LineageReport {
    /// Discovered objects and edges.
    pub catalog: ObjectCatalog,
    /// One link per (seed, discovered level-1 object).
    pub links: Vec<ReportLink>,
    /// Seeds and objects that could not be traced.
    pub failures: Vec<FailureRecord>,
    /// Seed-to-object bindings for path enumeration.
    pub roots: Vec<RootBinding>,
}

/// Where each export landed and how many records it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportedFile {
    /// Output path.
    pub path: PathBuf,
    /// Records written.
    pub records: usize,
}

/// Writes every record set of `report` plus `paths` into `out_dir`.
///
/// Each file is written atomically; the directory is created if needed.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or a file cannot be
/// written.
pub async fn write_exports(
    out_dir: &Path,
    report: &LineageReport,
    paths: &[PathRow],
) -> Result<Vec<ExportedFile>> {
    tokio::fs::create_dir_all(out_dir).await?;

    let objects: Vec<&LineageObject> = report.catalog.objects().collect();
    let order = report.catalog.migration_order();

    let mut exported = Vec::with_capacity(6);
    let mut record = |name: &str, records: usize| {
        exported.push(ExportedFile {
            path: out_dir.join(name),
            records,
        });
    };

    record(
        LINKS_FILE,
        write_jsonl_atomic(&out_dir.join(LINKS_FILE), &report.links).await?,
    );
    record(
        EDGES_FILE,
        write_jsonl_atomic(&out_dir.join(EDGES_FILE), report.catalog.edges()).await?,
    );
    record(
        OBJECTS_FILE,
        write_jsonl_atomic(&out_dir.join(OBJECTS_FILE), &objects).await?,
    );
    record(
        FAILURES_FILE,
        write_jsonl_atomic(&out_dir.join(FAILURES_FILE), &report.failures).await?,
    );
    record(
        PATHS_FILE,
        write_jsonl_atomic(&out_dir.join(PATHS_FILE), paths).await?,
    );
    record(
        MIGRATION_ORDER_FILE,
        write_jsonl_atomic(&out_dir.join(MIGRATION_ORDER_FILE), &order).await?,
    );

    tracing::info!(out_dir = %out_dir.display(), "exports written");
    Ok(exported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Scope;

    fn view_with_deps() -> LineageObject {
        let mut view = LineageObject::new(
            QualifiedName::new("SrvA", "DbA", "dbo", "V"),
            ObjectType::View,
            1,
        );
        view.dep_tables.push(DependencyRef {
            target: QualifiedName::new("SrvA", "DbA", "dbo", "T"),
            object_type: ObjectType::Table,
            scope: Scope::SameDb,
        });
        view.dep_objects.push(DependencyRef {
            target: QualifiedName::new("SrvA", "DbA", "dbo", "P"),
            object_type: ObjectType::Procedure,
            scope: Scope::SameDb,
        });
        view
    }

    #[test]
    fn link_renders_dependency_lists_with_counts() {
        let link = ReportLink::new(RootContext::default(), &view_with_deps(), Motive::Read);

        assert_eq!(link.dependency_tables, vec!["SrvA.DbA.dbo.T"]);
        assert_eq!(link.dependency_table_count, 1);
        assert_eq!(link.dependency_objects, vec!["SrvA.DbA.dbo.P"]);
        assert_eq!(link.dependency_object_count, 1);
        assert_eq!(link.level, 1);
    }

    #[test]
    fn link_serializes_motive_label() {
        let link = ReportLink::new(RootContext::default(), &view_with_deps(), Motive::Write);
        let json = serde_json::to_value(&link).unwrap();
        assert_eq!(json["motive"], "Scrittura");
        assert_eq!(json["object_type"], "VIEW");
    }

    #[tokio::test]
    async fn exports_write_all_six_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");

        let mut report = LineageReport::default();
        let (_, view) = report.catalog.register(view_with_deps());
        report
            .links
            .push(ReportLink::new(RootContext::default(), view, Motive::Read));
        let key = view_with_deps().key();
        report.catalog.record_edges(&key);

        let exported = write_exports(&out, &report, &[]).await.unwrap();

        assert_eq!(exported.len(), 6);
        for file in &exported {
            assert!(file.path.exists(), "{} missing", file.path.display());
        }
        let edges = exported.iter().find(|f| f.path.ends_with(EDGES_FILE)).unwrap();
        assert_eq!(edges.records, 2);
    }
}
