//! Flattened root-to-leaf paths over a finished catalog.
//!
//! Each row starts at a seed's level-1 object and follows dependency
//! objects until a leaf, the depth limit, or a cycle back into the path.

use serde::Serialize;
use std::collections::HashSet;

use crate::catalog::ObjectCatalog;
use crate::types::{ObjectKey, ObjectType, QualifiedName, RootBinding, RootContext, Scope};

/// One object on a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathStep {
    /// 1-based position on the path.
    pub level: usize,
    /// The object.
    pub object: QualifiedName,
    /// Its type as resolved by the object that depends on it.
    pub object_type: ObjectType,
    /// Its location relative to the previous step; `None` on the first step.
    pub scope: Option<Scope>,
}

/// One enumerated path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathRow {
    /// Seed the path starts from.
    pub root: RootContext,
    /// Objects from level 1 down.
    pub steps: Vec<PathStep>,
    /// Whether the depth limit cut the path while dependencies remained.
    pub truncated: bool,
}

/// Enumerates paths over a catalog with a depth limit.
#[derive(Debug)]
pub struct PathEnumerator<'a> {
    catalog: &'a ObjectCatalog,
    max_depth: usize,
}

struct Walk<'r> {
    root: &'r RootContext,
    steps: Vec<PathStep>,
    on_path: HashSet<ObjectKey>,
}

impl<'a> PathEnumerator<'a> {
    /// Creates an enumerator; `max_depth` counts objects per path and is at
    /// least 1.
    #[must_use]
    pub fn new(catalog: &'a ObjectCatalog, max_depth: usize) -> Self {
        Self {
            catalog,
            max_depth: max_depth.max(1),
        }
    }

    /// One row per distinct path from each bound root object.
    ///
    /// Bindings whose object is not in the catalog produce nothing.
    #[must_use]
    pub fn enumerate(&self, roots: &[RootBinding]) -> Vec<PathRow> {
        let mut rows = Vec::new();
        for binding in roots {
            let Some(start) = self.catalog.get(&binding.object) else {
                tracing::debug!(object = %binding.object, "root object not catalogued");
                continue;
            };
            let mut walk = Walk {
                root: &binding.context,
                steps: vec![PathStep {
                    level: 1,
                    object: start.name.clone(),
                    object_type: start.object_type.clone(),
                    scope: None,
                }],
                on_path: HashSet::from([binding.object.clone()]),
            };
            self.extend(&binding.object, &mut walk, &mut rows);
        }
        rows
    }

    fn extend(&self, current: &ObjectKey, walk: &mut Walk<'_>, rows: &mut Vec<PathRow>) {
        let deps: Vec<_> = self
            .catalog
            .get(current)
            .map(|object| {
                object
                    .dep_objects
                    .iter()
                    .filter(|dep| !walk.on_path.contains(&dep.target.key()))
                    .collect()
            })
            .unwrap_or_default();

        if deps.is_empty() || walk.steps.len() >= self.max_depth {
            rows.push(PathRow {
                root: walk.root.clone(),
                steps: walk.steps.clone(),
                truncated: !deps.is_empty(),
            });
            return;
        }

        for dep in deps {
            let key = dep.target.key();
            walk.steps.push(PathStep {
                level: walk.steps.len() + 1,
                object: dep.target.clone(),
                object_type: dep.object_type.clone(),
                scope: Some(dep.scope),
            });
            walk.on_path.insert(key.clone());

            self.extend(&key, walk, rows);

            walk.on_path.remove(&key);
            walk.steps.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DependencyRef, LineageObject};

    fn name(object: &str) -> QualifiedName {
        QualifiedName::new("SrvA", "DbA", "dbo", object)
    }

    fn object(object: &str, object_type: ObjectType, level: u32, deps: &[&str]) -> LineageObject {
        let mut o = LineageObject::new(name(object), object_type, level);
        o.dep_objects = deps
            .iter()
            .map(|d| DependencyRef {
                target: name(d),
                object_type: ObjectType::Procedure,
                scope: Scope::SameDb,
            })
            .collect();
        o
    }

    fn binding(object: &str) -> RootBinding {
        RootBinding {
            context: RootContext {
                server: "SrvA".into(),
                database: "DbA".into(),
                schema: "dbo".into(),
                table: "T".into(),
                ..RootContext::default()
            },
            object: name(object).key(),
        }
    }

    fn objects(row: &PathRow) -> Vec<&str> {
        row.steps.iter().map(|s| s.object.object.as_str()).collect()
    }

    #[test]
    fn depth_limit_stops_recursion() {
        let mut catalog = ObjectCatalog::new();
        catalog.register(object("V", ObjectType::View, 1, &["P"]));
        catalog.register(object("P", ObjectType::Procedure, 2, &["Q"]));
        catalog.register(object("Q", ObjectType::Procedure, 3, &[]));

        let rows = PathEnumerator::new(&catalog, 2).enumerate(&[binding("V")]);

        assert_eq!(rows.len(), 1);
        assert_eq!(objects(&rows[0]), vec!["V", "P"]);
        assert!(rows[0].truncated);
        assert_eq!(rows[0].steps[1].scope, Some(Scope::SameDb));
    }

    #[test]
    fn branches_produce_one_row_each() {
        let mut catalog = ObjectCatalog::new();
        catalog.register(object("V", ObjectType::View, 1, &["P", "F"]));
        catalog.register(object("P", ObjectType::Procedure, 2, &[]));
        catalog.register(object("F", ObjectType::Function, 2, &[]));

        let rows = PathEnumerator::new(&catalog, 5).enumerate(&[binding("V")]);

        assert_eq!(rows.len(), 2);
        assert_eq!(objects(&rows[0]), vec!["V", "P"]);
        assert_eq!(objects(&rows[1]), vec!["V", "F"]);
        assert!(rows.iter().all(|r| !r.truncated));
    }

    #[test]
    fn cycles_are_cut_per_path() {
        let mut catalog = ObjectCatalog::new();
        catalog.register(object("A", ObjectType::Procedure, 1, &["B"]));
        catalog.register(object("B", ObjectType::Procedure, 2, &["A"]));

        let rows = PathEnumerator::new(&catalog, 10).enumerate(&[binding("A")]);

        assert_eq!(rows.len(), 1);
        assert_eq!(objects(&rows[0]), vec!["A", "B"]);
    }

    #[test]
    fn uncatalogued_dependency_ends_the_path() {
        let mut catalog = ObjectCatalog::new();
        catalog.register(object("V", ObjectType::View, 1, &["Missing"]));

        let rows = PathEnumerator::new(&catalog, 5).enumerate(&[binding("V")]);

        assert_eq!(rows.len(), 1);
        assert_eq!(objects(&rows[0]), vec!["V", "Missing"]);
    }

    #[test]
    fn unknown_root_yields_nothing() {
        let catalog = ObjectCatalog::new();
        assert!(PathEnumerator::new(&catalog, 5).enumerate(&[binding("V")]).is_empty());
    }
}
