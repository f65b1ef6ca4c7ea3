//! Run summary counts.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::report::LineageReport;
use crate::types::{ObjectKey, Scope};

/// Headline numbers of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    /// Distinct catalogued objects.
    pub total_objects: usize,
    /// Deepest extraction level.
    pub max_level: u32,
    /// Dependency edges recorded.
    pub edges: usize,
    /// Report links emitted.
    pub links: usize,
    /// Failures recorded.
    pub failures: usize,
    /// Objects per type.
    pub by_type: BTreeMap<String, usize>,
    /// Objects per `server.database`.
    pub by_database: BTreeMap<String, usize>,
    /// Share of edges whose scope was resolved, in percent.
    pub coverage_percent: f64,
    /// Catalogued objects no other catalogued object depends on.
    pub root_objects: usize,
    /// Catalogued objects without dependency objects.
    pub leaf_objects: usize,
}

impl Summary {
    /// Computes the summary of a finished run.
    #[must_use]
    pub fn from_report(report: &LineageReport) -> Self {
        let catalog = &report.catalog;
        let mut by_type = BTreeMap::new();
        let mut by_database = BTreeMap::new();
        let mut depended_on: HashSet<ObjectKey> = HashSet::new();
        let mut leaf_objects = 0;

        for object in catalog.objects() {
            *by_type.entry(object.object_type.to_string()).or_insert(0) += 1;
            *by_database
                .entry(format!("{}.{}", object.name.server, object.name.database))
                .or_insert(0) += 1;
            if object.dep_objects.is_empty() {
                leaf_objects += 1;
            }
            let own = object.key();
            depended_on.extend(
                object
                    .dep_objects
                    .iter()
                    .map(|dep| dep.target.key())
                    .filter(|key| *key != own),
            );
        }

        let root_objects = catalog
            .objects()
            .filter(|object| !depended_on.contains(&object.key()))
            .count();

        let edges = catalog.edges();
        let resolved = edges.iter().filter(|e| e.scope != Scope::Unknown).count();
        #[allow(clippy::cast_precision_loss)]
        let coverage_percent = if edges.is_empty() {
            100.0
        } else {
            resolved as f64 * 100.0 / edges.len() as f64
        };

        Self {
            total_objects: catalog.len(),
            max_level: catalog.max_level(),
            edges: edges.len(),
            links: report.links.len(),
            failures: report.failures.len(),
            by_type,
            by_database,
            coverage_percent,
            root_objects,
            leaf_objects,
        }
    }
}
