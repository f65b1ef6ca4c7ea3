//! Deduplicating object store and expansion frontier.
//!
//! Objects live as node weights of a petgraph `DiGraph`, located through a
//! map from [`ObjectKey`] to `NodeIndex`. The map holds at most one node per
//! key, which is what keeps the catalog free of case-variant duplicates.
//!
//! # Edge Direction
//!
//! Dependency edges (and the graph built for migration ordering) point from
//! **dependent to dependency**: `V -> T` means view `V` reads table `T`.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::fetch::Dependencies;
use crate::types::{DependencyEdge, EdgeKind, LineageObject, ObjectKey, ObjectType, QualifiedName};

/// What [`ObjectCatalog::register`] did with an incoming object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// First time this key was seen.
    Inserted,
    /// Replaced a stored object that sat at a deeper level.
    Improved,
    /// Stored object kept; the incoming one was not shallower.
    Kept,
}

impl RegisterOutcome {
    /// Whether the incoming object was stored (and queued).
    #[must_use]
    pub fn is_stored(self) -> bool {
        !matches!(self, Self::Kept)
    }
}

/// One entry of the migration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStep {
    /// 1-based position; members of one dependency cycle share a rank.
    pub rank: usize,
    /// The object.
    pub object: QualifiedName,
    /// Its type.
    pub object_type: ObjectType,
    /// Its extraction level.
    pub level: u32,
    /// Whether it sits on a dependency cycle.
    pub cyclic: bool,
}

/// Catalog of discovered objects for one run.
#[derive(Debug, Default)]
pub struct ObjectCatalog {
    graph: DiGraph<LineageObject, ()>,
    node_map: HashMap<ObjectKey, NodeIndex>,
    pending: VecDeque<ObjectKey>,
    edges: Vec<DependencyEdge>,
    edge_keys: HashSet<(ObjectKey, ObjectKey)>,
}

impl ObjectCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `object` unless an object with the same key sits at the same
    /// or a shallower level.
    ///
    /// A stored object is queued. Consumers expand each key at most once,
    /// so queuing an improved copy only matters when the key has not been
    /// expanded yet; otherwise it just lowers the stored level. When a
    /// shallower copy replaces a deeper one that already had its
    /// dependencies read, and the copy has none, the dependencies carry over.
    /// Returns the outcome and the object now stored under the key.
    pub fn register(&mut self, object: LineageObject) -> (RegisterOutcome, &LineageObject) {
        let key = object.key();
        let (outcome, index) = match self.node_map.get(&key) {
            Some(&index) => {
                let stored = &mut self.graph[index];
                if object.level < stored.level {
                    let mut object = object;
                    if !object.dependencies_fetched && stored.dependencies_fetched {
                        object.dep_tables = std::mem::take(&mut stored.dep_tables);
                        object.dep_objects = std::mem::take(&mut stored.dep_objects);
                        object.dependencies_fetched = true;
                    }
                    *stored = object;
                    self.pending.push_back(key);
                    (RegisterOutcome::Improved, index)
                } else {
                    (RegisterOutcome::Kept, index)
                }
            }
            None => {
                let index = self.graph.add_node(object);
                self.node_map.insert(key.clone(), index);
                self.pending.push_back(key);
                (RegisterOutcome::Inserted, index)
            }
        };
        (outcome, &self.graph[index])
    }

    /// Next key to expand, in first-in first-out order.
    pub fn pop_pending(&mut self) -> Option<ObjectKey> {
        self.pending.pop_front()
    }

    /// Looks up an object by key.
    #[must_use]
    pub fn get(&self, key: &ObjectKey) -> Option<&LineageObject> {
        self.node_map.get(key).map(|&index| &self.graph[index])
    }

    /// Mutable lookup by key.
    pub fn get_mut(&mut self, key: &ObjectKey) -> Option<&mut LineageObject> {
        self.node_map.get(key).map(|&index| &mut self.graph[index])
    }

    /// Whether `key` is stored at `level` or shallower.
    #[must_use]
    pub fn contains_at_or_below(&self, key: &ObjectKey, level: u32) -> bool {
        self.get(key).is_some_and(|object| object.level <= level)
    }

    /// Records the dependency lists of a stored object.
    pub fn set_dependencies(&mut self, key: &ObjectKey, deps: Dependencies) {
        if let Some(object) = self.get_mut(key) {
            object.dep_tables = deps.tables;
            object.dep_objects = deps.objects;
            object.dependencies_fetched = true;
        }
    }

    /// Emits one edge per dependency of the stored object `key`.
    ///
    /// Self-loops and (source, target) pairs already recorded are skipped.
    /// Returns the number of new edges.
    pub fn record_edges(&mut self, key: &ObjectKey) -> usize {
        let Some(&index) = self.node_map.get(key) else {
            return 0;
        };
        let owner = &self.graph[index];
        let mut added = 0;
        let deps = owner
            .dep_tables
            .iter()
            .map(|dep| (dep, EdgeKind::Table))
            .chain(owner.dep_objects.iter().map(|dep| (dep, EdgeKind::Object)));
        for (dep, kind) in deps {
            let target_key = dep.target.key();
            if &target_key == key || !self.edge_keys.insert((key.clone(), target_key)) {
                continue;
            }
            self.edges.push(DependencyEdge {
                source: owner.name.clone(),
                source_type: owner.object_type.clone(),
                target: dep.target.clone(),
                target_type: dep.object_type.clone(),
                scope: dep.scope,
                kind,
            });
            added += 1;
        }
        added
    }

    /// Stored objects in discovery order.
    pub fn objects(&self) -> impl Iterator<Item = &LineageObject> {
        self.graph.node_weights()
    }

    /// Recorded dependency edges in discovery order.
    #[must_use]
    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    /// Number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Deepest extraction level stored, 0 when empty.
    #[must_use]
    pub fn max_level(&self) -> u32 {
        self.objects().map(|o| o.level).max().unwrap_or(0)
    }

    /// Orders objects so that every object comes after the catalogued
    /// objects it depends on.
    ///
    /// Uses Tarjan's SCC algorithm; its components come out in reverse
    /// topological order of the dependent-to-dependency graph, i.e.
    /// dependencies first. Cycle members share a rank and are sorted by key.
    #[must_use]
    pub fn migration_order(&self) -> Vec<MigrationStep> {
        let mut graph: DiGraph<(), ()> = self.graph.map(|_, _| (), |_, _| ());
        for index in self.graph.node_indices() {
            for dep in &self.graph[index].dep_objects {
                if let Some(&target) = self.node_map.get(&dep.target.key())
                    && target != index
                {
                    graph.update_edge(index, target, ());
                }
            }
        }

        let mut steps = Vec::with_capacity(self.len());
        for (position, mut component) in tarjan_scc(&graph).into_iter().enumerate() {
            component.sort_by_key(|&index| self.graph[index].key());
            let cyclic = component.len() > 1;
            for index in component {
                let object = &self.graph[index];
                steps.push(MigrationStep {
                    rank: position + 1,
                    object: object.name.clone(),
                    object_type: object.object_type.clone(),
                    level: object.level,
                    cyclic,
                });
            }
        }
        steps
    }
}
