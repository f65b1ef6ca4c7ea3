//! Lineage runner: seeds in, report out.
//!
//! A run has two phases:
//!
//! 1. **Seed phase**: every seed is resolved against its candidate databases.
//!    The first candidate that yields objects wins; those objects are
//!    registered at level 1 and reported against the seed.
//! 2. **Expansion phase**: the catalog's pending queue is drained first in,
//!    first out. Each popped object has its dependencies recorded as edges,
//!    and every dependency object not yet catalogued at an equal or
//!    shallower level is fetched and registered one level deeper.
//!
//! Because every level-1 object is registered before expansion starts and
//! the queue is FIFO, objects are first registered at their shortest
//! distance from a seed. A processed set keyed by identity stops any object
//! from being expanded twice.
//!
//! Nothing in a run returns an error: connection, permission and query
//! problems become [`FailureRecord`]s and the run carries on. Each object
//! fails at most once per run; later references to it are skipped.

use std::collections::HashSet;
use std::sync::Arc;

use crate::catalog::ObjectCatalog;
use crate::config::TraceConfig;
use crate::detect::{SeedStrategy, detect_source_type};
use crate::error::{Error, FailureKind, FailureRecord};
use crate::fetch::{
    Dependencies, FetchedObject, fetch_object, object_dependencies, referencing_objects,
    resolve_external,
};
use crate::motive::{Motive, classify};
use crate::pool::ConnectionPool;
use crate::report::{LineageReport, ReportLink};
use crate::resolver::CandidateResolver;
use crate::seed::SeedRecord;
use crate::source::Connector;
use crate::types::{DEFAULT_SCHEMA, ObjectKey, ObjectType, QualifiedName, RootBinding, RootContext};

/// Level assigned to objects found directly from a seed.
pub const ROOT_LEVEL: u32 = 1;

/// Reason recorded when every candidate answered but none had objects.
const NO_OBJECT_FOUND: &str = "no object found";

/// A seed with its fields trimmed and defaults applied.
struct NormalizedSeed {
    file_id: Option<String>,
    file_path: Option<String>,
    server: String,
    database: Option<String>,
    schema: String,
    table: String,
}

/// Outcome of trying a seed's candidate databases.
enum SeedResolution {
    Found {
        database: String,
        source_type: Option<ObjectType>,
        strategy: SeedStrategy,
        objects: Vec<FetchedObject>,
    },
    Exhausted(FailureRecord),
}

/// Drives one or more lineage runs over a catalog source.
pub struct LineageRunner {
    config: TraceConfig,
    pool: ConnectionPool,
    resolver: CandidateResolver,
    /// Objects whose fetch or dependency read already failed this run.
    failed: HashSet<ObjectKey>,
}

impl LineageRunner {
    /// Creates a runner over `connector`.
    #[must_use]
    pub fn new(config: TraceConfig, connector: Arc<dyn Connector>) -> Self {
        let resolver = CandidateResolver::new(
            config.fallback_databases.clone(),
            config.scan_all_databases,
        );
        Self {
            config,
            pool: ConnectionPool::new(connector),
            resolver,
            failed: HashSet::new(),
        }
    }

    /// The configuration this runner uses.
    #[must_use]
    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// Traces `seeds` and returns everything discovered.
    ///
    /// Every connection opened during the run is closed before returning.
    pub async fn run(&mut self, seeds: &[SeedRecord]) -> LineageReport {
        let mut report = LineageReport::default();
        let mut emitted: HashSet<(Option<String>, ObjectKey, ObjectKey)> = HashSet::new();
        self.failed.clear();

        tracing::info!(seeds = seeds.len(), "seed phase started");
        for (index, seed) in seeds.iter().enumerate() {
            self.trace_seed(index + 1, seed, &mut report, &mut emitted).await;
        }

        tracing::info!(queued = report.catalog.len(), "expansion phase started");
        self.expand(&mut report).await;

        let close_failures = self.pool.close().await;
        if close_failures > 0 {
            tracing::warn!(close_failures, "some catalog connections did not close cleanly");
        }

        tracing::info!(
            objects = report.catalog.len(),
            edges = report.catalog.edges().len(),
            links = report.links.len(),
            failures = report.failures.len(),
            "run finished"
        );
        report
    }

    fn normalize(&self, seed: &SeedRecord) -> Result<NormalizedSeed, FailureRecord> {
        let trimmed = |value: Option<&str>| {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let server = trimmed(self.config.effective_server(seed.server.as_deref()));
        let database = trimmed(seed.database.as_deref());
        let schema = trimmed(seed.schema.as_deref()).unwrap_or_else(|| DEFAULT_SCHEMA.to_string());
        let table = trimmed(seed.table.as_deref());

        match (server, table) {
            (Some(server), Some(table)) => Ok(NormalizedSeed {
                file_id: trimmed(seed.file_id.as_deref()),
                file_path: trimmed(seed.file_path.as_deref()),
                server,
                database,
                schema,
                table,
            }),
            (server, table) => Err(FailureRecord::new(
                server.unwrap_or_default(),
                database.unwrap_or_default(),
                schema,
                table.unwrap_or_default(),
                FailureKind::Input,
                "missing server or table",
            )),
        }
    }

    async fn trace_seed(
        &mut self,
        row: usize,
        seed: &SeedRecord,
        report: &mut LineageReport,
        emitted: &mut HashSet<(Option<String>, ObjectKey, ObjectKey)>,
    ) {
        let seed = match self.normalize(seed) {
            Ok(seed) => seed,
            Err(failure) => {
                tracing::warn!(row, "seed skipped: missing server or table");
                report.failures.push(failure);
                return;
            }
        };
        tracing::info!(
            row,
            server = %seed.server,
            table = %format!("{}.{}", seed.schema, seed.table),
            "tracing seed"
        );

        let (database, source_type, strategy, objects) = match self.resolve_seed(&seed).await {
            SeedResolution::Found {
                database,
                source_type,
                strategy,
                objects,
            } => (database, source_type, strategy, objects),
            SeedResolution::Exhausted(failure) => {
                tracing::warn!(row, reason = %failure.reason, "seed not resolved");
                report.failures.push(failure);
                return;
            }
        };

        let context = RootContext {
            file_id: seed.file_id.clone(),
            file_path: seed.file_path.clone(),
            server: seed.server.clone(),
            database: database.clone(),
            schema: seed.schema.clone(),
            table: seed.table.clone(),
            source_type: source_type.clone(),
        };
        let seed_key = QualifiedName::new(&seed.server, &database, &seed.schema, &seed.table).key();

        for fetched in objects {
            let FetchedObject {
                mut object,
                dependency_error,
            } = fetched;
            if let Some(e) = dependency_error {
                let failure = object_failure(&object.name, &object.object_type, &e);
                self.record_failure(report, object.key(), failure);
            }
            resolve_external(&mut self.pool, &mut object).await;

            let motive = match strategy {
                SeedStrategy::FindReferrers => {
                    classify(object.definition.as_deref(), &seed.schema, &seed.table)
                }
                SeedStrategy::FetchObject => Motive::Unknown,
            };
            let key = object.key();
            let (_, stored) = report.catalog.register(object);

            if emitted.insert((context.file_id.clone(), seed_key.clone(), key.clone())) {
                report
                    .links
                    .push(ReportLink::new(context.clone(), stored, motive));
                report.roots.push(RootBinding {
                    context: context.clone(),
                    object: key,
                });
            }
        }
    }

    /// Tries each candidate database until one yields objects.
    async fn resolve_seed(&mut self, seed: &NormalizedSeed) -> SeedResolution {
        let candidates = self
            .resolver
            .candidates(&mut self.pool, &seed.server, seed.database.as_deref())
            .await;

        let failure = |kind: FailureKind, reason: String, source_type: Option<ObjectType>| {
            FailureRecord::new(
                &seed.server,
                seed.database.clone().unwrap_or_default(),
                &seed.schema,
                &seed.table,
                kind,
                reason,
            )
            .with_source_type(source_type)
        };

        if candidates.is_empty() {
            return SeedResolution::Exhausted(failure(
                FailureKind::Input,
                "no candidate database".to_string(),
                None,
            ));
        }

        let mut answered = false;
        let mut last_error: Option<(FailureKind, String)> = None;
        let mut last_source_type = None;

        for database in candidates {
            let Some(connection) = self.pool.get(&seed.server, &database).await else {
                last_error = Some((
                    FailureKind::Connectivity,
                    format!("cannot connect to {}/{database}", seed.server),
                ));
                continue;
            };

            let source_type =
                match detect_source_type(&mut *connection, &seed.schema, &seed.table).await {
                    Ok(source_type) => source_type,
                    Err(e) => {
                        tracing::debug!(database = %database, error = %e, "source type detection failed");
                        last_error = Some((e.failure_kind(), e.to_string()));
                        continue;
                    }
                };
            let strategy = SeedStrategy::for_source(source_type.as_ref());

            let found = match strategy {
                SeedStrategy::FindReferrers => {
                    referencing_objects(
                        &mut *connection,
                        &seed.server,
                        &database,
                        &seed.schema,
                        &seed.table,
                        ROOT_LEVEL,
                    )
                    .await
                }
                SeedStrategy::FetchObject => fetch_object(
                    &mut *connection,
                    &seed.server,
                    &database,
                    &seed.schema,
                    &seed.table,
                    ROOT_LEVEL,
                )
                .await
                .map(|object| object.into_iter().collect()),
            };

            match found {
                Ok(objects) if !objects.is_empty() => {
                    tracing::debug!(database = %database, count = objects.len(), "seed resolved");
                    return SeedResolution::Found {
                        database,
                        source_type,
                        strategy,
                        objects,
                    };
                }
                Ok(_) => {
                    answered = true;
                    last_source_type = source_type;
                }
                Err(e) => {
                    tracing::debug!(database = %database, error = %e, "seed lookup failed");
                    last_error = Some((e.failure_kind(), e.to_string()));
                    last_source_type = source_type;
                }
            }
        }

        let (kind, reason) = match last_error {
            Some(error) if !answered => error,
            _ => (FailureKind::NoResults, NO_OBJECT_FOUND.to_string()),
        };
        SeedResolution::Exhausted(failure(kind, reason, last_source_type))
    }

    async fn expand(&mut self, report: &mut LineageReport) {
        let mut processed: HashSet<ObjectKey> = HashSet::new();

        while let Some(key) = report.catalog.pop_pending() {
            if !processed.insert(key.clone()) {
                continue;
            }
            if let Err(failure) = self.ensure_dependencies(&mut report.catalog, &key).await {
                self.record_failure(report, key, failure);
                continue;
            }
            report.catalog.record_edges(&key);

            let Some(current) = report.catalog.get(&key) else {
                continue;
            };
            let next_level = current.level + 1;
            let pending: Vec<_> = current
                .dep_objects
                .iter()
                .filter(|dep| {
                    let target = dep.target.key();
                    !self.failed.contains(&target)
                        && !report.catalog.contains_at_or_below(&target, next_level)
                })
                .cloned()
                .collect();

            for dep in pending {
                let target = &dep.target;
                if self.failed.contains(&target.key()) {
                    continue;
                }
                let Some(connection) = self.pool.get(&target.server, &target.database).await else {
                    let failure = FailureRecord::new(
                        &target.server,
                        &target.database,
                        &target.schema,
                        &target.object,
                        FailureKind::Connectivity,
                        format!("cannot connect to {}/{}", target.server, target.database),
                    )
                    .with_source_type(Some(dep.object_type.clone()));
                    self.record_failure(report, target.key(), failure);
                    continue;
                };

                match fetch_object(
                    connection,
                    &target.server,
                    &target.database,
                    &target.schema,
                    &target.object,
                    next_level,
                )
                .await
                {
                    Ok(Some(fetched)) => {
                        let FetchedObject {
                            mut object,
                            dependency_error,
                        } = fetched;
                        if let Some(e) = dependency_error {
                            let failure = object_failure(&object.name, &object.object_type, &e);
                            self.record_failure(report, object.key(), failure);
                        }
                        resolve_external(&mut self.pool, &mut object).await;
                        report.catalog.register(object);
                    }
                    Ok(None) => {
                        tracing::debug!(target = %target, "dependency not found in its database");
                    }
                    Err(e) => {
                        tracing::warn!(target = %target, error = %e, "cannot fetch dependency");
                        let failure = object_failure(target, &dep.object_type, &e);
                        self.record_failure(report, target.key(), failure);
                    }
                }
            }
        }
    }

    /// Logs `failure` unless `key` has already failed this run.
    fn record_failure(&mut self, report: &mut LineageReport, key: ObjectKey, failure: FailureRecord) {
        if self.failed.insert(key) {
            report.failures.push(failure);
        }
    }

    /// Reads the dependencies of a stored object that does not have them yet.
    async fn ensure_dependencies(
        &mut self,
        catalog: &mut ObjectCatalog,
        key: &ObjectKey,
    ) -> Result<(), FailureRecord> {
        let Some(object) = catalog.get(key) else {
            return Ok(());
        };
        if object.dependencies_fetched || self.failed.contains(key) {
            return Ok(());
        }
        let Some(object_id) = object.object_id else {
            return Ok(());
        };
        let mut object = object.clone();

        let Some(connection) = self.pool.get(&object.name.server, &object.name.database).await
        else {
            return Err(FailureRecord::new(
                &object.name.server,
                &object.name.database,
                &object.name.schema,
                &object.name.object,
                FailureKind::Connectivity,
                format!(
                    "cannot connect to {}/{}",
                    object.name.server, object.name.database
                ),
            )
            .with_source_type(Some(object.object_type)));
        };

        let deps = object_dependencies(connection, &object.name, object_id)
            .await
            .map_err(|e| object_failure(&object.name, &object.object_type, &e))?;
        object.dep_tables = deps.tables;
        object.dep_objects = deps.objects;
        resolve_external(&mut self.pool, &mut object).await;
        catalog.set_dependencies(
            key,
            Dependencies {
                tables: object.dep_tables,
                objects: object.dep_objects,
            },
        );
        Ok(())
    }
}

fn object_failure(name: &QualifiedName, object_type: &ObjectType, error: &Error) -> FailureRecord {
    FailureRecord::new(
        &name.server,
        &name.database,
        &name.schema,
        &name.object,
        error.failure_kind(),
        error.to_string(),
    )
    .with_source_type(Some(object_type.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::memory::DatabaseState;
    use crate::source::{MemoryCatalog, MemoryConnector, MemoryObject};

    fn seed(server: Option<&str>, database: Option<&str>, table: Option<&str>) -> SeedRecord {
        SeedRecord {
            server: server.map(String::from),
            database: database.map(String::from),
            table: table.map(String::from),
            ..SeedRecord::default()
        }
    }

    fn runner(catalog: MemoryCatalog, config: TraceConfig) -> LineageRunner {
        LineageRunner::new(config, Arc::new(MemoryConnector::new(catalog)))
    }

    #[tokio::test]
    async fn missing_table_is_an_input_failure() {
        let mut runner = runner(MemoryCatalog::new(), TraceConfig::default());
        let report = runner.run(&[seed(Some("SrvA"), Some("DbA"), None)]).await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, FailureKind::Input);
        assert!(report.links.is_empty());
    }

    #[tokio::test]
    async fn server_override_fills_missing_server() {
        let mut catalog = MemoryCatalog::new();
        catalog
            .add_object("SrvA", "DbA", MemoryObject::table("dbo", "T"))
            .add_object("SrvA", "DbA", MemoryObject::view("dbo", "V").references("dbo", "T"));
        let config = TraceConfig {
            server_override: Some("SrvA".into()),
            ..TraceConfig::default()
        };

        let report = runner(catalog, config)
            .run(&[seed(None, Some("DbA"), Some("T"))])
            .await;

        assert!(report.failures.is_empty());
        assert_eq!(report.links.len(), 1);
        assert_eq!(report.links[0].root.server, "SrvA");
    }

    #[tokio::test]
    async fn seed_that_is_a_view_is_fetched_directly() {
        let mut catalog = MemoryCatalog::new();
        catalog
            .add_object("SrvA", "DbA", MemoryObject::table("dbo", "T"))
            .add_object("SrvA", "DbA", MemoryObject::view("dbo", "V").references("dbo", "T"))
            .add_object("SrvA", "DbA", MemoryObject::view("dbo", "W").references("dbo", "V"));

        let report = runner(catalog, TraceConfig::default())
            .run(&[seed(Some("SrvA"), Some("DbA"), Some("V"))])
            .await;

        assert_eq!(report.links.len(), 1);
        assert_eq!(report.links[0].object.object, "V");
        assert_eq!(report.links[0].motive, Motive::Unknown);
        assert_eq!(report.links[0].root.source_type, Some(ObjectType::View));
    }

    #[tokio::test]
    async fn unreachable_candidates_report_connectivity() {
        let mut catalog = MemoryCatalog::new();
        catalog.set_state("SrvA", "DbA", DatabaseState::Offline);

        let report = runner(catalog, TraceConfig::default())
            .run(&[seed(Some("SrvA"), Some("DbA"), Some("T"))])
            .await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, FailureKind::Connectivity);
    }

    #[tokio::test]
    async fn duplicate_seed_rows_report_once() {
        let mut catalog = MemoryCatalog::new();
        catalog
            .add_object("SrvA", "DbA", MemoryObject::table("dbo", "T"))
            .add_object("SrvA", "DbA", MemoryObject::view("dbo", "V").references("dbo", "T"));
        let row = seed(Some("SrvA"), Some("DbA"), Some("T"));

        let report = runner(catalog, TraceConfig::default())
            .run(&[row.clone(), row])
            .await;

        assert_eq!(report.links.len(), 1);
        assert_eq!(report.roots.len(), 1);
        assert_eq!(report.catalog.len(), 1);
    }
}
