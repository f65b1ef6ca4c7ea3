//! Candidate database ordering for a seed.
//!
//! A seed's database column is only a hint. The resolver turns it into an
//! ordered, deduplicated list: the hint, then the configured fallbacks, then
//! (with scan-all) every online user database of the server.

use std::collections::{HashMap, HashSet};

use crate::pool::ConnectionPool;

/// Database used to enumerate a server's databases.
const ENUMERATION_DATABASE: &str = "master";

/// Produces candidate databases for seeds.
#[derive(Debug, Default)]
pub struct CandidateResolver {
    fallback: Vec<String>,
    scan_all: bool,
    /// Online databases per lower-cased server, enumerated once per run.
    online: HashMap<String, Vec<String>>,
}

impl CandidateResolver {
    /// Creates a resolver with a fallback list and scan-all toggle.
    #[must_use]
    pub fn new(fallback: Vec<String>, scan_all: bool) -> Self {
        Self {
            fallback,
            scan_all,
            online: HashMap::new(),
        }
    }

    /// Ordered, case-insensitively deduplicated candidates for `server`.
    ///
    /// Blank names never appear. If enumeration fails the scan-all step
    /// contributes nothing, and an empty list is cached for the server.
    pub async fn candidates(
        &mut self,
        pool: &mut ConnectionPool,
        server: &str,
        hint: Option<&str>,
    ) -> Vec<String> {
        let mut ordered = Vec::new();
        let mut seen = HashSet::new();
        let mut push = |name: &str| {
            let name = name.trim();
            if !name.is_empty() && seen.insert(name.to_lowercase()) {
                ordered.push(name.to_string());
            }
        };

        if let Some(hint) = hint {
            push(hint);
        }
        for name in &self.fallback {
            push(name);
        }
        if self.scan_all {
            for name in self.online_databases(pool, server).await {
                push(name);
            }
        }
        ordered
    }

    async fn online_databases(&mut self, pool: &mut ConnectionPool, server: &str) -> &[String] {
        let key = server.trim().to_lowercase();
        if !self.online.contains_key(&key) {
            let names = match pool.get(server, ENUMERATION_DATABASE).await {
                Some(connection) => match connection.online_databases().await {
                    Ok(names) => names,
                    Err(e) => {
                        tracing::warn!(server, error = %e, "cannot enumerate online databases");
                        Vec::new()
                    }
                },
                None => Vec::new(),
            };
            tracing::debug!(server, count = names.len(), "enumerated online databases");
            self.online.insert(key.clone(), names);
        }
        self.online.get(&key).map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::memory::{ConnectionStats, DatabaseState};
    use crate::source::{MemoryCatalog, MemoryConnector, MemoryObject};
    use std::sync::Arc;

    fn pool_with(catalog: MemoryCatalog) -> (ConnectionPool, Arc<ConnectionStats>) {
        let connector = MemoryConnector::new(catalog);
        let stats = connector.stats();
        (ConnectionPool::new(Arc::new(connector)), stats)
    }

    fn server_with(databases: &[&str]) -> MemoryCatalog {
        let mut catalog = MemoryCatalog::new();
        for db in databases {
            catalog.add_object("SrvA", db, MemoryObject::table("dbo", "T"));
        }
        catalog
    }

    #[tokio::test]
    async fn hint_comes_first_then_fallbacks() {
        let (mut pool, _) = pool_with(server_with(&["DbA"]));
        let mut resolver = CandidateResolver::new(vec!["Stage".into(), "Dwh".into()], false);

        let candidates = resolver.candidates(&mut pool, "SrvA", Some("DbA")).await;

        assert_eq!(candidates, vec!["DbA", "Stage", "Dwh"]);
    }

    #[tokio::test]
    async fn duplicates_and_blanks_are_dropped() {
        let (mut pool, _) = pool_with(server_with(&["DbA"]));
        let mut resolver =
            CandidateResolver::new(vec!["dba".into(), "  ".into(), "Stage".into(), "STAGE".into()], false);

        let candidates = resolver.candidates(&mut pool, "SrvA", Some(" DbA ")).await;

        assert_eq!(candidates, vec!["DbA", "Stage"]);
    }

    #[tokio::test]
    async fn missing_hint_starts_with_fallbacks() {
        let (mut pool, _) = pool_with(server_with(&["DbA"]));
        let mut resolver = CandidateResolver::new(vec!["Stage".into()], false);

        assert_eq!(resolver.candidates(&mut pool, "SrvA", None).await, vec!["Stage"]);
        assert_eq!(resolver.candidates(&mut pool, "SrvA", Some("")).await, vec!["Stage"]);
    }

    #[tokio::test]
    async fn scan_all_appends_online_databases_once_per_server() {
        let mut catalog = server_with(&["Alpha", "Beta", "Gamma"]);
        catalog.set_state("SrvA", "Gamma", DatabaseState::Offline);
        let (mut pool, stats) = pool_with(catalog);
        let mut resolver = CandidateResolver::new(vec!["Beta".into()], true);

        let first = resolver.candidates(&mut pool, "SrvA", Some("Zeta")).await;
        let attempts_after_first = stats.attempts();
        let second = resolver.candidates(&mut pool, "srva", None).await;

        assert_eq!(first, vec!["Zeta", "Beta", "Alpha"]);
        assert_eq!(second, vec!["Beta", "Alpha"]);
        assert_eq!(stats.attempts(), attempts_after_first, "enumeration is cached");
    }

    #[tokio::test]
    async fn unreachable_server_contributes_no_scanned_databases() {
        let (mut pool, _) = pool_with(server_with(&["DbA"]));
        let mut resolver = CandidateResolver::new(Vec::new(), true);

        let candidates = resolver.candidates(&mut pool, "Elsewhere", Some("DbX")).await;

        assert_eq!(candidates, vec!["DbX"]);
    }
}
