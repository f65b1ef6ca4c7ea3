//! Lazily opened, run-scoped connection cache.
//!
//! One connection per (server, database) pair, keyed case-insensitively.
//! Opening failures are logged and remembered for the rest of the run, so a
//! dead database is not retried for every object that lives in it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::source::{CatalogConnection, Connector};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PoolKey {
    server: String,
    database: String,
}

impl PoolKey {
    fn new(server: &str, database: &str) -> Self {
        Self {
            server: server.trim().to_lowercase(),
            database: database.trim().to_lowercase(),
        }
    }
}

/// Connection cache for one run.
pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    connections: HashMap<PoolKey, Box<dyn CatalogConnection>>,
    failed: HashSet<PoolKey>,
}

impl ConnectionPool {
    /// Creates an empty pool over `connector`.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            connections: HashMap::new(),
            failed: HashSet::new(),
        }
    }

    /// Returns the connection for (server, database), opening it on first use.
    ///
    /// Returns `None` for blank names or when the connection cannot be opened.
    /// Never returns an error: failures are logged here and the caller moves
    /// on to its next candidate.
    pub async fn get(
        &mut self,
        server: &str,
        database: &str,
    ) -> Option<&mut (dyn CatalogConnection + 'static)> {
        if server.trim().is_empty() || database.trim().is_empty() {
            return None;
        }
        let key = PoolKey::new(server, database);
        if self.failed.contains(&key) {
            return None;
        }
        if !self.connections.contains_key(&key) {
            match self.connector.connect(server.trim(), database.trim()).await {
                Ok(connection) => {
                    tracing::debug!(server, database, "opened catalog connection");
                    self.connections.insert(key.clone(), connection);
                }
                Err(e) => {
                    tracing::warn!(server, database, error = %e, "cannot open catalog connection");
                    self.failed.insert(key);
                    return None;
                }
            }
        }
        self.connections.get_mut(&key).map(|c| &mut **c)
    }

    /// Number of open connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns `true` when no connection is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Closes every cached connection exactly once.
    ///
    /// A failure closing one connection is logged and does not stop the
    /// others from being closed. Returns how many closes failed.
    pub async fn close(&mut self) -> usize {
        let mut failures = 0;
        for (key, connection) in self.connections.drain() {
            if let Err(e) = connection.close().await {
                failures += 1;
                tracing::warn!(
                    server = %key.server,
                    database = %key.database,
                    error = %e,
                    "error closing catalog connection"
                );
            }
        }
        self.failed.clear();
        failures
    }
}
