//! Run configuration.
//!
//! Every knob of a trace run lives in [`TraceConfig`], loaded from YAML and
//! then overridden by command-line flags. Nothing is read from process-wide
//! state; the runner and resolver receive the config explicitly.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

use crate::error::{Error, Result};
use crate::source::mssql::{
    DEFAULT_CONNECTION_STRING, INTEGRATED_SECURITY_SUPPORTED, SqlLogin, USER_PLACEHOLDER,
    uses_integrated_security,
};

/// Default bounded wait when opening a connection, in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;

/// Default maximum depth of enumerated paths.
pub const DEFAULT_MAX_PATH_DEPTH: usize = 5;

/// Placeholder every connection-string template must contain.
const SERVER_PLACEHOLDER: &str = "{server}";

/// Environment variable read for the SQL login password.
pub const PASSWORD_ENV: &str = "LINEAGE_SQL_PASSWORD";

/// Configuration of one trace run.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct TraceConfig {
    /// Replaces the server of every seed when set.
    pub server_override: Option<String>,

    /// ADO connection-string templates with `{server}` and `{database}`,
    /// tried in order.
    pub connection_strings: Vec<String>,

    /// SQL login substituted into `{user}`.
    pub sql_user: Option<String>,

    /// SQL login password substituted into `{password}`. Never written back
    /// by [`TraceConfig::save`].
    #[serde(skip_serializing)]
    pub sql_password: Option<String>,

    /// Bounded wait when opening a connection.
    pub connect_timeout_secs: u64,

    /// Databases tried after a seed's own database hint, in order.
    pub fallback_databases: Vec<String>,

    /// Also try every online user database of the seed's server.
    pub scan_all_databases: bool,

    /// Maximum number of objects on one enumerated path.
    pub max_path_depth: usize,
}

impl std::fmt::Debug for TraceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceConfig")
            .field("server_override", &self.server_override)
            .field("connection_strings", &self.connection_strings)
            .field("sql_user", &self.sql_user)
            .field("sql_password", &self.sql_password.as_ref().map(|_| "<hidden>"))
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("fallback_databases", &self.fallback_databases)
            .field("scan_all_databases", &self.scan_all_databases)
            .field("max_path_depth", &self.max_path_depth)
            .finish()
    }
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            server_override: None,
            connection_strings: vec![DEFAULT_CONNECTION_STRING.to_string()],
            sql_user: None,
            sql_password: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            fallback_databases: Vec::new(),
            scan_all_databases: false,
            max_path_depth: DEFAULT_MAX_PATH_DEPTH,
        }
    }
}

impl TraceConfig {
    /// Loads configuration from a YAML file. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the file cannot be read or parsed, or
    /// when the result fails [`validate`](Self::validate).
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        let config: Self = serde_yaml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::Config(format!("YAML error: {e}")))?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Checks the values a run cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_secs == 0 {
            return Err(Error::Config(
                "connect-timeout-secs must be greater than zero".to_string(),
            ));
        }
        if self.max_path_depth == 0 {
            return Err(Error::Config(
                "max-path-depth must be greater than zero".to_string(),
            ));
        }
        if let Some(template) = self
            .connection_strings
            .iter()
            .find(|t| !t.contains(SERVER_PLACEHOLDER))
        {
            return Err(Error::Config(format!(
                "connection string template lacks {SERVER_PLACEHOLDER}: {template}"
            )));
        }
        if !INTEGRATED_SECURITY_SUPPORTED
            && self
                .connection_strings
                .iter()
                .any(|t| uses_integrated_security(t))
        {
            return Err(Error::Config(
                "integrated security is only supported on Windows; use a SQL login \
                 (sql-user and LINEAGE_SQL_PASSWORD) instead"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Checks that a live run has the login its templates ask for.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a template uses `{user}` and no
    /// `sql-user` is set.
    pub fn check_login(&self) -> Result<()> {
        let needs_user = self
            .connection_strings
            .iter()
            .any(|t| t.contains(USER_PLACEHOLDER));
        if needs_user && self.login().is_none() {
            return Err(Error::Config(format!(
                "connection string uses {USER_PLACEHOLDER} but no sql-user is configured"
            )));
        }
        Ok(())
    }

    /// The SQL login, when a user name is configured.
    #[must_use]
    pub fn login(&self) -> Option<SqlLogin> {
        let user = self.sql_user.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
        Some(SqlLogin {
            user: user.to_string(),
            password: self.sql_password.clone().unwrap_or_default(),
        })
    }

    /// Connect timeout as a duration.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// The server to use for a seed, honoring the override.
    #[must_use]
    pub fn effective_server<'a>(&'a self, seed_server: Option<&'a str>) -> Option<&'a str> {
        self.server_override
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or(seed_server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_documented_values() {
        let config = TraceConfig::default();
        assert_eq!(config.connect_timeout_secs, 15);
        assert_eq!(config.max_path_depth, 5);
        assert!(!config.scan_all_databases);
        assert_eq!(config.connection_strings.len(), 1);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn partial_yaml_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lineage.yaml");
        fs::write(
            &path,
            "fallback-databases: [Stage, Dwh]\nscan-all-databases: true\n",
        )
        .await
        .unwrap();

        let config = TraceConfig::load(&path).await.unwrap();

        assert_eq!(config.fallback_databases, vec!["Stage", "Dwh"]);
        assert!(config.scan_all_databases);
        assert_eq!(config.max_path_depth, DEFAULT_MAX_PATH_DEPTH);
    }

    #[tokio::test]
    async fn save_then_load_preserves_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lineage.yaml");
        let config = TraceConfig {
            server_override: Some("SQLPROD01".into()),
            max_path_depth: 3,
            ..TraceConfig::default()
        };

        config.save(&path).await.unwrap();
        let loaded = TraceConfig::load(&path).await.unwrap();

        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn invalid_yaml_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lineage.yaml");
        fs::write(&path, "max-path-depth: [nope").await.unwrap();

        let result = TraceConfig::load(&path).await;

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn validate_rejects_unusable_values() {
        let zero_depth = TraceConfig {
            max_path_depth: 0,
            ..TraceConfig::default()
        };
        assert!(zero_depth.validate().is_err());

        let no_placeholder = TraceConfig {
            connection_strings: vec!["server=tcp:fixed;database={database}".into()],
            ..TraceConfig::default()
        };
        assert!(no_placeholder.validate().is_err());
    }

    #[cfg(not(windows))]
    #[test]
    fn integrated_security_is_rejected_without_platform_support() {
        let config = TraceConfig {
            connection_strings: vec![
                "server=tcp:{server};database={database};IntegratedSecurity=true".into(),
            ],
            ..TraceConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn default_template_needs_a_sql_user() {
        assert!(matches!(TraceConfig::default().check_login(), Err(Error::Config(_))));

        let config = TraceConfig {
            sql_user: Some("svc_lineage".into()),
            sql_password: Some("pw".into()),
            ..TraceConfig::default()
        };
        assert!(config.check_login().is_ok());
        assert_eq!(config.login().map(|l| l.user), Some("svc_lineage".to_string()));
    }

    #[tokio::test]
    async fn password_is_never_saved() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lineage.yaml");
        let config = TraceConfig {
            sql_user: Some("svc_lineage".into()),
            sql_password: Some("s3cret".into()),
            ..TraceConfig::default()
        };

        config.save(&path).await.unwrap();
        let content = fs::read_to_string(&path).await.unwrap();

        assert!(content.contains("svc_lineage"));
        assert!(!content.contains("s3cret"));
        assert!(!format!("{config:?}").contains("s3cret"));
    }

    #[test]
    fn override_wins_over_seed_server() {
        let config = TraceConfig {
            server_override: Some("SQLPROD01".into()),
            ..TraceConfig::default()
        };
        assert_eq!(config.effective_server(Some("old")), Some("SQLPROD01"));
        assert_eq!(TraceConfig::default().effective_server(Some("old")), Some("old"));
        assert_eq!(TraceConfig::default().effective_server(None), None);
    }
}
