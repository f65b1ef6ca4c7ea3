//! SQL Server catalog backend over TDS.
//!
//! Connections are opened from ADO-style connection-string templates in
//! which `{server}`, `{database}`, `{user}` and `{password}` are
//! substituted. Templates are tried in order until one connects; each
//! attempt is bounded by the connect timeout.
//!
//! Integrated security is only available on Windows builds (`winauth`). On
//! other platforms tiberius would silently turn `IntegratedSecurity=true`
//! into an empty SQL login, so such templates are rejected up front.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tiberius::{Client, Config, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use super::{CatalogConnection, CatalogObject, Connector, ReferencedEntity};
use crate::error::{Error, Result};

/// Connection-string template used when none is configured.
pub const DEFAULT_CONNECTION_STRING: &str = "server=tcp:{server};database={database};user id={user};password={password};TrustServerCertificate=true";

/// Placeholder for the SQL login name.
pub const USER_PLACEHOLDER: &str = "{user}";

/// Placeholder for the SQL login password.
pub const PASSWORD_PLACEHOLDER: &str = "{password}";

/// Whether this build can authenticate with `IntegratedSecurity`.
pub const INTEGRATED_SECURITY_SUPPORTED: bool = cfg!(windows);

/// Server error numbers that signal missing rights.
const PERMISSION_ERRORS: &[u32] = &[229, 230, 297, 300];

const OBJECT_TYPE_SQL: &str = "\
SELECT TOP 1 o.type_desc
FROM sys.objects AS o
WHERE SCHEMA_NAME(o.schema_id) = @P1 AND o.name = @P2 AND o.is_ms_shipped = 0";

const FIND_OBJECT_SQL: &str = "\
SELECT TOP 1 CAST(o.object_id AS bigint), SCHEMA_NAME(o.schema_id), o.name, o.type_desc,
       OBJECT_DEFINITION(o.object_id)
FROM sys.objects AS o
WHERE SCHEMA_NAME(o.schema_id) = @P1 AND o.name = @P2 AND o.is_ms_shipped = 0";

const REFERENCING_SQL: &str = "\
SELECT CAST(o.object_id AS bigint), SCHEMA_NAME(o.schema_id), o.name, o.type_desc,
       OBJECT_DEFINITION(o.object_id)
FROM sys.objects AS o
WHERE o.object_id IN (
        SELECT d.referencing_id
        FROM sys.sql_expression_dependencies AS d
        WHERE ISNULL(d.referenced_schema_name, N'dbo') = @P1
          AND d.referenced_entity_name = @P2)
  AND o.is_ms_shipped = 0
  AND o.type_desc IN (N'VIEW', N'SQL_STORED_PROCEDURE', N'SQL_SCALAR_FUNCTION',
                      N'SQL_TABLE_VALUED_FUNCTION', N'SQL_INLINE_TABLE_VALUED_FUNCTION',
                      N'SQL_TRIGGER')
ORDER BY SCHEMA_NAME(o.schema_id), o.name";

const EXPRESSION_DEPENDENCIES_SQL: &str = "\
SELECT d.referenced_server_name, d.referenced_database_name, d.referenced_schema_name,
       d.referenced_entity_name, o.type_desc, d.referenced_class_desc
FROM sys.sql_expression_dependencies AS d
LEFT JOIN sys.objects AS o ON o.object_id = d.referenced_id
WHERE d.referencing_id = @P1";

const REFERENCED_ENTITIES_SQL: &str = "\
DECLARE @name nvarchar(776) =
    QUOTENAME(OBJECT_SCHEMA_NAME(@P1)) + N'.' + QUOTENAME(OBJECT_NAME(@P1));
SELECT re.referenced_server_name, re.referenced_database_name, re.referenced_schema_name,
       re.referenced_entity_name, o.type_desc, re.referenced_class_desc
FROM sys.dm_sql_referenced_entities(@name, N'OBJECT') AS re
LEFT JOIN sys.objects AS o ON o.object_id = re.referenced_id
WHERE re.referenced_minor_id = 0";

const ONLINE_DATABASES_SQL: &str = "\
SELECT name
FROM sys.databases
WHERE database_id > 4 AND state_desc = N'ONLINE' AND HAS_DBACCESS(name) = 1
ORDER BY name";

type TdsClient = Client<Compat<TcpStream>>;

/// SQL Server login substituted into `{user}` and `{password}`.
#[derive(Clone, PartialEq, Eq)]
pub struct SqlLogin {
    /// Login name.
    pub user: String,
    /// Login password.
    pub password: String,
}

impl fmt::Debug for SqlLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlLogin")
            .field("user", &self.user)
            .field("password", &"<hidden>")
            .finish()
    }
}

/// Returns `true` when `template` asks for Windows integrated security.
#[must_use]
pub fn uses_integrated_security(template: &str) -> bool {
    template.split(';').any(|pair| {
        let Some((key, value)) = pair.split_once('=') else {
            return false;
        };
        let key: String = key.chars().filter(|c| !c.is_whitespace()).collect();
        let value = value.trim();
        (key.eq_ignore_ascii_case("integratedsecurity")
            || key.eq_ignore_ascii_case("trusted_connection"))
            && (value.eq_ignore_ascii_case("true")
                || value.eq_ignore_ascii_case("yes")
                || value.eq_ignore_ascii_case("sspi"))
    })
}

/// Quotes an ADO value when it contains characters the parser splits on.
fn ado_value(value: &str) -> String {
    if value.contains([';', '\'', '"', '{', '}']) || value.trim() != value {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Substitutes every placeholder of `template`.
#[must_use]
pub fn render_template(
    template: &str,
    server: &str,
    database: &str,
    login: Option<&SqlLogin>,
) -> String {
    let (user, password) = login.map_or((String::new(), String::new()), |login| {
        (ado_value(&login.user), ado_value(&login.password))
    });
    template
        .replace("{server}", server)
        .replace("{database}", database)
        .replace(USER_PLACEHOLDER, &user)
        .replace(PASSWORD_PLACEHOLDER, &password)
}

/// Opens TDS connections to SQL Server.
#[derive(Debug, Clone)]
pub struct MssqlConnector {
    connection_strings: Vec<String>,
    login: Option<SqlLogin>,
    timeout: Duration,
}

impl MssqlConnector {
    /// Creates a connector trying `connection_strings` in order.
    ///
    /// An empty list falls back to [`DEFAULT_CONNECTION_STRING`].
    #[must_use]
    pub fn new(
        connection_strings: Vec<String>,
        login: Option<SqlLogin>,
        timeout: Duration,
    ) -> Self {
        let connection_strings = if connection_strings.is_empty() {
            vec![DEFAULT_CONNECTION_STRING.to_string()]
        } else {
            connection_strings
        };
        Self {
            connection_strings,
            login,
            timeout,
        }
    }

    async fn open(ado: &str) -> std::result::Result<TdsClient, String> {
        let config = Config::from_ado_string(ado).map_err(|e| e.to_string())?;
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| e.to_string())?;
        tcp.set_nodelay(true).map_err(|e| e.to_string())?;
        Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| e.to_string())
    }
}

#[async_trait]
impl Connector for MssqlConnector {
    async fn connect(&self, server: &str, database: &str) -> Result<Box<dyn CatalogConnection>> {
        let mut last_error = String::from("no connection string configured");
        for (attempt, template) in self.connection_strings.iter().enumerate() {
            let ado = render_template(template, server, database, self.login.as_ref());
            match tokio::time::timeout(self.timeout, Self::open(&ado)).await {
                Ok(Ok(client)) => {
                    tracing::debug!(server, database, attempt, "connected");
                    return Ok(Box::new(MssqlConnection { client }));
                }
                Ok(Err(message)) => last_error = message,
                Err(_) => {
                    last_error = format!("timed out after {}s", self.timeout.as_secs());
                }
            }
            tracing::debug!(server, database, attempt, error = %last_error, "connection attempt failed");
        }
        Err(Error::Connection {
            server: server.to_string(),
            database: database.to_string(),
            message: last_error,
        })
    }
}

struct MssqlConnection {
    client: TdsClient,
}

fn query_error(error: tiberius::error::Error) -> Error {
    match &error {
        tiberius::error::Error::Server(token) if PERMISSION_ERRORS.contains(&token.code()) => {
            Error::Permission(token.message().to_string())
        }
        _ => Error::from_query_message(error.to_string()),
    }
}

fn text(row: &Row, index: usize) -> Result<Option<String>> {
    row.try_get::<&str, _>(index)
        .map(|value| value.map(str::to_string))
        .map_err(query_error)
}

fn required_text(row: &Row, index: usize) -> Result<String> {
    text(row, index)?.ok_or_else(|| Error::Query(format!("unexpected NULL in column {index}")))
}

fn catalog_object(row: &Row) -> Result<CatalogObject> {
    let object_id = row
        .try_get::<i64, _>(0)
        .map_err(query_error)?
        .ok_or_else(|| Error::Query("unexpected NULL object_id".to_string()))?;
    Ok(CatalogObject {
        object_id,
        schema: required_text(row, 1)?,
        name: required_text(row, 2)?,
        type_desc: required_text(row, 3)?,
        definition: text(row, 4)?,
    })
}

fn referenced_entity(row: &Row) -> Result<ReferencedEntity> {
    Ok(ReferencedEntity {
        server: text(row, 0)?,
        database: text(row, 1)?,
        schema: text(row, 2)?,
        name: required_text(row, 3)?,
        type_desc: text(row, 4)?,
        class_desc: text(row, 5)?,
    })
}

impl MssqlConnection {
    async fn rows(
        &mut self,
        sql: &str,
        params: &[&dyn tiberius::ToSql],
    ) -> Result<Vec<Row>> {
        let stream = self.client.query(sql, params).await.map_err(query_error)?;
        stream.into_first_result().await.map_err(query_error)
    }
}

#[async_trait]
impl CatalogConnection for MssqlConnection {
    async fn object_type(&mut self, schema: &str, name: &str) -> Result<Option<String>> {
        let rows = self.rows(OBJECT_TYPE_SQL, &[&schema, &name]).await?;
        match rows.first() {
            Some(row) => text(row, 0),
            None => Ok(None),
        }
    }

    async fn find_object(&mut self, schema: &str, name: &str) -> Result<Option<CatalogObject>> {
        let rows = self.rows(FIND_OBJECT_SQL, &[&schema, &name]).await?;
        rows.first().map(catalog_object).transpose()
    }

    async fn referencing_objects(
        &mut self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<CatalogObject>> {
        let rows = self.rows(REFERENCING_SQL, &[&schema, &table]).await?;
        rows.iter().map(catalog_object).collect()
    }

    async fn expression_dependencies(&mut self, object_id: i64) -> Result<Vec<ReferencedEntity>> {
        let rows = self.rows(EXPRESSION_DEPENDENCIES_SQL, &[&object_id]).await?;
        rows.iter().map(referenced_entity).collect()
    }

    async fn referenced_entities(&mut self, object_id: i64) -> Result<Vec<ReferencedEntity>> {
        let rows = self.rows(REFERENCED_ENTITIES_SQL, &[&object_id]).await?;
        rows.iter().map(referenced_entity).collect()
    }

    async fn online_databases(&mut self) -> Result<Vec<String>> {
        let rows = self.rows(ONLINE_DATABASES_SQL, &[]).await?;
        rows.iter().map(|row| required_text(row, 0)).collect()
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.client.close().await.map_err(query_error)
    }
}
