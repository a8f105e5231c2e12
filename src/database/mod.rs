//! Database access
//!
//! [`DatabaseManager`] owns the connected client for the lifetime of the
//! server and forwards the four tool operations to it. Backends implement
//! [`DatabaseClient`].

mod postgres;

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ConfigError, Settings};
use crate::error::{Error, Result};

pub use postgres::PostgresClient;

/// One result row: column name to value, in column order
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("unsupported database provider `{0}`")]
    UnsupportedProvider(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("database connection failed: {0}")]
    Connect(#[source] tokio_postgres::Error),

    #[error("query failed: {0}")]
    Query(#[from] tokio_postgres::Error),

    #[error("failed to decode column `{column}`: {source}")]
    Decode {
        column: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("not connected to the database")]
    NotConnected,

    /// Failure reported by a [`DatabaseClient`] implementation that is not
    /// backed by `tokio-postgres`
    #[error("{0}")]
    Other(String),
}

/// Supported database backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Postgres,
}

impl FromStr for Provider {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Provider::Postgres),
            _ => Err(DatabaseError::UnsupportedProvider(s.to_string())),
        }
    }
}

/// A connected database client.
///
/// Implementations must tolerate concurrent calls through `&self`.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    async fn execute_query(&self, query: &str) -> Result<Vec<Row>, DatabaseError>;

    async fn list_databases(&self) -> Result<Vec<Row>, DatabaseError>;

    async fn list_tables(&self, database: Option<&str>) -> Result<Vec<Row>, DatabaseError>;

    async fn describe_table(&self, table_name: &str) -> Result<Vec<Row>, DatabaseError>;

    /// Release the connection. Calling it more than once is a no-op.
    async fn close(&self);
}

/// Lifecycle owner for the database client
#[derive(Clone)]
pub struct DatabaseManager {
    client: Arc<dyn DatabaseClient>,
    read_only: bool,
}

impl DatabaseManager {
    /// Connect to the database described by `settings`
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let provider: Provider = settings.db_provider.parse()?;
        tracing::info!(
            ?provider,
            host = %settings.db_host,
            port = %settings.db_port,
            database = %settings.db_name,
            "Connecting to database"
        );

        let client: Arc<dyn DatabaseClient> = match provider {
            Provider::Postgres => Arc::new(PostgresClient::connect(settings).await?),
        };

        tracing::info!("Database connection established");
        Ok(Self::with_client(client, settings.read_only))
    }

    /// Wrap an already connected client
    pub fn with_client(client: Arc<dyn DatabaseClient>, read_only: bool) -> Self {
        Self { client, read_only }
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub async fn disconnect(&self) {
        self.client.close().await;
        tracing::info!("Database connection closed");
    }

    pub async fn execute_query(&self, query: &str) -> Result<Vec<Row>> {
        if self.read_only && !is_row_returning(query) {
            tracing::warn!("Rejected write statement in read-only mode");
            return Err(Error::ReadOnly);
        }
        Ok(self.client.execute_query(query).await?)
    }

    pub async fn list_databases(&self) -> Result<Vec<Row>> {
        Ok(self.client.list_databases().await?)
    }

    pub async fn list_tables(&self, database: Option<&str>) -> Result<Vec<Row>> {
        Ok(self.client.list_tables(database).await?)
    }

    pub async fn describe_table(&self, table_name: &str) -> Result<Vec<Row>> {
        Ok(self.client.describe_table(table_name).await?)
    }
}

/// Whether a statement only reads: it produces a result set and does not
/// modify data. `EXPLAIN ANALYZE` executes the statement it explains, so that
/// statement is checked too.
///
/// This is a keyword check used to reject writes early in read-only mode;
/// the database session itself is also opened read-only.
pub fn is_row_returning(query: &str) -> bool {
    const PREFIXES: [&str; 5] = ["SELECT", "WITH", "SHOW", "VALUES", "TABLE"];

    let (keyword, rest) = leading_keyword(query);
    if keyword == "EXPLAIN" {
        let (analyze, explained) = explain_target(rest);
        return !analyze || is_row_returning(explained);
    }
    PREFIXES.contains(&keyword.as_str())
}

/// Split off the first keyword (uppercased), skipping whitespace and `(`
fn leading_keyword(sql: &str) -> (String, &str) {
    let stmt = sql.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
    let end = stmt
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(stmt.len());
    (stmt[..end].to_ascii_uppercase(), &stmt[end..])
}

/// For the text after `EXPLAIN`: whether ANALYZE is requested, and the
/// statement being explained
fn explain_target(rest: &str) -> (bool, &str) {
    let mut rest = rest.trim_start();
    let mut analyze = false;

    if let Some(options) = rest.strip_prefix('(') {
        let end = options.find(')').unwrap_or(options.len());
        analyze = options[..end]
            .split(|c: char| !c.is_ascii_alphabetic())
            .any(|word| word.eq_ignore_ascii_case("ANALYZE") || word.eq_ignore_ascii_case("ANALYSE"));
        rest = options.get(end + 1..).unwrap_or("");
    }

    loop {
        let (word, tail) = leading_keyword(rest);
        match word.as_str() {
            "ANALYZE" | "ANALYSE" => analyze = true,
            "VERBOSE" => {}
            _ => return (analyze, rest),
        }
        rest = tail;
    }
}
