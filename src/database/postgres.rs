use std::error::Error as StdError;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_postgres::types::{FromSql, ToSql, Type};
use tokio_postgres::{Client, NoTls};

use super::{DatabaseClient, DatabaseError, Row};
use crate::config::{self, parse_var, ConfigError, Settings};

const APPLICATION_NAME: &str = "sql-mcp-server";
const READ_ONLY_OPTIONS: &str = "-c default_transaction_read_only=on";

/// PostgreSQL backend on a single pipelined `tokio_postgres::Client`
pub struct PostgresClient {
    client: RwLock<Option<Client>>,
}

impl PostgresClient {
    pub async fn connect(settings: &Settings) -> Result<Self, DatabaseError> {
        let pg = pg_config(settings)?;
        let (client, connection) = pg.connect(NoTls).await.map_err(DatabaseError::Connect)?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("Connection error: {}", e);
            }
        });

        Ok(Self {
            client: RwLock::new(Some(client)),
        })
    }

    async fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, DatabaseError> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or(DatabaseError::NotConnected)?;
        let rows = client.query(sql, params).await?;
        rows.iter().map(row_to_json).collect()
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    async fn execute_query(&self, query: &str) -> Result<Vec<Row>, DatabaseError> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or(DatabaseError::NotConnected)?;

        // Statements with a result description (SELECT, ... RETURNING) yield rows
        let stmt = client.prepare(query).await?;
        if !stmt.columns().is_empty() {
            let rows = client.query(&stmt, &[]).await?;
            return rows.iter().map(row_to_json).collect();
        }

        let rows_affected = client.execute(&stmt, &[]).await?;
        let mut row = Row::new();
        row.insert("rows_affected".to_string(), serde_json::json!(rows_affected));
        Ok(vec![row])
    }

    async fn list_databases(&self) -> Result<Vec<Row>, DatabaseError> {
        self.query(
            "SELECT datname AS database
             FROM pg_database
             WHERE datistemplate = false
             ORDER BY datname",
            &[],
        )
        .await
    }

    async fn list_tables(&self, database: Option<&str>) -> Result<Vec<Row>, DatabaseError> {
        const BASE: &str = "SELECT table_catalog AS database, table_schema AS schema,
                    table_name, table_type
             FROM information_schema.tables
             WHERE table_schema NOT IN ('pg_catalog', 'information_schema')";

        match database {
            Some(db) => {
                let sql = format!("{BASE} AND table_catalog = $1 ORDER BY table_schema, table_name");
                self.query(&sql, &[&db]).await
            }
            None => {
                let sql = format!("{BASE} ORDER BY table_schema, table_name");
                self.query(&sql, &[]).await
            }
        }
    }

    async fn describe_table(&self, table_name: &str) -> Result<Vec<Row>, DatabaseError> {
        const BASE: &str = "SELECT table_schema AS schema, column_name, data_type,
                    is_nullable, column_default, ordinal_position
             FROM information_schema.columns
             WHERE table_schema NOT IN ('pg_catalog', 'information_schema')";

        match table_name.split_once('.') {
            Some((schema, table)) => {
                let sql = format!(
                    "{BASE} AND table_schema = $1 AND table_name = $2 ORDER BY ordinal_position"
                );
                self.query(&sql, &[&schema, &table]).await
            }
            None => {
                let sql =
                    format!("{BASE} AND table_name = $1 ORDER BY table_schema, ordinal_position");
                self.query(&sql, &[&table_name]).await
            }
        }
    }

    async fn close(&self) {
        // Dropping the client ends the spawned connection task
        self.client.write().await.take();
    }
}

fn pg_config(settings: &Settings) -> Result<tokio_postgres::Config, DatabaseError> {
    let (min, max) = pool_bounds(settings)?;
    tracing::debug!(min, max, "Pool bounds");

    let mut pg = tokio_postgres::Config::new();
    pg.host(&settings.db_host)
        .port(parse_var(config::DATABASE_PORT, &settings.db_port)?)
        .user(&settings.db_user)
        .dbname(&settings.db_name)
        .application_name(APPLICATION_NAME);
    if let Some(password) = &settings.db_password {
        pg.password(password);
    }
    if settings.read_only {
        pg.options(READ_ONLY_OPTIONS);
    }
    Ok(pg)
}

fn pool_bounds(settings: &Settings) -> Result<(u32, u32), ConfigError> {
    let min: u32 = parse_var(config::DATABASE_MIN_POOL_SIZE, &settings.db_min_pool_size)?;
    let max: u32 = parse_var(config::DATABASE_MAX_POOL_SIZE, &settings.db_max_pool_size)?;

    if min == 0 {
        return Err(ConfigError::Invalid {
            name: config::DATABASE_MIN_POOL_SIZE,
            value: settings.db_min_pool_size.clone(),
            reason: "must be at least 1".to_string(),
        });
    }
    if min > max {
        return Err(ConfigError::Invalid {
            name: config::DATABASE_MAX_POOL_SIZE,
            value: settings.db_max_pool_size.clone(),
            reason: format!("must not be smaller than {}", config::DATABASE_MIN_POOL_SIZE),
        });
    }
    Ok((min, max))
}

fn row_to_json(row: &tokio_postgres::Row) -> Result<Row, DatabaseError> {
    let mut map = Row::new();

    for (idx, column) in row.columns().iter().enumerate() {
        let JsonCell(value) = row.try_get::<_, JsonCell>(idx).map_err(|source| DatabaseError::Decode {
            column: column.name().to_string(),
            source,
        })?;
        map.insert(column.name().to_string(), value);
    }

    Ok(map)
}

/// A single column value decoded straight into JSON.
///
/// `numeric` is rendered as a string to keep its exact precision; dates and
/// times use ISO 8601. Types without a mapping fail to decode rather than
/// turning into `null`.
struct JsonCell(Value);

impl<'a> FromSql<'a> for JsonCell {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        let value = match *ty {
            Type::BOOL => Value::from(bool::from_sql(ty, raw)?),
            Type::INT2 => Value::from(i16::from_sql(ty, raw)?),
            Type::INT4 => Value::from(i32::from_sql(ty, raw)?),
            Type::INT8 => Value::from(i64::from_sql(ty, raw)?),
            Type::OID => Value::from(u32::from_sql(ty, raw)?),
            Type::FLOAT4 => Value::from(f32::from_sql(ty, raw)?),
            Type::FLOAT8 => Value::from(f64::from_sql(ty, raw)?),
            Type::NUMERIC => Value::String(Decimal::from_sql(ty, raw)?.to_string()),
            Type::JSON | Type::JSONB => Value::from_sql(ty, raw)?,
            Type::DATE => Value::String(NaiveDate::from_sql(ty, raw)?.to_string()),
            Type::TIME => Value::String(NaiveTime::from_sql(ty, raw)?.to_string()),
            Type::TIMESTAMP => Value::String(
                NaiveDateTime::from_sql(ty, raw)?
                    .format("%Y-%m-%dT%H:%M:%S%.f")
                    .to_string(),
            ),
            Type::TIMESTAMPTZ => Value::String(DateTime::<Utc>::from_sql(ty, raw)?.to_rfc3339()),
            Type::UUID => Value::String(uuid::Uuid::from_sql(ty, raw)?.to_string()),
            Type::BYTEA => {
                let bytes = <&[u8]>::from_sql(ty, raw)?;
                let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
                Value::String(format!("\\x{}", hex))
            }
            _ if <&str as FromSql>::accepts(ty) => Value::from(<&str>::from_sql(ty, raw)?),
            _ => {
                return Err(format!(
                    "unsupported column type `{}`; cast it to text in the query",
                    ty.name()
                )
                .into())
            }
        };
        Ok(JsonCell(value))
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        Ok(JsonCell(Value::Null))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(min: &str, max: &str) -> Settings {
        Settings::from_lookup(|name| match name {
            config::DATABASE_MIN_POOL_SIZE => Some(min.to_string()),
            config::DATABASE_MAX_POOL_SIZE => Some(max.to_string()),
            config::DATABASE_PORT => Some("5432".to_string()),
            config::DATABASE_PASSWORD
            | config::HTTP_HOST
            | config::HTTP_PORT
            | config::DATABASE_READ_ONLY
            | config::MCP_TRANSPORT => None,
            _ => Some("x".to_string()),
        })
        .unwrap()
    }

    fn decode(ty: &Type, raw: &[u8]) -> Value {
        JsonCell::from_sql(ty, raw).unwrap().0
    }

    #[test]
    fn test_pool_bounds() {
        assert_eq!(pool_bounds(&settings("2", "8")).unwrap(), (2, 8));
        assert_eq!(pool_bounds(&settings("4", "4")).unwrap(), (4, 4));
    }

    #[test]
    fn test_pool_bounds_rejects_bad_values() {
        assert!(matches!(
            pool_bounds(&settings("0", "8")),
            Err(ConfigError::Invalid { name: config::DATABASE_MIN_POOL_SIZE, .. })
        ));
        assert!(matches!(
            pool_bounds(&settings("9", "8")),
            Err(ConfigError::Invalid { name: config::DATABASE_MAX_POOL_SIZE, .. })
        ));
        assert!(matches!(
            pool_bounds(&settings("two", "8")),
            Err(ConfigError::Invalid { name: config::DATABASE_MIN_POOL_SIZE, .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_port_fails_before_connecting() {
        let mut settings = settings("1", "2");
        settings.db_port = "not-a-port".to_string();

        let result = PostgresClient::connect(&settings).await;
        assert!(matches!(
            result,
            Err(DatabaseError::Config(ConfigError::Invalid { name: config::DATABASE_PORT, .. }))
        ));
    }

    #[test]
    fn test_read_only_session_option() {
        let mut settings = settings("1", "2");
        assert_eq!(pg_config(&settings).unwrap().get_options(), None);

        settings.read_only = true;
        assert_eq!(
            pg_config(&settings).unwrap().get_options(),
            Some("-c default_transaction_read_only=on")
        );
    }

    #[test]
    fn test_decode_scalars() {
        assert_eq!(decode(&Type::BOOL, &[1]), json!(true));
        assert_eq!(decode(&Type::INT4, &42i32.to_be_bytes()), json!(42));
        assert_eq!(decode(&Type::INT8, &(-7i64).to_be_bytes()), json!(-7));
        assert_eq!(decode(&Type::FLOAT8, &2.5f64.to_be_bytes()), json!(2.5));
        assert_eq!(decode(&Type::TEXT, b"hello"), json!("hello"));
        assert_eq!(decode(&Type::VARCHAR, b"world"), json!("world"));
    }

    #[test]
    fn test_decode_null() {
        let cell = JsonCell::from_sql_nullable(&Type::NUMERIC, None).unwrap();
        assert_eq!(cell.0, Value::Null);
    }

    #[test]
    fn test_decode_numeric() {
        // 1.5: two base-10000 digits [1, 5000], weight 0, positive, scale 1
        let raw = [0, 2, 0, 0, 0, 0, 0, 1, 0, 1, 0x13, 0x88];
        assert_eq!(decode(&Type::NUMERIC, &raw), json!("1.5"));
    }

    #[test]
    fn test_decode_date() {
        // days since 2000-01-01
        assert_eq!(decode(&Type::DATE, &8767i32.to_be_bytes()), json!("2024-01-02"));
    }

    #[test]
    fn test_decode_timestamps() {
        // microseconds since 2000-01-01 00:00:00 for 2024-01-02 03:04:05
        let raw = 757_479_845_000_000i64.to_be_bytes();
        assert_eq!(decode(&Type::TIMESTAMP, &raw), json!("2024-01-02T03:04:05"));
        assert_eq!(
            decode(&Type::TIMESTAMPTZ, &raw),
            json!("2024-01-02T03:04:05+00:00")
        );
    }

    #[test]
    fn test_decode_uuid() {
        let raw: Vec<u8> = (0u8..16).collect();
        assert_eq!(
            decode(&Type::UUID, &raw),
            json!("00010203-0405-0607-0809-0a0b0c0d0e0f")
        );
    }

    #[test]
    fn test_decode_bytea() {
        assert_eq!(decode(&Type::BYTEA, &[0xde, 0xad]), json!("\\xdead"));
    }

    #[test]
    fn test_unsupported_type_is_an_error() {
        let err = JsonCell::from_sql(&Type::INET, &[2, 32, 0, 4, 127, 0, 0, 1])
            .err()
            .unwrap();
        assert!(err.to_string().contains("inet"));
    }

    // The tests below need a reachable PostgreSQL configured through the
    // usual DATABASE_* variables: `cargo test -- --ignored`.

    async fn live_client(read_only: bool) -> PostgresClient {
        let mut settings = Settings::from_env().unwrap();
        settings.read_only = read_only;
        PostgresClient::connect(&settings).await.unwrap()
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL"]
    async fn test_live_returning_clause_yields_rows() {
        let client = live_client(false).await;
        client
            .execute_query("CREATE TEMP TABLE returning_t (x int)")
            .await
            .unwrap();

        let rows = client
            .execute_query("INSERT INTO returning_t VALUES (9) RETURNING x")
            .await
            .unwrap();
        assert_eq!(Value::Array(rows.into_iter().map(Value::Object).collect()), json!([{"x": 9}]));

        let rows = client
            .execute_query("DELETE FROM returning_t")
            .await
            .unwrap();
        assert_eq!(rows[0]["rows_affected"], json!(1));
        client.close().await;
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL"]
    async fn test_live_common_types() {
        let client = live_client(false).await;
        let rows = client
            .execute_query(
                "SELECT avg(x) AS mean, DATE '2024-01-02' AS d,
                        '00010203-0405-0607-0809-0a0b0c0d0e0f'::uuid AS id,
                        TIMESTAMP '2024-01-02 03:04:05' AS ts
                 FROM (VALUES (1), (2)) AS t(x)",
            )
            .await
            .unwrap();

        assert_eq!(rows[0]["mean"], json!("1.5000000000000000"));
        assert_eq!(rows[0]["d"], json!("2024-01-02"));
        assert_eq!(rows[0]["id"], json!("00010203-0405-0607-0809-0a0b0c0d0e0f"));
        assert_eq!(rows[0]["ts"], json!("2024-01-02T03:04:05"));
        client.close().await;
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL"]
    async fn test_live_read_only_session_blocks_writes() {
        let client = live_client(true).await;
        let err = client
            .execute_query("EXPLAIN ANALYZE CREATE TABLE read_only_t AS SELECT 1")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("read-only"));
        client.close().await;
    }
}
