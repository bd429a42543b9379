//! One connection pool per dialect, behind a single enum.
//!
//! sqlx's `Any` driver cannot decode dates or decimals, so each dialect keeps its own typed
//! pool and the row decoding in [`crate::value`].

use crate::dialect::Dialect;
use crate::error::{connection_error, query_error};
use crate::value::{mysql_row_to_json, pg_row_to_json, sqlite_row_to_json};
use async_stream::try_stream;
use datalink_core::{ConnectionConfig, DataRow, EngineSettings, Result, RowStream};
use futures::{Stream, TryStreamExt};
use serde_json::Value;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::debug;

/// Bind a JSON scalar with the closest native type. Objects and arrays go over as JSON text.
macro_rules! bind_json {
    ($query:expr, $value:expr) => {
        match $value {
            Value::Bool(b) => $query.bind(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => $query.bind(i),
                None => $query.bind(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => $query.bind(s.as_str()),
            other => $query.bind(other.to_string()),
        }
    };
}

#[derive(Clone, Debug)]
pub enum SqlPool {
    Postgres(PgPool),
    MySql(MySqlPool),
    Sqlite(SqlitePool),
}

impl SqlPool {
    /// Open a pool for `config` and verify it with `SELECT 1`
    pub async fn connect(
        dialect: Dialect,
        config: &ConnectionConfig,
        settings: &EngineSettings,
    ) -> Result<Self> {
        let url = config.connection_url();
        let max = settings.pool_max_connections.max(1);
        let min = settings.pool_min_connections.min(max);

        let pool = match dialect {
            Dialect::Postgres => SqlPool::Postgres(
                PgPoolOptions::new()
                    .max_connections(max)
                    .min_connections(min)
                    .acquire_timeout(settings.connect_timeout())
                    .idle_timeout(settings.idle_timeout())
                    .connect(&url)
                    .await
                    .map_err(connection_error)?,
            ),
            Dialect::MySql => SqlPool::MySql(
                MySqlPoolOptions::new()
                    .max_connections(max)
                    .min_connections(min)
                    .acquire_timeout(settings.connect_timeout())
                    .idle_timeout(settings.idle_timeout())
                    .connect(&url)
                    .await
                    .map_err(connection_error)?,
            ),
            Dialect::Sqlite => {
                let options = SqlitePoolOptions::new().acquire_timeout(settings.connect_timeout());
                // an in-memory database lives exactly as long as its single connection
                let options = if config.database == ":memory:" {
                    options
                        .max_connections(1)
                        .min_connections(1)
                        .idle_timeout(None)
                        .max_lifetime(None)
                } else {
                    options
                        .max_connections(max)
                        .min_connections(min)
                        .idle_timeout(settings.idle_timeout())
                };
                SqlPool::Sqlite(options.connect(&url).await.map_err(connection_error)?)
            }
        };

        if let Err(e) = pool.ping().await {
            pool.close().await;
            return Err(e);
        }
        debug!("Opened {} pool for {}", dialect.name(), config.redacted_url());
        Ok(pool)
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            SqlPool::Postgres(_) => Dialect::Postgres,
            SqlPool::MySql(_) => Dialect::MySql,
            SqlPool::Sqlite(_) => Dialect::Sqlite,
        }
    }

    pub async fn ping(&self) -> Result<()> {
        match self {
            SqlPool::Postgres(pool) => sqlx::query("SELECT 1").execute(pool).await.map(|_| ()),
            SqlPool::MySql(pool) => sqlx::query("SELECT 1").execute(pool).await.map(|_| ()),
            SqlPool::Sqlite(pool) => sqlx::query("SELECT 1").execute(pool).await.map(|_| ()),
        }
        .map_err(connection_error)
    }

    pub async fn close(&self) {
        match self {
            SqlPool::Postgres(pool) => pool.close().await,
            SqlPool::MySql(pool) => pool.close().await,
            SqlPool::Sqlite(pool) => pool.close().await,
        }
    }

    pub async fn fetch_all(&self, sql: &str) -> Result<Vec<DataRow>> {
        self.fetch_bound(sql, &[]).await
    }

    /// Run `sql` with text parameters and decode every row
    pub async fn fetch_bound(&self, sql: &str, params: &[&str]) -> Result<Vec<DataRow>> {
        debug!("Executing SQL: {}", sql);
        match self {
            SqlPool::Postgres(pool) => {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = query.bind(*param);
                }
                let rows = query.fetch_all(pool).await.map_err(query_error)?;
                Ok(rows.iter().map(pg_row_to_json).collect())
            }
            SqlPool::MySql(pool) => {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = query.bind(*param);
                }
                let rows = query.fetch_all(pool).await.map_err(query_error)?;
                Ok(rows.iter().map(mysql_row_to_json).collect())
            }
            SqlPool::Sqlite(pool) => {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = query.bind(*param);
                }
                let rows = query.fetch_all(pool).await.map_err(query_error)?;
                Ok(rows.iter().map(sqlite_row_to_json).collect())
            }
        }
    }

    /// Lazily stream the rows of `sql` over a pooled connection
    pub fn stream(&self, sql: String) -> RowStream {
        match self.clone() {
            SqlPool::Postgres(pool) => Box::pin(pg_stream(pool, sql)),
            SqlPool::MySql(pool) => Box::pin(mysql_stream(pool, sql)),
            SqlPool::Sqlite(pool) => Box::pin(sqlite_stream(pool, sql)),
        }
    }

    /// Execute one INSERT built by [`insert_statement`], binding its non-null values
    pub async fn insert_row(&self, sql: &str, values: &[&Value]) -> Result<u64> {
        let affected = match self {
            SqlPool::Postgres(pool) => {
                let mut query = sqlx::query(sql);
                for value in values {
                    query = bind_json!(query, *value);
                }
                query.execute(pool).await.map(|r| r.rows_affected())
            }
            SqlPool::MySql(pool) => {
                let mut query = sqlx::query(sql);
                for value in values {
                    query = bind_json!(query, *value);
                }
                query.execute(pool).await.map(|r| r.rows_affected())
            }
            SqlPool::Sqlite(pool) => {
                let mut query = sqlx::query(sql);
                for value in values {
                    query = bind_json!(query, *value);
                }
                query.execute(pool).await.map(|r| r.rows_affected())
            }
        };
        affected.map_err(query_error)
    }
}

fn pg_stream(pool: PgPool, sql: String) -> impl Stream<Item = Result<DataRow>> + Send + 'static {
    try_stream! {
        let mut rows = sqlx::query(&sql).fetch(&pool);
        while let Some(row) = rows.try_next().await.map_err(query_error)? {
            yield pg_row_to_json(&row);
        }
    }
}

fn mysql_stream(
    pool: MySqlPool,
    sql: String,
) -> impl Stream<Item = Result<DataRow>> + Send + 'static {
    try_stream! {
        let mut rows = sqlx::query(&sql).fetch(&pool);
        while let Some(row) = rows.try_next().await.map_err(query_error)? {
            yield mysql_row_to_json(&row);
        }
    }
}

fn sqlite_stream(
    pool: SqlitePool,
    sql: String,
) -> impl Stream<Item = Result<DataRow>> + Send + 'static {
    try_stream! {
        let mut rows = sqlx::query(&sql).fetch(&pool);
        while let Some(row) = rows.try_next().await.map_err(query_error)? {
            yield sqlite_row_to_json(&row);
        }
    }
}

/// Target column with an optional PostgreSQL cast for its placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertColumn {
    pub name: String,
    pub cast: Option<String>,
}

/// Build an INSERT for the fields of `row` that exist in `columns`.
///
/// Null values are inlined as `NULL`; everything else becomes a placeholder, returned in bind
/// order. Returns `None` when the row shares no column with the target.
pub fn insert_statement<'r>(
    dialect: Dialect,
    table_ref: &str,
    columns: &[InsertColumn],
    row: &'r DataRow,
) -> Option<(String, Vec<&'r Value>)> {
    let mut names = Vec::new();
    let mut slots = Vec::new();
    let mut binds = Vec::new();

    for column in columns {
        let Some(value) = row.get(&column.name) else {
            continue;
        };
        names.push(dialect.quote_ident(&column.name));
        if value.is_null() {
            slots.push("NULL".to_string());
            continue;
        }
        binds.push(value);
        let placeholder = dialect.placeholder(binds.len());
        slots.push(match (&column.cast, dialect) {
            (Some(cast), Dialect::Postgres) => format!("{}::{}", placeholder, cast),
            _ => placeholder,
        });
    }

    if names.is_empty() {
        return None;
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table_ref,
        names.join(", "),
        slots.join(", ")
    );
    Some((sql, binds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn columns() -> Vec<InsertColumn> {
        vec![
            InsertColumn {
                name: "id".to_string(),
                cast: Some("integer".to_string()),
            },
            InsertColumn {
                name: "created_at".to_string(),
                cast: Some("timestamp without time zone".to_string()),
            },
            InsertColumn {
                name: "note".to_string(),
                cast: None,
            },
        ]
    }

    #[test]
    fn test_insert_statement_inlines_nulls_and_casts() {
        let row = json!({"id": 7, "created_at": "2024-01-01T00:00:00", "note": null, "extra": 1});
        let row = row.as_object().unwrap().clone();

        let (sql, binds) =
            insert_statement(Dialect::Postgres, "\"public\".\"t\"", &columns(), &row).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO \"public\".\"t\" (\"id\", \"created_at\", \"note\") \
             VALUES ($1::integer, $2::timestamp without time zone, NULL)"
        );
        assert_eq!(binds, vec![&json!(7), &json!("2024-01-01T00:00:00")]);
    }

    #[test]
    fn test_insert_statement_question_marks_for_sqlite() {
        let row = json!({"note": "hi", "id": 1});
        let row = row.as_object().unwrap().clone();

        let (sql, binds) = insert_statement(Dialect::Sqlite, "\"t\"", &columns(), &row).unwrap();
        assert_eq!(sql, "INSERT INTO \"t\" (\"id\", \"note\") VALUES (?, ?)");
        assert_eq!(binds.len(), 2);
    }

    #[test]
    fn test_insert_statement_without_shared_columns() {
        let row = json!({"unknown": 1});
        let row = row.as_object().unwrap().clone();
        assert!(insert_statement(Dialect::MySql, "`t`", &columns(), &row).is_none());
    }
}
