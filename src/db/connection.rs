//! Database connection management using sqlx

use crate::config::DatabaseConfig;
use crate::db::decode::{mysql_cell, pg_cell, sqlite_cell};
use crate::error::{PipelineError, Result};
use crate::execution::{CellValue, ExecutionError, QuerySession, SessionProvider, TabularResult};
use async_trait::async_trait;
use sqlx::mysql::{MySql, MySqlConnection, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow, Postgres};
use sqlx::sqlite::{Sqlite, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Executor, Row, Statement};
use tracing::{debug, info};

/// Connection pool for whichever engine the deployment points at
#[derive(Clone, Debug)]
pub enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl DbPool {
    pub fn backend_name(&self) -> &'static str {
        match self {
            DbPool::MySql(_) => "mysql",
            DbPool::Postgres(_) => "postgres",
            DbPool::Sqlite(_) => "sqlite",
        }
    }

    pub async fn close(&self) {
        match self {
            DbPool::MySql(pool) => pool.close().await,
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::Sqlite(pool) => pool.close().await,
        }
    }
}

/// Initialize the database connection pool and check it with `SELECT 1`
pub async fn init_pool(config: &DatabaseConfig) -> Result<DbPool> {
    let url = config.url.as_str();
    let pool = if url.starts_with("mysql:") || url.starts_with("mariadb:") {
        DbPool::MySql(
            MySqlPoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(config.acquire_timeout)
                .test_before_acquire(true)
                .connect(url)
                .await?,
        )
    } else if url.starts_with("postgres:") || url.starts_with("postgresql:") {
        DbPool::Postgres(
            PgPoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(config.acquire_timeout)
                .test_before_acquire(true)
                .connect(url)
                .await?,
        )
    } else if url.starts_with("sqlite:") {
        DbPool::Sqlite(
            SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(config.acquire_timeout)
                .connect(url)
                .await?,
        )
    } else {
        return Err(PipelineError::Config(format!(
            "Unsupported database URL scheme: {}",
            url.split(':').next().unwrap_or_default()
        )));
    };

    ping(&pool).await?;
    info!(backend = pool.backend_name(), "Database pool initialized");
    Ok(pool)
}

/// Round-trip a trivial query through the pool
pub async fn ping(pool: &DbPool) -> Result<()> {
    match pool {
        DbPool::MySql(p) => p.execute("SELECT 1").await.map(|_| ())?,
        DbPool::Postgres(p) => p.execute("SELECT 1").await.map(|_| ())?,
        DbPool::Sqlite(p) => p.execute("SELECT 1").await.map(|_| ())?,
    }
    Ok(())
}

#[async_trait]
impl SessionProvider for DbPool {
    async fn open_session(&self) -> std::result::Result<Box<dyn QuerySession>, ExecutionError> {
        let session = match self {
            DbPool::MySql(pool) => PooledSession::MySql(pool.acquire().await.map_err(unavailable)?),
            DbPool::Postgres(pool) => PooledSession::Postgres(pool.acquire().await.map_err(unavailable)?),
            DbPool::Sqlite(pool) => PooledSession::Sqlite(pool.acquire().await.map_err(unavailable)?),
        };
        debug!(backend = self.backend_name(), "Session opened");
        Ok(Box::new(session))
    }
}

fn unavailable(err: sqlx::Error) -> ExecutionError {
    ExecutionError::SessionUnavailable(err.to_string())
}

/// One pooled connection held for the lifetime of a run.
/// Dropping it returns the connection to the pool.
pub enum PooledSession {
    MySql(PoolConnection<MySql>),
    Postgres(PoolConnection<Postgres>),
    Sqlite(PoolConnection<Sqlite>),
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        debug!("Session released");
    }
}

#[async_trait]
impl QuerySession for PooledSession {
    async fn execute(&mut self, sql: &str) -> std::result::Result<TabularResult, ExecutionError> {
        if sql.trim().is_empty() {
            return Err(ExecutionError::EmptyStatement);
        }

        match self {
            PooledSession::MySql(conn) => fetch_mysql(conn, sql).await,
            PooledSession::Postgres(conn) => fetch_pg(conn, sql).await,
            PooledSession::Sqlite(conn) => fetch_sqlite(conn, sql).await,
        }
    }
}

fn engine_error(err: sqlx::Error) -> ExecutionError {
    match err {
        sqlx::Error::Database(db_err) => ExecutionError::Engine(db_err.message().to_string()),
        sqlx::Error::ColumnDecode { index, source } => ExecutionError::Decode {
            column: index,
            message: source.to_string(),
        },
        other => ExecutionError::Engine(other.to_string()),
    }
}

fn decode_rows<R, F>(rows: &[R], width: usize, decode: F) -> std::result::Result<Vec<Vec<CellValue>>, ExecutionError>
where
    F: Fn(&R, usize) -> std::result::Result<CellValue, sqlx::Error>,
{
    rows.iter()
        .map(|row| (0..width).map(|i| decode(row, i).map_err(engine_error)).collect())
        .collect()
}

fn column_names<C: Column>(columns: &[C]) -> Vec<String> {
    columns.iter().map(|c| c.name().to_string()).collect()
}

async fn fetch_mysql(conn: &mut MySqlConnection, sql: &str) -> std::result::Result<TabularResult, ExecutionError> {
    let statement = (&mut *conn).prepare(sql).await.map_err(engine_error)?;
    let columns = column_names(statement.columns());
    let rows: Vec<MySqlRow> = statement.query().fetch_all(&mut *conn).await.map_err(engine_error)?;
    let width = rows.first().map(|r| r.len()).unwrap_or(columns.len());
    Ok(TabularResult::new(columns, decode_rows(&rows, width, mysql_cell)?))
}

async fn fetch_pg(conn: &mut PgConnection, sql: &str) -> std::result::Result<TabularResult, ExecutionError> {
    let statement = (&mut *conn).prepare(sql).await.map_err(engine_error)?;
    let columns = column_names(statement.columns());
    let rows: Vec<PgRow> = statement.query().fetch_all(&mut *conn).await.map_err(engine_error)?;
    let width = rows.first().map(|r| r.len()).unwrap_or(columns.len());
    Ok(TabularResult::new(columns, decode_rows(&rows, width, pg_cell)?))
}

async fn fetch_sqlite(conn: &mut SqliteConnection, sql: &str) -> std::result::Result<TabularResult, ExecutionError> {
    let statement = (&mut *conn).prepare(sql).await.map_err(engine_error)?;
    let columns = column_names(statement.columns());
    let rows: Vec<SqliteRow> = statement.query().fetch_all(&mut *conn).await.map_err(engine_error)?;
    let width = rows.first().map(|r| r.len()).unwrap_or(columns.len());
    Ok(TabularResult::new(columns, decode_rows(&rows, width, sqlite_cell)?))
}
