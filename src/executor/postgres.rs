use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::{
    Column, Executor, Row,
    postgres::{PgPool, PgPoolOptions}
};
use tracing::{debug, error};

use super::{QueryStore, ResultSet, value::decode_row};
use crate::{
    config::DatabaseConfig,
    error::{AppResult, QueryError, config_error},
    policy::RowCap
};

/// PostgreSQL store on a bounded connection pool.
///
/// The pool size is the concurrency bound for database work: at most
/// `pool_size` queries run at once, further requests wait up to the acquire
/// timeout for a connection.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool
}

fn execution_error(err: sqlx::Error) -> QueryError {
    let message = match &err {
        sqlx::Error::Database(db) => db.message().to_string(),
        sqlx::Error::PoolTimedOut => "timed out waiting for a database connection".to_string(),
        other => other.to_string()
    };
    error!(error = %err, "query execution failed");
    QueryError::Execution(message)
}

impl PgStore {
    /// Build the pool without connecting; connections open on first use.
    pub fn connect_lazy(config: &DatabaseConfig) -> AppResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_lazy(&config.url)
            .map_err(|e| config_error(format!("Invalid database URL: {}", e)))?;
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl QueryStore for PgStore {
    async fn fetch(&self, sql: &str, max_rows: RowCap) -> Result<ResultSet, QueryError> {
        let mut tx = self.pool.begin().await.map_err(execution_error)?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(execution_error)?;

        let mut result = ResultSet::default();
        {
            let mut rows = sqlx::query(sql).fetch(&mut *tx);
            while let Some(row) = rows.try_next().await.map_err(execution_error)? {
                if result.columns.is_empty() {
                    result.columns = row
                        .columns()
                        .iter()
                        .map(|c| c.name().to_string())
                        .collect();
                }
                if result.rows.len() == max_rows.as_usize() {
                    result.truncated = true;
                    break;
                }
                result.rows.push(decode_row(&row)?);
            }
        }

        if result.columns.is_empty() {
            let described = (&mut *tx).describe(sql).await.map_err(execution_error)?;
            result.columns = described
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect();
        }

        tx.commit().await.map_err(execution_error)?;
        debug!(rows = result.rows.len(), truncated = result.truncated, "query executed");
        Ok(result)
    }
}
