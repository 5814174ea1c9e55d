//! Policy statement execution.

use async_trait::async_trait;
use sqlx::PgPool;
use tenancy_rls::{PolicyExecutionSink, Row};

use crate::row::row_to_map;

/// [`PolicyExecutionSink`] that runs statements on a Postgres pool.
#[derive(Debug, Clone)]
pub struct PgPolicySink {
    pool: PgPool,
}

impl PgPolicySink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PolicyExecutionSink for PgPolicySink {
    async fn execute(&self, sql: &str) -> anyhow::Result<()> {
        tracing::debug!(sql, "Executing policy statement");
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn query(&self, sql: &str) -> anyhow::Result<Vec<Row>> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_map).collect())
    }
}
