//! Statement execution seam.

use async_trait::async_trait;

/// A result row keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Executes statements against the database that owns the policies.
///
/// The reconciler routes every mutation through this trait and never holds a
/// connection itself.
#[async_trait]
pub trait PolicyExecutionSink: Send + Sync {
    /// Execute a statement that returns no rows.
    async fn execute(&self, sql: &str) -> anyhow::Result<()>;

    /// Run a query and return its rows.
    async fn query(&self, sql: &str) -> anyhow::Result<Vec<Row>>;
}
