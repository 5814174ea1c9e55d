//! Postgres adapters for the tenancy crates.
//!
//! - [`PgSchemaIntrospector`] reads tables, columns, column comments and
//!   foreign keys from `information_schema`.
//! - [`PgPolicySink`] runs policy statements and reads `pg_policies`.
//! - [`PgMappingStore`] keeps the central resource to tenant pivot.
//! - [`PgTenantDirectory`] lists tenants from the tenants table.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tenancy_core::UpstreamConfig;

pub mod directory;
pub mod introspect;
pub mod mapping;
mod row;
pub mod sink;

pub use directory::PgTenantDirectory;
pub use introspect::PgSchemaIntrospector;
pub use mapping::PgMappingStore;
pub use sink::PgPolicySink;

/// Open a connection pool to the central database.
pub async fn connect(config: &UpstreamConfig) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .min_connections(config.pool.min_connections)
        .max_connections(config.pool.max_connections)
        .acquire_timeout(Duration::from_secs(config.pool.acquire_timeout_seconds))
        .connect(&config.connection_string())
        .await?;

    tracing::info!(
        host = %config.host,
        database = %config.database,
        max_connections = config.pool.max_connections,
        "Connected to central database"
    );
    Ok(pool)
}
