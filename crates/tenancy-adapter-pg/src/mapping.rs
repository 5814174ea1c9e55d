//! The resource mapping pivot table.
//!
//! One row per (central resource, tenant) pair:
//!
//! ```sql
//! CREATE TABLE tenant_resources (
//!     tenant_id     text NOT NULL,
//!     global_id     text NOT NULL,
//!     resource_type text NOT NULL,
//!     PRIMARY KEY (tenant_id, global_id, resource_type)
//! );
//! ```

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tenancy_core::{GlobalId, SyncConfig, TenantKey};
use tenancy_rls::quote_ident;
use tenancy_sync::MappingStore;

#[derive(Debug, Clone, PartialEq, Eq)]
struct PivotStatements {
    tenants_for: String,
    attach: String,
    detach_one: String,
    detach_all: String,
    delete_tenant: String,
}

impl PivotStatements {
    fn new(config: &SyncConfig) -> Self {
        let pivot = quote_ident(&config.pivot_table);
        let tenant = quote_ident(&config.tenant_key_column);
        let global_id = quote_ident(&config.global_id_column);
        Self {
            tenants_for: format!(
                "SELECT {tenant}::text AS tenant_key FROM {pivot} \
                 WHERE resource_type = $1 AND {global_id}::text = $2 ORDER BY 1"
            ),
            attach: format!(
                "INSERT INTO {pivot} ({tenant}, {global_id}, resource_type) \
                 VALUES ($1, $2, $3) ON CONFLICT DO NOTHING"
            ),
            detach_one: format!(
                "DELETE FROM {pivot} \
                 WHERE resource_type = $1 AND {global_id}::text = $2 AND {tenant}::text = $3"
            ),
            detach_all: format!(
                "DELETE FROM {pivot} WHERE resource_type = $1 AND {global_id}::text = $2"
            ),
            delete_tenant: format!("DELETE FROM {pivot} WHERE {tenant}::text = $1"),
        }
    }
}

/// [`MappingStore`] over the pivot table in the central database.
#[derive(Debug, Clone)]
pub struct PgMappingStore {
    pool: PgPool,
    statements: PivotStatements,
}

impl PgMappingStore {
    pub fn new(pool: PgPool, config: &SyncConfig) -> Self {
        Self {
            pool,
            statements: PivotStatements::new(config),
        }
    }
}

#[async_trait]
impl MappingStore for PgMappingStore {
    async fn tenants_for(&self, model: &str, id: &GlobalId) -> anyhow::Result<Vec<TenantKey>> {
        let rows = sqlx::query(&self.statements.tenants_for)
            .bind(model)
            .bind(id.as_str())
            .fetch_all(&self.pool)
            .await?;

        let mut tenants = Vec::with_capacity(rows.len());
        for row in rows {
            let key: String = row.try_get("tenant_key")?;
            tenants.push(TenantKey::new(key));
        }
        Ok(tenants)
    }

    async fn attach(&self, model: &str, id: &GlobalId, tenant: &TenantKey) -> anyhow::Result<()> {
        sqlx::query(&self.statements.attach)
            .bind(tenant.as_str())
            .bind(id.as_str())
            .bind(model)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn detach(
        &self,
        model: &str,
        id: &GlobalId,
        tenant: Option<&TenantKey>,
    ) -> anyhow::Result<usize> {
        let result = match tenant {
            Some(tenant) => {
                sqlx::query(&self.statements.detach_one)
                    .bind(model)
                    .bind(id.as_str())
                    .bind(tenant.as_str())
                    .execute(&self.pool)
                    .await?
            }
            None => {
                sqlx::query(&self.statements.detach_all)
                    .bind(model)
                    .bind(id.as_str())
                    .execute(&self.pool)
                    .await?
            }
        };
        Ok(usize::try_from(result.rows_affected())?)
    }

    async fn delete_all_for_tenant(&self, tenant: &TenantKey) -> anyhow::Result<usize> {
        let result = sqlx::query(&self.statements.delete_tenant)
            .bind(tenant.as_str())
            .execute(&self.pool)
            .await?;
        Ok(usize::try_from(result.rows_affected())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_statements_use_configured_names() {
        let config = SyncConfig {
            pivot_table: "TenantResources".to_string(),
            tenant_key_column: "tenant_key".to_string(),
            ..Default::default()
        };
        let statements = PivotStatements::new(&config);

        assert_eq!(
            statements.tenants_for,
            "SELECT tenant_key::text AS tenant_key FROM \"TenantResources\" \
             WHERE resource_type = $1 AND global_id::text = $2 ORDER BY 1"
        );
        assert_eq!(
            statements.delete_tenant,
            "DELETE FROM \"TenantResources\" WHERE tenant_key::text = $1"
        );
    }
}
