//! Tenant directory over the tenants table.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tenancy_core::{TenantKey, TenantsTableConfig};
use tenancy_rls::quote_ident;
use tenancy_sync::{DbContext, TenantDirectory};

/// [`TenantDirectory`] that reads tenant keys from the central database.
#[derive(Debug, Clone)]
pub struct PgTenantDirectory {
    pool: PgPool,
    keys_sql: String,
    exists_sql: String,
}

impl PgTenantDirectory {
    pub fn new(pool: PgPool, tenants: &TenantsTableConfig) -> Self {
        Self {
            pool,
            keys_sql: tenant_keys_statement(tenants),
            exists_sql: tenant_exists_statement(tenants),
        }
    }
}

fn tenant_keys_statement(tenants: &TenantsTableConfig) -> String {
    format!(
        "SELECT {key}::text AS tenant_key FROM {table} ORDER BY 1",
        key = quote_ident(&tenants.key_column),
        table = quote_ident(&tenants.table),
    )
}

fn tenant_exists_statement(tenants: &TenantsTableConfig) -> String {
    format!(
        "SELECT 1 FROM {table} WHERE {key}::text = $1",
        key = quote_ident(&tenants.key_column),
        table = quote_ident(&tenants.table),
    )
}

#[async_trait]
impl TenantDirectory for PgTenantDirectory {
    async fn all_tenant_keys(&self) -> anyhow::Result<Vec<TenantKey>> {
        let rows = sqlx::query(&self.keys_sql).fetch_all(&self.pool).await?;
        let mut keys = Vec::with_capacity(rows.len());
        for row in rows {
            let key: String = row.try_get("tenant_key")?;
            keys.push(TenantKey::new(key));
        }
        Ok(keys)
    }

    async fn context_for(&self, key: &TenantKey) -> anyhow::Result<Option<DbContext>> {
        let found = sqlx::query(&self.exists_sql)
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.map(|_| DbContext::Tenant(key.clone())))
    }
}
