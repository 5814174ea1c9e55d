//! Database contexts and the tenant directory.
//!
//! There is no ambient "current tenant". Every store call receives the
//! [`DbContext`] it runs in, so concurrent propagations never share state.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tenancy_core::TenantKey;

/// The database a read or write runs against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "tenant")]
pub enum DbContext {
    Central,
    Tenant(TenantKey),
}

impl DbContext {
    pub fn tenant(&self) -> Option<&TenantKey> {
        match self {
            Self::Central => None,
            Self::Tenant(key) => Some(key),
        }
    }

    pub fn is_central(&self) -> bool {
        matches!(self, Self::Central)
    }
}

impl fmt::Display for DbContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Central => write!(f, "central"),
            Self::Tenant(key) => write!(f, "tenant:{key}"),
        }
    }
}

/// Source of tenants and their database contexts.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Keys of every known tenant.
    async fn all_tenant_keys(&self) -> anyhow::Result<Vec<TenantKey>>;

    /// Context for running against a tenant's database.
    ///
    /// Returns `None` for unknown tenants.
    async fn context_for(&self, key: &TenantKey) -> anyhow::Result<Option<DbContext>> {
        let known = self.all_tenant_keys().await?;
        Ok(known
            .iter()
            .any(|k| k == key)
            .then(|| DbContext::Tenant(key.clone())))
    }
}

/// Directory over a fixed list of tenants.
#[derive(Debug, Clone, Default)]
pub struct StaticTenantDirectory {
    keys: Vec<TenantKey>,
}

impl StaticTenantDirectory {
    pub fn new<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<TenantKey>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl TenantDirectory for StaticTenantDirectory {
    async fn all_tenant_keys(&self) -> anyhow::Result<Vec<TenantKey>> {
        Ok(self.keys.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_directory_resolves_known_tenants_only() {
        let directory = StaticTenantDirectory::new(["t1", "t2"]);
        assert_eq!(
            directory.context_for(&TenantKey::new("t1")).await.unwrap(),
            Some(DbContext::Tenant(TenantKey::new("t1")))
        );
        assert_eq!(
            directory.context_for(&TenantKey::new("t9")).await.unwrap(),
            None
        );
    }

    #[test]
    fn test_context_display() {
        assert_eq!(DbContext::Central.to_string(), "central");
        assert_eq!(
            DbContext::Tenant(TenantKey::new("acme")).to_string(),
            "tenant:acme"
        );
    }
}
