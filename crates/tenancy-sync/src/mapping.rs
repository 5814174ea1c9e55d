//! Maintenance of central resource to tenant mappings.

use std::sync::Arc;

use tenancy_core::{GlobalId, TenantKey};

use crate::error::SyncError;
use crate::store::MappingStore;

/// Idempotent wrapper over the mapping pivot.
#[derive(Clone)]
pub struct MappingMaintainer {
    store: Arc<dyn MappingStore>,
}

impl MappingMaintainer {
    pub fn new(store: Arc<dyn MappingStore>) -> Self {
        Self { store }
    }

    pub async fn tenants_for(&self, model: &str, id: &GlobalId) -> Result<Vec<TenantKey>, SyncError> {
        Ok(self.store.tenants_for(model, id).await?)
    }

    /// Map a central resource to a tenant. Returns false if it already was.
    pub async fn attach(&self, model: &str, id: &GlobalId, tenant: &TenantKey) -> Result<bool, SyncError> {
        let mapped = self.store.tenants_for(model, id).await?;
        if mapped.contains(tenant) {
            return Ok(false);
        }
        self.store.attach(model, id, tenant).await?;
        tracing::debug!(model, global_id = %id, tenant = %tenant, "Attached resource to tenant");
        Ok(true)
    }

    /// Unmap a resource from one tenant, or from all tenants with `None`.
    pub async fn detach(
        &self,
        model: &str,
        id: &GlobalId,
        tenant: Option<&TenantKey>,
    ) -> Result<usize, SyncError> {
        let removed = self.store.detach(model, id, tenant).await?;
        tracing::debug!(
            model,
            global_id = %id,
            tenant = tenant.map(TenantKey::as_str),
            removed,
            "Detached resource"
        );
        Ok(removed)
    }

    /// Forget every mapping of a deleted tenant.
    pub async fn delete_tenant(&self, tenant: &TenantKey) -> Result<usize, SyncError> {
        let removed = self.store.delete_all_for_tenant(tenant).await?;
        tracing::info!(tenant = %tenant, removed, "Deleted tenant resource mappings");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryMappingStore;

    #[tokio::test]
    async fn test_attach_is_idempotent() {
        let maintainer = MappingMaintainer::new(Arc::new(MemoryMappingStore::new()));
        let id = GlobalId::new("acme");
        let tenant = TenantKey::new("t1");

        assert!(maintainer.attach("users", &id, &tenant).await.unwrap());
        assert!(!maintainer.attach("users", &id, &tenant).await.unwrap());
        assert_eq!(maintainer.tenants_for("users", &id).await.unwrap(), vec![tenant]);
    }

    #[tokio::test]
    async fn test_delete_tenant_removes_only_its_rows() {
        let maintainer = MappingMaintainer::new(Arc::new(MemoryMappingStore::new()));
        let t1 = TenantKey::new("t1");
        let t2 = TenantKey::new("t2");
        maintainer.attach("users", &GlobalId::new("a"), &t1).await.unwrap();
        maintainer.attach("users", &GlobalId::new("b"), &t1).await.unwrap();
        maintainer.attach("users", &GlobalId::new("a"), &t2).await.unwrap();

        assert_eq!(maintainer.delete_tenant(&t1).await.unwrap(), 2);
        assert_eq!(
            maintainer.tenants_for("users", &GlobalId::new("a")).await.unwrap(),
            vec![t2]
        );
    }
}
