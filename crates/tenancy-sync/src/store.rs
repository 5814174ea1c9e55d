//! Storage seams for synced records and tenant mappings.
//!
//! Writes through these traits are internal: they never emit sync events.
//! The public, event-emitting write path is [`crate::SyncEngine`].

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use tenancy_core::{Attributes, GlobalId, TenantKey};

use crate::context::DbContext;

/// How a record is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeleteMode {
    /// Mark the record as deleted; it can be restored.
    Soft,
    /// Remove the record.
    Force,
}

impl DeleteMode {
    pub fn is_force(&self) -> bool {
        matches!(self, Self::Force)
    }
}

/// Record storage in the central database and every tenant database.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Find the record whose `key_column` holds `id`.
    ///
    /// Soft deleted records are only returned with `with_trashed`.
    async fn find(
        &self,
        context: &DbContext,
        model: &str,
        key_column: &str,
        id: &GlobalId,
        with_trashed: bool,
    ) -> anyhow::Result<Option<Attributes>>;

    /// Insert a record, returning it as stored.
    async fn create(
        &self,
        context: &DbContext,
        model: &str,
        attributes: Attributes,
    ) -> anyhow::Result<Attributes>;

    /// Overwrite the given attributes of an existing record.
    async fn update(
        &self,
        context: &DbContext,
        model: &str,
        key_column: &str,
        id: &GlobalId,
        attributes: Attributes,
    ) -> anyhow::Result<()>;

    /// Delete a record. Returns false if there was nothing to delete.
    async fn delete(
        &self,
        context: &DbContext,
        model: &str,
        key_column: &str,
        id: &GlobalId,
        mode: DeleteMode,
    ) -> anyhow::Result<bool>;

    /// Restore a soft deleted record. Returns false if none was trashed.
    async fn restore(
        &self,
        context: &DbContext,
        model: &str,
        key_column: &str,
        id: &GlobalId,
    ) -> anyhow::Result<bool>;
}

/// The pivot between central resources and tenants.
///
/// Pivot writes describe topology, not resource data, and never trigger syncing.
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Tenants a central resource is mapped to.
    async fn tenants_for(&self, model: &str, id: &GlobalId) -> anyhow::Result<Vec<TenantKey>>;

    async fn attach(&self, model: &str, id: &GlobalId, tenant: &TenantKey) -> anyhow::Result<()>;

    /// Remove the mapping to `tenant`, or every mapping of the resource when `None`.
    async fn detach(
        &self,
        model: &str,
        id: &GlobalId,
        tenant: Option<&TenantKey>,
    ) -> anyhow::Result<usize>;

    /// Remove every mapping of a tenant.
    async fn delete_all_for_tenant(&self, tenant: &TenantKey) -> anyhow::Result<usize>;
}

#[derive(Debug, Clone)]
struct StoredRecord {
    attributes: Attributes,
    trashed: bool,
}

/// In-memory [`ResourceStore`].
#[derive(Debug, Default)]
pub struct MemoryResourceStore {
    tables: RwLock<HashMap<(DbContext, String), Vec<StoredRecord>>>,
}

impl MemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record of a model, trashed ones included.
    pub fn records(&self, context: &DbContext, model: &str) -> Vec<Attributes> {
        self.tables
            .read()
            .map(|tables| {
                tables
                    .get(&(context.clone(), model.to_string()))
                    .map(|records| records.iter().map(|r| r.attributes.clone()).collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    fn matches(record: &StoredRecord, key_column: &str, id: &GlobalId) -> bool {
        record
            .attributes
            .get(key_column)
            .and_then(GlobalId::from_value)
            .is_some_and(|found| found == *id)
    }
}

fn lock_error(e: impl std::fmt::Display) -> anyhow::Error {
    anyhow::anyhow!("failed to acquire store lock: {e}")
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    async fn find(
        &self,
        context: &DbContext,
        model: &str,
        key_column: &str,
        id: &GlobalId,
        with_trashed: bool,
    ) -> anyhow::Result<Option<Attributes>> {
        let tables = self.tables.read().map_err(lock_error)?;
        Ok(tables
            .get(&(context.clone(), model.to_string()))
            .and_then(|records| {
                records
                    .iter()
                    .find(|r| (with_trashed || !r.trashed) && Self::matches(r, key_column, id))
            })
            .map(|r| r.attributes.clone()))
    }

    async fn create(
        &self,
        context: &DbContext,
        model: &str,
        attributes: Attributes,
    ) -> anyhow::Result<Attributes> {
        let mut tables = self.tables.write().map_err(lock_error)?;
        tables
            .entry((context.clone(), model.to_string()))
            .or_default()
            .push(StoredRecord {
                attributes: attributes.clone(),
                trashed: false,
            });
        Ok(attributes)
    }

    async fn update(
        &self,
        context: &DbContext,
        model: &str,
        key_column: &str,
        id: &GlobalId,
        attributes: Attributes,
    ) -> anyhow::Result<()> {
        let mut tables = self.tables.write().map_err(lock_error)?;
        let record = tables
            .get_mut(&(context.clone(), model.to_string()))
            .and_then(|records| records.iter_mut().find(|r| Self::matches(r, key_column, id)))
            .ok_or_else(|| anyhow::anyhow!("no {model} record {id} in {context}"))?;
        record.attributes.extend(attributes);
        Ok(())
    }

    async fn delete(
        &self,
        context: &DbContext,
        model: &str,
        key_column: &str,
        id: &GlobalId,
        mode: DeleteMode,
    ) -> anyhow::Result<bool> {
        let mut tables = self.tables.write().map_err(lock_error)?;
        let Some(records) = tables.get_mut(&(context.clone(), model.to_string())) else {
            return Ok(false);
        };
        match mode {
            DeleteMode::Force => {
                let before = records.len();
                records.retain(|r| !Self::matches(r, key_column, id));
                Ok(records.len() < before)
            }
            DeleteMode::Soft => {
                match records
                    .iter_mut()
                    .find(|r| !r.trashed && Self::matches(r, key_column, id))
                {
                    Some(record) => {
                        record.trashed = true;
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
        }
    }

    async fn restore(
        &self,
        context: &DbContext,
        model: &str,
        key_column: &str,
        id: &GlobalId,
    ) -> anyhow::Result<bool> {
        let mut tables = self.tables.write().map_err(lock_error)?;
        let restored = tables
            .get_mut(&(context.clone(), model.to_string()))
            .and_then(|records| {
                records
                    .iter_mut()
                    .find(|r| r.trashed && Self::matches(r, key_column, id))
            })
            .map(|record| record.trashed = false)
            .is_some();
        Ok(restored)
    }
}

/// In-memory [`MappingStore`].
#[derive(Debug, Default)]
pub struct MemoryMappingStore {
    rows: RwLock<BTreeSet<(String, GlobalId, TenantKey)>>,
}

impl MemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MappingStore for MemoryMappingStore {
    async fn tenants_for(&self, model: &str, id: &GlobalId) -> anyhow::Result<Vec<TenantKey>> {
        let rows = self.rows.read().map_err(lock_error)?;
        Ok(rows
            .iter()
            .filter(|(m, i, _)| m == model && i == id)
            .map(|(_, _, tenant)| tenant.clone())
            .collect())
    }

    async fn attach(&self, model: &str, id: &GlobalId, tenant: &TenantKey) -> anyhow::Result<()> {
        let mut rows = self.rows.write().map_err(lock_error)?;
        rows.insert((model.to_string(), id.clone(), tenant.clone()));
        Ok(())
    }

    async fn detach(
        &self,
        model: &str,
        id: &GlobalId,
        tenant: Option<&TenantKey>,
    ) -> anyhow::Result<usize> {
        let mut rows = self.rows.write().map_err(lock_error)?;
        let before = rows.len();
        rows.retain(|(m, i, t)| !(m == model && i == id && tenant.is_none_or(|only| only == t)));
        Ok(before - rows.len())
    }

    async fn delete_all_for_tenant(&self, tenant: &TenantKey) -> anyhow::Result<usize> {
        let mut rows = self.rows.write().map_err(lock_error)?;
        let before = rows.len();
        rows.retain(|(_, _, t)| t != tenant);
        Ok(before - rows.len())
    }
}
