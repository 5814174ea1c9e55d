//! The public write path for synced resources.
//!
//! [`SyncEngine`] performs application writes and drives propagation for
//! them. Hosts whose storage already emits save hooks can skip
//! [`SyncEngine::save`] and forward their hooks to
//! [`SyncEngine::on_resource_saved`] instead; writes made by the engine itself
//! are suppressed by the loop guard either way.

use std::collections::BTreeSet;
use std::sync::Arc;

use tenancy_core::{Attributes, GlobalId, SyncConfig, TenantKey};
use tokio::sync::watch;

use crate::context::{DbContext, TenantDirectory};
use crate::contracts::{SyncModel, Syncable};
use crate::error::SyncError;
use crate::events::{EventBus, NullEventBus, SaveKind, SavedResource, SyncEvent};
use crate::guard::LoopGuard;
use crate::ids::{UniqueIdentifierGenerator, UuidGenerator};
use crate::mapping::MappingMaintainer;
use crate::model::ModelRegistry;
use crate::projector::AttributeProjector;
use crate::report::{Direction, PropagationReport, WriteKind};
use crate::router::SyncEventRouter;
use crate::services::SyncServices;
use crate::store::{DeleteMode, MappingStore, ResourceStore};

/// Result of [`SyncEngine::save`].
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub resource: SavedResource,
    /// `None` when the save did not need propagating.
    pub propagation: Option<PropagationReport>,
}

/// Builder for [`SyncEngine`].
pub struct SyncEngineBuilder {
    registry: ModelRegistry,
    resources: Arc<dyn ResourceStore>,
    mappings: Arc<dyn MappingStore>,
    directory: Arc<dyn TenantDirectory>,
    events: Arc<dyn EventBus>,
    ids: Arc<dyn UniqueIdentifierGenerator>,
    include_trashed: bool,
    cancellation: Option<watch::Receiver<bool>>,
}

impl SyncEngineBuilder {
    pub fn event_bus(mut self, events: Arc<dyn EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn UniqueIdentifierGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Also find soft deleted counterparts when propagating a save.
    pub fn include_trashed(mut self, include_trashed: bool) -> Self {
        self.include_trashed = include_trashed;
        self
    }

    /// Stop fan-outs between two tenants once the receiver reads `true`.
    pub fn cancellation(mut self, cancellation: watch::Receiver<bool>) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    pub fn build(self) -> SyncEngine {
        let services = Arc::new(SyncServices {
            registry: self.registry,
            resources: self.resources,
            mappings: MappingMaintainer::new(self.mappings),
            directory: self.directory,
            events: self.events,
            guard: LoopGuard::new(),
            projector: AttributeProjector,
            include_trashed: self.include_trashed,
            cancellation: self.cancellation,
        });
        SyncEngine {
            router: SyncEventRouter::new(Arc::clone(&services)),
            services,
            ids: self.ids,
        }
    }
}

/// Synchronizes resources between the central database and tenant databases.
#[derive(Clone)]
pub struct SyncEngine {
    services: Arc<SyncServices>,
    router: SyncEventRouter,
    ids: Arc<dyn UniqueIdentifierGenerator>,
}

impl SyncEngine {
    pub fn builder(
        registry: ModelRegistry,
        resources: Arc<dyn ResourceStore>,
        mappings: Arc<dyn MappingStore>,
        directory: Arc<dyn TenantDirectory>,
    ) -> SyncEngineBuilder {
        SyncEngineBuilder {
            registry,
            resources,
            mappings,
            directory,
            events: Arc::new(NullEventBus),
            ids: Arc::new(UuidGenerator),
            include_trashed: false,
            cancellation: None,
        }
    }

    /// Builder for the models and options of a sync configuration.
    pub fn from_config(
        config: &SyncConfig,
        resources: Arc<dyn ResourceStore>,
        mappings: Arc<dyn MappingStore>,
        directory: Arc<dyn TenantDirectory>,
    ) -> Result<SyncEngineBuilder, SyncError> {
        let registry = ModelRegistry::from_config(config)?;
        Ok(Self::builder(registry, resources, mappings, directory)
            .include_trashed(config.include_trashed))
    }

    pub fn router(&self) -> &SyncEventRouter {
        &self.router
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.services.registry
    }

    /// Save a record in `context` and propagate it to its counterparts.
    ///
    /// Records without a global identifier get one from the identifier
    /// generator. Updates that change no synced attribute are not propagated.
    /// Central records must be sync masters and tenant records must not be.
    /// A soft deleted record has to be restored before it can be saved again.
    pub async fn save(
        &self,
        context: &DbContext,
        model: &str,
        mut attributes: Attributes,
    ) -> Result<SaveOutcome, SyncError> {
        let services = &self.services;
        let registered = services.registry.get(model)?;
        match (context, registered) {
            (DbContext::Central, SyncModel::Tenant(_)) => {
                return Err(SyncError::NotSyncMaster(model.to_string()));
            }
            (DbContext::Tenant(_), SyncModel::Master(_)) => {
                return Err(SyncError::NotSyncable(model.to_string()));
            }
            _ => {}
        }
        let syncable = registered.syncable();
        let key = syncable.global_identifier_key_name();

        let global_id = match syncable.global_identifier(&attributes) {
            Ok(id) => id,
            Err(SyncError::MissingGlobalId { .. }) => {
                let id = self.ids.generate(model);
                attributes.insert(key.to_string(), id.to_value());
                id
            }
            Err(e) => return Err(e),
        };

        let existing = services
            .resources
            .find(context, model, key, &global_id, false)
            .await?;
        if existing.is_none()
            && services
                .resources
                .find(context, model, key, &global_id, true)
                .await?
                .is_some()
        {
            return Err(SyncError::Trashed {
                model: model.to_string(),
                global_id,
            });
        }

        let (stored, kind) = match existing {
            Some(current) => {
                let changed = changed_attributes(&current, &attributes);
                services
                    .resources
                    .update(context, model, key, &global_id, attributes.clone())
                    .await?;
                let mut stored = current;
                stored.extend(attributes);
                (stored, SaveKind::Updated { changed })
            }
            None => {
                let stored = services.resources.create(context, model, attributes).await?;
                (stored, SaveKind::Created)
            }
        };

        let resource = SavedResource::new(model, stored, kind);
        services.events.publish(SyncEvent::ResourceSaved {
            context: context.clone(),
            resource: resource.clone(),
        });

        let propagation = if syncable.should_sync(&resource.attributes)
            && resource.kind.affects(syncable.synced_attribute_names())
        {
            Some(self.router.on_resource_saved(&resource, context).await?)
        } else {
            tracing::debug!(model, global_id = %global_id, "Saved without propagation");
            None
        };

        Ok(SaveOutcome {
            resource,
            propagation,
        })
    }

    /// Propagate a save the host has already written.
    pub async fn on_resource_saved(
        &self,
        resource: &SavedResource,
        origin: &DbContext,
    ) -> Result<PropagationReport, SyncError> {
        self.router.on_resource_saved(resource, origin).await
    }

    /// Delete a record in `context` and propagate the deletion.
    ///
    /// Models that do not soft delete are always deleted for good.
    pub async fn delete(
        &self,
        context: &DbContext,
        model: &str,
        global_id: &GlobalId,
        force: bool,
    ) -> Result<PropagationReport, SyncError> {
        let services = &self.services;
        let syncable = services.registry.syncable(model)?;
        let key = syncable.global_identifier_key_name();
        let record = services
            .resources
            .find(context, model, key, global_id, true)
            .await?
            .ok_or_else(|| SyncError::ResourceNotFound {
                model: model.to_string(),
                global_id: global_id.clone(),
            })?;

        let mode = delete_mode(syncable, force);
        services
            .resources
            .delete(context, model, key, global_id, mode)
            .await?;

        self.on_resource_deleted(context, model, &record, force).await
    }

    /// Propagate the deletion of `record`, which the host has already deleted.
    ///
    /// Deleting a sync master removes its mirrors for good when the deletion is
    /// forced (or the master does not soft delete), together with their
    /// mappings. A soft deletion soft deletes the mirrors that support it and
    /// leaves the others intact. Deleting a tenant record only unmaps that
    /// tenant, and only when the deletion is final.
    pub async fn on_resource_deleted(
        &self,
        context: &DbContext,
        model: &str,
        record: &Attributes,
        force: bool,
    ) -> Result<PropagationReport, SyncError> {
        let services = &self.services;
        let registered = services.registry.get(model)?;
        let syncable = registered.syncable();
        let global_id = syncable.global_identifier(record)?;
        let mode = delete_mode(syncable, force);

        services.events.publish(SyncEvent::ResourceDeleted {
            context: context.clone(),
            model: model.to_string(),
            global_id: global_id.clone(),
            force: mode.is_force(),
        });

        if !syncable.should_sync(record) {
            let direction = match context {
                DbContext::Central => Direction::FromCentral,
                DbContext::Tenant(_) => Direction::FromTenant,
            };
            return Ok(PropagationReport::new(direction, model, global_id));
        }

        match context {
            DbContext::Central => self.delete_mirrors(registered, global_id, mode).await,
            DbContext::Tenant(tenant) => {
                let SyncModel::Tenant(tenant_model) = registered else {
                    return Err(SyncError::NotSyncable(model.to_string()));
                };
                let central = services.registry.central_for(tenant_model.as_ref())?;
                if delete_mode(central.as_syncable(), force).is_force() {
                    services
                        .mappings
                        .detach(central.name(), &global_id, Some(tenant))
                        .await?;
                }
                Ok(PropagationReport::new(Direction::FromTenant, model, global_id))
            }
        }
    }

    async fn delete_mirrors(
        &self,
        model: &SyncModel,
        global_id: GlobalId,
        mode: DeleteMode,
    ) -> Result<PropagationReport, SyncError> {
        let services = &self.services;
        let master = model.require_master()?;
        let tenant_model = services.registry.tenant_for(master)?;

        services.events.publish(SyncEvent::SyncMasterDeleted {
            model: master.name().to_string(),
            global_id: global_id.clone(),
            force: mode.is_force(),
        });

        let tenants = services.mappings.tenants_for(master.name(), &global_id).await?;
        let mut report = PropagationReport::new(Direction::FromCentral, master.name(), global_id);

        for tenant in tenants {
            if services.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let context = DbContext::Tenant(tenant.clone());
            let result = self
                .delete_mirror(master.name(), tenant_model, &tenant, &report.global_id, mode)
                .await;
            report.record(context, result);
        }

        tracing::info!(
            model = %report.model,
            global_id = %report.global_id,
            force = mode.is_force(),
            targets = report.outcomes.len(),
            "Propagated sync master deletion"
        );
        report.into_result()
    }

    async fn delete_mirror(
        &self,
        master: &str,
        tenant_model: &dyn Syncable,
        tenant: &TenantKey,
        global_id: &GlobalId,
        mode: DeleteMode,
    ) -> Result<WriteKind, SyncError> {
        let services = &self.services;
        let context = services.tenant_context(tenant).await?;

        let written = match mode {
            DeleteMode::Force => {
                services
                    .delete_counterpart(&context, tenant_model, global_id, DeleteMode::Force)
                    .await?
            }
            DeleteMode::Soft if tenant_model.soft_deletes() => {
                services
                    .delete_counterpart(&context, tenant_model, global_id, DeleteMode::Soft)
                    .await?
            }
            DeleteMode::Soft => WriteKind::Unchanged,
        };

        if mode.is_force() {
            services.mappings.detach(master, global_id, Some(tenant)).await?;
        }
        Ok(written)
    }

    /// Restore a soft deleted sync master and its soft deleted mirrors.
    pub async fn restore(&self, model: &str, global_id: &GlobalId) -> Result<PropagationReport, SyncError> {
        let services = &self.services;
        let master = services.registry.master(model)?;
        let tenant_model = services.registry.tenant_for(master)?;
        let key = master.global_identifier_key_name();

        if !services
            .resources
            .restore(&DbContext::Central, model, key, global_id)
            .await?
        {
            return Err(SyncError::ResourceNotFound {
                model: model.to_string(),
                global_id: global_id.clone(),
            });
        }
        services.events.publish(SyncEvent::SyncMasterRestored {
            model: model.to_string(),
            global_id: global_id.clone(),
        });

        let tenants = services.mappings.tenants_for(model, global_id).await?;
        let mut report = PropagationReport::new(Direction::FromCentral, model, global_id.clone());
        for tenant in tenants {
            if services.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let (context, result) = match services.tenant_context(&tenant).await {
                Ok(context) => {
                    let result = services
                        .restore_counterpart(&context, tenant_model, global_id)
                        .await;
                    (context, result)
                }
                Err(e) => (DbContext::Tenant(tenant), Err(e)),
            };
            report.record(context, result);
        }

        tracing::info!(
            model,
            global_id = %global_id,
            targets = report.outcomes.len(),
            "Restored sync master"
        );
        report.into_result()
    }

    /// Map a central resource to a tenant and create its mirror there.
    ///
    /// Attaching an already mapped resource does nothing.
    pub async fn attach(
        &self,
        model: &str,
        global_id: &GlobalId,
        tenant: &TenantKey,
    ) -> Result<WriteKind, SyncError> {
        let services = &self.services;
        let master = services.registry.master(model)?;
        let tenant_model = services.registry.tenant_for(master)?;

        if services.mappings.tenants_for(model, global_id).await?.contains(tenant) {
            return Ok(WriteKind::Unchanged);
        }

        let record = services
            .resources
            .find(
                &DbContext::Central,
                model,
                master.global_identifier_key_name(),
                global_id,
                false,
            )
            .await?
            .ok_or_else(|| SyncError::ResourceNotFound {
                model: model.to_string(),
                global_id: global_id.clone(),
            })?;

        let context = services.tenant_context(tenant).await?;
        let written = services
            .upsert_counterpart(&context, master.as_syncable(), &record, tenant_model, global_id)
            .await?;
        services.mappings.attach(model, global_id, tenant).await?;

        services.events.publish(SyncEvent::CentralResourceAttachedToTenant {
            model: model.to_string(),
            global_id: global_id.clone(),
            tenant: tenant.clone(),
        });
        tracing::info!(model, global_id = %global_id, tenant = %tenant, "Attached resource to tenant");
        Ok(written)
    }

    /// Remove a central resource's mirror from a tenant and unmap it.
    pub async fn detach(
        &self,
        model: &str,
        global_id: &GlobalId,
        tenant: &TenantKey,
    ) -> Result<WriteKind, SyncError> {
        let services = &self.services;
        let master = services.registry.master(model)?;
        let tenant_model = services.registry.tenant_for(master)?;

        if !services.mappings.tenants_for(model, global_id).await?.contains(tenant) {
            return Ok(WriteKind::Unchanged);
        }

        let context = services.tenant_context(tenant).await?;
        let written = services
            .delete_counterpart(&context, tenant_model, global_id, DeleteMode::Force)
            .await?;
        services.mappings.detach(model, global_id, Some(tenant)).await?;

        services.events.publish(SyncEvent::CentralResourceDetachedFromTenant {
            model: model.to_string(),
            global_id: global_id.clone(),
            tenant: tenant.clone(),
        });
        tracing::info!(model, global_id = %global_id, tenant = %tenant, "Detached resource from tenant");
        Ok(written)
    }

    /// Forget every mapping of a deleted tenant.
    pub async fn delete_tenant(&self, tenant: &TenantKey) -> Result<usize, SyncError> {
        self.services.mappings.delete_tenant(tenant).await
    }
}

fn delete_mode(model: &dyn Syncable, force: bool) -> DeleteMode {
    if force || !model.soft_deletes() {
        DeleteMode::Force
    } else {
        DeleteMode::Soft
    }
}

/// Names of the attributes whose value differs from `current`.
fn changed_attributes(current: &Attributes, incoming: &Attributes) -> BTreeSet<String> {
    incoming
        .iter()
        .filter(|&(name, value)| current.get(name.as_str()) != Some(value))
        .map(|(name, _)| name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_changed_attributes() {
        let current = record(json!({"name": "X", "email": "x@a.io", "role": "admin"}));
        let incoming = record(json!({"name": "X", "email": "y@a.io", "phone": "1"}));
        let changed = changed_attributes(&current, &incoming);
        assert_eq!(
            changed.into_iter().collect::<Vec<_>>(),
            vec!["email".to_string(), "phone".to_string()]
        );
    }
}
