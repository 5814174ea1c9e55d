//! Collaborators shared by the router and the engine.

use std::sync::Arc;

use tenancy_core::{Attributes, GlobalId, TenantKey};
use tokio::sync::watch;

use crate::context::{DbContext, TenantDirectory};
use crate::contracts::Syncable;
use crate::error::SyncError;
use crate::events::{EventBus, SyncEvent};
use crate::guard::LoopGuard;
use crate::mapping::MappingMaintainer;
use crate::model::ModelRegistry;
use crate::projector::AttributeProjector;
use crate::report::WriteKind;
use crate::store::{DeleteMode, ResourceStore};

pub(crate) struct SyncServices {
    pub registry: ModelRegistry,
    pub resources: Arc<dyn ResourceStore>,
    pub mappings: MappingMaintainer,
    pub directory: Arc<dyn TenantDirectory>,
    pub events: Arc<dyn EventBus>,
    pub guard: LoopGuard,
    pub projector: AttributeProjector,
    pub include_trashed: bool,
    pub cancellation: Option<watch::Receiver<bool>>,
}

impl SyncServices {
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.as_ref().is_some_and(|rx| *rx.borrow())
    }

    pub async fn tenant_context(&self, tenant: &TenantKey) -> Result<DbContext, SyncError> {
        self.directory
            .context_for(tenant)
            .await?
            .ok_or_else(|| SyncError::UnknownTenant(tenant.clone()))
    }

    /// Write the counterpart of `record` into `context`, updating it when it
    /// exists and creating it otherwise.
    pub async fn upsert_counterpart(
        &self,
        context: &DbContext,
        source: &dyn Syncable,
        record: &Attributes,
        target: &dyn Syncable,
        global_id: &GlobalId,
    ) -> Result<WriteKind, SyncError> {
        let model = target.name();
        let key = target.global_identifier_key_name();
        let _token = self.guard.suppress(context, model, global_id);

        let existing = self
            .resources
            .find(context, model, key, global_id, self.include_trashed)
            .await?;

        if existing.is_none()
            && !self.include_trashed
            && self
                .resources
                .find(context, model, key, global_id, true)
                .await?
                .is_some()
        {
            // Stays trashed until restored.
            tracing::debug!(
                destination = %context,
                model,
                global_id = %global_id,
                "Skipped soft deleted counterpart"
            );
            return Ok(WriteKind::Unchanged);
        }

        let (kind, written) = match existing {
            Some(mut current) => {
                let attributes = self.projector.project_for_update(source, record, target);
                self.resources
                    .update(context, model, key, global_id, attributes.clone())
                    .await?;
                current.extend(attributes);
                (WriteKind::Updated, current)
            }
            None => {
                let attributes = self
                    .projector
                    .project_for_create(source, record, target, global_id);
                let created = self.resources.create(context, model, attributes).await?;
                (WriteKind::Created, created)
            }
        };

        tracing::debug!(
            destination = %context,
            model,
            global_id = %global_id,
            write = ?kind,
            "Wrote counterpart record"
        );
        self.events.publish(SyncEvent::SavedInForeignDatabase {
            context: context.clone(),
            model: model.to_string(),
            attributes: written,
        });
        Ok(kind)
    }

    pub async fn delete_counterpart(
        &self,
        context: &DbContext,
        target: &dyn Syncable,
        global_id: &GlobalId,
        mode: DeleteMode,
    ) -> Result<WriteKind, SyncError> {
        let model = target.name();
        let _token = self.guard.suppress(context, model, global_id);
        let deleted = self
            .resources
            .delete(context, model, target.global_identifier_key_name(), global_id, mode)
            .await?;

        self.events.publish(SyncEvent::ResourceDeleted {
            context: context.clone(),
            model: model.to_string(),
            global_id: global_id.clone(),
            force: mode.is_force(),
        });
        Ok(if deleted { WriteKind::Deleted } else { WriteKind::Unchanged })
    }

    pub async fn restore_counterpart(
        &self,
        context: &DbContext,
        target: &dyn Syncable,
        global_id: &GlobalId,
    ) -> Result<WriteKind, SyncError> {
        let model = target.name();
        let _token = self.guard.suppress(context, model, global_id);
        let restored = self
            .resources
            .restore(context, model, target.global_identifier_key_name(), global_id)
            .await?;
        Ok(if restored { WriteKind::Restored } else { WriteKind::Unchanged })
    }
}
