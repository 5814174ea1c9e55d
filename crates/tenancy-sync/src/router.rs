//! Routing of save notifications to counterpart databases.
//!
//! A save in a tenant database flows **from tenant**: the central record is
//! updated (or created), the origin tenant gets mapped to it, and every other
//! mapped tenant receives the change. A save in the central database flows
//! **from central** to every mapped tenant.
//!
//! ```text
//! tenant:t3 ──► central ──► tenant:t1
//!                      └──► tenant:t2
//! ```
//!
//! Tenant writes are isolated from each other: one failing tenant is recorded
//! in the [`PropagationReport`] and the fan-out moves on.

use std::sync::Arc;

use tenancy_core::{GlobalId, TenantKey};

use crate::context::DbContext;
use crate::contracts::{SyncModel, Syncable};
use crate::error::SyncError;
use crate::events::SavedResource;
use crate::report::{Direction, PropagationReport};
use crate::services::SyncServices;

/// Entry point for save notifications.
#[derive(Clone)]
pub struct SyncEventRouter {
    services: Arc<SyncServices>,
}

impl SyncEventRouter {
    pub(crate) fn new(services: Arc<SyncServices>) -> Self {
        Self { services }
    }

    /// Propagate a saved resource from `origin` to its counterparts.
    ///
    /// Notifications for records the sync subsystem is writing itself are
    /// ignored and yield a suppressed report. Failed tenant writes turn into
    /// [`SyncError::PartialPropagation`] once every target was attempted.
    pub async fn on_resource_saved(
        &self,
        resource: &SavedResource,
        origin: &DbContext,
    ) -> Result<PropagationReport, SyncError> {
        let services = &self.services;
        let model = services.registry.get(&resource.model)?;
        let syncable = model.syncable();
        let global_id = syncable.global_identifier(&resource.attributes)?;
        let direction = match origin {
            DbContext::Central => Direction::FromCentral,
            DbContext::Tenant(_) => Direction::FromTenant,
        };

        if services.guard.is_suppressed(origin, syncable.name(), &global_id) {
            tracing::trace!(
                origin = %origin,
                model = syncable.name(),
                global_id = %global_id,
                "Ignoring save made by the sync subsystem"
            );
            return Ok(PropagationReport::suppressed(direction, syncable.name(), global_id));
        }

        if !syncable.should_sync(&resource.attributes)
            || !resource.kind.affects(syncable.synced_attribute_names())
        {
            tracing::debug!(
                model = syncable.name(),
                global_id = %global_id,
                "Save does not touch synced attributes"
            );
            return Ok(PropagationReport::new(direction, syncable.name(), global_id));
        }

        let report = match origin {
            DbContext::Central => self.from_central(model, resource, global_id).await?,
            DbContext::Tenant(tenant) => {
                self.from_tenant(model, resource, tenant, global_id).await?
            }
        };

        tracing::info!(
            direction = %report.direction,
            model = %report.model,
            global_id = %report.global_id,
            targets = report.outcomes.len(),
            failed = report.failures().count(),
            "Propagated synced resource"
        );
        report.into_result()
    }

    async fn from_central(
        &self,
        model: &SyncModel,
        resource: &SavedResource,
        global_id: GlobalId,
    ) -> Result<PropagationReport, SyncError> {
        let services = &self.services;
        let master = model.require_master()?;
        let tenant_model = services.registry.tenant_for(master)?;
        let targets = services.mappings.tenants_for(master.name(), &global_id).await?;

        let mut report = PropagationReport::new(Direction::FromCentral, master.name(), global_id);
        self.fan_out(
            &mut report,
            targets,
            master.as_syncable(),
            resource,
            tenant_model,
        )
        .await;
        Ok(report)
    }

    async fn from_tenant(
        &self,
        model: &SyncModel,
        resource: &SavedResource,
        origin: &TenantKey,
        global_id: GlobalId,
    ) -> Result<PropagationReport, SyncError> {
        let services = &self.services;
        let SyncModel::Tenant(tenant_model) = model else {
            return Err(SyncError::NotSyncable(model.name().to_string()));
        };
        let tenant_model = tenant_model.as_ref();
        let central = services.registry.central_for(tenant_model)?;

        let written = services
            .upsert_counterpart(
                &DbContext::Central,
                tenant_model,
                &resource.attributes,
                central.as_syncable(),
                &global_id,
            )
            .await
            .map_err(|e| SyncError::CentralWrite {
                model: central.name().to_string(),
                global_id: global_id.clone(),
                source: e.into(),
            })?;

        // The mapping follows the central write, never precedes it.
        services.mappings.attach(central.name(), &global_id, origin).await?;

        let targets: Vec<TenantKey> = services
            .mappings
            .tenants_for(central.name(), &global_id)
            .await?
            .into_iter()
            .filter(|tenant| tenant != origin)
            .collect();

        let mut report = PropagationReport::new(Direction::FromTenant, tenant_model.name(), global_id);
        report.record(DbContext::Central, Ok(written));
        self.fan_out(&mut report, targets, tenant_model, resource, tenant_model)
            .await;
        Ok(report)
    }

    async fn fan_out(
        &self,
        report: &mut PropagationReport,
        targets: Vec<TenantKey>,
        source: &dyn Syncable,
        resource: &SavedResource,
        target: &dyn Syncable,
    ) {
        let services = &self.services;
        for tenant in targets {
            if services.is_cancelled() {
                tracing::warn!(
                    model = %report.model,
                    global_id = %report.global_id,
                    "Sync cancelled before all tenants were written"
                );
                report.cancelled = true;
                break;
            }

            let (context, result) = match services.tenant_context(&tenant).await {
                Ok(context) => {
                    let result = services
                        .upsert_counterpart(
                            &context,
                            source,
                            &resource.attributes,
                            target,
                            &report.global_id,
                        )
                        .await;
                    (context, result)
                }
                Err(e) => (DbContext::Tenant(tenant), Err(e)),
            };
            report.record(context, result);
        }
    }
}
