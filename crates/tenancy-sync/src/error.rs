//! Error types for the sync crate.

use tenancy_core::{ConfigError, GlobalId, TenantKey};
use thiserror::Error;

use crate::report::PropagationReport;

/// Errors that can occur while synchronizing resources.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A central-side model was expected but the model is not a sync master.
    #[error("model '{0}' is not a sync master")]
    NotSyncMaster(String),

    /// A tenant-side model was expected but the model is a sync master.
    #[error("model '{0}' is not a tenant-side syncable model")]
    NotSyncable(String),

    /// No model with this name is registered.
    #[error("unknown synced model '{0}'")]
    UnknownModel(String),

    /// The record carries no global identifier.
    #[error("record of model '{model}' has no value for '{column}'")]
    MissingGlobalId { model: String, column: String },

    /// No record with this global identifier exists.
    #[error("no '{model}' record with global identifier {global_id}")]
    ResourceNotFound { model: String, global_id: GlobalId },

    /// The record is soft deleted and must be restored first.
    #[error("'{model}' record {global_id} is soft deleted")]
    Trashed { model: String, global_id: GlobalId },

    /// The tenant directory does not know this tenant.
    #[error("unknown tenant '{0}'")]
    UnknownTenant(TenantKey),

    /// The central record could not be written; no mapping was touched.
    #[error("failed to write central '{model}' record {global_id}: {source}")]
    CentralWrite {
        model: String,
        global_id: GlobalId,
        #[source]
        source: anyhow::Error,
    },

    /// Some tenant writes of a fan-out failed; the others were applied.
    #[error("{} of {} sync targets failed", .0.failures().count(), .0.outcomes.len())]
    PartialPropagation(Box<PropagationReport>),

    /// The fan-out was cancelled between two tenants.
    #[error("sync cancelled after {} targets", .0.outcomes.len())]
    Cancelled(Box<PropagationReport>),

    /// Invalid sync configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Internal error (store, mapping or directory failure).
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
