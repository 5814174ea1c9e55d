//! Capabilities of synced models.
//!
//! Tenant-side models implement [`Syncable`]; central-side models additionally
//! implement [`SyncMaster`]. Which one a model is gets decided once, when it is
//! registered as a [`SyncModel`] variant.

use std::sync::Arc;

use tenancy_core::{Attributes, CreationAttribute, GlobalId};

use crate::error::SyncError;

/// A model whose records are mirrored across databases.
pub trait Syncable: Send + Sync {
    /// Model name, as used by the resource store.
    fn name(&self) -> &str;

    /// Column holding the global identifier.
    fn global_identifier_key_name(&self) -> &str;

    /// Columns kept equal across the central record and its mirrors.
    fn synced_attribute_names(&self) -> &[String];

    /// Name of the central-side counterpart.
    fn central_model_name(&self) -> &str;

    /// How to build a new record of this model from a counterpart.
    ///
    /// `None` copies every attribute of the source.
    fn creation_attributes(&self) -> Option<&[CreationAttribute]> {
        None
    }

    /// Columns this model has; attributes outside the list are dropped on write.
    fn columns(&self) -> Option<&[String]> {
        None
    }

    fn soft_deletes(&self) -> bool {
        false
    }

    /// Whether a change to `record` should be propagated at all.
    fn should_sync(&self, _record: &Attributes) -> bool {
        true
    }

    /// Global identifier of a record of this model.
    fn global_identifier(&self, record: &Attributes) -> Result<GlobalId, SyncError> {
        record
            .get(self.global_identifier_key_name())
            .and_then(GlobalId::from_value)
            .ok_or_else(|| SyncError::MissingGlobalId {
                model: self.name().to_string(),
                column: self.global_identifier_key_name().to_string(),
            })
    }
}

/// A central-side model that owns the tenant mappings.
pub trait SyncMaster: Syncable {
    /// Name of the tenant-side counterpart.
    fn tenant_model_name(&self) -> &str;

    fn as_syncable(&self) -> &dyn Syncable;
}

/// A registered model, tagged with the side it lives on.
#[derive(Clone)]
pub enum SyncModel {
    Master(Arc<dyn SyncMaster>),
    Tenant(Arc<dyn Syncable>),
}

impl SyncModel {
    pub fn name(&self) -> &str {
        self.syncable().name()
    }

    pub fn syncable(&self) -> &dyn Syncable {
        match self {
            Self::Master(master) => master.as_syncable(),
            Self::Tenant(model) => model.as_ref(),
        }
    }

    pub fn master(&self) -> Option<&dyn SyncMaster> {
        match self {
            Self::Master(master) => Some(master.as_ref()),
            Self::Tenant(_) => None,
        }
    }

    /// The model as a sync master, or a configuration error.
    pub fn require_master(&self) -> Result<&dyn SyncMaster, SyncError> {
        self.master()
            .ok_or_else(|| SyncError::NotSyncMaster(self.name().to_string()))
    }
}

impl std::fmt::Debug for SyncModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Master(_) => write!(f, "Master({})", self.name()),
            Self::Tenant(_) => write!(f, "Tenant({})", self.name()),
        }
    }
}
