//! Config-driven model definitions and the model registry.

use std::collections::HashMap;
use std::sync::Arc;

use tenancy_core::{Attributes, CreationAttribute, ModelSide, SyncConfig, SyncedModelConfig};

use crate::contracts::{SyncMaster, SyncModel, Syncable};
use crate::error::SyncError;

/// A synced model described by configuration.
#[derive(Debug, Clone)]
pub struct ModelDefinition {
    name: String,
    side: ModelSide,
    counterpart: String,
    global_id_column: String,
    synced_attributes: Vec<String>,
    creation_attributes: Option<Vec<CreationAttribute>>,
    columns: Option<Vec<String>>,
    soft_deletes: bool,
    should_sync: bool,
}

impl ModelDefinition {
    pub fn from_config(config: &SyncedModelConfig, global_id_column: &str) -> Self {
        Self {
            name: config.name.clone(),
            side: config.side,
            counterpart: config.counterpart.clone(),
            global_id_column: global_id_column.to_string(),
            synced_attributes: config.synced_attributes.clone(),
            creation_attributes: config.creation_attributes.clone(),
            columns: config.columns.clone(),
            soft_deletes: config.soft_deletes,
            should_sync: config.should_sync,
        }
    }

    pub fn side(&self) -> ModelSide {
        self.side
    }

    /// Tag the definition with its side.
    pub fn into_model(self) -> SyncModel {
        match self.side {
            ModelSide::Central => SyncModel::Master(Arc::new(self)),
            ModelSide::Tenant => SyncModel::Tenant(Arc::new(self)),
        }
    }
}

impl Syncable for ModelDefinition {
    fn name(&self) -> &str {
        &self.name
    }

    fn global_identifier_key_name(&self) -> &str {
        &self.global_id_column
    }

    fn synced_attribute_names(&self) -> &[String] {
        &self.synced_attributes
    }

    fn central_model_name(&self) -> &str {
        match self.side {
            ModelSide::Central => &self.name,
            ModelSide::Tenant => &self.counterpart,
        }
    }

    fn creation_attributes(&self) -> Option<&[CreationAttribute]> {
        self.creation_attributes.as_deref()
    }

    fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    fn soft_deletes(&self) -> bool {
        self.soft_deletes
    }

    fn should_sync(&self, _record: &Attributes) -> bool {
        self.should_sync
    }
}

impl SyncMaster for ModelDefinition {
    fn tenant_model_name(&self) -> &str {
        &self.counterpart
    }

    fn as_syncable(&self) -> &dyn Syncable {
        self
    }
}

/// Registered synced models by name.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, SyncModel>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from validated configuration.
    pub fn from_config(config: &SyncConfig) -> Result<Self, SyncError> {
        config.validate()?;

        let mut registry = Self::new();
        for model in &config.models {
            let definition = ModelDefinition::from_config(model, config.global_id_column_for(model));
            registry.register(definition.into_model());
        }

        tracing::debug!(models = registry.models.len(), "Loaded synced models");
        Ok(registry)
    }

    /// Register a model, replacing any model with the same name.
    pub fn register(&mut self, model: SyncModel) {
        self.models.insert(model.name().to_string(), model);
    }

    pub fn get(&self, name: &str) -> Result<&SyncModel, SyncError> {
        self.models
            .get(name)
            .ok_or_else(|| SyncError::UnknownModel(name.to_string()))
    }

    pub fn syncable(&self, name: &str) -> Result<&dyn Syncable, SyncError> {
        Ok(self.get(name)?.syncable())
    }

    pub fn master(&self, name: &str) -> Result<&dyn SyncMaster, SyncError> {
        self.get(name)?.require_master()
    }

    /// The central counterpart of a tenant-side model.
    pub fn central_for(&self, model: &dyn Syncable) -> Result<&dyn SyncMaster, SyncError> {
        self.master(model.central_model_name())
    }

    /// The tenant-side counterpart of a central model.
    pub fn tenant_for(&self, master: &dyn SyncMaster) -> Result<&dyn Syncable, SyncError> {
        let tenant = self.get(master.tenant_model_name())?;
        if tenant.master().is_some() {
            return Err(SyncError::NotSyncable(tenant.name().to_string()));
        }
        Ok(tenant.syncable())
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
