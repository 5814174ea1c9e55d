//! Resource syncing configuration.
//!
//! Defines which models are kept in sync between the central database and
//! tenant databases, which of their attributes are synced, and how a missing
//! counterpart record is created.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use super::ConfigError;

/// Resource syncing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Pivot table mapping central resources to tenants.
    #[serde(default = "default_pivot_table")]
    pub pivot_table: String,

    /// Tenant key column of the pivot table.
    #[serde(default = "default_tenant_key_column")]
    pub tenant_key_column: String,

    /// Default global identifier column for synced models.
    #[serde(default = "default_global_id_column")]
    pub global_id_column: String,

    /// Include soft deleted records when locating the counterpart of a saved resource.
    #[serde(default)]
    pub include_trashed: bool,

    /// Synced model definitions.
    #[serde(default)]
    pub models: Vec<SyncedModelConfig>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pivot_table: default_pivot_table(),
            tenant_key_column: default_tenant_key_column(),
            global_id_column: default_global_id_column(),
            include_trashed: false,
            models: Vec::new(),
        }
    }
}

impl SyncConfig {
    /// Check that every model has a counterpart on the opposite side that points back.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut by_name: HashMap<&str, &SyncedModelConfig> = HashMap::new();
        for model in &self.models {
            if by_name.insert(model.name.as_str(), model).is_some() {
                return Err(ConfigError::Config(format!(
                    "Synced model '{}' is defined more than once",
                    model.name
                )));
            }
        }

        for model in &self.models {
            let counterpart = by_name.get(model.counterpart.as_str()).ok_or_else(|| {
                ConfigError::Config(format!(
                    "Synced model '{}' references unknown counterpart '{}'",
                    model.name, model.counterpart
                ))
            })?;

            if counterpart.side == model.side {
                return Err(ConfigError::Config(format!(
                    "Synced models '{}' and '{}' are both on the {} side",
                    model.name, counterpart.name, model.side
                )));
            }

            if counterpart.counterpart != model.name {
                return Err(ConfigError::Config(format!(
                    "Synced model '{}' points to '{}', but '{}' points to '{}'",
                    model.name, counterpart.name, counterpart.name, counterpart.counterpart
                )));
            }
        }

        Ok(())
    }

    /// Global identifier column of a model, falling back to the default.
    pub fn global_id_column_for<'a>(&'a self, model: &'a SyncedModelConfig) -> &'a str {
        model
            .global_id_column
            .as_deref()
            .unwrap_or(&self.global_id_column)
    }
}

/// Which database a model lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSide {
    /// The sync master, stored in the central database.
    Central,
    /// The mirror, stored in every tenant database it is mapped to.
    Tenant,
}

impl std::fmt::Display for ModelSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Central => write!(f, "central"),
            Self::Tenant => write!(f, "tenant"),
        }
    }
}

/// Definition of one synced model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncedModelConfig {
    /// Model (table) name.
    pub name: String,

    /// Database the model lives in.
    pub side: ModelSide,

    /// The model on the other side.
    pub counterpart: String,

    /// Attributes kept equal across all copies.
    #[serde(default)]
    pub synced_attributes: Vec<String>,

    /// How to build a record of this model from its counterpart when it does not exist yet.
    ///
    /// When unset, every attribute of the counterpart is copied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_attributes: Option<Vec<CreationAttribute>>,

    /// Columns this model has. Attributes outside this list are dropped
    /// when writing a record of this model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,

    /// Override of the global identifier column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_id_column: Option<String>,

    /// Whether deletes on this model are soft deletes.
    #[serde(default)]
    pub soft_deletes: bool,

    /// Whether this model takes part in syncing at all.
    #[serde(default = "default_true")]
    pub should_sync: bool,
}

impl SyncedModelConfig {
    /// Load a model definition from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        serde_yaml::from_str(&content).map_err(ConfigError::from)
    }
}

/// One entry of a creation attribute list.
///
/// In YAML, a plain string copies the attribute from the source record,
/// and a single-entry map uses the given literal instead:
///
/// ```yaml
/// creation_attributes:
///   - name
///   - password: secret
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCreationAttribute", into = "RawCreationAttribute")]
pub enum CreationAttribute {
    /// Copy the source record's current value.
    Copy(String),
    /// Ignore the source and use a literal.
    Default(String, serde_json::Value),
}

impl CreationAttribute {
    pub fn name(&self) -> &str {
        match self {
            Self::Copy(name) | Self::Default(name, _) => name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawCreationAttribute {
    Name(String),
    WithDefault(BTreeMap<String, serde_json::Value>),
}

impl TryFrom<RawCreationAttribute> for CreationAttribute {
    type Error = String;

    fn try_from(raw: RawCreationAttribute) -> Result<Self, Self::Error> {
        match raw {
            RawCreationAttribute::Name(name) => Ok(Self::Copy(name)),
            RawCreationAttribute::WithDefault(map) => {
                if map.len() != 1 {
                    return Err(format!(
                        "creation attribute defaults must have exactly one entry, found {}",
                        map.len()
                    ));
                }
                let (name, value) = map
                    .into_iter()
                    .next()
                    .ok_or_else(|| "empty creation attribute".to_string())?;
                Ok(Self::Default(name, value))
            }
        }
    }
}

impl From<CreationAttribute> for RawCreationAttribute {
    fn from(attribute: CreationAttribute) -> Self {
        match attribute {
            CreationAttribute::Copy(name) => Self::Name(name),
            CreationAttribute::Default(name, value) => {
                Self::WithDefault(BTreeMap::from([(name, value)]))
            }
        }
    }
}

// Default value functions
fn default_pivot_table() -> String {
    "tenant_resources".to_string()
}

fn default_tenant_key_column() -> String {
    "tenant_id".to_string()
}

fn default_global_id_column() -> String {
    "global_id".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn model(name: &str, side: ModelSide, counterpart: &str) -> SyncedModelConfig {
        SyncedModelConfig {
            name: name.to_string(),
            side,
            counterpart: counterpart.to_string(),
            synced_attributes: vec!["name".to_string()],
            creation_attributes: None,
            columns: None,
            global_id_column: None,
            soft_deletes: false,
            should_sync: true,
        }
    }

    #[test]
    fn test_parse_creation_attributes() {
        let yaml = r#"
name: tenant_users
side: tenant
counterpart: central_users
creation_attributes:
  - name
  - password: secret
  - role: 3
"#;
        let config: SyncedModelConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config.creation_attributes.unwrap(),
            vec![
                CreationAttribute::Copy("name".to_string()),
                CreationAttribute::Default("password".to_string(), json!("secret")),
                CreationAttribute::Default("role".to_string(), json!(3)),
            ]
        );
        assert!(config.should_sync);
    }

    #[test]
    fn test_multi_entry_default_is_rejected() {
        let yaml = r#"
name: tenant_users
side: tenant
counterpart: central_users
creation_attributes:
  - { a: 1, b: 2 }
"#;
        assert!(serde_yaml::from_str::<SyncedModelConfig>(yaml).is_err());
    }

    #[test]
    fn test_validate_rejects_same_side_counterparts() {
        let config = SyncConfig {
            models: vec![
                model("central_users", ModelSide::Central, "other_users"),
                model("other_users", ModelSide::Central, "central_users"),
            ],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_counterpart() {
        let config = SyncConfig {
            models: vec![model("central_users", ModelSide::Central, "tenant_users")],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unknown counterpart"));
    }

    #[test]
    fn test_global_id_column_override() {
        let config = SyncConfig::default();
        let mut m = model("central_users", ModelSide::Central, "tenant_users");
        assert_eq!(config.global_id_column_for(&m), "global_id");
        m.global_id_column = Some("uuid".to_string());
        assert_eq!(config.global_id_column_for(&m), "uuid");
    }
}
