//! Attribute projection between counterpart models.

use tenancy_core::{Attributes, CreationAttribute, GlobalId};

use crate::contracts::Syncable;

/// Computes the attributes written to a counterpart record.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeProjector;

impl AttributeProjector {
    /// Synced attributes of `source`, for updating an existing counterpart.
    pub fn project_for_update(
        &self,
        source: &dyn Syncable,
        record: &Attributes,
        target: &dyn Syncable,
    ) -> Attributes {
        let mut attributes = only(record, source.synced_attribute_names().iter());
        if source.global_identifier_key_name() != target.global_identifier_key_name() {
            attributes.remove(source.global_identifier_key_name());
        }
        restrict_to_columns(attributes, target)
    }

    /// Attributes for creating a counterpart of `record` in `target`.
    ///
    /// An explicit creation list on the target copies the synced attributes plus
    /// the listed names from the source, then applies the listed defaults.
    /// Without a list, every source attribute is copied. The target's global
    /// identifier is always set.
    pub fn project_for_create(
        &self,
        source: &dyn Syncable,
        record: &Attributes,
        target: &dyn Syncable,
        global_id: &GlobalId,
    ) -> Attributes {
        let mut attributes = match target.creation_attributes() {
            Some(entries) => {
                let copied = entries.iter().filter_map(|entry| match entry {
                    CreationAttribute::Copy(name) => Some(name),
                    CreationAttribute::Default(..) => None,
                });
                let mut attributes = only(record, source.synced_attribute_names().iter().chain(copied));
                for entry in entries {
                    if let CreationAttribute::Default(name, value) = entry {
                        attributes.insert(name.clone(), value.clone());
                    }
                }
                attributes
            }
            None => record.clone(),
        };

        if source.global_identifier_key_name() != target.global_identifier_key_name() {
            attributes.remove(source.global_identifier_key_name());
        }
        attributes.insert(
            target.global_identifier_key_name().to_string(),
            global_id.to_value(),
        );

        restrict_to_columns(attributes, target)
    }
}

fn only<'a>(record: &Attributes, names: impl Iterator<Item = &'a String>) -> Attributes {
    let mut attributes = Attributes::new();
    for name in names {
        if let Some(value) = record.get(name) {
            attributes.insert(name.clone(), value.clone());
        }
    }
    attributes
}

fn restrict_to_columns(mut attributes: Attributes, target: &dyn Syncable) -> Attributes {
    if let Some(columns) = target.columns() {
        let key = target.global_identifier_key_name();
        attributes.retain(|name, _| name == key || columns.iter().any(|c| c == name));
    }
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelDefinition;
    use serde_json::json;
    use tenancy_core::SyncedModelConfig;

    fn model(yaml: &str) -> ModelDefinition {
        let config: SyncedModelConfig = serde_yaml::from_str(yaml).unwrap();
        ModelDefinition::from_config(&config, "global_id")
    }

    fn central() -> ModelDefinition {
        model(
            "
name: users
side: central
counterpart: tenant_users
synced_attributes: [global_id, name, email]
",
        )
    }

    fn record(value: serde_json::Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_update_copies_synced_subset() {
        let source = central();
        let target = model(
            "
name: tenant_users
side: tenant
counterpart: users
synced_attributes: [global_id, name, email]
",
        );
        let projected = AttributeProjector.project_for_update(
            &source,
            &record(json!({"global_id": "acme", "name": "X", "email": "x@a.io", "role": "admin"})),
            &target,
        );
        assert_eq!(
            serde_json::Value::Object(projected),
            json!({"global_id": "acme", "name": "X", "email": "x@a.io"})
        );
    }

    #[test]
    fn test_create_applies_defaults_over_source_values() {
        let source = central();
        let target = model(
            "
name: tenant_users
side: tenant
counterpart: users
synced_attributes: [global_id, name]
creation_attributes:
  - name
  - password: secret
",
        );
        let projected = AttributeProjector.project_for_create(
            &source,
            &record(json!({"global_id": "acme", "name": "X", "password": "Y", "role": "admin"})),
            &target,
            &GlobalId::new("acme"),
        );
        assert_eq!(projected["name"], json!("X"));
        assert_eq!(projected["password"], json!("secret"));
        assert_eq!(projected["global_id"], json!("acme"));
        assert!(!projected.contains_key("role"));
    }

    #[test]
    fn test_create_without_list_copies_everything() {
        let source = central();
        let target = model(
            "
name: tenant_users
side: tenant
counterpart: users
synced_attributes: [global_id, name]
",
        );
        let projected = AttributeProjector.project_for_create(
            &source,
            &record(json!({"global_id": "acme", "name": "X", "role": "admin"})),
            &target,
            &GlobalId::new("acme"),
        );
        assert_eq!(projected.len(), 3);
        assert_eq!(projected["role"], json!("admin"));
    }

    #[test]
    fn test_unknown_target_columns_are_dropped() {
        let source = central();
        let target = model(
            "
name: tenant_users
side: tenant
counterpart: users
synced_attributes: [global_id, name]
columns: [name]
",
        );
        let projected = AttributeProjector.project_for_create(
            &source,
            &record(json!({"global_id": "acme", "name": "X", "foo": "bar"})),
            &target,
            &GlobalId::new("acme"),
        );
        assert!(!projected.contains_key("foo"));
        assert_eq!(projected["global_id"], json!("acme"));
    }

    #[test]
    fn test_global_id_column_is_renamed_for_target() {
        let source = central();
        let config: SyncedModelConfig = serde_yaml::from_str(
            "
name: tenant_users
side: tenant
counterpart: users
synced_attributes: [name]
",
        )
        .unwrap();
        let target = ModelDefinition::from_config(&config, "user_global_id");

        let projected = AttributeProjector.project_for_create(
            &source,
            &record(json!({"global_id": "acme", "name": "X"})),
            &target,
            &GlobalId::new("acme"),
        );
        assert!(!projected.contains_key("global_id"));
        assert_eq!(projected["user_global_id"], json!("acme"));
    }
}
