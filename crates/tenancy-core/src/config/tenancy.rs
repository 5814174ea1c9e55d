//! Tenants table configuration.
//!
//! The tenants table is the root every row-level security path leads to,
//! and the table whose keys identify tenant databases for resource syncing.

use serde::{Deserialize, Serialize};

/// Where tenants live in the central database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantsTableConfig {
    /// Name of the tenants table.
    #[serde(default = "default_tenants_table")]
    pub table: String,

    /// Primary key column of the tenants table.
    #[serde(default = "default_key_column")]
    pub key_column: String,

    /// Type of tenant identifier (uuid, integer, string).
    #[serde(default = "default_key_type", rename = "key_type")]
    pub key_type: String,
}

impl Default for TenantsTableConfig {
    fn default() -> Self {
        Self {
            table: default_tenants_table(),
            key_column: default_key_column(),
            key_type: default_key_type(),
        }
    }
}

impl TenantsTableConfig {
    /// Check if a table is the tenants table.
    pub fn is_tenants_table(&self, table_name: &str) -> bool {
        // Strip schema prefix if present (e.g., "public.tenants" -> "tenants")
        let name = table_name.rsplit('.').next().unwrap_or(table_name);
        name == self.table
    }
}

// Default value functions
fn default_tenants_table() -> String {
    "tenants".to_string()
}

fn default_key_column() -> String {
    "id".to_string()
}

fn default_key_type() -> String {
    "string".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TenantsTableConfig::default();
        assert_eq!(config.table, "tenants");
        assert_eq!(config.key_column, "id");
    }

    #[test]
    fn test_schema_qualified_name() {
        let config = TenantsTableConfig::default();
        assert!(config.is_tenants_table("public.tenants"));
        assert!(config.is_tenants_table("tenants"));
        assert!(!config.is_tenants_table("tenant_users"));
    }
}
