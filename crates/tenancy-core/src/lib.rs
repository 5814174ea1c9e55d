use serde::{Deserialize, Serialize};
use std::fmt;

// Configuration types shared across all tenancy crates
pub mod config;

// Re-export commonly used config types for convenience
pub use config::{
    ConfigError,
    ConnectionPoolConfig,
    CreationAttribute,
    ModelSide,
    RlsConfig,
    RlsUserConfig,
    SslMode,
    SyncConfig,
    SyncedModelConfig,
    // Main config
    TenancyConfig,
    TenantsTableConfig,
    UpstreamConfig,
};

/// Attribute bag of a single database record (column name -> value).
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// Key of a tenant, as stored in the tenants table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantKey(String);

impl TenantKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TenantKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Cross-database identifier correlating a central resource with its tenant mirrors.
///
/// Integer identifiers are kept in their decimal string form so that `7` and `"7"`
/// refer to the same resource on both sides.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GlobalId(String);

impl GlobalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read a global identifier out of an attribute value.
    ///
    /// Returns `None` for null, empty strings and non-scalar values.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            serde_json::Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::Value::String(self.0.clone())
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GlobalId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
