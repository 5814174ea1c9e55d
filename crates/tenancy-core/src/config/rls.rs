//! Row-level security configuration.

use serde::{Deserialize, Serialize};

/// Settings for deriving and applying RLS policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RlsConfig {
    /// Database schema whose tables are scanned.
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Session variable holding the current tenant key.
    /// Policies compare against `current_setting('<name>')`.
    #[serde(default = "default_session_variable_name")]
    pub session_variable_name: String,

    /// Role the policies apply to. When unset, policies apply to all roles.
    #[serde(default)]
    pub user: Option<RlsUserConfig>,

    /// Scope every foreign key unless its column is commented `no-rls`.
    ///
    /// When disabled, only columns commented `rls` (or `rls table.column`)
    /// take part in policy paths.
    #[serde(default = "default_true")]
    pub scope_by_default: bool,

    /// Also `FORCE ROW LEVEL SECURITY` so table owners are scoped too.
    #[serde(default = "default_true")]
    pub force_rls: bool,
}

impl Default for RlsConfig {
    fn default() -> Self {
        Self {
            schema: default_schema(),
            session_variable_name: default_session_variable_name(),
            user: None,
            scope_by_default: true,
            force_rls: true,
        }
    }
}

/// Credentials of the role tenant connections use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RlsUserConfig {
    pub username: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Environment variable containing the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

impl RlsUserConfig {
    /// Get the password, checking password_env first.
    pub fn password(&self) -> Option<String> {
        if let Some(env_var) = &self.password_env
            && let Ok(password) = std::env::var(env_var)
        {
            return Some(password);
        }
        self.password.clone()
    }
}

// Default value functions
fn default_schema() -> String {
    "public".to_string()
}

fn default_session_variable_name() -> String {
    "my.current_tenant".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RlsConfig::default();
        assert_eq!(config.schema, "public");
        assert_eq!(config.session_variable_name, "my.current_tenant");
        assert!(config.scope_by_default);
        assert!(config.force_rls);
        assert!(config.user.is_none());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: RlsConfig = serde_yaml::from_str("force_rls: false\n").unwrap();
        assert!(!config.force_rls);
        assert!(config.scope_by_default);
        assert_eq!(config.session_variable_name, "my.current_tenant");
    }
}
