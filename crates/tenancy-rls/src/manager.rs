//! Policy generation facade.

use std::collections::{BTreeMap, BTreeSet};

use tenancy_core::{RlsConfig, TenancyConfig};

use crate::classifier::ConstraintClassifier;
use crate::error::RlsError;
use crate::path_finder::PathFinder;
use crate::query::{PolicyDescriptor, PolicyQueryBuilder};
use crate::reconciler::{PolicyReconciler, ReconcileReport};
use crate::schema::{SchemaGraph, SchemaIntrospector};
use crate::sink::PolicyExecutionSink;
use crate::user::{create_user_statement, grant_statements, user_exists_query};

/// Policies derived from one schema snapshot.
#[derive(Debug, Default)]
pub struct GeneratedPolicies {
    /// One policy per reachable table.
    pub policies: BTreeMap<String, PolicyDescriptor>,
    /// Tables with no eligible route to the tenants table.
    pub unreachable: BTreeSet<String>,
    /// Per-table topology errors.
    pub errors: Vec<RlsError>,
}

impl GeneratedPolicies {
    pub fn descriptors(&self) -> Vec<PolicyDescriptor> {
        self.policies.values().cloned().collect()
    }

    /// Tables whose generation failed.
    pub fn failed_tables(&self) -> BTreeSet<String> {
        self.errors
            .iter()
            .filter_map(|err| match err {
                RlsError::RecursiveRelationship { table } => Some(table.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Result of a full generate-and-reconcile run.
#[derive(Debug)]
pub struct PolicyRun {
    pub generated: GeneratedPolicies,
    pub report: ReconcileReport,
}

/// Derives RLS policies from a schema and applies them.
#[derive(Debug, Clone)]
pub struct RlsPolicyManager {
    config: RlsConfig,
    root_table: String,
}

impl RlsPolicyManager {
    pub fn new(config: RlsConfig, root_table: impl Into<String>) -> Self {
        Self {
            config,
            root_table: root_table.into(),
        }
    }

    pub fn from_config(config: &TenancyConfig) -> Self {
        let table = &config.tenants.table;
        let root = table.rsplit('.').next().unwrap_or(table);
        Self::new(config.rls.clone(), root)
    }

    pub fn root_table(&self) -> &str {
        &self.root_table
    }

    fn query_builder(&self) -> PolicyQueryBuilder {
        PolicyQueryBuilder::new(&self.root_table, &self.config.session_variable_name)
            .with_role(self.config.user.as_ref().map(|u| u.username.clone()))
    }

    /// Derive one policy per table reachable from the tenants table.
    ///
    /// Recursive tables are reported in [`GeneratedPolicies::errors`] and do not
    /// stop generation for the others.
    pub fn generate_policies(&self, graph: &SchemaGraph) -> Result<GeneratedPolicies, RlsError> {
        let classifier = ConstraintClassifier::new(self.config.scope_by_default);
        let mut finder = PathFinder::new(graph, classifier, &self.root_table)?;
        let paths = finder.shortest_paths();
        let builder = self.query_builder();

        let policies = paths
            .paths
            .iter()
            .map(|(table, path)| (table.clone(), builder.build_query(table, path)))
            .collect::<BTreeMap<_, _>>();

        tracing::info!(
            root = %self.root_table,
            policies = policies.len(),
            unreachable = paths.unreachable.len(),
            recursive = paths.recursive.len(),
            "Generated RLS policies"
        );

        Ok(GeneratedPolicies {
            errors: paths.errors(),
            unreachable: paths.unreachable,
            policies,
        })
    }

    /// Introspect the configured schema and derive its policies.
    pub async fn generate_from(
        &self,
        introspector: &dyn SchemaIntrospector,
    ) -> Result<GeneratedPolicies, RlsError> {
        let graph = SchemaGraph::introspect(introspector, &self.config.schema).await?;
        self.generate_policies(&graph)
    }

    /// Bring the live policies in line with `generated`.
    ///
    /// Tables that failed generation keep whatever policy they had.
    pub async fn reconcile(
        &self,
        sink: &dyn PolicyExecutionSink,
        generated: &GeneratedPolicies,
        force: bool,
    ) -> Result<ReconcileReport, RlsError> {
        let reconciler = PolicyReconciler::new(sink, self.config.force_rls);
        reconciler
            .reconcile(&generated.descriptors(), force, &generated.failed_tables())
            .await
    }

    /// Create the configured RLS user unless it exists, then grant it access
    /// to the schema. Returns whether the user was created.
    pub async fn ensure_rls_user(&self, sink: &dyn PolicyExecutionSink) -> Result<bool, RlsError> {
        let user = self.config.user.as_ref().ok_or(RlsError::MissingRlsUser)?;
        let password = user
            .password()
            .ok_or_else(|| RlsError::MissingRlsPassword(user.username.clone()))?;

        let exists = !sink.query(&user_exists_query(&user.username)).await?.is_empty();
        if !exists {
            sink.execute(&create_user_statement(&user.username, &password))
                .await?;
            tracing::info!(user = %user.username, "Created RLS user");
        }

        for grant in grant_statements(&user.username, &self.config.schema) {
            sink.execute(&grant).await?;
        }

        Ok(!exists)
    }

    /// Introspect, generate and reconcile in one go.
    pub async fn run(
        &self,
        introspector: &dyn SchemaIntrospector,
        sink: &dyn PolicyExecutionSink,
        force: bool,
    ) -> Result<PolicyRun, RlsError> {
        let generated = self.generate_from(introspector).await?;
        for err in &generated.errors {
            tracing::error!(error = %err, "RLS policy generation failed for table");
        }
        let report = self.reconcile(sink, &generated, force).await?;
        Ok(PolicyRun { generated, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TableSnapshot;

    #[test]
    fn test_root_table_strips_schema() {
        let mut config = TenancyConfig::default();
        config.tenants.table = "public.tenants".to_string();
        assert_eq!(RlsPolicyManager::from_config(&config).root_table(), "tenants");
    }

    #[test]
    fn test_generate_reports_recursive_tables_without_aborting() {
        let graph = SchemaGraph::from_snapshots(vec![
            TableSnapshot::new("tenants").column("id", false, None),
            TableSnapshot::new("authors")
                .column("tenant_id", false, None)
                .foreign_key("tenant_id", "tenants", "id"),
            TableSnapshot::new("loop_a")
                .column("b_id", false, None)
                .foreign_key("b_id", "loop_b", "id"),
            TableSnapshot::new("loop_b")
                .column("a_id", false, None)
                .foreign_key("a_id", "loop_a", "id"),
        ])
        .unwrap();

        let generated = RlsPolicyManager::new(RlsConfig::default(), "tenants")
            .generate_policies(&graph)
            .unwrap();

        assert_eq!(generated.policies.len(), 1);
        assert!(generated.policies.contains_key("authors"));
        assert_eq!(
            generated.failed_tables(),
            BTreeSet::from(["loop_a".to_string(), "loop_b".to_string()])
        );
    }

    #[test]
    fn test_role_comes_from_rls_user() {
        let graph = SchemaGraph::from_snapshots(vec![
            TableSnapshot::new("tenants").column("id", false, None),
            TableSnapshot::new("authors")
                .column("tenant_id", false, None)
                .foreign_key("tenant_id", "tenants", "id"),
        ])
        .unwrap();

        let config = RlsConfig {
            user: Some(tenancy_core::RlsUserConfig {
                username: "tenant_user".to_string(),
                password: None,
                password_env: None,
            }),
            ..Default::default()
        };
        let generated = RlsPolicyManager::new(config, "tenants")
            .generate_policies(&graph)
            .unwrap();
        assert_eq!(
            generated.policies["authors"].role.as_deref(),
            Some("tenant_user")
        );
    }
}
