//! Reconciling desired policies with the live policy catalog.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::RlsError;
use crate::query::{
    HASH_LEN, POLICY_NAME_INFIX, PolicyDescriptor, drop_policy_statement, enable_rls_statement,
    force_rls_statement, quote_literal,
};
use crate::sink::{PolicyExecutionSink, Row};

/// Lists candidate generated policies; rows are narrowed by [`ExistingPolicy::is_managed`].
pub const EXISTING_POLICIES_SQL: &str =
    "SELECT policyname, tablename FROM pg_policies WHERE policyname LIKE '%\\_rls\\_policy\\_%'";

/// A policy found in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingPolicy {
    pub table: String,
    pub name: String,
}

impl ExistingPolicy {
    pub fn new(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
        }
    }

    /// Version suffix, if the name follows `{table}_rls_policy_{hash}`.
    pub fn hash(&self) -> Option<&str> {
        self.name
            .strip_prefix(self.table.as_str())?
            .strip_prefix(POLICY_NAME_INFIX)?
            .strip_prefix('_')
    }

    /// True for names this crate generates: `{table}_rls_policy_` plus a
    /// lowercase hex hash. Hand-written policies are never touched.
    pub fn is_managed(&self) -> bool {
        self.hash().is_some_and(|hash| {
            hash.len() == HASH_LEN
                && hash
                    .chars()
                    .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        })
    }

    fn from_row(row: &Row) -> Result<Self, RlsError> {
        let field = |key: &str| row.get(key).and_then(serde_json::Value::as_str);
        match (field("tablename"), field("policyname")) {
            (Some(table), Some(name)) => Ok(Self::new(table, name)),
            _ => Err(RlsError::UnexpectedRow(
                serde_json::Value::Object(row.clone()).to_string(),
            )),
        }
    }
}

/// Changes needed to move the catalog to the desired state.
#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    /// Outdated (or forced) policies on tables that still need one.
    pub drop: Vec<ExistingPolicy>,
    pub create: Vec<PolicyDescriptor>,
    /// Tables whose current policy already matches.
    pub unchanged: Vec<String>,
    /// Policies on tables that no longer need one.
    pub zombies: Vec<ExistingPolicy>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.drop.is_empty() && self.create.is_empty() && self.zombies.is_empty()
    }
}

/// Compute the changes between `desired` and `existing`.
///
/// With `force`, matching policies are recreated too. Tables in `protected`
/// keep their existing policies even though they have no desired one; this
/// covers tables whose generation failed.
pub fn reconcile(
    desired: &[PolicyDescriptor],
    existing: &[ExistingPolicy],
    force: bool,
    protected: &BTreeSet<String>,
) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();
    let existing: Vec<&ExistingPolicy> = existing.iter().filter(|p| p.is_managed()).collect();

    let mut by_table: BTreeMap<&str, Vec<&ExistingPolicy>> = BTreeMap::new();
    for policy in &existing {
        by_table.entry(policy.table.as_str()).or_default().push(policy);
    }

    let desired_tables: BTreeSet<&str> = desired.iter().map(|p| p.table.as_str()).collect();

    for policy in desired {
        let current = by_table.get(policy.table.as_str()).cloned().unwrap_or_default();
        let mut up_to_date = false;

        for found in current {
            if found.name == policy.name && !force {
                up_to_date = true;
            } else {
                plan.drop.push(found.clone());
            }
        }

        if up_to_date {
            plan.unchanged.push(policy.table.clone());
        } else {
            plan.create.push(policy.clone());
        }
    }

    for policy in &existing {
        if !desired_tables.contains(policy.table.as_str()) && !protected.contains(&policy.table) {
            plan.zombies.push((*policy).clone());
        }
    }

    plan
}

/// What an applied reconciliation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Names of created policies.
    pub created: Vec<String>,
    /// Names of dropped policies, zombies included.
    pub dropped: Vec<String>,
    /// Tables left untouched.
    pub unchanged: Vec<String>,
    /// Names of dropped zombie policies.
    pub zombies: Vec<String>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.dropped.is_empty()
    }
}

/// Applies reconcile plans through a [`PolicyExecutionSink`].
pub struct PolicyReconciler<'a> {
    sink: &'a dyn PolicyExecutionSink,
    force_rls: bool,
}

impl<'a> PolicyReconciler<'a> {
    pub fn new(sink: &'a dyn PolicyExecutionSink, force_rls: bool) -> Self {
        Self { sink, force_rls }
    }

    /// Read generated policies from the catalog.
    pub async fn existing_policies(&self) -> Result<Vec<ExistingPolicy>, RlsError> {
        let rows = self.sink.query(EXISTING_POLICIES_SQL).await?;
        let mut policies = Vec::with_capacity(rows.len());
        for row in &rows {
            let policy = ExistingPolicy::from_row(row)?;
            if policy.is_managed() {
                policies.push(policy);
            }
        }
        Ok(policies)
    }

    /// Reconcile the catalog against `desired` and apply the result.
    pub async fn reconcile(
        &self,
        desired: &[PolicyDescriptor],
        force: bool,
        protected: &BTreeSet<String>,
    ) -> Result<ReconcileReport, RlsError> {
        let existing = self.existing_policies().await?;
        let plan = reconcile(desired, &existing, force, protected);
        self.apply(plan).await
    }

    pub async fn apply(&self, plan: ReconcilePlan) -> Result<ReconcileReport, RlsError> {
        let mut report = ReconcileReport {
            unchanged: plan.unchanged,
            ..Default::default()
        };

        for zombie in &plan.zombies {
            self.sink
                .execute(&drop_policy_statement(&zombie.name, &zombie.table))
                .await?;
            tracing::warn!(
                table = %zombie.table,
                policy = %zombie.name,
                "Dropped zombie RLS policy"
            );
            report.dropped.push(zombie.name.clone());
            report.zombies.push(zombie.name.clone());
        }

        for stale in &plan.drop {
            self.sink
                .execute(&drop_policy_statement(&stale.name, &stale.table))
                .await?;
            tracing::info!(table = %stale.table, policy = %stale.name, "Dropped RLS policy");
            report.dropped.push(stale.name.clone());
        }

        for policy in &plan.create {
            self.sink.execute(&policy.create_statement()).await?;
            self.sink.execute(&enable_rls_statement(&policy.table)).await?;
            if self.force_rls {
                self.sink.execute(&force_rls_statement(&policy.table)).await?;
            }
            tracing::info!(
                table = %policy.table,
                policy = %policy.name,
                hash = %policy.hash,
                "Created RLS policy"
            );
            report.created.push(policy.name.clone());
        }

        for table in &report.unchanged {
            tracing::debug!(table = %table, "RLS policy up to date");
        }

        Ok(report)
    }
}

/// Names of the generated policies on `table`.
pub async fn list_rls_policies(
    sink: &dyn PolicyExecutionSink,
    table: &str,
) -> Result<Vec<String>, RlsError> {
    let pattern = format!("{}\\_%", like_escape(&format!("{table}{POLICY_NAME_INFIX}")));
    let sql = format!(
        "SELECT policyname, tablename FROM pg_policies WHERE tablename = {} AND policyname LIKE {}",
        quote_literal(table),
        quote_literal(&pattern),
    );
    let rows = sink.query(&sql).await?;
    let mut names = Vec::with_capacity(rows.len());
    for row in &rows {
        let policy = ExistingPolicy::from_row(row)?;
        if policy.is_managed() {
            names.push(policy.name);
        }
    }
    Ok(names)
}

fn like_escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Drop every generated policy on `table`, returning how many were dropped.
pub async fn drop_rls_policies(
    sink: &dyn PolicyExecutionSink,
    table: &str,
) -> Result<usize, RlsError> {
    let policies = list_rls_policies(sink, table).await?;
    for policy in &policies {
        sink.execute(&drop_policy_statement(policy, table)).await?;
    }
    Ok(policies.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desired(table: &str, hash: &str) -> PolicyDescriptor {
        PolicyDescriptor {
            table: table.to_string(),
            predicate: String::new(),
            hash: hash.to_string(),
            name: format!("{table}_rls_policy_{hash}"),
            role: None,
        }
    }

    #[test]
    fn test_hash_from_name() {
        let policy = ExistingPolicy::new("posts", "posts_rls_policy_abc123");
        assert_eq!(policy.hash(), Some("abc123"));
        assert_eq!(ExistingPolicy::new("posts", "posts_rls_policy").hash(), None);
        assert_eq!(ExistingPolicy::new("posts", "other").hash(), None);
    }

    #[test]
    fn test_only_generated_names_are_managed() {
        assert!(ExistingPolicy::new("posts", "posts_rls_policy_0a9f3c").is_managed());
        assert!(!ExistingPolicy::new("posts", "posts_rls_policy_admin").is_managed());
        assert!(!ExistingPolicy::new("posts", "posts_rls_policy_0A9F3C").is_managed());
        assert!(!ExistingPolicy::new("posts", "posts_rls_policy_0a9f3c1").is_managed());
        assert!(!ExistingPolicy::new("posts", "postsxrlsxpolicy_0a9f3c").is_managed());
    }

    #[test]
    fn test_hand_written_policies_are_left_alone() {
        let existing = [
            ExistingPolicy::new("posts", "posts_rls_policy_admin"),
            ExistingPolicy::new("drafts", "drafts_rls_policy_readonly"),
        ];
        let plan = reconcile(&[desired("posts", "aaaaaa")], &existing, false, &BTreeSet::new());
        assert!(plan.drop.is_empty());
        assert!(plan.zombies.is_empty());
        assert_eq!(plan.create.len(), 1);
    }

    #[test]
    fn test_like_patterns_escape_wildcards() {
        assert_eq!(like_escape("my_table_rls_policy"), "my\\_table\\_rls\\_policy");
        assert_eq!(EXISTING_POLICIES_SQL.matches("\\_").count(), 3);
    }

    #[test]
    fn test_missing_policy_is_created() {
        let plan = reconcile(&[desired("posts", "aaaaaa")], &[], false, &BTreeSet::new());
        assert_eq!(plan.create.len(), 1);
        assert!(plan.drop.is_empty());
        assert!(plan.zombies.is_empty());
    }

    #[test]
    fn test_same_hash_is_unchanged() {
        let existing = [ExistingPolicy::new("posts", "posts_rls_policy_aaaaaa")];
        let plan = reconcile(&[desired("posts", "aaaaaa")], &existing, false, &BTreeSet::new());
        assert!(plan.is_empty());
        assert_eq!(plan.unchanged, vec!["posts".to_string()]);
    }

    #[test]
    fn test_stale_hash_is_replaced() {
        let existing = [ExistingPolicy::new("posts", "posts_rls_policy_aaaaaa")];
        let plan = reconcile(&[desired("posts", "bbbbbb")], &existing, false, &BTreeSet::new());
        assert_eq!(plan.drop, existing.to_vec());
        assert_eq!(plan.create.len(), 1);
        assert_eq!(plan.create[0].hash, "bbbbbb");
    }

    #[test]
    fn test_force_recreates_matching_policy() {
        let existing = [ExistingPolicy::new("posts", "posts_rls_policy_aaaaaa")];
        let plan = reconcile(&[desired("posts", "aaaaaa")], &existing, true, &BTreeSet::new());
        assert_eq!(plan.drop.len(), 1);
        assert_eq!(plan.create.len(), 1);
        assert!(plan.unchanged.is_empty());
    }

    #[test]
    fn test_zombies_are_dropped_unless_protected() {
        let existing = [
            ExistingPolicy::new("old_table", "old_table_rls_policy_aaaaaa"),
            ExistingPolicy::new("broken", "broken_rls_policy_bbbbbb"),
        ];
        let protected = BTreeSet::from(["broken".to_string()]);
        let plan = reconcile(&[], &existing, false, &protected);
        assert_eq!(plan.zombies, vec![existing[0].clone()]);
    }

    #[test]
    fn test_unexpected_row() {
        let mut row = Row::new();
        row.insert("policyname".to_string(), "x".into());
        assert!(matches!(
            ExistingPolicy::from_row(&row),
            Err(RlsError::UnexpectedRow(_))
        ));
    }
}
