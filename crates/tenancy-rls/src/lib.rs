//! # tenancy-rls
//!
//! Row-Level Security policy derivation for shared-database tenancy.
//!
//! This crate provides functionality to:
//! - Build a graph of tables and foreign keys from a live schema
//! - Find the shortest eligible path from every table to the tenants table
//! - Turn each path into a nested `CREATE POLICY` statement
//! - Reconcile generated policies with the ones already in the database
//!
//! ## How It Works
//!
//! Tables rarely carry a tenant column directly. A `comments` row belongs to a
//! tenant because its post belongs to an author that belongs to the tenant:
//!
//! ```sql
//! CREATE POLICY comments_rls_policy_1a2b3c ON comments USING (
//!     post_id IN (
//!         SELECT id
//!         FROM posts
//!         WHERE author_id IN (
//!             SELECT id
//!             FROM authors
//!             WHERE tenant_id::text = current_setting('my.current_tenant')
//!         )
//!     )
//! );
//! ```
//!
//! ## Column Comments
//!
//! | Comment | Effect |
//! |---------|--------|
//! | `rls` | Foreign key is part of RLS paths |
//! | `no-rls` | Foreign key is never part of RLS paths |
//! | `rls <table>.<column>` | Declares a reference without a foreign key |
//!
//! ## Reconciliation
//!
//! | Existing policy | Action |
//! |-----------------|--------|
//! | none | create |
//! | different hash | drop, then create |
//! | same hash | keep (recreate with `force`) |
//! | table no longer scoped | drop (zombie) |

pub mod classifier;
pub mod error;
pub mod manager;
pub mod path_finder;
pub mod query;
pub mod reconciler;
pub mod schema;
pub mod sink;
pub mod user;

pub use classifier::{Annotation, ConstraintClassifier};
pub use error::RlsError;
pub use manager::{GeneratedPolicies, PolicyRun, RlsPolicyManager};
pub use path_finder::{Path, PathFinder, PathStep, Resolution, ShortestPaths};
pub use query::{PolicyDescriptor, PolicyQueryBuilder, policy_hash, quote_ident, quote_literal};
pub use reconciler::{
    EXISTING_POLICIES_SQL, ExistingPolicy, PolicyReconciler, ReconcilePlan, ReconcileReport,
    drop_rls_policies, list_rls_policies, reconcile,
};
pub use schema::{
    Column, ColumnInfo, EdgeOrigin, ForeignKeyEdge, ForeignKeyInfo, SchemaGraph,
    SchemaIntrospector, Table, TableSnapshot,
};
pub use sink::{PolicyExecutionSink, Row};
