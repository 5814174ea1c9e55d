//! Error types for the RLS crate.

use thiserror::Error;

/// Errors that can occur while deriving or applying RLS policies.
#[derive(Debug, Error)]
pub enum RlsError {
    /// A column comment uses the `rls`/`no-rls` syntax incorrectly.
    #[error("malformed RLS comment '{comment}' on {table}.{column}: {reason}")]
    MalformedComment {
        table: String,
        column: String,
        comment: String,
        reason: String,
    },

    /// A comment constraint references a table or column that does not exist.
    #[error("comment constraint on {table}.{column} references unknown {reference}")]
    UnknownReference {
        table: String,
        column: String,
        reference: String,
    },

    /// The tenants table is not part of the introspected schema.
    #[error("root table '{0}' not found in schema")]
    UnknownRootTable(String),

    /// Every route from this table to the tenants table runs through a cycle.
    #[error("table {table} only reaches the tenants table through recursive relationships")]
    RecursiveRelationship { table: String },

    /// No RLS user is configured.
    #[error("no RLS user configured")]
    MissingRlsUser,

    /// The RLS user has neither a password nor a set password variable.
    #[error("no password configured for RLS user '{0}'")]
    MissingRlsPassword(String),

    /// The policy catalog returned a row without the expected columns.
    #[error("unexpected policy catalog row: {0}")]
    UnexpectedRow(String),

    /// Internal error (introspection or execution failure).
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
