//! Column annotations and edge eligibility.
//!
//! Scoping intent is read from column comments once, while the schema graph
//! is built:
//!
//! | Comment | Annotation |
//! |---------|------------|
//! | `rls` | [`Annotation::Include`] |
//! | `no-rls` | [`Annotation::Exclude`] |
//! | `rls <table>.<column>` | [`Annotation::ExplicitRef`] |
//! | `no-rls <table>.<column>` | [`Annotation::Exclude`] |
//! | anything else, or no comment | [`Annotation::Unmarked`] |

use crate::error::RlsError;

const INCLUDE: &str = "rls";
const EXCLUDE: &str = "no-rls";

/// Scoping intent attached to a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    /// No `rls`/`no-rls` comment.
    Unmarked,
    /// Explicitly part of RLS paths.
    Include,
    /// Never part of RLS paths.
    Exclude,
    /// Included, and declares a foreign reference the schema has no constraint for.
    ExplicitRef { table: String, column: String },
}

impl Annotation {
    /// Parse a column comment.
    ///
    /// `table` and `column` only label errors.
    pub fn parse(table: &str, column: &str, comment: Option<&str>) -> Result<Self, RlsError> {
        let Some(comment) = comment else {
            return Ok(Self::Unmarked);
        };

        let mut tokens = comment.split_whitespace();
        let action = match tokens.next() {
            Some(action @ (INCLUDE | EXCLUDE)) => action,
            _ => return Ok(Self::Unmarked),
        };
        let reference = tokens.next();

        let malformed = |reason: &str| RlsError::MalformedComment {
            table: table.to_string(),
            column: column.to_string(),
            comment: comment.to_string(),
            reason: reason.to_string(),
        };

        if tokens.next().is_some() {
            return Err(malformed("expected '<action> <table>.<column>'"));
        }

        let Some(reference) = reference else {
            return Ok(if action == INCLUDE {
                Self::Include
            } else {
                Self::Exclude
            });
        };

        let (ref_table, ref_column) = reference
            .split_once('.')
            .ok_or_else(|| malformed("reference must be '<table>.<column>'"))?;
        if ref_table.is_empty() || ref_column.is_empty() || ref_column.contains('.') {
            return Err(malformed("reference must be '<table>.<column>'"));
        }

        if action == EXCLUDE {
            return Ok(Self::Exclude);
        }

        Ok(Self::ExplicitRef {
            table: ref_table.to_string(),
            column: ref_column.to_string(),
        })
    }

    fn is_included(&self) -> bool {
        matches!(self, Self::Include | Self::ExplicitRef { .. })
    }
}

/// Decides which foreign-key edges may be part of a policy path.
#[derive(Debug, Clone, Copy)]
pub struct ConstraintClassifier {
    scope_by_default: bool,
}

impl ConstraintClassifier {
    /// With `scope_by_default`, every edge not marked `no-rls` is eligible.
    /// Without it, only edges marked `rls` are.
    pub fn new(scope_by_default: bool) -> Self {
        Self { scope_by_default }
    }

    pub fn is_eligible(&self, annotation: &Annotation) -> bool {
        match annotation {
            Annotation::Exclude => false,
            _ if self.scope_by_default => true,
            other => other.is_included(),
        }
    }
}
