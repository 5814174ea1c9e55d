//! Per-target outcomes of a propagation.

use std::fmt;

use serde::Serialize;
use tenancy_core::{GlobalId, TenantKey};

use crate::context::DbContext;
use crate::error::SyncError;

/// Which way a change travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    FromTenant,
    FromCentral,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FromTenant => write!(f, "from_tenant"),
            Self::FromCentral => write!(f, "from_central"),
        }
    }
}

/// What happened to one counterpart record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteKind {
    Created,
    Updated,
    Deleted,
    Restored,
    /// Nothing to do in this target.
    Unchanged,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetOutcome {
    pub context: DbContext,
    #[serde(serialize_with = "serialize_result")]
    pub result: Result<WriteKind, String>,
}

fn serialize_result<S: serde::Serializer>(
    result: &Result<WriteKind, String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match result {
        Ok(kind) => kind.serialize(serializer),
        Err(message) => serializer.serialize_str(&format!("failed: {message}")),
    }
}

/// Outcome of propagating one change.
#[derive(Debug, Clone, Serialize)]
pub struct PropagationReport {
    pub direction: Direction,
    pub model: String,
    pub global_id: GlobalId,
    pub outcomes: Vec<TargetOutcome>,
    /// The notification was for a write made by the sync subsystem itself.
    pub suppressed: bool,
    pub cancelled: bool,
}

impl PropagationReport {
    pub fn new(direction: Direction, model: impl Into<String>, global_id: GlobalId) -> Self {
        Self {
            direction,
            model: model.into(),
            global_id,
            outcomes: Vec::new(),
            suppressed: false,
            cancelled: false,
        }
    }

    pub fn suppressed(direction: Direction, model: impl Into<String>, global_id: GlobalId) -> Self {
        Self {
            suppressed: true,
            ..Self::new(direction, model, global_id)
        }
    }

    pub fn record(&mut self, context: DbContext, result: Result<WriteKind, SyncError>) {
        if let Err(err) = &result {
            tracing::warn!(
                model = %self.model,
                global_id = %self.global_id,
                destination = %context,
                error = %err,
                "Sync target failed"
            );
        }
        self.outcomes.push(TargetOutcome {
            context,
            result: result.map_err(|e| e.to_string()),
        });
    }

    pub fn failures(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    /// Result of the write made in `context`, if any.
    pub fn outcome_for(&self, context: &DbContext) -> Option<&Result<WriteKind, String>> {
        self.outcomes
            .iter()
            .find(|o| o.context == *context)
            .map(|o| &o.result)
    }

    /// Tenant contexts that were written to.
    pub fn tenants(&self) -> Vec<&TenantKey> {
        self.outcomes
            .iter()
            .filter_map(|o| o.context.tenant())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        !self.cancelled && self.failures().next().is_none()
    }

    /// Turn failures or cancellation into an error carrying the whole report.
    pub fn into_result(self) -> Result<Self, SyncError> {
        if self.failures().next().is_some() {
            return Err(SyncError::PartialPropagation(Box::new(self)));
        }
        if self.cancelled {
            return Err(SyncError::Cancelled(Box::new(self)));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_turn_into_partial_propagation() {
        let mut report =
            PropagationReport::new(Direction::FromCentral, "users", GlobalId::new("acme"));
        report.record(DbContext::Tenant(TenantKey::new("t1")), Ok(WriteKind::Updated));
        report.record(
            DbContext::Tenant(TenantKey::new("t2")),
            Err(SyncError::Internal(anyhow::anyhow!("connection reset"))),
        );

        assert!(!report.is_success());
        let err = report.into_result().unwrap_err();
        assert_eq!(err.to_string(), "1 of 2 sync targets failed");
        let SyncError::PartialPropagation(report) = err else {
            panic!("expected partial propagation");
        };
        assert_eq!(
            report.outcome_for(&DbContext::Tenant(TenantKey::new("t1"))),
            Some(&Ok(WriteKind::Updated))
        );
    }

    #[test]
    fn test_report_serialization() {
        let mut report =
            PropagationReport::new(Direction::FromTenant, "users", GlobalId::new("acme"));
        report.record(DbContext::Central, Ok(WriteKind::Created));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["direction"], "from_tenant");
        assert_eq!(json["outcomes"][0]["result"], "created");
    }
}
