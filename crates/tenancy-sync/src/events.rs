//! Sync lifecycle events and the event bus.
//!
//! [`SyncEvent::ResourceSaved`] is the only event that drives propagation.
//! Writes made while propagating publish [`SyncEvent::SavedInForeignDatabase`]
//! instead, so listeners can react to them without re-entering the router.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tenancy_core::{Attributes, GlobalId, TenantKey};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::context::DbContext;

/// How a record came to be saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SaveKind {
    Created,
    Updated { changed: BTreeSet<String> },
}

impl SaveKind {
    /// Whether this save makes a difference to the synced attributes.
    pub fn affects(&self, synced: &[String]) -> bool {
        match self {
            Self::Created => true,
            Self::Updated { changed } => synced.iter().any(|name| changed.contains(name)),
        }
    }
}

/// A record saved through the public write path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedResource {
    pub model: String,
    pub attributes: Attributes,
    pub kind: SaveKind,
}

impl SavedResource {
    pub fn new(model: impl Into<String>, attributes: Attributes, kind: SaveKind) -> Self {
        Self {
            model: model.into(),
            attributes,
            kind,
        }
    }
}

/// Lifecycle notifications of the sync subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum SyncEvent {
    /// A synced record was saved by the application.
    ResourceSaved {
        context: DbContext,
        resource: SavedResource,
    },
    /// A counterpart record was written while propagating a save.
    SavedInForeignDatabase {
        context: DbContext,
        model: String,
        attributes: Attributes,
    },
    CentralResourceAttachedToTenant {
        model: String,
        global_id: GlobalId,
        tenant: TenantKey,
    },
    CentralResourceDetachedFromTenant {
        model: String,
        global_id: GlobalId,
        tenant: TenantKey,
    },
    ResourceDeleted {
        context: DbContext,
        model: String,
        global_id: GlobalId,
        force: bool,
    },
    SyncMasterDeleted {
        model: String,
        global_id: GlobalId,
        force: bool,
    },
    SyncMasterRestored {
        model: String,
        global_id: GlobalId,
    },
}

impl SyncEvent {
    pub fn kind(&self) -> SyncEventKind {
        match self {
            Self::ResourceSaved { .. } => SyncEventKind::ResourceSaved,
            Self::SavedInForeignDatabase { .. } => SyncEventKind::SavedInForeignDatabase,
            Self::CentralResourceAttachedToTenant { .. } => SyncEventKind::AttachedToTenant,
            Self::CentralResourceDetachedFromTenant { .. } => SyncEventKind::DetachedFromTenant,
            Self::ResourceDeleted { .. } => SyncEventKind::ResourceDeleted,
            Self::SyncMasterDeleted { .. } => SyncEventKind::SyncMasterDeleted,
            Self::SyncMasterRestored { .. } => SyncEventKind::SyncMasterRestored,
        }
    }
}

/// Event type without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEventKind {
    ResourceSaved,
    SavedInForeignDatabase,
    AttachedToTenant,
    DetachedFromTenant,
    ResourceDeleted,
    SyncMasterDeleted,
    SyncMasterRestored,
}

impl fmt::Display for SyncEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResourceSaved => write!(f, "RESOURCE_SAVED"),
            Self::SavedInForeignDatabase => write!(f, "SAVED_IN_FOREIGN_DATABASE"),
            Self::AttachedToTenant => write!(f, "ATTACHED_TO_TENANT"),
            Self::DetachedFromTenant => write!(f, "DETACHED_FROM_TENANT"),
            Self::ResourceDeleted => write!(f, "RESOURCE_DELETED"),
            Self::SyncMasterDeleted => write!(f, "SYNC_MASTER_DELETED"),
            Self::SyncMasterRestored => write!(f, "SYNC_MASTER_RESTORED"),
        }
    }
}

/// An event as delivered to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedEvent {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: SyncEvent,
}

impl PublishedEvent {
    pub fn new(event: SyncEvent) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            event,
        }
    }
}

/// Publish side of the host's event system.
pub trait EventBus: Send + Sync {
    fn publish(&self, event: SyncEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventBus;

impl EventBus for NullEventBus {
    fn publish(&self, _event: SyncEvent) {}
}

/// Fans events out to any number of subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastEventBus {
    sender: broadcast::Sender<PublishedEvent>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus for BroadcastEventBus {
    fn publish(&self, event: SyncEvent) {
        let kind = event.kind();
        // Sending only fails when nobody is subscribed.
        if self.sender.send(PublishedEvent::new(event)).is_err() {
            tracing::trace!(event = %kind, "No subscribers for sync event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_affects_only_synced_changes() {
        let synced = vec!["name".to_string(), "email".to_string()];
        let local = SaveKind::Updated {
            changed: BTreeSet::from(["nickname".to_string()]),
        };
        let shared = SaveKind::Updated {
            changed: BTreeSet::from(["nickname".to_string(), "email".to_string()]),
        };
        assert!(!local.affects(&synced));
        assert!(shared.affects(&synced));
        assert!(SaveKind::Created.affects(&[]));
    }

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscribers() {
        let bus = BroadcastEventBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(SyncEvent::SyncMasterRestored {
            model: "users".to_string(),
            global_id: GlobalId::new("acme"),
        });

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event.kind(), SyncEventKind::SyncMasterRestored);
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        BroadcastEventBus::default().publish(SyncEvent::SyncMasterRestored {
            model: "users".to_string(),
            global_id: GlobalId::new("acme"),
        });
    }

    #[test]
    fn test_event_serialization() {
        let event = PublishedEvent::new(SyncEvent::ResourceDeleted {
            context: DbContext::Tenant(TenantKey::new("t1")),
            model: "tenant_users".to_string(),
            global_id: GlobalId::new("acme"),
            force: false,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "resource_deleted");
        assert_eq!(json["context"]["tenant"], "t1");
    }
}
