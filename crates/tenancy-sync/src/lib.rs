//! # tenancy-sync
//!
//! Resource synchronization between a central database and tenant databases.
//!
//! A *sync master* lives in the central database and is mirrored into every
//! tenant it is mapped to. Its synced attributes are kept equal in both
//! directions: a save on either side is written to the counterpart records,
//! keyed by a global identifier shared by all of them.
//!
//! ```text
//!              ┌──────────────────────┐
//!              │ central: users       │
//!              │ global_id = acme     │
//!              └──────────┬───────────┘
//!            tenant_resources (pivot)
//!         ┌───────────────┼───────────────┐
//!  ┌──────▼──────┐ ┌──────▼──────┐ ┌──────▼──────┐
//!  │ t1: users   │ │ t2: users   │ │ t3: users   │
//!  └─────────────┘ └─────────────┘ └─────────────┘
//! ```
//!
//! ## Writing
//!
//! [`SyncEngine::save`] is the public write path. Writes made while
//! propagating go through the [`ResourceStore`] directly and hold a
//! [`LoopGuard`] token, so save notifications for them never re-enter the
//! [`SyncEventRouter`].
//!
//! ## Failure handling
//!
//! A failed central write aborts the propagation before any mapping is
//! touched. Failed tenant writes are collected in a [`PropagationReport`]
//! while the remaining tenants are still written.

pub mod context;
pub mod contracts;
pub mod engine;
pub mod error;
pub mod events;
pub mod guard;
pub mod ids;
pub mod mapping;
pub mod model;
pub mod projector;
pub mod report;
pub mod router;
mod services;
pub mod store;

pub use context::{DbContext, StaticTenantDirectory, TenantDirectory};
pub use contracts::{SyncMaster, SyncModel, Syncable};
pub use engine::{SaveOutcome, SyncEngine, SyncEngineBuilder};
pub use error::SyncError;
pub use events::{
    BroadcastEventBus, EventBus, NullEventBus, PublishedEvent, SaveKind, SavedResource, SyncEvent,
    SyncEventKind,
};
pub use guard::{LoopGuard, SuppressionToken};
pub use ids::{UniqueIdentifierGenerator, UuidGenerator};
pub use mapping::MappingMaintainer;
pub use model::{ModelDefinition, ModelRegistry};
pub use projector::AttributeProjector;
pub use report::{Direction, PropagationReport, TargetOutcome, WriteKind};
pub use router::SyncEventRouter;
pub use store::{DeleteMode, MappingStore, MemoryMappingStore, MemoryResourceStore, ResourceStore};
