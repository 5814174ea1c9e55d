//! Suppression of save notifications for internal writes.
//!
//! Every write the router makes on behalf of a propagation holds a
//! [`SuppressionToken`] for the record it touches. A save notification for a
//! suppressed record is ignored, which is what stops a mirror write from
//! re-entering the router when the host's save hooks fire for it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tenancy_core::GlobalId;

use crate::context::DbContext;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WriteKey {
    context: DbContext,
    model: String,
    global_id: GlobalId,
}

/// Tracks records currently being written by the sync subsystem.
#[derive(Debug, Clone, Default)]
pub struct LoopGuard {
    active: Arc<Mutex<HashMap<WriteKey, usize>>>,
}

impl LoopGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppress save notifications for one record until the token drops.
    pub fn suppress(&self, context: &DbContext, model: &str, global_id: &GlobalId) -> SuppressionToken {
        let key = WriteKey {
            context: context.clone(),
            model: model.to_string(),
            global_id: global_id.clone(),
        };
        *self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_default() += 1;
        SuppressionToken {
            active: Arc::clone(&self.active),
            key,
        }
    }

    pub fn is_suppressed(&self, context: &DbContext, model: &str, global_id: &GlobalId) -> bool {
        let key = WriteKey {
            context: context.clone(),
            model: model.to_string(),
            global_id: global_id.clone(),
        };
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&key)
    }
}

/// Keeps a record suppressed while alive.
#[derive(Debug)]
pub struct SuppressionToken {
    active: Arc<Mutex<HashMap<WriteKey, usize>>>,
    key: WriteKey,
}

impl Drop for SuppressionToken {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = active.get_mut(&self.key) {
            *count -= 1;
            if *count == 0 {
                active.remove(&self.key);
            }
        }
    }
}
