//! Staging store: per-employee scratch space held until commit or reset.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use super::model::{StagedDocument, StagedProfile};
use super::passcode::PasscodeChallenge;

/// Uncommitted profile data for one employee.
#[derive(Debug, Clone, Serialize)]
pub struct StagingSession {
    pub profile: StagedProfile,
    pub documents: Vec<StagedDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge: Option<PasscodeChallenge>,
    pub staged_at: DateTime<Utc>,
}

impl StagingSession {
    pub fn new(profile: StagedProfile, documents: Vec<StagedDocument>) -> Self {
        Self {
            profile,
            documents,
            challenge: None,
            staged_at: Utc::now(),
        }
    }
}

/// One employee's staging slot. Holding the lock serialises every
/// workflow operation for that employee.
pub type StagingSlot = Arc<Mutex<Option<StagingSession>>>;

/// Staging sessions keyed by user identity.
#[derive(Default)]
pub struct StagingStore {
    slots: RwLock<HashMap<String, StagingSlot>>,
}

impl StagingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (or lazily create) the slot for a user.
    pub async fn slot(&self, user_id: &str) -> StagingSlot {
        if let Some(slot) = self.slots.read().await.get(user_id) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().await;
        Arc::clone(slots.entry(user_id.to_string()).or_default())
    }

    /// Forget a user's slot once nothing is staged in it and no other
    /// operation holds it. Callers drop their own handle first.
    pub async fn release(&self, user_id: &str) {
        let mut slots = self.slots.write().await;
        let idle = slots.get(user_id).is_some_and(|slot| {
            Arc::strong_count(slot) == 1 && slot.try_lock().is_ok_and(|session| session.is_none())
        });
        if idle {
            slots.remove(user_id);
        }
    }

    /// Number of slots currently held in the map, staged or not.
    pub async fn tracked_slots(&self) -> usize {
        self.slots.read().await.len()
    }

    /// Snapshot of a user's staging session, for read-only views.
    pub async fn peek(&self, user_id: &str) -> Option<StagingSession> {
        let slot = self.slots.read().await.get(user_id).cloned()?;
        let session = slot.lock().await;
        session.clone()
    }

    /// Number of users with a live staging session.
    pub async fn active_sessions(&self) -> usize {
        let slots: Vec<StagingSlot> = self.slots.read().await.values().cloned().collect();
        let mut active = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                active += 1;
            }
        }
        active
    }
}
