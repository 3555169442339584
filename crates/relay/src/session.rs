//! Per-user conversation state.
//!
//! Each identity owns one slot guarded by an async mutex. The engine holds
//! the slot's guard for the whole handling of an event, which serializes
//! events per user while different users proceed in parallel.

use std::sync::Arc;

use {
    anonka_common::UserId,
    dashmap::DashMap,
    tokio::sync::{Mutex, OwnedMutexGuard},
};

/// Which free-text reply the operator is expected to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminKind {
    Broadcast,
    Promote,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    /// The next content item is relayed to the operator.
    AwaitingRelayContent,
    /// The next text message is the operator's answer to an admin prompt.
    AwaitingAdminReply(AdminKind),
}

impl SessionState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingRelayContent => "awaiting_relay_content",
            Self::AwaitingAdminReply(AdminKind::Broadcast) => "awaiting_broadcast",
            Self::AwaitingAdminReply(AdminKind::Promote) => "awaiting_promote",
        }
    }
}

/// Exclusive access to one user's state.
pub type SessionGuard = OwnedMutexGuard<SessionState>;

/// Concurrent map from identity to conversation state. Memory grows with the
/// number of distinct identities seen; slots are never evicted so every
/// identity keeps exactly one mutex for the life of the process.
#[derive(Debug, Default)]
pub struct SessionTracker {
    slots: DashMap<UserId, Arc<Mutex<SessionState>>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: UserId) -> Arc<Mutex<SessionState>> {
        Arc::clone(self.slots.entry(id).or_default().value())
    }

    /// Wait for exclusive access to `id`'s state.
    pub async fn lock(&self, id: UserId) -> SessionGuard {
        self.slot(id).lock_owned().await
    }

    /// Current state, `Idle` for unknown identities.
    pub async fn get(&self, id: UserId) -> SessionState {
        let slot = self.slots.get(&id).map(|s| Arc::clone(s.value()));
        match slot {
            Some(slot) => *slot.lock().await,
            None => SessionState::Idle,
        }
    }

    pub async fn set(&self, id: UserId, state: SessionState) {
        *self.lock(id).await = state;
    }

    pub async fn clear(&self, id: UserId) {
        self.set(id, SessionState::Idle).await;
    }

    /// Number of identities with a slot.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
