use {
    anonka_common::{Role, UserId, UserRecord},
    async_trait::async_trait,
};

use crate::Result;

/// Aggregate usage counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserStats {
    pub total_users: u64,
    /// Sum of every user's message count.
    pub total_messages: u64,
}

/// Persistent storage for relay users.
///
/// Every mutating call is durable once it returns.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Register the user: insert it if absent, or mark a seeded record as
    /// started and fill in its missing name. A started record is returned
    /// unchanged.
    ///
    /// Concurrent calls for the same identity leave exactly one row behind.
    async fn upsert_user(&self, id: UserId, name: Option<&str>) -> Result<UserRecord>;

    async fn get_user(&self, id: UserId) -> Result<Option<UserRecord>>;

    /// Bump the relayed message counter. Unknown identities are ignored.
    async fn increment_message_count(&self, id: UserId) -> Result<()>;

    /// Fails with [`crate::Error::NotFound`] when the identity has no record.
    async fn set_role(&self, id: UserId, role: Role) -> Result<()>;

    /// List users, optionally restricted to one role, ordered by identity.
    async fn list_users(&self, role: Option<Role>) -> Result<Vec<UserRecord>>;

    async fn stats(&self) -> Result<UserStats>;

    /// Merge a configured role seed into the store.
    ///
    /// Absent identities are inserted with `role` and not started; existing
    /// ones are raised to `role` when they currently hold a lower one and are
    /// never lowered.
    async fn seed_roles(&self, role: Role, ids: &[UserId]) -> Result<()>;
}
