//! Durable user storage for the relay: identity, role, display name and the
//! relayed message counter.
//!
//! The schema lives in `migrations/` and is applied by [`run_migrations`];
//! [`open`] does both connecting and migrating.

pub mod error;
pub mod sqlite;
pub mod store;

pub use {
    error::{Error, Result},
    sqlite::{SqliteUserStore, open, open_in_memory},
    store::{UserStats, UserStore},
};

/// Run database migrations for the store crate.
///
/// Creates the `users` table. Safe to call on every startup.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
