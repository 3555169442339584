use std::{
    collections::HashSet,
    path::Path,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use {
    anonka_common::{Role, UserId, UserRecord},
    async_trait::async_trait,
    sqlx::{
        SqlitePool,
        sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    },
    tracing::{debug, info},
};

use crate::{
    Error, Result,
    error::Context,
    store::{UserStats, UserStore},
};

/// Open (creating if needed) the database file at `path` and apply migrations.
///
/// Writes use `synchronous = FULL` so an acknowledged mutation survives a
/// crash right after it returns.
pub async fn open(path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;
    crate::run_migrations(&pool).await?;

    info!(path = %path.display(), "user store opened");
    Ok(pool)
}

/// Single-connection in-memory database with migrations applied.
///
/// The connection is never recycled, otherwise the data would vanish with it.
#[doc(hidden)]
pub async fn open_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    crate::run_migrations(&pool).await?;
    Ok(pool)
}

#[derive(sqlx::FromRow)]
struct UserRow {
    user_id: i64,
    name: Option<String>,
    role: String,
    message_count: i64,
    started: bool,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = Error;

    fn try_from(r: UserRow) -> Result<Self> {
        let role = r
            .role
            .parse::<Role>()
            .with_context(|| format!("user {} has a corrupt role column", r.user_id))?;
        Ok(Self {
            id: UserId(r.user_id),
            name: r.name,
            role,
            message_count: u64::try_from(r.message_count).unwrap_or_default(),
            started: r.started,
        })
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// SQL expression ranking a role column so seeding can compare tiers.
const ROLE_RANK_EXISTING: &str =
    "CASE users.role WHEN 'operator' THEN 3 WHEN 'trusted' THEN 2 ELSE 1 END";
const ROLE_RANK_SEEDED: &str =
    "CASE excluded.role WHEN 'operator' THEN 3 WHEN 'trusted' THEN 2 ELSE 1 END";

/// SQLite-backed user store.
pub struct SqliteUserStore {
    pool: SqlitePool,
    bootstrap_operators: HashSet<UserId>,
}

impl SqliteUserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            bootstrap_operators: HashSet::new(),
        }
    }

    /// Identities that get `Operator` instead of `Standard` when first inserted.
    pub fn with_bootstrap_operators(mut self, ids: impl IntoIterator<Item = UserId>) -> Self {
        self.bootstrap_operators.extend(ids);
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn initial_role(&self, id: UserId) -> Role {
        if self.bootstrap_operators.contains(&id) {
            Role::Operator
        } else {
            Role::Standard
        }
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn upsert_user(&self, id: UserId, name: Option<&str>) -> Result<UserRecord> {
        let now = now_secs();
        let changed = sqlx::query(
            "INSERT INTO users (user_id, name, role, message_count, started, created_at, updated_at)
             VALUES (?, ?, ?, 0, 1, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
               started = 1,
               name = COALESCE(users.name, excluded.name),
               updated_at = excluded.updated_at
             WHERE users.started = 0",
        )
        .bind(id.get())
        .bind(name)
        .bind(self.initial_role(id).as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if changed > 0 {
            debug!(user_id = %id, "user registered");
        }

        self.get_user(id)
            .await?
            .with_context(|| format!("user {id} vanished right after upsert"))
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT user_id, name, role, message_count, started FROM users WHERE user_id = ?",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;
        row.map(UserRecord::try_from).transpose()
    }

    async fn increment_message_count(&self, id: UserId) -> Result<()> {
        sqlx::query(
            "UPDATE users SET message_count = message_count + 1, updated_at = ?
             WHERE user_id = ?",
        )
        .bind(now_secs())
        .bind(id.get())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_role(&self, id: UserId, role: Role) -> Result<()> {
        let result = sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE user_id = ?")
            .bind(role.as_str())
            .bind(now_secs())
            .bind(id.get())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(id));
        }
        info!(user_id = %id, %role, "user role changed");
        Ok(())
    }

    async fn list_users(&self, role: Option<Role>) -> Result<Vec<UserRecord>> {
        let rows = match role {
            Some(role) => {
                sqlx::query_as::<_, UserRow>(
                    "SELECT user_id, name, role, message_count, started FROM users
                     WHERE role = ? ORDER BY user_id",
                )
                .bind(role.as_str())
                .fetch_all(&self.pool)
                .await?
            },
            None => {
                sqlx::query_as::<_, UserRow>(
                    "SELECT user_id, name, role, message_count, started FROM users ORDER BY user_id",
                )
                .fetch_all(&self.pool)
                .await?
            },
        };
        rows.into_iter().map(UserRecord::try_from).collect()
    }

    async fn stats(&self) -> Result<UserStats> {
        let (total_users, total_messages) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*), COALESCE(SUM(message_count), 0) FROM users",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(UserStats {
            total_users: u64::try_from(total_users).unwrap_or_default(),
            total_messages: u64::try_from(total_messages).unwrap_or_default(),
        })
    }

    async fn seed_roles(&self, role: Role, ids: &[UserId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let now = now_secs();
        let sql = format!(
            "INSERT INTO users (user_id, name, role, message_count, started, created_at, updated_at)
             VALUES (?, NULL, ?, 0, 0, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
               role = excluded.role,
               updated_at = excluded.updated_at
             WHERE {ROLE_RANK_EXISTING} < {ROLE_RANK_SEEDED}"
        );

        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query(&sql)
                .bind(id.get())
                .bind(role.as_str())
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        info!(%role, count = ids.len(), "role seed merged");
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::sync::Arc};

    async fn test_store() -> SqliteUserStore {
        SqliteUserStore::new(open_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let store = test_store().await;

        let first = store.upsert_user(UserId(7), Some("Alice")).await.unwrap();
        store.increment_message_count(UserId(7)).await.unwrap();
        let second = store.upsert_user(UserId(7), Some("Renamed")).await.unwrap();

        assert_eq!(first.role, Role::Standard);
        assert!(first.started);
        assert_eq!(second.name.as_deref(), Some("Alice"));
        assert_eq!(second.message_count, 1);
        assert_eq!(store.list_users(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_upserts_leave_one_row() {
        let store = Arc::new(test_store().await);

        let tasks = (0..8).map(|_| {
            let store = Arc::clone(&store);
            async move { store.upsert_user(UserId(9), None).await }
        });
        let results = futures::future::join_all(tasks).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(store.stats().await.unwrap().total_users, 1);
    }

    #[tokio::test]
    async fn bootstrap_operator_gets_operator_role() {
        let store = test_store().await.with_bootstrap_operators([UserId(42)]);

        let op = store.upsert_user(UserId(42), None).await.unwrap();
        let user = store.upsert_user(UserId(7), None).await.unwrap();

        assert_eq!(op.role, Role::Operator);
        assert_eq!(user.role, Role::Standard);
    }

    #[tokio::test]
    async fn increment_unknown_user_is_a_noop() {
        let store = test_store().await;
        store.increment_message_count(UserId(1)).await.unwrap();
        assert!(store.get_user(UserId(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_role_unknown_user_is_not_found() {
        let store = test_store().await;
        let err = store.set_role(UserId(5), Role::Trusted).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { user_id } if user_id == UserId(5)));
    }

    #[tokio::test]
    async fn stats_sum_message_counts() {
        let store = test_store().await;
        assert_eq!(store.stats().await.unwrap(), UserStats::default());

        store.upsert_user(UserId(1), None).await.unwrap();
        store.upsert_user(UserId(2), None).await.unwrap();
        for _ in 0..3 {
            store.increment_message_count(UserId(1)).await.unwrap();
        }
        store.increment_message_count(UserId(2)).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.total_messages, 4);
    }

    #[tokio::test]
    async fn list_users_filters_by_role() {
        let store = test_store().await;
        for id in [3, 1, 2] {
            store.upsert_user(UserId(id), None).await.unwrap();
        }
        store.set_role(UserId(2), Role::Trusted).await.unwrap();

        let trusted = store.list_users(Some(Role::Trusted)).await.unwrap();
        assert_eq!(trusted.len(), 1);
        assert_eq!(trusted[0].id, UserId(2));

        let mut all: Vec<_> = store
            .list_users(None)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect();
        all.sort();
        assert_eq!(all, vec![UserId(1), UserId(2), UserId(3)]);
    }

    #[tokio::test]
    async fn seed_roles_raises_but_never_lowers() {
        let store = test_store().await;
        store.upsert_user(UserId(1), Some("Standard")).await.unwrap();
        store.upsert_user(UserId(2), None).await.unwrap();
        store.set_role(UserId(2), Role::Operator).await.unwrap();

        store
            .seed_roles(Role::Trusted, &[UserId(1), UserId(2), UserId(3)])
            .await
            .unwrap();
        // Seeding twice changes nothing.
        store
            .seed_roles(Role::Trusted, &[UserId(1), UserId(2), UserId(3)])
            .await
            .unwrap();

        let get = |id| store.get_user(UserId(id));
        assert_eq!(get(1).await.unwrap().unwrap().role, Role::Trusted);
        assert_eq!(
            get(1).await.unwrap().unwrap().name.as_deref(),
            Some("Standard")
        );
        assert_eq!(get(2).await.unwrap().unwrap().role, Role::Operator);
        assert_eq!(get(3).await.unwrap().unwrap().role, Role::Trusted);
        assert!(get(1).await.unwrap().unwrap().started);
        assert!(!get(3).await.unwrap().unwrap().started);
        assert_eq!(store.stats().await.unwrap().total_users, 3);
    }

    #[tokio::test]
    async fn upsert_starts_a_seeded_user() {
        let store = test_store().await;
        store.seed_roles(Role::Trusted, &[UserId(5)]).await.unwrap();

        let user = store.upsert_user(UserId(5), Some("Bob")).await.unwrap();
        assert!(user.started);
        assert_eq!(user.role, Role::Trusted);
        assert_eq!(user.name.as_deref(), Some("Bob"));

        let again = store.upsert_user(UserId(5), Some("Robert")).await.unwrap();
        assert_eq!(again, user);
    }

    #[tokio::test]
    async fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("anonka.db");

        {
            let store = SqliteUserStore::new(open(&path).await.unwrap());
            store.upsert_user(UserId(7), None).await.unwrap();
            store.increment_message_count(UserId(7)).await.unwrap();
            store.pool().close().await;
        }

        let store = SqliteUserStore::new(open(&path).await.unwrap());
        let user = store.get_user(UserId(7)).await.unwrap().unwrap();
        assert_eq!(user.message_count, 1);
    }
}
