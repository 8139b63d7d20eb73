//! SQLite implementation of `ProfileRepository`.
//!
//! This provides persistent storage that survives service restarts.
//!
//! # Schema Versioning
//!
//! The database has a `schema_version` table that tracks the schema version.
//! When the schema needs to change, increment `CURRENT_SCHEMA_VERSION` and add
//! a migration in `run_migrations()`. Migrations run sequentially from the
//! current version to the target version.
//!
//! # Atomicity
//!
//! The connection sits behind a single mutex, and every multi-statement
//! operation runs inside an `IMMEDIATE` transaction so that a second process
//! opening the same file cannot interleave with it either.

mod rows;


use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::warn;

use self::rows::{into_like, read_like, UserRow, USER_COLUMNS};
use super::{
    LikeRecord, ProfileRepository, RelayTarget, RepositoryError, StoreStats, Unpaired,
};
use crate::profile::{LikeEdge, Profile, User, UserId};

/// Current schema version. Increment this when making schema changes and add
/// corresponding migration logic in `run_migrations()`.
const CURRENT_SCHEMA_VERSION: i64 = 2;

/// SQLite-backed profile repository.
///
/// Uses `tokio::task::spawn_blocking` to run synchronous rusqlite operations
/// without blocking the async runtime.
pub struct SqliteRepository {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Create a new SQLite repository at the given path.
    ///
    /// Creates the database file and schema if they don't exist.
    /// Runs any pending migrations if the database exists but has an older schema.
    ///
    /// # Durability
    ///
    /// The database is configured with:
    /// - `journal_mode = WAL` for better concurrency and crash safety
    /// - `synchronous = FULL` so an acknowledged like survives power loss
    /// - `busy_timeout = 5000ms` to handle concurrent access gracefully
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path_ref = path.as_ref();
        let path_str = path_ref.to_string_lossy();
        let is_in_memory = path_str == ":memory:";

        if !is_in_memory && !path_str.is_empty() {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        RepositoryError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;
                }
            }
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| RepositoryError::storage("open database", e.to_string()))?;

        // Profiles hold personal data.
        #[cfg(unix)]
        if !is_in_memory && !path_str.is_empty() {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            if let Err(e) = std::fs::set_permissions(path_ref, permissions) {
                warn!(
                    "Failed to set restrictive permissions on database file: {}",
                    e
                );
            }
        }

        // SQLite can silently keep DELETE mode on filesystems without shared
        // memory support; in-memory databases report "memory".
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| RepositoryError::storage("set journal_mode", e.to_string()))?;

        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));

        if !journal_mode_ok {
            return Err(RepositoryError::storage(
                "configure journal_mode",
                format!(
                    "Failed to enable WAL mode: SQLite returned '{}' instead of 'wal'",
                    journal_mode
                ),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            "#,
        )
        .map_err(|e| RepositoryError::storage("configure pragmas", e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| RepositoryError::storage("create schema_version table", e.to_string()))?;

        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RepositoryError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run migrations from `from_version` to `CURRENT_SCHEMA_VERSION`.
    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), RepositoryError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(RepositoryError::storage(
                "schema version",
                format!(
                    "Database schema version {} is newer than supported version {}. \
                     Please upgrade the application.",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        // Migration from version 0 (fresh database) to version 1.
        // `id` preserves creation order, which decides candidate order.
        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    tg_id INTEGER NOT NULL UNIQUE,
                    name TEXT,
                    university TEXT,
                    age INTEGER,
                    gender TEXT,
                    interests TEXT,
                    bio TEXT,
                    photo TEXT,
                    looking_for TEXT,
                    match_universities TEXT,
                    registered INTEGER NOT NULL DEFAULT 0,
                    chatting_with INTEGER,
                    created_at INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS likes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    from_user INTEGER NOT NULL,
                    to_user INTEGER NOT NULL,
                    matched INTEGER NOT NULL DEFAULT 0,
                    created_at INTEGER NOT NULL,
                    UNIQUE (from_user, to_user)
                );
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v1", e.to_string()))?;
        }

        // Migration from version 1 to version 2: indexes for the candidate
        // query and the reciprocal-edge lookup.
        if from_version < 2 {
            conn.execute_batch(
                r#"
                CREATE INDEX IF NOT EXISTS idx_users_candidates
                    ON users(registered, gender);
                CREATE INDEX IF NOT EXISTS idx_likes_to_user
                    ON likes(to_user, from_user);
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v2", e.to_string()))?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| RepositoryError::storage("update schema version", e.to_string()))?;

        Ok(())
    }

    /// Create a new in-memory SQLite repository (for testing).
    pub fn new_in_memory() -> Result<Self, RepositoryError> {
        Self::new(":memory:")
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> Result<T, RepositoryError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, RepositoryError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| RepositoryError::storage(operation, "connection mutex poisoned"))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| RepositoryError::storage(operation, e.to_string()))?
    }
}

fn select_user(conn: &Connection, id: UserId) -> Result<Option<User>, RepositoryError> {
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.tg_id = ?1"),
            params![id.0],
            UserRow::read,
        )
        .optional()
        .map_err(|e| RepositoryError::storage("get_user", e.to_string()))?;
    row.map(UserRow::into_user).transpose()
}

fn chat_pointer(conn: &Connection, id: UserId) -> Result<Option<UserId>, RepositoryError> {
    let pointer: Option<Option<i64>> = conn
        .query_row(
            "SELECT chatting_with FROM users WHERE tg_id = ?1",
            params![id.0],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| RepositoryError::storage("read chat pointer", e.to_string()))?;
    Ok(pointer.flatten().map(UserId))
}

fn clear_pointer(conn: &Connection, id: UserId) -> Result<(), RepositoryError> {
    conn.execute(
        "UPDATE users SET chatting_with = NULL WHERE tg_id = ?1",
        params![id.0],
    )
    .map_err(|e| RepositoryError::storage("clear chat pointer", e.to_string()))?;
    Ok(())
}

#[async_trait]
impl ProfileRepository for SqliteRepository {
    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        self.with_conn("get_user", move |conn| select_user(conn, id))
            .await
    }

    async fn ensure_user(&self, id: UserId) -> Result<(), RepositoryError> {
        let now = Utc::now().timestamp();
        self.with_conn("ensure_user", move |conn| {
            conn.execute(
                "INSERT INTO users (tg_id, registered, created_at) VALUES (?1, 0, ?2)
                 ON CONFLICT(tg_id) DO NOTHING",
                params![id.0, now],
            )
            .map_err(|e| RepositoryError::storage("ensure_user", e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn upsert_profile(&self, id: UserId, profile: Profile) -> Result<User, RepositoryError> {
        let now = Utc::now().timestamp();
        let universities = serde_json::to_string(&profile.preferred_universities)
            .map_err(|e| RepositoryError::storage("serialize universities", e.to_string()))?;

        self.with_conn("upsert_profile", move |conn| {
            conn.execute(
                "INSERT INTO users (tg_id, name, university, age, gender, interests, bio,
                                    photo, looking_for, match_universities, registered, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1, ?11)
                 ON CONFLICT(tg_id) DO UPDATE SET
                     name = excluded.name,
                     university = excluded.university,
                     age = excluded.age,
                     gender = excluded.gender,
                     interests = excluded.interests,
                     bio = excluded.bio,
                     photo = excluded.photo,
                     looking_for = excluded.looking_for,
                     match_universities = excluded.match_universities,
                     registered = 1",
                params![
                    id.0,
                    profile.name,
                    profile.university,
                    profile.age,
                    profile.gender.as_str(),
                    profile.interests,
                    profile.bio,
                    profile.photo.0,
                    profile.looking_for.as_str(),
                    universities,
                    now
                ],
            )
            .map_err(|e| RepositoryError::storage("upsert_profile", e.to_string()))?;

            select_user(conn, id)?
                .ok_or_else(|| RepositoryError::storage("upsert_profile", "row vanished"))
        })
        .await
    }

    async fn next_candidate(&self, viewer: UserId) -> Result<Option<User>, RepositoryError> {
        self.with_conn("next_candidate", move |conn| {
            let Some(profile) = select_user(conn, viewer)?.and_then(|u| u.profile) else {
                return Ok(None);
            };
            let any_university = crate::matching::accepts_any_university(&profile);
            let universities = serde_json::to_string(&profile.preferred_universities)
                .map_err(|e| RepositoryError::storage("next_candidate", e.to_string()))?;

            let row = conn
                .query_row(
                    &format!(
                        "SELECT {USER_COLUMNS} FROM users u
                         WHERE u.registered = 1
                           AND u.tg_id != ?1
                           AND u.gender = ?2
                           AND NOT EXISTS (
                               SELECT 1 FROM likes l
                               WHERE l.from_user = ?1 AND l.to_user = u.tg_id
                           )
                           AND (?3 OR u.university IN (SELECT value FROM json_each(?4)))
                         ORDER BY u.id
                         LIMIT 1"
                    ),
                    params![
                        viewer.0,
                        profile.looking_for.as_str(),
                        any_university,
                        universities
                    ],
                    UserRow::read,
                )
                .optional()
                .map_err(|e| RepositoryError::storage("next_candidate", e.to_string()))?;
            row.map(UserRow::into_user).transpose()
        })
        .await
    }

    async fn record_like(&self, from: UserId, to: UserId) -> Result<LikeRecord, RepositoryError> {
        let now = Utc::now().timestamp();
        self.with_conn("record_like", move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| RepositoryError::storage("record_like", e.to_string()))?;

            let inserted = tx
                .execute(
                    "INSERT INTO likes (from_user, to_user, matched, created_at)
                     VALUES (?1, ?2, 0, ?3)
                     ON CONFLICT(from_user, to_user) DO NOTHING",
                    params![from.0, to.0, now],
                )
                .map_err(|e| RepositoryError::storage("record_like", e.to_string()))?;
            if inserted == 0 {
                return Ok(LikeRecord::Duplicate);
            }

            let reciprocal = tx
                .query_row(
                    "SELECT 1 FROM likes WHERE from_user = ?1 AND to_user = ?2",
                    params![to.0, from.0],
                    |_| Ok(()),
                )
                .optional()
                .map_err(|e| RepositoryError::storage("record_like", e.to_string()))?
                .is_some();

            if reciprocal {
                tx.execute(
                    "UPDATE likes SET matched = 1
                     WHERE (from_user = ?1 AND to_user = ?2) OR (from_user = ?2 AND to_user = ?1)",
                    params![from.0, to.0],
                )
                .map_err(|e| RepositoryError::storage("record_like", e.to_string()))?;
            }

            tx.commit()
                .map_err(|e| RepositoryError::storage("record_like", e.to_string()))?;
            Ok(LikeRecord::Recorded { mutual: reciprocal })
        })
        .await
    }

    async fn get_like(
        &self,
        from: UserId,
        to: UserId,
    ) -> Result<Option<LikeEdge>, RepositoryError> {
        self.with_conn("get_like", move |conn| {
            let row = conn
                .query_row(
                    "SELECT from_user, to_user, matched, created_at FROM likes
                     WHERE from_user = ?1 AND to_user = ?2",
                    params![from.0, to.0],
                    read_like,
                )
                .optional()
                .map_err(|e| RepositoryError::storage("get_like", e.to_string()))?;
            row.map(into_like).transpose()
        })
        .await
    }

    async fn list_matches(&self, user: UserId) -> Result<Vec<User>, RepositoryError> {
        self.with_conn("list_matches", move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {USER_COLUMNS} FROM likes l
                     JOIN users u ON u.tg_id = l.to_user
                     WHERE l.from_user = ?1 AND l.matched = 1 AND u.registered = 1
                     ORDER BY l.id"
                ))
                .map_err(|e| RepositoryError::storage("list_matches", e.to_string()))?;

            let rows = stmt
                .query_map(params![user.0], UserRow::read)
                .map_err(|e| RepositoryError::storage("list_matches", e.to_string()))?;

            let mut matches = Vec::new();
            for row in rows {
                let row = row.map_err(|e| RepositoryError::storage("list_matches", e.to_string()))?;
                matches.push(row.into_user()?);
            }
            Ok(matches)
        })
        .await
    }

    async fn pair_chat(&self, a: UserId, b: UserId) -> Result<bool, RepositoryError> {
        self.with_conn("pair_chat", move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| RepositoryError::storage("pair_chat", e.to_string()))?;

            let present: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM users WHERE tg_id IN (?1, ?2)",
                    params![a.0, b.0],
                    |row| row.get(0),
                )
                .map_err(|e| RepositoryError::storage("pair_chat", e.to_string()))?;
            let expected = if a == b { 1 } else { 2 };
            if present != expected {
                return Ok(false);
            }

            tx.execute(
                "UPDATE users SET chatting_with = CASE tg_id WHEN ?1 THEN ?2 ELSE ?1 END
                 WHERE tg_id IN (?1, ?2)",
                params![a.0, b.0],
            )
            .map_err(|e| RepositoryError::storage("pair_chat", e.to_string()))?;

            tx.commit()
                .map_err(|e| RepositoryError::storage("pair_chat", e.to_string()))?;
            Ok(true)
        })
        .await
    }

    async fn relay_target(&self, sender: UserId) -> Result<RelayTarget, RepositoryError> {
        self.with_conn("relay_target", move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| RepositoryError::storage("relay_target", e.to_string()))?;

            let Some(partner) = chat_pointer(&tx, sender)? else {
                return Ok(RelayTarget::NoPartner);
            };
            if chat_pointer(&tx, partner)? == Some(sender) {
                return Ok(RelayTarget::Partner(partner));
            }

            clear_pointer(&tx, sender)?;
            tx.commit()
                .map_err(|e| RepositoryError::storage("relay_target", e.to_string()))?;
            Ok(RelayTarget::Expired)
        })
        .await
    }

    async fn unpair_chat(&self, user: UserId) -> Result<Option<Unpaired>, RepositoryError> {
        self.with_conn("unpair_chat", move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| RepositoryError::storage("unpair_chat", e.to_string()))?;

            let Some(partner) = chat_pointer(&tx, user)? else {
                return Ok(None);
            };
            clear_pointer(&tx, user)?;
            let released = tx
                .execute(
                    "UPDATE users SET chatting_with = NULL WHERE tg_id = ?1 AND chatting_with = ?2",
                    params![partner.0, user.0],
                )
                .map_err(|e| RepositoryError::storage("unpair_chat", e.to_string()))?;

            tx.commit()
                .map_err(|e| RepositoryError::storage("unpair_chat", e.to_string()))?;
            Ok(Some(Unpaired {
                partner,
                partner_released: released > 0,
            }))
        })
        .await
    }

    async fn stats(&self) -> Result<StoreStats, RepositoryError> {
        self.with_conn("stats", |conn| {
            let (users, registered, chatting): (i64, i64, i64) = conn
                .query_row(
                    "SELECT COUNT(*), COALESCE(SUM(registered), 0), COUNT(chatting_with)
                     FROM users",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .map_err(|e| RepositoryError::storage("stats", e.to_string()))?;
            let (likes, mutual): (i64, i64) = conn
                .query_row(
                    "SELECT COUNT(*), COALESCE(SUM(matched), 0) FROM likes",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .map_err(|e| RepositoryError::storage("stats", e.to_string()))?;

            let count = |n: i64| u64::try_from(n).map_err(|_| RepositoryError::corruption("count"));
            Ok(StoreStats {
                users: count(users)?,
                registered: count(registered)?,
                likes: count(likes)?,
                matches: count(mutual)? / 2,
                chatting: count(chatting)?,
            })
        })
        .await
    }
}
