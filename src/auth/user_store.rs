//! User Storage
//! SQLite-backed identities and the single-slot session registry.

use crate::auth::models::{Identity, Role};
use crate::auth::password::hash_password;
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lookup of identities by username or id
pub trait IdentityStore: Send + Sync {
    fn find_by_username(&self, username: &str) -> Result<Option<Identity>>;
    fn find_by_id(&self, id: &str) -> Result<Option<Identity>>;
}

/// Durable store of the one refresh token currently valid per identity.
///
/// Single active session: `persist_session` replaces whatever was stored
/// for that identity, so at most one refresh token is ever valid for it.
pub trait SessionStore: Send + Sync {
    fn persist_session(&self, user_id: &str, refresh_token: &str) -> Result<()>;
    fn lookup_session(&self, user_id: &str) -> Result<Option<String>>;
    fn clear_session(&self, user_id: &str) -> Result<()>;
}

/// Session row as stored
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub user_id: String,
    pub refresh_token: Option<String>,
    pub updated_at: String,
}

/// User storage with SQLite backend
pub struct UserStore {
    db_path: String,
    bcrypt_cost: u32,
}

impl UserStore {
    /// Create a new user store and initialize database
    pub fn new(db_path: &str, bcrypt_cost: u32) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
            bcrypt_cost,
        };
        store.init_db()?;
        Ok(store)
    }

    fn open(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)
            .with_context(|| format!("Failed to open auth database at {}", self.db_path))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    /// Initialize database schema
    fn init_db(&self) -> Result<()> {
        let conn = self.open()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        // One row per identity: the primary key is the single-session invariant.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                user_id TEXT PRIMARY KEY,
                refresh_token TEXT,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            )",
            [],
        )?;

        self.create_default_admin(&conn)?;

        Ok(())
    }

    /// Create default admin user for initial setup
    fn create_default_admin(&self, conn: &Connection) -> Result<()> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE role = 'admin'",
                [],
                |row| row.get(0),
            )
            .context("Failed to check for admin users")?;

        if count == 0 {
            let admin = Identity {
                id: Uuid::new_v4().to_string(),
                username: "admin".to_string(),
                password_hash: hash_password("admin123", self.bcrypt_cost)?,
                role: Role::Admin,
                created_at: Utc::now().to_rfc3339(),
            };

            insert_identity(conn, &admin).context("Failed to insert admin user")?;

            info!("Default admin user created (username: admin)");
            warn!("CHANGE THE DEFAULT ADMIN PASSWORD IN PRODUCTION");
        }

        Ok(())
    }

    /// Get user by username
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<Identity>> {
        let conn = self.open()?;
        let identity = conn
            .query_row(
                "SELECT id, username, password_hash, role, created_at
                 FROM users WHERE username = ?1",
                params![username],
                identity_from_row,
            )
            .optional()?;
        Ok(identity)
    }

    /// Get user by id
    pub fn get_user_by_id(&self, id: &str) -> Result<Option<Identity>> {
        let conn = self.open()?;
        let identity = conn
            .query_row(
                "SELECT id, username, password_hash, role, created_at
                 FROM users WHERE id = ?1",
                params![id],
                identity_from_row,
            )
            .optional()?;
        Ok(identity)
    }

    /// Create a new user
    pub fn create_user(&self, username: &str, password: &str, role: Role) -> Result<Identity> {
        let identity = Identity {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            password_hash: hash_password(password, self.bcrypt_cost)?,
            role,
            created_at: Utc::now().to_rfc3339(),
        };

        let conn = self.open()?;
        insert_identity(&conn, &identity).context("Failed to insert user")?;

        info!("Created user: {} ({})", identity.username, identity.role);

        Ok(identity)
    }

    /// Delete a user by id. Its session row goes with it.
    pub fn delete_user(&self, id: &str) -> Result<()> {
        let conn = self.open()?;
        conn.execute("DELETE FROM sessions WHERE user_id = ?1", params![id])?;
        let rows_affected = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;

        if rows_affected == 0 {
            anyhow::bail!("User not found");
        }

        info!("Deleted user: {}", id);
        Ok(())
    }

    /// Raw session row for an identity, cleared or not
    pub fn session_record(&self, user_id: &str) -> Result<Option<SessionRecord>> {
        let conn = self.open()?;
        let record = conn
            .query_row(
                "SELECT user_id, refresh_token, updated_at FROM sessions WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(SessionRecord {
                        user_id: row.get(0)?,
                        refresh_token: row.get(1)?,
                        updated_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }
}

fn insert_identity(conn: &Connection, identity: &Identity) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO users (id, username, password_hash, role, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            identity.id,
            identity.username,
            identity.password_hash,
            identity.role.as_str(),
            identity.created_at,
        ],
    )
}

fn identity_from_row(row: &Row<'_>) -> rusqlite::Result<Identity> {
    let role_str: String = row.get(3)?;
    let role = Role::from_label(&role_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown role label: {role_str}").into(),
        )
    })?;

    Ok(Identity {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        role,
        created_at: row.get(4)?,
    })
}

impl IdentityStore for UserStore {
    fn find_by_username(&self, username: &str) -> Result<Option<Identity>> {
        self.get_user_by_username(username)
    }

    fn find_by_id(&self, id: &str) -> Result<Option<Identity>> {
        self.get_user_by_id(id)
    }
}

impl SessionStore for UserStore {
    fn persist_session(&self, user_id: &str, refresh_token: &str) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO sessions (user_id, refresh_token, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                refresh_token = excluded.refresh_token,
                updated_at = excluded.updated_at",
            params![user_id, refresh_token, Utc::now().to_rfc3339()],
        )
        .context("Failed to persist session")?;
        Ok(())
    }

    fn lookup_session(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self
            .session_record(user_id)
            .context("Failed to look up session")?
            .and_then(|record| record.refresh_token))
    }

    fn clear_session(&self, user_id: &str) -> Result<()> {
        let conn = self.open()?;
        let rows_affected = conn
            .execute(
                "UPDATE sessions SET refresh_token = NULL, updated_at = ?2 WHERE user_id = ?1",
                params![user_id, Utc::now().to_rfc3339()],
            )
            .context("Failed to clear session")?;

        if rows_affected == 0 {
            debug!("No session to clear for {}", user_id);
        }
        Ok(())
    }
}
