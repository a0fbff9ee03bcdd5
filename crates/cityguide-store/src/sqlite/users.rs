//! Users and support conversations.

use rusqlite::{params, OptionalExtension};
use tracing::{debug, info, warn};

use super::{db, now_rfc3339, SqliteStore};
use crate::password::{hash_password, needs_rehash, verify_password};
use crate::schema::DEFAULT_ADMIN_USERNAME;
use crate::types::{NewUser, Role, SupportMessage, SupportThread, User, UserSummary};
use cityguide_core::{Error, Result};

fn map_user_insert_error(e: rusqlite::Error, username: &str) -> Error {
    if e.to_string().contains("UNIQUE constraint") {
        Error::Conflict(format!("username already taken: {}", username))
    } else {
        db(e)
    }
}

impl SqliteStore {
    // ---------------------------------------------------------------
    // Users
    // ---------------------------------------------------------------

    /// All users without credentials, by id.
    pub fn get_all_users(&self) -> Result<Vec<UserSummary>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT id, username, role FROM users ORDER BY id")
            .map_err(db)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(UserSummary {
                    id: row.get("id")?,
                    username: row.get("username")?,
                    role: Role::parse(&row.get::<_, String>("role")?),
                })
            })
            .map_err(db)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let row = conn
            .prepare_cached("SELECT * FROM users WHERE id = ?1")
            .map_err(db)?
            .query_row(params![user_id], |row| Ok(Self::row_to_user(row)))
            .optional()
            .map_err(db)?;
        Ok(row)
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let row = conn
            .prepare_cached("SELECT * FROM users WHERE username = ?1")
            .map_err(db)?
            .query_row(params![username.trim()], |row| Ok(Self::row_to_user(row)))
            .optional()
            .map_err(db)?;
        Ok(row)
    }

    /// Create a user with a hashed password. Returns the new id.
    ///
    /// Username and password are trimmed and required; a taken username is
    /// a `Conflict`.
    pub fn create_user(&self, user: &NewUser) -> Result<i64> {
        let username = user.username.trim();
        let password = user.password.trim();
        if username.is_empty() || password.is_empty() {
            return Err(Error::InvalidInput("username and password are required".into()));
        }
        let role = Role::parse(user.role.as_deref().unwrap_or("user"));
        let hash = hash_password(password)?;

        let conn = self.conn.lock();
        let id = conn
            .prepare_cached(
                "INSERT INTO users (username, password_hash, role, first_name, last_name, email, secret_word) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .map_err(db)?
            .insert(params![
                username,
                hash,
                role.as_str(),
                user.first_name.trim(),
                user.last_name.trim(),
                user.email.trim(),
                user.secret_word.trim(),
            ])
            .map_err(|e| map_user_insert_error(e, username))?;
        info!("Created user {} ({})", id, role);
        Ok(id)
    }

    /// Rename a user and optionally change password and role. An empty
    /// password keeps the current one.
    pub fn update_user(
        &self,
        user_id: i64,
        username: &str,
        password: Option<&str>,
        role: Option<Role>,
    ) -> Result<bool> {
        let username = username.trim();
        if username.is_empty() {
            return Err(Error::InvalidInput("username is required".into()));
        }
        let hash = match password.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => Some(hash_password(p)?),
            None => None,
        };

        let conn = self.conn.lock();
        let count = conn
            .execute(
                "UPDATE users SET username = ?1, \
                 password_hash = COALESCE(?2, password_hash), \
                 role = COALESCE(?3, role) WHERE id = ?4",
                params![username, hash, role.map(|r| r.as_str()), user_id],
            )
            .map_err(|e| map_user_insert_error(e, username))?;
        Ok(count > 0)
    }

    /// Replace a user's password hash without touching other fields.
    pub fn set_password(&self, user_id: i64, password: &str) -> Result<bool> {
        let hash = hash_password(password.trim())?;
        let conn = self.conn.lock();
        let count = conn
            .execute(
                "UPDATE users SET password_hash = ?1 WHERE id = ?2",
                params![hash, user_id],
            )
            .map_err(db)?;
        Ok(count > 0)
    }

    /// Delete a user and everything that belongs to them.
    ///
    /// The built-in admin account cannot be deleted.
    pub fn delete_user(&self, user_id: i64) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db)?;

        let username: Option<String> = tx
            .query_row("SELECT username FROM users WHERE id = ?1", params![user_id], |row| row.get(0))
            .optional()
            .map_err(db)?;
        match username.as_deref() {
            None => return Ok(false),
            Some(DEFAULT_ADMIN_USERNAME) => {
                return Err(Error::InvalidInput("the built-in admin cannot be deleted".into()))
            }
            Some(_) => {}
        }

        for table in ["support_messages", "favorites", "user_tours", "user_cities"] {
            tx.execute(&format!("DELETE FROM {} WHERE user_id = ?1", table), params![user_id])
                .map_err(db)?;
        }
        tx.execute("UPDATE reviews SET user_id = NULL WHERE user_id = ?1", params![user_id])
            .map_err(db)?;
        tx.execute("DELETE FROM users WHERE id = ?1", params![user_id])
            .map_err(db)?;
        tx.commit().map_err(db)?;
        info!("Deleted user {}", user_id);
        Ok(true)
    }

    /// Check credentials. Returns the user on success.
    ///
    /// A legacy unsalted hash that verifies is replaced by a bcrypt hash.
    pub fn verify_login(&self, username: &str, password: &str) -> Result<Option<User>> {
        let user = match self.get_user_by_username(username)? {
            Some(u) => u,
            None => return Ok(None),
        };
        let password = password.trim();
        if !verify_password(password, &user.password_hash) {
            debug!("Password mismatch for {}", user.username);
            return Ok(None);
        }
        if needs_rehash(&user.password_hash) {
            match self.set_password(user.id, password) {
                Ok(_) => info!("Upgraded password hash for user {}", user.id),
                Err(e) => warn!("Could not upgrade password hash for user {}: {}", user.id, e),
            }
        }
        Ok(Some(user))
    }

    // ---------------------------------------------------------------
    // Support messages
    // ---------------------------------------------------------------

    /// Append a message to a user's support conversation.
    ///
    /// An empty message or a zero user id is ignored and yields `None`.
    pub fn add_support_message(
        &self,
        user_id: i64,
        is_admin_sender: bool,
        message: &str,
        created_at: Option<&str>,
    ) -> Result<Option<i64>> {
        let message = message.trim();
        if user_id == 0 || message.is_empty() {
            return Ok(None);
        }
        let created_at = created_at
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(now_rfc3339);

        let conn = self.conn.lock();
        let id = conn
            .prepare_cached(
                "INSERT INTO support_messages (user_id, is_admin_sender, message, created_at) \
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .map_err(db)?
            .insert(params![user_id, is_admin_sender, message, created_at])
            .map_err(db)?;
        Ok(Some(id))
    }

    /// A user's conversation in send order.
    pub fn get_support_messages_for_user(&self, user_id: i64) -> Result<Vec<SupportMessage>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, user_id, is_admin_sender, message, created_at FROM support_messages \
                 WHERE user_id = ?1 ORDER BY id",
            )
            .map_err(db)?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(SupportMessage {
                    id: row.get("id").unwrap_or(0),
                    user_id: row.get("user_id").unwrap_or(0),
                    is_admin_sender: row.get("is_admin_sender").unwrap_or(false),
                    message: row.get("message").unwrap_or_default(),
                    created_at: row
                        .get::<_, Option<String>>("created_at")
                        .ok()
                        .flatten()
                        .unwrap_or_default(),
                })
            })
            .map_err(db)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Users with at least one support message, by username.
    pub fn get_support_users_with_last_message(&self) -> Result<Vec<SupportThread>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT u.id AS user_id, u.username AS username,
                    (SELECT message FROM support_messages sm2 WHERE sm2.user_id = u.id
                     ORDER BY sm2.id DESC LIMIT 1) AS last_message
                 FROM users u
                 WHERE EXISTS (SELECT 1 FROM support_messages sm WHERE sm.user_id = u.id)
                 ORDER BY u.username",
            )
            .map_err(db)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(SupportThread {
                    user_id: row.get("user_id")?,
                    username: row.get("username")?,
                    last_message: row.get("last_message")?,
                })
            })
            .map_err(db)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    // ---------------------------------------------------------------
    // Row Mapping Helpers
    // ---------------------------------------------------------------

    fn row_to_user(row: &rusqlite::Row<'_>) -> User {
        let text = |col: &str| -> String {
            row.get::<_, Option<String>>(col).ok().flatten().unwrap_or_default()
        };
        User {
            id: row.get("id").unwrap_or(0),
            username: text("username"),
            password_hash: text("password_hash"),
            role: Role::parse(&text("role")),
            first_name: text("first_name"),
            last_name: text("last_name"),
            email: text("email"),
            secret_word: text("secret_word"),
        }
    }
}
