//! SQLite-backed user store.
//!
//! Tables:
//! - `users`: name, email (unique, case-insensitive), password_hash, salt, created_at
//!
//! Users are immutable after registration — there is no update or delete
//! path, only lookup by id (token resolution) and by email (login).

use anyhow::Result;
use parking_lot::Mutex;
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Salt byte length for password hashing.
const SALT_BYTES: usize = 16;

/// Number of SHA-256 iterations for password stretching.
const HASH_ITERATIONS: u32 = 100_000;

/// Minimum password length.
const MIN_PASSWORD_LEN: usize = 8;

/// A registered user. The password hash never leaves the store.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
}

/// Registration failure, split so the gateway can map duplicates to Conflict
/// and everything else to Validation.
#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("{0}")]
    Invalid(String),
    #[error("User already exists")]
    EmailTaken,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// SQLite-backed user store.
pub struct UserStore {
    conn: Mutex<rusqlite::Connection>,
}

impl UserStore {
    /// Open (or create) the user table in the database at the given path.
    pub fn new(db_path: &Path) -> Result<Self> {
        let conn = rusqlite::Connection::open(db_path)?;

        // WAL mode for concurrent reads + crash safety
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password_hash TEXT NOT NULL,
                salt TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Register a new user. Returns the created record.
    pub fn register(&self, name: &str, email: &str, password: &str) -> Result<User, RegisterError> {
        let name = name.trim();
        let email = email.trim();
        if name.is_empty() || email.is_empty() || password.is_empty() {
            return Err(RegisterError::Invalid(
                "Please provide all fields".to_string(),
            ));
        }
        if !email.contains('@') {
            return Err(RegisterError::Invalid(
                "Please provide a valid email".to_string(),
            ));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(RegisterError::Invalid(
                "Password must be at least 8 characters".to_string(),
            ));
        }

        let user_id = uuid::Uuid::new_v4().to_string();
        let salt = generate_salt();
        let password_hash = hash_password(password, &salt);
        let now = epoch_secs();

        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO users (id, name, email, password_hash, salt, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![user_id, name, email, password_hash, salt, now],
        );

        match result {
            Ok(_) => Ok(User {
                id: user_id,
                name: name.to_string(),
                email: email.to_string(),
                created_at: now,
            }),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(RegisterError::EmailTaken)
            }
            Err(e) => Err(RegisterError::Storage(e.into())),
        }
    }

    /// Verify email + password. Returns the `User` on success, `None` on
    /// unknown email or wrong password — the caller must not distinguish the
    /// two.
    pub fn verify_credentials(&self, email: &str, password: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let row: Result<(String, String, String, String, String, i64), _> = conn.query_row(
            "SELECT id, name, email, password_hash, salt, created_at
             FROM users WHERE email = ?1 COLLATE NOCASE",
            rusqlite::params![email.trim()],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            },
        );

        match row {
            Ok((id, name, email, stored_hash, salt, created_at)) => {
                let attempt_hash = hash_password(password, &salt);
                if !constant_time_eq(stored_hash.as_bytes(), attempt_hash.as_bytes()) {
                    return Ok(None);
                }
                Ok(Some(User {
                    id,
                    name,
                    email,
                    created_at,
                }))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                // Dummy hash so a miss costs the same as a mismatch
                let _ = hash_password(password, "0000000000000000");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a user by ID (token resolution on every authenticated request).
    pub fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let row = conn.query_row(
            "SELECT id, name, email, created_at FROM users WHERE id = ?1",
            rusqlite::params![user_id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                    created_at: row.get(3)?,
                })
            },
        );

        match row {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

// ── Cryptographic Helpers ───────────────────────────────────────────

/// Generate a random salt (hex-encoded).
fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hash a password with salt using iterated SHA-256.
fn hash_password(password: &str, salt: &str) -> String {
    let mut hash = Sha256::new();
    hash.update(salt.as_bytes());
    hash.update(password.as_bytes());
    let mut result = hash.finalize();

    // Iterated hashing for key stretching
    for _ in 1..HASH_ITERATIONS {
        let mut h = Sha256::new();
        h.update(result);
        h.update(salt.as_bytes());
        result = h.finalize();
    }

    hex::encode(result)
}

/// Constant-time byte comparison to prevent timing attacks.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Current Unix epoch in seconds.
pub(crate) fn epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

// ── Tests ───────────────────────────────────────────────────────────
