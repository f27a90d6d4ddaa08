//! Shared types for the API layer.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::db::{self, DatabaseError};
use crate::models::{PageRequest, Role};

/// Shared context for all API routes and middleware.
///
/// The SQLite connection is behind a `std::sync::Mutex`; handlers hold the
/// guard only across synchronous repository calls, never across an `.await`.
#[derive(Clone)]
pub struct ApiContext {
    db: Arc<Mutex<Connection>>,
}

impl ApiContext {
    /// Open (and migrate) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        let conn = db::open_database(path)?;
        Ok(Self::from_connection(conn))
    }

    /// Wrap an already-opened connection. Used by tests with in-memory DBs.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn lock_db(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError::Internal("database lock poisoned".into()))
    }
}

/// Authenticated user context, injected into request extensions by the
/// auth middleware after token validation.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// Hash of the bearer token that authenticated the current request.
/// Logout and refresh revoke exactly this token.
#[derive(Debug, Clone)]
pub struct CurrentToken(pub String);

/// Generate a random bearer token (URL-safe base64, 32 bytes of entropy).
pub fn generate_token() -> String {
    use base64::Engine;
    let bytes: [u8; 32] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a bearer token with SHA-256, base64-encoded for TEXT storage.
pub fn hash_token(token: &str) -> String {
    use base64::Engine;
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(token.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

/// Hash a password into a PHC string (PBKDF2-SHA256, random salt).
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    use pbkdf2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
    use pbkdf2::Pbkdf2;

    let salt = SaltString::generate(&mut OsRng);
    Pbkdf2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))
}

/// Constant-time verification against a stored PHC string. An unparseable
/// hash just fails verification.
pub fn verify_password(password: &str, stored: &str) -> bool {
    use pbkdf2::password_hash::{PasswordHash, PasswordVerifier};
    use pbkdf2::Pbkdf2;

    PasswordHash::new(stored)
        .map(|hash| Pbkdf2.verify_password(password.as_bytes(), &hash).is_ok())
        .unwrap_or(false)
}

/// Laravel-style pagination envelope.
#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub current_page: u32,
    pub data: Vec<T>,
    pub per_page: u32,
    pub total: i64,
    pub last_page: u32,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, page: PageRequest, total: i64) -> Self {
        let last_page = ((total.max(0) as u32).div_ceil(page.per_page)).max(1);
        Self {
            current_page: page.page,
            data,
            per_page: page.per_page,
            total,
            last_page,
        }
    }
}
