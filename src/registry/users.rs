//! User Registry
//!
//! Registration with a salted credential hash, lookups and the user count.

use chrono::{DateTime, Utc};
use rand::RngCore;
use sqlx::PgPool;

use crate::domain::UserId;

use super::{RegistryError, RegistryResult};

const SALT_BYTES: usize = 16;

/// A row of the `users` table, without credential material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredUser {
    pub id: UserId,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// SHA-256 of salt and credential, hex encoded.
pub fn hash_credential(salt: &str, credential: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(credential.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn normalize_email(email: &str) -> RegistryResult<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(RegistryError::InvalidEmail(email)),
    }
}

type UserRow = (i64, String, DateTime<Utc>);

fn user_from_row((id, email, created_at): UserRow) -> RegisteredUser {
    RegisteredUser {
        id: UserId::new(id),
        email,
        created_at,
    }
}

/// Users stored in PostgreSQL
#[derive(Debug, Clone)]
pub struct UserRegistry {
    pool: PgPool,
}

impl UserRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Register a user; the email must not be taken.
    pub async fn register(&self, email: &str, credential: &str) -> RegistryResult<RegisteredUser> {
        let email = normalize_email(email)?;
        if credential.is_empty() {
            return Err(RegistryError::EmptyCredential);
        }

        let salt = generate_salt();
        let credential_hash = hash_credential(&salt, credential);

        let row: Option<UserRow> = sqlx::query_as(
            r#"
            INSERT INTO users (email, credential_hash, credential_salt)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO NOTHING
            RETURNING id, email, created_at
            "#,
        )
        .bind(&email)
        .bind(&credential_hash)
        .bind(&salt)
        .fetch_optional(&self.pool)
        .await?;

        let user = row.map(user_from_row).ok_or(RegistryError::EmailTaken(email))?;

        tracing::info!(user = %user.id, "User registered");
        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> RegistryResult<Option<RegisteredUser>> {
        let email = normalize_email(email)?;
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, email, created_at FROM users
            WHERE email = $1
            "#,
        )
        .bind(&email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(user_from_row))
    }

    /// Check a credential against the stored salted hash.
    pub async fn verify_credential(&self, email: &str, credential: &str) -> RegistryResult<bool> {
        let email = normalize_email(email)?;
        let stored: Option<(String, String)> = sqlx::query_as(
            "SELECT credential_hash, credential_salt FROM users WHERE email = $1",
        )
        .bind(&email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match stored {
            Some((hash, salt)) => hash_credential(&salt, credential) == hash,
            None => false,
        })
    }

    /// Number of registered users
    pub async fn count(&self) -> RegistryResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(id) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
