//! User accounts and API tokens
//!
//! Tokens are shown once at creation; only their SHA-256 digest is stored.

use chrono::{DateTime, Utc};
use musivault_common::{Error, Result};
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Registered user
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Create a user and return it with its plaintext API token
pub async fn create_user(pool: &SqlitePool, username: &str) -> Result<(User, String)> {
    let username = username.trim();
    if username.is_empty() {
        return Err(Error::InvalidInput("Username must not be empty".to_string()));
    }

    let user = User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        created_at: Utc::now(),
    };
    let token = generate_token();

    let result = sqlx::query(
        "INSERT INTO users (id, username, token_hash, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user.id.to_string())
    .bind(&user.username)
    .bind(hash_token(&token))
    .bind(user.created_at.to_rfc3339())
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok((user, token)),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
            Error::InvalidInput(format!("Username already taken: {}", username)),
        ),
        Err(e) => Err(Error::Database(e)),
    }
}

/// Resolve a bearer token to its user
pub async fn find_by_token(pool: &SqlitePool, token: &str) -> Result<Option<User>> {
    let row = sqlx::query("SELECT id, username, created_at FROM users WHERE token_hash = ?")
        .bind(hash_token(token))
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => {
            let id: String = row.get("id");
            let created_at: String = row.get("created_at");
            Ok(Some(User {
                id: super::parse_uuid("users.id", &id)?,
                username: row.get("username"),
                created_at: super::parse_timestamp("users.created_at", &created_at)?,
            }))
        }
        None => Ok(None),
    }
}
