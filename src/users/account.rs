use std::path::Path;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize)]
pub struct UserAccount {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub avatar_seed: Option<String>,
}

pub fn validate_username(username: &str) -> AppResult<()> {
    if username.len() < 3 || username.len() > 20 {
        return Err(AppError::Validation(
            "username must be between 3 and 20 characters".to_owned(),
        ));
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(AppError::Validation(
            "username can only contain letters, numbers, and underscores".to_owned(),
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> AppResult<()> {
    if password.len() < 6 {
        return Err(AppError::Validation(
            "password must be at least 6 characters long".to_owned(),
        ));
    }
    Ok(())
}

/// Light shape check only: `local@domain.tld`. Email is optional.
pub fn validate_email(email: &str) -> AppResult<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(AppError::Validation("invalid email format".to_owned()))
    }
}

/// Salted argon2 PHC string. Replaces the unsalted digest this scheme
/// descends from; existing hashes in that format will not verify.
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(password_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Creates the account row and the user's media directory under `users_dir`.
pub async fn create_account(
    pool: &SqlitePool,
    users_dir: &Path,
    username: &str,
    password: &str,
    email: Option<&str>,
) -> AppResult<()> {
    validate_username(username)?;
    validate_password(password)?;
    if let Some(email) = email.filter(|e| !e.is_empty()) {
        validate_email(email)?;
    }

    let password_hash = hash_password(password)?;
    let result = sqlx::query("INSERT INTO users (username, password_hash, email) VALUES (?, ?, ?)")
        .bind(username)
        .bind(&password_hash)
        .bind(email.filter(|e| !e.is_empty()))
        .execute(pool)
        .await;

    match result {
        Ok(_) => {}
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            return Err(AppError::Conflict("username already exists".to_owned()));
        }
        Err(err) => return Err(err.into()),
    }

    tokio::fs::create_dir_all(users_dir.join(username)).await?;
    tracing::info!(username, "account created");
    Ok(())
}

pub async fn authenticate(
    pool: &SqlitePool,
    username: &str,
    password: &str,
) -> AppResult<UserAccount> {
    let row: Option<(i64, String, String, Option<String>, Option<String>)> = sqlx::query_as(
        "SELECT id, username, password_hash, email, avatar_seed FROM users WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    match row {
        Some((id, username, password_hash, email, avatar_seed))
            if verify_password(password, &password_hash) =>
        {
            Ok(UserAccount {
                id,
                username,
                email,
                avatar_seed,
            })
        }
        _ => Err(AppError::Unauthorized(
            "invalid username or password".to_owned(),
        )),
    }
}

pub async fn avatar_seed(pool: &SqlitePool, user_id: i64) -> AppResult<Option<String>> {
    let row: Option<(Option<String>,)> =
        sqlx::query_as("SELECT avatar_seed FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
    Ok(row.and_then(|(seed,)| seed))
}

pub async fn set_avatar_seed(pool: &SqlitePool, user_id: i64, seed: &str) -> AppResult<()> {
    sqlx::query("UPDATE users SET avatar_seed = ? WHERE id = ?")
        .bind(seed)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[test]
    fn username_rules() {
        assert!(validate_username("alice_01").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username(&"x".repeat(21)).is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("dash-ed").is_err());
    }

    #[test]
    fn password_and_email_rules() {
        assert!(validate_password("secret1").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_email("a@b.co").is_ok());
        assert!(validate_email("nodomain@").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("a@tld").is_err());
    }

    #[test]
    fn hash_verify_round_trip() {
        let hash = hash_password("secret1").unwrap();
        assert_ne!(hash, "secret1");
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("secret1", &hash));
        assert!(!verify_password("wrong", &hash));
        // Two hashes of the same password differ by salt.
        assert_ne!(hash, hash_password("secret1").unwrap());
    }

    #[tokio::test]
    async fn create_and_authenticate() {
        let pool = test_pool().await;
        let tmp = tempfile::tempdir().unwrap();

        create_account(&pool, tmp.path(), "alice", "secret1", None)
            .await
            .unwrap();
        assert!(tmp.path().join("alice").is_dir());

        let account = authenticate(&pool, "alice", "secret1").await.unwrap();
        assert_eq!(account.username, "alice");

        let err = authenticate(&pool, "alice", "wrong").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
        let err = authenticate(&pool, "nobody", "secret1").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let pool = test_pool().await;
        let tmp = tempfile::tempdir().unwrap();

        create_account(&pool, tmp.path(), "alice", "secret1", None)
            .await
            .unwrap();
        let err = create_account(&pool, tmp.path(), "alice", "another1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn avatar_seed_round_trip() {
        let pool = test_pool().await;
        let tmp = tempfile::tempdir().unwrap();
        create_account(&pool, tmp.path(), "alice", "secret1", Some("a@b.co"))
            .await
            .unwrap();
        let account = authenticate(&pool, "alice", "secret1").await.unwrap();

        assert_eq!(avatar_seed(&pool, account.id).await.unwrap(), None);
        set_avatar_seed(&pool, account.id, "seed-xyz").await.unwrap();
        assert_eq!(
            avatar_seed(&pool, account.id).await.unwrap().as_deref(),
            Some("seed-xyz")
        );
    }
}
