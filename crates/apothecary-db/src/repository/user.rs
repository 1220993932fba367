//! # User Repository
//!
//! Staff accounts. Passwords are stored as argon2 PHC strings and never
//! leave this module: [`User`] has no hash field.

use apothecary_core::validation::{validate_password, validate_text, validate_username};
use apothecary_core::{Role, User, ValidationError};
use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use super::generate_id;
use crate::error::{DbError, DbResult};

const USER_COLUMNS: &str = "id, username, full_name, role, is_active, created_at";

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub full_name: String,
    pub password: String,
    pub role: Role,
}

/// Hash a password for storage.
pub fn hash_password(password: &str) -> DbResult<String> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| DbError::Internal(format!("Failed to hash password: {}", e)))?;

    Ok(hash.to_string())
}

/// Verify a password against its stored hash.
fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    /// Creates an account.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - username taken
    pub async fn create(&self, input: NewUser) -> DbResult<User> {
        validate_username(&input.username)?;
        validate_password(&input.password)?;

        let user = User {
            id: generate_id(),
            username: input.username.trim().to_string(),
            full_name: validate_text("full_name", &input.full_name, 200)?.to_string(),
            role: input.role,
            is_active: true,
            created_at: Utc::now(),
        };
        let password_hash = hash_password(&input.password)?;

        sqlx::query(
            r#"
            INSERT INTO users (id, username, full_name, password_hash, role, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.full_name)
        .bind(&password_hash)
        .bind(user.role)
        .bind(user.is_active)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;

        info!(username = %user.username, role = %user.role, "User created");
        Ok(user)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");

        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    pub async fn list(&self) -> DbResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY username");

        let users = sqlx::query_as::<_, User>(&sql).fetch_all(&self.pool).await?;

        Ok(users)
    }

    /// Checks a username/password pair.
    ///
    /// Returns `None` for an unknown user, a wrong password or a disabled
    /// account alike, so callers can't tell which one it was.
    pub async fn verify_credentials(&self, username: &str, password: &str) -> DbResult<Option<User>> {
        let row: Option<(String, String, String, Role, bool, chrono::DateTime<Utc>, String)> =
            sqlx::query_as(
                "SELECT id, username, full_name, role, is_active, created_at, password_hash \
                 FROM users WHERE username = ?1",
            )
            .bind(username.trim())
            .fetch_optional(&self.pool)
            .await?;

        let Some((id, username, full_name, role, is_active, created_at, hash)) = row else {
            warn!("Login attempt for unknown user");
            return Ok(None);
        };

        if !is_active || !verify_password(password, &hash) {
            warn!(username = %username, "Login rejected");
            return Ok(None);
        }

        Ok(Some(User {
            id,
            username,
            full_name,
            role,
            is_active,
            created_at,
        }))
    }

    /// Replaces the password of `id` after checking the current one.
    ///
    /// ## Returns
    /// * `Err(DbError::Validation)` - `old_password` is wrong or the new one is too weak
    pub async fn change_password(&self, id: &str, old_password: &str, new_password: &str) -> DbResult<()> {
        let hash: Option<String> = sqlx::query_scalar("SELECT password_hash FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let hash = hash.ok_or_else(|| DbError::not_found("User", id))?;

        if !verify_password(old_password, &hash) {
            warn!(user = %id, "Password change rejected");
            return Err(ValidationError::InvalidFormat {
                field: "old_password".to_string(),
                reason: "wrong password".to_string(),
            }
            .into());
        }
        validate_password(new_password)?;

        sqlx::query("UPDATE users SET password_hash = ?2 WHERE id = ?1")
            .bind(id)
            .bind(hash_password(new_password)?)
            .execute(&self.pool)
            .await?;

        info!(user = %id, "Password changed");
        Ok(())
    }

    /// Number of accounts with the given role.
    pub async fn count_with_role(&self, role: Role) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = ?1")
            .bind(role)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    pub(crate) async fn create_test_user(db: &Database, username: &str, role: Role) -> User {
        db.users()
            .create(NewUser {
                username: username.to_string(),
                full_name: format!("Test {username}"),
                password: "correct horse battery".to_string(),
                role,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_login_round_trip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let created = create_test_user(&db, "cashier1", Role::Cashier).await;

        let ok = db
            .users()
            .verify_credentials("cashier1", "correct horse battery")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ok.id, created.id);
        assert_eq!(ok.role, Role::Cashier);

        assert!(db.users().verify_credentials("cashier1", "wrong").await.unwrap().is_none());
        assert!(db.users().verify_credentials("nobody", "x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        create_test_user(&db, "pharm1", Role::Pharmacist).await;

        let err = db
            .users()
            .create(NewUser {
                username: "pharm1".to_string(),
                full_name: "Another".to_string(),
                password: "long enough pw".to_string(),
                role: Role::Cashier,
            })
            .await
            .unwrap_err();
        assert!(err.is_unique_violation_on("users.username"));
        assert_eq!(db.users().count_with_role(Role::Pharmacist).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_change_password_checks_the_old_one() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let user = create_test_user(&db, "pharm1", Role::Pharmacist).await;
        let users = db.users();

        let err = users
            .change_password(&user.id, "not my password", "a brand new secret")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Validation(ValidationError::InvalidFormat { ref field, .. }) if field == "old_password"));

        assert!(matches!(
            users.change_password(&user.id, "correct horse battery", "short").await,
            Err(DbError::Validation(_))
        ));

        users
            .change_password(&user.id, "correct horse battery", "a brand new secret")
            .await
            .unwrap();
        assert!(users.verify_credentials("pharm1", "correct horse battery").await.unwrap().is_none());
        assert!(users.verify_credentials("pharm1", "a brand new secret").await.unwrap().is_some());
    }

    #[test]
    fn test_hash_is_salted() {
        let a = hash_password("same password").unwrap();
        let b = hash_password("same password").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("same password", &a));
        assert!(!verify_password("other", &a));
    }
}
