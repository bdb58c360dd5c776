use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, email, password_hash, display_name, \
     reset_token, reset_token_expires_at, created_at, updated_at";

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: String,
    #[serde(skip_serializing)]
    pub reset_token: Option<String>,
    #[serde(skip_serializing)]
    pub reset_token_expires_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub async fn find_by_email(db: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Insert a new user. The unique constraint on email is the final word on
    /// duplicate registration; callers map the violation to EmailTaken.
    pub async fn create(
        db: &PgPool,
        email: &str,
        password_hash: &str,
        display_name: &str,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, password_hash, display_name)
             VALUES ($1, $2, $3)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(email)
        .bind(password_hash)
        .bind(display_name)
        .fetch_one(db)
        .await
    }

    /// Store a freshly issued reset token, replacing any earlier one
    /// (last write wins; the superseded token stops matching).
    pub async fn store_reset_token(
        db: &PgPool,
        id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users
             SET reset_token = $2, reset_token_expires_at = $3, updated_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(token)
        .bind(expires_at)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Replace the password hash and clear the reset columns, but only if the
    /// presented token equals the currently stored one and has not expired.
    /// A single conditional UPDATE keeps the check-then-write atomic; returns
    /// false when the token was superseded, already consumed, or expired.
    pub async fn consume_reset_token(
        db: &PgPool,
        id: Uuid,
        token: &str,
        new_password_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users
             SET password_hash = $3,
                 reset_token = NULL,
                 reset_token_expires_at = NULL,
                 updated_at = now()
             WHERE id = $1
               AND reset_token = $2
               AND reset_token_expires_at > now()",
        )
        .bind(id)
        .bind(token)
        .bind(new_password_hash)
        .execute(db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Partial profile update; None leaves the column untouched.
    pub async fn update_profile(
        db: &PgPool,
        id: Uuid,
        display_name: Option<&str>,
        email: Option<&str>,
        password_hash: Option<&str>,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users
             SET display_name = COALESCE($2, display_name),
                 email = COALESCE($3, email),
                 password_hash = COALESCE($4, password_hash),
                 updated_at = now()
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(display_name)
        .bind(email)
        .bind(password_hash)
        .fetch_optional(db)
        .await
    }

    /// Hard delete. Returns false if the row was already gone.
    pub async fn delete(db: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
