//! User account model.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::{Session, Task};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub joined_at: String,
}

/// Emails are matched case-insensitively, so they are stored normalised.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl User {
    /// Insert a new account. A taken username or email surfaces as a UNIQUE
    /// constraint error (see [`crate::db::is_unique_violation`]).
    pub async fn create(
        db: &SqlitePool,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        let joined_at = crate::db::now_timestamp();

        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, joined_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(username.trim())
        .bind(normalize_email(email))
        .bind(password_hash)
        .bind(&joined_at)
        .execute(db)
        .await?;

        Self::get_by_id(db, &id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get_by_id(db: &SqlitePool, id: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as("SELECT id, username, email, password_hash, joined_at FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await
    }

    pub async fn get_by_email(db: &SqlitePool, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, username, email, password_hash, joined_at FROM users WHERE email = ?",
        )
        .bind(normalize_email(email))
        .fetch_optional(db)
        .await
    }

    /// Remove an account together with its tasks and sessions.
    ///
    /// Runs in one transaction: either everything goes or nothing does.
    /// Returns false if no such user existed.
    pub async fn delete_with_tasks(db: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
        let mut tx = db.begin().await?;

        let tasks = Task::delete_all_for_user(&mut tx, id).await?;
        let sessions = Session::delete_for_user(&mut tx, id).await?;

        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(
            user_id = %id,
            tasks,
            sessions,
            "Deleted user account"
        );
        Ok(result.rows_affected() > 0)
    }
}
