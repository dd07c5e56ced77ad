//! Dated task records.
//!
//! Every query is scoped by the owning user's id. A task id that exists but
//! belongs to someone else behaves exactly like a missing one.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub event: String,
    pub event_date: NaiveDate,
    pub done: bool,
    pub updated_at: String,
}

const TASK_COLUMNS: &str = "id, user_id, event, event_date, done, updated_at";

impl Task {
    /// ISO `YYYY-MM-DD` form used in URLs
    pub fn date_slug(&self) -> String {
        self.event_date.format("%Y-%m-%d").to_string()
    }

    pub async fn create(
        db: &SqlitePool,
        user_id: &str,
        event: &str,
        event_date: NaiveDate,
    ) -> Result<Task, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = crate::db::now_timestamp();

        sqlx::query(
            "INSERT INTO tasks (id, user_id, event, event_date, done, updated_at) VALUES (?, ?, ?, ?, 0, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(event)
        .bind(event_date)
        .bind(&now)
        .execute(db)
        .await?;

        Self::get_for_user(db, user_id, &id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get_for_user(
        db: &SqlitePool,
        user_id: &str,
        id: &str,
    ) -> Result<Option<Task>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ? AND user_id = ?"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await
    }

    /// Tasks on one day, by description
    pub async fn list_for_date(
        db: &SqlitePool,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<Task>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ? AND event_date = ? ORDER BY event ASC, id ASC"
        ))
        .bind(user_id)
        .bind(date)
        .fetch_all(db)
        .await
    }

    /// Every day that has at least one task, newest first
    pub async fn list_distinct_dates(
        db: &SqlitePool,
        user_id: &str,
    ) -> Result<Vec<NaiveDate>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT DISTINCT event_date FROM tasks WHERE user_id = ? ORDER BY event_date DESC",
        )
        .bind(user_id)
        .fetch_all(db)
        .await
    }

    /// Tasks with `from <= date <= to`, oldest first. Reversed bounds are swapped.
    pub async fn list_in_range(
        db: &SqlitePool,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Task>, sqlx::Error> {
        let (from, to) = if from <= to { (from, to) } else { (to, from) };

        sqlx::query_as(&format!(
            r#"
            SELECT DISTINCT {TASK_COLUMNS}
            FROM tasks
            WHERE user_id = ? AND event_date >= ? AND event_date <= ?
            ORDER BY event_date ASC, event ASC, id ASC
            "#
        ))
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(db)
        .await
    }

    /// Tasks dated strictly after `today`, soonest first
    pub async fn list_upcoming(
        db: &SqlitePool,
        user_id: &str,
        today: NaiveDate,
    ) -> Result<Vec<Task>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ? AND event_date > ? ORDER BY event_date ASC, event ASC, id ASC"
        ))
        .bind(user_id)
        .bind(today)
        .fetch_all(db)
        .await
    }

    /// Mark a task done or not done. `None` if the user has no such task.
    pub async fn set_done(
        db: &SqlitePool,
        user_id: &str,
        id: &str,
        done: bool,
    ) -> Result<Option<Task>, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks SET done = ?, updated_at = ? WHERE id = ? AND user_id = ?",
        )
        .bind(done)
        .bind(crate::db::now_timestamp())
        .bind(id)
        .bind(user_id)
        .execute(db)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Self::get_for_user(db, user_id, id).await
    }

    pub async fn edit(
        db: &SqlitePool,
        user_id: &str,
        id: &str,
        event: &str,
        event_date: NaiveDate,
    ) -> Result<Option<Task>, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks SET event = ?, event_date = ?, updated_at = ? WHERE id = ? AND user_id = ?",
        )
        .bind(event)
        .bind(event_date)
        .bind(crate::db::now_timestamp())
        .bind(id)
        .bind(user_id)
        .execute(db)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Self::get_for_user(db, user_id, id).await
    }

    /// Delete one task, returning the removed row
    pub async fn delete(
        db: &SqlitePool,
        user_id: &str,
        id: &str,
    ) -> Result<Option<Task>, sqlx::Error> {
        sqlx::query_as(&format!(
            "DELETE FROM tasks WHERE id = ? AND user_id = ? RETURNING {TASK_COLUMNS}"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await
    }

    /// Delete every task a user owns. Meant to run inside the account-removal
    /// transaction.
    pub async fn delete_all_for_user(
        conn: &mut SqliteConnection,
        user_id: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tasks WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }
}
