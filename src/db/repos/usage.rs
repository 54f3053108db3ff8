use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};

use crate::db::models::UsageRecord;
use crate::db::DbPool;
use crate::error::AppError;

fn row_to_usage(row: &Row) -> rusqlite::Result<UsageRecord> {
    Ok(UsageRecord {
        user_id: row.get("user_id")?,
        daily_count: row.get("daily_count")?,
        monthly_count: row.get("monthly_count")?,
        last_reset_date: row.get("last_reset_date")?,
        last_message_at: row.get("last_message_at")?,
    })
}

/// Get a user's usage row. Returns None if the user never chatted.
pub fn get(pool: &DbPool, user_id: &str) -> Result<Option<UsageRecord>, AppError> {
    let conn = pool.get()?;
    conn.query_row(
        "SELECT * FROM chat_usage WHERE user_id = ?1",
        params![user_id],
        row_to_usage,
    )
    .optional()
    .map_err(AppError::Database)
}

/// Load the user's row for `today`, creating it lazily and applying the
/// day-rollover reset, all under one write-locking transaction.
///
/// The reset is persisted even when the caller goes on to reject the request.
pub fn load_for_day(pool: &DbPool, user_id: &str, today: NaiveDate) -> Result<UsageRecord, AppError> {
    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let now = Utc::now().to_rfc3339();

    let created = tx.execute(
        "INSERT OR IGNORE INTO chat_usage
         (user_id, daily_count, monthly_count, last_reset_date, last_message_at, created_at, updated_at)
         VALUES (?1, 0, 0, ?2, NULL, ?3, ?3)",
        params![user_id, today, now],
    )?;

    let reset = tx.execute(
        "UPDATE chat_usage
         SET daily_count = 0, last_reset_date = ?2, updated_at = ?3
         WHERE user_id = ?1 AND last_reset_date <> ?2",
        params![user_id, today, now],
    )?;

    let record = tx.query_row(
        "SELECT * FROM chat_usage WHERE user_id = ?1",
        params![user_id],
        row_to_usage,
    )?;
    tx.commit()?;

    if created > 0 {
        tracing::debug!(user_id = %user_id, "Created usage record");
    }
    if reset > 0 {
        tracing::debug!(user_id = %user_id, today = %today, "Daily usage counter reset");
    }
    Ok(record)
}

/// Atomically count one escalation against `today`.
///
/// A single upsert statement, so concurrent commits for the same user never
/// lose an increment. If the row still belongs to an earlier day, the daily
/// count restarts at 1; a commit carrying an older `today` than the stored one
/// counts toward the stored day.
pub fn increment(
    pool: &DbPool,
    user_id: &str,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<UsageRecord, AppError> {
    let conn = pool.get()?;
    let stamp = now.to_rfc3339();
    let record = conn.query_row(
        "INSERT INTO chat_usage
            (user_id, daily_count, monthly_count, last_reset_date, last_message_at, created_at, updated_at)
         VALUES (?1, 1, 1, ?2, ?3, ?4, ?4)
         ON CONFLICT(user_id) DO UPDATE SET
            daily_count = CASE
                WHEN excluded.last_reset_date > chat_usage.last_reset_date THEN 1
                ELSE chat_usage.daily_count + 1
            END,
            monthly_count = chat_usage.monthly_count + 1,
            last_reset_date = MAX(chat_usage.last_reset_date, excluded.last_reset_date),
            last_message_at = excluded.last_message_at,
            updated_at = excluded.updated_at
         RETURNING *",
        params![user_id, today, now, stamp],
        row_to_usage,
    )?;
    Ok(record)
}
