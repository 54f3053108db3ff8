use rusqlite::Connection;

use crate::error::AppError;

/// Run the idempotent schema migration.
pub fn run(conn: &Connection) -> Result<(), AppError> {
    tracing::debug!("Running database migrations");

    conn.execute_batch(SCHEMA)?;

    tracing::info!("Database migrations complete");
    Ok(())
}

const SCHEMA: &str = r#"

-- ============================================================================
-- Chat usage (one row per user)
-- ============================================================================

CREATE TABLE IF NOT EXISTS chat_usage (
    user_id          TEXT PRIMARY KEY,
    daily_count      INTEGER NOT NULL DEFAULT 0 CHECK (daily_count >= 0),
    monthly_count    INTEGER NOT NULL DEFAULT 0 CHECK (monthly_count >= 0),
    last_reset_date  TEXT NOT NULL,
    last_message_at  TEXT,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

-- ============================================================================
-- Curated FAQ answers
-- ============================================================================

CREATE TABLE IF NOT EXISTS faq_entries (
    id          TEXT PRIMARY KEY,
    question    TEXT NOT NULL,
    answer      TEXT NOT NULL,
    keywords    TEXT NOT NULL DEFAULT '[]',
    is_active   INTEGER NOT NULL DEFAULT 1,
    hit_count   INTEGER NOT NULL DEFAULT 0 CHECK (hit_count >= 0),
    sort_order  INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_faq_active_order ON faq_entries(is_active, sort_order);

-- ============================================================================
-- Roles (subscription / staff)
-- ============================================================================

CREATE TABLE IF NOT EXISTS user_roles (
    user_id     TEXT NOT NULL,
    role        TEXT NOT NULL,
    created_at  TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (user_id, role)
);

-- ============================================================================
-- Episodes (logged by the client app, read here for prompt context)
-- ============================================================================

CREATE TABLE IF NOT EXISTS episodes (
    id           TEXT PRIMARY KEY,
    user_id      TEXT NOT NULL,
    occurred_at  TEXT NOT NULL,
    beat_type    TEXT,
    severity     INTEGER CHECK (severity IS NULL OR (severity BETWEEN 1 AND 10)),
    symptoms     TEXT,
    activity     TEXT,
    notes        TEXT,
    created_at   TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_episodes_user_time ON episodes(user_id, occurred_at DESC);

"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('chat_usage', 'faq_entries', 'user_roles', 'episodes')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 4);
    }
}
