#[macro_use]
pub mod macros;
pub mod migrations;
pub mod models;
pub mod repos;

use std::path::Path;

use r2d2::{CustomizeConnection, Pool};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

use crate::error::AppError;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Connection customizer that sets per-connection SQLite pragmas.
#[derive(Debug)]
struct SqlitePragmaCustomizer;

impl CustomizeConnection<rusqlite::Connection, rusqlite::Error> for SqlitePragmaCustomizer {
    fn on_acquire(&self, conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -8000;",
        )?;
        Ok(())
    }
}

/// Run synchronous repository work on the blocking pool.
pub async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

/// Initialize the database: create file, enable WAL, run migrations, seed FAQ data.
pub fn init_db(data_dir: &Path, pool_size: u32) -> Result<DbPool, AppError> {
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join("wellness.db");

    tracing::info!(path = %db_path.display(), "Initializing database");

    let manager = SqliteConnectionManager::file(&db_path);
    let pool = Pool::builder()
        .max_size(pool_size)
        .connection_customizer(Box::new(SqlitePragmaCustomizer))
        .build(manager)?;

    // WAL is database-wide, only needs to run once
    {
        let conn = pool.get()?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        tracing::debug!("SQLite pragmas configured (WAL, FK, busy_timeout)");
    }

    {
        let conn = pool.get()?;
        migrations::run(&conn)?;
        seed_builtin_faq(&conn)?;
    }

    tracing::info!(pool_size, "Database initialized successfully");
    Ok(pool)
}

/// Starter FAQ answers. `INSERT OR IGNORE` keeps admin edits intact across restarts.
fn seed_builtin_faq(conn: &rusqlite::Connection) -> Result<(), AppError> {
    let now = chrono::Utc::now().to_rfc3339();
    let entries: [(&str, &str, &str, &[&str]); 4] = [
        (
            "builtin-faq-what-are-ectopics",
            "What are ectopic beats?",
            "Ectopic beats are extra or early heartbeats that start outside the heart's usual pacemaker. \
             They are very common, often felt as a skip, thud or flutter, and in people with an otherwise \
             healthy heart they are usually harmless. If they are new, frequent or come with other symptoms, \
             it is worth mentioning them to your doctor.",
            &["ectopic", "ectopics", "extra beat", "skipped beat", "what are"],
        ),
        (
            "builtin-faq-after-eating",
            "Why do I feel palpitations after eating?",
            "Many people notice more flutters after a large meal. Digestion shifts blood flow and can \
             stimulate the vagus nerve, which influences heart rhythm. Smaller meals, eating slowly and not \
             lying down straight after eating help some people. Logging when they happen can reveal a pattern \
             to discuss with your doctor.",
            &["eating", "meal", "flutter", "vagus", "after food"],
        ),
        (
            "builtin-faq-caffeine",
            "Can caffeine trigger ectopic beats?",
            "Caffeine is a commonly reported trigger, although research results are mixed. Try noting your \
             coffee, tea and energy-drink intake alongside your episodes for a couple of weeks; if you see a \
             link, reducing gradually is gentler than stopping abruptly.",
            &["caffeine", "coffee", "energy drink", "tea"],
        ),
        (
            "builtin-faq-anxiety",
            "Does anxiety make ectopic beats worse?",
            "Stress and anxiety raise adrenaline, which can make ectopic beats more frequent and more \
             noticeable, and noticing them can in turn raise anxiety. Slow breathing, gentle movement and \
             grounding exercises can help break that loop. You are not alone in this.",
            &["anxiety", "anxious", "stress", "worried", "panic"],
        ),
    ];

    for (sort_order, (id, question, answer, keywords)) in entries.iter().enumerate() {
        let keywords_json = serde_json::to_string(keywords)?;
        conn.execute(
            "INSERT OR IGNORE INTO faq_entries
             (id, question, answer, keywords, is_active, hit_count, sort_order, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, 0, ?5, ?6, ?6)",
            params![id, question, answer, keywords_json, sort_order as i64, now],
        )?;
    }

    tracing::debug!("Builtin FAQ entries seeded");
    Ok(())
}

/// Fresh, migrated database for tests. Seeded FAQ entries are removed so
/// tests control the FAQ set exactly.
#[cfg(test)]
pub fn init_test_db() -> Result<DbPool, AppError> {
    use std::time::Duration;

    // Unique temp file per test; r2d2 + in-memory databases don't share state.
    let tmp = std::env::temp_dir().join(format!("wellness_test_{}.db", uuid::Uuid::new_v4()));
    let manager = SqliteConnectionManager::file(&tmp);
    let pool = Pool::builder()
        .max_size(4)
        .connection_timeout(Duration::from_secs(5))
        .connection_customizer(Box::new(SqlitePragmaCustomizer))
        .build(manager)?;

    let conn = pool.get()?;
    migrations::run(&conn)?;
    seed_builtin_faq(&conn)?;
    conn.execute("DELETE FROM faq_entries", [])?;
    drop(conn);
    Ok(pool)
}
