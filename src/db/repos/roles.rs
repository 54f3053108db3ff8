use rusqlite::params;

use crate::db::DbPool;
use crate::error::AppError;

/// Role strings held by a user (zero or more).
pub fn list_for_user(pool: &DbPool, user_id: &str) -> Result<Vec<String>, AppError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare("SELECT role FROM user_roles WHERE user_id = ?1 ORDER BY role")?;
    let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::Database)
}

/// Grant a role. Granting an existing role is a no-op.
pub fn grant(pool: &DbPool, user_id: &str, role: &str) -> Result<(), AppError> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT OR IGNORE INTO user_roles (user_id, role, created_at) VALUES (?1, ?2, ?3)",
        params![user_id, role.trim().to_lowercase(), chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

/// Revoke a role. Returns true if a row was deleted.
#[cfg(test)]
pub fn revoke(pool: &DbPool, user_id: &str, role: &str) -> Result<bool, AppError> {
    let conn = pool.get()?;
    let rows = conn.execute(
        "DELETE FROM user_roles WHERE user_id = ?1 AND role = ?2",
        params![user_id, role.trim().to_lowercase()],
    )?;
    Ok(rows > 0)
}
