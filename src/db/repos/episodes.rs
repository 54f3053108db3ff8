use rusqlite::{params, Row};

use crate::db::models::Episode;
use crate::db::DbPool;
use crate::error::AppError;

fn row_to_episode(row: &Row) -> rusqlite::Result<Episode> {
    Ok(Episode {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        occurred_at: row.get("occurred_at")?,
        beat_type: row.get("beat_type")?,
        severity: row.get("severity")?,
        symptoms: row.get("symptoms")?,
        activity: row.get("activity")?,
        notes: row.get("notes")?,
    })
}

/// Most recent episodes for a user, newest first.
pub fn recent_for_user(pool: &DbPool, user_id: &str, limit: u32) -> Result<Vec<Episode>, AppError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT * FROM episodes
         WHERE user_id = ?1
         ORDER BY occurred_at DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![user_id, limit], row_to_episode)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::Database)
}

/// Insert an episode. Episodes are written by the client app; this seeds fixtures.
#[cfg(test)]
pub(crate) fn insert(pool: &DbPool, episode: &Episode) -> Result<(), AppError> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO episodes (id, user_id, occurred_at, beat_type, severity, symptoms, activity, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            episode.id,
            episode.user_id,
            episode.occurred_at,
            episode.beat_type,
            episode.severity,
            episode.symptoms,
            episode.activity,
            episode.notes,
        ],
    )?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn fixture(user_id: &str, occurred_at: &str, notes: &str) -> Episode {
    Episode {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.into(),
        occurred_at: occurred_at.into(),
        beat_type: Some("PVC".into()),
        severity: Some(4),
        symptoms: Some("thud".into()),
        activity: Some("resting".into()),
        notes: Some(notes.into()),
    }
}
