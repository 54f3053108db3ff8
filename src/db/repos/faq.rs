use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use crate::db::models::{CreateFaqInput, FaqEntry, UpdateFaqInput};
use crate::db::DbPool;
use crate::error::AppError;
use crate::validation;

fn row_to_faq(row: &Row) -> rusqlite::Result<FaqEntry> {
    let keywords_json: String = row.get("keywords")?;
    let keywords = serde_json::from_str::<Vec<String>>(&keywords_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(FaqEntry {
        id: row.get("id")?,
        question: row.get("question")?,
        answer: row.get("answer")?,
        keywords,
        is_active: row.get::<_, i32>("is_active")? != 0,
        hit_count: row.get("hit_count")?,
        sort_order: row.get("sort_order")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Active entries in enumeration order (`sort_order`, then creation).
/// This order is what the matcher uses to break score ties.
pub fn list_active(pool: &DbPool) -> Result<Vec<FaqEntry>, AppError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT * FROM faq_entries
         WHERE is_active = 1
         ORDER BY sort_order ASC, created_at ASC, id ASC",
    )?;
    let rows = stmt.query_map([], row_to_faq)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::Database)
}

/// Every entry, inactive ones included (admin view).
pub fn list_all(pool: &DbPool) -> Result<Vec<FaqEntry>, AppError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT * FROM faq_entries ORDER BY sort_order ASC, created_at ASC, id ASC",
    )?;
    let rows = stmt.query_map([], row_to_faq)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::Database)
}

pub fn get_by_id(pool: &DbPool, id: &str) -> Result<FaqEntry, AppError> {
    let conn = pool.get()?;
    conn.query_row(
        "SELECT * FROM faq_entries WHERE id = ?1",
        params![id],
        row_to_faq,
    )
    .optional()?
    .ok_or_else(|| AppError::NotFound(format!("FAQ entry {id}")))
}

pub fn create(pool: &DbPool, input: CreateFaqInput) -> Result<FaqEntry, AppError> {
    validation::require_non_empty("question", &input.question)?;
    validation::require_non_empty("answer", &input.answer)?;
    let keywords = validation::normalize_keywords(input.keywords)?;

    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO faq_entries
         (id, question, answer, keywords, is_active, hit_count, sort_order, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?7)",
        params![
            id,
            input.question.trim(),
            input.answer.trim(),
            serde_json::to_string(&keywords)?,
            input.is_active.unwrap_or(true) as i32,
            input.sort_order.unwrap_or(0),
            now,
        ],
    )?;
    drop(conn);

    tracing::info!(faq_id = %id, keywords = keywords.len(), "FAQ entry created");
    get_by_id(pool, &id)
}

pub fn update(pool: &DbPool, id: &str, input: UpdateFaqInput) -> Result<FaqEntry, AppError> {
    if let Some(ref q) = input.question {
        validation::require_non_empty("question", q)?;
    }
    if let Some(ref a) = input.answer {
        validation::require_non_empty("answer", a)?;
    }
    let keywords_json = match input.keywords {
        Some(k) => Some(serde_json::to_string(&validation::normalize_keywords(k)?)?),
        None => None,
    };

    let mut sets: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
    push_field!(input.question.map(|q| q.trim().to_string()), "question", sets, values);
    push_field!(input.answer.map(|a| a.trim().to_string()), "answer", sets, values);
    push_field!(keywords_json, "keywords", sets, values);
    push_field!(input.is_active.map(i32::from), "is_active", sets, values);
    push_field!(input.sort_order, "sort_order", sets, values);

    if sets.is_empty() {
        return get_by_id(pool, id);
    }

    push_field!(Some(chrono::Utc::now().to_rfc3339()), "updated_at", sets, values);
    values.push(Box::new(id.to_string()));
    let sql = format!(
        "UPDATE faq_entries SET {} WHERE id = ?{}",
        sets.join(", "),
        values.len()
    );

    let conn = pool.get()?;
    let rows = conn.execute(&sql, params_from_iter(values.iter()))?;
    drop(conn);
    if rows == 0 {
        return Err(AppError::NotFound(format!("FAQ entry {id}")));
    }
    get_by_id(pool, id)
}

/// Record a cache hit. Returns the new hit count.
pub fn increment_hit_count(pool: &DbPool, id: &str) -> Result<u32, AppError> {
    let conn = pool.get()?;
    conn.query_row(
        "UPDATE faq_entries SET hit_count = hit_count + 1 WHERE id = ?1 RETURNING hit_count",
        params![id],
        |row| row.get::<_, u32>(0),
    )
    .optional()?
    .ok_or_else(|| AppError::NotFound(format!("FAQ entry {id}")))
}
