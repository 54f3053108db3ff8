use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ============================================================================
// Chat usage
// ============================================================================

/// Per-user escalation counters. One row per user in `chat_usage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub user_id: String,
    pub daily_count: u32,
    pub monthly_count: u32,
    pub last_reset_date: NaiveDate,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl UsageRecord {
    /// The all-zero record a user starts with.
    pub fn fresh(user_id: &str, today: NaiveDate) -> Self {
        Self {
            user_id: user_id.to_string(),
            daily_count: 0,
            monthly_count: 0,
            last_reset_date: today,
            last_message_at: None,
        }
    }
}

// ============================================================================
// FAQ entries
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct FaqEntry {
    pub id: String,
    pub question: String,
    pub answer: String,
    /// Lowercase trigger terms. Stored as a JSON array.
    pub keywords: Vec<String>,
    pub is_active: bool,
    pub hit_count: u32,
    pub sort_order: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CreateFaqInput {
    pub question: String,
    pub answer: String,
    pub keywords: Vec<String>,
    pub is_active: Option<bool>,
    pub sort_order: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFaqInput {
    pub question: Option<String>,
    pub answer: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub is_active: Option<bool>,
    pub sort_order: Option<i64>,
}

// ============================================================================
// Episodes (read-only context for the assistant)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub id: String,
    pub user_id: String,
    pub occurred_at: String,
    pub beat_type: Option<String>,
    pub severity: Option<i64>,
    pub symptoms: Option<String>,
    pub activity: Option<String>,
    pub notes: Option<String>,
}
