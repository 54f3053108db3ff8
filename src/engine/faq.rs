//! Keyword-overlap FAQ matching.
//!
//! Pure over already-loaded entries; cannot fail. Keywords that appear as a
//! whole whitespace-delimited word score double their length, substring-only
//! hits score their length. A candidate must match at least
//! `min_matched_keywords` keywords or score strictly above `score_floor`.

use std::collections::HashSet;

use crate::config::FaqConfig;
use crate::db::models::FaqEntry;

/// Relevance floor applied to candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaqThresholds {
    pub min_matched_keywords: usize,
    pub score_floor: usize,
}

impl Default for FaqThresholds {
    fn default() -> Self {
        Self {
            min_matched_keywords: 2,
            score_floor: 15,
        }
    }
}

impl From<&FaqConfig> for FaqThresholds {
    fn from(config: &FaqConfig) -> Self {
        Self {
            min_matched_keywords: config.min_matched_keywords,
            score_floor: config.score_floor,
        }
    }
}

/// Result of trying to answer from the FAQ set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaqMatch {
    CacheHit {
        entry_id: String,
        answer: String,
        score: usize,
        matched_keywords: Vec<String>,
    },
    CacheMiss,
}

impl FaqMatch {
    pub fn is_hit(&self) -> bool {
        matches!(self, FaqMatch::CacheHit { .. })
    }
}

/// Score one entry against an already-lowercased message and its token set.
fn score_entry(lowered: &str, tokens: &HashSet<&str>, entry: &FaqEntry) -> (usize, Vec<String>) {
    let mut score = 0;
    let mut matched = Vec::new();

    for keyword in &entry.keywords {
        let keyword = keyword.to_lowercase();
        if keyword.is_empty() || !lowered.contains(keyword.as_str()) {
            continue;
        }
        let len = keyword.chars().count();
        score += if tokens.contains(keyword.as_str()) { len * 2 } else { len };
        matched.push(keyword);
    }

    (score, matched)
}

/// Pick the best active entry for `message`, or `CacheMiss`.
///
/// Ties keep the earliest entry in `entries` order.
pub fn match_faq(message: &str, entries: &[FaqEntry], thresholds: FaqThresholds) -> FaqMatch {
    let lowered = message.to_lowercase();
    let tokens: HashSet<&str> = lowered.split_whitespace().collect();

    let mut best: Option<(&FaqEntry, usize, Vec<String>)> = None;

    for entry in entries.iter().filter(|e| e.is_active) {
        let (score, matched) = score_entry(&lowered, &tokens, entry);
        if matched.is_empty() {
            continue;
        }
        let relevant =
            matched.len() >= thresholds.min_matched_keywords || score > thresholds.score_floor;
        if !relevant {
            continue;
        }
        if best.as_ref().map_or(true, |(_, top, _)| score > *top) {
            best = Some((entry, score, matched));
        }
    }

    match best {
        Some((entry, score, matched_keywords)) => FaqMatch::CacheHit {
            entry_id: entry.id.clone(),
            answer: entry.answer.clone(),
            score,
            matched_keywords,
        },
        None => FaqMatch::CacheMiss,
    }
}
