//! Chat request orchestration.
//!
//! validate → burst guard → quota check → FAQ match → (hit: cached answer)
//! or (miss: prompt + generative call → commit usage). HTTP concerns stay in
//! the server layer; everything here returns `AppError`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::faq::{match_faq, FaqMatch, FaqThresholds};
use super::governor::{Reservation, UsageGovernor, UsageSnapshot};
use super::prompt::build_chat_prompt;
use super::provider::{GenerationError, GenerativeBackend};
use super::rate_limiter::BurstGuard;
use super::tier::Tier;
use crate::config::AppConfig;
use crate::db::repos::{episodes as episode_repo, faq as faq_repo, roles as role_repo};
use crate::db::{self, DbPool};
use crate::error::AppError;
use crate::validation;

/// Successful chat answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub message: String,
    pub is_cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub remaining: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub thresholds: FaqThresholds,
    pub episode_history_limit: u32,
    pub max_message_chars: usize,
    pub burst_max: usize,
    pub burst_window: Duration,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            thresholds: FaqThresholds::default(),
            episode_history_limit: 10,
            max_message_chars: 2000,
            burst_max: 5,
            burst_window: Duration::from_secs(10),
        }
    }
}

impl ChatOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            thresholds: FaqThresholds::from(&config.faq),
            episode_history_limit: config.prompt.episode_history_limit,
            max_message_chars: config.prompt.max_message_chars,
            burst_max: config.quota.burst_max,
            burst_window: Duration::from_secs(config.quota.burst_window_secs),
        }
    }
}

pub struct ChatService {
    pool: DbPool,
    governor: Arc<UsageGovernor>,
    backend: Arc<dyn GenerativeBackend>,
    burst: BurstGuard,
    options: ChatOptions,
}

impl ChatService {
    pub fn new(
        pool: DbPool,
        governor: Arc<UsageGovernor>,
        backend: Arc<dyn GenerativeBackend>,
        options: ChatOptions,
    ) -> Self {
        let burst = BurstGuard::new(options.burst_max, options.burst_window);
        Self {
            pool,
            governor,
            backend,
            burst,
            options,
        }
    }

    pub fn burst_guard(&self) -> &BurstGuard {
        &self.burst
    }

    /// Resolve the caller's tier from their stored roles.
    pub async fn tier_for(&self, user_id: &str) -> Result<Tier, AppError> {
        let pool = self.pool.clone();
        let user_id = user_id.to_string();
        let roles = db::blocking(move || role_repo::list_for_user(&pool, &user_id)).await?;
        Ok(Tier::from_roles(&roles))
    }

    /// Usage view for `GET /chat/usage`.
    pub async fn usage(&self, user_id: &str, today: NaiveDate) -> Result<UsageSnapshot, AppError> {
        let tier = self.tier_for(user_id).await?;
        let governor = self.governor.clone();
        let user_id = user_id.to_string();
        db::blocking(move || governor.snapshot(&user_id, tier, today)).await
    }

    /// Answer one chat message for an authenticated user.
    ///
    /// `today` is the quota day and `now` the commit timestamp; both come from
    /// the caller so this path never reads the clock itself.
    pub async fn handle(
        &self,
        user_id: &str,
        message: &str,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<ChatReply, AppError> {
        let message = validation::chat_message(message, self.options.max_message_chars)?.to_string();

        if let Err(retry_after_secs) = self.burst.check(user_id) {
            tracing::info!(user_id = %user_id, retry_after_secs, outcome = "burst_limited", "Chat request rejected");
            return Err(AppError::TooManyRequests { retry_after_secs });
        }

        // 1. Quota gate (fails closed on storage errors).
        let tier = self.tier_for(user_id).await?;
        let reservation = {
            let governor = self.governor.clone();
            let user_id = user_id.to_string();
            db::blocking(move || governor.check_and_reserve(&user_id, tier, today)).await?
        };
        let limit = match reservation {
            Reservation::Allowed { limit, .. } => limit,
            Reservation::QuotaExceeded { limit, current } => {
                tracing::info!(user_id = %user_id, tier = %tier, limit, current, outcome = "quota_exceeded", "Chat request rejected");
                return Err(AppError::QuotaExceeded { limit, current });
            }
        };

        // 2. FAQ cache.
        let entries = {
            let pool = self.pool.clone();
            db::blocking(move || faq_repo::list_active(&pool)).await?
        };
        if let FaqMatch::CacheHit { entry_id, answer, score, matched_keywords } =
            match_faq(&message, &entries, self.options.thresholds)
        {
            let pool = self.pool.clone();
            let id = entry_id.clone();
            let hits = db::blocking(move || faq_repo::increment_hit_count(&pool, &id)).await?;
            tracing::info!(
                user_id = %user_id,
                faq_id = %entry_id,
                score,
                matched = ?matched_keywords,
                hits,
                outcome = "cache_hit",
                "Answered from FAQ",
            );
            return Ok(ChatReply {
                message: answer,
                is_cached: true,
                remaining: None,
                limit: None,
            });
        }

        // 3. Escalate.
        let episodes = {
            let pool = self.pool.clone();
            let user_id = user_id.to_string();
            let n = self.options.episode_history_limit;
            db::blocking(move || episode_repo::recent_for_user(&pool, &user_id, n)).await?
        };
        let prompt = build_chat_prompt(&message, &episodes);

        let answer = match self.backend.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                let status = match &e {
                    GenerationError::RateLimited => Some(429),
                    GenerationError::CapacityExceeded => Some(402),
                    GenerationError::Other { status, .. } => *status,
                };
                if matches!(e, GenerationError::Other { .. }) {
                    tracing::error!(user_id = %user_id, backend = self.backend.name(), status = ?status, outcome = "upstream_error", "Generative call failed: {}", e);
                } else {
                    tracing::warn!(user_id = %user_id, backend = self.backend.name(), status = ?status, outcome = "upstream_limited", "Generative call refused: {}", e);
                }
                return Err(e.into());
            }
        };

        // 4. Count it only now that an answer exists.
        let record = {
            let governor = self.governor.clone();
            let user_id = user_id.to_string();
            db::blocking(move || governor.commit(&user_id, today, now)).await?
        };
        let remaining = limit.saturating_sub(record.daily_count);

        tracing::info!(
            user_id = %user_id,
            tier = %tier,
            daily = record.daily_count,
            remaining,
            episodes = episodes.len(),
            outcome = "escalated",
            "Answered by generative backend",
        );

        Ok(ChatReply {
            message: answer,
            is_cached: false,
            remaining: Some(remaining),
            limit: Some(limit),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::init_test_db;
    use crate::db::models::CreateFaqInput;
    use crate::db::repos::usage as usage_repo;
    use crate::engine::provider::ChatPrompt;
    use crate::engine::tier::QuotaPolicy;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Backend that replays queued results and records prompts.
    #[derive(Default)]
    pub(crate) struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<String, GenerationError>>>,
        prompts: Mutex<Vec<ChatPrompt>>,
    }

    impl ScriptedBackend {
        pub(crate) fn with(replies: Vec<Result<String, GenerationError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        fn last_prompt(&self) -> Option<ChatPrompt> {
            self.prompts.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl GenerativeBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn generate(&self, prompt: &ChatPrompt) -> Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("generated answer".into()))
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
    }

    pub(crate) fn service_with(
        pool: &DbPool,
        backend: Arc<ScriptedBackend>,
        options: ChatOptions,
    ) -> ChatService {
        let governor = Arc::new(UsageGovernor::new(pool.clone(), QuotaPolicy::default()));
        ChatService::new(pool.clone(), governor, backend, options)
    }

    fn relaxed() -> ChatOptions {
        ChatOptions {
            burst_max: 100,
            ..Default::default()
        }
    }

    fn seed_meal_faq(pool: &DbPool) -> String {
        faq_repo::create(
            pool,
            CreateFaqInput {
                question: "Why do I feel palpitations after eating?".into(),
                answer: "Digestion can stimulate the vagus nerve.".into(),
                keywords: vec!["eating".into(), "flutter".into(), "vagus".into()],
                is_active: None,
                sort_order: None,
            },
        )
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn test_fresh_free_user_escalates() {
        let pool = init_test_db().unwrap();
        let backend = ScriptedBackend::with(vec![Ok("Take a slow breath.".into())]);
        let svc = service_with(&pool, backend.clone(), relaxed());

        let reply = svc.handle("u1", "I can't sleep tonight", today(), Utc::now()).await.unwrap();
        assert_eq!(
            reply,
            ChatReply {
                message: "Take a slow breath.".into(),
                is_cached: false,
                remaining: Some(2),
                limit: Some(3),
            }
        );
        assert_eq!(usage_repo::get(&pool, "u1").unwrap().unwrap().daily_count, 1);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_user_gets_quota_error() {
        let pool = init_test_db().unwrap();
        let backend = ScriptedBackend::with(vec![]);
        let svc = service_with(&pool, backend.clone(), relaxed());
        for _ in 0..3 {
            svc.handle("u1", "hello there", today(), Utc::now()).await.unwrap();
        }

        let err = svc.handle("u1", "hello again", today(), Utc::now()).await.unwrap_err();
        assert!(matches!(err, AppError::QuotaExceeded { limit: 3, current: 3 }));
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_faq_hit_is_free() {
        let pool = init_test_db().unwrap();
        let faq_id = seed_meal_faq(&pool);
        let backend = ScriptedBackend::with(vec![]);
        let svc = service_with(&pool, backend.clone(), relaxed());

        let reply = svc
            .handle("u1", "I feel a flutter after eating dinner", today(), Utc::now())
            .await
            .unwrap();
        assert!(reply.is_cached);
        assert_eq!(reply.message, "Digestion can stimulate the vagus nerve.");
        assert_eq!((reply.remaining, reply.limit), (None, None));

        assert_eq!(faq_repo::get_by_id(&pool, &faq_id).unwrap().hit_count, 1);
        let usage = usage_repo::get(&pool, "u1").unwrap().unwrap();
        assert_eq!((usage.daily_count, usage.monthly_count), (0, 0));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_quota_is_checked_before_faq() {
        let pool = init_test_db().unwrap();
        seed_meal_faq(&pool);
        let svc = service_with(&pool, ScriptedBackend::with(vec![]), relaxed());
        for _ in 0..3 {
            svc.handle("u1", "something unrelated", today(), Utc::now()).await.unwrap();
        }
        let err = svc
            .handle("u1", "flutter after eating", today(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::QuotaExceeded { .. }));
    }

    #[tokio::test]
    async fn test_provider_rate_limit_consumes_nothing() {
        let pool = init_test_db().unwrap();
        let backend = ScriptedBackend::with(vec![
            Ok("first".into()),
            Err(GenerationError::RateLimited),
        ]);
        let svc = service_with(&pool, backend, relaxed());
        svc.handle("u1", "hello", today(), Utc::now()).await.unwrap();

        let err = svc.handle("u1", "hello", today(), Utc::now()).await.unwrap_err();
        assert!(matches!(err, AppError::GenerativeRateLimited(_)));
        let usage = usage_repo::get(&pool, "u1").unwrap().unwrap();
        assert_eq!((usage.daily_count, usage.monthly_count), (1, 1));
    }

    #[tokio::test]
    async fn test_capacity_and_unknown_upstream_errors() {
        let pool = init_test_db().unwrap();
        let backend = ScriptedBackend::with(vec![
            Err(GenerationError::CapacityExceeded),
            Err(GenerationError::Other { status: Some(500), message: "boom".into() }),
        ]);
        let svc = service_with(&pool, backend, relaxed());

        assert!(matches!(
            svc.handle("u1", "hello", today(), Utc::now()).await,
            Err(AppError::GenerativeCapacityExceeded(_))
        ));
        assert!(matches!(
            svc.handle("u1", "hello", today(), Utc::now()).await,
            Err(AppError::UpstreamUnknown { status: 500, .. })
        ));
        assert_eq!(usage_repo::get(&pool, "u1").unwrap().unwrap().daily_count, 0);
    }

    #[tokio::test]
    async fn test_subscriber_role_raises_limit() {
        let pool = init_test_db().unwrap();
        role_repo::grant(&pool, "u1", "subscriber").unwrap();
        let svc = service_with(&pool, ScriptedBackend::with(vec![]), relaxed());

        let reply = svc.handle("u1", "hello", today(), Utc::now()).await.unwrap();
        assert_eq!((reply.remaining, reply.limit), (Some(19), Some(20)));
    }

    #[tokio::test]
    async fn test_prompt_carries_recent_episodes() {
        let pool = init_test_db().unwrap();
        episode_repo::insert(&pool, &episode_repo::fixture("u1", "2026-05-31T20:00:00Z", "after wine")).unwrap();
        episode_repo::insert(&pool, &episode_repo::fixture("u2", "2026-05-31T21:00:00Z", "someone else")).unwrap();
        let backend = ScriptedBackend::with(vec![]);
        let svc = service_with(&pool, backend.clone(), relaxed());

        svc.handle("u1", "is this normal?", today(), Utc::now()).await.unwrap();
        let prompt = backend.last_prompt().unwrap();
        assert!(prompt.messages[0].content.contains("after wine"));
        assert!(!prompt.messages[0].content.contains("someone else"));
        assert_eq!(prompt.messages[1].content, "is this normal?");
    }

    #[tokio::test]
    async fn test_burst_guard_rejects_rapid_repeats() {
        let pool = init_test_db().unwrap();
        let svc = service_with(
            &pool,
            ScriptedBackend::with(vec![]),
            ChatOptions {
                burst_max: 1,
                ..Default::default()
            },
        );
        svc.handle("u1", "hello", today(), Utc::now()).await.unwrap();
        assert!(matches!(
            svc.handle("u1", "hello", today(), Utc::now()).await,
            Err(AppError::TooManyRequests { .. })
        ));
        assert_eq!(usage_repo::get(&pool, "u1").unwrap().unwrap().daily_count, 1);
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected_without_side_effects() {
        let pool = init_test_db().unwrap();
        let backend = ScriptedBackend::with(vec![]);
        let svc = service_with(&pool, backend.clone(), relaxed());
        assert!(matches!(
            svc.handle("u1", "   ", today(), Utc::now()).await,
            Err(AppError::Validation(_))
        ));
        assert!(usage_repo::get(&pool, "u1").unwrap().is_none());
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_usage_snapshot_reflects_escalations() {
        let pool = init_test_db().unwrap();
        let svc = service_with(&pool, ScriptedBackend::with(vec![]), relaxed());
        svc.handle("u1", "hello", today(), Utc::now()).await.unwrap();

        let snap = svc.usage("u1", today()).await.unwrap();
        assert_eq!(snap.tier, Tier::Free);
        assert_eq!((snap.daily_count, snap.remaining, snap.limit), (1, 2, 3));
        assert!(snap.last_message_at.is_some());
    }
}
