//! Per-user daily quota for generative escalations.
//!
//! `check_and_reserve` and `commit` are separate critical sections: the check
//! (with its day-rollover reset) is one immediate transaction, the commit one
//! atomic upsert. Nothing is held across the generative call in between.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::tier::{QuotaPolicy, Tier};
use crate::db::models::UsageRecord;
use crate::db::repos::usage as usage_repo;
use crate::db::DbPool;
use crate::error::AppError;
use crate::validation;

/// Calendar date of `now` in the quota timezone.
pub fn local_date(now: DateTime<Utc>, tz: Tz) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

/// Decision returned by [`UsageGovernor::check_and_reserve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Allowed { limit: u32, current: u32 },
    QuotaExceeded { limit: u32, current: u32 },
}


/// Read-only usage view for the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub tier: Tier,
    pub daily_count: u32,
    pub monthly_count: u32,
    pub limit: u32,
    pub remaining: u32,
    pub last_message_at: Option<DateTime<Utc>>,
}

pub struct UsageGovernor {
    pool: DbPool,
    policy: QuotaPolicy,
}

impl UsageGovernor {
    pub fn new(pool: DbPool, policy: QuotaPolicy) -> Self {
        Self { pool, policy }
    }

    /// Daily limit for `tier`. Undefined tiers get the fallback tier's limit.
    pub fn daily_limit(&self, tier: Tier) -> u32 {
        let resolved = self.policy.resolve(tier);
        if !resolved.defined {
            tracing::warn!(
                tier = %tier,
                fallback = %self.policy.fallback(),
                limit = resolved.limit,
                "No daily limit defined for tier; applying fallback tier limit",
            );
        }
        resolved.limit
    }

    /// Decide whether `user_id` may trigger one more escalation today.
    ///
    /// Creates the usage row on first use and persists the day-rollover reset
    /// before evaluating, even when the answer is `QuotaExceeded`.
    pub fn check_and_reserve(
        &self,
        user_id: &str,
        tier: Tier,
        today: NaiveDate,
    ) -> Result<Reservation, AppError> {
        validation::require_non_empty("user_id", user_id)?;

        let record = usage_repo::load_for_day(&self.pool, user_id, today)?;
        let limit = self.daily_limit(tier);
        let current = record.daily_count;

        if current >= limit {
            tracing::debug!(user_id = %user_id, tier = %tier, limit, current, "Daily quota exhausted");
            return Ok(Reservation::QuotaExceeded { limit, current });
        }
        Ok(Reservation::Allowed { limit, current })
    }

    /// Count one escalation. Call only after the generative backend answered.
    pub fn commit(
        &self,
        user_id: &str,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<UsageRecord, AppError> {
        validation::require_non_empty("user_id", user_id)?;
        let record = usage_repo::increment(&self.pool, user_id, today, now)?;
        tracing::debug!(
            user_id = %user_id,
            daily = record.daily_count,
            monthly = record.monthly_count,
            "Usage committed",
        );
        Ok(record)
    }

    /// Current usage with the rollover applied in memory only (no write).
    pub fn snapshot(&self, user_id: &str, tier: Tier, today: NaiveDate) -> Result<UsageSnapshot, AppError> {
        let record = usage_repo::get(&self.pool, user_id)?
            .unwrap_or_else(|| UsageRecord::fresh(user_id, today));
        let daily_count = if record.last_reset_date == today { record.daily_count } else { 0 };
        let limit = self.daily_limit(tier);

        Ok(UsageSnapshot {
            tier,
            daily_count,
            monthly_count: record.monthly_count,
            limit,
            remaining: limit.saturating_sub(daily_count),
            last_message_at: record.last_message_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test_db;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
    }

    fn governor() -> UsageGovernor {
        UsageGovernor::new(init_test_db().unwrap(), QuotaPolicy::default())
    }

    /// Drive `n` full escalations (check + commit) for one user on one day.
    fn escalate(gov: &UsageGovernor, user: &str, tier: Tier, today: NaiveDate, n: u32) {
        for _ in 0..n {
            let r = gov.check_and_reserve(user, tier, today).unwrap();
            assert!(matches!(r, Reservation::Allowed { .. }), "unexpected {r:?}");
            gov.commit(user, today, Utc::now()).unwrap();
        }
    }

    #[test]
    fn test_fresh_user_is_allowed() {
        let gov = governor();
        assert_eq!(
            gov.check_and_reserve("u1", Tier::Free, day(1)).unwrap(),
            Reservation::Allowed { limit: 3, current: 0 }
        );
    }

    #[test]
    fn test_free_tier_exhausts_after_three() {
        let gov = governor();
        escalate(&gov, "u1", Tier::Free, day(1), 3);
        assert_eq!(
            gov.check_and_reserve("u1", Tier::Free, day(1)).unwrap(),
            Reservation::QuotaExceeded { limit: 3, current: 3 }
        );
    }

    #[test]
    fn test_subscriber_and_admin_get_twenty() {
        let gov = governor();
        escalate(&gov, "sub", Tier::Subscriber, day(1), 20);
        assert_eq!(
            gov.check_and_reserve("sub", Tier::Subscriber, day(1)).unwrap(),
            Reservation::QuotaExceeded { limit: 20, current: 20 }
        );
        escalate(&gov, "adm", Tier::Admin, day(1), 19);
        assert_eq!(
            gov.check_and_reserve("adm", Tier::Admin, day(1)).unwrap(),
            Reservation::Allowed { limit: 20, current: 19 }
        );
    }

    #[test]
    fn test_check_alone_never_counts() {
        let gov = governor();
        for _ in 0..10 {
            gov.check_and_reserve("u1", Tier::Free, day(1)).unwrap();
        }
        assert_eq!(gov.snapshot("u1", Tier::Free, day(1)).unwrap().daily_count, 0);
    }

    #[test]
    fn test_rollover_resets_once_per_day() {
        let gov = governor();
        escalate(&gov, "u1", Tier::Free, day(1), 3);

        assert_eq!(
            gov.check_and_reserve("u1", Tier::Free, day(2)).unwrap(),
            Reservation::Allowed { limit: 3, current: 0 }
        );
        gov.commit("u1", day(2), Utc::now()).unwrap();

        // Same day again: no second reset, the commit above is still counted.
        assert_eq!(
            gov.check_and_reserve("u1", Tier::Free, day(2)).unwrap(),
            Reservation::Allowed { limit: 3, current: 1 }
        );
        let record = usage_repo::get(&gov.pool, "u1").unwrap().unwrap();
        assert_eq!(record.monthly_count, 4);
        assert_eq!(record.last_reset_date, day(2));
    }

    #[test]
    fn test_rejected_request_still_persists_reset() {
        let gov = governor();
        escalate(&gov, "u1", Tier::Free, day(1), 3);

        // Simulate a lower limit on the new day so the request is rejected.
        let strict = UsageGovernor::new(
            gov.pool.clone(),
            QuotaPolicy::new(
                std::collections::BTreeMap::from([(Tier::Free, 0)]),
                Tier::Free,
            )
            .unwrap(),
        );
        assert_eq!(
            strict.check_and_reserve("u1", Tier::Free, day(2)).unwrap(),
            Reservation::QuotaExceeded { limit: 0, current: 0 }
        );
        let record = usage_repo::get(&gov.pool, "u1").unwrap().unwrap();
        assert_eq!(record.daily_count, 0);
        assert_eq!(record.last_reset_date, day(2));
    }

    #[test]
    fn test_moderator_uses_fallback_limit() {
        let gov = governor();
        escalate(&gov, "mod", Tier::Moderator, day(1), 3);
        assert_eq!(
            gov.check_and_reserve("mod", Tier::Moderator, day(1)).unwrap(),
            Reservation::QuotaExceeded { limit: 3, current: 3 }
        );
    }

    #[test]
    fn test_snapshot_applies_rollover_without_writing() {
        let gov = governor();
        escalate(&gov, "u1", Tier::Free, day(1), 2);

        let same_day = gov.snapshot("u1", Tier::Free, day(1)).unwrap();
        assert_eq!((same_day.daily_count, same_day.remaining), (2, 1));

        let next_day = gov.snapshot("u1", Tier::Free, day(2)).unwrap();
        assert_eq!((next_day.daily_count, next_day.remaining, next_day.monthly_count), (0, 3, 2));
        let stored = usage_repo::get(&gov.pool, "u1").unwrap().unwrap();
        assert_eq!(stored.last_reset_date, day(1));
    }

    #[test]
    fn test_empty_user_id_is_rejected() {
        let gov = governor();
        assert!(matches!(
            gov.check_and_reserve("  ", Tier::Free, day(1)),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_local_date_respects_timezone() {
        let now = DateTime::parse_from_rfc3339("2026-05-01T23:30:00Z").unwrap().with_timezone(&Utc);
        assert_eq!(local_date(now, chrono_tz::UTC), day(1));
        assert_eq!(local_date(now, chrono_tz::Europe::Madrid), day(2));
        assert_eq!(local_date(now, chrono_tz::America::New_York), day(1));
    }
}
