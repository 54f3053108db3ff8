use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::AppError;

// =============================================================================
// Tier
// =============================================================================

/// Subscription level derived from a user's roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Subscriber,
    Admin,
    Moderator,
}

/// Role precedence when a user holds several roles.
const TIER_PRECEDENCE: &[Tier] = &[Tier::Admin, Tier::Subscriber, Tier::Moderator];

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Subscriber => "subscriber",
            Tier::Admin => "admin",
            Tier::Moderator => "moderator",
        }
    }

    /// Parse a role string as stored in `user_roles`. Unknown roles yield None.
    pub fn from_role(role: &str) -> Option<Self> {
        match role.trim().to_lowercase().as_str() {
            "free" => Some(Tier::Free),
            "subscriber" => Some(Tier::Subscriber),
            "admin" => Some(Tier::Admin),
            "moderator" => Some(Tier::Moderator),
            _ => None,
        }
    }

    /// Collapse zero-or-more role strings into a single tier.
    pub fn from_roles<S: AsRef<str>>(roles: &[S]) -> Self {
        let held: Vec<Tier> = roles.iter().filter_map(|r| Tier::from_role(r.as_ref())).collect();
        TIER_PRECEDENCE
            .iter()
            .copied()
            .find(|t| held.contains(t))
            .unwrap_or(Tier::Free)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// QuotaPolicy
// =============================================================================

/// Outcome of a limit lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedLimit {
    pub limit: u32,
    /// False when the tier had no entry and the fallback tier's limit was used.
    pub defined: bool,
}

/// Table-driven tier → daily message limit mapping.
///
/// Tiers absent from the table are "not yet defined"; they are evaluated
/// with the fallback tier's limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaPolicy {
    limits: BTreeMap<Tier, u32>,
    fallback: Tier,
    fallback_limit: u32,
}

impl QuotaPolicy {
    pub fn new(limits: BTreeMap<Tier, u32>, fallback: Tier) -> Result<Self, AppError> {
        let fallback_limit = *limits.get(&fallback).ok_or_else(|| {
            AppError::Config(format!("Fallback tier '{fallback}' has no daily limit defined"))
        })?;
        Ok(Self {
            limits,
            fallback,
            fallback_limit,
        })
    }

    /// free → 3, subscriber → 20, admin → 20. Moderator is left undefined.
    pub fn default_limits() -> BTreeMap<Tier, u32> {
        BTreeMap::from([(Tier::Free, 3), (Tier::Subscriber, 20), (Tier::Admin, 20)])
    }

    pub fn resolve(&self, tier: Tier) -> ResolvedLimit {
        match self.limits.get(&tier) {
            Some(&limit) => ResolvedLimit { limit, defined: true },
            None => ResolvedLimit {
                limit: self.fallback_limit,
                defined: false,
            },
        }
    }

    pub fn daily_limit(&self, tier: Tier) -> u32 {
        self.resolve(tier).limit
    }

    pub fn fallback(&self) -> Tier {
        self.fallback
    }
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            limits: Self::default_limits(),
            fallback: Tier::Free,
            fallback_limit: 3,
        }
    }
}
