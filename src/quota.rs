//! Daily call budget for the two generation tiers.
//!
//! Each tier gets an independent daily cap. Counters live in a TTL cache
//! with a 24 h window, so a tier that was exhausted yesterday becomes
//! available again without a wall-clock reset job. Exhaustion is reported
//! as `None`/`false`, never as an error; the generation client decides
//! what an empty resolution means for a call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config;

/// Cost/quality level of the generation model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Higher accuracy, low daily cap. The only tier allowed for vision calls.
    Capable,
    /// Lower accuracy, high daily cap. Preferred for bulk text calls.
    Economy,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Capable => "capable",
            Self::Economy => "economy",
        }
    }
}

/// Daily caps per tier.
#[derive(Debug, Clone, Copy)]
pub struct QuotaCaps {
    pub capable_daily: u64,
    pub economy_daily: u64,
}

impl Default for QuotaCaps {
    fn default() -> Self {
        Self {
            capable_daily: config::CAPABLE_DAILY_CAP,
            economy_daily: config::ECONOMY_DAILY_CAP,
        }
    }
}

/// Tracks per-tier usage for the current 24 h window.
///
/// Safe under concurrent increments from multiple in-flight analyses:
/// counters are atomics shared through the cache.
pub struct QuotaTracker {
    caps: QuotaCaps,
    counters: moka::sync::Cache<Tier, Arc<AtomicU64>>,
}

impl QuotaTracker {
    pub fn new(caps: QuotaCaps) -> Self {
        let counters = moka::sync::Cache::builder()
            .max_capacity(4)
            .time_to_live(config::QUOTA_WINDOW)
            .build();
        Self { caps, counters }
    }

    fn cap_for(&self, tier: Tier) -> u64 {
        match tier {
            Tier::Capable => self.caps.capable_daily,
            Tier::Economy => self.caps.economy_daily,
        }
    }

    fn counter(&self, tier: Tier) -> Arc<AtomicU64> {
        self.counters
            .get_with(tier, || Arc::new(AtomicU64::new(0)))
    }

    /// Calls recorded against `tier` in the current window.
    pub fn usage(&self, tier: Tier) -> u64 {
        self.counters
            .get(&tier)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Whether `tier` still has budget today.
    pub fn available(&self, tier: Tier) -> bool {
        self.usage(tier) < self.cap_for(tier)
    }

    /// Resolve a tier for a text call: preferred tier first, then the other,
    /// then the preferred tier once more.
    ///
    /// The final re-check is a no-op when `prefer_capable` is true but is the
    /// secondary fallback for economy-preferring calls, so the branch order
    /// must stay exactly as written.
    pub fn resolve(&self, prefer_capable: bool) -> Option<Tier> {
        if prefer_capable && self.available(Tier::Capable) {
            return Some(Tier::Capable);
        }
        if self.available(Tier::Economy) {
            return Some(Tier::Economy);
        }
        if self.available(Tier::Capable) {
            return Some(Tier::Capable);
        }
        None
    }

    /// Vision calls are pinned to the capable tier; there is no fallback.
    pub fn resolve_vision(&self) -> Option<Tier> {
        if self.available(Tier::Capable) {
            Some(Tier::Capable)
        } else {
            None
        }
    }

    /// Record one call against `tier`.
    pub fn record(&self, tier: Tier) {
        let used = self.counter(tier).fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(tier = tier.as_str(), used, cap = self.cap_for(tier), "quota recorded");
    }
}

impl Default for QuotaTracker {
    fn default() -> Self {
        Self::new(QuotaCaps::default())
    }
}
