//! Cache configuration.
//!
//! Resolved from the `[cache]` section of the settings.

use std::time::Duration;

const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_CONSUME_BATCH_LIMIT: usize = 100;

/// When cached entries stop being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Entries expire `ttl` after they were stored, and on invalidation.
    TimeBounded { ttl: Duration },
    /// Entries live until an invalidation event removes them.
    TagOnly,
}

impl Expiry {
    pub fn ttl(&self) -> Option<Duration> {
        match self {
            Expiry::TimeBounded { ttl } => Some(*ttl),
            Expiry::TagOnly => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// When false every lookup computes its value directly.
    pub enabled: bool,
    pub expiry: Expiry,
    /// How often expired entries are purged and pending events consumed.
    pub sweep_interval: Duration,
    /// Collapse concurrent misses on one key into a single computation.
    pub dedupe_inflight: bool,
    /// Maximum invalidation events applied per consumption batch.
    pub consume_batch_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            expiry: Expiry::TimeBounded { ttl: DEFAULT_TTL },
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            dedupe_inflight: true,
            consume_batch_limit: DEFAULT_CONSUME_BATCH_LIMIT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            expiry: settings.expiry,
            sweep_interval: settings.sweep_interval,
            dedupe_inflight: settings.dedupe_inflight,
            consume_batch_limit: settings.consume_batch_limit.get(),
        }
    }
}

impl CacheConfig {
    /// Tag-only caching as used behind a content-update webhook.
    pub fn tag_only() -> Self {
        Self {
            expiry: Expiry::TagOnly,
            ..Self::default()
        }
    }

    pub fn time_bounded(ttl: Duration) -> Self {
        Self {
            expiry: Expiry::TimeBounded { ttl },
            ..Self::default()
        }
    }

    /// The sweeper only has work to do when entries can expire.
    pub fn needs_sweeper(&self) -> bool {
        self.enabled && self.expiry.ttl().is_some() && !self.sweep_interval.is_zero()
    }
}
