//! Folio cache system.
//!
//! A keyed, tag-annotated read-through cache for CMS data:
//!
//! - **Store**: type-erased entries with optional time-based expiry
//! - **Registry**: tag ↔ key mappings for bulk invalidation
//! - **Events**: invalidations are published, planned and consumed in batches
//! - **Flights**: concurrent misses on one key share a single computation
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! expiry = "time_bounded"   # or "tag_only"
//! ttl_seconds = 300
//! sweep_interval_seconds = 60
//! dedupe_inflight = true
//! ```

mod config;
mod consumer;
mod events;
mod flight;
mod keys;
pub(crate) mod lock;
mod planner;
mod registry;
mod service;
mod store;
mod trigger;

pub use config::{CacheConfig, Expiry};
pub use consumer::{CacheConsumer, ConsumeOutcome};
pub use events::{CacheEvent, Epoch, EventKind, EventQueue};
pub use keys::{CacheKey, TAG_CMS_DATA, Tag};
pub use planner::InvalidationPlan;
pub use registry::TagRegistry;
pub use service::{CacheService, CacheStats};
pub use store::EntryStore;
