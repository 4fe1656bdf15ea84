//! Telemetry metric name constants.
//!
//! Centralised metric names for the bot. Consumers install their own
//! `metrics` recorder (e.g. prometheus, statsd); without a recorder
//! installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `gowon_markov_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `status`: load outcome: "ok" or "error"
//! - `reason`: eviction cause: "size" or "ttl"
//! - `outcome`: message outcome: "replied", "dropped" or "parse_error"

/// Total cache lookups answered from a loaded entry.
pub const CACHE_HITS_TOTAL: &str = "gowon_markov_cache_hits_total";

/// Total cache lookups that had to load or wait for a load.
pub const CACHE_MISSES_TOTAL: &str = "gowon_markov_cache_misses_total";

/// Total model loads performed against disk.
///
/// Labels: `status` ("ok" | "error").
pub const MODEL_LOADS_TOTAL: &str = "gowon_markov_model_loads_total";

/// Total models dropped from the cache.
///
/// Labels: `reason` ("size" | "ttl").
pub const CACHE_EVICTIONS_TOTAL: &str = "gowon_markov_cache_evictions_total";

/// Total inbound messages handled.
///
/// Labels: `outcome` ("replied" | "dropped" | "parse_error").
pub const MESSAGES_TOTAL: &str = "gowon_markov_messages_total";

/// Total broker connect attempts, including the first.
pub const CONNECT_ATTEMPTS_TOTAL: &str = "gowon_markov_connect_attempts_total";

/// Total reconnects after a mid-session transport failure.
pub const RECONNECTS_TOTAL: &str = "gowon_markov_reconnects_total";
