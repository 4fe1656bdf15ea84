//! Model cache with single-flight loading and time-bounded retention.
//!
//! [`ModelCache`] maps command names to loaded models. Each command is
//! bound once at startup to a file path; the first lookup loads that
//! file through the configured [`ModelLoader`] and later lookups share
//! the same `Arc` until the entry is evicted.
//!
//! # Bounds
//!
//! - **Size**: at most [`CacheConfig::max_entries`] loaded models. Storing
//!   one more evicts the oldest insertion synchronously.
//! - **Age**: an entry older than [`CacheConfig::ttl`] is a miss on
//!   lookup, and the [`sweep`] task drops such entries on a fixed period
//!   so that idle models do not stay resident.
//!
//! A bound of zero is valid and caches nothing: every lookup loads.
//!
//! # Concurrency
//!
//! The slot map sits behind a short-lived mutex. Loads run outside the
//! lock on the blocking pool. Before a load starts, the caller reserves
//! the key with a slot holding an empty [`OnceCell`]; concurrent lookups
//! for that key find the reservation and wait on the same cell, so a key
//! has at most one load in flight and every waiter gets the same model.
//!
//! The cell stores the outcome, not just the model. A failed load removes
//! its reservation before the error lands in the cell, so every waiter on
//! that cell sees the same error and the next lookup starts a fresh load.

pub mod sweep;

pub use sweep::{SweepHandle, spawn_sweeper};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::model::ModelLoader;
use crate::telemetry;
use crate::{MarkovError, Result};

/// Configuration for the model cache.
///
/// ```rust
/// # use gowon_markov::cache::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(4)
///     .ttl(Duration::from_secs(300));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of loaded models. Default: 1.
    pub max_entries: usize,
    /// Age after which a loaded model is discarded. Default: 60s.
    pub ttl: Duration,
    /// Period of the background expiry sweep. Default: 60s.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1,
            ttl: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    /// Create a new config with the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of loaded models.
    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the time-to-live of a loaded model.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the period of the background sweep.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}

/// Result of one load, shared by everyone waiting on it.
type Outcome<M> = std::result::Result<Arc<M>, Arc<MarkovError>>;

/// A key is either loading (`loaded` is `None`) or holds a model.
struct Slot<M> {
    cell: Arc<OnceCell<Outcome<M>>>,
    loaded: Option<Loaded>,
}

#[derive(Clone, Copy)]
struct Loaded {
    at: Instant,
    seq: u64,
}

struct Slots<M> {
    entries: HashMap<String, Slot<M>>,
    next_seq: u64,
}

enum Lookup<M> {
    Hit(Arc<M>),
    Pending(Arc<OnceCell<Outcome<M>>>),
}

/// Bounded, expiring cache of loaded models keyed by command name.
pub struct ModelCache<L: ModelLoader> {
    loader: Arc<L>,
    bindings: HashMap<String, PathBuf>,
    slots: Mutex<Slots<L::Model>>,
    config: CacheConfig,
}

impl<L: ModelLoader> ModelCache<L> {
    /// Create an empty cache with no bindings.
    pub fn new(loader: L, config: CacheConfig) -> Self {
        Self {
            loader: Arc::new(loader),
            bindings: HashMap::new(),
            slots: Mutex::new(Slots {
                entries: HashMap::new(),
                next_seq: 0,
            }),
            config,
        }
    }

    /// Bind a command to the file its model is loaded from.
    ///
    /// Startup only; a command may be bound once.
    pub fn add_binding(&mut self, command: impl Into<String>, path: impl Into<PathBuf>) -> Result<()> {
        let command = command.into();
        if self.bindings.contains_key(&command) {
            return Err(MarkovError::Configuration(format!(
                "duplicate binding for command '{command}'"
            )));
        }
        self.bindings.insert(command, path.into());
        Ok(())
    }

    /// The file bound to `command`, if any.
    pub fn binding(&self, command: &str) -> Option<&Path> {
        self.bindings.get(command).map(PathBuf::as_path)
    }

    /// Whether `command` has a binding.
    pub fn has_binding(&self, command: &str) -> bool {
        self.bindings.contains_key(command)
    }

    /// All bound commands, in no particular order.
    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    /// The loader models are built with.
    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// The cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get the model for `command`, loading it on a miss.
    ///
    /// Returns `Ok(None)` without loading when `command` is unbound. A
    /// load failure is returned to the caller and to every lookup that was
    /// waiting on the same load. It leaves no entry behind, so the next
    /// lookup tries again.
    pub async fn get(&self, command: &str) -> Result<Option<Arc<L::Model>>> {
        let Some(path) = self.bindings.get(command) else {
            return Ok(None);
        };

        let cell = match self.lookup(command)? {
            Lookup::Hit(model) => {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
                return Ok(Some(model));
            }
            Lookup::Pending(cell) => cell,
        };
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);

        let loaded_here = AtomicBool::new(false);
        let outcome = cell
            .get_or_init(|| async {
                loaded_here.store(true, Ordering::Relaxed);
                match self.load(command, path.clone()).await {
                    Ok(model) => Ok(Arc::new(model)),
                    Err(e) => {
                        // Gone before any waiter sees the error.
                        self.abandon(command, &cell);
                        Err(Arc::new(e))
                    }
                }
            })
            .await;

        match outcome {
            Ok(model) => {
                if loaded_here.load(Ordering::Relaxed) {
                    self.commit(command, &cell);
                }
                Ok(Some(Arc::clone(model)))
            }
            Err(e) => Err(shared_error(path, e)),
        }
    }

    /// Drop every loaded entry older than the TTL.
    ///
    /// Returns how many entries were dropped. Reservations for loads in
    /// flight are never touched.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = Instant::now();
        let evicted: Vec<Slot<L::Model>> = {
            let mut slots = self.lock()?;
            let expired: Vec<String> = slots
                .entries
                .iter()
                .filter(|(_, slot)| slot.loaded.is_some_and(|l| self.is_expired(l, now)))
                .map(|(key, _)| key.clone())
                .collect();
            expired
                .iter()
                .filter_map(|key| slots.entries.remove(key))
                .collect()
        };

        // Models are released here, outside the lock, unless a caller
        // still holds its handle.
        let count = evicted.len();
        drop(evicted);
        if count > 0 {
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "reason" => "ttl")
                .increment(count as u64);
            info!(evicted = count, "expired models evicted");
        }
        Ok(count)
    }

    /// Number of loaded models currently held.
    ///
    /// Reports zero if the cache lock is poisoned.
    pub fn len(&self) -> usize {
        match self.lock() {
            Ok(slots) => ready_count(&slots.entries),
            Err(e) => {
                warn!(error = %e, "cache unavailable, reporting empty");
                0
            }
        }
    }

    /// Whether no models are loaded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `command` has a loaded, unexpired model.
    ///
    /// Reports `false` if the cache lock is poisoned.
    pub fn contains(&self, command: &str) -> bool {
        let now = Instant::now();
        match self.lock() {
            Ok(slots) => slots
                .entries
                .get(command)
                .and_then(|slot| slot.loaded)
                .is_some_and(|l| !self.is_expired(l, now)),
            Err(e) => {
                warn!(command, error = %e, "cache unavailable, reporting absent");
                false
            }
        }
    }

    /// Drop all loaded models. Loads in flight are unaffected.
    pub fn clear(&self) -> Result<()> {
        let mut slots = self.lock()?;
        slots.entries.retain(|_, slot| slot.loaded.is_none());
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Slots<L::Model>>> {
        self.slots
            .lock()
            .map_err(|e| MarkovError::Cache(format!("Failed to acquire cache lock: {e}")))
    }

    fn is_expired(&self, loaded: Loaded, now: Instant) -> bool {
        now.saturating_duration_since(loaded.at) >= self.config.ttl
    }

    /// Return a fresh hit, or the reservation to load or wait on.
    fn lookup(&self, command: &str) -> Result<Lookup<L::Model>> {
        let now = Instant::now();
        let mut slots = self.lock()?;

        if let Some(slot) = slots.entries.get(command) {
            match (slot.loaded, slot.cell.get()) {
                (None, _) => {
                    debug!(command, "waiting on load in flight");
                    return Ok(Lookup::Pending(Arc::clone(&slot.cell)));
                }
                (Some(loaded), Some(Ok(model))) if !self.is_expired(loaded, now) => {
                    return Ok(Lookup::Hit(Arc::clone(model)));
                }
                _ => {}
            }
        }

        let cell = Arc::new(OnceCell::new());
        let stale = slots.entries.insert(
            command.to_owned(),
            Slot {
                cell: Arc::clone(&cell),
                loaded: None,
            },
        );
        drop(slots);

        if stale.is_some() {
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "reason" => "ttl").increment(1);
            debug!(command, "cached model expired");
        }
        Ok(Lookup::Pending(cell))
    }

    async fn load(&self, command: &str, path: PathBuf) -> Result<L::Model> {
        debug!(command, path = %path.display(), "loading model");
        let loader = Arc::clone(&self.loader);
        let task_path = path.clone();
        let result = tokio::task::spawn_blocking(move || loader.load(&task_path))
            .await
            .map_err(|e| MarkovError::Load {
                path,
                reason: format!("load task failed: {e}"),
            })
            .and_then(|r| r);

        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(telemetry::MODEL_LOADS_TOTAL, "status" => status).increment(1);
        result
    }

    /// Mark a finished load as present, then enforce the size bound.
    fn commit(&self, command: &str, cell: &Arc<OnceCell<Outcome<L::Model>>>) {
        let mut slots = match self.lock() {
            Ok(slots) => slots,
            Err(e) => {
                warn!(command, error = %e, "could not record loaded model");
                return;
            }
        };
        let seq = slots.next_seq;
        slots.next_seq += 1;
        let loaded = Loaded {
            at: Instant::now(),
            seq,
        };

        match slots.entries.get_mut(command) {
            Some(slot) if Arc::ptr_eq(&slot.cell, cell) => slot.loaded = Some(loaded),
            // The reservation was cleared while loading.
            _ => return,
        }

        let evicted = self.evict_overflow(&mut slots);
        drop(slots);

        if !evicted.is_empty() {
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "reason" => "size")
                .increment(evicted.len() as u64);
            debug!(command, evicted = evicted.len(), "cache full, evicted oldest");
        }
    }

    /// Remove the reservation of a failed load.
    ///
    /// Runs before the error is stored, so the cell is still empty here.
    fn abandon(&self, command: &str, cell: &Arc<OnceCell<Outcome<L::Model>>>) {
        let mut slots = match self.lock() {
            Ok(slots) => slots,
            Err(e) => {
                warn!(command, error = %e, "could not drop failed reservation");
                return;
            }
        };
        let owned = slots
            .entries
            .get(command)
            .is_some_and(|slot| Arc::ptr_eq(&slot.cell, cell));
        if owned {
            slots.entries.remove(command);
            warn!(command, "model load failed, nothing cached");
        }
    }

    fn evict_overflow(&self, slots: &mut Slots<L::Model>) -> Vec<Slot<L::Model>> {
        let mut evicted = Vec::new();
        while ready_count(&slots.entries) > self.config.max_entries {
            let oldest = slots
                .entries
                .iter()
                .filter_map(|(key, slot)| slot.loaded.map(|l| (l.seq, key)))
                .min_by_key(|(seq, _)| *seq)
                .map(|(_, key)| key.clone());
            let Some(key) = oldest else {
                break;
            };
            if let Some(slot) = slots.entries.remove(&key) {
                evicted.push(slot);
            }
        }
        evicted
    }
}

/// Rebuild a shared load error for one caller.
fn shared_error(path: &Path, e: &MarkovError) -> MarkovError {
    match e {
        MarkovError::Load { path, reason } => MarkovError::Load {
            path: path.clone(),
            reason: reason.clone(),
        },
        MarkovError::Cache(reason) => MarkovError::Cache(reason.clone()),
        other => MarkovError::Load {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    }
}

fn ready_count<M>(entries: &HashMap<String, Slot<M>>) -> usize {
    entries.values().filter(|slot| slot.loaded.is_some()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SentenceModel;

    struct Fixed;

    impl SentenceModel for Fixed {
        fn generate_sentence(&self, _max_attempts: usize) -> Option<String> {
            Some("fixed".into())
        }
    }

    struct FixedLoader;

    impl ModelLoader for FixedLoader {
        type Model = Fixed;

        fn load(&self, _path: &Path) -> Result<Fixed> {
            Ok(Fixed)
        }
    }

    #[test]
    fn cache_config_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.max_entries, 1);
        assert_eq!(config.ttl, Duration::from_secs(60));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
    }

    #[test]
    fn duplicate_binding_rejected() {
        let mut cache = ModelCache::new(FixedLoader, CacheConfig::default());
        cache.add_binding("m", "a.txt").unwrap();
        let err = cache.add_binding("m", "b.txt").unwrap_err();
        assert!(matches!(err, MarkovError::Configuration(_)));
        assert_eq!(cache.binding("m"), Some(Path::new("a.txt")));
    }

    #[test]
    fn poisoned_lock_is_reported() {
        let mut cache = ModelCache::new(FixedLoader, CacheConfig::default());
        cache.add_binding("m", "a.txt").unwrap();
        let cache = Arc::new(cache);

        let holder = Arc::clone(&cache);
        let _ = std::thread::spawn(move || {
            let _guard = holder.slots.lock().unwrap();
            panic!("poison the cache lock");
        })
        .join();

        assert!(matches!(cache.purge_expired(), Err(MarkovError::Cache(_))));
        assert!(matches!(cache.clear(), Err(MarkovError::Cache(_))));
        assert_eq!(cache.len(), 0);
        assert!(!cache.contains("m"));
    }

    #[tokio::test]
    async fn poisoned_lock_fails_get() {
        let mut cache = ModelCache::new(FixedLoader, CacheConfig::default());
        cache.add_binding("m", "a.txt").unwrap();
        let cache = Arc::new(cache);

        let holder = Arc::clone(&cache);
        let _ = std::thread::spawn(move || {
            let _guard = holder.slots.lock().unwrap();
            panic!("poison the cache lock");
        })
        .join();

        assert!(matches!(cache.get("m").await, Err(MarkovError::Cache(_))));
    }

    #[tokio::test]
    async fn insertion_order_decides_eviction() {
        let mut cache = ModelCache::new(FixedLoader, CacheConfig::new().max_entries(2));
        for key in ["a", "b", "c"] {
            cache.add_binding(key, format!("{key}.txt")).unwrap();
        }

        cache.get("a").await.unwrap();
        cache.get("b").await.unwrap();
        // A hit does not refresh insertion order.
        cache.get("a").await.unwrap();
        cache.get("c").await.unwrap();

        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
        assert!(cache.contains("c"));
    }
}
