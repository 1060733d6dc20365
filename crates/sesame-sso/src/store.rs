//! TTL key/value store for outstanding CSRF states
//!
//! `StateStore` is the capability the client needs: set, get, has, delete and
//! an atomic `take`. `MemoryStore` is the bundled in-process implementation:
//! a mutex-guarded map with lazy expiry on every access, a capacity bound
//! enforced at insertion, and a background sweep (see `sweep`).
//!
//! Alternative backends (e.g. a networked cache) implement the same trait.
//! Their obligations:
//! - an entry is present only while `now < expires_at` and not deleted
//! - `take` must be a single atomic check-and-delete (e.g. `GETDEL` or a
//!   conditional remove); two concurrent callers with the same key must not
//!   both observe the value
//! - connectivity and serialization failures are returned as `StoreError`,
//!   never reported as "absent"

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::constants::{DEFAULT_CLEANUP_INTERVAL, DEFAULT_MAX_ENTRIES, DEFAULT_STATE_TTL};

/// Errors a pluggable store backend may surface.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend unavailable: {0}")]
    Backend(String),

    #[error("store serialization failed: {0}")]
    Serialization(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Boxed future returned by store operations (keeps the trait dyn-compatible).
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// Payload stored with each outstanding state.
///
/// `created_at` is a unix timestamp in milliseconds. `extra` carries whatever
/// the caller wants to associate with the challenge (return path, nonce, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateData {
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl StateData {
    /// Payload stamped with the current wall-clock time.
    pub fn new() -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            created_at,
            extra: serde_json::Map::new(),
        }
    }

    /// Attach an associated value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

impl Default for StateData {
    fn default() -> Self {
        Self::new()
    }
}

/// Keyed storage with expiry for CSRF states.
///
/// `expires_at = None` means "now + the store's configured TTL". Remote
/// implementations convert the instant to a relative TTL with
/// `expires_at.saturating_duration_since(Instant::now())`.
pub trait StateStore: Send + Sync {
    /// Insert or overwrite the entry for `key`.
    fn set<'a>(
        &'a self,
        key: &'a str,
        value: StateData,
        expires_at: Option<Instant>,
    ) -> StoreFuture<'a, ()>;

    /// Stored value, or `None` if absent or expired.
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<StateData>>;

    /// Whether `get` would return a value.
    fn has<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool>;

    /// Remove the entry; absent keys are not an error.
    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;

    /// Atomically remove and return a live entry.
    fn take<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<StateData>>;

    /// Halt any background activity. Must be idempotent. Other operations
    /// keep working afterwards.
    fn stop(&self) {}
}

/// What to do when an insertion finds the store full after purging expired
/// entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Accept the entry anyway; the bound is soft under sustained load.
    #[default]
    Lenient,
    /// Evict the oldest-inserted entries until the new one fits.
    Fifo,
}

/// Tuning for `MemoryStore`.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub ttl: Duration,
    pub max_entries: usize,
    pub cleanup_interval: Duration,
    pub eviction: EvictionPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_STATE_TTL,
            max_entries: DEFAULT_MAX_ENTRIES,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            eviction: EvictionPolicy::default(),
        }
    }
}

impl StoreConfig {
    /// Background sweep period: the shorter of cleanup interval and TTL.
    pub fn sweep_interval(&self) -> Duration {
        self.cleanup_interval
            .min(self.ttl)
            .max(Duration::from_millis(1))
    }
}

/// Horizon used when `now + ttl` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// `now + ttl`, saturating to a far-future instant instead of overflowing.
fn expiry_after(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

#[derive(Debug)]
struct Entry {
    value: StateData,
    expires_at: Instant,
    /// Insertion order, for FIFO eviction.
    seq: u64,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// The map behind `MemoryStore`, shared with the sweep task.
///
/// `order` indexes keys by insertion sequence so FIFO eviction pops the
/// oldest entry without scanning the map. Every removal goes through
/// `remove` to keep both in step.
#[derive(Debug, Default)]
pub(crate) struct Entries {
    map: HashMap<String, Entry>,
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl Entries {
    fn insert(&mut self, key: &str, value: StateData, expires_at: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let previous = self.map.insert(
            key.to_owned(),
            Entry {
                value,
                expires_at,
                seq,
            },
        );
        if let Some(previous) = previous {
            self.order.remove(&previous.seq);
        }
        self.order.insert(seq, key.to_owned());
    }

    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.map.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    /// Remove every expired entry; returns how many were removed.
    pub(crate) fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .map
            .iter()
            .filter(|(_, entry)| !entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    fn evict_oldest(&mut self) -> bool {
        match self.order.pop_first() {
            Some((_, key)) => self.map.remove(&key).is_some(),
            None => false,
        }
    }

    /// Live value for `key`; an expired entry is dropped on the way.
    fn live(&mut self, key: &str, now: Instant, consume: bool) -> Option<StateData> {
        let live = self.map.get(key)?.is_live(now);
        if !live {
            self.remove(key);
            crate::metrics::record_purged("lazy", 1);
            return None;
        }
        if consume {
            self.remove(key).map(|entry| entry.value)
        } else {
            self.map.get(key).map(|entry| entry.value.clone())
        }
    }
}

/// Lock the shared map, recovering from poisoning (no invariant spans a panic).
pub(crate) fn lock(entries: &Mutex<Entries>) -> MutexGuard<'_, Entries> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process `StateStore`.
///
/// Operations take a short synchronous lock and never suspend. Constructing
/// the store inside a tokio runtime starts the background sweep; outside a
/// runtime only lazy expiry applies.
pub struct MemoryStore {
    entries: Arc<Mutex<Entries>>,
    config: StoreConfig,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryStore {
    /// Create a store and start its background sweep.
    pub fn new(config: StoreConfig) -> Self {
        let entries = Arc::new(Mutex::new(Entries::default()));
        let interval = config.sweep_interval();
        let sweeper = crate::sweep::spawn_sweep_task(Arc::downgrade(&entries), interval);
        info!(
            ttl_secs = config.ttl.as_secs(),
            max_entries = config.max_entries,
            sweep_interval_ms = interval.as_millis() as u64,
            background_sweep = sweeper.is_some(),
            "state store initialized"
        );
        Self {
            entries,
            config,
            sweeper: Mutex::new(sweeper),
        }
    }

    /// The configuration this store was built with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Number of entries held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Whether the store holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all expired entries now; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let removed = lock(&self.entries).purge_expired(Instant::now());
        crate::metrics::record_purged("sweep", removed);
        removed
    }

    /// Whether the background sweep is still scheduled.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn insert(&self, key: &str, value: StateData, expires_at: Option<Instant>) {
        let now = Instant::now();
        let expires_at = expires_at.unwrap_or_else(|| expiry_after(now, self.config.ttl));
        let mut entries = lock(&self.entries);

        if !entries.map.contains_key(key) && entries.len() >= self.config.max_entries {
            let purged = entries.purge_expired(now);
            crate::metrics::record_purged("capacity", purged);

            if self.config.eviction == EvictionPolicy::Fifo {
                let mut evicted = 0;
                while entries.len() >= self.config.max_entries && entries.evict_oldest() {
                    evicted += 1;
                }
                crate::metrics::record_purged("capacity", evicted);
                debug!(purged, evicted, "state store full, evicted oldest entries");
            } else if entries.len() >= self.config.max_entries {
                debug!(
                    purged,
                    len = entries.len(),
                    max_entries = self.config.max_entries,
                    "state store still full after purge, accepting entry"
                );
            }
        }

        entries.insert(key, value, expires_at);
    }

    fn lookup(&self, key: &str, consume: bool) -> Option<StateData> {
        lock(&self.entries).live(key, Instant::now(), consume)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("len", &self.len())
            .field("config", &self.config)
            .finish()
    }
}

impl StateStore for MemoryStore {
    fn set<'a>(
        &'a self,
        key: &'a str,
        value: StateData,
        expires_at: Option<Instant>,
    ) -> StoreFuture<'a, ()> {
        self.insert(key, value, expires_at);
        Box::pin(std::future::ready(Ok(())))
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<StateData>> {
        Box::pin(std::future::ready(Ok(self.lookup(key, false))))
    }

    fn has<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(std::future::ready(Ok(self.lookup(key, false).is_some())))
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        lock(&self.entries).remove(key);
        Box::pin(std::future::ready(Ok(())))
    }

    fn take<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<StateData>> {
        Box::pin(std::future::ready(Ok(self.lookup(key, true))))
    }

    fn stop(&self) {
        let handle = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            debug!("state store background sweep stopped");
        }
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        self.stop();
    }
}
