// ── Context Engine: TTL/LRU Cache ──────────────────────────────────────────
//
// Keyed store of context snapshots with per-entry TTL and strict LRU eviction.
//
// Key properties:
//   - set() bumps recency; inserting a NEW key at capacity evicts the
//     least-recently-used entry first
//   - get() on a live entry bumps recency + access count; on an expired entry
//     it deletes it and fires `context_expired`
//   - has() checks expiry without touching recency
//   - A tokio interval task sweeps expired entries and fires ONE batch event
//   - No operation fails; bad configuration is clamped
//
// Recency is a monotonic tick per entry mirrored in a BTreeMap, so the LRU
// victim is always the first key of that map.
//
// Events are collected while the state lock is held and emitted after it is
// released, so listeners may call back into the cache.

use crate::atoms::config::CacheConfig;
use crate::atoms::constants::{CACHE_ENTRY_OVERHEAD_BYTES, SOURCE_CACHE};
use crate::atoms::types::{Context, ContextEvent, ContextEventType};
use crate::engine::events::EventBus;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

/// The cache the manager uses for assembled contexts.
pub type ContextCache = TtlCache<Context>;

/// One cached value plus its bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry<V> {
    pub key: String,
    pub payload: V,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
    pub access_count: u64,
    pub last_accessed_at: DateTime<Utc>,
    #[serde(skip)]
    recency: u64,
}

impl<V> CacheEntry<V> {
    /// TTL=0 means the entry is expired the moment it is written.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age_ms = (now - self.created_at).num_milliseconds();
        // a TTL past the i64 millisecond range never expires
        match i64::try_from(self.ttl_secs)
            .ok()
            .and_then(|secs| secs.checked_mul(1000))
        {
            Some(ttl_ms) => age_ms >= ttl_ms,
            None => false,
        }
    }
}

/// Snapshot of cache health.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    /// hits / (hits + misses); 0.0 before the first lookup.
    pub hit_rate: f32,
    /// Cumulative number of get() calls.
    pub total_accesses: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Entries past their TTL that no get() or sweep has removed yet.
    pub expired_count: usize,
    pub estimated_memory_bytes: usize,
    pub compression_enabled: bool,
}

struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// recency tick → key; first entry is the LRU victim.
    recency: BTreeMap<u64, String>,
    tick: u64,
    hits: u64,
    misses: u64,
    total_accesses: u64,
    evictions: u64,
}

impl<V> CacheState<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            tick: 0,
            hits: 0,
            misses: 0,
            total_accesses: 0,
            evictions: 0,
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn touch(&mut self, key: &str) {
        let tick = self.next_tick();
        if let Some(entry) = self.entries.get_mut(key) {
            self.recency.remove(&entry.recency);
            entry.recency = tick;
            self.recency.insert(tick, key.to_string());
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.recency);
        Some(entry)
    }

    fn pop_lru(&mut self) -> Option<CacheEntry<V>> {
        let (_, key) = self.recency.pop_first()?;
        self.entries.remove(&key)
    }

    fn expired_keys(&self, now: DateTime<Utc>) -> Vec<String> {
        self.entries
            .values()
            .filter(|e| e.is_expired(now))
            .map(|e| e.key.clone())
            .collect()
    }
}

/// Generic TTL + strict-LRU cache. Clone is cheap and shares state.
pub struct TtlCache<V> {
    state: Arc<Mutex<CacheState<V>>>,
    max_size: usize,
    default_ttl_secs: u64,
    cleanup_interval: Duration,
    compression_enabled: bool,
    bus: EventBus,
    sweeper: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl<V> Clone for TtlCache<V> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            max_size: self.max_size,
            default_ttl_secs: self.default_ttl_secs,
            cleanup_interval: self.cleanup_interval,
            compression_enabled: self.compression_enabled,
            bus: self.bus.clone(),
            sweeper: Arc::clone(&self.sweeper),
        }
    }
}

impl<V> TtlCache<V>
where
    V: Clone + Serialize + Send + 'static,
{
    /// Build from configuration, clamping anything out of range.
    pub fn new(config: &CacheConfig, bus: EventBus) -> Self {
        if config.max_size < 1 || config.default_ttl_secs < 0 || config.cleanup_interval_secs < 1
        {
            warn!(
                "[cache] Clamping config (max_size={}, ttl={}, interval={})",
                config.max_size, config.default_ttl_secs, config.cleanup_interval_secs
            );
        }
        Self {
            state: Arc::new(Mutex::new(CacheState::new())),
            max_size: config.max_size.max(1) as usize,
            default_ttl_secs: config.default_ttl_secs.max(0) as u64,
            cleanup_interval: Duration::from_secs(config.cleanup_interval_secs.max(1) as u64),
            compression_enabled: config.compression_enabled,
            bus,
            sweeper: Arc::new(Mutex::new(None)),
        }
    }

    /// Standalone cache with its own bus.
    pub fn with_capacity(max_size: usize, default_ttl_secs: u64) -> Self {
        let config = CacheConfig {
            max_size: i64::try_from(max_size).unwrap_or(i64::MAX),
            default_ttl_secs: i64::try_from(default_ttl_secs).unwrap_or(i64::MAX),
            ..CacheConfig::default()
        };
        Self::new(&config, EventBus::new())
    }

    /// Store a value. `ttl_secs = None` uses the configured default.
    pub fn set(&self, key: &str, value: V, ttl_secs: Option<u64>) {
        let ttl = ttl_secs.unwrap_or(self.default_ttl_secs);
        let now = Utc::now();
        let mut events = Vec::new();
        {
            let mut state = self.state.lock();

            if !state.entries.contains_key(key) && state.entries.len() >= self.max_size {
                if let Some(victim) = state.pop_lru() {
                    state.evictions += 1;
                    debug!("[cache] LRU evicted '{}'", victim.key);
                    events.push(ContextEvent::new(
                        ContextEventType::ContextUpdated,
                        SOURCE_CACHE,
                        json!({ "action": "evicted", "key": victim.key }),
                    ));
                }
            }

            let tick = state.next_tick();
            let previous = state.entries.insert(
                key.to_string(),
                CacheEntry {
                    key: key.to_string(),
                    payload: value,
                    created_at: now,
                    ttl_secs: ttl,
                    access_count: 0,
                    last_accessed_at: now,
                    recency: tick,
                },
            );
            if let Some(prev) = previous {
                state.recency.remove(&prev.recency);
                if let Some(entry) = state.entries.get_mut(key) {
                    entry.access_count = prev.access_count;
                }
            }
            state.recency.insert(tick, key.to_string());
        }
        events.push(ContextEvent::new(
            ContextEventType::ContextCached,
            SOURCE_CACHE,
            json!({ "key": key, "ttl_secs": ttl }),
        ));
        self.dispatch(events);
    }

    /// Fetch a live value, updating recency and access count.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Utc::now();
        let (result, event) = {
            let mut state = self.state.lock();
            state.total_accesses += 1;

            let expired = match state.entries.get(key) {
                None => {
                    state.misses += 1;
                    return None;
                }
                Some(entry) => entry.is_expired(now),
            };

            if expired {
                state.remove(key);
                state.misses += 1;
                debug!("[cache] '{}' expired on read", key);
                (
                    None,
                    ContextEvent::new(
                        ContextEventType::ContextExpired,
                        SOURCE_CACHE,
                        json!({ "key": key, "reason": "lazy" }),
                    ),
                )
            } else {
                state.hits += 1;
                state.touch(key);
                match state.entries.get_mut(key) {
                    Some(entry) => {
                        entry.access_count += 1;
                        entry.last_accessed_at = now;
                        let count = entry.access_count;
                        (
                            Some(entry.payload.clone()),
                            ContextEvent::new(
                                ContextEventType::ContextRetrieved,
                                SOURCE_CACHE,
                                json!({ "key": key, "access_count": count }),
                            ),
                        )
                    }
                    None => return None,
                }
            }
        };
        self.bus.emit(event);
        result
    }

    /// Presence check with the same expiry rule as get(), without touching recency.
    pub fn has(&self, key: &str) -> bool {
        let now = Utc::now();
        self.state
            .lock()
            .entries
            .get(key)
            .map(|e| !e.is_expired(now))
            .unwrap_or(false)
    }

    /// Remove one entry. Returns whether it existed.
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.state.lock().remove(key).is_some();
        if removed {
            self.bus.publish(
                ContextEventType::ContextUpdated,
                SOURCE_CACHE,
                json!({ "action": "deleted", "key": key }),
            );
        }
        removed
    }

    /// Remove every entry. Counters are kept.
    pub fn clear(&self) {
        let count = {
            let mut state = self.state.lock();
            let count = state.entries.len();
            state.entries.clear();
            state.recency.clear();
            count
        };
        info!("[cache] Cleared {} entries", count);
        self.bus.publish(
            ContextEventType::ContextUpdated,
            SOURCE_CACHE,
            json!({ "action": "cleared", "count": count }),
        );
    }

    /// Remove all expired entries now. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        sweep_state(&self.state, &self.bus)
    }

    /// Spawn the periodic sweep on the current tokio runtime.
    /// Returns false when no runtime is available or a sweeper is already running.
    pub fn start_sweeper(&self) -> bool {
        let mut slot = self.sweeper.lock();
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(h) => h,
            Err(_) => {
                warn!("[cache] No tokio runtime, periodic sweep disabled");
                return false;
            }
        };

        let weak: Weak<Mutex<CacheState<V>>> = Arc::downgrade(&self.state);
        let bus = self.bus.clone();
        let period = self.cleanup_interval;
        *slot = Some(handle.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let Some(state) = weak.upgrade() else {
                    break;
                };
                sweep_state(&state, &bus);
            }
        }));
        info!("[cache] Sweeper started (every {:?})", period);
        true
    }

    /// Abort the periodic sweep if running.
    pub fn stop_sweeper(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
            info!("[cache] Sweeper stopped");
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Keys from least to most recently used.
    pub fn keys(&self) -> Vec<String> {
        self.state.lock().recency.values().cloned().collect()
    }

    /// Access metadata for a key without touching recency.
    pub fn entry_info(&self, key: &str) -> Option<(u64, DateTime<Utc>)> {
        self.state
            .lock()
            .entries
            .get(key)
            .map(|e| (e.access_count, e.last_accessed_at))
    }

    pub fn stats(&self) -> CacheStats {
        let now = Utc::now();
        let state = self.state.lock();
        let lookups = state.hits + state.misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            state.hits as f32 / lookups as f32
        };
        let estimated_memory_bytes = state
            .entries
            .values()
            .map(|e| {
                let payload = serde_json::to_vec(&e.payload).map(|b| b.len()).unwrap_or(0);
                e.key.len() + payload + CACHE_ENTRY_OVERHEAD_BYTES
            })
            .sum();

        CacheStats {
            size: state.entries.len(),
            max_size: self.max_size,
            hit_rate,
            total_accesses: state.total_accesses,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            expired_count: state.expired_keys(now).len(),
            estimated_memory_bytes,
            compression_enabled: self.compression_enabled,
        }
    }

    fn dispatch(&self, events: Vec<ContextEvent>) {
        for event in events {
            self.bus.emit(event);
        }
    }
}

fn sweep_state<V>(state: &Mutex<CacheState<V>>, bus: &EventBus) -> usize {
    let now = Utc::now();
    let removed: Vec<String> = {
        let mut state = state.lock();
        let keys = state.expired_keys(now);
        for key in &keys {
            state.remove(key);
        }
        keys
    };
    if !removed.is_empty() {
        debug!("[cache] Sweep removed {} expired entries", removed.len());
        bus.publish(
            ContextEventType::ContextExpired,
            SOURCE_CACHE,
            json!({ "keys": removed, "count": removed.len(), "reason": "sweep" }),
        );
    }
    removed.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_cache(max: usize) -> TtlCache<String> {
        TtlCache::with_capacity(max, 300)
    }

    #[test]
    fn test_lru_evicts_least_recently_touched() {
        let cache = make_cache(3);
        cache.set("A", "a".into(), None);
        cache.set("B", "b".into(), None);
        cache.set("C", "c".into(), None);
        assert_eq!(cache.get("A").as_deref(), Some("a"));
        cache.set("D", "d".into(), None);

        assert!(!cache.has("B"));
        assert!(cache.has("A"));
        assert!(cache.has("C"));
        assert!(cache.has("D"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_overflow_without_reads_evicts_oldest() {
        let cache = make_cache(2);
        cache.set("x", "1".into(), None);
        cache.set("y", "2".into(), None);
        cache.set("z", "3".into(), None);
        assert_eq!(cache.keys(), vec!["y".to_string(), "z".to_string()]);
    }

    #[test]
    fn test_has_does_not_refresh_recency() {
        let cache = make_cache(2);
        cache.set("a", "1".into(), None);
        cache.set("b", "2".into(), None);
        assert!(cache.has("a"));
        cache.set("c", "3".into(), None);
        assert!(!cache.has("a"));
        assert!(cache.has("b"));
    }

    #[test]
    fn test_overwrite_existing_key_does_not_evict() {
        let cache = make_cache(2);
        cache.set("a", "1".into(), None);
        cache.set("b", "2".into(), None);
        cache.set("a", "updated".into(), None);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").as_deref(), Some("updated"));
        // "b" is now the LRU entry
        cache.set("c", "3".into(), None);
        assert!(!cache.has("b"));
    }

    #[test]
    fn test_zero_ttl_is_immediately_expired() {
        let cache = make_cache(5);
        let expired = Arc::new(AtomicUsize::new(0));
        let e = Arc::clone(&expired);
        cache
            .bus
            .subscribe(ContextEventType::ContextExpired, move |_| {
                e.fetch_add(1, Ordering::Relaxed);
            });

        cache.set("gone", "x".into(), Some(0));
        assert!(!cache.has("gone"));
        assert_eq!(cache.get("gone"), None);
        assert!(!cache.has("gone"));
        assert_eq!(cache.len(), 0);
        assert_eq!(expired.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_huge_ttl_never_expires() {
        let cache = make_cache(5);
        cache.set("forever", "x".into(), Some(u64::MAX));
        cache.set("long", "y".into(), Some(i64::MAX as u64 / 1000 + 1));
        assert!(cache.has("forever"));
        assert_eq!(cache.get("forever"), Some("x".to_string()));
        assert_eq!(cache.get("long"), Some("y".to_string()));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_sweep_fires_single_batch_event() {
        let cache = make_cache(10);
        let batches = Arc::new(AtomicUsize::new(0));
        let b = Arc::clone(&batches);
        cache
            .bus
            .subscribe(ContextEventType::ContextExpired, move |e| {
                assert_eq!(e.payload["count"], 3);
                b.fetch_add(1, Ordering::Relaxed);
            });

        cache.set("a", "1".into(), Some(0));
        cache.set("b", "2".into(), Some(0));
        cache.set("c", "3".into(), Some(0));
        cache.set("live", "4".into(), None);
        assert_eq!(cache.stats().expired_count, 3);

        assert_eq!(cache.sweep_expired(), 3);
        assert_eq!(batches.load(Ordering::Relaxed), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.sweep_expired(), 0);
        assert_eq!(batches.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_stats_hit_rate_and_accesses() {
        let cache = make_cache(5);
        cache.set("k", "v".into(), None);
        cache.get("k");
        cache.get("k");
        cache.get("missing");
        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_accesses, 3);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-6);
        assert!(stats.estimated_memory_bytes > CACHE_ENTRY_OVERHEAD_BYTES);
        assert_eq!(cache.entry_info("k").map(|(n, _)| n), Some(2));
    }

    #[test]
    fn test_delete_and_clear() {
        let cache = make_cache(5);
        cache.set("a", "1".into(), None);
        cache.set("b", "2".into(), None);
        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.keys().is_empty());
    }

    #[test]
    fn test_invalid_config_is_clamped() {
        let config = CacheConfig {
            max_size: -3,
            default_ttl_secs: -10,
            cleanup_interval_secs: 0,
            compression_enabled: true,
        };
        let cache: TtlCache<String> = TtlCache::new(&config, EventBus::new());
        assert_eq!(cache.max_size(), 1);
        cache.set("a", "1".into(), None);
        // default ttl clamped to 0 → immediately expired
        assert!(!cache.has("a"));
        assert!(cache.stats().compression_enabled);
    }

    #[tokio::test]
    async fn test_sweeper_task_removes_expired() {
        let cache = make_cache(5);
        cache.set("a", "1".into(), Some(0));
        cache.set("b", "2".into(), None);

        assert!(cache.start_sweeper());
        assert!(!cache.start_sweeper());
        // interval() ticks immediately on first poll
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if cache.len() == 1 {
                break;
            }
        }
        assert_eq!(cache.len(), 1);
        cache.stop_sweeper();
    }

    #[test]
    fn test_sweeper_requires_runtime() {
        let cache = make_cache(5);
        assert!(!cache.start_sweeper());
    }
}
