//! Response cache - TTL and size bounded, keyed by a hash of the logical
//! request.
//!
//! Expiry is lazy: a stale entry is removed by the `get` or `put` that
//! notices it. There is no background sweeper.
//!
//! # Example
//!
//! ```
//! use dst_ai_gateway::cache::ResponseCache;
//! use std::time::Duration;
//!
//! let cache = ResponseCache::new(Duration::from_secs(60), 2);
//! cache.put("k".to_string(), "answer".to_string());
//! assert_eq!(cache.get("k").as_deref(), Some("answer"));
//! ```

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::AiConfig;
use crate::log_component;
use crate::providers::ResolvedOptions;
use crate::session::ChatMessage;

#[derive(Debug, Clone)]
struct CacheEntry {
    inserted_at: Instant,
    /// Insertion order, breaks ties between equal instants
    seq: u64,
    value: String,
}

#[derive(Debug, Default)]
struct Entries {
    map: HashMap<String, CacheEntry>,
    next_seq: u64,
}

/// In-memory response cache shared by every gateway handle.
///
/// Construct once and pass the `Arc` to each consumer.
pub struct ResponseCache {
    entries: Mutex<Entries>,
    /// Zero disables the cache
    ttl: Duration,
    /// Zero means unbounded
    max_entries: usize,
}

impl ResponseCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            ttl,
            max_entries,
        }
    }

    /// Create a cache from `cache_ttl_seconds` / `cache_max_entries`.
    pub fn from_config(config: &AiConfig) -> Self {
        Self::new(
            Duration::from_secs(config.cache_ttl_seconds),
            config.cache_max_entries,
        )
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_fresh(&self, entry: &CacheEntry, now: Instant) -> bool {
        now.duration_since(entry.inserted_at) < self.ttl
    }

    /// Look up a fresh value. An expired entry is removed and reported as a
    /// miss.
    pub fn get(&self, key: &str) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }
        let now = Instant::now();
        let mut entries = self.lock();
        let entry = entries.map.get(key)?;
        if self.is_fresh(entry, now) {
            log_component!(debug, "cache", "Cache hit");
            return Some(entry.value.clone());
        }
        entries.map.remove(key);
        log_component!(debug, "cache", "Cache entry expired");
        None
    }

    /// Store a value, then drop expired entries and evict the oldest until
    /// the size bound holds. No-op when the cache is disabled.
    pub fn put(&self, key: String, value: String) {
        if !self.is_enabled() {
            return;
        }
        let now = Instant::now();
        let mut entries = self.lock();
        let seq = entries.next_seq;
        entries.next_seq += 1;
        entries.map.insert(
            key,
            CacheEntry {
                inserted_at: now,
                seq,
                value,
            },
        );
        self.prune(&mut entries.map, now);
    }

    fn prune(&self, map: &mut HashMap<String, CacheEntry>, now: Instant) {
        map.retain(|_, entry| self.is_fresh(entry, now));

        if self.max_entries == 0 || map.len() <= self.max_entries {
            return;
        }
        let excess = map.len() - self.max_entries;
        let mut by_age: Vec<(Instant, u64, String)> = map
            .iter()
            .map(|(k, e)| (e.inserted_at, e.seq, k.clone()))
            .collect();
        by_age.sort_unstable();
        for (_, _, key) in by_age.into_iter().take(excess) {
            map.remove(&key);
        }
        log_component!(debug, "cache", "Evicted oldest entries", evicted = excess);
    }

    /// Number of stored entries, expired ones included until the next access.
    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` is stored, fresh or not. Does not purge.
    pub fn contains_key(&self, key: &str) -> bool {
        self.lock().map.contains_key(key)
    }
}

/// Fields that identify one logical request, in a fixed serialization order.
#[derive(Serialize)]
struct CacheKeyInput<'a> {
    provider: &'a str,
    system_prompt: &'a str,
    messages: &'a [ChatMessage],
    model: &'a str,
    /// Raw bits, so NaN and the infinities stay distinct
    temperature_bits: u32,
    max_tokens: u32,
}

/// SHA-256 (hex) over the provider name, system prompt, messages and
/// effective model parameters.
///
/// The fields are JSON-encoded before hashing, so no two distinct requests
/// share a preimage.
pub fn cache_key(
    provider: &str,
    system_prompt: &str,
    messages: &[ChatMessage],
    options: &ResolvedOptions,
) -> String {
    let input = CacheKeyInput {
        provider,
        system_prompt,
        messages,
        model: &options.model,
        temperature_bits: options.temperature.to_bits(),
        max_tokens: options.max_tokens,
    };
    // Serializing plain strings and numbers cannot fail
    let encoded = serde_json::to_vec(&input).unwrap_or_default();
    hex::encode(Sha256::digest(&encoded))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> ResolvedOptions {
        ResolvedOptions {
            model: "gpt-4o-mini".into(),
            temperature: 0.7,
            max_tokens: 2000,
        }
    }

    #[test]
    fn test_put_then_get() {
        let cache = ResponseCache::new(Duration::from_secs(60), 10);
        cache.put("a".into(), "1".into());
        assert_eq!(cache.get("a"), Some("1".to_string()));
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn test_zero_ttl_disables() {
        let cache = ResponseCache::new(Duration::ZERO, 10);
        assert!(!cache.is_enabled());
        cache.put("a".into(), "1".into());
        assert!(cache.is_empty());
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn test_expired_entry_removed_on_get() {
        let cache = ResponseCache::new(Duration::from_millis(50), 10);
        cache.put("a".into(), "1".into());
        std::thread::sleep(Duration::from_millis(100));
        assert!(cache.contains_key("a"));
        assert_eq!(cache.get("a"), None);
        assert!(!cache.contains_key("a"));
    }

    #[test]
    fn test_put_prunes_expired() {
        let cache = ResponseCache::new(Duration::from_millis(50), 10);
        cache.put("old".into(), "1".into());
        std::thread::sleep(Duration::from_millis(100));
        cache.put("new".into(), "2".into());
        assert_eq!(cache.len(), 1);
        assert!(cache.contains_key("new"));
    }

    #[test]
    fn test_size_bound_evicts_oldest() {
        let cache = ResponseCache::new(Duration::from_secs(60), 2);
        cache.put("k1".into(), "1".into());
        cache.put("k2".into(), "2".into());
        cache.put("k3".into(), "3".into());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("k1"), None);
        assert_eq!(cache.get("k2").as_deref(), Some("2"));
        assert_eq!(cache.get("k3").as_deref(), Some("3"));
    }

    #[test]
    fn test_bound_holds_after_every_put() {
        let cache = ResponseCache::new(Duration::from_secs(60), 3);
        for i in 0..50 {
            cache.put(format!("k{}", i), i.to_string());
            assert!(cache.len() <= 3);
        }
        assert_eq!(cache.get("k49").as_deref(), Some("49"));
    }

    #[test]
    fn test_zero_max_entries_is_unbounded() {
        let cache = ResponseCache::new(Duration::from_secs(60), 0);
        for i in 0..100 {
            cache.put(format!("k{}", i), "v".into());
        }
        assert_eq!(cache.len(), 100);
    }

    #[test]
    fn test_reinsert_replaces_value() {
        let cache = ResponseCache::new(Duration::from_secs(60), 2);
        cache.put("a".into(), "1".into());
        cache.put("a".into(), "2".into());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a").as_deref(), Some("2"));
    }

    #[test]
    fn test_cache_key_deterministic() {
        let messages = vec![ChatMessage::user("hello")];
        let a = cache_key("mock", "sys", &messages, &opts());
        let b = cache_key("mock", "sys", &messages, &opts());
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_cache_key_changes_with_every_field() {
        let messages = vec![ChatMessage::user("hello")];
        let base = cache_key("mock", "sys", &messages, &opts());

        assert_ne!(base, cache_key("local", "sys", &messages, &opts()));
        assert_ne!(base, cache_key("mock", "sys2", &messages, &opts()));
        assert_ne!(
            base,
            cache_key("mock", "sys", &[ChatMessage::user("hello!")], &opts())
        );
        assert_ne!(
            base,
            cache_key("mock", "sys", &[ChatMessage::assistant("hello")], &opts())
        );

        let mut o = opts();
        o.model = "llama3".into();
        assert_ne!(base, cache_key("mock", "sys", &messages, &o));
        let mut o = opts();
        o.temperature = 0.8;
        assert_ne!(base, cache_key("mock", "sys", &messages, &o));
        let mut o = opts();
        o.max_tokens = 1999;
        assert_ne!(base, cache_key("mock", "sys", &messages, &o));
    }

    #[test]
    fn test_cache_key_non_finite_temperatures_differ() {
        let messages = vec![ChatMessage::user("hello")];
        let key = |temperature: f32| {
            let mut o = opts();
            o.temperature = temperature;
            cache_key("mock", "", &messages, &o)
        };
        let nan = key(f32::NAN);
        let inf = key(f32::INFINITY);
        let neg_inf = key(f32::NEG_INFINITY);
        assert_ne!(nan, inf);
        assert_ne!(nan, neg_inf);
        assert_ne!(inf, neg_inf);
        assert_ne!(inf, key(0.7));
    }

    #[test]
    fn test_cache_key_field_boundaries() {
        // Moving text between the system prompt and a message must not collide
        let a = cache_key("mock", "ab", &[ChatMessage::user("c")], &opts());
        let b = cache_key("mock", "a", &[ChatMessage::user("bc")], &opts());
        assert_ne!(a, b);
    }
}
