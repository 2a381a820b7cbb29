//! Routing cache: bounded LRU over fingerprinted utterances with
//! source-dependent TTL (spec §4.3, C3).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::error::CacheError;
use crate::types::{CacheEntry, RouteSource, RoutingDecision};

pub const DEFAULT_CAPACITY: usize = 500;
pub const T_SHORT: Duration = Duration::from_secs(5 * 60);
pub const T_LONG: Duration = Duration::from_secs(30 * 60);

/// TTL to use for a given route source (spec §4.3 TTL policy).
fn ttl_for_source(source: RouteSource) -> Duration {
    match source {
        RouteSource::Rule | RouteSource::Registry => T_SHORT,
        RouteSource::Semantic | RouteSource::Llm => T_LONG,
        RouteSource::Cache => T_SHORT,
    }
}

/// Compute the cache key: `"route:" + hex(sha256(utterance)[0:8])`.
pub fn fingerprint_key(utterance: &str) -> String {
    let digest = Sha256::digest(utterance.as_bytes());
    format!("route:{}", hex_encode(&digest[..8]))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Point-in-time snapshot of cache counters (spec §4.3, `get_stats`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub size: usize,
    pub capacity: usize,
    pub uptime_sec: u64,
}

struct Node {
    key: String,
    entry: CacheEntry,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Intrusive doubly-linked-list LRU, O(1) amortized per operation, guarded
/// by a single mutex (spec §4.3, Concurrency).
struct Lru {
    capacity: usize,
    slots: Vec<Option<Node>>,
    index: HashMap<String, usize>,
    head: Option<usize>, // most recently used
    tail: Option<usize>, // least recently used
    free_list: Vec<usize>,
}

impl Lru {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
            free_list: Vec::new(),
        }
    }

    fn detach(&mut self, id: usize) {
        let (prev, next) = {
            let node = self.slots[id].as_ref().unwrap();
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.slots[p].as_mut().unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].as_mut().unwrap().prev = prev,
            None => self.tail = prev,
        }
    }

    fn push_front(&mut self, id: usize) {
        let old_head = self.head;
        {
            let node = self.slots[id].as_mut().unwrap();
            node.prev = None;
            node.next = old_head;
        }
        if let Some(h) = old_head {
            self.slots[h].as_mut().unwrap().prev = Some(id);
        }
        self.head = Some(id);
        if self.tail.is_none() {
            self.tail = Some(id);
        }
    }

    fn touch(&mut self, id: usize) {
        if self.head == Some(id) {
            return;
        }
        self.detach(id);
        self.push_front(id);
    }

    fn evict_tail(&mut self) -> Option<String> {
        let tail = self.tail?;
        self.detach(tail);
        let node = self.slots[tail].take().unwrap();
        self.index.remove(&node.key);
        self.free_list.push(tail);
        Some(node.key)
    }

    fn get(&mut self, key: &str) -> Option<CacheEntry> {
        let id = *self.index.get(key)?;
        self.touch(id);
        self.slots[id].as_ref().map(|n| n.entry.clone())
    }

    fn remove(&mut self, key: &str) -> bool {
        if let Some(id) = self.index.remove(key) {
            self.detach(id);
            self.slots[id] = None;
            self.free_list.push(id);
            true
        } else {
            false
        }
    }

    fn insert(&mut self, key: String, entry: CacheEntry) -> Option<String> {
        if let Some(&id) = self.index.get(&key) {
            self.slots[id].as_mut().unwrap().entry = entry;
            self.touch(id);
            return None;
        }
        let mut evicted = None;
        if self.index.len() >= self.capacity {
            evicted = self.evict_tail();
        }
        let id = if let Some(free) = self.free_list.pop() {
            free
        } else {
            self.slots.push(None);
            self.slots.len() - 1
        };
        self.slots[id] = Some(Node {
            key: key.clone(),
            entry,
            prev: None,
            next: None,
        });
        self.index.insert(key, id);
        self.push_front(id);
        evicted
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn keys(&self) -> Vec<String> {
        self.index.keys().cloned().collect()
    }
}

struct Counters {
    hits: u64,
    misses: u64,
    reset_at: chrono::DateTime<Utc>,
}

/// Bounded LRU routing cache with per-entry TTL and hit/miss counters.
pub struct RoutingCache {
    lru: Mutex<Lru>,
    counters: Mutex<Counters>,
}

impl RoutingCache {
    pub fn new(capacity: usize) -> Result<Self, CacheError> {
        if capacity == 0 {
            return Err(CacheError::ZeroCapacity);
        }
        Ok(Self {
            lru: Mutex::new(Lru::new(capacity)),
            counters: Mutex::new(Counters {
                hits: 0,
                misses: 0,
                reset_at: Utc::now(),
            }),
        })
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY).expect("default capacity is nonzero")
    }

    /// Look up a decision by raw utterance text, lazily dropping expired entries.
    pub fn get(&self, utterance: &str) -> Option<RoutingDecision> {
        let key = fingerprint_key(utterance);
        let mut lru = self.lru.lock().expect("cache lock poisoned");
        let mut counters = self.counters.lock().expect("counters lock poisoned");
        match lru.get(&key) {
            Some(entry) => {
                let ttl = ttl_for_source(entry.decision.source);
                if Utc::now().signed_duration_since(entry.created_at).to_std().unwrap_or_default() > ttl {
                    lru.remove(&key);
                    counters.misses += 1;
                    None
                } else {
                    counters.hits += 1;
                    Some(entry.decision)
                }
            }
            None => {
                counters.misses += 1;
                None
            }
        }
    }

    /// Store a decision, using the TTL appropriate to its source.
    pub fn set(&self, utterance: &str, decision: RoutingDecision) {
        let key = fingerprint_key(utterance);
        let entry = CacheEntry {
            decision,
            created_at: Utc::now(),
        };
        let mut lru = self.lru.lock().expect("cache lock poisoned");
        lru.insert(key, entry);
    }

    /// Sweep the table for expired entries and return the count removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut lru = self.lru.lock().expect("cache lock poisoned");
        let now = Utc::now();
        let expired: Vec<String> = lru
            .keys()
            .into_iter()
            .filter(|k| {
                lru.index
                    .get(k)
                    .and_then(|&id| lru.slots[id].as_ref())
                    .map(|n| {
                        let ttl = ttl_for_source(n.entry.decision.source);
                        now.signed_duration_since(n.entry.created_at).to_std().unwrap_or_default() > ttl
                    })
                    .unwrap_or(false)
            })
            .collect();
        for k in &expired {
            lru.remove(k);
        }
        expired.len()
    }

    pub fn get_stats(&self) -> CacheStats {
        let lru = self.lru.lock().expect("cache lock poisoned");
        let counters = self.counters.lock().expect("counters lock poisoned");
        let total = counters.hits + counters.misses;
        let hit_rate = if total == 0 { 0.0 } else { counters.hits as f64 / total as f64 };
        CacheStats {
            hits: counters.hits,
            misses: counters.misses,
            hit_rate,
            size: lru.len(),
            capacity: lru.capacity,
            uptime_sec: Utc::now().signed_duration_since(counters.reset_at).num_seconds().max(0) as u64,
        }
    }

    pub fn reset_stats(&self) {
        let mut counters = self.counters.lock().expect("counters lock poisoned");
        counters.hits = 0;
        counters.misses = 0;
        counters.reset_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Intent;

    fn decision(source: RouteSource) -> RoutingDecision {
        RoutingDecision {
            intent: Intent::ScheduleQuery,
            confidence: 0.9,
            source,
            needs_orchestration: false,
        }
    }

    #[test]
    fn miss_then_hit() {
        let cache = RoutingCache::new(10).unwrap();
        assert!(cache.get("hello").is_none());
        cache.set("hello", decision(RouteSource::Rule));
        assert!(cache.get("hello").is_some());
        let stats = cache.get_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn capacity_one_evicts_first_entry() {
        let cache = RoutingCache::new(1).unwrap();
        cache.set("first", decision(RouteSource::Rule));
        cache.set("second", decision(RouteSource::Rule));
        assert!(cache.get("first").is_none());
        assert!(cache.get("second").is_some());
        assert_eq!(cache.get_stats().size, 1);
    }

    #[test]
    fn zero_capacity_errors() {
        assert!(RoutingCache::new(0).is_err());
    }

    #[test]
    fn fingerprint_key_is_stable_and_prefixed() {
        let a = fingerprint_key("hello world");
        let b = fingerprint_key("hello world");
        assert_eq!(a, b);
        assert!(a.starts_with("route:"));
        assert_eq!(a.len(), "route:".len() + 16);
    }

    #[test]
    fn cleanup_expired_counts_removed_entries() {
        let cache = RoutingCache::new(10).unwrap();
        cache.set("a", decision(RouteSource::Rule));
        {
            let key = fingerprint_key("a");
            let mut lru = cache.lru.lock().unwrap();
            if let Some(&id) = lru.index.get(&key) {
                lru.slots[id].as_mut().unwrap().entry.created_at = Utc::now() - chrono::Duration::hours(1);
            }
        }
        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.get_stats().size, 0);
    }
}
