//! Bounded, TTL-expiring response cache shared across concurrent requests.
//!
//! Keys are the blake3 digest of the trimmed, lowercased question. Eviction is
//! by insertion order: when full, the entry inserted longest ago is dropped,
//! regardless of how recently it was read.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub ttl_secs: u64,
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    inserted_at: Instant,
    seq: u64,
}

#[derive(Debug)]
struct CacheState<V> {
    entries: HashMap<String, Entry<V>>,
    next_seq: u64,
    hits: u64,
    misses: u64,
}

#[derive(Debug)]
pub struct ResponseCache<V> {
    capacity: usize,
    ttl: Duration,
    state: Mutex<CacheState<V>>,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                next_seq: 0,
                hits: 0,
                misses: 0,
            }),
        }
    }

    pub fn key_for(question: &str) -> String {
        blake3::hash(question.trim().to_lowercase().as_bytes()).to_hex().to_string()
    }

    pub fn get(&self, question: &str) -> Option<V> {
        self.get_at(question, Instant::now())
    }

    pub fn set(&self, question: &str, value: V) {
        self.set_at(question, value, Instant::now());
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.hits = 0;
        state.misses = 0;
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let lookups = state.hits + state.misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            (state.hits as f64 / lookups as f64 * 10_000.0).round() / 100.0
        };

        CacheStats {
            size: state.entries.len(),
            capacity: self.capacity,
            hits: state.hits,
            misses: state.misses,
            hit_rate,
            ttl_secs: self.ttl.as_secs(),
        }
    }

    fn get_at(&self, question: &str, now: Instant) -> Option<V> {
        let key = Self::key_for(question);
        let mut state = self.lock();

        let fresh = match state.entries.get(&key) {
            None => None,
            Some(entry) if now.saturating_duration_since(entry.inserted_at) >= self.ttl => {
                state.entries.remove(&key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
        };

        if fresh.is_some() {
            state.hits += 1;
        } else {
            state.misses += 1;
        }
        fresh
    }

    fn set_at(&self, question: &str, value: V, now: Instant) {
        let key = Self::key_for(question);
        let mut state = self.lock();

        if !state.entries.contains_key(&key) && state.entries.len() >= self.capacity {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.seq)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                state.entries.remove(&oldest);
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(key, Entry { value, inserted_at: now, seq });
    }

    // A panic while holding the lock leaves the map structurally intact.
    fn lock(&self) -> MutexGuard<'_, CacheState<V>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
