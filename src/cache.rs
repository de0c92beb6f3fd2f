//! Answer cache with TTL-based expiration and an optional entry limit.
//!
//! The same type backs the success cache and the negative cache; negative
//! entries simply carry no message.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use hickory_proto::op::Message;
use rustc_hash::FxHashMap;
use tokio::time::Instant;

use crate::error::CacheError;

struct CacheEntry {
    message: Option<Arc<Message>>,
    blocked: bool,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.inserted_at + self.ttl
    }
}

/// Result of a successful cache lookup.
#[derive(Debug, Clone)]
pub struct CacheHit {
    /// Shared snapshot of the stored message; `None` for negative entries.
    pub message: Option<Arc<Message>>,
    pub blocked: bool,
}

/// TTL-bounded cache keyed by `qname|qclass|qtype`.
pub struct AnswerCache {
    entries: RwLock<FxHashMap<String, CacheEntry>>,
    expire: Duration,
    max_count: usize,
}

impl AnswerCache {
    /// `max_count` of zero means unbounded.
    pub fn new(expire: Duration, max_count: usize) -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
            expire,
            max_count,
        }
    }

    /// Look up `key`. An expired entry is removed and reported as [`CacheError::Expired`].
    pub fn get(&self, key: &str) -> Result<CacheHit, CacheError> {
        let now = Instant::now();

        {
            let entries = self.entries.read().map_err(|_| CacheError::Poisoned)?;
            match entries.get(key) {
                None => return Err(CacheError::NotFound(key.to_string())),
                Some(entry) if !entry.is_expired(now) => {
                    return Ok(CacheHit {
                        message: entry.message.clone(),
                        blocked: entry.blocked,
                    });
                }
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().map_err(|_| CacheError::Poisoned)?;
        // Another writer may have refreshed the entry between the two locks.
        if let Some(entry) = entries.get(key) {
            if !entry.is_expired(now) {
                return Ok(CacheHit {
                    message: entry.message.clone(),
                    blocked: entry.blocked,
                });
            }
            entries.remove(key);
        }

        Err(CacheError::Expired(key.to_string()))
    }

    /// Insert or replace `key`. At capacity, exactly one other entry is evicted first.
    pub fn set(
        &self,
        key: &str,
        message: Option<Message>,
        blocked: bool,
    ) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(|_| CacheError::Poisoned)?;

        if self.max_count > 0 && entries.len() >= self.max_count && !entries.contains_key(key) {
            if let Some(victim) = eviction_victim(&entries, now) {
                entries.remove(&victim);
            }
        }

        entries.insert(
            key.to_string(),
            CacheEntry {
                message: message.map(Arc::new),
                blocked,
                inserted_at: now,
                ttl: self.expire,
            },
        );

        Ok(())
    }

    pub fn remove(&self, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lifetime given to every entry.
    pub fn expire(&self) -> Duration {
        self.expire
    }
}

/// First expired entry, otherwise the oldest insertion.
fn eviction_victim(entries: &FxHashMap<String, CacheEntry>, now: Instant) -> Option<String> {
    let mut oldest: Option<(&String, Instant)> = None;

    for (key, entry) in entries {
        if entry.is_expired(now) {
            return Some(key.clone());
        }
        match oldest {
            Some((_, at)) if at <= entry.inserted_at => {}
            _ => oldest = Some((key, entry.inserted_at)),
        }
    }

    oldest.map(|(key, _)| key.clone())
}
