//! Blocklist for ad/tracking domains.
//!
//! Exact-match, case-insensitive set of blocked domains. Entries can be
//! added and removed at runtime.

use std::sync::RwLock;

use rustc_hash::FxHashSet;

/// A set of blocked domains.
pub struct BlocklistIndex {
    domains: RwLock<FxHashSet<String>>,
}

impl BlocklistIndex {
    pub fn new() -> Self {
        Self {
            domains: RwLock::new(FxHashSet::default()),
        }
    }

    /// Check if a domain is blocked. Parent domains are not consulted.
    pub fn exists(&self, domain: &str) -> bool {
        let domain = normalize(domain);
        self.domains
            .read()
            .map(|d| d.contains(&domain))
            .unwrap_or(false)
    }

    /// Same as [`exists`](Self::exists); kept for callers that treat the index as a map.
    pub fn get(&self, domain: &str) -> Option<bool> {
        self.exists(domain).then_some(true)
    }

    /// Block (`true`) or unblock (`false`) a domain.
    pub fn set(&self, domain: &str, blocked: bool) {
        if !blocked {
            self.remove(domain);
            return;
        }

        let domain = normalize(domain);
        if domain.is_empty() {
            return;
        }
        if let Ok(mut domains) = self.domains.write() {
            domains.insert(domain);
        }
    }

    pub fn remove(&self, domain: &str) {
        let domain = normalize(domain);
        if let Ok(mut domains) = self.domains.write() {
            domains.remove(&domain);
        }
    }

    /// Returns the number of domains in the blocklist.
    pub fn len(&self) -> usize {
        self.domains.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all blocked domains, sorted.
    pub fn items(&self) -> Vec<String> {
        let mut items: Vec<String> = self
            .domains
            .read()
            .map(|d| d.iter().cloned().collect())
            .unwrap_or_default();
        items.sort_unstable();
        items
    }
}

impl Default for BlocklistIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_lowercase()
}
