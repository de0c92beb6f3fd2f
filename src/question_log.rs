//! Bounded log of client questions.
//!
//! Every answered query leaves one entry. Once the configured capacity is
//! reached the oldest entries are dropped silently.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::Mutex;

use serde::Serialize;

use crate::dns::Question;
use crate::transport::Network;

/// One logged client question. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionLogEntry {
    /// Unix timestamp in seconds.
    #[serde(rename = "date")]
    pub timestamp: i64,
    #[serde(rename = "client")]
    pub remote: IpAddr,
    #[serde(rename = "name")]
    pub qname: String,
    #[serde(rename = "class")]
    pub qclass: String,
    #[serde(rename = "type")]
    pub qtype: String,
    #[serde(rename = "net")]
    pub network: Network,
    pub blocked: bool,
}

impl QuestionLogEntry {
    /// Create an entry stamped with the current time.
    pub fn new(remote: IpAddr, question: &Question, network: Network, blocked: bool) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp(),
            remote,
            qname: question.qname.clone(),
            qclass: question.qclass.to_string(),
            qtype: question.qtype.to_string(),
            network,
            blocked,
        }
    }
}

/// Append-only ring of question log entries.
pub struct QuestionLog {
    entries: Mutex<VecDeque<QuestionLogEntry>>,
    capacity: usize,
}

impl QuestionLog {
    /// `capacity` of zero keeps every entry.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    pub fn add(&self, entry: QuestionLogEntry) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        if self.capacity > 0 {
            while entries.len() >= self.capacity {
                entries.pop_front();
            }
        }
        entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries, oldest first.
    pub fn items(&self) -> Vec<QuestionLogEntry> {
        self.entries
            .lock()
            .map(|e| e.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Entries whose client address is `remote`, oldest first.
    pub fn items_for_client(&self, remote: IpAddr) -> Vec<QuestionLogEntry> {
        self.entries
            .lock()
            .map(|e| e.iter().filter(|entry| entry.remote == remote).cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}
