//! Query outcome counters, reported and reset periodically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

const OUTCOMES: usize = 4;

/// How a query was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Answered by an upstream nameserver.
    Resolved,
    /// Answered from the success cache.
    Cached,
    /// Answered with the null route.
    Blocked,
    /// Answered with a server failure.
    Failed,
}

impl Outcome {
    const ALL: [Outcome; OUTCOMES] = [Outcome::Resolved, Outcome::Cached, Outcome::Blocked, Outcome::Failed];

    fn index(self) -> usize {
        self as usize
    }
}

pub struct Stats {
    outcomes: [AtomicU64; OUTCOMES],
    elapsed_us: AtomicU64,
    started_at: Instant,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            outcomes: Default::default(),
            elapsed_us: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Count one answered query and the time it took.
    pub fn record(&self, outcome: Outcome, elapsed: Duration) {
        self.outcomes[outcome.index()].fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.elapsed_us.fetch_add(micros, Ordering::Relaxed);
    }

    /// Queries with `outcome` since the last snapshot.
    pub fn count(&self, outcome: Outcome) -> u64 {
        self.outcomes[outcome.index()].load(Ordering::Relaxed)
    }

    pub fn snapshot_and_reset(&self) -> StatsSnapshot {
        let [resolved, cached, blocked, failed] =
            Outcome::ALL.map(|outcome| self.outcomes[outcome.index()].swap(0, Ordering::Relaxed));
        let elapsed_us = self.elapsed_us.swap(0, Ordering::Relaxed);
        let requests = resolved + cached + blocked + failed;

        StatsSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs(),
            requests,
            resolved,
            cached,
            blocked,
            failed,
            avg_response_ms: match requests {
                0 => 0.0,
                n => elapsed_us as f64 / n as f64 / 1000.0,
            },
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub requests: u64,
    pub resolved: u64,
    pub cached: u64,
    pub blocked: u64,
    pub failed: u64,
    pub avg_response_ms: f64,
}
