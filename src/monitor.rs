//! Per-query timing for diagnostics

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::query::QueryState;
use crate::request::Eutil;

/// Timing record of one query
#[derive(Debug, Clone)]
pub struct QueryTiming {
    pub eutil: Eutil,
    pub started: Instant,
    /// Latest state reported by the query
    pub state: QueryState,
    /// Number of requests submitted after planning
    pub requests: usize,
    /// Wall time from start to stop, once stopped
    pub elapsed: Option<Duration>,
}

impl QueryTiming {
    /// Elapsed time so far, or the final duration once stopped
    pub fn elapsed(&self) -> Duration {
        self.elapsed.unwrap_or_else(|| self.started.elapsed())
    }

    pub fn is_running(&self) -> bool {
        self.elapsed.is_none()
    }
}

/// Finished records kept by [`Monitor::new`]
pub const DEFAULT_MONITOR_HISTORY: usize = 1000;

#[derive(Debug)]
struct Registry {
    timings: HashMap<String, QueryTiming>,
    /// Stopped query ids, oldest first
    finished: VecDeque<String>,
    history: usize,
}

/// Shared registry of query timings
///
/// Cloning is cheap and every clone sees the same records. Running queries are
/// always tracked; once more than `history` queries have stopped, the oldest
/// stopped records are evicted.
#[derive(Debug, Clone)]
pub struct Monitor {
    registry: Arc<Mutex<Registry>>,
}

impl Default for Monitor {
    fn default() -> Self {
        Self::with_history(DEFAULT_MONITOR_HISTORY)
    }
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `history` stopped records; `0` evicts a record on stop
    pub fn with_history(history: usize) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                timings: HashMap::new(),
                finished: VecDeque::new(),
                history,
            })),
        }
    }

    /// Start timing `query_id`, replacing an earlier record with the same id
    pub fn start(&self, query_id: &str, eutil: Eutil) {
        debug!(query_id, %eutil, "Query started");
        let mut registry = self.lock();
        registry.finished.retain(|id| id != query_id);
        registry.timings.insert(
            query_id.to_string(),
            QueryTiming {
                eutil,
                started: Instant::now(),
                state: QueryState::Initialized,
                requests: 0,
                elapsed: None,
            },
        );
    }

    pub fn transition(&self, query_id: &str, state: QueryState) {
        if let Some(timing) = self.lock().timings.get_mut(query_id) {
            timing.state = state;
        }
    }

    pub fn record_requests(&self, query_id: &str, requests: usize) {
        if let Some(timing) = self.lock().timings.get_mut(query_id) {
            timing.requests = requests;
        }
    }

    /// Stop the clock for `query_id` and return its final timing
    pub fn stop(&self, query_id: &str) -> Option<QueryTiming> {
        let mut registry = self.lock();
        let timing = registry.timings.get_mut(query_id)?;
        let newly_stopped = timing.elapsed.is_none();
        if newly_stopped {
            timing.elapsed = Some(timing.started.elapsed());
        }
        info!(
            query_id,
            eutil = %timing.eutil,
            state = ?timing.state,
            requests = timing.requests,
            elapsed_ms = timing.elapsed().as_millis() as u64,
            "Query finished"
        );
        let stopped = timing.clone();

        if newly_stopped {
            registry.finished.push_back(query_id.to_string());
            while registry.finished.len() > registry.history {
                let Some(oldest) = registry.finished.pop_front() else {
                    break;
                };
                registry.timings.remove(&oldest);
            }
        }
        Some(stopped)
    }

    pub fn get(&self, query_id: &str) -> Option<QueryTiming> {
        self.lock().timings.get(query_id).cloned()
    }

    /// Copy of every record, keyed by query id
    pub fn snapshot(&self) -> HashMap<String, QueryTiming> {
        self.lock().timings.clone()
    }

    /// Number of stopped records kept before eviction
    pub fn history(&self) -> usize {
        self.lock().history
    }

    /// Drop the record of `query_id`
    pub fn forget(&self, query_id: &str) -> Option<QueryTiming> {
        let mut registry = self.lock();
        registry.finished.retain(|id| id != query_id);
        registry.timings.remove(query_id)
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
