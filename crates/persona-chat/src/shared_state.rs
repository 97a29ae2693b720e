//! Shared application state handed to every API handler.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::{
    chat_db::Database,
    config::Config,
    context_engine::{ChatOrchestrator, TurnOutcome},
};

/// Process-wide counters reported by the stats endpoint.
pub struct AtomicCounters {
    pub total_requests: AtomicUsize,
    pub chat_turns: AtomicUsize,
    pub degraded_turns: AtomicUsize,
    pub persona_missing_turns: AtomicUsize,
}

impl AtomicCounters {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicUsize::new(0),
            chat_turns: AtomicUsize::new(0),
            degraded_turns: AtomicUsize::new(0),
            persona_missing_turns: AtomicUsize::new(0),
        }
    }

    pub fn inc_total_requests(&self) -> usize {
        self.total_requests.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_turn(&self, outcome: TurnOutcome) {
        self.chat_turns.fetch_add(1, Ordering::Relaxed);
        match outcome {
            TurnOutcome::Generated => {}
            TurnOutcome::Degraded => {
                self.degraded_turns.fetch_add(1, Ordering::Relaxed);
            }
            TurnOutcome::PersonaMissing => {
                self.persona_missing_turns.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            chat_turns: self.chat_turns.load(Ordering::Relaxed),
            degraded_turns: self.degraded_turns.load(Ordering::Relaxed),
            persona_missing_turns: self.persona_missing_turns.load(Ordering::Relaxed),
        }
    }
}

impl Default for AtomicCounters {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CounterSnapshot {
    pub total_requests: usize,
    pub chat_turns: usize,
    pub degraded_turns: usize,
    pub persona_missing_turns: usize,
}

/// Single state type used by the axum router.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ChatOrchestrator>,
    /// Present when backed by SQLite; used for table statistics.
    pub database: Option<Arc<Database>>,
    pub config: Arc<Config>,
    pub counters: Arc<AtomicCounters>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(orchestrator: Arc<ChatOrchestrator>, config: Config) -> Self {
        Self {
            orchestrator,
            database: None,
            config: Arc::new(config),
            counters: Arc::new(AtomicCounters::new()),
            started_at: Instant::now(),
        }
    }

    pub fn with_database(mut self, database: Arc<Database>) -> Self {
        self.database = Some(database);
        self
    }
}
