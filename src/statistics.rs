//! Call statistics
//!
//! Monotonic counters fed by the engine and the lifecycle event bus, plus a
//! periodic aggregation task that publishes point-in-time snapshots. The
//! counters never reset for the life of the process.

use crate::events::{EventBus, EventPayload, EventTopic};
use crate::registry::CallRegistry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Point-in-time view of the runtime's call traffic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub timestamp: DateTime<Utc>,
    /// Outbound calls originated
    pub dialed: u64,
    /// Inbound sessions presented to the runtime
    pub offered: u64,
    /// Sessions admitted and dispatched to a controller
    pub routed: u64,
    /// Sessions refused (not accepting, no route, or dispatch failure)
    pub rejected: u64,
    /// Calls that reached their end, for any reason
    pub completed: u64,
    /// Calls currently registered
    pub active: u64,
}

#[derive(Default)]
struct Counters {
    dialed: AtomicU64,
    offered: AtomicU64,
    routed: AtomicU64,
    rejected: AtomicU64,
    completed: AtomicU64,
}

/// Cloneable statistics collector
#[derive(Clone)]
pub struct Statistics {
    counters: Arc<Counters>,
    registry: Arc<CallRegistry>,
    latest: Arc<RwLock<StatsSnapshot>>,
}

impl Statistics {
    pub fn new(registry: Arc<CallRegistry>) -> Self {
        let counters = Arc::new(Counters::default());
        let latest = Arc::new(RwLock::new(StatsSnapshot {
            timestamp: Utc::now(),
            dialed: 0,
            offered: 0,
            routed: 0,
            rejected: 0,
            completed: 0,
            active: 0,
        }));
        Self {
            counters,
            registry,
            latest,
        }
    }

    /// Subscribe to lifecycle events so completions are counted no matter
    /// how a call ends
    pub fn attach(&self, events: &EventBus) {
        let counters = self.counters.clone();
        events.subscribe(EventTopic::CallEnded, move |payload| {
            if matches!(payload, EventPayload::CallEnded { .. }) {
                counters.completed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(())
        });
    }

    pub fn record_dialed(&self) {
        self.counters.dialed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_offered(&self) {
        self.counters.offered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_routed(&self) {
        self.counters.routed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Build a snapshot of the current counters and store it as the latest
    pub fn aggregate(&self) -> StatsSnapshot {
        let snapshot = StatsSnapshot {
            timestamp: Utc::now(),
            dialed: self.counters.dialed.load(Ordering::Relaxed),
            offered: self.counters.offered.load(Ordering::Relaxed),
            routed: self.counters.routed.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            active: self.registry.len() as u64,
        };
        *self.latest.write().unwrap() = snapshot.clone();
        snapshot
    }

    /// Most recently aggregated snapshot
    pub fn latest(&self) -> StatsSnapshot {
        self.latest.read().unwrap().clone()
    }

    /// Spawn the periodic aggregation task
    pub fn spawn_aggregator(&self, interval: Duration) -> JoinHandle<()> {
        let statistics = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let snapshot = statistics.aggregate();
                debug!(
                    active = snapshot.active,
                    routed = snapshot.routed,
                    completed = snapshot.completed,
                    "statistics aggregated"
                );
            }
        })
    }
}
