//! Authoritative per-monitor health state.
//!
//! The store hands out one lock per monitor identifier; every mutation goes
//! through that lock, so transitions for a monitor are serialized in arrival
//! order while different monitors never contend. The tokio mutex queues
//! waiters fairly, which is what gives the coordinator its
//! single-writer-per-monitor discipline.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;

use super::notifier::IncidentRef;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthLabel {
    Healthy,
    /// A group is accumulating consecutive matches but has not reached its
    /// debounce threshold yet.
    Matching { group: usize },
    IncidentOpen { group: usize },
}

#[derive(Debug, Clone)]
pub struct MonitorState {
    pub health: HealthLabel,
    /// Consecutive-match counter per criteria group index.
    pub group_matches: HashMap<usize, u32>,
    /// Consecutive no-match outcomes observed while an incident is open.
    pub recovery_matches: u32,
    pub active_incident: Option<IncidentRef>,
    pub last_evaluated_at: Option<DateTime<Utc>>,
}

impl Default for MonitorState {
    fn default() -> Self {
        Self {
            health: HealthLabel::Healthy,
            group_matches: HashMap::new(),
            recovery_matches: 0,
            active_incident: None,
            last_evaluated_at: None,
        }
    }
}

#[derive(Default)]
pub struct MonitorStateStore {
    states: DashMap<i64, Arc<Mutex<MonitorState>>>,
}

impl MonitorStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock guarding `monitor_id`'s state, created on first use.
    pub fn entry(&self, monitor_id: i64) -> Arc<Mutex<MonitorState>> {
        self.states
            .entry(monitor_id)
            .or_insert_with(|| Arc::new(Mutex::new(MonitorState::default())))
            .clone()
    }

    /// Drops a monitor's state. Only called when the monitor itself is
    /// deleted by its owner.
    pub fn remove(&self, monitor_id: i64) {
        self.states.remove(&monitor_id);
    }
}
