//! Turns match outcomes into at most one state transition and at most one
//! incident action per evaluation.
//!
//! State machine per monitor: `Healthy ⇄ Matching(group) → IncidentOpen(group)
//! → Healthy`. All processing for a monitor happens under that monitor's
//! state lock, including the notifier call, so an incident can never be
//! opened twice for the same unhealthy stretch even under concurrent
//! duplicate reports.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info};

use crate::criteria::MatchOutcome;

use super::notifier::{IncidentNotifier, IncidentRef};
use super::state_store::{HealthLabel, MonitorState, MonitorStateStore};

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    NoChange,
    IncidentOpened {
        incident: IncidentRef,
        group: usize,
        description: String,
    },
    IncidentResolved {
        incident: IncidentRef,
    },
}

pub struct IncidentDecisionCoordinator {
    store: MonitorStateStore,
    notifier: Arc<dyn IncidentNotifier>,
    recovery_threshold: u32,
}

impl IncidentDecisionCoordinator {
    pub fn new(notifier: Arc<dyn IncidentNotifier>, recovery_threshold: u32) -> Self {
        Self {
            store: MonitorStateStore::new(),
            notifier,
            recovery_threshold: recovery_threshold.max(1),
        }
    }

    /// Applies one evaluation outcome to the monitor's state. Reports for the
    /// same monitor queue on its state lock and are processed in arrival
    /// order; reports for different monitors run fully in parallel.
    pub async fn process(&self, monitor_id: i64, outcome: &MatchOutcome) -> Decision {
        let entry = self.store.entry(monitor_id);
        let mut state = entry.lock().await;
        state.last_evaluated_at = Some(Utc::now());

        match &outcome.matched {
            Some(group) => self.apply_match(monitor_id, &mut state, group).await,
            None => self.apply_no_match(monitor_id, &mut state).await,
        }
    }

    async fn apply_match(
        &self,
        monitor_id: i64,
        state: &mut MonitorState,
        group: &crate::criteria::MatchedGroup,
    ) -> Decision {
        let count = {
            let counter = state.group_matches.entry(group.index).or_insert(0);
            *counter += 1;
            *counter
        };
        // Only the matched group keeps its streak; a different group matching
        // breaks every other streak.
        state.group_matches.retain(|index, _| *index == group.index);
        state.recovery_matches = 0;

        // Idempotency: a new match never opens a second incident while one
        // is active, whichever group it names.
        if state.active_incident.is_some() {
            debug!(
                monitor_id = monitor_id,
                group = group.index,
                "Match while an incident is already open; nothing to do."
            );
            return Decision::NoChange;
        }

        if count < group.debounce_threshold {
            debug!(
                monitor_id = monitor_id,
                group = group.index,
                count = count,
                threshold = group.debounce_threshold,
                "Group matched but is still below its debounce threshold."
            );
            state.health = HealthLabel::Matching { group: group.index };
            return Decision::NoChange;
        }

        match self
            .notifier
            .open_incident(monitor_id, &group.description)
            .await
        {
            Ok(incident) => {
                info!(
                    monitor_id = monitor_id,
                    incident = %incident,
                    group = group.index,
                    "Opened incident."
                );
                state.active_incident = Some(incident.clone());
                state.health = HealthLabel::IncidentOpen { group: group.index };
                Decision::IncidentOpened {
                    incident,
                    group: group.index,
                    description: group.description.clone(),
                }
            }
            Err(e) => {
                // The streak is kept, so the next matching report retries.
                error!(monitor_id = monitor_id, error = %e, "Failed to open incident.");
                state.health = HealthLabel::Matching { group: group.index };
                Decision::NoChange
            }
        }
    }

    async fn apply_no_match(&self, monitor_id: i64, state: &mut MonitorState) -> Decision {
        state.group_matches.clear();

        let Some(incident) = state.active_incident.clone() else {
            state.health = HealthLabel::Healthy;
            state.recovery_matches = 0;
            return Decision::NoChange;
        };

        state.recovery_matches += 1;
        if state.recovery_matches < self.recovery_threshold {
            debug!(
                monitor_id = monitor_id,
                count = state.recovery_matches,
                threshold = self.recovery_threshold,
                "Healthy report while incident open; below recovery threshold."
            );
            return Decision::NoChange;
        }

        match self.notifier.resolve_incident(&incident).await {
            Ok(()) => {
                info!(monitor_id = monitor_id, incident = %incident, "Resolved incident.");
                state.active_incident = None;
                state.recovery_matches = 0;
                state.health = HealthLabel::Healthy;
                Decision::IncidentResolved { incident }
            }
            Err(e) => {
                // Counter is kept, so the next healthy report retries.
                error!(monitor_id = monitor_id, error = %e, "Failed to resolve incident.");
                Decision::NoChange
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::MatchedGroup;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::incident::notifier::NotifyError;

    #[derive(Default)]
    struct CountingNotifier {
        opens: AtomicU32,
        resolves: AtomicU32,
        fail_next_open: AtomicU32,
    }

    #[async_trait]
    impl IncidentNotifier for CountingNotifier {
        async fn open_incident(
            &self,
            _monitor_id: i64,
            _group_description: &str,
        ) -> Result<IncidentRef, NotifyError> {
            if self.fail_next_open.load(Ordering::SeqCst) > 0 {
                self.fail_next_open.fetch_sub(1, Ordering::SeqCst);
                // Any reqwest error would do; fabricate one via a guaranteed-
                // invalid builder is overkill, so reuse Transport from a
                // request that cannot be built.
                return Err(NotifyError::Transport(
                    reqwest::Client::new()
                        .get("http://[invalid")
                        .build()
                        .unwrap_err(),
                ));
            }
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(IncidentRef::new())
        }

        async fn resolve_incident(&self, _incident: &IncidentRef) -> Result<(), NotifyError> {
            self.resolves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn matched(group: usize, debounce_threshold: u32) -> MatchOutcome {
        MatchOutcome {
            matched: Some(MatchedGroup {
                index: group,
                description: format!("group {group} matched"),
                debounce_threshold,
            }),
        }
    }

    #[tokio::test]
    async fn first_match_opens_exactly_one_incident() {
        let notifier = Arc::new(CountingNotifier::default());
        let coordinator = IncidentDecisionCoordinator::new(notifier.clone(), 1);

        let decision = coordinator.process(1, &matched(0, 1)).await;
        assert!(matches!(decision, Decision::IncidentOpened { group: 0, .. }));
        assert_eq!(notifier.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn duplicate_match_never_opens_a_second_incident() {
        let notifier = Arc::new(CountingNotifier::default());
        let coordinator = IncidentDecisionCoordinator::new(notifier.clone(), 1);

        coordinator.process(1, &matched(0, 1)).await;
        let decision = coordinator.process(1, &matched(0, 1)).await;

        assert_eq!(decision, Decision::NoChange);
        assert_eq!(notifier.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn debounce_threshold_delays_the_open() {
        let notifier = Arc::new(CountingNotifier::default());
        let coordinator = IncidentDecisionCoordinator::new(notifier.clone(), 1);

        assert_eq!(coordinator.process(1, &matched(0, 3)).await, Decision::NoChange);
        assert_eq!(coordinator.process(1, &matched(0, 3)).await, Decision::NoChange);
        assert_eq!(notifier.opens.load(Ordering::SeqCst), 0);

        let decision = coordinator.process(1, &matched(0, 3)).await;
        assert!(matches!(decision, Decision::IncidentOpened { .. }));
        assert_eq!(notifier.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_different_group_match_resets_other_streaks() {
        let notifier = Arc::new(CountingNotifier::default());
        let coordinator = IncidentDecisionCoordinator::new(notifier.clone(), 1);

        coordinator.process(1, &matched(0, 3)).await;
        coordinator.process(1, &matched(0, 3)).await;
        // Group 1 interrupts group 0's streak.
        coordinator.process(1, &matched(1, 3)).await;
        coordinator.process(1, &matched(0, 3)).await;
        coordinator.process(1, &matched(0, 3)).await;

        // Group 0 is back at two consecutive matches, still below three.
        assert_eq!(notifier.opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_match_streak_resolves_exactly_one_incident() {
        let notifier = Arc::new(CountingNotifier::default());
        let coordinator = IncidentDecisionCoordinator::new(notifier.clone(), 2);

        coordinator.process(1, &matched(0, 1)).await;
        assert_eq!(
            coordinator.process(1, &MatchOutcome::no_match()).await,
            Decision::NoChange
        );
        let decision = coordinator.process(1, &MatchOutcome::no_match()).await;
        assert!(matches!(decision, Decision::IncidentResolved { .. }));
        assert_eq!(notifier.resolves.load(Ordering::SeqCst), 1);

        // Further healthy reports are quiet.
        assert_eq!(
            coordinator.process(1, &MatchOutcome::no_match()).await,
            Decision::NoChange
        );
        assert_eq!(notifier.resolves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_match_resets_the_recovery_streak() {
        let notifier = Arc::new(CountingNotifier::default());
        let coordinator = IncidentDecisionCoordinator::new(notifier.clone(), 2);

        coordinator.process(1, &matched(0, 1)).await;
        coordinator.process(1, &MatchOutcome::no_match()).await;
        // Unhealthy again; the single healthy report must not count anymore.
        coordinator.process(1, &matched(0, 1)).await;
        coordinator.process(1, &MatchOutcome::no_match()).await;

        assert_eq!(notifier.resolves.load(Ordering::SeqCst), 0);
        assert_eq!(notifier.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_open_is_retried_on_the_next_match() {
        let notifier = Arc::new(CountingNotifier::default());
        notifier.fail_next_open.store(1, Ordering::SeqCst);
        let coordinator = IncidentDecisionCoordinator::new(notifier.clone(), 1);

        assert_eq!(coordinator.process(1, &matched(0, 1)).await, Decision::NoChange);
        let decision = coordinator.process(1, &matched(0, 1)).await;
        assert!(matches!(decision, Decision::IncidentOpened { .. }));
        assert_eq!(notifier.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn monitors_do_not_share_state() {
        let notifier = Arc::new(CountingNotifier::default());
        let coordinator = IncidentDecisionCoordinator::new(notifier.clone(), 1);

        coordinator.process(1, &matched(0, 1)).await;
        coordinator.process(2, &matched(0, 1)).await;

        assert_eq!(notifier.opens.load(Ordering::SeqCst), 2);
    }
}
