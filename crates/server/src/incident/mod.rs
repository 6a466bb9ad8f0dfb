pub mod coordinator;
pub mod notifier;
pub mod state_store;

pub use coordinator::{Decision, IncidentDecisionCoordinator};
pub use notifier::{IncidentNotifier, IncidentRef, LogNotifier, NotifyError, WebhookIncidentClient};
pub use state_store::{HealthLabel, MonitorState, MonitorStateStore};
