//! The seam to the external incident-management collaborator.
//!
//! The coordinator only ever calls `open_incident` and `resolve_incident`;
//! how those land (a log line, a webhook, a queue) is this module's concern.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentRef(pub Uuid);

impl IncidentRef {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for IncidentRef {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for IncidentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("incident endpoint request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait IncidentNotifier: Send + Sync {
    async fn open_incident(
        &self,
        monitor_id: i64,
        group_description: &str,
    ) -> Result<IncidentRef, NotifyError>;

    async fn resolve_incident(&self, incident: &IncidentRef) -> Result<(), NotifyError>;
}

/// Records incident transitions in the log only. Used when no incident
/// endpoint is configured.
pub struct LogNotifier;

#[async_trait]
impl IncidentNotifier for LogNotifier {
    async fn open_incident(
        &self,
        monitor_id: i64,
        group_description: &str,
    ) -> Result<IncidentRef, NotifyError> {
        let incident = IncidentRef::new();
        info!(
            monitor_id = monitor_id,
            incident = %incident,
            description = group_description,
            "Incident opened."
        );
        Ok(incident)
    }

    async fn resolve_incident(&self, incident: &IncidentRef) -> Result<(), NotifyError> {
        info!(incident = %incident, "Incident resolved.");
        Ok(())
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "event")]
enum IncidentEvent<'a> {
    Open {
        incident_ref: &'a IncidentRef,
        monitor_id: i64,
        description: &'a str,
    },
    Resolve {
        incident_ref: &'a IncidentRef,
    },
}

/// POSTs incident transitions to an external incident-management endpoint.
pub struct WebhookIncidentClient {
    client: reqwest::Client,
    endpoint: String,
}

impl WebhookIncidentClient {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }

    async fn post(&self, event: &IncidentEvent<'_>) -> Result<(), NotifyError> {
        self.client
            .post(&self.endpoint)
            .json(event)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl IncidentNotifier for WebhookIncidentClient {
    async fn open_incident(
        &self,
        monitor_id: i64,
        group_description: &str,
    ) -> Result<IncidentRef, NotifyError> {
        let incident = IncidentRef::new();
        self.post(&IncidentEvent::Open {
            incident_ref: &incident,
            monitor_id,
            description: group_description,
        })
        .await?;
        Ok(incident)
    }

    async fn resolve_incident(&self, incident: &IncidentRef) -> Result<(), NotifyError> {
        self.post(&IncidentEvent::Resolve {
            incident_ref: incident,
        })
        .await
    }
}
