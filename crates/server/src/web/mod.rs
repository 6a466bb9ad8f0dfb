use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ServerConfig;
use crate::db::{MonitorDirectory, ProbeDirectory};
use crate::incident::IncidentDecisionCoordinator;

pub mod error;
pub mod routes;

pub use error::AppError;

pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub probes: Arc<dyn ProbeDirectory>,
    pub monitors: Arc<dyn MonitorDirectory>,
    pub coordinator: Arc<IncidentDecisionCoordinator>,
    /// Runtime switch for automatic incident handling; seeded from config.
    pub incident_automation_enabled: AtomicBool,
}

impl AppState {
    pub fn new(
        config: Arc<ServerConfig>,
        probes: Arc<dyn ProbeDirectory>,
        monitors: Arc<dyn MonitorDirectory>,
        coordinator: Arc<IncidentDecisionCoordinator>,
    ) -> Self {
        let incident_automation_enabled = AtomicBool::new(config.incident_automation_enabled);
        Self {
            config,
            probes,
            monitors,
            coordinator,
            incident_automation_enabled,
        }
    }
}

pub fn create_axum_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes::probe_routes::create_probe_router()
        .layer(cors)
        .with_state(state)
}
