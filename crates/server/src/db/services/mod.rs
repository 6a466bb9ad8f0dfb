pub mod credential_service;
pub mod monitor_service;

pub use credential_service::SeaOrmProbeDirectory;
pub use monitor_service::SeaOrmMonitorDirectory;
