use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Global switch for automatic incident handling. When false the
    /// ingest endpoint still acknowledges success but skips evaluation.
    #[serde(default = "default_incident_automation_enabled")]
    pub incident_automation_enabled: bool,

    /// Consecutive no-match outcomes required to resolve an open incident.
    #[serde(default = "default_recovery_threshold")]
    pub recovery_threshold: u32,

    /// Optional endpoint the incident open/resolve events are POSTed to.
    /// When unset, incidents are only logged.
    pub incident_webhook_url: Option<String>,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialServerConfig {
    listen_address: Option<String>,
    incident_automation_enabled: Option<bool>,
    recovery_threshold: Option<u32>,
    incident_webhook_url: Option<String>,
    log_dir: Option<String>,
}

fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_incident_automation_enabled() -> bool {
    true
}

fn default_recovery_threshold() -> u32 {
    1
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl ServerConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, String> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let file_config: PartialServerConfig = if let Some(path_str) = config_path {
            let path = Path::new(path_str);
            if path.exists() {
                let contents = fs::read_to_string(path)
                    .map_err(|e| format!("Failed to read config file at {path:?}: {e}"))?;
                toml::from_str(&contents)
                    .map_err(|e| format!("Failed to parse TOML from config file at {path:?}: {e}"))?
            } else {
                PartialServerConfig::default()
            }
        } else {
            PartialServerConfig::default()
        };

        // 2. Load from environment variables
        let env_config: PartialServerConfig = envy::from_env::<PartialServerConfig>()
            .map_err(|e| format!("Failed to load config from environment: {e}"))?;

        // 3. Merge: environment overrides file
        let final_config = ServerConfig {
            listen_address: env_config
                .listen_address
                .or(file_config.listen_address)
                .unwrap_or_else(default_listen_address),
            incident_automation_enabled: env_config
                .incident_automation_enabled
                .or(file_config.incident_automation_enabled)
                .unwrap_or_else(default_incident_automation_enabled),
            recovery_threshold: env_config
                .recovery_threshold
                .or(file_config.recovery_threshold)
                .unwrap_or_else(default_recovery_threshold),
            incident_webhook_url: env_config
                .incident_webhook_url
                .or(file_config.incident_webhook_url),
            log_dir: env_config
                .log_dir
                .or(file_config.log_dir)
                .unwrap_or_else(default_log_dir),
        };

        Ok(final_config)
    }
}
