use serde::{Deserialize, Serialize};
use std::{error::Error, fs, path::Path};
use tracing::{error, info};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProbeCliConfig {
    pub server_url: String,
    pub probe_id: String,
    pub probe_secret: String,
    /// Maximum number of monitors fetched per cycle.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: u64,
    /// Lower bound on cycle duration; short cycles sleep the remainder.
    #[serde(default = "default_cycle_floor_ms")]
    pub cycle_floor_ms: u64,
    #[serde(default = "default_max_concurrent_checks")]
    pub max_concurrent_checks: usize,
    /// Per-submission network timeout.
    #[serde(default = "default_submit_timeout_ms")]
    pub submit_timeout_ms: u64,
    #[serde(skip)]
    pub config_path: String,
}

fn default_batch_limit() -> u64 {
    100
}

fn default_cycle_floor_ms() -> u64 {
    2000
}

fn default_max_concurrent_checks() -> usize {
    16
}

fn default_submit_timeout_ms() -> u64 {
    4000
}

pub fn load_cli_config(config_path_str: &str) -> Result<ProbeCliConfig, Box<dyn Error>> {
    let config_path = Path::new(config_path_str);
    let absolute_path_display = config_path
        .canonicalize()
        .unwrap_or_else(|_| config_path.to_path_buf());
    info!(path = ?absolute_path_display, "Attempting to load probe config.");

    let config_str = fs::read_to_string(config_path).map_err(|e| {
        error!(path = %config_path_str, error = %e, "Failed to read probe config file.");
        Box::new(e) as Box<dyn Error>
    })?;

    let mut probe_config: ProbeCliConfig = toml::from_str(&config_str).map_err(|e| {
        error!(path = %config_path_str, error = %e, "Failed to parse probe config file.");
        Box::new(e) as Box<dyn Error>
    })?;
    probe_config.config_path = config_path_str.to_string();

    if probe_config.probe_id.is_empty() || probe_config.probe_secret.is_empty() {
        return Err("probe_id and probe_secret must be set".into());
    }

    info!(probe_id = %probe_config.probe_id, server_url = %probe_config.server_url, "Loaded probe config successfully.");
    Ok(probe_config)
}
