//! The probe worker's main loop: fetch assigned monitors, run their checks
//! with bounded parallelism, submit each result, then self-pace against a
//! wall-clock cycle floor.
//!
//! The loop is infinite and restart-safe. Fetch and submission failures are
//! logged and swallowed; the next cycle simply retries from the fetch.

use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use pulsegate_common::check::{CheckResult, MonitorSpec};
use pulsegate_common::wire::{IngestAck, MonitorListRequest, MonitorListResponse};
use tracing::{debug, error, info, warn};

use super::config::ProbeCliConfig;
use super::executor::CheckExecutor;

pub struct ProbeScheduler {
    config: ProbeCliConfig,
    client: reqwest::Client,
    executor: CheckExecutor,
}

impl ProbeScheduler {
    pub fn new(config: ProbeCliConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().build()?;
        let executor = CheckExecutor::new()?;
        Ok(Self {
            config,
            client,
            executor,
        })
    }

    /// Runs cycles until the shutdown signal fires. An in-flight cycle is
    /// finished before the loop exits.
    pub async fn run(&self, mut shutdown_rx: tokio::sync::watch::Receiver<()>) {
        info!(
            probe_id = %self.config.probe_id,
            batch_limit = self.config.batch_limit,
            cycle_floor_ms = self.config.cycle_floor_ms,
            "Probe scheduler started."
        );
        let cycle_floor = Duration::from_millis(self.config.cycle_floor_ms);

        loop {
            let run_time = Instant::now();

            self.run_cycle().await;

            if let Some(remainder) = pacing_delay(run_time.elapsed(), cycle_floor) {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        info!("Shutdown signal received, stopping probe scheduler.");
                        break;
                    }
                    _ = tokio::time::sleep(remainder) => {}
                }
            } else if shutdown_rx.has_changed().unwrap_or(true) {
                info!("Shutdown signal received, stopping probe scheduler.");
                break;
            }
        }
    }

    async fn run_cycle(&self) {
        let monitors = match self.fetch_assigned_monitors().await {
            Ok(monitors) => monitors,
            Err(e) => {
                error!(error = %e, "Failed to fetch assigned monitors; retrying next cycle.");
                return;
            }
        };

        if monitors.is_empty() {
            debug!("No monitors assigned this cycle.");
            return;
        }
        debug!(count = monitors.len(), "Executing checks for batch.");

        // Each monitor is independent; a failed check never aborts the batch.
        let results: Vec<CheckResult> = stream::iter(monitors.iter())
            .map(|monitor| self.executor.execute(&self.config.probe_id, monitor))
            .buffer_unordered(self.config.max_concurrent_checks.max(1))
            .collect()
            .await;

        for result in &results {
            match self.submit_result(result).await {
                Ok(ack) => {
                    if ack.message.as_deref() == Some("disabled") {
                        debug!(monitor_id = result.monitor_id, "Server reported incident handling disabled.");
                    }
                }
                Err(e) => {
                    // Dropped results are superseded by the next cycle.
                    warn!(monitor_id = result.monitor_id, error = %e, "Failed to submit check result.");
                }
            }
        }
    }

    async fn fetch_assigned_monitors(&self) -> Result<Vec<MonitorSpec>, reqwest::Error> {
        let request = MonitorListRequest {
            probe_id: self.config.probe_id.clone(),
            limit: self.config.batch_limit,
        };
        let response: MonitorListResponse = self
            .client
            .post(format!("{}/monitor/list", self.config.server_url))
            .bearer_auth(&self.config.probe_secret)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.monitors)
    }

    async fn submit_result(&self, result: &CheckResult) -> Result<IngestAck, reqwest::Error> {
        self.client
            .post(format!("{}/probe/response/ingest", self.config.server_url))
            .bearer_auth(&self.config.probe_secret)
            .timeout(Duration::from_millis(self.config.submit_timeout_ms))
            .json(result)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

/// How long a cycle must still sleep to respect the floor, if at all.
fn pacing_delay(elapsed: Duration, floor: Duration) -> Option<Duration> {
    if elapsed < floor {
        Some(floor - elapsed)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_cycle_sleeps_the_remainder() {
        let delay = pacing_delay(Duration::from_millis(500), Duration::from_millis(2000));
        assert_eq!(delay, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn slow_cycle_loops_immediately() {
        let delay = pacing_delay(Duration::from_millis(3000), Duration::from_millis(2000));
        assert_eq!(delay, None);
    }

    #[test]
    fn exact_floor_loops_immediately() {
        let delay = pacing_delay(Duration::from_millis(2000), Duration::from_millis(2000));
        assert_eq!(delay, None);
    }
}
