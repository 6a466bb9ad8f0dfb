mod probe_modules;

use clap::Parser;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use probe_modules::config::load_cli_config;
use probe_modules::scheduler::ProbeScheduler;
use pulsegate_common::version::VERSION;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the probe configuration file
    #[arg(short, long, default_value = "probe_config.toml")]
    config: String,
}

fn init_logging() {
    let file_appender = rolling::daily("logs", "probe.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

#[tokio::main]
async fn main() {
    if std::env::args().any(|arg| arg == "--version") {
        println!("Probe version: {VERSION}");
        return;
    }

    let args = Args::parse();

    init_logging();
    info!("Starting probe worker, version: {}", VERSION);

    // Failing to establish the worker's identity is the one fatal startup
    // condition; the process must not loop unauthenticated.
    let config = match load_cli_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load probe configuration. Exiting.");
            std::process::exit(1);
        }
    };

    let scheduler = match ProbeScheduler::new(config) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            error!(error = %e, "Failed to build HTTP client. Exiting.");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, signalling shutdown.");
            let _ = shutdown_tx.send(());
        }
    });

    scheduler.run(shutdown_rx).await;
    info!("Probe worker stopped.");
}
