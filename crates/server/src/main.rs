use std::env;
use std::sync::Arc;

use clap::Parser;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pulsegate_server::config::ServerConfig;
use pulsegate_server::db::services::{SeaOrmMonitorDirectory, SeaOrmProbeDirectory};
use pulsegate_server::incident::{
    IncidentDecisionCoordinator, IncidentNotifier, LogNotifier, WebhookIncidentClient,
};
use pulsegate_common::version::VERSION;
use pulsegate_server::web::{create_axum_router, AppState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "server.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if std::env::args().any(|arg| arg == "--version") {
        println!("Server version: {VERSION}");
        return Ok(());
    }

    let args = Args::parse();

    let server_config = match ServerConfig::load(args.config.as_deref()) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Failed to load server configuration: {e}");
            return Err(e.into());
        }
    };

    init_logging(&server_config.log_dir);
    info!("Starting server, version: {}", VERSION);

    // --- Database Pool Setup ---
    let database_url = env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?;
    let mut opt = ConnectOptions::new(database_url);
    opt.max_connections(10);

    let db_pool: DatabaseConnection = match Database::connect(opt).await {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "Failed to create database connection.");
            return Err(e.into());
        }
    };

    // --- Incident collaborator ---
    let notifier: Arc<dyn IncidentNotifier> = match &server_config.incident_webhook_url {
        Some(endpoint) => {
            info!(endpoint = %endpoint, "Incident events will be posted to the configured endpoint.");
            Arc::new(WebhookIncidentClient::new(endpoint.clone()))
        }
        None => {
            info!("No incident endpoint configured; incident events will only be logged.");
            Arc::new(LogNotifier)
        }
    };

    let coordinator = Arc::new(IncidentDecisionCoordinator::new(
        notifier,
        server_config.recovery_threshold,
    ));

    let app_state = Arc::new(AppState::new(
        server_config.clone(),
        Arc::new(SeaOrmProbeDirectory::new(db_pool.clone())),
        Arc::new(SeaOrmMonitorDirectory::new(db_pool)),
        coordinator,
    ));

    let app = create_axum_router(app_state);

    let listener = tokio::net::TcpListener::bind(&server_config.listen_address).await?;
    info!(address = %server_config.listen_address, "HTTP server listening.");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, shutting down.");
            }
        })
        .await
        .map_err(Box::new)?;

    Ok(())
}
