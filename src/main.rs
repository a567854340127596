//! Kiosk gateway - session controller for an unattended vending cabinet
//!
//! Verifies card scans, unlocks the cabinet, follows the door through its
//! open/close cycle and settles the vision system's inference result against
//! the ledger, inventory and audit log.
//!
//! Module structure:
//! - `domain/` - Session state and wire types (User, SkuDelta, BoardStatus)
//! - `io/` - External interfaces (MQTT, HTTP endpoint, REST collaborators)
//! - `services/` - Business logic (VendingWorkflow, watchdogs, board)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use kiosk_gateway::infra::{Config, Metrics};
use kiosk_gateway::io::{start_http_server, start_mqtt_client, HttpState, RestClient};
use kiosk_gateway::services::{board_from_config, Collaborators, VendingWorkflow};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Kiosk gateway - unattended vending session controller
#[derive(Parser, Debug)]
#[command(name = "kiosk-gateway", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/kiosk.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: INFO, use RUST_LOG=debug for per-event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    info!(git_rev = %env!("KIOSK_GIT_REV"), "kiosk-gateway starting");

    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        card_topic = %config.card_topic(),
        inference_topic = %config.inference_topic(),
        board_mode = %config.board_mode().as_str(),
        board_url = %config.board_url(),
        http_port = %config.http_port(),
        door_open_timeout_ms = %config.door_open_timeout().as_millis(),
        door_close_timeout_ms = %config.door_close_timeout().as_millis(),
        inference_timeout_ms = %config.inference_timeout().as_millis(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Collaborators and the workflow that owns the session
    let metrics = Arc::new(Metrics::new());
    let rest = Arc::new(RestClient::new(&config)?);
    let board = board_from_config(&config)?;
    let collaborators = Collaborators::from_rest(rest, board);
    let workflow = Arc::new(VendingWorkflow::new(&config, collaborators, metrics.clone()));

    // Bounded event channel between the MQTT client and the dispatcher
    let (event_tx, event_rx) = mpsc::channel(config.event_queue_size());

    let mqtt_config = config.clone();
    let mqtt_metrics = metrics.clone();
    let mqtt_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = start_mqtt_client(&mqtt_config, event_tx, mqtt_metrics, mqtt_shutdown).await {
            tracing::error!(error = %e, "mqtt_client_error");
        }
    });

    let http_port = config.http_port();
    let http_state = HttpState {
        workflow: workflow.clone(),
        metrics: metrics.clone(),
        site_id: Arc::new(config.site_id().to_string()),
    };
    let http_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = start_http_server(http_port, http_state, http_shutdown).await {
            tracing::error!(error = %e, "http_server_error");
        }
    });

    // Periodic metrics summary
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    // Dispatch bus events until shutdown or the MQTT client goes away
    workflow.run(event_rx, shutdown_rx).await;

    info!("kiosk-gateway shutdown complete");
    Ok(())
}
