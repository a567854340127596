//! Kiosk HTTP endpoint
//!
//! Receives board status reports and operator commands, and exposes the
//! session, health and Prometheus metrics. Uses hyper for the HTTP server.

use crate::domain::BoardStatus;
use crate::infra::metrics::{Metrics, MetricsSummary};
use crate::services::workflow::VendingWorkflow;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Shared handles for request handlers
#[derive(Clone)]
pub struct HttpState {
    pub workflow: Arc<VendingWorkflow>,
    pub metrics: Arc<Metrics>,
    pub site_id: Arc<String>,
}

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, site: &str, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(summary: &MetricsSummary, maintenance_mode: bool, site: &str) -> String {
    let mut output = String::with_capacity(4096);
    let counters: [(&str, &str, u64); 13] = [
        ("kiosk_events_total", "Bus events handled by the dispatcher", summary.events_total),
        ("kiosk_events_dropped_total", "Bus events dropped on a full queue", summary.events_dropped),
        ("kiosk_malformed_inputs_total", "Payloads rejected as malformed", summary.malformed_inputs),
        ("kiosk_card_scans_total", "Card scans received", summary.card_scans),
        ("kiosk_sessions_started_total", "Sessions started", summary.sessions_started),
        ("kiosk_sessions_completed_total", "Sessions settled by inference", summary.sessions_completed),
        ("kiosk_door_open_timeouts_total", "Door not opened in time", summary.door_open_timeouts),
        ("kiosk_door_close_timeouts_total", "Door not closed in time", summary.door_close_timeouts),
        ("kiosk_inference_timeouts_total", "Inference result not received in time", summary.inference_timeouts),
        ("kiosk_maintenance_entries_total", "Transitions into maintenance mode", summary.maintenance_entries),
        ("kiosk_resets_total", "Session resets", summary.resets),
        ("kiosk_board_status_reports_total", "Board status reports received", summary.board_status_reports),
        ("kiosk_collaborator_failures_total", "Failed calls to external services", summary.collaborator_failures),
    ];
    for (name, help, val) in counters {
        write_metric(&mut output, name, help, MetricType::Counter, site, val);
    }

    write_metric(
        &mut output,
        "kiosk_event_latency_avg_us",
        "Average handler latency since last scrape",
        MetricType::Gauge,
        site,
        summary.avg_latency_us,
    );
    write_metric(
        &mut output,
        "kiosk_event_latency_max_us",
        "Max handler latency since last scrape",
        MetricType::Gauge,
        site,
        summary.max_latency_us,
    );
    write_metric(
        &mut output,
        "kiosk_maintenance_mode",
        "1 while the kiosk is in maintenance mode",
        MetricType::Gauge,
        site,
        u64::from(maintenance_mode),
    );
    output
}

fn respond(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", content_type)
        .body(Full::new(body.into()))
        .expect("static response should not fail")
}

fn respond_text(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    respond(status, "text/plain; charset=utf-8", body)
}

fn respond_json(value: &serde_json::Value) -> Response<Full<Bytes>> {
    respond(StatusCode::OK, "application/json", value.to_string())
}

/// Dispatch a request whose body has already been read
async fn route(method: &Method, path: &str, body: Bytes, state: &HttpState) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::POST, "/boardStatus") => {
            // Unparsable reports are the one non-200 answer; nothing is mutated
            let status: BoardStatus = match serde_json::from_slice(&body) {
                Ok(status) => status,
                Err(e) => {
                    state.metrics.record_malformed_input();
                    warn!(error = %e, "board_status_rejected");
                    return respond_text(StatusCode::BAD_REQUEST, format!("invalid board status: {e}"));
                }
            };
            let outcome = state.workflow.handle_board_status(&status);
            respond_text(StatusCode::OK, outcome.to_string())
        }
        (&Method::POST, "/resetDoorLock") => match state.workflow.reset_door_lock().await {
            Ok(()) => respond_text(StatusCode::OK, "door lock reset"),
            Err(e) => {
                state.metrics.record_collaborator_failure();
                warn!(error = %e, "reset_lock_command_failed");
                respond_text(StatusCode::OK, "door lock reset; lock command failed")
            }
        },
        (&Method::GET, "/maintenanceMode") => {
            respond_json(&json!({ "maintenanceMode": state.workflow.maintenance_mode() }))
        }
        (&Method::GET, "/session") => match serde_json::to_value(state.workflow.snapshot()) {
            Ok(value) => respond_json(&value),
            Err(e) => {
                error!(error = %e, "session_snapshot_encode_error");
                respond_text(StatusCode::INTERNAL_SERVER_ERROR, "snapshot unavailable")
            }
        },
        (&Method::GET, "/health") => respond_text(StatusCode::OK, "ok"),
        (&Method::GET, "/metrics") => {
            let summary = state.metrics.report();
            let body =
                format_prometheus_metrics(&summary, state.workflow.maintenance_mode(), &state.site_id);
            respond(StatusCode::OK, "text/plain; version=0.0.4; charset=utf-8", body)
        }
        _ => respond_text(StatusCode::NOT_FOUND, "Not Found"),
    }
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: HttpState,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(path = %parts.uri.path(), error = %e, "http_body_read_error");
            return Ok(respond_text(StatusCode::BAD_REQUEST, "unreadable body"));
        }
    };
    Ok(route(&parts.method, parts.uri.path(), body, &state).await)
}

/// Start the kiosk HTTP server
pub async fn start_http_server(
    port: u16,
    state: HttpState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(port = %port, site = %state.site_id, "http_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| handle_request(req, state.clone()));

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "http_connection_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "http_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("http_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
