//! Mock Kiosk Services
//!
//! In-memory stand-ins for everything the gateway talks to over HTTP:
//! authentication, inference heartbeat, ledger, inventory, audit log and the
//! controller board bridge.
//!
//! Behavior:
//! 1. Serves the collaborator routes on `--port` (default 8091) and the board
//!    routes on `--board-port` (default 8090), one router for both
//! 2. Knows three cards: customer 0004277716, stocker 0004277717,
//!    maintainer 0004277718
//! 3. With `--simulate-door`, an unlock command plays the door sequence
//!    against the gateway's /boardStatus endpoint: open -> (wait) -> closed
//!
//! Usage:
//!   cargo run --bin mock-services -- --simulate-door --gateway-url http://localhost:8080

use bytes::Bytes;
use clap::Parser;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use kiosk_gateway::domain::{AuditEntry, SkuDelta, User};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Price charged per unit taken from the cabinet
const UNIT_PRICE: f64 = 1.25;
const STARTING_BALANCE: f64 = 20.0;

#[derive(Parser, Debug)]
#[command(name = "mock-services")]
#[command(about = "Mock kiosk collaborators for local simulation")]
struct Args {
    /// Port for authentication, heartbeat, ledger, inventory and audit log
    #[arg(short, long, default_value = "8091")]
    port: u16,

    /// Port for the controller board bridge
    #[arg(long, default_value = "8090")]
    board_port: u16,

    /// Gateway HTTP URL for door state simulation
    #[arg(short, long, default_value = "http://localhost:8080")]
    gateway_url: String,

    /// Play the door open/close sequence after every unlock
    #[arg(long)]
    simulate_door: bool,

    /// How long the simulated door stays open (ms)
    #[arg(long, default_value = "3000")]
    open_duration_ms: u64,

    /// Answer heartbeat probes with 503
    #[arg(long)]
    heartbeat_down: bool,
}

struct MockState {
    users: HashMap<String, User>,
    balances: Mutex<HashMap<i64, f64>>,
    stock: Mutex<HashMap<String, i64>>,
    audit: Mutex<Vec<AuditEntry>>,
    display: Mutex<Vec<String>>,
    args: Args,
    http: reqwest::Client,
}

impl MockState {
    fn new(args: Args) -> Self {
        let users = [("0004277716", 1, 1), ("0004277717", 2, 2), ("0004277718", 3, 3)]
            .into_iter()
            .map(|(card, account_id, role_id)| {
                let user =
                    User { account_id, person_id: 100 + account_id, role_id, card_id: card.to_string() };
                (card.to_string(), user)
            })
            .collect();

        Self {
            users,
            balances: Mutex::new(HashMap::new()),
            stock: Mutex::new(HashMap::new()),
            audit: Mutex::new(Vec::new()),
            display: Mutex::new(Vec::new()),
            args,
            http: reqwest::Client::new(),
        }
    }

    fn charge(&self, account_id: i64, deltas: &[SkuDelta]) -> serde_json::Value {
        let taken: i64 = deltas.iter().filter(|d| d.delta < 0).map(|d| -d.delta).sum();
        let amount = taken as f64 * UNIT_PRICE;
        let mut balances = self.balances.lock();
        let balance = balances.entry(account_id).or_insert(STARTING_BALANCE);
        *balance -= amount;
        json!({ "accountID": account_id, "balance": *balance, "transactionAmount": amount })
    }

    fn restock(&self, deltas: &[SkuDelta]) {
        let mut stock = self.stock.lock();
        for delta in deltas {
            *stock.entry(delta.sku.clone()).or_insert(0) += delta.delta;
        }
    }
}

fn respond(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(body.into()))
        .expect("static response should not fail")
}

fn ok_empty() -> Response<Full<Bytes>> {
    respond(StatusCode::OK, "{}")
}

fn bad_request(reason: impl std::fmt::Display) -> Response<Full<Bytes>> {
    respond(StatusCode::BAD_REQUEST, json!({ "error": reason.to_string() }).to_string())
}

/// Door sequence as the controller board would report it
async fn simulate_door_sequence(state: Arc<MockState>) {
    let url = format!("{}/boardStatus", state.args.gateway_url.trim_end_matches('/'));
    let steps = [(false, 500), (true, state.args.open_duration_ms)];

    for (closed, delay_ms) in steps {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        match state.http.post(&url).json(&json!({ "door_closed": closed })).send().await {
            Ok(response) => println!(
                "[MOCK] door_closed={closed} -> {}",
                response.text().await.unwrap_or_default()
            ),
            Err(e) => {
                eprintln!("[MOCK] Door simulation failed: {e}");
                return;
            }
        }
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<MockState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => return Ok(bad_request(e)),
    };
    let segments: Vec<&str> = parts.uri.path().trim_matches('/').split('/').collect();

    let response = match (&parts.method, segments.as_slice()) {
        (&Method::GET, ["authentication", card_id]) => match state.users.get(*card_id) {
            Some(user) => {
                println!("[MOCK] Card {card_id} -> role {}", user.role_id);
                respond(StatusCode::OK, json!(user).to_string())
            }
            None => {
                println!("[MOCK] Card {card_id} unknown");
                respond(StatusCode::NOT_FOUND, "{}")
            }
        },
        (&Method::GET, ["heartbeat"]) => {
            if state.args.heartbeat_down {
                respond(StatusCode::SERVICE_UNAVAILABLE, "{}")
            } else {
                ok_empty()
            }
        }
        (&Method::POST, ["ledger", account_id]) => {
            match (account_id.parse::<i64>(), serde_json::from_slice::<Vec<SkuDelta>>(&body)) {
                (Ok(account_id), Ok(deltas)) => {
                    let ledger = state.charge(account_id, &deltas);
                    println!("[MOCK] Ledger {account_id}: {ledger}");
                    respond(StatusCode::OK, ledger.to_string())
                }
                (Err(e), _) => bad_request(e),
                (_, Err(e)) => bad_request(e),
            }
        }
        (&Method::POST, ["inventory"]) => match serde_json::from_slice::<Vec<SkuDelta>>(&body) {
            Ok(deltas) => {
                state.restock(&deltas);
                println!("[MOCK] Inventory now {:?}", state.stock.lock());
                ok_empty()
            }
            Err(e) => bad_request(e),
        },
        (&Method::POST, ["auditlog"]) => match serde_json::from_slice::<AuditEntry>(&body) {
            Ok(entry) => {
                println!("[MOCK] Audit card={:?} items={}", entry.card_id, entry.items.len());
                state.audit.lock().push(entry);
                ok_empty()
            }
            Err(e) => bad_request(e),
        },
        (&Method::POST, ["board", "lock"]) => {
            println!("[MOCK] Board LOCK");
            ok_empty()
        }
        (&Method::POST, ["board", "unlock"]) => {
            println!("[MOCK] ========================================");
            println!("[MOCK] BOARD UNLOCK COMMAND RECEIVED");
            println!("[MOCK] ========================================");
            if state.args.simulate_door {
                tokio::spawn(simulate_door_sequence(state.clone()));
            }
            ok_empty()
        }
        (&Method::POST, ["board", "display"]) => {
            let rows: Vec<String> = serde_json::from_slice::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| serde_json::from_value(v["rows"].clone()).ok())
                .unwrap_or_default();
            println!("[MOCK] LCD | {}", rows.join(" | "));
            *state.display.lock() = rows;
            ok_empty()
        }
        (&Method::GET, ["board", "display"]) => {
            respond(StatusCode::OK, json!({ "rows": *state.display.lock() }).to_string())
        }
        (&Method::GET, ["auditlog"]) => {
            respond(StatusCode::OK, json!(*state.audit.lock()).to_string())
        }
        _ => respond(StatusCode::NOT_FOUND, "{}"),
    };
    Ok(response)
}

async fn serve(listener: TcpListener, state: Arc<MockState>) -> std::io::Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(req, state.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                eprintln!("[MOCK] HTTP error: {e}");
            }
        });
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    println!("[MOCK] Collaborators on :{}", args.port);
    println!("[MOCK] Board bridge on  :{}", args.board_port);
    println!("[MOCK] Gateway URL:      {}", args.gateway_url);
    println!("[MOCK] Door simulation:  {}", args.simulate_door);
    println!("[MOCK] Heartbeat down:   {}", args.heartbeat_down);

    let services = TcpListener::bind(format!("0.0.0.0:{}", args.port)).await?;
    let board = TcpListener::bind(format!("0.0.0.0:{}", args.board_port)).await?;
    let state = Arc::new(MockState::new(args));

    tokio::try_join!(serve(services, state.clone()), serve(board, state))?;
    Ok(())
}
