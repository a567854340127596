//! Kiosk Simulation Controller
//!
//! Drives a running kiosk gateway the way the cabinet hardware would: card
//! scans and inference results go out over MQTT, door reports and operator
//! commands over the gateway's HTTP endpoint.
//!
//! Usage:
//!   cargo run --bin kiosk-sim -- scan 0004277716
//!   cargo run --bin kiosk-sim -- door open
//!   cargo run --bin kiosk-sim -- inference X:-2 Y:1
//!   cargo run --bin kiosk-sim -- scenario happy_path

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "kiosk-sim")]
#[command(about = "Kiosk simulation controller - card reader, door and vision stand-in")]
struct Args {
    /// MQTT broker host
    #[arg(long, default_value = "localhost")]
    mqtt_host: String,

    /// MQTT broker port
    #[arg(long, default_value = "1883")]
    mqtt_port: u16,

    /// Card reader topic
    #[arg(long, default_value = "kiosk/card")]
    card_topic: String,

    /// Inference result topic
    #[arg(long, default_value = "kiosk/inference")]
    inference_topic: String,

    /// Gateway HTTP URL
    #[arg(short, long, default_value = "http://localhost:8080")]
    gateway_url: String,

    #[command(subcommand)]
    command: SimCommand,
}

#[derive(Subcommand, Debug)]
enum SimCommand {
    /// Publish a card scan
    Scan { card_id: String },
    /// Report the door state as the controller board would
    Door { state: DoorState },
    /// Publish an inference result, items as SKU:delta
    Inference { items: Vec<String> },
    /// Report a temperature excursion
    Overheat,
    /// Operator reset of session and door lock
    Reset,
    /// Print the gateway's session snapshot
    Status,
    /// Run a scripted scenario and check the final session state
    Scenario {
        name: ScenarioName,
        /// Card used by the scenario
        #[arg(long, default_value = "0004277716")]
        card_id: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DoorState {
    Open,
    Close,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScenarioName {
    /// Scan, open, close, inference; session ends idle
    HappyPath,
    /// Scan and never open the door; session abandoned
    WalkAway,
    /// Scan and open, then an operator reset
    OperatorReset,
}

/// Parse `SKU:delta` arguments into the inference wire format
fn parse_items(items: &[String]) -> anyhow::Result<Value> {
    let mut deltas = Vec::with_capacity(items.len());
    for item in items {
        let Some((sku, delta)) = item.rsplit_once(':') else {
            bail!("item {item:?} is not SKU:delta");
        };
        let delta: i64 = delta.parse().with_context(|| format!("bad delta in {item:?}"))?;
        deltas.push(json!({ "SKU": sku, "delta": delta }));
    }
    Ok(Value::Array(deltas))
}

struct Sim {
    args: Args,
    http: reqwest::Client,
}

impl Sim {
    /// Publish one message and wait for the broker to acknowledge it
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> anyhow::Result<()> {
        let mut options = MqttOptions::new(
            format!("kiosk-sim-{}", std::process::id()),
            &self.args.mqtt_host,
            self.args.mqtt_port,
        );
        options.set_keep_alive(Duration::from_secs(5));

        let (client, mut eventloop) = AsyncClient::new(options, 10);
        client.publish(topic, QoS::AtLeastOnce, false, payload).await?;

        let acked = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::PubAck(_))) => return Ok(()),
                    Ok(_) => {}
                    Err(e) => return Err(e),
                }
            }
        })
        .await
        .context("timed out waiting for broker acknowledgement")?;
        acked.context("MQTT connection failed")?;

        let _ = client.disconnect().await;
        println!("published {topic}");
        Ok(())
    }

    async fn post(&self, path: &str, body: Option<Value>) -> anyhow::Result<String> {
        let url = format!("{}{path}", self.args.gateway_url.trim_end_matches('/'));
        let mut request = self.http.post(&url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.with_context(|| format!("POST {url}"))?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            bail!("POST {url} returned {status}: {text}");
        }
        Ok(text)
    }

    async fn session(&self) -> anyhow::Result<Value> {
        let url = format!("{}/session", self.args.gateway_url.trim_end_matches('/'));
        let response = self.http.get(&url).send().await.with_context(|| format!("GET {url}"))?;
        Ok(response.error_for_status()?.json().await?)
    }

    async fn scan(&self, card_id: &str) -> anyhow::Result<()> {
        self.publish(&self.args.card_topic, card_id.as_bytes().to_vec()).await
    }

    async fn door(&self, state: DoorState) -> anyhow::Result<()> {
        let closed = matches!(state, DoorState::Close);
        let reply = self.post("/boardStatus", Some(json!({ "door_closed": closed }))).await?;
        println!("{reply}");
        Ok(())
    }

    async fn inference(&self, items: &[String]) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(&parse_items(items)?)?;
        self.publish(&self.args.inference_topic, payload).await
    }

    async fn run_scenario(&self, name: ScenarioName, card_id: &str) -> anyhow::Result<()> {
        let pause = || tokio::time::sleep(Duration::from_millis(500));

        match name {
            ScenarioName::HappyPath => {
                self.scan(card_id).await?;
                pause().await;
                expect_field(&self.session().await?, "workflowActive", true)?;
                self.door(DoorState::Open).await?;
                pause().await;
                self.door(DoorState::Close).await?;
                pause().await;
                self.inference(&["X:-2".to_string()]).await?;
                pause().await;
                expect_field(&self.session().await?, "workflowActive", false)?;
            }
            ScenarioName::WalkAway => {
                self.scan(card_id).await?;
                println!("waiting for the door-open timeout (default 10s)");
                tokio::time::sleep(Duration::from_secs(11)).await;
                let session = self.session().await?;
                expect_field(&session, "workflowActive", false)?;
                expect_field(&session, "maintenanceMode", false)?;
            }
            ScenarioName::OperatorReset => {
                self.scan(card_id).await?;
                pause().await;
                self.door(DoorState::Open).await?;
                println!("{}", self.post("/resetDoorLock", None).await?);
                let session = self.session().await?;
                expect_field(&session, "workflowActive", false)?;
                expect_field(&session, "maintenanceMode", false)?;
            }
        }

        println!("scenario {name:?} passed");
        Ok(())
    }
}

fn expect_field(session: &Value, field: &str, expected: bool) -> anyhow::Result<()> {
    match session.get(field).and_then(Value::as_bool) {
        Some(actual) if actual == expected => Ok(()),
        other => bail!("expected {field} = {expected}, session reports {other:?}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let http = reqwest::Client::builder().timeout(Duration::from_secs(5)).build()?;
    let sim = Sim { args, http };

    match &sim.args.command {
        SimCommand::Scan { card_id } => sim.scan(card_id).await?,
        SimCommand::Door { state } => sim.door(*state).await?,
        SimCommand::Inference { items } => sim.inference(items).await?,
        SimCommand::Overheat => {
            let body = json!({ "temperature": 14.5, "maxTemperatureStatus": 1 });
            println!("{}", sim.post("/boardStatus", Some(body)).await?);
        }
        SimCommand::Reset => println!("{}", sim.post("/resetDoorLock", None).await?),
        SimCommand::Status => println!("{}", serde_json::to_string_pretty(&sim.session().await?)?),
        SimCommand::Scenario { name, card_id } => sim.run_scenario(*name, card_id).await?,
    }
    Ok(())
}
