//! MQTT client for receiving kiosk bus events (card reader, vision inference)

use crate::domain::types::{CardId, KioskEvent, SkuDelta};
use crate::error::WorkflowError;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Topics the gateway listens on
#[derive(Debug, Clone)]
pub struct KioskTopics {
    pub card: String,
    pub inference: String,
}

impl KioskTopics {
    pub fn from_config(config: &Config) -> Self {
        Self { card: config.card_topic().to_string(), inference: config.inference_topic().to_string() }
    }

    /// Decode a publish into a kiosk event; `Ok(None)` for foreign topics
    pub fn decode(
        &self,
        topic: &str,
        payload: &[u8],
        received_at: Instant,
    ) -> Result<Option<KioskEvent>, WorkflowError> {
        if topic == self.card {
            let card_id = parse_card_payload(payload)?;
            Ok(Some(KioskEvent::CardScanned { card_id, received_at }))
        } else if topic == self.inference {
            let deltas = parse_inference_payload(payload)?;
            Ok(Some(KioskEvent::Inference { deltas, received_at }))
        } else {
            Ok(None)
        }
    }
}

/// Start MQTT client and forward decoded events to the workflow dispatcher
pub async fn start_mqtt_client(
    config: &Config,
    event_tx: mpsc::Sender<KioskEvent>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let client_id = format!("kiosk-gateway-{}", config.site_id());
    let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    // Set credentials if configured
    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let topics = KioskTopics::from_config(config);
    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
    client.subscribe(&topics.card, QoS::AtLeastOnce).await?;
    client.subscribe(&topics.inference, QoS::AtLeastOnce).await?;

    info!(
        card_topic = %topics.card,
        inference_topic = %topics.inference,
        host = %config.mqtt_host(),
        port = %config.mqtt_port(),
        "mqtt_subscribed"
    );

    // Rate-limit drop warnings to 1 per second
    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("mqtt_shutdown");
                    return Ok(());
                }
            }
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let received_at = Instant::now();
                        let event = match topics.decode(&publish.topic, &publish.payload, received_at) {
                            Ok(Some(event)) => event,
                            Ok(None) => {
                                debug!(topic = %publish.topic, "mqtt_foreign_topic");
                                continue;
                            }
                            Err(e) => {
                                metrics.record_malformed_input();
                                warn!(topic = %publish.topic, error = %e, "mqtt_payload_rejected");
                                continue;
                            }
                        };

                        debug!(topic = %publish.topic, event = %event.as_str(), "mqtt_event_received");
                        if let Err(e) = event_tx.try_send(event) {
                            match e {
                                TrySendError::Full(_) => {
                                    metrics.record_event_dropped();
                                    if last_drop_warn.elapsed() > Duration::from_secs(1) {
                                        warn!("mqtt_event_dropped: channel full");
                                        last_drop_warn = Instant::now();
                                    }
                                }
                                TrySendError::Closed(_) => {
                                    warn!("event_channel_closed");
                                    return Ok(());
                                }
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "mqtt_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}

/// Card readers publish the id either bare or as a JSON string
pub fn parse_card_payload(payload: &[u8]) -> Result<CardId, WorkflowError> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| WorkflowError::malformed(format!("card payload is not UTF-8: {e}")))?;

    if text.trim_start().starts_with('"') {
        let inner: String = serde_json::from_str(text)
            .map_err(|e| WorkflowError::malformed(format!("card payload: {e}")))?;
        return CardId::parse(&inner);
    }
    CardId::parse(text)
}

/// Inference results are a JSON array of `{"SKU": .., "delta": ..}`
pub fn parse_inference_payload(payload: &[u8]) -> Result<Vec<SkuDelta>, WorkflowError> {
    serde_json::from_slice(payload)
        .map_err(|e| WorkflowError::malformed(format!("inference payload: {e}")))
}
