//! Configuration loading from TOML files
//!
//! The config file is selected with `--config <path>` (default
//! `config/kiosk.toml`). A missing or unparsable file falls back to defaults.

use anyhow::Context;
use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardMode {
    /// Commands are POSTed to the controller board's HTTP bridge
    Http,
    /// Commands are logged only (bench and simulation setups)
    Virtual,
}

impl BoardMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoardMode::Http => "http",
            BoardMode::Virtual => "virtual",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "kiosk".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { port: default_http_port() }
    }
}

fn default_http_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_card_topic")]
    pub card_topic: String,
    #[serde(default = "default_inference_topic")]
    pub inference_topic: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_event_queue_size")]
    pub event_queue_size: usize,
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_card_topic() -> String {
    "kiosk/card".to_string()
}

fn default_inference_topic() -> String {
    "kiosk/inference".to_string()
}

fn default_event_queue_size() -> usize {
    256
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoardConfig {
    pub mode: BoardMode,
    #[serde(default = "default_board_url")]
    pub url: String,
    #[serde(default = "default_board_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            mode: BoardMode::Virtual,
            url: default_board_url(),
            timeout_ms: default_board_timeout_ms(),
        }
    }
}

fn default_board_url() -> String {
    "http://localhost:8090/board".to_string()
}

fn default_board_timeout_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServicesConfig {
    pub auth_url: String,
    pub heartbeat_url: String,
    pub ledger_url: String,
    pub inventory_url: String,
    pub audit_url: String,
    #[serde(default = "default_services_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_services_timeout_ms() -> u64 {
    3000
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_door_open", deserialize_with = "deserialize_duration")]
    pub door_open: Duration,
    #[serde(default = "default_door_close", deserialize_with = "deserialize_duration")]
    pub door_close: Duration,
    #[serde(default = "default_inference", deserialize_with = "deserialize_duration")]
    pub inference: Duration,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            door_open: default_door_open(),
            door_close: default_door_close(),
            inference: default_inference(),
        }
    }
}

fn default_door_open() -> Duration {
    Duration::from_secs(10)
}

fn default_door_close() -> Duration {
    Duration::from_secs(60)
}

fn default_inference() -> Duration {
    Duration::from_secs(30)
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    60
}

/// Parse a duration such as `"5s"`, `"250ms"`, `"2m"` or `"1h"`
///
/// A bare number is taken as milliseconds.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let split = raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let value: u64 = digits.parse().map_err(|_| format!("invalid duration {raw:?}"))?;

    match unit.trim() {
        "" | "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => scaled_secs(value, 60, raw),
        "h" => scaled_secs(value, 3600, raw),
        other => Err(format!("unknown duration unit {other:?} in {raw:?}")),
    }
}

fn scaled_secs(value: u64, factor: u64, raw: &str) -> Result<Duration, String> {
    value
        .checked_mul(factor)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration {raw:?} is out of range"))
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct DurationVisitor;

    impl<'de> Visitor<'de> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a duration string like \"5s\" or integer milliseconds")
        }

        fn visit_str<E>(self, value: &str) -> Result<Duration, E>
        where
            E: de::Error,
        {
            parse_duration(value).map_err(E::custom)
        }

        fn visit_u64<E>(self, value: u64) -> Result<Duration, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_millis(value))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Duration, E>
        where
            E: de::Error,
        {
            u64::try_from(value)
                .map(Duration::from_millis)
                .map_err(|_| E::custom("duration must not be negative"))
        }
    }

    deserializer.deserialize_any(DurationVisitor)
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub board: BoardConfig,
    pub services: ServicesConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    http_port: u16,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    card_topic: String,
    inference_topic: String,
    event_queue_size: usize,
    board_mode: BoardMode,
    board_url: String,
    board_timeout_ms: u64,
    auth_url: String,
    heartbeat_url: String,
    ledger_url: String,
    inventory_url: String,
    audit_url: String,
    services_timeout_ms: u64,
    door_open_timeout: Duration,
    door_close_timeout: Duration,
    inference_timeout: Duration,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: default_site_id(),
            http_port: default_http_port(),
            mqtt_host: "localhost".to_string(),
            mqtt_port: default_mqtt_port(),
            mqtt_username: None,
            mqtt_password: None,
            card_topic: default_card_topic(),
            inference_topic: default_inference_topic(),
            event_queue_size: default_event_queue_size(),
            board_mode: BoardMode::Virtual,
            board_url: default_board_url(),
            board_timeout_ms: default_board_timeout_ms(),
            auth_url: "http://localhost:8091/authentication".to_string(),
            heartbeat_url: "http://localhost:8091/heartbeat".to_string(),
            ledger_url: "http://localhost:8091/ledger".to_string(),
            inventory_url: "http://localhost:8091/inventory".to_string(),
            audit_url: "http://localhost:8091/auditlog".to_string(),
            services_timeout_ms: default_services_timeout_ms(),
            door_open_timeout: default_door_open(),
            door_close_timeout: default_door_close(),
            inference_timeout: default_inference(),
            metrics_interval_secs: default_metrics_interval(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            site_id: toml_config.site.id,
            http_port: toml_config.http.port,
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            card_topic: toml_config.mqtt.card_topic,
            inference_topic: toml_config.mqtt.inference_topic,
            event_queue_size: toml_config.mqtt.event_queue_size.max(1),
            board_mode: toml_config.board.mode,
            board_url: toml_config.board.url,
            board_timeout_ms: toml_config.board.timeout_ms,
            auth_url: toml_config.services.auth_url,
            heartbeat_url: toml_config.services.heartbeat_url,
            ledger_url: toml_config.services.ledger_url,
            inventory_url: toml_config.services.inventory_url,
            audit_url: toml_config.services.audit_url,
            services_timeout_ms: toml_config.services.timeout_ms,
            door_open_timeout: toml_config.timeouts.door_open,
            door_close_timeout: toml_config.timeouts.door_close,
            inference_timeout: toml_config.timeouts.inference,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries the TOML file first, falls back to defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn card_topic(&self) -> &str {
        &self.card_topic
    }

    pub fn inference_topic(&self) -> &str {
        &self.inference_topic
    }

    pub fn event_queue_size(&self) -> usize {
        self.event_queue_size
    }

    pub fn board_mode(&self) -> BoardMode {
        self.board_mode
    }

    pub fn board_url(&self) -> &str {
        &self.board_url
    }

    pub fn board_timeout_ms(&self) -> u64 {
        self.board_timeout_ms
    }

    pub fn auth_url(&self) -> &str {
        &self.auth_url
    }

    pub fn heartbeat_url(&self) -> &str {
        &self.heartbeat_url
    }

    pub fn ledger_url(&self) -> &str {
        &self.ledger_url
    }

    pub fn inventory_url(&self) -> &str {
        &self.inventory_url
    }

    pub fn audit_url(&self) -> &str {
        &self.audit_url
    }

    pub fn services_timeout_ms(&self) -> u64 {
        self.services_timeout_ms
    }

    pub fn door_open_timeout(&self) -> Duration {
        self.door_open_timeout
    }

    pub fn door_close_timeout(&self) -> Duration {
        self.door_close_timeout
    }

    pub fn inference_timeout(&self) -> Duration {
        self.inference_timeout
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder for tests that need short watchdog windows
    pub fn with_timeouts(mut self, door_open: Duration, door_close: Duration, inference: Duration) -> Self {
        self.door_open_timeout = door_open;
        self.door_close_timeout = door_close;
        self.inference_timeout = inference;
        self
    }

    /// Builder for tests that point collaborators at a mock server
    pub fn with_service_base(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.auth_url = format!("{base}/authentication");
        self.heartbeat_url = format!("{base}/heartbeat");
        self.ledger_url = format!("{base}/ledger");
        self.inventory_url = format!("{base}/inventory");
        self.audit_url = format!("{base}/auditlog");
        self
    }

    pub fn with_services_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.services_timeout_ms = timeout_ms;
        self
    }

    /// Builder for tests that drive the HTTP controller board
    pub fn with_board(mut self, mode: BoardMode, url: &str) -> Self {
        self.board_mode = mode;
        self.board_url = url.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.mqtt_host(), "localhost");
        assert_eq!(config.mqtt_port(), 1883);
        assert_eq!(config.card_topic(), "kiosk/card");
        assert_eq!(config.inference_topic(), "kiosk/inference");
        assert_eq!(config.board_mode(), BoardMode::Virtual);
        assert_eq!(config.services_timeout_ms(), 3000);
        assert_eq!(config.door_open_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("5s"), Ok(Duration::from_secs(5)));
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_duration("1500"), Ok(Duration::from_millis(1500)));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("5 parsecs").is_err());
        assert!(parse_duration(&format!("{}m", u64::MAX)).is_err());
        assert!(parse_duration(&format!("{}h", u64::MAX / 60)).is_err());
    }

    #[test]
    fn test_timeouts_accept_strings_and_integers() {
        let timeouts: TimeoutsConfig =
            toml::from_str("door_open = \"5s\"\ndoor_close = 45000\n").unwrap();
        assert_eq!(timeouts.door_open, Duration::from_secs(5));
        assert_eq!(timeouts.door_close, Duration::from_secs(45));
        assert_eq!(timeouts.inference, Duration::from_secs(30));
    }

    #[test]
    fn test_with_service_base() {
        let config = Config::default().with_service_base("http://127.0.0.1:9999/");
        assert_eq!(config.auth_url(), "http://127.0.0.1:9999/authentication");
        assert_eq!(config.audit_url(), "http://127.0.0.1:9999/auditlog");
    }
}
