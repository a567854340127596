//! IO modules - external system interfaces
//!
//! - `mqtt` - MQTT client for card reader and inference events
//! - `http` - HTTP endpoint for board status, operator commands and metrics
//! - `rest` - REST client for authentication, ledger, inventory and audit log

pub mod http;
pub mod mqtt;
pub mod rest;

// Re-export commonly used types
pub use http::{start_http_server, HttpState};
pub use mqtt::{start_mqtt_client, KioskTopics};
pub use rest::RestClient;
