//! REST client for the kiosk's external services
//!
//! One reqwest client serves authentication, the inference heartbeat, the
//! ledger, inventory and the audit log. Every request carries the configured
//! timeout; slow services surface as transport errors.

use crate::domain::{AuditEntry, CardId, Ledger, SkuDelta, User};
use crate::error::CollaboratorError;
use crate::infra::config::Config;
use crate::services::collaborators::{
    AuditLog, AuthService, InferenceHeartbeat, InventoryService, LedgerService,
};
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const AUTH: &str = "authentication";
const HEARTBEAT: &str = "inference_heartbeat";
const LEDGER: &str = "ledger";
const INVENTORY: &str = "inventory";
const AUDIT: &str = "audit_log";

/// HTTP implementation of every collaborator trait
pub struct RestClient {
    client: reqwest::Client,
    auth_url: String,
    heartbeat_url: String,
    ledger_url: String,
    inventory_url: String,
    audit_url: String,
}

impl RestClient {
    pub fn new(config: &Config) -> Result<Self, CollaboratorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.services_timeout_ms()))
            .build()
            .map_err(|e| CollaboratorError::transport("rest_client", e))?;

        Ok(Self {
            client,
            auth_url: trim_base(config.auth_url()),
            heartbeat_url: config.heartbeat_url().to_string(),
            ledger_url: trim_base(config.ledger_url()),
            inventory_url: config.inventory_url().to_string(),
            audit_url: config.audit_url().to_string(),
        })
    }

    /// Send a request and fail on transport errors and non-2xx statuses
    async fn execute(
        &self,
        service: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<Response, CollaboratorError> {
        let start = Instant::now();
        let response =
            request.send().await.map_err(|e| CollaboratorError::transport(service, e))?;
        let status = response.status();

        debug!(
            service = %service,
            status = %status.as_u16(),
            latency_us = %start.elapsed().as_micros(),
            "collaborator_response"
        );

        if !status.is_success() {
            return Err(CollaboratorError::Status { service, status: status.as_u16() });
        }
        Ok(response)
    }
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

async fn decode<T: DeserializeOwned>(
    service: &'static str,
    response: Response,
) -> Result<T, CollaboratorError> {
    let body = response.bytes().await.map_err(|e| CollaboratorError::transport(service, e))?;
    serde_json::from_slice(&body)
        .map_err(|e| CollaboratorError::Decode { service, reason: e.to_string() })
}

#[async_trait]
impl AuthService for RestClient {
    async fn lookup(&self, card_id: &CardId) -> Result<Option<User>, CollaboratorError> {
        let url = format!("{}/{}", self.auth_url, card_id);
        match self.execute(AUTH, self.client.get(&url)).await {
            Ok(response) => decode(AUTH, response).await.map(Some),
            Err(CollaboratorError::Status { status, .. })
                if status == StatusCode::UNAUTHORIZED.as_u16()
                    || status == StatusCode::FORBIDDEN.as_u16()
                    || status == StatusCode::NOT_FOUND.as_u16() =>
            {
                info!(card_id = %card_id, status = %status, "auth_rejected_card");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl InferenceHeartbeat for RestClient {
    async fn probe(&self) -> Result<(), CollaboratorError> {
        self.execute(HEARTBEAT, self.client.get(&self.heartbeat_url)).await.map(|_| ())
    }
}

#[async_trait]
impl LedgerService for RestClient {
    async fn record_purchase(
        &self,
        account_id: i64,
        deltas: &[SkuDelta],
    ) -> Result<Ledger, CollaboratorError> {
        let url = format!("{}/{}", self.ledger_url, account_id);
        let response = self.execute(LEDGER, self.client.post(&url).json(deltas)).await?;
        decode(LEDGER, response).await
    }
}

#[async_trait]
impl InventoryService for RestClient {
    async fn apply_deltas(&self, deltas: &[SkuDelta]) -> Result<(), CollaboratorError> {
        self.execute(INVENTORY, self.client.post(&self.inventory_url).json(deltas)).await.map(|_| ())
    }
}

#[async_trait]
impl AuditLog for RestClient {
    async fn append(&self, entry: &AuditEntry) -> Result<(), CollaboratorError> {
        self.execute(AUDIT, self.client.post(&self.audit_url).json(entry)).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_base() {
        assert_eq!(trim_base("http://svc/authentication/"), "http://svc/authentication");
        assert_eq!(trim_base("http://svc/ledger"), "http://svc/ledger");
    }

    #[test]
    fn test_new_from_default_config() {
        let client = RestClient::new(&Config::default()).unwrap();
        assert_eq!(client.auth_url, "http://localhost:8091/authentication");
        assert_eq!(client.heartbeat_url, "http://localhost:8091/heartbeat");
    }
}
