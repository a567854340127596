//! Seams to the kiosk's external services
//!
//! The workflow only talks to these traits. `io::rest::RestClient` implements
//! all of them over HTTP; tests substitute in-memory fakes.

use crate::domain::{AuditEntry, CardId, Ledger, SkuDelta, User};
use crate::error::CollaboratorError;
use crate::services::board::ControllerBoard;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait AuthService: Send + Sync {
    /// Resolve a card to its holder; `Ok(None)` when the card is not authorized
    async fn lookup(&self, card_id: &CardId) -> Result<Option<User>, CollaboratorError>;
}

#[async_trait]
pub trait InferenceHeartbeat: Send + Sync {
    /// Succeeds when the vision system is reachable
    async fn probe(&self) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait LedgerService: Send + Sync {
    async fn record_purchase(
        &self,
        account_id: i64,
        deltas: &[SkuDelta],
    ) -> Result<Ledger, CollaboratorError>;
}

#[async_trait]
pub trait InventoryService: Send + Sync {
    async fn apply_deltas(&self, deltas: &[SkuDelta]) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> Result<(), CollaboratorError>;
}

/// Every collaborator the workflow needs
#[derive(Clone)]
pub struct Collaborators {
    pub auth: Arc<dyn AuthService>,
    pub heartbeat: Arc<dyn InferenceHeartbeat>,
    pub ledger: Arc<dyn LedgerService>,
    pub inventory: Arc<dyn InventoryService>,
    pub audit_log: Arc<dyn AuditLog>,
    pub board: Arc<dyn ControllerBoard>,
}

impl Collaborators {
    /// Wire one implementation of all REST services together with a board
    pub fn from_rest<T>(services: Arc<T>, board: Arc<dyn ControllerBoard>) -> Self
    where
        T: AuthService + InferenceHeartbeat + LedgerService + InventoryService + AuditLog + 'static,
    {
        Self {
            auth: services.clone(),
            heartbeat: services.clone(),
            ledger: services.clone(),
            inventory: services.clone(),
            audit_log: services,
            board,
        }
    }
}
