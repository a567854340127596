//! Error types for the kiosk workflow and its collaborators

use thiserror::Error;

/// Failure talking to an external collaborator (auth, ledger, board, ...)
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} returned HTTP {status}")]
    Status { service: &'static str, status: u16 },

    #[error("{service} response could not be decoded: {reason}")]
    Decode { service: &'static str, reason: String },

    #[error("{service} unavailable: {reason}")]
    Unavailable { service: &'static str, reason: String },
}

impl CollaboratorError {
    pub fn transport(service: &'static str, source: reqwest::Error) -> Self {
        Self::Transport { service, source }
    }

    pub fn unavailable(service: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable { service, reason: reason.into() }
    }

    /// Name of the collaborator that failed
    pub fn service(&self) -> &'static str {
        match self {
            Self::Transport { service, .. }
            | Self::Status { service, .. }
            | Self::Decode { service, .. }
            | Self::Unavailable { service, .. } => service,
        }
    }
}

/// Errors surfaced by the workflow handlers to the event dispatcher
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("card {0} is not authorized")]
    Unauthorized(String),

    #[error("authentication lookup failed: {0}")]
    Auth(#[source] CollaboratorError),

    #[error("controller board command failed: {0}")]
    Board(#[source] CollaboratorError),

    #[error("ledger update failed: {0}")]
    Ledger(#[source] CollaboratorError),

    #[error("inventory update failed: {0}")]
    Inventory(#[source] CollaboratorError),

    #[error("audit log append failed: {0}")]
    AuditLog(#[source] CollaboratorError),
}

impl WorkflowError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedInput(msg.into())
    }

    /// True when the error came from a downstream collaborator call
    pub fn is_collaborator_failure(&self) -> bool {
        !matches!(self, Self::MalformedInput(_) | Self::Unauthorized(_))
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
