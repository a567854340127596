//! Inference result processing

use super::VendingWorkflow;
use crate::domain::{AuditEntry, Ledger, SessionId, SkuDelta, WatchdogKind};
use crate::error::{WorkflowError, WorkflowResult};
use chrono::Utc;
use tracing::{info, warn};

/// Outcome of a fully settled inference result
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceOutcome {
    pub session_id: Option<SessionId>,
    /// Updated ledger, present when the holder was billed
    pub ledger: Option<Ledger>,
}

impl VendingWorkflow {
    /// Settle a vision result and end the session
    ///
    /// Ledger, inventory and audit log are each attempted even when an earlier
    /// one fails; the first failure is returned after the session is torn down.
    pub async fn handle_inference(&self, deltas: &[SkuDelta]) -> WorkflowResult<InferenceOutcome> {
        let (user, session_id) = {
            let mut session = self.session.lock();
            session.disarm(WatchdogKind::Inference);
            session.inference_received = true;
            (session.current_user.clone(), session.session_id)
        };

        info!(
            session_id = ?session_id,
            items = %deltas.len(),
            has_user = %user.is_some(),
            "inference_received"
        );

        let mut first_error: Option<WorkflowError> = None;
        let mut ledger = None;

        if let Some(ref user) = user {
            if user.role().is_billable() {
                match self.collaborators.ledger.record_purchase(user.account_id, deltas).await {
                    Ok(updated) => {
                        let rows = updated.display_rows();
                        self.show(&[rows[0].as_str(), rows[1].as_str()]).await;
                        ledger = Some(updated);
                    }
                    Err(e) => {
                        warn!(session_id = ?session_id, error = %e, "ledger_update_failed");
                        first_error.get_or_insert(WorkflowError::Ledger(e));
                    }
                }
            }
        }

        if let Err(e) = self.collaborators.inventory.apply_deltas(deltas).await {
            warn!(session_id = ?session_id, error = %e, "inventory_update_failed");
            first_error.get_or_insert(WorkflowError::Inventory(e));
        }

        let entry = AuditEntry::new(user.as_ref(), deltas.to_vec(), Utc::now());
        if let Err(e) = self.collaborators.audit_log.append(&entry).await {
            warn!(session_id = ?session_id, error = %e, "audit_log_append_failed");
            first_error.get_or_insert(WorkflowError::AuditLog(e));
        }

        {
            let mut session = self.session.lock();
            // A reset during the collaborator calls already tore this session down
            if session.session_id == session_id {
                session.finish();
            }
        }

        if user.is_some() {
            self.metrics.record_session_completed();
        }
        info!(
            session_id = ?session_id,
            billed = %ledger.is_some(),
            failed = %first_error.is_some(),
            "session_completed"
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(InferenceOutcome { session_id, ledger }),
        }
    }
}
