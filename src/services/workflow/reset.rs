//! Maintenance reset

use super::VendingWorkflow;
use crate::error::{WorkflowError, WorkflowResult};
use tracing::info;

impl VendingWorkflow {
    /// Cancel every watchdog and return the session to idle
    ///
    /// Idempotent; also clears maintenance mode.
    pub(crate) fn reset_session(&self, reason: &'static str) {
        let mut session = self.session.lock();
        let was_active = session.workflow_active;
        let was_maintenance = session.maintenance_mode;
        let session_id = session.session_id;

        session.reset();
        drop(session);

        self.metrics.record_reset();
        info!(
            reason = %reason,
            session_id = ?session_id,
            was_active = %was_active,
            was_maintenance = %was_maintenance,
            "session_reset"
        );
    }

    /// Operator reset: return to idle and re-lock the cabinet
    ///
    /// The reset stands even if the lock command fails.
    pub async fn reset_door_lock(&self) -> WorkflowResult<()> {
        self.reset_session("operator");
        self.collaborators.board.lock().await.map_err(WorkflowError::Board)
    }
}
