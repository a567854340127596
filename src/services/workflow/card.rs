//! Card access verification

use super::VendingWorkflow;
use crate::domain::{CardId, Role, SessionId, User, WatchdogKind};
use crate::error::{WorkflowError, WorkflowResult};
use tracing::{info, warn};

/// What a card scan did to the workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Cabinet unlocked and the door-open wait started
    SessionStarted(SessionId),
    /// A session is already running; nothing changed
    Ignored,
    /// Customer or stocker card while the kiosk is in maintenance
    OutOfOrder,
    /// Maintainer card: any session aborted, cabinet locked, maintenance cleared
    MaintenanceReset,
    /// Card holder has a role the kiosk does not know
    UnrecognizedRole(i64),
}

impl VendingWorkflow {
    /// Verify a scanned card and act on the holder's role
    ///
    /// While a session is active only a maintainer card has any effect.
    pub async fn handle_card_scan(&self, card_id: &CardId) -> WorkflowResult<ScanOutcome> {
        self.metrics.record_card_scan();

        let (active, maintenance) = {
            let session = self.session.lock();
            (session.workflow_active, session.maintenance_mode)
        };

        if !active && !maintenance {
            if let Err(e) = self.collaborators.heartbeat.probe().await {
                self.metrics.record_collaborator_failure();
                warn!(error = %e, "inference_heartbeat_unreachable");
                let mut session = self.session.lock();
                self.enter_maintenance(&mut session, "inference_heartbeat");
            }
        }

        let user = match self.collaborators.auth.lookup(card_id).await {
            Ok(Some(user)) => user,
            Ok(None) if active => {
                info!(card_id = %card_id, "card_scan_ignored_session_active");
                return Ok(ScanOutcome::Ignored);
            }
            Ok(None) => {
                info!(card_id = %card_id, "card_unauthorized");
                self.show(&["Unauthorized"]).await;
                return Err(WorkflowError::Unauthorized(card_id.to_string()));
            }
            Err(e) => return Err(WorkflowError::Auth(e)),
        };

        let role = user.role();
        info!(
            card_id = %card_id,
            account_id = %user.account_id,
            role = %role.as_str(),
            session_active = %active,
            "card_verified"
        );

        if active && role != Role::Maintainer {
            info!(card_id = %card_id, "card_scan_ignored_session_active");
            return Ok(ScanOutcome::Ignored);
        }

        match role {
            Role::Customer | Role::Stocker => self.begin_transaction(card_id, user).await,
            Role::Maintainer => self.enter_service_mode(card_id).await,
            Role::Unrecognized(role_id) => {
                warn!(card_id = %card_id, role_id = %role_id, "card_role_unrecognized");
                self.show(&["Unauthorized"]).await;
                Ok(ScanOutcome::UnrecognizedRole(role_id))
            }
        }
    }

    async fn begin_transaction(&self, card_id: &CardId, user: User) -> WorkflowResult<ScanOutcome> {
        if self.session.lock().maintenance_mode {
            info!(card_id = %card_id, "card_scan_rejected_out_of_order");
            self.show(&["Out of Order"]).await;
            return Ok(ScanOutcome::OutOfOrder);
        }

        self.show(&["Hello", card_id.as_str()]).await;
        self.collaborators.board.unlock().await.map_err(WorkflowError::Board)?;

        let mut session = self.session.lock();
        if session.workflow_active {
            // Another scan won while the unlock was in flight
            return Ok(ScanOutcome::Ignored);
        }
        let session_id = session.start(user);
        self.arm_watchdog(&mut session, WatchdogKind::DoorOpen);
        drop(session);

        self.metrics.record_session_started();
        info!(session_id = %session_id, card_id = %card_id, "session_started");
        Ok(ScanOutcome::SessionStarted(session_id))
    }

    async fn enter_service_mode(&self, card_id: &CardId) -> WorkflowResult<ScanOutcome> {
        self.reset_session("maintainer_card");
        info!(card_id = %card_id, "maintainer_card_accepted");

        self.collaborators.board.lock().await.map_err(WorkflowError::Board)?;
        self.show(&["Maintenance Mode"]).await;
        Ok(ScanOutcome::MaintenanceReset)
    }
}
