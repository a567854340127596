//! Kiosk session state
//!
//! The single record of workflow progress. It is owned by the workflow behind
//! one mutex; every method here runs with that mutex held, which is what makes
//! the token checks in [`Session::watchdog_is_current`] sound.

use crate::domain::types::User;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Identifier allocated for every started session (UUIDv7, time ordered)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The three expected-event waits enforced during a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchdogKind {
    DoorOpen,
    DoorClose,
    Inference,
}

impl WatchdogKind {
    pub const ALL: [WatchdogKind; 3] =
        [WatchdogKind::DoorOpen, WatchdogKind::DoorClose, WatchdogKind::Inference];

    pub fn as_str(&self) -> &'static str {
        match self {
            WatchdogKind::DoorOpen => "door_open",
            WatchdogKind::DoorClose => "door_close",
            WatchdogKind::Inference => "inference",
        }
    }

    /// Whether expiry of this wait is an operational fault
    ///
    /// An unopened door after a scan is an abandoned transaction; a door left
    /// open or a missing vision result puts the kiosk into maintenance.
    pub fn escalates_to_maintenance(&self) -> bool {
        !matches!(self, WatchdogKind::DoorOpen)
    }
}

/// Tokens handed to a watchdog when it is armed
#[derive(Debug, Clone)]
pub struct WatchdogTokens {
    pub local: CancellationToken,
    pub global: CancellationToken,
}

/// Cancellation tokens for the outstanding watchdogs
///
/// A cancelled token is never reused: arming a kind always installs a fresh
/// token, and a session teardown replaces the global token.
#[derive(Debug)]
struct SessionTokens {
    global: CancellationToken,
    door_open: CancellationToken,
    door_close: CancellationToken,
    inference: CancellationToken,
}

impl SessionTokens {
    fn new() -> Self {
        Self {
            global: CancellationToken::new(),
            door_open: CancellationToken::new(),
            door_close: CancellationToken::new(),
            inference: CancellationToken::new(),
        }
    }

    fn local_mut(&mut self, kind: WatchdogKind) -> &mut CancellationToken {
        match kind {
            WatchdogKind::DoorOpen => &mut self.door_open,
            WatchdogKind::DoorClose => &mut self.door_close,
            WatchdogKind::Inference => &mut self.inference,
        }
    }
}

/// Shared workflow state of the kiosk
#[derive(Debug)]
pub struct Session {
    pub workflow_active: bool,
    pub maintenance_mode: bool,
    pub current_user: Option<User>,
    pub door_closed: bool,
    pub door_opened_during_session: bool,
    pub door_closed_during_session: bool,
    pub inference_received: bool,
    pub session_id: Option<SessionId>,
    tokens: SessionTokens,
}

impl Session {
    pub fn new() -> Self {
        Self {
            workflow_active: false,
            maintenance_mode: false,
            current_user: None,
            door_closed: true,
            door_opened_during_session: false,
            door_closed_during_session: false,
            inference_received: false,
            session_id: None,
            tokens: SessionTokens::new(),
        }
    }

    /// Begin a transaction for `user`, resetting the per-session latches
    pub fn start(&mut self, user: User) -> SessionId {
        let session_id = SessionId::new();
        self.workflow_active = true;
        self.door_opened_during_session = false;
        self.door_closed_during_session = false;
        self.inference_received = false;
        self.current_user = Some(user);
        self.session_id = Some(session_id);
        session_id
    }

    /// Drop the active user and the per-session latches without touching
    /// maintenance state
    pub fn abandon(&mut self) {
        self.workflow_active = false;
        self.current_user = None;
        self.session_id = None;
        self.door_opened_during_session = false;
        self.door_closed_during_session = false;
        self.inference_received = false;
    }

    /// Arm a watchdog of `kind`, cancelling any outstanding one of the same kind
    pub fn arm(&mut self, kind: WatchdogKind) -> WatchdogTokens {
        let slot = self.tokens.local_mut(kind);
        slot.cancel();
        *slot = CancellationToken::new();
        WatchdogTokens { local: slot.clone(), global: self.tokens.global.clone() }
    }

    /// Signal that the event awaited by `kind` has arrived
    pub fn disarm(&mut self, kind: WatchdogKind) {
        self.tokens.local_mut(kind).cancel();
    }

    /// True if a watchdog holding `tokens` may still act
    pub fn watchdog_is_current(&self, tokens: &WatchdogTokens) -> bool {
        !tokens.local.is_cancelled() && !tokens.global.is_cancelled()
    }

    /// Cancel every outstanding watchdog and install a fresh global token
    pub fn rotate_global(&mut self) {
        self.tokens.global.cancel();
        self.tokens.global = CancellationToken::new();
    }

    /// Tear down the session after an inference result was handled
    pub fn finish(&mut self) {
        self.rotate_global();
        self.abandon();
    }

    /// Return to idle, clearing maintenance mode
    ///
    /// The door state is physical and keeps its last known value.
    pub fn reset(&mut self) {
        self.rotate_global();
        self.abandon();
        self.maintenance_mode = false;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            workflow_active: self.workflow_active,
            maintenance_mode: self.maintenance_mode,
            current_user: self.current_user.clone(),
            door_closed: self.door_closed,
            door_opened_during_session: self.door_opened_during_session,
            door_closed_during_session: self.door_closed_during_session,
            inference_received: self.inference_received,
            session_id: self.session_id,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the session, safe to hold outside the lock
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub workflow_active: bool,
    pub maintenance_mode: bool,
    pub current_user: Option<User>,
    pub door_closed: bool,
    pub door_opened_during_session: bool,
    pub door_closed_during_session: bool,
    pub inference_received: bool,
    pub session_id: Option<SessionId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role_id: i64) -> User {
        User { account_id: 1, person_id: 2, role_id, card_id: "0004277716".to_string() }
    }

    #[test]
    fn test_initial_state() {
        let session = Session::new();
        assert!(session.door_closed);
        assert!(!session.workflow_active);
        assert!(!session.maintenance_mode);
        assert!(session.current_user.is_none());
    }

    #[test]
    fn test_start_resets_latches() {
        let mut session = Session::new();
        session.door_opened_during_session = true;
        session.door_closed_during_session = true;
        session.inference_received = true;

        let id = session.start(user(1));

        assert!(session.workflow_active);
        assert!(!session.door_opened_during_session);
        assert!(!session.door_closed_during_session);
        assert!(!session.inference_received);
        assert_eq!(session.session_id, Some(id));
    }

    #[test]
    fn test_abandon_clears_latches_keeps_maintenance() {
        let mut session = Session::new();
        session.start(user(1));
        session.maintenance_mode = true;
        session.door_opened_during_session = true;
        session.door_closed_during_session = true;
        session.inference_received = true;

        session.abandon();

        assert!(!session.workflow_active);
        assert!(session.session_id.is_none());
        assert!(!session.door_opened_during_session);
        assert!(!session.door_closed_during_session);
        assert!(!session.inference_received);
        assert!(session.maintenance_mode);
    }

    #[test]
    fn test_arm_replaces_token_of_same_kind() {
        let mut session = Session::new();
        let first = session.arm(WatchdogKind::DoorOpen);
        let second = session.arm(WatchdogKind::DoorOpen);

        assert!(first.local.is_cancelled());
        assert!(!second.local.is_cancelled());
        assert!(!session.watchdog_is_current(&first));
        assert!(session.watchdog_is_current(&second));
    }

    #[test]
    fn test_arm_leaves_other_kinds_alone() {
        let mut session = Session::new();
        let open = session.arm(WatchdogKind::DoorOpen);
        let close = session.arm(WatchdogKind::DoorClose);

        session.disarm(WatchdogKind::DoorOpen);

        assert!(!session.watchdog_is_current(&open));
        assert!(session.watchdog_is_current(&close));
    }

    #[test]
    fn test_rotate_global_invalidates_all_watchdogs() {
        let mut session = Session::new();
        let armed: Vec<_> = WatchdogKind::ALL.iter().map(|k| session.arm(*k)).collect();

        session.rotate_global();

        assert!(armed.iter().all(|t| !session.watchdog_is_current(t)));
        let fresh = session.arm(WatchdogKind::Inference);
        assert!(session.watchdog_is_current(&fresh));
    }

    #[test]
    fn test_reset_keeps_door_state() {
        let mut session = Session::new();
        session.start(user(1));
        session.door_closed = false;
        session.maintenance_mode = true;

        session.reset();

        assert!(!session.workflow_active);
        assert!(!session.maintenance_mode);
        assert!(!session.door_closed);
        assert!(session.current_user.is_none());
    }

    #[test]
    fn test_finish_keeps_maintenance() {
        let mut session = Session::new();
        session.start(user(1));
        session.maintenance_mode = true;

        session.finish();

        assert!(!session.workflow_active);
        assert!(session.maintenance_mode);
        assert!(session.session_id.is_none());
    }

    #[test]
    fn test_watchdog_kind_escalation() {
        assert!(!WatchdogKind::DoorOpen.escalates_to_maintenance());
        assert!(WatchdogKind::DoorClose.escalates_to_maintenance());
        assert!(WatchdogKind::Inference.escalates_to_maintenance());
    }
}
