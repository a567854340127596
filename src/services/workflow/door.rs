//! Door state monitoring
//!
//! Board status reports arrive over HTTP. Only a change of the door bit drives
//! the session; temperature alarms force maintenance on every report.

use super::VendingWorkflow;
use crate::domain::{BoardStatus, WatchdogKind};
use tracing::{debug, info, warn};

/// Door transition applied by a board status report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorTransition {
    /// No door bit, or the same state as last reported
    Unchanged,
    /// Door changed while no session was active
    RecordedIdle { closed: bool },
    /// Door opened during a session; close wait armed
    Opened,
    /// Door closed during a session; inference wait armed
    Closed,
}

/// Result of applying one board status report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardStatusOutcome {
    pub transition: DoorTransition,
    pub temperature_alarm: bool,
}

impl std::fmt::Display for BoardStatusOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.transition {
            DoorTransition::Unchanged => f.write_str("no door state change")?,
            DoorTransition::RecordedIdle { closed: true } => {
                f.write_str("door closed recorded, no active session")?
            }
            DoorTransition::RecordedIdle { closed: false } => {
                f.write_str("door opened recorded, no active session")?
            }
            DoorTransition::Opened => f.write_str("door opened, waiting for door close")?,
            DoorTransition::Closed => f.write_str("door closed, waiting for inference")?,
        }
        if self.temperature_alarm {
            f.write_str("; temperature out of range, maintenance mode set")?;
        }
        Ok(())
    }
}

impl VendingWorkflow {
    /// Apply a controller board status report
    pub fn handle_board_status(&self, status: &BoardStatus) -> BoardStatusOutcome {
        self.metrics.record_board_status();
        let temperature_alarm = status.temperature_alarm();

        let mut session = self.session.lock();

        if temperature_alarm {
            warn!(
                temperature = ?status.temperature,
                min_alarm = ?status.min_temperature_status,
                max_alarm = ?status.max_temperature_status,
                "temperature_excursion"
            );
            self.enter_maintenance(&mut session, "temperature");
        }

        let transition = match status.door_closed {
            Some(closed) if closed != session.door_closed => {
                session.door_closed = closed;

                if !session.workflow_active {
                    DoorTransition::RecordedIdle { closed }
                } else if !closed {
                    session.door_opened_during_session = true;
                    session.disarm(WatchdogKind::DoorOpen);
                    self.arm_watchdog(&mut session, WatchdogKind::DoorClose);
                    DoorTransition::Opened
                } else {
                    session.door_closed_during_session = true;
                    session.disarm(WatchdogKind::DoorClose);
                    self.arm_watchdog(&mut session, WatchdogKind::Inference);
                    DoorTransition::Closed
                }
            }
            _ => DoorTransition::Unchanged,
        };

        let session_id = session.session_id;
        drop(session);

        match transition {
            DoorTransition::Unchanged => debug!(
                lock1 = ?status.lock1_status,
                lock2 = ?status.lock2_status,
                temperature = ?status.temperature,
                humidity = ?status.humidity,
                "board_status"
            ),
            other => info!(
                transition = ?other,
                session_id = ?session_id,
                temperature = ?status.temperature,
                "door_state_change"
            ),
        }

        BoardStatusOutcome { transition, temperature_alarm }
    }
}
