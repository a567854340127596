//! Vending workflow state machine
//!
//! The workflow owns the kiosk [`Session`] and reacts to three event sources:
//! - card scans (`card`) start or abort a session
//! - board status reports (`door`) drive the open -> close sequence
//! - inference results (`inference`) settle and end the session
//!
//! Between transitions a watchdog enforces the maximum wait for the next
//! expected event. Session mutations all happen under one mutex and never
//! across an `.await`; collaborator calls run outside the lock.

mod card;
mod door;
mod inference;
mod reset;

pub use card::ScanOutcome;
pub use door::{BoardStatusOutcome, DoorTransition};
pub use inference::InferenceOutcome;

use crate::domain::{KioskEvent, Session, SessionSnapshot, WatchdogKind, WatchdogTokens};
use crate::error::{WorkflowError, WorkflowResult};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::services::collaborators::Collaborators;
use crate::services::watchdog::{start_watchdog, WatchdogExit};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Maximum waits between session transitions
#[derive(Debug, Clone, Copy)]
pub struct WorkflowTimeouts {
    pub door_open: Duration,
    pub door_close: Duration,
    pub inference: Duration,
}

impl WorkflowTimeouts {
    pub fn from_config(config: &Config) -> Self {
        Self {
            door_open: config.door_open_timeout(),
            door_close: config.door_close_timeout(),
            inference: config.inference_timeout(),
        }
    }

    fn for_kind(&self, kind: WatchdogKind) -> Duration {
        match kind {
            WatchdogKind::DoorOpen => self.door_open,
            WatchdogKind::DoorClose => self.door_close,
            WatchdogKind::Inference => self.inference,
        }
    }
}

/// Central coordinator of the kiosk transaction
pub struct VendingWorkflow {
    /// Shared session state, also touched by watchdog tasks
    pub(crate) session: Arc<Mutex<Session>>,
    /// External services (auth, ledger, board, ...)
    pub(crate) collaborators: Collaborators,
    pub(crate) timeouts: WorkflowTimeouts,
    pub(crate) metrics: Arc<Metrics>,
}

impl VendingWorkflow {
    pub fn new(config: &Config, collaborators: Collaborators, metrics: Arc<Metrics>) -> Self {
        Self {
            session: Arc::new(Mutex::new(Session::new())),
            collaborators,
            timeouts: WorkflowTimeouts::from_config(config),
            metrics,
        }
    }

    /// Copy of the current session state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.lock().snapshot()
    }

    pub fn maintenance_mode(&self) -> bool {
        self.session.lock().maintenance_mode
    }

    /// Consume kiosk events until the channel closes or shutdown is signalled
    ///
    /// Events are handled one at a time. A failing event is logged and the
    /// loop moves on to the next one.
    pub async fn run(
        &self,
        mut event_rx: mpsc::Receiver<KioskEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("workflow_dispatcher_started");

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    match event {
                        Some(event) => {
                            let _ = self.process_event(event).await;
                        }
                        None => break,
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        // Outstanding watchdogs must not fire into a stopped process
        self.session.lock().rotate_global();
        info!("workflow_dispatcher_stopped");
    }

    /// Handle a single event, logging and counting any failure
    pub async fn process_event(&self, event: KioskEvent) -> WorkflowResult<()> {
        let process_start = Instant::now();
        let event_type = event.as_str();
        let queue_delay_us = event.received_at().elapsed().as_micros() as u64;

        let result = match event {
            KioskEvent::CardScanned { card_id, .. } => {
                self.handle_card_scan(&card_id).await.map(|outcome| {
                    debug!(card_id = %card_id, outcome = ?outcome, "card_scan_handled");
                })
            }
            KioskEvent::Inference { deltas, .. } => {
                self.handle_inference(&deltas).await.map(|_| ())
            }
        };

        if let Err(ref e) = result {
            self.record_failure(e);
            warn!(event = %event_type, error = %e, "event_handling_failed");
        }

        let latency_us = process_start.elapsed().as_micros() as u64;
        self.metrics.record_event_processed(latency_us);
        debug!(
            event = %event_type,
            queue_delay_us = %queue_delay_us,
            latency_us = %latency_us,
            "event_processed"
        );

        result
    }

    fn record_failure(&self, error: &WorkflowError) {
        match error {
            WorkflowError::MalformedInput(_) => self.metrics.record_malformed_input(),
            e if e.is_collaborator_failure() => self.metrics.record_collaborator_failure(),
            _ => {}
        }
    }

    /// Arm the watchdog of `kind` for the session held in `session`
    ///
    /// Must be called with the session lock held so the token swap and the
    /// state change it guards are observed together.
    pub(crate) fn arm_watchdog(
        &self,
        session: &mut Session,
        kind: WatchdogKind,
    ) -> JoinHandle<WatchdogExit> {
        let tokens = session.arm(kind);
        let timeout = self.timeouts.for_kind(kind);
        let state = self.session.clone();
        let metrics = self.metrics.clone();
        let held = tokens.clone();

        debug!(
            kind = %kind.as_str(),
            timeout_ms = %timeout.as_millis(),
            session_id = ?session.session_id,
            "watchdog_armed"
        );

        start_watchdog(kind, timeout, tokens, move || expire(&state, &metrics, kind, &held))
    }

    /// Show rows on the kiosk LCD; display failures never block the workflow
    pub(crate) async fn show(&self, rows: &[&str]) {
        if let Err(e) = self.collaborators.board.display(rows).await {
            self.metrics.record_collaborator_failure();
            warn!(rows = ?rows, error = %e, "board_display_failed");
        }
    }

    /// Put the kiosk into maintenance mode
    pub(crate) fn enter_maintenance(&self, session: &mut Session, reason: &'static str) {
        if !session.maintenance_mode {
            self.metrics.record_maintenance_entered();
            warn!(reason = %reason, "maintenance_mode_entered");
        }
        session.maintenance_mode = true;
    }
}

/// Timeout callback shared by all watchdog kinds
fn expire(state: &Mutex<Session>, metrics: &Metrics, kind: WatchdogKind, tokens: &WatchdogTokens) {
    let mut session = state.lock();

    // The expected event or a teardown may have won the race for the lock
    if !session.watchdog_is_current(tokens) {
        debug!(kind = %kind.as_str(), "watchdog_expired_stale");
        return;
    }

    let session_id = session.session_id;
    // Watchdogs of other kinds belong to the aborted session too
    session.rotate_global();
    session.abandon();
    metrics.record_watchdog_timeout(kind);

    if kind.escalates_to_maintenance() {
        if !session.maintenance_mode {
            metrics.record_maintenance_entered();
        }
        session.maintenance_mode = true;
    }

    warn!(
        kind = %kind.as_str(),
        session_id = ?session_id,
        maintenance_mode = %session.maintenance_mode,
        "watchdog_timeout"
    );
}
