//! Cancellable one-shot timeout watchdog
//!
//! A watchdog waits for whichever comes first: its timeout, its local token
//! (the expected event arrived) or the global token (the session was torn
//! down). Only a timeout runs the callback. The wait is biased towards the
//! global token so a session abort always wins a simultaneous local cancel.

use crate::domain::{WatchdogKind, WatchdogTokens};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// How a watchdog finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogExit {
    /// The timeout elapsed and the callback ran
    TimedOut,
    /// The expected event arrived in time
    Satisfied,
    /// The whole session was cancelled
    Aborted,
}

/// Spawn a watchdog task
///
/// `on_timeout` is invoked on the watchdog task only when the timeout elapses.
/// It must re-validate the tokens under the session lock before mutating
/// anything, since a cancel may race the timer.
pub fn start_watchdog<F>(
    kind: WatchdogKind,
    timeout: Duration,
    tokens: WatchdogTokens,
    on_timeout: F,
) -> JoinHandle<WatchdogExit>
where
    F: FnOnce() + Send + 'static,
{
    let WatchdogTokens { local, global } = tokens;

    tokio::spawn(async move {
        let exit = tokio::select! {
            biased;
            _ = global.cancelled() => WatchdogExit::Aborted,
            _ = local.cancelled() => WatchdogExit::Satisfied,
            _ = tokio::time::sleep(timeout) => WatchdogExit::TimedOut,
        };

        if exit == WatchdogExit::TimedOut {
            on_timeout();
        }

        debug!(kind = %kind.as_str(), exit = ?exit, "watchdog_exit");
        exit
    })
}
