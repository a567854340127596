//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only; never use them for workflow decisions.

use crate::domain::WatchdogKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Kiosk events handled by the dispatcher (monotonic)
    events_total: AtomicU64,
    /// Events since last report (reset on report)
    events_since_report: AtomicU64,
    /// Sum of handler latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max handler latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Events dropped because the dispatcher queue was full
    events_dropped: AtomicU64,
    /// Payloads rejected as malformed
    malformed_inputs: AtomicU64,
    card_scans: AtomicU64,
    sessions_started: AtomicU64,
    sessions_completed: AtomicU64,
    door_open_timeouts: AtomicU64,
    door_close_timeouts: AtomicU64,
    inference_timeouts: AtomicU64,
    maintenance_entries: AtomicU64,
    resets: AtomicU64,
    board_status_reports: AtomicU64,
    collaborator_failures: AtomicU64,
    /// Last report time for rate calculation
    last_report: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            events_total: AtomicU64::new(0),
            events_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            malformed_inputs: AtomicU64::new(0),
            card_scans: AtomicU64::new(0),
            sessions_started: AtomicU64::new(0),
            sessions_completed: AtomicU64::new(0),
            door_open_timeouts: AtomicU64::new(0),
            door_close_timeouts: AtomicU64::new(0),
            inference_timeouts: AtomicU64::new(0),
            maintenance_entries: AtomicU64::new(0),
            resets: AtomicU64::new(0),
            board_status_reports: AtomicU64::new(0),
            collaborator_failures: AtomicU64::new(0),
            last_report: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_event_processed(&self, latency_us: u64) {
        self.events_total.fetch_add(1, Ordering::Relaxed);
        self.events_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_malformed_input(&self) {
        self.malformed_inputs.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_card_scan(&self) {
        self.card_scans.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_session_completed(&self) {
        self.sessions_completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_watchdog_timeout(&self, kind: WatchdogKind) {
        let counter = match kind {
            WatchdogKind::DoorOpen => &self.door_open_timeouts,
            WatchdogKind::DoorClose => &self.door_close_timeouts,
            WatchdogKind::Inference => &self.inference_timeouts,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_maintenance_entered(&self) {
        self.maintenance_entries.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_reset(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_board_status(&self) {
        self.board_status_reports.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_collaborator_failure(&self) {
        self.collaborator_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot; per-interval latency counters are reset
    pub fn report(&self) -> MetricsSummary {
        let now = Instant::now();
        let elapsed_secs = {
            let mut last = self.last_report.lock();
            let elapsed = now.duration_since(*last).as_secs_f64();
            *last = now;
            elapsed
        };

        let events_interval = self.events_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let latency_max = self.latency_max_us.swap(0, Ordering::Relaxed);

        let avg_latency_us = if events_interval > 0 { latency_sum / events_interval } else { 0 };
        let events_per_sec =
            if elapsed_secs > 0.0 { events_interval as f64 / elapsed_secs } else { 0.0 };

        MetricsSummary {
            events_total: self.events_total.load(Ordering::Relaxed),
            events_per_sec,
            avg_latency_us,
            max_latency_us: latency_max,
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            malformed_inputs: self.malformed_inputs.load(Ordering::Relaxed),
            card_scans: self.card_scans.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_completed: self.sessions_completed.load(Ordering::Relaxed),
            door_open_timeouts: self.door_open_timeouts.load(Ordering::Relaxed),
            door_close_timeouts: self.door_close_timeouts.load(Ordering::Relaxed),
            inference_timeouts: self.inference_timeouts.load(Ordering::Relaxed),
            maintenance_entries: self.maintenance_entries.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
            board_status_reports: self.board_status_reports.load(Ordering::Relaxed),
            collaborator_failures: self.collaborator_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics for reporting
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub events_total: u64,
    pub events_per_sec: f64,
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
    pub events_dropped: u64,
    pub malformed_inputs: u64,
    pub card_scans: u64,
    pub sessions_started: u64,
    pub sessions_completed: u64,
    pub door_open_timeouts: u64,
    pub door_close_timeouts: u64,
    pub inference_timeouts: u64,
    pub maintenance_entries: u64,
    pub resets: u64,
    pub board_status_reports: u64,
    pub collaborator_failures: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            events_total = %self.events_total,
            events_per_sec = %format!("{:.2}", self.events_per_sec),
            avg_latency_us = %self.avg_latency_us,
            max_latency_us = %self.max_latency_us,
            events_dropped = %self.events_dropped,
            malformed_inputs = %self.malformed_inputs,
            card_scans = %self.card_scans,
            sessions_started = %self.sessions_started,
            sessions_completed = %self.sessions_completed,
            door_open_timeouts = %self.door_open_timeouts,
            door_close_timeouts = %self.door_close_timeouts,
            inference_timeouts = %self.inference_timeouts,
            maintenance_entries = %self.maintenance_entries,
            resets = %self.resets,
            collaborator_failures = %self.collaborator_failures,
            "metrics"
        );
    }
}
