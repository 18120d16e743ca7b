use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Thread-safe counters for the order lifecycle engine.
#[derive(Debug)]
pub struct EngineMetrics {
    // Stream side
    events_received: AtomicU64,
    parse_errors: AtomicU64,
    stream_errors: AtomicU64,
    reconcile_runs: AtomicU64,

    // Transitions
    transitions_applied: AtomicU64,
    stale_rejected: AtomicU64,

    // Callbacks
    callbacks_done: AtomicU64,
    callbacks_failed: AtomicU64,

    // Workers
    worker_starts: AtomicU64,
    worker_restarts: AtomicU64,

    // Timestamps
    inner: RwLock<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    start_time: Instant,
    last_event_time: Option<Instant>,
    last_error_time: Option<Instant>,
    last_stream_error_time: Option<Instant>,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            events_received: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            stream_errors: AtomicU64::new(0),
            reconcile_runs: AtomicU64::new(0),
            transitions_applied: AtomicU64::new(0),
            stale_rejected: AtomicU64::new(0),
            callbacks_done: AtomicU64::new(0),
            callbacks_failed: AtomicU64::new(0),
            worker_starts: AtomicU64::new(0),
            worker_restarts: AtomicU64::new(0),
            inner: RwLock::new(MetricsInner {
                start_time: Instant::now(),
                last_event_time: None,
                last_error_time: None,
                last_stream_error_time: None,
            }),
        }
    }

    // --- Increment methods ---

    pub fn inc_events_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_event_time = Some(Instant::now());
    }

    pub fn inc_parse_errors(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_error_time = Some(Instant::now());
    }

    pub fn inc_stream_errors(&self) {
        self.stream_errors.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let mut inner = self.inner.write();
        inner.last_error_time = Some(now);
        inner.last_stream_error_time = Some(now);
    }

    pub fn inc_reconcile_runs(&self) {
        self.reconcile_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_transitions_applied(&self) {
        self.transitions_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_stale_rejected(&self) {
        self.stale_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_callbacks_done(&self) {
        self.callbacks_done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_callbacks_failed(&self) {
        self.callbacks_failed.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_error_time = Some(Instant::now());
    }

    pub fn inc_worker_starts(&self) {
        self.worker_starts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_worker_restarts(&self) {
        self.worker_restarts.fetch_add(1, Ordering::Relaxed);
    }

    // --- Getter methods ---

    pub fn events_received(&self) -> u64 {
        self.events_received.load(Ordering::Relaxed)
    }

    pub fn parse_errors(&self) -> u64 {
        self.parse_errors.load(Ordering::Relaxed)
    }

    pub fn stream_errors(&self) -> u64 {
        self.stream_errors.load(Ordering::Relaxed)
    }

    pub fn reconcile_runs(&self) -> u64 {
        self.reconcile_runs.load(Ordering::Relaxed)
    }

    pub fn transitions_applied(&self) -> u64 {
        self.transitions_applied.load(Ordering::Relaxed)
    }

    pub fn stale_rejected(&self) -> u64 {
        self.stale_rejected.load(Ordering::Relaxed)
    }

    pub fn callbacks_done(&self) -> u64 {
        self.callbacks_done.load(Ordering::Relaxed)
    }

    pub fn callbacks_failed(&self) -> u64 {
        self.callbacks_failed.load(Ordering::Relaxed)
    }

    pub fn worker_starts(&self) -> u64 {
        self.worker_starts.load(Ordering::Relaxed)
    }

    pub fn worker_restarts(&self) -> u64 {
        self.worker_restarts.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> f64 {
        self.inner.read().start_time.elapsed().as_secs_f64()
    }

    pub fn secs_since_last_event(&self) -> Option<f64> {
        self.inner
            .read()
            .last_event_time
            .map(|t| t.elapsed().as_secs_f64())
    }

    pub fn secs_since_last_error(&self) -> Option<f64> {
        self.inner
            .read()
            .last_error_time
            .map(|t| t.elapsed().as_secs_f64())
    }

    pub fn secs_since_last_stream_error(&self) -> Option<f64> {
        self.inner
            .read()
            .last_stream_error_time
            .map(|t| t.elapsed().as_secs_f64())
    }

    /// Generate a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_received: self.events_received(),
            parse_errors: self.parse_errors(),
            stream_errors: self.stream_errors(),
            reconcile_runs: self.reconcile_runs(),
            transitions_applied: self.transitions_applied(),
            stale_rejected: self.stale_rejected(),
            callbacks_done: self.callbacks_done(),
            callbacks_failed: self.callbacks_failed(),
            worker_starts: self.worker_starts(),
            worker_restarts: self.worker_restarts(),
            uptime_secs: self.uptime_secs(),
            secs_since_last_event: self.secs_since_last_event(),
            secs_since_last_error: self.secs_since_last_error(),
            secs_since_last_stream_error: self.secs_since_last_stream_error(),
        }
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub events_received: u64,
    pub parse_errors: u64,
    pub stream_errors: u64,
    pub reconcile_runs: u64,
    pub transitions_applied: u64,
    pub stale_rejected: u64,
    pub callbacks_done: u64,
    pub callbacks_failed: u64,
    pub worker_starts: u64,
    pub worker_restarts: u64,
    pub uptime_secs: f64,
    pub secs_since_last_event: Option<f64>,
    pub secs_since_last_error: Option<f64>,
    pub secs_since_last_stream_error: Option<f64>,
}

/// Health status of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    /// Some error in the recent window.
    Degraded,
    /// A stream failed recently and nothing has arrived since.
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::Degraded => write!(f, "DEGRADED"),
            HealthStatus::Unhealthy => write!(f, "UNHEALTHY"),
        }
    }
}

impl MetricsSnapshot {
    /// Errors older than this no longer affect health.
    const ERROR_WINDOW_SECS: f64 = 60.0;

    /// Determine the health status based on metrics.
    ///
    /// Quiet streams are normal for an order engine, so silence alone is
    /// never unhealthy.
    pub fn health_status(&self) -> HealthStatus {
        if let Some(stream_error) = self.secs_since_last_stream_error {
            let recovered = matches!(self.secs_since_last_event, Some(event) if event < stream_error);
            if stream_error <= Self::ERROR_WINDOW_SECS && !recovered {
                return HealthStatus::Unhealthy;
            }
        }

        match self.secs_since_last_error {
            Some(secs) if secs <= Self::ERROR_WINDOW_SECS => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        }
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Engine Metrics ===")?;
        writeln!(f, "Uptime:              {:.1}s", self.uptime_secs)?;
        writeln!(f, "Events received:     {}", self.events_received)?;
        writeln!(f, "Parse errors:        {}", self.parse_errors)?;
        writeln!(f, "Stream errors:       {}", self.stream_errors)?;
        writeln!(f, "Reconcile runs:      {}", self.reconcile_runs)?;
        writeln!(f, "Transitions applied: {}", self.transitions_applied)?;
        writeln!(f, "Stale rejected:      {}", self.stale_rejected)?;
        writeln!(f, "Callbacks done:      {}", self.callbacks_done)?;
        writeln!(f, "Callbacks failed:    {}", self.callbacks_failed)?;
        writeln!(f, "Worker starts:       {}", self.worker_starts)?;
        writeln!(f, "Worker restarts:     {}", self.worker_restarts)?;
        if let Some(secs) = self.secs_since_last_event {
            writeln!(f, "Since last event:    {:.1}s", secs)?;
        }
        if let Some(secs) = self.secs_since_last_error {
            writeln!(f, "Since last error:    {:.1}s", secs)?;
        }
        Ok(())
    }
}

/// Shared handle to metrics.
pub type SharedMetrics = Arc<EngineMetrics>;

pub fn create_metrics() -> SharedMetrics {
    Arc::new(EngineMetrics::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_increment() {
        let metrics = EngineMetrics::new();

        metrics.inc_events_received();
        metrics.inc_events_received();
        metrics.inc_transitions_applied();
        metrics.inc_stale_rejected();
        metrics.inc_callbacks_failed();

        assert_eq!(metrics.events_received(), 2);
        assert_eq!(metrics.transitions_applied(), 1);
        assert_eq!(metrics.stale_rejected(), 1);
        assert_eq!(metrics.callbacks_failed(), 1);
        assert!(metrics.secs_since_last_error().is_some());
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = EngineMetrics::new();

        metrics.inc_worker_starts();
        metrics.inc_worker_restarts();
        metrics.inc_reconcile_runs();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.worker_starts, 1);
        assert_eq!(snapshot.worker_restarts, 1);
        assert_eq!(snapshot.reconcile_runs, 1);
        assert!(snapshot.uptime_secs >= 0.0);
        assert_eq!(snapshot.health_status(), HealthStatus::Healthy);
    }

    #[test]
    fn test_health_status_idle_engine_is_healthy() {
        let snapshot = MetricsSnapshot {
            uptime_secs: 86_400.0,
            ..Default::default()
        };

        assert_eq!(snapshot.health_status(), HealthStatus::Healthy);
    }

    #[test]
    fn test_health_status_degraded_after_recent_callback_failure() {
        let snapshot = MetricsSnapshot {
            callbacks_failed: 1,
            uptime_secs: 120.0,
            secs_since_last_error: Some(10.0),
            ..Default::default()
        };

        assert_eq!(snapshot.health_status(), HealthStatus::Degraded);
    }

    #[test]
    fn test_health_status_old_error_is_forgotten() {
        let snapshot = MetricsSnapshot {
            parse_errors: 3,
            uptime_secs: 600.0,
            secs_since_last_error: Some(300.0),
            ..Default::default()
        };

        assert_eq!(snapshot.health_status(), HealthStatus::Healthy);
    }

    #[test]
    fn test_health_status_unhealthy_while_stream_down() {
        let snapshot = MetricsSnapshot {
            stream_errors: 1,
            uptime_secs: 600.0,
            secs_since_last_event: Some(40.0),
            secs_since_last_error: Some(5.0),
            secs_since_last_stream_error: Some(5.0),
            ..Default::default()
        };

        assert_eq!(snapshot.health_status(), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_health_status_degraded_once_events_resume() {
        let snapshot = MetricsSnapshot {
            stream_errors: 1,
            events_received: 10,
            uptime_secs: 600.0,
            secs_since_last_event: Some(1.0),
            secs_since_last_error: Some(5.0),
            secs_since_last_stream_error: Some(5.0),
            ..Default::default()
        };

        assert_eq!(snapshot.health_status(), HealthStatus::Degraded);
    }

    #[test]
    fn test_health_status_boundary_at_window() {
        // At exactly 60s the error still counts.
        let snapshot = MetricsSnapshot {
            uptime_secs: 120.0,
            secs_since_last_error: Some(60.0),
            ..Default::default()
        };

        assert_eq!(snapshot.health_status(), HealthStatus::Degraded);
    }
}
