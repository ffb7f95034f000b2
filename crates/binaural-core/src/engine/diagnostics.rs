//! Lock-free bridge counters
//!
//! The audio thread only ever does relaxed atomic increments here. Reading,
//! diffing and logging happen elsewhere, through [`DiagnosticsMonitor`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Counters written by the audio callbacks
#[derive(Debug)]
pub struct BridgeDiagnostics {
    callbacks: AtomicU64,
    underruns: AtomicU64,
    overruns: AtomicU64,
    contract_violations: AtomicU64,
    misaligned_callbacks: AtomicU64,
    numeric_anomalies: AtomicU64,
    renderer_swaps: AtomicU64,
    active_version: AtomicU64,
    fifo_fill_last: AtomicU64,
    fifo_fill_min: AtomicU64,
    fifo_fill_max: AtomicU64,
}

impl Default for BridgeDiagnostics {
    fn default() -> Self {
        Self {
            callbacks: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            contract_violations: AtomicU64::new(0),
            misaligned_callbacks: AtomicU64::new(0),
            numeric_anomalies: AtomicU64::new(0),
            renderer_swaps: AtomicU64::new(0),
            active_version: AtomicU64::new(0),
            fifo_fill_last: AtomicU64::new(0),
            fifo_fill_min: AtomicU64::new(u64::MAX),
            fifo_fill_max: AtomicU64::new(0),
        }
    }
}

impl BridgeDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_callback(&self) {
        self.callbacks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_contract_violation(&self) {
        self.contract_violations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_misaligned(&self) {
        self.misaligned_callbacks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_anomalies(&self, blocks: usize) {
        self.numeric_anomalies.fetch_add(blocks as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_swap(&self, version: u64) {
        self.renderer_swaps.fetch_add(1, Ordering::Relaxed);
        self.active_version.store(version, Ordering::Relaxed);
    }

    /// Record the input FIFO level (samples) seen by the output callback
    #[inline]
    pub fn record_fifo_fill(&self, samples: usize) {
        let samples = samples as u64;
        self.fifo_fill_last.store(samples, Ordering::Relaxed);
        self.fifo_fill_min.fetch_min(samples, Ordering::Relaxed);
        self.fifo_fill_max.fetch_max(samples, Ordering::Relaxed);
    }

    /// Restart FIFO min/max tracking (new stream)
    pub fn reset_fifo_stats(&self) {
        self.fifo_fill_last.store(0, Ordering::Relaxed);
        self.fifo_fill_min.store(u64::MAX, Ordering::Relaxed);
        self.fifo_fill_max.store(0, Ordering::Relaxed);
    }

    /// Consistent-enough copy of all counters
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let min = self.fifo_fill_min.load(Ordering::Relaxed);
        DiagnosticsSnapshot {
            callbacks: self.callbacks.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            contract_violations: self.contract_violations.load(Ordering::Relaxed),
            misaligned_callbacks: self.misaligned_callbacks.load(Ordering::Relaxed),
            numeric_anomalies: self.numeric_anomalies.load(Ordering::Relaxed),
            renderer_swaps: self.renderer_swaps.load(Ordering::Relaxed),
            active_version: self.active_version.load(Ordering::Relaxed),
            fifo_fill_last: self.fifo_fill_last.load(Ordering::Relaxed),
            fifo_fill_min: if min == u64::MAX { 0 } else { min },
            fifo_fill_max: self.fifo_fill_max.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`BridgeDiagnostics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    pub callbacks: u64,
    pub underruns: u64,
    pub overruns: u64,
    pub contract_violations: u64,
    pub misaligned_callbacks: u64,
    pub numeric_anomalies: u64,
    pub renderer_swaps: u64,
    /// Version of the renderer the bridge is using (0 = none yet)
    pub active_version: u64,
    pub fifo_fill_last: u64,
    pub fifo_fill_min: u64,
    pub fifo_fill_max: u64,
}

impl DiagnosticsSnapshot {
    /// Whether any fault counter is higher than in `earlier`
    pub fn has_new_faults(&self, earlier: &DiagnosticsSnapshot) -> bool {
        self.underruns > earlier.underruns
            || self.overruns > earlier.overruns
            || self.contract_violations > earlier.contract_violations
            || self.misaligned_callbacks > earlier.misaligned_callbacks
            || self.numeric_anomalies > earlier.numeric_anomalies
    }
}

impl std::fmt::Display for DiagnosticsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "callbacks={} renderer=v{} swaps={} underruns={} overruns={} violations={} misaligned={} anomalies={} fifo={} [{}..{}]",
            self.callbacks,
            self.active_version,
            self.renderer_swaps,
            self.underruns,
            self.overruns,
            self.contract_violations,
            self.misaligned_callbacks,
            self.numeric_anomalies,
            self.fifo_fill_last,
            self.fifo_fill_min,
            self.fifo_fill_max
        )
    }
}

/// Logs counter increases from a non-real-time thread, at most once per
/// interval
pub struct DiagnosticsMonitor {
    source: Arc<BridgeDiagnostics>,
    last: DiagnosticsSnapshot,
    interval: Duration,
    last_report: Option<Instant>,
}

impl DiagnosticsMonitor {
    pub fn new(source: Arc<BridgeDiagnostics>, interval: Duration) -> Self {
        let last = source.snapshot();
        Self {
            source,
            last,
            interval,
            last_report: None,
        }
    }

    /// Compare against the last report and log new faults
    ///
    /// Returns the snapshot that was reported, or `None` when nothing new
    /// happened or the rate limit is still in effect.
    pub fn poll(&mut self) -> Option<DiagnosticsSnapshot> {
        let now = Instant::now();
        if let Some(at) = self.last_report {
            if now.duration_since(at) < self.interval {
                return None;
            }
        }

        let current = self.source.snapshot();
        if !current.has_new_faults(&self.last) {
            return None;
        }

        let prev = self.last;
        log::warn!(
            "[BRIDGE] +{} underruns, +{} overruns, +{} contract violations, +{} misaligned, +{} numeric anomalies",
            current.underruns - prev.underruns,
            current.overruns - prev.overruns,
            current.contract_violations - prev.contract_violations,
            current.misaligned_callbacks - prev.misaligned_callbacks,
            current.numeric_anomalies - prev.numeric_anomalies
        );
        self.last = current;
        self.last_report = Some(now);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_stats() {
        let diag = BridgeDiagnostics::new();
        assert_eq!(diag.snapshot().fifo_fill_min, 0);

        diag.record_fifo_fill(300);
        diag.record_fifo_fill(100);
        diag.record_fifo_fill(200);
        let snap = diag.snapshot();
        assert_eq!((snap.fifo_fill_last, snap.fifo_fill_min, snap.fifo_fill_max), (200, 100, 300));

        diag.reset_fifo_stats();
        assert_eq!(diag.snapshot().fifo_fill_max, 0);
    }

    #[test]
    fn test_swap_tracks_active_version() {
        let diag = BridgeDiagnostics::new();
        diag.record_swap(4);
        diag.record_swap(5);
        let snap = diag.snapshot();
        assert_eq!(snap.renderer_swaps, 2);
        assert_eq!(snap.active_version, 5);
    }

    #[test]
    fn test_monitor_reports_only_new_faults() {
        let diag = Arc::new(BridgeDiagnostics::new());
        let mut monitor = DiagnosticsMonitor::new(diag.clone(), Duration::ZERO);

        diag.record_callback();
        assert_eq!(monitor.poll(), None);

        diag.record_underrun();
        diag.record_anomalies(2);
        let report = monitor.poll().unwrap();
        assert_eq!(report.underruns, 1);
        assert_eq!(report.numeric_anomalies, 2);

        assert_eq!(monitor.poll(), None);
    }

    #[test]
    fn test_monitor_is_rate_limited() {
        let diag = Arc::new(BridgeDiagnostics::new());
        let mut monitor = DiagnosticsMonitor::new(diag.clone(), Duration::from_secs(3600));

        diag.record_overrun();
        assert!(monitor.poll().is_some());
        diag.record_overrun();
        assert_eq!(monitor.poll(), None);
    }
}
