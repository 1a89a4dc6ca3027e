//! Progress tracking and callbacks for deformation runs.
//!
//! Callbacks observe the run; nothing they do feeds back into the estimate.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use deform_core::TransformChain;

use crate::stats::RunStatistics;

/// Summary of one sweep over the deformation lattice.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationReport {
    /// Zero-based iteration number.
    pub iteration: usize,
    pub total_iterations: usize,
    /// Nodes visited by the primary sweep.
    pub nodes_seen: usize,
    /// Nodes for which no estimate could be made.
    pub nodes_tried: usize,
    /// Nodes with an estimate.
    pub nodes_done: usize,
    /// Estimates larger than 95% of the lattice step.
    pub nodes_over: usize,
    /// Nodes re-estimated as outliers.
    pub outliers: usize,
    /// Displacement magnitudes of the primary sweep.
    pub magnitudes: RunStatistics,
    /// Mean objective evaluations per estimated node.
    pub mean_evaluations: f64,
    /// Whole-volume similarity after this iteration, when requested.
    pub similarity: Option<f64>,
    /// Time since the run started.
    pub elapsed: Duration,
}

impl IterationReport {
    /// Calculate progress percentage.
    pub fn progress_percent(&self) -> f64 {
        if self.total_iterations == 0 {
            100.0
        } else {
            ((self.iteration + 1) as f64 / self.total_iterations as f64) * 100.0
        }
    }
}

/// Progress callback trait for monitoring deformation runs.
pub trait ProgressCallback: Send + Sync {
    /// Called after every iteration.
    fn on_iteration(&self, report: &IterationReport);

    /// Called when the run starts, with the initial similarity if it was computed.
    fn on_start(&self, _initial_similarity: Option<f64>) {}

    /// Called with the current transform at the end of every iteration when snapshots are enabled.
    fn on_snapshot(&self, _iteration: usize, _transform: &TransformChain) {}

    /// Called when the run completes.
    fn on_complete(&self, _iterations: usize, _elapsed: Duration) {}

    /// Called when the run fails.
    fn on_error(&self, _error: &str) {}
}

/// Console progress callback that logs to tracing.
#[derive(Debug, Clone)]
pub struct ConsoleProgressCallback {
    /// Log interval (iterations).
    pub log_interval: usize,
}

impl Default for ConsoleProgressCallback {
    fn default() -> Self {
        Self { log_interval: 1 }
    }
}

impl ConsoleProgressCallback {
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
        }
    }
}

impl ProgressCallback for ConsoleProgressCallback {
    fn on_iteration(&self, report: &IterationReport) {
        if report.iteration % self.log_interval == 0 || report.iteration + 1 == report.total_iterations {
            tracing::info!(
                "Iter {}/{} ({:.1}%) | seen {} tried {} done {} over {} | mag {:.4} ± {:.4} [{:.4}, {:.4}] | evals {:.1} | {:.2}s",
                report.iteration + 1,
                report.total_iterations,
                report.progress_percent(),
                report.nodes_seen,
                report.nodes_tried,
                report.nodes_done,
                report.nodes_over,
                report.magnitudes.mean(),
                report.magnitudes.std(),
                report.magnitudes.min(),
                report.magnitudes.max(),
                report.mean_evaluations,
                report.elapsed.as_secs_f64(),
            );
            if let Some(similarity) = report.similarity {
                tracing::info!("  similarity: {:.6}", similarity);
            }
        }
    }

    fn on_start(&self, initial_similarity: Option<f64>) {
        match initial_similarity {
            Some(s) => tracing::info!("Deformation started, initial similarity {:.6}", s),
            None => tracing::info!("Deformation started"),
        }
    }

    fn on_complete(&self, iterations: usize, elapsed: Duration) {
        tracing::info!(
            "Deformation completed {} iteration(s) in {:.2}s",
            iterations,
            elapsed.as_secs_f64()
        );
    }

    fn on_error(&self, error: &str) {
        tracing::error!("Deformation failed: {}", error);
    }
}

/// History callback that records every iteration report.
#[derive(Debug, Clone, Default)]
pub struct HistoryCallback {
    history: Arc<Mutex<Vec<IterationReport>>>,
    snapshots: Arc<Mutex<Vec<(usize, TransformChain)>>>,
}

impl HistoryCallback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the recorded reports.
    pub fn get_history(&self) -> Vec<IterationReport> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    /// Get the recorded transform snapshots.
    pub fn get_snapshots(&self) -> Vec<(usize, TransformChain)> {
        self.snapshots.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Clear the history.
    pub fn clear(&self) {
        if let Ok(mut h) = self.history.lock() {
            h.clear();
        }
        if let Ok(mut s) = self.snapshots.lock() {
            s.clear();
        }
    }
}

impl ProgressCallback for HistoryCallback {
    fn on_iteration(&self, report: &IterationReport) {
        if let Ok(mut h) = self.history.lock() {
            h.push(report.clone());
        }
    }

    fn on_snapshot(&self, iteration: usize, transform: &TransformChain) {
        if let Ok(mut s) = self.snapshots.lock() {
            s.push((iteration, transform.clone()));
        }
    }
}

/// Fans progress events out to several callbacks.
#[derive(Default, Clone)]
pub struct ProgressTracker {
    callbacks: Vec<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback.
    pub fn add_callback(&mut self, callback: Arc<dyn ProgressCallback>) {
        self.callbacks.push(callback);
    }

    /// Add a callback, builder style.
    pub fn with_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.add_callback(callback);
        self
    }

    pub fn start(&self, initial_similarity: Option<f64>) {
        for callback in &self.callbacks {
            callback.on_start(initial_similarity);
        }
    }

    pub fn iteration(&self, report: &IterationReport) {
        for callback in &self.callbacks {
            callback.on_iteration(report);
        }
    }

    pub fn snapshot(&self, iteration: usize, transform: &TransformChain) {
        for callback in &self.callbacks {
            callback.on_snapshot(iteration, transform);
        }
    }

    pub fn complete(&self, iterations: usize, elapsed: Duration) {
        for callback in &self.callbacks {
            callback.on_complete(iterations, elapsed);
        }
    }

    pub fn error(&self, error: &str) {
        for callback in &self.callbacks {
            callback.on_error(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(iteration: usize) -> IterationReport {
        IterationReport {
            iteration,
            total_iterations: 4,
            nodes_seen: 10,
            nodes_tried: 2,
            nodes_done: 8,
            nodes_over: 0,
            outliers: 1,
            magnitudes: RunStatistics::new(),
            mean_evaluations: 12.0,
            similarity: None,
            elapsed: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(report(1).progress_percent(), 50.0);
    }

    #[test]
    fn test_history_callback() {
        let history = HistoryCallback::new();
        history.on_iteration(&report(0));
        history.on_iteration(&report(1));
        assert_eq!(history.get_history().len(), 2);
        history.on_snapshot(1, &TransformChain::new());
        assert_eq!(history.get_snapshots()[0].0, 1);
        history.clear();
        assert!(history.get_history().is_empty());
    }

    #[test]
    fn test_tracker_fans_out() {
        let a = Arc::new(HistoryCallback::new());
        let b = Arc::new(HistoryCallback::new());
        let tracker = ProgressTracker::new()
            .with_callback(a.clone())
            .with_callback(b.clone())
            .with_callback(Arc::new(ConsoleProgressCallback::default()));
        tracker.iteration(&report(0));
        assert_eq!(a.get_history().len(), 1);
        assert_eq!(b.get_history().len(), 1);
    }
}
