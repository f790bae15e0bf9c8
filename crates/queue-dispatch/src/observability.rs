//! Logging and timing collaborators used by the dispatch service.
//!
//! The dispatch service reports through these traits rather than calling
//! `tracing` directly for its error and timing events, so an execution
//! environment can route them elsewhere (and tests can count them). The
//! default implementations emit `tracing` events.

use crate::error::DispatchError;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Receives errors that the dispatch layer handles on the caller's behalf
#[cfg_attr(test, mockall::automock)]
pub trait ErrorLogger: Send + Sync {
    /// Record one error
    fn error(&self, err: &DispatchError);
}

/// Measures elapsed wall-clock time between `start` and `stop` for a label
#[cfg_attr(test, mockall::automock)]
pub trait Timer: Send + Sync {
    /// Start timing the given label
    fn start(&self, label: &str);

    /// Stop timing the given label, returning the elapsed time if it was started
    fn stop(&self, label: &str) -> Option<Duration>;
}

/// [`ErrorLogger`] emitting `tracing` error events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorLogger;

impl ErrorLogger for TracingErrorLogger {
    fn error(&self, err: &DispatchError) {
        tracing::error!(
            error = %err,
            transient = err.is_transient(),
            configuration = err.is_configuration(),
            "Queue dispatch error"
        );
    }
}

/// [`Timer`] keeping start instants in memory and reporting through `tracing`
#[derive(Debug, Default)]
pub struct TracingTimer {
    started: Mutex<HashMap<String, Instant>>,
}

impl TracingTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of labels started but not yet stopped
    pub fn pending(&self) -> usize {
        self.started.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl Timer for TracingTimer {
    fn start(&self, label: &str) {
        match self.started.lock() {
            Ok(mut started) => {
                started.insert(label.to_string(), Instant::now());
            }
            Err(_) => tracing::warn!(label, "Timer state poisoned; measurement skipped"),
        }
    }

    fn stop(&self, label: &str) -> Option<Duration> {
        let start = self.started.lock().ok()?.remove(label);

        match start {
            Some(start) => {
                let elapsed = start.elapsed();
                tracing::info!(
                    label,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Timer stopped"
                );
                Some(elapsed)
            }
            None => {
                tracing::warn!(label, "Timer stopped without a matching start");
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "observability_tests.rs"]
mod tests;
