//! Tests for the default logging and timing collaborators.

use super::*;
use crate::error::TransportError;

#[test]
fn test_timer_measures_started_label() {
    let timer = TracingTimer::new();

    timer.start("sqs-publish-orders-1");
    assert_eq!(timer.pending(), 1);

    let elapsed = timer.stop("sqs-publish-orders-1");
    assert!(elapsed.is_some());
    assert_eq!(timer.pending(), 0);
}

#[test]
fn test_timer_stop_without_start_returns_none() {
    let timer = TracingTimer::new();
    assert_eq!(timer.stop("never-started"), None);
}

#[test]
fn test_timer_labels_are_independent() {
    let timer = TracingTimer::new();

    timer.start("a");
    timer.start("b");
    assert!(timer.stop("a").is_some());

    assert_eq!(timer.pending(), 1);
    assert!(timer.stop("a").is_none());
    assert!(timer.stop("b").is_some());
}

#[test]
fn test_tracing_logger_accepts_any_error() {
    let logger = TracingErrorLogger;
    logger.error(&DispatchError::from(TransportError::Network {
        message: "connection refused".to_string(),
    }));
}
