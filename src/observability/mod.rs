//! Observability for the store
//!
//! This module provides:
//! - Structured logging (JSON lines)
//! - Typed lifecycle events
//! - Per-store counters
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on execution
//! 3. No background threads
//!
//! # Usage
//!
//! ```ignore
//! use tierkv::observability::{log_event, Event, Logger};
//!
//! log_event(Event::StoreOpen);
//! Logger::trace("TXN_COMMIT", &[("lsn", "42")]);
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsSnapshot, StoreMetrics};

/// Log a lifecycle event at INFO, or ERROR for failure events
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_failure() {
        Severity::Error
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), fields);
}

/// Log a per-operation event at TRACE
pub fn trace_event(event: Event, fields: &[(&str, &str)]) {
    Logger::log(Severity::Trace, event.as_str(), fields);
}

/// Log a recoverable condition at WARN
pub fn warn_event(event: Event, fields: &[(&str, &str)]) {
    Logger::log(Severity::Warn, event.as_str(), fields);
}
