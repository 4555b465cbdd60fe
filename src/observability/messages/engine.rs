// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for fragment lifecycle and execution events.
//!
//! This module contains message types for logging events related to:
//! * Fragment initialization, start, and stop
//! * Scheduling outcomes such as deadlock and failed operators
//! * Thread pools and resolved edges
//! * Driver and worker coordination

use crate::observability::messages::StructuredLog;
use crate::scheduler::FragmentState;
use crate::spec::ConnectorType;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// A fragment finished its `Composed -> Initialized` transition.
///
/// # Log Level
/// `info!` - Important operational event
pub struct FragmentInitialized<'a> {
    pub fragment: &'a str,
    pub operator_count: usize,
    pub edge_count: usize,
}

impl Display for FragmentInitialized<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Fragment '{}' initialized: {} operators, {} edges",
            self.fragment, self.operator_count, self.edge_count
        )
    }
}

impl StructuredLog for FragmentInitialized<'_> {
    fn log(&self) {
        tracing::info!(
            fragment = self.fragment,
            operator_count = self.operator_count,
            edge_count = self.edge_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "fragment_initialized",
            span_name = name,
            fragment = self.fragment,
            operator_count = self.operator_count,
            edge_count = self.edge_count,
        )
    }
}

/// A fragment entered its tick loop.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use the_sluice::observability::messages::engine::FragmentStarted;
///
/// let msg = FragmentStarted {
///     fragment: "tx",
///     scheduler: "event_based",
///     operator_count: 3,
///     worker_threads: 2,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct FragmentStarted<'a> {
    pub fragment: &'a str,
    pub scheduler: &'a str,
    pub operator_count: usize,
    pub worker_threads: usize,
}

impl Display for FragmentStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Starting fragment '{}' with {} scheduler: {} operators, {} worker threads",
            self.fragment, self.scheduler, self.operator_count, self.worker_threads
        )
    }
}

impl StructuredLog for FragmentStarted<'_> {
    fn log(&self) {
        tracing::info!(
            fragment = self.fragment,
            scheduler = self.scheduler,
            operator_count = self.operator_count,
            worker_threads = self.worker_threads,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "fragment",
            span_name = name,
            fragment = self.fragment,
            scheduler = self.scheduler,
            operator_count = self.operator_count,
            worker_threads = self.worker_threads,
        )
    }
}

/// A fragment left its tick loop.
///
/// # Log Level
/// `info!` - Important operational event
pub struct FragmentStopped<'a> {
    pub fragment: &'a str,
    pub reason: &'a str,
    pub ticks: u64,
    pub duration: Duration,
}

impl Display for FragmentStopped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Fragment '{}' stopped ({}) after {} ticks in {:?}",
            self.fragment, self.reason, self.ticks, self.duration
        )
    }
}

impl StructuredLog for FragmentStopped<'_> {
    fn log(&self) {
        tracing::info!(
            fragment = self.fragment,
            reason = self.reason,
            ticks = self.ticks,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "fragment_stopped",
            span_name = name,
            fragment = self.fragment,
            reason = self.reason,
            ticks = self.ticks,
            duration = ?self.duration,
        )
    }
}

/// A fragment moved between lifecycle states.
///
/// # Log Level
/// `debug!` - Lifecycle tracing
pub struct StateChanged<'a> {
    pub fragment: &'a str,
    pub from: FragmentState,
    pub to: FragmentState,
}

impl Display for StateChanged<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Fragment '{}': {} -> {}", self.fragment, self.from, self.to)
    }
}

impl StructuredLog for StateChanged<'_> {
    fn log(&self) {
        tracing::debug!(
            fragment = self.fragment,
            from = %self.from,
            to = %self.to,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "state_changed",
            span_name = name,
            fragment = self.fragment,
            from = %self.from,
            to = %self.to,
        )
    }
}

/// An operator's compute step returned an error.
///
/// # Log Level
/// `error!` - The fragment stops
pub struct OperatorFailed<'a> {
    pub fragment: &'a str,
    pub operator: &'a str,
    pub error: &'a str,
}

impl Display for OperatorFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Operator '{}' in fragment '{}' failed: {}",
            self.operator, self.fragment, self.error
        )
    }
}

impl StructuredLog for OperatorFailed<'_> {
    fn log(&self) {
        tracing::error!(
            fragment = self.fragment,
            operator = self.operator,
            error = self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "operator_failed",
            span_name = name,
            fragment = self.fragment,
            operator = self.operator,
            error = self.error,
        )
    }
}

/// Nothing is ready and nothing can become ready without outside help.
///
/// # Log Level
/// `warn!` - Operators are still waiting on data that never arrives
pub struct DeadlockDetected<'a> {
    pub fragment: &'a str,
    pub waiting: &'a [String],
}

impl Display for DeadlockDetected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Fragment '{}' is deadlocked; operators still waiting: [{}]",
            self.fragment,
            self.waiting.join(", ")
        )
    }
}

impl StructuredLog for DeadlockDetected<'_> {
    fn log(&self) {
        tracing::warn!(
            fragment = self.fragment,
            waiting = self.waiting.join(", "),
            waiting_count = self.waiting.len(),
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "deadlock",
            span_name = name,
            fragment = self.fragment,
            waiting_count = self.waiting.len(),
        )
    }
}

/// An operator can never be dispatched again.
///
/// # Log Level
/// `debug!` - Expected when count conditions run out
pub struct OperatorRetired<'a> {
    pub fragment: &'a str,
    pub operator: &'a str,
    pub dispatches: u64,
}

impl Display for OperatorRetired<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Operator '{}' in fragment '{}' retired after {} dispatches",
            self.operator, self.fragment, self.dispatches
        )
    }
}

impl StructuredLog for OperatorRetired<'_> {
    fn log(&self) {
        tracing::debug!(
            fragment = self.fragment,
            operator = self.operator,
            dispatches = self.dispatches,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "operator_retired",
            span_name = name,
            fragment = self.fragment,
            operator = self.operator,
        )
    }
}

/// A worker pool was created for a fragment.
///
/// # Log Level
/// `info!` - Resource allocation
pub struct ThreadPoolCreated<'a> {
    pub fragment: &'a str,
    pub pool: &'a str,
    pub size: usize,
    pub pinned: usize,
}

impl Display for ThreadPoolCreated<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Fragment '{}' created thread pool '{}' with {} threads ({} pinned operators)",
            self.fragment, self.pool, self.size, self.pinned
        )
    }
}

impl StructuredLog for ThreadPoolCreated<'_> {
    fn log(&self) {
        tracing::info!(
            fragment = self.fragment,
            pool = self.pool,
            size = self.size,
            pinned = self.pinned,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "thread_pool",
            span_name = name,
            fragment = self.fragment,
            pool = self.pool,
            size = self.size,
        )
    }
}

/// A connector was chosen for one edge.
///
/// # Log Level
/// `debug!` - Wiring trace
pub struct EdgeResolved<'a> {
    pub fragment: &'a str,
    pub edge: &'a str,
    pub connector: ConnectorType,
    pub capacity: usize,
}

impl Display for EdgeResolved<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Fragment '{}' resolved edge {} to a {} connector (capacity {})",
            self.fragment, self.edge, self.connector, self.capacity
        )
    }
}

impl StructuredLog for EdgeResolved<'_> {
    fn log(&self) {
        tracing::debug!(
            fragment = self.fragment,
            edge = self.edge,
            connector = %self.connector,
            capacity = self.capacity,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "edge_resolved",
            span_name = name,
            fragment = self.fragment,
            edge = self.edge,
            connector = %self.connector,
        )
    }
}

/// An environment override for the scheduler could not be used.
///
/// # Log Level
/// `warn!` - The configured value stays in effect
pub struct InvalidEnvOverride<'a> {
    pub variable: &'a str,
    pub value: &'a str,
}

impl Display for InvalidEnvOverride<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Ignoring {}='{}': expected a non-negative integer",
            self.variable, self.value
        )
    }
}

impl StructuredLog for InvalidEnvOverride<'_> {
    fn log(&self) {
        tracing::warn!(variable = self.variable, value = self.value, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("invalid_env_override", span_name = name, variable = self.variable)
    }
}

/// A worker registered with the driver.
///
/// # Log Level
/// `info!` - Distributed coordination
pub struct WorkerRegistered<'a> {
    pub worker: &'a str,
    pub targets: &'a [String],
}

impl Display for WorkerRegistered<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Worker '{}' registered (targets: [{}])",
            self.worker,
            self.targets.join(", ")
        )
    }
}

impl StructuredLog for WorkerRegistered<'_> {
    fn log(&self) {
        tracing::info!(worker = self.worker, targets = self.targets.join(","), "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("worker", span_name = name, worker = self.worker)
    }
}

/// The driver assigned fragments to a worker.
///
/// # Log Level
/// `info!` - Distributed coordination
pub struct FragmentsAssigned<'a> {
    pub worker: &'a str,
    pub fragments: &'a [String],
}

impl Display for FragmentsAssigned<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Assigned fragments [{}] to worker '{}'",
            self.fragments.join(", "),
            self.worker
        )
    }
}

impl StructuredLog for FragmentsAssigned<'_> {
    fn log(&self) {
        tracing::info!(
            worker = self.worker,
            fragments = self.fragments.join(","),
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("assignment", span_name = name, worker = self.worker)
    }
}

/// A worker reported the outcome of one fragment.
///
/// # Log Level
/// `info!` on success, `error!` on failure
pub struct FragmentOutcome<'a> {
    pub fragment: &'a str,
    pub worker: &'a str,
    pub error: Option<&'a str>,
}

impl Display for FragmentOutcome<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.error {
            None => write!(f, "Fragment '{}' on worker '{}' finished", self.fragment, self.worker),
            Some(error) => write!(
                f,
                "Fragment '{}' on worker '{}' failed: {}",
                self.fragment, self.worker, error
            ),
        }
    }
}

impl StructuredLog for FragmentOutcome<'_> {
    fn log(&self) {
        match self.error {
            None => tracing::info!(fragment = self.fragment, worker = self.worker, "{}", self),
            Some(error) => tracing::error!(
                fragment = self.fragment,
                worker = self.worker,
                error,
                "{}", self
            ),
        }
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "fragment_outcome",
            span_name = name,
            fragment = self.fragment,
            worker = self.worker,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadlock_lists_waiting_operators() {
        let waiting = vec!["rx".to_string(), "sink".to_string()];
        let msg = DeadlockDetected { fragment: "main", waiting: &waiting };
        assert_eq!(
            msg.to_string(),
            "Fragment 'main' is deadlocked; operators still waiting: [rx, sink]"
        );
    }

    #[test]
    fn test_fragment_outcome_renders_failure() {
        let msg = FragmentOutcome { fragment: "rx", worker: "w1", error: Some("bind failed") };
        assert_eq!(msg.to_string(), "Fragment 'rx' on worker 'w1' failed: bind failed");
        msg.log();
    }
}
