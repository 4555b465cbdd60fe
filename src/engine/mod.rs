// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Fragment execution.
//!
//! A [`FragmentExecutor`] takes a composed fragment, resolves its edges into
//! queues and transmitters, binds conditions to them, and drives the
//! operators with one of three scheduling strategies:
//!
//! - **Greedy**: one operator at a time, in topological order.
//! - **MultiThread**: ready operators run concurrently on worker pools; idle
//!   periods are polled at the configured recession period.
//! - **EventBased**: like MultiThread, but idle periods sleep until a queue,
//!   handle, or timer wakes the fragment.
//!
//! The strategy is picked by `SchedulerFactory` from the fragment's
//! [`SchedulerConfig`](crate::scheduler::SchedulerConfig).

mod connector_resolver;
mod factory;
mod fragment_executor;
mod schedulers;
mod task;

#[cfg(test)]
mod integration_tests;

pub use fragment_executor::FragmentExecutor;

pub(crate) use factory::SchedulerFactory;
pub(crate) use task::TaskSet;

use crate::errors::ExecutionError;
use crate::scheduler::SchedulerKind;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// One scheduling strategy.
///
/// `tick` dispatches every operator that is ready right now and reports how
/// many ran. `idle` is called when nothing was ready; it returns when the
/// fragment should be evaluated again.
#[async_trait]
pub(crate) trait Scheduler: Send + Sync {
    fn kind(&self) -> SchedulerKind;

    async fn tick(&self, tasks: &mut TaskSet, tick: u64) -> Result<usize, ExecutionError>;

    async fn idle(&self, wakeup: &Notify, cancel: &CancellationToken, timeout: Option<Duration>);
}

/// Why a fragment stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every operator's conditions reported `Never`.
    Quiescent,
    /// Operators were left waiting with nothing that could wake them.
    Deadlock,
    /// The fragment was stopped through its controller.
    Stopped,
    /// The configured maximum run time elapsed.
    MaxDuration,
    /// An operator failed.
    Failed,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Quiescent => "quiescent",
            StopReason::Deadlock => "deadlock",
            StopReason::Stopped => "stopped",
            StopReason::MaxDuration => "max_duration",
            StopReason::Failed => "failed",
        }
    }
}

impl Display for StopReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of one fragment run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub fragment: String,
    pub ticks: u64,
    /// Number of compute calls per operator name.
    pub dispatches: BTreeMap<String, u64>,
    pub stop_reason: StopReason,
    pub duration: Duration,
}

impl RunReport {
    pub fn dispatches_of(&self, operator: &str) -> u64 {
        self.dispatches.get(operator).copied().unwrap_or(0)
    }
}

/// A remote upstream feeding `operator.port` of this fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundLink {
    pub operator: String,
    pub port: String,
    /// Number of upstream connections expected on this port.
    pub peers: usize,
}

/// A remote downstream fed by `operator.port` of this fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundLink {
    pub operator: String,
    pub port: String,
    /// Receiver key, `fragment.operator.port`.
    pub target: String,
}

/// Cross-fragment edges touching one fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentLinks {
    pub inbound: Vec<InboundLink>,
    pub outbound: Vec<OutboundLink>,
}

impl FragmentLinks {
    pub fn is_empty(&self) -> bool {
        self.inbound.is_empty() && self.outbound.is_empty()
    }

    /// Remote peers expected on `operator.port`.
    pub fn inbound_peers(&self, operator: &str, port: &str) -> usize {
        self.inbound
            .iter()
            .filter(|l| l.operator == operator && l.port == port)
            .map(|l| l.peers)
            .sum()
    }
}

/// Receiver key for a port: `fragment.operator.port`.
pub fn receiver_target(fragment: &str, operator: &str, port: &str) -> String {
    format!("{}.{}.{}", fragment, operator, port)
}
