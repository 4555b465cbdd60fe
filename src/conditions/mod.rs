// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Readiness predicates that gate operator dispatch.
//!
//! Conditions are plain data: a [`ConditionKind`] plus an argument list.
//! When a fragment initializes, each condition is bound to the queues or
//! transmitters it watches and becomes a [`ConditionRuntime`], and all
//! kinds are evaluated by one function. Adding a kind means adding an enum
//! variant and one evaluation case.
//!
//! # Kinds
//!
//! | Kind | Ready when |
//! |------|------------|
//! | `None` | always |
//! | `MessageAvailable` | queue holds at least `min_size` messages |
//! | `ExpiringMessageAvailable` | batch is full, or the oldest message is older than `max_delay_ns` |
//! | `MultiMessageAvailable` | joint threshold over several ports holds |
//! | `MultiMessageAvailableTimeout` | as above, or partial data waited `execution_frequency` |
//! | `DownstreamMessageAffordable` | every downstream queue has `min_size` free slots |
//! | `Count` | fewer than `count` dispatches so far |
//! | `Boolean` | its handle is enabled |
//! | `Periodic` | `recess_period` elapsed since the last tick |
//! | `Asynchronous` | an external event marked it ready or done |

mod evaluator;
mod handles;
mod params;

pub use evaluator::SchedulingStatus;
pub(crate) use evaluator::{ConditionRuntime, ConditionTarget};
pub use handles::{AsyncEventState, AsyncHandle, BooleanHandle};
pub use params::parse_duration;

use crate::args::{Arg, ArgList};
use crate::component::{Component, ComponentBase};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

/// Every supported condition kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionKind {
    None,
    MessageAvailable,
    ExpiringMessageAvailable,
    MultiMessageAvailable,
    MultiMessageAvailableTimeout,
    DownstreamMessageAffordable,
    Count,
    Boolean,
    Periodic,
    Asynchronous,
}

impl ConditionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionKind::None => "none",
            ConditionKind::MessageAvailable => "message_available",
            ConditionKind::ExpiringMessageAvailable => "expiring_message_available",
            ConditionKind::MultiMessageAvailable => "multi_message_available",
            ConditionKind::MultiMessageAvailableTimeout => "multi_message_available_timeout",
            ConditionKind::DownstreamMessageAffordable => "downstream_message_affordable",
            ConditionKind::Count => "count",
            ConditionKind::Boolean => "boolean",
            ConditionKind::Periodic => "periodic",
            ConditionKind::Asynchronous => "asynchronous",
        }
    }

    /// Kinds that watch input queues.
    pub fn watches_inputs(&self) -> bool {
        matches!(
            self,
            ConditionKind::MessageAvailable
                | ConditionKind::ExpiringMessageAvailable
                | ConditionKind::MultiMessageAvailable
                | ConditionKind::MultiMessageAvailableTimeout
        )
    }

    /// Kinds that watch downstream capacity.
    pub fn watches_outputs(&self) -> bool {
        matches!(self, ConditionKind::DownstreamMessageAffordable)
    }
}

impl Display for ConditionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a multi-port condition combines its ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplingMode {
    /// Total across every listed port must reach `min_sum`.
    #[default]
    SumOfAll,
    /// Each port must reach its own entry of `min_sizes`.
    PerReceiver,
}

impl FromStr for SamplingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SumOfAll" | "sum_of_all" | "sum-of-all" => Ok(SamplingMode::SumOfAll),
            "PerReceiver" | "per_receiver" | "per-receiver" => Ok(SamplingMode::PerReceiver),
            other => Err(format!("unknown sampling mode '{}'", other)),
        }
    }
}

impl Display for SamplingMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SamplingMode::SumOfAll => write!(f, "SumOfAll"),
            SamplingMode::PerReceiver => write!(f, "PerReceiver"),
        }
    }
}

/// How a periodic condition schedules the tick after a late one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeriodicPolicy {
    /// Missed ticks fire back to back until the schedule catches up.
    #[default]
    CatchUpMissedTicks,
    /// The next tick is one period after the previous dispatch.
    MinTimeBetweenTicks,
    /// Missed ticks are skipped; the schedule stays on its original grid.
    NoCatchUpMissedTicks,
}

impl FromStr for PeriodicPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CatchUpMissedTicks" | "catch_up_missed_ticks" => Ok(PeriodicPolicy::CatchUpMissedTicks),
            "MinTimeBetweenTicks" | "min_time_between_ticks" => {
                Ok(PeriodicPolicy::MinTimeBetweenTicks)
            }
            "NoCatchUpMissedTicks" | "no_catch_up_missed_ticks" => {
                Ok(PeriodicPolicy::NoCatchUpMissedTicks)
            }
            other => Err(format!("unknown periodic policy '{}'", other)),
        }
    }
}

impl Display for PeriodicPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PeriodicPolicy::CatchUpMissedTicks => write!(f, "CatchUpMissedTicks"),
            PeriodicPolicy::MinTimeBetweenTicks => write!(f, "MinTimeBetweenTicks"),
            PeriodicPolicy::NoCatchUpMissedTicks => write!(f, "NoCatchUpMissedTicks"),
        }
    }
}

/// A named readiness predicate.
///
/// Boolean and asynchronous conditions carry a shared handle so that code
/// outside the scheduler can flip them while the fragment runs.
#[derive(Debug, Clone)]
pub struct Condition {
    base: ComponentBase,
    kind: ConditionKind,
    boolean: Option<BooleanHandle>,
    asynchronous: Option<AsyncHandle>,
}

impl Condition {
    /// A condition of `kind` configured entirely through arguments.
    pub fn new(kind: ConditionKind, name: impl Into<String>) -> Self {
        Self {
            base: ComponentBase::new(name),
            kind,
            boolean: (kind == ConditionKind::Boolean).then(BooleanHandle::default),
            asynchronous: (kind == ConditionKind::Asynchronous).then(AsyncHandle::default),
        }
    }

    fn with_known_arg(mut self, name: &'static str, value: impl Into<crate::args::ArgValue>) -> Self {
        // Names here are non-empty literals, so adding cannot fail.
        let _ = self.base.add_arg(Arg::new(name, value));
        self
    }

    pub fn none() -> Self {
        Self::new(ConditionKind::None, "none")
    }

    pub fn message_available(min_size: usize) -> Self {
        Self::new(ConditionKind::MessageAvailable, "message_available")
            .with_known_arg("min_size", min_size)
    }

    pub fn expiring_message_available(max_batch_size: usize, max_delay: Duration) -> Self {
        Self::new(
            ConditionKind::ExpiringMessageAvailable,
            "expiring_message_available",
        )
        .with_known_arg("max_batch_size", max_batch_size)
        .with_known_arg("max_delay_ns", max_delay.as_nanos() as u64)
    }

    pub fn downstream_message_affordable(min_size: usize) -> Self {
        Self::new(
            ConditionKind::DownstreamMessageAffordable,
            "downstream_message_affordable",
        )
        .with_known_arg("min_size", min_size)
    }

    pub fn count(count: u64) -> Self {
        Self::new(ConditionKind::Count, "count").with_known_arg("count", count)
    }

    pub fn boolean(enabled: bool) -> Self {
        let condition = Self::new(ConditionKind::Boolean, "boolean");
        if let Some(handle) = &condition.boolean {
            handle.set(enabled);
        }
        condition
    }

    pub fn periodic(period: Duration) -> Self {
        Self::periodic_with_policy(period, PeriodicPolicy::default())
    }

    pub fn periodic_with_policy(period: Duration, policy: PeriodicPolicy) -> Self {
        Self::new(ConditionKind::Periodic, "periodic")
            .with_known_arg("recess_period", period.as_nanos() as u64)
            .with_known_arg("policy", policy.to_string())
    }

    pub fn asynchronous() -> Self {
        Self::new(ConditionKind::Asynchronous, "asynchronous")
    }

    /// Renames the condition; handles are looked up by this name at runtime.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        if let Err(err) = self.base.rename(name) {
            tracing::error!(condition = self.base.name(), "{}", err);
        }
        self
    }

    pub fn with_arg(mut self, arg: Arg) -> Self {
        if let Err(err) = self.base.add_arg(arg) {
            tracing::error!(condition = self.base.name(), "{}", err);
        }
        self
    }

    pub fn with_args(mut self, args: ArgList) -> Self {
        self.base.add_args(args);
        self
    }

    pub fn kind(&self) -> ConditionKind {
        self.kind
    }

    pub fn boolean_handle(&self) -> Option<BooleanHandle> {
        self.boolean.clone()
    }

    pub fn async_handle(&self) -> Option<AsyncHandle> {
        self.asynchronous.clone()
    }

    pub(crate) fn register(&mut self, fragment: &str, id: i64) {
        self.base.register(fragment, id);
    }
}

impl Component for Condition {
    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_record_arguments() {
        let condition = Condition::message_available(3);
        assert_eq!(condition.kind(), ConditionKind::MessageAvailable);
        assert_eq!(condition.args().value::<usize>("min_size").unwrap(), Some(3));

        let periodic = Condition::periodic(Duration::from_millis(5));
        assert_eq!(
            periodic.args().value::<u64>("recess_period").unwrap(),
            Some(5_000_000)
        );
        assert_eq!(
            periodic.args().value::<String>("policy").unwrap().as_deref(),
            Some("CatchUpMissedTicks")
        );
    }

    #[test]
    fn test_registered_condition_keeps_its_name() {
        let mut condition = Condition::count(2).named("budget");
        condition.register("ping", 7);

        let condition = condition.named("renamed");

        assert_eq!(condition.name(), "budget");
        assert_eq!(condition.args().value::<u64>("count").unwrap(), Some(2));
    }

    #[test]
    fn test_handles_exist_only_for_their_kinds() {
        assert!(Condition::boolean(true).boolean_handle().is_some());
        assert!(Condition::asynchronous().async_handle().is_some());
        assert!(Condition::count(1).boolean_handle().is_none());
        assert!(Condition::count(1).async_handle().is_none());
    }

    #[test]
    fn test_boolean_constructor_sets_initial_state() {
        let handle = Condition::boolean(false).boolean_handle().unwrap();
        assert!(!handle.is_enabled());
    }

    #[test]
    fn test_clones_share_handles() {
        let condition = Condition::boolean(true).named("stop_flag");
        let copy = condition.clone();
        copy.boolean_handle().unwrap().disable_tick();
        assert!(!condition.boolean_handle().unwrap().is_enabled());
        assert_eq!(copy.name(), "stop_flag");
    }

    #[test]
    fn test_modes_and_policies_parse() {
        assert_eq!("PerReceiver".parse::<SamplingMode>(), Ok(SamplingMode::PerReceiver));
        assert_eq!("sum_of_all".parse::<SamplingMode>(), Ok(SamplingMode::SumOfAll));
        assert_eq!(
            "NoCatchUpMissedTicks".parse::<PeriodicPolicy>(),
            Ok(PeriodicPolicy::NoCatchUpMissedTicks)
        );
        assert!("sometimes".parse::<PeriodicPolicy>().is_err());
    }
}
