// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Scheduler selection, fragment lifecycle, and run control.

mod state;
mod wakeup;

pub use state::{FragmentController, FragmentState, StateCell};
pub(crate) use wakeup::WakeSlot;

use crate::args::ArgList;
use crate::config::consts::{
    DEFAULT_CHECK_RECESSION_PERIOD_MS, ENV_CHECK_RECESSION_PERIOD_MS, ENV_MAX_DURATION_MS,
    ENV_STOP_ON_DEADLOCK_TIMEOUT,
};
use crate::errors::ConfigError;
use crate::observability::messages::engine::InvalidEnvOverride;
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

/// How a fragment dispatches ready operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerKind {
    /// One at a time, in graph order.
    #[default]
    Greedy,
    /// Concurrent dispatch; polls every check-recession period.
    MultiThread,
    /// Concurrent dispatch; sleeps until woken or until the next timed wait.
    EventBased,
}

impl SchedulerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerKind::Greedy => "greedy",
            SchedulerKind::MultiThread => "multi_thread",
            SchedulerKind::EventBased => "event_based",
        }
    }

    pub fn is_concurrent(&self) -> bool {
        !matches!(self, SchedulerKind::Greedy)
    }
}

impl FromStr for SchedulerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "greedy" => Ok(SchedulerKind::Greedy),
            "multi_thread" | "multithread" => Ok(SchedulerKind::MultiThread),
            "event_based" | "eventbased" => Ok(SchedulerKind::EventBased),
            other => Err(format!("unknown scheduler '{}'", other)),
        }
    }
}

impl Display for SchedulerKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunables of one fragment's scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub kind: SchedulerKind,
    /// Threads of the default worker pool. Greedy always uses one.
    pub worker_threads: usize,
    pub stop_on_deadlock: bool,
    /// How long a deadlock must persist before the fragment stops.
    pub stop_on_deadlock_timeout: Duration,
    pub max_duration: Option<Duration>,
    pub check_recession_period: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            kind: SchedulerKind::Greedy,
            worker_threads: 1,
            stop_on_deadlock: true,
            stop_on_deadlock_timeout: Duration::ZERO,
            max_duration: None,
            check_recession_period: Duration::from_millis(DEFAULT_CHECK_RECESSION_PERIOD_MS),
        }
    }
}

impl SchedulerConfig {
    pub fn greedy() -> Self {
        Self::default()
    }

    pub fn multi_thread(worker_threads: usize) -> Self {
        Self {
            kind: SchedulerKind::MultiThread,
            worker_threads: worker_threads.max(1),
            ..Self::default()
        }
    }

    pub fn event_based(worker_threads: usize) -> Self {
        Self {
            kind: SchedulerKind::EventBased,
            worker_threads: worker_threads.max(1),
            ..Self::default()
        }
    }

    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = Some(max_duration);
        self
    }

    /// Threads the default pool actually gets.
    pub fn effective_workers(&self) -> usize {
        match self.kind {
            SchedulerKind::Greedy => 1,
            _ => self.worker_threads.max(1),
        }
    }

    /// Reads a configuration from arguments, typically `fragment.from_config("scheduler")`.
    ///
    /// Recognised keys: `scheduler`, `worker_thread_number`, `stop_on_deadlock`,
    /// `stop_on_deadlock_timeout` (ms), `max_duration_ms`, `check_recession_period_ms`.
    pub fn from_args(args: &ArgList) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let component = if args.name().is_empty() { "scheduler" } else { args.name() };

        if let Some(kind) = args.value::<String>("scheduler")? {
            config.kind = kind.parse().map_err(|reason| ConfigError::InvalidValue {
                component: component.to_string(),
                arg: "scheduler".to_string(),
                reason,
            })?;
        }
        if let Some(threads) = args.value::<usize>("worker_thread_number")? {
            config.worker_threads = threads.max(1);
        }
        if let Some(stop) = args.value::<bool>("stop_on_deadlock")? {
            config.stop_on_deadlock = stop;
        }
        if let Some(ms) = args.value::<i64>("stop_on_deadlock_timeout")? {
            config.stop_on_deadlock_timeout = Duration::from_millis(ms.max(0) as u64);
        }
        if let Some(ms) = args.value::<i64>("max_duration_ms")? {
            config.max_duration = (ms >= 0).then(|| Duration::from_millis(ms as u64));
        }
        if let Some(ms) = args.value::<u64>("check_recession_period_ms")? {
            config.check_recession_period = Duration::from_millis(ms);
        }
        Ok(config)
    }

    /// Applies `SLUICE_*` environment overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Applies overrides read through `lookup`; unparsable values are logged and ignored.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read_ms = |variable: &str| -> Option<u64> {
            let value = lookup(variable)?;
            match value.trim().parse::<u64>() {
                Ok(ms) => Some(ms),
                Err(_) => {
                    InvalidEnvOverride {
                        variable,
                        value: &value,
                    }
                    .log();
                    None
                }
            }
        };

        if let Some(ms) = read_ms(ENV_STOP_ON_DEADLOCK_TIMEOUT) {
            self.stop_on_deadlock_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = read_ms(ENV_MAX_DURATION_MS) {
            self.max_duration = Some(Duration::from_millis(ms));
        }
        if let Some(ms) = read_ms(ENV_CHECK_RECESSION_PERIOD_MS) {
            self.check_recession_period = Duration::from_millis(ms);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::Arg;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.kind, SchedulerKind::Greedy);
        assert!(config.stop_on_deadlock);
        assert_eq!(config.stop_on_deadlock_timeout, Duration::ZERO);
        assert_eq!(config.max_duration, None);
        assert_eq!(config.effective_workers(), 1);
    }

    #[test]
    fn test_from_args_reads_known_keys() {
        let mut args = ArgList::named("scheduler");
        args.add(Arg::new("scheduler", "event_based")).unwrap();
        args.add(Arg::new("worker_thread_number", 3i64)).unwrap();
        args.add(Arg::new("stop_on_deadlock", false)).unwrap();
        args.add(Arg::new("max_duration_ms", 250i64)).unwrap();

        let config = SchedulerConfig::from_args(&args).unwrap();
        assert_eq!(config.kind, SchedulerKind::EventBased);
        assert_eq!(config.effective_workers(), 3);
        assert!(!config.stop_on_deadlock);
        assert_eq!(config.max_duration, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_from_args_rejects_unknown_scheduler() {
        let mut args = ArgList::new();
        args.add(Arg::new("scheduler", "round_robin")).unwrap();
        assert!(matches!(
            SchedulerConfig::from_args(&args),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_env_overrides_apply_and_ignore_garbage() {
        let config = SchedulerConfig::default().with_overrides_from(|name| match name {
            ENV_MAX_DURATION_MS => Some("1500".to_string()),
            ENV_STOP_ON_DEADLOCK_TIMEOUT => Some("soon".to_string()),
            _ => None,
        });
        assert_eq!(config.max_duration, Some(Duration::from_millis(1500)));
        assert_eq!(config.stop_on_deadlock_timeout, Duration::ZERO);
    }

    #[test]
    fn test_greedy_ignores_worker_count() {
        let mut config = SchedulerConfig::greedy();
        config.worker_threads = 8;
        assert_eq!(config.effective_workers(), 1);
        assert_eq!(SchedulerConfig::multi_thread(0).effective_workers(), 1);
    }
}
