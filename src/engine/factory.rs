// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::schedulers::{EventBasedScheduler, GreedyScheduler, MultiThreadScheduler};
use crate::engine::Scheduler;
use crate::scheduler::{SchedulerConfig, SchedulerKind};

/// Factory for creating schedulers from configuration
pub(crate) struct SchedulerFactory;

impl SchedulerFactory {
    /// Create a scheduler for the configured strategy
    pub(crate) fn from_config(config: &SchedulerConfig) -> Box<dyn Scheduler> {
        match config.kind {
            SchedulerKind::Greedy => Box::new(GreedyScheduler),
            SchedulerKind::MultiThread => {
                Box::new(MultiThreadScheduler::new(config.check_recession_period))
            }
            SchedulerKind::EventBased => Box::new(EventBasedScheduler),
        }
    }
}
