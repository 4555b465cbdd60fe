// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::conditions::{AsyncHandle, BooleanHandle};
use crate::scheduler::FragmentController;
use std::collections::HashMap;

/// What an operator can see and control about the run it is part of.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    fragment: String,
    operator: String,
    tick: u64,
    controller: FragmentController,
    booleans: HashMap<String, BooleanHandle>,
    asyncs: HashMap<String, AsyncHandle>,
}

impl ExecutionContext {
    pub(crate) fn new(
        fragment: &str,
        operator: &str,
        controller: FragmentController,
        booleans: HashMap<String, BooleanHandle>,
        asyncs: HashMap<String, AsyncHandle>,
    ) -> Self {
        Self {
            fragment: fragment.to_string(),
            operator: operator.to_string(),
            tick: 0,
            controller,
            booleans,
            asyncs,
        }
    }

    pub fn fragment_name(&self) -> &str {
        &self.fragment
    }

    pub fn operator_name(&self) -> &str {
        &self.operator
    }

    /// Tick number of the current dispatch, starting at 1.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub(crate) fn set_tick(&mut self, tick: u64) {
        self.tick = tick;
    }

    /// Asks the fragment to stop after the current tick.
    pub fn stop_fragment(&self) {
        self.controller.stop();
    }

    /// Handle of one of this operator's boolean conditions, by condition name.
    pub fn boolean_condition(&self, name: &str) -> Option<&BooleanHandle> {
        self.booleans.get(name)
    }

    /// Handle of one of this operator's asynchronous conditions, by condition name.
    pub fn async_condition(&self, name: &str) -> Option<&AsyncHandle> {
        self.asyncs.get(name)
    }
}
