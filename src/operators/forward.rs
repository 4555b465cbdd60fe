// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::operator::{ComputeError, ExecutionContext, InputContext, Operator, OperatorLogic, OutputContext};
use crate::spec::OperatorSpec;

/// Passes every message from `in` to `out` unchanged.
#[derive(Debug, Default)]
pub struct Forward;

impl Forward {
    pub fn operator(name: &str) -> Operator {
        Operator::new(name, Forward)
    }
}

impl OperatorLogic for Forward {
    fn setup(&self, spec: &mut OperatorSpec) {
        spec.input("in");
        spec.output("out");
    }

    fn compute(
        &mut self,
        input: &mut InputContext,
        output: &mut OutputContext,
        _context: &mut ExecutionContext,
    ) -> Result<(), ComputeError> {
        for message in input.receive_all("in") {
            output.emit("out", message)?;
        }
        Ok(())
    }
}
