// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::args::ArgList;
use crate::conditions::Condition;
use crate::operator::{ComputeError, ExecutionContext, InputContext, Operator, OperatorLogic, OutputContext};
use crate::operators::PING_TYPE;
use crate::spec::OperatorSpec;
use parking_lot::Mutex;
use std::sync::Arc;

/// Values collected by a receiving operator, shared with the caller.
pub type Received = Arc<Mutex<Vec<i64>>>;

/// Emits 1, 2, 3, ... on its output port, once per dispatch.
#[derive(Debug)]
pub struct PingTx {
    port: String,
    next: i64,
}

impl PingTx {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            next: 1,
        }
    }

    /// A transmitter on port `out` that stops after `count` messages.
    pub fn operator(name: &str, count: u64) -> Operator {
        Self::operator_on(name, "out", count)
    }

    /// A transmitter on a custom port that stops after `count` messages.
    pub fn operator_on(name: &str, port: &str, count: u64) -> Operator {
        Operator::new(name, PingTx::new(port))
            .with_condition(Condition::count(count).named(format!("{}_count", name)))
    }
}

impl OperatorLogic for PingTx {
    fn setup(&self, spec: &mut OperatorSpec) {
        spec.output(&self.port);
    }

    fn compute(
        &mut self,
        _input: &mut InputContext,
        output: &mut OutputContext,
        context: &mut ExecutionContext,
    ) -> Result<(), ComputeError> {
        let value = self.next;
        self.next += 1;
        output.emit_value(&self.port, PING_TYPE, &value)?;
        tracing::debug!(operator = context.operator_name(), value, "sent");
        Ok(())
    }
}

/// Records every value arriving on port `in`.
#[derive(Debug)]
pub struct PingRx {
    received: Received,
}

impl PingRx {
    pub fn new(received: Received) -> Self {
        Self { received }
    }

    /// The operator plus a handle on the values it will record.
    pub fn operator(name: &str) -> (Operator, Received) {
        let received = Received::default();
        (Operator::new(name, PingRx::new(received.clone())), received)
    }
}

impl OperatorLogic for PingRx {
    fn setup(&self, spec: &mut OperatorSpec) {
        spec.input("in");
    }

    fn compute(
        &mut self,
        input: &mut InputContext,
        _output: &mut OutputContext,
        context: &mut ExecutionContext,
    ) -> Result<(), ComputeError> {
        while let Some(value) = input.receive_value::<i64>("in")? {
            tracing::debug!(operator = context.operator_name(), value, "received");
            self.received.lock().push(value);
        }
        Ok(())
    }
}

/// Multiplies each value on `in` by its `multiplier` argument (default 2)
/// and emits the product on `out`.
#[derive(Debug)]
pub struct PingMx {
    multiplier: i64,
}

impl Default for PingMx {
    fn default() -> Self {
        Self { multiplier: 2 }
    }
}

impl PingMx {
    pub fn operator(name: &str) -> Operator {
        Operator::new(name, PingMx::default())
    }
}

impl OperatorLogic for PingMx {
    fn setup(&self, spec: &mut OperatorSpec) {
        spec.input("in");
        spec.output("out");
        spec.param("multiplier", Some(2i64.into()), "Factor applied to every value");
    }

    fn initialize(&mut self, args: &ArgList) -> Result<(), ComputeError> {
        if let Some(multiplier) = args.value::<i64>("multiplier")? {
            self.multiplier = multiplier;
        }
        Ok(())
    }

    fn compute(
        &mut self,
        input: &mut InputContext,
        output: &mut OutputContext,
        _context: &mut ExecutionContext,
    ) -> Result<(), ComputeError> {
        while let Some(value) = input.receive_value::<i64>("in")? {
            output.emit_value("out", PING_TYPE, &(value * self.multiplier))?;
        }
        Ok(())
    }
}

/// Waits for one value on each of its ports, then records them in port order.
#[derive(Debug)]
pub struct PingMultiRx {
    ports: Vec<String>,
    received: Received,
}

impl PingMultiRx {
    pub fn operator(name: &str, ports: &[&str]) -> (Operator, Received) {
        let received = Received::default();
        let logic = PingMultiRx {
            ports: ports.iter().map(|p| p.to_string()).collect(),
            received: received.clone(),
        };
        (Operator::new(name, logic), received)
    }
}

impl OperatorLogic for PingMultiRx {
    fn setup(&self, spec: &mut OperatorSpec) {
        for port in &self.ports {
            spec.input(port);
        }
    }

    fn compute(
        &mut self,
        input: &mut InputContext,
        _output: &mut OutputContext,
        _context: &mut ExecutionContext,
    ) -> Result<(), ComputeError> {
        let mut values = Vec::with_capacity(self.ports.len());
        for port in &self.ports {
            if let Some(value) = input.receive_value::<i64>(port)? {
                values.push(value);
            }
        }
        self.received.lock().extend(values);
        Ok(())
    }
}
