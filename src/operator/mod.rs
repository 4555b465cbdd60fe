// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Operators: named units of computation with declared ports.
//!
//! What an operator computes lives behind [`OperatorLogic`]. The engine
//! only calls its hooks: `setup` once when the operator joins a fragment,
//! `initialize` and `start` once before the first tick, `compute` every
//! time the operator's conditions allow it, and `stop` at the end.
//!
//! ```rust
//! use the_sluice::component::Component;
//! use the_sluice::operator::{ComputeError, ExecutionContext, InputContext, Operator, OperatorLogic, OutputContext};
//! use the_sluice::spec::OperatorSpec;
//!
//! struct Doubler;
//!
//! impl OperatorLogic for Doubler {
//!     fn setup(&self, spec: &mut OperatorSpec) {
//!         spec.input("in");
//!         spec.output("out");
//!     }
//!
//!     fn compute(
//!         &mut self,
//!         input: &mut InputContext,
//!         output: &mut OutputContext,
//!         _context: &mut ExecutionContext,
//!     ) -> Result<(), ComputeError> {
//!         if let Some(value) = input.receive_value::<i64>("in")? {
//!             output.emit_value("out", "i64", &(value * 2))?;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let op = Operator::new("doubler", Doubler);
//! assert_eq!(op.id(), -1);
//! ```

mod execution_context;
mod io_context;

pub use execution_context::ExecutionContext;
pub use io_context::{InputContext, OutputContext};

use crate::args::{Arg, ArgList};
use crate::component::{Component, ComponentBase};
use crate::conditions::Condition;
use crate::errors::ConfigError;
use crate::spec::OperatorSpec;
use std::fmt::{Debug, Formatter};

/// Error type returned by operator hooks.
pub type ComputeError = Box<dyn std::error::Error + Send + Sync>;

/// The business logic of an operator.
pub trait OperatorLogic: Send + 'static {
    /// Declares ports, parameters, and multi-port conditions.
    fn setup(&self, spec: &mut OperatorSpec);

    /// Receives the operator's arguments once before the first tick.
    fn initialize(&mut self, _args: &ArgList) -> Result<(), ComputeError> {
        Ok(())
    }

    fn start(&mut self) -> Result<(), ComputeError> {
        Ok(())
    }

    /// Runs one step. Never preempted by the engine.
    fn compute(
        &mut self,
        input: &mut InputContext,
        output: &mut OutputContext,
        context: &mut ExecutionContext,
    ) -> Result<(), ComputeError>;

    fn stop(&mut self) {}
}

/// An operator: identity, arguments, operator-level conditions, and logic.
pub struct Operator {
    base: ComponentBase,
    conditions: Vec<Condition>,
    spec: Option<OperatorSpec>,
    logic: Option<Box<dyn OperatorLogic>>,
}

impl Operator {
    pub fn new(name: impl Into<String>, logic: impl OperatorLogic) -> Self {
        Self {
            base: ComponentBase::new(name),
            conditions: Vec::new(),
            spec: None,
            logic: Some(Box::new(logic)),
        }
    }

    /// Adds an operator-level condition such as `count` or `periodic`.
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_arg(mut self, arg: Arg) -> Self {
        if let Err(err) = self.base.add_arg(arg) {
            tracing::error!(operator = self.base.name(), "{}", err);
        }
        self
    }

    pub fn with_args(mut self, args: ArgList) -> Self {
        self.base.add_args(args);
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Port declarations; present once the operator joined a fragment.
    pub fn spec(&self) -> Option<&OperatorSpec> {
        self.spec.as_ref()
    }

    /// Adjusts ports after setup, before the fragment initializes.
    pub fn spec_mut(&mut self) -> Option<&mut OperatorSpec> {
        self.spec.as_mut()
    }

    /// Runs `setup` and returns the problems it recorded.
    pub(crate) fn run_setup(&mut self) -> Vec<ConfigError> {
        let mut spec = OperatorSpec::new(self.base.name());
        if let Some(logic) = &self.logic {
            logic.setup(&mut spec);
        }
        let issues = spec.issues().to_vec();
        self.spec = Some(spec);
        issues
    }

    pub(crate) fn register(&mut self, fragment: &str, id: i64) {
        self.base.register(fragment, id);
    }

    pub(crate) fn conditions_mut(&mut self) -> &mut [Condition] {
        &mut self.conditions
    }

    pub(crate) fn take_logic(&mut self) -> Option<Box<dyn OperatorLogic>> {
        self.logic.take()
    }

    pub fn description(&self) -> String {
        let mut text = self.base.description();
        if let Some(spec) = &self.spec {
            text.push('\n');
            text.push_str(&spec.description());
        }
        text
    }
}

impl Component for Operator {
    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }
}

impl Debug for Operator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operator")
            .field("base", &self.base)
            .field("conditions", &self.conditions)
            .field("spec", &self.spec)
            .field("has_logic", &self.logic.is_some())
            .finish()
    }
}
