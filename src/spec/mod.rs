// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Port and operator declarations produced by an operator's `setup` hook.

mod io_spec;
mod operator_spec;

pub use io_spec::{ConnectorSpec, ConnectorType, IOSpec, IOType, QueuePolicy, QueueSize};
pub use operator_spec::{MultiPortCondition, OperatorSpec, ParamSpec};
