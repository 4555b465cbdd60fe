// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Driver/worker coordination for applications split across processes.
//!
//! The driver owns the fragment list. Workers register with optional target
//! fragment names and receive assignments. Each worker binds the network
//! receivers of its fragments and reports their addresses; once every worker
//! has done so the driver broadcasts the full endpoint map, workers connect
//! their transmitters and run, and report one outcome per fragment.
//! Control frames use the same length-prefixed JSON framing as data edges.

mod driver;
mod protocol;
mod worker;

pub use driver::{allocate, Driver, DriverReport, FragmentAssignment};
pub use protocol::{ControlMessage, Endpoints};
pub use worker::Worker;
