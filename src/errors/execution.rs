// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::{ConfigError, TransportError};
use crate::scheduler::FragmentState;
use thiserror::Error;

/// Errors raised while initializing or running fragments.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    /// The requested lifecycle transition is not allowed from the current state.
    #[error("Fragment '{fragment}' cannot move from {from} to {to}")]
    InvalidTransition {
        fragment: String,
        from: FragmentState,
        to: FragmentState,
    },

    /// A component's initialize or start hook failed.
    #[error("Component '{component}' failed to initialize: {reason}")]
    InitializationFailed { component: String, reason: String },

    /// An operator's compute returned an error.
    #[error("Operator '{operator}' failed: {reason}")]
    OperatorFailed { operator: String, reason: String },

    /// A worker pool could not be created.
    #[error("Worker pool '{pool}' could not be started: {reason}")]
    WorkerPool { pool: String, reason: String },

    /// The driver and workers disagreed about the protocol.
    #[error("Protocol error: {reason}")]
    Protocol { reason: String },

    /// One or more fragments reported failure.
    #[error("{} fragment(s) failed: {}", .failures.len(), .failures.iter().map(|(f, r)| format!("{}: {}", f, r)).collect::<Vec<_>>().join("; "))]
    FragmentsFailed { failures: Vec<(String, String)> },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Internal runtime failure.
    #[error("Internal error: {message}")]
    InternalError { message: String },
}
