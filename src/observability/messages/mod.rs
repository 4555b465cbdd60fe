// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message type implements `Display` for the human-readable line and
//! [`StructuredLog`] to emit it at its level with structured fields.
//!
//! # Organization
//!
//! * `graph` - port declarations, flows, fragments, and configuration files
//! * `engine` - fragment lifecycle, scheduling outcomes, driver and worker events
//! * `transport` - queue overflow and network edge events
//!
//! # Usage Pattern
//!
//! ```rust
//! use the_sluice::observability::messages::engine::FragmentStarted;
//! use the_sluice::observability::messages::StructuredLog;
//!
//! let msg = FragmentStarted {
//!     fragment: "tx",
//!     scheduler: "greedy",
//!     operator_count: 2,
//!     worker_threads: 1,
//! };
//!
//! msg.log();
//! ```

pub mod engine;
pub mod graph;
pub mod transport;

use tracing::Span;

/// A message that knows its own log level and structured fields.
pub trait StructuredLog {
    /// Emits the message as a tracing event.
    fn log(&self);

    /// Creates a span carrying the message's fields.
    fn span(&self, name: &str) -> Span;
}
