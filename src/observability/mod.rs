// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! Diagnostic and operational log lines are centralised as message types
//! with a `Display` implementation, so that:
//!
//! * Log wording lives in one place instead of being scattered as literals
//! * Every message carries the same structured fields wherever it is logged
//! * Tests can assert on rendered messages
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::graph` - composition and wiring diagnostics
//! * `messages::engine` - fragment lifecycle, ticks, and distributed roles
//! * `messages::transport` - queues, binding, connecting, and edge failures
//!
//! # Usage
//!
//! ```rust
//! use the_sluice::observability::messages::graph::ReservedFragmentName;
//! use the_sluice::observability::messages::StructuredLog;
//!
//! let msg = ReservedFragmentName { name: "all" };
//! msg.log();
//! assert!(msg.to_string().contains("reserved"));
//! ```

pub mod messages;

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
