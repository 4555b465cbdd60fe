// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Small ready-made operators for wiring checks, demos, and tests.
//!
//! All of them exchange `i64` values under the [`PING_TYPE`] message type
//! name, which [`register_codecs`] makes transmissible over network edges.

pub mod forward;
pub mod ping;

pub use forward::Forward;
pub use ping::{PingMultiRx, PingMx, PingRx, PingTx, Received};

use crate::connectors::CodecRegistry;

/// Message type name used by the ping operators.
pub const PING_TYPE: &str = "i64";

/// Registers every message type the bundled operators emit.
pub fn register_codecs(codecs: &mut CodecRegistry) {
    codecs.register::<i64>(PING_TYPE);
}
