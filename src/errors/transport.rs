// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Errors raised while moving messages between operators.
///
/// Network failures are reported per edge; a broken connection never takes
/// down the process.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Failed to bind '{address}': {reason}")]
    Bind { address: String, reason: String },

    #[error("Failed to connect edge '{edge}' to {address}: {reason}")]
    Connect {
        edge: String,
        address: String,
        reason: String,
    },

    #[error("Connection for edge '{edge}' was lost: {reason}")]
    ConnectionLost { edge: String, reason: String },

    #[error("Handshake failed: {reason}")]
    Handshake { reason: String },

    #[error("Frame of {size} bytes exceeds the limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("Codec error for type '{type_name}': {reason}")]
    Codec { type_name: String, reason: String },

    #[error("No codec registered for message type '{type_name}'")]
    UnregisteredType { type_name: String },

    #[error("Output port '{port}' is not declared")]
    UnknownPort { port: String },

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}
