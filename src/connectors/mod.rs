// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Transports that move messages from an output port to an input port.
//!
//! Every input port owns one or more [`MessageQueue`]s. An edge inside a
//! fragment pushes straight into the downstream queue; an edge that crosses
//! fragments goes through a [`NetworkTransmitter`] and a
//! [`NetworkReceiver`] that fills the same kind of queue on the far side.
//! Operators only ever see [`Transmitter`] and the queue, so they behave the
//! same either way.

mod message;
mod network;
mod queue;
pub mod wire;

pub use message::{CodecRegistry, Message};
pub use network::{NetworkReceiver, NetworkSettings, NetworkTransmitter};
pub(crate) use network::connect_with_retry;
pub use queue::{MessageQueue, PushOutcome};

use crate::errors::TransportError;
use crate::spec::ConnectorType;
use std::sync::Arc;

/// Sending end of one edge.
#[derive(Debug, Clone)]
pub enum Transmitter {
    Local { edge: String, queue: Arc<MessageQueue> },
    Network(NetworkTransmitter),
}

impl Transmitter {
    pub fn local(edge: impl Into<String>, queue: Arc<MessageQueue>) -> Self {
        Transmitter::Local {
            edge: edge.into(),
            queue,
        }
    }

    /// Edge label, `upstream.port -> downstream.port`.
    pub fn edge(&self) -> &str {
        match self {
            Transmitter::Local { edge, .. } => edge,
            Transmitter::Network(tx) => tx.edge(),
        }
    }

    pub fn connector_type(&self) -> ConnectorType {
        match self {
            Transmitter::Local { .. } => ConnectorType::DoubleBuffer,
            Transmitter::Network(_) => ConnectorType::Network,
        }
    }

    /// Hands a message to the edge. Overflow is handled by the queue policy
    /// and is not an error.
    pub fn send(&self, message: Message) -> Result<(), TransportError> {
        match self {
            Transmitter::Local { queue, .. } => {
                queue.push(message);
                Ok(())
            }
            Transmitter::Network(tx) => tx.send(message).map(|_| ()),
        }
    }

    /// Slots the downstream side can still take.
    pub fn free_capacity(&self) -> usize {
        match self {
            Transmitter::Local { queue, .. } => queue.free_capacity(),
            Transmitter::Network(tx) => tx.free_capacity(),
        }
    }
}
