// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for queue and network transport events.
//!
//! This module contains message types for logging events related to:
//! * Queue overflow handling
//! * Network receiver binding and transmitter connection
//! * Per-edge connection failures and rejected payloads

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use tracing::Span;

/// A queue dropped a message because the stage was full.
///
/// # Log Level
/// `warn!` - Data loss under the fault policy
///
/// # Example
/// ```
/// use the_sluice::observability::messages::transport::QueueOverflow;
///
/// let msg = QueueOverflow { queue: "rx.in", stage: "back", capacity: 1 };
/// assert!(msg.to_string().contains("rx.in"));
/// ```
pub struct QueueOverflow<'a> {
    pub queue: &'a str,
    pub stage: &'a str,
    pub capacity: usize,
}

impl Display for QueueOverflow<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Queue '{}' {} stage is full (capacity {}); dropping incoming message",
            self.queue, self.stage, self.capacity
        )
    }
}

impl StructuredLog for QueueOverflow<'_> {
    fn log(&self) {
        tracing::warn!(
            queue = self.queue,
            stage = self.stage,
            capacity = self.capacity,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "queue_overflow",
            span_name = name,
            queue = self.queue,
            stage = self.stage,
            capacity = self.capacity,
        )
    }
}

/// A network receiver is listening for its upstream peers.
///
/// # Log Level
/// `info!` - Setup milestone
pub struct ReceiverBound<'a> {
    pub target: &'a str,
    pub address: SocketAddr,
    pub expected_peers: usize,
}

impl Display for ReceiverBound<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Receiver for '{}' listening on {} (expecting {} peer(s))",
            self.target, self.address, self.expected_peers
        )
    }
}

impl StructuredLog for ReceiverBound<'_> {
    fn log(&self) {
        tracing::info!(
            target_port = self.target,
            address = %self.address,
            expected_peers = self.expected_peers,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "receiver",
            span_name = name,
            target_port = self.target,
            address = %self.address,
        )
    }
}

/// A transmitter finished its handshake.
///
/// # Log Level
/// `info!` - Setup milestone
pub struct TransmitterConnected<'a> {
    pub edge: &'a str,
    pub address: SocketAddr,
    pub capacity: usize,
}

impl Display for TransmitterConnected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Edge '{}' connected to {} (receiver capacity {})",
            self.edge, self.address, self.capacity
        )
    }
}

impl StructuredLog for TransmitterConnected<'_> {
    fn log(&self) {
        tracing::info!(
            edge = self.edge,
            address = %self.address,
            capacity = self.capacity,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "transmitter",
            span_name = name,
            edge = self.edge,
            address = %self.address,
        )
    }
}

/// A connection attempt failed and will be retried.
///
/// # Log Level
/// `debug!` - Expected while peers start up
pub struct ConnectRetry<'a> {
    pub edge: &'a str,
    pub address: SocketAddr,
    pub attempt: u32,
    pub reason: &'a str,
}

impl Display for ConnectRetry<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Edge '{}' could not reach {} (attempt {}): {}",
            self.edge, self.address, self.attempt, self.reason
        )
    }
}

impl StructuredLog for ConnectRetry<'_> {
    fn log(&self) {
        tracing::debug!(
            edge = self.edge,
            address = %self.address,
            attempt = self.attempt,
            reason = self.reason,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("connect_retry", span_name = name, edge = self.edge)
    }
}

/// A connection carrying an edge failed.
///
/// # Log Level
/// `error!` - The edge stops delivering; other edges continue
pub struct EdgeConnectionLost<'a> {
    pub edge: &'a str,
    pub reason: &'a str,
}

impl Display for EdgeConnectionLost<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Connection for edge '{}' lost: {}", self.edge, self.reason)
    }
}

impl StructuredLog for EdgeConnectionLost<'_> {
    fn log(&self) {
        tracing::error!(edge = self.edge, reason = self.reason, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("edge_lost", span_name = name, edge = self.edge)
    }
}

/// A peer failed the handshake and was disconnected.
///
/// # Log Level
/// `warn!`
pub struct HandshakeRejected<'a> {
    pub peer: SocketAddr,
    pub reason: &'a str,
}

impl Display for HandshakeRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Rejected connection from {}: {}", self.peer, self.reason)
    }
}

impl StructuredLog for HandshakeRejected<'_> {
    fn log(&self) {
        tracing::warn!(peer = %self.peer, reason = self.reason, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("handshake", span_name = name, peer = %self.peer)
    }
}

/// Upstream peers never showed up before the wait expired.
///
/// # Log Level
/// `warn!` - The receiving operator may stop waiting for them
pub struct PeerNeverConnected<'a> {
    pub target: &'a str,
    pub missing: usize,
}

impl Display for PeerNeverConnected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Receiver for '{}' stopped waiting for {} peer(s) that never connected",
            self.target, self.missing
        )
    }
}

impl StructuredLog for PeerNeverConnected<'_> {
    fn log(&self) {
        tracing::warn!(target_port = self.target, missing = self.missing, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("peer_wait", span_name = name, target_port = self.target)
    }
}

/// An incoming message failed codec validation and was dropped.
///
/// # Log Level
/// `warn!`
pub struct RemoteMessageRejected<'a> {
    pub target: &'a str,
    pub type_name: &'a str,
    pub reason: &'a str,
}

impl Display for RemoteMessageRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Dropped '{}' message for '{}': {}",
            self.type_name, self.target, self.reason
        )
    }
}

impl StructuredLog for RemoteMessageRejected<'_> {
    fn log(&self) {
        tracing::warn!(
            target_port = self.target,
            type_name = self.type_name,
            reason = self.reason,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("remote_message", span_name = name, type_name = self.type_name)
    }
}

