// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! TCP transport for edges that cross a fragment boundary.
//!
//! A [`NetworkReceiver`] listens on behalf of one receive queue; each
//! upstream [`NetworkTransmitter`] opens its own connection, introduces
//! itself with the qualified name of the input it feeds, and learns the
//! receiver's capacity and overflow policy in return. The transmitter's
//! outbox holds at most that many unsent messages and applies the same
//! policy when full. Messages on one connection arrive in send order. A
//! broken connection only affects its own edge.

use crate::config::consts::{
    DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_RETRY_DELAY_MS, DEFAULT_PEER_WAIT_MS,
};
use crate::connectors::wire::{read_frame, write_frame};
use crate::connectors::{CodecRegistry, Message, MessageQueue, PushOutcome};
use crate::errors::TransportError;
use crate::spec::QueuePolicy;
use crate::observability::messages::transport::{
    ConnectRetry, EdgeConnectionLost, HandshakeRejected, PeerNeverConnected, QueueOverflow,
    ReceiverBound, RemoteMessageRejected, TransmitterConnected,
};
use crate::observability::messages::StructuredLog;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio_util::sync::{CancellationToken, DropGuard};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum DataFrame {
    Hello { target: String },
    Welcome { capacity: usize, policy: u8 },
    Data { message: Message },
    Bye,
}

/// Connection timing for network edges.
#[derive(Debug, Clone)]
pub struct NetworkSettings {
    /// Attempts made before a transmitter gives up connecting.
    pub connect_attempts: u32,
    pub connect_retry_delay: Duration,
    /// How long a receiver keeps waiting for upstream peers that have not connected.
    pub peer_wait: Duration,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            connect_retry_delay: Duration::from_millis(DEFAULT_CONNECT_RETRY_DELAY_MS),
            peer_wait: Duration::from_millis(DEFAULT_PEER_WAIT_MS),
        }
    }
}

/// Listening side of one or more network edges feeding a single queue.
///
/// Dropping the receiver stops accepting and closes its connections.
#[derive(Debug)]
pub struct NetworkReceiver {
    target: String,
    local_addr: SocketAddr,
    _guard: DropGuard,
}

impl NetworkReceiver {
    /// Binds a listener for `target` (`fragment.operator.port`).
    ///
    /// The queue counts `expected_peers` as pending remote feeders until
    /// they connect and hang up, or until the peer wait elapses.
    pub async fn bind(
        target: impl Into<String>,
        address: SocketAddr,
        queue: Arc<MessageQueue>,
        expected_peers: usize,
        codecs: Arc<CodecRegistry>,
        settings: &NetworkSettings,
        cancel: &CancellationToken,
    ) -> Result<Self, TransportError> {
        let target = target.into();
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| TransportError::Bind {
                address: address.to_string(),
                reason: e.to_string(),
            })?;
        let local_addr = listener.local_addr()?;
        ReceiverBound {
            target: &target,
            address: local_addr,
            expected_peers,
        }
        .log();

        queue.add_remote_feeders(expected_peers);
        let token = cancel.child_token();
        tokio::spawn(accept_loop(
            listener,
            target.clone(),
            queue,
            expected_peers,
            codecs,
            settings.peer_wait,
            token.clone(),
        ));

        Ok(Self {
            target,
            local_addr,
            _guard: token.drop_guard(),
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

async fn accept_loop(
    listener: TcpListener,
    target: String,
    queue: Arc<MessageQueue>,
    expected_peers: usize,
    codecs: Arc<CodecRegistry>,
    peer_wait: Duration,
    cancel: CancellationToken,
) {
    let mut pending = expected_peers;
    let deadline = tokio::time::sleep(peer_wait);
    tokio::pin!(deadline);
    let mut deadline_passed = false;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = &mut deadline, if !deadline_passed => {
                deadline_passed = true;
                if pending > 0 {
                    PeerNeverConnected { target: &target, missing: pending }.log();
                    queue.remove_remote_feeders(pending);
                    pending = 0;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if pending > 0 {
                        pending -= 1;
                    } else {
                        queue.add_remote_feeders(1);
                    }
                    tokio::spawn(serve_connection(
                        stream,
                        peer,
                        target.clone(),
                        queue.clone(),
                        codecs.clone(),
                        cancel.clone(),
                    ));
                }
                Err(e) => {
                    EdgeConnectionLost { edge: &target, reason: &e.to_string() }.log();
                }
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    target: String,
    queue: Arc<MessageQueue>,
    codecs: Arc<CodecRegistry>,
    cancel: CancellationToken,
) {
    let (mut reader, mut writer) = stream.into_split();

    let handshake = match read_frame::<_, DataFrame>(&mut reader).await {
        Ok(Some(DataFrame::Hello { target: requested })) if requested == target => {
            write_frame(
                &mut writer,
                &DataFrame::Welcome {
                    capacity: queue.capacity(),
                    policy: queue.policy().code(),
                },
            )
            .await
        }
        Ok(Some(DataFrame::Hello { target: requested })) => Err(TransportError::Handshake {
            reason: format!("peer asked for '{}' but this endpoint serves '{}'", requested, target),
        }),
        Ok(_) => Err(TransportError::Handshake {
            reason: "expected a hello frame".to_string(),
        }),
        Err(e) => Err(e),
    };
    if let Err(err) = handshake {
        HandshakeRejected {
            peer,
            reason: &err.to_string(),
        }
        .log();
        queue.remove_remote_feeders(1);
        return;
    }

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = read_frame::<_, DataFrame>(&mut reader) => frame,
        };
        match frame {
            Ok(Some(DataFrame::Data { message })) => match codecs.validate(&message) {
                Ok(()) => {
                    if queue.policy() == QueuePolicy::Fault {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = queue.wait_for_space() => {}
                        }
                    }
                    queue.push(message);
                }
                Err(err) => RemoteMessageRejected {
                    target: &target,
                    type_name: message.type_name(),
                    reason: &err.to_string(),
                }
                .log(),
            },
            Ok(Some(DataFrame::Bye)) | Ok(None) => break,
            Ok(Some(_)) => {}
            Err(err) => {
                EdgeConnectionLost {
                    edge: &target,
                    reason: &err.to_string(),
                }
                .log();
                break;
            }
        }
    }
    queue.remove_remote_feeders(1);
}

#[derive(Debug, Default)]
struct EdgeState {
    failure: Mutex<Option<TransportError>>,
}

impl EdgeState {
    fn fail(&self, err: TransportError) {
        let mut failure = self.failure.lock();
        if failure.is_none() {
            *failure = Some(err);
        }
    }
}

/// Unsent messages of one edge, shared with its writer task.
#[derive(Debug, Default)]
struct Outbox {
    pending: Mutex<VecDeque<Message>>,
    ready: Notify,
    closed: AtomicBool,
}

impl Outbox {
    fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Next message to write; `None` once closed and drained.
    async fn next(&self) -> Option<Message> {
        loop {
            let next = self.pending.lock().pop_front();
            if next.is_some() {
                return next;
            }
            if self.closed.load(Ordering::SeqCst) {
                return None;
            }
            self.ready.notified().await;
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.ready.notify_one();
    }

    /// Closes and discards whatever was not written.
    fn abandon(&self) {
        self.pending.lock().clear();
        self.close();
    }
}

/// Closes the outbox when the last transmitter clone goes away.
#[derive(Debug)]
struct OutboxHandle(Arc<Outbox>);

impl Drop for OutboxHandle {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Sending side of one network edge.
///
/// Messages are handed to a dedicated writer task, so `send` never blocks
/// the operator. The outbox holds at most the receiver's capacity of
/// unsent messages; when it is full the receiver's policy decides whether
/// the oldest unsent message or the new one is dropped. When the last
/// clone is dropped the writer flushes what is queued and says goodbye.
#[derive(Debug, Clone)]
pub struct NetworkTransmitter {
    edge: String,
    outbox: Option<Arc<OutboxHandle>>,
    capacity: usize,
    policy: QueuePolicy,
    codecs: Arc<CodecRegistry>,
    state: Arc<EdgeState>,
}

impl NetworkTransmitter {
    /// Connects to the receiver for `target`, retrying while it comes up.
    pub async fn connect(
        edge: impl Into<String>,
        target: &str,
        peer: SocketAddr,
        codecs: Arc<CodecRegistry>,
        settings: &NetworkSettings,
        cancel: &CancellationToken,
    ) -> Result<Self, TransportError> {
        let edge = edge.into();
        let stream = connect_with_retry(&edge, peer, settings).await?;
        let (mut reader, mut writer) = stream.into_split();

        write_frame(
            &mut writer,
            &DataFrame::Hello {
                target: target.to_string(),
            },
        )
        .await?;
        let (capacity, policy) = match read_frame::<_, DataFrame>(&mut reader).await? {
            Some(DataFrame::Welcome { capacity, policy }) => {
                (capacity.max(1), QueuePolicy::from_code(policy).unwrap_or_default())
            }
            _ => {
                return Err(TransportError::Handshake {
                    reason: format!("receiver for '{}' did not welcome the connection", target),
                })
            }
        };
        TransmitterConnected {
            edge: &edge,
            address: peer,
            capacity,
        }
        .log();

        let outbox = Arc::new(Outbox::default());
        let state = Arc::new(EdgeState::default());
        tokio::spawn(writer_loop(
            edge.clone(),
            writer,
            outbox.clone(),
            state.clone(),
            cancel.child_token(),
        ));

        Ok(Self {
            edge,
            outbox: Some(Arc::new(OutboxHandle(outbox))),
            capacity,
            policy,
            codecs,
            state,
        })
    }

    /// A transmitter for an edge whose setup failed; every send reports `error`.
    pub fn failed(edge: impl Into<String>, error: TransportError, codecs: Arc<CodecRegistry>) -> Self {
        let state = Arc::new(EdgeState::default());
        state.fail(error);
        Self {
            edge: edge.into(),
            outbox: None,
            capacity: 0,
            policy: QueuePolicy::default(),
            codecs,
            state,
        }
    }

    pub fn edge(&self) -> &str {
        &self.edge
    }

    /// Capacity announced by the receiver during the handshake.
    pub fn capacity_hint(&self) -> usize {
        self.capacity
    }

    /// Overflow policy announced by the receiver during the handshake.
    pub fn policy(&self) -> QueuePolicy {
        self.policy
    }

    pub fn last_error(&self) -> Option<TransportError> {
        self.state.failure.lock().clone()
    }

    /// Queues a message for the writer.
    ///
    /// A full outbox is not an error; the outcome says what the policy did.
    pub fn send(&self, message: Message) -> Result<PushOutcome, TransportError> {
        if let Some(err) = self.last_error() {
            return Err(err);
        }
        if !self.codecs.contains(message.type_name()) {
            return Err(TransportError::UnregisteredType {
                type_name: message.type_name().to_string(),
            });
        }
        let Some(handle) = &self.outbox else {
            return Err(TransportError::ConnectionLost {
                edge: self.edge.clone(),
                reason: "edge was never connected".to_string(),
            });
        };
        let outbox = &handle.0;
        if outbox.closed.load(Ordering::SeqCst) {
            return Err(self.last_error().unwrap_or_else(|| TransportError::ConnectionLost {
                edge: self.edge.clone(),
                reason: "writer stopped".to_string(),
            }));
        }

        let outcome = {
            let mut pending = outbox.pending.lock();
            if pending.len() < self.capacity {
                pending.push_back(message);
                PushOutcome::Accepted
            } else {
                match self.policy {
                    QueuePolicy::Pop => {
                        pending.pop_front();
                        pending.push_back(message);
                        PushOutcome::EvictedOldest
                    }
                    QueuePolicy::Reject => PushOutcome::Dropped,
                    QueuePolicy::Fault => {
                        QueueOverflow {
                            queue: &self.edge,
                            stage: "outbound",
                            capacity: self.capacity,
                        }
                        .log();
                        PushOutcome::Dropped
                    }
                }
            }
        };
        if outcome != PushOutcome::Dropped {
            outbox.ready.notify_one();
        }
        Ok(outcome)
    }

    /// Messages waiting for the writer.
    pub fn queued(&self) -> usize {
        self.outbox.as_ref().map_or(0, |handle| handle.0.len())
    }

    /// Free outbound slots; zero once the edge failed.
    pub fn free_capacity(&self) -> usize {
        match (&self.outbox, self.last_error()) {
            (Some(handle), None) => self.capacity.saturating_sub(handle.0.len()),
            _ => 0,
        }
    }
}

pub(crate) async fn connect_with_retry(
    edge: &str,
    peer: SocketAddr,
    settings: &NetworkSettings,
) -> Result<TcpStream, TransportError> {
    let attempts = settings.connect_attempts.max(1);
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        match TcpStream::connect(peer).await {
            Ok(stream) => {
                let _ = stream.set_nodelay(true);
                return Ok(stream);
            }
            Err(e) => {
                last_error = e.to_string();
                if attempt < attempts {
                    ConnectRetry {
                        edge,
                        address: peer,
                        attempt,
                        reason: &last_error,
                    }
                    .log();
                    tokio::time::sleep(settings.connect_retry_delay).await;
                }
            }
        }
    }
    Err(TransportError::Connect {
        edge: edge.to_string(),
        address: peer.to_string(),
        reason: last_error,
    })
}

async fn writer_loop(
    edge: String,
    mut writer: OwnedWriteHalf,
    outbox: Arc<Outbox>,
    state: Arc<EdgeState>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return,
            next = outbox.next() => next,
        };
        let Some(message) = next else { break };
        if let Err(err) = write_frame(&mut writer, &DataFrame::Data { message }).await {
            EdgeConnectionLost {
                edge: &edge,
                reason: &err.to_string(),
            }
            .log();
            state.fail(TransportError::ConnectionLost {
                edge: edge.clone(),
                reason: err.to_string(),
            });
            outbox.abandon();
            return;
        }
    }
    let _ = write_frame(&mut writer, &DataFrame::Bye).await;
    let _ = tokio::io::AsyncWriteExt::shutdown(&mut writer).await;
}
