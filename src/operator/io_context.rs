// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::connectors::{Message, MessageQueue, Transmitter};
use crate::errors::TransportError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Read access to an operator's input queues during `compute`.
#[derive(Debug, Default)]
pub struct InputContext {
    ports: BTreeMap<String, Vec<Arc<MessageQueue>>>,
}

impl InputContext {
    pub(crate) fn new(ports: BTreeMap<String, Vec<Arc<MessageQueue>>>) -> Self {
        Self { ports }
    }

    /// Takes the oldest message on `port`; for multi-queue ports the first
    /// connection with data wins.
    pub fn receive(&mut self, port: &str) -> Option<Message> {
        self.ports
            .get(port)?
            .iter()
            .find_map(|queue| queue.pop())
    }

    /// Takes every message on `port`, connection by connection.
    pub fn receive_all(&mut self, port: &str) -> Vec<Message> {
        self.ports
            .get(port)
            .map(|queues| queues.iter().flat_map(|q| q.drain()).collect())
            .unwrap_or_default()
    }

    /// Takes and decodes the oldest message on `port`.
    pub fn receive_value<T: DeserializeOwned>(&mut self, port: &str) -> Result<Option<T>, TransportError> {
        self.receive(port).map(|m| m.decode()).transpose()
    }

    /// Messages currently readable on `port`.
    pub fn available(&self, port: &str) -> usize {
        self.ports
            .get(port)
            .map(|queues| queues.iter().map(|q| q.size()).sum())
            .unwrap_or(0)
    }

    pub fn port_names(&self) -> Vec<&str> {
        self.ports.keys().map(String::as_str).collect()
    }
}

/// Write access to an operator's output edges during `compute`.
#[derive(Debug, Default)]
pub struct OutputContext {
    ports: BTreeMap<String, Vec<Transmitter>>,
    emitted: u64,
}

impl OutputContext {
    pub(crate) fn new(ports: BTreeMap<String, Vec<Transmitter>>) -> Self {
        Self { ports, emitted: 0 }
    }

    /// Sends `message` down every edge leaving `port`.
    ///
    /// A port without edges swallows the message. If some edges fail, the
    /// others still receive it and the first failure is returned.
    pub fn emit(&mut self, port: &str, message: Message) -> Result<(), TransportError> {
        let edges = self.ports.get(port).ok_or_else(|| TransportError::UnknownPort {
            port: port.to_string(),
        })?;
        if edges.is_empty() {
            tracing::debug!(port, "output port has no downstream edges; message dropped");
            return Ok(());
        }

        let mut first_error = None;
        for edge in edges {
            if let Err(err) = edge.send(message.clone()) {
                tracing::warn!(edge = edge.edge(), error = %err, "failed to send message");
                first_error.get_or_insert(err);
            }
        }
        self.emitted += 1;
        first_error.map_or(Ok(()), Err)
    }

    /// Encodes `value` under `type_name` and emits it.
    pub fn emit_value<T: Serialize>(
        &mut self,
        port: &str,
        type_name: &str,
        value: &T,
    ) -> Result<(), TransportError> {
        let message = Message::encode(type_name, value)?;
        self.emit(port, message)
    }

    pub fn is_connected(&self, port: &str) -> bool {
        self.ports.get(port).map_or(false, |edges| !edges.is_empty())
    }

    /// Messages emitted since the context was created.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Whether a live network edge has no room left in its outbox.
    pub(crate) fn has_saturated_network_edge(&self) -> bool {
        self.ports.values().flatten().any(|edge| match edge {
            Transmitter::Network(tx) => tx.last_error().is_none() && tx.free_capacity() == 0,
            Transmitter::Local { .. } => false,
        })
    }

    /// Whether any network edge still has messages waiting to be written.
    pub(crate) fn has_network_backlog(&self) -> bool {
        self.ports.values().flatten().any(|edge| match edge {
            Transmitter::Network(tx) => {
                tx.last_error().is_none() && tx.free_capacity() < tx.capacity_hint()
            }
            Transmitter::Local { .. } => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::QueuePolicy;

    fn queue(name: &str) -> Arc<MessageQueue> {
        Arc::new(MessageQueue::new(name, 4, QueuePolicy::Fault))
    }

    #[test]
    fn test_emit_fans_out_to_every_edge() {
        let (a, b) = (queue("a.in"), queue("b.in"));
        let mut ports = BTreeMap::new();
        ports.insert(
            "out".to_string(),
            vec![
                Transmitter::local("tx.out -> a.in", a.clone()),
                Transmitter::local("tx.out -> b.in", b.clone()),
            ],
        );
        let mut output = OutputContext::new(ports);
        output.emit_value("out", "i64", &7i64).unwrap();

        assert_eq!(a.back_size(), 1);
        assert_eq!(b.back_size(), 1);
        assert_eq!(output.emitted(), 1);
    }

    #[test]
    fn test_emit_to_undeclared_port_fails() {
        let mut output = OutputContext::new(BTreeMap::new());
        let result = output.emit("nope", Message::from_bytes(vec![]));
        assert_eq!(
            result,
            Err(TransportError::UnknownPort {
                port: "nope".to_string()
            })
        );
    }

    #[test]
    fn test_unconnected_port_swallows_messages() {
        let mut ports = BTreeMap::new();
        ports.insert("out".to_string(), Vec::new());
        let mut output = OutputContext::new(ports);
        assert!(!output.is_connected("out"));
        assert!(output.emit("out", Message::from_bytes(vec![1])).is_ok());
    }

    #[test]
    fn test_receive_reads_main_stage_in_order() {
        let (first, second) = (queue("rx.in:0"), queue("rx.in:1"));
        second.push(Message::encode("i64", &2i64).unwrap());
        first.push(Message::encode("i64", &1i64).unwrap());
        first.sync();
        second.sync();

        let mut ports = BTreeMap::new();
        ports.insert("in".to_string(), vec![first, second]);
        let mut input = InputContext::new(ports);

        assert_eq!(input.available("in"), 2);
        assert_eq!(input.receive_value::<i64>("in").unwrap(), Some(1));
        assert_eq!(input.receive_all("in").len(), 1);
        assert_eq!(input.receive("in"), None);
        assert_eq!(input.receive("missing"), None);
    }
}
