// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::connectors::wire::{read_frame, write_frame};
use crate::errors::ExecutionError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::TcpStream;

/// Receiver key (`fragment.operator.port`) to the address it listens on.
pub type Endpoints = BTreeMap<String, SocketAddr>;

/// Frames exchanged between the driver and its workers.
///
/// A session runs `Register`, `Assign`, `Bound` (or `Failed`), `Connect`,
/// one `Finished` per assigned fragment, and `Shutdown`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlMessage {
    Register { worker_id: String, targets: Vec<String> },
    Assign { fragments: Vec<String> },
    Bound { endpoints: Endpoints },
    Failed { reason: String },
    Connect { endpoints: Endpoints },
    Finished { fragment: String, error: Option<String> },
    Shutdown,
}

impl ControlMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::Register { .. } => "register",
            ControlMessage::Assign { .. } => "assign",
            ControlMessage::Bound { .. } => "bound",
            ControlMessage::Failed { .. } => "failed",
            ControlMessage::Connect { .. } => "connect",
            ControlMessage::Finished { .. } => "finished",
            ControlMessage::Shutdown => "shutdown",
        }
    }
}

/// One end of a driver/worker connection.
#[derive(Debug)]
pub(crate) struct ControlChannel {
    stream: TcpStream,
    peer: SocketAddr,
}

impl ControlChannel {
    pub(crate) fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        let _ = stream.set_nodelay(true);
        Self { stream, peer }
    }

    pub(crate) fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub(crate) async fn send(&mut self, message: &ControlMessage) -> Result<(), ExecutionError> {
        write_frame(&mut self.stream, message).await?;
        Ok(())
    }

    /// Next frame; a closed connection is a protocol error.
    pub(crate) async fn recv(&mut self) -> Result<ControlMessage, ExecutionError> {
        read_frame(&mut self.stream)
            .await?
            .ok_or_else(|| ExecutionError::Protocol {
                reason: format!("{} closed the control connection", self.peer),
            })
    }
}

pub(crate) fn unexpected(expected: &str, got: &ControlMessage) -> ExecutionError {
    ExecutionError::Protocol {
        reason: format!("expected '{}' but received '{}'", expected, got.kind()),
    }
}

/// Replaces an unspecified IP (`0.0.0.0`, `::`) with `fallback`.
pub(crate) fn reachable(address: SocketAddr, fallback: IpAddr) -> SocketAddr {
    if address.ip().is_unspecified() {
        SocketAddr::new(fallback, address.port())
    } else {
        address
    }
}

/// Loopback of the same family as `address`.
pub(crate) fn loopback_for(address: SocketAddr) -> IpAddr {
    match address {
        SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_are_tagged_by_kind() {
        let json = serde_json::to_string(&ControlMessage::Shutdown).unwrap();
        assert_eq!(json, r#"{"kind":"shutdown"}"#);

        let register = ControlMessage::Register {
            worker_id: "w1".to_string(),
            targets: vec!["all".to_string()],
        };
        let json = serde_json::to_string(&register).unwrap();
        assert!(json.contains(r#""kind":"register""#));
        assert_eq!(serde_json::from_str::<ControlMessage>(&json).unwrap(), register);
    }

    #[test]
    fn test_unspecified_addresses_are_made_reachable() {
        let bound: SocketAddr = "0.0.0.0:4000".parse().unwrap();
        let peer: IpAddr = "10.0.0.7".parse().unwrap();
        assert_eq!(reachable(bound, peer), "10.0.0.7:4000".parse().unwrap());

        let named: SocketAddr = "192.168.1.2:4000".parse().unwrap();
        assert_eq!(reachable(named, peer), named);
        assert_eq!(loopback_for(bound), IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
}
