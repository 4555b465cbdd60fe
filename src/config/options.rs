// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::{
    DEFAULT_DRIVER_ADDRESS, DEFAULT_DRIVER_PORT, DEFAULT_WORKER_ADDRESS, DEFAULT_WORKER_PORT,
    RESERVED_FRAGMENT_NAME,
};
use crate::errors::ConfigError;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// A host and port, printable in a form `TcpListener::bind` accepts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl Address {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Whether the host binds every interface rather than naming one.
    pub fn is_unspecified(&self) -> bool {
        matches!(self.host.as_str(), "0.0.0.0" | "::" | "")
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Parses `host`, `host:port`, `[v6]`, `[v6]:port`, or `:port`, filling in
/// whatever is missing from the defaults.
pub fn parse_address(text: &str, default_host: &str, default_port: u16) -> Result<Address, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidOption {
        option: "address",
        reason: format!("'{}': {}", text, reason),
    };
    let parse_port = |port: &str| port.parse::<u16>().map_err(|_| invalid("invalid port"));

    let text = text.trim();
    if text.is_empty() {
        return Ok(Address::new(default_host, default_port));
    }

    if let Some(rest) = text.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(|| invalid("missing ']'"))?;
        let port = match tail {
            "" => default_port,
            tail => parse_port(tail.strip_prefix(':').ok_or_else(|| invalid("expected ':' after ']'"))?)?,
        };
        return Ok(Address::new(host, port));
    }

    match text.rsplit_once(':') {
        Some((host, _)) if host.contains(':') => Ok(Address::new(text, default_port)),
        Some(("", port)) => Ok(Address::new(default_host, parse_port(port)?)),
        Some((host, port)) => Ok(Address::new(host, parse_port(port)?)),
        None => Ok(Address::new(text, default_port)),
    }
}

/// Resolved role options of one process.
#[derive(Debug, Clone, PartialEq)]
pub struct AppOptions {
    pub run_driver: bool,
    pub run_worker: bool,
    /// Where the driver listens, and where workers find it.
    pub driver_address: Address,
    /// Where this worker binds its network receivers.
    pub worker_address: Address,
    /// Fragments this worker asks for; empty or `all` means any.
    pub worker_targets: Vec<String>,
    pub config_path: Option<PathBuf>,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            run_driver: false,
            run_worker: false,
            driver_address: Address::new(DEFAULT_DRIVER_ADDRESS, DEFAULT_DRIVER_PORT),
            worker_address: Address::new(DEFAULT_WORKER_ADDRESS, DEFAULT_WORKER_PORT),
            worker_targets: Vec::new(),
            config_path: None,
        }
    }
}

impl AppOptions {
    /// Runs every fragment in this process.
    pub fn is_local(&self) -> bool {
        !self.run_driver && !self.run_worker
    }

    pub fn with_driver_address(mut self, text: &str) -> Result<Self, ConfigError> {
        self.driver_address = parse_address(text, DEFAULT_DRIVER_ADDRESS, DEFAULT_DRIVER_PORT)?;
        Ok(self)
    }

    pub fn with_worker_address(mut self, text: &str) -> Result<Self, ConfigError> {
        self.worker_address = parse_address(text, DEFAULT_WORKER_ADDRESS, DEFAULT_WORKER_PORT)?;
        Ok(self)
    }

    /// Splits a `--fragments` value such as `"tx,rx"`.
    pub fn with_targets(mut self, text: &str) -> Self {
        self.worker_targets = text
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        self
    }

    /// Whether this worker accepts any fragment.
    pub fn targets_all(&self) -> bool {
        self.worker_targets.is_empty() || self.worker_targets.iter().any(|t| t == RESERVED_FRAGMENT_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address_forms() {
        let parse = |text| parse_address(text, "0.0.0.0", 8765).unwrap();
        assert_eq!(parse("10.0.0.2"), Address::new("10.0.0.2", 8765));
        assert_eq!(parse("10.0.0.2:9000"), Address::new("10.0.0.2", 9000));
        assert_eq!(parse(":9000"), Address::new("0.0.0.0", 9000));
        assert_eq!(parse("[::1]"), Address::new("::1", 8765));
        assert_eq!(parse("[::1]:9000"), Address::new("::1", 9000));
        assert_eq!(parse("::1"), Address::new("::1", 8765));
        assert_eq!(parse(""), Address::new("0.0.0.0", 8765));
    }

    #[test]
    fn test_parse_address_rejects_bad_ports() {
        assert!(parse_address("host:http", "0.0.0.0", 1).is_err());
        assert!(parse_address("[::1", "0.0.0.0", 1).is_err());
        assert!(parse_address("[::1]x", "0.0.0.0", 1).is_err());
    }

    #[test]
    fn test_address_display_brackets_v6() {
        assert_eq!(Address::new("::1", 80).to_string(), "[::1]:80");
        assert_eq!(Address::new("localhost", 80).to_string(), "localhost:80");
    }

    #[test]
    fn test_default_options() {
        let options = AppOptions::default();
        assert!(options.is_local());
        assert_eq!(options.driver_address.to_string(), "0.0.0.0:8765");
        assert_eq!(options.worker_address.to_string(), "0.0.0.0:0");
        assert!(options.targets_all());
    }

    #[test]
    fn test_targets() {
        let options = AppOptions::default().with_targets("tx, rx,,");
        assert_eq!(options.worker_targets, vec!["tx", "rx"]);
        assert!(!options.targets_all());
        assert!(AppOptions::default().with_targets("all").targets_all());
    }
}
