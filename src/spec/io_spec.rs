// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::args::ArgList;
use crate::component::Component;
use crate::conditions::Condition;
use crate::observability::messages::graph::AnySizePortOverride;
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Direction of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IOType {
    Input,
    Output,
}

impl Display for IOType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            IOType::Input => write!(f, "input"),
            IOType::Output => write!(f, "output"),
        }
    }
}

/// Queue sizing policy of a port.
///
/// The integer encoding matches what configuration files carry:
/// positive values are fixed sizes, `0` sizes the queue by the number of
/// incoming connections, `-1` gives every incoming connection its own
/// single-slot queue, and anything below `-1` is preserved verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueSize {
    Fixed(usize),
    PrecedingCount,
    AnySize,
    Custom(i64),
}

impl QueueSize {
    pub const PRECEDING_COUNT: i64 = 0;
    pub const ANY_SIZE: i64 = -1;
    pub const SIZE_ONE: i64 = 1;

    pub fn from_i64(value: i64) -> Self {
        match value {
            v if v >= Self::SIZE_ONE => QueueSize::Fixed(v as usize),
            Self::PRECEDING_COUNT => QueueSize::PrecedingCount,
            Self::ANY_SIZE => QueueSize::AnySize,
            v => QueueSize::Custom(v),
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            QueueSize::Fixed(n) => *n as i64,
            QueueSize::PrecedingCount => Self::PRECEDING_COUNT,
            QueueSize::AnySize => Self::ANY_SIZE,
            QueueSize::Custom(v) => *v,
        }
    }
}

impl Default for QueueSize {
    fn default() -> Self {
        QueueSize::Fixed(1)
    }
}

impl From<i64> for QueueSize {
    fn from(value: i64) -> Self {
        QueueSize::from_i64(value)
    }
}

impl Display for QueueSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueSize::Fixed(n) => write!(f, "{}", n),
            QueueSize::PrecedingCount => write!(f, "preceding-count"),
            QueueSize::AnySize => write!(f, "any"),
            QueueSize::Custom(v) => write!(f, "custom({})", v),
        }
    }
}

/// What a full queue does with a new message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueuePolicy {
    /// Evict the oldest queued message.
    Pop,
    /// Drop the incoming message silently.
    Reject,
    /// Drop the incoming message and log a warning.
    #[default]
    Fault,
}

impl QueuePolicy {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(QueuePolicy::Pop),
            1 => Some(QueuePolicy::Reject),
            2 => Some(QueuePolicy::Fault),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            QueuePolicy::Pop => 0,
            QueuePolicy::Reject => 1,
            QueuePolicy::Fault => 2,
        }
    }
}

impl FromStr for QueuePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pop" | "0" => Ok(QueuePolicy::Pop),
            "reject" | "1" => Ok(QueuePolicy::Reject),
            "fault" | "2" => Ok(QueuePolicy::Fault),
            other => Err(format!("unknown queue policy '{}'", other)),
        }
    }
}

impl Display for QueuePolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            QueuePolicy::Pop => write!(f, "pop"),
            QueuePolicy::Reject => write!(f, "reject"),
            QueuePolicy::Fault => write!(f, "fault"),
        }
    }
}

/// Transport backing a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectorType {
    /// Resolved at executor start from the edge's topology.
    #[default]
    Default,
    DoubleBuffer,
    Network,
}

impl FromStr for ConnectorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(ConnectorType::Default),
            "double_buffer" | "double-buffer" | "doublebuffer" => Ok(ConnectorType::DoubleBuffer),
            "network" | "ucx" => Ok(ConnectorType::Network),
            other => Err(format!("unknown connector type '{}'", other)),
        }
    }
}

impl Display for ConnectorType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectorType::Default => write!(f, "default"),
            ConnectorType::DoubleBuffer => write!(f, "double_buffer"),
            ConnectorType::Network => write!(f, "network"),
        }
    }
}

/// Connector choice for a port plus its arguments (`capacity`, `policy`, `address`, `port`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectorSpec {
    pub kind: ConnectorType,
    pub args: ArgList,
}

/// One port declaration.
#[derive(Debug, Clone)]
pub struct IOSpec {
    operator: String,
    name: String,
    io_type: IOType,
    queue_size: QueueSize,
    queue_policy: Option<QueuePolicy>,
    conditions: Vec<Condition>,
    connector: ConnectorSpec,
}

impl IOSpec {
    pub(crate) fn new(operator: &str, name: &str, io_type: IOType) -> Self {
        Self {
            operator: operator.to_string(),
            name: name.to_string(),
            io_type,
            queue_size: QueueSize::default(),
            queue_policy: None,
            conditions: Vec::new(),
            connector: ConnectorSpec::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn io_type(&self) -> IOType {
        self.io_type
    }

    pub fn queue_size(&self) -> QueueSize {
        self.queue_size
    }

    pub fn set_queue_size(&mut self, size: impl Into<QueueSize>) -> &mut Self {
        self.queue_size = size.into();
        self
    }

    /// Explicit policy, if one was set. Connectors fall back to [`QueuePolicy::default`].
    pub fn queue_policy(&self) -> Option<QueuePolicy> {
        self.queue_policy
    }

    pub fn set_queue_policy(&mut self, policy: QueuePolicy) -> &mut Self {
        self.queue_policy = Some(policy);
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub(crate) fn conditions_mut(&mut self) -> &mut [Condition] {
        &mut self.conditions
    }

    /// Adds a gating condition. Calls accumulate.
    pub fn condition(&mut self, condition: Condition) -> &mut Self {
        if self.queue_size == QueueSize::AnySize {
            self.warn_any_size("condition");
        }
        self.conditions.push(condition);
        self
    }

    pub fn connector(&self) -> &ConnectorSpec {
        &self.connector
    }

    pub fn connector_type(&self) -> ConnectorType {
        self.connector.kind
    }

    pub fn set_connector(&mut self, kind: ConnectorType, args: ArgList) -> &mut Self {
        if self.queue_size == QueueSize::AnySize {
            self.warn_any_size("connector");
        }
        self.connector = ConnectorSpec { kind, args };
        self
    }

    fn warn_any_size(&self, what: &'static str) {
        AnySizePortOverride {
            operator: &self.operator,
            port: &self.name,
            what,
        }
        .log();
    }

    pub fn description(&self) -> String {
        let mut text = format!(
            "name: {}\nio_type: {}\nqueue_size: {}\nqueue_policy: {}\nconnector: {}",
            self.name,
            self.io_type,
            self.queue_size,
            self.queue_policy
                .map(|p| p.to_string())
                .unwrap_or_else(|| "default".to_string()),
            self.connector.kind,
        );
        if !self.conditions.is_empty() {
            text.push_str("\nconditions:");
            for condition in &self.conditions {
                text.push_str(&format!("\n  - {} ({})", condition.name(), condition.kind()));
            }
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_size_defaults_to_one() {
        let spec = IOSpec::new("op", "in", IOType::Input);
        assert_eq!(spec.queue_size(), QueueSize::Fixed(1));
        assert_eq!(spec.queue_size().as_i64(), 1);
    }

    #[test]
    fn test_queue_size_round_trips_every_encoding() {
        let mut spec = IOSpec::new("op", "in", IOType::Input);
        for value in [1i64, 7, 0, -1, -2, -42] {
            spec.set_queue_size(value);
            assert_eq!(spec.queue_size().as_i64(), value);
        }
        spec.set_queue_size(QueueSize::AnySize);
        assert_eq!(spec.queue_size(), QueueSize::from_i64(QueueSize::ANY_SIZE));
        spec.set_queue_size(QueueSize::PrecedingCount);
        assert_eq!(spec.queue_size(), QueueSize::from_i64(QueueSize::PRECEDING_COUNT));
        assert_eq!(QueueSize::from_i64(-5), QueueSize::Custom(-5));
    }

    #[test]
    fn test_queue_policy_codes() {
        assert_eq!(QueuePolicy::default(), QueuePolicy::Fault);
        for policy in [QueuePolicy::Pop, QueuePolicy::Reject, QueuePolicy::Fault] {
            assert_eq!(QueuePolicy::from_code(policy.code()), Some(policy));
            assert_eq!(policy.to_string().parse::<QueuePolicy>(), Ok(policy));
        }
        assert_eq!(QueuePolicy::from_code(9), None);
    }

    #[test]
    fn test_conditions_accumulate() {
        let mut spec = IOSpec::new("op", "in", IOType::Input);
        spec.condition(Condition::message_available(1))
            .condition(Condition::count(3));
        assert_eq!(spec.conditions().len(), 2);
    }

    #[test]
    fn test_connector_parsing() {
        assert_eq!("ucx".parse::<ConnectorType>(), Ok(ConnectorType::Network));
        assert_eq!(
            "double_buffer".parse::<ConnectorType>(),
            Ok(ConnectorType::DoubleBuffer)
        );
        assert!("carrier-pigeon".parse::<ConnectorType>().is_err());
    }
}
