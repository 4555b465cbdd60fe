// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for composition and wiring diagnostics.
//!
//! This module contains message types for logging events related to:
//! * Port declarations made during operator setup
//! * Flows between operators and between fragments
//! * Fragment registration
//! * Configuration files and keys

use crate::errors::ConfigError;
use crate::observability::messages::StructuredLog;
use crate::spec::IOType;
use std::fmt::{Display, Formatter};
use std::path::Path;
use tracing::Span;

/// A port name was declared twice in the same direction.
///
/// # Log Level
/// `error!` - Configuration problem; the first declaration is kept
///
/// # Example
/// ```
/// use the_sluice::observability::messages::graph::DuplicatePortDeclared;
/// use the_sluice::spec::IOType;
///
/// let msg = DuplicatePortDeclared { operator: "rx", port: "in", direction: IOType::Input };
/// assert_eq!(
///     msg.to_string(),
///     "Operator 'rx' already has an input port named 'in'; keeping the existing one"
/// );
/// ```
pub struct DuplicatePortDeclared<'a> {
    pub operator: &'a str,
    pub port: &'a str,
    pub direction: IOType,
}

impl Display for DuplicatePortDeclared<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Operator '{}' already has an {} port named '{}'; keeping the existing one",
            self.operator, self.direction, self.port
        )
    }
}

impl StructuredLog for DuplicatePortDeclared<'_> {
    fn log(&self) {
        tracing::error!(
            operator = self.operator,
            port = self.port,
            direction = %self.direction,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "duplicate_port",
            span_name = name,
            operator = self.operator,
            port = self.port,
            direction = %self.direction,
        )
    }
}

/// A condition or connector was set on a port whose queue size is "any".
///
/// # Log Level
/// `warn!` - Allowed, but each connection gets its own queue
pub struct AnySizePortOverride<'a> {
    pub operator: &'a str,
    pub port: &'a str,
    pub what: &'a str,
}

impl Display for AnySizePortOverride<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Setting a {} on port '{}.{}' whose queue size is 'any'; it applies to every per-connection queue",
            self.what, self.operator, self.port
        )
    }
}

impl StructuredLog for AnySizePortOverride<'_> {
    fn log(&self) {
        tracing::warn!(
            operator = self.operator,
            port = self.port,
            what = self.what,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "any_size_override",
            span_name = name,
            operator = self.operator,
            port = self.port,
            what = self.what,
        )
    }
}

/// A multi-port condition was declared without any ports.
///
/// # Log Level
/// `error!` - Configuration problem; the condition is skipped
pub struct EmptyMultiPortCondition<'a> {
    pub operator: &'a str,
    pub kind: &'a str,
}

impl Display for EmptyMultiPortCondition<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Operator '{}' declared a '{}' condition without port names; ignoring it",
            self.operator, self.kind
        )
    }
}

impl StructuredLog for EmptyMultiPortCondition<'_> {
    fn log(&self) {
        tracing::error!(operator = self.operator, kind = self.kind, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "empty_multi_port_condition",
            span_name = name,
            operator = self.operator,
            kind = self.kind,
        )
    }
}

/// A port queue size used an encoding this engine has no meaning for.
///
/// # Log Level
/// `warn!` - The queue falls back to a capacity of one
pub struct CustomQueueSize<'a> {
    pub operator: &'a str,
    pub port: &'a str,
    pub encoded: i64,
}

impl Display for CustomQueueSize<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Port '{}.{}' has custom queue size {}; using a capacity of 1",
            self.operator, self.port, self.encoded
        )
    }
}

impl StructuredLog for CustomQueueSize<'_> {
    fn log(&self) {
        tracing::warn!(
            operator = self.operator,
            port = self.port,
            encoded = self.encoded,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "custom_queue_size",
            span_name = name,
            operator = self.operator,
            port = self.port,
            encoded = self.encoded,
        )
    }
}

/// A queue policy was set on a port that also names a non-default connector.
///
/// # Log Level
/// `warn!` - The connector's own `policy` argument wins
pub struct QueuePolicyIgnored<'a> {
    pub operator: &'a str,
    pub port: &'a str,
    pub connector: &'a str,
}

impl Display for QueuePolicyIgnored<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Queue policy on port '{}.{}' is ignored because the port has an explicit '{}' connector",
            self.operator, self.port, self.connector
        )
    }
}

impl StructuredLog for QueuePolicyIgnored<'_> {
    fn log(&self) {
        tracing::warn!(
            operator = self.operator,
            port = self.port,
            connector = self.connector,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "queue_policy_ignored",
            span_name = name,
            operator = self.operator,
            port = self.port,
            connector = self.connector,
        )
    }
}

/// An identical port pair was added to an existing flow.
///
/// # Log Level
/// `warn!` - No-op
///
/// # Example
/// ```
/// use the_sluice::observability::messages::graph::DuplicatePortPair;
///
/// let msg = DuplicatePortPair {
///     upstream: "tx",
///     downstream: "rx",
///     source_port: "out",
///     target_port: "in",
/// };
/// assert!(msg.to_string().contains("tx.out -> rx.in"));
/// ```
pub struct DuplicatePortPair<'a> {
    pub upstream: &'a str,
    pub downstream: &'a str,
    pub source_port: &'a str,
    pub target_port: &'a str,
}

impl Display for DuplicatePortPair<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "The port pair {}.{} -> {}.{} already exists; ignoring the duplicate",
            self.upstream, self.source_port, self.downstream, self.target_port
        )
    }
}

impl StructuredLog for DuplicatePortPair<'_> {
    fn log(&self) {
        tracing::warn!(
            upstream = self.upstream,
            downstream = self.downstream,
            source_port = self.source_port,
            target_port = self.target_port,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "duplicate_port_pair",
            span_name = name,
            upstream = self.upstream,
            downstream = self.downstream,
            source_port = self.source_port,
            target_port = self.target_port,
        )
    }
}

/// A composition call was refused or partially applied.
///
/// # Log Level
/// `error!` - Configuration problem surfaced to the caller as well
pub struct CompositionRejected<'a> {
    pub owner: &'a str,
    pub error: &'a ConfigError,
}

impl Display for CompositionRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "[{}] {}", self.owner, self.error)
    }
}

impl StructuredLog for CompositionRejected<'_> {
    fn log(&self) {
        tracing::error!(owner = self.owner, error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "composition_rejected",
            span_name = name,
            owner = self.owner,
            error = %self.error,
        )
    }
}

/// Someone tried to register a fragment under the reserved name.
///
/// # Log Level
/// `error!` - The fragment is not registered
pub struct ReservedFragmentName<'a> {
    pub name: &'a str,
}

impl Display for ReservedFragmentName<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Fragment name '{}' is reserved. Please use another name.",
            self.name
        )
    }
}

impl StructuredLog for ReservedFragmentName<'_> {
    fn log(&self) {
        tracing::error!(fragment = self.name, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("reserved_fragment_name", span_name = name, fragment = self.name)
    }
}

/// A fragment flow was requested with no port pairs.
///
/// # Log Level
/// `error!` - No edge is created
pub struct EmptyFragmentPortPairs<'a> {
    pub upstream: &'a str,
    pub downstream: &'a str,
}

impl Display for EmptyFragmentPortPairs<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Unable to add fragment flow with empty port_pairs ({} -> {})",
            self.upstream, self.downstream
        )
    }
}

impl StructuredLog for EmptyFragmentPortPairs<'_> {
    fn log(&self) {
        tracing::error!(upstream = self.upstream, downstream = self.downstream, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "empty_port_pairs",
            span_name = name,
            upstream = self.upstream,
            downstream = self.downstream,
        )
    }
}

/// A key looked up through `from_config` is absent.
///
/// # Log Level
/// `error!` - The lookup yields an empty argument list
pub struct ConfigKeyNotFound<'a> {
    pub key: &'a str,
}

impl Display for ConfigKeyNotFound<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Unable to find the parameter item/map with key '{}'", self.key)
    }
}

impl StructuredLog for ConfigKeyNotFound<'_> {
    fn log(&self) {
        tracing::error!(key = self.key, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("config_key_not_found", span_name = name, key = self.key)
    }
}

/// A fragment's configuration was replaced.
///
/// # Log Level
/// `warn!` - The previous configuration is discarded
pub struct ConfigOverwritten<'a> {
    pub owner: &'a str,
}

impl Display for ConfigOverwritten<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Config object was already created. Overwriting...")
    }
}

impl StructuredLog for ConfigOverwritten<'_> {
    fn log(&self) {
        tracing::warn!(owner = self.owner, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("config_overwritten", span_name = name, owner = self.owner)
    }
}

/// A configuration file path does not exist.
///
/// # Log Level
/// `warn!` - The fragment keeps an empty configuration
pub struct ConfigFileMissing<'a> {
    pub path: &'a Path,
}

impl Display for ConfigFileMissing<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Config file '{}' doesn't exist", self.path.display())
    }
}

impl StructuredLog for ConfigFileMissing<'_> {
    fn log(&self) {
        tracing::warn!(path = %self.path.display(), "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("config_file_missing", span_name = name, path = %self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_messages_keep_their_wording() {
        assert_eq!(
            ConfigKeyNotFound { key: "a.b" }.to_string(),
            "Unable to find the parameter item/map with key 'a.b'"
        );
        assert_eq!(
            ConfigOverwritten { owner: "app" }.to_string(),
            "Config object was already created. Overwriting..."
        );
        assert_eq!(
            ConfigFileMissing { path: Path::new("/nope.yaml") }.to_string(),
            "Config file '/nope.yaml' doesn't exist"
        );
    }

    #[test]
    fn test_empty_port_pairs_names_both_fragments() {
        let msg = EmptyFragmentPortPairs { upstream: "fragment1", downstream: "fragment2" };
        assert_eq!(
            msg.to_string(),
            "Unable to add fragment flow with empty port_pairs (fragment1 -> fragment2)"
        );
    }
}
