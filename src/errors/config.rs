// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::ArgError;
use crate::spec::IOType;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while composing, configuring, or validating a graph.
///
/// Composition errors are returned at the call that caused them so that
/// graph construction never partially applies a failed edge.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A name was registered twice within the same scope.
    #[error("Duplicate {kind} name '{name}'")]
    DuplicateName { kind: &'static str, name: String },

    /// The reserved fragment name was used.
    #[error("Fragment name '{name}' is reserved. Please use another name.")]
    ReservedFragmentName { name: String },

    /// Port names are referenced as `operator.port`, so they may not contain dots.
    #[error("Port name '{port}' of operator '{operator}' must not contain '.'")]
    InvalidPortName { operator: String, port: String },

    /// A port was declared twice during setup.
    #[error("Operator '{operator}' declares {direction} port '{port}' more than once")]
    DuplicatePort {
        operator: String,
        port: String,
        direction: IOType,
    },

    /// An operator referenced by name or handle is not part of the graph.
    #[error("Operator '{name}' is not part of fragment '{fragment}'")]
    UnknownOperator { fragment: String, name: String },

    /// A fragment referenced by name or handle is not part of the application.
    #[error("Fragment '{name}' is not part of the application")]
    UnknownFragment { name: String },

    /// A port pair named a port the operator does not declare.
    #[error("Operator '{operator}' has no {direction} port '{port}' (available: [{}])", .available.join(", "))]
    UnknownPort {
        operator: String,
        port: String,
        direction: IOType,
        available: Vec<String>,
    },

    /// An edge without explicit pairs needs exactly one port on each side.
    #[error("Operator '{operator}' has {} {direction} ports; specify the port pairs explicitly (available: [{}])", .available.len(), .available.join(", "))]
    AmbiguousPort {
        operator: String,
        direction: IOType,
        available: Vec<String>,
    },

    /// Fragment flows must name their ports.
    #[error("Unable to add fragment flow with empty port_pairs ({upstream} -> {downstream})")]
    EmptyPortPairs {
        upstream: String,
        downstream: String,
    },

    /// Port pairs must be supplied as a set, not an ordered sequence.
    #[error("Port pairs for flow {upstream} -> {downstream} must be supplied as a set")]
    PortPairsNotSet {
        upstream: String,
        downstream: String,
    },

    /// One or more pairs of an edge could not be wired.
    #[error("Flow {upstream} -> {downstream} could not be added: {}", .failures.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    FlowRejected {
        upstream: String,
        downstream: String,
        failures: Vec<ConfigError>,
    },

    /// The graph was frozen by initialization.
    #[error("Graph of '{owner}' is frozen and can no longer be modified")]
    GraphFrozen { owner: String },

    /// A multi-port condition's size list does not match its port list.
    #[error("Condition '{condition}' lists {ports} ports but {sizes} minimum sizes")]
    MismatchedPortList {
        condition: String,
        ports: usize,
        sizes: usize,
    },

    /// A required argument was not supplied.
    #[error("Component '{component}' requires argument '{arg}'")]
    MissingArgument { component: String, arg: String },

    /// An argument was supplied with an unusable value.
    #[error("Component '{component}' argument '{arg}' is invalid: {reason}")]
    InvalidValue {
        component: String,
        arg: String,
        reason: String,
    },

    /// A condition kind was attached where it cannot be evaluated.
    #[error("Condition '{condition}' ({kind}) cannot be attached to {target}")]
    UnsupportedCondition {
        condition: String,
        kind: &'static str,
        target: String,
    },

    /// Names are fixed once a component joins a fragment.
    #[error("Component '{name}' is already registered with a fragment")]
    AlreadyRegistered { name: String },

    /// Initialization requires fragment registration.
    #[error("Component '{name}' is not registered with a fragment")]
    NotRegistered { name: String },

    /// A thread pool handle or membership request was invalid.
    #[error("Thread pool '{pool}': {reason}")]
    ThreadPool { pool: String, reason: String },

    /// The configuration file was missing or malformed.
    #[error("Config file '{}' could not be loaded: {reason}", .path.display())]
    ConfigFile { path: PathBuf, reason: String },

    /// An address or option value could not be parsed.
    #[error("Invalid option '{option}': {reason}")]
    InvalidOption { option: &'static str, reason: String },

    #[error(transparent)]
    Arg(#[from] ArgError),
}
