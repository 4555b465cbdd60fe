// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Directed graphs of operators and of fragments.
//!
//! Both graphs share [`FlowGraph`], an arena keyed by copyable handles
//! whose edges carry a [`PortMap`] from upstream port to the set of
//! downstream ports it feeds.

mod flow_graph;
mod port_pairs;

pub use flow_graph::{FlowGraph, PortMap};
pub use port_pairs::{split_qualified, PortPair, PortPairs};
