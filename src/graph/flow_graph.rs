// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::ConfigError;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

/// Upstream port name to the downstream port names it feeds.
pub type PortMap = BTreeMap<String, BTreeSet<String>>;

/// Directed graph over copyable node handles with port maps on its edges.
///
/// Nodes keep their insertion order, which is also the order used for
/// roots, leaves, and scheduling. Edges store handles only, so a frozen
/// graph is an immutable snapshot of the composition.
#[derive(Debug, Clone)]
pub struct FlowGraph<H> {
    owner: String,
    kind: &'static str,
    order: Vec<H>,
    by_name: HashMap<String, H>,
    names: HashMap<H, String>,
    succ: HashMap<H, Vec<H>>,
    pred: HashMap<H, Vec<H>>,
    edges: HashMap<(H, H), PortMap>,
    frozen: bool,
}

impl<H> FlowGraph<H>
where
    H: Copy + Eq + Hash + Ord + Debug,
{
    /// A graph owned by `owner` whose nodes are `kind`s (operators, fragments).
    pub fn new(owner: impl Into<String>, kind: &'static str) -> Self {
        Self {
            owner: owner.into(),
            kind,
            order: Vec::new(),
            by_name: HashMap::new(),
            names: HashMap::new(),
            succ: HashMap::new(),
            pred: HashMap::new(),
            edges: HashMap::new(),
            frozen: false,
        }
    }

    fn ensure_mutable(&self) -> Result<(), ConfigError> {
        if self.frozen {
            Err(ConfigError::GraphFrozen {
                owner: self.owner.clone(),
            })
        } else {
            Ok(())
        }
    }

    /// Adds a node. Returns `false` when the handle is already present.
    pub fn add_node(&mut self, node: H, name: &str) -> Result<bool, ConfigError> {
        self.ensure_mutable()?;
        if self.names.contains_key(&node) {
            return Ok(false);
        }
        if self.by_name.contains_key(name) {
            return Err(ConfigError::DuplicateName {
                kind: self.kind,
                name: name.to_string(),
            });
        }
        self.order.push(node);
        self.by_name.insert(name.to_string(), node);
        self.names.insert(node, name.to_string());
        Ok(true)
    }

    fn missing(&self, node: H) -> ConfigError {
        let name = format!("{:?}", node);
        if self.kind == "fragment" {
            ConfigError::UnknownFragment { name }
        } else {
            ConfigError::UnknownOperator {
                fragment: self.owner.clone(),
                name,
            }
        }
    }

    /// Merges `port_map` into the edge `upstream -> downstream`.
    ///
    /// Returns the pairs that were already present; they are left untouched.
    pub fn add_flow(
        &mut self,
        upstream: H,
        downstream: H,
        port_map: &PortMap,
    ) -> Result<Vec<(String, String)>, ConfigError> {
        self.ensure_mutable()?;
        for node in [upstream, downstream] {
            if !self.names.contains_key(&node) {
                return Err(self.missing(node));
            }
        }

        if !self.edges.contains_key(&(upstream, downstream)) {
            self.succ.entry(upstream).or_default().push(downstream);
            self.pred.entry(downstream).or_default().push(upstream);
        }
        let existing = self.edges.entry((upstream, downstream)).or_default();

        let mut duplicates = Vec::new();
        for (out_port, in_ports) in port_map {
            let targets = existing.entry(out_port.clone()).or_default();
            for in_port in in_ports {
                if !targets.insert(in_port.clone()) {
                    duplicates.push((out_port.clone(), in_port.clone()));
                }
            }
        }
        Ok(duplicates)
    }

    pub fn contains(&self, node: H) -> bool {
        self.names.contains_key(&node)
    }

    pub fn find(&self, name: &str) -> Option<H> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, node: H) -> Option<&str> {
        self.names.get(&node).map(String::as_str)
    }

    pub fn port_map(&self, upstream: H, downstream: H) -> Option<&PortMap> {
        self.edges.get(&(upstream, downstream))
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> &[H] {
        &self.order
    }

    pub fn node_count(&self) -> usize {
        self.order.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn successors(&self, node: H) -> &[H] {
        self.succ.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn predecessors(&self, node: H) -> &[H] {
        self.pred.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_root(&self, node: H) -> bool {
        self.contains(node) && self.predecessors(node).is_empty()
    }

    pub fn is_leaf(&self, node: H) -> bool {
        self.contains(node) && self.successors(node).is_empty()
    }

    pub fn root_nodes(&self) -> Vec<H> {
        self.order.iter().copied().filter(|n| self.is_root(*n)).collect()
    }

    pub fn leaf_nodes(&self) -> Vec<H> {
        self.order.iter().copied().filter(|n| self.is_leaf(*n)).collect()
    }

    /// Every edge with its port map, ordered by upstream then downstream insertion.
    pub fn edges(&self) -> Vec<(H, H, &PortMap)> {
        let mut result = Vec::with_capacity(self.edges.len());
        for upstream in &self.order {
            for downstream in self.successors(*upstream) {
                if let Some(map) = self.edges.get(&(*upstream, *downstream)) {
                    result.push((*upstream, *downstream, map));
                }
            }
        }
        result
    }

    /// Nodes that close a cycle, in discovery order.
    ///
    /// Search starts from the roots and then from any node still unvisited,
    /// so graphs that are entirely cyclic or disconnected are covered.
    pub fn has_cycle(&self) -> Vec<H> {
        let mut visited = HashSet::new();
        let mut on_path = HashSet::new();
        let mut closing = Vec::new();

        let starts = self.root_nodes().into_iter().chain(self.order.iter().copied());
        for start in starts {
            if !visited.contains(&start) {
                self.visit(start, &mut visited, &mut on_path, &mut closing);
            }
        }
        closing
    }

    fn visit(&self, node: H, visited: &mut HashSet<H>, on_path: &mut HashSet<H>, closing: &mut Vec<H>) {
        visited.insert(node);
        on_path.insert(node);
        for next in self.successors(node) {
            if on_path.contains(next) {
                if !closing.contains(next) {
                    closing.push(*next);
                }
            } else if !visited.contains(next) {
                self.visit(*next, visited, on_path, closing);
            }
        }
        on_path.remove(&node);
    }

    /// Upstream-first ordering that tolerates cycles.
    ///
    /// Nodes with no pending predecessors go first, in insertion order.
    /// When only cyclic nodes remain, the earliest inserted one is taken.
    pub fn topological_order(&self) -> Vec<H> {
        let mut pending: HashMap<H, usize> = self
            .order
            .iter()
            .map(|n| (*n, self.predecessors(*n).len()))
            .collect();
        let mut placed: BTreeSet<usize> = BTreeSet::new();
        let mut result = Vec::with_capacity(self.order.len());

        while result.len() < self.order.len() {
            let next_index = self
                .order
                .iter()
                .enumerate()
                .find(|(i, n)| !placed.contains(i) && pending.get(*n).copied() == Some(0))
                .or_else(|| self.order.iter().enumerate().find(|(i, _)| !placed.contains(i)))
                .map(|(i, _)| i);
            let Some(index) = next_index else { break };

            let node = self.order[index];
            placed.insert(index);
            result.push(node);
            pending.insert(node, 0);
            for next in self.successors(node) {
                if let Some(count) = pending.get_mut(next) {
                    *count = count.saturating_sub(1);
                }
            }
        }
        result
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Human-readable listing of every edge and its port pairs.
    pub fn description(&self) -> String {
        let mut text = String::new();
        for (upstream, downstream, map) in self.edges() {
            let from = self.name_of(upstream).unwrap_or("?");
            let to = self.name_of(downstream).unwrap_or("?");
            text.push_str(&format!("{} -> {}:\n", from, to));
            for (out_port, in_ports) in map {
                let targets: Vec<&str> = in_ports.iter().map(String::as_str).collect();
                text.push_str(&format!("  {}: [{}]\n", out_port, targets.join(", ")));
            }
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port_map(pairs: &[(&str, &str)]) -> PortMap {
        let mut map = PortMap::new();
        for (out_port, in_port) in pairs {
            map.entry(out_port.to_string())
                .or_default()
                .insert(in_port.to_string());
        }
        map
    }

    fn graph(names: &[&str]) -> FlowGraph<usize> {
        let mut graph = FlowGraph::new("frag", "operator");
        for (i, name) in names.iter().enumerate() {
            graph.add_node(i, name).unwrap();
        }
        graph
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut graph = graph(&["a"]);
        assert_eq!(graph.add_node(0, "a"), Ok(false));
        assert_eq!(
            graph.add_node(1, "a"),
            Err(ConfigError::DuplicateName {
                kind: "operator",
                name: "a".to_string()
            })
        );
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_add_flow_merges_port_maps() {
        let mut graph = graph(&["a", "b"]);
        graph.add_flow(0, 1, &port_map(&[("out", "in1")])).unwrap();
        let dupes = graph
            .add_flow(0, 1, &port_map(&[("out", "in2"), ("out", "in1")]))
            .unwrap();

        assert_eq!(dupes, vec![("out".to_string(), "in1".to_string())]);
        assert_eq!(graph.edge_count(), 1);
        let map = graph.port_map(0, 1).unwrap();
        assert_eq!(map["out"].len(), 2);
        assert_eq!(graph.successors(0), &[1]);
        assert_eq!(graph.predecessors(1), &[0]);
    }

    #[test]
    fn test_roots_and_leaves() {
        let mut graph = graph(&["a", "b", "c", "lonely"]);
        graph.add_flow(0, 1, &port_map(&[("out", "in")])).unwrap();
        graph.add_flow(1, 2, &port_map(&[("out", "in")])).unwrap();

        assert_eq!(graph.root_nodes(), vec![0, 3]);
        assert_eq!(graph.leaf_nodes(), vec![2, 3]);
        assert!(graph.is_root(0) && !graph.is_root(1));
        assert!(!graph.is_leaf(99));
    }

    #[test]
    fn test_cycles_are_found() {
        let mut graph = graph(&["a", "b", "c"]);
        graph.add_flow(0, 1, &port_map(&[("out", "in")])).unwrap();
        assert!(graph.has_cycle().is_empty());

        graph.add_flow(1, 2, &port_map(&[("out", "in")])).unwrap();
        graph.add_flow(2, 1, &port_map(&[("back", "feedback")])).unwrap();
        assert_eq!(graph.has_cycle(), vec![1]);
    }

    #[test]
    fn test_fully_cyclic_graph_is_covered() {
        let mut graph = graph(&["a", "b"]);
        graph.add_flow(0, 1, &port_map(&[("out", "in")])).unwrap();
        graph.add_flow(1, 0, &port_map(&[("out", "in")])).unwrap();
        assert_eq!(graph.has_cycle(), vec![0]);
    }

    #[test]
    fn test_topological_order_respects_edges_and_tolerates_cycles() {
        let mut graph = graph(&["sink", "source", "mid"]);
        graph.add_flow(1, 2, &port_map(&[("out", "in")])).unwrap();
        graph.add_flow(2, 0, &port_map(&[("out", "in")])).unwrap();
        assert_eq!(graph.topological_order(), vec![1, 2, 0]);

        graph.add_flow(0, 2, &port_map(&[("loop", "loop")])).unwrap();
        let order = graph.topological_order();
        assert_eq!(order.len(), 3);
        assert_eq!(order[0], 1);
    }

    #[test]
    fn test_frozen_graph_rejects_changes() {
        let mut graph = graph(&["a", "b"]);
        graph.freeze();
        assert!(matches!(
            graph.add_node(5, "c"),
            Err(ConfigError::GraphFrozen { .. })
        ));
        assert!(matches!(
            graph.add_flow(0, 1, &PortMap::new()),
            Err(ConfigError::GraphFrozen { .. })
        ));
    }

    #[test]
    fn test_description_lists_edges() {
        let mut graph = graph(&["tx", "rx"]);
        graph.add_flow(0, 1, &port_map(&[("out", "in")])).unwrap();
        assert_eq!(graph.description(), "tx -> rx:\n  out: [in]\n");
    }
}
