// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Applications: fragments wired together across process boundaries.
//!
//! An [`Application`] owns a set of [`Fragment`]s and a fragment graph whose
//! edges carry qualified port pairs (`"operator.port"`). Every such pair
//! becomes a network edge when the application runs, whether the fragments
//! share a process or not.
//!
//! ```rust
//! use the_sluice::application::Application;
//! use the_sluice::fragment::Fragment;
//! use the_sluice::operators::{PingRx, PingTx};
//!
//! let mut app = Application::new("ping");
//! let mut tx = Fragment::new("tx");
//! tx.add_operator(PingTx::operator("tx", 3)).unwrap();
//! let mut rx = Fragment::new("rx");
//! rx.add_operator(PingRx::operator("rx").0).unwrap();
//!
//! let tx = app.add_fragment(tx).unwrap();
//! let rx = app.add_fragment(rx).unwrap();
//! app.add_flow(tx, rx, [("tx.out", "rx.in")].into_iter().collect::<std::collections::BTreeSet<_>>())
//!     .unwrap();
//!
//! assert!(app.port_map_description().contains("tx.out: [rx.in]"));
//! ```

use crate::config::consts::RESERVED_FRAGMENT_NAME;
use crate::config::{AppOptions, Config};
use crate::connectors::{CodecRegistry, NetworkSettings};
use crate::distributed::{self, DriverReport};
use crate::engine::{receiver_target, FragmentExecutor, FragmentLinks, InboundLink, OutboundLink, RunReport};
use crate::errors::{ConfigError, ExecutionError, TransportError};
use crate::fragment::Fragment;
use crate::graph::{split_qualified, FlowGraph, PortMap, PortPairs};
use crate::observability::messages::graph::{
    CompositionRejected, ConfigFileMissing, ConfigOverwritten, DuplicatePortPair, EmptyFragmentPortPairs,
    ReservedFragmentName,
};
use crate::observability::messages::StructuredLog;
use crate::spec::IOType;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Stable index of a fragment inside its application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FragmentHandle(usize);

impl FragmentHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl Display for FragmentHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "fragment#{}", self.0)
    }
}

/// Either a handle or a fragment name, for [`Application::add_flow`].
#[derive(Debug, Clone, Copy)]
pub enum FragmentRef<'a> {
    Handle(FragmentHandle),
    Name(&'a str),
}

impl From<FragmentHandle> for FragmentRef<'_> {
    fn from(handle: FragmentHandle) -> Self {
        FragmentRef::Handle(handle)
    }
}

impl<'a> From<&'a str> for FragmentRef<'a> {
    fn from(name: &'a str) -> Self {
        FragmentRef::Name(name)
    }
}

/// What one process did while running an application.
#[derive(Debug, Clone, Default)]
pub struct ApplicationReport {
    /// Reports of the fragments that ran in this process.
    pub fragments: Vec<RunReport>,
    /// Present when this process acted as the driver.
    pub driver: Option<DriverReport>,
}

impl ApplicationReport {
    pub fn fragment(&self, name: &str) -> Option<&RunReport> {
        self.fragments.iter().find(|report| report.fragment == name)
    }
}

/// A set of fragments and the network edges between them.
#[derive(Debug)]
pub struct Application {
    name: String,
    fragments: Vec<Fragment>,
    graph: FlowGraph<FragmentHandle>,
    config: Option<Config>,
    codecs: CodecRegistry,
    settings: NetworkSettings,
    options: AppOptions,
}

impl Application {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            graph: FlowGraph::new(name.clone(), "fragment"),
            name,
            fragments: Vec::new(),
            config: None,
            codecs: CodecRegistry::new(),
            settings: NetworkSettings::default(),
            options: AppOptions::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_options(mut self, options: AppOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &AppOptions {
        &self.options
    }

    pub fn set_network_settings(&mut self, settings: NetworkSettings) {
        self.settings = settings;
    }

    fn reject(&self, error: ConfigError) -> ConfigError {
        CompositionRejected {
            owner: &self.name,
            error: &error,
        }
        .log();
        error
    }

    /// Attaches an application-wide configuration file. Fragments added
    /// without their own configuration share it.
    pub fn config(&mut self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if self.config.is_some() {
            ConfigOverwritten { owner: &self.name }.log();
        }
        let config = if path.exists() {
            Config::load(path)?
        } else {
            ConfigFileMissing { path }.log();
            Config::empty()
        };
        for fragment in &mut self.fragments {
            if fragment.config_ref().is_none() {
                fragment.set_config(config.clone());
            }
        }
        self.config = Some(config);
        Ok(())
    }

    pub fn config_ref(&self) -> Option<&Config> {
        self.config.as_ref()
    }

    /// Arguments stored under a dotted key of the application configuration.
    pub fn from_config(&self, key: &str) -> crate::args::ArgList {
        match &self.config {
            Some(config) => config.args(key),
            None => Config::empty().args(key),
        }
    }

    /// Makes `type_name` transmissible over network edges.
    pub fn register_codec<T: DeserializeOwned + 'static>(&mut self, type_name: &str) -> &mut Self {
        self.codecs.register::<T>(type_name);
        self
    }

    pub fn codecs_mut(&mut self) -> &mut CodecRegistry {
        &mut self.codecs
    }

    /// Registers a fragment. The name `all` is reserved and duplicate names
    /// are rejected; in both cases the application is left unchanged.
    pub fn add_fragment(&mut self, mut fragment: Fragment) -> Result<FragmentHandle, ConfigError> {
        let name = fragment.name().to_string();
        if name == RESERVED_FRAGMENT_NAME {
            ReservedFragmentName { name: &name }.log();
            return Err(ConfigError::ReservedFragmentName { name });
        }

        let handle = FragmentHandle(self.fragments.len());
        self.graph.add_node(handle, &name).map_err(|e| self.reject(e))?;
        if fragment.config_ref().is_none() {
            if let Some(config) = &self.config {
                fragment.set_config(config.clone());
            }
        }
        self.fragments.push(fragment);
        Ok(handle)
    }

    pub fn fragment(&self, handle: FragmentHandle) -> Option<&Fragment> {
        self.fragments.get(handle.0)
    }

    pub fn fragment_mut(&mut self, handle: FragmentHandle) -> Option<&mut Fragment> {
        self.fragments.get_mut(handle.0)
    }

    pub fn find_fragment(&self, name: &str) -> Option<FragmentHandle> {
        self.graph.find(name)
    }

    pub fn fragment_names(&self) -> Vec<&str> {
        self.fragments.iter().map(|f| f.name()).collect()
    }

    pub fn graph(&self) -> &FlowGraph<FragmentHandle> {
        &self.graph
    }

    fn resolve(&self, reference: FragmentRef<'_>) -> Result<FragmentHandle, ConfigError> {
        let found = match reference {
            FragmentRef::Handle(handle) => Some(handle).filter(|h| self.graph.contains(*h)),
            FragmentRef::Name(name) => self.graph.find(name),
        };
        found.ok_or_else(|| {
            let name = match reference {
                FragmentRef::Handle(handle) => handle.to_string(),
                FragmentRef::Name(name) => name.to_string(),
            };
            self.reject(ConfigError::UnknownFragment { name })
        })
    }

    /// Resolves `operator.port` (or a bare operator with a single port) to
    /// its qualified form inside `fragment`.
    fn qualify(&self, fragment: FragmentHandle, name: &str, direction: IOType) -> Result<String, ConfigError> {
        let fragment = &self.fragments[fragment.0];
        let (operator, port) = match split_qualified(name) {
            (operator, Some(port)) => (operator, port),
            (operator, None) => (operator, ""),
        };
        let handle = fragment
            .find_operator(operator)
            .ok_or_else(|| ConfigError::UnknownOperator {
                fragment: fragment.name().to_string(),
                name: operator.to_string(),
            })?;
        let port = fragment.resolve_port(handle, port, direction)?;
        Ok(format!("{}.{}", operator, port))
    }

    /// Wires `upstream` to `downstream` with qualified port pairs.
    ///
    /// An empty pair set creates no edge. Each pair is validated on its own;
    /// valid pairs are wired even when others fail.
    pub fn add_flow<'a>(
        &mut self,
        upstream: impl Into<FragmentRef<'a>>,
        downstream: impl Into<FragmentRef<'a>>,
        pairs: impl Into<PortPairs>,
    ) -> Result<(), ConfigError> {
        let upstream = self.resolve(upstream.into())?;
        let downstream = self.resolve(downstream.into())?;
        let up_name = self.fragments[upstream.0].name().to_string();
        let down_name = self.fragments[downstream.0].name().to_string();

        let pairs: PortPairs = pairs.into();
        let pairs = pairs
            .into_set(&up_name, &down_name)
            .map_err(|e| self.reject(e))?;
        if pairs.is_empty() {
            EmptyFragmentPortPairs {
                upstream: &up_name,
                downstream: &down_name,
            }
            .log();
            return Err(ConfigError::EmptyPortPairs {
                upstream: up_name,
                downstream: down_name,
            });
        }

        let mut port_map = PortMap::new();
        let mut failures = Vec::new();
        for (source, target) in &pairs {
            let source = self.qualify(upstream, source, IOType::Output);
            let target = self.qualify(downstream, target, IOType::Input);
            match (source, target) {
                (Ok(source), Ok(target)) => {
                    port_map.entry(source).or_default().insert(target);
                }
                (source, target) => {
                    failures.extend(source.err());
                    failures.extend(target.err());
                }
            }
        }

        if !port_map.is_empty() {
            let duplicates = self
                .graph
                .add_flow(upstream, downstream, &port_map)
                .map_err(|e| self.reject(e))?;
            for (source_port, target_port) in &duplicates {
                DuplicatePortPair {
                    upstream: &up_name,
                    downstream: &down_name,
                    source_port,
                    target_port,
                }
                .log();
            }
        }

        if failures.is_empty() {
            return Ok(());
        }
        for failure in &failures {
            CompositionRejected {
                owner: &self.name,
                error: failure,
            }
            .log();
        }
        Err(ConfigError::FlowRejected {
            upstream: up_name,
            downstream: down_name,
            failures,
        })
    }

    /// Every operator edge of every fragment, then every fragment edge.
    pub fn port_map_description(&self) -> String {
        let mut text = String::new();
        for fragment in &self.fragments {
            text.push_str(&fragment.port_map_description());
        }
        text.push_str(&format!("{}:\n", self.name));
        for line in self.graph.description().lines() {
            text.push_str("  ");
            text.push_str(line);
            text.push('\n');
        }
        text
    }

    /// Cross-fragment edges per fragment name.
    pub fn fragment_links(&self) -> HashMap<String, FragmentLinks> {
        let mut links: HashMap<String, FragmentLinks> = self
            .fragments
            .iter()
            .map(|f| (f.name().to_string(), FragmentLinks::default()))
            .collect();
        let mut peers: BTreeMap<(String, String, String), usize> = BTreeMap::new();

        for (upstream, downstream, map) in self.graph.edges() {
            let up_name = self.fragments[upstream.0].name();
            let down_name = self.fragments[downstream.0].name();
            for (source, targets) in map {
                let (out_op, out_port) = split_qualified(source);
                for target in targets {
                    let (in_op, in_port) = split_qualified(target);
                    let in_port = in_port.unwrap_or_default();
                    if let Some(entry) = links.get_mut(up_name) {
                        entry.outbound.push(OutboundLink {
                            operator: out_op.to_string(),
                            port: out_port.unwrap_or_default().to_string(),
                            target: receiver_target(down_name, in_op, in_port),
                        });
                    }
                    *peers
                        .entry((down_name.to_string(), in_op.to_string(), in_port.to_string()))
                        .or_default() += 1;
                }
            }
        }

        for ((fragment, operator, port), count) in peers {
            if let Some(entry) = links.get_mut(&fragment) {
                entry.inbound.push(InboundLink {
                    operator,
                    port,
                    peers: count,
                });
            }
        }
        links
    }

    /// Splits the application into the parts a runner needs.
    pub(crate) fn into_parts(self) -> ApplicationParts {
        let links = self.fragment_links();
        ApplicationParts {
            name: self.name,
            fragments: self.fragments,
            links,
            codecs: Arc::new(self.codecs),
            settings: self.settings,
            options: self.options,
        }
    }

    /// Runs the application in the role its options select: every fragment
    /// in this process, as driver, as worker, or as both.
    pub async fn run_async(self) -> Result<ApplicationReport, ExecutionError> {
        let options = self.options.clone();
        if options.is_local() {
            let fragments = self.run_local().await?;
            return Ok(ApplicationReport {
                fragments,
                driver: None,
            });
        }

        let names: Vec<String> = self.fragments.iter().map(|f| f.name().to_string()).collect();
        match (options.run_driver, options.run_worker) {
            (true, false) => {
                let driver = distributed::Driver::new(options.driver_address.clone(), names)
                    .run()
                    .await?;
                Ok(ApplicationReport {
                    fragments: Vec::new(),
                    driver: Some(driver),
                })
            }
            (false, _) => {
                let fragments = distributed::Worker::from_options(&options).run(self).await?;
                Ok(ApplicationReport {
                    fragments,
                    driver: None,
                })
            }
            (true, true) => {
                let driver = distributed::Driver::new(options.driver_address.clone(), names);
                let listener = driver.bind().await?;
                let local = listener.local_addr().map_err(TransportError::from)?;
                let serving = tokio::spawn(driver.serve(listener));
                let fragments = match distributed::Worker::from_options(&options).with_driver(local).run(self).await {
                    Ok(fragments) => fragments,
                    Err(err) => {
                        serving.abort();
                        return Err(err);
                    }
                };
                let driver = serving.await.map_err(|e| ExecutionError::InternalError {
                    message: format!("Driver task join error: {}", e),
                })??;
                Ok(ApplicationReport {
                    fragments,
                    driver: Some(driver),
                })
            }
        }
    }

    /// Runs the application on a fresh tokio runtime, blocking until it ends.
    pub fn run(self) -> Result<ApplicationReport, ExecutionError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| ExecutionError::WorkerPool {
                pool: self.name.clone(),
                reason: e.to_string(),
            })?;
        runtime.block_on(self.run_async())
    }

    /// Runs every fragment in this process; cross-fragment edges go over loopback.
    pub async fn run_local(self) -> Result<Vec<RunReport>, ExecutionError> {
        let parts = self.into_parts();
        let names: Vec<String> = parts.fragments.iter().map(|f| f.name().to_string()).collect();
        let transport = CancellationToken::new();
        let _transport_guard = transport.clone().drop_guard();

        let mut executors = parts.executors(names, &transport)?;
        let mut endpoints: HashMap<String, SocketAddr> = HashMap::new();
        for executor in &mut executors {
            endpoints.extend(executor.bind("127.0.0.1").await?);
        }
        for executor in &mut executors {
            executor.connect(&endpoints).await?;
            executor.initialize()?;
        }

        let (reports, failures) = run_executors(executors).await;
        if failures.is_empty() {
            Ok(reports)
        } else {
            Err(ExecutionError::FragmentsFailed { failures })
        }
    }
}

/// An application taken apart for running.
pub(crate) struct ApplicationParts {
    pub name: String,
    pub fragments: Vec<Fragment>,
    pub links: HashMap<String, FragmentLinks>,
    pub codecs: Arc<CodecRegistry>,
    pub settings: NetworkSettings,
    pub options: AppOptions,
}

impl ApplicationParts {
    /// Creates executors for the named fragments, in application order.
    pub(crate) fn executors(
        mut self,
        names: Vec<String>,
        transport: &CancellationToken,
    ) -> Result<Vec<FragmentExecutor>, ExecutionError> {
        let mut executors = Vec::with_capacity(names.len());
        for fragment in self.fragments.drain(..) {
            if !names.iter().any(|n| n == fragment.name()) {
                continue;
            }
            let links = self.links.remove(fragment.name()).unwrap_or_default();
            executors.push(FragmentExecutor::new(
                fragment,
                links,
                self.codecs.clone(),
                self.settings.clone(),
                transport.clone(),
            )?);
        }
        Ok(executors)
    }
}

/// Runs every executor concurrently and splits the outcomes into reports
/// and `(fragment, reason)` failures.
pub(crate) async fn run_executors(executors: Vec<FragmentExecutor>) -> (Vec<RunReport>, Vec<(String, String)>) {
    let mut running = JoinSet::new();
    for executor in executors {
        let name = executor.name().to_string();
        running.spawn(async move { (name, executor.run().await) });
    }

    let mut reports = Vec::new();
    let mut failures = Vec::new();
    while let Some(joined) = running.join_next().await {
        match joined {
            Ok((_, Ok(report))) => reports.push(report),
            Ok((name, Err(err))) => failures.push((name, err.to_string())),
            Err(err) => failures.push(("<unknown>".to_string(), format!("Task join error: {}", err))),
        }
    }
    reports.sort_by(|a, b| a.fragment.cmp(&b.fragment));
    (reports, failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::{PingMultiRx, PingRx, PingTx};
    use std::collections::BTreeSet;

    fn pairs(items: &[(&str, &str)]) -> BTreeSet<(String, String)> {
        items.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect()
    }

    fn ping_app() -> (Application, crate::operators::Received) {
        let mut app = Application::new("ping");
        crate::operators::register_codecs(app.codecs_mut());
        let mut tx = Fragment::new("f1");
        tx.add_operator(PingTx::operator("tx", 3)).unwrap();
        let mut rx = Fragment::new("f2");
        let (rx_op, received) = PingRx::operator("rx");
        rx.add_operator(rx_op).unwrap();
        app.add_fragment(tx).unwrap();
        app.add_fragment(rx).unwrap();
        (app, received)
    }

    #[test]
    fn test_reserved_fragment_name_is_rejected() {
        let mut app = Application::new("app");
        let err = app.add_fragment(Fragment::new("all")).unwrap_err();
        assert_eq!(err, ConfigError::ReservedFragmentName { name: "all".to_string() });
        assert!(app.find_fragment("all").is_none());
        assert_eq!(app.graph().node_count(), 0);
    }

    #[test]
    fn test_duplicate_fragment_name_is_rejected() {
        let mut app = Application::new("app");
        app.add_fragment(Fragment::new("f1")).unwrap();
        let err = app.add_fragment(Fragment::new("f1")).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateName { kind: "fragment", .. }));
        assert_eq!(app.fragment_names(), vec!["f1"]);
    }

    #[test]
    fn test_empty_port_pairs_create_no_edge() {
        let (mut app, _) = ping_app();
        let err = app.add_flow("f1", "f2", PortPairs::none()).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyPortPairs { .. }));
        assert_eq!(app.graph().edge_count(), 0);
        assert_eq!(app.graph().node_count(), 2);
    }

    #[test]
    fn test_sequence_of_port_pairs_is_rejected_before_wiring() {
        let (mut app, _) = ping_app();
        let err = app.add_flow("f1", "f2", vec![("tx.out", "rx.in")]).unwrap_err();
        assert!(matches!(err, ConfigError::PortPairsNotSet { .. }));
        assert_eq!(app.graph().edge_count(), 0);
    }

    #[test]
    fn test_bare_operator_names_resolve_to_single_ports() {
        let (mut app, _) = ping_app();
        app.add_flow("f1", "f2", pairs(&[("tx", "rx")])).unwrap();

        let f1 = app.find_fragment("f1").unwrap();
        let f2 = app.find_fragment("f2").unwrap();
        let map = app.graph().port_map(f1, f2).unwrap();
        assert_eq!(map.get("tx.out").map(|s| s.len()), Some(1));
        assert!(map["tx.out"].contains("rx.in"));
    }

    #[test]
    fn test_bad_pair_does_not_abort_siblings() {
        let mut app = Application::new("app");
        let mut tx = Fragment::new("f1");
        tx.add_operator(PingTx::operator("tx", 1)).unwrap();
        let mut rx = Fragment::new("f2");
        rx.add_operator(PingMultiRx::operator("rx", &["in1", "in2"]).0).unwrap();
        app.add_fragment(tx).unwrap();
        app.add_fragment(rx).unwrap();

        let err = app
            .add_flow("f1", "f2", pairs(&[("tx.out", "rx.in1"), ("tx.out", "rx.nope")]))
            .unwrap_err();

        assert!(matches!(err, ConfigError::FlowRejected { ref failures, .. } if failures.len() == 1));
        let links = app.fragment_links();
        assert_eq!(links["f1"].outbound.len(), 1);
        assert_eq!(links["f1"].outbound[0].target, "f2.rx.in1");
        assert_eq!(links["f2"].inbound_peers("rx", "in1"), 1);
    }

    #[test]
    fn test_links_count_peers_per_input() {
        let mut app = Application::new("app");
        for name in ["a", "b"] {
            let mut fragment = Fragment::new(name);
            fragment.add_operator(PingTx::operator("tx", 1)).unwrap();
            app.add_fragment(fragment).unwrap();
        }
        let mut sink = Fragment::new("sink");
        sink.add_operator(PingRx::operator("rx").0).unwrap();
        app.add_fragment(sink).unwrap();

        app.add_flow("a", "sink", pairs(&[("tx.out", "rx.in")])).unwrap();
        app.add_flow("b", "sink", pairs(&[("tx.out", "rx.in")])).unwrap();

        let links = app.fragment_links();
        assert_eq!(links["sink"].inbound.len(), 1);
        assert_eq!(links["sink"].inbound_peers("rx", "in"), 2);
        assert!(links["a"].inbound.is_empty());
        assert!(!links["b"].is_empty());
    }

    #[test]
    fn test_port_map_description_lists_fragment_edges() {
        let (mut app, _) = ping_app();
        app.add_flow("f1", "f2", pairs(&[("tx.out", "rx.in")])).unwrap();
        let text = app.port_map_description();
        assert!(text.contains("f1 -> f2:"));
        assert!(text.contains("tx.out: [rx.in]"));
    }

    #[tokio::test]
    async fn test_local_run_crosses_fragments_over_loopback() {
        let (mut app, received) = ping_app();
        app.add_flow("f1", "f2", pairs(&[("tx.out", "rx.in")])).unwrap();

        let report = app.run_async().await.unwrap();

        assert_eq!(*received.lock(), vec![1, 2, 3]);
        assert!(report.driver.is_none());
        assert_eq!(report.fragments.len(), 2);
        assert_eq!(report.fragment("f1").map(|r| r.dispatches_of("tx")), Some(3));
        assert_eq!(report.fragment("f2").map(|r| r.dispatches_of("rx")), Some(3));
    }
}
