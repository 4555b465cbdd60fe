// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Fragments: one operator graph with its own configuration and scheduler.
//!
//! A fragment is the unit that runs inside one process. Operators are held
//! in an arena and addressed by [`OperatorHandle`]; edges in the graph store
//! handle pairs, so the graph can be frozen and walked by the executor
//! without touching the operators themselves.
//!
//! ```rust
//! use the_sluice::fragment::Fragment;
//! use the_sluice::graph::PortPairs;
//! use the_sluice::operators::ping::{PingRx, PingTx};
//!
//! let mut fragment = Fragment::new("ping");
//! let tx = fragment.add_operator(PingTx::operator("tx", 3)).unwrap();
//! let rx = fragment.add_operator(PingRx::operator("rx").0).unwrap();
//! fragment.add_flow(tx, rx, PortPairs::none()).unwrap();
//!
//! assert!(fragment.port_map_description().contains("tx -> rx"));
//! ```

use crate::args::ArgList;
use crate::component::Component;
use crate::config::Config;
use crate::connectors::{CodecRegistry, NetworkSettings};
use crate::engine::{FragmentExecutor, FragmentLinks, RunReport};
use crate::errors::{ConfigError, ExecutionError};
use crate::graph::{FlowGraph, PortMap, PortPairs};
use crate::observability::messages::graph::{
    CompositionRejected, ConfigFileMissing, ConfigOverwritten, DuplicatePortPair,
};
use crate::observability::messages::StructuredLog;
use crate::operator::Operator;
use crate::resources::ThreadPool;
use crate::scheduler::{FragmentController, FragmentState, SchedulerConfig, StateCell};
use crate::spec::IOType;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Stable index of an operator inside its fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperatorHandle(usize);

impl OperatorHandle {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl Display for OperatorHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An operator named in `add_flow`: already added, looked up by name, or new.
#[derive(Debug)]
pub enum OperatorRef<'a> {
    Handle(OperatorHandle),
    Name(&'a str),
    New(Operator),
}

impl From<OperatorHandle> for OperatorRef<'_> {
    fn from(handle: OperatorHandle) -> Self {
        OperatorRef::Handle(handle)
    }
}

impl<'a> From<&'a str> for OperatorRef<'a> {
    fn from(name: &'a str) -> Self {
        OperatorRef::Name(name)
    }
}

impl<'a> From<&'a String> for OperatorRef<'a> {
    fn from(name: &'a String) -> Self {
        OperatorRef::Name(name)
    }
}

impl From<Operator> for OperatorRef<'_> {
    fn from(operator: Operator) -> Self {
        OperatorRef::New(operator)
    }
}

/// Everything the executor takes over from a composed fragment.
pub(crate) struct FragmentParts {
    pub name: String,
    pub operators: Vec<Operator>,
    pub graph: FlowGraph<OperatorHandle>,
    pub scheduler: SchedulerConfig,
    pub thread_pools: Vec<ThreadPool>,
    pub state: StateCell,
    pub controller: FragmentController,
}

/// A self-contained operator graph plus configuration and scheduler settings.
#[derive(Debug)]
pub struct Fragment {
    name: String,
    operators: Vec<Operator>,
    graph: FlowGraph<OperatorHandle>,
    config: Option<Config>,
    scheduler: Option<SchedulerConfig>,
    thread_pools: Vec<ThreadPool>,
    next_component_id: i64,
    state: StateCell,
    controller: FragmentController,
}

impl Fragment {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            graph: FlowGraph::new(name.clone(), "operator"),
            state: StateCell::new(&name),
            name,
            operators: Vec::new(),
            config: None,
            scheduler: None,
            thread_pools: Vec::new(),
            next_component_id: 0,
            controller: FragmentController::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> FragmentState {
        self.state.get()
    }

    /// Handle for stopping, pausing, or resuming the fragment once it runs.
    pub fn controller(&self) -> FragmentController {
        self.controller.clone()
    }

    fn reject(&self, error: ConfigError) -> ConfigError {
        CompositionRejected {
            owner: &self.name,
            error: &error,
        }
        .log();
        error
    }

    fn next_id(&mut self) -> i64 {
        let id = self.next_component_id;
        self.next_component_id += 1;
        id
    }

    /// Adds an operator and runs its `setup`.
    ///
    /// A duplicate operator name or a port name containing `.` is fatal and
    /// leaves the fragment unchanged. Duplicate port declarations are only
    /// logged; the first declaration wins.
    pub fn add_operator(&mut self, mut operator: Operator) -> Result<OperatorHandle, ConfigError> {
        let name = operator.name().to_string();
        if self.graph.find(&name).is_some() {
            return Err(self.reject(ConfigError::DuplicateName {
                kind: "operator",
                name,
            }));
        }

        let issues = operator.run_setup();
        if let Some(fatal) = issues
            .into_iter()
            .find(|issue| matches!(issue, ConfigError::InvalidPortName { .. }))
        {
            return Err(self.reject(fatal));
        }

        let handle = OperatorHandle(self.operators.len());
        self.graph.add_node(handle, &name).map_err(|e| self.reject(e))?;

        let fragment = self.name.clone();
        let id = self.next_id();
        operator.register(&fragment, id);
        let mut ids = self.next_component_id;
        for condition in operator.conditions_mut() {
            condition.register(&fragment, ids);
            ids += 1;
        }
        if let Some(spec) = operator.spec_mut() {
            for port in spec.all_ports_mut() {
                for condition in port.conditions_mut() {
                    condition.register(&fragment, ids);
                    ids += 1;
                }
            }
        }
        self.next_component_id = ids;

        self.operators.push(operator);
        Ok(handle)
    }

    pub fn operator(&self, handle: OperatorHandle) -> Option<&Operator> {
        self.operators.get(handle.0)
    }

    pub fn operator_mut(&mut self, handle: OperatorHandle) -> Option<&mut Operator> {
        self.operators.get_mut(handle.0)
    }

    pub fn find_operator(&self, name: &str) -> Option<OperatorHandle> {
        self.graph.find(name)
    }

    pub fn operator_names(&self) -> Vec<&str> {
        self.operators.iter().map(|op| op.name()).collect()
    }

    pub fn graph(&self) -> &FlowGraph<OperatorHandle> {
        &self.graph
    }

    fn resolve(&mut self, reference: OperatorRef<'_>) -> Result<OperatorHandle, ConfigError> {
        match reference {
            OperatorRef::Handle(handle) if self.graph.contains(handle) => Ok(handle),
            OperatorRef::Handle(handle) => Err(self.reject(ConfigError::UnknownOperator {
                fragment: self.name.clone(),
                name: handle.to_string(),
            })),
            OperatorRef::Name(name) => match self.graph.find(name) {
                Some(handle) => Ok(handle),
                None => Err(self.reject(ConfigError::UnknownOperator {
                    fragment: self.name.clone(),
                    name: name.to_string(),
                })),
            },
            OperatorRef::New(operator) => self.add_operator(operator),
        }
    }

    /// Resolves a port name on one side of a flow; `""` means "the only port".
    pub(crate) fn resolve_port(
        &self,
        handle: OperatorHandle,
        port: &str,
        direction: IOType,
    ) -> Result<String, ConfigError> {
        let operator = &self.operators[handle.0];
        let available = operator
            .spec()
            .map(|spec| spec.port_names(direction))
            .unwrap_or_default();

        if port.is_empty() {
            return match available.as_slice() {
                [only] => Ok(only.clone()),
                _ => Err(ConfigError::AmbiguousPort {
                    operator: operator.name().to_string(),
                    direction,
                    available,
                }),
            };
        }
        if available.iter().any(|name| name == port) {
            Ok(port.to_string())
        } else {
            Err(ConfigError::UnknownPort {
                operator: operator.name().to_string(),
                port: port.to_string(),
                direction,
                available,
            })
        }
    }

    /// Connects output ports of `upstream` to input ports of `downstream`.
    ///
    /// An empty pair set maps the only output to the only input. Every pair
    /// is checked on its own: valid pairs are wired even when others fail,
    /// and the failures come back together in [`ConfigError::FlowRejected`].
    /// Re-adding an existing pair is a logged no-op.
    pub fn add_flow<'a>(
        &mut self,
        upstream: impl Into<OperatorRef<'a>>,
        downstream: impl Into<OperatorRef<'a>>,
        pairs: impl Into<PortPairs>,
    ) -> Result<(), ConfigError> {
        let upstream = self.resolve(upstream.into())?;
        let downstream = self.resolve(downstream.into())?;
        let up_name = self.operators[upstream.0].name().to_string();
        let down_name = self.operators[downstream.0].name().to_string();

        let pairs: PortPairs = pairs.into();
        let pairs = pairs
            .into_set(&up_name, &down_name)
            .map_err(|e| self.reject(e))?;
        let requested: Vec<(String, String)> = if pairs.is_empty() {
            vec![(String::new(), String::new())]
        } else {
            pairs.into_iter().collect()
        };

        let mut port_map = PortMap::new();
        let mut failures = Vec::new();
        for (out_port, in_port) in &requested {
            let source = self.resolve_port(upstream, out_port, IOType::Output);
            let target = self.resolve_port(downstream, in_port, IOType::Input);
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

    /// Attaches a configuration file. A missing file is logged and leaves an
    /// empty configuration; a file that cannot be parsed is an error.
    pub fn config(&mut self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if self.config.is_some() {
            ConfigOverwritten { owner: &self.name }.log();
        }
        if !path.exists() {
            ConfigFileMissing { path }.log();
            self.config = Some(Config::empty());
            return Ok(());
        }
        self.config = Some(Config::load(path)?);
        Ok(())
    }

    /// Attaches an already loaded configuration.
    pub fn set_config(&mut self, config: Config) {
        if self.config.is_some() {
            ConfigOverwritten { owner: &self.name }.log();
        }
        self.config = Some(config);
    }

    pub fn config_ref(&self) -> Option<&Config> {
        self.config.as_ref()
    }

    /// Arguments stored under a dotted key of the attached configuration.
    pub fn from_config(&self, key: &str) -> ArgList {
        match &self.config {
            Some(config) => config.args(key),
            None => Config::empty().args(key),
        }
    }

    pub fn set_scheduler(&mut self, config: SchedulerConfig) {
        self.scheduler = Some(config);
    }

    /// Scheduler settings in effect: explicit ones, else the `scheduler`
    /// section of the configuration, else defaults. Environment overrides
    /// are applied on top.
    pub fn scheduler_config(&self) -> Result<SchedulerConfig, ConfigError> {
        let base = match (&self.scheduler, &self.config) {
            (Some(explicit), _) => explicit.clone(),
            (None, Some(config)) if config.lookup("scheduler").is_some() => {
                SchedulerConfig::from_args(&config.args("scheduler"))?
            }
            _ => SchedulerConfig::default(),
        };
        Ok(base.with_env_overrides())
    }

    /// Declares a thread pool; operators are assigned through the returned pool.
    pub fn make_thread_pool(&mut self, name: &str, size: usize) -> Result<&mut ThreadPool, ConfigError> {
        if size == 0 {
            return Err(self.reject(ConfigError::ThreadPool {
                pool: name.to_string(),
                reason: "size must be at least 1".to_string(),
            }));
        }
        if self.thread_pools.iter().any(|pool| pool.name() == name) {
            return Err(self.reject(ConfigError::DuplicateName {
                kind: "thread pool",
                name: name.to_string(),
            }));
        }

        let mut pool = ThreadPool::new(name, size);
        let fragment = self.name.clone();
        let id = self.next_id();
        pool.register(&fragment, id);
        self.thread_pools.push(pool);
        let index = self.thread_pools.len() - 1;
        Ok(&mut self.thread_pools[index])
    }

    pub fn thread_pools(&self) -> &[ThreadPool] {
        &self.thread_pools
    }

    /// Human-readable listing of every operator edge.
    pub fn port_map_description(&self) -> String {
        let mut text = format!("{}:\n", self.name);
        for line in self.graph.description().lines() {
            text.push_str("  ");
            text.push_str(line);
            text.push('\n');
        }
        text
    }

    /// Validates pool membership before the fragment is handed to the executor.
    pub(crate) fn into_parts(self) -> Result<FragmentParts, ConfigError> {
        let scheduler = self.scheduler_config()?;

        let mut seen = Vec::new();
        for pool in &self.thread_pools {
            for member in pool.members() {
                if !self.graph.contains(member.operator) {
                    return Err(self.reject(ConfigError::ThreadPool {
                        pool: pool.name().to_string(),
                        reason: format!("operator {} is not part of the fragment", member.operator),
                    }));
                }
                if seen.contains(&member.operator) {
                    return Err(self.reject(ConfigError::ThreadPool {
                        pool: pool.name().to_string(),
                        reason: format!(
                            "operator '{}' is already assigned to another pool",
                            self.operators[member.operator.0].name()
                        ),
                    }));
                }
                seen.push(member.operator);
            }
        }

        Ok(FragmentParts {
            name: self.name,
            operators: self.operators,
            graph: self.graph,
            scheduler,
            thread_pools: self.thread_pools,
            state: self.state,
            controller: self.controller,
        })
    }

    /// Runs the fragment on the current tokio runtime until it stops.
    pub async fn run_async(self) -> Result<RunReport, ExecutionError> {
        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();
        let mut executor = FragmentExecutor::new(
            self,
            FragmentLinks::default(),
            Arc::new(CodecRegistry::default()),
            NetworkSettings::default(),
            cancel,
        )?;
        executor.initialize()?;
        executor.run().await
    }

    /// Runs the fragment on a fresh tokio runtime, blocking until it stops.
    pub fn run(self) -> Result<RunReport, ExecutionError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| ExecutionError::WorkerPool {
                pool: self.name.clone(),
                reason: e.to_string(),
            })?;
        runtime.block_on(self.run_async())
    }
}
