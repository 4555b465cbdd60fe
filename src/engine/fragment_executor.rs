// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::component::Component;
use crate::conditions::{
    AsyncHandle, BooleanHandle, Condition, ConditionRuntime, ConditionTarget, SchedulingStatus,
};
use crate::connectors::{
    CodecRegistry, MessageQueue, NetworkReceiver, NetworkSettings, NetworkTransmitter, Transmitter,
};
use crate::engine::connector_resolver::{self, ResolvedPorts};
use crate::engine::task::OperatorTask;
use crate::engine::{FragmentLinks, RunReport, SchedulerFactory, StopReason, TaskSet};
use crate::errors::{ConfigError, ExecutionError, TransportError};
use crate::fragment::{Fragment, OperatorHandle};
use crate::observability::messages::engine::{
    DeadlockDetected, EdgeResolved, FragmentInitialized, FragmentStarted, FragmentStopped,
    ThreadPoolCreated,
};
use crate::observability::messages::transport::EdgeConnectionLost;
use crate::observability::messages::StructuredLog;
use crate::operator::{ExecutionContext, InputContext, Operator, OutputContext};
use crate::resources::WorkerPool;
use crate::scheduler::{FragmentController, FragmentState, SchedulerConfig, StateCell};
use crate::spec::{ConnectorType, IOType};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Runs one fragment: resolves its edges, binds its conditions, and ticks
/// its scheduler until the fragment stops.
///
/// Lifecycle: [`new`](Self::new) resolves local edges, [`bind`](Self::bind)
/// and [`connect`](Self::connect) set up cross-fragment edges (only needed
/// when the fragment has [`FragmentLinks`]), [`initialize`](Self::initialize)
/// prepares every operator, and [`run`](Self::run) drives it.
pub struct FragmentExecutor {
    name: String,
    operators: Vec<Operator>,
    order: Vec<usize>,
    predecessors: Vec<Vec<usize>>,
    scheduler: SchedulerConfig,
    pools: Vec<WorkerPool>,
    pool_of: Vec<usize>,
    ports: ResolvedPorts,
    links: FragmentLinks,
    codecs: Arc<CodecRegistry>,
    settings: NetworkSettings,
    transport_cancel: CancellationToken,
    receivers: Vec<NetworkReceiver>,
    tasks: Option<TaskSet>,
    state: StateCell,
    controller: FragmentController,
}

impl FragmentExecutor {
    pub fn new(
        fragment: Fragment,
        links: FragmentLinks,
        codecs: Arc<CodecRegistry>,
        settings: NetworkSettings,
        transport_cancel: CancellationToken,
    ) -> Result<Self, ExecutionError> {
        let mut parts = fragment.into_parts()?;
        parts.graph.freeze();

        let ports = connector_resolver::resolve(&parts.name, &parts.operators, &parts.graph, &links)?;
        let order: Vec<usize> = parts
            .graph
            .topological_order()
            .into_iter()
            .map(|handle| handle.index())
            .collect();
        let predecessors: Vec<Vec<usize>> = (0..parts.operators.len())
            .map(|index| {
                parts
                    .graph
                    .predecessors(OperatorHandle::new(index))
                    .iter()
                    .map(|handle| handle.index())
                    .collect()
            })
            .collect();

        let default_pool = WorkerPool::new("default", parts.scheduler.effective_workers())?;
        ThreadPoolCreated {
            fragment: &parts.name,
            pool: default_pool.name(),
            size: default_pool.size(),
            pinned: 0,
        }
        .log();

        let mut pools = vec![default_pool];
        let mut pool_of = vec![0; parts.operators.len()];
        for pool in &parts.thread_pools {
            let worker_pool = WorkerPool::new(pool.name(), pool.size())?;
            ThreadPoolCreated {
                fragment: &parts.name,
                pool: worker_pool.name(),
                size: worker_pool.size(),
                pinned: pool.members().iter().filter(|m| m.pin).count(),
            }
            .log();
            for member in pool.members() {
                if let Some(slot) = pool_of.get_mut(member.operator.index()) {
                    *slot = pools.len();
                }
            }
            pools.push(worker_pool);
        }

        Ok(Self {
            name: parts.name,
            operators: parts.operators,
            order,
            predecessors,
            scheduler: parts.scheduler,
            pools,
            pool_of,
            ports,
            links,
            codecs,
            settings,
            transport_cancel,
            receivers: Vec::new(),
            tasks: None,
            state: parts.state,
            controller: parts.controller,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> FragmentState {
        self.state.get()
    }

    pub fn controller(&self) -> FragmentController {
        self.controller.clone()
    }

    pub fn scheduler_config(&self) -> &SchedulerConfig {
        &self.scheduler
    }

    /// Receiver keys (`fragment.operator.port`) this fragment listens on.
    pub fn inbound_targets(&self) -> Vec<String> {
        self.ports.remote_inputs.iter().map(|r| r.target.clone()).collect()
    }

    /// Starts a listener on `host` for every port fed from another fragment.
    ///
    /// Returns each receiver key with the address it is listening on.
    pub async fn bind(&mut self, host: &str) -> Result<Vec<(String, SocketAddr)>, ExecutionError> {
        let mut bound = Vec::new();
        for remote in &self.ports.remote_inputs {
            let address = tokio::net::lookup_host((host, 0))
                .await
                .map_err(|e| TransportError::Bind {
                    address: host.to_string(),
                    reason: e.to_string(),
                })?
                .next()
                .ok_or_else(|| TransportError::Bind {
                    address: host.to_string(),
                    reason: "host did not resolve to any address".to_string(),
                })?;

            let receiver = NetworkReceiver::bind(
                remote.target.clone(),
                address,
                remote.queue.clone(),
                remote.peers,
                self.codecs.clone(),
                &self.settings,
                &self.transport_cancel,
            )
            .await?;
            bound.push((remote.target.clone(), receiver.local_addr()));
            self.receivers.push(receiver);
        }
        Ok(bound)
    }

    /// Connects every outbound link to the receiver address in `endpoints`.
    ///
    /// An edge that cannot be connected, or whose receiver never published
    /// an address, does not stop the fragment; every send on it reports the
    /// connection error instead.
    pub async fn connect(&mut self, endpoints: &HashMap<String, SocketAddr>) -> Result<(), ExecutionError> {
        for link in &self.links.outbound {
            let edge = format!("{}.{}.{} -> {}", self.name, link.operator, link.port, link.target);
            let connected = match endpoints.get(&link.target) {
                Some(peer) => {
                    NetworkTransmitter::connect(
                        edge.as_str(),
                        &link.target,
                        *peer,
                        self.codecs.clone(),
                        &self.settings,
                        &self.transport_cancel,
                    )
                    .await
                }
                None => Err(TransportError::Connect {
                    edge: edge.clone(),
                    address: "<unpublished>".to_string(),
                    reason: format!("no address was published for receiver '{}'", link.target),
                }),
            };
            let transmitter = match connected {
                Ok(transmitter) => transmitter,
                Err(err) => {
                    EdgeConnectionLost {
                        edge: &edge,
                        reason: &err.to_string(),
                    }
                    .log();
                    NetworkTransmitter::failed(edge.as_str(), err, self.codecs.clone())
                }
            };
            EdgeResolved {
                fragment: &self.name,
                edge: &edge,
                connector: ConnectorType::Network,
                capacity: transmitter.capacity_hint(),
            }
            .log();

            let index = self
                .operators
                .iter()
                .position(|op| op.name() == link.operator)
                .ok_or_else(|| ConfigError::UnknownOperator {
                    fragment: self.name.clone(),
                    name: link.operator.clone(),
                })?;
            self.ports.outputs[index]
                .entry(link.port.clone())
                .or_default()
                .push(Transmitter::Network(transmitter));
        }
        Ok(())
    }

    /// Binds conditions, builds each operator's contexts, and runs every
    /// operator's `initialize` hook.
    pub fn initialize(&mut self) -> Result<(), ExecutionError> {
        let current = self.state.get();
        if !current.can_transition(FragmentState::Initialized) {
            return Err(ExecutionError::InvalidTransition {
                fragment: self.name.clone(),
                from: current,
                to: FragmentState::Initialized,
            });
        }

        let start = Instant::now();
        let wakeup = self.controller.wakeup();
        for queue in self.ports.inputs.iter().flat_map(|ports| ports.values().flatten()) {
            queue.attach_wakeup(wakeup.clone());
        }

        let mut tasks = Vec::with_capacity(self.operators.len());
        for (index, operator) in self.operators.iter_mut().enumerate() {
            let inputs = self.ports.inputs.get(index).cloned().unwrap_or_default();
            let outputs = self
                .ports
                .outputs
                .get_mut(index)
                .map(std::mem::take)
                .unwrap_or_default();

            let conditions = bind_conditions(operator, &inputs, &outputs, start)?;
            for condition in &conditions {
                condition.attach_wakeup(&wakeup);
            }
            let (booleans, asyncs) = condition_handles(operator);

            let mut logic = operator.take_logic().ok_or_else(|| ExecutionError::InternalError {
                message: format!("operator '{}' has already been initialized", operator.name()),
            })?;
            logic
                .initialize(operator.args())
                .map_err(|e| ExecutionError::InitializationFailed {
                    component: operator.name().to_string(),
                    reason: e.to_string(),
                })?;

            let input_queues: Vec<Arc<MessageQueue>> = inputs.values().flatten().cloned().collect();
            let context = ExecutionContext::new(
                &self.name,
                operator.name(),
                self.controller.clone(),
                booleans,
                asyncs,
            );
            tasks.push(OperatorTask::new(
                operator.name(),
                self.pool_of.get(index).copied().unwrap_or(0),
                logic,
                conditions,
                input_queues,
                InputContext::new(inputs),
                OutputContext::new(outputs),
                context,
            ));
        }

        self.tasks = Some(TaskSet::new(
            &self.name,
            tasks,
            self.order.clone(),
            self.predecessors.clone(),
            self.pools.clone(),
        ));
        self.state.transition(FragmentState::Initialized)?;
        FragmentInitialized {
            fragment: &self.name,
            operator_count: self.operators.len(),
            edge_count: self.ports.local_edges + self.links.outbound.len(),
        }
        .log();
        Ok(())
    }

    /// Drives the fragment until it stops and reports how the run went.
    ///
    /// A failing operator stops the whole fragment; its error is returned
    /// after every operator's `stop` hook has run.
    pub async fn run(self) -> Result<RunReport, ExecutionError> {
        let FragmentExecutor {
            name,
            scheduler: config,
            receivers,
            tasks,
            state,
            controller,
            ..
        } = self;
        let _receivers = receivers;
        let mut tasks = tasks.ok_or_else(|| ExecutionError::InternalError {
            message: format!("fragment '{}' was not initialized", name),
        })?;

        let scheduler = SchedulerFactory::from_config(&config);
        let wakeup = controller.wakeup();
        let stop = controller.stop_token();
        let started = Instant::now();
        let deadline = config.max_duration.map(|d| started + d);

        let mut start_err = None;
        for task in tasks.tasks_mut() {
            if let Err(reason) = task.start() {
                start_err = Some(ExecutionError::InitializationFailed {
                    component: task.name.clone(),
                    reason,
                });
                break;
            }
        }
        if let Some(err) = start_err {
            finish(&mut tasks, &state, StopReason::Failed, 0, started);
            return Err(err);
        }
        state.transition(FragmentState::Running)?;
        FragmentStarted {
            fragment: &name,
            scheduler: scheduler.kind().as_str(),
            operator_count: tasks.len(),
            worker_threads: config.effective_workers(),
        }
        .log();

        let mut ticks = 0u64;
        let mut waiting_since: Option<Instant> = None;
        let outcome: Result<StopReason, ExecutionError> = loop {
            if stop.is_cancelled() {
                break Ok(StopReason::Stopped);
            }
            if controller.is_paused() {
                if let Err(err) = state.transition(FragmentState::Paused) {
                    break Err(err);
                }
                controller.wait_resumed().await;
                if stop.is_cancelled() {
                    break Ok(StopReason::Stopped);
                }
                if let Err(err) = state.transition(FragmentState::Running) {
                    break Err(err);
                }
                waiting_since = None;
            }
            if deadline.map_or(false, |d| Instant::now() >= d) {
                break Ok(StopReason::MaxDuration);
            }

            match scheduler.tick(&mut tasks, ticks + 1).await {
                Ok(0) => {}
                Ok(_) => {
                    ticks += 1;
                    waiting_since = None;
                    continue;
                }
                Err(err) => {
                    ticks += 1;
                    break Err(err);
                }
            }
            if tasks.sync_all() > 0 {
                continue;
            }

            let now = Instant::now();
            let remaining = deadline.map(|d| d.saturating_duration_since(now));
            let capped = |timeout: Option<Duration>| match (timeout, remaining) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, None) => a,
                (None, b) => b,
            };

            match tasks.outlook(now) {
                SchedulingStatus::Ready => {}
                SchedulingStatus::Never => break Ok(StopReason::Quiescent),
                SchedulingStatus::WaitTime(delay) => {
                    waiting_since = None;
                    scheduler.idle(&wakeup, &stop, capped(Some(delay))).await;
                }
                SchedulingStatus::WaitEvent => {
                    waiting_since = None;
                    scheduler.idle(&wakeup, &stop, capped(None)).await;
                }
                SchedulingStatus::Wait => {
                    if tasks.has_network_backlog() {
                        let poll = Some(config.check_recession_period);
                        scheduler.idle(&wakeup, &stop, capped(poll)).await;
                        continue;
                    }
                    if tasks.is_exhausted(now) {
                        break Ok(StopReason::Quiescent);
                    }
                    if !config.stop_on_deadlock {
                        scheduler.idle(&wakeup, &stop, capped(None)).await;
                        continue;
                    }
                    let since = *waiting_since.get_or_insert(now);
                    let waited = now.saturating_duration_since(since);
                    if waited >= config.stop_on_deadlock_timeout {
                        DeadlockDetected {
                            fragment: &name,
                            waiting: &tasks.waiting(now),
                        }
                        .log();
                        break Ok(StopReason::Deadlock);
                    }
                    let left = config.stop_on_deadlock_timeout - waited;
                    scheduler.idle(&wakeup, &stop, capped(Some(left))).await;
                }
            }
        };

        match outcome {
            Ok(reason) => Ok(finish(&mut tasks, &state, reason, ticks, started)),
            Err(err) => {
                finish(&mut tasks, &state, StopReason::Failed, ticks, started);
                Err(err)
            }
        }
    }
}

/// Runs every `stop` hook, drops queued messages, and reports the run.
fn finish(tasks: &mut TaskSet, state: &StateCell, reason: StopReason, ticks: u64, started: Instant) -> RunReport {
    for task in tasks.tasks_mut() {
        task.stop();
    }
    tasks.clear_queues();
    if let Err(err) = state.transition(FragmentState::Stopped) {
        tracing::debug!(fragment = tasks.fragment(), error = %err, "fragment was already stopped");
    }

    let duration = started.elapsed();
    FragmentStopped {
        fragment: tasks.fragment(),
        reason: reason.as_str(),
        ticks,
        duration,
    }
    .log();

    RunReport {
        fragment: tasks.fragment().to_string(),
        ticks,
        dispatches: tasks.dispatches(),
        stop_reason: reason,
        duration,
    }
}

/// Operator-level conditions, port conditions, the default
/// `message_available` on inputs without conditions, and multi-port
/// conditions, all bound to their queues or edges.
fn bind_conditions(
    operator: &Operator,
    inputs: &BTreeMap<String, Vec<Arc<MessageQueue>>>,
    outputs: &BTreeMap<String, Vec<Transmitter>>,
    start: Instant,
) -> Result<Vec<ConditionRuntime>, ConfigError> {
    let mut bound = Vec::new();
    for condition in operator.conditions() {
        bound.push(ConditionRuntime::bind(condition, ConditionTarget::Operator, start)?);
    }

    let Some(spec) = operator.spec() else {
        return Ok(bound);
    };

    let grouped: HashSet<&str> = spec
        .multi_port_conditions()
        .iter()
        .flat_map(|m| m.port_names.iter().map(String::as_str))
        .collect();

    for port in spec.inputs() {
        let queues = inputs.get(port.name()).cloned().unwrap_or_default();
        if port.conditions().is_empty() {
            if grouped.contains(port.name()) {
                continue;
            }
            let min_size = queues.iter().map(|q| q.capacity()).min().unwrap_or(1);
            let default = Condition::message_available(min_size)
                .named(format!("{}_{}_message_available", operator.name(), port.name()));
            bound.push(ConditionRuntime::bind(&default, ConditionTarget::Receivers(queues), start)?);
            continue;
        }
        for condition in port.conditions() {
            bound.push(ConditionRuntime::bind(
                condition,
                ConditionTarget::Receivers(queues.clone()),
                start,
            )?);
        }
    }

    for port in spec.outputs() {
        let edges = outputs.get(port.name()).cloned().unwrap_or_default();
        for condition in port.conditions() {
            bound.push(ConditionRuntime::bind(
                condition,
                ConditionTarget::Transmitters(edges.clone()),
                start,
            )?);
        }
    }

    for multi in spec.multi_port_conditions() {
        let groups = multi
            .port_names
            .iter()
            .map(|name| {
                inputs.get(name).cloned().ok_or_else(|| ConfigError::UnknownPort {
                    operator: operator.name().to_string(),
                    port: name.clone(),
                    direction: IOType::Input,
                    available: inputs.keys().cloned().collect(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let condition = Condition::new(
            multi.kind,
            format!("{}_{}_{}", operator.name(), multi.kind.as_str(), multi.port_names.join("_")),
        )
        .with_args(multi.args.clone());
        bound.push(ConditionRuntime::bind(&condition, ConditionTarget::PortGroups(groups), start)?);
    }

    Ok(bound)
}

type HandleMaps = (HashMap<String, BooleanHandle>, HashMap<String, AsyncHandle>);

/// Boolean and asynchronous condition handles by condition name.
fn condition_handles(operator: &Operator) -> HandleMaps {
    let mut booleans = HashMap::new();
    let mut asyncs = HashMap::new();

    let port_conditions = operator
        .spec()
        .into_iter()
        .flat_map(|spec| spec.inputs().iter().chain(spec.outputs().iter()))
        .flat_map(|port| port.conditions().iter());
    for condition in operator.conditions().iter().chain(port_conditions) {
        if let Some(handle) = condition.boolean_handle() {
            booleans.insert(condition.name().to_string(), handle);
        }
        if let Some(handle) = condition.async_handle() {
            asyncs.insert(condition.name().to_string(), handle);
        }
    }
    (booleans, asyncs)
}
