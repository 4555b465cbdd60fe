// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::component::Component;
use crate::connectors::{MessageQueue, Transmitter};
use crate::engine::{receiver_target, FragmentLinks};
use crate::errors::ConfigError;
use crate::fragment::OperatorHandle;
use crate::graph::FlowGraph;
use crate::observability::messages::engine::EdgeResolved;
use crate::observability::messages::graph::{CustomQueueSize, QueuePolicyIgnored};
use crate::observability::messages::StructuredLog;
use crate::operator::Operator;
use crate::spec::{ConnectorType, IOSpec, IOType, QueuePolicy, QueueSize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A queue that is fed by upstream operators in other fragments.
#[derive(Debug, Clone)]
pub(crate) struct RemoteInput {
    pub operator: usize,
    pub port: String,
    pub target: String,
    pub queue: Arc<MessageQueue>,
    pub peers: usize,
}

/// Queues and transmitters for every port of a fragment, indexed by operator.
#[derive(Debug, Default)]
pub(crate) struct ResolvedPorts {
    pub inputs: Vec<BTreeMap<String, Vec<Arc<MessageQueue>>>>,
    pub outputs: Vec<BTreeMap<String, Vec<Transmitter>>>,
    pub remote_inputs: Vec<RemoteInput>,
    pub local_edges: usize,
}

/// Turns the fragment's edges into concrete queues.
///
/// Each input port gets one queue shared by all of its connections, except
/// `AnySize` ports, which get a single-slot queue per local connection plus
/// one queue for all remote connections.
pub(crate) fn resolve(
    fragment: &str,
    operators: &[Operator],
    graph: &FlowGraph<OperatorHandle>,
    links: &FragmentLinks,
) -> Result<ResolvedPorts, ConfigError> {
    validate_links(fragment, operators, links)?;

    let mut incoming: HashMap<(usize, &str), Vec<(usize, &str)>> = HashMap::new();
    for (upstream, downstream, port_map) in graph.edges() {
        for (source, targets) in port_map {
            for target in targets {
                incoming
                    .entry((downstream.index(), target.as_str()))
                    .or_default()
                    .push((upstream.index(), source.as_str()));
            }
        }
    }

    let mut resolved = ResolvedPorts {
        inputs: vec![BTreeMap::new(); operators.len()],
        outputs: operators
            .iter()
            .map(|op| {
                ports_of(op, IOType::Output)
                    .iter()
                    .map(|port| (port.name().to_string(), Vec::new()))
                    .collect()
            })
            .collect(),
        remote_inputs: Vec::new(),
        local_edges: 0,
    };

    for (index, op) in operators.iter().enumerate() {
        for port in ports_of(op, IOType::Input) {
            let local = incoming.remove(&(index, port.name())).unwrap_or_default();
            let remote = links.inbound_peers(op.name(), port.name());
            let queues = build_queues(op.name(), port, local.len(), remote)?;

            for (position, (upstream, source)) in local.iter().enumerate() {
                let queue = if queues.len() > 1 { &queues[position] } else { &queues[0] };
                let edge = format!(
                    "{}.{} -> {}.{}",
                    operators[*upstream].name(),
                    source,
                    op.name(),
                    port.name()
                );
                let transmitter = Transmitter::local(edge.as_str(), queue.clone());
                EdgeResolved {
                    fragment,
                    edge: &edge,
                    connector: transmitter.connector_type(),
                    capacity: queue.capacity(),
                }
                .log();
                resolved.outputs[*upstream]
                    .entry(source.to_string())
                    .or_default()
                    .push(transmitter);
                resolved.local_edges += 1;
            }

            if remote > 0 {
                if let Some(queue) = queues.last() {
                    resolved.remote_inputs.push(RemoteInput {
                        operator: index,
                        port: port.name().to_string(),
                        target: receiver_target(fragment, op.name(), port.name()),
                        queue: queue.clone(),
                        peers: remote,
                    });
                }
            }

            resolved.inputs[index].insert(port.name().to_string(), queues);
        }
    }

    Ok(resolved)
}

fn ports_of(operator: &Operator, io_type: IOType) -> &[IOSpec] {
    operator.spec().map(|spec| spec.ports(io_type)).unwrap_or(&[])
}

fn build_queues(
    operator: &str,
    port: &IOSpec,
    local: usize,
    remote: usize,
) -> Result<Vec<Arc<MessageQueue>>, ConfigError> {
    let policy = queue_policy(operator, port)?;
    let base = format!("{}.{}", operator, port.name());
    let capacity_arg = port.connector().args.value::<usize>("capacity")?;

    if capacity_arg.is_none() && port.queue_size() == QueueSize::AnySize && local + remote > 0 {
        let mut queues: Vec<Arc<MessageQueue>> = (0..local)
            .map(|i| Arc::new(MessageQueue::new(format!("{}:{}", base, i), 1, policy)))
            .collect();
        if remote > 0 {
            queues.push(Arc::new(MessageQueue::new(
                format!("{}:{}", base, local),
                remote,
                policy,
            )));
        }
        return Ok(queues);
    }

    let capacity = match capacity_arg {
        Some(capacity) => capacity.max(1),
        None => shared_capacity(operator, port, local + remote)?,
    };
    Ok(vec![Arc::new(MessageQueue::new(base, capacity, policy))])
}

fn shared_capacity(operator: &str, port: &IOSpec, connections: usize) -> Result<usize, ConfigError> {
    match port.queue_size() {
        QueueSize::Fixed(size) => Ok(size.max(1)),
        QueueSize::PrecedingCount if connections == 0 => Err(ConfigError::InvalidValue {
            component: format!("{}.{}", operator, port.name()),
            arg: "queue_size".to_string(),
            reason: "Invalid queue size: the port has no incoming connections to count".to_string(),
        }),
        QueueSize::PrecedingCount => Ok(connections),
        QueueSize::AnySize => Ok(1),
        QueueSize::Custom(encoded) => {
            CustomQueueSize {
                operator,
                port: port.name(),
                encoded,
            }
            .log();
            Ok(1)
        }
    }
}

/// Connector `policy` argument, then the port's own policy, then `Fault`.
fn queue_policy(operator: &str, port: &IOSpec) -> Result<QueuePolicy, ConfigError> {
    let connector = port.connector();
    let from_connector = match connector.args.get("policy") {
        Some(arg) => Some(match arg.get::<u8>() {
            Ok(code) => QueuePolicy::from_code(code).ok_or_else(|| ConfigError::InvalidValue {
                component: format!("{}.{}", operator, port.name()),
                arg: "policy".to_string(),
                reason: format!("unknown queue policy code {}", code),
            })?,
            Err(_) => arg
                .get::<String>()?
                .parse()
                .map_err(|reason| ConfigError::InvalidValue {
                    component: format!("{}.{}", operator, port.name()),
                    arg: "policy".to_string(),
                    reason,
                })?,
        }),
        None => None,
    };

    if connector.kind != ConnectorType::Default {
        if port.queue_policy().is_some() {
            QueuePolicyIgnored {
                operator,
                port: port.name(),
                connector: &connector.kind.to_string(),
            }
            .log();
        }
        return Ok(from_connector.unwrap_or_default());
    }
    Ok(from_connector.or(port.queue_policy()).unwrap_or_default())
}

fn validate_links(fragment: &str, operators: &[Operator], links: &FragmentLinks) -> Result<(), ConfigError> {
    let endpoints = links
        .inbound
        .iter()
        .map(|l| (l.operator.as_str(), l.port.as_str(), IOType::Input))
        .chain(
            links
                .outbound
                .iter()
                .map(|l| (l.operator.as_str(), l.port.as_str(), IOType::Output)),
        );

    for (name, port, direction) in endpoints {
        let operator = operators
            .iter()
            .find(|op| op.name() == name)
            .ok_or_else(|| ConfigError::UnknownOperator {
                fragment: fragment.to_string(),
                name: name.to_string(),
            })?;
        let ports = ports_of(operator, direction);
        if !ports.iter().any(|p| p.name() == port) {
            return Err(ConfigError::UnknownPort {
                operator: name.to_string(),
                port: port.to_string(),
                direction,
                available: ports.iter().map(|p| p.name().to_string()).collect(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::{Arg, ArgList};
    use crate::engine::InboundLink;
    use crate::fragment::Fragment;
    use crate::graph::PortPairs;
    use crate::operator::{ComputeError, ExecutionContext, InputContext, OperatorLogic, OutputContext};
    use crate::spec::OperatorSpec;

    struct Port {
        inputs: Vec<(&'static str, i64)>,
        outputs: Vec<&'static str>,
        policy: Option<QueuePolicy>,
    }

    impl OperatorLogic for Port {
        fn setup(&self, spec: &mut OperatorSpec) {
            for (name, size) in &self.inputs {
                let port = spec.input(name);
                port.set_queue_size(*size);
                if let Some(policy) = self.policy {
                    port.set_queue_policy(policy);
                }
            }
            for name in &self.outputs {
                spec.output(name);
            }
        }

        fn compute(
            &mut self,
            _input: &mut InputContext,
            _output: &mut OutputContext,
            _context: &mut ExecutionContext,
        ) -> Result<(), ComputeError> {
            Ok(())
        }
    }

    fn source(name: &str) -> Operator {
        Operator::new(
            name,
            Port {
                inputs: vec![],
                outputs: vec!["out"],
                policy: None,
            },
        )
    }

    fn sink(name: &str, size: i64) -> Operator {
        Operator::new(
            name,
            Port {
                inputs: vec![("in", size)],
                outputs: vec![],
                policy: None,
            },
        )
    }

    fn resolve_fragment(fragment: Fragment, links: &FragmentLinks) -> Result<ResolvedPorts, ConfigError> {
        let parts = fragment.into_parts()?;
        resolve(&parts.name, &parts.operators, &parts.graph, links)
    }

    #[test]
    fn test_default_queue_is_single_slot_with_fault_policy() {
        let mut fragment = Fragment::new("main");
        let tx = fragment.add_operator(source("tx")).unwrap();
        let rx = fragment.add_operator(sink("rx", 1)).unwrap();
        fragment.add_flow(tx, rx, PortPairs::none()).unwrap();

        let resolved = resolve_fragment(fragment, &FragmentLinks::default()).unwrap();
        let queues = &resolved.inputs[1]["in"];
        assert_eq!(queues.len(), 1);
        assert_eq!(queues[0].name(), "rx.in");
        assert_eq!(queues[0].capacity(), 1);
        assert_eq!(queues[0].policy(), QueuePolicy::Fault);
        assert_eq!(resolved.outputs[0]["out"].len(), 1);
        assert_eq!(resolved.outputs[0]["out"][0].edge(), "tx.out -> rx.in");
        assert_eq!(resolved.local_edges, 1);
    }

    #[test]
    fn test_preceding_count_sizes_by_connections() {
        let mut fragment = Fragment::new("main");
        let a = fragment.add_operator(source("a")).unwrap();
        let b = fragment.add_operator(source("b")).unwrap();
        let rx = fragment.add_operator(sink("rx", 0)).unwrap();
        fragment.add_flow(a, rx, PortPairs::none()).unwrap();
        fragment.add_flow(b, rx, PortPairs::none()).unwrap();

        let links = FragmentLinks {
            inbound: vec![InboundLink {
                operator: "rx".to_string(),
                port: "in".to_string(),
                peers: 1,
            }],
            outbound: vec![],
        };
        let resolved = resolve_fragment(fragment, &links).unwrap();
        let queues = &resolved.inputs[2]["in"];
        assert_eq!(queues.len(), 1);
        assert_eq!(queues[0].capacity(), 3);
        assert_eq!(resolved.remote_inputs.len(), 1);
        assert_eq!(resolved.remote_inputs[0].target, "main.rx.in");
    }

    #[test]
    fn test_preceding_count_without_connections_is_rejected() {
        let mut fragment = Fragment::new("main");
        fragment.add_operator(sink("rx", 0)).unwrap();

        let err = resolve_fragment(fragment, &FragmentLinks::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref arg, .. } if arg == "queue_size"));
    }

    #[test]
    fn test_any_size_gives_each_connection_its_own_queue() {
        let mut fragment = Fragment::new("main");
        let a = fragment.add_operator(source("a")).unwrap();
        let b = fragment.add_operator(source("b")).unwrap();
        let rx = fragment.add_operator(sink("rx", -1)).unwrap();
        fragment.add_flow(a, rx, PortPairs::none()).unwrap();
        fragment.add_flow(b, rx, PortPairs::none()).unwrap();

        let resolved = resolve_fragment(fragment, &FragmentLinks::default()).unwrap();
        let names: Vec<&str> = resolved.inputs[2]["in"].iter().map(|q| q.name()).collect();
        assert_eq!(names, vec!["rx.in:0", "rx.in:1"]);
        assert!(resolved.inputs[2]["in"].iter().all(|q| q.capacity() == 1));
    }

    #[test]
    fn test_connector_arguments_override_port_settings() {
        let mut fragment = Fragment::new("main");
        let tx = fragment.add_operator(source("tx")).unwrap();
        let rx = fragment
            .add_operator(Operator::new(
                "rx",
                Port {
                    inputs: vec![("in", 1)],
                    outputs: vec![],
                    policy: Some(QueuePolicy::Reject),
                },
            ))
            .unwrap();
        let args: ArgList = vec![Arg::new("capacity", 4u64), Arg::new("policy", "pop")]
            .into_iter()
            .collect();
        fragment
            .operator_mut(rx)
            .and_then(|op| op.spec_mut())
            .and_then(|spec| spec.input_spec_mut("in"))
            .unwrap()
            .set_connector(ConnectorType::DoubleBuffer, args);
        fragment.add_flow(tx, rx, PortPairs::none()).unwrap();

        let resolved = resolve_fragment(fragment, &FragmentLinks::default()).unwrap();
        let queue = &resolved.inputs[1]["in"][0];
        assert_eq!(queue.capacity(), 4);
        assert_eq!(queue.policy(), QueuePolicy::Pop);
    }

    #[test]
    fn test_links_must_name_existing_ports() {
        let mut fragment = Fragment::new("main");
        fragment.add_operator(sink("rx", 1)).unwrap();
        let links = FragmentLinks {
            inbound: vec![InboundLink {
                operator: "rx".to_string(),
                port: "missing".to_string(),
                peers: 1,
            }],
            outbound: vec![],
        };

        let err = resolve_fragment(fragment, &links).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPort { ref port, .. } if port == "missing"));
    }
}
