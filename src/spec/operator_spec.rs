// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::args::{ArgList, ArgValue};
use crate::conditions::ConditionKind;
use crate::errors::ConfigError;
use crate::observability::messages::graph::{DuplicatePortDeclared, EmptyMultiPortCondition};
use crate::observability::messages::StructuredLog;
use crate::spec::{IOSpec, IOType};

/// A parameter an operator declares during setup.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub default: Option<ArgValue>,
    pub description: String,
}

/// A condition evaluated jointly over several input ports.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiPortCondition {
    pub kind: ConditionKind,
    pub port_names: Vec<String>,
    pub args: ArgList,
}

/// Ports, parameters, and multi-port conditions of one operator.
///
/// Problems found while the operator declares itself are collected rather
/// than raised, since `setup` has no error channel; the fragment inspects
/// them when the operator is added.
#[derive(Debug, Clone)]
pub struct OperatorSpec {
    operator: String,
    inputs: Vec<IOSpec>,
    outputs: Vec<IOSpec>,
    params: Vec<ParamSpec>,
    multi_port_conditions: Vec<MultiPortCondition>,
    issues: Vec<ConfigError>,
}

impl OperatorSpec {
    pub fn new(operator: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            params: Vec::new(),
            multi_port_conditions: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn operator_name(&self) -> &str {
        &self.operator
    }

    /// Declares an input port, or returns the existing one when the name is taken.
    pub fn input(&mut self, name: &str) -> &mut IOSpec {
        self.declare(name, IOType::Input)
    }

    /// Declares an output port, or returns the existing one when the name is taken.
    pub fn output(&mut self, name: &str) -> &mut IOSpec {
        self.declare(name, IOType::Output)
    }

    fn declare(&mut self, name: &str, io_type: IOType) -> &mut IOSpec {
        if name.contains('.') {
            self.issues.push(ConfigError::InvalidPortName {
                operator: self.operator.clone(),
                port: name.to_string(),
            });
        }

        let ports = match io_type {
            IOType::Input => &mut self.inputs,
            IOType::Output => &mut self.outputs,
        };
        let index = match ports.iter().position(|p| p.name() == name) {
            Some(index) => {
                DuplicatePortDeclared {
                    operator: &self.operator,
                    port: name,
                    direction: io_type,
                }
                .log();
                self.issues.push(ConfigError::DuplicatePort {
                    operator: self.operator.clone(),
                    port: name.to_string(),
                    direction: io_type,
                });
                index
            }
            None => {
                ports.push(IOSpec::new(&self.operator, name, io_type));
                ports.len() - 1
            }
        };
        &mut ports[index]
    }

    pub fn inputs(&self) -> &[IOSpec] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[IOSpec] {
        &self.outputs
    }

    pub fn input_spec(&self, name: &str) -> Option<&IOSpec> {
        self.inputs.iter().find(|p| p.name() == name)
    }

    pub fn output_spec(&self, name: &str) -> Option<&IOSpec> {
        self.outputs.iter().find(|p| p.name() == name)
    }

    pub fn input_spec_mut(&mut self, name: &str) -> Option<&mut IOSpec> {
        self.inputs.iter_mut().find(|p| p.name() == name)
    }

    pub fn output_spec_mut(&mut self, name: &str) -> Option<&mut IOSpec> {
        self.outputs.iter_mut().find(|p| p.name() == name)
    }

    pub(crate) fn all_ports_mut(&mut self) -> impl Iterator<Item = &mut IOSpec> {
        self.inputs.iter_mut().chain(self.outputs.iter_mut())
    }

    pub fn ports(&self, io_type: IOType) -> &[IOSpec] {
        match io_type {
            IOType::Input => &self.inputs,
            IOType::Output => &self.outputs,
        }
    }

    pub fn port_names(&self, io_type: IOType) -> Vec<String> {
        self.ports(io_type)
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    pub fn param(
        &mut self,
        name: &str,
        default: Option<ArgValue>,
        description: &str,
    ) -> &mut Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            default,
            description: description.to_string(),
        });
        self
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Registers a condition evaluated jointly over `port_names`.
    ///
    /// Argument consistency (such as the length of `min_sizes`) is checked
    /// when the condition is bound at initialization.
    pub fn multi_port_condition<I, S>(
        &mut self,
        kind: ConditionKind,
        port_names: I,
        args: ArgList,
    ) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let port_names: Vec<String> = port_names.into_iter().map(Into::into).collect();
        if port_names.is_empty() {
            EmptyMultiPortCondition {
                operator: &self.operator,
                kind: kind.as_str(),
            }
            .log();
            self.issues.push(ConfigError::UnsupportedCondition {
                condition: kind.as_str().to_string(),
                kind: kind.as_str(),
                target: format!("operator '{}' without any ports", self.operator),
            });
            return self;
        }
        self.multi_port_conditions.push(MultiPortCondition {
            kind,
            port_names,
            args,
        });
        self
    }

    pub fn multi_port_conditions(&self) -> &[MultiPortCondition] {
        &self.multi_port_conditions
    }

    pub fn issues(&self) -> &[ConfigError] {
        &self.issues
    }

    pub fn description(&self) -> String {
        let mut text = String::new();
        for (title, ports) in [("inputs", &self.inputs), ("outputs", &self.outputs)] {
            text.push_str(title);
            text.push(':');
            if ports.is_empty() {
                text.push_str(" []");
            }
            for port in ports {
                text.push_str("\n  - ");
                text.push_str(&port.description().replace('\n', "\n    "));
            }
            text.push('\n');
        }
        if !self.params.is_empty() {
            text.push_str("params:");
            for param in &self.params {
                text.push_str(&format!("\n  - {}: {}", param.name, param.description));
            }
            text.push('\n');
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::Arg;

    #[test]
    fn test_ports_keep_declaration_order() {
        let mut spec = OperatorSpec::new("op");
        spec.input("b");
        spec.input("a");
        spec.output("out");
        assert_eq!(spec.port_names(IOType::Input), vec!["b", "a"]);
        assert_eq!(spec.port_names(IOType::Output), vec!["out"]);
        assert!(spec.issues().is_empty());
    }

    #[test]
    fn test_redeclared_port_returns_existing() {
        let mut spec = OperatorSpec::new("op");
        spec.input("in").set_queue_size(4);
        let again = spec.input("in");
        assert_eq!(again.queue_size().as_i64(), 4);
        assert_eq!(spec.inputs().len(), 1);
        assert!(matches!(
            spec.issues(),
            [ConfigError::DuplicatePort { .. }]
        ));
    }

    #[test]
    fn test_same_name_allowed_across_directions() {
        let mut spec = OperatorSpec::new("op");
        spec.input("data");
        spec.output("data");
        assert!(spec.issues().is_empty());
    }

    #[test]
    fn test_dotted_port_name_is_recorded() {
        let mut spec = OperatorSpec::new("op");
        spec.output("a.b");
        assert!(matches!(
            spec.issues(),
            [ConfigError::InvalidPortName { .. }]
        ));
    }

    #[test]
    fn test_multi_port_condition_records_ports_and_args() {
        let mut spec = OperatorSpec::new("op");
        spec.input("in1");
        spec.input("in2");
        spec.input("in3");

        let mut args = ArgList::new();
        args.add(Arg::new("sampling_mode", "PerReceiver")).unwrap();
        args.add(Arg::new("min_sizes", vec![1usize, 2, 1])).unwrap();
        spec.multi_port_condition(ConditionKind::MultiMessageAvailable, ["in1", "in3"], args);

        let conditions = spec.multi_port_conditions();
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].port_names, vec!["in1", "in3"]);
        assert_eq!(
            conditions[0].args.value::<Vec<usize>>("min_sizes").unwrap(),
            Some(vec![1, 2, 1])
        );
    }

    #[test]
    fn test_multi_port_condition_requires_ports() {
        let mut spec = OperatorSpec::new("op");
        let empty: [&str; 0] = [];
        spec.multi_port_condition(ConditionKind::MultiMessageAvailable, empty, ArgList::new());
        assert!(spec.multi_port_conditions().is_empty());
        assert_eq!(spec.issues().len(), 1);
    }
}
