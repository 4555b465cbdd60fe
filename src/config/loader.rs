// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::args::{Arg, ArgList, ArgScalar, ArgValue};
use crate::errors::ConfigError;
use crate::observability::messages::graph::ConfigKeyNotFound;
use crate::observability::messages::StructuredLog;
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// A hierarchical configuration document.
///
/// YAML and TOML files both load into the same YAML value tree; the format
/// is picked by file extension (`.toml`, anything else is YAML).
///
/// # Example
/// ```yaml
/// scheduler:
///   scheduler: event_based
///   worker_thread_number: 2
/// tx:
///   count: 10
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    path: Option<PathBuf>,
    root: Value,
}

impl Config {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_value(root: Value) -> Self {
        Self { path: None, root }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let root = serde_yaml::from_str(text).map_err(|e| ConfigError::ConfigFile {
            path: PathBuf::new(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_value(root))
    }

    /// Reads and parses a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let failure = |reason: String| ConfigError::ConfigFile {
            path: path.to_path_buf(),
            reason,
        };

        let content = fs::read_to_string(path).map_err(|e| failure(e.to_string()))?;
        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| ext.eq_ignore_ascii_case("toml"));

        let root = if is_toml {
            let table: toml::Value = toml::from_str(&content).map_err(|e| failure(e.to_string()))?;
            serde_yaml::to_value(table).map_err(|e| failure(e.to_string()))?
        } else {
            serde_yaml::from_str(&content).map_err(|e| failure(e.to_string()))?
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            root,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Walks a dotted key such as `"tx.queue.capacity"`.
    pub fn lookup(&self, key: &str) -> Option<&Value> {
        key.split('.')
            .filter(|part| !part.is_empty())
            .try_fold(&self.root, |node, part| node.as_mapping()?.get(part))
    }

    /// Arguments stored under `key`.
    ///
    /// A map yields one argument per entry; any other node yields a single
    /// argument named after the last key part. Every argument holds a YAML
    /// node. A missing key is logged and yields an empty list.
    pub fn args(&self, key: &str) -> ArgList {
        let mut list = ArgList::named(key);
        let Some(node) = self.lookup(key) else {
            ConfigKeyNotFound { key }.log();
            return list;
        };

        match node {
            Value::Mapping(map) => {
                list.extend(
                    map.iter()
                        .map(|(name, value)| Arg::new(key_text(name), node_value(value)))
                        .collect(),
                );
            }
            other => {
                let name = key.rsplit('.').next().unwrap_or(key);
                list.extend(std::iter::once(Arg::new(name, node_value(other))).collect());
            }
        }
        list
    }
}

fn node_value(value: &Value) -> ArgValue {
    ArgValue::Scalar(ArgScalar::Node(value.clone()))
}

fn key_text(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::ArgElementType;

    const DOC: &str = r#"
tx:
  count: 5
  label: "ping"
  sizes: [1, 2, 3]
rate: 30
nested:
  deeper:
    value: 2.5
"#;

    #[test]
    fn test_map_key_yields_one_arg_per_entry() {
        let config = Config::from_yaml_str(DOC).unwrap();
        let args = config.args("tx");

        assert_eq!(args.name(), "tx");
        assert_eq!(args.len(), 3);
        assert_eq!(args.value::<u32>("count").unwrap(), Some(5));
        assert_eq!(args.value::<String>("label").unwrap(), Some("ping".to_string()));
        assert_eq!(args.value::<Vec<u8>>("sizes").unwrap(), Some(vec![1, 2, 3]));
        let arg_type = args.get("count").and_then(|a| a.arg_type()).unwrap();
        assert_eq!(arg_type.element_type(), ArgElementType::YamlNode);
    }

    #[test]
    fn test_scalar_key_is_named_after_last_part() {
        let config = Config::from_yaml_str(DOC).unwrap();
        let args = config.args("nested.deeper.value");
        assert_eq!(args.len(), 1);
        assert_eq!(args.value::<f64>("value").unwrap(), Some(2.5));
        assert_eq!(config.args("rate").value::<i64>("rate").unwrap(), Some(30));
    }

    #[test]
    fn test_missing_key_yields_empty_list() {
        let config = Config::from_yaml_str(DOC).unwrap();
        assert!(config.args("nope").is_empty());
        assert!(config.args("tx.nope").is_empty());
        assert!(Config::empty().args("tx").is_empty());
    }
}
