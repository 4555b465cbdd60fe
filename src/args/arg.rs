// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::ArgError;
use serde::de::DeserializeOwned;
use serde_yaml::Value;
use std::fmt::{Display, Formatter};

/// Element type of an argument value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgElementType {
    Bool,
    Int64,
    UInt64,
    Float64,
    String,
    YamlNode,
}

impl ArgElementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArgElementType::Bool => "bool",
            ArgElementType::Int64 => "i64",
            ArgElementType::UInt64 => "u64",
            ArgElementType::Float64 => "f64",
            ArgElementType::String => "String",
            ArgElementType::YamlNode => "YAML::Node",
        }
    }
}

/// Container shape of an argument value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgContainerType {
    Scalar,
    /// Fixed-size array; carries its length.
    Array(usize),
    Vector,
}

/// Element type plus container shape, recorded on first assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArgType {
    element: ArgElementType,
    container: ArgContainerType,
}

impl ArgType {
    pub fn new(element: ArgElementType, container: ArgContainerType) -> Self {
        Self { element, container }
    }

    pub fn element_type(&self) -> ArgElementType {
        self.element
    }

    pub fn container_type(&self) -> ArgContainerType {
        self.container
    }

    /// 0 for scalars, 1 for arrays and vectors.
    pub fn dimension(&self) -> usize {
        match self.container {
            ArgContainerType::Scalar => 0,
            ArgContainerType::Array(_) | ArgContainerType::Vector => 1,
        }
    }
}

impl Display for ArgType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let element = self.element.as_str();
        match self.container {
            ArgContainerType::Scalar => write!(f, "{}", element),
            ArgContainerType::Array(len) => write!(f, "[{}; {}]", element, len),
            ArgContainerType::Vector => write!(f, "Vec<{}>", element),
        }
    }
}

/// A single typed element.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgScalar {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Node(Value),
}

impl ArgScalar {
    pub fn element_type(&self) -> ArgElementType {
        match self {
            ArgScalar::Bool(_) => ArgElementType::Bool,
            ArgScalar::Int(_) => ArgElementType::Int64,
            ArgScalar::UInt(_) => ArgElementType::UInt64,
            ArgScalar::Float(_) => ArgElementType::Float64,
            ArgScalar::String(_) => ArgElementType::String,
            ArgScalar::Node(_) => ArgElementType::YamlNode,
        }
    }

    fn to_yaml(&self) -> Value {
        match self {
            ArgScalar::Bool(v) => Value::Bool(*v),
            ArgScalar::Int(v) => Value::Number((*v).into()),
            ArgScalar::UInt(v) => Value::Number((*v).into()),
            ArgScalar::Float(v) => Value::Number((*v).into()),
            ArgScalar::String(v) => Value::String(v.clone()),
            ArgScalar::Node(v) => v.clone(),
        }
    }
}

/// A stored argument value.
///
/// Containers remember their element type so that an empty vector still has
/// a well-defined [`ArgType`].
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Scalar(ArgScalar),
    Array {
        element: ArgElementType,
        items: Vec<ArgScalar>,
    },
    Vector {
        element: ArgElementType,
        items: Vec<ArgScalar>,
    },
}

impl ArgValue {
    pub fn arg_type(&self) -> ArgType {
        match self {
            ArgValue::Scalar(scalar) => ArgType::new(scalar.element_type(), ArgContainerType::Scalar),
            ArgValue::Array { element, items } => {
                ArgType::new(*element, ArgContainerType::Array(items.len()))
            }
            ArgValue::Vector { element, .. } => ArgType::new(*element, ArgContainerType::Vector),
        }
    }

    /// Renders the value as a YAML node, the common form every typed read goes through.
    pub fn to_yaml(&self) -> Value {
        match self {
            ArgValue::Scalar(scalar) => scalar.to_yaml(),
            ArgValue::Array { items, .. } | ArgValue::Vector { items, .. } => {
                Value::Sequence(items.iter().map(ArgScalar::to_yaml).collect())
            }
        }
    }

    /// Wraps a configuration node, promoting plain scalars to their typed form.
    pub fn from_yaml(node: Value) -> Self {
        match node {
            Value::Bool(v) => ArgValue::from(v),
            Value::String(v) => ArgValue::from(v),
            Value::Number(ref n) if n.is_i64() => ArgValue::from(n.as_i64().unwrap_or_default()),
            Value::Number(ref n) if n.is_u64() => ArgValue::from(n.as_u64().unwrap_or_default()),
            Value::Number(ref n) => ArgValue::from(n.as_f64().unwrap_or_default()),
            other => ArgValue::Scalar(ArgScalar::Node(other)),
        }
    }
}

macro_rules! scalar_from {
    ($($ty:ty => $variant:ident as $cast:ty),* $(,)?) => {
        $(
            impl From<$ty> for ArgScalar {
                fn from(value: $ty) -> Self {
                    ArgScalar::$variant(value as $cast)
                }
            }
        )*
    };
}

scalar_from!(
    i32 => Int as i64,
    i64 => Int as i64,
    u32 => UInt as u64,
    u64 => UInt as u64,
    usize => UInt as u64,
    f32 => Float as f64,
    f64 => Float as f64,
);

impl From<bool> for ArgScalar {
    fn from(value: bool) -> Self {
        ArgScalar::Bool(value)
    }
}

impl From<&str> for ArgScalar {
    fn from(value: &str) -> Self {
        ArgScalar::String(value.to_string())
    }
}

impl From<String> for ArgScalar {
    fn from(value: String) -> Self {
        ArgScalar::String(value)
    }
}

impl From<Value> for ArgScalar {
    fn from(value: Value) -> Self {
        ArgScalar::Node(value)
    }
}

macro_rules! value_from_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for ArgValue {
                fn from(value: $ty) -> Self {
                    ArgValue::Scalar(ArgScalar::from(value))
                }
            }
        )*
    };
}

value_from_scalar!(bool, i32, i64, u32, u64, usize, f32, f64, &str, String, Value);

impl From<ArgScalar> for ArgValue {
    fn from(value: ArgScalar) -> Self {
        ArgValue::Scalar(value)
    }
}

impl<T: Into<ArgScalar> + ElementOf> From<Vec<T>> for ArgValue {
    fn from(values: Vec<T>) -> Self {
        ArgValue::Vector {
            element: T::ELEMENT,
            items: values.into_iter().map(Into::into).collect(),
        }
    }
}

impl<T: Into<ArgScalar> + ElementOf, const N: usize> From<[T; N]> for ArgValue {
    fn from(values: [T; N]) -> Self {
        ArgValue::Array {
            element: T::ELEMENT,
            items: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// Static element type of a Rust value, used for empty containers.
pub trait ElementOf {
    const ELEMENT: ArgElementType;
}

macro_rules! element_of {
    ($($ty:ty => $element:ident),* $(,)?) => {
        $(impl ElementOf for $ty { const ELEMENT: ArgElementType = ArgElementType::$element; })*
    };
}

element_of!(
    bool => Bool,
    i32 => Int64,
    i64 => Int64,
    u32 => UInt64,
    u64 => UInt64,
    usize => UInt64,
    f32 => Float64,
    f64 => Float64,
    &str => String,
    String => String,
    Value => YamlNode,
);

/// A named argument with an optional typed value.
#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    name: String,
    value: Option<ArgValue>,
}

impl Arg {
    pub fn new(name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    /// An argument with a name but no value yet.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    pub fn value(&self) -> Option<&ArgValue> {
        self.value.as_ref()
    }

    pub fn arg_type(&self) -> Option<ArgType> {
        self.value.as_ref().map(ArgValue::arg_type)
    }

    /// Stores a value. Once typed, an argument only accepts values of the same type.
    pub fn set_value(&mut self, value: impl Into<ArgValue>) -> Result<(), ArgError> {
        let value = value.into();
        if let Some(expected) = self.arg_type() {
            let found = value.arg_type();
            if expected.element_type() != found.element_type()
                || std::mem::discriminant(&expected.container_type())
                    != std::mem::discriminant(&found.container_type())
            {
                return Err(ArgError::TypeMismatch {
                    name: self.name.clone(),
                    expected,
                    found,
                });
            }
        }
        self.value = Some(value);
        Ok(())
    }

    /// Reads the value as `T`, converting through its YAML form.
    ///
    /// Numeric widening and narrowing follow serde's rules, so an `i64`
    /// argument of `3` reads fine as `u32` while `-1` does not.
    pub fn get<T: DeserializeOwned>(&self) -> Result<T, ArgError> {
        let value = self.value.as_ref().ok_or_else(|| ArgError::MissingValue {
            name: self.name.clone(),
        })?;
        serde_yaml::from_value(value.to_yaml()).map_err(|e| ArgError::Conversion {
            name: self.name.clone(),
            target: std::any::type_name::<T>(),
            reason: e.to_string(),
        })
    }

    /// Multi-line `name`/`type`/`value` rendering used in component descriptions.
    pub fn description(&self) -> String {
        let type_text = self
            .arg_type()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "unset".to_string());
        let value_text = self
            .value
            .as_ref()
            .and_then(|v| serde_yaml::to_string(&v.to_yaml()).ok())
            .map(|s| s.trim_end().to_string())
            .unwrap_or_else(|| "~".to_string());
        format!("name: {}\ntype: {}\nvalue: {}", self.name, type_text, value_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_types_are_recorded() {
        assert_eq!(Arg::new("a", 7i32).arg_type().unwrap().to_string(), "i64");
        assert_eq!(Arg::new("a", 7u64).arg_type().unwrap().to_string(), "u64");
        assert_eq!(Arg::new("a", 1.5f32).arg_type().unwrap().to_string(), "f64");
        assert_eq!(Arg::new("a", "x").arg_type().unwrap().to_string(), "String");
        assert_eq!(Arg::new("a", true).arg_type().unwrap().to_string(), "bool");
    }

    #[test]
    fn test_container_types_are_recorded() {
        let vector = Arg::new("v", vec![1.0f64, 2.0]);
        assert_eq!(vector.arg_type().unwrap().to_string(), "Vec<f64>");

        let array = Arg::new("a", [1u64, 2, 3]);
        assert_eq!(array.arg_type().unwrap().to_string(), "[u64; 3]");

        let empty: Vec<String> = Vec::new();
        let empty = Arg::new("e", empty);
        assert_eq!(empty.arg_type().unwrap().to_string(), "Vec<String>");
    }

    #[test]
    fn test_unset_arg_has_no_type() {
        let arg = Arg::named("later");
        assert!(!arg.has_value());
        assert!(arg.arg_type().is_none());
        assert_eq!(
            arg.get::<i64>(),
            Err(ArgError::MissingValue {
                name: "later".to_string()
            })
        );
    }

    #[test]
    fn test_type_is_fixed_after_first_value() {
        let mut arg = Arg::named("n");
        arg.set_value(3i64).unwrap();
        arg.set_value(4i64).unwrap();
        assert_eq!(arg.get::<i64>().unwrap(), 4);

        let err = arg.set_value("four").unwrap_err();
        assert!(matches!(err, ArgError::TypeMismatch { .. }));
        assert_eq!(arg.get::<i64>().unwrap(), 4);
    }

    #[test]
    fn test_typed_reads_convert_through_yaml() {
        let arg = Arg::new("sizes", vec![1usize, 2, 1]);
        assert_eq!(arg.get::<Vec<usize>>().unwrap(), vec![1, 2, 1]);

        let negative = Arg::new("n", -1i64);
        assert!(matches!(
            negative.get::<u32>(),
            Err(ArgError::Conversion { .. })
        ));
    }

    #[test]
    fn test_yaml_nodes_promote_plain_scalars() {
        let value = ArgValue::from_yaml(serde_yaml::from_str("42").unwrap());
        assert_eq!(value, ArgValue::from(42i64));

        let node: Value = serde_yaml::from_str("{a: 1}").unwrap();
        let value = ArgValue::from_yaml(node.clone());
        assert_eq!(value.arg_type().to_string(), "YAML::Node");
        assert_eq!(value.to_yaml(), node);
    }

    #[test]
    fn test_description_lists_name_type_and_value() {
        let text = Arg::new("period", "10hz").description();
        assert!(text.contains("name: period"));
        assert!(text.contains("type: String"));
        assert!(text.contains("value: 10hz"));
    }
}
