// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::TransportError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One unit of data moving across a port.
///
/// Payloads are opaque bytes tagged with a type name. Values are encoded
/// as JSON so that the same message can stay in process or cross a network
/// edge unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    type_name: String,
    #[serde(with = "payload_base64")]
    payload: Vec<u8>,
}

impl Message {
    /// Type name of raw byte payloads; always transmissible.
    pub const BYTES: &'static str = "bytes";

    pub fn new(type_name: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            type_name: type_name.into(),
            payload,
        }
    }

    pub fn from_bytes(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(Self::BYTES, payload.into())
    }

    /// Encodes a value as JSON under the given type name.
    pub fn encode<T: Serialize>(type_name: impl Into<String>, value: &T) -> Result<Self, TransportError> {
        let type_name = type_name.into();
        let payload = serde_json::to_vec(value).map_err(|e| TransportError::Codec {
            type_name: type_name.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self { type_name, payload })
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        serde_json::from_slice(&self.payload).map_err(|e| TransportError::Codec {
            type_name: self.type_name.clone(),
            reason: e.to_string(),
        })
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

mod payload_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

type Validator = fn(&[u8]) -> Result<(), String>;

#[derive(Debug, Clone, Copy)]
struct Codec {
    rust_type: &'static str,
    validate: Validator,
}

fn accept_any(_: &[u8]) -> Result<(), String> {
    Ok(())
}

fn validate_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<(), String> {
    serde_json::from_slice::<T>(bytes)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// Message types allowed to cross network edges.
///
/// Built once at startup, shared by `Arc`, and handed to every executor.
/// Receivers check incoming payloads against the registered type and drop
/// messages that do not decode.
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    codecs: HashMap<String, Codec>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        let mut codecs = HashMap::new();
        codecs.insert(
            Message::BYTES.to_string(),
            Codec {
                rust_type: "Vec<u8>",
                validate: accept_any,
            },
        );
        Self { codecs }
    }
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` under `type_name`, replacing any earlier registration.
    pub fn register<T: DeserializeOwned + 'static>(&mut self, type_name: impl Into<String>) -> &mut Self {
        self.codecs.insert(
            type_name.into(),
            Codec {
                rust_type: std::any::type_name::<T>(),
                validate: validate_json::<T>,
            },
        );
        self
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.codecs.contains_key(type_name)
    }

    /// Rust type registered under `type_name`.
    pub fn rust_type(&self, type_name: &str) -> Option<&'static str> {
        self.codecs.get(type_name).map(|c| c.rust_type)
    }

    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.codecs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn validate(&self, message: &Message) -> Result<(), TransportError> {
        let codec = self
            .codecs
            .get(message.type_name())
            .ok_or_else(|| TransportError::UnregisteredType {
                type_name: message.type_name().to_string(),
            })?;
        (codec.validate)(message.payload()).map_err(|reason| TransportError::Codec {
            type_name: message.type_name().to_string(),
            reason,
        })
    }
}
