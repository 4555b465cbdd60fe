// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::ConfigError;
use std::collections::{BTreeSet, HashSet};

/// `(upstream port, downstream port)`.
pub type PortPair = (String, String);

/// Port pairs handed to `add_flow`.
///
/// Only sets are accepted. Ordered sequences convert into this type so the
/// mistake is reported as a [`ConfigError::PortPairsNotSet`] instead of
/// being quietly reinterpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortPairs {
    Set(BTreeSet<PortPair>),
    Sequence(Vec<PortPair>),
}

impl PortPairs {
    pub fn set<I, A, B>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        PortPairs::Set(pairs.into_iter().map(|(a, b)| (a.into(), b.into())).collect())
    }

    /// The empty set. Between operators this asks for automatic port mapping.
    pub fn none() -> Self {
        PortPairs::Set(BTreeSet::new())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            PortPairs::Set(pairs) => pairs.is_empty(),
            PortPairs::Sequence(pairs) => pairs.is_empty(),
        }
    }

    pub(crate) fn into_set(self, upstream: &str, downstream: &str) -> Result<BTreeSet<PortPair>, ConfigError> {
        match self {
            PortPairs::Set(pairs) => Ok(pairs),
            PortPairs::Sequence(_) => Err(ConfigError::PortPairsNotSet {
                upstream: upstream.to_string(),
                downstream: downstream.to_string(),
            }),
        }
    }
}

impl Default for PortPairs {
    fn default() -> Self {
        PortPairs::none()
    }
}

impl<A: Into<String>, B: Into<String>> From<BTreeSet<(A, B)>> for PortPairs {
    fn from(pairs: BTreeSet<(A, B)>) -> Self {
        PortPairs::set(pairs)
    }
}

impl<A: Into<String>, B: Into<String>> From<HashSet<(A, B)>> for PortPairs {
    fn from(pairs: HashSet<(A, B)>) -> Self {
        PortPairs::set(pairs)
    }
}

impl<A: Into<String>, B: Into<String>> From<Vec<(A, B)>> for PortPairs {
    fn from(pairs: Vec<(A, B)>) -> Self {
        PortPairs::Sequence(pairs.into_iter().map(|(a, b)| (a.into(), b.into())).collect())
    }
}

impl<A: Into<String>, B: Into<String>, const N: usize> From<[(A, B); N]> for PortPairs {
    fn from(pairs: [(A, B); N]) -> Self {
        PortPairs::Sequence(pairs.into_iter().map(|(a, b)| (a.into(), b.into())).collect())
    }
}

/// Splits `operator.port` at its last dot. A bare name has no port part.
pub fn split_qualified(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((operator, port)) => (operator, Some(port)),
        None => (name, None),
    }
}
