// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::args::ArgType;
use thiserror::Error;

/// Errors raised while building or reading typed arguments.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArgError {
    /// Arguments must carry a non-empty name.
    #[error("Argument name must not be empty")]
    EmptyName,

    /// An argument's type is fixed by its first value.
    #[error("Argument '{name}' holds {expected} and cannot take a {found} value")]
    TypeMismatch {
        name: String,
        expected: ArgType,
        found: ArgType,
    },

    /// The argument was declared without a value.
    #[error("Argument '{name}' has no value")]
    MissingValue { name: String },

    /// The stored value could not be converted to the requested type.
    #[error("Argument '{name}' cannot be read as {target}: {reason}")]
    Conversion {
        name: String,
        target: &'static str,
        reason: String,
    },
}
