// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod args;
mod config;
mod execution;
mod transport;

pub use args::ArgError;
pub use config::ConfigError;
pub use execution::ExecutionError;
pub use transport::TransportError;
