// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod loader;
mod options;

pub mod consts;

pub use loader::Config;
pub use options::{parse_address, Address, AppOptions};
