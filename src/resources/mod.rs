// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Shared resources operators can be assigned to.

mod thread_pool;

pub use thread_pool::{PoolMember, ThreadPool};
pub(crate) use thread_pool::WorkerPool;
