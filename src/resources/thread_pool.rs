// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::component::{Component, ComponentBase};
use crate::errors::ExecutionError;
use crate::fragment::OperatorHandle;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// One operator assigned to a thread pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolMember {
    pub operator: OperatorHandle,
    /// Recorded for reporting; every member runs only inside its pool.
    pub pin: bool,
}

/// A named group of worker threads declared on a fragment.
///
/// Operators added to a pool run only on that pool's threads, which keeps
/// slow or blocking operators away from the default pool.
#[derive(Debug, Clone)]
pub struct ThreadPool {
    base: ComponentBase,
    size: usize,
    members: Vec<PoolMember>,
}

impl ThreadPool {
    pub(crate) fn new(name: &str, size: usize) -> Self {
        Self {
            base: ComponentBase::new(name),
            size,
            members: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Assigns an operator; adding it again only updates `pin`.
    pub fn add(&mut self, operator: OperatorHandle, pin: bool) -> &mut Self {
        match self.members.iter_mut().find(|m| m.operator == operator) {
            Some(member) => member.pin = pin,
            None => self.members.push(PoolMember { operator, pin }),
        }
        self
    }

    pub fn members(&self) -> &[PoolMember] {
        &self.members
    }

    pub fn contains(&self, operator: OperatorHandle) -> bool {
        self.members.iter().any(|m| m.operator == operator)
    }

    pub(crate) fn register(&mut self, fragment: &str, id: i64) {
        self.base.register(fragment, id);
    }
}

impl Component for ThreadPool {
    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }
}

/// Runtime side of a pool: a bounded number of slots on blocking threads.
///
/// Each operator step holds one slot for its whole duration, so at most
/// `size` steps of the pool run at once.
#[derive(Debug, Clone)]
pub(crate) struct WorkerPool {
    name: Arc<str>,
    size: usize,
    slots: Arc<Semaphore>,
}

impl WorkerPool {
    pub(crate) fn new(name: &str, size: usize) -> Result<Self, ExecutionError> {
        if size == 0 {
            return Err(ExecutionError::WorkerPool {
                pool: name.to_string(),
                reason: "a pool needs at least one thread".to_string(),
            });
        }
        Ok(Self {
            name: Arc::from(name),
            size,
            slots: Arc::new(Semaphore::new(size)),
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// Runs `job` on a blocking thread once a slot is free.
    pub(crate) async fn run<F, R>(&self, job: F) -> Result<R, ExecutionError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let failure = |reason: String| ExecutionError::WorkerPool {
            pool: self.name.to_string(),
            reason,
        };

        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| failure(e.to_string()))?;

        tokio::task::spawn_blocking(move || {
            let _slot = permit;
            job()
        })
        .await
        .map_err(|e| failure(e.to_string()))
    }
}
