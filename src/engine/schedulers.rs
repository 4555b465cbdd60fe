// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::engine::{Scheduler, TaskSet};
use crate::errors::ExecutionError;
use crate::scheduler::SchedulerKind;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Dispatches one operator at a time in topological order.
///
/// Inputs are synced right before each operator is evaluated, so a message
/// emitted upstream is visible downstream within the same tick.
pub(crate) struct GreedyScheduler;

#[async_trait]
impl Scheduler for GreedyScheduler {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Greedy
    }

    async fn tick(&self, tasks: &mut TaskSet, tick: u64) -> Result<usize, ExecutionError> {
        let mut dispatched = 0;
        for index in tasks.order() {
            tasks.sync_inputs(index);
            if !tasks.readiness(index, Instant::now()).is_ready() {
                continue;
            }

            let task = tasks.take(index)?;
            let pool = tasks.pool_for(&task)?;
            let (task, outcome) = pool.run(move || task.step(tick)).await?;
            let name = task.name.clone();
            tasks.restore(index, task);
            dispatched += 1;

            if let Err(reason) = outcome {
                return Err(tasks.failure(&name, reason));
            }
        }
        Ok(dispatched)
    }

    async fn idle(&self, wakeup: &Notify, cancel: &CancellationToken, timeout: Option<Duration>) {
        wait_for_wakeup(wakeup, cancel, timeout).await;
    }
}

/// Runs every ready operator concurrently on its pool and polls while idle.
pub(crate) struct MultiThreadScheduler {
    check_recession_period: Duration,
}

impl MultiThreadScheduler {
    pub(crate) fn new(check_recession_period: Duration) -> Self {
        Self {
            check_recession_period,
        }
    }
}

#[async_trait]
impl Scheduler for MultiThreadScheduler {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::MultiThread
    }

    async fn tick(&self, tasks: &mut TaskSet, tick: u64) -> Result<usize, ExecutionError> {
        dispatch_ready(tasks, tick).await
    }

    async fn idle(&self, _wakeup: &Notify, cancel: &CancellationToken, timeout: Option<Duration>) {
        let period = match timeout {
            Some(timeout) => timeout.min(self.check_recession_period),
            None => self.check_recession_period,
        };
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(period) => {}
        }
    }
}

/// Runs every ready operator concurrently and sleeps until something changes.
pub(crate) struct EventBasedScheduler;

#[async_trait]
impl Scheduler for EventBasedScheduler {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::EventBased
    }

    async fn tick(&self, tasks: &mut TaskSet, tick: u64) -> Result<usize, ExecutionError> {
        dispatch_ready(tasks, tick).await
    }

    async fn idle(&self, wakeup: &Notify, cancel: &CancellationToken, timeout: Option<Duration>) {
        wait_for_wakeup(wakeup, cancel, timeout).await;
    }
}

/// Syncs all queues, then dispatches every ready operator and waits for all
/// of them. Messages emitted during the tick become visible on the next one.
async fn dispatch_ready(tasks: &mut TaskSet, tick: u64) -> Result<usize, ExecutionError> {
    tasks.sync_all();
    let now = Instant::now();
    let ready: Vec<usize> = tasks
        .order()
        .into_iter()
        .filter(|&index| tasks.readiness(index, now).is_ready())
        .collect();

    let mut running = Vec::with_capacity(ready.len());
    for index in ready {
        let task = tasks.take(index)?;
        let pool = match tasks.pool_for(&task) {
            Ok(pool) => pool,
            Err(err) => {
                tasks.restore(index, task);
                return Err(err);
            }
        };
        let handle = tokio::spawn(async move { pool.run(move || task.step(tick)).await });
        running.push((index, handle));
    }

    let dispatched = running.len();
    let mut failure = None;
    for (index, handle) in running {
        let error = match handle.await {
            Ok(Ok((task, outcome))) => {
                let name = task.name.clone();
                tasks.restore(index, task);
                match outcome {
                    Ok(()) => continue,
                    Err(reason) => tasks.failure(&name, reason),
                }
            }
            Ok(Err(err)) => err,
            Err(join_error) => ExecutionError::InternalError {
                message: format!("Task join error: {}", join_error),
            },
        };
        failure.get_or_insert(error);
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(dispatched),
    }
}

async fn wait_for_wakeup(wakeup: &Notify, cancel: &CancellationToken, timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => {
            tokio::select! {
                _ = wakeup.notified() => {}
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {}
            }
        }
        None => {
            tokio::select! {
                _ = wakeup.notified() => {}
                _ = cancel.cancelled() => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wakeup_ends_idle() {
        let notify = Notify::new();
        let cancel = CancellationToken::new();
        notify.notify_one();
        // A stored permit is consumed immediately.
        EventBasedScheduler.idle(&notify, &cancel, None).await;
    }

    #[tokio::test]
    async fn test_cancel_ends_idle() {
        let notify = Notify::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        GreedyScheduler.idle(&notify, &cancel, None).await;
        MultiThreadScheduler::new(Duration::from_secs(60))
            .idle(&notify, &cancel, None)
            .await;
    }

    #[tokio::test]
    async fn test_multi_thread_idle_is_capped_by_timeout() {
        let started = Instant::now();
        MultiThreadScheduler::new(Duration::from_secs(60))
            .idle(&Notify::new(), &CancellationToken::new(), Some(Duration::from_millis(5)))
            .await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
