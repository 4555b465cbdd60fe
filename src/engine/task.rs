// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::conditions::{ConditionRuntime, SchedulingStatus};
use crate::connectors::MessageQueue;
use crate::errors::ExecutionError;
use crate::observability::messages::engine::{OperatorFailed, OperatorRetired};
use crate::observability::messages::StructuredLog;
use crate::operator::{ExecutionContext, InputContext, OperatorLogic, OutputContext};
use crate::resources::WorkerPool;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Everything needed to dispatch one operator, movable onto a worker thread.
pub(crate) struct OperatorTask {
    pub(crate) name: String,
    pub(crate) pool: usize,
    logic: Box<dyn OperatorLogic>,
    conditions: Vec<ConditionRuntime>,
    input_queues: Vec<Arc<MessageQueue>>,
    input: InputContext,
    output: OutputContext,
    context: ExecutionContext,
    dispatches: u64,
}

impl OperatorTask {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: &str,
        pool: usize,
        logic: Box<dyn OperatorLogic>,
        conditions: Vec<ConditionRuntime>,
        input_queues: Vec<Arc<MessageQueue>>,
        input: InputContext,
        output: OutputContext,
        context: ExecutionContext,
    ) -> Self {
        Self {
            name: name.to_string(),
            pool,
            logic,
            conditions,
            input_queues,
            input,
            output,
            context,
            dispatches: 0,
        }
    }

    /// Combined verdict of every condition; no conditions means always ready.
    ///
    /// An operator also waits while one of its network edges has a full outbox.
    pub(crate) fn readiness(&self, now: Instant) -> SchedulingStatus {
        let status = self
            .conditions
            .iter()
            .map(|c| c.evaluate(now))
            .fold(SchedulingStatus::Ready, SchedulingStatus::combine);
        if self.output.has_saturated_network_edge() {
            status.combine(SchedulingStatus::Wait)
        } else {
            status
        }
    }

    pub(crate) fn sync_inputs(&self) -> usize {
        self.input_queues.iter().map(|q| q.sync()).sum()
    }

    pub(crate) fn dispatches(&self) -> u64 {
        self.dispatches
    }

    pub(crate) fn has_network_backlog(&self) -> bool {
        self.output.has_network_backlog()
    }

    pub(crate) fn start(&mut self) -> Result<(), String> {
        self.logic.start().map_err(|e| e.to_string())
    }

    pub(crate) fn stop(&mut self) {
        let logic = &mut self.logic;
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| logic.stop())) {
            tracing::warn!(
                operator = %self.name,
                "stop hook panicked: {}",
                panic_message(payload.as_ref())
            );
        }
    }

    /// Runs one `compute`. A panic is caught and reported like an error.
    pub(crate) fn step(mut self: Box<Self>, tick: u64) -> (Box<Self>, Result<(), String>) {
        let started = Instant::now();
        self.context.set_tick(tick);

        let task = &mut *self;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            task.logic
                .compute(&mut task.input, &mut task.output, &mut task.context)
        }));

        for condition in &mut self.conditions {
            condition.on_dispatched(started);
        }
        self.dispatches += 1;

        let result = match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err.to_string()),
            Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
        };
        (self, result)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// The operators of one fragment, in dispatch order, plus their pools.
///
/// A task is taken out of its slot while it runs and put back afterwards,
/// so a missing slot means "currently dispatched" (or lost to a pool failure).
pub(crate) struct TaskSet {
    fragment: String,
    slots: Vec<Option<Box<OperatorTask>>>,
    order: Vec<usize>,
    predecessors: Vec<Vec<usize>>,
    pools: Vec<WorkerPool>,
    queues: Vec<Arc<MessageQueue>>,
    retired: Vec<bool>,
}

impl TaskSet {
    pub(crate) fn new(
        fragment: &str,
        tasks: Vec<OperatorTask>,
        order: Vec<usize>,
        predecessors: Vec<Vec<usize>>,
        pools: Vec<WorkerPool>,
    ) -> Self {
        let queues = tasks
            .iter()
            .flat_map(|t| t.input_queues.iter().cloned())
            .collect();
        let retired = vec![false; tasks.len()];
        Self {
            fragment: fragment.to_string(),
            slots: tasks.into_iter().map(|t| Some(Box::new(t))).collect(),
            order,
            predecessors,
            pools,
            queues,
            retired,
        }
    }

    pub(crate) fn fragment(&self) -> &str {
        &self.fragment
    }

    /// Operator indices in topological order.
    pub(crate) fn order(&self) -> Vec<usize> {
        self.order.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Moves every back-stage message forward; returns how many moved.
    pub(crate) fn sync_all(&self) -> usize {
        self.queues.iter().map(|q| q.sync()).sum()
    }

    pub(crate) fn sync_inputs(&self, index: usize) -> usize {
        self.slots
            .get(index)
            .and_then(|slot| slot.as_ref())
            .map_or(0, |task| task.sync_inputs())
    }

    pub(crate) fn readiness(&self, index: usize, now: Instant) -> SchedulingStatus {
        self.slots
            .get(index)
            .and_then(|slot| slot.as_ref())
            .map_or(SchedulingStatus::Never, |task| task.readiness(now))
    }

    pub(crate) fn take(&mut self, index: usize) -> Result<Box<OperatorTask>, ExecutionError> {
        self.slots
            .get_mut(index)
            .and_then(Option::take)
            .ok_or_else(|| ExecutionError::InternalError {
                message: format!("operator #{} of '{}' is not available for dispatch", index, self.fragment),
            })
    }

    pub(crate) fn restore(&mut self, index: usize, task: Box<OperatorTask>) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = Some(task);
        }
    }

    /// Pool the task runs on; index 0 is the fragment's default pool.
    pub(crate) fn pool_for(&self, task: &OperatorTask) -> Result<WorkerPool, ExecutionError> {
        self.pools
            .get(task.pool)
            .or_else(|| self.pools.first())
            .cloned()
            .ok_or_else(|| ExecutionError::InternalError {
                message: format!("fragment '{}' has no worker pool", self.fragment),
            })
    }

    /// Logs and builds the error for a failed compute.
    pub(crate) fn failure(&self, operator: &str, reason: String) -> ExecutionError {
        OperatorFailed {
            fragment: &self.fragment,
            operator,
            error: &reason,
        }
        .log();
        ExecutionError::OperatorFailed {
            operator: operator.to_string(),
            reason,
        }
    }

    /// Fragment-wide verdict: any ready operator wins, then the soonest timer,
    /// then pending events, then plain waits. `Never` only if all are `Never`.
    pub(crate) fn outlook(&mut self, now: Instant) -> SchedulingStatus {
        let mut soonest = None;
        let mut event = false;
        let mut wait = false;

        for index in 0..self.slots.len() {
            let status = self.readiness(index, now);
            if status == SchedulingStatus::Never {
                self.retire(index);
            }
            match status {
                SchedulingStatus::Ready => return SchedulingStatus::Ready,
                SchedulingStatus::WaitTime(delay) => {
                    soonest = Some(soonest.map_or(delay, |s: Duration| s.min(delay)));
                }
                SchedulingStatus::WaitEvent => event = true,
                SchedulingStatus::Wait => wait = true,
                SchedulingStatus::Never => {}
            }
        }

        match soonest {
            Some(delay) => SchedulingStatus::WaitTime(delay),
            None if event => SchedulingStatus::WaitEvent,
            None if wait => SchedulingStatus::Wait,
            None => SchedulingStatus::Never,
        }
    }

    fn retire(&mut self, index: usize) {
        if self.retired.get(index).copied().unwrap_or(true) {
            return;
        }
        self.retired[index] = true;
        if let Some(task) = self.slots.get(index).and_then(|slot| slot.as_ref()) {
            OperatorRetired {
                fragment: &self.fragment,
                operator: &task.name,
                dispatches: task.dispatches,
            }
            .log();
        }
    }

    /// Whether nothing can ever run again: every operator is retired or only
    /// waits on inputs whose upstreams are all in that state.
    ///
    /// Operators with a live network feed, operators that were never fed at
    /// all, and cycles of waiting operators never count as exhausted.
    pub(crate) fn is_exhausted(&self, now: Instant) -> bool {
        let statuses: Vec<SchedulingStatus> = (0..self.slots.len())
            .map(|index| self.readiness(index, now))
            .collect();
        let mut dead: Vec<bool> = statuses
            .iter()
            .map(|status| *status == SchedulingStatus::Never)
            .collect();

        loop {
            let mut changed = false;
            for (index, status) in statuses.iter().enumerate() {
                if dead[index] || *status != SchedulingStatus::Wait {
                    continue;
                }
                let upstream = self.predecessors.get(index).map(Vec::as_slice).unwrap_or(&[]);
                let queues = self.slots[index].as_ref().map_or(&[][..], |task| task.input_queues.as_slice());
                let fed_remotely = queues.iter().any(|q| q.has_remote_feeders());
                let has_feeders = !upstream.is_empty() || queues.iter().any(|q| q.is_remote());
                if has_feeders && !fed_remotely && upstream.iter().all(|&u| dead[u]) {
                    dead[index] = true;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        dead.into_iter().all(|d| d)
    }

    /// Names of operators that are neither ready nor retired.
    pub(crate) fn waiting(&self, now: Instant) -> Vec<String> {
        self.slots
            .iter()
            .flatten()
            .filter(|task| {
                !matches!(
                    task.readiness(now),
                    SchedulingStatus::Ready | SchedulingStatus::Never
                )
            })
            .map(|task| task.name.clone())
            .collect()
    }

    pub(crate) fn has_network_backlog(&self) -> bool {
        self.slots.iter().flatten().any(|task| task.has_network_backlog())
    }

    pub(crate) fn tasks_mut(&mut self) -> impl Iterator<Item = &mut Box<OperatorTask>> {
        self.slots.iter_mut().flatten()
    }

    pub(crate) fn dispatches(&self) -> BTreeMap<String, u64> {
        self.slots
            .iter()
            .flatten()
            .map(|task| (task.name.clone(), task.dispatches()))
            .collect()
    }

    pub(crate) fn clear_queues(&self) {
        for queue in &self.queues {
            queue.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::{Condition, ConditionTarget};
    use crate::operator::ComputeError;
    use crate::scheduler::FragmentController;
    use crate::spec::{OperatorSpec, QueuePolicy};
    use std::collections::HashMap;

    struct Flaky {
        fail_on: u64,
        calls: u64,
    }

    impl OperatorLogic for Flaky {
        fn setup(&self, _spec: &mut OperatorSpec) {}

        fn compute(
            &mut self,
            _input: &mut InputContext,
            _output: &mut OutputContext,
            _context: &mut ExecutionContext,
        ) -> Result<(), ComputeError> {
            self.calls += 1;
            if self.calls == self.fail_on {
                return Err("boom".into());
            }
            if self.calls > self.fail_on {
                panic!("called after failure");
            }
            Ok(())
        }
    }

    fn task(name: &str, conditions: Vec<ConditionRuntime>, queues: Vec<Arc<MessageQueue>>) -> OperatorTask {
        OperatorTask::new(
            name,
            0,
            Box::new(Flaky { fail_on: 2, calls: 0 }),
            conditions,
            queues,
            InputContext::default(),
            OutputContext::default(),
            ExecutionContext::new("main", name, FragmentController::new(), HashMap::new(), HashMap::new()),
        )
    }

    #[test]
    fn test_step_reports_errors_and_panics() {
        let task = Box::new(task("op", vec![], vec![]));
        let (task, first) = task.step(1);
        assert!(first.is_ok());
        let (task, second) = task.step(2);
        assert_eq!(second, Err("boom".to_string()));
        let (task, third) = task.step(3);
        assert!(third.unwrap_err().contains("called after failure"));
        assert_eq!(task.dispatches(), 3);
    }

    #[test]
    fn test_outlook_prefers_ready_then_timers() {
        let now = Instant::now();
        let count = ConditionRuntime::bind(&Condition::count(0), ConditionTarget::Operator, now).unwrap();
        let queue = Arc::new(MessageQueue::new("b.in", 1, QueuePolicy::Fault));
        let available = ConditionRuntime::bind(
            &Condition::message_available(1),
            ConditionTarget::Receivers(vec![queue.clone()]),
            now,
        )
        .unwrap();

        let mut tasks = TaskSet::new(
            "main",
            vec![task("a", vec![count], vec![]), task("b", vec![available], vec![queue.clone()])],
            vec![0, 1],
            vec![vec![], vec![0]],
            vec![],
        );
        assert_eq!(tasks.outlook(now), SchedulingStatus::Wait);
        assert_eq!(tasks.waiting(now), vec!["b".to_string()]);
        assert!(tasks.is_exhausted(now));

        queue.push(crate::connectors::Message::from_bytes(vec![1]));
        assert_eq!(tasks.sync_all(), 1);
        assert_eq!(tasks.outlook(now), SchedulingStatus::Ready);
    }

    #[test]
    fn test_take_and_restore_round_trip_the_slot() {
        let mut tasks = TaskSet::new("main", vec![task("a", vec![], vec![])], vec![0], vec![vec![]], vec![]);
        let taken = tasks.take(0).unwrap();
        assert!(tasks.take(0).is_err());
        assert_eq!(tasks.readiness(0, Instant::now()), SchedulingStatus::Never);
        tasks.restore(0, taken);
        assert!(tasks.readiness(0, Instant::now()).is_ready());
        assert!(tasks.pool_for(tasks.slots[0].as_ref().unwrap()).is_err());
    }

    #[test]
    fn test_waiting_cycle_is_not_exhausted() {
        let now = Instant::now();
        let waiting = |name: &str| {
            let queue = Arc::new(MessageQueue::new(format!("{}.in", name), 1, QueuePolicy::Fault));
            let available = ConditionRuntime::bind(
                &Condition::message_available(1),
                ConditionTarget::Receivers(vec![queue.clone()]),
                now,
            )
            .unwrap();
            task(name, vec![available], vec![queue])
        };

        let tasks = TaskSet::new(
            "main",
            vec![waiting("a"), waiting("b")],
            vec![0, 1],
            vec![vec![1], vec![0]],
            vec![],
        );
        assert!(!tasks.is_exhausted(now));
    }
}
