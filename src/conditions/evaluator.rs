// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::component::Component;
use crate::conditions::params::{ConditionParams, SamplingRule};
use crate::conditions::{AsyncEventState, AsyncHandle, BooleanHandle, Condition, ConditionKind, PeriodicPolicy};
use crate::connectors::{MessageQueue, Transmitter};
use crate::errors::ConfigError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Readiness verdict of one condition, or of an operator as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingStatus {
    /// Will never be ready again.
    Never,
    Ready,
    /// Not ready; nothing specific to wait for.
    Wait,
    /// Not ready for at least this long.
    WaitTime(Duration),
    /// Not ready until something outside the tick loop happens.
    WaitEvent,
}

impl SchedulingStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, SchedulingStatus::Ready)
    }

    /// Combines two verdicts for one operator.
    ///
    /// `Never` dominates, `Ready` only survives against `Ready`, and among
    /// waits the most specific one wins: the shortest timed wait, then an
    /// event wait, then a plain wait.
    pub fn combine(self, other: SchedulingStatus) -> SchedulingStatus {
        use SchedulingStatus::*;
        match (self, other) {
            (Never, _) | (_, Never) => Never,
            (Ready, x) | (x, Ready) => x,
            (WaitTime(a), WaitTime(b)) => WaitTime(a.min(b)),
            (WaitTime(a), _) | (_, WaitTime(a)) => WaitTime(a),
            (WaitEvent, _) | (_, WaitEvent) => WaitEvent,
            (Wait, Wait) => Wait,
        }
    }
}

/// What a bound condition watches.
#[derive(Debug, Clone)]
pub(crate) enum ConditionTarget {
    /// Nothing; operator-level conditions.
    Operator,
    /// Queues of one input port, checked one by one.
    Receivers(Vec<Arc<MessageQueue>>),
    /// Queues of several input ports, one group per listed port.
    PortGroups(Vec<Vec<Arc<MessageQueue>>>),
    /// Edges leaving one output port.
    Transmitters(Vec<Transmitter>),
}

/// A condition bound to its target with validated parameters and run state.
#[derive(Debug)]
pub(crate) struct ConditionRuntime {
    name: String,
    kind: ConditionKind,
    params: ConditionParams,
    target: ConditionTarget,
    dispatched: u64,
    last_dispatch: Instant,
    next_periodic: Option<Instant>,
    boolean: Option<BooleanHandle>,
    asynchronous: Option<AsyncHandle>,
}

impl ConditionRuntime {
    pub(crate) fn bind(
        condition: &Condition,
        target: ConditionTarget,
        start: Instant,
    ) -> Result<Self, ConfigError> {
        let port_count = match &target {
            ConditionTarget::PortGroups(groups) => groups.len(),
            _ => 1,
        };
        let params = ConditionParams::parse(
            condition.name(),
            condition.kind(),
            condition.args(),
            port_count,
        )?;

        let target_matches = match (&params, &target) {
            (ConditionParams::MessageAvailable { .. }, ConditionTarget::Receivers(_))
            | (ConditionParams::ExpiringMessageAvailable { .. }, ConditionTarget::Receivers(_))
            | (ConditionParams::MultiMessageAvailable { .. }, ConditionTarget::Receivers(_))
            | (ConditionParams::MultiMessageAvailable { .. }, ConditionTarget::PortGroups(_))
            | (ConditionParams::DownstreamMessageAffordable { .. }, ConditionTarget::Transmitters(_)) => true,
            (params, _) => !Self::needs_queues(params),
        };
        if !target_matches {
            return Err(ConfigError::UnsupportedCondition {
                condition: condition.name().to_string(),
                kind: condition.kind().as_str(),
                target: Self::describe_target(&target),
            });
        }

        if let (Some(handle), Some(enabled)) = (
            condition.boolean_handle(),
            condition.args().value::<bool>("enable_tick").ok().flatten(),
        ) {
            handle.set(enabled);
        }

        Ok(Self {
            name: condition.name().to_string(),
            kind: condition.kind(),
            params,
            target,
            dispatched: 0,
            last_dispatch: start,
            next_periodic: None,
            boolean: condition.boolean_handle(),
            asynchronous: condition.async_handle(),
        })
    }

    fn needs_queues(params: &ConditionParams) -> bool {
        matches!(
            params,
            ConditionParams::MessageAvailable { .. }
                | ConditionParams::ExpiringMessageAvailable { .. }
                | ConditionParams::MultiMessageAvailable { .. }
                | ConditionParams::DownstreamMessageAffordable { .. }
        )
    }

    fn describe_target(target: &ConditionTarget) -> String {
        match target {
            ConditionTarget::Operator => "an operator".to_string(),
            ConditionTarget::Receivers(_) => "an input port".to_string(),
            ConditionTarget::PortGroups(_) => "a set of input ports".to_string(),
            ConditionTarget::Transmitters(_) => "an output port".to_string(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn kind(&self) -> ConditionKind {
        self.kind
    }

    /// Lets shared handles wake the scheduler when they change.
    pub(crate) fn attach_wakeup(&self, notify: &Arc<Notify>) {
        if let Some(handle) = &self.boolean {
            handle.wake_slot().attach(notify.clone());
        }
        if let Some(handle) = &self.asynchronous {
            handle.wake_slot().attach(notify.clone());
        }
    }

    /// Evaluates the condition at `now`.
    pub(crate) fn evaluate(&self, now: Instant) -> SchedulingStatus {
        match &self.params {
            ConditionParams::None => SchedulingStatus::Ready,
            ConditionParams::MessageAvailable {
                min_size,
                front_stage_max_size,
            } => self.each_queue(|queue| {
                let size = queue.size();
                if front_stage_max_size.map_or(false, |max| size > max) {
                    SchedulingStatus::Wait
                } else if size >= *min_size {
                    SchedulingStatus::Ready
                } else {
                    Self::starved(queue)
                }
            }),
            ConditionParams::ExpiringMessageAvailable {
                max_batch_size,
                max_delay,
            } => self.each_queue(|queue| {
                let size = queue.size();
                if size >= *max_batch_size {
                    return SchedulingStatus::Ready;
                }
                match queue.oldest_age(now) {
                    Some(age) if age >= *max_delay => SchedulingStatus::Ready,
                    Some(age) => SchedulingStatus::WaitTime(*max_delay - age),
                    None => Self::starved(queue),
                }
            }),
            ConditionParams::MultiMessageAvailable { rule, timeout } => {
                self.evaluate_joint(rule, *timeout, now)
            }
            ConditionParams::DownstreamMessageAffordable { min_size } => match &self.target {
                ConditionTarget::Transmitters(edges) => {
                    if edges.iter().all(|tx| tx.free_capacity() >= *min_size) {
                        SchedulingStatus::Ready
                    } else {
                        SchedulingStatus::Wait
                    }
                }
                _ => SchedulingStatus::Ready,
            },
            ConditionParams::Count { count } => {
                if self.dispatched < *count {
                    SchedulingStatus::Ready
                } else {
                    SchedulingStatus::Never
                }
            }
            ConditionParams::Boolean => match &self.boolean {
                Some(handle) if !handle.is_enabled() => SchedulingStatus::Never,
                _ => SchedulingStatus::Ready,
            },
            ConditionParams::Periodic { .. } => match self.next_periodic {
                Some(next) if next > now => SchedulingStatus::WaitTime(next - now),
                _ => SchedulingStatus::Ready,
            },
            ConditionParams::Asynchronous => match self.asynchronous.as_ref().map(|h| h.event_state()) {
                Some(AsyncEventState::Ready) | Some(AsyncEventState::EventDone) | None => {
                    SchedulingStatus::Ready
                }
                Some(AsyncEventState::Wait) => SchedulingStatus::Wait,
                Some(AsyncEventState::EventWaiting) => SchedulingStatus::WaitEvent,
                Some(AsyncEventState::EventNever) => SchedulingStatus::Never,
            },
        }
    }

    fn each_queue(&self, check: impl Fn(&MessageQueue) -> SchedulingStatus) -> SchedulingStatus {
        let queues: Vec<&Arc<MessageQueue>> = match &self.target {
            ConditionTarget::Receivers(queues) => queues.iter().collect(),
            ConditionTarget::PortGroups(groups) => groups.iter().flatten().collect(),
            _ => Vec::new(),
        };
        if queues.is_empty() {
            return SchedulingStatus::Wait;
        }
        queues
            .into_iter()
            .map(|q| check(q.as_ref()))
            .fold(SchedulingStatus::Ready, SchedulingStatus::combine)
    }

    /// Verdict for an empty queue: data may still arrive over the network.
    fn starved(queue: &MessageQueue) -> SchedulingStatus {
        if queue.has_remote_feeders() {
            SchedulingStatus::WaitEvent
        } else {
            SchedulingStatus::Wait
        }
    }

    fn evaluate_joint(&self, rule: &SamplingRule, timeout: Option<Duration>, now: Instant) -> SchedulingStatus {
        let groups: Vec<Vec<Arc<MessageQueue>>> = match &self.target {
            ConditionTarget::PortGroups(groups) => groups.clone(),
            ConditionTarget::Receivers(queues) => vec![queues.clone()],
            _ => Vec::new(),
        };
        let sizes: Vec<usize> = groups
            .iter()
            .map(|group| group.iter().map(|q| q.size()).sum())
            .collect();
        let total: usize = sizes.iter().sum();

        let satisfied = match rule {
            SamplingRule::SumOfAll { min_sum } => total >= *min_sum,
            SamplingRule::PerReceiver { min_sizes } => sizes
                .iter()
                .zip(min_sizes.iter())
                .all(|(size, min)| size >= min),
        };
        if satisfied {
            return SchedulingStatus::Ready;
        }

        if let Some(timeout) = timeout {
            if total > 0 {
                let waited = now.saturating_duration_since(self.last_dispatch);
                return if waited >= timeout {
                    SchedulingStatus::Ready
                } else {
                    SchedulingStatus::WaitTime(timeout - waited)
                };
            }
        }

        let remote = groups.iter().flatten().any(|q| q.has_remote_feeders());
        if remote {
            SchedulingStatus::WaitEvent
        } else {
            SchedulingStatus::Wait
        }
    }

    /// Advances run state after the operator was dispatched at `now`.
    pub(crate) fn on_dispatched(&mut self, now: Instant) {
        self.dispatched += 1;
        self.last_dispatch = now;

        if let ConditionParams::Periodic { period, policy } = &self.params {
            let previous = self.next_periodic.unwrap_or(now);
            self.next_periodic = Some(match policy {
                PeriodicPolicy::CatchUpMissedTicks => previous + *period,
                PeriodicPolicy::MinTimeBetweenTicks => now + *period,
                PeriodicPolicy::NoCatchUpMissedTicks => {
                    let mut next = previous + *period;
                    if !period.is_zero() {
                        while next <= now {
                            next += *period;
                        }
                    }
                    next
                }
            });
        }

        if let Some(handle) = &self.asynchronous {
            handle.consume_done();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::{Arg, ArgList};
    use crate::connectors::Message;
    use crate::spec::QueuePolicy;

    fn queue(capacity: usize) -> Arc<MessageQueue> {
        Arc::new(MessageQueue::new("q", capacity, QueuePolicy::Fault))
    }

    fn fill(queue: &MessageQueue, count: usize) {
        for n in 0..count {
            queue.push(Message::from_bytes(vec![n as u8]));
        }
        queue.sync();
    }

    #[test]
    fn test_combine_rules() {
        use SchedulingStatus::*;
        let ms = Duration::from_millis;
        assert_eq!(Ready.combine(Ready), Ready);
        assert_eq!(Ready.combine(Never), Never);
        assert_eq!(WaitTime(ms(5)).combine(Never), Never);
        assert_eq!(Ready.combine(Wait), Wait);
        assert_eq!(WaitTime(ms(5)).combine(WaitTime(ms(2))), WaitTime(ms(2)));
        assert_eq!(Wait.combine(WaitTime(ms(3))), WaitTime(ms(3)));
        assert_eq!(Wait.combine(WaitEvent), WaitEvent);
        assert_eq!(WaitEvent.combine(WaitTime(ms(1))), WaitTime(ms(1)));
    }

    #[test]
    fn test_message_available_counts_main_stage() {
        let q = queue(4);
        let runtime = ConditionRuntime::bind(
            &Condition::message_available(2),
            ConditionTarget::Receivers(vec![q.clone()]),
            Instant::now(),
        )
        .unwrap();

        q.push(Message::from_bytes(vec![1]));
        q.push(Message::from_bytes(vec![2]));
        assert_eq!(runtime.evaluate(Instant::now()), SchedulingStatus::Wait);
        q.sync();
        assert_eq!(runtime.evaluate(Instant::now()), SchedulingStatus::Ready);
    }

    #[test]
    fn test_per_connection_queues_are_checked_one_by_one() {
        let first = queue(1);
        let second = queue(1);
        let runtime = ConditionRuntime::bind(
            &Condition::message_available(1),
            ConditionTarget::Receivers(vec![first.clone(), second.clone()]),
            Instant::now(),
        )
        .unwrap();

        fill(&first, 1);
        assert_eq!(runtime.evaluate(Instant::now()), SchedulingStatus::Wait);
        fill(&second, 1);
        assert_eq!(runtime.evaluate(Instant::now()), SchedulingStatus::Ready);
    }

    #[test]
    fn test_front_stage_max_size_blocks_overfull_queue() {
        let q = queue(8);
        let condition = Condition::message_available(1).with_arg(Arg::new("front_stage_max_size", 2usize));
        let runtime = ConditionRuntime::bind(
            &condition,
            ConditionTarget::Receivers(vec![q.clone()]),
            Instant::now(),
        )
        .unwrap();
        fill(&q, 3);
        assert_eq!(runtime.evaluate(Instant::now()), SchedulingStatus::Wait);
        q.pop();
        assert_eq!(runtime.evaluate(Instant::now()), SchedulingStatus::Ready);
    }

    #[test]
    fn test_empty_queue_with_remote_feeder_waits_for_event() {
        let q = queue(1);
        q.add_remote_feeders(1);
        let runtime = ConditionRuntime::bind(
            &Condition::message_available(1),
            ConditionTarget::Receivers(vec![q]),
            Instant::now(),
        )
        .unwrap();
        assert_eq!(runtime.evaluate(Instant::now()), SchedulingStatus::WaitEvent);
    }

    #[test]
    fn test_expiring_fires_on_batch_or_age() {
        let q = queue(8);
        let runtime = ConditionRuntime::bind(
            &Condition::expiring_message_available(3, Duration::from_millis(100)),
            ConditionTarget::Receivers(vec![q.clone()]),
            Instant::now(),
        )
        .unwrap();

        assert_eq!(runtime.evaluate(Instant::now()), SchedulingStatus::Wait);
        fill(&q, 1);
        let now = Instant::now();
        assert!(matches!(runtime.evaluate(now), SchedulingStatus::WaitTime(_)));
        assert_eq!(
            runtime.evaluate(now + Duration::from_millis(150)),
            SchedulingStatus::Ready
        );
        fill(&q, 2);
        assert_eq!(runtime.evaluate(Instant::now()), SchedulingStatus::Ready);
    }

    fn joint(args: Vec<Arg>, kind: ConditionKind) -> Condition {
        Condition::new(kind, "joint").with_args(args.into_iter().collect::<ArgList>())
    }

    #[test]
    fn test_per_receiver_needs_every_port() {
        let (a, b) = (queue(4), queue(4));
        let condition = joint(
            vec![
                Arg::new("sampling_mode", "PerReceiver"),
                Arg::new("min_sizes", vec![1usize, 2]),
            ],
            ConditionKind::MultiMessageAvailable,
        );
        let runtime = ConditionRuntime::bind(
            &condition,
            ConditionTarget::PortGroups(vec![vec![a.clone()], vec![b.clone()]]),
            Instant::now(),
        )
        .unwrap();

        fill(&a, 3);
        fill(&b, 1);
        assert_eq!(runtime.evaluate(Instant::now()), SchedulingStatus::Wait);
        fill(&b, 1);
        assert_eq!(runtime.evaluate(Instant::now()), SchedulingStatus::Ready);
    }

    #[test]
    fn test_sum_of_all_totals_ports() {
        let (a, b) = (queue(4), queue(4));
        let condition = joint(
            vec![Arg::new("sampling_mode", "SumOfAll"), Arg::new("min_sum", 3usize)],
            ConditionKind::MultiMessageAvailable,
        );
        let runtime = ConditionRuntime::bind(
            &condition,
            ConditionTarget::PortGroups(vec![vec![a.clone()], vec![b.clone()]]),
            Instant::now(),
        )
        .unwrap();
        fill(&a, 2);
        assert_eq!(runtime.evaluate(Instant::now()), SchedulingStatus::Wait);
        fill(&b, 1);
        assert_eq!(runtime.evaluate(Instant::now()), SchedulingStatus::Ready);
    }

    #[test]
    fn test_mismatched_min_sizes_fail_to_bind() {
        let condition = joint(
            vec![
                Arg::new("sampling_mode", "PerReceiver"),
                Arg::new("min_sizes", vec![1usize, 2, 1]),
            ],
            ConditionKind::MultiMessageAvailable,
        );
        let result = ConditionRuntime::bind(
            &condition,
            ConditionTarget::PortGroups(vec![vec![queue(1)], vec![queue(1)]]),
            Instant::now(),
        );
        assert!(matches!(result, Err(ConfigError::MismatchedPortList { .. })));
    }

    #[test]
    fn test_timeout_accepts_partial_data() {
        let (a, b) = (queue(4), queue(4));
        let start = Instant::now();
        let condition = joint(
            vec![
                Arg::new("min_sum", 2usize),
                Arg::new("execution_frequency", "50ms"),
            ],
            ConditionKind::MultiMessageAvailableTimeout,
        );
        let runtime = ConditionRuntime::bind(
            &condition,
            ConditionTarget::PortGroups(vec![vec![a.clone()], vec![b]]),
            start,
        )
        .unwrap();

        assert_eq!(runtime.evaluate(start), SchedulingStatus::Wait);
        fill(&a, 1);
        assert!(matches!(runtime.evaluate(start), SchedulingStatus::WaitTime(_)));
        assert_eq!(
            runtime.evaluate(start + Duration::from_millis(60)),
            SchedulingStatus::Ready
        );
    }

    #[test]
    fn test_downstream_affordable_checks_free_slots() {
        let q = queue(1);
        let tx = Transmitter::local("a.out -> b.in", q.clone());
        let runtime = ConditionRuntime::bind(
            &Condition::downstream_message_affordable(1),
            ConditionTarget::Transmitters(vec![tx.clone()]),
            Instant::now(),
        )
        .unwrap();
        assert_eq!(runtime.evaluate(Instant::now()), SchedulingStatus::Ready);
        tx.send(Message::from_bytes(vec![0])).unwrap();
        assert_eq!(runtime.evaluate(Instant::now()), SchedulingStatus::Wait);
        q.sync();
        assert_eq!(runtime.evaluate(Instant::now()), SchedulingStatus::Ready);
    }

    #[test]
    fn test_count_runs_out() {
        let mut runtime =
            ConditionRuntime::bind(&Condition::count(2), ConditionTarget::Operator, Instant::now())
                .unwrap();
        let now = Instant::now();
        assert!(runtime.evaluate(now).is_ready());
        runtime.on_dispatched(now);
        assert!(runtime.evaluate(now).is_ready());
        runtime.on_dispatched(now);
        assert_eq!(runtime.evaluate(now), SchedulingStatus::Never);
    }

    #[test]
    fn test_count_zero_is_never() {
        let runtime =
            ConditionRuntime::bind(&Condition::count(0), ConditionTarget::Operator, Instant::now())
                .unwrap();
        assert_eq!(runtime.evaluate(Instant::now()), SchedulingStatus::Never);
    }

    #[test]
    fn test_boolean_follows_handle() {
        let condition = Condition::boolean(true);
        let handle = condition.boolean_handle().unwrap();
        let runtime =
            ConditionRuntime::bind(&condition, ConditionTarget::Operator, Instant::now()).unwrap();
        assert!(runtime.evaluate(Instant::now()).is_ready());
        handle.disable_tick();
        assert_eq!(runtime.evaluate(Instant::now()), SchedulingStatus::Never);
    }

    #[test]
    fn test_periodic_first_tick_is_immediate() {
        let period = Duration::from_millis(10);
        let mut runtime = ConditionRuntime::bind(
            &Condition::periodic(period),
            ConditionTarget::Operator,
            Instant::now(),
        )
        .unwrap();
        let t0 = Instant::now();
        assert!(runtime.evaluate(t0).is_ready());
        runtime.on_dispatched(t0);
        assert_eq!(runtime.evaluate(t0), SchedulingStatus::WaitTime(period));
        assert!(runtime.evaluate(t0 + period).is_ready());
    }

    #[test]
    fn test_periodic_policies_after_a_late_tick() {
        let period = Duration::from_millis(10);
        let t0 = Instant::now();
        let late = t0 + Duration::from_millis(35);

        let mut catch_up = ConditionRuntime::bind(
            &Condition::periodic_with_policy(period, PeriodicPolicy::CatchUpMissedTicks),
            ConditionTarget::Operator,
            t0,
        )
        .unwrap();
        catch_up.on_dispatched(t0);
        catch_up.on_dispatched(late);
        assert!(catch_up.evaluate(late).is_ready());

        let mut min_gap = ConditionRuntime::bind(
            &Condition::periodic_with_policy(period, PeriodicPolicy::MinTimeBetweenTicks),
            ConditionTarget::Operator,
            t0,
        )
        .unwrap();
        min_gap.on_dispatched(t0);
        min_gap.on_dispatched(late);
        assert_eq!(min_gap.evaluate(late), SchedulingStatus::WaitTime(period));

        let mut skip = ConditionRuntime::bind(
            &Condition::periodic_with_policy(period, PeriodicPolicy::NoCatchUpMissedTicks),
            ConditionTarget::Operator,
            t0,
        )
        .unwrap();
        skip.on_dispatched(t0);
        skip.on_dispatched(late);
        assert_eq!(
            skip.evaluate(late),
            SchedulingStatus::WaitTime(Duration::from_millis(5))
        );
    }

    #[test]
    fn test_asynchronous_states() {
        let condition = Condition::asynchronous();
        let handle = condition.async_handle().unwrap();
        let mut runtime =
            ConditionRuntime::bind(&condition, ConditionTarget::Operator, Instant::now()).unwrap();

        handle.set_event_state(AsyncEventState::EventWaiting);
        assert_eq!(runtime.evaluate(Instant::now()), SchedulingStatus::WaitEvent);
        handle.set_event_state(AsyncEventState::EventDone);
        assert!(runtime.evaluate(Instant::now()).is_ready());
        runtime.on_dispatched(Instant::now());
        assert_eq!(handle.event_state(), AsyncEventState::EventWaiting);
        handle.set_event_state(AsyncEventState::EventNever);
        assert_eq!(runtime.evaluate(Instant::now()), SchedulingStatus::Never);
    }

    #[test]
    fn test_message_condition_on_operator_is_rejected() {
        let result = ConditionRuntime::bind(
            &Condition::message_available(1),
            ConditionTarget::Operator,
            Instant::now(),
        );
        assert!(matches!(result, Err(ConfigError::UnsupportedCondition { .. })));
    }
}
