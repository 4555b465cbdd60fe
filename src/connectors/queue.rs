// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::connectors::Message;
use crate::observability::messages::transport::QueueOverflow;
use crate::observability::messages::StructuredLog;
use crate::scheduler::WakeSlot;
use crate::spec::QueuePolicy;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

#[derive(Debug)]
struct Queued {
    message: Message,
    enqueued_at: Instant,
}

#[derive(Debug, Default)]
struct Stages {
    main: VecDeque<Queued>,
    back: VecDeque<Queued>,
}

/// Result of offering a message to a full or non-full stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted,
    /// Accepted after evicting the oldest message.
    EvictedOldest,
    /// Dropped by the queue policy.
    Dropped,
}

/// Double-buffered receive queue backing one input port.
///
/// Transmitters push into the back stage at any time. The scheduler calls
/// [`MessageQueue::sync`] at the start of each tick, which moves back-stage
/// messages into the main stage that conditions inspect and operators
/// read. Both stages hold at most `capacity` messages and apply the same
/// overflow policy.
#[derive(Debug)]
pub struct MessageQueue {
    name: String,
    capacity: usize,
    policy: QueuePolicy,
    stages: Mutex<Stages>,
    remote_feeders: AtomicUsize,
    remote: AtomicBool,
    space: Notify,
    wake: WakeSlot,
}

impl MessageQueue {
    pub fn new(name: impl Into<String>, capacity: usize, policy: QueuePolicy) -> Self {
        Self {
            name: name.into(),
            capacity: capacity.max(1),
            policy,
            stages: Mutex::new(Stages::default()),
            remote_feeders: AtomicUsize::new(0),
            remote: AtomicBool::new(false),
            space: Notify::new(),
            wake: WakeSlot::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> QueuePolicy {
        self.policy
    }

    /// Offers a message to the back stage.
    pub fn push(&self, message: Message) -> PushOutcome {
        let outcome = {
            let mut stages = self.stages.lock();
            self.offer(
                &mut stages.back,
                Queued {
                    message,
                    enqueued_at: Instant::now(),
                },
                "back",
            )
        };
        if outcome != PushOutcome::Dropped {
            self.wake.wake();
        }
        outcome
    }

    /// Moves back-stage messages into the main stage; returns how many moved.
    pub fn sync(&self) -> usize {
        let mut stages = self.stages.lock();
        let incoming: Vec<Queued> = stages.back.drain(..).collect();
        let moved = incoming.len();
        for queued in incoming {
            self.offer(&mut stages.main, queued, "main");
        }
        drop(stages);
        if moved > 0 {
            self.space.notify_waiters();
        }
        moved
    }

    /// Resolves once the back stage has a free slot.
    pub(crate) async fn wait_for_space(&self) {
        loop {
            let freed = self.space.notified();
            if self.back_size() < self.capacity {
                return;
            }
            freed.await;
        }
    }

    fn offer(&self, stage: &mut VecDeque<Queued>, queued: Queued, stage_name: &'static str) -> PushOutcome {
        if stage.len() < self.capacity {
            stage.push_back(queued);
            return PushOutcome::Accepted;
        }
        match self.policy {
            QueuePolicy::Pop => {
                stage.pop_front();
                stage.push_back(queued);
                PushOutcome::EvictedOldest
            }
            QueuePolicy::Reject => PushOutcome::Dropped,
            QueuePolicy::Fault => {
                QueueOverflow {
                    queue: &self.name,
                    stage: stage_name,
                    capacity: self.capacity,
                }
                .log();
                PushOutcome::Dropped
            }
        }
    }

    /// Takes the oldest main-stage message.
    pub fn pop(&self) -> Option<Message> {
        self.stages.lock().main.pop_front().map(|q| q.message)
    }

    /// Takes every main-stage message.
    pub fn drain(&self) -> Vec<Message> {
        self.stages
            .lock()
            .main
            .drain(..)
            .map(|q| q.message)
            .collect()
    }

    /// Messages visible to conditions and operators this tick.
    pub fn size(&self) -> usize {
        self.stages.lock().main.len()
    }

    pub fn back_size(&self) -> usize {
        self.stages.lock().back.len()
    }

    /// Free back-stage slots, which is what an upstream can still push.
    pub fn free_capacity(&self) -> usize {
        self.capacity.saturating_sub(self.back_size())
    }

    /// Age of the oldest main-stage message.
    pub fn oldest_age(&self, now: Instant) -> Option<Duration> {
        self.stages
            .lock()
            .main
            .front()
            .map(|q| now.saturating_duration_since(q.enqueued_at))
    }

    /// Drops everything queued in both stages.
    pub fn clear(&self) {
        let mut stages = self.stages.lock();
        stages.main.clear();
        stages.back.clear();
        drop(stages);
        self.space.notify_waiters();
    }

    pub(crate) fn add_remote_feeders(&self, count: usize) {
        self.remote.store(true, Ordering::SeqCst);
        self.remote_feeders.fetch_add(count, Ordering::SeqCst);
    }

    pub(crate) fn remove_remote_feeders(&self, count: usize) {
        let _ = self
            .remote_feeders
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(count)));
        self.wake.wake();
    }

    /// True while a network connection feeding this queue is live or still expected.
    pub fn has_remote_feeders(&self) -> bool {
        self.remote_feeders.load(Ordering::SeqCst) > 0
    }

    /// Whether this queue was ever fed over the network.
    pub fn is_remote(&self) -> bool {
        self.remote.load(Ordering::SeqCst)
    }

    pub(crate) fn attach_wakeup(&self, notify: Arc<Notify>) {
        self.wake.attach(notify);
    }
}
