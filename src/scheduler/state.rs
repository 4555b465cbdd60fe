// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::ExecutionError;
use crate::observability::messages::engine::StateChanged;
use crate::observability::messages::StructuredLog;
use parking_lot::Mutex;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;

/// Lifecycle of one fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentState {
    Composed,
    Initialized,
    Running,
    Paused,
    Stopped,
}

impl FragmentState {
    /// Whether `self -> to` is a legal move.
    pub fn can_transition(&self, to: FragmentState) -> bool {
        use FragmentState::*;
        matches!(
            (self, to),
            (Composed, Initialized)
                | (Initialized, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Initialized, Stopped)
                | (Running, Stopped)
                | (Paused, Stopped)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FragmentState::Composed => "composed",
            FragmentState::Initialized => "initialized",
            FragmentState::Running => "running",
            FragmentState::Paused => "paused",
            FragmentState::Stopped => "stopped",
        }
    }
}

impl Display for FragmentState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, lock-protected lifecycle state of a fragment.
#[derive(Debug, Clone)]
pub struct StateCell {
    fragment: Arc<str>,
    state: Arc<Mutex<FragmentState>>,
}

impl StateCell {
    pub fn new(fragment: &str) -> Self {
        Self {
            fragment: Arc::from(fragment),
            state: Arc::new(Mutex::new(FragmentState::Composed)),
        }
    }

    pub fn get(&self) -> FragmentState {
        *self.state.lock()
    }

    /// Moves to `to`, or reports why it cannot.
    pub fn transition(&self, to: FragmentState) -> Result<(), ExecutionError> {
        let mut state = self.state.lock();
        let from = *state;
        if !from.can_transition(to) {
            return Err(ExecutionError::InvalidTransition {
                fragment: self.fragment.to_string(),
                from,
                to,
            });
        }
        *state = to;
        drop(state);

        StateChanged {
            fragment: &self.fragment,
            from,
            to,
        }
        .log();
        Ok(())
    }
}

/// External control over a running fragment: stop, pause, resume.
///
/// Cloning yields another handle to the same fragment. Stopping lets
/// in-flight dispatches finish; nothing is interrupted mid-compute.
#[derive(Debug, Clone)]
pub struct FragmentController {
    stop: CancellationToken,
    paused: Arc<watch::Sender<bool>>,
    wakeup: Arc<Notify>,
}

impl Default for FragmentController {
    fn default() -> Self {
        Self::new()
    }
}

impl FragmentController {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            stop: CancellationToken::new(),
            paused: Arc::new(paused),
            wakeup: Arc::new(Notify::new()),
        }
    }

    pub fn stop(&self) {
        self.stop.cancel();
        self.wakeup.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
        self.wakeup.notify_one();
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Token cancelled when the fragment is asked to stop.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Resolves once the fragment is resumed or stopped.
    pub(crate) async fn wait_resumed(&self) {
        let mut paused = self.paused.subscribe();
        loop {
            if !*paused.borrow_and_update() {
                return;
            }
            tokio::select! {
                _ = self.stop.cancelled() => return,
                changed = paused.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }

    /// Notifier the scheduler sleeps on between ticks.
    pub(crate) fn wakeup(&self) -> Arc<Notify> {
        self.wakeup.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_follows_the_state_machine() {
        let cell = StateCell::new("main");
        assert_eq!(cell.get(), FragmentState::Composed);
        assert!(cell.transition(FragmentState::Running).is_err());

        cell.transition(FragmentState::Initialized).unwrap();
        cell.transition(FragmentState::Running).unwrap();
        cell.transition(FragmentState::Paused).unwrap();
        cell.transition(FragmentState::Running).unwrap();
        cell.transition(FragmentState::Stopped).unwrap();

        assert_eq!(
            cell.transition(FragmentState::Running),
            Err(ExecutionError::InvalidTransition {
                fragment: "main".to_string(),
                from: FragmentState::Stopped,
                to: FragmentState::Running,
            })
        );
    }

    #[test]
    fn test_controller_clones_share_state() {
        let controller = FragmentController::new();
        let other = controller.clone();
        other.pause();
        assert!(controller.is_paused());
        other.resume();
        assert!(!controller.is_paused());
        other.stop();
        assert!(controller.is_stopped());
        assert!(controller.stop_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_wait_resumed_returns_on_stop() {
        let controller = FragmentController::new();
        controller.pause();
        let waiter = controller.clone();
        let handle = tokio::spawn(async move { waiter.wait_resumed().await });
        controller.stop();
        handle.await.unwrap();
    }
}
