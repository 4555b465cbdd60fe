// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::scheduler::WakeSlot;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct FlagInner {
    enabled: AtomicBool,
    wake: WakeSlot,
}

/// Shared switch behind a boolean condition.
///
/// Cloning yields another handle to the same flag.
#[derive(Debug, Clone)]
pub struct BooleanHandle {
    inner: Arc<FlagInner>,
}

impl Default for BooleanHandle {
    fn default() -> Self {
        Self {
            inner: Arc::new(FlagInner {
                enabled: AtomicBool::new(true),
                wake: WakeSlot::default(),
            }),
        }
    }
}

impl BooleanHandle {
    pub fn enable_tick(&self) {
        self.set(true);
    }

    pub fn disable_tick(&self) {
        self.set(false);
    }

    pub fn set(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
        self.inner.wake.wake();
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub(crate) fn wake_slot(&self) -> &WakeSlot {
        &self.inner.wake
    }
}

/// Event state of an asynchronous condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncEventState {
    Ready,
    Wait,
    EventWaiting,
    EventDone,
    EventNever,
}

impl AsyncEventState {
    fn code(self) -> u8 {
        match self {
            AsyncEventState::Ready => 0,
            AsyncEventState::Wait => 1,
            AsyncEventState::EventWaiting => 2,
            AsyncEventState::EventDone => 3,
            AsyncEventState::EventNever => 4,
        }
    }

    fn from_code(code: u8) -> Self {
        match code {
            0 => AsyncEventState::Ready,
            1 => AsyncEventState::Wait,
            2 => AsyncEventState::EventWaiting,
            3 => AsyncEventState::EventDone,
            _ => AsyncEventState::EventNever,
        }
    }
}

#[derive(Debug)]
struct AsyncInner {
    state: AtomicU8,
    wake: WakeSlot,
}

/// Shared event state behind an asynchronous condition.
///
/// An external event source marks the condition `EventDone`; the next
/// dispatch consumes that and moves it back to `EventWaiting`.
#[derive(Debug, Clone)]
pub struct AsyncHandle {
    inner: Arc<AsyncInner>,
}

impl Default for AsyncHandle {
    fn default() -> Self {
        Self {
            inner: Arc::new(AsyncInner {
                state: AtomicU8::new(AsyncEventState::Ready.code()),
                wake: WakeSlot::default(),
            }),
        }
    }
}

impl AsyncHandle {
    pub fn event_state(&self) -> AsyncEventState {
        AsyncEventState::from_code(self.inner.state.load(Ordering::SeqCst))
    }

    pub fn set_event_state(&self, state: AsyncEventState) {
        self.inner.state.store(state.code(), Ordering::SeqCst);
        self.inner.wake.wake();
    }

    /// Consumes a completed event after the operator ran.
    pub(crate) fn consume_done(&self) {
        let _ = self.inner.state.compare_exchange(
            AsyncEventState::EventDone.code(),
            AsyncEventState::EventWaiting.code(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    pub(crate) fn wake_slot(&self) -> &WakeSlot {
        &self.inner.wake
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_handle_toggles() {
        let handle = BooleanHandle::default();
        assert!(handle.is_enabled());
        handle.disable_tick();
        assert!(!handle.is_enabled());
        handle.enable_tick();
        assert!(handle.is_enabled());
    }

    #[test]
    fn test_async_done_is_consumed_once() {
        let handle = AsyncHandle::default();
        assert_eq!(handle.event_state(), AsyncEventState::Ready);

        handle.set_event_state(AsyncEventState::EventDone);
        handle.consume_done();
        assert_eq!(handle.event_state(), AsyncEventState::EventWaiting);

        handle.set_event_state(AsyncEventState::EventNever);
        handle.consume_done();
        assert_eq!(handle.event_state(), AsyncEventState::EventNever);
    }
}
