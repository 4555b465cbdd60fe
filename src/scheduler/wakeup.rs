// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;

/// Slot through which queues and condition handles wake a sleeping scheduler.
///
/// Empty until a fragment executor attaches its notifier, so anything that
/// fires before the run starts is a no-op.
#[derive(Debug, Default)]
pub(crate) struct WakeSlot {
    notify: Mutex<Option<Arc<Notify>>>,
}

impl WakeSlot {
    pub(crate) fn attach(&self, notify: Arc<Notify>) {
        *self.notify.lock() = Some(notify);
    }

    pub(crate) fn wake(&self) {
        if let Some(notify) = self.notify.lock().as_ref() {
            notify.notify_one();
        }
    }
}
