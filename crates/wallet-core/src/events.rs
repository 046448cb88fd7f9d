// SPDX-License-Identifier: Apache-2.0
//! Observable event queue and the restartable stop signal.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use crate::error::{Result, WalletError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalletEvent {
    TransactionCreated { index: usize },
    TransactionUpdated { index: usize },
    BalanceUnlocked,
    SyncProgressUpdated { processed: u32, total: u32 },
    SyncCompleted,
}

/// Restartable stop flag. `stop` wakes every waiter; `start` re-arms the
/// wallet after a stop.
pub struct StopSignal {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    pub fn new() -> Self {
        StopSignal {
            stopped: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn start(&self) {
        self.stopped.store(false, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub async fn wait(&self) {
        loop {
            // Register interest before re-checking so a concurrent `stop`
            // cannot slip between the check and the await.
            let notified = self.notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// FIFO queue of wallet events: many producers on the dispatcher, one
/// consumer in the host. A plain queue plus a wake-up, so producers and
/// `clear` never contend with a blocked consumer.
pub struct EventQueue {
    queue: Mutex<VecDeque<WalletEvent>>,
    occurred: Notify,
}

impl EventQueue {
    pub fn new() -> Self {
        EventQueue {
            queue: Mutex::new(VecDeque::new()),
            occurred: Notify::new(),
        }
    }

    pub fn push(&self, event: WalletEvent) {
        debug!(?event, "wallet event");
        self.queue.lock().push_back(event);
        // A stored permit covers the push-before-wait race.
        self.occurred.notify_one();
    }

    /// Wait for the next event. Resolves with `OperationCancelled` as soon as
    /// `stop` fires, even while blocked.
    pub async fn next(&self, stop: &StopSignal) -> Result<WalletEvent> {
        loop {
            if stop.is_stopped() {
                return Err(WalletError::OperationCancelled);
            }
            if let Some(event) = self.queue.lock().pop_front() {
                return Ok(event);
            }

            let occurred = self.occurred.notified();
            tokio::select! {
                _ = occurred => {}
                _ = stop.wait() => {}
            }
        }
    }

    /// Drop everything queued; used on shutdown.
    pub fn clear(&self) {
        self.queue.lock().clear();
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
