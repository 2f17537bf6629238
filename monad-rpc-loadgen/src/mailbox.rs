// Copyright (C) 2025 Category Labs, Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Single-slot, most-recent-wins handoff between one producer and one consumer.
//!
//! Publishing never blocks: a value the consumer has not yet taken is replaced.
//! The consumer either polls without blocking or waits for the next value.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};

use tokio::sync::Notify;

struct Slot<T> {
    value: Mutex<Option<T>>,
    closed: AtomicBool,
    notify: Notify,
}

impl<T> Slot<T> {
    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        // the slot holds a plain value, a poisoned lock leaves it consistent
        self.value.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct MailboxSender<T> {
    slot: Arc<Slot<T>>,
}

pub struct MailboxReceiver<T> {
    slot: Arc<Slot<T>>,
}

pub fn mailbox<T>() -> (MailboxSender<T>, MailboxReceiver<T>) {
    let slot = Arc::new(Slot {
        value: Mutex::new(None),
        closed: AtomicBool::new(false),
        notify: Notify::new(),
    });
    (
        MailboxSender { slot: slot.clone() },
        MailboxReceiver { slot },
    )
}

impl<T> MailboxSender<T> {
    /// Stores `value`, returning the previous value if it was never taken.
    pub fn publish(&self, value: T) -> Option<T> {
        let displaced = self.slot.lock().replace(value);
        self.slot.notify.notify_one();
        displaced
    }

    pub fn is_receiver_dropped(&self) -> bool {
        Arc::strong_count(&self.slot) == 1
    }
}

impl<T> Drop for MailboxSender<T> {
    fn drop(&mut self) {
        self.slot.closed.store(true, Ordering::Release);
        self.slot.notify.notify_one();
    }
}

impl<T> MailboxReceiver<T> {
    /// Takes the pending value, if any, without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.slot.lock().take()
    }

    /// Waits for a value. Returns `None` once the sender is gone and the slot
    /// is empty.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            if let Some(value) = self.try_recv() {
                return Some(value);
            }
            if self.slot.closed.load(Ordering::Acquire) {
                return self.try_recv();
            }
            self.slot.notify.notified().await;
        }
    }
}
