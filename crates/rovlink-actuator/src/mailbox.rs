//! Single-slot, latest-wins mailbox.
//!
//! The writer overwrites whatever is still waiting in the slot; the reader
//! always gets the newest value.  Posting never blocks, so the motor loop can
//! hand off audio clips and animations without waiting on playback.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

struct Slot<T> {
    value: Mutex<Option<T>>,
    notify: Notify,
    closed: AtomicBool,
    overwrites: AtomicU64,
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
        notify: Notify::new(),
        closed: AtomicBool::new(false),
        overwrites: AtomicU64::new(0),
    });
    (
        MailboxSender {
            slot: Arc::clone(&slot),
        },
        MailboxReceiver { slot },
    )
}

impl<T> MailboxSender<T> {
    /// Put `value` in the slot.  Returns `true` if an unread value was
    /// replaced.
    pub fn post(&self, value: T) -> bool {
        let replaced = self.slot.value.lock().replace(value).is_some();
        if replaced {
            self.slot.overwrites.fetch_add(1, Ordering::Relaxed);
        }
        self.slot.notify.notify_one();
        replaced
    }

    pub fn overwrites(&self) -> u64 {
        self.slot.overwrites.load(Ordering::Relaxed)
    }
}

impl<T> Drop for MailboxSender<T> {
    fn drop(&mut self) {
        self.slot.closed.store(true, Ordering::Release);
        self.slot.notify.notify_one();
    }
}

impl<T> MailboxReceiver<T> {
    /// Wait for the next value.  A value posted before the sender was
    /// dropped is still delivered; after that, `None`.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            if let Some(value) = self.slot.value.lock().take() {
                return Some(value);
            }
            if self.slot.closed.load(Ordering::Acquire) {
                return None;
            }
            self.slot.notify.notified().await;
        }
    }
}
