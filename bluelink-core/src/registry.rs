use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::parser::BluetoothctlLine;

pub type LineHandler = Arc<dyn Fn(&BluetoothctlLine) + Send + Sync>;

/// Ordered set of line handlers shared between a session and its reader task.
#[derive(Default)]
pub struct HandlerRegistry {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(u64, LineHandler)>>,
    closed: AtomicBool,
}

impl HandlerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn entries(&self) -> MutexGuard<'_, Vec<(u64, LineHandler)>> {
        self.handlers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Once the registry is closed the handler is dropped straight away.
    pub fn subscribe(self: &Arc<Self>, handler: LineHandler) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries();
        if !self.closed.load(Ordering::SeqCst) {
            entries.push((id, handler));
        }
        drop(entries);
        Subscription {
            id,
            registry: Arc::downgrade(self),
        }
    }

    /// Calls every handler in registration order; returns how many ran.
    ///
    /// A handler unsubscribed by an earlier handler during the same dispatch is skipped.
    pub fn dispatch(&self, line: &BluetoothctlLine) -> usize {
        // Snapshot so a handler may unsubscribe without deadlocking.
        let snapshot: Vec<(u64, LineHandler)> = self.entries().clone();
        let mut ran = 0;
        for (id, handler) in &snapshot {
            if !self.is_live(*id) {
                continue;
            }
            handler(line);
            ran += 1;
        }
        ran
    }

    fn is_live(&self, id: u64) -> bool {
        self.entries().iter().any(|(entry, _)| *entry == id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every handler and refuses new ones; the line source is gone.
    pub fn close(&self) {
        let mut entries = self.entries();
        self.closed.store(true, Ordering::SeqCst);
        entries.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn remove(&self, id: u64) {
        self.entries().retain(|(entry, _)| *entry != id);
    }
}

/// Keeps a handler registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    id: u64,
    registry: Weak<HandlerRegistry>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}
