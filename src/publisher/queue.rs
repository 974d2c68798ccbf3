//! Bounded drop-oldest snapshot queue.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::protocol::SnapshotPayload;

/// Holds the most recent `capacity` snapshots.
///
/// Pushing never blocks: when full, the oldest entry is evicted to make room.
/// One consumer (the broadcast loop) waits in [`SnapshotQueue::pop`].
#[derive(Debug)]
pub(crate) struct SnapshotQueue {
    items: Mutex<VecDeque<SnapshotPayload>>,
    capacity: usize,
    ready: Notify,
}

impl SnapshotQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            ready: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<SnapshotPayload>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a snapshot. Returns `true` if an older one was evicted.
    pub(crate) fn push(&self, snapshot: SnapshotPayload) -> bool {
        let evicted = {
            let mut items = self.lock();
            let evicted = if items.len() >= self.capacity {
                items.pop_front().is_some()
            } else {
                false
            };
            items.push_back(snapshot);
            evicted
        };
        self.ready.notify_one();
        evicted
    }

    pub(crate) fn try_pop(&self) -> Option<SnapshotPayload> {
        self.lock().pop_front()
    }

    /// Wait for the next snapshot. Cancel-safe: nothing is removed unless the
    /// future completes.
    pub(crate) async fn pop(&self) -> SnapshotPayload {
        loop {
            if let Some(snapshot) = self.try_pop() {
                return snapshot;
            }
            self.ready.notified().await;
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn clear(&self) {
        self.lock().clear();
    }
}
