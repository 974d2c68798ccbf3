//! Delivery counters for the publisher and subscriber.
//!
//! Each component owns its counters; they are bumped from the component's
//! loops and read from any thread without locking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::subscriber::ConnectionState;

#[derive(Debug, Default)]
pub(crate) struct PublisherCounters {
    snapshots_sent: AtomicU64,
    dropped_frames: AtomicU64,
    clients_accepted: AtomicU64,
    clients_evicted: AtomicU64,
    max_write_latency_us: AtomicU64,
}

impl PublisherCounters {
    #[inline]
    pub(crate) fn record_sent(&self) {
        self.snapshots_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_dropped(&self) {
        self.dropped_frames.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_accepted(&self) {
        self.clients_accepted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_evicted(&self, count: usize) {
        self.clients_evicted
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_write_latency(&self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        update_max(&self.max_write_latency_us, micros);
    }

    pub(crate) fn snapshot(&self, clients: usize) -> PublisherStats {
        PublisherStats {
            clients,
            snapshots_sent: self.snapshots_sent.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
            clients_accepted: self.clients_accepted.load(Ordering::Relaxed),
            clients_evicted: self.clients_evicted.load(Ordering::Relaxed),
            max_write_latency_us: self.max_write_latency_us.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time publisher statistics.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublisherStats {
    /// Currently tracked clients
    pub clients: usize,
    /// Snapshots delivered to at least one client
    pub snapshots_sent: u64,
    /// Snapshots evicted from the queue before broadcast
    pub dropped_frames: u64,
    /// Connections accepted since creation
    pub clients_accepted: u64,
    /// Clients removed after a failed or late write
    pub clients_evicted: u64,
    /// Slowest single successful client write, in microseconds
    pub max_write_latency_us: u64,
}

#[derive(Debug, Default)]
pub(crate) struct SubscriberCounters {
    snapshots_received: AtomicU64,
    reconnects: AtomicU64,
    errors: AtomicU64,
    last_sequence: AtomicU64,
}

impl SubscriberCounters {
    #[inline]
    pub(crate) fn record_snapshot(&self, sequence: u64) {
        self.snapshots_received.fetch_add(1, Ordering::Relaxed);
        self.last_sequence.store(sequence, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, state: ConnectionState) -> SubscriberStats {
        SubscriberStats {
            snapshots_received: self.snapshots_received.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            last_sequence: self.last_sequence.load(Ordering::Relaxed),
            state,
        }
    }
}

/// Point-in-time subscriber statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberStats {
    /// Snapshot frames decoded
    pub snapshots_received: u64,
    /// Dial attempts after the first one
    pub reconnects: u64,
    /// Dial, read and decode failures
    pub errors: u64,
    /// Sequence number of the newest snapshot, 0 before the first
    pub last_sequence: u64,
    /// Connection state at the time of the read
    pub state: ConnectionState,
}

fn update_max(target: &AtomicU64, candidate: u64) {
    let mut current = target.load(Ordering::Relaxed);
    while candidate > current {
        match target.compare_exchange_weak(
            current,
            candidate,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => return,
            Err(old) => current = old,
        }
    }
}
