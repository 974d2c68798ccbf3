//! Tracked client connections and the fan-out write.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::metrics::PublisherCounters;
use crate::protocol::write_frame;
use crate::transport::Connection;

pub(crate) type ClientId = u64;

#[derive(Debug, Default)]
struct Slots {
    clients: HashMap<ClientId, Connection>,
    closed: bool,
}

/// Connections the publisher believes are live.
///
/// Once [`ClientRegistry::close_all`] has run, late registrations are
/// refused until [`ClientRegistry::reopen`].
#[derive(Debug, Default)]
pub(crate) struct ClientRegistry {
    slots: Mutex<Slots>,
    count: AtomicUsize,
    next_id: AtomicU64,
}

impl ClientRegistry {
    pub(crate) fn next_id(&self) -> ClientId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// Track `conn` for the run that owns `run`. Returns `false` (and drops
    /// the connection) if the registry is closed or that run was cancelled.
    pub(crate) async fn register(
        &self,
        id: ClientId,
        conn: Connection,
        run: &CancellationToken,
    ) -> bool {
        let mut slots = self.slots.lock().await;
        if slots.closed || run.is_cancelled() {
            return false;
        }
        slots.clients.insert(id, conn);
        self.count.store(slots.clients.len(), Ordering::Relaxed);
        true
    }

    /// Write `frame` to every client, each under its own `deadline`.
    ///
    /// Clients whose write fails or runs late are removed and closed; the
    /// rest are unaffected. Writes are sequential, so slow clients add up.
    /// Returns the number of clients that received the frame.
    pub(crate) async fn broadcast(
        &self,
        frame: &[u8],
        deadline: Duration,
        counters: &PublisherCounters,
    ) -> usize {
        let mut slots = self.slots.lock().await;
        let mut failed = Vec::new();
        let mut delivered = 0;

        for (&id, conn) in &mut slots.clients {
            let started = Instant::now();
            match timeout(deadline, write_frame(conn, frame)).await {
                Ok(Ok(())) => {
                    delivered += 1;
                    counters.record_write_latency(started.elapsed());
                }
                Ok(Err(e)) => {
                    debug!(client = id, error = %e, "write failed; evicting client");
                    failed.push(id);
                }
                Err(_) => {
                    debug!(client = id, ?deadline, "write deadline exceeded; evicting client");
                    failed.push(id);
                }
            }
        }

        for id in &failed {
            // Dropping the stream closes it.
            slots.clients.remove(id);
        }
        if !failed.is_empty() {
            counters.record_evicted(failed.len());
        }
        self.count.store(slots.clients.len(), Ordering::Relaxed);
        trace!(delivered, evicted = failed.len(), "broadcast complete");

        delivered
    }

    /// Close every tracked connection and refuse new ones.
    pub(crate) async fn close_all(&self) -> usize {
        let mut slots = self.slots.lock().await;
        slots.closed = true;
        let closed = slots.clients.len();
        slots.clients.clear();
        self.count.store(0, Ordering::Relaxed);
        closed
    }

    pub(crate) async fn reopen(&self) {
        self.slots.lock().await.closed = false;
    }
}
