//! Publisher: the producer-side endpoint.
//!
//! Owns the listener, tracks consumer connections and fans every queued
//! snapshot out to all of them. Two tasks run while started:
//!
//! ```text
//!  publish_snapshot ──► SnapshotQueue (drop-oldest) ──► broadcast loop ──► clients
//!                                                            ▲
//!  accept loop ──► onboarding (send Config) ──► ClientRegistry┘
//! ```

mod clients;
mod queue;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::metrics::{PublisherCounters, PublisherStats};
use crate::protocol::{MessageType, Result, SnapshotPayload, StreamConfig, encode, write_frame};
use crate::transport::{
    Connection, Listener, TransportAddr, create_listener, remove_endpoint_artifact,
};

use clients::{ClientId, ClientRegistry};
use queue::SnapshotQueue;

/// Default number of pending snapshots held before the oldest is dropped
pub const DEFAULT_QUEUE_CAPACITY: usize = 8;

/// Default per-client write deadline
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(50);

/// Back-off after a failed `accept`
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Publisher configuration options.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Endpoint to bind.
    pub addr: TransportAddr,
    /// Pending snapshots kept before drop-oldest kicks in.
    pub queue_capacity: usize,
    /// Deadline for a single frame write to one client.
    pub write_timeout: Duration,
    /// Stream geometry sent to every new client.
    pub stream: StreamConfig,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            addr: TransportAddr::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            stream: StreamConfig::default(),
        }
    }
}

impl PublisherConfig {
    /// Set the endpoint address
    #[must_use]
    pub fn with_addr(mut self, addr: impl Into<TransportAddr>) -> Self {
        self.addr = addr.into();
        self
    }

    /// Set the queue capacity (clamped to at least 1)
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the per-client write deadline
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the initial stream config
    #[must_use]
    pub fn with_stream(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }
}

/// Producer-side endpoint. Cheap to clone; clones share one instance.
#[derive(Debug, Clone)]
pub struct Publisher {
    inner: Arc<PublisherInner>,
}

#[derive(Debug)]
struct PublisherInner {
    addr: TransportAddr,
    write_timeout: Duration,
    stream: RwLock<StreamConfig>,
    queue: SnapshotQueue,
    clients: ClientRegistry,
    counters: PublisherCounters,
    running: AtomicBool,
    bound: Mutex<Option<TransportAddr>>,
    lifecycle: tokio::sync::Mutex<Option<Running>>,
}

#[derive(Debug)]
struct Running {
    cancel: CancellationToken,
    bound: TransportAddr,
    accept: JoinHandle<()>,
    broadcast: JoinHandle<()>,
}

impl Publisher {
    /// Create a stopped publisher.
    #[must_use]
    pub fn new(config: PublisherConfig) -> Self {
        Self {
            inner: Arc::new(PublisherInner {
                addr: config.addr,
                write_timeout: config.write_timeout,
                stream: RwLock::new(config.stream),
                queue: SnapshotQueue::new(config.queue_capacity),
                clients: ClientRegistry::default(),
                counters: PublisherCounters::default(),
                running: AtomicBool::new(false),
                bound: Mutex::new(None),
                lifecycle: tokio::sync::Mutex::new(None),
            }),
        }
    }

    /// Bind the endpoint and launch the accept and broadcast loops.
    ///
    /// Does nothing if already running.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be bound. Treat this as fatal.
    #[instrument(level = "info", skip(self), fields(addr = %self.inner.addr))]
    pub async fn start(&self) -> Result<()> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if lifecycle.is_some() {
            debug!("publisher already running");
            return Ok(());
        }

        let listener = create_listener(&self.inner.addr)?;
        let bound = listener.local_addr().clone();
        let cancel = CancellationToken::new();

        self.inner.queue.clear();
        self.inner.clients.reopen().await;
        *self.inner.bound_addr() = Some(bound.clone());
        self.inner.running.store(true, Ordering::Release);

        let accept = tokio::spawn(accept_loop(
            Arc::clone(&self.inner),
            listener,
            cancel.clone(),
        ));
        let broadcast = tokio::spawn(broadcast_loop(Arc::clone(&self.inner), cancel.clone()));

        info!(addr = %bound, "publisher started");
        *lifecycle = Some(Running {
            cancel,
            bound,
            accept,
            broadcast,
        });
        Ok(())
    }

    /// Stop both loops, close the listener and every client, and remove the
    /// socket file. Does nothing if already stopped.
    #[instrument(level = "info", skip(self))]
    pub async fn stop(&self) {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        let Some(running) = lifecycle.take() else {
            return;
        };

        self.inner.running.store(false, Ordering::Release);
        running.cancel.cancel();

        if let Err(e) = running.accept.await {
            warn!(error = %e, "accept loop ended abnormally");
        }
        if let Err(e) = running.broadcast.await {
            warn!(error = %e, "broadcast loop ended abnormally");
        }

        let closed = self.inner.clients.close_all().await;
        self.inner.queue.clear();
        *self.inner.bound_addr() = None;

        if let Err(e) = remove_endpoint_artifact(&running.bound) {
            warn!(addr = %running.bound, error = %e, "failed to remove socket file");
        }
        info!(closed_clients = closed, "publisher stopped");
    }

    /// Queue a snapshot for broadcast. Never blocks.
    ///
    /// When the queue is full the oldest pending snapshot is dropped and
    /// counted in [`PublisherStats::dropped_frames`]. Ignored while stopped.
    pub fn publish_snapshot(&self, snapshot: SnapshotPayload) {
        if !self.inner.running.load(Ordering::Acquire) {
            return;
        }
        self.inner.enqueue(snapshot);
    }

    /// Replace the stream config. If it changed and the publisher is running,
    /// every tracked client is sent the new value.
    pub async fn set_stream_config(&self, config: StreamConfig) -> Result<()> {
        let changed = {
            let mut current = self
                .inner
                .stream
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let changed = *current != config;
            *current = config;
            changed
        };

        if !changed || !self.is_running() {
            return Ok(());
        }

        let frame = encode(MessageType::Config, &config)?;
        let delivered = self
            .inner
            .clients
            .broadcast(&frame, self.inner.write_timeout, &self.inner.counters)
            .await;
        debug!(delivered, ?config, "stream config pushed");
        Ok(())
    }

    /// Current stream config
    #[must_use]
    pub fn stream_config(&self) -> StreamConfig {
        self.inner.stream_config()
    }

    /// Whether the loops are running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Address actually bound while running (resolves TCP port 0).
    #[must_use]
    pub fn local_addr(&self) -> Option<TransportAddr> {
        self.inner.bound_addr().clone()
    }

    /// Delivery statistics
    #[must_use]
    pub fn stats(&self) -> PublisherStats {
        self.inner.counters.snapshot(self.inner.clients.len())
    }
}

impl PublisherInner {
    fn enqueue(&self, snapshot: SnapshotPayload) {
        let sequence = snapshot.sequence;
        if self.queue.push(snapshot) {
            self.counters.record_dropped();
            trace!(sequence, "queue full; dropped oldest snapshot");
        }
    }

    fn stream_config(&self) -> StreamConfig {
        *self.stream.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn bound_addr(&self) -> std::sync::MutexGuard<'_, Option<TransportAddr>> {
        self.bound.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn accept_loop(inner: Arc<PublisherInner>, listener: Listener, cancel: CancellationToken) {
    loop {
        let accepted = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok(conn) => {
                inner.counters.record_accepted();
                let id = inner.clients.next_id();
                debug!(client = id, peer = %conn.peer_label(), "client connected");
                tokio::spawn(onboard_client(
                    Arc::clone(&inner),
                    id,
                    conn,
                    cancel.clone(),
                ));
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(ACCEPT_RETRY_DELAY) => {}
                }
            }
        }
    }
    debug!("accept loop exited");
}

/// Send the current stream config, then start tracking the client. Config
/// is therefore always the first frame a consumer sees.
async fn onboard_client(
    inner: Arc<PublisherInner>,
    id: ClientId,
    mut conn: Connection,
    cancel: CancellationToken,
) {
    let config = inner.stream_config();
    let frame = match encode(MessageType::Config, &config) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(client = id, error = %e, "failed to encode stream config");
            return;
        }
    };

    let sent = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        sent = timeout(inner.write_timeout, write_frame(&mut conn, &frame)) => sent,
    };

    match sent {
        Ok(Ok(())) => {
            if inner.clients.register(id, conn, &cancel).await {
                info!(client = id, clients = inner.clients.len(), "client registered");
            }
        }
        Ok(Err(e)) => debug!(client = id, error = %e, "config write failed; dropping client"),
        Err(_) => debug!(client = id, "config write timed out; dropping client"),
    }
}

async fn broadcast_loop(inner: Arc<PublisherInner>, cancel: CancellationToken) {
    loop {
        let snapshot = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            snapshot = inner.queue.pop() => snapshot,
        };

        let sequence = snapshot.sequence;
        let frame = match encode(MessageType::Snapshot, &snapshot) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(sequence, error = %e, "dropping snapshot that cannot be encoded");
                inner.counters.record_dropped();
                continue;
            }
        };
        drop(snapshot);

        let delivered = inner
            .clients
            .broadcast(&frame, inner.write_timeout, &inner.counters)
            .await;
        if delivered > 0 {
            inner.counters.record_sent();
        }
        trace!(sequence, delivered, "snapshot broadcast");
    }
    debug!("broadcast loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Frame, read_frame};
    use crate::transport::dial;
    use std::net::SocketAddr;

    fn tcp_config() -> PublisherConfig {
        PublisherConfig::default().with_addr("127.0.0.1:0".parse::<SocketAddr>().unwrap())
    }

    fn snap(sequence: u64) -> SnapshotPayload {
        SnapshotPayload {
            sequence,
            tick: sequence,
            ..SnapshotPayload::default()
        }
    }

    async fn next_frame(conn: &mut Connection) -> Frame {
        tokio::time::timeout(Duration::from_secs(2), read_frame(conn))
            .await
            .expect("frame arrived in time")
            .unwrap()
    }

    async fn wait_for_clients(publisher: &Publisher, n: usize) {
        for _ in 0..200 {
            if publisher.stats().clients == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {n} clients, have {}", publisher.stats().clients);
    }

    #[test]
    fn test_publish_while_stopped_is_noop() {
        let publisher = Publisher::new(tcp_config());
        publisher.publish_snapshot(snap(1));

        assert_eq!(publisher.inner.queue.len(), 0);
        assert_eq!(publisher.stats(), PublisherStats::default());
    }

    #[test]
    fn test_full_queue_drops_oldest() {
        let publisher = Publisher::new(tcp_config().with_queue_capacity(1));
        // Flip the flag without spawning loops so nothing drains the queue.
        publisher.inner.running.store(true, Ordering::Release);

        publisher.publish_snapshot(snap(1));
        publisher.publish_snapshot(snap(2));

        assert_eq!(publisher.stats().dropped_frames, 1);
        assert_eq!(publisher.inner.queue.try_pop().map(|s| s.sequence), Some(2));
        assert!(publisher.inner.queue.try_pop().is_none());
    }

    #[tokio::test]
    async fn test_start_twice_binds_once() {
        let publisher = Publisher::new(tcp_config());
        publisher.start().await.unwrap();
        let first = publisher.local_addr().unwrap();

        publisher.start().await.unwrap();
        assert_eq!(publisher.local_addr().unwrap(), first);
        assert!(publisher.is_running());

        publisher.stop().await;
        publisher.stop().await;
        assert!(!publisher.is_running());
        assert!(publisher.local_addr().is_none());
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let publisher = Publisher::new(tcp_config());
        publisher.stop().await;
        assert!(!publisher.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_removes_socket_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("pub.sock");
        let publisher = Publisher::new(PublisherConfig::default().with_addr(path.clone()));

        publisher.start().await.unwrap();
        assert!(path.exists());

        publisher.stop().await;
        assert!(!path.exists());
        publisher.stop().await;
    }

    #[tokio::test]
    async fn test_new_client_gets_config_before_snapshots() {
        let stream = StreamConfig::new(854, 480, 24, 2000);
        let publisher = Publisher::new(tcp_config().with_stream(stream));
        publisher.start().await.unwrap();

        let mut conn = dial(&publisher.local_addr().unwrap()).await.unwrap();
        let first = next_frame(&mut conn).await;
        assert_eq!(first.message_type(), Some(MessageType::Config));
        assert_eq!(first.decode_body::<StreamConfig>().unwrap(), stream);

        wait_for_clients(&publisher, 1).await;
        publisher.publish_snapshot(snap(5));

        let second = next_frame(&mut conn).await;
        assert_eq!(second.message_type(), Some(MessageType::Snapshot));
        assert_eq!(second.decode_body::<SnapshotPayload>().unwrap().sequence, 5);

        publisher.stop().await;
        assert_eq!(publisher.stats().snapshots_sent, 1);
    }

    #[tokio::test]
    async fn test_stream_config_change_is_pushed() {
        let publisher = Publisher::new(tcp_config());
        publisher.start().await.unwrap();

        let mut conn = dial(&publisher.local_addr().unwrap()).await.unwrap();
        let _initial = next_frame(&mut conn).await;
        wait_for_clients(&publisher, 1).await;

        let updated = StreamConfig::new(1920, 1080, 60, 8000);
        publisher.set_stream_config(updated).await.unwrap();

        let frame = next_frame(&mut conn).await;
        assert_eq!(frame.message_type(), Some(MessageType::Config));
        assert_eq!(frame.decode_body::<StreamConfig>().unwrap(), updated);
        assert_eq!(publisher.stream_config(), updated);

        publisher.stop().await;
    }

    #[tokio::test]
    async fn test_stop_closes_clients() {
        let publisher = Publisher::new(tcp_config());
        publisher.start().await.unwrap();

        let mut conn = dial(&publisher.local_addr().unwrap()).await.unwrap();
        let _config = next_frame(&mut conn).await;
        wait_for_clients(&publisher, 1).await;

        publisher.stop().await;
        assert_eq!(publisher.stats().clients, 0);

        let after = tokio::time::timeout(Duration::from_secs(2), read_frame(&mut conn))
            .await
            .expect("read finished");
        assert!(after.is_err());
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let publisher = Publisher::new(tcp_config());
        publisher.start().await.unwrap();
        publisher.stop().await;
        publisher.start().await.unwrap();

        let mut conn = dial(&publisher.local_addr().unwrap()).await.unwrap();
        let frame = next_frame(&mut conn).await;
        assert_eq!(frame.message_type(), Some(MessageType::Config));

        publisher.stop().await;
    }
}
