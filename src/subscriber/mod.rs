//! Subscriber: the consumer-side endpoint.
//!
//! Keeps one connection to the publisher alive, redialing after a fixed
//! delay when it drops, and exposes the newest snapshot with overwrite
//! semantics.
//!
//! ```text
//! Stopped ─► Connecting ─► Connected ⇄ Reconnecting ─► Failed
//!    ▲                                                    │
//!    └──────────────────────── stop ◄─────────────────────┘
//! ```

mod handler;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::io::BufReader;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

pub use handler::{NoopHandler, SubscriberHandler};

use crate::metrics::{SubscriberCounters, SubscriberStats};
use crate::protocol::{
    Error, Frame, MessageType, Result, SnapshotPayload, StreamConfig, read_frame,
};
use crate::transport::{Connection, TransportAddr, dial};

/// Default wait between dial attempts
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Default number of consecutive failed dials before giving up
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 30;

/// Default deadline for a single dial
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(2);

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not started, or stopped
    Stopped,
    /// First dial in progress
    Connecting,
    /// Reading frames from the publisher
    Connected,
    /// Waiting to redial after a failure
    Reconnecting,
    /// Reconnect budget exhausted; only `start` leaves this state
    Failed,
}

impl ConnectionState {
    /// `Stopped` or `Failed`
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Subscriber configuration options.
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Publisher endpoint to dial.
    pub addr: TransportAddr,
    /// Fixed wait between dial attempts.
    pub reconnect_delay: Duration,
    /// Consecutive failed dials tolerated before entering
    /// [`ConnectionState::Failed`]. `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
    /// Deadline for one dial.
    pub dial_timeout: Duration,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            addr: TransportAddr::default(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_attempts: Some(DEFAULT_MAX_RECONNECT_ATTEMPTS),
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
        }
    }
}

impl SubscriberConfig {
    /// Set the publisher address
    #[must_use]
    pub fn with_addr(mut self, addr: impl Into<TransportAddr>) -> Self {
        self.addr = addr.into();
        self
    }

    /// Set the reconnect delay
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the reconnect budget
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Set the dial deadline
    #[must_use]
    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }
}

/// Consumer-side endpoint. Cheap to clone; clones share one instance.
#[derive(Clone)]
pub struct Subscriber {
    inner: Arc<SubscriberInner>,
}

struct SubscriberInner {
    config: SubscriberConfig,
    handler: Arc<dyn SubscriberHandler>,
    counters: SubscriberCounters,
    state: watch::Sender<ConnectionState>,
    latest: watch::Sender<Option<Arc<SnapshotPayload>>>,
    stream: watch::Sender<Option<StreamConfig>>,
    /// Consecutive failed dials behind the last `Failed` transition
    exhausted_after: AtomicU32,
    lifecycle: tokio::sync::Mutex<Option<Running>>,
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("addr", &self.inner.config.addr)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Subscriber {
    /// Create a stopped subscriber with no event handler.
    #[must_use]
    pub fn new(config: SubscriberConfig) -> Self {
        Self::with_handler(config, NoopHandler)
    }

    /// Create a stopped subscriber that reports events to `handler`.
    #[must_use]
    pub fn with_handler(config: SubscriberConfig, handler: impl SubscriberHandler) -> Self {
        Self {
            inner: Arc::new(SubscriberInner {
                config,
                handler: Arc::new(handler),
                counters: SubscriberCounters::default(),
                state: watch::channel(ConnectionState::Stopped).0,
                latest: watch::channel(None).0,
                stream: watch::channel(None).0,
                exhausted_after: AtomicU32::new(0),
                lifecycle: tokio::sync::Mutex::new(None),
            }),
        }
    }

    /// Launch the connection task. Does nothing while one is already active;
    /// restarts after [`ConnectionState::Failed`].
    #[instrument(level = "info", skip(self), fields(addr = %self.inner.config.addr))]
    pub async fn start(&self) {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if lifecycle
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
        {
            debug!("subscriber already running");
            return;
        }

        let cancel = CancellationToken::new();
        self.inner.set_state(ConnectionState::Connecting);
        let task = tokio::spawn(Arc::clone(&self.inner).run(cancel.clone()));
        *lifecycle = Some(Running { cancel, task });
    }

    /// Stop the connection task and drop the connection. Does nothing if
    /// already stopped.
    #[instrument(level = "info", skip(self))]
    pub async fn stop(&self) {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        let Some(running) = lifecycle.take() else {
            return;
        };

        running.cancel.cancel();
        if let Err(e) = running.task.await {
            warn!(error = %e, "subscriber task ended abnormally");
        }
        self.inner.set_state(ConnectionState::Stopped);
        info!("subscriber stopped");
    }

    /// Wait until the subscriber stops or gives up.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReconnectExhausted`] if the reconnect budget ran out.
    pub async fn wait(&self) -> Result<()> {
        let mut state = self.inner.state.subscribe();
        let terminal = match state.wait_for(|s| s.is_terminal()).await {
            Ok(state) => *state,
            Err(_) => ConnectionState::Stopped,
        };
        if terminal == ConnectionState::Failed {
            return Err(Error::ReconnectExhausted {
                attempts: self.inner.exhausted_after.load(Ordering::Acquire),
            });
        }
        Ok(())
    }

    /// Newest snapshot received, if any
    #[must_use]
    pub fn latest_snapshot(&self) -> Option<Arc<SnapshotPayload>> {
        self.inner.latest.borrow().clone()
    }

    /// Newest stream config received, if any
    #[must_use]
    pub fn latest_config(&self) -> Option<StreamConfig> {
        *self.inner.stream.borrow()
    }

    /// Receiver that observes each new snapshot. Only the newest value is
    /// retained; a slow reader skips intermediate ones.
    #[must_use]
    pub fn watch_snapshots(&self) -> watch::Receiver<Option<Arc<SnapshotPayload>>> {
        self.inner.latest.subscribe()
    }

    /// Receiver that observes connection state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Delivery statistics
    #[must_use]
    pub fn stats(&self) -> SubscriberStats {
        self.inner.counters.snapshot(self.state())
    }
}

impl SubscriberInner {
    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "subscriber state changed");
        }
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let config = &self.config;
        let mut failures: u32 = 0;
        let mut first_attempt = true;

        loop {
            if !first_attempt {
                self.counters.record_reconnect();
            }
            first_attempt = false;

            let dialed = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                dialed = timeout(config.dial_timeout, dial(&config.addr)) => {
                    dialed.unwrap_or(Err(Error::Timeout {
                        operation: "dial",
                        after: config.dial_timeout,
                    }))
                }
            };

            match dialed {
                Ok(conn) => {
                    failures = 0;
                    self.set_state(ConnectionState::Connected);
                    info!(addr = %config.addr, "connected to publisher");
                    self.handler.on_connect();

                    let error = tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        error = self.read_loop(conn) => error,
                    };

                    self.counters.record_error();
                    warn!(error = %error, "connection to publisher lost");
                    self.set_state(ConnectionState::Reconnecting);
                    self.handler.on_disconnect(&error);
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    self.counters.record_error();
                    debug!(attempt = failures, error = %e, "dial failed");

                    if config.max_reconnect_attempts.is_some_and(|max| failures >= max) {
                        warn!(attempts = failures, "giving up on publisher");
                        self.exhausted_after.store(failures, Ordering::Release);
                        self.set_state(ConnectionState::Failed);
                        return;
                    }
                    self.set_state(ConnectionState::Reconnecting);
                }
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(config.reconnect_delay) => {}
            }
        }

        self.set_state(ConnectionState::Stopped);
    }

    /// Read frames until the connection fails. Never returns on success.
    async fn read_loop(&self, conn: Connection) -> Error {
        let mut reader = BufReader::new(conn);
        loop {
            match read_frame(&mut reader).await {
                Ok(frame) => self.dispatch(&frame),
                Err(e) => return e,
            }
        }
    }

    fn dispatch(&self, frame: &Frame) {
        match frame.message_type() {
            Some(MessageType::Snapshot) => match frame.decode_body::<SnapshotPayload>() {
                Ok(snapshot) => {
                    self.counters.record_snapshot(snapshot.sequence);
                    trace!(sequence = snapshot.sequence, "snapshot received");
                    self.latest.send_replace(Some(Arc::new(snapshot)));
                }
                Err(e) => {
                    self.counters.record_error();
                    warn!(error = %e, "skipping undecodable snapshot");
                }
            },
            Some(MessageType::Config) => match frame.decode_body::<StreamConfig>() {
                Ok(config) => {
                    debug!(?config, "stream config received");
                    self.stream.send_replace(Some(config));
                    self.handler.on_config(&config);
                }
                Err(e) => {
                    self.counters.record_error();
                    warn!(error = %e, "skipping undecodable config");
                }
            },
            Some(reserved @ (MessageType::Ping | MessageType::Pong)) => {
                trace!(msg_type = %reserved, "ignoring reserved message");
            }
            None => {
                debug!(
                    type_byte = frame.header().msg_type_byte(),
                    "skipping unknown message type"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode, encode, encode_empty};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl SubscriberHandler for Arc<Recorder> {
        fn on_connect(&self) {
            self.events.lock().unwrap().push("connect".into());
        }

        fn on_disconnect(&self, _error: &Error) {
            self.events.lock().unwrap().push("disconnect".into());
        }

        fn on_config(&self, config: &StreamConfig) {
            self.events
                .lock()
                .unwrap()
                .push(format!("config {}x{}", config.width, config.height));
        }
    }

    fn missing_endpoint(tmp: &tempfile::TempDir) -> SubscriberConfig {
        let addr: TransportAddr = if cfg!(unix) {
            TransportAddr::Unix(tmp.path().join("nobody-home.sock"))
        } else {
            "tcp:127.0.0.1:1".parse().unwrap()
        };
        SubscriberConfig::default()
            .with_addr(addr)
            .with_reconnect_delay(Duration::from_millis(5))
            .with_dial_timeout(Duration::from_millis(200))
    }

    fn frame<T: serde::Serialize>(msg_type: MessageType, payload: &T) -> Frame {
        decode(&encode(msg_type, payload).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let tmp = tempfile::TempDir::new().unwrap();
        let subscriber =
            Subscriber::new(missing_endpoint(&tmp).with_max_reconnect_attempts(Some(3)));

        subscriber.start().await;
        let result = tokio::time::timeout(Duration::from_secs(5), subscriber.wait())
            .await
            .expect("subscriber gave up in time");

        assert!(matches!(result, Err(Error::ReconnectExhausted { attempts: 3 })));
        let stats = subscriber.stats();
        assert_eq!(stats.state, ConnectionState::Failed);
        assert_eq!(stats.errors, 3);
        assert_eq!(stats.reconnects, 2);

        subscriber.stop().await;
        assert_eq!(subscriber.state(), ConnectionState::Stopped);
    }

    #[tokio::test]
    async fn test_zero_budget_reports_the_single_dial() {
        let tmp = tempfile::TempDir::new().unwrap();
        let subscriber =
            Subscriber::new(missing_endpoint(&tmp).with_max_reconnect_attempts(Some(0)));

        subscriber.start().await;
        let result = tokio::time::timeout(Duration::from_secs(5), subscriber.wait())
            .await
            .expect("subscriber gave up in time");

        assert!(matches!(result, Err(Error::ReconnectExhausted { attempts: 1 })));
        assert_eq!(subscriber.stats().errors, 1);
        assert_eq!(subscriber.stats().reconnects, 0);
        subscriber.stop().await;
    }

    #[tokio::test]
    async fn test_unbounded_retries_until_stopped() {
        let tmp = tempfile::TempDir::new().unwrap();
        let subscriber = Subscriber::new(missing_endpoint(&tmp).with_max_reconnect_attempts(None));

        subscriber.start().await;
        subscriber.start().await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(subscriber.state(), ConnectionState::Reconnecting);
        assert!(subscriber.stats().reconnects > 0);

        subscriber.stop().await;
        subscriber.stop().await;
        assert_eq!(subscriber.state(), ConnectionState::Stopped);
        subscriber.wait().await.unwrap();
    }

    #[test]
    fn test_dispatch_snapshot_overwrites_latest() {
        let subscriber = Subscriber::new(SubscriberConfig::default());
        for sequence in [3, 9] {
            let snapshot = SnapshotPayload {
                sequence,
                ..SnapshotPayload::default()
            };
            subscriber
                .inner
                .dispatch(&frame(MessageType::Snapshot, &snapshot));
        }

        assert_eq!(subscriber.latest_snapshot().unwrap().sequence, 9);
        let stats = subscriber.stats();
        assert_eq!(stats.snapshots_received, 2);
        assert_eq!(stats.last_sequence, 9);
        assert_eq!(stats.errors, 0);
    }

    #[test]
    fn test_dispatch_config_invokes_handler() {
        let recorder = Arc::new(Recorder::default());
        let subscriber =
            Subscriber::with_handler(SubscriberConfig::default(), Arc::clone(&recorder));

        let config = StreamConfig::new(640, 480, 30, 1000);
        subscriber
            .inner
            .dispatch(&frame(MessageType::Config, &config));

        assert_eq!(subscriber.latest_config(), Some(config));
        assert_eq!(*recorder.events.lock().unwrap(), vec!["config 640x480"]);
    }

    #[test]
    fn test_dispatch_skips_reserved_unknown_and_garbage() {
        let subscriber = Subscriber::new(SubscriberConfig::default());

        subscriber
            .inner
            .dispatch(&decode(&encode_empty(MessageType::Ping)).unwrap());

        let mut unknown = encode(MessageType::Config, &StreamConfig::default())
            .unwrap()
            .to_vec();
        unknown[2] = 0x42;
        subscriber.inner.dispatch(&decode(&unknown).unwrap());

        subscriber
            .inner
            .dispatch(&frame(MessageType::Snapshot, &"garbage"));

        assert!(subscriber.latest_snapshot().is_none());
        assert!(subscriber.latest_config().is_none());
        let stats = subscriber.stats();
        assert_eq!(stats.snapshots_received, 0);
        assert_eq!(stats.errors, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_loop_returns_error_on_version_mismatch() {
        use tokio::io::AsyncWriteExt;
        use tokio::net::UnixStream;

        let subscriber = Subscriber::new(SubscriberConfig::default());
        let (ours, mut theirs) = UnixStream::pair().unwrap();

        let mut bad = encode(MessageType::Config, &StreamConfig::default())
            .unwrap()
            .to_vec();
        bad[0] = bad[0].wrapping_add(1);
        theirs.write_all(&bad).await.unwrap();

        let error = subscriber
            .inner
            .read_loop(Connection::from_unix(ours))
            .await;
        assert!(matches!(error, Error::VersionMismatch { .. }));
        assert!(subscriber.latest_config().is_none());
    }
}
