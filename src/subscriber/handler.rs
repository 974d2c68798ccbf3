//! Consumer event callbacks.

use crate::protocol::{Error, StreamConfig};

/// Receives connection events from a [`super::Subscriber`].
///
/// Methods run synchronously on the subscriber's connection task, so they
/// should return quickly. All methods default to doing nothing.
pub trait SubscriberHandler: Send + Sync + 'static {
    /// A connection to the publisher was established.
    fn on_connect(&self) {}

    /// An established connection was lost. A reconnect follows.
    fn on_disconnect(&self, error: &Error) {
        let _ = error;
    }

    /// The publisher sent stream geometry, on connect or after a change.
    fn on_config(&self, config: &StreamConfig) {
        let _ = config;
    }
}

/// Handler that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl SubscriberHandler for NoopHandler {}
