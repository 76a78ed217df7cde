//! Typed channel for rendered template publishes
//!
//! Provides a non-blocking way for the control loop to hand rendered outputs
//! to the MQTT publisher. Bounded so a stalled broker cannot grow memory.

use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// One rendered template ready for the publish sink
#[derive(Debug, Clone)]
pub struct PublishMessage {
    /// Full topic including the configured prefix
    pub topic: String,
    pub payload: Bytes,
}

/// Sender handle for publish messages
///
/// Clone this to share across multiple producers.
/// Non-blocking - if the channel is full, messages are dropped.
#[derive(Clone)]
pub struct PublishSender {
    tx: mpsc::Sender<PublishMessage>,
    topic_prefix: String,
    dropped: Arc<AtomicU64>,
}

impl PublishSender {
    pub fn new(tx: mpsc::Sender<PublishMessage>, topic_prefix: String) -> Self {
        Self { tx, topic_prefix, dropped: Arc::new(AtomicU64::new(0)) }
    }

    pub fn topic_for(&self, topic: &str) -> String {
        if self.topic_prefix.is_empty() {
            topic.to_string()
        } else {
            format!("{}/{}", self.topic_prefix.trim_end_matches('/'), topic)
        }
    }

    /// Queue a payload under `<prefix>/<topic>`; returns false if dropped
    pub fn publish(&self, topic: &str, payload: impl Into<Bytes>) -> bool {
        let msg = PublishMessage { topic: self.topic_for(topic), payload: payload.into() };
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(e) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                // Rate-limit the warning so a dead broker does not flood the log
                if dropped == 1 || dropped % 100 == 0 {
                    warn!(topic = %topic, dropped = dropped, error = %e, "publish_dropped");
                }
                false
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Create a new publish channel pair
///
/// Returns (sender, receiver) where sender can be cloned and shared.
pub fn create_publish_channel(
    buffer_size: usize,
    topic_prefix: String,
) -> (PublishSender, mpsc::Receiver<PublishMessage>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (PublishSender::new(tx, topic_prefix), rx)
}
