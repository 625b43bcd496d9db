//! Live fan-out for the subscription stream (§4.E).
//!
//! The live set is a map from stream name to a [`tokio::sync::broadcast`]
//! channel. Using a broadcast channel gets us the hard parts for free: a
//! bounded per-channel backlog, lagging receivers reported distinctly from
//! closed ones, and safe concurrent publish/subscribe/drop. A subscriber
//! that falls behind sees `RecvError::Lagged` on its next `recv`, which
//! handlers map to `ConsumerTooSlow`.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;

use crate::labels::Label;

/// The stream name for the one subscription method this service exposes.
pub const LABELS_STREAM: &str = "#labels";

#[derive(Debug, Clone)]
pub struct BroadcastMsg {
    pub seq: i64,
    pub label: Label,
}

pub struct Broadcaster {
    capacity: usize,
    channels: Mutex<HashMap<String, broadcast::Sender<BroadcastMsg>>>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Deliver a newly-sequenced label to every live subscriber of `stream`.
    /// No-op if nobody is currently subscribed.
    pub fn publish(&self, stream: &str, seq: i64, label: Label) {
        let channels = self.channels.lock().expect("broadcaster mutex poisoned");
        if let Some(sender) = channels.get(stream) {
            let _ = sender.send(BroadcastMsg { seq, label });
        }
    }

    /// Register a new live subscriber, creating the channel for `stream`
    /// if this is its first subscriber.
    pub fn subscribe(&self, stream: &str) -> broadcast::Receiver<BroadcastMsg> {
        let mut channels = self.channels.lock().expect("broadcaster mutex poisoned");
        channels
            .entry(stream.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::Draft;
    use k256::ecdsa::SigningKey;

    fn label() -> Label {
        let key = SigningKey::from_slice(&[0x33u8; 32]).unwrap();
        Draft::new("did:plc:a", "did:plc:x", "spam").sign(&key).unwrap()
    }

    #[tokio::test]
    async fn subscriber_receives_published_message() {
        let broadcaster = Broadcaster::new(8);
        let mut rx = broadcaster.subscribe(LABELS_STREAM);
        broadcaster.publish(LABELS_STREAM, 1, label());
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.seq, 1);
    }

    #[tokio::test]
    async fn lagging_subscriber_sees_lagged_error() {
        let broadcaster = Broadcaster::new(2);
        let mut rx = broadcaster.subscribe(LABELS_STREAM);
        for i in 0..10 {
            broadcaster.publish(LABELS_STREAM, i, label());
        }
        let err = rx.recv().await.unwrap_err();
        assert!(matches!(err, broadcast::error::RecvError::Lagged(_)));
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let broadcaster = Broadcaster::new(8);
        broadcaster.publish(LABELS_STREAM, 1, label());
    }

    #[tokio::test]
    async fn independent_subscribers_each_see_every_message() {
        let broadcaster = Broadcaster::new(8);
        let mut a = broadcaster.subscribe(LABELS_STREAM);
        let mut b = broadcaster.subscribe(LABELS_STREAM);
        broadcaster.publish(LABELS_STREAM, 1, label());
        assert_eq!(a.recv().await.unwrap().seq, 1);
        assert_eq!(b.recv().await.unwrap().seq, 1);
    }
}
