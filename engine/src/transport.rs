use bytes::Bytes;
use tabletop_shared::MapEvent;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{EngineError, Result};

/// Minimal publish side of a local pub/sub channel.
///
/// The subscribe side is transport specific (a broadcast receiver, a browser
/// `onmessage` callback); every subscriber hands raw frames to
/// [`MapStore::receive_frame`](crate::store::MapStore::receive_frame).
pub trait Transport {
    fn publish(&self, frame: Bytes) -> Result<()>;
}

/// Serialize an envelope once; the same bytes go to every subscriber.
pub fn encode_frame(event: &MapEvent) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(event)?))
}

pub fn decode_frame(frame: &[u8]) -> Result<MapEvent> {
    Ok(serde_json::from_slice(frame)?)
}

/// In-process bus for single-process hosts and tests.
#[derive(Debug, Clone)]
pub struct LocalBus {
    tx: broadcast::Sender<Bytes>,
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Transport for LocalBus {
    fn publish(&self, frame: Bytes) -> Result<()> {
        match self.tx.send(frame) {
            Ok(receivers) => {
                debug!(receivers, "published map snapshot");
                Ok(())
            }
            // Nobody listening yet; the next republish seeds late subscribers.
            Err(_) => Ok(()),
        }
    }
}

/// Transport that always fails, standing in for an unsupported context.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClosedTransport;

impl Transport for ClosedTransport {
    fn publish(&self, _frame: Bytes) -> Result<()> {
        Err(EngineError::Publish("channel closed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::{LocalBus, Transport, decode_frame, encode_frame};
    use bytes::Bytes;
    use tabletop_shared::{MapEvent, MapState};

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let bus = LocalBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus.publish(Bytes::from_static(b"{}")).is_ok());
    }

    #[tokio::test]
    async fn subscribers_receive_frames_in_publish_order() {
        let bus = LocalBus::new(8);
        let mut rx = bus.subscribe();
        for seq in 1..=3u64 {
            let frame = encode_frame(&MapEvent::MapStateUpdate {
                source: String::new(),
                seq,
                timestamp: String::new(),
                payload: MapState::default(),
            })
            .expect("encode");
            bus.publish(frame).expect("publish");
        }
        for expected in 1..=3u64 {
            let frame = rx.recv().await.expect("frame");
            assert_eq!(decode_frame(&frame).expect("decode").seq(), expected);
        }
    }

    #[test]
    fn garbage_frames_fail_to_decode() {
        assert!(decode_frame(b"not json").is_err());
    }
}
