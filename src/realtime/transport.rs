//! Push-channel boundary and the in-process hub.
//!
//! DESIGN
//! ======
//! A transport hands out one bounded receiver of encoded broadcast frames
//! per channel name. Subscribing to a name that is already open replaces the
//! previous receiver (its sender is dropped, so the old reader task ends).
//! `unsubscribe` is idempotent.
//!
//! [`MemoryHub`] is the process-local implementation: publishers encode a
//! [`frames::Broadcast`] once and it is fanned out to every live subscriber
//! of that channel. Subscribers whose queue is full miss the frame; closed
//! subscribers are pruned on publish.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::ErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("subscribe to {channel} failed: {reason}")]
    Subscribe { channel: String, reason: String },
    #[error("transport closed")]
    Closed,
}

impl ErrorCode for TransportError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Subscribe { .. } => "E_TRANSPORT_SUBSCRIBE",
            Self::Closed => "E_TRANSPORT_CLOSED",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Subscribe { .. })
    }
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Open `channel` and return the receiving end of its frame queue.
    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<Vec<u8>>, TransportError>;

    /// Close `channel`. Closing an unknown channel is a no-op.
    async fn unsubscribe(&self, channel: &str);
}

// =============================================================================
// MEMORY HUB
// =============================================================================

pub struct MemoryHub {
    capacity: usize,
    channels: Mutex<HashMap<String, mpsc::Sender<Vec<u8>>>>,
    closed: AtomicBool,
}

impl MemoryHub {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, mpsc::Sender<Vec<u8>>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Encode and deliver `broadcast` on its channel. Returns 1 if a live
    /// subscriber accepted the frame, 0 otherwise.
    pub fn publish(&self, broadcast: &frames::Broadcast) -> usize {
        self.publish_raw(&broadcast.channel, frames::encode_broadcast(broadcast))
    }

    /// Deliver pre-encoded bytes on `channel`.
    pub fn publish_raw(&self, channel: &str, bytes: Vec<u8>) -> usize {
        let mut channels = self.lock();
        let Some(sender) = channels.get(channel) else {
            debug!(channel, "publish with no subscriber");
            return 0;
        };
        match sender.try_send(bytes) {
            Ok(()) => 1,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(channel, "subscriber queue full; frame dropped");
                0
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                channels.remove(channel);
                0
            }
        }
    }

    /// Names of channels with a live subscriber, sorted.
    #[must_use]
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, sender)| !sender.is_closed())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Refuse every future subscribe and drop current subscribers.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.lock().clear();
    }
}

#[async_trait]
impl PushTransport for MemoryHub {
    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<Vec<u8>>, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let (tx, rx) = mpsc::channel(self.capacity);
        self.lock().insert(channel.to_string(), tx);
        Ok(rx)
    }

    async fn unsubscribe(&self, channel: &str) {
        self.lock().remove(channel);
    }
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
