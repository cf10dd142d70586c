//! Backend capability interfaces for the canonical store and the
//! announcement channel.
//!
//! The feed core never talks to a concrete backend; it consumes these
//! traits. [`memory::MemoryBackend`] is a process-local implementation
//! used in tests and embedded setups; the `redis-backend` feature adds
//! [`redis::RedisBackend`] for the real thing.

pub mod memory;
#[cfg(feature = "redis-backend")]
pub mod redis;

use crossbeam_channel::Receiver;
use thiserror::Error;

/// Transport-level failure reported by a backend.
#[derive(Clone, Debug, Error)]
#[error("{0}")]
pub struct BackendError(pub String);

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        BackendError(message.into())
    }
}

/// Result type for backend operations.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// The canonical ordered store holding a feed's authoritative messages,
/// keyed by feed name and sorted by score.
///
/// Scores are unique sort keys: writing to an occupied score overwrites
/// the value stored there rather than accumulating a duplicate.
pub trait OrderedStore: Send + Sync {
    /// Write `value` at `score` under `key`, overwriting any existing
    /// entry at that score.
    fn write(&self, key: &str, score: i64, value: &str) -> BackendResult<()>;

    /// Entries with `lo <= score < hi` under `key`, in ascending score
    /// order.
    fn range_by_score(&self, key: &str, lo: i64, hi: i64) -> BackendResult<Vec<(i64, String)>>;

    /// Remove the entry at `score` under `key`. Removing an absent score
    /// is not an error.
    fn remove(&self, key: &str, score: i64) -> BackendResult<()>;
}

/// The pub/sub channel announcements travel over.
pub trait AnnounceChannel: Send + Sync {
    /// Broadcast `token` to every current subscriber of `channel`.
    fn publish(&self, channel: &str, token: &str) -> BackendResult<()>;

    /// Open a live subscription to `channel`.
    fn subscribe(&self, channel: &str) -> BackendResult<Subscription>;
}

/// A live subscription to an announcement channel.
///
/// Tokens arrive in publish order. The stream ends when the backend
/// closes the channel or drops this subscriber.
pub struct Subscription {
    receiver: Receiver<String>,
}

impl Subscription {
    /// Wrap a raw token stream.
    pub fn new(receiver: Receiver<String>) -> Self {
        Self { receiver }
    }

    /// Receive the next token (blocking).
    pub fn recv(&self) -> Result<String, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a token (non-blocking).
    pub fn try_recv(&self) -> Result<String, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<String, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Iterate tokens until the stream ends.
    pub fn iter(&self) -> impl Iterator<Item = String> + '_ {
        self.receiver.iter()
    }
}
