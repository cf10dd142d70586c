//! Process-local backend for tests and embedded use.
//!
//! The store side is a score-ordered map per feed name; the channel side
//! broadcasts over bounded channels. Publishers never block on slow
//! subscribers: a subscriber whose buffer is full is dropped instead.

use super::{AnnounceChannel, BackendResult, OrderedStore, Subscription};
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Default per-subscriber buffer before a slow subscriber is dropped.
const DEFAULT_BUFFER_SIZE: usize = 1000;

/// In-memory ordered store plus announcement channel.
///
/// A single instance plays both backend roles, so several [`Feed`]
/// values wired to the same instance see each other's writes and
/// announcements.
///
/// [`Feed`]: crate::Feed
pub struct MemoryBackend {
    /// Score-ordered entries per store key.
    stores: RwLock<HashMap<String, BTreeMap<i64, String>>>,

    /// Live subscriber senders per channel name.
    subscribers: RwLock<HashMap<String, Vec<Sender<String>>>>,

    /// Per-subscriber buffer size.
    buffer_size: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Create with a custom per-subscriber buffer.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(HashMap::new()),
            buffer_size,
        }
    }

    /// Number of live subscribers on a channel.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.subscribers.read().get(channel).map_or(0, Vec::len)
    }

    /// Number of entries stored under a key.
    pub fn entry_count(&self, key: &str) -> usize {
        self.stores.read().get(key).map_or(0, BTreeMap::len)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderedStore for MemoryBackend {
    fn write(&self, key: &str, score: i64, value: &str) -> BackendResult<()> {
        self.stores
            .write()
            .entry(key.to_string())
            .or_default()
            .insert(score, value.to_string());
        Ok(())
    }

    fn range_by_score(&self, key: &str, lo: i64, hi: i64) -> BackendResult<Vec<(i64, String)>> {
        let stores = self.stores.read();
        let entries = match stores.get(key) {
            Some(entries) => entries
                .range(lo..hi)
                .map(|(score, value)| (*score, value.clone()))
                .collect(),
            None => Vec::new(),
        };
        Ok(entries)
    }

    fn remove(&self, key: &str, score: i64) -> BackendResult<()> {
        if let Some(entries) = self.stores.write().get_mut(key) {
            entries.remove(&score);
        }
        Ok(())
    }
}

impl AnnounceChannel for MemoryBackend {
    fn publish(&self, channel: &str, token: &str) -> BackendResult<()> {
        let mut subscribers = self.subscribers.write();
        if let Some(senders) = subscribers.get_mut(channel) {
            // Drop subscribers that are gone or can't keep up.
            senders.retain(|sender| match sender.try_send(token.to_string()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
            });
        }
        Ok(())
    }

    fn subscribe(&self, channel: &str) -> BackendResult<Subscription> {
        let (sender, receiver) = bounded(self.buffer_size);
        self.subscribers
            .write()
            .entry(channel.to_string())
            .or_default()
            .push(sender);
        Ok(Subscription::new(receiver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_write_overwrites_at_score() {
        let backend = MemoryBackend::new();
        backend.write("feed", 10, "first").unwrap();
        backend.write("feed", 10, "second").unwrap();

        assert_eq!(backend.entry_count("feed"), 1);
        let entries = backend.range_by_score("feed", 10, 11).unwrap();
        assert_eq!(entries, vec![(10, "second".to_string())]);
    }

    #[test]
    fn test_range_is_half_open_and_ordered() {
        let backend = MemoryBackend::new();
        backend.write("feed", 3, "c").unwrap();
        backend.write("feed", 1, "a").unwrap();
        backend.write("feed", 2, "b").unwrap();

        let entries = backend.range_by_score("feed", 1, 3).unwrap();
        assert_eq!(
            entries,
            vec![(1, "a".to_string()), (2, "b".to_string())]
        );
    }

    #[test]
    fn test_range_on_unknown_key_is_empty() {
        let backend = MemoryBackend::new();
        assert!(backend.range_by_score("nope", 0, 100).unwrap().is_empty());
    }

    #[test]
    fn test_remove_absent_score_is_ok() {
        let backend = MemoryBackend::new();
        backend.remove("feed", 99).unwrap();
        backend.write("feed", 1, "a").unwrap();
        backend.remove("feed", 99).unwrap();
        assert_eq!(backend.entry_count("feed"), 1);
    }

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let backend = MemoryBackend::new();
        let first = backend.subscribe("room").unwrap();
        let second = backend.subscribe("room").unwrap();

        backend.publish("room", "push:1").unwrap();

        assert_eq!(first.recv_timeout(Duration::from_millis(100)).unwrap(), "push:1");
        assert_eq!(second.recv_timeout(Duration::from_millis(100)).unwrap(), "push:1");
    }

    #[test]
    fn test_publish_is_scoped_per_channel() {
        let backend = MemoryBackend::new();
        let other = backend.subscribe("other").unwrap();

        backend.publish("room", "push:1").unwrap();

        assert!(other.try_recv().is_err());
    }

    #[test]
    fn test_slow_subscriber_is_dropped() {
        let backend = MemoryBackend::with_buffer_size(2);
        let slow = backend.subscribe("room").unwrap();

        for i in 0..5 {
            backend.publish("room", &format!("push:{}", i)).unwrap();
        }

        assert_eq!(backend.subscriber_count("room"), 0);

        // The buffered tokens are still delivered, then the stream ends.
        assert_eq!(slow.recv().unwrap(), "push:0");
        assert_eq!(slow.recv().unwrap(), "push:1");
        assert!(slow.recv().is_err());
    }
}
