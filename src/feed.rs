//! The feed core: mutations against the canonical store and
//! reconciliation of the local cache.

use crate::announce::{Announcement, Verb};
use crate::backend::{AnnounceChannel, BackendResult, OrderedStore, Subscription};
use crate::error::{FeedError, Result};
use crate::types::{Message, MessageId};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// A synchronized feed bound to one name and one backend.
///
/// Mutations ([`push`], [`update`], [`remove`]) write to the canonical
/// store and then announce the change; reconciliation operations
/// ([`apply_push`], [`apply_update`], [`apply_remove`]) fold announced
/// changes into the local cache. The cache is a best-effort mirror of
/// the canonical store, never authoritative.
///
/// Mutations may be called from any number of threads; a mutation lock
/// serializes each full write-then-announce pair so store state changes
/// and their announcements are never reordered relative to each other
/// from this instance. Reconciliation runs without that lock and only
/// touches the cache map, which is synchronized separately.
///
/// [`push`]: Feed::push
/// [`update`]: Feed::update
/// [`remove`]: Feed::remove
/// [`apply_push`]: Feed::apply_push
/// [`apply_update`]: Feed::apply_update
/// [`apply_remove`]: Feed::apply_remove
pub struct Feed {
    /// Feed name; identifies both the store key and the announcement
    /// channel.
    name: String,

    /// Local mirror of a subset of the canonical store.
    cache: RwLock<HashMap<MessageId, Message>>,

    /// Canonical ordered store handle.
    store: Arc<dyn OrderedStore>,

    /// Announcement channel handle.
    channel: Arc<dyn AnnounceChannel>,

    /// Serializes caller-initiated mutations across their full
    /// write-then-announce sequence.
    mutation_lock: Mutex<()>,

    /// Highest id handed out so far. Written only with `mutation_lock`
    /// held.
    last_id: AtomicI64,
}

impl Feed {
    /// Bind a feed to a name and backend handles.
    ///
    /// The handles are owned for the life of the feed. Sharing one
    /// backend handle across feeds with different names is only safe if
    /// the backend multiplexes connections; that is a backend contract,
    /// not something the feed manages.
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn OrderedStore>,
        channel: Arc<dyn AnnounceChannel>,
    ) -> Self {
        Self {
            name: name.into(),
            cache: RwLock::new(HashMap::new()),
            store,
            channel,
            mutation_lock: Mutex::new(()),
            last_id: AtomicI64::new(0),
        }
    }

    /// The feed's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Open a subscription to this feed's announcement channel.
    ///
    /// Feeding the returned stream to a [`Listener`] keeps this
    /// instance's cache reconciled, including with its own mutations.
    ///
    /// [`Listener`]: crate::Listener
    pub fn subscribe(&self) -> BackendResult<Subscription> {
        self.channel.subscribe(&self.name)
    }

    // --- Mutations ---

    /// Append a new message to the feed.
    ///
    /// Generates a nanosecond-timestamp id, writes the body to the
    /// canonical store, then publishes `push:<id>`. A store failure
    /// aborts before any announcement; a publish failure is surfaced as
    /// [`FeedError::Announce`] but the durable write stands. The local
    /// cache is not touched here; it catches up when the announcement is
    /// reconciled back.
    pub fn push(&self, body: impl Into<String>) -> Result<Message> {
        let _lock = self.mutation_lock.lock();

        let message = Message {
            id: self.next_id(),
            body: body.into(),
        };
        self.store
            .write(&self.name, message.id.0, &message.body)
            .map_err(FeedError::StoreWrite)?;
        self.announce(Verb::Push, message.id)?;

        debug!(feed = %self.name, id = %message.id, "pushed message");
        Ok(message)
    }

    /// Overwrite the body of an existing message, keeping its id and
    /// therefore its position in the feed.
    ///
    /// The id is not re-timestamped. Writing to an id the store has
    /// never seen creates the entry; the protocol is idempotent on id,
    /// so this is accepted rather than detected.
    pub fn update(&self, id: MessageId, body: impl Into<String>) -> Result<()> {
        let _lock = self.mutation_lock.lock();

        self.store
            .write(&self.name, id.0, &body.into())
            .map_err(FeedError::StoreWrite)?;
        self.announce(Verb::Update, id)?;

        debug!(feed = %self.name, %id, "updated message");
        Ok(())
    }

    /// Remove a message from the feed.
    ///
    /// The issuing instance drops its own cache entry as soon as the
    /// store removal succeeds, rather than waiting for the announcement
    /// to echo back, so an unsubscribed instance never serves a message
    /// it already removed. "Not found" is not distinguished from a
    /// successful removal.
    pub fn remove(&self, id: MessageId) -> Result<()> {
        let _lock = self.mutation_lock.lock();

        self.store
            .remove(&self.name, id.0)
            .map_err(FeedError::StoreWrite)?;
        self.cache.write().remove(&id);
        self.announce(Verb::Remove, id)?;

        debug!(feed = %self.name, %id, "removed message");
        Ok(())
    }

    /// Publish an announcement for a committed write. Called with the
    /// mutation lock held.
    fn announce(&self, verb: Verb, id: MessageId) -> Result<()> {
        let token = Announcement::new(verb, id).encode();
        self.channel
            .publish(&self.name, &token)
            .map_err(|source| FeedError::Announce { token, source })
    }

    /// Next message id: current wall-clock nanoseconds, nudged past the
    /// previous id when the clock has not advanced between calls. Called
    /// with the mutation lock held.
    fn next_id(&self) -> MessageId {
        let now = MessageId::now().0;
        let prev = self.last_id.load(Ordering::Relaxed);
        let id = now.max(prev + 1);
        self.last_id.store(id, Ordering::Relaxed);
        MessageId(id)
    }

    // --- Reconciliation ---

    /// Fetch an announced message from the canonical store and insert it
    /// into the cache.
    ///
    /// Returns [`FeedError::MessageNotFound`] when the id is gone by the
    /// time of the lookup (removed between announcement and
    /// reconciliation); the cache is left without the entry. Callers
    /// driving a subscription loop should treat that as a skip, not a
    /// stop.
    pub fn apply_push(&self, id: MessageId) -> Result<Message> {
        let message = self.get_message(id)?;
        self.cache.write().insert(id, message.clone());
        debug!(feed = %self.name, %id, "reconciled into cache");
        Ok(message)
    }

    /// Same store read and cache overwrite as [`Feed::apply_push`]; kept
    /// separate so call sites mirror the announcement verbs.
    pub fn apply_update(&self, id: MessageId) -> Result<Message> {
        self.apply_push(id)
    }

    /// Drop the cache entry for a removed message.
    ///
    /// Idempotent; an id that was never cached is a no-op.
    pub fn apply_remove(&self, id: MessageId) {
        self.cache.write().remove(&id);
    }

    /// Apply a decoded announcement to the local cache.
    pub fn apply(&self, announcement: Announcement) -> Result<()> {
        match announcement.verb {
            Verb::Push => self.apply_push(announcement.id).map(|_| ()),
            Verb::Update => self.apply_update(announcement.id).map(|_| ()),
            Verb::Remove => {
                self.apply_remove(announcement.id);
                Ok(())
            }
        }
    }

    // --- Read Paths ---

    /// Read the message at `id` from the canonical store.
    ///
    /// A point lookup: the store is asked for the half-open score range
    /// `[id, id + 1)` and the first entry wins. Ids are unique sort
    /// keys, so the range holds at most one entry.
    pub fn get_message(&self, id: MessageId) -> Result<Message> {
        let entries = self
            .store
            .range_by_score(&self.name, id.0, id.0.saturating_add(1))
            .map_err(FeedError::StoreRead)?;
        match entries.into_iter().next() {
            Some((_, body)) => Ok(Message { id, body }),
            None => Err(FeedError::MessageNotFound(id)),
        }
    }

    /// Cached copy of a message, if this instance has reconciled one.
    pub fn cached(&self, id: MessageId) -> Option<Message> {
        self.cache.read().get(&id).cloned()
    }

    /// All cached messages in feed order.
    pub fn cached_messages(&self) -> Vec<Message> {
        let mut messages: Vec<Message> = self.cache.read().values().cloned().collect();
        messages.sort_by_key(|message| message.id);
        messages
    }

    /// Number of cached messages.
    pub fn cache_len(&self) -> usize {
        self.cache.read().len()
    }

    /// Rebuild the cache from a full scan of the canonical store.
    ///
    /// Heals a cache that missed announcements: a restarted process, or
    /// a mutation whose announcement failed after the durable write.
    /// Returns the number of messages now cached.
    pub fn resync(&self) -> Result<usize> {
        let entries = self
            .store
            .range_by_score(&self.name, i64::MIN, i64::MAX)
            .map_err(FeedError::StoreRead)?;

        let mut cache = self.cache.write();
        cache.clear();
        for (score, body) in entries {
            let id = MessageId(score);
            cache.insert(id, Message { id, body });
        }
        debug!(feed = %self.name, count = cache.len(), "resynced cache");
        Ok(cache.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;

    fn test_feed() -> (Arc<MemoryBackend>, Feed) {
        let backend = Arc::new(MemoryBackend::new());
        let feed = Feed::new("room", backend.clone(), backend.clone());
        (backend, feed)
    }

    #[test]
    fn test_push_round_trip() {
        let (_backend, feed) = test_feed();

        let message = feed.push("hello").unwrap();
        let read = feed.get_message(message.id).unwrap();
        assert_eq!(read.body, "hello");
        assert_eq!(read.id, message.id);
    }

    #[test]
    fn test_push_does_not_touch_cache() {
        let (_backend, feed) = test_feed();

        let message = feed.push("hello").unwrap();
        assert!(feed.cached(message.id).is_none());
        assert_eq!(feed.cache_len(), 0);
    }

    #[test]
    fn test_sequential_pushes_have_strictly_increasing_ids() {
        let (_backend, feed) = test_feed();

        let mut prev = feed.push("0").unwrap().id;
        for i in 1..100 {
            let id = feed.push(i.to_string()).unwrap().id;
            assert!(id > prev, "{} not greater than {}", id, prev);
            prev = id;
        }
    }

    #[test]
    fn test_update_keeps_id_and_overwrites() {
        let (backend, feed) = test_feed();

        let message = feed.push("before").unwrap();
        feed.update(message.id, "after").unwrap();

        assert_eq!(feed.get_message(message.id).unwrap().body, "after");
        assert_eq!(backend.entry_count("room"), 1);
    }

    #[test]
    fn test_remove_drops_issuing_cache_entry_without_listener() {
        let (_backend, feed) = test_feed();

        let message = feed.push("doomed").unwrap();
        feed.apply_push(message.id).unwrap();
        assert!(feed.cached(message.id).is_some());

        feed.remove(message.id).unwrap();
        assert!(feed.cached(message.id).is_none());
        assert!(matches!(
            feed.get_message(message.id),
            Err(FeedError::MessageNotFound(_))
        ));
    }

    #[test]
    fn test_apply_remove_is_idempotent() {
        let (_backend, feed) = test_feed();

        let message = feed.push("here").unwrap();
        feed.apply_push(message.id).unwrap();

        feed.apply_remove(message.id);
        assert_eq!(feed.cache_len(), 0);
        feed.apply_remove(message.id);
        assert_eq!(feed.cache_len(), 0);
    }

    #[test]
    fn test_apply_push_after_removal_misses_cleanly() {
        let (_backend, feed) = test_feed();

        let message = feed.push("gone").unwrap();
        feed.remove(message.id).unwrap();

        let result = feed.apply_push(message.id);
        assert!(matches!(result, Err(FeedError::MessageNotFound(_))));
        assert!(feed.cached(message.id).is_none());
    }

    #[test]
    fn test_resync_rebuilds_cache_from_store() {
        let (_backend, feed) = test_feed();

        let a = feed.push("a").unwrap();
        let b = feed.push("b").unwrap();
        let c = feed.push("c").unwrap();
        assert_eq!(feed.cache_len(), 0);

        assert_eq!(feed.resync().unwrap(), 3);
        let bodies: Vec<String> = feed
            .cached_messages()
            .into_iter()
            .map(|m| m.body)
            .collect();
        assert_eq!(bodies, vec!["a", "b", "c"]);
        assert_eq!(feed.cached(a.id).unwrap().body, "a");
        assert_eq!(feed.cached(b.id).unwrap().body, "b");
        assert_eq!(feed.cached(c.id).unwrap().body, "c");
    }
}
