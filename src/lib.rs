//! # Synced Feed
//!
//! A synchronized, timestamp-ordered message feed. The authoritative
//! messages live in a shared ordered store; every mutation is announced
//! over a pub/sub channel so each interested process can keep a local
//! cache consistent without re-querying the store on every read.
//!
//! ## Core Concepts
//!
//! - **Feed**: a named, ordered sequence of messages plus a local cache
//!   and handles to the canonical store and announcement channel
//! - **Announcements**: tiny `verb:id` tokens broadcast after each
//!   mutation (`push:<id>`, `update:<id>`, `remove:<id>`)
//! - **Reconciliation**: folding a received announcement into the local
//!   cache with a point lookup against the canonical store
//!
//! ## Example
//!
//! ```ignore
//! use feedsync::{Feed, Listener, MemoryBackend};
//! use std::sync::Arc;
//!
//! let backend = Arc::new(MemoryBackend::new());
//! let feed = Arc::new(Feed::new("room", backend.clone(), backend.clone()));
//!
//! // Keep our own cache reconciled with our own (and everyone else's)
//! // mutations.
//! let listener = Listener::attach(feed.clone())?;
//!
//! let message = feed.push("Hello, world!")?;
//! feed.update(message.id, "Hello again!")?;
//! feed.remove(message.id)?;
//! ```

pub mod announce;
pub mod backend;
pub mod error;
pub mod feed;
pub mod listener;
pub mod types;

// Re-exports
pub use announce::{Announcement, Verb};
pub use backend::memory::MemoryBackend;
#[cfg(feature = "redis-backend")]
pub use backend::redis::RedisBackend;
pub use backend::{AnnounceChannel, BackendError, BackendResult, OrderedStore, Subscription};
pub use error::{FeedError, Result};
pub use feed::Feed;
pub use listener::Listener;
pub use types::{Message, MessageId};
