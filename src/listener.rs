//! Announcement listener: drives cache reconciliation from a
//! subscription stream.
//!
//! The listener decodes each received token and invokes the matching
//! reconciliation operation on its feed. Malformed tokens are dropped
//! and reconciliation misses are logged; neither stops the loop. The
//! loop ends only when the subscription's stream closes.

use crate::announce::Announcement;
use crate::backend::{BackendResult, Subscription};
use crate::feed::Feed;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::warn;

/// Background thread pumping a subscription into feed reconciliation.
pub struct Listener {
    thread: Option<JoinHandle<()>>,
}

impl Listener {
    /// Subscribe `feed` to its own announcement channel and start
    /// reconciling.
    ///
    /// This is how an instance keeps its cache consistent with its own
    /// mutations as well as everyone else's.
    pub fn attach(feed: Arc<Feed>) -> BackendResult<Self> {
        let subscription = feed.subscribe()?;
        Ok(Self::spawn(feed, subscription))
    }

    /// Start reconciling an existing subscription onto `feed`.
    pub fn spawn(feed: Arc<Feed>, subscription: Subscription) -> Self {
        let thread = thread::spawn(move || run(&feed, &subscription));
        Self {
            thread: Some(thread),
        }
    }

    /// Wait for the listener thread to exit. It exits when the
    /// subscription's stream closes.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Process tokens until the subscription closes.
pub fn run(feed: &Feed, subscription: &Subscription) {
    for token in subscription.iter() {
        handle_token(feed, &token);
    }
}

fn handle_token(feed: &Feed, token: &str) {
    let announcement = match Announcement::decode(token) {
        Ok(announcement) => announcement,
        Err(err) => {
            warn!(feed = %feed.name(), %err, "dropping announcement");
            return;
        }
    };

    // The entry can be gone again by the time we look it up; skip it and
    // keep consuming.
    if let Err(err) = feed.apply(announcement) {
        warn!(feed = %feed.name(), %announcement, %err, "reconciliation miss");
    }
}
