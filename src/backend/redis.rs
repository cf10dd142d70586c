//! Redis-backed store and announcement channel.
//!
//! Messages live in a sorted set keyed by the feed name with the message
//! id as score; announcements travel over Redis pub/sub on a channel of
//! the same name. Writes clear the target score range before `ZADD` so
//! an update with a changed body replaces the old member instead of
//! accumulating a second one at the same score.

use super::{AnnounceChannel, BackendError, BackendResult, OrderedStore, Subscription};
use crossbeam_channel::bounded;
use parking_lot::Mutex;
use redis::{Client, Connection};
use std::thread;

/// Buffer between the pub/sub pump thread and a [`Subscription`].
const SUBSCRIPTION_BUFFER_SIZE: usize = 1000;

/// Redis implementation of both backend roles.
///
/// One command connection is shared (serialized by a mutex) across all
/// store and publish calls; each subscription gets a dedicated
/// connection pumped by a background thread. Do not point one instance
/// at unrelated feed names unless the deployment is known to tolerate
/// the shared connection.
pub struct RedisBackend {
    client: Client,
    conn: Mutex<Connection>,
}

impl RedisBackend {
    /// Connect to a Redis endpoint, e.g. `redis://127.0.0.1:6379`.
    pub fn connect(url: &str) -> BackendResult<Self> {
        let client = Client::open(url).map_err(wire_err)?;
        let conn = client.get_connection().map_err(wire_err)?;
        Ok(Self {
            client,
            conn: Mutex::new(conn),
        })
    }
}

fn wire_err(err: redis::RedisError) -> BackendError {
    BackendError::new(err.to_string())
}

impl OrderedStore for RedisBackend {
    fn write(&self, key: &str, score: i64, value: &str) -> BackendResult<()> {
        let mut conn = self.conn.lock();
        // One value per score: clear the slot, then insert, atomically.
        redis::pipe()
            .atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg(score)
            .arg(score)
            .ignore()
            .cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(value)
            .ignore()
            .query::<()>(&mut *conn)
            .map_err(wire_err)
    }

    fn range_by_score(&self, key: &str, lo: i64, hi: i64) -> BackendResult<Vec<(i64, String)>> {
        let mut conn = self.conn.lock();
        // Exclusive upper bound matches the trait's half-open range.
        let reply: Vec<(String, i64)> = redis::cmd("ZRANGEBYSCORE")
            .arg(key)
            .arg(lo)
            .arg(format!("({}", hi))
            .arg("WITHSCORES")
            .query(&mut *conn)
            .map_err(wire_err)?;
        Ok(reply
            .into_iter()
            .map(|(value, score)| (score, value))
            .collect())
    }

    fn remove(&self, key: &str, score: i64) -> BackendResult<()> {
        let mut conn = self.conn.lock();
        redis::cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg(score)
            .arg(score)
            .query::<()>(&mut *conn)
            .map_err(wire_err)
    }
}

impl AnnounceChannel for RedisBackend {
    fn publish(&self, channel: &str, token: &str) -> BackendResult<()> {
        let mut conn = self.conn.lock();
        redis::cmd("PUBLISH")
            .arg(channel)
            .arg(token)
            .query::<()>(&mut *conn)
            .map_err(wire_err)
    }

    fn subscribe(&self, channel: &str) -> BackendResult<Subscription> {
        let mut conn = self.client.get_connection().map_err(wire_err)?;
        let channel = channel.to_string();
        let (sender, receiver) = bounded(SUBSCRIPTION_BUFFER_SIZE);

        thread::spawn(move || {
            let mut pubsub = conn.as_pubsub();
            if pubsub.subscribe(&channel).is_err() {
                return;
            }
            loop {
                let message = match pubsub.get_message() {
                    Ok(message) => message,
                    Err(_) => break,
                };
                let token: String = match message.get_payload() {
                    Ok(token) => token,
                    Err(_) => continue,
                };
                if sender.send(token).is_err() {
                    break;
                }
            }
        });

        Ok(Subscription::new(receiver))
    }
}
