//! In-process [`KeyedStore`] backend with TTLs, atomic batches and keyspace notifications.

mod keyspace;

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use futures::{future::BoxFuture, stream::BoxStream};
use tokio::{
    sync::{Mutex, broadcast, broadcast::error::RecvError},
    task::JoinHandle,
    time::{Instant, interval, timeout},
};
use tracing::{debug, warn};

use self::keyspace::Keyspace;
use crate::dao::{
    keyed_store::{BatchOp, BatchReply, KeyedStore, Notification, glob_match},
    storage::{StorageError, StorageResult},
};

pub use self::keyspace::KEYSPACE_PREFIX;

/// Capacity of the notification channel. Subscribers that fall behind skip messages.
const NOTIFICATION_CAPACITY: usize = 4096;
/// How often expired keys are actively reclaimed.
const EXPIRY_TICK: Duration = Duration::from_millis(100);
/// Longest wait for the keyspace lock before the store is reported unhealthy.
const HEALTH_LOCK_TIMEOUT: Duration = Duration::from_millis(500);

/// Cheaply cloneable handle; clones share one keyspace and notification channel.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    keyspace: Mutex<Keyspace>,
    notifications: broadcast::Sender<Notification>,
}

impl MemoryInner {
    /// Reclaim expired keys and emit their `expired` events, returning how many were dropped.
    async fn purge_expired(&self) -> usize {
        let mut keyspace = self.keyspace.lock().await;
        let events = keyspace.purge_expired(Instant::now());
        let count = events.len();
        for event in events {
            let _ = self.notifications.send(event);
        }
        count
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty store. Active expiry only runs once [`MemoryStore::spawn_expiry`] is called.
    pub fn new() -> Self {
        let (notifications, _receiver) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            inner: Arc::new(MemoryInner {
                keyspace: Mutex::new(Keyspace::default()),
                notifications,
            }),
        }
    }

    /// Reclaim keys whose TTL has elapsed.
    pub async fn purge_expired(&self) -> usize {
        self.inner.purge_expired().await
    }

    /// Spawn the active expiration loop. The task ends once every store handle is dropped.
    pub fn spawn_expiry(&self) -> JoinHandle<()> {
        let weak: Weak<MemoryInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = interval(EXPIRY_TICK);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let reclaimed = inner.purge_expired().await;
                if reclaimed > 0 {
                    debug!(reclaimed, "expired keys reclaimed");
                }
            }
        })
    }
}

impl KeyedStore for MemoryStore {
    fn batch(&self, ops: Vec<BatchOp>) -> BoxFuture<'static, StorageResult<Vec<BatchReply>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let now = Instant::now();
            let subscribers = inner.notifications.receiver_count();
            let mut keyspace = inner.keyspace.lock().await;

            let mut events = Vec::new();
            let mut replies = Vec::with_capacity(ops.len());
            let mut failure = None;
            for op in ops {
                match keyspace.apply(op, now, subscribers, &mut events) {
                    Ok(reply) => replies.push(reply),
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                }
            }

            // Published while the keyspace is still locked so per-key order matches write order.
            for event in events {
                let _ = inner.notifications.send(event);
            }
            drop(keyspace);

            match failure {
                Some(err) => Err(err),
                None => Ok(replies),
            }
        })
    }

    fn scan(&self, pattern: &str) -> BoxFuture<'static, StorageResult<Vec<String>>> {
        let inner = self.inner.clone();
        let pattern = pattern.to_string();
        Box::pin(async move {
            let keyspace = inner.keyspace.lock().await;
            Ok(keyspace.scan(&pattern, Instant::now()))
        })
    }

    fn psubscribe(&self, pattern: &str) -> BoxStream<'static, Notification> {
        let mut receiver = self.inner.notifications.subscribe();
        let pattern = pattern.to_string();
        Box::pin(async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(notification) => {
                        if glob_match(&pattern, &notification.channel) {
                            yield notification;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(pattern = %pattern, skipped, "notification subscriber lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            match timeout(HEALTH_LOCK_TIMEOUT, inner.keyspace.lock()).await {
                Ok(_keyspace) => Ok(()),
                Err(elapsed) => Err(StorageError::unavailable(
                    format!("keyspace lock not acquired within {HEALTH_LOCK_TIMEOUT:?}"),
                    elapsed,
                )),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    fn hset_op(key: &str, field: &str, value: &str) -> BatchOp {
        BatchOp::HSet {
            key: key.into(),
            fields: vec![(field.into(), value.into())],
        }
    }

    #[tokio::test]
    async fn batch_replies_follow_issue_order() {
        let store = MemoryStore::new();
        let replies = store
            .batch(vec![
                BatchOp::SAdd {
                    key: "Room:1:Players".into(),
                    members: vec!["a".into(), "b".into()],
                },
                BatchOp::SRem {
                    key: "Room:1:Players".into(),
                    member: "a".into(),
                },
                hset_op("Player:a", "disconnected", "1"),
                BatchOp::SCard {
                    key: "Room:1:Players".into(),
                },
            ])
            .await
            .unwrap();

        assert_eq!(
            replies,
            vec![
                BatchReply::Int(2),
                BatchReply::Bool(true),
                BatchReply::Int(1),
                BatchReply::Int(1)
            ]
        );
    }

    #[tokio::test]
    async fn hash_fields_merge_and_read_back() {
        let store = MemoryStore::new();
        store
            .hset("Player:a", vec![("x".into(), "0.1".into()), ("y".into(), "0.2".into())])
            .await
            .unwrap();
        store.hset("Player:a", vec![("x".into(), "0.5".into())]).await.unwrap();

        let fields = store.hgetall("Player:a").await.unwrap();
        assert_eq!(fields.get("x").map(String::as_str), Some("0.5"));
        assert_eq!(fields.get("y").map(String::as_str), Some("0.2"));
        assert_eq!(store.hget("Player:a", "missing").await.unwrap(), None);
        assert!(store.hgetall("Player:none").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn wrong_type_is_rejected() {
        let store = MemoryStore::new();
        store.sadd("ActiveRooms", "123456").await.unwrap();
        assert!(store.hgetall("ActiveRooms").await.is_err());
    }

    #[tokio::test]
    async fn removing_last_member_deletes_set() {
        let store = MemoryStore::new();
        store.sadd("Room:1:Players", "a").await.unwrap();
        store.srem("Room:1:Players", "a").await.unwrap();
        assert!(!store.exists("Room:1:Players").await.unwrap());
        assert_eq!(store.scard("Room:1:Players").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn zadd_nx_keeps_existing_score() {
        let store = MemoryStore::new();
        store.zadd("Room:1:Leaderboard", "a", 30.0).await.unwrap();
        let replies = store
            .batch(vec![BatchOp::ZAddNx {
                key: "Room:1:Leaderboard".into(),
                member: "a".into(),
                score: 0.0,
            }])
            .await
            .unwrap();
        assert_eq!(replies, vec![BatchReply::Bool(false)]);
        assert_eq!(
            store.zrange("Room:1:Leaderboard").await.unwrap(),
            vec![("a".to_string(), 30.0)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_expires_keys_and_persist_cancels_it() {
        let store = MemoryStore::new();
        store.hset("Player:a", vec![("gameId".into(), "1".into())]).await.unwrap();
        store.hset("Player:b", vec![("gameId".into(), "1".into())]).await.unwrap();
        store.expire("Player:a", Duration::from_secs(10)).await.unwrap();
        store.expire("Player:b", Duration::from_secs(10)).await.unwrap();
        store
            .batch(vec![BatchOp::Persist { key: "Player:b".into() }])
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;

        assert!(!store.exists("Player:a").await.unwrap());
        assert!(store.exists("Player:b").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_emits_expired_events() {
        let store = MemoryStore::new();
        let mut events = store.psubscribe("__keyspace@0__:Player:*");
        store.set("Player:a:Changes", "Kicked", Some(Duration::from_secs(1))).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.purge_expired().await, 1);

        let first = events.next().await.unwrap();
        assert_eq!(first.payload, "set");
        let second = events.next().await.unwrap();
        assert_eq!(second.channel, "__keyspace@0__:Player:a:Changes");
        assert_eq!(second.payload, "expired");
    }

    #[tokio::test(start_paused = true)]
    async fn health_check_fails_while_the_keyspace_is_stuck() {
        let store = MemoryStore::new();
        assert!(store.health_check().await.is_ok());

        let held = store.inner.keyspace.lock().await;
        let err = store.health_check().await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable { .. }));

        drop(held);
        assert!(store.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn subscribers_only_see_matching_channels() {
        let store = MemoryStore::new();
        let mut chat = store.psubscribe("chat:*");
        store.publish("room:cleanup", "123456").await.unwrap();
        store.publish("chat:123456", "hello").await.unwrap();

        let received = chat.next().await.unwrap();
        assert_eq!(
            received,
            Notification {
                channel: "chat:123456".into(),
                payload: "hello".into(),
            }
        );
    }

    #[tokio::test]
    async fn scan_lists_matching_live_keys() {
        let store = MemoryStore::new();
        store.set("Player:a:Changes", "Join", None).await.unwrap();
        store.set("Player:a:Extra", "1", None).await.unwrap();
        store.set("Player:b:Changes", "Join", None).await.unwrap();

        assert_eq!(
            store.scan("Player:a:*").await.unwrap(),
            vec!["Player:a:Changes".to_string(), "Player:a:Extra".to_string()]
        );
    }

    #[tokio::test]
    async fn zincrby_accumulates_from_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.zincrby("Room:1:Leaderboard", "a", 10.0).await.unwrap(), 10.0);
        assert_eq!(store.zincrby("Room:1:Leaderboard", "a", 5.0).await.unwrap(), 15.0);
        assert_eq!(
            store.zrange("Room:1:Leaderboard").await.unwrap(),
            vec![("a".to_string(), 15.0)]
        );
    }
}
