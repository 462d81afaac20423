//! Keyed store abstraction: hashes, sets, sorted sets, TTLs, atomic batches and
//! pattern subscriptions.

pub mod memory;
mod pattern;

use std::{collections::HashMap, time::Duration};

use futures::{future::BoxFuture, stream::BoxStream};

use crate::dao::storage::{StorageError, StorageResult};

pub use self::pattern::glob_match;

/// Field/value mapping stored under a hash key.
pub type Fields = HashMap<String, String>;

/// Message delivered to pattern subscribers, either from `publish` or from a
/// keyspace mutation (`__keyspace@0__:<key>` with the operation as payload).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Channel the message was published on.
    pub channel: String,
    /// Published payload, or the operation name for keyspace events.
    pub payload: String,
}

/// Single operation of an atomic batch. Every `key` names the entry the operation targets.
#[derive(Debug, Clone)]
pub enum BatchOp {
    /// Write hash fields, creating the hash when missing.
    HSet {
        /// Target key.
        key: String,
        /// Field/value pairs to write.
        fields: Vec<(String, String)>,
    },
    /// Read a whole hash.
    HGetAll {
        /// Target key.
        key: String,
    },
    /// Read selected hash fields; missing fields reply `None`.
    HMGet {
        /// Target key.
        key: String,
        /// Fields to read, in reply order.
        fields: Vec<String>,
    },
    /// Read a string value.
    Get {
        /// Target key.
        key: String,
    },
    /// Overwrite a string value, optionally with a TTL.
    Set {
        /// Target key.
        key: String,
        /// New value.
        value: String,
        /// Lifetime of the key; `None` keeps it until deleted.
        ttl: Option<Duration>,
    },
    /// Delete a key of any kind.
    Del {
        /// Target key.
        key: String,
    },
    /// Whether a live key exists.
    Exists {
        /// Target key.
        key: String,
    },
    /// Add members to a set.
    SAdd {
        /// Target key.
        key: String,
        /// Members to add.
        members: Vec<String>,
    },
    /// Remove one member from a set.
    SRem {
        /// Target key.
        key: String,
        /// Member to remove.
        member: String,
    },
    /// List set members in insertion order.
    SMembers {
        /// Target key.
        key: String,
    },
    /// Count set members.
    SCard {
        /// Target key.
        key: String,
    },
    /// Set a member's score in a sorted set.
    ZAdd {
        /// Target key.
        key: String,
        /// Ranked member.
        member: String,
        /// New score.
        score: f64,
    },
    /// Adds the member only when it is not ranked yet (keeps the existing score).
    ZAddNx {
        /// Target key.
        key: String,
        /// Ranked member.
        member: String,
        /// Score used when the member is new.
        score: f64,
    },
    /// Adds `delta` to the member's score (starting from 0) and replies with the new score.
    ZIncrBy {
        /// Target key.
        key: String,
        /// Ranked member.
        member: String,
        /// Amount added to the score.
        delta: f64,
    },
    /// List a sorted set by ascending score.
    ZRange {
        /// Target key.
        key: String,
    },
    /// Give an existing key a TTL.
    Expire {
        /// Target key.
        key: String,
        /// Lifetime from now.
        ttl: Duration,
    },
    /// Drop the TTL of a key.
    Persist {
        /// Target key.
        key: String,
    },
    /// Deliver a message to channel subscribers.
    Publish {
        /// Destination channel.
        channel: String,
        /// Message body.
        payload: String,
    },
}

/// Result of a [`BatchOp`], returned in issue order by [`KeyedStore::batch`].
///
/// The `into_*` helpers read a reply as the expected kind and fall back to an
/// empty value on any other kind.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchReply {
    /// Write acknowledged.
    Ok,
    /// Count or integer result.
    Int(i64),
    /// Existence or removal flag.
    Bool(bool),
    /// Single string value, `None` when absent.
    Value(Option<String>),
    /// Several optional values, in request order.
    Values(Vec<Option<String>>),
    /// Whole hash.
    Hash(Fields),
    /// Set members.
    Members(Vec<String>),
    /// Sorted set entries by ascending score.
    Scored(Vec<(String, f64)>),
    /// Score after an increment.
    Float(f64),
}

impl BatchReply {
    /// Integer reply; flags read as 0 or 1.
    pub fn into_int(self) -> i64 {
        match self {
            BatchReply::Int(value) => value,
            BatchReply::Bool(value) => value as i64,
            _ => 0,
        }
    }
    /// Flag reply; positive integers read as `true`.
    pub fn into_bool(self) -> bool {
        match self {
            BatchReply::Bool(value) => value,
            BatchReply::Int(value) => value > 0,
            _ => false,
        }
    }

    /// Single value reply.
    pub fn into_value(self) -> Option<String> {
        match self {
            BatchReply::Value(value) => value,
            _ => None,
        }
    }

    /// Multi-value reply.
    pub fn into_values(self) -> Vec<Option<String>> {
        match self {
            BatchReply::Values(values) => values,
            _ => Vec::new(),
        }
    }

    /// Hash reply.
    pub fn into_hash(self) -> Fields {
        match self {
            BatchReply::Hash(fields) => fields,
            _ => Fields::new(),
        }
    }

    /// Set members reply.
    pub fn into_members(self) -> Vec<String> {
        match self {
            BatchReply::Members(members) => members,
            _ => Vec::new(),
        }
    }

    /// Score reply; integers are widened.
    pub fn into_float(self) -> f64 {
        match self {
            BatchReply::Float(value) => value,
            BatchReply::Int(value) => value as f64,
            _ => 0.0,
        }
    }

    /// Sorted set reply.
    pub fn into_scored(self) -> Vec<(String, f64)> {
        match self {
            BatchReply::Scored(entries) => entries,
            _ => Vec::new(),
        }
    }
}

/// Typed access to the remote mapping/set/sorted-set store holding all room and
/// player state.
///
/// Backends only implement [`batch`](KeyedStore::batch) plus the streaming and
/// scanning primitives; single operations are one-element batches.
pub trait KeyedStore: Send + Sync {
    /// Apply every operation atomically, returning replies in issue order.
    fn batch(&self, ops: Vec<BatchOp>) -> BoxFuture<'static, StorageResult<Vec<BatchReply>>>;
    /// List live keys matching a glob pattern.
    fn scan(&self, pattern: &str) -> BoxFuture<'static, StorageResult<Vec<String>>>;
    /// Subscribe to published messages and keyspace events whose channel matches `pattern`.
    fn psubscribe(&self, pattern: &str) -> BoxStream<'static, Notification>;
    /// Fail when the backend cannot serve requests right now.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;

    /// Whole hash, empty when the key is missing.
    fn hgetall(&self, key: &str) -> BoxFuture<'static, StorageResult<Fields>> {
        single(self, BatchOp::HGetAll { key: key.into() }, BatchReply::into_hash)
    }

    /// One hash field.
    fn hget(&self, key: &str, field: &str) -> BoxFuture<'static, StorageResult<Option<String>>> {
        let op = BatchOp::HMGet {
            key: key.into(),
            fields: vec![field.into()],
        };
        single(self, op, |reply| reply.into_values().into_iter().flatten().next())
    }

    /// Write hash fields.
    fn hset(&self, key: &str, fields: Vec<(String, String)>) -> BoxFuture<'static, StorageResult<()>> {
        single(self, BatchOp::HSet { key: key.into(), fields }, |_| ())
    }

    /// String value.
    fn get(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<String>>> {
        single(self, BatchOp::Get { key: key.into() }, BatchReply::into_value)
    }

    /// Overwrite a string value.
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let op = BatchOp::Set {
            key: key.into(),
            value: value.into(),
            ttl,
        };
        single(self, op, |_| ())
    }

    /// Delete a key, replying whether it existed.
    fn del(&self, key: &str) -> BoxFuture<'static, StorageResult<bool>> {
        single(self, BatchOp::Del { key: key.into() }, BatchReply::into_bool)
    }

    /// Whether a live key exists.
    fn exists(&self, key: &str) -> BoxFuture<'static, StorageResult<bool>> {
        single(self, BatchOp::Exists { key: key.into() }, BatchReply::into_bool)
    }

    /// Add one set member, replying whether it was new.
    fn sadd(&self, key: &str, member: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let op = BatchOp::SAdd {
            key: key.into(),
            members: vec![member.into()],
        };
        single(self, op, BatchReply::into_bool)
    }

    /// Remove one set member, replying whether it was present.
    fn srem(&self, key: &str, member: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let op = BatchOp::SRem {
            key: key.into(),
            member: member.into(),
        };
        single(self, op, BatchReply::into_bool)
    }

    /// Set members in insertion order.
    fn smembers(&self, key: &str) -> BoxFuture<'static, StorageResult<Vec<String>>> {
        single(self, BatchOp::SMembers { key: key.into() }, BatchReply::into_members)
    }

    /// Set size.
    fn scard(&self, key: &str) -> BoxFuture<'static, StorageResult<i64>> {
        single(self, BatchOp::SCard { key: key.into() }, BatchReply::into_int)
    }

    /// Set a sorted set score.
    fn zadd(&self, key: &str, member: &str, score: f64) -> BoxFuture<'static, StorageResult<()>> {
        let op = BatchOp::ZAdd {
            key: key.into(),
            member: member.into(),
            score,
        };
        single(self, op, |_| ())
    }

    /// Increment a sorted set score, replying with the new score.
    fn zincrby(&self, key: &str, member: &str, delta: f64) -> BoxFuture<'static, StorageResult<f64>> {
        let op = BatchOp::ZIncrBy {
            key: key.into(),
            member: member.into(),
            delta,
        };
        single(self, op, BatchReply::into_float)
    }

    /// Members ordered by ascending score.
    fn zrange(&self, key: &str) -> BoxFuture<'static, StorageResult<Vec<(String, f64)>>> {
        single(self, BatchOp::ZRange { key: key.into() }, BatchReply::into_scored)
    }

    /// Give a key a TTL, replying whether the key exists.
    fn expire(&self, key: &str, ttl: Duration) -> BoxFuture<'static, StorageResult<bool>> {
        single(self, BatchOp::Expire { key: key.into(), ttl }, BatchReply::into_bool)
    }

    /// Publish a message, replying with the number of receivers.
    fn publish(&self, channel: &str, payload: &str) -> BoxFuture<'static, StorageResult<i64>> {
        let op = BatchOp::Publish {
            channel: channel.into(),
            payload: payload.into(),
        };
        single(self, op, BatchReply::into_int)
    }
}

fn single<S, T, F>(store: &S, op: BatchOp, convert: F) -> BoxFuture<'static, StorageResult<T>>
where
    S: KeyedStore + ?Sized,
    F: FnOnce(BatchReply) -> T + Send + 'static,
    T: Send + 'static,
{
    let pending = store.batch(vec![op]);
    Box::pin(async move {
        let reply = pending.await?.into_iter().next().ok_or_else(|| {
            StorageError::unavailable(
                "batch returned no reply".into(),
                std::io::Error::from(std::io::ErrorKind::UnexpectedEof),
            )
        })?;
        Ok(convert(reply))
    })
}
