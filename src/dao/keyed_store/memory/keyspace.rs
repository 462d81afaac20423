use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use tokio::time::Instant;

use crate::dao::{
    keyed_store::{BatchOp, BatchReply, Fields, Notification, glob_match},
    storage::{StorageError, StorageResult},
};

/// Channel prefix used for keyspace notifications.
pub const KEYSPACE_PREFIX: &str = "__keyspace@0__:";

enum Value {
    Str(String),
    Hash(Fields),
    Set(IndexSet<String>),
    Sorted(IndexMap<String, f64>),
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn persistent(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// Plain keyspace; all locking happens in [`super::MemoryStore`].
#[derive(Default)]
pub struct Keyspace {
    entries: HashMap<String, Entry>,
}

fn touched(key: &str, operation: &str) -> Notification {
    Notification {
        channel: format!("{KEYSPACE_PREFIX}{key}"),
        payload: operation.to_string(),
    }
}

impl Keyspace {
    /// Apply one operation, appending the keyspace events it produced to `events`.
    pub fn apply(
        &mut self,
        op: BatchOp,
        now: Instant,
        subscribers: usize,
        events: &mut Vec<Notification>,
    ) -> StorageResult<BatchReply> {
        match op {
            BatchOp::HSet { key, fields } => {
                if fields.is_empty() {
                    return Ok(BatchReply::Int(0));
                }
                let Value::Hash(hash) = self.slot(&key, now, events, || Value::Hash(Fields::new()))
                else {
                    return Err(StorageError::wrong_type(&key, "hash"));
                };
                let added = fields
                    .into_iter()
                    .filter(|(field, value)| hash.insert(field.clone(), value.clone()).is_none())
                    .count();
                events.push(touched(&key, "hset"));
                Ok(BatchReply::Int(added as i64))
            }
            BatchOp::HGetAll { key } => match self.read(&key, now, events) {
                None => Ok(BatchReply::Hash(Fields::new())),
                Some(Value::Hash(hash)) => Ok(BatchReply::Hash(hash.clone())),
                Some(_) => Err(StorageError::wrong_type(&key, "hash")),
            },
            BatchOp::HMGet { key, fields } => match self.read(&key, now, events) {
                None => Ok(BatchReply::Values(vec![None; fields.len()])),
                Some(Value::Hash(hash)) => Ok(BatchReply::Values(
                    fields.iter().map(|field| hash.get(field).cloned()).collect(),
                )),
                Some(_) => Err(StorageError::wrong_type(&key, "hash")),
            },
            BatchOp::Get { key } => match self.read(&key, now, events) {
                None => Ok(BatchReply::Value(None)),
                Some(Value::Str(value)) => Ok(BatchReply::Value(Some(value.clone()))),
                Some(_) => Err(StorageError::wrong_type(&key, "string")),
            },
            BatchOp::Set { key, value, ttl } => {
                let entry = Entry {
                    value: Value::Str(value),
                    expires_at: ttl.map(|ttl| now + ttl),
                };
                self.entries.insert(key.clone(), entry);
                events.push(touched(&key, "set"));
                Ok(BatchReply::Ok)
            }
            BatchOp::Del { key } => {
                let existed = self.live(&key, now, events).is_some();
                if existed {
                    self.entries.remove(&key);
                    events.push(touched(&key, "del"));
                }
                Ok(BatchReply::Bool(existed))
            }
            BatchOp::Exists { key } => Ok(BatchReply::Bool(self.live(&key, now, events).is_some())),
            BatchOp::SAdd { key, members } => {
                let Value::Set(set) = self.slot(&key, now, events, || Value::Set(IndexSet::new()))
                else {
                    return Err(StorageError::wrong_type(&key, "set"));
                };
                let added = members.into_iter().filter(|member| set.insert(member.clone())).count();
                if added > 0 {
                    events.push(touched(&key, "sadd"));
                } else if set.is_empty() {
                    self.entries.remove(&key);
                }
                Ok(BatchReply::Int(added as i64))
            }
            BatchOp::SRem { key, member } => {
                let removed = match self.live(&key, now, events) {
                    None => false,
                    Some(Entry {
                        value: Value::Set(set),
                        ..
                    }) => set.shift_remove(&member),
                    Some(_) => return Err(StorageError::wrong_type(&key, "set")),
                };
                if removed {
                    events.push(touched(&key, "srem"));
                    self.drop_if_empty(&key, events);
                }
                Ok(BatchReply::Bool(removed))
            }
            BatchOp::SMembers { key } => match self.read(&key, now, events) {
                None => Ok(BatchReply::Members(Vec::new())),
                Some(Value::Set(set)) => Ok(BatchReply::Members(set.iter().cloned().collect())),
                Some(_) => Err(StorageError::wrong_type(&key, "set")),
            },
            BatchOp::SCard { key } => match self.read(&key, now, events) {
                None => Ok(BatchReply::Int(0)),
                Some(Value::Set(set)) => Ok(BatchReply::Int(set.len() as i64)),
                Some(_) => Err(StorageError::wrong_type(&key, "set")),
            },
            BatchOp::ZAdd { key, member, score } => {
                let Value::Sorted(ranking) =
                    self.slot(&key, now, events, || Value::Sorted(IndexMap::new()))
                else {
                    return Err(StorageError::wrong_type(&key, "sorted set"));
                };
                ranking.insert(member, score);
                events.push(touched(&key, "zadd"));
                Ok(BatchReply::Ok)
            }
            BatchOp::ZAddNx { key, member, score } => {
                let Value::Sorted(ranking) =
                    self.slot(&key, now, events, || Value::Sorted(IndexMap::new()))
                else {
                    return Err(StorageError::wrong_type(&key, "sorted set"));
                };
                let added = !ranking.contains_key(&member);
                if added {
                    ranking.insert(member, score);
                    events.push(touched(&key, "zadd"));
                }
                Ok(BatchReply::Bool(added))
            }
            BatchOp::ZIncrBy { key, member, delta } => {
                let Value::Sorted(ranking) =
                    self.slot(&key, now, events, || Value::Sorted(IndexMap::new()))
                else {
                    return Err(StorageError::wrong_type(&key, "sorted set"));
                };
                let score = ranking.entry(member).or_insert(0.0);
                *score += delta;
                let score = *score;
                events.push(touched(&key, "zincr"));
                Ok(BatchReply::Float(score))
            }
            BatchOp::ZRange { key } => match self.read(&key, now, events) {
                None => Ok(BatchReply::Scored(Vec::new())),
                Some(Value::Sorted(ranking)) => {
                    let mut entries = ranking
                        .iter()
                        .map(|(member, score)| (member.clone(), *score))
                        .collect::<Vec<_>>();
                    entries.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
                    Ok(BatchReply::Scored(entries))
                }
                Some(_) => Err(StorageError::wrong_type(&key, "sorted set")),
            },
            BatchOp::Expire { key, ttl } => match self.live(&key, now, events) {
                Some(entry) => {
                    entry.expires_at = Some(now + ttl);
                    events.push(touched(&key, "expire"));
                    Ok(BatchReply::Bool(true))
                }
                None => Ok(BatchReply::Bool(false)),
            },
            BatchOp::Persist { key } => match self.live(&key, now, events) {
                Some(entry) if entry.expires_at.is_some() => {
                    entry.expires_at = None;
                    events.push(touched(&key, "persist"));
                    Ok(BatchReply::Bool(true))
                }
                _ => Ok(BatchReply::Bool(false)),
            },
            BatchOp::Publish { channel, payload } => {
                events.push(Notification { channel, payload });
                Ok(BatchReply::Int(subscribers as i64))
            }
        }
    }

    /// Remove every key whose TTL has elapsed, returning the `expired` events.
    pub fn purge_expired(&mut self, now: Instant) -> Vec<Notification> {
        let expired = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();

        expired
            .into_iter()
            .map(|key| {
                self.entries.remove(&key);
                touched(&key, "expired")
            })
            .collect()
    }

    /// Live keys matching `pattern`, sorted.
    pub fn scan(&self, pattern: &str, now: Instant) -> Vec<String> {
        let mut keys = self
            .entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired(now) && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();
        keys.sort();
        keys
    }

    fn live(
        &mut self,
        key: &str,
        now: Instant,
        events: &mut Vec<Notification>,
    ) -> Option<&mut Entry> {
        if self.entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            self.entries.remove(key);
            events.push(touched(key, "expired"));
            return None;
        }
        self.entries.get_mut(key)
    }

    fn read(&mut self, key: &str, now: Instant, events: &mut Vec<Notification>) -> Option<&Value> {
        self.live(key, now, events).map(|entry| &entry.value)
    }

    fn slot(
        &mut self,
        key: &str,
        now: Instant,
        events: &mut Vec<Notification>,
        empty: fn() -> Value,
    ) -> &mut Value {
        // drops the key first if it already expired
        let _ = self.live(key, now, events);
        &mut self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::persistent(empty()))
            .value
    }

    fn drop_if_empty(&mut self, key: &str, events: &mut Vec<Notification>) {
        let empty = match self.entries.get(key).map(|entry| &entry.value) {
            Some(Value::Set(set)) => set.is_empty(),
            Some(Value::Hash(hash)) => hash.is_empty(),
            Some(Value::Sorted(ranking)) => ranking.is_empty(),
            _ => false,
        };
        if empty {
            self.entries.remove(key);
            events.push(touched(key, "del"));
        }
    }
}
