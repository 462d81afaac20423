//! Turns keyspace notifications on `Player:<id>` and `Room:<pin>` into typed changes.
//!
//! Every notification re-reads the change marker and the full entity, so handlers
//! always see the state current at dispatch time rather than a diff.

use futures::{StreamExt, stream};
use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, trace, warn};

use crate::{
    dao::{
        keyed_store::{BatchOp, BatchReply, Notification, memory::KEYSPACE_PREFIX},
        keys,
        storage::StorageResult,
    },
    services::{presence_service, room_service},
    state::{SharedState, changes::ChangeKind, player::Player, room::Room},
};

/// Store operation announcing that hash fields were written.
const FIELDS_WRITTEN: &str = "hset";

/// Entity type named by a key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityClass {
    /// `Player:<id>`.
    Player,
    /// `Room:<id>`.
    Room,
}

/// Snapshot of the entity that changed.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    /// A player record.
    Player(Player),
    /// A room record.
    Room(Room),
}

/// Decoded notification: the marker kind plus the entity snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// Marker naming what changed.
    pub kind: ChangeKind,
    /// Entity as read right after the notification.
    pub entity: Entity,
    /// When the notification reached the notifier.
    pub received_at: Instant,
}

/// Split an entity key of the exact shape `<Type>:<id>`.
pub fn parse_entity_key(key: &str) -> Option<(EntityClass, &str)> {
    let (class, id) = key.split_once(':')?;
    if id.is_empty() || id.contains(':') {
        return None;
    }
    match class {
        "Player" => Some((EntityClass::Player, id)),
        "Room" => Some((EntityClass::Room, id)),
        _ => None,
    }
}

/// Decode a raw notification, returning `None` for notifications that carry no fan-out.
pub async fn decode(state: &SharedState, notification: &Notification) -> StorageResult<Option<Change>> {
    let received_at = Instant::now();
    let Some(key) = notification.channel.strip_prefix(KEYSPACE_PREFIX) else {
        return Ok(None);
    };
    let Some((class, id)) = parse_entity_key(key) else {
        trace!(key, "ignoring derived key notification");
        return Ok(None);
    };
    if notification.payload != FIELDS_WRITTEN {
        trace!(key, op = %notification.payload, "ignoring non-write notification");
        return Ok(None);
    }

    let mut replies = state
        .store()
        .batch(vec![
            BatchOp::Get {
                key: keys::changes(key),
            },
            BatchOp::HGetAll { key: key.to_string() },
        ])
        .await?
        .into_iter();
    let marker = replies.next().and_then(BatchReply::into_value);
    let snapshot = replies.next().map(BatchReply::into_hash).unwrap_or_default();

    let Some(marker) = marker else {
        debug!(key, "write without change marker");
        return Ok(None);
    };
    let kind = match marker.parse::<ChangeKind>() {
        Ok(kind) => kind,
        Err(err) => {
            debug!(key, error = %err, "dropping notification");
            return Ok(None);
        }
    };

    let entity = match class {
        EntityClass::Player => Player::from_fields(id, &snapshot).map(Entity::Player),
        EntityClass::Room => Room::from_fields(id, &snapshot).map(Entity::Room),
    };
    match entity {
        Some(entity) => Ok(Some(Change {
            kind,
            entity,
            received_at,
        })),
        None => {
            debug!(key, kind = %kind, "entity vanished before dispatch");
            Ok(None)
        }
    }
}

/// Route a decoded change to its presence or room handler.
pub async fn dispatch(state: &SharedState, change: Change) -> StorageResult<()> {
    let kind = change.kind;
    let received_at = change.received_at;
    match change.entity {
        Entity::Player(player) => match kind {
            ChangeKind::Join => presence_service::on_join(state, &player).await?,
            ChangeKind::Position => presence_service::on_position(state, &player, received_at).await?,
            ChangeKind::Disconnect => presence_service::on_disconnect(state, &player),
            ChangeKind::Name => presence_service::on_name(state, &player),
            ChangeKind::Kicked => presence_service::on_kicked(state, &player),
            ChangeKind::Option
            | ChangeKind::Quizset
            | ChangeKind::Start
            | ChangeKind::LastActivityAt => {
                debug!(player_id = %player.id, kind = %kind, "room change marker on a player");
            }
        },
        Entity::Room(room) => match kind {
            ChangeKind::Option => room_service::on_option(state, &room),
            ChangeKind::Quizset => room_service::on_quizset(state, &room),
            ChangeKind::Start => room_service::on_start(state, &room),
            ChangeKind::LastActivityAt => {}
            ChangeKind::Join
            | ChangeKind::Position
            | ChangeKind::Disconnect
            | ChangeKind::Name
            | ChangeKind::Kicked => {
                debug!(room_id = %room.id, kind = %kind, "player change marker on a room");
            }
        },
    }
    Ok(())
}

/// Subscribe to player and room notifications and process them one at a time.
///
/// A failing notification is logged and skipped; the loop only ends when the
/// store closes both subscriptions.
pub fn spawn(state: SharedState) -> JoinHandle<()> {
    let players = state
        .store()
        .psubscribe(&format!("{KEYSPACE_PREFIX}Player:*"));
    let rooms = state.store().psubscribe(&format!("{KEYSPACE_PREFIX}Room:*"));
    let mut notifications = stream::select(players, rooms);

    tokio::spawn(async move {
        while let Some(notification) = notifications.next().await {
            let change = match decode(&state, &notification).await {
                Ok(Some(change)) => change,
                Ok(None) => continue,
                Err(err) => {
                    warn!(channel = %notification.channel, error = %err, "failed to decode change");
                    continue;
                }
            };
            if let Err(err) = dispatch(&state, change).await {
                warn!(channel = %notification.channel, error = %err, "failed to dispatch change");
            }
        }
        debug!("change notifier stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_keys_must_have_two_segments() {
        assert_eq!(parse_entity_key("Player:abc"), Some((EntityClass::Player, "abc")));
        assert_eq!(parse_entity_key("Room:123456"), Some((EntityClass::Room, "123456")));
        assert_eq!(parse_entity_key("Room:123456:Players"), None);
        assert_eq!(parse_entity_key("Player:abc:Changes"), None);
        assert_eq!(parse_entity_key("Player:"), None);
        assert_eq!(parse_entity_key("Quiz:1"), None);
        assert_eq!(parse_entity_key("ActiveRooms"), None);
    }
}
