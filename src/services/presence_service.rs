//! Player presence: positions, names and the alive/dead visibility partition.

use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::{
    dao::{
        keyed_store::{BatchOp, BatchReply},
        keys,
        storage::StorageResult,
    },
    dto::{
        events::{ExitRoomEvent, JoinRoomEvent, KickRoomEvent, PlayerNameEvent, PlayerSnapshot, PositionUpdate},
        room::{SetPlayerNameRequest, UpdatePositionRequest},
        ws::{EVENT_EXIT_ROOM, EVENT_JOIN_ROOM, EVENT_KICK_ROOM, EVENT_SET_PLAYER_NAME, EVENT_UPDATE_POSITION},
    },
    error::ServiceError,
    services::{room_service, validator},
    state::{
        SharedState,
        changes::ChangeKind,
        player::{Player, Position, fields as player_fields, position_fields},
        room::fields as room_fields,
    },
};

pub(crate) async fn fetch_player(
    state: &SharedState,
    player_id: &str,
) -> StorageResult<Option<Player>> {
    let hash = state.store().hgetall(&keys::player(player_id)).await?;
    Ok(Player::from_fields(player_id, &hash))
}

/// Whether `player_id` is still in the game (a missing flag counts as alive).
pub async fn is_alive(state: &SharedState, player_id: &str) -> StorageResult<bool> {
    Ok(state
        .store()
        .hget(&keys::player(player_id), player_fields::IS_ALIVE)
        .await?
        .is_none_or(|value| value != "0"))
}

fn player_marker(player_id: &str, kind: ChangeKind) -> BatchOp {
    BatchOp::Set {
        key: keys::changes(&keys::player(player_id)),
        value: kind.as_str().to_string(),
        ttl: None,
    }
}

/// Move a player inside its room.
pub async fn update_position(
    state: &SharedState,
    request: &UpdatePositionRequest,
    player_id: &str,
) -> Result<(), ServiceError> {
    let [x, y] = request.new_position;
    let position = Position::new(x, y)
        .ok_or_else(|| ServiceError::InvalidInput("position outside the unit square".into()))?;
    validator::player_in_room(
        EVENT_UPDATE_POSITION,
        &request.game_id,
        fetch_player(state, player_id).await?,
    )?;

    state
        .store()
        .batch(vec![
            player_marker(player_id, ChangeKind::Position),
            BatchOp::HSet {
                key: keys::player(player_id),
                fields: position_fields(position),
            },
        ])
        .await?;

    room_service::touch_room_activity(state, &request.game_id).await?;
    Ok(())
}

/// Rename the caller; the `Name` marker fans the change out.
pub async fn set_player_name(
    state: &SharedState,
    request: &SetPlayerNameRequest,
    player_id: &str,
) -> Result<(), ServiceError> {
    validator::player_exists(
        EVENT_SET_PLAYER_NAME,
        player_id,
        fetch_player(state, player_id).await?,
    )?;

    state
        .store()
        .batch(vec![
            player_marker(player_id, ChangeKind::Name),
            BatchOp::HSet {
                key: keys::player(player_id),
                fields: vec![(player_fields::PLAYER_NAME.into(), request.player_name.clone())],
            },
        ])
        .await?;
    Ok(())
}

/// Announce a joined player to its room, flagging whether it hosts the room.
pub async fn on_join(state: &SharedState, player: &Player) -> StorageResult<()> {
    let Some(room_id) = player.game_id.as_deref() else {
        return Ok(());
    };
    let host = state
        .store()
        .hget(&keys::room(room_id), room_fields::HOST)
        .await?;

    let mut snapshot = PlayerSnapshot::from(player);
    snapshot.is_host = Some(host.as_deref() == Some(player.id.as_str()));
    state.connections().emit_to_room(
        room_id,
        EVENT_JOIN_ROOM,
        &JoinRoomEvent {
            players: vec![snapshot],
        },
    );
    debug!(room_id, player_id = %player.id, "join announced");
    Ok(())
}

/// Route a position change according to the alive/dead visibility partition.
///
/// Alive players are batched to the whole room. Dead players only reach the
/// sockets of the other dead members, one message per socket.
pub async fn on_position(state: &SharedState, player: &Player, received_at: Instant) -> StorageResult<()> {
    let Some(room_id) = player.game_id.as_deref() else {
        return Ok(());
    };
    let update = PositionUpdate {
        player_id: player.id.clone(),
        player_position: player.position.as_pair(),
    };

    if player.is_alive {
        state.position_batches().push_since(room_id, update, received_at);
        return Ok(());
    }

    let batch = [update];
    for socket_id in dead_member_sockets(state, room_id, Some(&player.id)).await? {
        state
            .connections()
            .emit_to_socket(&socket_id, EVENT_UPDATE_POSITION, &batch);
    }
    trace!(
        room_id,
        player_id = %player.id,
        latency_ms = received_at.elapsed().as_secs_f64() * 1000.0,
        "dead position delivered"
    );
    Ok(())
}

/// Announce a dropped member to their room.
pub fn on_disconnect(state: &SharedState, player: &Player) {
    let Some(room_id) = player.game_id.as_deref() else {
        return;
    };
    state.connections().emit_to_room(
        room_id,
        EVENT_EXIT_ROOM,
        &ExitRoomEvent {
            player_id: player.id.clone(),
        },
    );
}

/// Push a new display name to the room.
pub fn on_name(state: &SharedState, player: &Player) {
    let Some(room_id) = player.game_id.as_deref() else {
        return;
    };
    state.connections().emit_to_room(
        room_id,
        EVENT_SET_PLAYER_NAME,
        &PlayerNameEvent {
            player_id: player.id.clone(),
            player_name: player.name.clone(),
        },
    );
}

/// Notify the room of a kick, follow with the regular exit notice and detach
/// the kicked socket from the room group.
pub fn on_kicked(state: &SharedState, player: &Player) {
    let Some(room_id) = player.game_id.as_deref() else {
        return;
    };
    state.connections().emit_to_room(
        room_id,
        EVENT_KICK_ROOM,
        &KickRoomEvent {
            player_id: player.id.clone(),
        },
    );
    on_disconnect(state, player);

    match player.socket_id.as_deref() {
        Some(socket_id) => state.connections().leave_room(room_id, socket_id),
        None => warn!(room_id, player_id = %player.id, "kicked player has no socket to detach"),
    }
}

/// Sockets of the room members currently eliminated, read in one batch.
pub async fn dead_member_sockets(
    state: &SharedState,
    room_id: &str,
    exclude: Option<&str>,
) -> StorageResult<Vec<String>> {
    let store = state.store();
    let members: Vec<String> = store
        .smembers(&keys::room_players(room_id))
        .await?
        .into_iter()
        .filter(|member| Some(member.as_str()) != exclude)
        .collect();
    if members.is_empty() {
        return Ok(Vec::new());
    }

    let replies = store
        .batch(
            members
                .iter()
                .map(|member| BatchOp::HMGet {
                    key: keys::player(member),
                    fields: vec![
                        player_fields::IS_ALIVE.into(),
                        player_fields::SOCKET_ID.into(),
                    ],
                })
                .collect(),
        )
        .await?;

    Ok(replies
        .into_iter()
        .map(BatchReply::into_values)
        .filter_map(|values| match values.as_slice() {
            [Some(alive), Some(socket_id)] if alive == "0" && !socket_id.is_empty() => {
                Some(socket_id.clone())
            }
            _ => None,
        })
        .collect())
}
