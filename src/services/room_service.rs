//! Room registry: creation, membership, host options, exits and inactivity.

use std::{collections::HashSet, time::Duration};

use rand::Rng;
use tracing::{debug, info};

use crate::{
    dao::{
        keyed_store::{BatchOp, BatchReply},
        keys,
        quiz_source::DEFAULT_QUIZ_SET_ID,
        storage::StorageResult,
    },
    dto::{
        events::{PlayerSnapshot, RoomOptionEvent, RoomQuizsetEvent, RoomSummary, StartGameEvent},
        room::{CreateRoomRequest, KickRoomRequest, UpdateRoomOptionRequest, UpdateRoomQuizsetRequest},
        validation::validate_pin,
        ws::{
            EVENT_JOIN_ROOM, EVENT_KICK_ROOM, EVENT_START_GAME, EVENT_UPDATE_ROOM_OPTION,
            EVENT_UPDATE_ROOM_QUIZSET,
        },
    },
    error::ServiceError,
    services::{presence_service::fetch_player, validator},
    state::{
        SharedState,
        changes::ChangeKind,
        now_millis,
        player::{Player, Position, alive_field, fields as player_fields, position_fields},
        room::{GameMode, Room, RoomStatus, fields as room_fields, flag},
    },
};

/// Position and chat traffic refresh the room heartbeat at most this often.
const ACTIVITY_REFRESH: Duration = Duration::from_secs(60);

/// Result of a successful join, used to build the joiner's initial view.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    /// Room as it stood after the join.
    pub room: Room,
    /// Other members of the room, excluding the joiner.
    pub players: Vec<PlayerSnapshot>,
    /// The join resumed a record left behind within the grace period.
    pub reconnected: bool,
}

/// What [`handle_player_exit`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Player unknown or already disconnected.
    Skipped,
    /// Player detached from their room.
    Left {
        /// Room that was left.
        room_id: String,
        /// Members left behind.
        remaining: i64,
        /// The room emptied and teardown was requested.
        cleanup_published: bool,
    },
}

pub(crate) async fn fetch_room(state: &SharedState, room_id: &str) -> StorageResult<Option<Room>> {
    let hash = state.store().hgetall(&keys::room(room_id)).await?;
    Ok(Room::from_fields(room_id, &hash))
}

fn marker(entity_key: &str, kind: ChangeKind) -> BatchOp {
    BatchOp::Set {
        key: keys::changes(entity_key),
        value: kind.as_str().to_string(),
        ttl: None,
    }
}

fn generate_pin() -> String {
    format!("{:06}", rand::rng().random_range(0..1_000_000u32))
}

/// Create a room hosted by `host_id` and register it in the active-room index.
pub async fn create_room(
    state: &SharedState,
    request: &CreateRoomRequest,
    host_id: &str,
) -> Result<String, ServiceError> {
    let store = state.store();
    let config = state.config();

    let active: HashSet<String> = store.smembers(keys::ACTIVE_ROOMS).await?.into_iter().collect();
    let room_id = loop {
        let candidate = generate_pin();
        if !active.contains(&candidate) {
            break candidate;
        }
    };

    let default_set = state
        .quiz_source()
        .get_quiz_set(DEFAULT_QUIZ_SET_ID)
        .await?;
    let room = Room {
        id: room_id.clone(),
        host: host_id.to_string(),
        status: RoomStatus::Waiting,
        is_waiting: true,
        title: request.title.clone(),
        game_mode: request.game_mode,
        max_player_count: request.max_player_count,
        is_public: request.is_public,
        last_activity_at: now_millis(),
        quiz_set_id: DEFAULT_QUIZ_SET_ID,
        quiz_count: config.default_quiz_count,
        quiz_set_title: default_set.map(|set| set.title).unwrap_or_default(),
    };

    let room_key = keys::room(&room_id);
    store
        .batch(vec![
            marker(&room_key, ChangeKind::LastActivityAt),
            BatchOp::HSet {
                key: room_key,
                fields: room.to_fields(),
            },
            BatchOp::SAdd {
                key: keys::ACTIVE_ROOMS.into(),
                members: vec![room_id.clone()],
            },
        ])
        .await?;

    info!(room_id = %room_id, host = %host_id, mode = room.game_mode.as_str(), "room created");
    Ok(room_id)
}

/// Add `player_id` to the room, or resume its membership after a short disconnect.
///
/// A room that is no longer waiting only accepts players whose record still
/// points at it. When `socket_id` is given the socket joins the room group
/// before the join is published, so it also receives its own JOIN notice.
pub async fn join_room(
    state: &SharedState,
    room_id: &str,
    player_id: &str,
    player_name: Option<&str>,
    socket_id: Option<&str>,
) -> Result<JoinOutcome, ServiceError> {
    let store = state.store();
    let room = validator::room_exists(EVENT_JOIN_ROOM, fetch_room(state, room_id).await?)?;

    let player_key = keys::player(player_id);
    let mut replies = store
        .batch(vec![
            BatchOp::SMembers {
                key: keys::room_players(room_id),
            },
            BatchOp::HGetAll {
                key: player_key.clone(),
            },
        ])
        .await?
        .into_iter();
    let members = replies.next().map(BatchReply::into_members).unwrap_or_default();
    let existing = replies
        .next()
        .map(BatchReply::into_hash)
        .and_then(|hash| Player::from_fields(player_id, &hash))
        .filter(|player| player.belongs_to(room_id));
    let reconnecting = existing.is_some();
    let already_member = members.iter().any(|member| member == player_id);

    if room.is_joinable() {
        if !already_member {
            validator::room_capacity(EVENT_JOIN_ROOM, members.len(), room.max_player_count)?;
        }
    } else if !reconnecting {
        validator::room_waiting(EVENT_JOIN_ROOM, &room)?;
    }

    if let Some(socket_id) = socket_id {
        state.connections().join_room(room_id, socket_id);
    }

    let socket_field = (
        player_fields::SOCKET_ID.to_string(),
        socket_id.unwrap_or_default().to_string(),
    );
    let mut fields = vec![
        (player_fields::DISCONNECTED.to_string(), flag(false)),
        (player_fields::GAME_ID.to_string(), room_id.to_string()),
        socket_field,
    ];
    let leaderboard_op = match &existing {
        Some(previous) => {
            if let Some(name) = player_name {
                fields.push((player_fields::PLAYER_NAME.to_string(), name.to_string()));
            } else if previous.name.is_empty() {
                fields.push((
                    player_fields::PLAYER_NAME.to_string(),
                    state.config().default_player_name.clone(),
                ));
            }
            BatchOp::ZAddNx {
                key: keys::room_leaderboard(room_id),
                member: player_id.to_string(),
                score: 0.0,
            }
        }
        None => {
            let name = player_name
                .map(str::to_string)
                .unwrap_or_else(|| state.config().default_player_name.clone());
            fields.push((player_fields::PLAYER_NAME.to_string(), name));
            fields.extend(position_fields(Position::random()));
            fields.push(alive_field(true));
            BatchOp::ZAdd {
                key: keys::room_leaderboard(room_id),
                member: player_id.to_string(),
                score: 0.0,
            }
        }
    };

    store
        .batch(vec![
            marker(&player_key, ChangeKind::Join),
            BatchOp::HSet {
                key: player_key.clone(),
                fields,
            },
            BatchOp::Persist {
                key: player_key.clone(),
            },
            BatchOp::SAdd {
                key: keys::room_players(room_id),
                members: vec![player_id.to_string()],
            },
            leaderboard_op,
        ])
        .await?;

    if reconnecting {
        // Derived keys were put on the grace-period clock by the previous exit.
        let derived = store.scan(&keys::player_derived_pattern(player_id)).await?;
        if !derived.is_empty() {
            store
                .batch(derived.into_iter().map(|key| BatchOp::Persist { key }).collect())
                .await?;
        }
    }

    let others: Vec<&String> = members.iter().filter(|member| *member != player_id).collect();
    let players = if others.is_empty() {
        Vec::new()
    } else {
        store
            .batch(
                others
                    .iter()
                    .map(|id| BatchOp::HGetAll { key: keys::player(id) })
                    .collect(),
            )
            .await?
            .into_iter()
            .zip(others)
            .filter_map(|(reply, id)| Player::from_fields(id, &reply.into_hash()))
            .map(|player| PlayerSnapshot::from(&player))
            .collect()
    };

    update_room_activity(state, room_id).await?;

    info!(room_id, player_id, reconnecting, "player joined room");
    Ok(JoinOutcome {
        room,
        players,
        reconnected: reconnecting,
    })
}

/// Overwrite the room options (host only).
pub async fn update_room_option(
    state: &SharedState,
    request: &UpdateRoomOptionRequest,
    requester_id: &str,
) -> Result<(), ServiceError> {
    let room = validator::room_exists(
        EVENT_UPDATE_ROOM_OPTION,
        fetch_room(state, &request.game_id).await?,
    )?;
    validator::player_is_host(EVENT_UPDATE_ROOM_OPTION, &room, requester_id)?;

    let room_key = keys::room(&room.id);
    state
        .store()
        .batch(vec![
            marker(&room_key, ChangeKind::Option),
            BatchOp::HSet {
                key: room_key,
                fields: vec![
                    (room_fields::TITLE.into(), request.title.clone()),
                    (room_fields::GAME_MODE.into(), request.game_mode.as_str().into()),
                    (
                        room_fields::MAX_PLAYER_COUNT.into(),
                        request.max_player_count.to_string(),
                    ),
                    (room_fields::IS_PUBLIC.into(), flag(request.is_public)),
                    (room_fields::LAST_ACTIVITY_AT.into(), now_millis().to_string()),
                ],
            },
        ])
        .await?;

    debug!(room_id = %room.id, "room options updated");
    Ok(())
}

/// Select the quiz set and quiz count of the next round (host only).
pub async fn update_room_quizset(
    state: &SharedState,
    request: &UpdateRoomQuizsetRequest,
    requester_id: &str,
) -> Result<(), ServiceError> {
    let room = validator::room_exists(
        EVENT_UPDATE_ROOM_QUIZSET,
        fetch_room(state, &request.game_id).await?,
    )?;
    validator::player_is_host(EVENT_UPDATE_ROOM_QUIZSET, &room, requester_id)?;

    let quiz_set = state
        .quiz_source()
        .get_quiz_set(request.quiz_set_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("quiz set `{}`", request.quiz_set_id)))?;

    let room_key = keys::room(&room.id);
    state
        .store()
        .batch(vec![
            marker(&room_key, ChangeKind::Quizset),
            BatchOp::HSet {
                key: room_key,
                fields: vec![
                    (room_fields::QUIZ_SET_ID.into(), request.quiz_set_id.to_string()),
                    (room_fields::QUIZ_COUNT.into(), request.quiz_count.to_string()),
                    (room_fields::QUIZ_SET_TITLE.into(), quiz_set.title),
                    (room_fields::LAST_ACTIVITY_AT.into(), now_millis().to_string()),
                ],
            },
        ])
        .await?;

    debug!(room_id = %room.id, quiz_set_id = request.quiz_set_id, "room quiz set updated");
    Ok(())
}

/// Remove another member from the room (host only).
pub async fn kick_room(
    state: &SharedState,
    request: &KickRoomRequest,
    requester_id: &str,
) -> Result<ExitOutcome, ServiceError> {
    let room = validator::room_exists(EVENT_KICK_ROOM, fetch_room(state, &request.game_id).await?)?;
    validator::player_is_host(EVENT_KICK_ROOM, &room, requester_id)?;

    let target = fetch_player(state, &request.kick_player_id)
        .await?
        .filter(|player| player.belongs_to(&room.id) && !player.disconnected);
    let target = validator::player_exists(EVENT_KICK_ROOM, &request.kick_player_id, target)?;

    info!(room_id = %room.id, player_id = %target.id, "kicking player");
    exit_player(state, target, ChangeKind::Kicked).await
}

/// Detach a player from its room, keeping its record alive for the grace period.
///
/// Calling it again for a player that already left is a no-op. When the last
/// member leaves, a single cleanup notice is published for the room.
pub async fn handle_player_exit(
    state: &SharedState,
    player_id: &str,
) -> Result<ExitOutcome, ServiceError> {
    match fetch_player(state, player_id).await? {
        Some(player) => exit_player(state, player, ChangeKind::Disconnect).await,
        None => Ok(ExitOutcome::Skipped),
    }
}

async fn exit_player(
    state: &SharedState,
    player: Player,
    kind: ChangeKind,
) -> Result<ExitOutcome, ServiceError> {
    let Some(room_id) = player.game_id.clone().filter(|_| !player.disconnected) else {
        return Ok(ExitOutcome::Skipped);
    };
    let store = state.store();
    let config = state.config();
    let player_key = keys::player(&player.id);

    let marker_ttl = (kind == ChangeKind::Kicked).then_some(config.kick_marker_ttl);
    let replies = store
        .batch(vec![
            BatchOp::SRem {
                key: keys::room_players(&room_id),
                member: player.id.clone(),
            },
            BatchOp::Set {
                key: keys::changes(&player_key),
                value: kind.as_str().to_string(),
                ttl: marker_ttl,
            },
            BatchOp::HSet {
                key: player_key.clone(),
                fields: vec![
                    (player_fields::DISCONNECTED.into(), flag(true)),
                    (player_fields::DISCONNECTED_AT.into(), now_millis().to_string()),
                ],
            },
            BatchOp::Expire {
                key: player_key,
                ttl: config.player_grace_period,
            },
            BatchOp::SCard {
                key: keys::room_players(&room_id),
            },
        ])
        .await?;

    let mut replies = replies.into_iter();
    let removed = replies.next().is_some_and(BatchReply::into_bool);
    let remaining = replies.last().map(BatchReply::into_int).unwrap_or_default();

    expire_derived_keys(state, &player.id, kind).await?;

    let cleanup_published = removed && remaining == 0;
    if cleanup_published {
        store.publish(keys::ROOM_CLEANUP_CHANNEL, &room_id).await?;
        info!(room_id = %room_id, "last player left, cleanup requested");
    }

    debug!(room_id = %room_id, player_id = %player.id, remaining, "player exited");
    Ok(ExitOutcome::Left {
        room_id,
        remaining,
        cleanup_published,
    })
}

async fn expire_derived_keys(
    state: &SharedState,
    player_id: &str,
    kind: ChangeKind,
) -> StorageResult<()> {
    let store = state.store();
    let grace = state.config().player_grace_period;
    let marker_key = keys::changes(&keys::player(player_id));

    let ops: Vec<BatchOp> = store
        .scan(&keys::player_derived_pattern(player_id))
        .await?
        .into_iter()
        // The one-shot kick marker keeps its shorter lifetime.
        .filter(|key| !(kind == ChangeKind::Kicked && *key == marker_key))
        .map(|key| BatchOp::Expire { key, ttl: grace })
        .collect();
    if !ops.is_empty() {
        store.batch(ops).await?;
    }
    Ok(())
}

/// Refresh the heartbeat of an existing room. Returns `false` when the room is gone.
pub async fn update_room_activity(state: &SharedState, room_id: &str) -> StorageResult<bool> {
    let room_key = keys::room(room_id);
    let store = state.store();
    if !store.exists(&room_key).await? {
        return Ok(false);
    }

    store
        .batch(vec![
            marker(&room_key, ChangeKind::LastActivityAt),
            BatchOp::HSet {
                key: room_key,
                fields: vec![(room_fields::LAST_ACTIVITY_AT.into(), now_millis().to_string())],
            },
        ])
        .await?;
    Ok(true)
}

/// Heartbeat for high-frequency traffic: only writes when the last refresh is stale.
pub async fn touch_room_activity(state: &SharedState, room_id: &str) -> StorageResult<bool> {
    let last = state
        .store()
        .hget(&keys::room(room_id), room_fields::LAST_ACTIVITY_AT)
        .await?
        .and_then(|value| value.parse::<i64>().ok());
    match last {
        Some(last) if now_millis() - last < ACTIVITY_REFRESH.as_millis() as i64 => Ok(false),
        Some(_) => update_room_activity(state, room_id).await,
        None => Ok(false),
    }
}

/// Publish a cleanup notice for every active room idle for longer than the threshold.
pub async fn check_inactive_rooms(state: &SharedState) -> StorageResult<Vec<String>> {
    check_inactive_rooms_at(state, now_millis()).await
}

/// [`check_inactive_rooms`] evaluated at `now_ms`.
pub async fn check_inactive_rooms_at(state: &SharedState, now_ms: i64) -> StorageResult<Vec<String>> {
    let store = state.store();
    let threshold = state.config().inactivity_threshold.as_millis() as i64;

    let room_ids = store.smembers(keys::ACTIVE_ROOMS).await?;
    if room_ids.is_empty() {
        return Ok(Vec::new());
    }

    let replies = store
        .batch(
            room_ids
                .iter()
                .map(|room_id| BatchOp::HMGet {
                    key: keys::room(room_id),
                    fields: vec![room_fields::LAST_ACTIVITY_AT.into()],
                })
                .collect(),
        )
        .await?;

    let mut reaped = Vec::new();
    for (room_id, reply) in room_ids.into_iter().zip(replies) {
        let last_activity = reply
            .into_values()
            .into_iter()
            .flatten()
            .next()
            .and_then(|value| value.parse::<i64>().ok());
        // A missing hash means the index entry leaked; reap it as well.
        let stale = last_activity.is_none_or(|last| now_ms - last > threshold);
        if stale {
            store.publish(keys::ROOM_CLEANUP_CHANNEL, &room_id).await?;
            info!(room_id = %room_id, "inactive room scheduled for cleanup");
            reaped.push(room_id);
        }
    }
    Ok(reaped)
}

/// Push the current options to the room after an `Option` change.
pub fn on_option(state: &SharedState, room: &Room) {
    state
        .connections()
        .emit_to_room(&room.id, EVENT_UPDATE_ROOM_OPTION, &RoomOptionEvent::from(room));
}

/// Push the quiz set selection after a `Quizset` change.
pub fn on_quizset(state: &SharedState, room: &Room) {
    state
        .connections()
        .emit_to_room(&room.id, EVENT_UPDATE_ROOM_QUIZSET, &RoomQuizsetEvent::from(room));
}

/// Tell the room the round has started.
pub fn on_start(state: &SharedState, room: &Room) {
    state
        .connections()
        .emit_to_room(&room.id, EVENT_START_GAME, &StartGameEvent {});
}

/// Public summary of a room, looked up by PIN.
pub async fn room_summary(state: &SharedState, room_id: &str) -> Result<RoomSummary, ServiceError> {
    validate_pin(room_id).map_err(|err| ServiceError::InvalidInput(err.to_string()))?;
    let room = fetch_room(state, room_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("room `{room_id}`")))?;
    let current = state.store().scard(&keys::room_players(room_id)).await?;

    Ok(RoomSummary {
        game_id: room.id,
        title: room.title,
        game_mode: room.game_mode,
        max_player_count: room.max_player_count,
        current_player_count: current as usize,
        status: room.status,
        is_public: room.is_public,
    })
}

/// Whether `mode` eliminates players on wrong answers.
pub fn eliminates_players(mode: GameMode) -> bool {
    mode == GameMode::Survival
}
