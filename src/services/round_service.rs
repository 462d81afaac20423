//! Quiz round control: start, the timer-driven phase walk, eliminations and scoring.
//!
//! A running round owns a `Room:<pin>:Timer` key. Each expiry moves the
//! pointer one phase forward and re-arms the timer, until the last question
//! closes and the room returns to waiting.

use std::{collections::HashMap, time::Duration};

use futures::StreamExt;
use rand::seq::SliceRandom;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    dao::{
        keyed_store::{BatchOp, BatchReply, memory::KEYSPACE_PREFIX},
        keys,
        storage::StorageResult,
    },
    dto::{
        events::{
            ChoiceSnapshot, EndGameEvent, EndQuizTimeEvent, LeaderboardEntry, QuizResultEntry,
            StartQuizTimeEvent,
        },
        room::StartGameRequest,
        ws::{EVENT_END_GAME, EVENT_END_QUIZ_TIME, EVENT_START_GAME, EVENT_START_QUIZ_TIME},
    },
    error::ServiceError,
    services::{
        room_service::{eliminates_players, fetch_room},
        validator,
    },
    state::{
        SharedState,
        changes::ChangeKind,
        now_millis,
        player::{Player, alive_field},
        room::{QuizPhase, QuizPointer, RoomStatus, fields as room_fields, flag},
    },
};

/// Hash field names of a `Room:<pin>:Quiz:<id>` entry.
mod quiz_fields {
    pub const QUIZ: &str = "quiz";
    pub const ANSWER: &str = "answer";
    pub const LIMIT_TIME: &str = "limitTime";
    pub const CHOICE_COUNT: &str = "choiceCount";
}

const TIMER_VALUE: &str = "timer";
/// Keyspace operation emitted when a key's TTL runs out.
const TIMER_EXPIRED: &str = "expired";

/// Start a round: snapshot the selected quizzes into the room, reset scores and flip the room to playing.
pub async fn start_game(
    state: &SharedState,
    request: &StartGameRequest,
    requester_id: &str,
) -> Result<(), ServiceError> {
    let store = state.store();
    let room = validator::room_exists(EVENT_START_GAME, fetch_room(state, &request.game_id).await?)?;
    validator::player_is_host(EVENT_START_GAME, &room, requester_id)?;

    let quiz_set = state
        .quiz_source()
        .get_quiz_set(room.quiz_set_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("quiz set `{}`", room.quiz_set_id)))?;
    validator::quiz_count(EVENT_START_GAME, room.quiz_count, quiz_set.quiz_list.len())?;

    let room_id = room.id.as_str();
    let mut replies = store
        .batch(vec![
            BatchOp::SMembers {
                key: keys::room_quiz_set(room_id),
            },
            BatchOp::ZRange {
                key: keys::room_leaderboard(room_id),
            },
            BatchOp::SMembers {
                key: keys::room_players(room_id),
            },
        ])
        .await?
        .into_iter();
    let previous_quizzes = replies.next().map(BatchReply::into_members).unwrap_or_default();
    let ranked = replies.next().map(BatchReply::into_scored).unwrap_or_default();
    let members = replies.next().map(BatchReply::into_members).unwrap_or_default();

    let mut quizzes = quiz_set.quiz_list;
    quizzes.shuffle(&mut rand::rng());
    quizzes.truncate(room.quiz_count as usize);

    let mut ops = Vec::new();
    for quiz_id in &previous_quizzes {
        ops.push(BatchOp::Del {
            key: keys::room_quiz(room_id, quiz_id),
        });
        ops.push(BatchOp::Del {
            key: keys::room_quiz_choices(room_id, quiz_id),
        });
    }
    ops.push(BatchOp::Del {
        key: keys::room_quiz_set(room_id),
    });
    ops.push(BatchOp::SAdd {
        key: keys::room_quiz_set(room_id),
        members: quizzes.iter().map(|quiz| quiz.id.to_string()).collect(),
    });
    for quiz in &quizzes {
        let quiz_id = quiz.id.to_string();
        ops.push(BatchOp::HSet {
            key: keys::room_quiz(room_id, &quiz_id),
            fields: vec![
                (quiz_fields::QUIZ.into(), quiz.quiz.clone()),
                (
                    quiz_fields::ANSWER.into(),
                    quiz.answer_order().map(|order| order.to_string()).unwrap_or_default(),
                ),
                (quiz_fields::LIMIT_TIME.into(), quiz.limit_time.to_string()),
                (quiz_fields::CHOICE_COUNT.into(), quiz.choice_list.len().to_string()),
            ],
        });
        ops.push(BatchOp::HSet {
            key: keys::room_quiz_choices(room_id, &quiz_id),
            fields: quiz
                .choice_list
                .iter()
                .map(|choice| (choice.order.to_string(), choice.content.clone()))
                .collect(),
        });
    }

    for (player_id, _) in &ranked {
        ops.push(BatchOp::ZAdd {
            key: keys::room_leaderboard(room_id),
            member: player_id.clone(),
            score: 0.0,
        });
    }
    for player_id in &members {
        ops.extend(silent_player_write(player_id, vec![alive_field(true)]));
    }

    let room_key = keys::room(room_id);
    ops.push(BatchOp::Set {
        key: keys::changes(&room_key),
        value: ChangeKind::Start.as_str().to_string(),
        ttl: None,
    });
    ops.push(BatchOp::HSet {
        key: room_key,
        fields: vec![
            (room_fields::STATUS.into(), RoomStatus::Playing.as_str().into()),
            (room_fields::IS_WAITING.into(), flag(false)),
            (room_fields::QUIZ_SET_TITLE.into(), quiz_set.title),
            (room_fields::LAST_ACTIVITY_AT.into(), now_millis().to_string()),
        ],
    });
    ops.push(BatchOp::Set {
        key: keys::room_current_quiz(room_id),
        value: QuizPointer::BEFORE_FIRST.to_string(),
        ttl: None,
    });
    ops.push(BatchOp::Set {
        key: keys::room_timer(room_id),
        value: TIMER_VALUE.to_string(),
        ttl: Some(state.config().round_countdown),
    });
    store.batch(ops).await?;

    info!(
        room_id,
        mode = room.game_mode.as_str(),
        quizzes = quizzes.len(),
        "round started"
    );
    Ok(())
}

/// Write player fields without announcing them: the marker is cleared in the
/// same batch, so the notifier drops the resulting notification.
fn silent_player_write(player_id: &str, fields: Vec<(String, String)>) -> [BatchOp; 2] {
    let player_key = keys::player(player_id);
    [
        BatchOp::Del {
            key: keys::changes(&player_key),
        },
        BatchOp::HSet {
            key: player_key,
            fields,
        },
    ]
}

/// Move the round pointer one phase forward and re-arm the round timer.
///
/// A question stays open for its `limitTime`; a closed question is followed by
/// the configured intermission. Returns the new pointer, or `None` once the
/// last quiz ended and the room went back to waiting.
pub async fn advance_phase(state: &SharedState, room_id: &str) -> Result<Option<QuizPointer>, ServiceError> {
    let store = state.store();
    let room = fetch_room(state, room_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("room `{room_id}`")))?;
    if room.status != RoomStatus::Playing {
        return Err(ServiceError::InvalidInput(format!("room `{room_id}` is not playing")));
    }

    let mut replies = store
        .batch(vec![
            BatchOp::Get {
                key: keys::room_current_quiz(room_id),
            },
            BatchOp::SMembers {
                key: keys::room_quiz_set(room_id),
            },
        ])
        .await?
        .into_iter();
    let current = replies
        .next()
        .and_then(BatchReply::into_value)
        .and_then(|value| value.parse::<QuizPointer>().ok())
        .unwrap_or(QuizPointer::BEFORE_FIRST);
    let quiz_ids = replies.next().map(BatchReply::into_members).unwrap_or_default();

    let next = current.next();
    if let Some(quiz_id) = quiz_id_at(&quiz_ids, next.index) {
        let duration = match next.phase {
            QuizPhase::Start => quiz_limit(state, room_id, quiz_id).await?,
            QuizPhase::End => state.config().quiz_intermission,
        };
        store
            .batch(vec![
                BatchOp::Set {
                    key: keys::room_current_quiz(room_id),
                    value: next.to_string(),
                    ttl: None,
                },
                BatchOp::Set {
                    key: keys::room_timer(room_id),
                    value: TIMER_VALUE.to_string(),
                    ttl: Some(duration),
                },
            ])
            .await?;
        debug!(room_id, pointer = %next, ?duration, "quiz phase advanced");
        return Ok(Some(next));
    }

    let room_key = keys::room(room_id);
    store
        .batch(vec![
            BatchOp::Del {
                key: keys::room_current_quiz(room_id),
            },
            BatchOp::Del {
                key: keys::room_timer(room_id),
            },
            BatchOp::Set {
                key: keys::changes(&room_key),
                value: ChangeKind::LastActivityAt.as_str().to_string(),
                ttl: None,
            },
            BatchOp::HSet {
                key: room_key,
                fields: vec![
                    (room_fields::STATUS.into(), RoomStatus::Waiting.as_str().into()),
                    (room_fields::IS_WAITING.into(), flag(true)),
                    (room_fields::LAST_ACTIVITY_AT.into(), now_millis().to_string()),
                ],
            },
        ])
        .await?;
    info!(room_id, "round finished");
    Ok(None)
}

fn quiz_id_at(quiz_ids: &[String], index: i64) -> Option<&str> {
    usize::try_from(index)
        .ok()
        .and_then(|index| quiz_ids.get(index))
        .map(String::as_str)
}

/// Answer window of a stored quiz, falling back to the intermission when unset.
async fn quiz_limit(state: &SharedState, room_id: &str, quiz_id: &str) -> StorageResult<Duration> {
    let limit = state
        .store()
        .hget(&keys::room_quiz(room_id, quiz_id), quiz_fields::LIMIT_TIME)
        .await?
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|secs| *secs > 0);
    Ok(limit.map_or(state.config().quiz_intermission, Duration::from_secs))
}

/// Mark members of a survival room as eliminated. Returns how many were updated.
pub async fn eliminate_players(
    state: &SharedState,
    room_id: &str,
    player_ids: &[String],
) -> Result<usize, ServiceError> {
    let store = state.store();
    let room = fetch_room(state, room_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("room `{room_id}`")))?;
    if !eliminates_players(room.game_mode) {
        return Ok(0);
    }

    let members = store.smembers(&keys::room_players(room_id)).await?;
    let eliminated: Vec<&String> = player_ids
        .iter()
        .filter(|id| members.contains(*id))
        .collect();
    if eliminated.is_empty() {
        return Ok(0);
    }

    let ops = eliminated
        .iter()
        .flat_map(|id| silent_player_write(id, vec![alive_field(false)]))
        .collect();
    store.batch(ops).await?;

    debug!(room_id, count = eliminated.len(), "players eliminated");
    Ok(eliminated.len())
}

/// Add `delta` to a member's score, returning the new score.
pub async fn add_score(
    state: &SharedState,
    room_id: &str,
    player_id: &str,
    delta: f64,
) -> Result<f64, ServiceError> {
    let is_member = state
        .store()
        .smembers(&keys::room_players(room_id))
        .await?
        .iter()
        .any(|member| member == player_id);
    if !is_member {
        return Err(ServiceError::NotFound(format!(
            "player `{player_id}` in room `{room_id}`"
        )));
    }

    Ok(state
        .store()
        .zincrby(&keys::room_leaderboard(room_id), player_id, delta)
        .await?)
}

/// Leaderboard entries, best score first.
pub async fn leaderboard(state: &SharedState, room_id: &str) -> StorageResult<Vec<LeaderboardEntry>> {
    let mut ranked = state.store().zrange(&keys::room_leaderboard(room_id)).await?;
    ranked.reverse();
    Ok(ranked
        .into_iter()
        .map(|(player_id, score)| LeaderboardEntry { player_id, score })
        .collect())
}

/// Handle an expired round timer: advance the round and tell the room what happened.
pub async fn on_round_timer(state: &SharedState, room_id: &str) -> Result<(), ServiceError> {
    match advance_phase(state, room_id).await? {
        Some(QuizPointer {
            index,
            phase: QuizPhase::Start,
        }) => announce_quiz(state, room_id, index).await,
        Some(QuizPointer {
            index,
            phase: QuizPhase::End,
        }) => settle_quiz(state, room_id, index).await,
        None => announce_end(state, room_id).await,
    }
}

async fn announce_quiz(state: &SharedState, room_id: &str, index: i64) -> Result<(), ServiceError> {
    let store = state.store();
    let quiz_ids = store.smembers(&keys::room_quiz_set(room_id)).await?;
    let Some(quiz_id) = quiz_id_at(&quiz_ids, index) else {
        return Err(ServiceError::NotFound(format!("quiz #{index} of room `{room_id}`")));
    };

    let mut replies = store
        .batch(vec![
            BatchOp::HGetAll {
                key: keys::room_quiz(room_id, quiz_id),
            },
            BatchOp::HGetAll {
                key: keys::room_quiz_choices(room_id, quiz_id),
            },
        ])
        .await?
        .into_iter();
    let quiz = replies.next().map(BatchReply::into_hash).unwrap_or_default();
    let choices = replies.next().map(BatchReply::into_hash).unwrap_or_default();

    let mut choice_list: Vec<ChoiceSnapshot> = choices
        .into_iter()
        .filter_map(|(order, content)| {
            let order = order.parse().ok()?;
            Some(ChoiceSnapshot { order, content })
        })
        .collect();
    choice_list.sort_by_key(|choice| choice.order);

    let limit = quiz_limit(state, room_id, quiz_id).await?;
    let start_time = now_millis();
    let event = StartQuizTimeEvent {
        quiz: quiz.get(quiz_fields::QUIZ).cloned().unwrap_or_default(),
        choice_list,
        start_time,
        end_time: start_time + limit.as_millis() as i64,
    };
    state
        .connections()
        .emit_to_room(room_id, EVENT_START_QUIZ_TIME, &event);
    debug!(room_id, quiz_id, "quiz opened");
    Ok(())
}

/// Close a question: score correct members, eliminate wrong survivors and
/// publish every member's outcome.
async fn settle_quiz(state: &SharedState, room_id: &str, index: i64) -> Result<(), ServiceError> {
    let store = state.store();
    let room = fetch_room(state, room_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("room `{room_id}`")))?;
    let quiz_ids = store.smembers(&keys::room_quiz_set(room_id)).await?;
    let Some(quiz_id) = quiz_id_at(&quiz_ids, index) else {
        return Err(ServiceError::NotFound(format!("quiz #{index} of room `{room_id}`")));
    };
    let quiz = store.hgetall(&keys::room_quiz(room_id, quiz_id)).await?;
    let parse = |name: &str| quiz.get(name).and_then(|value| value.parse::<u32>().ok());
    let (Some(answer), Some(choice_count)) = (parse(quiz_fields::ANSWER), parse(quiz_fields::CHOICE_COUNT)) else {
        return Err(ServiceError::NotFound(format!("answer of quiz `{quiz_id}` in room `{room_id}`")));
    };

    let members = store.smembers(&keys::room_players(room_id)).await?;
    let players: Vec<Player> = store
        .batch(
            members
                .iter()
                .map(|id| BatchOp::HGetAll { key: keys::player(id) })
                .collect(),
        )
        .await?
        .into_iter()
        .zip(&members)
        .filter_map(|(reply, id)| Player::from_fields(id, &reply.into_hash()))
        .collect();

    let survival = eliminates_players(room.game_mode);
    let points = f64::from(state.config().correct_answer_points);
    let mut correct = Vec::new();
    let mut wrong = Vec::new();
    for player in &players {
        if survival && !player.is_alive {
            continue;
        }
        if player.position.choice(choice_count) == Some(answer) {
            correct.push(player.id.clone());
        } else {
            wrong.push(player.id.clone());
        }
    }

    for player_id in &correct {
        add_score(state, room_id, player_id, points).await?;
    }
    if survival {
        eliminate_players(state, room_id, &wrong).await?;
    }

    let scores: HashMap<String, f64> = leaderboard(state, room_id)
        .await?
        .into_iter()
        .map(|entry| (entry.player_id, entry.score))
        .collect();
    let results = players
        .iter()
        .map(|player| {
            let is_answer = correct.contains(&player.id);
            QuizResultEntry {
                player_id: player.id.clone(),
                is_answer,
                is_alive: player.is_alive && !(survival && wrong.contains(&player.id)),
                score: scores.get(&player.id).copied().unwrap_or_default(),
            }
        })
        .collect();
    state.connections().emit_to_room(
        room_id,
        EVENT_END_QUIZ_TIME,
        &EndQuizTimeEvent {
            answer,
            players: results,
        },
    );
    info!(
        room_id,
        quiz_id,
        correct = correct.len(),
        wrong = wrong.len(),
        "quiz closed"
    );
    Ok(())
}

async fn announce_end(state: &SharedState, room_id: &str) -> Result<(), ServiceError> {
    let host = state
        .store()
        .hget(&keys::room(room_id), room_fields::HOST)
        .await?
        .unwrap_or_default();
    let event = EndGameEvent {
        host_id: host,
        leaderboard: leaderboard(state, room_id).await?,
    };
    state.connections().emit_to_room(room_id, EVENT_END_GAME, &event);
    Ok(())
}

/// Drive every running round from the expiry of its room timer.
pub fn spawn_round_timer_listener(state: SharedState) -> JoinHandle<()> {
    let mut expirations = state
        .store()
        .psubscribe(&format!("{KEYSPACE_PREFIX}Room:*:Timer"));
    tokio::spawn(async move {
        while let Some(notification) = expirations.next().await {
            if notification.payload != TIMER_EXPIRED {
                continue;
            }
            let Some(room_id) = notification
                .channel
                .strip_prefix(KEYSPACE_PREFIX)
                .and_then(keys::timer_room_id)
            else {
                continue;
            };
            match on_round_timer(&state, room_id).await {
                Ok(()) => {}
                Err(ServiceError::NotFound(what)) => debug!(room_id, what = %what, "round timer outlived its room"),
                Err(err) => warn!(room_id, error = %err, "round timer handling failed"),
            }
        }
        debug!("round timer listener stopped");
    })
}
