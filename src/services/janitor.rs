//! Room reclamation: the periodic inactivity sweep and the single teardown path.

use futures::StreamExt;
use tokio::{
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};

use crate::{
    dao::{keyed_store::BatchOp, keys, storage::StorageResult},
    services::room_service,
    state::SharedState,
};

/// Run [`room_service::check_inactive_rooms`] on every sweep tick.
pub fn spawn_inactivity_sweep(state: SharedState) -> JoinHandle<()> {
    let period = state.config().inactivity_sweep;
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match room_service::check_inactive_rooms(&state).await {
                Ok(reaped) if !reaped.is_empty() => debug!(count = reaped.len(), "inactive rooms reaped"),
                Ok(_) => {}
                Err(err) => warn!(error = %err, "inactivity sweep failed"),
            }
        }
    })
}

/// Tear down every room announced on the cleanup channel.
pub fn spawn_cleanup_listener(state: SharedState) -> JoinHandle<()> {
    let mut notices = state.store().psubscribe(keys::ROOM_CLEANUP_CHANNEL);
    tokio::spawn(async move {
        while let Some(notice) = notices.next().await {
            let room_id = notice.payload;
            if let Err(err) = teardown_room(&state, &room_id).await {
                warn!(room_id = %room_id, error = %err, "room teardown failed");
            }
        }
        debug!("cleanup listener stopped");
    })
}

/// Delete every key of a room, drop its index entry and in-process queues,
/// and detach the sockets still in its group.
pub async fn teardown_room(state: &SharedState, room_id: &str) -> StorageResult<()> {
    let store = state.store();
    let quiz_ids = store.smembers(&keys::room_quiz_set(room_id)).await?;

    let room_key = keys::room(room_id);
    let mut ops = vec![
        BatchOp::Del {
            key: keys::changes(&room_key),
        },
        BatchOp::Del { key: room_key },
        BatchOp::Del {
            key: keys::room_players(room_id),
        },
        BatchOp::Del {
            key: keys::room_leaderboard(room_id),
        },
        BatchOp::Del {
            key: keys::room_current_quiz(room_id),
        },
        BatchOp::Del {
            key: keys::room_timer(room_id),
        },
        BatchOp::Del {
            key: keys::room_quiz_set(room_id),
        },
    ];
    for quiz_id in &quiz_ids {
        ops.push(BatchOp::Del {
            key: keys::room_quiz(room_id, quiz_id),
        });
        ops.push(BatchOp::Del {
            key: keys::room_quiz_choices(room_id, quiz_id),
        });
    }
    ops.push(BatchOp::SRem {
        key: keys::ACTIVE_ROOMS.into(),
        member: room_id.to_string(),
    });
    store.batch(ops).await?;

    let dropped = state.position_batches().remove(room_id) + state.chat_batches().remove(room_id);
    let detached = state.connections().drop_room(room_id);
    info!(
        room_id,
        dropped_payloads = dropped,
        detached_sockets = detached.len(),
        "room torn down"
    );
    Ok(())
}
