//! Room chat over the `chat:<pin>` pub/sub channels.

use std::time::SystemTime;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
    dao::{keys, storage::StorageResult},
    dto::{
        events::ChatEntry,
        format_system_time,
        room::ChatMessageRequest,
        ws::EVENT_CHAT_MESSAGE,
    },
    error::ServiceError,
    services::{
        presence_service::{dead_member_sockets, fetch_player, is_alive},
        room_service::{self, fetch_room},
        validator,
    },
    state::SharedState,
};

/// Publish a chat line on the room's chat channel.
pub async fn chat_message(
    state: &SharedState,
    request: &ChatMessageRequest,
    player_id: &str,
) -> Result<(), ServiceError> {
    validator::room_exists(EVENT_CHAT_MESSAGE, fetch_room(state, &request.game_id).await?)?;
    let player = validator::player_in_room(
        EVENT_CHAT_MESSAGE,
        &request.game_id,
        fetch_player(state, player_id).await?,
    )?;

    let entry = ChatEntry {
        player_id: player.id,
        player_name: player.name,
        message: request.message.clone(),
        timestamp: format_system_time(SystemTime::now()),
    };
    let payload = serde_json::to_string(&entry)
        .map_err(|err| ServiceError::InvalidInput(format!("unserializable chat message: {err}")))?;
    state
        .store()
        .publish(&keys::chat_channel(&request.game_id), &payload)
        .await?;

    room_service::touch_room_activity(state, &request.game_id).await?;
    Ok(())
}

/// Deliver a published chat line: alive senders go to the room batch, dead
/// senders only reach dead members (themselves included).
pub async fn deliver_chat(state: &SharedState, room_id: &str, entry: ChatEntry) -> StorageResult<()> {
    if is_alive(state, &entry.player_id).await? {
        state.chat_batches().push(room_id, entry);
        return Ok(());
    }

    let batch = [entry];
    for socket_id in dead_member_sockets(state, room_id, None).await? {
        state
            .connections()
            .emit_to_socket(&socket_id, EVENT_CHAT_MESSAGE, &batch);
    }
    Ok(())
}

/// Consume every `chat:<pin>` channel until the store closes the subscription.
pub fn spawn_chat_listener(state: SharedState) -> JoinHandle<()> {
    let mut messages = state.store().psubscribe(keys::CHAT_CHANNEL_PATTERN);
    tokio::spawn(async move {
        while let Some(message) = messages.next().await {
            let Some(room_id) = keys::chat_room_id(&message.channel) else {
                debug!(channel = %message.channel, "ignoring message on unexpected chat channel");
                continue;
            };
            let entry = match serde_json::from_str::<ChatEntry>(&message.payload) {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(room_id, error = %err, "dropping malformed chat message");
                    continue;
                }
            };
            if let Err(err) = deliver_chat(&state, room_id, entry).await {
                warn!(room_id, error = %err, "failed to deliver chat message");
            }
        }
        debug!("chat listener stopped");
    })
}
