//! Live sockets and room groups on this instance.

use dashmap::DashMap;
use indexmap::IndexSet;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::dto::ws::ServerMessage;

/// Handle used to push messages to a connected game client.
#[derive(Clone)]
pub struct SocketHandle {
    /// Player behind the socket.
    pub player_id: String,
    /// Outbound queue drained by the socket writer.
    pub tx: mpsc::UnboundedSender<ServerMessage>,
}

/// Registry of live sockets and of the room groups they belong to.
#[derive(Default)]
pub struct Connections {
    sockets: DashMap<String, SocketHandle>,
    rooms: DashMap<String, IndexSet<String>>,
}

impl Connections {
    /// Track a newly opened socket.
    pub fn register(
        &self,
        socket_id: &str,
        player_id: &str,
        tx: mpsc::UnboundedSender<ServerMessage>,
    ) {
        self.sockets.insert(
            socket_id.to_string(),
            SocketHandle {
                player_id: player_id.to_string(),
                tx,
            },
        );
    }

    /// Forget a socket and remove it from every room group.
    pub fn unregister(&self, socket_id: &str) {
        self.sockets.remove(socket_id);
        self.rooms.retain(|_, members| {
            members.shift_remove(socket_id);
            !members.is_empty()
        });
    }

    /// Number of registered sockets.
    pub fn socket_count(&self) -> usize {
        self.sockets.len()
    }

    /// Whether the socket is still registered.
    pub fn is_connected(&self, socket_id: &str) -> bool {
        self.sockets.contains_key(socket_id)
    }

    /// Player bound to a socket.
    pub fn player_id(&self, socket_id: &str) -> Option<String> {
        self.sockets.get(socket_id).map(|handle| handle.player_id.clone())
    }

    /// Add a socket to a room group.
    pub fn join_room(&self, room_id: &str, socket_id: &str) {
        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(socket_id.to_string());
    }

    /// Remove a socket from a room group, dropping the group once empty.
    pub fn leave_room(&self, room_id: &str, socket_id: &str) {
        self.rooms
            .remove_if_mut(room_id, |_, members| {
                members.shift_remove(socket_id);
                members.is_empty()
            });
    }

    /// Detach every socket from `room_id`, returning the detached socket ids.
    pub fn drop_room(&self, room_id: &str) -> Vec<String> {
        self.rooms
            .remove(room_id)
            .map(|(_, members)| members.into_iter().collect())
            .unwrap_or_default()
    }

    /// Socket ids currently in the room group, in join order.
    pub fn room_members(&self, room_id: &str) -> Vec<String> {
        self.rooms
            .get(room_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Send `payload` to every socket of the room group, returning how many received it.
    pub fn emit_to_room(&self, room_id: &str, event: &str, payload: &impl Serialize) -> usize {
        let Some(message) = encode(event, payload) else {
            return 0;
        };
        let mut delivered = 0;
        for socket_id in self.room_members(room_id) {
            if self.deliver(&socket_id, message.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Send `payload` to a single socket.
    pub fn emit_to_socket(&self, socket_id: &str, event: &str, payload: &impl Serialize) -> bool {
        match encode(event, payload) {
            Some(message) => self.deliver(socket_id, message),
            None => false,
        }
    }

    fn deliver(&self, socket_id: &str, message: ServerMessage) -> bool {
        let Some(tx) = self.sockets.get(socket_id).map(|handle| handle.tx.clone()) else {
            return false;
        };
        if tx.send(message).is_ok() {
            return true;
        }
        debug!(socket_id, "writer closed, dropping socket");
        self.unregister(socket_id);
        false
    }
}

fn encode(event: &str, payload: &impl Serialize) -> Option<ServerMessage> {
    match ServerMessage::json(event, payload) {
        Ok(message) => Some(message),
        Err(err) => {
            warn!(event, error = %err, "failed to serialize outbound payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn room_emission_reaches_group_members_only() {
        let connections = Connections::default();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        connections.register("s-a", "a", tx_a);
        connections.register("s-b", "b", tx_b);
        connections.join_room("123456", "s-a");

        assert_eq!(connections.emit_to_room("123456", "ping", &json!({"n": 1})), 1);
        assert_eq!(rx_a.try_recv().unwrap().data, json!({"n": 1}));
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn closed_writer_is_unregistered() {
        let connections = Connections::default();
        let (tx, rx) = mpsc::unbounded_channel();
        connections.register("s-a", "a", tx);
        connections.join_room("123456", "s-a");
        drop(rx);

        assert!(!connections.emit_to_socket("s-a", "ping", &json!({})));
        assert!(!connections.is_connected("s-a"));
        assert!(connections.room_members("123456").is_empty());
    }

    #[test]
    fn leaving_last_socket_drops_the_group() {
        let connections = Connections::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        connections.register("s-a", "a", tx);
        connections.join_room("123456", "s-a");
        connections.leave_room("123456", "s-a");
        assert!(connections.drop_room("123456").is_empty());
    }
}
