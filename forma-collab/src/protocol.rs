//! JSON wire protocol.
//!
//! One UTF-8 JSON object per WebSocket text frame, discriminated by a
//! `"type"` field:
//! ```text
//! server → client: SYNC_STATE, REMOTE_ACTION, LOCK_ACQUIRED,
//!                  LOCK_RELEASED, USER_JOINED, USER_LEFT, ERROR
//! client → server: CLIENT_ACTION
//! ```
//! Anything else inbound is a protocol error answered with ERROR; the
//! connection stays open.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use forma_scene::{Action, MeshId, SceneState};

/// A connected user's public identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub client_id: Uuid,
    pub name: String,
    pub color: String,
}

/// Server → client messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Full state hydration, sent once right after connect.
    #[serde(rename = "SYNC_STATE", rename_all = "camelCase")]
    SyncState {
        payload: SceneState,
        client_id: Uuid,
        user_info: UserInfo,
        all_users: Vec<UserInfo>,
    },
    /// A peer's mutating action, replayed through the shared reducer.
    #[serde(rename = "REMOTE_ACTION", rename_all = "camelCase")]
    RemoteAction {
        action: Action,
        author_id: Uuid,
        /// Milliseconds since the Unix epoch, server clock.
        timestamp: u64,
    },
    #[serde(rename = "LOCK_ACQUIRED", rename_all = "camelCase")]
    LockAcquired {
        mesh_id: MeshId,
        client_id: Uuid,
        user_name: String,
    },
    #[serde(rename = "LOCK_RELEASED", rename_all = "camelCase")]
    LockReleased { mesh_id: MeshId },
    #[serde(rename = "USER_JOINED")]
    UserJoined { user: UserInfo },
    #[serde(rename = "USER_LEFT", rename_all = "camelCase")]
    UserLeft { client_id: Uuid },
    /// Sent only to the offending connection, never broadcast.
    #[serde(rename = "ERROR")]
    Error { message: String },
}

/// Client → server messages. CLIENT_ACTION is the only legal inbound kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "CLIENT_ACTION")]
    ClientAction { action: Action },
}

impl ServerMessage {
    pub fn remote_action(action: Action, author_id: Uuid) -> Self {
        Self::RemoteAction {
            action,
            author_id,
            timestamp: unix_millis(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Serialize to a wire frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }
}

impl ClientMessage {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(frame).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Protocol errors.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    Serialization(String),
    Deserialization(String),
    ConnectionClosed,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serialization(e) => write!(f, "Serialization error: {e}"),
            Self::Deserialization(e) => write!(f, "Deserialization error: {e}"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(name: &str) -> UserInfo {
        UserInfo {
            client_id: Uuid::new_v4(),
            name: name.to_string(),
            color: "#4ECDC4".to_string(),
        }
    }

    #[test]
    fn test_sync_state_wire_shape() {
        let me = user("Swift Panda");
        let msg = ServerMessage::SyncState {
            payload: SceneState::default(),
            client_id: me.client_id,
            user_info: me.clone(),
            all_users: vec![me.clone()],
        };
        let value: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "SYNC_STATE");
        assert_eq!(value["clientId"], me.client_id.to_string());
        assert_eq!(value["userInfo"]["name"], "Swift Panda");
        assert_eq!(value["allUsers"].as_array().unwrap().len(), 1);
        assert!(value["payload"]["meshes"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_remote_action_wire_shape() {
        let author = Uuid::new_v4();
        let msg = ServerMessage::remote_action(Action::RemoveMesh(5), author);
        let value: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "REMOTE_ACTION");
        assert_eq!(value["authorId"], author.to_string());
        assert_eq!(value["action"]["type"], "REMOVE_MESH");
        assert_eq!(value["action"]["payload"], 5);
        assert!(value["timestamp"].as_u64().unwrap() > 0);
    }

    #[test]
    fn test_lock_messages_wire_shape() {
        let client = Uuid::new_v4();
        let acquired = ServerMessage::LockAcquired {
            mesh_id: 5,
            client_id: client,
            user_name: "Brave Fox".to_string(),
        };
        let value: serde_json::Value =
            serde_json::from_str(&acquired.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "LOCK_ACQUIRED");
        assert_eq!(value["meshId"], 5);
        assert_eq!(value["userName"], "Brave Fox");

        let released = ServerMessage::LockReleased { mesh_id: 5 };
        let value: serde_json::Value =
            serde_json::from_str(&released.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "LOCK_RELEASED");
        assert_eq!(value["meshId"], 5);
    }

    #[test]
    fn test_user_lifecycle_wire_shape() {
        let joined = ServerMessage::UserJoined { user: user("Kind Yak") };
        let value: serde_json::Value = serde_json::from_str(&joined.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "USER_JOINED");
        assert_eq!(value["user"]["name"], "Kind Yak");

        let id = Uuid::new_v4();
        let left = ServerMessage::UserLeft { client_id: id };
        let value: serde_json::Value = serde_json::from_str(&left.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "USER_LEFT");
        assert_eq!(value["clientId"], id.to_string());
    }

    #[test]
    fn test_client_action_decode() {
        let frame = json!({
            "type": "CLIENT_ACTION",
            "action": { "type": "SELECT_MESH", "payload": 5 }
        })
        .to_string();
        let msg = ClientMessage::decode(&frame).unwrap();
        assert_eq!(
            msg,
            ClientMessage::ClientAction {
                action: Action::SelectMesh(5)
            }
        );
    }

    #[test]
    fn test_illegal_inbound_kind_fails_decode() {
        // Server-only kinds are not legal inbound.
        let frame = json!({ "type": "SYNC_STATE" }).to_string();
        assert!(ClientMessage::decode(&frame).is_err());
        assert!(ClientMessage::decode("not json at all").is_err());
    }

    #[test]
    fn test_server_message_roundtrip() {
        let msg = ServerMessage::error("Mesh 5 is locked by Brave Fox");
        let decoded: ServerMessage =
            serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }
}
