//! Wire codec for the chat socket protocol.
//!
//! Frames are JSON objects with a `type` discriminant and a body carried
//! under either `data` or `payload` (older servers use the latter). The
//! alias is normalized exactly once, here at the boundary; everything past
//! the codec sees one canonical [`ServerFrame`] shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Author;

/// Codec failure on a single frame. The socket driver logs and drops
/// these; they are never fatal to the session.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Frame is not a JSON object or is missing the `type` discriminant.
    #[error("frame has no type discriminant")]
    MissingType,
    /// Discriminant names a frame kind this client does not know.
    #[error("unknown frame type '{0}'")]
    UnknownType(String),
    /// Body failed to decode for a known frame type.
    #[error("malformed '{kind}' frame: {source}")]
    MalformedBody {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
    /// Outbound command failed to serialize.
    #[error("failed to encode command: {0}")]
    Encode(#[source] serde_json::Error),
}

/// A server-confirmed message create.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageCreated {
    pub id: String,
    /// Echo of the client temp ID when this create confirms an optimistic send.
    #[serde(default)]
    pub temp_id: Option<String>,
    pub room_id: String,
    pub author: Author,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, alias = "replyToId")]
    pub parent_id: Option<String>,
}

/// A server-confirmed message edit.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageUpdated {
    pub id: String,
    pub room_id: String,
    pub content: String,
    pub edited_at: DateTime<Utc>,
}

/// A server-confirmed message deletion.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeleted {
    pub id: String,
    pub room_id: String,
    /// Some servers omit this; the reconciler falls back to "now".
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_by: Option<String>,
    #[serde(default)]
    pub deleted_reason: Option<String>,
}

/// A peer started or refreshed typing in a room.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypingStarted {
    pub room_id: String,
    pub user_id: String,
    #[serde(default, alias = "username")]
    pub name: Option<String>,
}

/// A peer stopped typing in a room.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypingStopped {
    pub room_id: String,
    pub user_id: String,
}

/// One decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    /// Greeting after the socket opens. Carries no state the engine uses.
    Hello,
    /// Connection acknowledgement; likewise stateless for the engine.
    ConnAck,
    MessageCreated(MessageCreated),
    MessageUpdated(MessageUpdated),
    MessageDeleted(MessageDeleted),
    TypingStarted(TypingStarted),
    TypingStopped(TypingStopped),
    /// Non-fatal server-side error notice.
    ServerError { reason: Option<String> },
}

/// Decode one inbound text frame, accepting either `data` or `payload` as
/// the body envelope.
pub fn decode_frame(raw: &str) -> Result<ServerFrame, FrameError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|_| FrameError::MissingType)?;
    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(FrameError::MissingType)?;

    let body = value
        .get("data")
        .or_else(|| value.get("payload"))
        .cloned()
        .unwrap_or(serde_json::Value::Null);

    fn decode_body<T: serde::de::DeserializeOwned>(
        kind: &str,
        body: serde_json::Value,
    ) -> Result<T, FrameError> {
        serde_json::from_value(body).map_err(|source| FrameError::MalformedBody {
            kind: kind.to_owned(),
            source,
        })
    }

    match kind {
        "hello" => Ok(ServerFrame::Hello),
        "conn.ack" => Ok(ServerFrame::ConnAck),
        "message.created" => Ok(ServerFrame::MessageCreated(decode_body(kind, body)?)),
        "message.updated" => Ok(ServerFrame::MessageUpdated(decode_body(kind, body)?)),
        "message.deleted" => Ok(ServerFrame::MessageDeleted(decode_body(kind, body)?)),
        "typing.start" => Ok(ServerFrame::TypingStarted(decode_body(kind, body)?)),
        "typing.stop" => Ok(ServerFrame::TypingStopped(decode_body(kind, body)?)),
        "error" => {
            let reason = body
                .get("reason")
                .and_then(|r| r.as_str())
                .map(str::to_owned);
            Ok(ServerFrame::ServerError { reason })
        }
        other => Err(FrameError::UnknownType(other.to_owned())),
    }
}

/// One outbound client command, serialized as `{"type": ..., "payload": ...}`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum ClientCommand {
    #[serde(rename = "room.join", rename_all = "camelCase")]
    RoomJoin { room_id: String },
    #[serde(rename = "message.send", rename_all = "camelCase")]
    MessageSend {
        temp_id: String,
        room_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        parent_id: Option<String>,
    },
    #[serde(rename = "typing.start", rename_all = "camelCase")]
    TypingStart { room_id: String },
    #[serde(rename = "typing.stop", rename_all = "camelCase")]
    TypingStop { room_id: String },
    #[serde(rename = "ping")]
    Ping,
}

impl ClientCommand {
    /// Serialize for the wire.
    pub fn encode(&self) -> Result<String, FrameError> {
        serde_json::to_string(self).map_err(FrameError::Encode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn decodes_created_frame_with_data_envelope() {
        let raw = r#"{
            "type": "message.created",
            "data": {
                "id": "m1",
                "tempId": "t1",
                "roomId": "room-uuid-1",
                "author": {"id": "u1", "name": "alice"},
                "content": "hi",
                "createdAt": "2025-03-01T12:00:00Z"
            }
        }"#;

        let frame = decode_frame(raw).expect("frame should decode");
        let ServerFrame::MessageCreated(created) = frame else {
            panic!("expected a created frame, got {frame:?}");
        };
        assert_eq!(created.id, "m1");
        assert_eq!(created.temp_id.as_deref(), Some("t1"));
        assert_eq!(created.author.display_name, "alice");
        assert_eq!(
            created.created_at,
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn decodes_payload_envelope_alias() {
        let raw = r#"{
            "type": "typing.start",
            "payload": {"roomId": "room-uuid-1", "userId": "u2", "name": "bob"}
        }"#;

        let frame = decode_frame(raw).expect("frame should decode");
        assert_eq!(
            frame,
            ServerFrame::TypingStarted(TypingStarted {
                room_id: "room-uuid-1".into(),
                user_id: "u2".into(),
                name: Some("bob".into()),
            })
        );
    }

    #[test]
    fn decodes_deleted_frame_without_timestamp() {
        let raw = r#"{
            "type": "message.deleted",
            "data": {"id": "m1", "roomId": "room-uuid-1"}
        }"#;

        let frame = decode_frame(raw).expect("frame should decode");
        let ServerFrame::MessageDeleted(deleted) = frame else {
            panic!("expected a deleted frame, got {frame:?}");
        };
        assert_eq!(deleted.deleted_at, None);
        assert_eq!(deleted.deleted_by, None);
    }

    #[test]
    fn decodes_bodyless_frames() {
        assert_eq!(
            decode_frame(r#"{"type": "hello", "data": {"userId": "u1"}}"#).unwrap(),
            ServerFrame::Hello
        );
        assert_eq!(
            decode_frame(r#"{"type": "conn.ack"}"#).unwrap(),
            ServerFrame::ConnAck
        );
    }

    #[test]
    fn decodes_error_frame_reason() {
        let frame = decode_frame(r#"{"type": "error", "data": {"reason": "room full"}}"#)
            .expect("frame should decode");
        assert_eq!(
            frame,
            ServerFrame::ServerError {
                reason: Some("room full".into())
            }
        );
    }

    #[test]
    fn rejects_frame_without_type() {
        assert!(matches!(
            decode_frame(r#"{"data": {"id": "m1"}}"#),
            Err(FrameError::MissingType)
        ));
        assert!(matches!(decode_frame("not json"), Err(FrameError::MissingType)));
    }

    #[test]
    fn rejects_unknown_frame_type() {
        let err = decode_frame(r#"{"type": "message.reacted", "data": {}}"#).unwrap_err();
        assert!(matches!(err, FrameError::UnknownType(kind) if kind == "message.reacted"));
    }

    #[test]
    fn rejects_malformed_known_body() {
        let err = decode_frame(r#"{"type": "message.updated", "data": {"id": "m1"}}"#).unwrap_err();
        assert!(matches!(err, FrameError::MalformedBody { kind, .. } if kind == "message.updated"));
    }

    #[test]
    fn encodes_send_command_envelope() {
        let command = ClientCommand::MessageSend {
            temp_id: "t1".into(),
            room_id: "room-uuid-1".into(),
            content: "hi".into(),
            parent_id: None,
        };
        let raw = command.encode().expect("command should encode");
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["type"], "message.send");
        assert_eq!(value["payload"]["tempId"], "t1");
        assert_eq!(value["payload"]["roomId"], "room-uuid-1");
        assert!(value["payload"].get("parentId").is_none());
    }

    #[test]
    fn encodes_ping_without_payload() {
        let raw = ClientCommand::Ping.encode().expect("command should encode");
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["type"], "ping");
    }
}
