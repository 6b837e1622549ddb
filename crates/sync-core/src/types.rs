use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message author as stored in the timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    /// Server user ID.
    pub id: String,
    /// Display handle. Inbound payloads may spell this `name` or `username`;
    /// both are normalized here at the boundary.
    #[serde(alias = "name", alias = "username")]
    pub display_name: String,
}

/// One timeline entry.
///
/// A message starts as *provisional* (synthetic `id` equal to its `temp_id`)
/// and is promoted in place when the matching create confirmation arrives.
/// Deleted messages stay in the timeline as tombstones; use
/// [`Message::live_content`] to read content that is still live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Server-assigned stable ID (synthetic until confirmation).
    #[serde(alias = "msgId")]
    pub id: String,
    /// Client-assigned ID, present from optimistic send onward.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,
    /// Canonical room key as used on the wire.
    pub room_id: String,
    /// Message author.
    pub author: Author,
    /// Message body.
    pub content: String,
    /// Creation timestamp; the timeline sort key.
    pub created_at: DateTime<Utc>,
    /// Set when the message has been edited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
    /// Tombstone marker; the entry keeps its position but content is no longer live.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    /// User who deleted the message, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<String>,
    /// Optional moderation reason attached to the deletion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_reason: Option<String>,
    /// Reply target, when this message is a reply.
    #[serde(default, alias = "replyToId", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Message {
    /// Whether this entry is a tombstone.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Content, unless the message has been deleted.
    pub fn live_content(&self) -> Option<&str> {
        if self.is_deleted() {
            None
        } else {
            Some(&self.content)
        }
    }
}

/// Connection status reported to status observers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// A connect or reconnect attempt is in flight.
    Connecting,
    /// The duplex channel is open.
    Connected,
    /// No session, and no reconnect pending (terminal until the next connect).
    Offline,
}

impl ConnectionStatus {
    /// Short human-readable label for status banners.
    pub fn label(self) -> &'static str {
        match self {
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Offline => "Offline",
        }
    }
}

/// User intent accepted by the engine runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    /// Send a message in the active room (optimistic insert + wire send).
    SendMessage {
        /// Message body.
        content: String,
        /// Optional reply target.
        parent_id: Option<String>,
    },
    /// Edit an existing message via the REST collaborator.
    EditMessage {
        /// Server message ID.
        message_id: String,
        /// Replacement body.
        content: String,
    },
    /// Delete an existing message via the REST collaborator.
    DeleteMessage {
        /// Server message ID.
        message_id: String,
        /// Optional deletion reason.
        reason: Option<String>,
    },
    /// Composer keystroke; throttled into `typing.start` wire commands.
    ComposerTyping,
    /// Composer cleared or blurred; emits `typing.stop`.
    ComposerIdle,
    /// Switch the active room view; tears down the session and starts a new one.
    SwitchRoom {
        /// Display key of the target room.
        room_key: String,
    },
    /// Stop the runtime.
    Shutdown,
}

/// Engine output consumed by the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Connection status transition.
    StatusChanged {
        /// New status.
        status: ConnectionStatus,
    },
    /// A room timeline changed; carries a full ordered snapshot.
    TimelineChanged {
        /// Display key of the room bucket.
        room_key: String,
        /// Snapshot in `created_at` order, tombstones included.
        messages: Vec<Message>,
    },
    /// The set of currently-typing peers changed for a room.
    TypingChanged {
        /// Display key of the room.
        room_key: String,
        /// Display names, sorted for stable output.
        names: Vec<String>,
    },
}
