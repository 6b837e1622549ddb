//! Per-room message store and reconciliation.
//!
//! Buckets are keyed by display key; callers resolve inbound canonical
//! keys through the embedded [`RoomKeyRegistry`] before any bucket is
//! touched. All operations are lenient upserts so that duplicate and
//! out-of-order delivery across reconnects converges on the same state.

use chrono::Utc;
use std::collections::HashMap;
use uuid::Uuid;

use crate::protocol::{MessageCreated, MessageDeleted, MessageUpdated};
use crate::registry::RoomKeyRegistry;
use crate::types::{Author, Message};

/// Ordered, duplicate-free per-room timelines plus the room key registry.
#[derive(Debug, Default)]
pub struct RoomStore {
    registry: RoomKeyRegistry,
    buckets: HashMap<String, Vec<Message>>,
}

impl RoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &RoomKeyRegistry {
        &self.registry
    }

    pub fn register_room(&mut self, display: impl Into<String>, canonical: impl Into<String>) {
        self.registry.register(display, canonical);
    }

    /// Current timeline snapshot for a room, tombstones included.
    pub fn messages(&self, display: &str) -> &[Message] {
        self.buckets.get(display).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Insert a provisional message for a local send and return its temp ID.
    ///
    /// The provisional entry uses the temp ID as its `id` until the server
    /// confirmation promotes it in place.
    pub fn apply_optimistic_send(
        &mut self,
        display: &str,
        canonical: &str,
        content: impl Into<String>,
        author: Author,
        parent_id: Option<String>,
    ) -> String {
        let temp_id = Uuid::new_v4().to_string();
        let message = Message {
            id: temp_id.clone(),
            temp_id: Some(temp_id.clone()),
            room_id: canonical.to_owned(),
            author,
            content: content.into(),
            created_at: Utc::now(),
            edited_at: None,
            deleted_at: None,
            deleted_by: None,
            deleted_reason: None,
            parent_id,
        };
        let bucket = self.buckets.entry(display.to_owned()).or_default();
        sorted_insert(bucket, message);
        temp_id
    }

    /// Apply a server-confirmed create. Returns the display key of the
    /// bucket that changed.
    ///
    /// Resolution order: replace the provisional entry matching `temp_id`
    /// (promotion), else replace any entry with the same server `id`
    /// (duplicate delivery), else insert in timestamp order. The server
    /// wins for every field it sent; locally-known fields it omitted,
    /// notably `parent_id`, are preserved.
    pub fn apply_created(&mut self, event: MessageCreated) -> String {
        let display = self.registry.to_display_key(&event.room_id).to_owned();
        let bucket = self.buckets.entry(display.clone()).or_default();

        let confirmed = |existing: &Message| Message {
            id: event.id.clone(),
            temp_id: existing.temp_id.clone().or_else(|| event.temp_id.clone()),
            room_id: event.room_id.clone(),
            author: event.author.clone(),
            content: event.content.clone(),
            created_at: event.created_at,
            edited_at: existing.edited_at,
            deleted_at: existing.deleted_at,
            deleted_by: existing.deleted_by.clone(),
            deleted_reason: existing.deleted_reason.clone(),
            parent_id: event.parent_id.clone().or_else(|| existing.parent_id.clone()),
        };

        let by_temp = event.temp_id.as_deref().and_then(|temp| {
            bucket
                .iter()
                .position(|m| m.temp_id.as_deref() == Some(temp))
        });
        if let Some(idx) = by_temp {
            let promoted = confirmed(&bucket[idx]);
            bucket[idx] = promoted;
            resort(bucket);
            return display;
        }

        if let Some(idx) = bucket.iter().position(|m| m.id == event.id) {
            let replaced = confirmed(&bucket[idx]);
            bucket[idx] = replaced;
            resort(bucket);
            return display;
        }

        sorted_insert(
            bucket,
            Message {
                id: event.id,
                temp_id: event.temp_id,
                room_id: event.room_id,
                author: event.author,
                content: event.content,
                created_at: event.created_at,
                edited_at: None,
                deleted_at: None,
                deleted_by: None,
                deleted_reason: None,
                parent_id: event.parent_id,
            },
        );
        display
    }

    /// Apply a server-confirmed edit. Returns the changed bucket's display
    /// key, or `None` when the message is unknown or already a tombstone.
    pub fn apply_updated(&mut self, event: MessageUpdated) -> Option<String> {
        let display = self.registry.to_display_key(&event.room_id).to_owned();
        let bucket = self.buckets.get_mut(&display)?;
        let message = bucket.iter_mut().find(|m| m.id == event.id)?;
        if message.is_deleted() {
            // An edit never resurrects deleted content.
            return None;
        }
        message.content = event.content;
        message.edited_at = Some(event.edited_at);
        Some(display)
    }

    /// Apply a server-confirmed deletion as a tombstone. The record keeps
    /// its timeline position. Returns the changed bucket's display key, or
    /// `None` when the message is unknown.
    pub fn apply_deleted(&mut self, event: MessageDeleted) -> Option<String> {
        let display = self.registry.to_display_key(&event.room_id).to_owned();
        let bucket = self.buckets.get_mut(&display)?;
        let message = bucket.iter_mut().find(|m| m.id == event.id)?;
        message.deleted_at = Some(event.deleted_at.unwrap_or_else(Utc::now));
        message.deleted_by = event.deleted_by;
        message.deleted_reason = event.deleted_reason;
        Some(display)
    }

    /// Replace a room's bucket wholesale with a history page. Used once
    /// per room-view activation, before live events are applied.
    pub fn load_history(&mut self, display: &str, mut messages: Vec<Message>) {
        messages.sort_by_key(|m| m.created_at);
        self.buckets.insert(display.to_owned(), messages);
    }
}

/// Insert keeping `created_at` ascending; equal timestamps keep insertion
/// order (the new entry goes after existing equals, never ordered by id).
fn sorted_insert(bucket: &mut Vec<Message>, message: Message) {
    let idx = bucket
        .iter()
        .rposition(|m| m.created_at <= message.created_at)
        .map(|i| i + 1)
        .unwrap_or(0);
    bucket.insert(idx, message);
}

fn resort(bucket: &mut [Message]) {
    bucket.sort_by_key(|m| m.created_at);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, minute, 0).unwrap()
    }

    fn author(id: &str) -> Author {
        Author {
            id: id.to_owned(),
            display_name: id.to_owned(),
        }
    }

    fn created(id: &str, room: &str, minute: u32) -> MessageCreated {
        MessageCreated {
            id: id.to_owned(),
            temp_id: None,
            room_id: room.to_owned(),
            author: author("u1"),
            content: format!("msg {id}"),
            created_at: at(minute),
            parent_id: None,
        }
    }

    fn store_with_room() -> RoomStore {
        let mut store = RoomStore::new();
        store.register_room("general", "room-uuid-1");
        store
    }

    #[test]
    fn resolves_canonical_key_to_display_bucket() {
        let mut store = store_with_room();
        let display = store.apply_created(created("m1", "room-uuid-1", 0));
        assert_eq!(display, "general");
        assert_eq!(store.messages("general").len(), 1);
        assert!(store.messages("room-uuid-1").is_empty());
    }

    #[test]
    fn keeps_ascending_order_under_out_of_order_delivery() {
        let mut store = store_with_room();
        store.apply_created(created("m3", "room-uuid-1", 3));
        store.apply_created(created("m1", "room-uuid-1", 1));
        store.apply_created(created("m2", "room-uuid-1", 2));

        let ids: Vec<&str> = store
            .messages("general")
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(ids, ["m1", "m2", "m3"]);
    }

    #[test]
    fn equal_timestamps_keep_insertion_order() {
        let mut store = store_with_room();
        store.apply_created(created("zz-first", "room-uuid-1", 1));
        store.apply_created(created("aa-second", "room-uuid-1", 1));

        let ids: Vec<&str> = store
            .messages("general")
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(ids, ["zz-first", "aa-second"]);
    }

    #[test]
    fn duplicate_create_delivery_is_idempotent() {
        let mut store = store_with_room();
        store.apply_created(created("m1", "room-uuid-1", 1));
        store.apply_created(created("m1", "room-uuid-1", 1));

        assert_eq!(store.messages("general").len(), 1);
    }

    #[test]
    fn promotes_provisional_message_in_place() {
        let mut store = store_with_room();
        let temp_id = store.apply_optimistic_send(
            "general",
            "room-uuid-1",
            "hello",
            author("me"),
            Some("parent-1".into()),
        );

        let snapshot = store.messages("general");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, temp_id);

        let mut confirm = created("m1", "room-uuid-1", 1);
        confirm.temp_id = Some(temp_id.clone());
        confirm.content = "hello".to_owned();
        store.apply_created(confirm);

        let snapshot = store.messages("general");
        assert_eq!(snapshot.len(), 1, "confirmation must not duplicate");
        assert_eq!(snapshot[0].id, "m1");
        assert_eq!(snapshot[0].temp_id.as_deref(), Some(temp_id.as_str()));
        // Server omitted the reply target; the local value survives.
        assert_eq!(snapshot[0].parent_id.as_deref(), Some("parent-1"));
        assert_eq!(snapshot[0].created_at, at(1), "server timestamp wins");
    }

    #[test]
    fn replayed_confirmation_after_promotion_stays_single() {
        let mut store = store_with_room();
        let temp_id =
            store.apply_optimistic_send("general", "room-uuid-1", "hello", author("me"), None);

        let mut confirm = created("m1", "room-uuid-1", 1);
        confirm.temp_id = Some(temp_id);
        store.apply_created(confirm.clone());
        // Same event redelivered after a reconnect.
        store.apply_created(confirm);

        assert_eq!(store.messages("general").len(), 1);
    }

    #[test]
    fn update_edits_content_and_skips_unknown_ids() {
        let mut store = store_with_room();
        store.apply_created(created("m1", "room-uuid-1", 1));

        let display = store.apply_updated(MessageUpdated {
            id: "m1".into(),
            room_id: "room-uuid-1".into(),
            content: "edited".into(),
            edited_at: at(2),
        });
        assert_eq!(display.as_deref(), Some("general"));
        assert_eq!(store.messages("general")[0].content, "edited");
        assert_eq!(store.messages("general")[0].edited_at, Some(at(2)));

        let missing = store.apply_updated(MessageUpdated {
            id: "m404".into(),
            room_id: "room-uuid-1".into(),
            content: "x".into(),
            edited_at: at(3),
        });
        assert_eq!(missing, None);
    }

    #[test]
    fn delete_leaves_tombstone_in_place() {
        let mut store = store_with_room();
        store.apply_created(created("m1", "room-uuid-1", 1));
        store.apply_created(created("m2", "room-uuid-1", 2));

        store.apply_deleted(MessageDeleted {
            id: "m1".into(),
            room_id: "room-uuid-1".into(),
            deleted_at: Some(at(5)),
            deleted_by: Some("mod".into()),
            deleted_reason: Some("spam".into()),
        });

        let snapshot = store.messages("general");
        assert_eq!(snapshot.len(), 2, "tombstones are retained");
        assert_eq!(snapshot[0].id, "m1");
        assert!(snapshot[0].is_deleted());
        assert_eq!(snapshot[0].live_content(), None);
        assert_eq!(snapshot[0].deleted_by.as_deref(), Some("mod"));
    }

    #[test]
    fn delete_without_timestamp_falls_back_to_now() {
        let mut store = store_with_room();
        store.apply_created(created("m1", "room-uuid-1", 1));

        store.apply_deleted(MessageDeleted {
            id: "m1".into(),
            room_id: "room-uuid-1".into(),
            deleted_at: None,
            deleted_by: None,
            deleted_reason: None,
        });

        assert!(store.messages("general")[0].deleted_at.is_some());
    }

    #[test]
    fn update_after_delete_does_not_resurrect_content() {
        let mut store = store_with_room();
        store.apply_created(created("m1", "room-uuid-1", 1));
        store.apply_deleted(MessageDeleted {
            id: "m1".into(),
            room_id: "room-uuid-1".into(),
            deleted_at: Some(at(2)),
            deleted_by: None,
            deleted_reason: None,
        });

        let display = store.apply_updated(MessageUpdated {
            id: "m1".into(),
            room_id: "room-uuid-1".into(),
            content: "resurrected?".into(),
            edited_at: at(3),
        });

        assert_eq!(display, None);
        assert_eq!(store.messages("general")[0].live_content(), None);
    }

    #[test]
    fn history_load_replaces_bucket_wholesale() {
        let mut store = store_with_room();
        store.apply_created(created("stale", "room-uuid-1", 9));

        let page = vec![
            Message {
                id: "m2".into(),
                temp_id: None,
                room_id: "room-uuid-1".into(),
                author: author("u1"),
                content: "two".into(),
                created_at: at(2),
                edited_at: None,
                deleted_at: None,
                deleted_by: None,
                deleted_reason: None,
                parent_id: None,
            },
            Message {
                id: "m1".into(),
                temp_id: None,
                room_id: "room-uuid-1".into(),
                author: author("u1"),
                content: "one".into(),
                created_at: at(1),
                edited_at: None,
                deleted_at: None,
                deleted_by: None,
                deleted_reason: None,
                parent_id: None,
            },
        ];
        store.load_history("general", page);

        let ids: Vec<&str> = store
            .messages("general")
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(ids, ["m1", "m2"]);
    }

    #[test]
    fn unknown_room_key_is_treated_as_display() {
        let mut store = RoomStore::new();
        let display = store.apply_created(created("m1", "adhoc-room", 1));
        assert_eq!(display, "adhoc-room");
        assert_eq!(store.messages("adhoc-room").len(), 1);
    }
}
