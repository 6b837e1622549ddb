//! Ephemeral typing state.
//!
//! Server side: a per-room set of currently-typing peers with a short
//! implicit expiry, so an abruptly disconnected peer never types forever.
//! Composer side: a throttle that turns a stream of keystrokes into at
//! most one `typing.start` per interval, firing immediately on the first
//! keystroke of a burst.
//!
//! Both take `now` explicitly so tests drive time directly.

use std::collections::HashMap;
use std::time::{Duration, Instant};

const FALLBACK_TYPER_NAME: &str = "Someone";

#[derive(Debug, Clone)]
struct TypingEntry {
    display_name: String,
    expires_at: Instant,
}

/// Per-room map of typing peers with deadline expiry.
#[derive(Debug)]
pub struct TypingTracker {
    ttl: Duration,
    rooms: HashMap<String, HashMap<String, TypingEntry>>,
}

impl TypingTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            rooms: HashMap::new(),
        }
    }

    /// Insert or refresh a typing peer, re-arming its expiry deadline.
    pub fn on_typing_start(
        &mut self,
        display: &str,
        user_id: &str,
        name: Option<&str>,
        now: Instant,
    ) {
        let entry = TypingEntry {
            display_name: name.unwrap_or(FALLBACK_TYPER_NAME).to_owned(),
            expires_at: now + self.ttl,
        };
        self.rooms
            .entry(display.to_owned())
            .or_default()
            .insert(user_id.to_owned(), entry);
    }

    /// Remove a typing peer. Returns whether anything changed.
    pub fn on_typing_stop(&mut self, display: &str, user_id: &str) -> bool {
        self.rooms
            .get_mut(display)
            .is_some_and(|room| room.remove(user_id).is_some())
    }

    /// Drop expired entries; returns the display keys of rooms that changed.
    pub fn sweep(&mut self, now: Instant) -> Vec<String> {
        let mut changed = Vec::new();
        for (display, room) in &mut self.rooms {
            let before = room.len();
            room.retain(|_, entry| entry.expires_at > now);
            if room.len() != before {
                changed.push(display.clone());
            }
        }
        self.rooms.retain(|_, room| !room.is_empty());
        changed.sort();
        changed
    }

    /// Earliest pending expiry deadline across all rooms, for timer arming.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.rooms
            .values()
            .flat_map(|room| room.values())
            .map(|entry| entry.expires_at)
            .min()
    }

    /// Sorted display names of peers currently typing in a room.
    pub fn typers(&self, display: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .rooms
            .get(display)
            .map(|room| room.values().map(|e| e.display_name.clone()).collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Drop all typing state for a room, e.g. when its view deactivates.
    pub fn clear(&mut self, display: &str) {
        self.rooms.remove(display);
    }
}

/// Composer-side rate limiter for outbound `typing.start`.
#[derive(Debug)]
pub struct TypingThrottle {
    interval: Duration,
    last_emit: Option<Instant>,
}

impl TypingThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
        }
    }

    /// Whether a keystroke at `now` should produce a wire command. The
    /// first keystroke of a burst always emits; subsequent ones only after
    /// the interval has elapsed.
    pub fn should_emit(&mut self, now: Instant) -> bool {
        match self.last_emit {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }

    /// Forget the burst, so the next keystroke emits immediately. Called
    /// when the composer goes idle or the room switches.
    pub fn reset(&mut self) {
        self.last_emit = None;
    }
}
