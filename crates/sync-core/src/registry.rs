use std::collections::HashMap;

/// Two-way map between a room's display key (UI and bucket key) and its
/// canonical key (the ID the wire protocol and history API use).
///
/// Server events arrive keyed by canonical ID; every store lookup happens
/// under the display key, so inbound keys are resolved here before any
/// bucket access. Unknown keys pass through unchanged: a key the registry
/// has never seen is treated as already being a display key.
#[derive(Debug, Default, Clone)]
pub struct RoomKeyRegistry {
    display_by_canonical: HashMap<String, String>,
    canonical_by_display: HashMap<String, String>,
}

impl RoomKeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a display/canonical pair. Re-registering either key replaces
    /// the stale counterpart so the mapping stays one-to-one.
    pub fn register(&mut self, display: impl Into<String>, canonical: impl Into<String>) {
        let display = display.into();
        let canonical = canonical.into();

        if let Some(old_canonical) = self.canonical_by_display.get(&display)
            && old_canonical != &canonical
        {
            self.display_by_canonical.remove(old_canonical);
        }
        if let Some(old_display) = self.display_by_canonical.get(&canonical)
            && old_display != &display
        {
            self.canonical_by_display.remove(old_display);
        }

        self.display_by_canonical
            .insert(canonical.clone(), display.clone());
        self.canonical_by_display.insert(display, canonical);
    }

    /// Resolve any inbound room key to its display key. Known canonical
    /// keys map; everything else is returned unchanged.
    pub fn to_display_key<'a>(&'a self, key: &'a str) -> &'a str {
        self.display_by_canonical
            .get(key)
            .map(String::as_str)
            .unwrap_or(key)
    }

    /// Resolve a display key to its canonical wire key, when known.
    pub fn to_canonical_key(&self, display: &str) -> Option<&str> {
        self.canonical_by_display.get(display).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_canonical_to_display() {
        let mut registry = RoomKeyRegistry::new();
        registry.register("general", "room-uuid-1");
        assert_eq!(registry.to_display_key("room-uuid-1"), "general");
        assert_eq!(registry.to_canonical_key("general"), Some("room-uuid-1"));
    }

    #[test]
    fn passes_unknown_keys_through() {
        let registry = RoomKeyRegistry::new();
        assert_eq!(registry.to_display_key("never-seen"), "never-seen");
        assert_eq!(registry.to_canonical_key("never-seen"), None);
    }

    #[test]
    fn display_key_survives_round_trip() {
        let mut registry = RoomKeyRegistry::new();
        registry.register("general", "room-uuid-1");
        // A display key fed back in is already a display key.
        assert_eq!(registry.to_display_key("general"), "general");
    }

    #[test]
    fn re_registration_replaces_stale_pairing() {
        let mut registry = RoomKeyRegistry::new();
        registry.register("general", "room-uuid-1");
        registry.register("general", "room-uuid-2");

        assert_eq!(registry.to_display_key("room-uuid-2"), "general");
        assert_eq!(registry.to_canonical_key("general"), Some("room-uuid-2"));
        // The stale canonical key no longer maps anywhere.
        assert_eq!(registry.to_display_key("room-uuid-1"), "room-uuid-1");
    }
}
