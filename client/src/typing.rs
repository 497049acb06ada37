use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

struct TypingEntry {
    user_id: String,
    expires_at: Instant,
}

#[derive(Default)]
struct RoomTable {
    rooms: HashMap<String, Vec<TypingEntry>>,
}

/// Tracks who is composing in each room.
///
/// Entries expire `timeout` after their last refresh. Expiry is applied
/// lazily on read rather than with a timer per entry, so an abandoned
/// entry costs nothing until the next read.
#[derive(Clone)]
pub struct TypingTracker {
    timeout: Duration,
    rooms: Arc<RwLock<RoomTable>>,
}

impl TypingTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            rooms: Arc::new(RwLock::new(RoomTable::default())),
        }
    }

    /// Insert or refresh an entry. A refresh keeps the entry's position,
    /// so the read order stays first-marked-first.
    pub fn mark_typing(&self, room_id: &str, user_id: &str, now: Instant) {
        let Ok(mut table) = self.rooms.write() else {
            return;
        };
        let entries = table.rooms.entry(room_id.to_string()).or_default();
        let expires_at = now + self.timeout;

        if let Some(entry) = entries.iter_mut().find(|entry| entry.user_id == user_id) {
            entry.expires_at = expires_at;
        } else {
            entries.push(TypingEntry {
                user_id: user_id.to_string(),
                expires_at,
            });
        }
    }

    /// Remove an entry immediately on an explicit stop.
    pub fn mark_stopped(&self, room_id: &str, user_id: &str) {
        let Ok(mut table) = self.rooms.write() else {
            return;
        };
        if let Some(entries) = table.rooms.get_mut(room_id) {
            entries.retain(|entry| entry.user_id != user_id);
        }
    }

    /// Users currently typing in a room, oldest mark first. Sweeps expired
    /// entries before answering.
    pub fn typing_users_for(&self, room_id: &str, now: Instant) -> Vec<String> {
        let Ok(mut table) = self.rooms.write() else {
            return Vec::new();
        };
        let Some(entries) = table.rooms.get_mut(room_id) else {
            return Vec::new();
        };

        entries.retain(|entry| entry.expires_at > now);
        entries.iter().map(|entry| entry.user_id.clone()).collect()
    }

    /// Forget a room entirely, used when the client leaves it.
    pub fn clear_room(&self, room_id: &str) {
        if let Ok(mut table) = self.rooms.write() {
            table.rooms.remove(room_id);
        }
    }
}
