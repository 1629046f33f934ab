// Bounded map of rooms currently holding a compressor slot.
use shared_model::{FanSpeed, RoomId, Timestamp};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ServiceEntry {
    pub room_id: RoomId,
    pub speed: FanSpeed,
    pub target_temp: f64,
    pub current_temp: f64,
    /// When this room/speed segment became active.
    pub segment_start: Timestamp,
    /// Room temperature at `segment_start`, for the segment's temp delta.
    pub segment_start_temp: f64,
    pub power_on_time: Timestamp,
    /// Seconds since `segment_start`, refreshed each service tick.
    pub duration: f64,
}

impl ServiceEntry {
    pub fn seconds_active(&self, now: Timestamp) -> f64 {
        (now - self.segment_start).num_milliseconds() as f64 / 1000.0
    }
}

#[derive(Debug)]
pub struct ServiceSet {
    capacity: usize,
    entries: HashMap<RoomId, ServiceEntry>,
}

impl ServiceSet {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, entries: HashMap::with_capacity(capacity) }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn contains(&self, room: RoomId) -> bool {
        self.entries.contains_key(&room)
    }

    pub fn get(&self, room: RoomId) -> Option<&ServiceEntry> {
        self.entries.get(&room)
    }

    pub fn get_mut(&mut self, room: RoomId) -> Option<&mut ServiceEntry> {
        self.entries.get_mut(&room)
    }

    /// False when at capacity or the room already holds a slot; the caller
    /// treats that as an invariant violation, not a wait condition.
    pub fn insert(&mut self, entry: ServiceEntry) -> bool {
        if self.is_full() || self.entries.contains_key(&entry.room_id) {
            return false;
        }
        self.entries.insert(entry.room_id, entry);
        true
    }

    pub fn remove(&mut self, room: RoomId) -> Option<ServiceEntry> {
        self.entries.remove(&room)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceEntry> {
        self.entries.values()
    }

    /// Room ids in ascending order; a stable iteration base for tick passes.
    pub fn rooms(&self) -> Vec<RoomId> {
        let mut rooms: Vec<_> = self.entries.keys().copied().collect();
        rooms.sort_unstable();
        rooms
    }

    pub fn snapshot(&self) -> Vec<ServiceEntry> {
        let mut entries: Vec<_> = self.entries.values().cloned().collect();
        entries.sort_by_key(|e| e.room_id);
        entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
