// Indexed max-heap of deferred requests: highest fan-speed priority first,
// oldest enqueue first within a priority. The heap entries carry their
// position (via the priority-queue crate), so a speed change while waiting is
// a heap fix rather than a rebuild.
use priority_queue::PriorityQueue;
use shared_model::{FanSpeed, RoomId, Timestamp};
use std::cmp::Reverse;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct WaitEntry {
    pub room_id: RoomId,
    pub speed: FanSpeed,
    pub target_temp: f64,
    pub current_temp: f64,
    pub enqueue_time: Timestamp,
    /// Seconds left on this waiter's slice; aged by the service tick.
    pub wait_remaining: f64,
    pub priority: u8,
}

/// Heap key: speed priority descending, then enqueue order ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct WaitKey {
    priority: u8,
    order: Reverse<u64>,
}

pub struct PriorityWaitQueue {
    heap: PriorityQueue<RoomId, WaitKey>,
    entries: HashMap<RoomId, WaitEntry>,
    next_order: u64,
}

impl Default for PriorityWaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityWaitQueue {
    pub fn new() -> Self {
        Self { heap: PriorityQueue::new(), entries: HashMap::new(), next_order: 0 }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, room: RoomId) -> bool {
        self.entries.contains_key(&room)
    }

    pub fn get(&self, room: RoomId) -> Option<&WaitEntry> {
        self.entries.get(&room)
    }

    /// Replaces any previous entry for the same room.
    pub fn push(&mut self, entry: WaitEntry) {
        let key = WaitKey { priority: entry.priority, order: Reverse(self.next_order) };
        self.next_order += 1;
        self.heap.push(entry.room_id, key);
        self.entries.insert(entry.room_id, entry);
    }

    /// Highest-priority waiter, ties broken by oldest enqueue.
    pub fn pop(&mut self) -> Option<WaitEntry> {
        let (room, _) = self.heap.pop()?;
        self.entries.remove(&room)
    }

    pub fn peek(&self) -> Option<&WaitEntry> {
        let (room, _) = self.heap.peek()?;
        self.entries.get(room)
    }

    pub fn remove(&mut self, room: RoomId) -> Option<WaitEntry> {
        self.heap.remove(&room);
        self.entries.remove(&room)
    }

    /// In-place mutation; the heap position is fixed afterwards while the
    /// original enqueue order is kept.
    pub fn update(&mut self, room: RoomId, f: impl FnOnce(&mut WaitEntry)) -> bool {
        let Some(entry) = self.entries.get_mut(&room) else {
            return false;
        };
        f(entry);
        let priority = entry.priority;
        if let Some(old) = self.heap.get_priority(&room).copied() {
            if old.priority != priority {
                self.heap.change_priority(&room, WaitKey { priority, order: old.order });
            }
        }
        true
    }

    /// Room ids in pop order; a stable snapshot for aging passes.
    pub fn rooms(&self) -> Vec<RoomId> {
        let mut keyed: Vec<_> = self.heap.iter().map(|(room, key)| (*key, *room)).collect();
        keyed.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        keyed.into_iter().map(|(_, room)| room).collect()
    }

    /// Entries in pop order.
    pub fn snapshot(&self) -> Vec<WaitEntry> {
        self.rooms()
            .into_iter()
            .filter_map(|room| self.entries.get(&room).cloned())
            .collect()
    }

    /// Zero-based queue position in pop order.
    pub fn position(&self, room: RoomId) -> Option<usize> {
        self.rooms().iter().position(|r| *r == room)
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.entries.clear();
    }
}
