// In-memory store implementations backing the demo binary and tests.
use super::{ConfigStore, DetailStore, RoomStore, StoreError};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use shared_model::{
    Detail, FanSpeed, MainUnit, Mode, RoomId, RoomSnapshot, Tariffs, TempRange, Timestamp,
};

// ------------------------------- rooms --------------------------------------

#[derive(Default)]
pub struct MemoryRoomStore {
    rooms: DashMap<RoomId, RoomSnapshot>,
}

impl MemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, room: RoomSnapshot) {
        self.rooms.insert(room.room_id, room);
    }

    fn with_room<T>(
        &self,
        room: RoomId,
        f: impl FnOnce(&mut RoomSnapshot) -> T,
    ) -> Result<T, StoreError> {
        let mut entry = self.rooms.get_mut(&room).ok_or(StoreError::RoomMissing(room))?;
        Ok(f(entry.value_mut()))
    }
}

impl RoomStore for MemoryRoomStore {
    fn get(&self, room: RoomId) -> Result<RoomSnapshot, StoreError> {
        self.rooms
            .get(&room)
            .map(|r| r.value().clone())
            .ok_or(StoreError::RoomMissing(room))
    }

    fn all(&self) -> Result<Vec<RoomSnapshot>, StoreError> {
        let mut rooms: Vec<_> = self.rooms.iter().map(|r| r.value().clone()).collect();
        rooms.sort_by_key(|r| r.room_id);
        Ok(rooms)
    }

    fn occupied(&self) -> Result<Vec<RoomSnapshot>, StoreError> {
        Ok(self.all()?.into_iter().filter(|r| r.occupied).collect())
    }

    fn update_temp(&self, room: RoomId, current: f64) -> Result<(), StoreError> {
        self.with_room(room, |r| r.current_temp = current)
    }

    fn update_speed(&self, room: RoomId, speed: FanSpeed) -> Result<(), StoreError> {
        self.with_room(room, |r| r.current_speed = speed)
    }

    fn update_target(&self, room: RoomId, target: f64) -> Result<(), StoreError> {
        self.with_room(room, |r| r.target_temp = target)
    }

    fn set_mode_all(&self, mode: Mode) -> Result<(), StoreError> {
        for mut entry in self.rooms.iter_mut() {
            entry.value_mut().mode = mode;
        }
        Ok(())
    }

    fn power_on_ac(
        &self,
        room: RoomId,
        at: Timestamp,
        target: f64,
        speed: FanSpeed,
    ) -> Result<(), StoreError> {
        self.with_room(room, |r| {
            r.ac_powered = true;
            r.power_on_time = Some(at);
            r.target_temp = target;
            r.current_speed = speed;
        })
    }

    fn power_off_ac(&self, room: RoomId) -> Result<(), StoreError> {
        self.with_room(room, |r| {
            r.ac_powered = false;
            r.current_speed = FanSpeed::None;
        })
    }
}

// ------------------------------- details ------------------------------------

#[derive(Default)]
pub struct MemoryDetailStore {
    rows: Mutex<Vec<Detail>>,
}

impl MemoryDetailStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every row ever appended, in append order. Test observability.
    pub fn dump(&self) -> Vec<Detail> {
        self.rows.lock().clone()
    }
}

impl DetailStore for MemoryDetailStore {
    fn append(&self, detail: Detail) -> Result<(), StoreError> {
        self.rows.lock().push(detail);
        Ok(())
    }

    fn by_room_window(
        &self,
        room: RoomId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<Detail>, StoreError> {
        Ok(self
            .rows
            .lock()
            .iter()
            .filter(|d| d.room_id == room && d.query_time >= from && d.query_time <= to)
            .cloned()
            .collect())
    }

    fn latest(&self, room: RoomId) -> Result<Option<Detail>, StoreError> {
        Ok(self.rows.lock().iter().rev().find(|d| d.room_id == room).cloned())
    }
}

// ------------------------------- config -------------------------------------

struct ConfigState {
    main_unit: MainUnit,
    cooling_range: TempRange,
    heating_range: TempRange,
    rates: Tariffs,
    default_speed: FanSpeed,
}

pub struct MemoryConfigStore {
    state: RwLock<ConfigState>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ConfigState {
                main_unit: MainUnit { on: false, mode: Mode::Cooling },
                cooling_range: TempRange { min: 18.0, max: 28.0, default: 24.0 },
                heating_range: TempRange { min: 18.0, max: 28.0, default: 22.0 },
                rates: Tariffs { low: 0.5, medium: 1.0, high: 2.0 },
                default_speed: FanSpeed::Medium,
            }),
        }
    }
}

impl Default for MemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn main_unit(&self) -> Result<MainUnit, StoreError> {
        Ok(self.state.read().main_unit)
    }

    fn set_main_unit(&self, state: MainUnit) -> Result<(), StoreError> {
        self.state.write().main_unit = state;
        Ok(())
    }

    fn temp_range(&self, mode: Mode) -> Result<TempRange, StoreError> {
        let s = self.state.read();
        Ok(match mode {
            Mode::Cooling => s.cooling_range,
            Mode::Heating => s.heating_range,
        })
    }

    fn set_temp_range(&self, mode: Mode, range: TempRange) -> Result<(), StoreError> {
        let mut s = self.state.write();
        match mode {
            Mode::Cooling => s.cooling_range = range,
            Mode::Heating => s.heating_range = range,
        }
        Ok(())
    }

    fn rates(&self) -> Result<Tariffs, StoreError> {
        Ok(self.state.read().rates)
    }

    fn set_rates(&self, rates: Tariffs) -> Result<(), StoreError> {
        self.state.write().rates = rates;
        Ok(())
    }

    fn default_speed(&self) -> Result<FanSpeed, StoreError> {
        Ok(self.state.read().default_speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared_model::DetailKind;
    use uuid::Uuid;

    #[test]
    fn room_store_power_cycle() {
        let store = MemoryRoomStore::new();
        store.insert(RoomSnapshot::occupied(1, 30.0, Mode::Cooling));

        let at = Utc::now();
        store.power_on_ac(1, at, 24.0, FanSpeed::Medium).expect("power on");
        let room = store.get(1).expect("get");
        assert!(room.ac_powered);
        assert_eq!(room.power_on_time, Some(at));
        assert_eq!(room.target_temp, 24.0);

        store.power_off_ac(1).expect("power off");
        let room = store.get(1).expect("get");
        assert!(!room.ac_powered);
        assert_eq!(room.current_speed, FanSpeed::None);
    }

    #[test]
    fn unknown_room_is_an_error() {
        let store = MemoryRoomStore::new();
        assert!(matches!(store.get(99), Err(StoreError::RoomMissing(99))));
        assert!(store.update_temp(99, 20.0).is_err());
    }

    #[test]
    fn occupied_filters_vacant_rooms() {
        let store = MemoryRoomStore::new();
        store.insert(RoomSnapshot::occupied(1, 30.0, Mode::Cooling));
        let mut vacant = RoomSnapshot::occupied(2, 30.0, Mode::Cooling);
        vacant.occupied = false;
        store.insert(vacant);

        assert_eq!(store.all().expect("all").len(), 2);
        let occupied = store.occupied().expect("occupied");
        assert_eq!(occupied.len(), 1);
        assert_eq!(occupied[0].room_id, 1);
    }

    #[test]
    fn detail_window_filters_by_room_and_time() {
        let store = MemoryDetailStore::new();
        let t0 = Utc::now();
        for (room, offset) in [(1, 0), (1, 10), (2, 5)] {
            store
                .append(Detail {
                    id: Uuid::new_v4(),
                    room_id: room,
                    kind: DetailKind::ServiceStart,
                    query_time: t0 + chrono::TimeDelta::seconds(offset),
                    segment_start: t0,
                    segment_end: t0,
                    serve_seconds: 0,
                    speed: FanSpeed::Low,
                    rate: 0.5,
                    temp_change: 0.0,
                    current_temp: 25.0,
                    target_temp: 24.0,
                    cost: 0.0,
                })
                .expect("append");
        }
        let rows = store
            .by_room_window(1, t0, t0 + chrono::TimeDelta::seconds(5))
            .expect("window");
        assert_eq!(rows.len(), 1);
        let rows = store
            .by_room_window(1, t0, t0 + chrono::TimeDelta::seconds(10))
            .expect("window");
        assert_eq!(rows.len(), 2);
        assert!(store.latest(2).expect("latest").is_some());
        assert!(store.latest(3).expect("latest").is_none());
    }
}
