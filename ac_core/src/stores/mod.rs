// Outbound persistence seams. Synchronous, internally thread-safe; each
// operation is atomic per its own contract, nothing spans two stores.
pub mod memory;

use shared_model::{
    Detail, FanSpeed, MainUnit, Mode, RoomId, RoomSnapshot, Tariffs, TempRange, Timestamp,
};
use thiserror::Error;

pub use memory::{MemoryConfigStore, MemoryDetailStore, MemoryRoomStore};

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("room {0} not found")] RoomMissing(RoomId),
    #[error("backend: {0}")] Backend(String),
}

pub trait RoomStore: Send + Sync {
    fn get(&self, room: RoomId) -> Result<RoomSnapshot, StoreError>;
    fn all(&self) -> Result<Vec<RoomSnapshot>, StoreError>;
    fn occupied(&self) -> Result<Vec<RoomSnapshot>, StoreError>;
    fn update_temp(&self, room: RoomId, current: f64) -> Result<(), StoreError>;
    fn update_speed(&self, room: RoomId, speed: FanSpeed) -> Result<(), StoreError>;
    fn update_target(&self, room: RoomId, target: f64) -> Result<(), StoreError>;
    fn set_mode_all(&self, mode: Mode) -> Result<(), StoreError>;
    fn power_on_ac(
        &self,
        room: RoomId,
        at: Timestamp,
        target: f64,
        speed: FanSpeed,
    ) -> Result<(), StoreError>;
    fn power_off_ac(&self, room: RoomId) -> Result<(), StoreError>;
}

pub trait DetailStore: Send + Sync {
    fn append(&self, detail: Detail) -> Result<(), StoreError>;
    /// Details for a room with `query_time` in `[from, to]`, in append order.
    fn by_room_window(
        &self,
        room: RoomId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<Detail>, StoreError>;
    fn latest(&self, room: RoomId) -> Result<Option<Detail>, StoreError>;
}

pub trait ConfigStore: Send + Sync {
    fn main_unit(&self) -> Result<MainUnit, StoreError>;
    fn set_main_unit(&self, state: MainUnit) -> Result<(), StoreError>;
    fn temp_range(&self, mode: Mode) -> Result<TempRange, StoreError>;
    fn set_temp_range(&self, mode: Mode, range: TempRange) -> Result<(), StoreError>;
    fn rates(&self) -> Result<Tariffs, StoreError>;
    fn set_rates(&self, rates: Tariffs) -> Result<(), StoreError>;
    fn default_speed(&self) -> Result<FanSpeed, StoreError>;
}
