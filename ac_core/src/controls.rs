// Protocol-agnostic room operations: the contract an HTTP layer would bind.
use crate::Core;
use crate::billing::Fees;
use crate::errors::AcError;
use crate::events::LifecycleEvent;
use crate::scheduler::{DetailSink, SegmentEvent};
use crate::stores::StoreError;
use shared_model::{DetailKind, FanSpeed, Mode, RoomId, RoomSnapshot};
use tracing::info;

/// What a room panel shows right after power-on.
#[derive(Debug, Clone)]
pub struct RoomStatus {
    pub room_id: RoomId,
    pub current_temp: f64,
    pub target_temp: f64,
    pub speed: FanSpeed,
    pub mode: Mode,
    pub fees: Fees,
}

/// Full observer view of one room, including its queue standing.
#[derive(Debug, Clone)]
pub struct RoomStateView {
    pub room: RoomSnapshot,
    pub in_service: bool,
    pub wait_position: Option<usize>,
    pub wait_remaining: Option<f64>,
    pub fees: Fees,
}

impl Core {
    fn room_checked(&self, room_id: RoomId) -> Result<RoomSnapshot, AcError> {
        self.rooms.get(room_id).map_err(|e| match e {
            StoreError::RoomMissing(id) => AcError::RoomNotFound(id),
            other => AcError::Store(other),
        })
    }

    /// Power a room's AC on at the mode's default target and the configured
    /// default speed, and request service immediately.
    pub fn room_power_on(&self, room_id: RoomId) -> Result<RoomStatus, AcError> {
        let main = self.config_store.main_unit()?;
        if !main.on {
            return Err(AcError::CentralOff);
        }
        let room = self.room_checked(room_id)?;
        if !room.occupied {
            return Err(AcError::RoomNotOccupied(room_id));
        }
        if room.ac_powered {
            return Err(AcError::RoomAlreadyPowered(room_id));
        }

        let range = self.config_store.temp_range(main.mode)?;
        let speed = self.config_store.default_speed()?;
        let now = self.clock.now();
        self.rooms.power_on_ac(room_id, now, range.default, speed)?;
        self.billing.record(SegmentEvent::marker(
            room_id,
            DetailKind::PowerOn,
            FanSpeed::None,
            now,
            room.current_temp,
            range.default,
        ));
        self.bus.publish_lifecycle(LifecycleEvent::RoomPoweredOn { room: room_id });

        let admitted = self.scheduler.submit(room_id, speed, range.default, room.current_temp)?;
        info!(room = room_id, admitted, "room AC powered on");

        let fees = self.fees(room_id)?;
        Ok(RoomStatus {
            room_id,
            current_temp: room.current_temp,
            target_temp: range.default,
            speed,
            mode: main.mode,
            fees,
        })
    }

    /// Power a room's AC off: cancel any queue presence (closing an open
    /// segment), mark the boundary, and return the final fees.
    pub fn room_power_off(&self, room_id: RoomId) -> Result<Fees, AcError> {
        let room = self.room_checked(room_id)?;
        if !room.ac_powered {
            return Err(AcError::RoomNotPowered(room_id));
        }

        self.scheduler.cancel(room_id);
        let now = self.clock.now();
        let current = self
            .rooms
            .get(room_id)
            .map(|r| r.current_temp)
            .unwrap_or(room.current_temp);
        self.billing.record(SegmentEvent::marker(
            room_id,
            DetailKind::PowerOff,
            room.current_speed,
            now,
            current,
            room.target_temp,
        ));

        let fees = self.fees(room_id)?;
        self.rooms.power_off_ac(room_id)?;
        self.bus.publish_lifecycle(LifecycleEvent::RoomPoweredOff { room: room_id });
        info!(room = room_id, session = fees.current, "room AC powered off");
        Ok(fees)
    }

    /// Re-target a powered room at its present speed.
    pub fn set_target_temp(&self, room_id: RoomId, target: f64) -> Result<(), AcError> {
        let room = self.room_checked(room_id)?;
        if !room.ac_powered {
            return Err(AcError::RoomNotPowered(room_id));
        }
        let speed = self
            .scheduler
            .service_entry(room_id)
            .map(|e| e.speed)
            .or_else(|| self.scheduler.wait_entry(room_id).map(|e| e.speed))
            .unwrap_or(room.current_speed);
        let speed = if speed.is_active() {
            speed
        } else {
            self.config_store.default_speed()?
        };
        self.scheduler.submit(room_id, speed, target, room.current_temp)?;
        Ok(())
    }

    /// Change a powered room's fan speed, keeping its target.
    pub fn set_fan_speed(&self, room_id: RoomId, speed: FanSpeed) -> Result<(), AcError> {
        let room = self.room_checked(room_id)?;
        if !room.ac_powered {
            return Err(AcError::RoomNotPowered(room_id));
        }
        self.scheduler.submit(room_id, speed, room.target_temp, room.current_temp)?;
        Ok(())
    }

    /// Read-only composite of store state, queue standing and fees.
    pub fn room_state(&self, room_id: RoomId) -> Result<RoomStateView, AcError> {
        let room = self.room_checked(room_id)?;
        let fees = self.fees(room_id)?;
        let wait = self.scheduler.wait_entry(room_id);
        Ok(RoomStateView {
            in_service: self.scheduler.in_service(room_id),
            wait_position: self.scheduler.wait_position(room_id),
            wait_remaining: wait.map(|e| e.wait_remaining),
            room,
            fees,
        })
    }
}
