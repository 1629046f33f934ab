// Process-wide on/mode state, tariff and range administration. The central
// unit gates request admission and owns the shutdown detail trail.
use crate::clock::Clock;
use crate::errors::AcError;
use crate::events::{EventBus, LifecycleEvent};
use crate::scheduler::{DetailSink, Scheduler, SegmentEvent};
use crate::stores::{ConfigStore, RoomStore};
use shared_model::{DetailKind, MainUnit, Mode, RoomSnapshot, Tariffs, TempRange};
use std::sync::Arc;
use tracing::{info, warn};

pub struct CentralUnit {
    clock: Arc<dyn Clock>,
    rooms: Arc<dyn RoomStore>,
    config_store: Arc<dyn ConfigStore>,
    scheduler: Arc<Scheduler>,
    sink: Arc<dyn DetailSink>,
    bus: Arc<EventBus>,
}

impl CentralUnit {
    pub fn new(
        clock: Arc<dyn Clock>,
        rooms: Arc<dyn RoomStore>,
        config_store: Arc<dyn ConfigStore>,
        scheduler: Arc<Scheduler>,
        sink: Arc<dyn DetailSink>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self { clock, rooms, config_store, scheduler, sink, bus }
    }

    pub fn is_on(&self) -> Result<bool, AcError> {
        Ok(self.config_store.main_unit()?.on)
    }

    pub fn mode(&self) -> Result<Mode, AcError> {
        Ok(self.config_store.main_unit()?.mode)
    }

    /// Bring the installation up with a mode, target window and tariffs.
    /// Does not start any per-room AC.
    pub fn power_on(&self, mode: Mode, range: TempRange, rates: Tariffs) -> Result<(), AcError> {
        if self.config_store.main_unit()?.on {
            return Err(AcError::CentralAlreadyOn);
        }
        range.validate()?;
        rates.validate()?;
        self.config_store.set_temp_range(mode, range)?;
        self.config_store.set_rates(rates)?;
        self.config_store.set_main_unit(MainUnit { on: true, mode })?;
        self.rooms.set_mode_all(mode)?;
        self.bus.publish_lifecycle(LifecycleEvent::CentralPoweredOn { mode });
        info!(mode = ?mode, "central unit powered on");
        Ok(())
    }

    /// Shut the installation down: one power-off detail per powered room
    /// (carrying the open segment's cost for serviced rooms), then drop all
    /// scheduler state. Idempotent.
    pub fn power_off(&self) -> Result<(), AcError> {
        if !self.config_store.main_unit()?.on {
            return Ok(());
        }
        let now = self.clock.now();
        let service = self.scheduler.snapshot_service();

        for room in self.rooms.all()? {
            if !room.ac_powered {
                continue;
            }
            let ev = match service.iter().find(|e| e.room_id == room.room_id) {
                Some(open) => SegmentEvent {
                    room_id: room.room_id,
                    kind: DetailKind::PowerOff,
                    speed: open.speed,
                    segment_start: open.segment_start,
                    segment_end: now,
                    start_temp: open.segment_start_temp,
                    current_temp: open.current_temp,
                    target_temp: open.target_temp,
                },
                None => SegmentEvent::marker(
                    room.room_id,
                    DetailKind::PowerOff,
                    room.current_speed,
                    now,
                    room.current_temp,
                    room.target_temp,
                ),
            };
            self.sink.record(ev);
            if let Err(e) = self.rooms.power_off_ac(room.room_id) {
                warn!(room = room.room_id, error = %e, "room power-off failed");
            }
            self.bus
                .publish_lifecycle(LifecycleEvent::RoomPoweredOff { room: room.room_id });
        }

        self.scheduler.clear();
        self.config_store.set_main_unit(MainUnit {
            on: false,
            mode: self.config_store.main_unit()?.mode,
        })?;
        self.bus.publish_lifecycle(LifecycleEvent::CentralPoweredOff);
        info!("central unit powered off");
        Ok(())
    }

    /// Switch between cooling and heating. Drops all scheduler state; rooms
    /// re-request service as they drift.
    pub fn set_mode(&self, mode: Mode) -> Result<(), AcError> {
        let main = self.config_store.main_unit()?;
        if !main.on {
            return Err(AcError::CentralOff);
        }
        if main.mode == mode {
            return Ok(());
        }
        self.scheduler.clear();
        self.config_store.set_main_unit(MainUnit { on: true, mode })?;
        self.rooms.set_mode_all(mode)?;
        self.bus.publish_lifecycle(LifecycleEvent::ModeChanged { mode });
        info!(mode = ?mode, "installation mode changed");
        Ok(())
    }

    /// Replace a mode's target window. Active rooms whose target falls
    /// outside the new window are coerced to the nearest bound, routed
    /// through the scheduler so their running segments close correctly.
    pub fn set_temp_range(&self, mode: Mode, range: TempRange) -> Result<(), AcError> {
        range.validate()?;
        self.config_store.set_temp_range(mode, range)?;
        info!(mode = ?mode, min = range.min, max = range.max, "target window updated");

        if self.config_store.main_unit()?.mode != mode {
            return Ok(());
        }
        for room in self.rooms.all()? {
            if !room.ac_powered || range.contains(room.target_temp) {
                continue;
            }
            let coerced = range.clamp(room.target_temp);
            if let Err(e) = self.coerce_target(&room, coerced) {
                warn!(room = room.room_id, error = %e, "target coercion failed");
            }
        }
        Ok(())
    }

    fn coerce_target(&self, room: &RoomSnapshot, target: f64) -> Result<(), AcError> {
        self.rooms.update_target(room.room_id, target)?;
        let speed = self
            .scheduler
            .service_entry(room.room_id)
            .map(|e| e.speed)
            .or_else(|| self.scheduler.wait_entry(room.room_id).map(|e| e.speed));
        if let Some(speed) = speed {
            self.scheduler.submit(room.room_id, speed, target, room.current_temp)?;
        }
        Ok(())
    }

    pub fn set_rates(&self, rates: Tariffs) -> Result<(), AcError> {
        rates.validate()?;
        self.config_store.set_rates(rates)?;
        info!(low = rates.low, medium = rates.medium, high = rates.high, "tariffs updated");
        Ok(())
    }
}
