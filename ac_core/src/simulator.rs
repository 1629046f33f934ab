// Idle-room temperature drift and drift-triggered resubmission. Serviced
// rooms are advanced inside the scheduler's own tick; this loop handles
// everything the compressor is not touching.
use crate::config::Config;
use crate::errors::AcError;
use crate::events::{EventBus, TemperatureEvent};
use crate::scheduler::Scheduler;
use crate::stores::{ConfigStore, RoomStore};
use shared_model::{FanSpeed, RoomId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct TemperatureSimulator {
    cfg: Arc<Config>,
    rooms: Arc<dyn RoomStore>,
    config_store: Arc<dyn ConfigStore>,
    scheduler: Arc<Scheduler>,
    bus: Arc<EventBus>,
}

impl TemperatureSimulator {
    pub fn new(
        cfg: Arc<Config>,
        rooms: Arc<dyn RoomStore>,
        config_store: Arc<dyn ConfigStore>,
        scheduler: Arc<Scheduler>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self { cfg, rooms, config_store, scheduler, bus }
    }

    /// One recovery pass: drift every unserviced room toward its ambient
    /// baseline, then resubmit powered rooms that drifted too far from
    /// target. Submissions happen after the drift pass, without holding any
    /// scheduler state.
    pub fn recovery_tick(&self) {
        let in_service: HashSet<RoomId> = self
            .scheduler
            .snapshot_service()
            .into_iter()
            .map(|e| e.room_id)
            .collect();

        let all = match self.rooms.all() {
            Ok(rooms) => rooms,
            Err(e) => {
                warn!(error = %e, "room scan failed, skipping recovery tick");
                return;
            }
        };

        let mut resubmit: Vec<(RoomId, FanSpeed, f64, f64)> = Vec::new();

        for room in all {
            if in_service.contains(&room.room_id) {
                continue;
            }

            let current = self.drift_room(room.room_id, room.current_temp, room.initial_temp);

            if !room.ac_powered {
                continue;
            }
            let off_target = (current - room.target_temp).abs();
            if off_target >= self.cfg.resubmit_threshold
                && !self.scheduler.is_waiting(room.room_id)
            {
                let speed = self.effective_speed(room.current_speed);
                resubmit.push((room.room_id, speed, room.target_temp, current));
            }
        }

        for (room, speed, target, current) in resubmit {
            debug!(room, speed = ?speed, "drift resubmission");
            match self.scheduler.submit(room, speed, target, current) {
                Ok(_) | Err(AcError::CentralOff) => {}
                Err(e) => warn!(room, error = %e, "drift resubmission rejected"),
            }
        }
    }

    /// Move one room toward its baseline by the recovery rate, clamped so it
    /// never crosses it. Returns the temperature after the step.
    fn drift_room(&self, room: RoomId, current: f64, baseline: f64) -> f64 {
        let delta = baseline - current;
        if delta == 0.0 {
            return current;
        }
        let step = self.cfg.recovery_rate.min(delta.abs()).copysign(delta);
        let drifted = current + step;
        if let Err(e) = self.rooms.update_temp(room, drifted) {
            warn!(room, error = %e, "drift write-back failed");
            return current;
        }
        self.bus
            .publish_temperature(TemperatureEvent::Drifted { room, current: drifted, baseline });
        drifted
    }

    /// The room's last requested speed, or the configured default when the
    /// fan is off.
    fn effective_speed(&self, last: FanSpeed) -> FanSpeed {
        if last.is_active() {
            return last;
        }
        self.config_store.default_speed().unwrap_or(FanSpeed::Medium)
    }
}
