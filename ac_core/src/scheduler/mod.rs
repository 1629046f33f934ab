// The admission / preemption / rotation state machine. One readers-writer
// lock guards both queue structures; every mutator holds the writer, readers
// take immutable snapshots. Detail emission happens inside the critical
// section so per-room detail order equals event-time order.
pub mod service_set;
pub mod wait_queue;

use crate::clock::Clock;
use crate::config::Config;
use crate::errors::AcError;
use crate::events::{EventBus, QueueEvent, TemperatureEvent};
use crate::stores::{ConfigStore, RoomStore, StoreError};
use parking_lot::RwLock;
use shared_model::{DetailKind, FanSpeed, RoomId, Timestamp};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub use service_set::{ServiceEntry, ServiceSet};
pub use wait_queue::{PriorityWaitQueue, WaitEntry};

/// One service-boundary event, handed outward through [`DetailSink`]. The
/// scheduler knows segment boundaries; the sink owns tariffs and cost
/// arithmetic.
#[derive(Debug, Clone)]
pub struct SegmentEvent {
    pub room_id: RoomId,
    pub kind: DetailKind,
    /// Speed the segment ran at (for closed segments, the speed being billed).
    pub speed: FanSpeed,
    pub segment_start: Timestamp,
    pub segment_end: Timestamp,
    pub start_temp: f64,
    pub current_temp: f64,
    pub target_temp: f64,
}

impl SegmentEvent {
    /// Boundary marker with no billable span.
    pub fn marker(
        room_id: RoomId,
        kind: DetailKind,
        speed: FanSpeed,
        at: Timestamp,
        current_temp: f64,
        target_temp: f64,
    ) -> Self {
        Self {
            room_id,
            kind,
            speed,
            segment_start: at,
            segment_end: at,
            start_temp: current_temp,
            current_temp,
            target_temp,
        }
    }
}

/// Outbound seam to the billing side.
pub trait DetailSink: Send + Sync {
    fn record(&self, event: SegmentEvent);
}

struct Inner {
    service: ServiceSet,
    wait: PriorityWaitQueue,
}

pub struct Scheduler {
    cfg: Arc<Config>,
    clock: Arc<dyn Clock>,
    rooms: Arc<dyn RoomStore>,
    config_store: Arc<dyn ConfigStore>,
    sink: Arc<dyn DetailSink>,
    bus: Arc<EventBus>,
    inner: RwLock<Inner>,
}

impl Scheduler {
    pub fn new(
        cfg: Arc<Config>,
        clock: Arc<dyn Clock>,
        rooms: Arc<dyn RoomStore>,
        config_store: Arc<dyn ConfigStore>,
        sink: Arc<dyn DetailSink>,
        bus: Arc<EventBus>,
    ) -> Self {
        let inner = Inner {
            service: ServiceSet::new(cfg.max_services),
            wait: PriorityWaitQueue::new(),
        };
        Self { cfg, clock, rooms, config_store, sink, bus, inner: RwLock::new(inner) }
    }

    // ------------------------------ public API ------------------------------

    /// Admit or defer a service request. Returns whether the room went
    /// straight into service.
    pub fn submit(
        &self,
        room_id: RoomId,
        speed: FanSpeed,
        target_temp: f64,
        current_temp: f64,
    ) -> Result<bool, AcError> {
        let main = self.config_store.main_unit()?;
        if !main.on {
            return Err(AcError::CentralOff);
        }
        if !speed.is_active() {
            return Err(AcError::InvalidSpeed(speed));
        }
        let range = self.config_store.temp_range(main.mode)?;
        if !current_temp.is_finite() || !range.contains(target_temp) {
            return Err(AcError::InvalidTemp { target: target_temp, min: range.min, max: range.max });
        }
        let room = self.rooms.get(room_id).map_err(|e| match e {
            StoreError::RoomMissing(id) => AcError::RoomNotFound(id),
            other => AcError::Store(other),
        })?;
        if !room.ac_powered {
            return Err(AcError::RoomNotPowered(room_id));
        }

        let now = self.clock.now();
        let power_on_time = room.power_on_time.unwrap_or(now);
        let mut inner = self.inner.write();
        Ok(self.admit_locked(&mut inner, room_id, speed, target_temp, current_temp, power_on_time, now))
    }

    /// Idempotent removal from both structures. Frees slots promote a waiter.
    pub fn cancel(&self, room_id: RoomId) -> bool {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        if let Some(entry) = inner.service.remove(room_id) {
            self.sink.record(interrupt_event(&entry, now));
            self.bus.publish_queue(QueueEvent::Removed { room: room_id });
            info!(room = room_id, "service cancelled");
            if let Some(waiter) = inner.wait.pop() {
                self.promote_locked(&mut inner, waiter, now);
            }
            true
        } else if inner.wait.remove(room_id).is_some() {
            self.bus.publish_queue(QueueEvent::Removed { room: room_id });
            info!(room = room_id, "wait entry cancelled");
            true
        } else {
            false
        }
    }

    /// Empties both structures without per-room interrupts. The central-unit
    /// shutdown path owns the power-off details for each room.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        let dropped = inner.service.len() + inner.wait.len();
        inner.service.clear();
        inner.wait.clear();
        if dropped > 0 {
            info!(dropped, "scheduler cleared");
        }
    }

    pub fn snapshot_service(&self) -> Vec<ServiceEntry> {
        self.inner.read().service.snapshot()
    }

    pub fn snapshot_wait(&self) -> Vec<WaitEntry> {
        self.inner.read().wait.snapshot()
    }

    pub fn service_entry(&self, room: RoomId) -> Option<ServiceEntry> {
        self.inner.read().service.get(room).cloned()
    }

    pub fn wait_entry(&self, room: RoomId) -> Option<WaitEntry> {
        self.inner.read().wait.get(room).cloned()
    }

    pub fn in_service(&self, room: RoomId) -> bool {
        self.inner.read().service.contains(room)
    }

    pub fn is_waiting(&self, room: RoomId) -> bool {
        self.inner.read().wait.contains(room)
    }

    pub fn wait_position(&self, room: RoomId) -> Option<usize> {
        self.inner.read().wait.position(room)
    }

    /// One scheduler pass: temperature progress and target detection for
    /// serviced rooms, then forced rotation of over-long services, then
    /// wait-slice aging with same-speed rotation.
    pub fn service_tick(&self) {
        let now = self.clock.now();
        let tick = self.cfg.tick_secs();
        let mut inner = self.inner.write();

        for room_id in inner.service.rooms() {
            self.advance_room_locked(&mut inner, room_id, now);
        }

        self.rotate_timed_out_locked(&mut inner, now);

        for room_id in inner.wait.rooms() {
            self.age_waiter_locked(&mut inner, room_id, tick, now);
        }
    }

    // ---------------------------- admission ---------------------------------

    fn admit_locked(
        &self,
        inner: &mut Inner,
        room_id: RoomId,
        speed: FanSpeed,
        target: f64,
        current: f64,
        power_on_time: Timestamp,
        now: Timestamp,
    ) -> bool {
        // 1. already in service: refresh in place
        if inner.service.contains(room_id) {
            return self.update_serviced_locked(inner, room_id, speed, target, now);
        }

        // 2. already waiting: upgrade re-enters admission, the rest is an
        //    in-place update
        if let Some(prev) = inner.wait.get(room_id).cloned() {
            if speed.priority() > prev.priority {
                inner.wait.remove(room_id);
                self.sink.record(SegmentEvent::marker(
                    room_id,
                    DetailKind::SpeedChange,
                    speed,
                    now,
                    prev.current_temp,
                    target,
                ));
                info!(room = room_id, from = ?prev.speed, to = ?speed, "wait upgrade, re-admitting");
            } else {
                let changed = prev.speed != speed;
                inner.wait.update(room_id, |e| {
                    e.speed = speed;
                    e.priority = speed.priority();
                    e.target_temp = target;
                });
                if changed {
                    self.sink.record(SegmentEvent::marker(
                        room_id,
                        DetailKind::SpeedChange,
                        speed,
                        now,
                        prev.current_temp,
                        target,
                    ));
                    if let Err(e) = self.rooms.update_speed(room_id, speed) {
                        warn!(room = room_id, error = %e, "speed write-back failed");
                    }
                }
                if let Err(e) = self.rooms.update_target(room_id, target) {
                    warn!(room = room_id, error = %e, "target write-back failed");
                }
                return false;
            }
        }

        // 3. spare capacity
        if !inner.service.is_full() {
            self.start_service_locked(inner, room_id, speed, target, current, power_on_time, now);
            return true;
        }

        // 4. priority preemption
        if let Some(victim_id) = pick_preemption_victim(&inner.service, speed.priority(), now) {
            self.rotate_out_locked(inner, victim_id, now);
            self.bus.publish_queue(QueueEvent::Preempted { room: victim_id, by: room_id });
            self.start_service_locked(inner, room_id, speed, target, current, power_on_time, now);
            return true;
        }

        // 5. equal/higher-priority incumbents only: wait
        self.enqueue_locked(inner, room_id, speed, target, current, now);
        false
    }

    fn update_serviced_locked(
        &self,
        inner: &mut Inner,
        room_id: RoomId,
        speed: FanSpeed,
        target: f64,
        now: Timestamp,
    ) -> bool {
        let Some(entry) = inner.service.get_mut(room_id) else {
            return false;
        };

        if entry.speed == speed {
            // pure target update: segment keeps running at the same rate
            if (entry.target_temp - target).abs() > f64::EPSILON {
                entry.target_temp = target;
                let ev = SegmentEvent::marker(
                    room_id,
                    DetailKind::TempChange,
                    speed,
                    now,
                    entry.current_temp,
                    target,
                );
                self.sink.record(ev);
                if let Err(e) = self.rooms.update_target(room_id, target) {
                    warn!(room = room_id, error = %e, "target write-back failed");
                }
            }
            return true;
        }

        // close the running segment at its old speed, open a new one
        let closed = SegmentEvent {
            room_id,
            kind: DetailKind::SpeedChange,
            speed: entry.speed,
            segment_start: entry.segment_start,
            segment_end: now,
            start_temp: entry.segment_start_temp,
            current_temp: entry.current_temp,
            target_temp: target,
        };
        entry.speed = speed;
        entry.target_temp = target;
        entry.segment_start = now;
        entry.segment_start_temp = entry.current_temp;
        entry.duration = 0.0;
        self.sink.record(closed);
        if let Err(e) = self.rooms.update_speed(room_id, speed) {
            warn!(room = room_id, error = %e, "speed write-back failed");
        }
        if let Err(e) = self.rooms.update_target(room_id, target) {
            warn!(room = room_id, error = %e, "target write-back failed");
        }
        info!(room = room_id, speed = ?speed, "service speed changed");
        true
    }

    fn start_service_locked(
        &self,
        inner: &mut Inner,
        room_id: RoomId,
        speed: FanSpeed,
        target: f64,
        current: f64,
        power_on_time: Timestamp,
        now: Timestamp,
    ) {
        let entry = ServiceEntry {
            room_id,
            speed,
            target_temp: target,
            current_temp: current,
            segment_start: now,
            segment_start_temp: current,
            power_on_time,
            duration: 0.0,
        };
        if !inner.service.insert(entry) {
            error!(room = room_id, "service set rejected insert; dropping request");
            return;
        }
        self.sink.record(SegmentEvent::marker(
            room_id,
            DetailKind::ServiceStart,
            speed,
            now,
            current,
            target,
        ));
        if let Err(e) = self.rooms.update_speed(room_id, speed) {
            warn!(room = room_id, error = %e, "speed write-back failed");
        }
        if let Err(e) = self.rooms.update_target(room_id, target) {
            warn!(room = room_id, error = %e, "target write-back failed");
        }
        self.bus.publish_queue(QueueEvent::Admitted { room: room_id, speed });
        info!(room = room_id, speed = ?speed, target, "service started");
    }

    /// Move a waiter into service, refreshing its temperature from the store
    /// (the room kept drifting while it queued).
    fn promote_locked(&self, inner: &mut Inner, waiter: WaitEntry, now: Timestamp) {
        let (current, power_on_time) = match self.rooms.get(waiter.room_id) {
            Ok(r) => (r.current_temp, r.power_on_time.unwrap_or(now)),
            Err(e) => {
                warn!(room = waiter.room_id, error = %e, "room read failed at promotion");
                (waiter.current_temp, now)
            }
        };
        self.start_service_locked(
            inner,
            waiter.room_id,
            waiter.speed,
            waiter.target_temp,
            current,
            power_on_time,
            now,
        );
        self.bus.publish_queue(QueueEvent::Promoted { room: waiter.room_id });
    }

    /// Interrupt a serviced room and park it in the wait queue with a fresh
    /// slice.
    fn rotate_out_locked(&self, inner: &mut Inner, victim_id: RoomId, now: Timestamp) {
        let Some(victim) = inner.service.remove(victim_id) else {
            return;
        };
        self.sink.record(interrupt_event(&victim, now));
        let wait_secs = self.slice_for(inner.wait.len() + 1);
        inner.wait.push(WaitEntry {
            room_id: victim_id,
            speed: victim.speed,
            target_temp: victim.target_temp,
            current_temp: victim.current_temp,
            enqueue_time: now,
            wait_remaining: wait_secs,
            priority: victim.speed.priority(),
        });
        info!(room = victim_id, wait_secs, "rotated out of service");
    }

    fn enqueue_locked(
        &self,
        inner: &mut Inner,
        room_id: RoomId,
        speed: FanSpeed,
        target: f64,
        current: f64,
        now: Timestamp,
    ) {
        let wait_secs = self.slice_for(inner.wait.len() + 1);
        inner.wait.push(WaitEntry {
            room_id,
            speed,
            target_temp: target,
            current_temp: current,
            enqueue_time: now,
            wait_remaining: wait_secs,
            priority: speed.priority(),
        });
        self.bus.publish_queue(QueueEvent::Enqueued { room: room_id, speed, wait_secs });
        info!(room = room_id, speed = ?speed, wait_secs, "queued for service");
    }

    /// Wait slice scaled by queue length (including the entry being placed),
    /// so long queues rotate less frantically.
    fn slice_for(&self, queue_len: usize) -> f64 {
        self.cfg.base_wait_secs * (1.0 + 0.5 * queue_len as f64)
    }

    // ------------------------------ tick bodies -----------------------------

    fn advance_room_locked(&self, inner: &mut Inner, room_id: RoomId, now: Timestamp) {
        let reached = match inner.service.get_mut(room_id) {
            Some(entry) => {
                entry.duration = entry.seconds_active(now);
                (entry.target_temp - entry.current_temp).abs() <= self.cfg.epsilon
            }
            None => return,
        };

        if reached {
            let Some(finished) = inner.service.remove(room_id) else {
                return;
            };
            self.sink.record(SegmentEvent {
                room_id,
                kind: DetailKind::TargetReached,
                speed: finished.speed,
                segment_start: finished.segment_start,
                segment_end: now,
                start_temp: finished.segment_start_temp,
                current_temp: finished.target_temp,
                target_temp: finished.target_temp,
            });
            if let Err(e) = self.rooms.update_temp(room_id, finished.target_temp) {
                warn!(room = room_id, error = %e, "temperature write-back failed");
            }
            self.bus.publish_queue(QueueEvent::TargetReached { room: room_id });
            info!(room = room_id, temp = finished.target_temp, "target reached");
            if let Some(waiter) = inner.wait.pop() {
                self.promote_locked(inner, waiter, now);
            } else if let Err(e) = self.rooms.update_speed(room_id, FanSpeed::None) {
                warn!(room = room_id, error = %e, "speed write-back failed");
            }
            return;
        }

        let (current, target) = {
            let Some(entry) = inner.service.get_mut(room_id) else {
                return;
            };
            let delta = entry.target_temp - entry.current_temp;
            let step = self.cfg.temp_rate(entry.speed).min(delta.abs()).copysign(delta);
            entry.current_temp += step;
            (entry.current_temp, entry.target_temp)
        };
        if let Err(e) = self.rooms.update_temp(room_id, current) {
            warn!(room = room_id, error = %e, "temperature write-back failed");
        }
        self.bus.publish_temperature(TemperatureEvent::Serviced { room: room_id, current, target });
    }

    /// A service running past the timeout yields its slot, but only when
    /// somebody is actually waiting for it.
    fn rotate_timed_out_locked(&self, inner: &mut Inner, now: Timestamp) {
        if self.cfg.service_timeout_secs <= 0.0 {
            return;
        }
        loop {
            if inner.wait.is_empty() {
                return;
            }
            let stale = inner
                .service
                .iter()
                .filter(|e| e.seconds_active(now) >= self.cfg.service_timeout_secs)
                .min_by(|a, b| longest_then_smallest_id(a, b, now))
                .map(|e| e.room_id);
            let Some(victim_id) = stale else {
                return;
            };
            // promote first so the victim cannot immediately win its own
            // slot back over a lower-priority waiter
            let Some(victim) = inner.service.remove(victim_id) else {
                return;
            };
            self.sink.record(interrupt_event(&victim, now));
            self.bus.publish_queue(QueueEvent::RotatedOut { room: victim_id });
            info!(room = victim_id, "service timeout, forced rotation");
            if let Some(waiter) = inner.wait.pop() {
                self.promote_locked(inner, waiter, now);
            }
            let wait_secs = self.slice_for(inner.wait.len() + 1);
            inner.wait.push(WaitEntry {
                room_id: victim_id,
                speed: victim.speed,
                target_temp: victim.target_temp,
                current_temp: victim.current_temp,
                enqueue_time: now,
                wait_remaining: wait_secs,
                priority: victim.speed.priority(),
            });
        }
    }

    fn age_waiter_locked(&self, inner: &mut Inner, room_id: RoomId, tick: f64, now: Timestamp) {
        let mut expired = false;
        if !inner.wait.update(room_id, |e| {
            e.wait_remaining -= tick;
            expired = e.wait_remaining <= 0.0;
        }) {
            return;
        }
        if !expired {
            return;
        }
        let Some(speed) = inner.wait.get(room_id).map(|e| e.speed) else {
            return;
        };

        if let Some(incumbent_id) = pick_rotation_incumbent(&inner.service, speed, now) {
            let Some(waiter) = inner.wait.remove(room_id) else {
                return;
            };
            self.rotate_out_locked(inner, incumbent_id, now);
            self.bus.publish_queue(QueueEvent::RotatedOut { room: incumbent_id });
            self.promote_locked(inner, waiter, now);
        } else {
            // nobody at this speed to displace; a new slice, not a drop
            let reset = self.slice_for(inner.wait.len());
            inner.wait.update(room_id, |e| e.wait_remaining = reset);
            debug!(room = room_id, reset, "wait slice reset, no same-speed incumbent");
        }
    }
}

// ------------------------------- selection ----------------------------------

fn interrupt_event(entry: &ServiceEntry, now: Timestamp) -> SegmentEvent {
    SegmentEvent {
        room_id: entry.room_id,
        kind: DetailKind::ServiceInterrupt,
        speed: entry.speed,
        segment_start: entry.segment_start,
        segment_end: now,
        start_temp: entry.segment_start_temp,
        current_temp: entry.current_temp,
        target_temp: entry.target_temp,
    }
}

fn longest_then_smallest_id(a: &ServiceEntry, b: &ServiceEntry, now: Timestamp) -> Ordering {
    b.seconds_active(now)
        .partial_cmp(&a.seconds_active(now))
        .unwrap_or(Ordering::Equal)
        .then(a.room_id.cmp(&b.room_id))
}

/// Victim for preemption: strictly lower priority than the incoming request,
/// lowest priority first, then longest-running, then smallest room id.
fn pick_preemption_victim(service: &ServiceSet, priority: u8, now: Timestamp) -> Option<RoomId> {
    service
        .iter()
        .filter(|e| e.speed.priority() < priority)
        .min_by(|a, b| {
            a.speed
                .priority()
                .cmp(&b.speed.priority())
                .then(longest_then_smallest_id(a, b, now))
        })
        .map(|e| e.room_id)
}

/// Incumbent for time-slice rotation: same speed as the expired waiter,
/// longest-running first, then smallest room id.
fn pick_rotation_incumbent(service: &ServiceSet, speed: FanSpeed, now: Timestamp) -> Option<RoomId> {
    service
        .iter()
        .filter(|e| e.speed == speed)
        .min_by(|a, b| longest_then_smallest_id(a, b, now))
        .map(|e| e.room_id)
}

// --------------------------------- tests ------------------------------------
