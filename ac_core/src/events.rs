// Typed event fan-out: one broadcast channel per event family. Publishers
// never block; a lagging subscriber misses events rather than stalling a tick.
use shared_model::{FanSpeed, Mode, RoomId};
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub enum TemperatureEvent {
    /// A serviced room advanced toward its target.
    Serviced { room: RoomId, current: f64, target: f64 },
    /// An idle room drifted toward its ambient baseline.
    Drifted { room: RoomId, current: f64, baseline: f64 },
}

#[derive(Debug, Clone)]
pub enum QueueEvent {
    Admitted { room: RoomId, speed: FanSpeed },
    Enqueued { room: RoomId, speed: FanSpeed, wait_secs: f64 },
    Preempted { room: RoomId, by: RoomId },
    RotatedOut { room: RoomId },
    Promoted { room: RoomId },
    TargetReached { room: RoomId },
    Removed { room: RoomId },
}

#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    RoomPoweredOn { room: RoomId },
    RoomPoweredOff { room: RoomId },
    CentralPoweredOn { mode: Mode },
    CentralPoweredOff,
    ModeChanged { mode: Mode },
}

pub struct EventBus {
    temperature: broadcast::Sender<TemperatureEvent>,
    queue: broadcast::Sender<QueueEvent>,
    lifecycle: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (temperature, _) = broadcast::channel(capacity);
        let (queue, _) = broadcast::channel(capacity);
        let (lifecycle, _) = broadcast::channel(capacity);
        Self { temperature, queue, lifecycle }
    }

    pub fn subscribe_temperature(&self) -> broadcast::Receiver<TemperatureEvent> {
        self.temperature.subscribe()
    }

    pub fn subscribe_queue(&self) -> broadcast::Receiver<QueueEvent> {
        self.queue.subscribe()
    }

    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.lifecycle.subscribe()
    }

    // Send errors only mean "no subscribers"; droppable by contract.
    pub fn publish_temperature(&self, ev: TemperatureEvent) {
        let _ = self.temperature.send(ev);
    }

    pub fn publish_queue(&self, ev: QueueEvent) {
        let _ = self.queue.send(ev);
    }

    pub fn publish_lifecycle(&self, ev: LifecycleEvent) {
        let _ = self.lifecycle.send(ev);
    }
}
