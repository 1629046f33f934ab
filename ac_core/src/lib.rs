// lib.rs — scheduler core for the centralized AC installation
pub mod billing;
pub mod central;
pub mod clock;
pub mod config;
pub mod controls;
pub mod errors;
pub mod events;
pub mod scheduler;
pub mod simulator;
pub mod stores;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};

use billing::{BillingRecorder, Fees};
use central::CentralUnit;
use clock::Clock;
use config::Config;
use errors::AcError;
use events::EventBus;
use scheduler::Scheduler;
use simulator::TemperatureSimulator;
use stores::{ConfigStore, DetailStore, RoomStore, StoreError};

/// The whole installation, built once at process start and shared by
/// reference. Handlers and ticks all go through here; tests build a fresh
/// one per scenario.
pub struct Core {
    pub cfg: Arc<Config>,
    pub clock: Arc<dyn Clock>,
    pub rooms: Arc<dyn RoomStore>,
    pub config_store: Arc<dyn ConfigStore>,
    pub bus: Arc<EventBus>,
    pub billing: Arc<BillingRecorder>,
    pub scheduler: Arc<Scheduler>,
    pub simulator: Arc<TemperatureSimulator>,
    pub central: Arc<CentralUnit>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Core {
    pub fn new(
        cfg: Config,
        clock: Arc<dyn Clock>,
        rooms: Arc<dyn RoomStore>,
        details: Arc<dyn DetailStore>,
        config_store: Arc<dyn ConfigStore>,
    ) -> Arc<Self> {
        let cfg = Arc::new(cfg);
        let bus = Arc::new(EventBus::new(256));
        let billing = Arc::new(BillingRecorder::new(
            clock.clone(),
            details,
            config_store.clone(),
            cfg.time_scale,
        ));
        let scheduler = Arc::new(Scheduler::new(
            cfg.clone(),
            clock.clone(),
            rooms.clone(),
            config_store.clone(),
            billing.clone(),
            bus.clone(),
        ));
        let simulator = Arc::new(TemperatureSimulator::new(
            cfg.clone(),
            rooms.clone(),
            config_store.clone(),
            scheduler.clone(),
            bus.clone(),
        ));
        let central = Arc::new(CentralUnit::new(
            clock.clone(),
            rooms.clone(),
            config_store.clone(),
            scheduler.clone(),
            billing.clone(),
            bus.clone(),
        ));
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            cfg,
            clock,
            rooms,
            config_store,
            bus,
            billing,
            scheduler,
            simulator,
            central,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Spawn the service and recovery tick loops. Idempotent while running.
    pub fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }

        {
            let core = Arc::clone(self);
            let mut stop = self.shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                let mut ticker = time::interval(core.cfg.service_tick_period());
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => core.scheduler.service_tick(),
                        _ = stop.changed() => break,
                    }
                }
            }));
        }

        {
            let core = Arc::clone(self);
            let mut stop = self.shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                let mut ticker = time::interval(core.cfg.recovery_tick_period());
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => core.simulator.recovery_tick(),
                        _ = stop.changed() => break,
                    }
                }
            }));
        }

        info!("tick loops started");
    }

    /// Stop both tick loops and wait for them to drain, bounded by a
    /// deadline. In-flight detail writes finish before the tick tasks join.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if time::timeout(Duration::from_secs(5), task).await.is_err() {
                warn!("tick task did not stop before the deadline");
            }
        }
        info!("tick loops stopped");
    }

    /// Session and lifetime fees for a room, pricing any open segment as if
    /// it closed now. The scheduler contributes only a snapshot; billing
    /// does the arithmetic.
    pub fn fees(&self, room_id: shared_model::RoomId) -> Result<Fees, AcError> {
        let room = self.rooms.get(room_id).map_err(|e| match e {
            StoreError::RoomMissing(id) => AcError::RoomNotFound(id),
            other => AcError::Store(other),
        })?;
        let open = self.scheduler.service_entry(room_id);
        Ok(self
            .billing
            .fees(room_id, room.power_on_time, open.as_ref(), self.clock.now())?)
    }
}
