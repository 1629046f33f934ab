// src/main.rs — demo bring-up: in-memory stores, a handful of occupied
// rooms, live ticks, event log to stderr.
use ac_core::Core;
use ac_core::clock::SystemClock;
use ac_core::config::Cli;
use ac_core::stores::{MemoryConfigStore, MemoryDetailStore, MemoryRoomStore};
use anyhow::Result;
use rand::Rng;
use shared_model::{Mode, RoomId, RoomSnapshot, Tariffs, TempRange};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // -------- logging ----------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("ac_core=info".parse()?)
                .add_directive("tokio=warn".parse()?),
        )
        .compact()
        .init();

    // -------- config + stores ----------
    let cfg = Cli::parse_and_build_config()?;
    info!(?cfg, "AC scheduler core starting");

    let rooms = Arc::new(MemoryRoomStore::new());
    let details = Arc::new(MemoryDetailStore::new());
    let config_store = Arc::new(MemoryConfigStore::new());

    let mut rng = rand::rng();
    let room_ids: Vec<RoomId> = (1..=cfg.demo_rooms as RoomId).collect();
    for &id in &room_ids {
        let ambient = rng.random_range(28.0..32.0);
        rooms.insert(RoomSnapshot::occupied(id, ambient, Mode::Cooling));
    }

    let core = Core::new(cfg, Arc::new(SystemClock), rooms, details, config_store);

    // -------- central + rooms up ----------
    core.central.power_on(
        Mode::Cooling,
        TempRange { min: 18.0, max: 28.0, default: 24.0 },
        Tariffs { low: 0.5, medium: 1.0, high: 2.0 },
    )?;
    for &id in &room_ids {
        let status = core.room_power_on(id)?;
        info!(
            room = id,
            current = format_args!("{:.1}", status.current_temp),
            target = status.target_temp,
            speed = ?status.speed,
            "room up"
        );
        let target = (rng.random_range(20.0..26.0f64) * 2.0).round() / 2.0;
        core.set_target_temp(id, target)?;
    }

    // -------- event fan-out to the log ----------
    {
        let mut queue_rx = core.bus.subscribe_queue();
        tokio::spawn(async move {
            while let Ok(ev) = queue_rx.recv().await {
                info!(event = ?ev, "queue");
            }
        });
    }
    {
        let mut lifecycle_rx = core.bus.subscribe_lifecycle();
        tokio::spawn(async move {
            while let Ok(ev) = lifecycle_rx.recv().await {
                info!(event = ?ev, "lifecycle");
            }
        });
    }

    // -------- ticks ----------
    core.start();
    info!("running; press Ctrl+C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(?e, "failed to install Ctrl+C handler");
    }

    // -------- graceful shutdown + fee report ----------
    core.central.power_off()?;
    core.shutdown().await;
    for &id in &room_ids {
        let fees = core.fees(id)?;
        info!(
            room = id,
            session = format_args!("{:.2}", fees.current),
            lifetime = format_args!("{:.2}", fees.total),
            "final bill"
        );
    }
    Ok(())
}
