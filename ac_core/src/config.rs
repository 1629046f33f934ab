// runtime configuration (capacity, tick periods, simulation tunables)
use anyhow::Result;
use clap::Parser;
use shared_model::FanSpeed;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Bounded service-set capacity.
    pub max_services: usize,
    /// Service tick period in milliseconds (temperature progress + rotation).
    pub service_tick_ms: u64,
    /// Recovery tick period in milliseconds (idle-room drift).
    pub recovery_tick_ms: u64,
    /// Base wait slice in seconds; actual slice scales with queue length.
    pub base_wait_secs: f64,
    /// Forced-rotation bound for a single uninterrupted service, seconds.
    pub service_timeout_secs: f64,
    /// Wall seconds → billing minutes factor.
    pub time_scale: f64,
    /// Convergence threshold in °C; within it the tick snaps to target.
    pub epsilon: f64,
    /// Idle drift toward ambient, °C per recovery tick.
    pub recovery_rate: f64,
    /// Serviced temperature progress, °C per service tick, by speed.
    pub low_rate: f64,
    pub medium_rate: f64,
    pub high_rate: f64,
    /// Idle drift that re-triggers a service request, °C.
    pub resubmit_threshold: f64,
    /// Rooms seeded by the demo binary.
    pub demo_rooms: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_services: 3,
            service_tick_ms: 1_000,
            recovery_tick_ms: 1_000,
            base_wait_secs: 20.0,
            service_timeout_secs: 300.0,
            time_scale: 6.0,
            epsilon: 0.05,
            recovery_rate: 0.05,
            low_rate: 1.0 / 30.0,
            medium_rate: 0.05,
            high_rate: 0.10,
            resubmit_threshold: 1.0,
            demo_rooms: 5,
        }
    }
}

impl Config {
    pub fn service_tick_period(&self) -> Duration {
        Duration::from_millis(self.service_tick_ms)
    }

    pub fn recovery_tick_period(&self) -> Duration {
        Duration::from_millis(self.recovery_tick_ms)
    }

    /// Service tick length in seconds, the unit wait timers age in.
    pub fn tick_secs(&self) -> f64 {
        self.service_tick_ms as f64 / 1000.0
    }

    /// °C moved per service tick at the given speed.
    pub fn temp_rate(&self, speed: FanSpeed) -> f64 {
        match speed {
            FanSpeed::None => 0.0,
            FanSpeed::Low => self.low_rate,
            FanSpeed::Medium => self.medium_rate,
            FanSpeed::High => self.high_rate,
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct Cli {
    #[arg(long, default_value_t = 3)]     pub max_services: usize,
    #[arg(long, default_value_t = 1000)]  pub service_tick_ms: u64,
    #[arg(long, default_value_t = 1000)]  pub recovery_tick_ms: u64,
    #[arg(long, default_value_t = 20.0)]  pub base_wait_secs: f64,
    #[arg(long, default_value_t = 300.0)] pub service_timeout_secs: f64,
    #[arg(long, default_value_t = 6.0)]   pub time_scale: f64,
    #[arg(long, default_value_t = 0.05)]  pub epsilon: f64,
    #[arg(long, default_value_t = 0.05)]  pub recovery_rate: f64,
    #[arg(long, default_value_t = 5)]     pub demo_rooms: usize,
}

impl Cli {
    pub fn parse_and_build_config() -> Result<Config> {
        let c = <Cli as Parser>::parse();
        Ok(Config {
            max_services: c.max_services,
            service_tick_ms: c.service_tick_ms,
            recovery_tick_ms: c.recovery_tick_ms,
            base_wait_secs: c.base_wait_secs,
            service_timeout_secs: c.service_timeout_secs,
            time_scale: c.time_scale,
            epsilon: c.epsilon,
            recovery_rate: c.recovery_rate,
            demo_rooms: c.demo_rooms,
            ..Config::default()
        })
    }
}
