// lib.rs — shared domain model for the centralized AC installation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// =============================== Common =====================================

pub type Timestamp = DateTime<Utc>;
pub type RoomId = u32;

/// Hard bounds for any configurable temperature range, in °C.
pub const MIN_ALLOWED_TEMP: f64 = 16.0;
pub const MAX_ALLOWED_TEMP: f64 = 30.0;

// =============================== Enums ======================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Cooling,
    Heating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanSpeed {
    None,
    Low,
    Medium,
    High,
}

impl FanSpeed {
    /// Scheduling priority: higher speed wins admission fights.
    pub fn priority(self) -> u8 {
        match self {
            FanSpeed::None => 0,
            FanSpeed::Low => 1,
            FanSpeed::Medium => 2,
            FanSpeed::High => 3,
        }
    }

    /// A speed that actually requests service (everything but `None`).
    pub fn is_active(self) -> bool {
        self != FanSpeed::None
    }
}

/// Every detail row records which service boundary produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailKind {
    PowerOn,
    PowerOff,
    ServiceStart,
    ServiceInterrupt,
    SpeedChange,
    TargetReached,
    TempChange,
}

// =============================== Rooms ======================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub occupied: bool,
    pub ac_powered: bool,
    pub mode: Mode,
    pub current_temp: f64,
    pub target_temp: f64,
    /// Ambient baseline the room drifts back to when unserviced.
    pub initial_temp: f64,
    pub current_speed: FanSpeed,
    pub power_on_time: Option<Timestamp>,
}

impl RoomSnapshot {
    /// A checked-in room with its AC still off, at ambient temperature.
    pub fn occupied(room_id: RoomId, initial_temp: f64, mode: Mode) -> Self {
        Self {
            room_id,
            occupied: true,
            ac_powered: false,
            mode,
            current_temp: initial_temp,
            target_temp: initial_temp,
            initial_temp,
            current_speed: FanSpeed::None,
            power_on_time: None,
        }
    }
}

// =============================== Config =====================================

/// Allowed target-temperature window for one mode, plus the default target
/// applied at room power-on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempRange {
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

impl TempRange {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.min >= self.max {
            return Err(ModelError::Range(format!(
                "min {:.1} must be below max {:.1}",
                self.min, self.max
            )));
        }
        if self.min < MIN_ALLOWED_TEMP || self.max > MAX_ALLOWED_TEMP {
            return Err(ModelError::Range(format!(
                "[{:.1}, {:.1}] outside allowed [{MIN_ALLOWED_TEMP:.1}, {MAX_ALLOWED_TEMP:.1}]",
                self.min, self.max
            )));
        }
        if self.default < self.min || self.default > self.max {
            return Err(ModelError::Range(format!(
                "default {:.1} outside [{:.1}, {:.1}]",
                self.default, self.min, self.max
            )));
        }
        Ok(())
    }

    pub fn contains(&self, t: f64) -> bool {
        t.is_finite() && t >= self.min && t <= self.max
    }

    pub fn clamp(&self, t: f64) -> f64 {
        t.clamp(self.min, self.max)
    }
}

/// Per-speed tariffs in currency per scaled minute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tariffs {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Tariffs {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.low <= 0.0 || self.medium <= 0.0 || self.high <= 0.0 {
            return Err(ModelError::Tariffs("rates must be positive".into()));
        }
        if self.low > self.medium || self.medium > self.high {
            return Err(ModelError::Tariffs(
                "rates must be non-decreasing in speed".into(),
            ));
        }
        Ok(())
    }

    /// `None` never bills.
    pub fn rate_for(&self, speed: FanSpeed) -> f64 {
        match speed {
            FanSpeed::None => 0.0,
            FanSpeed::Low => self.low,
            FanSpeed::Medium => self.medium,
            FanSpeed::High => self.high,
        }
    }
}

/// Process-wide state of the central unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MainUnit {
    pub on: bool,
    pub mode: Mode,
}

// =============================== Details ====================================

/// Immutable service-segment record. One row per boundary event; a closed
/// segment carries the seconds served at one speed and the resulting cost.
/// Boundary markers (`power_on`, `service_start`, `temp_change`, …) are
/// zero-length segments with zero cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detail {
    pub id: Uuid,
    pub room_id: RoomId,
    pub kind: DetailKind,
    pub query_time: Timestamp,
    pub segment_start: Timestamp,
    pub segment_end: Timestamp,
    pub serve_seconds: i64,
    pub speed: FanSpeed,
    pub rate: f64,
    pub temp_change: f64,
    pub current_temp: f64,
    pub target_temp: f64,
    pub cost: f64,
}

// =============================== Errors =====================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("temperature range: {0}")]
    Range(String),
    #[error("tariffs: {0}")]
    Tariffs(String),
}

// =============================== Tests ======================================
