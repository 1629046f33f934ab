// thiserror-based error taxonomy for the scheduler core
use crate::stores::StoreError;
use shared_model::{FanSpeed, RoomId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AcError {
    // precondition
    #[error("central unit is off")] CentralOff,
    #[error("central unit is already on")] CentralAlreadyOn,
    #[error("room {0} is not occupied")] RoomNotOccupied(RoomId),
    #[error("room {0} AC is not powered on")] RoomNotPowered(RoomId),
    #[error("room {0} AC is already powered on")] RoomAlreadyPowered(RoomId),

    // validation
    #[error("speed {0:?} is not a valid service speed")] InvalidSpeed(FanSpeed),
    #[error("target {target:.1}°C outside configured range [{min:.1}, {max:.1}]")]
    InvalidTemp { target: f64, min: f64, max: f64 },
    #[error(transparent)] Model(#[from] shared_model::ModelError),

    // not found
    #[error("room {0} not found")] RoomNotFound(RoomId),

    // transient
    #[error("store: {0}")] Store(#[from] StoreError),

    // should be unreachable
    #[error("invariant violated: {0}")] Invariant(String),
}
