// Motor control module for the pan/tilt rig
//
// Provides:
// - Dynamixel Protocol 2.0 serial implementation
// - Pan/tilt driver (initialization, torque release, per-axis I/O)
// - The `Actuator` seam the control loop is written against

mod driver;
pub mod dynamixel;

pub use driver::PanTiltDriver;
pub use dynamixel::{DynamixelBus, DynamixelError};

/// One of the two controlled axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisId {
    /// Horizontal
    Pan,
    /// Vertical
    Tilt,
}

impl AxisId {
    pub const ALL: [AxisId; 2] = [AxisId::Pan, AxisId::Tilt];

    pub fn index(self) -> usize {
        match self {
            AxisId::Pan => 0,
            AxisId::Tilt => 1,
        }
    }
}

/// Per-axis position/velocity I/O used by the drive loop
pub trait Actuator {
    /// Present position, already wraparound-corrected
    fn read_position(&mut self, axis: AxisId) -> Result<i32, DynamixelError>;

    fn set_velocity(&mut self, axis: AxisId, velocity: i32) -> Result<(), DynamixelError>;
}

/// Turn a transient bus error into `None` (logged), pass fatal ones through
pub fn tolerate<T>(
    result: Result<T, DynamixelError>,
    axis: AxisId,
    what: &str,
) -> Result<Option<T>, DynamixelError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_transient() => {
            tracing::warn!("{:?} {} failed: {}", axis, what, e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
