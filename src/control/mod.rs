// Control core for the pan/tilt rig
//
// - Shared control state (mode, velocities, dirty/terminate flags)
// - Command arbitration between manual and AUTO sources
// - Proportional auto tracker
// - Position bounds guard with timed recovery

pub mod arbiter;
pub mod bounds;
pub mod state;
pub mod tracker;

pub use arbiter::CommandArbiter;
pub use bounds::{BoundsGuard, GuardPhase, PositionLimits};
pub use state::{lock, shared, ControlState, SharedState};
pub use tracker::AutoTracker;
