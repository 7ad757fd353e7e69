// Shared control state: mode, per-axis velocity, pending-write and terminate flags
use std::sync::{Arc, Mutex, MutexGuard};

use crate::messages::Mode;
use crate::motor::AxisId;

#[derive(Debug, Clone, Default)]
pub struct ControlState {
    mode: Mode,
    velocities: [i32; 2], // [pan (horizontal), tilt (vertical)]
    dirty: bool,
    terminate: bool,
}

impl ControlState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Set the mode. Entering AUTO stops both axes.
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
        if mode == Mode::Auto {
            self.zero_velocities();
        }
    }

    pub fn velocity(&self, axis: AxisId) -> i32 {
        self.velocities[axis.index()]
    }

    /// (horizontal, vertical)
    pub fn velocities(&self) -> (i32, i32) {
        (self.velocities[0], self.velocities[1])
    }

    /// Change one axis and mark it for writing.
    ///
    /// There is no speed limit; the sum saturates at the i32 register range.
    pub fn adjust_velocity(&mut self, axis: AxisId, delta: i32) {
        let velocity = &mut self.velocities[axis.index()];
        *velocity = velocity.saturating_add(delta);
        self.dirty = true;
    }

    /// Zero both axes without marking them dirty.
    ///
    /// Used when the hardware has already been stopped directly.
    pub fn clear_velocities_written(&mut self) {
        self.velocities = [0, 0];
    }

    /// Replace both velocities, marking dirty if `mark_dirty`
    pub fn set_velocities(&mut self, horizontal: i32, vertical: i32, mark_dirty: bool) {
        self.velocities = [horizontal, vertical];
        if mark_dirty {
            self.dirty = true;
        }
    }

    pub fn zero_velocities(&mut self) {
        self.velocities = [0, 0];
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Velocities awaiting a hardware write; clears the dirty flag
    pub fn take_pending(&mut self) -> Option<(i32, i32)> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        Some(self.velocities())
    }

    pub fn request_terminate(&mut self) {
        self.terminate = true;
    }

    pub fn terminate_requested(&self) -> bool {
        self.terminate
    }
}

/// Control state shared between the command sources and the drive loop
pub type SharedState = Arc<Mutex<ControlState>>;

pub fn shared(state: ControlState) -> SharedState {
    Arc::new(Mutex::new(state))
}

/// Lock the shared state, recovering from a poisoned lock
pub fn lock(state: &SharedState) -> MutexGuard<'_, ControlState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
