// Command arbitration between manual (keyboard/button) and AUTO (tracking) sources
//
// Every source funnels through `CommandArbiter::dispatch`, which applies one
// command under the state lock.

use tracing::{debug, info};

use super::state::{lock, ControlState, SharedState};
use super::tracker::AutoTracker;
use crate::config::Config;
use crate::messages::{Command, Direction, Mode, TrackingTarget};
use crate::motor::AxisId;

#[derive(Clone)]
pub struct CommandArbiter {
    state: SharedState,
    speed_increment: i32,
    tracker: AutoTracker,
}

impl CommandArbiter {
    pub fn new(state: SharedState, config: &Config) -> Self {
        Self {
            state,
            speed_increment: config.speed_increment,
            tracker: AutoTracker::new(config.tracking),
        }
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Apply a command from any source
    pub fn dispatch(&self, command: Command) {
        let mut state = lock(&self.state);
        self.apply(&mut state, command);
    }

    fn apply(&self, state: &mut ControlState, command: Command) {
        if state.terminate_requested() {
            debug!("Ignoring {:?} after terminate", command);
            return;
        }

        match command {
            Command::ModeChanged(mode) => {
                info!("Mode changed to {}", mode);
                state.set_mode(mode);
            }
            Command::Jog(direction) => {
                let (axis, delta) = self.jog(direction);
                state.adjust_velocity(axis, delta);
                debug!("{:?} pressed, velocities now {:?}", direction, state.velocities());
            }
            Command::TouchMiss => {
                info!("Touch miss, stopping both axes");
                state.zero_velocities();
            }
            Command::TargetSelected(target) => {
                if state.mode() == Mode::Auto {
                    self.track(state, &target);
                } else {
                    debug!("Ignoring target at ({}, {}) in {} mode", target.x, target.y, state.mode());
                }
            }
            Command::Terminate => {
                info!("Terminate requested");
                state.request_terminate();
            }
        }
    }

    /// Axis and signed increment for a jog direction
    fn jog(&self, direction: Direction) -> (AxisId, i32) {
        let inc = self.speed_increment;
        match direction {
            Direction::Up => (AxisId::Tilt, -inc),
            Direction::Down => (AxisId::Tilt, inc),
            Direction::Left => (AxisId::Pan, inc),
            Direction::Right => (AxisId::Pan, -inc),
        }
    }

    fn track(&self, state: &mut ControlState, target: &TrackingTarget) {
        let (horizontal, vertical) = self.tracker.velocities(target);
        let previous = state.velocities();

        // Nonzero commands always go out; a drop to zero has to as well or the rig keeps moving
        let mark_dirty = horizontal != 0 || vertical != 0 || previous != (horizontal, vertical);
        state.set_velocities(horizontal, vertical, mark_dirty);

        if horizontal == 0 && vertical == 0 {
            debug!("Target ({}, {}) centered", target.x, target.y);
        } else {
            debug!(
                "Target ({}, {}) frame {:?}: H={}, V={}",
                target.x, target.y, target.frame, horizontal, vertical
            );
        }
    }
}
