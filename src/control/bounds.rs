// Software position limits and the recovery maneuver
//
// Every cycle while monitoring, each axis position is checked against its
// limits. An axis outside them is stopped, flagged, and driven back toward the
// midpoint of its range at a fixed speed. The guard then holds that command
// until a deadline passes (the drive loop keeps cycling and can still observe
// termination), stops both axes and clears the flags. There is no hysteresis:
// an axis still out of range afterwards simply triggers another recovery.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::state::{lock, SharedState};
use crate::config::{AxisConfig, Config};
use crate::motor::{tolerate, Actuator, AxisId, DynamixelError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionLimits {
    pub lo: i32,
    pub hi: i32,
}

impl PositionLimits {
    pub fn new(lo: i32, hi: i32) -> Self {
        Self { lo, hi }
    }

    pub fn contains(&self, position: i32) -> bool {
        (self.lo..=self.hi).contains(&position)
    }

    /// True when `position` is past the midpoint `(lo + hi) / 2`
    pub fn above_midpoint(&self, position: i32) -> bool {
        2 * position as i64 > self.lo as i64 + self.hi as i64
    }
}

/// Velocity that drives an axis at `position` back toward its midpoint
pub fn recovery_velocity(limits: &PositionLimits, position: i32, return_speed: i32) -> i32 {
    if limits.above_midpoint(position) {
        -return_speed
    } else {
        return_speed
    }
}

#[derive(Debug, Clone)]
pub struct Axis {
    pub id: AxisId,
    pub limits: PositionLimits,
    pub bound_exceeded: bool,
}

impl Axis {
    fn new(id: AxisId, config: &AxisConfig) -> Self {
        Self {
            id,
            limits: PositionLimits::new(config.min_position, config.max_position),
            bound_exceeded: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardPhase {
    Monitoring,
    /// Return velocities issued; both axes stop once `deadline` passes
    Recovering { deadline: Instant },
}

pub struct BoundsGuard {
    axes: [Axis; 2],
    phase: GuardPhase,
    return_speed: i32,
    settle: Duration,
}

impl BoundsGuard {
    pub fn new(config: &Config) -> Self {
        Self {
            axes: [
                Axis::new(AxisId::Pan, &config.pan),
                Axis::new(AxisId::Tilt, &config.tilt),
            ],
            phase: GuardPhase::Monitoring,
            return_speed: config.return_speed,
            settle: config.settle(),
        }
    }

    pub fn axis(&self, id: AxisId) -> &Axis {
        &self.axes[id.index()]
    }

    pub fn phase(&self) -> GuardPhase {
        self.phase
    }

    pub fn is_recovering(&self) -> bool {
        matches!(self.phase, GuardPhase::Recovering { .. })
    }

    /// Run one cycle of the guard.
    ///
    /// Transient bus errors are logged and skipped; only port-level failures are returned.
    pub fn step<A: Actuator>(
        &mut self,
        now: Instant,
        actuator: &mut A,
        state: &SharedState,
    ) -> Result<GuardPhase, DynamixelError> {
        let phase = self.phase;
        match phase {
            GuardPhase::Monitoring => self.check(now, actuator, state)?,
            GuardPhase::Recovering { deadline } if now >= deadline => self.settle(actuator)?,
            GuardPhase::Recovering { .. } => {}
        }
        Ok(self.phase)
    }

    fn check<A: Actuator>(
        &mut self,
        now: Instant,
        actuator: &mut A,
        state: &SharedState,
    ) -> Result<(), DynamixelError> {
        for axis in self.axes.iter_mut() {
            let Some(position) = tolerate(actuator.read_position(axis.id), axis.id, "position read")?
            else {
                continue;
            };
            if axis.limits.contains(position) {
                continue;
            }

            warn!(
                "{:?} out of bounds: {} not in [{}, {}]",
                axis.id, position, axis.limits.lo, axis.limits.hi
            );
            tolerate(actuator.set_velocity(axis.id, 0), axis.id, "stop")?;
            axis.bound_exceeded = true;
        }

        if self.axes.iter().any(|a| a.bound_exceeded) {
            // Both axes end the recovery stopped, so commands restart from zero
            lock(state).clear_velocities_written();
            self.recover(now, actuator)?;
        }
        Ok(())
    }

    /// Drive every flagged axis toward its midpoint and arm the settle deadline
    fn recover<A: Actuator>(&mut self, now: Instant, actuator: &mut A) -> Result<(), DynamixelError> {
        for axis in self.axes.iter().filter(|a| a.bound_exceeded) {
            let Some(position) = tolerate(actuator.read_position(axis.id), axis.id, "position read")?
            else {
                continue;
            };
            let velocity = recovery_velocity(&axis.limits, position, self.return_speed);
            info!("{:?} returning toward midpoint from {} at {}", axis.id, position, velocity);
            tolerate(actuator.set_velocity(axis.id, velocity), axis.id, "recovery")?;
        }

        self.phase = GuardPhase::Recovering {
            deadline: now + self.settle,
        };
        Ok(())
    }

    fn settle<A: Actuator>(&mut self, actuator: &mut A) -> Result<(), DynamixelError> {
        for axis in AxisId::ALL {
            tolerate(actuator.set_velocity(axis, 0), axis, "settle stop")?;
        }
        for axis in self.axes.iter_mut() {
            axis.bound_exceeded = false;
        }
        self.phase = GuardPhase::Monitoring;
        info!("Recovery complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::state::{shared, ControlState};
    use crate::motor::testing::RecordingActuator;

    // Defaults: pan [0, 4095], tilt [1024, 3072], return speed 50, settle 500 ms
    fn guard() -> BoundsGuard {
        BoundsGuard::new(&Config::default())
    }

    #[test]
    fn test_in_range_is_quiet() {
        let mut guard = guard();
        let mut motors = RecordingActuator::at(2000, 2000);
        let state = shared(ControlState::new());

        let phase = guard.step(Instant::now(), &mut motors, &state).unwrap();
        assert_eq!(phase, GuardPhase::Monitoring);
        assert!(motors.writes.is_empty());
        assert_eq!(motors.reads, 2);
    }

    #[test]
    fn test_out_of_range_stops_then_recovers() {
        let mut guard = guard();
        let mut motors = RecordingActuator::at(5000, 2000);
        let state = shared(ControlState::new());
        lock(&state).adjust_velocity(AxisId::Pan, 40);

        let now = Instant::now();
        guard.step(now, &mut motors, &state).unwrap();

        assert!(guard.axis(AxisId::Pan).bound_exceeded);
        assert!(!guard.axis(AxisId::Tilt).bound_exceeded);
        assert_eq!(lock(&state).velocities(), (0, 0));
        // Zero first, then back toward the midpoint
        assert_eq!(motors.writes_for(AxisId::Pan), vec![0, -50]);
        assert!(motors.writes_for(AxisId::Tilt).is_empty());
        assert_eq!(
            guard.phase(),
            GuardPhase::Recovering {
                deadline: now + Duration::from_millis(500)
            }
        );
    }

    #[test]
    fn test_recovery_clears_the_other_axis() {
        let mut guard = guard();
        let mut motors = RecordingActuator::at(5000, 2000);
        let state = shared(ControlState::new());
        lock(&state).adjust_velocity(AxisId::Tilt, 30);
        lock(&state).take_pending();

        guard.step(Instant::now(), &mut motors, &state).unwrap();
        assert_eq!(lock(&state).velocities(), (0, 0));
        // The tilt motor is only stopped when the recovery settles
        assert!(motors.writes_for(AxisId::Tilt).is_empty());
    }

    #[test]
    fn test_below_range_recovers_upward() {
        let mut guard = guard();
        let mut motors = RecordingActuator::at(2000, 500);
        let state = shared(ControlState::new());

        guard.step(Instant::now(), &mut motors, &state).unwrap();
        assert_eq!(motors.writes_for(AxisId::Tilt), vec![0, 50]);
        assert!(guard.axis(AxisId::Tilt).bound_exceeded);
    }

    #[test]
    fn test_negative_position_after_wraparound() {
        let mut guard = guard();
        let mut motors = RecordingActuator::at(-12, 2000);
        let state = shared(ControlState::new());

        guard.step(Instant::now(), &mut motors, &state).unwrap();
        assert_eq!(motors.writes_for(AxisId::Pan), vec![0, 50]);
    }

    #[test]
    fn test_both_axes_recover_together() {
        let mut guard = guard();
        let mut motors = RecordingActuator::at(4100, 100);
        let state = shared(ControlState::new());

        guard.step(Instant::now(), &mut motors, &state).unwrap();
        assert_eq!(motors.writes_for(AxisId::Pan), vec![0, -50]);
        assert_eq!(motors.writes_for(AxisId::Tilt), vec![0, 50]);
    }

    #[test]
    fn test_holds_until_deadline_then_settles() {
        let mut guard = guard();
        let mut motors = RecordingActuator::at(5000, 2000);
        let state = shared(ControlState::new());
        let start = Instant::now();

        guard.step(start, &mut motors, &state).unwrap();
        let writes = motors.writes.len();
        let reads = motors.reads;

        // Mid-hold: no I/O at all
        let phase = guard.step(start + Duration::from_millis(200), &mut motors, &state).unwrap();
        assert!(matches!(phase, GuardPhase::Recovering { .. }));
        assert_eq!(motors.writes.len(), writes);
        assert_eq!(motors.reads, reads);

        let phase = guard.step(start + Duration::from_millis(500), &mut motors, &state).unwrap();
        assert_eq!(phase, GuardPhase::Monitoring);
        assert_eq!(&motors.writes[writes..], &[(AxisId::Pan, 0), (AxisId::Tilt, 0)]);
        assert!(!guard.axis(AxisId::Pan).bound_exceeded);
    }

    #[test]
    fn test_still_out_of_range_retriggers() {
        let mut guard = guard();
        let mut motors = RecordingActuator::at(5000, 2000);
        let state = shared(ControlState::new());
        let start = Instant::now();

        guard.step(start, &mut motors, &state).unwrap();
        guard.step(start + Duration::from_millis(500), &mut motors, &state).unwrap();
        motors.writes.clear();

        let later = start + Duration::from_millis(501);
        guard.step(later, &mut motors, &state).unwrap();
        assert!(guard.is_recovering());
        assert_eq!(motors.writes_for(AxisId::Pan), vec![0, -50]);
    }

    #[test]
    fn test_transient_read_skips_axis() {
        let mut guard = guard();
        let mut motors = RecordingActuator::at(5000, 5000);
        motors.fail_reads = true;
        let state = shared(ControlState::new());

        let phase = guard.step(Instant::now(), &mut motors, &state).unwrap();
        assert_eq!(phase, GuardPhase::Monitoring);
        assert!(motors.writes.is_empty());
    }

    #[test]
    fn test_port_loss_is_fatal() {
        let mut guard = guard();
        let mut motors = RecordingActuator::at(2000, 2000);
        motors.port_lost = true;
        let state = shared(ControlState::new());

        assert!(guard.step(Instant::now(), &mut motors, &state).is_err());
    }

    #[test]
    fn test_recovery_velocity_sign() {
        let limits = PositionLimits::new(0, 4095);
        assert_eq!(recovery_velocity(&limits, 5000, 50), -50);
        assert_eq!(recovery_velocity(&limits, -3, 50), 50);
        // Midpoint is 2047.5
        assert_eq!(recovery_velocity(&limits, 2047, 50), 50);
        assert_eq!(recovery_velocity(&limits, 2048, 50), -50);

        let even = PositionLimits::new(-100, 100);
        assert_eq!(recovery_velocity(&even, 0, 50).abs(), 50);
    }

    #[test]
    fn test_limits_inclusive() {
        let limits = PositionLimits::new(1024, 3072);
        assert!(limits.contains(1024));
        assert!(limits.contains(3072));
        assert!(!limits.contains(1023));
        assert!(!limits.contains(3073));
    }
}
