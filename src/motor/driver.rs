// High-level driver for the pan/tilt rig
//
// Owns the Dynamixel bus and maps the two logical axes onto motor IDs.

use tracing::{debug, info, warn};

use super::dynamixel::{correct_wraparound, DynamixelBus, DynamixelError, OperatingMode};
use super::{Actuator, AxisId};
use crate::config::Config;

pub struct PanTiltDriver {
    bus: DynamixelBus,
    motor_ids: [u8; 2], // [pan, tilt]
    max_position_value: u32,
    released: bool,
}

impl PanTiltDriver {
    /// Open the serial port at the configured baud rate
    pub fn open(config: &Config) -> Result<Self, DynamixelError> {
        info!(
            "Opening motor bus on {} at {} baud",
            config.serial.port, config.serial.baud_rate
        );
        let mut bus = DynamixelBus::open_with_baudrate(
            &config.serial.port,
            config.serial.baud_rate,
            config.serial.timeout_ms,
        )?;
        bus.set_baud_rate(config.serial.baud_rate)?;

        Ok(Self {
            bus,
            motor_ids: [config.pan.motor_id, config.tilt.motor_id],
            max_position_value: config.max_position_value,
            released: false,
        })
    }

    pub fn motor_id(&self, axis: AxisId) -> u8 {
        self.motor_ids[axis.index()]
    }

    /// Put both motors in velocity mode and enable torque
    ///
    /// Any failure here is fatal for the runtime.
    pub fn initialize(&mut self) -> Result<(), DynamixelError> {
        info!("Initializing motors {:?} for velocity control", self.motor_ids);

        for &id in &self.motor_ids {
            match self.bus.ping(id) {
                Ok(true) => debug!("Motor {} responding", id),
                Ok(false) => {
                    warn!("Motor {} not responding to ping", id);
                    return Err(DynamixelError::Timeout { id });
                }
                Err(e) => return Err(e),
            }
        }

        // Operating mode lives in EEPROM, torque has to be off to change it
        for &id in &self.motor_ids {
            self.bus.disable_torque(id)?;
            self.bus.set_operating_mode(id, OperatingMode::Velocity)?;
            info!("Motor {} set to velocity control mode", id);
        }

        for &id in &self.motor_ids {
            self.bus.enable_torque(id)?;
            info!("Motor {} torque enabled", id);
        }

        self.released = false;
        Ok(())
    }

    /// Disable torque on both axes. Each axis is attempted even if the other fails.
    pub fn release(&mut self) -> bool {
        let mut ok = true;
        for axis in AxisId::ALL {
            let id = self.motor_id(axis);
            match self.bus.disable_torque(id) {
                Ok(()) => info!("{:?} motor {} torque disabled", axis, id),
                Err(e) => {
                    warn!("Failed to disable torque on {:?} motor {}: {}", axis, id, e);
                    ok = false;
                }
            }
        }
        self.released = true;
        ok
    }

    /// Close the port. Torque must already be released.
    pub fn close(mut self) {
        if !self.released {
            self.release();
        }
        info!("Motor bus closed");
    }
}

impl Actuator for PanTiltDriver {
    fn read_position(&mut self, axis: AxisId) -> Result<i32, DynamixelError> {
        let id = self.motor_id(axis);
        let raw = self.bus.present_position_raw(id)?;
        Ok(correct_wraparound(raw, self.max_position_value))
    }

    fn set_velocity(&mut self, axis: AxisId, velocity: i32) -> Result<(), DynamixelError> {
        let id = self.motor_id(axis);
        self.bus.set_goal_velocity(id, velocity)?;
        debug!("{:?} motor {} velocity set to {}", axis, id, velocity);
        Ok(())
    }
}

impl Drop for PanTiltDriver {
    fn drop(&mut self) {
        // Panic or early-exit path: never leave torque on
        if !self.released {
            warn!("Motor driver dropped with torque enabled, releasing");
            self.release();
        }
    }
}
