// Serial port, axis limits, speeds, tracking geometry, network endpoints
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

// Serial bus
pub const SERIAL_PORT: &str = "/dev/ttyUSB0";
pub const BAUD_RATE: u32 = 57_600;
pub const SERIAL_TIMEOUT_MS: u64 = 100;

// Motor IDs on the bus
pub const PAN_MOTOR_ID: u8 = 1;
pub const TILT_MOTOR_ID: u8 = 2;

// Software position limits (raw encoder ticks)
pub const PAN_LIMITS: (i32, i32) = (0, 4095);
pub const TILT_LIMITS: (i32, i32) = (1024, 3072);

// Largest value the position register reports before wrapping to negative
pub const MAX_POSITION_VALUE: u32 = 0x7FFF_FFFF;

// Manual control: velocity step per key press
pub const SPEED_INCREMENT: i32 = 10;

// Recovery maneuver
pub const RETURN_SPEED: i32 = 50;
pub const SETTLE: Duration = Duration::from_millis(500);

// Camera frame and dead zone (pixels)
pub const FRAME_WIDTH: u32 = 800;
pub const FRAME_HEIGHT: u32 = 600;
pub const DEAD_ZONE_WIDTH: u32 = 200;
pub const DEAD_ZONE_HEIGHT: u32 = 150;
pub const UPPER_LINE_OFFSET: u32 = 80;
pub const LOWER_LINE_OFFSET: u32 = 80;

// Auto tracking speed range
pub const MIN_AUTO_SPEED: i32 = 5;
pub const MAX_AUTO_SPEED: i32 = 30;

// UDP command server
pub const SERVER_ADDR: &str = "192.168.0.10:5005";
pub const BIND_ADDR: &str = "0.0.0.0:0";
pub const LISTEN_INTERVAL: Duration = Duration::from_millis(10);

/// Liveness payload sent to the server on startup
pub const HELLO_PAYLOAD: &[u8; 2] = b"hi";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: SERIAL_PORT.to_string(),
            baud_rate: BAUD_RATE,
            timeout_ms: SERIAL_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AxisConfig {
    pub motor_id: u8,
    pub min_position: i32,
    pub max_position: i32,
}

impl AxisConfig {
    fn pan() -> Self {
        Self {
            motor_id: PAN_MOTOR_ID,
            min_position: PAN_LIMITS.0,
            max_position: PAN_LIMITS.1,
        }
    }

    fn tilt() -> Self {
        Self {
            motor_id: TILT_MOTOR_ID,
            min_position: TILT_LIMITS.0,
            max_position: TILT_LIMITS.1,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub frame_width: u32,
    pub frame_height: u32,
    pub dead_zone_width: u32,
    pub dead_zone_height: u32,
    pub upper_line_offset: u32,
    pub lower_line_offset: u32,
    pub min_auto_speed: i32,
    pub max_auto_speed: i32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            frame_width: FRAME_WIDTH,
            frame_height: FRAME_HEIGHT,
            dead_zone_width: DEAD_ZONE_WIDTH,
            dead_zone_height: DEAD_ZONE_HEIGHT,
            upper_line_offset: UPPER_LINE_OFFSET,
            lower_line_offset: LOWER_LINE_OFFSET,
            min_auto_speed: MIN_AUTO_SPEED,
            max_auto_speed: MAX_AUTO_SPEED,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub enabled: bool,
    pub server_addr: String,
    pub bind_addr: String,
    pub listen_interval_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            server_addr: SERVER_ADDR.to_string(),
            bind_addr: BIND_ADDR.to_string(),
            listen_interval_ms: LISTEN_INTERVAL.as_millis() as u64,
        }
    }
}

impl NetworkConfig {
    pub fn server_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr("server_addr", &self.server_addr)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr("bind_addr", &self.bind_addr)
    }

    pub fn listen_interval(&self) -> Duration {
        Duration::from_millis(self.listen_interval_ms)
    }
}

fn parse_addr(field: &str, value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .parse()
        .map_err(|e| ConfigError::Invalid(format!("{field} '{value}': {e}")))
}

/// Runtime configuration, built once at startup and shared read-only
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub pan: AxisConfig,
    pub tilt: AxisConfig,
    pub max_position_value: u32,
    pub speed_increment: i32,
    pub return_speed: i32,
    pub settle_ms: u64,
    pub cycle_yield_us: u64,
    pub tracking: TrackingConfig,
    pub network: NetworkConfig,
    pub keyboard_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            pan: AxisConfig::pan(),
            tilt: AxisConfig::tilt(),
            max_position_value: MAX_POSITION_VALUE,
            speed_increment: SPEED_INCREMENT,
            return_speed: RETURN_SPEED,
            settle_ms: SETTLE.as_millis() as u64,
            cycle_yield_us: 0,
            tracking: TrackingConfig::default(),
            network: NetworkConfig::default(),
            keyboard_enabled: true,
        }
    }
}

impl Config {
    /// Load a JSON config file; missing fields fall back to the defaults above
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn cycle_yield(&self) -> Duration {
        Duration::from_micros(self.cycle_yield_us)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, axis) in [("pan", &self.pan), ("tilt", &self.tilt)] {
            if axis.min_position > axis.max_position {
                return Err(ConfigError::Invalid(format!(
                    "{name} limits inverted: [{}, {}]",
                    axis.min_position, axis.max_position
                )));
            }
        }
        if self.pan.motor_id == self.tilt.motor_id {
            return Err(ConfigError::Invalid(format!(
                "pan and tilt share motor id {}",
                self.pan.motor_id
            )));
        }
        if self.speed_increment <= 0 {
            return Err(ConfigError::Invalid("speed_increment must be positive".into()));
        }
        if self.return_speed <= 0 {
            return Err(ConfigError::Invalid("return_speed must be positive".into()));
        }

        let t = &self.tracking;
        if t.frame_width < 2 || t.frame_height < 2 {
            return Err(ConfigError::Invalid(format!(
                "frame too small: {}x{}",
                t.frame_width, t.frame_height
            )));
        }
        if t.min_auto_speed < 0 || t.min_auto_speed > t.max_auto_speed {
            return Err(ConfigError::Invalid(format!(
                "auto speed range invalid: {}..{}",
                t.min_auto_speed, t.max_auto_speed
            )));
        }

        if self.network.enabled {
            self.network.server_addr()?;
            self.network.bind_addr()?;
            if self.network.listen_interval_ms == 0 {
                return Err(ConfigError::Invalid("listen_interval_ms must be nonzero".into()));
            }
        }
        Ok(())
    }
}
