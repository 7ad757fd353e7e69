// Dynamixel Protocol 2.0 serial implementation (X-series control table)
//
// Instruction packet: [0xFF, 0xFF, 0xFD, 0x00, ID, LEN_L, LEN_H, Instruction, Params..., CRC_L, CRC_H]
// Status packet:      [0xFF, 0xFF, 0xFD, 0x00, ID, LEN_L, LEN_H, 0x55, Error, Params..., CRC_L, CRC_H]
// LEN counts everything after itself (instruction + params + CRC).

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

/// Packet header bytes (0x00 is reserved)
const HEADER: [u8; 4] = [0xFF, 0xFF, 0xFD, 0x00];

/// Instruction set
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
    Status = 0x55,
}

/// Control table addresses
#[repr(u16)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    // EEPROM area (writable only with torque off)
    OperatingMode = 11, // 1 byte

    // RAM area
    TorqueEnable = 64,     // 1 byte: 0=off, 1=on
    GoalVelocity = 104,    // 4 bytes, signed
    PresentPosition = 132, // 4 bytes, read-only
}

/// Operating modes (only wheel-style velocity control is driven here)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperatingMode {
    Velocity = 1,
}

/// Error types for Dynamixel communication
#[derive(Debug, thiserror::Error)]
pub enum DynamixelError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from motor {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("CRC mismatch for motor {id}")]
    CrcMismatch { id: u8 },

    #[error("Motor {id} returned error status: 0x{status:02X}")]
    DeviceError { id: u8, status: u8 },

    #[error("Timeout waiting for response from motor {id}")]
    Timeout { id: u8 },
}

impl DynamixelError {
    /// Errors the control loop logs and rides through. Port-level failures are not.
    pub fn is_transient(&self) -> bool {
        !matches!(self, DynamixelError::Serial(_) | DynamixelError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, DynamixelError>;

/// Convert a raw position register value to a signed position.
///
/// Values above `max` are the device's encoding of negative positions.
pub fn correct_wraparound(raw: u32, max: u32) -> i32 {
    if raw > max {
        (raw as i64 - 2 * (max as i64 + 1)) as i32
    } else {
        raw as i32
    }
}

/// Encode a signed velocity as the 32-bit register value (two's complement)
pub fn encode_velocity(velocity: i32) -> u32 {
    velocity as u32
}

/// Dynamixel motor bus - handles serial communication with motors
pub struct DynamixelBus {
    port: Box<dyn SerialPort>,
}

impl DynamixelBus {
    /// Open with custom baudrate and response timeout
    pub fn open_with_baudrate(port_name: &str, baudrate: u32, timeout_ms: u64) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(timeout_ms))
            .open()?;

        Ok(Self { port })
    }

    /// Change the host-side baud rate
    pub fn set_baud_rate(&mut self, baudrate: u32) -> Result<()> {
        self.port.set_baud_rate(baudrate)?;
        Ok(())
    }

    /// CRC-16 (polynomial 0x8005, initial value 0) over the whole packet before the CRC
    fn crc16(data: &[u8]) -> u16 {
        let mut crc: u16 = 0;
        for &byte in data {
            crc ^= (byte as u16) << 8;
            for _ in 0..8 {
                crc = if crc & 0x8000 != 0 {
                    (crc << 1) ^ 0x8005
                } else {
                    crc << 1
                };
            }
        }
        crc
    }

    /// Insert 0xFD after any FF FF FD sequence so it can't be mistaken for a header
    fn stuff(body: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(body.len() + 2);
        for &b in body {
            out.push(b);
            if out.ends_with(&[0xFF, 0xFF, 0xFD]) {
                out.push(0xFD);
            }
        }
        out
    }

    /// Reverse of `stuff`
    fn unstuff(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(data.len());
        let mut i = 0;
        while i < data.len() {
            out.push(data[i]);
            if out.ends_with(&[0xFF, 0xFF, 0xFD]) && data.get(i + 1) == Some(&0xFD) {
                i += 1;
            }
            i += 1;
        }
        out
    }

    /// Build a packet with header, length and CRC
    fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let mut body = Vec::with_capacity(1 + params.len());
        body.push(instruction as u8);
        body.extend_from_slice(params);
        let body = Self::stuff(&body);

        let length = (body.len() + 2) as u16; // body + CRC
        let mut packet = Vec::with_capacity(HEADER.len() + 3 + body.len() + 2);
        packet.extend_from_slice(&HEADER);
        packet.push(id);
        packet.extend_from_slice(&length.to_le_bytes());
        packet.extend_from_slice(&body);

        let crc = Self::crc16(&packet);
        packet.extend_from_slice(&crc.to_le_bytes());
        packet
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }

    /// Fill `buf`, reporting a read timeout as a motor timeout
    fn read_exact(&mut self, buf: &mut [u8], expected_id: u8) -> Result<()> {
        self.port.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                DynamixelError::Timeout { id: expected_id }
            } else {
                DynamixelError::Io(e)
            }
        })
    }

    /// Read a status packet and return its (unstuffed) parameters
    fn read_status(&mut self, expected_id: u8) -> Result<Vec<u8>> {
        let mut head = [0u8; 7];
        self.read_exact(&mut head, expected_id)?;

        let mut remaining = vec![0u8; u16::from_le_bytes([head[5], head[6]]) as usize];
        self.read_exact(&mut remaining, expected_id)?;

        parse_status(expected_id, &head, &remaining)
    }

    /// Ping a motor to check if it's connected
    pub fn ping(&mut self, id: u8) -> Result<bool> {
        let packet = Self::build_packet(id, Instruction::Ping, &[]);
        self.send_packet(&packet)?;

        match self.read_status(id) {
            Ok(_) => Ok(true),
            Err(DynamixelError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Write raw bytes starting at a register
    pub fn write(&mut self, id: u8, register: Register, data: &[u8]) -> Result<()> {
        let mut params = Vec::with_capacity(2 + data.len());
        params.extend_from_slice(&(register as u16).to_le_bytes());
        params.extend_from_slice(data);

        let packet = Self::build_packet(id, Instruction::Write, &params);
        debug!("Write to motor {}: reg={:?}, data={:02X?}", id, register, data);
        self.send_packet(&packet)?;

        let _ = self.read_status(id)?;
        Ok(())
    }

    pub fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        self.write(id, register, &[value])
    }

    pub fn write_u32(&mut self, id: u8, register: Register, value: u32) -> Result<()> {
        self.write(id, register, &value.to_le_bytes())
    }

    /// Read `len` bytes starting at a register
    pub fn read(&mut self, id: u8, register: Register, len: u16) -> Result<Vec<u8>> {
        let mut params = [0u8; 4];
        params[..2].copy_from_slice(&(register as u16).to_le_bytes());
        params[2..].copy_from_slice(&len.to_le_bytes());

        let packet = Self::build_packet(id, Instruction::Read, &params);
        self.send_packet(&packet)?;

        let response = self.read_status(id)?;
        if response.len() < len as usize {
            return Err(DynamixelError::InvalidResponse {
                id,
                reason: format!("Expected {} bytes, got {}", len, response.len()),
            });
        }
        Ok(response)
    }

    pub fn read_u32(&mut self, id: u8, register: Register) -> Result<u32> {
        let data = self.read(id, register, 4)?;
        Ok(u32::from_le_bytes([data[0], data[1], data[2], data[3]]))
    }

    // === High-level convenience methods ===

    pub fn enable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 1)
    }

    pub fn disable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 0)
    }

    /// Set operating mode (torque must be off)
    pub fn set_operating_mode(&mut self, id: u8, mode: OperatingMode) -> Result<()> {
        self.write_u8(id, Register::OperatingMode, mode as u8)
    }

    /// Set goal velocity for a motor (must be in velocity mode)
    pub fn set_goal_velocity(&mut self, id: u8, velocity: i32) -> Result<()> {
        self.write_u32(id, Register::GoalVelocity, encode_velocity(velocity))
    }

    /// Raw present position register, before wraparound correction
    pub fn present_position_raw(&mut self, id: u8) -> Result<u32> {
        self.read_u32(id, Register::PresentPosition)
    }
}

/// Validate a status packet split into its 7-byte head and the LEN bytes that follow
fn parse_status(expected_id: u8, head: &[u8; 7], remaining: &[u8]) -> Result<Vec<u8>> {
    if head[..4] != HEADER {
        return Err(DynamixelError::InvalidResponse {
            id: expected_id,
            reason: format!("Invalid header: {:02X?}", &head[..4]),
        });
    }

    let id = head[4];
    if id != expected_id {
        return Err(DynamixelError::InvalidResponse {
            id: expected_id,
            reason: format!("ID mismatch: expected {}, got {}", expected_id, id),
        });
    }

    // instruction + error + CRC at minimum
    if remaining.len() < 4 {
        return Err(DynamixelError::InvalidResponse {
            id,
            reason: format!("Status packet too short: {} bytes", remaining.len()),
        });
    }

    let crc_at = remaining.len() - 2;
    let mut crc_data = head.to_vec();
    crc_data.extend_from_slice(&remaining[..crc_at]);
    let expected_crc = DynamixelBus::crc16(&crc_data);
    let received_crc = u16::from_le_bytes([remaining[crc_at], remaining[crc_at + 1]]);
    if expected_crc != received_crc {
        return Err(DynamixelError::CrcMismatch { id });
    }

    if remaining[0] != Instruction::Status as u8 {
        return Err(DynamixelError::InvalidResponse {
            id,
            reason: format!("Not a status packet: instruction 0x{:02X}", remaining[0]),
        });
    }

    let status = remaining[1];
    if status != 0 {
        return Err(DynamixelError::DeviceError { id, status });
    }

    Ok(DynamixelBus::unstuff(&remaining[2..crc_at]))
}
