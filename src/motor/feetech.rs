// Feetech STS3215 serial protocol, as used by the arm joint drives
//
// Packet format: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]
//
// The joint drives run in PWM mode: the duty cycle is written to the Goal Time
// register with the direction in bit 10, and position is read back from the
// single-turn Present Position register.

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BAUDRATE: u32 = 1_000_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Position resolution of the STS3215 encoder
pub const STEPS_PER_REVOLUTION: u16 = 4096;

/// Full-scale PWM magnitude
pub const PWM_FULL_SCALE: u16 = 1000;

const PWM_DIRECTION_BIT: u16 = 1 << 10;

const HEADER: [u8; 2] = [0xFF, 0xFF];

const BROADCAST_ID: u8 = 0xFE;

#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
    SyncWrite = 0x83,
}

/// Register addresses for STS3215
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    // EEPROM area
    ModelNumber = 3, // 2 bytes, read-only

    // RAM area
    OperatingMode = 33,   // 1 byte: 0=position, 1=velocity, 2=PWM, 3=step
    TorqueEnable = 40,    // 1 byte
    GoalTime = 44,        // 2 bytes, PWM duty in PWM mode
    Lock = 55,            // 1 byte
    PresentPosition = 56, // 2 bytes, read-only
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperatingMode {
    Position = 0,
    Velocity = 1,
    Pwm = 2,
    Step = 3,
}

#[derive(Debug, thiserror::Error)]
pub enum FeetechError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from motor {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for motor {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Motor {id} returned error status: 0x{status:02X}")]
    MotorError { id: u8, status: u8 },

    #[error("Timeout waiting for response from motor {id}")]
    Timeout { id: u8 },
}

pub type Result<T> = std::result::Result<T, FeetechError>;

pub struct FeetechBus {
    port: Box<dyn SerialPort>,
}

impl FeetechBus {
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self { port })
    }

    /// Inverted byte sum, header excluded
    fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8;
        let mut packet = Vec::with_capacity(6 + params.len());

        packet.extend_from_slice(&HEADER);
        packet.extend_from_slice(&[id, length, instruction as u8]);
        packet.extend_from_slice(params);
        packet.push(Self::checksum(&packet[2..]));

        packet
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }

    /// Read a status packet and return its parameters
    fn read_response(&mut self, expected_id: u8) -> Result<Vec<u8>> {
        let mut header = [0u8; 4];
        self.port.read_exact(&mut header).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                FeetechError::Timeout { id: expected_id }
            } else {
                FeetechError::Io(e)
            }
        })?;

        if header[..2] != HEADER {
            return Err(FeetechError::InvalidResponse {
                id: expected_id,
                reason: format!("Invalid header: {:02X?}", &header[..2]),
            });
        }

        let (id, length) = (header[2], header[3] as usize);
        if id != expected_id {
            return Err(FeetechError::InvalidResponse {
                id: expected_id,
                reason: format!("ID mismatch: expected {}, got {}", expected_id, id),
            });
        }
        if length < 2 {
            return Err(FeetechError::InvalidResponse {
                id,
                reason: format!("Length {} too short", length),
            });
        }

        // status byte + params + checksum
        let mut body = vec![0u8; length];
        self.port.read_exact(&mut body)?;

        let (payload, checksum) = body.split_at(length - 1);
        let mut summed = vec![id, length as u8];
        summed.extend_from_slice(payload);
        if Self::checksum(&summed) != checksum[0] {
            return Err(FeetechError::ChecksumMismatch { id });
        }

        if payload[0] != 0 {
            return Err(FeetechError::MotorError {
                id,
                status: payload[0],
            });
        }

        Ok(payload[1..].to_vec())
    }

    pub fn ping(&mut self, id: u8) -> Result<bool> {
        let packet = Self::build_packet(id, Instruction::Ping, &[]);
        self.send_packet(&packet)?;

        match self.read_response(id) {
            Ok(_) => Ok(true),
            Err(FeetechError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        let packet = Self::build_packet(id, Instruction::Write, &[register as u8, value]);
        debug!("Write u8 to motor {}: reg={:?}, value={}", id, register, value);
        self.send_packet(&packet)?;
        self.read_response(id).map(|_| ())
    }

    /// Little-endian 16-bit write
    pub fn write_u16(&mut self, id: u8, register: Register, value: u16) -> Result<()> {
        let [lo, hi] = value.to_le_bytes();
        let packet = Self::build_packet(id, Instruction::Write, &[register as u8, lo, hi]);
        debug!("Write u16 to motor {}: reg={:?}, value={}", id, register, value);
        self.send_packet(&packet)?;
        self.read_response(id).map(|_| ())
    }

    pub fn read_u8(&mut self, id: u8, register: Register) -> Result<u8> {
        let packet = Self::build_packet(id, Instruction::Read, &[register as u8, 1]);
        self.send_packet(&packet)?;

        let response = self.read_response(id)?;
        response.first().copied().ok_or(FeetechError::InvalidResponse {
            id,
            reason: "Empty read response".to_string(),
        })
    }

    /// Little-endian 16-bit read
    pub fn read_u16(&mut self, id: u8, register: Register) -> Result<u16> {
        let packet = Self::build_packet(id, Instruction::Read, &[register as u8, 2]);
        self.send_packet(&packet)?;

        let response = self.read_response(id)?;
        match response.as_slice() {
            [lo, hi, ..] => Ok(u16::from_le_bytes([*lo, *hi])),
            _ => Err(FeetechError::InvalidResponse {
                id,
                reason: format!("Expected 2 bytes, got {}", response.len()),
            }),
        }
    }

    /// Write the same 16-bit register on several motors in one broadcast
    /// packet. Sync write has no response.
    pub fn sync_write_u16(&mut self, register: Register, data: &[(u8, u16)]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        let mut params = vec![register as u8, 2];
        for &(id, value) in data {
            params.push(id);
            params.extend_from_slice(&value.to_le_bytes());
        }

        let packet = Self::build_packet(BROADCAST_ID, Instruction::SyncWrite, &params);
        debug!("Sync write to {} motors: reg={:?}", data.len(), register);
        self.send_packet(&packet)
    }

    pub fn enable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 1)?;
        self.write_u8(id, Register::Lock, 1)
    }

    pub fn disable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 0)?;
        self.write_u8(id, Register::Lock, 0)
    }

    /// Torque must be disabled first
    pub fn set_operating_mode(&mut self, id: u8, mode: OperatingMode) -> Result<()> {
        self.write_u8(id, Register::OperatingMode, mode as u8)
    }

    /// Command a duty cycle in [-1, 1] (PWM mode only)
    pub fn set_pwm(&mut self, id: u8, fraction: f64) -> Result<()> {
        self.write_u16(id, Register::GoalTime, encode_pwm(fraction))
    }

    /// Raw single-turn position, 0..STEPS_PER_REVOLUTION
    pub fn get_position(&mut self, id: u8) -> Result<u16> {
        Ok(self.read_u16(id, Register::PresentPosition)? % STEPS_PER_REVOLUTION)
    }

    pub fn get_model_number(&mut self, id: u8) -> Result<u16> {
        self.read_u16(id, Register::ModelNumber)
    }
}

/// Duty fraction to the PWM register format: magnitude in bits 0-9, bit 10 set
/// for reverse
pub fn encode_pwm(fraction: f64) -> u16 {
    let magnitude = (fraction.abs().min(1.0) * PWM_FULL_SCALE as f64).round() as u16;
    if fraction < 0.0 && magnitude > 0 {
        magnitude | PWM_DIRECTION_BIT
    } else {
        magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum() {
        // ~(1+4+3+30+0+2) = ~40 = 215
        let data = [1u8, 4, 0x03, 30, 0, 2];
        assert_eq!(FeetechBus::checksum(&data), 215);
    }

    #[test]
    fn test_pwm_encoding() {
        assert_eq!(encode_pwm(0.0), 0);
        assert_eq!(encode_pwm(0.5), 500);
        assert_eq!(encode_pwm(-0.5), 500 | 0x400);
        assert_eq!(encode_pwm(-0.0), 0);
        // Saturates at full scale
        assert_eq!(encode_pwm(2.0), 1000);
        assert_eq!(encode_pwm(-1.0), 1000 | 0x400);
    }

    #[test]
    fn test_build_read_position_packet() {
        let packet = FeetechBus::build_packet(10, Instruction::Read, &[Register::PresentPosition as u8, 2]);
        assert_eq!(packet.len(), 8);
        assert_eq!(&packet[..5], &[0xFF, 0xFF, 10, 4, 0x02]);
        assert_eq!(packet[5], 56);
        assert_eq!(packet[6], 2);
        assert_eq!(packet[7], FeetechBus::checksum(&packet[2..7]));
    }
}
