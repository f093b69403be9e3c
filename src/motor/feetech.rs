// Feetech STS serial bus protocol (STS3215 and friends)
//
// Instruction packet: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]
// Status packet:      [0xFF, 0xFF, ID, Length, Error, Params..., Checksum]
// Length counts everything after itself; the checksum is the inverted low byte
// of the sum of ID, Length and the body.

use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BAUDRATE: u32 = 1_000_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Servo position resolution, ticks per revolution
pub const POSITION_RESOLUTION: u16 = 4096;

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

/// Control table addresses used by the drive
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    OperatingMode = 33,   // 1 byte: 0=position, 1=velocity, 2=PWM
    TorqueEnable = 40,    // 1 byte
    GoalVelocity = 46,    // 2 bytes, sign-magnitude
    Lock = 55,            // 1 byte
    PresentPosition = 56, // 2 bytes, 0..4095
    PresentVelocity = 58, // 2 bytes, sign-magnitude
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperatingMode {
    Position = 0,
    Velocity = 1,
    Pwm = 2,
}

impl OperatingMode {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(OperatingMode::Position),
            1 => Some(OperatingMode::Velocity),
            2 => Some(OperatingMode::Pwm),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FeetechError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from servo {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for servo {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Servo {id} returned error status: 0x{status:02X}")]
    ServoError { id: u8, status: u8 },

    #[error("Timeout waiting for response from servo {id}")]
    Timeout { id: u8 },
}

pub type Result<T> = std::result::Result<T, FeetechError>;

fn checksum(bytes: &[u8]) -> u8 {
    let sum = bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    !sum
}

/// Frame an instruction packet
fn instruction_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(params.len() + 6);
    packet.extend_from_slice(&HEADER);
    packet.push(id);
    packet.push((params.len() + 2) as u8);
    packet.push(instruction as u8);
    packet.extend_from_slice(params);
    packet.push(checksum(&packet[2..]));
    packet
}

/// Validate the part of a status packet after the header
/// (`id`, `length`, `error`, params..., `checksum`) and return the params.
fn parse_status(expected_id: u8, frame: &[u8]) -> Result<Vec<u8>> {
    let invalid = |reason: String| FeetechError::InvalidResponse {
        id: expected_id,
        reason,
    };

    if frame.len() < 4 {
        return Err(invalid(format!("Short frame: {} bytes", frame.len())));
    }

    let id = frame[0];
    if id != expected_id {
        return Err(invalid(format!("ID mismatch: got {}", id)));
    }

    let length = frame[1] as usize;
    if frame.len() != length + 2 {
        return Err(invalid(format!(
            "Length {} does not match {} body bytes",
            length,
            frame.len() - 2
        )));
    }

    let (body, received) = frame.split_at(frame.len() - 1);
    if checksum(body) != received[0] {
        return Err(FeetechError::ChecksumMismatch { id });
    }

    let status = frame[2];
    if status != 0 {
        return Err(FeetechError::ServoError { id, status });
    }

    Ok(frame[3..frame.len() - 1].to_vec())
}

/// Sign-magnitude, as used by the velocity registers: bit 15 is the sign
pub fn encode_sign_magnitude(value: i16) -> u16 {
    let magnitude = value.unsigned_abs().min(0x7FFF);
    if value < 0 { 0x8000 | magnitude } else { magnitude }
}

pub fn decode_sign_magnitude(raw: u16) -> i16 {
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 { -magnitude } else { magnitude }
}

/// A half-duplex servo bus on one serial port
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

    fn send(&mut self, packet: &[u8]) -> Result<()> {
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }

    fn receive(&mut self, expected_id: u8) -> Result<Vec<u8>> {
        let mut head = [0u8; 4];
        self.port.read_exact(&mut head).map_err(|e| match e.kind() {
            std::io::ErrorKind::TimedOut => FeetechError::Timeout { id: expected_id },
            _ => FeetechError::Io(e),
        })?;

        if head[..2] != HEADER {
            return Err(FeetechError::InvalidResponse {
                id: expected_id,
                reason: format!("Invalid header: {:02X?}", &head[..2]),
            });
        }

        let length = head[3] as usize;
        let mut frame = Vec::with_capacity(length + 2);
        frame.extend_from_slice(&head[2..]);
        frame.resize(length + 2, 0);
        self.port.read_exact(&mut frame[2..])?;

        parse_status(expected_id, &frame)
    }

    fn transact(&mut self, id: u8, instruction: Instruction, params: &[u8]) -> Result<Vec<u8>> {
        self.send(&instruction_packet(id, instruction, params))?;
        self.receive(id)
    }

    /// `Ok(false)` when the servo stays silent
    pub fn ping(&mut self, id: u8) -> Result<bool> {
        match self.transact(id, Instruction::Ping, &[]) {
            Ok(_) => Ok(true),
            Err(FeetechError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        debug!("Servo {} {:?} <- {}", id, register, value);
        self.transact(id, Instruction::Write, &[register as u8, value])?;
        Ok(())
    }

    pub fn read_u8(&mut self, id: u8, register: Register) -> Result<u8> {
        let data = self.transact(id, Instruction::Read, &[register as u8, 1])?;
        data.first()
            .copied()
            .ok_or_else(|| FeetechError::InvalidResponse {
                id,
                reason: "Empty response".to_string(),
            })
    }

    pub fn read_u16(&mut self, id: u8, register: Register) -> Result<u16> {
        let data = self.transact(id, Instruction::Read, &[register as u8, 2])?;
        match data[..] {
            [lo, hi, ..] => Ok(u16::from_le_bytes([lo, hi])),
            _ => Err(FeetechError::InvalidResponse {
                id,
                reason: format!("Expected 2 bytes, got {}", data.len()),
            }),
        }
    }

    /// Write the same 16-bit register on several servos in one broadcast packet.
    /// The servos do not answer.
    pub fn sync_write_u16(&mut self, register: Register, data: &[(u8, u16)]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        let mut params = Vec::with_capacity(2 + data.len() * 3);
        params.push(register as u8);
        params.push(2);
        for &(id, value) in data {
            params.push(id);
            params.extend_from_slice(&value.to_le_bytes());
        }

        debug!("Sync write {:?} to {} servos", register, data.len());
        self.send(&instruction_packet(BROADCAST_ID, Instruction::SyncWrite, &params))
    }

    pub fn sync_write_velocities(&mut self, data: &[(u8, i16)]) -> Result<()> {
        let encoded: Vec<(u8, u16)> = data
            .iter()
            .map(|&(id, v)| (id, encode_sign_magnitude(v)))
            .collect();
        self.sync_write_u16(Register::GoalVelocity, &encoded)
    }

    pub fn enable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 1)?;
        self.write_u8(id, Register::Lock, 1)
    }

    pub fn disable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 0)?;
        self.write_u8(id, Register::Lock, 0)
    }

    /// Torque must be off while the mode changes
    pub fn set_operating_mode(&mut self, id: u8, mode: OperatingMode) -> Result<()> {
        self.write_u8(id, Register::OperatingMode, mode as u8)
    }

    pub fn operating_mode(&mut self, id: u8) -> Result<Option<OperatingMode>> {
        Ok(OperatingMode::from_raw(self.read_u8(id, Register::OperatingMode)?))
    }

    /// Present position in ticks, 0..4095
    pub fn position(&mut self, id: u8) -> Result<u16> {
        Ok(self.read_u16(id, Register::PresentPosition)? % POSITION_RESOLUTION)
    }

    pub fn velocity(&mut self, id: u8) -> Result<i16> {
        Ok(decode_sign_magnitude(
            self.read_u16(id, Register::PresentVelocity)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum() {
        // ID=1, Length=4, WRITE, addr 30, data 0, 2: ~40 = 215
        assert_eq!(checksum(&[1, 4, 0x03, 30, 0, 2]), 215);
    }

    #[test]
    fn test_checksum_wraps() {
        assert_eq!(checksum(&[0xFE, 0x10, 0x83]), !0x91u8);
    }

    #[test]
    fn test_instruction_packet() {
        let packet = instruction_packet(7, Instruction::Read, &[Register::PresentPosition as u8, 2]);
        assert_eq!(packet, vec![0xFF, 0xFF, 7, 4, 0x02, 56, 2, !(7u8 + 4 + 2 + 56 + 2)]);
    }

    #[test]
    fn test_parse_position_status() {
        // Servo 7 reporting 0x0800 (2048 ticks)
        let body = [7u8, 4, 0, 0x00, 0x08];
        let mut frame = body.to_vec();
        frame.push(checksum(&body));

        let params = parse_status(7, &frame).unwrap();
        assert_eq!(u16::from_le_bytes([params[0], params[1]]), 2048);
    }

    #[test]
    fn test_parse_status_errors() {
        let body = [7u8, 2, 0x20];
        let mut frame = body.to_vec();
        frame.push(checksum(&body));
        assert!(matches!(
            parse_status(7, &frame),
            Err(FeetechError::ServoError { id: 7, status: 0x20 })
        ));

        assert!(matches!(
            parse_status(8, &frame),
            Err(FeetechError::InvalidResponse { id: 8, .. })
        ));

        let mut corrupt = frame.clone();
        *corrupt.last_mut().unwrap() ^= 0xFF;
        assert!(matches!(
            parse_status(7, &corrupt),
            Err(FeetechError::ChecksumMismatch { id: 7 })
        ));
    }

    #[test]
    fn test_sign_magnitude() {
        assert_eq!(encode_sign_magnitude(100), 100);
        assert_eq!(encode_sign_magnitude(-100), 0x8064);
        assert_eq!(encode_sign_magnitude(i16::MIN), 0xFFFF);
        assert_eq!(decode_sign_magnitude(0x8064), -100);
        assert_eq!(decode_sign_magnitude(0x0FA0), 4000);
    }
}
