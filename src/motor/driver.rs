// Feetech-backed joint drives for the two-joint arm
//
// Each joint is one STS3215 in PWM mode. The servo only reports a single-turn
// position, so successive readings are unwrapped into a continuous count
// relative to the position latched at initialization.

use tracing::{debug, info, warn};

use super::feetech::{FeetechBus, FeetechError, OperatingMode, Register, STEPS_PER_REVOLUTION};
use super::{check_output, ArmIo, MotorError};
use crate::arm::JointId;

pub const LOWER_MOTOR_ID: u8 = 10;
pub const UPPER_MOTOR_ID: u8 = 9;

#[derive(Debug, Clone, Copy)]
struct JointDrive {
    id: u8,
    /// Flip output and count sign so positive output increases the count
    inverted: bool,
    last_raw: u16,
    count: i64,
}

impl JointDrive {
    fn new(id: u8, inverted: bool) -> Self {
        Self {
            id,
            inverted,
            last_raw: 0,
            count: 0,
        }
    }

    fn sign(&self) -> i64 {
        if self.inverted { -1 } else { 1 }
    }

    /// Fold a new raw reading into the continuous count
    fn accumulate(&mut self, raw: u16) -> i64 {
        self.count += self.sign() * unwrap_step(self.last_raw, raw);
        self.last_raw = raw;
        self.count
    }
}

/// Shortest signed step between two single-turn readings
fn unwrap_step(previous: u16, current: u16) -> i64 {
    let steps = STEPS_PER_REVOLUTION as i64;
    let mut delta = current as i64 - previous as i64;
    if delta > steps / 2 {
        delta -= steps;
    } else if delta < -steps / 2 {
        delta += steps;
    }
    delta
}

pub struct FeetechArm {
    bus: FeetechBus,
    lower: JointDrive,
    upper: JointDrive,
}

impl FeetechArm {
    /// The lower drive is mounted inverted
    pub fn with_motor_ids(port: &str, lower_id: u8, upper_id: u8) -> Result<Self, FeetechError> {
        info!("Opening arm motor bus on {}", port);
        let bus = FeetechBus::open(port)?;
        Ok(Self {
            bus,
            lower: JointDrive::new(lower_id, true),
            upper: JointDrive::new(upper_id, false),
        })
    }

    fn drive(&mut self, joint: JointId) -> &mut JointDrive {
        match joint {
            JointId::Lower => &mut self.lower,
            JointId::Upper => &mut self.upper,
        }
    }

    /// Put both drives in PWM mode and zero their counts at the present
    /// position.
    ///
    /// Must be called before any output is commanded.
    pub fn initialize(&mut self) -> Result<(), FeetechError> {
        let ids = [self.lower.id, self.upper.id];
        info!("Initializing arm motors {:?} for PWM control", ids);

        for &id in &ids {
            match self.bus.ping(id)? {
                true => debug!("Motor {} responding", id),
                false => {
                    warn!("Motor {} not responding to ping", id);
                    return Err(FeetechError::Timeout { id });
                }
            }
        }

        for &id in &ids {
            self.bus.disable_torque(id)?;
            self.bus.set_operating_mode(id, OperatingMode::Pwm)?;
            self.bus.enable_torque(id)?;
        }

        for joint in JointId::ALL {
            let id = self.drive(joint).id;
            let raw = self.bus.get_position(id)?;
            let drive = self.drive(joint);
            drive.last_raw = raw;
            drive.count = 0;
            debug!("{} joint origin latched at raw {}", joint, raw);
        }

        info!("Arm motors initialized");
        Ok(())
    }

    /// Zero output on both drives in a single broadcast
    pub fn stop(&mut self) -> Result<(), FeetechError> {
        info!("Stopping arm motors");
        self.bus
            .sync_write_u16(Register::GoalTime, &[(self.lower.id, 0), (self.upper.id, 0)])
    }
}

impl ArmIo for FeetechArm {
    fn read_position(&mut self, joint: JointId) -> Result<i64, MotorError> {
        let id = self.drive(joint).id;
        let raw = self.bus.get_position(id)?;
        Ok(self.drive(joint).accumulate(raw))
    }

    fn set_output(&mut self, joint: JointId, fraction: f64) -> Result<(), MotorError> {
        let fraction = check_output(joint, fraction)?;
        let drive = *self.drive(joint);
        self.bus.set_pwm(drive.id, fraction * drive.sign() as f64)?;
        Ok(())
    }
}

impl Drop for FeetechArm {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop arm motors on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_across_rollover() {
        assert_eq!(unwrap_step(4090, 5), 11);
        assert_eq!(unwrap_step(5, 4090), -11);
        assert_eq!(unwrap_step(100, 300), 200);
    }

    #[test]
    fn test_accumulate_multi_turn() {
        let mut drive = JointDrive::new(1, false);
        drive.last_raw = 4000;
        let mut count = 0;
        // Two full turns in 1024-step increments
        let mut raw = 4000u16;
        for _ in 0..8 {
            raw = (raw + 1024) % STEPS_PER_REVOLUTION;
            count = drive.accumulate(raw);
        }
        assert_eq!(count, 8192);
    }

    #[test]
    fn test_inverted_drive_counts_down() {
        let mut drive = JointDrive::new(1, true);
        drive.last_raw = 2000;
        assert_eq!(drive.accumulate(2100), -100);
    }
}
