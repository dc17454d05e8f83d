// Joint drive I/O for the two-joint arm
//
// Provides:
// - The ArmIo boundary the controllers drive (position read, output command)
// - Feetech STS serial protocol implementation
// - Feetech-backed arm driver for the real hardware
// - Noiseless simulated arm for offline runs and tests

mod driver;
pub mod feetech;
pub mod sim;

pub use driver::{FeetechArm, LOWER_MOTOR_ID, UPPER_MOTOR_ID};
pub use feetech::{FeetechBus, FeetechError};
pub use sim::SimulatedArm;

use crate::arm::JointId;

/// Errors raised by a joint drive
#[derive(Debug, thiserror::Error)]
pub enum MotorError {
    #[error("Motor bus error: {0}")]
    Bus(#[from] FeetechError),

    #[error("Output {value} for {joint} joint is outside [-1, 1]")]
    OutputRange { joint: JointId, value: f64 },
}

/// Position sensor and actuator access for both joints.
///
/// Counts are trusted as returned; range checking belongs to the implementor.
pub trait ArmIo {
    /// Current sensor count of the joint's drive
    fn read_position(&mut self, joint: JointId) -> Result<i64, MotorError>;

    /// Command the joint's drive output, `fraction` in [-1, 1]
    fn set_output(&mut self, joint: JointId, fraction: f64) -> Result<(), MotorError>;
}

impl<T: ArmIo + ?Sized> ArmIo for &mut T {
    fn read_position(&mut self, joint: JointId) -> Result<i64, MotorError> {
        (**self).read_position(joint)
    }

    fn set_output(&mut self, joint: JointId, fraction: f64) -> Result<(), MotorError> {
        (**self).set_output(joint, fraction)
    }
}

impl<T: ArmIo + ?Sized> ArmIo for Box<T> {
    fn read_position(&mut self, joint: JointId) -> Result<i64, MotorError> {
        (**self).read_position(joint)
    }

    fn set_output(&mut self, joint: JointId, fraction: f64) -> Result<(), MotorError> {
        (**self).set_output(joint, fraction)
    }
}

pub(crate) fn check_output(joint: JointId, fraction: f64) -> Result<f64, MotorError> {
    if fraction.is_finite() && (-1.0..=1.0).contains(&fraction) {
        Ok(fraction)
    } else {
        Err(MotorError::OutputRange {
            joint,
            value: fraction,
        })
    }
}
