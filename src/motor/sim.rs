// Simulated two-joint arm
//
// Noiseless plant: every position read advances the joint by its last commanded
// output times a fixed full-scale travel, so one read models one settle
// interval of motion.

use tracing::debug;

use super::{check_output, ArmIo, MotorError};
use crate::arm::JointId;

/// Counts travelled per read at full output when not configured
pub const DEFAULT_COUNTS_PER_READ: f64 = 4000.0;

#[derive(Debug, Clone, Copy, Default)]
struct SimJoint {
    position: f64,
    output: f64,
}

#[derive(Debug, Clone)]
pub struct SimulatedArm {
    joints: [SimJoint; 2],
    counts_per_read: f64,
    writes: usize,
}

impl SimulatedArm {
    pub fn new() -> Self {
        Self::with_rate(DEFAULT_COUNTS_PER_READ)
    }

    /// Create with a custom full-output travel per read
    pub fn with_rate(counts_per_read: f64) -> Self {
        Self {
            joints: [SimJoint::default(); 2],
            counts_per_read,
            writes: 0,
        }
    }

    /// Place a joint at a count without moving it through the plant
    pub fn set_position(&mut self, joint: JointId, count: i64) {
        self.joints[index(joint)].position = count as f64;
    }

    pub fn position(&self, joint: JointId) -> i64 {
        self.joints[index(joint)].position.round() as i64
    }

    pub fn output(&self, joint: JointId) -> f64 {
        self.joints[index(joint)].output
    }

    /// Number of output commands received so far
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl Default for SimulatedArm {
    fn default() -> Self {
        Self::new()
    }
}

fn index(joint: JointId) -> usize {
    match joint {
        JointId::Lower => 0,
        JointId::Upper => 1,
    }
}

impl ArmIo for SimulatedArm {
    fn read_position(&mut self, joint: JointId) -> Result<i64, MotorError> {
        let rate = self.counts_per_read;
        let sim = &mut self.joints[index(joint)];
        sim.position += sim.output * rate;
        Ok(sim.position.round() as i64)
    }

    fn set_output(&mut self, joint: JointId, fraction: f64) -> Result<(), MotorError> {
        let fraction = check_output(joint, fraction)?;
        debug!("sim {} output {:.3}", joint, fraction);
        self.joints[index(joint)].output = fraction;
        self.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_advances_by_output() {
        let mut arm = SimulatedArm::with_rate(1000.0);
        arm.set_output(JointId::Lower, 0.5).unwrap();
        assert_eq!(arm.read_position(JointId::Lower).unwrap(), 500);
        assert_eq!(arm.read_position(JointId::Lower).unwrap(), 1000);
        // Other joint untouched
        assert_eq!(arm.read_position(JointId::Upper).unwrap(), 0);
    }

    #[test]
    fn test_negative_output_moves_down() {
        let mut arm = SimulatedArm::with_rate(1000.0);
        arm.set_position(JointId::Upper, 250);
        arm.set_output(JointId::Upper, -0.1).unwrap();
        assert_eq!(arm.read_position(JointId::Upper).unwrap(), 150);
    }

    #[test]
    fn test_rejects_out_of_range_output() {
        let mut arm = SimulatedArm::new();
        assert!(matches!(
            arm.set_output(JointId::Upper, 1.5),
            Err(MotorError::OutputRange { .. })
        ));
        assert!(arm.set_output(JointId::Upper, f64::NAN).is_err());
        assert_eq!(arm.writes(), 0);
    }
}
