// Arm geometry: link lengths, drive reductions and angle <-> count conversion
//
// Frame: origin on the ground below the base pivot, x horizontal, y up.
// Theta (lower joint) is measured from vertical at the base pivot, Phi (upper
// joint) from vertical at the elbow.

use serde::{Deserialize, Serialize};

/// Which of the two revolute joints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointId {
    Lower,
    Upper,
}

impl JointId {
    pub const ALL: [JointId; 2] = [JointId::Lower, JointId::Upper];

    pub fn name(self) -> &'static str {
        match self {
            JointId::Lower => "lower",
            JointId::Upper => "upper",
        }
    }
}

impl std::fmt::Display for JointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable mechanical description of the arm
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmGeometry {
    /// Base pivot to elbow
    pub lower_length: f64,
    /// Elbow to grabber centre
    pub upper_length: f64,
    /// Base pivot height above the ground
    pub pivot_height: f64,
    pub lower_gear_reduction: f64,
    pub upper_gear_reduction: f64,
    /// Chain sprocket reduction on the lower joint (48 teeth vs 15 teeth)
    pub lower_chain_reduction: f64,
    /// Sensor counts per motor revolution
    pub counts_per_rev: f64,
}

impl Default for ArmGeometry {
    fn default() -> Self {
        Self {
            lower_length: 34.625,
            upper_length: 32.5,
            pivot_height: 15.5,
            lower_gear_reduction: 256.0,
            upper_gear_reduction: 256.0,
            lower_chain_reduction: 48.0 / 15.0,
            counts_per_rev: 2048.0,
        }
    }
}

impl ArmGeometry {
    /// Net motor revolutions per joint revolution
    pub fn drive_ratio(&self, joint: JointId) -> f64 {
        match joint {
            JointId::Lower => self.lower_gear_reduction * self.lower_chain_reduction,
            JointId::Upper => self.upper_gear_reduction,
        }
    }

    pub fn counts_per_degree(&self, joint: JointId) -> f64 {
        self.counts_per_rev * self.drive_ratio(joint) / 360.0
    }

    pub fn degrees_to_counts(&self, joint: JointId, degrees: f64) -> f64 {
        self.counts_per_degree(joint) * degrees
    }

    pub fn counts_to_degrees(&self, joint: JointId, counts: f64) -> f64 {
        counts / self.counts_per_degree(joint)
    }

    /// Grabber position for the given joint angles (radians)
    pub fn forward(&self, theta: f64, phi: f64) -> (f64, f64) {
        let x = self.lower_length * theta.sin() + self.upper_length * phi.sin();
        let y = self.lower_length * theta.cos() - self.upper_length * phi.cos() + self.pivot_height;
        (x, y)
    }

    /// Angle the upper drive sensor reports, in degrees.
    ///
    /// The upper drive is referenced to the lower link, so it has to travel
    /// Theta + Phi to reach Phi.
    pub fn upper_drive_degrees(theta: f64, phi: f64) -> f64 {
        (theta + phi).to_degrees()
    }
}
