// Message types exchanged over zenoh

use serde::{Deserialize, Serialize};

use crate::arm::{JointId, MoveController, MoveStatus, Preset};

/// Move request from teleop/scripts -> runtime.
///
/// Either raw coordinates `{"x": 30.0, "y": 24.0}` or a named placement
/// `{"preset": "mid_front"}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MoveCommand {
    Position { x: f64, y: f64 },
    Preset { preset: Preset },
}

impl MoveCommand {
    pub fn target(&self) -> (f64, f64) {
        match *self {
            MoveCommand::Position { x, y } => (x, y),
            MoveCommand::Preset { preset } => preset.position(),
        }
    }
}

impl From<Preset> for MoveCommand {
    fn from(preset: Preset) -> Self {
        MoveCommand::Preset { preset }
    }
}

/// Move progress published by the runtime every tick
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MoveReport {
    pub status: MoveStatus,
    pub target: Option<(f64, f64)>,
    pub theta_deg: f64,
    pub phi_deg: f64,
    pub converged: bool,
    /// Remaining lower/upper errors in degrees
    pub lower_error_deg: f64,
    pub upper_error_deg: f64,
}

impl From<&MoveController> for MoveReport {
    fn from(mover: &MoveController) -> Self {
        let state = mover.kinematic_state();
        let (lower, upper) = (mover.joint(JointId::Lower), mover.joint(JointId::Upper));
        Self {
            status: mover.status(),
            target: state.target,
            theta_deg: state.theta.to_degrees(),
            phi_deg: state.phi.to_degrees(),
            converged: state.converged,
            lower_error_deg: lower.error_degrees(),
            upper_error_deg: upper.error_degrees(),
        }
    }
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    /// Last solve missed the position tolerance; moving on best-effort angles
    NotConverged,
    /// Watchdog halted a move that never completed
    MoveTimedOut,
    MotorFault,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_position_command() {
        let cmd: MoveCommand = serde_json::from_str(r#"{"x": 30.0, "y": 24.0}"#).unwrap();
        assert_eq!(cmd, MoveCommand::Position { x: 30.0, y: 24.0 });
        assert_eq!(cmd.target(), (30.0, 24.0));
    }

    #[test]
    fn test_parse_preset_command() {
        let cmd: MoveCommand = serde_json::from_str(r#"{"preset": "high_rear"}"#).unwrap();
        assert_eq!(cmd, MoveCommand::Preset { preset: Preset::HighRear });
        assert_eq!(cmd.target(), (-30.0, 36.0));
    }

    #[test]
    fn test_reject_malformed_command() {
        assert!(serde_json::from_str::<MoveCommand>(r#"{"x": 1.0}"#).is_err());
        assert!(serde_json::from_str::<MoveCommand>(r#"{"preset": "nowhere"}"#).is_err());
    }

    #[test]
    fn test_health_wire_names() {
        assert_eq!(serde_json::to_string(&RuntimeHealth::MoveTimedOut).unwrap(), "\"move_timed_out\"");
    }
}
