// Two-joint arm positioning
//
// Provides:
// - Arm geometry and angle <-> sensor count conversion
// - Grid-search inverse kinematics
// - Per-joint PID position controller
// - Coordinated Cartesian move over both joints
// - Named placements

pub mod geometry;
pub mod joint;
pub mod kinematics;
pub mod mover;
pub mod preset;

pub use geometry::{ArmGeometry, JointId};
pub use joint::{
    Direction, DirectionTuning, JointControlState, JointController, JointPhase, JointStep,
    JointTuning, PidGains,
};
pub use kinematics::{KinematicsSolver, Solution};
pub use mover::{ArmKinematicState, JointDeltas, MoveController, MoveStatus};
pub use preset::Preset;
