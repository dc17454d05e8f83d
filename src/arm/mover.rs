// Coordinated Cartesian move: one IK solve, two joint controllers
//
// A move is requested once and then advanced by `tick` from the control loop.
// The first tick of a move solves for the joint angles, turns them into
// per-joint angle deltas from the current sensor state and resets both
// joints; every tick then advances whichever joints are not yet complete.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::geometry::{ArmGeometry, JointId};
use super::joint::{JointControlState, JointController, JointPhase, JointTuning};
use super::kinematics::{KinematicsSolver, Solution};
use crate::clock::Clock;
use crate::motor::{ArmIo, MotorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveStatus {
    InProgress,
    Complete,
}

/// Solved pose for the current move
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ArmKinematicState {
    /// Lower joint angle in radians
    pub theta: f64,
    /// Upper joint angle in radians
    pub phi: f64,
    pub target: Option<(f64, f64)>,
    /// Last solve met the forward kinematics tolerance
    pub converged: bool,
}

/// Angle deltas one move has to travel, in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JointDeltas {
    pub lower: f64,
    pub upper: f64,
}

pub struct MoveController {
    geometry: ArmGeometry,
    solver: KinematicsSolver,
    lower: JointController,
    upper: JointController,
    kinematic: ArmKinematicState,
    deltas: JointDeltas,
    /// Target waiting to be planned on the next tick
    pending: Option<(f64, f64)>,
    complete: bool,
}

impl MoveController {
    pub fn new(geometry: ArmGeometry, lower: JointTuning, upper: JointTuning, settle: Duration) -> Self {
        Self {
            geometry,
            solver: KinematicsSolver::new(geometry),
            lower: JointController::new(JointId::Lower, &geometry, lower, settle),
            upper: JointController::new(JointId::Upper, &geometry, upper, settle),
            kinematic: ArmKinematicState::default(),
            deltas: JointDeltas::default(),
            pending: None,
            complete: true,
        }
    }

    /// Set a new Cartesian target. Overwrites any move in flight; the next
    /// tick re-plans from the then-current sensor counts.
    pub fn request_move(&mut self, x: f64, y: f64) {
        info!("Move requested to ({:.3}, {:.3})", x, y);
        self.pending = Some((x, y));
        self.complete = false;
    }

    /// Advance the active move by one control step.
    ///
    /// Lower joint first, then upper, both within the same tick. After the
    /// move completes this commands nothing until the next `request_move`.
    pub fn tick<H, C>(&mut self, io: &mut H, clock: &C) -> Result<MoveStatus, MotorError>
    where
        H: ArmIo + ?Sized,
        C: Clock + ?Sized,
    {
        // Stays pending until planned, so a failed read is retried next tick
        if let Some((x, y)) = self.pending {
            self.plan(x, y, io)?;
            self.pending = None;
        }

        if self.complete {
            return Ok(MoveStatus::Complete);
        }

        if !self.lower.is_complete() {
            self.lower.rotate(self.deltas.lower, io, clock)?;
        }
        if !self.upper.is_complete() {
            self.upper.rotate(self.deltas.upper, io, clock)?;
        }

        if self.lower.is_complete() && self.upper.is_complete() {
            self.complete = true;
            info!("Move complete");
            return Ok(MoveStatus::Complete);
        }

        Ok(MoveStatus::InProgress)
    }

    /// Solve, read both joints and work out how far each must travel
    fn plan<H>(&mut self, x: f64, y: f64, io: &mut H) -> Result<Solution, MotorError>
    where
        H: ArmIo + ?Sized,
    {
        for joint in [&mut self.lower, &mut self.upper] {
            joint.reset();
        }

        let solution = self.solver.solve(x, y);
        if !solution.converged {
            warn!(
                "Proceeding to ({:.3}, {:.3}) with best-effort angles, residual ({:.3}, {:.3})",
                x, y, solution.residual.0, solution.residual.1
            );
        }

        self.kinematic = ArmKinematicState {
            theta: solution.theta,
            phi: solution.phi,
            target: Some((x, y)),
            converged: solution.converged,
        };

        let upper_count = io.read_position(JointId::Upper)?;
        let upper_degrees = self.geometry.counts_to_degrees(JointId::Upper, upper_count as f64);
        let lower_count = io.read_position(JointId::Lower)?;
        let lower_degrees = self.geometry.counts_to_degrees(JointId::Lower, lower_count as f64);

        self.deltas = JointDeltas {
            lower: solution.theta.to_degrees() - lower_degrees,
            upper: ArmGeometry::upper_drive_degrees(solution.theta, solution.phi) - upper_degrees,
        };

        info!(
            "Theta={:.3} deg, Phi={:.3} deg; lower at {:.3} deg, upper at {:.3} deg; deltas lower={:.3} upper={:.3}",
            solution.theta_degrees(),
            solution.phi_degrees(),
            lower_degrees,
            upper_degrees,
            self.deltas.lower,
            self.deltas.upper
        );

        // A joint with nothing to travel is already there
        if self.deltas.lower == 0.0 {
            let state = completed(&self.lower);
            self.lower.restore(state);
        }
        if self.deltas.upper == 0.0 {
            let state = completed(&self.upper);
            self.upper.restore(state);
        }

        Ok(solution)
    }

    /// Zero both drives and abandon the move
    pub fn halt<H>(&mut self, io: &mut H) -> Result<(), MotorError>
    where
        H: ArmIo + ?Sized,
    {
        for joint in JointId::ALL {
            io.set_output(joint, 0.0)?;
        }
        self.lower.reset();
        self.upper.reset();
        self.pending = None;
        self.complete = true;
        warn!("Move halted");
        Ok(())
    }

    /// Solved (Theta, Phi) of the current move, radians
    pub fn current_angles(&self) -> (f64, f64) {
        (self.kinematic.theta, self.kinematic.phi)
    }

    pub fn kinematic_state(&self) -> &ArmKinematicState {
        &self.kinematic
    }

    pub fn deltas(&self) -> JointDeltas {
        self.deltas
    }

    pub fn joint(&self, joint: JointId) -> &JointController {
        match joint {
            JointId::Lower => &self.lower,
            JointId::Upper => &self.upper,
        }
    }

    pub fn status(&self) -> MoveStatus {
        if self.complete {
            MoveStatus::Complete
        } else {
            MoveStatus::InProgress
        }
    }

    pub fn geometry(&self) -> &ArmGeometry {
        &self.geometry
    }
}

fn completed(joint: &JointController) -> JointControlState {
    let mut state = *joint.state();
    state.phase = JointPhase::Complete;
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::motor::SimulatedArm;

    fn controller() -> MoveController {
        MoveController::new(
            ArmGeometry::default(),
            JointTuning::lower_default(),
            JointTuning::upper_default(),
            Duration::from_millis(5),
        )
    }

    fn run_to_completion(mover: &mut MoveController, arm: &mut SimulatedArm, clock: &ManualClock, limit: usize) -> usize {
        for tick in 1..=limit {
            if mover.tick(arm, clock).unwrap() == MoveStatus::Complete {
                return tick;
            }
            clock.advance(0.02);
        }
        panic!("move did not complete within {} ticks", limit);
    }

    #[test]
    fn test_idle_tick_is_complete_and_silent() {
        let mut mover = controller();
        let mut arm = SimulatedArm::new();
        let clock = ManualClock::new();

        assert_eq!(mover.tick(&mut arm, &clock).unwrap(), MoveStatus::Complete);
        assert_eq!(arm.writes(), 0);
    }

    #[test]
    fn test_mid_front_move_completes() {
        let mut mover = controller();
        let mut arm = SimulatedArm::new();
        let clock = ManualClock::new();

        mover.request_move(30.0, 24.0);
        assert_eq!(mover.status(), MoveStatus::InProgress);

        let geometry = ArmGeometry::default();
        let (theta, phi) = {
            let first = mover.tick(&mut arm, &clock).unwrap();
            assert_eq!(first, MoveStatus::InProgress);
            mover.current_angles()
        };
        assert!(mover.kinematic_state().converged);
        let (fx, fy) = geometry.forward(theta, phi);
        assert!((fx - 30.0).abs() <= 0.1 && (fy - 24.0).abs() <= 0.1);

        // From zero counts the deltas are the solved angles themselves
        let deltas = mover.deltas();
        assert!((deltas.lower - theta.to_degrees()).abs() < 1e-9);
        assert!((deltas.upper - (theta + phi).to_degrees()).abs() < 1e-9);

        // Travel / (floor output * rate) per joint, plus slack
        let lower_travel = geometry.degrees_to_counts(JointId::Lower, deltas.lower);
        let upper_travel = geometry.degrees_to_counts(JointId::Upper, deltas.upper);
        let bound = (lower_travel.max(upper_travel) / (0.1 * 4000.0)).ceil() as usize + 2;
        run_to_completion(&mut mover, &mut arm, &clock, bound);

        for joint in JointId::ALL {
            assert_eq!(mover.joint(joint).phase(), JointPhase::Complete);
            assert_eq!(arm.output(joint), 0.0);
        }

        // Both joints ended within deadband of, or past, their targets
        let lower_count = arm.position(JointId::Lower) as f64;
        let upper_count = arm.position(JointId::Upper) as f64;
        assert!(lower_count >= lower_travel - 500.0);
        assert!(upper_count >= upper_travel - 500.0);
    }

    #[test]
    fn test_joints_advance_in_same_tick() {
        let mut mover = controller();
        let mut arm = SimulatedArm::new();
        let clock = ManualClock::new();

        mover.request_move(30.0, 24.0);
        mover.tick(&mut arm, &clock).unwrap();

        assert_eq!(mover.joint(JointId::Lower).phase(), JointPhase::Tracking);
        assert_eq!(mover.joint(JointId::Upper).phase(), JointPhase::Tracking);
        assert!(arm.output(JointId::Lower) > 0.0);
        assert!(arm.output(JointId::Upper) > 0.0);
    }

    #[test]
    fn test_tick_after_complete_commands_nothing() {
        let mut mover = controller();
        let mut arm = SimulatedArm::new();
        let clock = ManualClock::new();

        mover.request_move(26.0, 6.5);
        run_to_completion(&mut mover, &mut arm, &clock, 5000);
        let writes = arm.writes();

        for _ in 0..10 {
            assert_eq!(mover.tick(&mut arm, &clock).unwrap(), MoveStatus::Complete);
        }
        assert_eq!(arm.writes(), writes);
    }

    #[test]
    fn test_rear_target_drives_joints_backwards() {
        let mut mover = controller();
        let mut arm = SimulatedArm::new();
        let clock = ManualClock::new();

        mover.request_move(-30.0, 24.0);
        mover.tick(&mut arm, &clock).unwrap();

        assert!(mover.deltas().lower < 0.0);
        assert!(mover.deltas().upper < 0.0);
        assert!(arm.output(JointId::Lower) < 0.0);
        assert!(arm.output(JointId::Upper) < 0.0);

        run_to_completion(&mut mover, &mut arm, &clock, 5000);
        assert!(arm.position(JointId::Lower) < 0);
        assert!(arm.position(JointId::Upper) < 0);
    }

    #[test]
    fn test_new_target_replans_from_current_counts() {
        let mut mover = controller();
        let mut arm = SimulatedArm::new();
        let clock = ManualClock::new();

        mover.request_move(30.0, 24.0);
        for _ in 0..5 {
            mover.tick(&mut arm, &clock).unwrap();
            clock.advance(0.02);
        }
        assert_eq!(mover.status(), MoveStatus::InProgress);

        mover.request_move(0.0, 17.625);
        mover.tick(&mut arm, &clock).unwrap();

        // Home is theta = phi = 0, so the deltas undo the travel so far
        assert!(mover.deltas().lower < 0.0);
        assert!(mover.deltas().upper < 0.0);
        assert_eq!(mover.kinematic_state().target, Some((0.0, 17.625)));

        run_to_completion(&mut mover, &mut arm, &clock, 5000);
        for joint in JointId::ALL {
            assert!(arm.position(joint).abs() <= 500 + 4000);
        }
    }

    #[test]
    fn test_zero_travel_completes_immediately() {
        // Already at home: theta = phi = 0 from zero counts
        let mut mover = controller();
        let mut arm = SimulatedArm::new();
        let clock = ManualClock::new();

        mover.request_move(0.0, 17.625);
        assert_eq!(mover.tick(&mut arm, &clock).unwrap(), MoveStatus::Complete);
        assert_eq!(arm.writes(), 0);
    }

    #[test]
    fn test_unreachable_target_proceeds_best_effort() {
        let mut mover = controller();
        let mut arm = SimulatedArm::new();
        let clock = ManualClock::new();

        mover.request_move(100.0, 100.0);
        mover.tick(&mut arm, &clock).unwrap();

        assert!(!mover.kinematic_state().converged);
        assert_ne!(mover.deltas(), JointDeltas::default());
    }

    /// Simulated arm whose next `failures` position reads time out
    struct FlakyArm {
        arm: SimulatedArm,
        failures: usize,
    }

    impl ArmIo for FlakyArm {
        fn read_position(&mut self, joint: JointId) -> Result<i64, MotorError> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(MotorError::Bus(crate::motor::FeetechError::Timeout { id: 9 }));
            }
            self.arm.read_position(joint)
        }

        fn set_output(&mut self, joint: JointId, fraction: f64) -> Result<(), MotorError> {
            self.arm.set_output(joint, fraction)
        }
    }

    #[test]
    fn test_failed_plan_read_keeps_new_move_pending() {
        let mut mover = controller();
        let mut io = FlakyArm {
            arm: SimulatedArm::new(),
            failures: 0,
        };
        let clock = ManualClock::new();

        mover.request_move(30.0, 24.0);
        for _ in 0..5000 {
            if mover.tick(&mut io, &clock).unwrap() == MoveStatus::Complete {
                break;
            }
            clock.advance(0.02);
        }
        assert_eq!(mover.status(), MoveStatus::Complete);
        let before = [io.arm.position(JointId::Lower), io.arm.position(JointId::Upper)];

        mover.request_move(-30.0, 24.0);
        io.failures = 1;
        assert!(mover.tick(&mut io, &clock).is_err());
        for joint in JointId::ALL {
            assert_ne!(mover.joint(joint).phase(), JointPhase::Complete);
        }

        // Next tick plans the move for real and starts driving backwards
        assert_eq!(mover.tick(&mut io, &clock).unwrap(), MoveStatus::InProgress);
        assert!(mover.deltas().lower < 0.0);
        assert!(io.arm.output(JointId::Lower) < 0.0);
        assert!(io.arm.position(JointId::Lower) < before[0]);
        assert!(io.arm.position(JointId::Upper) < before[1]);
    }

    #[test]
    fn test_halt_zeroes_outputs() {
        let mut mover = controller();
        let mut arm = SimulatedArm::new();
        let clock = ManualClock::new();

        mover.request_move(30.0, 36.0);
        mover.tick(&mut arm, &clock).unwrap();
        mover.halt(&mut arm).unwrap();

        assert_eq!(mover.status(), MoveStatus::Complete);
        for joint in JointId::ALL {
            assert_eq!(arm.output(joint), 0.0);
            assert_eq!(mover.joint(joint).phase(), JointPhase::Idle);
        }
    }
}
