// Single-joint position controller
//
// Drives one joint from its current sensor count to a target count with a PID
// loop on the count error. One controller covers both travel directions; the
// direction picks the gain/clamp set and the output sign.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::geometry::{ArmGeometry, JointId};
use crate::clock::Clock;
use crate::motor::{ArmIo, MotorError};

/// Travel direction in sensor counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Count increases, positive drive output
    Increase,
    /// Count decreases, negative drive output
    Decrease,
}

impl Direction {
    /// Direction for a signed angular delta, None for zero (or NaN)
    pub fn from_delta(delta: f64) -> Option<Self> {
        if delta > 0.0 {
            Some(Direction::Increase)
        } else if delta < 0.0 {
            Some(Direction::Decrease)
        } else {
            None
        }
    }

    pub fn sign(self) -> f64 {
        match self {
            Direction::Increase => 1.0,
            Direction::Decrease => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

/// Gains and output band for one travel direction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionTuning {
    pub gains: PidGains,
    /// Output magnitude ceiling
    pub max_output: f64,
    /// Magnitudes below this are replaced by `floor_output`
    pub floor_threshold: f64,
    /// Smallest magnitude commanded while tracking, overcomes static friction
    pub floor_output: f64,
}

impl DirectionTuning {
    /// Apply the asymmetric band to an unsigned power
    pub fn clamp(&self, power: f64) -> f64 {
        if power > self.max_output {
            self.max_output
        } else if power < self.floor_threshold {
            self.floor_output
        } else {
            power
        }
    }
}

/// Per-joint tuning: deadband plus one gain set per direction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointTuning {
    /// Count error at or below which the joint is on target
    pub deadband: f64,
    pub increase: DirectionTuning,
    pub decrease: DirectionTuning,
}

impl JointTuning {
    pub fn for_direction(&self, direction: Direction) -> &DirectionTuning {
        match direction {
            Direction::Increase => &self.increase,
            Direction::Decrease => &self.decrease,
        }
    }

    /// Hand-tuned lower drive gains
    pub fn lower_default() -> Self {
        let band = DirectionTuning {
            gains: PidGains {
                kp: 0.00002,
                ki: 0.0002,
                kd: 0.0,
            },
            max_output: 0.5,
            floor_threshold: 0.1,
            floor_output: 0.1,
        };
        Self {
            deadband: 500.0,
            increase: band,
            decrease: band,
        }
    }

    /// Hand-tuned upper drive gains, stronger floor when raising
    pub fn upper_default() -> Self {
        Self {
            deadband: 500.0,
            increase: DirectionTuning {
                gains: PidGains {
                    kp: 0.00005,
                    ki: 0.0002,
                    kd: 0.0,
                },
                max_output: 0.5,
                floor_threshold: 0.1,
                floor_output: 0.2,
            },
            decrease: DirectionTuning {
                gains: PidGains {
                    kp: 0.00001,
                    ki: 0.0002,
                    kd: 0.0,
                },
                max_output: 0.5,
                floor_threshold: 0.1,
                floor_output: 0.1,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointPhase {
    Idle,
    Initializing,
    Tracking,
    Complete,
}

/// Everything the controller remembers between ticks of one rotation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointControlState {
    pub phase: JointPhase,
    pub direction: Option<Direction>,
    /// Sensor count when the rotation started
    pub initial_count: i64,
    pub target_count: Option<f64>,
    pub last_error: f64,
    /// Clock time at the end of the previous tracking tick
    pub last_time: Option<f64>,
    pub integral: f64,
    pub derivative: f64,
    pub deadband: f64,
    /// Tracking ticks since initialization
    pub ticks: u64,
}

impl JointControlState {
    pub fn idle(deadband: f64) -> Self {
        Self {
            phase: JointPhase::Idle,
            direction: None,
            initial_count: 0,
            target_count: None,
            last_error: 0.0,
            last_time: None,
            integral: 0.0,
            derivative: 0.0,
            deadband,
            ticks: 0,
        }
    }

    /// Signed error along the travel direction: positive while short of the
    /// target, negative once past it
    fn error_at(&self, count: i64) -> Option<f64> {
        let target = self.target_count?;
        let count = count as f64;
        Some(match self.direction? {
            Direction::Increase => target - count,
            Direction::Decrease => count - target,
        })
    }
}

/// Outcome of one `rotate` call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointStep {
    pub phase: JointPhase,
    /// Remaining error converted to joint degrees
    pub error_degrees: f64,
    /// Signed output commanded this tick (0 when nothing was commanded)
    pub output: f64,
}

#[derive(Debug, Clone)]
pub struct JointController {
    joint: JointId,
    counts_per_degree: f64,
    tuning: JointTuning,
    settle: Duration,
    state: JointControlState,
}

impl JointController {
    pub fn new(joint: JointId, geometry: &ArmGeometry, tuning: JointTuning, settle: Duration) -> Self {
        Self {
            joint,
            counts_per_degree: geometry.counts_per_degree(joint),
            tuning,
            settle,
            state: JointControlState::idle(tuning.deadband),
        }
    }

    pub fn joint(&self) -> JointId {
        self.joint
    }

    pub fn state(&self) -> &JointControlState {
        &self.state
    }

    pub fn phase(&self) -> JointPhase {
        self.state.phase
    }

    pub fn is_complete(&self) -> bool {
        self.state.phase == JointPhase::Complete
    }

    /// Remaining error of the current rotation in joint degrees
    pub fn error_degrees(&self) -> f64 {
        self.state.last_error / self.counts_per_degree
    }

    /// Drop any rotation in progress. Does not touch the drive.
    pub fn reset(&mut self) {
        self.state = JointControlState::idle(self.tuning.deadband);
    }

    /// Replace the state wholesale, e.g. to resume a saved rotation
    pub fn restore(&mut self, state: JointControlState) {
        self.state = state;
    }

    /// Advance the rotation by `delta_degrees` one control tick.
    ///
    /// The first call after a reset initializes the rotation from the current
    /// sensor count; every call then runs one tracking step. The sign of the
    /// delta selects the direction, zero is a no-op. Once complete, further
    /// calls command nothing until `reset`.
    pub fn rotate<H, C>(&mut self, delta_degrees: f64, io: &mut H, clock: &C) -> Result<JointStep, MotorError>
    where
        H: ArmIo + ?Sized,
        C: Clock + ?Sized,
    {
        if self.is_complete() {
            return Ok(self.step(0.0));
        }

        let Some(direction) = Direction::from_delta(delta_degrees) else {
            return Ok(self.step(0.0));
        };

        if self.state.phase == JointPhase::Idle {
            self.initialize(direction, delta_degrees.abs(), io)?;
        } else if self.state.direction != Some(direction) {
            debug!(
                "{} joint ignoring {:?} delta while tracking {:?}",
                self.joint, direction, self.state.direction
            );
        }

        self.track(io, clock)
    }

    fn initialize<H>(&mut self, direction: Direction, magnitude: f64, io: &mut H) -> Result<(), MotorError>
    where
        H: ArmIo + ?Sized,
    {
        self.state = JointControlState::idle(self.tuning.deadband);
        self.state.phase = JointPhase::Initializing;
        self.state.direction = Some(direction);

        let count = io.read_position(self.joint)?;
        let travel = magnitude * self.counts_per_degree;
        let target = count as f64 + direction.sign() * travel;
        self.state.initial_count = count;
        self.state.target_count = Some(target);

        let band = self.tuning.for_direction(direction);
        let power = band.clamp(band.gains.kp * travel);
        io.set_output(self.joint, direction.sign() * power)?;

        info!(
            "{} joint {:?}: count {} -> target {:.1} ({:.3} deg)",
            self.joint, direction, count, target, magnitude
        );

        self.state.phase = JointPhase::Tracking;
        Ok(())
    }

    fn track<H, C>(&mut self, io: &mut H, clock: &C) -> Result<JointStep, MotorError>
    where
        H: ArmIo + ?Sized,
        C: Clock + ?Sized,
    {
        let (Some(direction), Some(target)) = (self.state.direction, self.state.target_count) else {
            return Ok(self.step(0.0));
        };

        let now = clock.now();
        let dt = self.state.last_time.map_or(0.0, |last| now - last);

        clock.settle(self.settle);

        let count = io.read_position(self.joint)?;
        let error = self.state.error_at(count).unwrap_or(0.0);

        // Overshoot counts as arrival; the joint is never driven back
        if error.abs() <= self.state.deadband || error < 0.0 {
            io.set_output(self.joint, 0.0)?;
            self.state.phase = JointPhase::Complete;
            self.state.last_error = error;
            info!(
                "{} joint complete after {} ticks: target {:.1}, final count {}, error {:.1}",
                self.joint, self.state.ticks, target, count, error
            );
            return Ok(self.step(0.0));
        }

        if dt > 0.0 {
            self.state.derivative = (error - self.state.last_error) / dt;
        }

        // Hold off integrating until within half the target count
        if error < 0.5 * target.abs() {
            self.state.integral += error * dt;
        }

        let band = self.tuning.for_direction(direction);
        let gains = band.gains;
        let raw = gains.kp * error + gains.ki * self.state.integral + gains.kd * self.state.derivative;
        let power = band.clamp(raw);
        let output = direction.sign() * power;
        io.set_output(self.joint, output)?;

        debug!(
            "{} joint: count={} error={:.1} integral={:.3} rate={:.3} dt={:.4} power={:.3}",
            self.joint, count, error, self.state.integral, self.state.derivative, dt, power
        );

        self.state.last_time = Some(clock.now());
        self.state.last_error = error;
        self.state.ticks += 1;

        Ok(self.step(output))
    }

    fn step(&self, output: f64) -> JointStep {
        JointStep {
            phase: self.state.phase,
            error_degrees: self.error_degrees(),
            output,
        }
    }
}
