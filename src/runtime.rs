// 50 Hz arm control loop with move watchdog
//
// Every tick: drain move requests (latest wins), advance the active move one
// control step, publish progress and health. The controllers never time out on
// their own, so the runtime halts any move still in progress after the
// configured timeout.

use std::path::PathBuf;
use std::time::Duration;

use tokio::time::interval;
use tracing::{info, warn};

use crate::arm::{MoveController, MoveStatus};
use crate::clock::{Clock, MonotonicClock};
use crate::config::{ArmConfig, LOOP_HZ, MOVE_TIMEOUT, MOTOR_PORT, TOPIC_CMD_MOVE, TOPIC_HEALTH, TOPIC_STATE_MOVE};
use crate::messages::{MoveCommand, MoveReport, RuntimeHealth};
use crate::motor::{feetech, ArmIo, FeetechArm, SimulatedArm, LOWER_MOTOR_ID, UPPER_MOTOR_ID};

/// Startup options, normally filled from the command line
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub port: String,
    /// Drive a simulated arm instead of the serial bus
    pub sim: bool,
    pub config: Option<PathBuf>,
    pub lower_id: u8,
    pub upper_id: u8,
    /// None disables the watchdog
    pub move_timeout: Option<Duration>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            port: MOTOR_PORT.to_string(),
            sim: false,
            config: None,
            lower_id: LOWER_MOTOR_ID,
            upper_id: UPPER_MOTOR_ID,
            move_timeout: Some(MOVE_TIMEOUT),
        }
    }
}

pub struct Runtime<H, C> {
    mover: MoveController,
    io: H,
    clock: C,
    move_timeout: Option<Duration>,
    move_started: Option<f64>,
    health: RuntimeHealth,
}

impl<H: ArmIo, C: Clock> Runtime<H, C> {
    pub fn new(mover: MoveController, io: H, clock: C, move_timeout: Option<Duration>) -> Self {
        Self {
            mover,
            io,
            clock,
            move_timeout,
            move_started: None,
            health: RuntimeHealth::Ok,
        }
    }

    /// Process incoming command
    pub fn on_command(&mut self, cmd: MoveCommand) {
        info!("Received command: {:?}", &cmd);
        let (x, y) = cmd.target();
        self.mover.request_move(x, y);
        self.move_started = Some(self.clock.now());
        self.health = RuntimeHealth::Ok;
    }

    /// One control tick, including the watchdog
    pub fn step(&mut self) -> MoveReport {
        match self.mover.tick(&mut self.io, &self.clock) {
            Ok(MoveStatus::Complete) => {
                self.move_started = None;
            }
            Ok(MoveStatus::InProgress) => {
                if !self.mover.kinematic_state().converged {
                    self.health = RuntimeHealth::NotConverged;
                }
                self.check_watchdog();
            }
            Err(e) => {
                warn!("Motor fault during move: {}", e);
                self.health = RuntimeHealth::MotorFault;
                self.move_started = None;
                if let Err(e) = self.mover.halt(&mut self.io) {
                    warn!("Failed to halt arm: {}", e);
                }
            }
        }

        MoveReport::from(&self.mover)
    }

    fn check_watchdog(&mut self) {
        let (Some(timeout), Some(started)) = (self.move_timeout, self.move_started) else {
            return;
        };

        let age = self.clock.now() - started;
        if age > timeout.as_secs_f64() {
            warn!("Move still in progress after {:.1}s, halting arm", age);
            self.move_started = None;
            self.health = RuntimeHealth::MoveTimedOut;
            if let Err(e) = self.mover.halt(&mut self.io) {
                warn!("Failed to halt arm: {}", e);
                self.health = RuntimeHealth::MotorFault;
            }
        }
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn mover(&self) -> &MoveController {
        &self.mover
    }

    pub fn io(&self) -> &H {
        &self.io
    }
}

fn open_hardware(
    options: &RuntimeOptions,
    config: &ArmConfig,
) -> Result<Box<dyn ArmIo + Send>, Box<dyn std::error::Error + Send + Sync>> {
    if options.sim {
        info!("Using simulated arm");
        return Ok(Box::new(SimulatedArm::new()));
    }

    let steps = feetech::STEPS_PER_REVOLUTION as f64;
    if config.geometry.counts_per_rev != steps {
        warn!(
            "Config counts_per_rev is {} but Feetech drives report {} per turn",
            config.geometry.counts_per_rev, steps
        );
    }

    let mut arm = FeetechArm::with_motor_ids(&options.port, options.lower_id, options.upper_id)?;
    arm.initialize()?;
    Ok(Box::new(arm))
}

pub async fn run(options: RuntimeOptions) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = match &options.config {
        Some(path) => {
            info!("Loading arm config from {}", path.display());
            ArmConfig::from_file(path)?
        }
        None => ArmConfig::default(),
    };

    let io = open_hardware(&options, &config)?;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_MOVE).await?;
    let pub_state = session.declare_publisher(TOPIC_STATE_MOVE).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut runtime = Runtime::new(config.build_controller(), io, MonotonicClock::new(), options.move_timeout);
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    info!(
        "Runtime started: {}Hz loop, {}ms settle, watchdog {:?}",
        LOOP_HZ, config.settle_ms, options.move_timeout
    );
    info!("Subscribed to: {}", TOPIC_CMD_MOVE);
    info!("Publishing to: {}, {}", TOPIC_STATE_MOVE, TOPIC_HEALTH);

    loop {
        tick.tick().await;

        // 1. Drain all pending commands (non-blocking), keep latest
        let mut latest = None;
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<MoveCommand>(&payload) {
                Ok(cmd) => latest = Some(cmd),
                Err(e) => warn!("Failed to parse command: {}", e),
            }
        }
        if let Some(cmd) = latest {
            runtime.on_command(cmd);
        }

        // 2. Advance the move; the settle wait blocks, so keep it off the
        //    async workers
        let report = tokio::task::block_in_place(|| runtime.step());

        // 3. Publish progress
        let report_json = serde_json::to_string(&report)?;
        pub_state.put(report_json).await?;

        // 4. Publish health
        let health_json = serde_json::to_string(&runtime.health())?;
        pub_health.put(health_json).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::{JointId, Preset};
    use crate::clock::ManualClock;
    use crate::motor::MotorError;

    fn runtime(timeout: Option<Duration>) -> Runtime<SimulatedArm, ManualClock> {
        Runtime::new(
            ArmConfig::default().build_controller(),
            SimulatedArm::new(),
            ManualClock::new(),
            timeout,
        )
    }

    #[test]
    fn test_preset_move_runs_to_completion() {
        let mut rt = runtime(Some(MOVE_TIMEOUT));
        rt.on_command(Preset::MidFront.into());

        let mut report = rt.step();
        for _ in 0..1000 {
            if report.status == MoveStatus::Complete {
                break;
            }
            rt.clock.advance(0.02);
            report = rt.step();
        }

        assert_eq!(report.status, MoveStatus::Complete);
        assert_eq!(report.target, Some((30.0, 24.0)));
        assert!(report.converged);
        assert_eq!(rt.health(), RuntimeHealth::Ok);
    }

    #[test]
    fn test_watchdog_halts_stalled_move() {
        let mut rt = runtime(Some(Duration::from_secs(1)));
        rt.on_command(MoveCommand::Position { x: 26.0, y: 6.5 });
        rt.step();
        assert_eq!(rt.mover().status(), MoveStatus::InProgress);

        rt.clock.advance(1.5);
        let report = rt.step();

        assert_eq!(report.status, MoveStatus::Complete);
        assert_eq!(rt.health(), RuntimeHealth::MoveTimedOut);
        for joint in JointId::ALL {
            assert_eq!(rt.io().output(joint), 0.0);
        }
    }

    #[test]
    fn test_disabled_watchdog_keeps_tracking() {
        let mut rt = runtime(None);
        rt.on_command(MoveCommand::Position { x: 26.0, y: 6.5 });
        rt.step();
        rt.clock.advance(3600.0);
        assert_eq!(rt.step().status, MoveStatus::InProgress);
    }

    #[test]
    fn test_unreachable_target_reports_health() {
        let mut rt = runtime(None);
        rt.on_command(MoveCommand::Position { x: 100.0, y: 100.0 });
        let report = rt.step();
        assert!(!report.converged);
        assert_eq!(rt.health(), RuntimeHealth::NotConverged);
    }

    struct FailingIo;

    impl ArmIo for FailingIo {
        fn read_position(&mut self, _joint: JointId) -> Result<i64, MotorError> {
            Err(MotorError::Bus(feetech::FeetechError::Timeout { id: 9 }))
        }

        fn set_output(&mut self, _joint: JointId, _fraction: f64) -> Result<(), MotorError> {
            Ok(())
        }
    }

    #[test]
    fn test_motor_fault_halts() {
        let mut rt = Runtime::new(
            ArmConfig::default().build_controller(),
            FailingIo,
            ManualClock::new(),
            None,
        );
        rt.on_command(Preset::HighFront.into());
        let report = rt.step();
        assert_eq!(rt.health(), RuntimeHealth::MotorFault);
        assert_eq!(report.status, MoveStatus::Complete);
    }
}
