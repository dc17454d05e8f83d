// Offline coordinated move on the simulated arm
//
// Usage: cargo run --example sim_move -- [x y]
// Without a target, visits every preset in turn.

use arm_zenoh_runtime::arm::{JointId, MoveStatus, Preset};
use arm_zenoh_runtime::clock::ManualClock;
use arm_zenoh_runtime::config::{ArmConfig, LOOP_HZ};
use arm_zenoh_runtime::motor::SimulatedArm;
use tracing::info;

const MAX_TICKS: usize = 2000;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap()),
        )
        .init();

    let args: Vec<f64> = std::env::args()
        .skip(1)
        .map(|a| a.parse::<f64>())
        .collect::<Result<_, _>>()?;
    let targets: Vec<(String, (f64, f64))> = match args.as_slice() {
        [x, y] => vec![(format!("({}, {})", x, y), (*x, *y))],
        [] => Preset::ALL
            .iter()
            .map(|p| (p.name().to_string(), p.position()))
            .collect(),
        _ => return Err("expected either no arguments or an x y pair".into()),
    };

    let config = ArmConfig::default();
    let mut mover = config.build_controller();
    let mut arm = SimulatedArm::new();
    let clock = ManualClock::new();
    let tick_secs = 1.0 / LOOP_HZ as f64;

    for (label, (x, y)) in targets {
        info!("Moving to {} at ({}, {})", label, x, y);
        mover.request_move(x, y);

        let mut ticks = 0;
        loop {
            let status = mover.tick(&mut arm, &clock)?;
            ticks += 1;
            if status == MoveStatus::Complete {
                break;
            }
            if ticks >= MAX_TICKS {
                info!("Giving up after {} ticks", ticks);
                mover.halt(&mut arm)?;
                break;
            }
            if ticks % 10 == 0 {
                info!(
                    "  tick {:4}: lower {:8.2} deg, upper {:8.2} deg to go",
                    ticks,
                    mover.joint(JointId::Lower).error_degrees(),
                    mover.joint(JointId::Upper).error_degrees()
                );
            }
            clock.advance(tick_secs);
        }

        let state = mover.kinematic_state();
        let (fx, fy) = mover.geometry().forward(state.theta, state.phi);
        info!(
            "Done in {} ticks: theta={:.2} deg, phi={:.2} deg, reaches ({:.2}, {:.2}), converged={}",
            ticks,
            state.theta.to_degrees(),
            state.phi.to_degrees(),
            fx,
            fy,
            state.converged
        );
        for joint in JointId::ALL {
            info!("  {} drive at {} counts", joint, arm.position(joint));
        }
    }

    Ok(())
}
