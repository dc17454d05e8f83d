// Joint diagnostic: READ-ONLY check of the arm's joint drives
//
// Nothing is written to the drives, so the arm will not move.
// Run this before starting the runtime on new hardware.
//
// Usage: cargo run --example joint_diagnostic -- [port]
// Example: cargo run --example joint_diagnostic -- /dev/ttyUSB0

use arm_zenoh_runtime::arm::{ArmGeometry, JointId};
use arm_zenoh_runtime::config::MOTOR_PORT;
use arm_zenoh_runtime::motor::feetech::{FeetechBus, Register, STEPS_PER_REVOLUTION};
use arm_zenoh_runtime::motor::{LOWER_MOTOR_ID, UPPER_MOTOR_ID};
use std::io::{self, Write};

const JOINTS: [(JointId, u8); 2] = [(JointId::Lower, LOWER_MOTOR_ID), (JointId::Upper, UPPER_MOTOR_ID)];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug".parse().unwrap()),
        )
        .init();

    let port = std::env::args().nth(1).unwrap_or_else(|| MOTOR_PORT.to_string());

    println!("Arm joint diagnostic (read-only)");
    println!("Serial port: {}", port);
    println!("Expected drives: lower ID {}, upper ID {}", LOWER_MOTOR_ID, UPPER_MOTOR_ID);
    println!();

    println!("Opening serial port...");
    let mut bus = match FeetechBus::open(&port) {
        Ok(bus) => bus,
        Err(e) => {
            println!("  Failed to open serial port: {}", e);
            println!("  Check the port path and the USB cable");
            return Err(e.into());
        }
    };

    println!("Pinging drives...");
    let mut all_found = true;
    for (joint, id) in JOINTS {
        print!("  {} (ID {}): ", joint, id);
        io::stdout().flush()?;

        match bus.ping(id) {
            Ok(true) => println!("responding"),
            Ok(false) => {
                println!("NO RESPONSE");
                all_found = false;
            }
            Err(e) => {
                println!("ERROR: {}", e);
                all_found = false;
            }
        }
    }
    println!();

    if !all_found {
        println!("Not all drives responded. Check drive power, IDs and wiring.");
        print!("Continue reading available drives? [y/N]: ");
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
        println!();
    }

    // Raw positions are single-turn Feetech steps
    let geometry = ArmGeometry {
        counts_per_rev: STEPS_PER_REVOLUTION as f64,
        ..ArmGeometry::default()
    };

    for (joint, id) in JOINTS {
        println!("  === {} joint (ID {}) ===", joint, id);

        match bus.get_model_number(id) {
            Ok(model) => println!("    Model number:   {}", model),
            Err(e) => println!("    Model number:   ERROR - {}", e),
        }

        match bus.read_u8(id, Register::OperatingMode) {
            Ok(mode) => {
                let label = match mode {
                    0 => "Position",
                    1 => "Velocity",
                    2 => "PWM",
                    3 => "Step",
                    _ => "Unknown",
                };
                println!("    Operating mode: {} ({})", mode, label);
            }
            Err(e) => println!("    Operating mode: ERROR - {}", e),
        }

        match bus.read_u8(id, Register::TorqueEnable) {
            Ok(val) => println!("    Torque enable:  {}", if val == 1 { "enabled" } else { "disabled" }),
            Err(e) => println!("    Torque enable:  ERROR - {}", e),
        }

        match bus.get_position(id) {
            Ok(pos) => println!(
                "    Position:       {} ({:.2} deg of joint travel from zero)",
                pos,
                geometry.counts_to_degrees(joint, pos as f64)
            ),
            Err(e) => println!("    Position:       ERROR - {}", e),
        }
        println!();
    }

    println!("Diagnostic complete. The runtime switches both drives to PWM mode on startup.");
    println!("Next: cargo run -- --port {}", port);

    Ok(())
}
