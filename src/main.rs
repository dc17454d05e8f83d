use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use arm_zenoh_runtime::config::{MOTOR_PORT, MOVE_TIMEOUT};
use arm_zenoh_runtime::motor::{LOWER_MOTOR_ID, UPPER_MOTOR_ID};
use arm_zenoh_runtime::runtime::{self, RuntimeOptions};

/// Two-joint arm positioning runtime
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Serial port of the Feetech joint drives
    #[arg(short, long, default_value = MOTOR_PORT)]
    port: String,

    /// Drive a simulated arm instead of hardware
    #[arg(long)]
    sim: bool,

    /// JSON file with geometry and joint tuning
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Motor ID of the lower joint drive
    #[arg(long, default_value_t = LOWER_MOTOR_ID)]
    lower_id: u8,

    /// Motor ID of the upper joint drive
    #[arg(long, default_value_t = UPPER_MOTOR_ID)]
    upper_id: u8,

    /// Halt moves still running after this many seconds (0 disables)
    #[arg(long, default_value_t = MOVE_TIMEOUT.as_secs())]
    move_timeout_secs: u64,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();
    let options = RuntimeOptions {
        port: args.port,
        sim: args.sim,
        config: args.config,
        lower_id: args.lower_id,
        upper_id: args.upper_id,
        move_timeout: (args.move_timeout_secs > 0).then(|| Duration::from_secs(args.move_timeout_secs)),
    };

    if let Err(e) = runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
