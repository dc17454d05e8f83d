// Keyboard placement: 1-7 send a preset move, Q quit. Prints move progress.
use arm_zenoh_runtime::arm::Preset;
use arm_zenoh_runtime::config::{TOPIC_CMD_MOVE, TOPIC_STATE_MOVE};
use arm_zenoh_runtime::messages::{MoveCommand, MoveReport};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::Duration;
use tracing::{info, warn};
use zenoh::handlers::FifoChannelHandler;
use zenoh::sample::Sample;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_MOVE).await?;
    let progress = session.declare_subscriber(TOPIC_STATE_MOVE).await?;

    for (i, preset) in Preset::ALL.iter().enumerate() {
        let (x, y) = preset.position();
        info!("  {} = {} ({}, {})", i + 1, preset.name(), x, y);
    }
    info!("  Q = quit");

    enable_raw_mode()?;
    let result = run_placement(&publisher, &progress).await;
    disable_raw_mode()?;

    result
}

async fn run_placement(
    publisher: &zenoh::pubsub::Publisher<'_>,
    progress: &zenoh::pubsub::Subscriber<FifoChannelHandler<Sample>>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut last_report: Option<MoveReport> = None;

    loop {
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                if kind != KeyEventKind::Press {
                    continue;
                }

                match code {
                    KeyCode::Char(c @ '1'..='7') => {
                        let preset = Preset::ALL[(c as u8 - b'1') as usize];
                        let cmd = MoveCommand::from(preset);
                        publisher.put(serde_json::to_string(&cmd)?).await?;
                        info!("Sent {}", preset.name());
                    }
                    KeyCode::Char('q') | KeyCode::Esc => break,
                    _ => {}
                }
            }
        }

        // Only log status transitions, the runtime publishes every tick
        while let Ok(Some(sample)) = progress.try_recv() {
            let payload = sample.payload().to_bytes();
            let report = match serde_json::from_slice::<MoveReport>(&payload) {
                Ok(report) => report,
                Err(e) => {
                    warn!("Bad progress report: {}", e);
                    continue;
                }
            };
            let changed = last_report
                .as_ref()
                .is_none_or(|last| last.status != report.status || last.target != report.target);
            if changed {
                info!(
                    "{:?} target={:?} theta={:.1} phi={:.1} converged={}",
                    report.status, report.target, report.theta_deg, report.phi_deg, report.converged
                );
            }
            last_report = Some(report);
        }
    }

    Ok(())
}
