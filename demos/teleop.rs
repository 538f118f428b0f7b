// Keyboard teleop for one module: W/S drive, A/D steer, R/F speed, T/Y gain mode, Space stop, Q quit
//
// Usage: cargo run --example teleop -- [module_name]
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use swerve_module_runtime::config::{ModuleConfig, TOPIC_CMD};
use swerve_module_runtime::messages::ModuleCommand;
use swerve_module_runtime::swerve::OperatingMode;
use swerve_module_runtime::swerve::angle::normalize_degrees;

const SPEEDS: [f64; 3] = [0.25, 1.0, 3.0]; // m/s
const STEER_STEP_DEG: f64 = 15.0;
const INPUT_TIMEOUT_MS: u64 = 100; // Zero speed after this much time with no drive input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let mut config = ModuleConfig::default();
    if let Some(name) = std::env::args().nth(1) {
        config.name = name;
    }

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let topic = config.topic(TOPIC_CMD);
    let publisher = session.declare_publisher(topic.clone()).await?;

    info!("Publishing to {}", topic);
    info!("Controls: W/S=drive, A/D=steer, R/F=speed, T=teleop gains, Y=auto gains, Space=stop, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn send(
    publisher: &zenoh::pubsub::Publisher<'_>,
    cmd: &ModuleCommand,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    publisher.put(serde_json::to_string(cmd)?).await?;
    Ok(())
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;

    // Persistent command state
    let mut speed = 0.0;
    let mut angle = 0.0;
    let mut last_drive_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char('w') if pressed => {
                        speed = SPEEDS[speed_idx];
                        last_drive_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        speed = -SPEEDS[speed_idx];
                        last_drive_input = Instant::now();
                    }

                    // Heading persists between presses
                    KeyCode::Char('a') if pressed => {
                        angle = normalize_degrees(angle + STEER_STEP_DEG);
                        info!("Angle: {:.0}°", angle);
                    }
                    KeyCode::Char('d') if pressed => {
                        angle = normalize_degrees(angle - STEER_STEP_DEG);
                        info!("Angle: {:.0}°", angle);
                    }

                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    KeyCode::Char('t') if pressed => {
                        info!("Gains: teleop");
                        let cmd = ModuleCommand::Mode {
                            mode: OperatingMode::Teleop,
                        };
                        send(publisher, &cmd).await?;
                    }
                    KeyCode::Char('y') if pressed => {
                        info!("Gains: autonomous");
                        let cmd = ModuleCommand::Mode {
                            mode: OperatingMode::Autonomous,
                        };
                        send(publisher, &cmd).await?;
                    }

                    KeyCode::Char(' ') if pressed => {
                        speed = 0.0;
                        send(publisher, &ModuleCommand::Stop).await?;
                    }

                    KeyCode::Char('q') | KeyCode::Esc if pressed => {
                        send(publisher, &ModuleCommand::Stop).await?;
                        break;
                    }

                    _ => {}
                }
            }
        }

        if last_drive_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            speed = 0.0;
        }

        // Always publish at ~50Hz so the runtime watchdog stays fed
        send(publisher, &ModuleCommand::Desired { speed, angle }).await?;
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
