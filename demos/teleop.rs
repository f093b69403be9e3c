// Keyboard teleop: WASD translate, Z/X rotate, R/F gain, T/Y/G teleop/auto/disable, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use swerve_zenoh_runtime::config::{TOPIC_CMD_MODE, TOPIC_CMD_MOTION};
use swerve_zenoh_runtime::messages::{ModeCommand, MotionCommand, RobotMode};

const GAINS: [f64; 3] = [0.3, 0.6, 1.0]; // stick deflection per key press
const INPUT_TIMEOUT_MS: u64 = 100; // Release the stick after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let motion_pub = session.declare_publisher(TOPIC_CMD_MOTION).await?;
    let mode_pub = session.declare_publisher(TOPIC_CMD_MODE).await?;

    info!("Controls: WASD=move, Z/X=rotate, R/F=gain, T=teleop, Y=auto, G=disable, Q=quit");

    enable_raw_mode()?;
    let result = run_teleop(&motion_pub, &mode_pub).await;
    disable_raw_mode()?;

    // Leave the robot disabled on exit
    let disabled = ModeCommand {
        mode: RobotMode::Disabled,
    };
    mode_pub.put(serde_json::to_string(&disabled)?).await?;

    result
}

async fn run_teleop(
    motion_pub: &zenoh::pubsub::Publisher<'_>,
    mode_pub: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut gain_idx: usize = 0;
    let mut cmd = MotionCommand {
        forward: 0.0,
        strafe: 0.0,
        rotate: 0.0,
    };
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
                let gain = GAINS[gain_idx];
                let mut mode = None;

                match code {
                    KeyCode::Char('w') if pressed => cmd.forward = gain,
                    KeyCode::Char('s') if pressed => cmd.forward = -gain,
                    KeyCode::Char('d') if pressed => cmd.strafe = gain,
                    KeyCode::Char('a') if pressed => cmd.strafe = -gain,
                    KeyCode::Char('x') if pressed => cmd.rotate = gain,
                    KeyCode::Char('z') if pressed => cmd.rotate = -gain,

                    KeyCode::Char('r') if pressed => {
                        gain_idx = (gain_idx + 1).min(GAINS.len() - 1);
                        info!("Gain: {}", GAINS[gain_idx]);
                    }
                    KeyCode::Char('f') if pressed => {
                        gain_idx = gain_idx.saturating_sub(1);
                        info!("Gain: {}", GAINS[gain_idx]);
                    }

                    KeyCode::Char('t') if pressed => mode = Some(RobotMode::Teleop),
                    KeyCode::Char('y') if pressed => mode = Some(RobotMode::Autonomous),
                    KeyCode::Char('g') if pressed => mode = Some(RobotMode::Disabled),

                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }

                if matches!(code, KeyCode::Char('w' | 'a' | 's' | 'd' | 'z' | 'x')) && pressed {
                    last_movement_input = Instant::now();
                }

                if let Some(mode) = mode {
                    info!("Requesting mode {:?}", mode);
                    mode_pub
                        .put(serde_json::to_string(&ModeCommand { mode })?)
                        .await?;
                }
            }
        }

        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            cmd.forward = 0.0;
            cmd.strafe = 0.0;
            cmd.rotate = 0.0;
        }

        // Publish every cycle; the runtime's watchdog stops the base if this goes quiet
        motion_pub.put(serde_json::to_string(&cmd)?).await?;
    }

    Ok(())
}
