// 50 Hz swerve control loop with command watchdog and mode lifecycle
// Note: the drive consumes its motion request every cycle, so the watchdog only has
// to stop resupplying a stale command; the wheels then come to rest on their own.

use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{info, warn};

use crate::config::{CMD_TIMEOUT, DriveConfig, LOOP_HZ, TOPIC_CMD_MODE, TOPIC_CMD_MOTION};
use crate::messages::{ModeCommand, MotionCommand, RobotMode, RuntimeHealth};
use crate::motor::MotorDriver;
use crate::sim::SimBackend;
use crate::swerve::SwerveDrive;

pub type BackendResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Whatever the modules' outputs end up on
pub trait Backend {
    /// Called once per cycle after every module has executed
    fn end_cycle(&mut self, dt: f64) -> BackendResult;

    /// Command all actuators to zero
    fn stop(&mut self) -> BackendResult;
}

/// Which hardware the runtime drives
#[derive(Debug, Clone)]
pub enum BackendKind {
    Feetech { port: String },
    Simulated,
}

pub struct Runtime<B> {
    drive: SwerveDrive,
    backend: B,
    mode: RobotMode,
    latest_cmd: Option<MotionCommand>,
    cmd_received_at: Instant,
    health: RuntimeHealth,
}

impl<B: Backend> Runtime<B> {
    pub fn new(drive: SwerveDrive, backend: B) -> Self {
        Self {
            drive,
            backend,
            mode: RobotMode::Disabled,
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            health: RuntimeHealth::Disabled,
        }
    }

    /// Process incoming motion command
    pub fn on_command(&mut self, cmd: MotionCommand, now: Instant) {
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = now;
    }

    /// Switch robot mode. Entering an enabled mode flushes the drive first.
    pub fn on_mode(&mut self, mode: RobotMode) -> BackendResult {
        if mode == self.mode {
            return Ok(());
        }
        info!("Mode {:?} -> {:?}", self.mode, mode);
        self.mode = mode;
        self.latest_cmd = None;

        match mode {
            RobotMode::Disabled => {
                self.health = RuntimeHealth::Disabled;
                self.drive.reset();
                self.backend.stop()?;
            }
            RobotMode::Autonomous => {
                self.drive.reset();
            }
            RobotMode::Teleop => {
                self.drive.reset();
                self.drive.set_squared_inputs(true);
            }
        }
        Ok(())
    }

    /// One control cycle: supply the command if fresh, compute, dispatch, commit
    pub fn cycle(&mut self, now: Instant, dt: f64) -> BackendResult {
        if !self.mode.is_enabled() {
            return Ok(());
        }

        let cmd_age = now.saturating_duration_since(self.cmd_received_at);
        match self.latest_cmd {
            Some(cmd) if cmd_age <= CMD_TIMEOUT => {
                self.health = RuntimeHealth::Ok;
                match self.mode {
                    RobotMode::Teleop => self.drive.set_motion(cmd.forward, cmd.strafe, cmd.rotate),
                    _ => self.drive.set_raw_motion(cmd.forward, cmd.strafe, cmd.rotate),
                }
            }
            _ => {
                if self.health != RuntimeHealth::CmdStale {
                    warn!("Command stale ({:?} old), letting the drive come to rest", cmd_age);
                }
                self.health = RuntimeHealth::CmdStale;
            }
        }

        self.drive.compute_and_dispatch();
        self.backend.end_cycle(dt)
    }

    pub fn mode(&self) -> RobotMode {
        self.mode
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn drive(&self) -> &SwerveDrive {
        &self.drive
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

/// Build the drive on the chosen backend and run the loop until an error occurs.
pub async fn run(
    config: DriveConfig,
    backend: BackendKind,
    initial_mode: RobotMode,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    match backend {
        BackendKind::Feetech { port } => {
            let (drive, driver) = MotorDriver::open(&port, &config)?;
            serve(Runtime::new(drive, driver), initial_mode).await
        }
        BackendKind::Simulated => {
            let (drive, sim) = SimBackend::build(&config);
            serve(Runtime::new(drive, sim), initial_mode).await
        }
    }
}

async fn serve<B: Backend>(
    mut runtime: Runtime<B>,
    initial_mode: RobotMode,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up subscribers...");
    let motion_sub = session.declare_subscriber(TOPIC_CMD_MOTION).await?;
    let mode_sub = session.declare_subscriber(TOPIC_CMD_MODE).await?;

    let period = Duration::from_millis(1000 / LOOP_HZ);
    let mut tick = interval(period);
    runtime.on_mode(initial_mode)?;

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout, mode {:?}",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis(),
        runtime.mode()
    );
    info!("Subscribed to: {}, {}", TOPIC_CMD_MOTION, TOPIC_CMD_MODE);

    loop {
        tick.tick().await;

        // 1. Mode changes first, so a flush happens before this cycle's command
        while let Ok(Some(sample)) = mode_sub.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<ModeCommand>(&payload) {
                Ok(cmd) => runtime.on_mode(cmd.mode)?,
                Err(e) => warn!("Failed to parse mode command: {}", e),
            }
        }

        // 2. Drain pending motion commands, keep latest
        while let Ok(Some(sample)) = motion_sub.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<MotionCommand>(&payload) {
                Ok(cmd) => runtime.on_command(cmd, Instant::now()),
                Err(e) => warn!("Failed to parse motion command: {}", e),
            }
        }

        // 3. Run the drive
        runtime.cycle(Instant::now(), period.as_secs_f64())?;
    }
}
