//! Program runner
//!
//! Loads the arm configuration and a block program, then drives the engine
//! against the simulated servo bus while the animator interpolates the joint
//! table at the configured frame rate.

use core::convert::Infallible;
use core::future::pending;
use std::fmt;
use std::fs;
use std::path::PathBuf;

use armblocks_core::config::{GripperSettings, JointRegistry};
use armblocks_core::engine::{CancelToken, Engine, EngineConfig, RunReport, RunState};
use armblocks_core::program::{BlockRegistry, Program, ProgramLoader, ValidationError};
use armblocks_core::sync::{ConnectError, JointTable, SimulatedBus, Synchronizer};
use embassy_futures::select::{select, Either};
use embassy_time::{Delay, Duration, Timer};
use log::{debug, info, warn};

use crate::config::{self, ConfigError};

/// What to run and how
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Robot configuration file
    pub config: PathBuf,
    /// Program document
    pub program: PathBuf,
    /// Open the servo bus before running
    pub connect: bool,
    /// Override the configured settle delay (ms)
    pub settle_ms: Option<u32>,
    /// Cancel the run after this long
    pub time_limit: Option<Duration>,
}

/// Runner failures that happen before or outside the engine
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerError {
    Config(ConfigError),
    /// Program file could not be read
    ProgramIo,
    Program(ValidationError),
    Connect(ConnectError),
    /// Joint table animator already claimed
    AnimatorBusy,
}

impl From<ConfigError> for RunnerError {
    fn from(e: ConfigError) -> Self {
        RunnerError::Config(e)
    }
}

impl From<ValidationError> for RunnerError {
    fn from(e: ValidationError) -> Self {
        RunnerError::Program(e)
    }
}

impl From<ConnectError> for RunnerError {
    fn from(e: ConnectError) -> Self {
        RunnerError::Connect(e)
    }
}

impl fmt::Display for RunnerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerError::Config(e) => write!(f, "{}", e),
            RunnerError::ProgramIo => write!(f, "cannot read program"),
            RunnerError::Program(e) => write!(f, "program rejected: {}", e),
            RunnerError::Connect(e) => write!(f, "connect failed: {}", e),
            RunnerError::AnimatorBusy => write!(f, "joint animator already running"),
        }
    }
}

/// Result of a finished run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    pub state: RunState,
    pub report: RunReport,
}

impl Outcome {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self.state {
            RunState::Completed => 0,
            _ => 1,
        }
    }
}

/// Block registry used by the command-line runner
///
/// The built-in definitions plus the names older editors saved programs with.
pub fn block_registry() -> BlockRegistry {
    let mut registry = BlockRegistry::standard();
    for (alias, target) in [("move_joint", "move"), ("delay", "wait"), ("loop", "repeat")] {
        if !registry.alias(alias, target) {
            warn!("Block alias {} -> {} not registered", alias, target);
        }
    }
    registry
}

/// Parse a program document against the given joints
pub fn load_program(text: &str, joints: &JointRegistry) -> Result<Program, ValidationError> {
    let blocks = block_registry();
    let program = ProgramLoader::new(&blocks, joints).load_str(text)?;
    debug!(
        "Program loaded: {} top-level blocks, {} total",
        program.len(),
        program.block_count()
    );
    Ok(program)
}

/// Load everything named in `options` and run it to the end
pub async fn run(options: &RunOptions) -> Result<Outcome, RunnerError> {
    let arm = config::load(&options.config)?;
    let (joints, gripper) = arm.validate().map_err(ConfigError::from)?;

    let text = fs::read_to_string(&options.program).map_err(|e| {
        warn!("Cannot read {}: {}", options.program.display(), e);
        RunnerError::ProgramIo
    })?;
    let program = load_program(&text, &joints)?;

    let engine_config = EngineConfig {
        settle_ms: options.settle_ms.unwrap_or(arm.arm.settle_ms),
    };
    let frame = Duration::from_millis(u64::from(arm.arm.frame_ms));

    execute(
        &program,
        &joints,
        gripper,
        SimulatedBus::for_registry(&joints),
        Session {
            connect: options.connect,
            engine: engine_config,
            frame,
            time_limit: options.time_limit,
        },
    )
    .await
}

/// Per-run settings resolved from options and configuration
#[derive(Debug, Clone, Copy)]
struct Session {
    connect: bool,
    engine: EngineConfig,
    frame: Duration,
    time_limit: Option<Duration>,
}

async fn execute(
    program: &Program,
    joints: &JointRegistry,
    gripper: Option<GripperSettings>,
    bus: SimulatedBus,
    session: Session,
) -> Result<Outcome, RunnerError> {
    let table = JointTable::new(joints);
    let sync = Synchronizer::new(joints, &table, gripper, bus);
    if session.connect {
        sync.connect().await?;
    } else {
        info!("Running without a bus connection, motion is animated only");
    }

    let engine = Engine::new(session.engine);
    let cancel = CancelToken::new();
    let mut animator = table
        .animator(session.frame)
        .ok_or(RunnerError::AnimatorBusy)?;

    let drive = async {
        let deadline = async {
            if let Some(limit) = session.time_limit {
                Timer::after(limit).await;
                warn!("Time limit of {} ms reached, cancelling", limit.as_millis());
                cancel.cancel();
            }
            pending::<Infallible>().await
        };

        let mut delay = Delay;
        let result = match select(engine.run(program, &sync, &mut delay, &cancel), deadline).await {
            Either::First(result) => result,
            Either::Second(never) => match never {},
        };
        if let Err(e) = result {
            warn!("Run ended early: {}", e);
        }

        while !table.is_settled() {
            Timer::after(session.frame).await;
        }
    };

    match select(drive, animator.run()).await {
        Either::First(()) => {}
        Either::Second(never) => match never {},
    }

    if sync.is_connected() {
        sync.disconnect().await;
    }

    for state in table.snapshot().iter() {
        let name = joints
            .get(state.servo_id)
            .map(|joint| joint.name.as_str())
            .unwrap_or("?");
        info!("  {:<10} {:>7.2} deg  speed {}", name, state.degrees, state.speed);
    }

    Ok(Outcome {
        state: engine.state(),
        report: engine.report(),
    })
}
