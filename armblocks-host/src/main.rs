//! armblocks - run block programs against a robot arm
//!
//! ```text
//! armblocks [--config robot.toml] [--connect] [--settle-ms N] [--time-limit S] program.json
//! ```
//!
//! Without `--connect` the arm is only animated in the joint table. Logging
//! honours `RUST_LOG` and defaults to `info`.

mod config;
mod runner;

use std::path::PathBuf;

use clap::Parser;
use embassy_executor::Spawner;
use embassy_time::Duration;
use log::{error, info};
use tracing_subscriber::EnvFilter;

use runner::RunOptions;

/// Exit code for failures outside the engine
const EXIT_SETUP_FAILED: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "armblocks", version, about = "Run a block program on a robot arm")]
struct Args {
    /// Robot configuration file
    #[arg(short, long, default_value = "robot.toml")]
    config: PathBuf,

    /// Open the servo bus before running
    #[arg(long)]
    connect: bool,

    /// Pause between top-level blocks (ms), overrides the configuration
    #[arg(long)]
    settle_ms: Option<u32>,

    /// Cancel the run after this many seconds
    #[arg(long)]
    time_limit: Option<u64>,

    /// Program document (JSON)
    program: PathBuf,
}

impl From<Args> for RunOptions {
    fn from(args: Args) -> Self {
        RunOptions {
            config: args.config,
            program: args.program,
            connect: args.connect,
            settle_ms: args.settle_ms,
            time_limit: args.time_limit.map(Duration::from_secs),
        }
    }
}

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let options = RunOptions::from(Args::parse());
    info!("armblocks {}", env!("CARGO_PKG_VERSION"));

    let code = match runner::run(&options).await {
        Ok(outcome) => {
            info!(
                "Finished {:?}: {} blocks, {} absorbed failures",
                outcome.state, outcome.report.blocks_executed, outcome.report.absorbed_failures
            );
            outcome.exit_code()
        }
        Err(e) => {
            error!("{}", e);
            EXIT_SETUP_FAILED
        }
    };

    // The std executor never returns on its own
    std::process::exit(code);
}
