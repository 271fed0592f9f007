#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Operator CLI for the fightwatch incident monitor.
//!
//! ```text
//! fightwatch login [--username U] [--password P] [--phone N]
//! fightwatch logout
//! fightwatch whoami
//! fightwatch status
//! fightwatch load-model
//! fightwatch watch --source webcam --snapshot /tmp/cam.jpg [--duration 60]
//! fightwatch watch --source youtube --url URL --frames DIR [--loop]
//! fightwatch analyze clip.mp4 [--filter upload]
//! ```
//!
//! Configuration comes from `fightwatch.toml` (or `--config PATH`) plus
//! `FIGHTWATCH_*` environment overrides. Logging goes through
//! [`fightwatch_cli_utils::init_logger`], filtered by `RUST_LOG`.

mod account;
mod monitor;
mod render;

use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use fightwatch_auth::{Session, SessionStore};
use fightwatch_incident_models::{IncidentSource, SourceFilter};
use fightwatch_monitor::{MonitorConfig, MonitorContext};

#[derive(Parser)]
#[command(
    name = "fightwatch",
    about = "Fight detection monitor for webcams, uploaded videos and streams"
)]
struct Cli {
    /// Config file (defaults to ./fightwatch.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with username, password and phone number
    Login {
        /// Username (prompted when omitted)
        #[arg(long)]
        username: Option<String>,
        /// Password (prompted, hidden, when omitted)
        #[arg(long)]
        password: Option<String>,
        /// Phone number (prompted when omitted)
        #[arg(long)]
        phone: Option<String>,
    },
    /// Log out and forget the stored session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Show service health and the feature catalog
    Status,
    /// Ask the service to load the detection model
    LoadModel,
    /// Sample a live source until Ctrl-C or the duration elapses
    Watch(WatchArgs),
    /// Analyze a video file in one request
    Analyze {
        /// Video file to upload
        file: PathBuf,
        /// Narrow the dashboard incident list
        #[arg(long, default_value = "all")]
        filter: SourceFilter,
    },
}

/// Live sources a sampler can watch.
#[derive(Clone, Copy, ValueEnum)]
enum LiveSource {
    Webcam,
    Youtube,
}

impl From<LiveSource> for IncidentSource {
    fn from(source: LiveSource) -> Self {
        match source {
            LiveSource::Webcam => Self::Webcam,
            LiveSource::Youtube => Self::Youtube,
        }
    }
}

#[derive(Args)]
#[command(group(
    ArgGroup::new("frame_input")
        .required(true)
        .args(["snapshot", "frames"]),
))]
struct WatchArgs {
    /// Which kind of live source this is
    #[arg(long, value_enum, default_value_t = LiveSource::Webcam)]
    source: LiveSource,
    /// JPEG file an external grabber keeps overwriting
    #[arg(long)]
    snapshot: Option<PathBuf>,
    /// Directory of JPEG frames played back in name order
    #[arg(long)]
    frames: Option<PathBuf>,
    /// Restart the frame directory after the last frame
    #[arg(long = "loop", requires = "frames", conflicts_with = "snapshot")]
    looping: bool,
    /// YouTube URL (required with --source youtube)
    #[arg(long)]
    url: Option<String>,
    /// Camera identifier stamped on webcam incidents
    #[arg(long)]
    camera_id: Option<String>,
    /// Stop after this many seconds
    #[arg(long)]
    duration: Option<u64>,
    /// Narrow the dashboard incident list
    #[arg(long, default_value = "all")]
    filter: SourceFilter,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = fightwatch_cli_utils::init_logger();
    let cli = Cli::parse();

    let config = MonitorConfig::load(cli.config.as_deref())?;
    let mut session = Session::open(SessionStore::new(&config.session.path));

    match cli.command {
        Commands::Login {
            username,
            password,
            phone,
        } => account::login(&mut session, username, password, phone)?,
        Commands::Logout => account::logout(&mut session)?,
        Commands::Whoami => account::whoami(&session),
        Commands::Status => {
            let ctx = MonitorContext::new(config)?;
            monitor::status(&ctx, &session, &multi).await?;
        }
        Commands::LoadModel => {
            let ctx = MonitorContext::new(config)?;
            monitor::load_model(&ctx, &session, &multi).await?;
        }
        Commands::Watch(args) => {
            let ctx = MonitorContext::new(config)?;
            monitor::watch(&ctx, &session, &multi, args).await?;
        }
        Commands::Analyze { file, filter } => {
            let ctx = MonitorContext::new(config)?;
            monitor::analyze(&ctx, &session, &multi, &file, filter).await?;
        }
    }

    Ok(())
}
