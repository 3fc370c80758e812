use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::{FirstMatch, Gallery, OnnxEngine};
use rollcall_hw::{Actuator, Camera, DoorLink};
use rollcall_ledger::Ledger;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod display;
mod kiosk;
mod overlay;

use config::Config;
use display::Window;
use kiosk::Session;

#[derive(Parser)]
#[command(name = "rollcall", version, about = "Face-recognition attendance kiosk")]
struct Cli {
    /// Config file (default: $ROLLCALL_CONFIG, then ./rollcall.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the kiosk (default)
    Run,
    /// Load the known-faces directory and list enrolled identities
    Gallery,
    /// Print attendance rows
    Report {
        /// Only rows for this date (YYYY-MM-DD)
        #[arg(short, long)]
        date: Option<chrono::NaiveDate>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Pulse the door once to test the wiring
    Door {
        /// Seconds to hold the door open (default: door_hold_secs)
        #[arg(long)]
        hold: Option<u64>,
    },
    /// List V4L2 capture devices
    Devices,
    /// Show resolved configuration and what is present on disk
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_kiosk(&config),
        Commands::Gallery => list_gallery(&config),
        Commands::Report { date, json } => report(&config, date, json),
        Commands::Door { hold } => {
            let hold = hold.map_or_else(|| config.door_hold(), Duration::from_secs);
            let mut door = DoorLink::connect(&config.serial_settings())?;
            door.open(hold)?;
            println!("door pulsed for {}s on {}", hold.as_secs(), config.serial_device);
            Ok(())
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("no capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
            Ok(())
        }
        Commands::Status => {
            println!("{}", serde_json::to_string_pretty(&status(&config))?);
            Ok(())
        }
    }
}

/// Bring up every resource, then hand them to the capture loop.
///
/// Startup order matters only for failure reporting: models and gallery
/// first, hardware last. Everything is released when the session drops.
fn run_kiosk(config: &Config) -> Result<()> {
    let mut engine = OnnxEngine::load(&config.model_dir)
        .with_context(|| format!("loading models from {}", config.model_dir.display()))?;
    let gallery = Gallery::load(&config.gallery_dir, &mut engine)?;
    if gallery.is_empty() {
        tracing::warn!(dir = %config.gallery_dir.display(), "no known faces enrolled; every face will be unknown");
    } else {
        tracing::info!(count = gallery.len(), "known faces loaded");
    }

    let ledger = Ledger::open(&config.ledger_path)?;
    let door = DoorLink::connect(&config.serial_settings())?;
    let camera = Camera::open(&config.camera_device, config.frame_width, config.frame_height)?;
    let stream = camera.stream()?;

    let mut session = Session::new(
        stream,
        Window::new(config.window_title.clone()),
        door,
        engine,
        gallery,
        FirstMatch::new(config.similarity_threshold),
        ledger,
        config.door_hold(),
    );
    let reason = session.run()?;
    tracing::info!(?reason, "kiosk shut down");
    Ok(())
}

fn list_gallery(config: &Config) -> Result<()> {
    let mut engine = OnnxEngine::load(&config.model_dir)
        .with_context(|| format!("loading models from {}", config.model_dir.display()))?;
    let gallery = Gallery::load(&config.gallery_dir, &mut engine)?;

    if gallery.is_empty() {
        println!("no identities enrolled in {}", config.gallery_dir.display());
        return Ok(());
    }
    for entry in gallery.iter() {
        println!("{:<24} {}", entry.identity.as_str(), entry.source.display());
    }
    Ok(())
}

fn report(config: &Config, date: Option<chrono::NaiveDate>, json: bool) -> Result<()> {
    if !config.ledger_path.exists() {
        anyhow::bail!("no ledger at {}", config.ledger_path.display());
    }
    let ledger = Ledger::open(&config.ledger_path)?;
    let rows = match date {
        Some(date) => ledger.records_on(date)?,
        None => ledger.records()?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("no attendance recorded");
    }
    for row in &rows {
        println!(
            "{:<24} {} {}",
            row.name,
            row.date.format(rollcall_ledger::DATE_FORMAT),
            row.time.format(rollcall_ledger::TIME_FORMAT)
        );
    }
    Ok(())
}

fn status(config: &Config) -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "config": config,
        "gallery_present": config.gallery_dir.is_dir(),
        "ledger_present": config.ledger_path.is_file(),
        "detector_model_present": rollcall_core::detector_model_path(&config.model_dir).is_file(),
        "recognizer_model_present": rollcall_core::recognizer_model_path(&config.model_dir).is_file(),
        "camera_present": std::path::Path::new(&config.camera_device).exists(),
        "serial_present": std::path::Path::new(&config.serial_device).exists(),
    })
}
