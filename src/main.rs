//! partscan - warehouse parts scanning pipeline
//!
//! Captures part labels from camera frames, extracts part number and
//! VIN fields through configurable bounding boxes and OCR, and submits
//! confirmed scans to the inventory backend.

mod api;
mod capture;
mod config;
mod error;
mod scan;
mod session;
mod vision;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::{FallbackStore, InventoryClient};
use crate::capture::{DisplayGeometry, StillCamera};
use crate::config::{AppConfig, OcrEngineKind};
use crate::scan::barcode::{self, ScriptedDecoder};
use crate::scan::ScanOrchestrator;
use crate::session::{CaptureSession, SessionState};
use crate::vision::{CapturePipeline, NullRecognizer, RemoteOcr, TextRecognizer};

/// partscan - label capture and inventory scanning
#[derive(Parser, Debug)]
#[command(name = "partscan")]
#[command(about = "Scan part labels and manage warehouse inventory records")]
struct Cli {
    /// Path to a configuration file (defaults to the user config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the label-capture pipeline on still images and preview the scan
    Scan {
        /// Label image(s), one per configured capture pass
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Location the parts are scanned at
        #[arg(long)]
        location: String,
        /// Submit the confirmed scan to the backend
        #[arg(long)]
        submit: bool,
    },
    /// Submit a manually entered scan
    Submit {
        #[arg(long)]
        part_number: String,
        #[arg(long)]
        location: String,
        #[arg(long)]
        vin: Option<String>,
    },
    /// List recent scans
    History {
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Search the inventory by VIN or part number
    Search {
        #[arg(long, conflicts_with = "part")]
        vin: Option<String>,
        #[arg(long)]
        part: Option<String>,
    },
    /// Delete a scan record
    DeleteScan { id: i64 },
    /// Delete a part by part number
    DeletePart { part_number: String },
    /// Download the exported inventory report
    Report {
        #[arg(long, default_value = "inventory.xlsx")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_or_default_config(cli.config.as_deref());

    match cli.command {
        Command::Scan {
            images,
            location,
            submit,
        } => run_scan(&config, images, &location, submit).await,
        Command::Submit {
            part_number,
            location,
            vin,
        } => run_manual_submit(&config, part_number, &location, vin).await,
        Command::History { limit } => run_history(&config, limit).await,
        Command::Search { vin, part } => run_search(&config, vin, part).await,
        Command::DeleteScan { id } => {
            build_client(&config)?.delete_scan(id).await?;
            println!("Scan {id} deleted");
            Ok(())
        }
        Command::DeletePart { part_number } => {
            build_client(&config)?.delete_part(&part_number).await?;
            println!("Part {part_number} deleted");
            Ok(())
        }
        Command::Report { out } => {
            build_client(&config)?.download_inventory_report(&out).await?;
            println!("Inventory report saved to {}", out.display());
            Ok(())
        }
    }
}

/// Load configuration from the given path, the default location, or
/// fall back to defaults.
fn load_or_default_config(path: Option<&std::path::Path>) -> AppConfig {
    if let Some(path) = path {
        match config::load_config(path) {
            Ok(config) => {
                info!(path = %path.display(), "loaded configuration");
                return config;
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to load configuration, using defaults");
                return AppConfig::default();
            }
        }
    }
    if let Ok(config_dir) = config::default_config_dir() {
        let config_path = config_dir.join("config.toml");
        if config_path.exists() {
            if let Ok(config) = config::load_config(&config_path) {
                info!(path = %config_path.display(), "loaded configuration");
                return config;
            }
        }
    }
    info!("using default configuration");
    AppConfig::default()
}

fn build_client(config: &AppConfig) -> Result<InventoryClient> {
    let client = InventoryClient::new(&config.backend.base_url)?;
    Ok(if config.backend.offline_fallback {
        client.with_fallback(FallbackStore)
    } else {
        client
    })
}

async fn run_scan(
    config: &AppConfig,
    images: Vec<PathBuf>,
    location: &str,
    submit: bool,
) -> Result<()> {
    let client = build_client(config)?;

    let recognizer: Arc<dyn TextRecognizer> = match config.ocr.engine {
        OcrEngineKind::Remote => Arc::new(RemoteOcr::new(client.clone())),
        OcrEngineKind::Manual => Arc::new(NullRecognizer),
    };
    let pipeline = CapturePipeline::new(
        recognizer,
        config.ocr.preprocess.clone(),
        Duration::from_secs(config.ocr.timeout_secs),
    );
    let display = DisplayGeometry {
        width: config.capture.display_width,
        height: config.capture.display_height,
    };
    let camera = Arc::new(StillCamera::new(images, display)?);
    let mut session = CaptureSession::new(camera, pipeline, config.capture.targets.clone())?;

    session.start().await?;
    while session.state() == SessionState::LiveFeed {
        session.capture().await?;
    }

    println!("Extracted fields:");
    let mut box_ids: Vec<_> = session.texts().keys().cloned().collect();
    box_ids.sort();
    for box_id in &box_ids {
        let text = &session.texts()[box_id];
        println!(
            "  {box_id}: {}",
            if text.is_empty() { "<no text detected>" } else { text }
        );
    }

    let outcome = session.confirm()?;

    let mut orchestrator = ScanOrchestrator::new(
        config.capture.field_mapping.clone(),
        config.backend.scanned_by.clone(),
    );
    orchestrator.set_location(location)?;
    {
        let preview = orchestrator.record_capture(outcome)?;
        println!("Scan preview:");
        println!("  part number: {}", preview.part_number);
        println!("  location:    {}", preview.location);
        println!("  vin:         {}", preview.vin.as_deref().unwrap_or("-"));
    }

    if submit {
        let record = orchestrator.submit(&client).await?;
        println!("Submitted scan {}", record.id);
    } else {
        println!("Dry run - pass --submit to send the scan");
    }
    Ok(())
}

async fn run_manual_submit(
    config: &AppConfig,
    part_number: String,
    location: &str,
    vin: Option<String>,
) -> Result<()> {
    let client = build_client(config)?;
    let mut orchestrator = ScanOrchestrator::new(
        config.capture.field_mapping.clone(),
        config.backend.scanned_by.clone(),
    );
    orchestrator.set_location(location)?;

    // Manual entry rides the barcode path: a decoder that immediately
    // yields the typed part number.
    let mut decoder = ScriptedDecoder::decoding(&part_number);
    let symbol = barcode::scan_first(&mut decoder).await?;
    orchestrator.record_barcode(symbol)?;
    if let Some(vin) = vin {
        if let Some(record) = orchestrator.pending_mut() {
            record.vin = Some(vin);
        }
    }
    let record = orchestrator.submit(&client).await?;
    println!("Submitted scan {}", record.id);
    Ok(())
}

async fn run_history(config: &AppConfig, limit: u32) -> Result<()> {
    let client = build_client(config)?;
    let scans = client.list_scans(limit).await?;
    if scans.is_empty() {
        println!("No scans recorded");
        return Ok(());
    }
    for scan in scans {
        println!(
            "[{}] {} @ {} ({}) vin={} by={}",
            scan.id,
            scan.part_number,
            scan.location,
            scan.scan_method.as_deref().unwrap_or("?"),
            scan.vin.as_deref().unwrap_or("-"),
            scan.scanned_by.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

async fn run_search(config: &AppConfig, vin: Option<String>, part: Option<String>) -> Result<()> {
    let client = build_client(config)?;
    match (vin, part) {
        (Some(vin), _) => {
            let vehicle = client.vehicle_by_vin(&vin).await?;
            println!("Vehicle:\n{}", serde_json::to_string_pretty(&vehicle)?);
            let parts = client.parts_by_vin(&vin).await?;
            println!("Parts:\n{}", serde_json::to_string_pretty(&parts)?);
        }
        (None, Some(part)) => {
            let vehicles = client.vehicles_by_part_number(&part).await?;
            println!("Vehicles:\n{}", serde_json::to_string_pretty(&vehicles)?);
            let parts = client.parts_by_part_number(&part).await?;
            println!("Parts:\n{}", serde_json::to_string_pretty(&parts)?);
        }
        (None, None) => anyhow::bail!("provide --vin or --part"),
    }
    Ok(())
}
