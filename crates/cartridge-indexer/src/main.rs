//! Cartridge library indexer
//!
//! Scans every configured system, applies saved metadata and recovery
//! fragments, populates the enabled collections and prints a JSON summary.
//! Pending edits are saved on the way out.
//!
//! Usage: `cartridge-indexer [CONFIG_DIR]`. Without a directory the default
//! configuration locations are used.

use anyhow::{Context, Result};
use cartridge_config::{CatalogConfig, LibrarySettings, SETTINGS_FILE, SYSTEMS_FILE};
use cartridge_library::{Library, NoThemes};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

#[derive(Debug, Serialize)]
struct Summary {
    systems: Vec<SystemSummary>,
    collections: Vec<CollectionSummary>,
    display: Vec<String>,
    elapsed_ms: u64,
}

#[derive(Debug, Serialize)]
struct SystemSummary {
    name: String,
    full_name: String,
    games: usize,
    gamelist: PathBuf,
}

#[derive(Debug, Serialize)]
struct CollectionSummary {
    key: String,
    name: String,
    custom: bool,
    games: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();

    let config_dir = std::env::args().nth(1).map(PathBuf::from);
    let (config, settings) = load_configuration(config_dir.as_deref())?;
    info!(
        "Cartridge indexer starting with {} systems configured",
        config.systems.len()
    );

    let start = Instant::now();
    let library =
        tokio::task::spawn_blocking(move || Library::init(&config, &settings, &NoThemes))
            .await
            .context("Library build task failed")?
            .context("Failed to build library")?;

    let summary = summarize(&library, start.elapsed().as_millis() as u64);
    println!("{}", serde_json::to_string_pretty(&summary)?);

    let written = tokio::task::spawn_blocking(move || library.shutdown())
        .await
        .context("Library shutdown task failed")?;
    info!("Indexer finished, {} documents written", written);
    Ok(())
}

/// Setup logging to console
fn setup_logging() {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_ansi(false))
        .init();
}

fn load_configuration(dir: Option<&Path>) -> Result<(CatalogConfig, LibrarySettings)> {
    match dir {
        Some(dir) => {
            let systems = dir.join(SYSTEMS_FILE);
            let config = CatalogConfig::load(&systems)
                .with_context(|| format!("Failed to load {}", systems.display()))?;
            let settings_path = dir.join(SETTINGS_FILE);
            let settings = LibrarySettings::load(&settings_path)
                .with_context(|| format!("Failed to load {}", settings_path.display()))?;
            Ok((config, settings))
        }
        None => {
            let config = CatalogConfig::load_default().context("Failed to load systems")?;
            let settings = LibrarySettings::load_default().context("Failed to load settings")?;
            Ok((config, settings))
        }
    }
}

fn summarize(library: &Library, elapsed_ms: u64) -> Summary {
    let systems = library
        .catalogs()
        .iter()
        .map(|catalog| SystemSummary {
            name: catalog.name().to_string(),
            full_name: catalog.full_name().to_string(),
            games: catalog.game_count(),
            gamelist: catalog.store().document_path().to_path_buf(),
        })
        .collect();

    let collections = library
        .collections()
        .instances()
        .iter()
        .filter(|instance| instance.is_populated())
        .map(|instance| CollectionSummary {
            key: instance.key().to_string(),
            name: instance.decl().display_name.clone(),
            custom: instance.is_custom(),
            games: instance.len(),
        })
        .collect();

    let display = library
        .display()
        .iter()
        .map(|entry| library.display_name(*entry))
        .collect();

    Summary {
        systems,
        collections,
        display,
        elapsed_ms,
    }
}
