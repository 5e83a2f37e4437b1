//! `mbtiles` command line tool.
//!
//! Inspects, reads and writes MBTiles stores and queries elevation tiles.
//! Logging is controlled with `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use mbtiles_elevation::{ElevationError, ElevationStore};
use mbtiles_store::{CodecRegistry, MbTilesStore, StoreConfig, StoreError, TileKey};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mbtiles")]
#[command(about = "Inspect and edit MBTiles tile stores")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show profile, format, levels and metadata of a store
    Info {
        /// MBTiles file
        path: PathBuf,
    },
    /// Read one tile
    Get {
        /// MBTiles file
        path: PathBuf,
        /// Zoom level
        z: u32,
        /// Column
        x: u32,
        /// Row (0 = north)
        y: u32,
        /// Write the stored payload to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Store a pre-encoded tile payload
    Put {
        /// MBTiles file
        path: PathBuf,
        /// Zoom level
        z: u32,
        /// Column
        x: u32,
        /// Row (0 = north)
        y: u32,
        /// File holding the encoded payload
        file: PathBuf,
    },
    /// Create a new store from a YAML configuration
    Create {
        /// YAML file with the store configuration
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Read an elevation tile and optionally sample it
    Elevation {
        /// MBTiles file
        path: PathBuf,
        /// Zoom level
        z: u32,
        /// Column
        x: u32,
        /// Row (0 = north)
        y: u32,
        /// X coordinate (longitude for geodetic stores)
        #[arg(long, requires = "lat")]
        lon: Option<f64>,
        /// Y coordinate (latitude for geodetic stores)
        #[arg(long, requires = "lon")]
        lat: Option<f64>,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Elevation(#[from] ElevationError),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration {}: {source}", path.display())]
    Config {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("No tile at {0}")]
    TileNotFound(TileKey),
}

type Result<T> = std::result::Result<T, CliError>;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let Cli { command } = Cli::parse();
    match run(command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    let registry = CodecRegistry::with_defaults();
    match command {
        Commands::Info { path } => info_command(&path, &registry),
        Commands::Get { path, z, x, y, output } => {
            get_command(&path, TileKey::new(z, x, y), output.as_deref(), &registry)
        }
        Commands::Put { path, z, x, y, file } => put_command(&path, TileKey::new(z, x, y), &file, &registry),
        Commands::Create { config } => create_command(&config, &registry),
        Commands::Elevation { path, z, x, y, lon, lat } => {
            elevation_command(&path, TileKey::new(z, x, y), lon.zip(lat), &registry)
        }
    }
}

fn info_command(path: &Path, registry: &CodecRegistry) -> Result<()> {
    let store = MbTilesStore::open(&StoreConfig::new(path).with_compute_levels(true), registry)?;

    println!("File:        {}", store.path().display());
    println!("Profile:     {}", store.profile().name());
    println!("Format:      {}", store.format());
    println!("Compression: {}", store.compression().unwrap_or("none"));
    println!("Levels:      {}-{}", store.min_level(), store.max_level());
    println!("Tiles:       {}", store.tile_count()?);
    for extent in store.data_extents() {
        println!(
            "Bounds:      {} (levels {}-{})",
            extent.extent, extent.min_level, extent.max_level
        );
    }

    println!();
    for (name, value) in store.list_metadata()? {
        println!("{:<12} {}", name, value);
    }
    Ok(())
}

fn get_command(path: &Path, key: TileKey, output: Option<&Path>, registry: &CodecRegistry) -> Result<()> {
    let store = MbTilesStore::open(&StoreConfig::new(path), registry)?;

    if let Some(output) = output {
        let data = store.get_tile(&key)?.ok_or(CliError::TileNotFound(key))?;
        std::fs::write(output, &data).map_err(|source| CliError::Io {
            path: output.to_path_buf(),
            source,
        })?;
        info!("Wrote {} bytes to {}", data.len(), output.display());
        return Ok(());
    }

    let tile = store.fetch_tile(&key).ok_or(CliError::TileNotFound(key))?;
    println!(
        "{}: {}x{} {:?} covering {}",
        key,
        tile.image.width(),
        tile.image.height(),
        tile.image.format(),
        tile.extent
    );
    Ok(())
}

fn put_command(path: &Path, key: TileKey, file: &Path, registry: &CodecRegistry) -> Result<()> {
    let data = std::fs::read(file).map_err(|source| CliError::Io {
        path: file.to_path_buf(),
        source,
    })?;
    let store = MbTilesStore::open(&StoreConfig::new(path).for_writing(), registry)?;
    store.put_tile(&key, &data)?;
    info!("Stored {} bytes at {}", data.len(), key);
    Ok(())
}

fn create_command(config_path: &Path, registry: &CodecRegistry) -> Result<()> {
    let config = load_config(config_path)?.for_writing();
    let store = MbTilesStore::open(&config, registry)?;
    println!(
        "Created {} ({}, {})",
        store.path().display(),
        store.profile().name(),
        store.format()
    );
    Ok(())
}

fn elevation_command(
    path: &Path,
    key: TileKey,
    point: Option<(f64, f64)>,
    registry: &CodecRegistry,
) -> Result<()> {
    let config = StoreConfig::new(path).with_coverage(true);
    let dem = ElevationStore::open_default(&config, registry)?;
    let field = dem.get_elevation(&key).ok_or(CliError::TileNotFound(key))?;

    let (width, height) = field.heightfield().dimensions();
    let (min, max) = field
        .heightfield()
        .data()
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let (dx, dy) = field.resolution();
    println!("{}: {}x{} samples covering {}", key, width, height, field.extent());
    println!("Spacing: {} x {}", dx, dy);
    println!("Range: {:.2} to {:.2}", min, max);

    if let Some((x, y)) = point {
        println!("Elevation at ({}, {}): {:.2}", x, y, field.elevation_at(x, y)?);
    }
    Ok(())
}

/// Read a store configuration from a YAML file.
fn load_config(path: &Path) -> Result<StoreConfig> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(|source| CliError::Config {
        path: path.to_path_buf(),
        source,
    })
}
