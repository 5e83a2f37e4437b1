//! Open/create protocol for a tile store.
//!
//! Opening runs through a small state machine:
//!
//! ```text
//! Unopened -> Opening -> CreatingNew     -> Opened
//!                     -> ReadingExisting -> Opened
//!            (any step) -> Failed(status)
//! ```
//!
//! Each transition is a separate function returning a typed result, so the
//! preconditions of each branch can be exercised on their own.

use crate::codec::{CodecRegistry, Compressor, ImageCodec, ZLIB};
use crate::config::StoreConfig;
use crate::connection::{ConnectionHandle, OpenMode};
use crate::error::StatusCode;
use crate::image::{RasterImage, DEFAULT_TILE_SIZE};
use crate::metadata::{self, KEY_BOUNDS, KEY_COMPRESSION, KEY_FORMAT, KEY_PROFILE};
use crate::pipeline::TilePipeline;
use crate::profile::{DataExtent, GeoExtent, Profile, DEFAULT_PROFILE_NAME};
use crate::schema::ensure_schema;
use crate::tiles;
use crate::{Result, StoreError};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Zoom level below which tiles are served as the empty sentinel.
pub const DEFAULT_MIN_LEVEL: u32 = 0;

/// Zoom level above which no tiles are served.
pub const DEFAULT_MAX_LEVEL: u32 = 20;

/// Progress of the open protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    /// Nothing has happened yet.
    Unopened,
    /// Deciding between creating and reading.
    Opening,
    /// Initializing a new file.
    CreatingNew,
    /// Reconciling an existing file with the configuration.
    ReadingExisting,
    /// The store is usable.
    Opened,
    /// Opening failed; terminal.
    Failed(StatusCode),
}

/// Which branch `Opening` selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenPlan {
    /// Writable open of a missing file.
    CreateNew,
    /// Everything else, including read-only opens of missing files.
    ReadExisting,
}

/// Validated inputs for creating a new file.
#[derive(Clone)]
pub struct NewStorePlan {
    /// Profile of the new file.
    pub profile: Profile,
    /// Tile format of the new file.
    pub format: String,
    /// Codec resolved for `format`.
    pub codec: Arc<dyn ImageCodec>,
}

impl std::fmt::Debug for NewStorePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewStorePlan")
            .field("profile", &self.profile)
            .field("format", &self.format)
            .field("codec", &self.codec.name())
            .finish()
    }
}

/// State resolved by either open branch.
#[derive(Debug)]
pub struct StoreLayout {
    /// The open connection.
    pub db: ConnectionHandle,
    /// Effective profile.
    pub profile: Profile,
    /// Effective tile format.
    pub format: String,
    /// Read/write codec chain.
    pub pipeline: TilePipeline,
    /// Coarsest zoom served from the file.
    pub min_level: u32,
    /// Finest zoom served from the file.
    pub max_level: u32,
    /// Declared coverage of the file.
    pub data_extents: Vec<DataExtent>,
}

/// A fully opened store's state.
#[derive(Debug)]
pub struct OpenedStore {
    /// Resolved layout.
    pub layout: StoreLayout,
    /// Tiles must be written without alpha (JPEG-style formats).
    pub requires_rgb: bool,
    /// Sentinel returned below `min_level`.
    pub empty_tile: Arc<RasterImage>,
}

/// Outcome of parsing a `bounds` metadata value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParsedBounds {
    /// Four decimals forming a well-ordered extent.
    Valid(GeoExtent),
    /// Four decimals with reversed ordering.
    Invalid(GeoExtent),
    /// Wrong token count or a token that is not a number.
    Malformed,
}

/// Drives the open protocol for one configuration.
#[derive(Debug)]
pub struct Bootstrap<'a> {
    config: &'a StoreConfig,
    registry: &'a CodecRegistry,
    state: BootstrapState,
}

impl<'a> Bootstrap<'a> {
    /// Prepare to open the store described by `config`.
    pub fn new(config: &'a StoreConfig, registry: &'a CodecRegistry) -> Self {
        Self {
            config,
            registry,
            state: BootstrapState::Unopened,
        }
    }

    /// Current state.
    pub fn state(&self) -> BootstrapState {
        self.state
    }

    fn transition(&mut self, next: BootstrapState) {
        debug!("Bootstrap {:?} -> {:?} ({})", self.state, next, self.config.path.display());
        self.state = next;
    }

    /// Run the protocol to completion.
    ///
    /// On failure the state becomes [`BootstrapState::Failed`] carrying the
    /// error's status code.
    pub fn run(&mut self) -> Result<OpenedStore> {
        match self.run_inner() {
            Ok(opened) => {
                self.transition(BootstrapState::Opened);
                Ok(opened)
            }
            Err(e) => {
                self.transition(BootstrapState::Failed(e.status()));
                Err(e)
            }
        }
    }

    fn run_inner(&mut self) -> Result<OpenedStore> {
        self.transition(BootstrapState::Opening);
        let layout = match plan_open(self.config) {
            OpenPlan::CreateNew => {
                self.transition(BootstrapState::CreatingNew);
                let plan = check_new_store(self.config, self.registry)?;
                info!("Database does not exist; attempting to create it.");
                create_new(self.config, self.registry, plan)?
            }
            OpenPlan::ReadExisting => {
                self.transition(BootstrapState::ReadingExisting);
                read_existing(self.config, self.registry)?
            }
        };
        Ok(finish(layout))
    }
}

/// `Opening`: choose a branch.
pub fn plan_open(config: &StoreConfig) -> OpenPlan {
    if config.open_for_writing && !config.path.exists() {
        OpenPlan::CreateNew
    } else {
        OpenPlan::ReadExisting
    }
}

/// Resolve the caller's profile, if one was given.
///
/// A named profile that is not recognized is a configuration error.
fn caller_profile(config: &StoreConfig) -> Result<Option<Profile>> {
    match &config.profile {
        None => Ok(None),
        Some(descriptor) => Profile::from_descriptor(descriptor).map(Some).ok_or_else(|| {
            StoreError::Configuration(format!("Profile \"{}\" not recognized", descriptor.name))
        }),
    }
}

/// `CreatingNew` preconditions, checked before anything touches the disk.
pub fn check_new_store(config: &StoreConfig, registry: &CodecRegistry) -> Result<NewStorePlan> {
    let profile = caller_profile(config)?.ok_or_else(|| {
        StoreError::Configuration("Cannot create database; required Profile is missing".into())
    })?;

    let format = config.format.clone().ok_or_else(|| {
        StoreError::Configuration("Cannot create database; required format is missing".into())
    })?;

    let codec = registry.codec_for_format(&format)?;

    Ok(NewStorePlan {
        profile,
        format,
        codec,
    })
}

/// `CreatingNew`: create the file and write its initial metadata.
///
/// If initialization fails after the file was created, the partial file is
/// removed so the next open starts from scratch.
pub fn create_new(config: &StoreConfig, registry: &CodecRegistry, plan: NewStorePlan) -> Result<StoreLayout> {
    let existed = config.path.exists();
    let db = ConnectionHandle::open(&config.path, OpenMode::Create)?;
    match initialize_new(db, config, registry, plan) {
        Ok(layout) => Ok(layout),
        Err(e) => {
            if !existed {
                if let Err(remove_err) = std::fs::remove_file(&config.path) {
                    warn!(
                        "Failed to remove partial database {}: {}",
                        config.path.display(),
                        remove_err
                    );
                }
            }
            Err(e)
        }
    }
}

fn initialize_new(
    db: ConnectionHandle,
    config: &StoreConfig,
    registry: &CodecRegistry,
    plan: NewStorePlan,
) -> Result<StoreLayout> {
    ensure_schema(&db)?;

    let profile_json = plan
        .profile
        .to_json()
        .map_err(|e| StoreError::Configuration(format!("Cannot serialize profile: {}", e)))?;
    metadata::put_metadata(&db, KEY_PROFILE, &profile_json)?;
    metadata::put_metadata(&db, KEY_FORMAT, &plan.format)?;

    let mut compressor: Option<Arc<dyn Compressor>> = None;
    if config.compress {
        match registry.compressor(ZLIB) {
            Ok(zlib) => {
                metadata::put_metadata(&db, KEY_COMPRESSION, zlib.name())?;
                info!("Data will be compressed ({})", zlib.name());
                compressor = Some(zlib);
            }
            Err(e) => warn!("{}; data will not be compressed", e),
        }
    }

    let data_extents = if let Some((first, rest)) = config.data_extents.split_first() {
        let mut union = first.extent;
        for extent in rest {
            union.expand_to_include(&extent.extent);
        }
        metadata::put_metadata(&db, KEY_BOUNDS, &union.to_bounds_string())?;
        config.data_extents.clone()
    } else {
        vec![DataExtent::new(plan.profile.extent(), 0, DEFAULT_MAX_LEVEL)]
    };

    Ok(StoreLayout {
        db,
        profile: plan.profile,
        format: plan.format,
        pipeline: TilePipeline::new(Some(plan.codec), compressor, config.coverage),
        min_level: DEFAULT_MIN_LEVEL,
        max_level: DEFAULT_MAX_LEVEL,
        data_extents,
    })
}

/// Read a metadata key, treating a failing query like an absent key.
fn read_key(db: &ConnectionHandle, key: &str) -> Option<String> {
    match metadata::get_metadata(db, key) {
        Ok(value) => value.filter(|v| !v.is_empty()),
        Err(e) => {
            warn!("Failed to read metadata \"{}\": {}", key, e);
            None
        }
    }
}

/// `ReadingExisting`: open the file and reconcile it with the configuration.
pub fn read_existing(config: &StoreConfig, registry: &CodecRegistry) -> Result<StoreLayout> {
    let mode = if config.open_for_writing {
        OpenMode::ReadWrite
    } else {
        OpenMode::ReadOnly
    };
    let db = ConnectionHandle::open(&config.path, mode)?;

    let (mut min_level, mut max_level) = (DEFAULT_MIN_LEVEL, DEFAULT_MAX_LEVEL);
    if config.compute_levels {
        match tiles::compute_levels(&db) {
            Ok(Some((min, max))) => {
                min_level = min;
                max_level = max;
            }
            Ok(None) => debug!("No tiles; keeping default levels"),
            Err(e) => warn!("Failed to compute levels: {}", e),
        }
    }

    let profile = match caller_profile(config)? {
        Some(profile) => profile,
        None => {
            let stored = read_key(&db, KEY_PROFILE).unwrap_or_default();
            let profile = Profile::parse(&stored).unwrap_or_else(|| {
                warn!(
                    "Profile \"{}\" not recognized; defaulting to {}",
                    stored, DEFAULT_PROFILE_NAME
                );
                Profile::default()
            });
            info!("Profile = {}", profile);
            profile
        }
    };

    // The stored format supersedes the configured one.
    let format = read_key(&db, KEY_FORMAT)
        .or_else(|| config.format.clone())
        .ok_or_else(|| {
            StoreError::Configuration(
                "Required format not in metadata, nor specified in the options.".into(),
            )
        })?;
    // Undecodable formats still allow raw tile and metadata access.
    let codec = match registry.codec_for_format(&format) {
        Ok(codec) => Some(codec),
        Err(e) => {
            warn!("{}; tiles will not be decoded", e);
            None
        }
    };

    let compressor = match read_key(&db, KEY_COMPRESSION) {
        Some(name) => {
            let compressor = registry.compressor(&name)?;
            info!("Data is compressed ({})", name);
            Some(compressor)
        }
        None => None,
    };

    // Coverage always starts at zoom 0 so consumers subdivide from the top.
    let full = DataExtent::new(profile.extent(), 0, max_level);
    let data_extents = match read_key(&db, KEY_BOUNDS) {
        Some(bounds) => match parse_bounds(&bounds) {
            ParsedBounds::Valid(extent) => {
                info!("Bounds = {}", extent);
                vec![DataExtent::new(extent, 0, max_level)]
            }
            ParsedBounds::Invalid(extent) => {
                warn!("MBTiles has invalid bounds {}", extent);
                vec![full]
            }
            ParsedBounds::Malformed => {
                warn!("MBTiles has malformed bounds \"{}\"", bounds);
                vec![full]
            }
        },
        None => vec![full],
    };

    Ok(StoreLayout {
        db,
        profile,
        format,
        pipeline: TilePipeline::new(codec, compressor, config.coverage),
        min_level,
        max_level,
        data_extents,
    })
}

/// Parse `minLon,minLat,maxLon,maxLat`.
pub fn parse_bounds(value: &str) -> ParsedBounds {
    let tokens: Vec<&str> = value
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.len() != 4 {
        return ParsedBounds::Malformed;
    }

    let mut coords = [0.0f64; 4];
    for (slot, token) in coords.iter_mut().zip(&tokens) {
        match token.parse::<f64>() {
            Ok(v) => *slot = v,
            Err(_) => return ParsedBounds::Malformed,
        }
    }

    let extent = GeoExtent::geographic(coords[0], coords[1], coords[2], coords[3]);
    if extent.is_valid() {
        ParsedBounds::Valid(extent)
    } else {
        ParsedBounds::Invalid(extent)
    }
}

/// Whether a format needs three-channel tiles (lossy photo formats).
pub fn requires_rgb(format: &str) -> bool {
    let lower = format.to_ascii_lowercase();
    lower.ends_with("jpg") || lower.ends_with("jpeg")
}

/// Common conclusion of both branches.
pub fn finish(layout: StoreLayout) -> OpenedStore {
    let requires_rgb = requires_rgb(&layout.format);
    OpenedStore {
        layout,
        requires_rgb,
        empty_tile: Arc::new(RasterImage::transparent(DEFAULT_TILE_SIZE)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Srs;

    fn registry() -> CodecRegistry {
        CodecRegistry::with_defaults()
    }

    #[test]
    fn test_parse_bounds() {
        assert_eq!(
            parse_bounds("-10,5,10,25"),
            ParsedBounds::Valid(GeoExtent::geographic(-10.0, 5.0, 10.0, 25.0))
        );
        assert_eq!(
            parse_bounds(" -10.5, 5 ,10,25 "),
            ParsedBounds::Valid(GeoExtent::geographic(-10.5, 5.0, 10.0, 25.0))
        );
        assert_eq!(parse_bounds("1,2,3"), ParsedBounds::Malformed);
        assert_eq!(parse_bounds("1,2,3,4,5"), ParsedBounds::Malformed);
        assert_eq!(parse_bounds("a,b,c,d"), ParsedBounds::Malformed);
        assert!(matches!(parse_bounds("10,5,-10,25"), ParsedBounds::Invalid(_)));
    }

    #[test]
    fn test_requires_rgb() {
        assert!(requires_rgb("jpg"));
        assert!(requires_rgb("image/JPEG"));
        assert!(!requires_rgb("png"));
        assert!(!requires_rgb("image/tiff"));
    }

    #[test]
    fn test_plan_open() {
        let dir = tempfile::tempdir().unwrap();
        let missing = StoreConfig::new(dir.path().join("a.mbtiles"));
        assert_eq!(plan_open(&missing), OpenPlan::ReadExisting);
        assert_eq!(plan_open(&missing.clone().for_writing()), OpenPlan::CreateNew);

        let existing = dir.path().join("b.mbtiles");
        std::fs::write(&existing, b"").unwrap();
        assert_eq!(plan_open(&StoreConfig::new(existing).for_writing()), OpenPlan::ReadExisting);
    }

    #[test]
    fn test_new_store_preconditions() {
        let base = StoreConfig::new("unused.mbtiles").for_writing();

        let err = check_new_store(&base.clone().with_format("tif"), &registry()).unwrap_err();
        assert_eq!(err.status(), StatusCode::ConfigurationError);

        let err = check_new_store(&base.clone().with_profile("global-geodetic"), &registry()).unwrap_err();
        assert_eq!(err.status(), StatusCode::ConfigurationError);

        let err = check_new_store(
            &base.clone().with_profile("global-geodetic").with_format("webp"),
            &registry(),
        )
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::ServiceUnavailable);

        let err = check_new_store(&base.clone().with_profile("lunar").with_format("tif"), &registry())
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::ConfigurationError);

        let plan = check_new_store(&base.with_profile("global-geodetic").with_format("tif"), &registry())
            .unwrap();
        assert_eq!(plan.profile, Profile::global_geodetic());
        assert_eq!(plan.codec.name(), "tiff");
    }

    #[test]
    fn test_failed_state_carries_status() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(dir.path().join("new.mbtiles"))
            .for_writing()
            .with_format("tif");
        let registry = registry();
        let mut bootstrap = Bootstrap::new(&config, &registry);
        assert_eq!(bootstrap.state(), BootstrapState::Unopened);
        assert!(bootstrap.run().is_err());
        assert_eq!(
            bootstrap.state(),
            BootstrapState::Failed(StatusCode::ConfigurationError)
        );
        // Nothing was written before the precondition check failed.
        assert!(!config.path.exists());
    }

    #[test]
    fn test_create_writes_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(dir.path().join("new.mbtiles"))
            .for_writing()
            .with_profile("global-geodetic")
            .with_format("tif")
            .with_compress(true)
            .with_data_extent(DataExtent::new(GeoExtent::geographic(-10.0, 5.0, 0.0, 10.0), 0, 5))
            .with_data_extent(DataExtent::new(GeoExtent::geographic(0.0, 0.0, 10.0, 25.0), 2, 8));
        let registry = registry();

        let mut bootstrap = Bootstrap::new(&config, &registry);
        let opened = bootstrap.run().unwrap();
        assert_eq!(bootstrap.state(), BootstrapState::Opened);

        let db = &opened.layout.db;
        assert_eq!(
            metadata::get_metadata(db, KEY_PROFILE).unwrap().as_deref(),
            Some(r#"{"name":"global-geodetic"}"#)
        );
        assert_eq!(metadata::get_metadata(db, KEY_FORMAT).unwrap().as_deref(), Some("tif"));
        assert_eq!(metadata::get_metadata(db, KEY_COMPRESSION).unwrap().as_deref(), Some("zlib"));
        assert_eq!(
            metadata::get_metadata(db, KEY_BOUNDS).unwrap().as_deref(),
            Some("-10,0,10,25")
        );
        assert!(opened.layout.pipeline.compressor().is_some());
        assert!(!opened.requires_rgb);
        assert_eq!(opened.empty_tile.width(), DEFAULT_TILE_SIZE);
    }

    #[test]
    fn test_read_existing_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bare.mbtiles");
        {
            let db = ConnectionHandle::open(&path, OpenMode::Create).unwrap();
            ensure_schema(&db).unwrap();
            metadata::put_metadata(&db, KEY_FORMAT, "image/tiff").unwrap();
            metadata::put_metadata(&db, KEY_PROFILE, "{not json").unwrap();
        }

        let layout = read_existing(&StoreConfig::new(&path), &registry()).unwrap();
        assert_eq!(layout.profile, Profile::spherical_mercator());
        assert_eq!(layout.format, "image/tiff");
        assert_eq!((layout.min_level, layout.max_level), (0, 20));
        assert_eq!(layout.data_extents.len(), 1);
        assert_eq!(layout.data_extents[0].extent.srs, Srs::SphericalMercator);
        assert_eq!(layout.data_extents[0].max_level, 20);
        assert!(layout.pipeline.compressor().is_none());
    }

    #[test]
    fn test_read_existing_format_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noformat.mbtiles");
        {
            let db = ConnectionHandle::open(&path, OpenMode::Create).unwrap();
            ensure_schema(&db).unwrap();
        }

        let err = read_existing(&StoreConfig::new(&path), &registry()).unwrap_err();
        assert_eq!(err.status(), StatusCode::ConfigurationError);

        let layout = read_existing(&StoreConfig::new(&path).with_format("tif"), &registry()).unwrap();
        assert_eq!(layout.format, "tif");
    }

    fn existing_store(dir: &tempfile::TempDir, name: &str, entries: &[(&str, &str)]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let db = ConnectionHandle::open(&path, OpenMode::Create).unwrap();
        ensure_schema(&db).unwrap();
        for (key, value) in entries {
            metadata::put_metadata(&db, key, value).unwrap();
        }
        path
    }

    #[test]
    fn test_read_existing_caller_profile_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = existing_store(
            &dir,
            "geo.mbtiles",
            &[(KEY_FORMAT, "tif"), (KEY_PROFILE, r#"{"name":"global-geodetic"}"#)],
        );

        let stored = read_existing(&StoreConfig::new(&path), &registry()).unwrap();
        assert_eq!(stored.profile, Profile::global_geodetic());

        let config = StoreConfig::new(&path).with_profile("spherical-mercator");
        let layout = read_existing(&config, &registry()).unwrap();
        assert_eq!(layout.profile, Profile::spherical_mercator());
        assert_eq!(layout.data_extents[0].extent, Profile::spherical_mercator().extent());
    }

    #[test]
    fn test_read_existing_bare_profile_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = existing_store(&dir, "bare.mbtiles", &[(KEY_FORMAT, "tif"), (KEY_PROFILE, "EPSG:4326")]);

        let layout = read_existing(&StoreConfig::new(&path), &registry()).unwrap();
        assert_eq!(layout.profile, Profile::global_geodetic());
        assert_eq!(layout.data_extents[0].extent.srs, Srs::Geographic);
    }

    #[test]
    fn test_read_existing_without_codec() {
        let dir = tempfile::tempdir().unwrap();
        let path = existing_store(&dir, "png.mbtiles", &[(KEY_FORMAT, "png")]);

        let layout = read_existing(&StoreConfig::new(&path), &registry()).unwrap();
        assert_eq!(layout.format, "png");
        assert!(layout.pipeline.codec().is_none());
    }

    #[test]
    fn test_failed_create_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mbtiles");
        // The rollback journal cannot be created, so the first write fails.
        std::fs::create_dir(dir.path().join("broken.mbtiles-journal")).unwrap();

        let config = StoreConfig::new(&path)
            .for_writing()
            .with_profile("global-geodetic")
            .with_format("tif");
        let registry = registry();
        let mut bootstrap = Bootstrap::new(&config, &registry);
        assert!(bootstrap.run().is_err());
        assert_eq!(bootstrap.state(), BootstrapState::Failed(StatusCode::GeneralError));
        assert!(!path.exists());
    }

    #[test]
    fn test_read_existing_unknown_compressor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lz.mbtiles");
        {
            let db = ConnectionHandle::open(&path, OpenMode::Create).unwrap();
            ensure_schema(&db).unwrap();
            metadata::put_metadata(&db, KEY_FORMAT, "tif").unwrap();
            metadata::put_metadata(&db, KEY_COMPRESSION, "lz4").unwrap();
        }
        let err = read_existing(&StoreConfig::new(&path), &registry()).unwrap_err();
        assert_eq!(err.status(), StatusCode::ServiceUnavailable);
    }
}
