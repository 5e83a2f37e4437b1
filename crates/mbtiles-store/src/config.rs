//! Caller-supplied store configuration.

use crate::profile::{DataExtent, ProfileDescriptor};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Options for opening or creating a tile store.
///
/// Usually deserialized from YAML:
///
/// ```yaml
/// path: world.mbtiles
/// format: tif
/// compress: true
/// open_for_writing: true
/// profile:
///   name: global-geodetic
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the MBTiles file.
    pub path: PathBuf,
    /// Tile format (MIME type or extension). Required when creating; the
    /// stored value wins for existing files.
    pub format: Option<String>,
    /// Compress payloads with zlib when creating a new file.
    pub compress: bool,
    /// Scan the tile table for min/max zoom when opening an existing file.
    pub compute_levels: bool,
    /// Open read-write, creating the file if it does not exist.
    pub open_for_writing: bool,
    /// Tiles hold raw samples (e.g. elevation) rather than colors.
    pub coverage: bool,
    /// Profile to use. Required when creating; overrides the stored profile
    /// for existing files.
    pub profile: Option<ProfileDescriptor>,
    /// Regions known to hold data, written as `bounds` when creating.
    pub data_extents: Vec<DataExtent>,
}

impl StoreConfig {
    /// Configuration for the file at `path`, everything else defaulted.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Set the tile format.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Set the profile by name.
    pub fn with_profile(mut self, name: impl Into<String>) -> Self {
        self.profile = Some(ProfileDescriptor::new(name));
        self
    }

    /// Enable or disable zlib compression for new files.
    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Enable or disable the zoom level scan on open.
    pub fn with_compute_levels(mut self, compute: bool) -> Self {
        self.compute_levels = compute;
        self
    }

    /// Open read-write, creating the file if needed.
    pub fn for_writing(mut self) -> Self {
        self.open_for_writing = true;
        self
    }

    /// Mark tiles as raw coverage samples.
    pub fn with_coverage(mut self, coverage: bool) -> Self {
        self.coverage = coverage;
        self
    }

    /// Add a known data extent.
    pub fn with_data_extent(mut self, extent: DataExtent) -> Self {
        self.data_extents.push(extent);
        self
    }
}
