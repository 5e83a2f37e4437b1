//! Tiling profiles, tile keys and geographic extents.
//!
//! A [`Profile`] pairs a spatial reference with a tiling scheme. The scheme
//! decides how many tile columns and rows exist at each zoom level, which is
//! what the row-flip transform in [`crate::tiles`] needs.
//!
//! ## Tile Coordinate System
//!
//! Callers address tiles with the row origin at the north edge:
//! - `x` is the column, 0 at the western edge, increasing eastward
//! - `y` is the row, 0 at the northern edge, increasing southward
//!
//! The MBTiles file itself numbers rows from the south edge (TMS); the store
//! converts between the two on every access.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// WGS84 semi-major axis used by spherical mercator (meters).
const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Half the width of the spherical mercator world (meters).
pub const MERCATOR_HALF_WORLD: f64 = PI * EARTH_RADIUS_M;

/// Profile used when a stored profile descriptor cannot be understood.
pub const DEFAULT_PROFILE_NAME: &str = "spherical-mercator";

/// Spatial reference of an extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Srs {
    /// Geographic longitude/latitude in decimal degrees (WGS84).
    Geographic,
    /// Spherical mercator in meters (EPSG:3857).
    SphericalMercator,
}

/// Rectangular extent in a given spatial reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoExtent {
    /// Spatial reference of the coordinates.
    pub srs: Srs,
    /// Western edge.
    pub xmin: f64,
    /// Southern edge.
    pub ymin: f64,
    /// Eastern edge.
    pub xmax: f64,
    /// Northern edge.
    pub ymax: f64,
}

impl GeoExtent {
    /// Create a new extent.
    pub fn new(srs: Srs, xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            srs,
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Create a geographic extent from degrees.
    pub fn geographic(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self::new(Srs::Geographic, min_lon, min_lat, max_lon, max_lat)
    }

    /// An extent is valid when its coordinates are finite and not reversed.
    pub fn is_valid(&self) -> bool {
        [self.xmin, self.ymin, self.xmax, self.ymax]
            .iter()
            .all(|v| v.is_finite())
            && self.xmin <= self.xmax
            && self.ymin <= self.ymax
    }

    /// Width in the extent's units.
    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    /// Height in the extent's units.
    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    /// Check if a point is within the extent (edges inclusive).
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.xmin && x <= self.xmax && y >= self.ymin && y <= self.ymax
    }

    /// Grow this extent to cover `other`.
    ///
    /// Both extents are brought into geographic coordinates first when their
    /// spatial references differ.
    pub fn expand_to_include(&mut self, other: &GeoExtent) {
        let other = if other.srs == self.srs {
            *other
        } else {
            *self = self.to_geographic();
            other.to_geographic()
        };
        self.xmin = self.xmin.min(other.xmin);
        self.ymin = self.ymin.min(other.ymin);
        self.xmax = self.xmax.max(other.xmax);
        self.ymax = self.ymax.max(other.ymax);
    }

    /// Reproject this extent to geographic coordinates.
    pub fn to_geographic(&self) -> GeoExtent {
        match self.srs {
            Srs::Geographic => *self,
            Srs::SphericalMercator => {
                let (min_lon, min_lat) = mercator_to_lon_lat(self.xmin, self.ymin);
                let (max_lon, max_lat) = mercator_to_lon_lat(self.xmax, self.ymax);
                GeoExtent::geographic(min_lon, min_lat, max_lon, max_lat)
            }
        }
    }

    /// Format as the MBTiles `bounds` metadata value: `minLon,minLat,maxLon,maxLat`.
    pub fn to_bounds_string(&self) -> String {
        let g = self.to_geographic();
        format!("{},{},{},{}", g.xmin, g.ymin, g.xmax, g.ymax)
    }
}

impl fmt::Display for GeoExtent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} [{}, {}, {}, {}]",
            self.srs, self.xmin, self.ymin, self.xmax, self.ymax
        )
    }
}

/// Convert spherical mercator meters to longitude/latitude degrees.
fn mercator_to_lon_lat(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS_M).to_degrees();
    let lat = (y / EARTH_RADIUS_M).sinh().atan().to_degrees();
    (lon, lat)
}

/// A region where data is known to exist, with the zoom range it covers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataExtent {
    /// Covered region.
    pub extent: GeoExtent,
    /// Coarsest zoom level with data.
    pub min_level: u32,
    /// Finest zoom level with data.
    pub max_level: u32,
}

impl DataExtent {
    /// Create a new data extent.
    pub fn new(extent: GeoExtent, min_level: u32, max_level: u32) -> Self {
        Self {
            extent,
            min_level,
            max_level,
        }
    }
}

/// Tile address in the caller's convention (row 0 at the north edge).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    /// Zoom level.
    pub z: u32,
    /// Column, 0 at the western edge.
    pub x: u32,
    /// Row, 0 at the northern edge.
    pub y: u32,
}

impl TileKey {
    /// Create a new tile key.
    pub fn new(z: u32, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Tiling scheme of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ProfileKind {
    /// Plate carrée, two tiles wide and one tall at zoom 0.
    GlobalGeodetic,
    /// Web mercator, one tile at zoom 0.
    SphericalMercator,
}

/// Serialized form of a profile, stored under the `profile` metadata key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDescriptor {
    /// Well-known profile name.
    pub name: String,
}

impl ProfileDescriptor {
    /// Create a descriptor for a named profile.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Spatial reference plus tiling scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Profile {
    kind: ProfileKind,
}

impl Profile {
    /// The global geodetic (EPSG:4326) profile.
    pub fn global_geodetic() -> Self {
        Self {
            kind: ProfileKind::GlobalGeodetic,
        }
    }

    /// The spherical mercator (EPSG:3857) profile.
    pub fn spherical_mercator() -> Self {
        Self {
            kind: ProfileKind::SphericalMercator,
        }
    }

    /// Resolve a well-known profile name or alias.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "global-geodetic" | "geodetic" | "wgs84" | "epsg:4326" => Some(Self::global_geodetic()),
            "spherical-mercator" | "mercator" | "global-mercator" | "epsg:3857"
            | "epsg:900913" => Some(Self::spherical_mercator()),
            _ => None,
        }
    }

    /// Resolve a profile descriptor.
    pub fn from_descriptor(descriptor: &ProfileDescriptor) -> Option<Self> {
        Self::from_name(&descriptor.name)
    }

    /// Parse a stored profile value: a JSON descriptor first, then a bare name.
    pub fn parse(stored: &str) -> Option<Self> {
        serde_json::from_str::<ProfileDescriptor>(stored)
            .ok()
            .and_then(|d| Self::from_descriptor(&d))
            .or_else(|| Self::from_name(stored))
    }

    /// Canonical name of this profile.
    pub fn name(&self) -> &'static str {
        match self.kind {
            ProfileKind::GlobalGeodetic => "global-geodetic",
            ProfileKind::SphericalMercator => "spherical-mercator",
        }
    }

    /// Descriptor for storing this profile in metadata.
    pub fn descriptor(&self) -> ProfileDescriptor {
        ProfileDescriptor::new(self.name())
    }

    /// JSON form of the descriptor.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.descriptor())
    }

    /// Spatial reference of the profile extent.
    pub fn srs(&self) -> Srs {
        match self.kind {
            ProfileKind::GlobalGeodetic => Srs::Geographic,
            ProfileKind::SphericalMercator => Srs::SphericalMercator,
        }
    }

    /// Full extent covered by the profile.
    pub fn extent(&self) -> GeoExtent {
        match self.kind {
            ProfileKind::GlobalGeodetic => GeoExtent::new(self.srs(), -180.0, -90.0, 180.0, 90.0),
            ProfileKind::SphericalMercator => GeoExtent::new(
                self.srs(),
                -MERCATOR_HALF_WORLD,
                -MERCATOR_HALF_WORLD,
                MERCATOR_HALF_WORLD,
                MERCATOR_HALF_WORLD,
            ),
        }
    }

    /// Number of tile (columns, rows) at a zoom level.
    ///
    /// Counts saturate at `u32::MAX` for zoom levels too deep to address.
    pub fn num_tiles(&self, zoom: u32) -> (u32, u32) {
        let (cols0, rows0) = match self.kind {
            ProfileKind::GlobalGeodetic => (2u64, 1u64),
            ProfileKind::SphericalMercator => (1u64, 1u64),
        };
        (scale_count(cols0, zoom), scale_count(rows0, zoom))
    }

    /// Extent of a single tile, in the profile's spatial reference.
    pub fn tile_extent(&self, key: &TileKey) -> GeoExtent {
        let (cols, rows) = self.num_tiles(key.z);
        let full = self.extent();
        let tile_w = full.width() / cols as f64;
        let tile_h = full.height() / rows as f64;

        let xmin = full.xmin + key.x as f64 * tile_w;
        let ymax = full.ymax - key.y as f64 * tile_h;
        GeoExtent::new(full.srs, xmin, ymax - tile_h, xmin + tile_w, ymax)
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::spherical_mercator()
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Multiply a zoom-0 tile count by `2^zoom`, saturating at `u32::MAX`.
fn scale_count(base: u64, zoom: u32) -> u32 {
    if zoom >= 32 {
        return u32::MAX;
    }
    u32::try_from(base << zoom).unwrap_or(u32::MAX)
}
