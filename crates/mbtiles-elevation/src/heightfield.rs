//! Heightfields and the image-to-heightfield conversion.

use crate::{ElevationError, Result};
use mbtiles_store::{GeoExtent, RasterImage};

/// A grid of elevation samples.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightField {
    /// Elevation data in row-major order (north to south, west to east).
    data: Vec<f32>,
    /// Number of columns.
    width: u32,
    /// Number of rows.
    height: u32,
    /// Samples equal to this value are treated as missing.
    no_data_value: Option<f32>,
}

impl HeightField {
    /// Create a heightfield from row-major samples.
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Result<Self> {
        if width == 0 || height == 0 || data.len() != width as usize * height as usize {
            return Err(ElevationError::Conversion(format!(
                "{}x{} heightfield cannot hold {} samples",
                width,
                height,
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            no_data_value: None,
        })
    }

    /// Set the sample value that marks missing data.
    pub fn with_no_data_value(mut self, value: Option<f32>) -> Self {
        self.no_data_value = value;
        self
    }

    /// Get the dimensions in samples.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Raw samples.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// The no-data marker, if any.
    pub fn no_data_value(&self) -> Option<f32> {
        self.no_data_value
    }

    /// Sample at a grid position, or `None` for positions outside the grid
    /// and for no-data samples.
    pub fn get(&self, col: u32, row: u32) -> Option<f32> {
        if col >= self.width || row >= self.height {
            return None;
        }
        let value = self.data[(row * self.width + col) as usize];
        match self.no_data_value {
            Some(nodata) if (value - nodata).abs() < 0.001 => None,
            _ => Some(value),
        }
    }
}

/// A heightfield with the extent it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoHeightField {
    heightfield: HeightField,
    extent: GeoExtent,
}

impl GeoHeightField {
    /// Attach an extent to a heightfield.
    pub fn new(heightfield: HeightField, extent: GeoExtent) -> Self {
        Self {
            heightfield,
            extent,
        }
    }

    /// The samples.
    pub fn heightfield(&self) -> &HeightField {
        &self.heightfield
    }

    /// The covered extent.
    pub fn extent(&self) -> &GeoExtent {
        &self.extent
    }

    /// Get the elevation at a point in the extent's spatial reference.
    ///
    /// Uses bilinear interpolation between the four nearest samples. Sample
    /// centers on the edges of the grid coincide with the edges of the
    /// extent.
    pub fn elevation_at(&self, x: f64, y: f64) -> Result<f32> {
        let (gx, gy) = self.grid_position(x, y)?;
        let (width, height) = self.heightfield.dimensions();

        let x0 = gx.floor() as u32;
        let y0 = gy.floor() as u32;
        let x1 = (x0 + 1).min(width - 1);
        let y1 = (y0 + 1).min(height - 1);

        let fx = gx - x0 as f64;
        let fy = gy - y0 as f64;

        let sample = |c, r| {
            self.heightfield
                .get(c, r)
                .map(f64::from)
                .ok_or(ElevationError::NoData { x, y })
        };
        let v00 = sample(x0, y0)?;
        let v10 = sample(x1, y0)?;
        let v01 = sample(x0, y1)?;
        let v11 = sample(x1, y1)?;

        let elevation = v00 * (1.0 - fx) * (1.0 - fy)
            + v10 * fx * (1.0 - fy)
            + v01 * (1.0 - fx) * fy
            + v11 * fx * fy;

        Ok(elevation as f32)
    }

    /// Get the elevation of the nearest sample (no interpolation).
    pub fn elevation_nearest(&self, x: f64, y: f64) -> Result<f32> {
        let (gx, gy) = self.grid_position(x, y)?;
        self.heightfield
            .get(gx.round() as u32, gy.round() as u32)
            .ok_or(ElevationError::NoData { x, y })
    }

    /// Size of one sample step in extent units (x, y).
    pub fn resolution(&self) -> (f64, f64) {
        let (width, height) = self.heightfield.dimensions();
        (
            self.extent.width() / (width.max(2) - 1) as f64,
            self.extent.height() / (height.max(2) - 1) as f64,
        )
    }

    /// Fractional grid position of a point; row 0 is the northern edge.
    fn grid_position(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let e = &self.extent;
        if !e.contains(x, y) {
            return Err(ElevationError::OutOfBounds {
                x,
                y,
                xmin: e.xmin,
                xmax: e.xmax,
                ymin: e.ymin,
                ymax: e.ymax,
            });
        }
        let (width, height) = self.heightfield.dimensions();
        let gx = ((x - e.xmin) / e.width()) * (width - 1) as f64;
        let gy = ((e.ymax - y) / e.height()) * (height - 1) as f64;
        Ok((gx, gy))
    }
}

/// Turns a decoded tile image into a heightfield.
pub trait HeightFieldConverter: Send + Sync {
    /// Convert one image.
    fn convert(&self, image: &RasterImage) -> Result<HeightField>;
}

impl<F> HeightFieldConverter for F
where
    F: Fn(&RasterImage) -> Result<HeightField> + Send + Sync,
{
    fn convert(&self, image: &RasterImage) -> Result<HeightField> {
        self(image)
    }
}

/// Default converter: the first channel of every pixel is the height.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageToHeightField {
    /// Sample value to treat as missing data.
    pub no_data_value: Option<f32>,
}

impl ImageToHeightField {
    /// Converter that marks `value` as missing data.
    pub fn with_no_data_value(value: f32) -> Self {
        Self {
            no_data_value: Some(value),
        }
    }
}

impl HeightFieldConverter for ImageToHeightField {
    fn convert(&self, image: &RasterImage) -> Result<HeightField> {
        let (width, height) = (image.width(), image.height());
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for row in 0..height {
            for col in 0..width {
                let value = image.sample(col, row, 0).ok_or_else(|| {
                    ElevationError::Conversion(format!("missing sample at ({}, {})", col, row))
                })?;
                data.push(value);
            }
        }
        Ok(HeightField::new(width, height, data)?.with_no_data_value(self.no_data_value))
    }
}
