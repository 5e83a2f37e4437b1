//! In-memory raster images produced by tile decoding.

use crate::CodecError;

/// Default edge length of generated tiles, in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Pixel layout of a [`RasterImage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// One 8-bit channel.
    Gray8,
    /// One 16-bit channel.
    Gray16,
    /// One 32-bit float channel.
    GrayF32,
    /// Three 8-bit channels.
    Rgb8,
    /// Four 8-bit channels.
    Rgba8,
}

impl PixelFormat {
    /// Number of channels per pixel.
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Gray8 | PixelFormat::Gray16 | PixelFormat::GrayF32 => 1,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

/// Sample storage, one variant per sample type.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    /// 8-bit unsigned samples.
    U8(Vec<u8>),
    /// 16-bit unsigned samples.
    U16(Vec<u16>),
    /// 32-bit float samples.
    F32(Vec<f32>),
}

impl Samples {
    fn len(&self) -> usize {
        match self {
            Samples::U8(v) => v.len(),
            Samples::U16(v) => v.len(),
            Samples::F32(v) => v.len(),
        }
    }
}

/// A decoded raster tile.
///
/// Samples are stored row-major, top row first, channels interleaved.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    format: PixelFormat,
    samples: Samples,
    /// False when samples are raw values (e.g. meters) rather than color
    /// intensities in `[0, 1]` once scaled.
    normalized: bool,
}

impl RasterImage {
    /// Create an image, checking that the sample buffer matches the layout.
    pub fn new(width: u32, height: u32, format: PixelFormat, samples: Samples) -> Result<Self, CodecError> {
        let type_ok = matches!(
            (format, &samples),
            (PixelFormat::Gray8 | PixelFormat::Rgb8 | PixelFormat::Rgba8, Samples::U8(_))
                | (PixelFormat::Gray16, Samples::U16(_))
                | (PixelFormat::GrayF32, Samples::F32(_))
        );
        if !type_ok {
            return Err(CodecError::Unsupported(format!(
                "{:?} cannot hold the given sample type",
                format
            )));
        }

        let expected = width as usize * height as usize * format.channels();
        if samples.len() != expected {
            return Err(CodecError::Unsupported(format!(
                "{}x{} {:?} needs {} samples, got {}",
                width,
                height,
                format,
                expected,
                samples.len()
            )));
        }

        Ok(Self {
            width,
            height,
            format,
            samples,
            normalized: true,
        })
    }

    /// A fully transparent square RGBA image.
    pub fn transparent(size: u32) -> Self {
        let len = size as usize * size as usize * 4;
        Self {
            width: size,
            height: size,
            format: PixelFormat::Rgba8,
            samples: Samples::U8(vec![0; len]),
            normalized: true,
        }
    }

    /// Single-channel float image, e.g. elevation in meters.
    pub fn gray_f32(width: u32, height: u32, data: Vec<f32>) -> Result<Self, CodecError> {
        Self::new(width, height, PixelFormat::GrayF32, Samples::F32(data))
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel layout.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Raw sample buffer.
    pub fn samples(&self) -> &Samples {
        &self.samples
    }

    /// Whether samples are normalized color intensities.
    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    /// Tag the samples as raw, non-normalized data. The samples are untouched.
    pub fn mark_unnormalized(&mut self) {
        self.normalized = false;
    }

    /// Value of one channel at a pixel, widened to `f32`.
    pub fn sample(&self, x: u32, y: u32, channel: usize) -> Option<f32> {
        let channels = self.format.channels();
        if x >= self.width || y >= self.height || channel >= channels {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * channels + channel;
        match &self.samples {
            Samples::U8(v) => v.get(idx).map(|&s| s as f32),
            Samples::U16(v) => v.get(idx).map(|&s| s as f32),
            Samples::F32(v) => v.get(idx).copied(),
        }
    }

    /// Copy of this image without its alpha channel.
    ///
    /// Images without alpha are returned unchanged.
    pub fn without_alpha(&self) -> RasterImage {
        match (&self.format, &self.samples) {
            (PixelFormat::Rgba8, Samples::U8(data)) => {
                let rgb = data
                    .chunks_exact(4)
                    .flat_map(|px| [px[0], px[1], px[2]])
                    .collect();
                RasterImage {
                    width: self.width,
                    height: self.height,
                    format: PixelFormat::Rgb8,
                    samples: Samples::U8(rgb),
                    normalized: self.normalized,
                }
            }
            _ => self.clone(),
        }
    }
}
