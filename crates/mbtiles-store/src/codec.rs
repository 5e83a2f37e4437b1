//! Image codecs, compressors, and the registry that resolves them by name.
//!
//! The registry is an explicit value handed to the store when it is opened,
//! so tests can register exactly the capabilities they need.

use crate::image::{PixelFormat, RasterImage, Samples};
use crate::{CodecError, Result, StoreError};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::collections::HashMap;
use std::fmt;
use std::io::{Cursor, Read, Write};
use std::sync::Arc;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};

/// Name under which the built-in zlib compressor is registered.
pub const ZLIB: &str = "zlib";

/// Encodes and decodes tile payloads of one image format.
pub trait ImageCodec: Send + Sync {
    /// Short codec name used in log messages.
    fn name(&self) -> &str;

    /// MIME types this codec handles, e.g. `image/tiff`.
    fn mime_types(&self) -> &[&str];

    /// File extensions this codec handles, without the dot.
    fn extensions(&self) -> &[&str];

    /// Decode a payload into an image.
    fn decode(&self, data: &[u8]) -> std::result::Result<RasterImage, CodecError>;

    /// Encode an image into a payload.
    fn encode(&self, image: &RasterImage) -> std::result::Result<Vec<u8>, CodecError>;
}

/// Compresses and decompresses whole tile payloads.
pub trait Compressor: Send + Sync {
    /// Identifier stored in the `compression` metadata key.
    fn name(&self) -> &str;

    /// Compress a payload.
    fn compress(&self, data: &[u8]) -> std::result::Result<Vec<u8>, CodecError>;

    /// Decompress a payload.
    fn decompress(&self, data: &[u8]) -> std::result::Result<Vec<u8>, CodecError>;
}

/// Lookup of codecs by format and compressors by name.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    codecs: Vec<Arc<dyn ImageCodec>>,
    compressors: HashMap<String, Arc<dyn Compressor>>,
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codecs: Vec<_> = self.codecs.iter().map(|c| c.name()).collect();
        let compressors: Vec<_> = self.compressors.keys().collect();
        f.debug_struct("CodecRegistry")
            .field("codecs", &codecs)
            .field("compressors", &compressors)
            .finish()
    }
}

impl CodecRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in TIFF codec and zlib compressor.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_codec(Arc::new(TiffCodec));
        registry.register_compressor(Arc::new(ZlibCompressor::default()));
        registry
    }

    /// Add a codec. Later registrations do not shadow earlier ones.
    pub fn register_codec(&mut self, codec: Arc<dyn ImageCodec>) {
        self.codecs.push(codec);
    }

    /// Add or replace a compressor under its own name.
    pub fn register_compressor(&mut self, compressor: Arc<dyn Compressor>) {
        self.compressors
            .insert(compressor.name().to_ascii_lowercase(), compressor);
    }

    /// Find a codec for a tile format, trying MIME types before extensions.
    pub fn codec_for_format(&self, format: &str) -> Result<Arc<dyn ImageCodec>> {
        let wanted = format.trim().trim_start_matches('.');
        let by_mime = self
            .codecs
            .iter()
            .find(|c| c.mime_types().iter().any(|m| m.eq_ignore_ascii_case(wanted)));
        let by_ext = || {
            self.codecs
                .iter()
                .find(|c| c.extensions().iter().any(|e| e.eq_ignore_ascii_case(wanted)))
        };

        by_mime
            .or_else(by_ext)
            .cloned()
            .ok_or_else(|| StoreError::ServiceUnavailable(format!("No codec to load format \"{}\"", format)))
    }

    /// Find a compressor by name.
    pub fn compressor(&self, name: &str) -> Result<Arc<dyn Compressor>> {
        self.compressors
            .get(&name.trim().to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| StoreError::ServiceUnavailable(format!("Cannot find compressor \"{}\"", name)))
    }
}

/// GeoTIFF payloads, used for both imagery and elevation tiles.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiffCodec;

impl ImageCodec for TiffCodec {
    fn name(&self) -> &str {
        "tiff"
    }

    fn mime_types(&self) -> &[&str] {
        &["image/tiff", "image/tif"]
    }

    fn extensions(&self) -> &[&str] {
        &["tif", "tiff"]
    }

    fn decode(&self, data: &[u8]) -> std::result::Result<RasterImage, CodecError> {
        let decode_err = |e: tiff::TiffError| CodecError::Decode(e.to_string());

        let mut decoder = Decoder::new(Cursor::new(data)).map_err(decode_err)?;
        let (width, height) = decoder.dimensions().map_err(decode_err)?;
        let color = decoder.colortype().map_err(decode_err)?;
        let result = decoder.read_image().map_err(decode_err)?;

        let (format, samples) = match (color, result) {
            (tiff::ColorType::RGBA(8), DecodingResult::U8(d)) => (PixelFormat::Rgba8, Samples::U8(d)),
            (tiff::ColorType::RGB(8), DecodingResult::U8(d)) => (PixelFormat::Rgb8, Samples::U8(d)),
            (tiff::ColorType::Gray(8), DecodingResult::U8(d)) => (PixelFormat::Gray8, Samples::U8(d)),
            (tiff::ColorType::Gray(16), DecodingResult::U16(d)) => (PixelFormat::Gray16, Samples::U16(d)),
            // Remaining single-channel sample types are widened to f32.
            (tiff::ColorType::Gray(_), result) => (PixelFormat::GrayF32, Samples::F32(widen_to_f32(result))),
            (other, _) => {
                return Err(CodecError::Unsupported(format!("TIFF color type {:?}", other)));
            }
        };

        RasterImage::new(width, height, format, samples)
    }

    fn encode(&self, image: &RasterImage) -> std::result::Result<Vec<u8>, CodecError> {
        let encode_err = |e: tiff::TiffError| CodecError::Encode(e.to_string());

        let mut out = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut out).map_err(encode_err)?;
            let (w, h) = (image.width(), image.height());
            let written = match (image.format(), image.samples()) {
                (PixelFormat::Rgba8, Samples::U8(d)) => encoder.write_image::<colortype::RGBA8>(w, h, d),
                (PixelFormat::Rgb8, Samples::U8(d)) => encoder.write_image::<colortype::RGB8>(w, h, d),
                (PixelFormat::Gray8, Samples::U8(d)) => encoder.write_image::<colortype::Gray8>(w, h, d),
                (PixelFormat::Gray16, Samples::U16(d)) => encoder.write_image::<colortype::Gray16>(w, h, d),
                (PixelFormat::GrayF32, Samples::F32(d)) => {
                    encoder.write_image::<colortype::Gray32Float>(w, h, d)
                }
                (format, _) => {
                    return Err(CodecError::Unsupported(format!("{:?}", format)));
                }
            };
            written.map_err(encode_err)?;
        }
        Ok(out.into_inner())
    }
}

/// Convert any decoded TIFF sample buffer to `f32`.
fn widen_to_f32(result: DecodingResult) -> Vec<f32> {
    match result {
        DecodingResult::F32(data) => data,
        DecodingResult::F64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f32).collect(),
    }
}

/// zlib stream compression.
#[derive(Debug, Clone, Copy)]
pub struct ZlibCompressor {
    level: Compression,
}

impl Default for ZlibCompressor {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl ZlibCompressor {
    /// Compressor with an explicit level (0-9).
    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Compressor for ZlibCompressor {
    fn name(&self) -> &str {
        ZLIB
    }

    fn compress(&self, data: &[u8]) -> std::result::Result<Vec<u8>, CodecError> {
        let mut encoder = ZlibEncoder::new(Vec::new(), self.level);
        encoder
            .write_all(data)
            .map_err(|e| CodecError::Compress(e.to_string()))?;
        encoder.finish().map_err(|e| CodecError::Compress(e.to_string()))
    }

    fn decompress(&self, data: &[u8]) -> std::result::Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        ZlibDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Decompress(e.to_string()))?;
        Ok(out)
    }
}
