//! Per-tile payload processing: decompress then decode on read, the inverse
//! on write.

use crate::codec::{Compressor, ImageCodec};
use crate::image::RasterImage;
use crate::CodecError;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Codec chain applied uniformly to every tile of one store.
#[derive(Clone)]
pub struct TilePipeline {
    /// Absent when the store's format has no registered codec; raw access
    /// still works but nothing decodes.
    codec: Option<Arc<dyn ImageCodec>>,
    compressor: Option<Arc<dyn Compressor>>,
    /// Decoded tiles carry raw sample values (e.g. elevation).
    coverage: bool,
}

impl fmt::Debug for TilePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TilePipeline")
            .field("codec", &self.codec.as_ref().map(|c| c.name().to_string()))
            .field("compressor", &self.compressor.as_ref().map(|c| c.name().to_string()))
            .field("coverage", &self.coverage)
            .finish()
    }
}

impl TilePipeline {
    /// Create a pipeline.
    pub fn new(codec: Option<Arc<dyn ImageCodec>>, compressor: Option<Arc<dyn Compressor>>, coverage: bool) -> Self {
        Self {
            codec,
            compressor,
            coverage,
        }
    }

    /// The image codec, if one was resolved for the store's format.
    pub fn codec(&self) -> Option<&Arc<dyn ImageCodec>> {
        self.codec.as_ref()
    }

    /// The compressor, if payloads are compressed.
    pub fn compressor(&self) -> Option<&Arc<dyn Compressor>> {
        self.compressor.as_ref()
    }

    /// Whether decoded tiles are tagged as non-normalized samples.
    pub fn is_coverage(&self) -> bool {
        self.coverage
    }

    /// Turn a stored payload into an image.
    ///
    /// Decompression or decode failures are logged and yield `None`; they
    /// never affect other tiles.
    pub fn decode(&self, data: &[u8]) -> Option<RasterImage> {
        let Some(codec) = &self.codec else {
            warn!("No codec available; tile cannot be decoded");
            return None;
        };

        let decompressed;
        let payload = match &self.compressor {
            Some(compressor) => match compressor.decompress(data) {
                Ok(bytes) => {
                    decompressed = bytes;
                    &decompressed[..]
                }
                Err(e) => {
                    warn!("{} ({})", e, compressor.name());
                    return None;
                }
            },
            None => data,
        };

        match codec.decode(payload) {
            Ok(mut image) => {
                if self.coverage {
                    image.mark_unnormalized();
                }
                Some(image)
            }
            Err(e) => {
                warn!("Failed to decode {} tile: {}", codec.name(), e);
                None
            }
        }
    }

    /// Turn an image into a stored payload.
    pub fn encode(&self, image: &RasterImage) -> Result<Vec<u8>, CodecError> {
        let codec = self
            .codec
            .as_ref()
            .ok_or_else(|| CodecError::Unsupported("no codec for the store's format".into()))?;
        let encoded = codec.encode(image)?;
        match &self.compressor {
            Some(compressor) => compressor.compress(&encoded),
            None => Ok(encoded),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{TiffCodec, ZlibCompressor};

    fn elevation() -> RasterImage {
        RasterImage::gray_f32(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap()
    }

    #[test]
    fn test_compressed_roundtrip() {
        let pipeline = TilePipeline::new(Some(Arc::new(TiffCodec)), Some(Arc::new(ZlibCompressor::default())), false);
        let stored = pipeline.encode(&elevation()).unwrap();
        // Stored bytes are not a bare TIFF.
        assert!(TiffCodec.decode(&stored).is_err());

        let image = pipeline.decode(&stored).unwrap();
        assert_eq!(image, elevation());
        assert!(image.is_normalized());
    }

    #[test]
    fn test_decompress_failure_is_absent() {
        let pipeline = TilePipeline::new(Some(Arc::new(TiffCodec)), Some(Arc::new(ZlibCompressor::default())), false);
        let raw_tiff = TiffCodec.encode(&elevation()).unwrap();
        assert!(pipeline.decode(&raw_tiff).is_none());
    }

    #[test]
    fn test_decode_failure_is_absent() {
        let pipeline = TilePipeline::new(Some(Arc::new(TiffCodec)), None, false);
        assert!(pipeline.decode(b"garbage").is_none());
    }

    #[test]
    fn test_missing_codec() {
        let pipeline = TilePipeline::new(None, Some(Arc::new(ZlibCompressor::default())), false);
        assert!(pipeline.codec().is_none());
        let stored = ZlibCompressor::default()
            .compress(&TiffCodec.encode(&elevation()).unwrap())
            .unwrap();
        assert!(pipeline.decode(&stored).is_none());
        assert!(matches!(pipeline.encode(&elevation()), Err(CodecError::Unsupported(_))));
    }

    #[test]
    fn test_coverage_tagging() {
        let pipeline = TilePipeline::new(Some(Arc::new(TiffCodec)), None, true);
        let stored = pipeline.encode(&elevation()).unwrap();
        let image = pipeline.decode(&stored).unwrap();
        assert!(!image.is_normalized());
        assert_eq!(image.sample(1, 1, 0), Some(4.0));
    }
}
