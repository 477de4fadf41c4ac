//! PNG encoding.
//!
//! Compression level and filter strategy come from configuration; the
//! symbolic names mirror zlib/libpng and unknown values fall back to the
//! cheapest settings.

use bytes::Bytes;
use image::codecs::png::{CompressionType, FilterType, PngEncoder as ImagePngEncoder};
use image::{ExtendedColorType, ImageEncoder};
use img_parts::png::Png;
use img_parts::ImageICC;

use crate::config::{PngCompression, PngFilter};
use crate::error::ServeError;
use crate::source::RawTile;

/// PNG encoder configured from the server options.
#[derive(Debug, Clone, Copy)]
pub struct PngEncoder {
    compression: PngCompression,
    filter: PngFilter,
}

impl PngEncoder {
    pub fn new(compression: PngCompression, filter: PngFilter) -> Self {
        Self {
            compression,
            filter,
        }
    }

    /// Encode a tile, optionally embedding an ICC profile.
    pub fn encode(&self, tile: &RawTile, icc: Option<&[u8]>) -> Result<Vec<u8>, ServeError> {
        if tile.channels != 1 && tile.channels != 3 {
            return Err(ServeError::Codec(format!(
                "PNG output requires 1 or 3 channels, got {}",
                tile.channels
            )));
        }
        if tile.bpc != 8 {
            return Err(ServeError::Codec(format!(
                "PNG output requires 8 bits per channel, got {}",
                tile.bpc
            )));
        }

        let color = if tile.channels == 3 {
            ExtendedColorType::Rgb8
        } else {
            ExtendedColorType::L8
        };

        let mut output = Vec::new();
        let encoder = ImagePngEncoder::new_with_quality(
            &mut output,
            compression_type(self.compression),
            filter_type(self.filter),
        );
        encoder
            .write_image(&tile.data, tile.width, tile.height, color)
            .map_err(|e| ServeError::Codec(format!("PNG encode failed: {e}")))?;

        if let Some(icc) = icc {
            let mut png = Png::from_bytes(Bytes::from(output))
                .map_err(|e| ServeError::Codec(format!("failed to parse encoded PNG: {e}")))?;
            png.set_icc_profile(Some(Bytes::copy_from_slice(icc)));
            let mut with_icc = Vec::new();
            png.encoder()
                .write_to(&mut with_icc)
                .map_err(|e| ServeError::Codec(format!("failed to write PNG: {e}")))?;
            return Ok(with_icc);
        }

        Ok(output)
    }
}

fn compression_type(compression: PngCompression) -> CompressionType {
    match compression {
        PngCompression::None | PngCompression::BestSpeed => CompressionType::Fast,
        PngCompression::BestCompression => CompressionType::Best,
        PngCompression::Default => CompressionType::Default,
    }
}

fn filter_type(filter: PngFilter) -> FilterType {
    match filter {
        PngFilter::NoFilters => FilterType::NoFilter,
        PngFilter::Sub => FilterType::Sub,
        PngFilter::Up => FilterType::Up,
        PngFilter::Avg => FilterType::Avg,
        PngFilter::Paeth => FilterType::Paeth,
        PngFilter::All => FilterType::Adaptive,
    }
}

// =============================================================================
// Tests
// =============================================================================
