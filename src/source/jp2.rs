//! JPEG2000 reader.
//!
//! Resolution levels come from the wavelet decomposition: decoding with a
//! reduce factor of `r` yields the image at 1/2^r scale. The codestream
//! has no native tiling exposed here, so the reader advertises virtual
//! 256x256 tiles and decodes the requested level before cropping.

use std::fs;
use std::path::{Path, PathBuf};

use jpeg2k::{DecodeParameters, Image};

use crate::error::SourceError;

use super::{PyramidMetadata, RawTile};

/// Virtual tile edge advertised for JPEG2000 pyramids.
const VIRTUAL_TILE: u32 = 256;

/// Ceiling on advertised resolution levels (the OpenJPEG encoding default).
const MAX_LEVELS: usize = 6;

// =============================================================================
// Reader
// =============================================================================

/// An opened JPEG2000 image.
#[derive(Debug)]
pub struct Jp2Reader {
    path: PathBuf,
    levels: usize,
    channels: u8,
}

impl Jp2Reader {
    /// Open a codestream and derive its level table.
    pub fn open(path: &Path) -> Result<(Self, PyramidMetadata), SourceError> {
        let bytes =
            fs::read(path).map_err(|_| SourceError::NotFound(path.display().to_string()))?;
        let image = Image::from_bytes(&bytes).map_err(|e| SourceError::Jpeg2000(e.to_string()))?;

        let width = image.width();
        let height = image.height();
        let channels: u8 = match image.num_components() {
            1 | 2 => 1,
            _ => 3,
        };

        // Halve until the level fits inside one virtual tile
        let mut level_widths = vec![width];
        let mut level_heights = vec![height];
        while level_widths.len() < MAX_LEVELS {
            let w = level_widths.last().unwrap() / 2;
            let h = level_heights.last().unwrap() / 2;
            if w.max(h) < VIRTUAL_TILE || w == 0 || h == 0 {
                break;
            }
            level_widths.push(w);
            level_heights.push(h);
        }

        let meta = PyramidMetadata {
            level_widths: level_widths.clone(),
            level_heights: level_heights.clone(),
            tile_width: VIRTUAL_TILE,
            tile_height: VIRTUAL_TILE,
            channels,
            bpc: 8,
            xmp: String::new(),
            icc: None,
        };

        Ok((
            Self {
                path: path.to_path_buf(),
                levels: level_widths.len(),
                channels,
            },
            meta,
        ))
    }

    /// Decode a pixel rectangle from one level.
    ///
    /// The whole level is decoded at the matching reduce factor, then
    /// cropped. Level pixel grids from reduction can differ by one from the
    /// halved table entries, so decoded rows are clamped defensively.
    pub fn decode_region(
        &self,
        level: usize,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
    ) -> Result<RawTile, SourceError> {
        if level >= self.levels {
            return Err(SourceError::Decode(format!("level {level} out of range")));
        }

        let bytes = fs::read(&self.path)
            .map_err(|_| SourceError::NotFound(self.path.display().to_string()))?;
        let params = DecodeParameters::new().reduce(level as u32);
        let image = Image::from_bytes_with(&bytes, params)
            .map_err(|e| SourceError::Jpeg2000(e.to_string()))?;

        let pixels = image
            .get_pixels(None)
            .map_err(|e| SourceError::Jpeg2000(e.to_string()))?;

        let dec_w = pixels.width;
        let dec_h = pixels.height;
        let dec_ch = (pixels.data.len() / (dec_w as usize * dec_h as usize)).max(1);
        let out_ch = self.channels as usize;

        let mut out = vec![0u8; w as usize * h as usize * out_ch];
        for row in 0..h {
            let sy = (y + row).min(dec_h.saturating_sub(1));
            for col in 0..w {
                let sx = (x + col).min(dec_w.saturating_sub(1));
                let src = (sy as usize * dec_w as usize + sx as usize) * dec_ch;
                let dst = (row as usize * w as usize + col as usize) * out_ch;
                for c in 0..out_ch {
                    out[dst + c] = pixels.data[src + c.min(dec_ch - 1)];
                }
            }
        }

        Ok(RawTile::new(w, h, self.channels, 8, out))
    }
}

// =============================================================================
// Tests
// =============================================================================
