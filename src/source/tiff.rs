//! Pyramidal TIFF reader.
//!
//! A pyramid is stored as a sequence of IFDs, the first holding the full
//! resolution image and each following one a reduced version. Both tiled
//! and stripped organisation are supported: a strip is treated as a tile
//! spanning the full level width.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tiff::ColorType;

use crate::error::SourceError;

use super::{PyramidMetadata, RawTile};

/// TIFF tag holding the XMP packet.
const TAG_XMP: u16 = 700;

/// TIFF tag holding the ICC profile.
const TAG_ICC_PROFILE: u16 = 34675;

// =============================================================================
// Reader
// =============================================================================

/// An opened pyramidal TIFF.
///
/// The reader keeps only the level table; a fresh decoder is constructed
/// for every `decode_region` call so the type stays `Send + Sync` and
/// concurrent requests never contend on a shared file handle.
#[derive(Debug)]
pub struct TiffReader {
    path: PathBuf,
    levels: Vec<Level>,

    /// Interleaved samples per pixel as stored in the file
    samples: u8,

    /// Channels exposed to the pipeline (alpha is dropped)
    out_channels: u8,
}

#[derive(Debug, Clone, Copy)]
struct Level {
    /// Directory index inside the file
    ifd: usize,
    width: u32,
    height: u32,
    tile_width: u32,
    tile_height: u32,
}

impl TiffReader {
    /// Open a file and collect its pyramid levels.
    ///
    /// Directories are accepted as levels while their dimensions stay
    /// non-increasing; auxiliary images breaking the ordering (labels,
    /// thumbnails stored after the pyramid) are skipped.
    pub fn open(path: &Path) -> Result<(Self, PyramidMetadata), SourceError> {
        let mut decoder = new_decoder(path)?;

        let mut meta = PyramidMetadata::default();
        let mut levels: Vec<Level> = Vec::new();
        let mut samples = 0u8;
        let mut ifd = 0usize;

        loop {
            let (w, h) = decoder.dimensions()?;
            let colortype = decoder.colortype()?;
            let (tw, th) = decoder.chunk_dimensions();

            if ifd == 0 {
                let (s, out, bpc) = classify_colortype(colortype, path)?;
                samples = s;
                meta.channels = out;
                meta.bpc = bpc;
                meta.tile_width = tw;
                meta.tile_height = th;
                meta.xmp = decoder
                    .get_tag_u8_vec(Tag::Unknown(TAG_XMP))
                    .map(|v| String::from_utf8_lossy(&v).into_owned())
                    .unwrap_or_default();
                meta.icc = decoder.get_tag_u8_vec(Tag::Unknown(TAG_ICC_PROFILE)).ok();
            }

            let monotonic = levels
                .last()
                .map(|prev| w <= prev.width && h <= prev.height)
                .unwrap_or(true);
            if monotonic {
                levels.push(Level {
                    ifd,
                    width: w,
                    height: h,
                    tile_width: tw,
                    tile_height: th,
                });
                meta.level_widths.push(w);
                meta.level_heights.push(h);
            }

            if !decoder.more_images() {
                break;
            }
            decoder.next_image()?;
            ifd += 1;
        }

        let out_channels = meta.channels;
        Ok((
            Self {
                path: path.to_path_buf(),
                levels,
                samples,
                out_channels,
            },
            meta,
        ))
    }

    /// Decode a pixel rectangle from one level into an 8-bit tile.
    pub fn decode_region(
        &self,
        level: usize,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
    ) -> Result<RawTile, SourceError> {
        let lv = *self
            .levels
            .get(level)
            .ok_or_else(|| SourceError::Decode(format!("level {level} out of range")))?;

        let mut decoder = new_decoder(&self.path)?;
        decoder.seek_to_image(lv.ifd)?;

        let samples = self.samples as usize;
        let out_ch = self.out_channels as usize;
        let mut out = vec![0u8; w as usize * h as usize * out_ch];

        let per_row = lv.width.div_ceil(lv.tile_width);
        let tx0 = x / lv.tile_width;
        let tx1 = (x + w - 1) / lv.tile_width;
        let ty0 = y / lv.tile_height;
        let ty1 = (y + h - 1) / lv.tile_height;

        for ty in ty0..=ty1 {
            for tx in tx0..=tx1 {
                let index = ty * per_row + tx;
                let (cw, chh) = decoder.chunk_data_dimensions(index);
                let chunk = ChunkBuf::from_result(decoder.read_chunk(index)?)?;

                // Chunk origin in level space
                let ox = tx * lv.tile_width;
                let oy = ty * lv.tile_height;

                // Intersection of the chunk with the requested region
                let ix0 = x.max(ox);
                let iy0 = y.max(oy);
                let ix1 = (x + w).min(ox + cw);
                let iy1 = (y + h).min(oy + chh);
                if ix0 >= ix1 || iy0 >= iy1 {
                    continue;
                }

                for row in iy0..iy1 {
                    let src_row = (row - oy) as usize * cw as usize;
                    let dst_row = (row - y) as usize * w as usize;
                    for col in ix0..ix1 {
                        let src = (src_row + (col - ox) as usize) * samples;
                        let dst = (dst_row + (col - x) as usize) * out_ch;
                        for c in 0..out_ch {
                            out[dst + c] = chunk.sample8(src + c);
                        }
                    }
                }
            }
        }

        Ok(RawTile::new(w, h, self.out_channels, 8, out))
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn new_decoder(path: &Path) -> Result<Decoder<BufReader<File>>, SourceError> {
    let file = File::open(path).map_err(|_| SourceError::NotFound(path.display().to_string()))?;
    let decoder = Decoder::new(BufReader::new(file))?;
    Ok(decoder.with_limits(Limits::unlimited()))
}

/// Map a TIFF colour type to (samples in file, output channels, bpc).
fn classify_colortype(
    colortype: ColorType,
    path: &Path,
) -> Result<(u8, u8, u8), SourceError> {
    match colortype {
        ColorType::Gray(8) => Ok((1, 1, 8)),
        ColorType::Gray(16) => Ok((1, 1, 16)),
        ColorType::RGB(8) => Ok((3, 3, 8)),
        ColorType::RGB(16) => Ok((3, 3, 16)),
        ColorType::RGBA(8) => Ok((4, 3, 8)),
        ColorType::RGBA(16) => Ok((4, 3, 16)),
        other => Err(SourceError::UnsupportedFormat(format!(
            "{}: unsupported colour type {:?}",
            path.display(),
            other
        ))),
    }
}

/// Decoded chunk samples with on-the-fly 16-to-8 bit reduction.
enum ChunkBuf {
    U8(Vec<u8>),
    U16(Vec<u16>),
}

impl ChunkBuf {
    fn from_result(result: DecodingResult) -> Result<Self, SourceError> {
        match result {
            DecodingResult::U8(v) => Ok(ChunkBuf::U8(v)),
            DecodingResult::U16(v) => Ok(ChunkBuf::U16(v)),
            _ => Err(SourceError::Decode(
                "unsupported sample representation".to_string(),
            )),
        }
    }

    #[inline]
    fn sample8(&self, i: usize) -> u8 {
        match self {
            ChunkBuf::U8(v) => v[i],
            ChunkBuf::U16(v) => (v[i] >> 8) as u8,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
