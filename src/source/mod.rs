//! Pyramidal image sources.
//!
//! A source exposes a multi-resolution image as a list of levels (index 0 =
//! full resolution) plus a `decode_region` operation returning raw pixels.
//! Format support is a closed set expressed as an enum rather than a plugin
//! registry: every [`ImageDescriptor`] carries a [`PyramidReader`] variant
//! for its container format.

pub mod jp2;
pub mod tiff;

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::error::SourceError;

pub use jp2::Jp2Reader;
pub use tiff::TiffReader;

// =============================================================================
// Format Tag
// =============================================================================

/// Supported container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// Tiled or stripped pyramidal TIFF (one IFD per level)
    Tiff,

    /// JPEG2000 codestream (resolution levels via wavelet reduction)
    Jpeg2000,
}

impl ImageFormat {
    pub const fn name(&self) -> &'static str {
        match self {
            ImageFormat::Tiff => "TIFF",
            ImageFormat::Jpeg2000 => "JPEG2000",
        }
    }
}

// =============================================================================
// RawTile
// =============================================================================

/// A rectangular pixel buffer handed from a reader to the renderer and
/// encoders. Samples are interleaved row-major.
#[derive(Debug, Clone)]
pub struct RawTile {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub bpc: u8,
    pub data: Vec<u8>,
}

impl RawTile {
    pub fn new(width: u32, height: u32, channels: u8, bpc: u8, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            channels,
            bpc,
            data,
        }
    }

    /// Row stride in bytes.
    pub fn stride(&self) -> usize {
        self.width as usize * self.channels as usize * (self.bpc as usize / 8)
    }
}

// =============================================================================
// Tagged Reader
// =============================================================================

/// Format-specific reader, selected when the image is opened.
#[derive(Debug)]
pub enum PyramidReader {
    Tiff(TiffReader),
    Jpeg2000(Jp2Reader),
}

// =============================================================================
// ImageDescriptor
// =============================================================================

/// An opened pyramidal image: metadata plus its format reader.
///
/// Descriptors live in the metadata cache and are immutable once admitted;
/// a timestamp change on disk causes the cache to rebuild the slot before
/// the request proceeds.
#[derive(Debug)]
pub struct ImageDescriptor {
    /// Resolved filesystem path
    pub path: PathBuf,

    /// Identifier as seen by the client (last path segment)
    pub original_name: String,

    pub format: ImageFormat,

    /// Per-level widths, index 0 = full resolution, non-increasing
    pub level_widths: Vec<u32>,

    /// Per-level heights, same ordering as `level_widths`
    pub level_heights: Vec<u32>,

    pub tile_width: u32,
    pub tile_height: u32,

    pub channels: u8,
    pub bpc: u8,

    /// Last-modified time, seconds since the epoch (UTC)
    pub timestamp: i64,

    /// Embedded XMP packet, empty when absent
    pub xmp: String,

    /// Embedded ICC profile
    pub icc: Option<Vec<u8>>,

    reader: PyramidReader,
}

impl ImageDescriptor {
    /// Open an image, detect its format and load the pyramid metadata.
    ///
    /// `filename_pattern` short-circuits detection: identifiers whose file
    /// name contains the pattern are opened as TIFF without sniffing.
    pub fn open(path: &Path, filename_pattern: &str) -> Result<Self, SourceError> {
        let format = detect_format(path, filename_pattern)?;
        let timestamp = file_timestamp(path)?;
        let original_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let (reader, meta) = match format {
            ImageFormat::Tiff => {
                let (reader, meta) = TiffReader::open(path)?;
                (PyramidReader::Tiff(reader), meta)
            }
            ImageFormat::Jpeg2000 => {
                let (reader, meta) = Jp2Reader::open(path)?;
                (PyramidReader::Jpeg2000(reader), meta)
            }
        };

        if meta.level_widths.is_empty() {
            return Err(SourceError::InvalidPyramid(format!(
                "{} contains no usable levels",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            original_name,
            format,
            level_widths: meta.level_widths,
            level_heights: meta.level_heights,
            tile_width: meta.tile_width,
            tile_height: meta.tile_height,
            channels: meta.channels,
            bpc: meta.bpc,
            timestamp,
            xmp: meta.xmp,
            icc: meta.icc,
            reader,
        })
    }

    /// Full-resolution width.
    pub fn width(&self) -> u32 {
        self.level_widths[0]
    }

    /// Full-resolution height.
    pub fn height(&self) -> u32 {
        self.level_heights[0]
    }

    /// Number of pyramid levels.
    pub fn levels(&self) -> usize {
        self.level_widths.len()
    }

    /// Dimensions of a level (index 0 = full resolution).
    pub fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        Some((
            *self.level_widths.get(level)?,
            *self.level_heights.get(level)?,
        ))
    }

    /// Embedded metadata by key. Currently `"xmp"` and `"icc"`.
    pub fn metadata(&self, key: &str) -> Option<&[u8]> {
        match key {
            "xmp" if !self.xmp.is_empty() => Some(self.xmp.as_bytes()),
            "icc" => self.icc.as_deref(),
            _ => None,
        }
    }

    /// Decode a pixel region from one level.
    ///
    /// Coordinates are in level pixel space; the rectangle must lie within
    /// the level. The result always has `bpc == 8` (16-bit sources are
    /// reduced on decode) and 1 or 3 channels (alpha is dropped).
    pub fn decode_region(
        &self,
        level: usize,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
    ) -> Result<RawTile, SourceError> {
        let (lw, lh) = self
            .level_dimensions(level)
            .ok_or_else(|| SourceError::Decode(format!("level {level} out of range")))?;
        if w == 0 || h == 0 || x + w > lw || y + h > lh {
            return Err(SourceError::Decode(format!(
                "region {x},{y} {w}x{h} outside level {level} ({lw}x{lh})"
            )));
        }
        match &self.reader {
            PyramidReader::Tiff(r) => r.decode_region(level, x, y, w, h),
            PyramidReader::Jpeg2000(r) => r.decode_region(level, x, y, w, h),
        }
    }
}

// =============================================================================
// Shared Metadata
// =============================================================================

/// Metadata gathered by a format reader during open.
#[derive(Debug, Default)]
pub struct PyramidMetadata {
    pub level_widths: Vec<u32>,
    pub level_heights: Vec<u32>,
    pub tile_width: u32,
    pub tile_height: u32,
    pub channels: u8,
    pub bpc: u8,
    pub xmp: String,
    pub icc: Option<Vec<u8>>,
}

// =============================================================================
// Detection
// =============================================================================

/// JP2 signature box.
const JP2_SIGNATURE: [u8; 12] = [
    0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20, 0x0D, 0x0A, 0x87, 0x0A,
];

/// Bare JPEG2000 codestream marker (SOC + SIZ).
const J2K_SOC: [u8; 4] = [0xFF, 0x4F, 0xFF, 0x51];

/// Detect the container format of an image file.
///
/// File names containing `filename_pattern` are taken to be pyramidal TIFF
/// without looking at the content; everything else is sniffed by magic
/// bytes.
pub fn detect_format(path: &Path, filename_pattern: &str) -> Result<ImageFormat, SourceError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if !filename_pattern.is_empty() && name.contains(filename_pattern) {
        return Ok(ImageFormat::Tiff);
    }

    let mut file = fs::File::open(path)
        .map_err(|_| SourceError::NotFound(path.display().to_string()))?;
    let mut magic = [0u8; 12];
    let n = file.read(&mut magic)?;

    if n >= 4 && (magic[..4] == [0x49, 0x49, 0x2A, 0x00] || magic[..4] == [0x4D, 0x4D, 0x00, 0x2A])
    {
        return Ok(ImageFormat::Tiff);
    }
    if n >= 12 && magic == JP2_SIGNATURE {
        return Ok(ImageFormat::Jpeg2000);
    }
    if n >= 4 && magic[..4] == J2K_SOC {
        return Ok(ImageFormat::Jpeg2000);
    }

    // Fall back on the extension for files with unusual leading boxes
    match path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .as_deref()
    {
        Some("jp2") | Some("jpx") | Some("j2k") => Ok(ImageFormat::Jpeg2000),
        Some("tif") | Some("tiff") | Some("ptif") => Ok(ImageFormat::Tiff),
        _ => Err(SourceError::UnsupportedFormat(path.display().to_string())),
    }
}

/// Last-modified time of a file as unix seconds.
pub fn file_timestamp(path: &Path) -> Result<i64, SourceError> {
    let meta =
        fs::metadata(path).map_err(|_| SourceError::NotFound(path.display().to_string()))?;
    let modified = meta.modified()?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0))
}

// =============================================================================
// Tests
// =============================================================================
