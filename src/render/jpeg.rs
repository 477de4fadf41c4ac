//! JPEG encoding.
//!
//! Output is produced by libjpeg (via mozjpeg) so scanlines stream through
//! a single compressor: the header is written once, strips are appended
//! top-to-bottom, and the identifying COM comment plus optional ICC/XMP
//! markers are attached to the finished container.

use bytes::Bytes;
use img_parts::jpeg::{markers, Jpeg, JpegSegment};
use mozjpeg::{ColorSpace, Compress};

use crate::error::ServeError;
use crate::source::RawTile;

/// Comment marker present in every generated JPEG.
pub const JPEG_COMMENT: &[u8] = b"Generated by IIPImage";

/// APP1 namespace prefix for XMP packets.
const XMP_NAMESPACE: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";

/// Images up to this many pixels are handed to the compressor in a single
/// scanline call, which is faster than row-by-row streaming.
const WHOLE_IMAGE_PIXELS: usize = 512 * 512;

// =============================================================================
// Encoder
// =============================================================================

/// JPEG encoder configured with an output quality.
#[derive(Debug, Clone, Copy)]
pub struct JpegEncoder {
    quality: u8,
}

impl JpegEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Whole-image encode.
    ///
    /// Buffers of at most 512x512 pixels are compressed in one scanline
    /// call; larger ones stream row by row.
    pub fn encode(
        &self,
        tile: &RawTile,
        icc: Option<&[u8]>,
        xmp: Option<&str>,
    ) -> Result<Vec<u8>, ServeError> {
        check_preconditions(tile.channels, tile.bpc)?;

        let stride = tile.width as usize * tile.channels as usize;
        let bands: Box<dyn Iterator<Item = &[u8]> + '_> =
            if tile.width as usize * tile.height as usize <= WHOLE_IMAGE_PIXELS {
                Box::new(std::iter::once(tile.data.as_slice()))
            } else {
                Box::new(tile.data.chunks(stride))
            };
        let raw = self.compress(tile, bands)?;

        finalize_markers(raw, icc, xmp)
    }

    /// Strip-wise encode.
    ///
    /// The raster is fed to the compressor in bands of `strip_height` rows
    /// (the final band may be shorter), so the encoder never sees more
    /// than one strip of input at a time.
    pub fn encode_strips(
        &self,
        tile: &RawTile,
        strip_height: u32,
        icc: Option<&[u8]>,
        xmp: Option<&str>,
    ) -> Result<Vec<u8>, ServeError> {
        check_preconditions(tile.channels, tile.bpc)?;

        let strip_height = strip_height.max(1);
        let stride = tile.width as usize * tile.channels as usize;
        let band = stride * strip_height as usize;
        let raw = self.compress(tile, tile.data.chunks(band))?;

        finalize_markers(raw, icc, xmp)
    }

    fn compress<'a>(
        &self,
        tile: &RawTile,
        bands: impl Iterator<Item = &'a [u8]>,
    ) -> Result<Vec<u8>, ServeError> {
        let colorspace = if tile.channels == 3 {
            ColorSpace::JCS_RGB
        } else {
            ColorSpace::JCS_GRAYSCALE
        };

        let mut comp = Compress::new(colorspace);
        comp.set_size(tile.width as usize, tile.height as usize);
        comp.set_quality(self.quality as f32);

        let estimated = (tile.data.len() / 10).max(4096);
        let mut output = Vec::with_capacity(estimated);

        {
            let mut writer = comp
                .start_compress(&mut output)
                .map_err(|e| ServeError::Codec(format!("failed to start compress: {e:?}")))?;

            for band in bands {
                writer
                    .write_scanlines(band)
                    .map_err(|e| ServeError::Codec(format!("failed to write scanlines: {e:?}")))?;
            }

            writer
                .finish()
                .map_err(|e| ServeError::Codec(format!("failed to finish: {e:?}")))?;
        }

        Ok(output)
    }
}

// =============================================================================
// Preconditions and Markers
// =============================================================================

fn check_preconditions(channels: u8, bpc: u8) -> Result<(), ServeError> {
    if channels != 1 && channels != 3 {
        return Err(ServeError::Codec(format!(
            "JPEG output requires 1 or 3 channels, got {channels}"
        )));
    }
    if bpc != 8 {
        return Err(ServeError::Codec(format!(
            "JPEG output requires 8 bits per channel, got {bpc}"
        )));
    }
    Ok(())
}

/// Attach the COM comment and optional ICC/XMP markers ahead of the scan
/// data.
fn finalize_markers(
    raw: Vec<u8>,
    icc: Option<&[u8]>,
    xmp: Option<&str>,
) -> Result<Vec<u8>, ServeError> {
    let mut jpeg = Jpeg::from_bytes(Bytes::from(raw))
        .map_err(|e| ServeError::Codec(format!("failed to parse encoded JPEG: {e}")))?;

    let segments = jpeg.segments_mut();
    let mut at = 0;

    segments.insert(
        at,
        JpegSegment::new_with_contents(markers::COM, Bytes::from_static(JPEG_COMMENT)),
    );
    at += 1;

    if let Some(icc) = icc {
        let mut contents = Vec::with_capacity(14 + icc.len());
        contents.extend_from_slice(b"ICC_PROFILE\0");
        contents.push(1);
        contents.push(1);
        contents.extend_from_slice(icc);
        segments.insert(
            at,
            JpegSegment::new_with_contents(markers::APP2, Bytes::from(contents)),
        );
        at += 1;
    }

    if let Some(xmp) = xmp {
        let mut contents = Vec::with_capacity(XMP_NAMESPACE.len() + xmp.len());
        contents.extend_from_slice(XMP_NAMESPACE);
        contents.extend_from_slice(xmp.as_bytes());
        segments.insert(
            at,
            JpegSegment::new_with_contents(markers::APP1, Bytes::from(contents)),
        );
    }

    let mut output = Vec::new();
    jpeg.encoder()
        .write_to(&mut output)
        .map_err(|e| ServeError::Codec(format!("failed to write JPEG: {e}")))?;
    Ok(output)
}

// =============================================================================
// Tests
// =============================================================================
