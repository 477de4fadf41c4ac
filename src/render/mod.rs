//! Rendering pipeline: decode, transform, encode.
//!
//! The renderer decides between two paths. A request that lines up exactly
//! with the tile grid of the chosen level (or asks for a complete smallest
//! level) is served as a single decoded tile, untouched apart from quality
//! conversion. Everything else takes the region path: decode the covering
//! rectangle, resample to the requested output size, convert colourspace,
//! rotate/mirror and encode.

pub mod jpeg;
pub mod png;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, RgbImage};

use crate::config::Config;
use crate::error::ServeError;
use crate::source::{ImageDescriptor, RawTile};
use crate::view::{Colourspace, Flip, ViewSpec};

pub use jpeg::JpegEncoder;
pub use png::PngEncoder;

// =============================================================================
// Output
// =============================================================================

/// Encoded output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
}

impl OutputFormat {
    pub const fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
        }
    }
}

/// A rendered response body.
#[derive(Debug)]
pub struct RenderOutput {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
}

// =============================================================================
// Entry Points
// =============================================================================

/// Render the view against an image.
///
/// `oversampling` bounds the resolution selection; the IIIF surface passes
/// 1.0, the IIP surface passes the configured factor.
pub fn render(
    descriptor: &ImageDescriptor,
    view: &ViewSpec,
    config: &Config,
    format: OutputFormat,
    oversampling: f32,
) -> Result<RenderOutput, ServeError> {
    let resolution = view.resolution(oversampling);
    let index = view.level_index(resolution);
    let (im_w, im_h) = descriptor
        .level_dimensions(index)
        .ok_or_else(|| ServeError::Region(format!("no such level {index}")))?;

    let (vx, vy, vw, vh) = view.region_at(im_w, im_h);
    if vx >= im_w || vy >= im_h {
        return Err(ServeError::Region(
            "the specified region does not intersect with the geometry of the image".to_string(),
        ));
    }

    let (tw, th) = (descriptor.tile_width, descriptor.tile_height);

    // Aligned single-tile request at a reduced level
    let fast_tile = view.maintain_aspect
        && resolution > 0
        && view.requested_width == tw
        && view.requested_height == th
        && vx % tw == 0
        && vy % th == 0
        && vw % tw == 0
        && vh % th == 0
        && vw < im_w
        && vh < im_h;

    // The complete smallest level at its native size
    let fast_full = view.maintain_aspect
        && resolution == 0
        && view.requested_width == im_w
        && view.requested_height == im_h;

    if fast_tile || fast_full {
        let ntlx = im_w.div_ceil(tw);
        let tile_index = (vy / th) * ntlx + (vx / tw);
        return render_tile(descriptor, view, config, format, resolution, tile_index);
    }

    // Region path
    let raw = descriptor.decode_region(index, vx, vy, vw, vh)?;
    let (out_w, out_h) = view.output_size(vw, vh);

    let mut img = to_dynamic(raw)?;
    if (out_w, out_h) != (vw, vh) {
        let filter = if config.bilinear() {
            FilterType::Triangle
        } else {
            FilterType::Nearest
        };
        img = img.resize_exact(out_w, out_h, filter);
    }
    img = apply_colour(img, view);
    img = apply_orientation(img, view);

    let tile = from_dynamic(img);
    let (width, height) = (tile.width, tile.height);
    let data = encode(descriptor, config, format, &tile, true)?;

    Ok(RenderOutput {
        data,
        width,
        height,
        format,
    })
}

/// Emit one tile of a resolution, untouched apart from quality conversion.
///
/// This serves both the IIIF tile fast path and the IIP `JTL` command.
pub fn render_tile(
    descriptor: &ImageDescriptor,
    view: &ViewSpec,
    config: &Config,
    format: OutputFormat,
    resolution: usize,
    tile_index: u32,
) -> Result<RenderOutput, ServeError> {
    if resolution >= descriptor.levels() {
        return Err(ServeError::Parse(format!(
            "resolution {resolution} out of range (image has {} levels)",
            descriptor.levels()
        )));
    }
    let index = descriptor.levels() - 1 - resolution;
    let (im_w, im_h) = descriptor.level_dimensions(index).unwrap_or((0, 0));
    let (tw, th) = (descriptor.tile_width, descriptor.tile_height);

    let ntlx = im_w.div_ceil(tw);
    let ntly = im_h.div_ceil(th);
    if tile_index >= ntlx * ntly {
        return Err(ServeError::Region(format!(
            "tile {tile_index} out of range ({ntlx}x{ntly} tiles at resolution {resolution})"
        )));
    }

    let tx = tile_index % ntlx;
    let ty = tile_index / ntlx;
    let x = tx * tw;
    let y = ty * th;
    let w = tw.min(im_w - x);
    let h = th.min(im_h - y);

    let raw = descriptor.decode_region(index, x, y, w, h)?;
    let img = apply_colour(to_dynamic(raw)?, view);

    let tile = from_dynamic(img);
    let (width, height) = (tile.width, tile.height);
    let data = encode(descriptor, config, format, &tile, false)?;

    Ok(RenderOutput {
        data,
        width,
        height,
        format,
    })
}

// =============================================================================
// Encoding
// =============================================================================

fn encode(
    descriptor: &ImageDescriptor,
    config: &Config,
    format: OutputFormat,
    tile: &RawTile,
    strip_wise: bool,
) -> Result<Vec<u8>, ServeError> {
    let icc = if config.retain_source_icc_profile() {
        descriptor.icc.as_deref()
    } else {
        None
    };
    let xmp = if descriptor.xmp.is_empty() {
        None
    } else {
        Some(descriptor.xmp.as_str())
    };

    match format {
        OutputFormat::Jpeg => {
            let encoder = JpegEncoder::new(config.jpeg_quality());
            if strip_wise {
                encoder.encode_strips(tile, descriptor.tile_height, icc, xmp)
            } else {
                encoder.encode(tile, icc, xmp)
            }
        }
        OutputFormat::Png => {
            PngEncoder::new(config.png_compression(), config.png_filter()).encode(tile, icc)
        }
    }
}

// =============================================================================
// Pixel Transforms
// =============================================================================

fn to_dynamic(tile: RawTile) -> Result<DynamicImage, ServeError> {
    let RawTile {
        width,
        height,
        channels,
        data,
        ..
    } = tile;
    match channels {
        1 => GrayImage::from_raw(width, height, data)
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(|| ServeError::Codec("greyscale buffer size mismatch".to_string())),
        3 => RgbImage::from_raw(width, height, data)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| ServeError::Codec("RGB buffer size mismatch".to_string())),
        n => Err(ServeError::Codec(format!("cannot render {n} channels"))),
    }
}

fn from_dynamic(img: DynamicImage) -> RawTile {
    match img {
        DynamicImage::ImageLuma8(buf) => {
            let (w, h) = buf.dimensions();
            RawTile::new(w, h, 1, 8, buf.into_raw())
        }
        DynamicImage::ImageRgb8(buf) => {
            let (w, h) = buf.dimensions();
            RawTile::new(w, h, 3, 8, buf.into_raw())
        }
        other => {
            let buf = other.to_rgb8();
            let (w, h) = buf.dimensions();
            RawTile::new(w, h, 3, 8, buf.into_raw())
        }
    }
}

fn apply_colour(img: DynamicImage, view: &ViewSpec) -> DynamicImage {
    let mut img = match view.colourspace {
        Colourspace::Native => img,
        Colourspace::Greyscale => DynamicImage::ImageLuma8(img.to_luma8()),
    };
    if view.bitonal {
        let mut luma = img.to_luma8();
        for px in luma.pixels_mut() {
            px.0[0] = if px.0[0] >= 128 { 255 } else { 0 };
        }
        img = DynamicImage::ImageLuma8(luma);
    }
    img
}

fn apply_orientation(img: DynamicImage, view: &ViewSpec) -> DynamicImage {
    let img = match view.rotation {
        90 => img.rotate90(),
        180 => img.rotate180(),
        270 => img.rotate270(),
        _ => img,
    };
    match view.flip {
        Flip::None => img,
        Flip::Horizontal => img.fliph(),
        Flip::Vertical => img.flipv(),
    }
}

// =============================================================================
// Tests
// =============================================================================
