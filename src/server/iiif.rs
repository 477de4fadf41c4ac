//! IIIF Image API parsing and the info.json document.
//!
//! Requests follow `{identifier}/{region}/{size}/{rotation}/{quality}.{format}`
//! or `{identifier}/info.json`. A bare identifier redirects to its
//! info.json service. Exactly four parameter tokens must be present on
//! image requests.

use serde_json::json;

use crate::error::ServeError;
use crate::render::OutputFormat;
use crate::source::ImageDescriptor;
use crate::view::{Colourspace, Flip, ViewSpec};

/// Level-1 compliance profile advertised in info.json.
const IIIF_PROFILE: &str = "http://iiif.io/api/image/2/level1.json";
const IIIF_CONTEXT: &str = "http://iiif.io/api/image/2/context.json";
const IIIF_PROTOCOL: &str = "http://iiif.io/api/image";

const SYNTAX: &str =
    "IIIF syntax is {identifier}/{region}/{size}/{rotation}/{quality}{.format}";

// =============================================================================
// Request Decomposition
// =============================================================================

/// A decomposed IIIF request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IiifRequest {
    /// `{identifier}/info.json`
    Info { identifier: String },

    /// `{identifier}/{region}/{size}/{rotation}/{quality}.{format}`
    Image {
        identifier: String,
        params: String,
    },

    /// Bare identifier: redirect to `{identifier}/info.json`
    Bare { identifier: String },
}

/// Split a decoded request path into identifier and parameters.
pub fn split_request(argument: &str) -> Result<IiifRequest, ServeError> {
    let Some(last_slash) = argument.rfind('/') else {
        return Ok(IiifRequest::Bare {
            identifier: argument.to_string(),
        });
    };

    let suffix = &argument[last_slash + 1..];
    if suffix.starts_with("info") {
        return Ok(IiifRequest::Info {
            identifier: argument[..last_slash].to_string(),
        });
    }

    // Walk back three more separators to find the identifier boundary
    let mut boundary = last_slash;
    for _ in 0..3 {
        boundary = argument[..boundary]
            .rfind('/')
            .ok_or_else(|| ServeError::Parse(format!("not enough parameters. {SYNTAX}")))?;
    }

    Ok(IiifRequest::Image {
        identifier: argument[..boundary].to_string(),
        params: argument[boundary + 1..].to_string(),
    })
}

// =============================================================================
// Parameter Parsing
// =============================================================================

/// Parse the four `{region}/{size}/{rotation}/{quality}.{format}` tokens
/// into the view spec, returning the output format.
pub fn parse_image_params(
    params: &str,
    view: &mut ViewSpec,
    width: u32,
    height: u32,
) -> Result<OutputFormat, ServeError> {
    let tokens: Vec<&str> = params.split('/').collect();
    if tokens.len() > 4 {
        return Err(ServeError::Parse(format!(
            "query has too many parameters. {SYNTAX}"
        )));
    }
    if tokens.len() < 4 {
        return Err(ServeError::Parse(format!(
            "query has too few parameters. {SYNTAX}"
        )));
    }

    parse_region(tokens[0], view, width, height)?;
    parse_size(tokens[1], view, width, height)?;
    parse_rotation(tokens[2], view)?;
    parse_quality_format(tokens[3], view)
}

/// Region parameter: `full`, `square`, `x,y,w,h` or `pct:x,y,w,h`.
fn parse_region(
    region: &str,
    view: &mut ViewSpec,
    width: u32,
    height: u32,
) -> Result<(), ServeError> {
    let region = region.to_lowercase();

    if region == "full" {
        return Ok(());
    }

    // Centered square crop along the longer axis
    if region == "square" {
        if height > width {
            let h = width as f64 / height as f64;
            view.set_view_top((1.0 - h) / 2.0);
            view.set_view_height(h);
        } else if width > height {
            let w = height as f64 / width as f64;
            view.set_view_left((1.0 - w) / 2.0);
            view.set_view_width(w);
        }
        return Ok(());
    }

    let (is_pct, coords) = match region.strip_prefix("pct:") {
        Some(rest) => (true, rest),
        None => (false, region.as_str()),
    };

    let values: Vec<f64> = coords
        .split(',')
        .map(|t| t.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| ServeError::Parse(format!("incorrect region format: {region}")))?;
    if values.len() != 4 {
        return Err(ServeError::Parse(format!(
            "incorrect region format: {region}"
        )));
    }
    if values[2] <= 0.0 || values[3] <= 0.0 {
        return Err(ServeError::Parse(format!(
            "incorrect region format: {region}"
        )));
    }

    // Convert to full-image pixel corners before any clamping
    let (x1, y1, x2, y2) = if is_pct {
        let x1 = values[0] / 100.0 * width as f64;
        let y1 = values[1] / 100.0 * height as f64;
        (
            x1 as i64,
            y1 as i64,
            (x1 + values[2] / 100.0 * width as f64) as i64,
            (y1 + values[3] / 100.0 * height as f64) as i64,
        )
    } else {
        (
            values[0] as i64,
            values[1] as i64,
            (values[0] + values[2]) as i64,
            (values[1] + values[3]) as i64,
        )
    };

    // Regions entirely outside the image cannot be clamped into validity
    if x1 >= width as i64 || x2 <= 0 || y1 >= height as i64 || y2 <= 0 {
        return Err(ServeError::Region(
            "the specified region does not intersect with the geometry of the image".to_string(),
        ));
    }
    if x1 >= x2 || y1 >= y2 {
        return Err(ServeError::Region(
            "the specified region does not intersect with the geometry of the image".to_string(),
        ));
    }
    // A region larger than the image itself cannot be satisfied either;
    // only overhang from an interior origin is clamped (edge tiles)
    if x2 - x1 > width as i64 || y2 - y1 > height as i64 {
        return Err(ServeError::Region(
            "the specified region exceeds the geometry of the image".to_string(),
        ));
    }

    let x1 = x1.clamp(0, width as i64 - 1);
    let y1 = y1.clamp(0, height as i64 - 1);
    let x2 = x2.clamp(0, width as i64);
    let y2 = y2.clamp(0, height as i64);

    view.set_view_left(x1 as f64 / width as f64);
    view.set_view_top(y1 as f64 / height as f64);
    view.set_view_width((x2 - x1) as f64 / width as f64);
    view.set_view_height((y2 - y1) as f64 / height as f64);

    Ok(())
}

/// Size parameter: `full`, `pct:n`, `w,h`, `!w,h`, `w,` or `,h`.
fn parse_size(
    size: &str,
    view: &mut ViewSpec,
    width: u32,
    height: u32,
) -> Result<(), ServeError> {
    let size = size.to_lowercase();

    // Region dimensions in full-image pixels are the starting point
    let mut requested_width = (view.view_width() * width as f64).round() as u32;
    let mut requested_height = (view.view_height() * height as f64).round() as u32;
    let ratio = requested_width as f64 / requested_height.max(1) as f64;

    if size == "full" {
        // Keep the region dimensions
    } else if let Some(pct) = size.strip_prefix("pct:") {
        let scale: f64 = pct
            .parse()
            .map_err(|_| ServeError::Parse("invalid size".to_string()))?;
        requested_width = (requested_width as f64 * scale / 100.0).round() as u32;
        requested_height = (requested_height as f64 * scale / 100.0).round() as u32;
    } else {
        let spec = match size.strip_prefix('!') {
            Some(rest) => rest,
            None => {
                view.maintain_aspect = false;
                size.as_str()
            }
        };

        let comma = spec
            .find(',')
            .ok_or_else(|| ServeError::Parse("invalid size: no comma found".to_string()))?;

        if comma == 0 {
            // ",h": derive the width
            requested_height = spec[1..]
                .parse()
                .map_err(|_| ServeError::Parse("invalid height".to_string()))?;
            requested_width = (requested_height as f64 * ratio).round() as u32;
            view.maintain_aspect = true;
        } else if comma == spec.len() - 1 {
            // "w,": derive the height
            requested_width = spec[..comma]
                .parse()
                .map_err(|_| ServeError::Parse("invalid width".to_string()))?;
            requested_height = (requested_width as f64 / ratio).round() as u32;
            view.maintain_aspect = true;
        } else {
            requested_width = spec[..comma]
                .parse()
                .map_err(|_| ServeError::Parse("invalid width".to_string()))?;
            requested_height = spec[comma + 1..]
                .parse()
                .map_err(|_| ServeError::Parse("invalid height".to_string()))?;
            // "!w,h" fits inside the box preserving aspect
            if view.maintain_aspect {
                let fit = (requested_width as f64 / (view.view_width() * width as f64))
                    .min(requested_height as f64 / (view.view_height() * height as f64));
                requested_width =
                    ((view.view_width() * width as f64) * fit).round() as u32;
                requested_height =
                    ((view.view_height() * height as f64) * fit).round() as u32;
            }
        }
    }

    if requested_width == 0 || requested_height == 0 {
        return Err(ServeError::Parse("invalid size".to_string()));
    }

    // Clamp the larger axis to the effective output cap
    let max = view.effective_max_size();
    if max > 0 && (requested_width > max || requested_height > max) {
        if ratio > 1.0 {
            requested_width = max;
            requested_height = if view.maintain_aspect {
                ((max as f64 / ratio).round() as u32).max(1)
            } else {
                requested_height.min(max)
            };
        } else {
            requested_height = max;
            requested_width = if view.maintain_aspect {
                ((max as f64 * ratio).round() as u32).max(1)
            } else {
                requested_width.min(max)
            };
        }
    }

    view.requested_width = requested_width;
    view.requested_height = requested_height;
    Ok(())
}

/// Parse a rotation token. Shared with the IIP `ROT` argument, which uses
/// the same grammar.
pub fn parse_rotation_token(rotation: &str, view: &mut ViewSpec) -> Result<(), ServeError> {
    parse_rotation(rotation, view)
}

/// Rotation parameter: optional leading `!` mirror plus one of
/// 0/90/180/270/360 degrees.
fn parse_rotation(rotation: &str, view: &mut ViewSpec) -> Result<(), ServeError> {
    let (flipped, spec) = match rotation.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, rotation),
    };
    if flipped {
        view.flip = Flip::Horizontal;
    }

    let degrees: f32 = spec
        .parse()
        .map_err(|_| ServeError::Parse("invalid rotation".to_string()))?;
    if ![0.0, 90.0, 180.0, 270.0, 360.0].contains(&degrees) {
        return Err(ServeError::Parse(
            "currently implemented rotation angles are 0, 90, 180 and 270 degrees".to_string(),
        ));
    }

    // A mirrored half-turn is just a vertical flip
    if degrees == 180.0 && view.flip == Flip::Horizontal {
        view.flip = Flip::Vertical;
    } else {
        view.set_rotation(degrees as u16);
    }

    Ok(())
}

/// Quality and format: `{quality}.{format}` with the format defaulting to
/// JPEG when no dot is present.
fn parse_quality_format(token: &str, view: &mut ViewSpec) -> Result<OutputFormat, ServeError> {
    let token = token.to_lowercase();

    let (quality, format) = match token.rfind('.') {
        Some(dot) => {
            let format = match &token[dot + 1..] {
                "jpg" => OutputFormat::Jpeg,
                "png" => OutputFormat::Png,
                _ => {
                    return Err(ServeError::Parse(
                        "only JPEG and PNG output supported".to_string(),
                    ))
                }
            };
            (token[..dot].to_string(), format)
        }
        None => (token.clone(), OutputFormat::Jpeg),
    };

    match quality.as_str() {
        "native" | "color" | "default" => {}
        "grey" | "gray" | "grayscale" | "greyscale" => {
            view.colourspace = Colourspace::Greyscale;
        }
        "bitonal" => {
            view.colourspace = Colourspace::Greyscale;
            view.bitonal = true;
        }
        _ => {
            return Err(ServeError::Parse(
                "unsupported quality parameter - must be one of native, color, grey, or bitonal"
                    .to_string(),
            ))
        }
    }

    Ok(format)
}

// =============================================================================
// info.json
// =============================================================================

/// Build the info.json capability document.
///
/// `iiif_id` is the canonical resolved URL of the image service.
pub fn info_json(descriptor: &ImageDescriptor, view: &ViewSpec, iiif_id: &str) -> String {
    let levels = descriptor.levels();
    let max = view.effective_max_size();

    // Smallest level first, then the intermediate levels in ascending size,
    // all filtered by the output cap. The full image itself is not listed.
    let mut sizes = vec![json!({
        "width": descriptor.level_widths[levels - 1],
        "height": descriptor.level_heights[levels - 1],
    })];
    for i in (1..levels.saturating_sub(1)).rev() {
        let w = descriptor.level_widths[i];
        let h = descriptor.level_heights[i];
        if max == 0 || (w < max && h < max) {
            sizes.push(json!({ "width": w, "height": h }));
        }
    }

    let scale_factors: Vec<u64> = (0..levels as u32).map(|i| 1u64 << i).collect();

    let document = json!({
        "@context": IIIF_CONTEXT,
        "@id": iiif_id,
        "protocol": IIIF_PROTOCOL,
        "width": descriptor.width(),
        "height": descriptor.height(),
        "sizes": sizes,
        "tiles": [{
            "width": descriptor.tile_width,
            "height": descriptor.tile_height,
            "scaleFactors": scale_factors,
        }],
        "profile": [
            IIIF_PROFILE,
            {
                "formats": ["jpg", "png"],
                "qualities": ["native", "color", "gray"],
                "supports": [
                    "regionByPct", "regionSquare", "sizeByForcedWh", "sizeByWh",
                    "sizeAboveFull", "rotationBy90s", "mirroring",
                ],
            },
        ],
    });

    serde_json::to_string_pretty(&document).expect("info.json serialization")
}

// =============================================================================
// Tests
// =============================================================================
