//! Legacy IIP query dialect.
//!
//! Requests arrive CGI-style: `?FIF=path&WID=..&HEI=..&RGN=x,y,w,h&ROT=..
//! &QLT=..&CVT=jpeg` for region exports, or `?FIF=path&JTL=r,t` for a raw
//! tile of resolution `r`. Object metadata queries (`OBJ=`) are not
//! supported.

use crate::error::ServeError;
use crate::render::OutputFormat;
use crate::view::ViewSpec;

/// Parsed IIP command set.
#[derive(Debug, Clone, PartialEq)]
pub struct IipRequest {
    /// Image identifier from `FIF`
    pub identifier: String,

    /// Output width from `WID`
    pub width: Option<u32>,

    /// Output height from `HEI`
    pub height: Option<u32>,

    /// Fractional region from `RGN`
    pub region: Option<(f64, f64, f64, f64)>,

    /// Rotation from `ROT` (same grammar as the IIIF rotation token)
    pub rotation: Option<String>,

    /// Per-request JPEG quality from `QLT`
    pub quality: Option<u8>,

    /// Terminal command
    pub command: IipCommand,
}

/// The command that produces the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IipCommand {
    /// `CVT=jpeg|png`: region export
    Convert(OutputFormat),

    /// `JTL=r,t`: raw tile `t` of resolution `r`
    Tile { resolution: usize, index: u32 },
}

/// Parse the query pairs of an IIP request.
///
/// `pairs` preserves the order they appeared in; the terminal command is
/// whichever of `CVT`/`JTL` occurs (JTL wins when both are present, as a
/// tile request needs no convert pipeline).
pub fn parse_query(pairs: &[(String, String)]) -> Result<IipRequest, ServeError> {
    let mut identifier = None;
    let mut width = None;
    let mut height = None;
    let mut region = None;
    let mut rotation = None;
    let mut quality = None;
    let mut convert = None;
    let mut tile = None;

    for (key, value) in pairs {
        match key.to_uppercase().as_str() {
            "FIF" => identifier = Some(value.clone()),
            "WID" => {
                width = Some(value.parse::<u32>().map_err(|_| {
                    ServeError::Parse(format!("invalid WID argument: {value}"))
                })?)
            }
            "HEI" => {
                height = Some(value.parse::<u32>().map_err(|_| {
                    ServeError::Parse(format!("invalid HEI argument: {value}"))
                })?)
            }
            "RGN" => region = Some(parse_region(value)?),
            "ROT" => rotation = Some(value.clone()),
            "QLT" => {
                let q = value.parse::<i32>().map_err(|_| {
                    ServeError::Parse(format!("invalid QLT argument: {value}"))
                })?;
                quality = Some(q.clamp(1, 100) as u8);
            }
            "CVT" => convert = Some(parse_convert(value)?),
            "JTL" => tile = Some(parse_tile(value)?),
            // Unknown commands are ignored for compatibility with older
            // clients that send OBJ probes alongside tile requests
            _ => {}
        }
    }

    let identifier =
        identifier.ok_or_else(|| ServeError::Parse("no FIF argument given".to_string()))?;

    let command = if let Some((resolution, index)) = tile {
        IipCommand::Tile { resolution, index }
    } else if let Some(format) = convert {
        IipCommand::Convert(format)
    } else {
        return Err(ServeError::Parse(
            "no CVT or JTL command given".to_string(),
        ));
    };

    Ok(IipRequest {
        identifier,
        width,
        height,
        region,
        rotation,
        quality,
        command,
    })
}

/// Apply the parsed size and region to a view spec.
pub fn apply_to_view(request: &IipRequest, view: &mut ViewSpec) -> Result<(), ServeError> {
    if let Some((x, y, w, h)) = request.region {
        view.set_view_left(x);
        view.set_view_top(y);
        view.set_view_width(w);
        view.set_view_height(h);
    }
    if let Some(w) = request.width {
        view.requested_width = w;
    }
    if let Some(h) = request.height {
        view.requested_height = h;
    }
    if let Some(rotation) = &request.rotation {
        super::iiif::parse_rotation_token(rotation, view)?;
    }
    Ok(())
}

/// `RGN=x,y,w,h` as fractions of the full image.
fn parse_region(value: &str) -> Result<(f64, f64, f64, f64), ServeError> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|t| t.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| ServeError::Parse(format!("invalid RGN argument: {value}")))?;
    if parts.len() != 4 {
        return Err(ServeError::Parse(format!("invalid RGN argument: {value}")));
    }
    if parts[2] <= 0.0 || parts[3] <= 0.0 {
        return Err(ServeError::Region(format!(
            "RGN region has no area: {value}"
        )));
    }
    Ok((parts[0], parts[1], parts[2], parts[3]))
}

fn parse_convert(value: &str) -> Result<OutputFormat, ServeError> {
    match value.to_lowercase().as_str() {
        "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
        "png" => Ok(OutputFormat::Png),
        other => Err(ServeError::Parse(format!(
            "unsupported CVT output: {other}"
        ))),
    }
}

fn parse_tile(value: &str) -> Result<(usize, u32), ServeError> {
    let parts: Vec<&str> = value.split(',').collect();
    if parts.len() != 2 {
        return Err(ServeError::Parse(format!("invalid JTL argument: {value}")));
    }
    let resolution = parts[0]
        .trim()
        .parse::<usize>()
        .map_err(|_| ServeError::Parse(format!("invalid JTL resolution: {value}")))?;
    let index = parts[1]
        .trim()
        .parse::<u32>()
        .map_err(|_| ServeError::Parse(format!("invalid JTL tile: {value}")))?;
    Ok((resolution, index))
}

// =============================================================================
// Tests
// =============================================================================
