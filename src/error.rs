use thiserror::Error;

/// Errors raised by the pyramid image readers.
#[derive(Debug, Error)]
pub enum SourceError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image file is missing or unreadable
    #[error("file not found: {0}")]
    NotFound(String),

    /// TIFF structure error
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// JPEG2000 codestream error
    #[error("JPEG2000 error: {0}")]
    Jpeg2000(String),

    /// File is not a recognized pyramidal format
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// File parsed but does not describe a usable pyramid
    #[error("invalid pyramid: {0}")]
    InvalidPyramid(String),

    /// Pixel decode failed
    #[error("decode error: {0}")]
    Decode(String),
}

/// Request-level errors, mapped to HTTP status codes at the boundary.
///
/// The mapping lives in [`crate::server::handlers`]:
/// Parse/Region -> 400, File -> 404 (internal code "1 3"),
/// Forbidden -> 403, redirects -> 303, NotModified -> 304,
/// Codec and non-404 source errors -> 500.
#[derive(Debug, Error)]
pub enum ServeError {
    /// Bad URL, bad grammar, unsupported quality or format
    #[error("{0}")]
    Parse(String),

    /// Region does not intersect the image, or has zero area
    #[error("invalid region: {0}")]
    Region(String),

    /// Missing or unreadable image
    #[error("file not found: {0}")]
    File(String),

    /// Embedded max-pixel restriction of zero with enforcement enabled
    #[error("restricted image")]
    Forbidden,

    /// Embedded max-pixel exceeded: redirect to a size-constrained URI.
    /// Never cacheable.
    #[error("see other: {0}")]
    PolicyRedirect(String),

    /// Bare identifier: redirect to the info.json service
    #[error("see other: {0}")]
    InfoRedirect(String),

    /// If-Modified-Since satisfied
    #[error("not modified")]
    NotModified,

    /// Encoder precondition violated (channels or bit depth)
    #[error("encoder error: {0}")]
    Codec(String),

    /// Reader failure
    #[error(transparent)]
    Source(#[from] SourceError),
}

impl ServeError {
    /// Whether the response produced for this error may be cached.
    pub fn cacheable(&self) -> bool {
        !matches!(self, ServeError::Forbidden | ServeError::PolicyRedirect(_))
    }
}
