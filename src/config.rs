//! Configuration for the tile server.
//!
//! Every option can be set either as a CLI flag or through the environment
//! variable named after it (`VERBOSITY`, `FILESYSTEM_PREFIX`, ...). The
//! configuration is resolved once at startup, clamped to valid ranges with
//! [`Config::clamped`], and shared read-only for the lifetime of the
//! process.

use clap::Parser;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default log file path.
pub const DEFAULT_LOGFILE: &str = "/tmp/iiif-streamer.log";

/// Default descriptor-cache capacity (number of cached image headers).
pub const DEFAULT_METADATA_CACHE_CAPACITY: i64 = 1000;

/// Default JPEG quality.
pub const DEFAULT_JPEG_QUALITY: i32 = 75;

/// Default output pixel cap for region requests.
pub const DEFAULT_MAX_CVT: i32 = 5000;

/// Smallest accepted MAX_CVT value.
pub const MIN_MAX_CVT: i32 = 64;

/// Default Cache-Control header value (24 hours).
pub const DEFAULT_CACHE_CONTROL: &str = "max-age=86400";

/// Default XMP element consulted by the embedded max-pixel policy.
pub const DEFAULT_MAX_PIXELS_TAG: &str = "nga:imgMaxPublicPixels";

// =============================================================================
// CLI Arguments
// =============================================================================

/// IIIF Streamer - a tile server for pyramidal raster images.
///
/// Serves arbitrary regions and scaled views from multi-resolution TIFF and
/// JPEG2000 images over the IIIF Image API and the legacy IIP protocol.
#[derive(Parser, Debug, Clone)]
#[command(name = "iiif-streamer")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "PORT")]
    pub port: u16,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Log verbosity (0 = errors only, 1 = info, 2 = debug, 3+ = trace).
    #[arg(long, default_value_t = 1, env = "VERBOSITY")]
    pub verbosity: i32,

    /// Log file path. Logs go to stderr when empty.
    #[arg(long, default_value = DEFAULT_LOGFILE, env = "LOGFILE")]
    pub logfile: String,

    // =========================================================================
    // Image Access
    // =========================================================================
    /// Prefix prepended to every resolved image path.
    #[arg(long, default_value = "", env = "FILESYSTEM_PREFIX")]
    pub filesystem_prefix: String,

    /// Substring identifying pyramidal TIFF files by name.
    #[arg(long, default_value = "_pyr_", env = "FILENAME_PATTERN")]
    pub filename_pattern: String,

    /// Data-cache budget in megabytes.
    #[arg(long, default_value_t = 10.0, env = "MAX_IMAGE_CACHE_SIZE")]
    pub max_image_cache_size: f32,

    /// Number of image descriptors kept in the metadata cache (0 disables it).
    #[arg(long, default_value_t = DEFAULT_METADATA_CACHE_CAPACITY, env = "MAX_HEADERS_IN_METADATA_CACHE")]
    pub max_headers_in_metadata_cache: i64,

    // =========================================================================
    // Output Limits
    // =========================================================================
    /// JPEG quality for encoded output (clamped to 1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "JPEG_QUALITY")]
    pub jpeg_quality: i32,

    /// Maximum output dimension in pixels for region requests (minimum 64).
    #[arg(long, default_value_t = DEFAULT_MAX_CVT, env = "MAX_CVT")]
    pub max_cvt: i32,

    /// Server-wide maximum sample edge (0 = unrestricted).
    #[arg(long, default_value_t = 0, env = "MAX_SAMPLE_SIZE")]
    pub max_sample_size: i64,

    /// JPEG2000 quality layers to decode (0 = all).
    #[arg(long, default_value_t = 0, env = "MAX_LAYERS")]
    pub max_layers: i32,

    /// Permit serving output larger than the source region.
    #[arg(long, default_value_t = 1, env = "ALLOW_UPSCALING")]
    pub allow_upscaling: i32,

    /// Resolution-selection oversampling factor (clamped to 1.0-2.0).
    #[arg(long, default_value_t = 1.0, env = "OVERSAMPLING_FACTOR")]
    pub oversampling_factor: f32,

    /// Resampling kernel: 0 = nearest neighbour, 1 = bilinear.
    #[arg(long, default_value_t = 1, env = "INTERPOLATION")]
    pub interpolation: u32,

    // =========================================================================
    // Embedded Metadata Policy
    // =========================================================================
    /// Enforce the embedded max-pixel policy (403/303 responses).
    #[arg(long, default_value_t = 1, env = "ENFORCE_EMBEDDED_MAX_SAMPLE")]
    pub enforce_embedded_max_sample: i32,

    /// XMP element holding the public max-pixel value.
    #[arg(long, default_value = DEFAULT_MAX_PIXELS_TAG, env = "EMBEDDED_MAX_PIXELS_TAG")]
    pub embedded_max_pixels_tag: String,

    /// Keep the source ICC profile in encoded output.
    #[arg(long, default_value_t = 0, env = "RETAIN_SOURCE_ICC_PROFILE")]
    pub retain_source_icc_profile: i32,

    // =========================================================================
    // HTTP Response Headers
    // =========================================================================
    /// Access-Control-Allow-Origin value (empty disables CORS headers).
    #[arg(long, default_value = "", env = "CORS")]
    pub cors: String,

    /// Server-visible base URL when running behind a rewriting proxy.
    #[arg(long, default_value = "", env = "BASE_URL")]
    pub base_url: String,

    /// Cache-Control header value for successful responses.
    #[arg(long, default_value = DEFAULT_CACHE_CONTROL, env = "CACHE_CONTROL")]
    pub cache_control: String,

    /// Path prefix under which the IIIF endpoint is mounted.
    #[arg(long, default_value = "", env = "IIIF_PREFIX")]
    pub iiif_prefix: String,

    // =========================================================================
    // PNG Output
    // =========================================================================
    /// PNG compression level by zlib name (Z_BEST_SPEED, Z_BEST_COMPRESSION,
    /// Z_DEFAULT_COMPRESSION). Anything else means no compression effort.
    #[arg(long, default_value = "", env = "PNG_COMPRESSION_LEVEL")]
    pub png_compression_level: String,

    /// PNG filter type by libpng name (PNG_FILTER_NONE, PNG_FILTER_SUB,
    /// PNG_FILTER_UP, PNG_FILTER_AVG, PNG_FILTER_PAETH, PNG_ALL_FILTERS).
    #[arg(long, default_value = "", env = "PNG_FILTER_TYPE")]
    pub png_filter_type: String,

    // =========================================================================
    // Watermarking (recognized, not applied by the core pipeline)
    // =========================================================================
    /// Watermark image path.
    #[arg(long, default_value = "", env = "WATERMARK")]
    pub watermark: String,

    /// Probability that a tile is watermarked (clamped to 0.0-1.0).
    #[arg(long, default_value_t = 1.0, env = "WATERMARK_PROBABILITY")]
    pub watermark_probability: f32,

    /// Watermark opacity (clamped to 0.0-1.0).
    #[arg(long, default_value_t = 1.0, env = "WATERMARK_OPACITY")]
    pub watermark_opacity: f32,

    // =========================================================================
    // External Byte Cache (recognized, opaque to the core pipeline)
    // =========================================================================
    /// Memcached server list.
    #[arg(long, default_value = "localhost", env = "MEMCACHED_SERVERS")]
    pub memcached_servers: String,

    /// Memcached entry lifetime in seconds.
    #[arg(long, default_value_t = 86400, env = "MEMCACHED_TIMEOUT")]
    pub memcached_timeout: u32,

    /// Bypass the primary memcache.
    #[arg(long, default_value_t = 0, env = "DISABLE_PRIMARY_MEMCACHE")]
    pub disable_primary_memcache: i32,
}

// =============================================================================
// PNG Option Enums
// =============================================================================

/// Symbolic PNG compression level resolved from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PngCompression {
    /// No compression effort (the default)
    None,
    BestSpeed,
    BestCompression,
    Default,
}

/// Symbolic PNG filter type resolved from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PngFilter {
    /// No filtering (the default)
    NoFilters,
    Sub,
    Up,
    Avg,
    Paeth,
    All,
}

// =============================================================================
// Accessors
// =============================================================================

impl Config {
    /// Apply range clamping to all numeric options.
    ///
    /// Mirrors the resolution rules of the option set: negative counts
    /// become zero, quality is forced into 1-100, MAX_CVT has a floor of
    /// 64, the oversampling factor stays within 1.0-2.0 and the 0/1 flags
    /// collapse to canonical values.
    pub fn clamped(mut self) -> Self {
        if self.verbosity < 0 {
            self.verbosity = 0;
        }
        if self.max_headers_in_metadata_cache < 0 {
            self.max_headers_in_metadata_cache = 0;
        }
        self.jpeg_quality = self.jpeg_quality.clamp(1, 100);
        if self.max_cvt < MIN_MAX_CVT {
            self.max_cvt = MIN_MAX_CVT;
        }
        if self.max_sample_size < 0 {
            self.max_sample_size = 0;
        }
        self.oversampling_factor = self.oversampling_factor.clamp(1.0, 2.0);
        self.watermark_probability = self.watermark_probability.clamp(0.0, 1.0);
        self.watermark_opacity = self.watermark_opacity.clamp(0.0, 1.0);
        if self.retain_source_icc_profile != 1 {
            self.retain_source_icc_profile = 0;
        }
        if self.disable_primary_memcache != 1 {
            self.disable_primary_memcache = 0;
        }
        self
    }

    /// Validate the configuration, returning a message for the operator on
    /// failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("port must be greater than 0".to_string());
        }
        if self.max_image_cache_size <= 0.0 {
            return Err("MAX_IMAGE_CACHE_SIZE must be positive".to_string());
        }
        Ok(())
    }

    /// Server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Metadata cache capacity; zero disables the cache.
    pub fn metadata_cache_capacity(&self) -> usize {
        self.max_headers_in_metadata_cache as usize
    }

    /// JPEG quality as the encoder expects it.
    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality.clamp(1, 100) as u8
    }

    /// Output pixel cap for region requests.
    pub fn max_cvt(&self) -> u32 {
        self.max_cvt.max(MIN_MAX_CVT) as u32
    }

    /// Server-wide max sample edge (0 = unrestricted).
    pub fn max_sample_size(&self) -> u32 {
        self.max_sample_size.max(0) as u32
    }

    pub fn allow_upscaling(&self) -> bool {
        self.allow_upscaling != 0
    }

    pub fn retain_source_icc_profile(&self) -> bool {
        self.retain_source_icc_profile == 1
    }

    pub fn enforce_embedded_max_sample(&self) -> bool {
        self.enforce_embedded_max_sample != 0
    }

    /// Whether region resampling uses bilinear interpolation.
    pub fn bilinear(&self) -> bool {
        self.interpolation != 0
    }

    /// PNG compression level. Known zlib names match exactly; anything else
    /// resolves to no compression.
    pub fn png_compression(&self) -> PngCompression {
        match self.png_compression_level.as_str() {
            "Z_BEST_SPEED" => PngCompression::BestSpeed,
            "Z_BEST_COMPRESSION" => PngCompression::BestCompression,
            "Z_DEFAULT_COMPRESSION" => PngCompression::Default,
            _ => PngCompression::None,
        }
    }

    /// PNG filter type. Known libpng names match exactly; anything else
    /// resolves to no filtering.
    pub fn png_filter(&self) -> PngFilter {
        match self.png_filter_type.as_str() {
            "PNG_FILTER_NONE" => PngFilter::NoFilters,
            "PNG_FILTER_SUB" => PngFilter::Sub,
            "PNG_FILTER_UP" => PngFilter::Up,
            "PNG_FILTER_AVG" => PngFilter::Avg,
            "PNG_FILTER_PAETH" => PngFilter::Paeth,
            "PNG_ALL_FILTERS" => PngFilter::All,
            _ => PngFilter::NoFilters,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
