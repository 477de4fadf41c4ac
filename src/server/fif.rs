//! FIF: identifier-to-image resolution.
//!
//! Resolves a client identifier to a filesystem path (applying the UUID
//! rewrite and the private/public directory probe), opens the image through
//! the metadata cache, applies the embedded max-pixel policy and handles
//! conditional GET. Both the IIIF and IIP surfaces call through here before
//! any rendering happens.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, UNIX_EPOCH};

use regex::Regex;
use tracing::{debug, info, warn};

use crate::cache::{cache_key, MetadataCache};
use crate::config::Config;
use crate::error::{ServeError, SourceError};
use crate::source::{file_timestamp, ImageDescriptor};
use crate::url;
use crate::view::ViewSpec;

/// Separator between an identifier and its max-sample-size marker.
pub const SIZE_SEPARATOR: &str = "__";

/// UUID identifier pattern: `aaa/bbb/cc-dddd-eeee-ffff-gggggggggggg`
/// flattened as `aaabbbcc-dddd-...` with an optional `__size` suffix.
const UUID_PATTERN: &str = r"^/?([a-z0-9]{3})([a-z0-9]{3})([a-z0-9]{2}-[a-z0-9]{4}-[a-z0-9]{4}-[a-z0-9]{4}-[a-z0-9]{12})(?:__(.*))?$";

fn uuid_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(UUID_PATTERN).expect("uuid pattern"))
}

// =============================================================================
// Result Type
// =============================================================================

/// Outcome of a successful resolution.
pub struct ResolvedImage {
    pub descriptor: Arc<ImageDescriptor>,

    /// False when the embedded max-pixel policy constrained this request;
    /// such responses must carry `Cache-Control: no-cache`.
    pub cacheable: bool,
}

// =============================================================================
// Resolution
// =============================================================================

/// Resolve an identifier and open the image.
///
/// `request_uri` is the original request target, used to build the
/// rewritten Location for policy redirects. `if_modified_since` is the raw
/// header value when the client sent one.
pub async fn resolve(
    config: &Config,
    cache: &MetadataCache,
    raw_identifier: &str,
    request_uri: &str,
    if_modified_since: Option<&str>,
    view: &mut ViewSpec,
) -> Result<ResolvedImage, ServeError> {
    debug!("FIF handler reached");

    let decoded = url::decode(raw_identifier);
    if let Some(warning) = &decoded.warning {
        warn!("FIF :: {warning}");
    }
    let mut argument = decoded.value;
    let client_identifier = argument.clone();

    // UUID identifiers map into the image tree, preferring the private
    // directory and falling back to the public one
    if let Some(caps) = uuid_regex().captures(&argument) {
        let dir1 = &caps[1];
        let dir2 = &caps[2];
        let uuid = format!("{dir1}{dir2}{}", &caps[3]);
        let mut fpath = format!("/{dir1}/{dir2}/{uuid}");

        if stat_exists(&join_prefix(config, &format!("private/images{fpath}"))) {
            fpath = format!("/private/images{fpath}");
        } else if stat_exists(&join_prefix(config, &format!("public/images{fpath}"))) {
            fpath = format!("/public/images{fpath}");
        }

        if let Some(size) = caps.get(4) {
            fpath = format!("{fpath}{SIZE_SEPARATOR}{}", size.as_str());
        }

        debug!("FIF :: uuid {uuid} resolved to {fpath}");
        argument = fpath;
    }

    let original_name = last_segment(&argument);

    // A trailing __digits marker constrains the sample size unless a
    // stronger constraint is already in force
    if let Some(at) = argument.find(SIZE_SEPARATOR) {
        let digits: String = argument[at + SIZE_SEPARATOR.len()..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        let marker: u32 = digits
            .parse()
            .map_err(|_| ServeError::Parse("unsupported parameter".to_string()))?;
        argument.truncate(at);
        if view.max_sample_size == 0 {
            view.max_sample_size = marker;
        }
    }

    let revised_name = last_segment(&argument);
    let resolved_path = join_prefix(config, argument.trim_start_matches('/'));
    let key = cache_key(&resolved_path.to_string_lossy(), view.max_sample_size);
    debug!("FIF :: image cache key: {key}");

    // Cache lookup with timestamp revalidation; a descriptor whose file
    // changed on disk is rebuilt under the same key
    let descriptor = match cache.get(&key).await {
        Some(cached) => {
            let disk = file_timestamp(&cached.path).map_err(map_open_error)?;
            if cached.timestamp < disk {
                info!("FIF :: image timestamp changed: reloading metadata");
                let fresh = open_descriptor(config, &resolved_path).await?;
                cache.replace(&key, fresh.clone()).await;
                fresh
            } else {
                debug!("FIF :: image cache hit ({} elements)", cache.len().await);
                cached
            }
        }
        None => {
            debug!("FIF :: image cache miss");
            let fresh = open_descriptor(config, &resolved_path).await?;
            cache.insert(key, fresh.clone()).await;
            fresh
        }
    };

    view.set_image(&descriptor);

    debug!(
        "FIF :: image dimensions are {} x {}, {} channels, {} bits",
        descriptor.width(),
        descriptor.height(),
        descriptor.channels,
        descriptor.bpc
    );

    // Embedded max-pixel policy
    let mut cacheable = true;
    if let Some(value) = extract_xmp_element(&descriptor.xmp, &config.embedded_max_pixels_tag) {
        if let Ok(max_pixels) = value.trim().parse::<i64>() {
            let max_in_request = view.max_sample_size as i64;

            // Any restricted serving disables response caching, whether or
            // not enforcement answers with an error
            if max_pixels <= 0 || max_in_request <= 0 || max_in_request > max_pixels {
                debug!("FIF :: restricted image: response not cacheable");
                cacheable = false;
            }

            if max_pixels <= 0 {
                if config.enforce_embedded_max_sample() {
                    return Err(ServeError::Forbidden);
                }
            } else if (max_in_request <= 0 || max_in_request > max_pixels)
                && config.enforce_embedded_max_sample()
            {
                let location = rewrite_location(
                    request_uri,
                    &original_name,
                    &revised_name,
                    &client_identifier,
                    max_pixels,
                );
                info!("FIF :: redirecting to size-constrained URI {location}");
                return Err(ServeError::PolicyRedirect(location));
            }
        }
    }

    // Conditional GET
    if let Some(since) = if_modified_since {
        match httpdate::parse_http_date(since) {
            Ok(when) => {
                let since_secs = when
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or(Duration::ZERO)
                    .as_secs() as i64;
                if descriptor.timestamp <= since_secs {
                    debug!("FIF :: unmodified content");
                    return Err(ServeError::NotModified);
                }
            }
            Err(_) => warn!("FIF :: unparsable If-Modified-Since: {since}"),
        }
    }

    // Reset angular defaults
    view.xangle = 0;
    view.yangle = 90;

    Ok(ResolvedImage {
        descriptor,
        cacheable,
    })
}

// =============================================================================
// Helpers
// =============================================================================

async fn open_descriptor(
    config: &Config,
    path: &Path,
) -> Result<Arc<ImageDescriptor>, ServeError> {
    let path = path.to_path_buf();
    let pattern = config.filename_pattern.clone();
    let descriptor = tokio::task::spawn_blocking(move || ImageDescriptor::open(&path, &pattern))
        .await
        .map_err(|e| ServeError::Codec(format!("decoder task failed: {e}")))?
        .map_err(map_open_error)?;
    Ok(Arc::new(descriptor))
}

fn map_open_error(e: SourceError) -> ServeError {
    match e {
        SourceError::NotFound(path) => ServeError::File(path),
        other => ServeError::Source(other),
    }
}

fn join_prefix(config: &Config, relative: &str) -> PathBuf {
    if config.filesystem_prefix.is_empty() {
        PathBuf::from(format!("/{}", relative.trim_start_matches('/')))
    } else {
        Path::new(&config.filesystem_prefix).join(relative.trim_start_matches('/'))
    }
}

fn stat_exists(path: &Path) -> bool {
    path.exists()
}

fn last_segment(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

/// Substring scan for a flat XMP element; absent or malformed markup means
/// no restriction.
pub fn extract_xmp_element<'a>(xmp: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xmp.find(&open)? + open.len();
    let end = xmp[start..].find(&close)? + start;
    Some(&xmp[start..end])
}

/// Rewrite the request target so the identifier segment carries the
/// `__{max_pixels}` marker.
///
/// The resolved file name is preferred; identifiers that were rewritten
/// away from their client form (UUID paths) fall back to marking the
/// identifier as the client sent it.
fn rewrite_location(
    request_uri: &str,
    original_name: &str,
    revised_name: &str,
    client_identifier: &str,
    max_pixels: i64,
) -> String {
    let constrained = format!("{revised_name}{SIZE_SEPARATOR}{max_pixels}");
    if !original_name.is_empty() && request_uri.contains(original_name) {
        return request_uri.replacen(original_name, &constrained, 1);
    }

    let identifier = client_identifier.trim_start_matches('/');
    if !identifier.is_empty() && request_uri.contains(identifier) {
        let marked = format!("{identifier}{SIZE_SEPARATOR}{max_pixels}");
        return request_uri.replacen(identifier, &marked, 1);
    }

    format!("{request_uri}{SIZE_SEPARATOR}{max_pixels}")
}

/// Whether a decoded identifier is a bare UUID path. Such identifiers
/// carry no IIIF parameters but must still pass through FIF so the
/// embedded policy can answer with a redirect.
pub fn is_uuid_identifier(argument: &str) -> bool {
    uuid_regex().is_match(argument)
}

// =============================================================================
// Tests
// =============================================================================
