//! URL decoding and sanitisation for image identifiers.
//!
//! Incoming identifiers are percent-decoded, malformed escape sequences are
//! flagged (but never rejected), and `../` segments are stripped so a
//! request can never escape the configured filesystem prefix.

/// Result of decoding a raw request path.
#[derive(Debug, Clone)]
pub struct DecodedUrl {
    /// The decoded, traversal-free identifier
    pub value: String,

    /// Set when the raw input contained malformed percent escapes
    pub warning: Option<String>,
}

/// Percent-decode a raw identifier and strip any `../` segments.
pub fn decode(raw: &str) -> DecodedUrl {
    let warning = malformed_escape(raw)
        .map(|pos| format!("malformed percent escape at byte {pos} in \"{raw}\""));

    let decoded = urlencoding::decode_binary(raw.as_bytes());
    let decoded = String::from_utf8_lossy(&decoded);

    DecodedUrl {
        value: strip_traversal(&decoded),
        warning,
    }
}

/// Remove every `../` occurrence, repeating until none remain so that
/// sequences like `..../` cannot reassemble into a traversal after one pass.
pub fn strip_traversal(path: &str) -> String {
    let mut out = path.to_string();
    while let Some(n) = out.find("../") {
        out.replace_range(n..n + 3, "");
    }
    out
}

/// Re-encode a resolved identifier so it is safe to embed in JSON output.
///
/// Path structure is preserved: `/` and `:` stay literal, everything else
/// follows standard percent-encoding.
pub fn escape(value: &str) -> String {
    let encoded = urlencoding::encode(value);
    encoded.replace("%2F", "/").replace("%3A", ":")
}

/// Find the first malformed percent escape, if any.
fn malformed_escape(raw: &str) -> Option<usize> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 2 >= bytes.len()
                || !bytes[i + 1].is_ascii_hexdigit()
                || !bytes[i + 2].is_ascii_hexdigit()
            {
                return Some(i);
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    None
}

// =============================================================================
// Tests
// =============================================================================
