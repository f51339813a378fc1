//! Request path decoding and normalization.

use crate::protocol::{BadRequest, RequestRejectionReason};

/// Decodes `raw` into the path handed to the application.
///
/// Percent-escapes are decoded except `%2F`, which would otherwise turn into a segment
/// separator. Dot segments are removed afterwards, so escaped dots are normalized too.
pub(crate) fn decode_path(raw: &[u8], encoded: bool, has_dot_segments: bool) -> Result<String, BadRequest> {
    let decoded = if encoded { percent_decode(raw) } else { raw.to_vec() };
    let normalized = if has_dot_segments || encoded { remove_dot_segments(&decoded) } else { decoded };
    String::from_utf8(normalized).map_err(|e| BadRequest::with_detail(RequestRejectionReason::InvalidRequestTarget, e.as_bytes()))
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn percent_decode(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%'
            && let (Some(hi), Some(lo)) = (raw.get(i + 1).copied().and_then(hex_value), raw.get(i + 2).copied().and_then(hex_value))
        {
            let byte = (hi << 4) | lo;
            if byte == b'/' {
                out.extend_from_slice(&raw[i..i + 3]);
            } else {
                out.push(byte);
            }
            i += 3;
            continue;
        }
        out.push(raw[i]);
        i += 1;
    }
    out
}

/// Removes `.` and `..` segments from an absolute path.
fn remove_dot_segments(path: &[u8]) -> Vec<u8> {
    if !path.starts_with(b"/") {
        return path.to_vec();
    }

    let mut segments: Vec<&[u8]> = Vec::new();
    let mut trailing_slash = false;
    for segment in path.split(|&b| b == b'/').skip(1) {
        trailing_slash = false;
        match segment {
            b"." => trailing_slash = true,
            b".." => {
                segments.pop();
                trailing_slash = true;
            }
            _ => segments.push(segment),
        }
    }

    let mut out = Vec::with_capacity(path.len());
    for segment in segments {
        out.push(b'/');
        out.extend_from_slice(segment);
    }
    if trailing_slash || out.is_empty() {
        out.push(b'/');
    }
    out
}

/// Splits `path` after `base` when it starts with it on a segment boundary, ignoring ASCII
/// case. Returns the remaining path.
pub(crate) fn strip_path_base<'a>(path: &'a str, base: &str) -> Option<&'a str> {
    let base = base.trim_end_matches('/');
    if base.is_empty() || path.len() < base.len() {
        return None;
    }
    let (head, rest) = path.split_at_checked(base.len())?;
    (head.eq_ignore_ascii_case(base) && (rest.is_empty() || rest.starts_with('/'))).then_some(rest)
}
