//! Utility macros and functions shared across the engine.

/// A macro for early returns with an error if a condition is not met.
///
/// This is similar to the `assert!` macro, but returns an error instead of panicking.
///
/// ```ignore
/// ensure!(count < limit, BadRequest::new(RequestRejectionReason::TooManyHeaders));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;

/// Upper bound of an escaped snippet attached to a rejection.
pub(crate) const MAX_ESCAPED_LEN: usize = 128;

/// Renders raw request bytes for a log line.
///
/// Visible ASCII is kept, everything else becomes `\xNN`. The output is cut at `max_len`
/// characters and ends with `...` when truncated.
pub(crate) fn escape_bytes(bytes: &[u8], max_len: usize) -> String {
    let mut escaped = String::with_capacity(bytes.len().min(max_len) + 3);
    for &b in bytes {
        let piece_len = if (0x20..0x7f).contains(&b) { 1 } else { 4 };
        if escaped.len() + piece_len > max_len {
            escaped.push_str("...");
            return escaped;
        }
        match b {
            0x20..0x7f => escaped.push(char::from(b)),
            _ => {
                const HEX: &[u8; 16] = b"0123456789ABCDEF";
                escaped.push_str("\\x");
                escaped.push(char::from(HEX[usize::from(b >> 4)]));
                escaped.push(char::from(HEX[usize::from(b & 0x0f)]));
            }
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_visible_ascii() {
        assert_eq!(escape_bytes(b"GET / HTTP/1.1", 128), "GET / HTTP/1.1");
    }

    #[test]
    fn escapes_control_bytes() {
        assert_eq!(escape_bytes(b"a\r\n\x00", 128), "a\\x0D\\x0A\\x00");
    }

    #[test]
    fn truncates_long_input() {
        let input = [b'a'; 300];
        let escaped = escape_bytes(&input, 16);
        assert_eq!(escaped, "aaaaaaaaaaaaaaaa...");
    }
}
