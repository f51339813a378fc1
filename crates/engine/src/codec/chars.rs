//! Byte classes used by the request parser.

const fn build_token_table() -> [bool; 256] {
    let mut table = [false; 256];
    let mut i = 0;
    while i < 256 {
        let b = i as u8;
        table[i] = b.is_ascii_alphanumeric()
            || matches!(b, b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~');
        i += 1;
    }
    table
}

const fn build_target_table() -> [bool; 256] {
    let mut table = [false; 256];
    let mut i = 0;
    while i < 256 {
        // visible ASCII and obs-text, no controls, no space, no DEL
        table[i] = i > 0x20 && i != 0x7f;
        i += 1;
    }
    table
}

static TOKEN: [bool; 256] = build_token_table();
static TARGET: [bool; 256] = build_target_table();

/// `tchar` as defined for methods and header field names.
#[inline]
pub(crate) fn is_token(b: u8) -> bool {
    TOKEN[usize::from(b)]
}

#[inline]
pub(crate) fn is_target(b: u8) -> bool {
    TARGET[usize::from(b)]
}

#[inline]
pub(crate) fn is_whitespace(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

/// Characters allowed in a Host header value: reg-name, IPv4, bracketed IPv6 and a port.
#[inline]
pub(crate) fn is_host(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'-' | b'.' | b'_' | b'~' | b'!' | b'$' | b'&' | b'\'' | b'(' | b')' | b'*' | b'+' | b',' | b';' | b'='
                | b'%' | b':' | b'[' | b']'
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_chars() {
        assert!(b"GET".iter().all(|&b| is_token(b)));
        assert!(b"X-Custom_Header.v1~".iter().all(|&b| is_token(b)));
        for b in [b' ', b'\t', b':', b'(', b'"', b'/', b'\r', 0x80] {
            assert!(!is_token(b), "{b:#x} should not be a token char");
        }
    }

    #[test]
    fn target_chars() {
        assert!(b"/a/b?c=d&e=%20#f".iter().all(|&b| is_target(b)));
        assert!(is_target(0xC3));
        assert!(!is_target(b' '));
        assert!(!is_target(0x7f));
        assert!(!is_target(0x00));
    }
}
