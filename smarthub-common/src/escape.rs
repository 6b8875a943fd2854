//! Percent-decoding and MAC address normalization.

use percent_encoding::percent_decode_str;

use crate::error::DecodeError;

/// Percent-decode a path-style string.
///
/// `+` is kept as-is. Every `%` must be followed by two hex digits and the
/// decoded bytes must be valid UTF-8.
pub fn url_decode(s: &str) -> Result<String, DecodeError> {
    // percent_decode_str passes malformed escapes through unchanged
    let bytes = s.as_bytes();
    let mut i = 0;
    while let Some(offset) = bytes[i..].iter().position(|&b| b == b'%') {
        let at = i + offset;
        let valid = bytes.len() > at + 2
            && bytes[at + 1].is_ascii_hexdigit()
            && bytes[at + 2].is_ascii_hexdigit();
        if !valid {
            return Err(DecodeError::format(format!(
                "invalid percent escape at offset {} in '{}'",
                at, s
            )));
        }
        i = at + 3;
    }

    percent_decode_str(s)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|e| DecodeError::format(format!("percent-decoded value is not UTF-8: {}", e)))
}

/// Percent-decode, falling back to the raw input when it is not a valid
/// encoding.
pub fn url_decode_lossy(s: &str) -> String {
    url_decode(s).unwrap_or_else(|_| s.to_string())
}

/// Normalize a MAC address to uppercase colon-separated octets.
///
/// Accepts `:`, `-` or `.` separators, or none at all. Input that is not
/// 12 hex digits after stripping separators is only uppercased.
pub fn canonical_mac(s: &str) -> String {
    let hex: Vec<char> = s
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .collect();

    if hex.len() != 12 || !hex.iter().all(|c| c.is_ascii_hexdigit()) {
        return s.trim().to_ascii_uppercase();
    }

    hex.chunks(2)
        .map(|pair| pair.iter().collect::<String>().to_ascii_uppercase())
        .collect::<Vec<_>>()
        .join(":")
}
