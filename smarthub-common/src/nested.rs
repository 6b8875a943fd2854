//! Decoder for the `[['a%3Bb%3Bc'], ...]` attribute values of the WAN
//! document.

use crate::error::DecodeError;
use crate::escape::url_decode;

/// Take the string at `[0][0]` of a quoted nested array, percent-decode it
/// and split it on `;`.
///
/// `[['123%3B456'], null]` becomes `["123", "456"]`. An empty input means
/// the attribute was absent from the source document.
pub fn decode_nested_first(value: &str) -> Result<Vec<String>, DecodeError> {
    if value.is_empty() {
        return Err(DecodeError::missing(
            "expected a nested array value but it was empty",
        ));
    }

    // Single-quoted strings are valid JSON5
    let rows: Vec<Option<Vec<String>>> = json5::from_str(value)
        .map_err(|e| DecodeError::format(format!("expected an array of string arrays: {}", e)))?;

    let first = rows
        .first()
        .and_then(Option::as_ref)
        .and_then(|row| row.first())
        .ok_or_else(|| DecodeError::structure("nested array has no element at [0][0]"))?;

    let decoded = url_decode(first)?;
    Ok(decoded.split(';').map(str::to_string).collect())
}

/// [`decode_nested_first`], with every field parsed as an unsigned integer.
pub fn decode_nested_first_ints(value: &str) -> Result<Vec<u64>, DecodeError> {
    decode_nested_first(value)?
        .iter()
        .map(|field| {
            field.parse::<u64>().map_err(|e| {
                DecodeError::format(format!("field '{}' is not an integer: {}", field, e))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeErrorKind;

    #[test]
    fn test_decode_first_element() {
        let fields = decode_nested_first("[['connected%3BVDSL%3B1548330483'], ['ignored']]").unwrap();
        assert_eq!(fields, vec!["connected", "VDSL", "1548330483"]);
    }

    #[test]
    fn test_decode_with_null_rows() {
        let fields = decode_nested_first("[['123%3B456'], null]").unwrap();
        assert_eq!(fields, vec!["123", "456"]);
    }

    #[test]
    fn test_single_field() {
        assert_eq!(decode_nested_first("[['down']]").unwrap(), vec!["down"]);
    }

    #[test]
    fn test_quote_inside_value() {
        let fields = decode_nested_first(r#"[["it's%3Bfine"]]"#).unwrap();
        assert_eq!(fields, vec!["it's", "fine"]);
    }

    #[test]
    fn test_trailing_comma_and_double_quotes() {
        let fields = decode_nested_first("[[\"1%3B2\",],]").unwrap();
        assert_eq!(fields, vec!["1", "2"]);
    }

    #[test]
    fn test_empty_is_missing_value() {
        let err = decode_nested_first("").unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::MissingValue);
    }

    #[test]
    fn test_malformed_is_format() {
        for value in ["[['a'", "[[1, 2]]", "['flat']", "'just text'"] {
            let err = decode_nested_first(value).unwrap_err();
            assert_eq!(err.kind(), DecodeErrorKind::Format, "value: {}", value);
        }
    }

    #[test]
    fn test_out_of_range_is_structure() {
        for value in ["[]", "[[]]", "[null, ['x']]"] {
            let err = decode_nested_first(value).unwrap_err();
            assert_eq!(err.kind(), DecodeErrorKind::Structure, "value: {}", value);
        }
    }

    #[test]
    fn test_ints() {
        let values = decode_nested_first_ints("[['0%3B336463954090%3B34683717318']]").unwrap();
        assert_eq!(values, vec![0, 336463954090, 34683717318]);
    }

    #[test]
    fn test_ints_reject_text() {
        let err = decode_nested_first_ints("[['1%3Btwo']]").unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::Format);
    }
}
