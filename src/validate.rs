use crate::DecodeError;

/// Turns untrusted bytes into text, keeping the offending bytes in the
/// error when they are not valid UTF-8.
pub fn validate_utf8(field: &'static str, bytes: Vec<u8>) -> Result<String, DecodeError> {
    String::from_utf8(bytes).map_err(|err| DecodeError::Encoding {
        field,
        bytes: err.into_bytes(),
    })
}

/// Sums sizes while the running total stays within the signed 64-bit range.
pub fn sum_with_overflow_guard<I>(field: &'static str, values: I) -> Result<u64, DecodeError>
where
    I: IntoIterator<Item = u64>,
{
    let total = values.into_iter().try_fold(0i64, |total, value| {
        i64::try_from(value)
            .ok()
            .and_then(|value| total.checked_add(value))
            .ok_or(DecodeError::Overflow(field))
    })?;

    Ok(total.unsigned_abs())
}

pub(crate) fn non_negative(field: &'static str, value: i64) -> Result<u64, DecodeError> {
    u64::try_from(value).map_err(|_| DecodeError::Overflow(field))
}

pub fn is_aligned(len: usize, width: usize) -> bool {
    len % width == 0
}

#[cfg(test)]
mod tests {
    use claims::{assert_matches, assert_ok_eq};

    use super::{is_aligned, non_negative, sum_with_overflow_guard, validate_utf8};
    use crate::DecodeError;

    #[test]
    fn validate_valid_utf8() {
        assert_ok_eq!(validate_utf8("comment", b"caf\xc3\xa9".to_vec()), "café");
    }

    #[test]
    fn validate_invalid_utf8_keeps_bytes() {
        assert_matches!(
            validate_utf8("comment", b"\xbd\xb2\xb9".to_vec()),
            Err(DecodeError::Encoding { field: "comment", ref bytes }) if bytes == b"\xbd\xb2\xb9"
        );
    }

    #[test]
    fn sum_sizes() {
        assert_ok_eq!(sum_with_overflow_guard("info.files.length", [123, 456]), 579);
        assert_ok_eq!(sum_with_overflow_guard("info.files.length", []), 0);
    }

    #[test]
    fn sum_sizes_past_signed_range() {
        assert_matches!(
            sum_with_overflow_guard("info.files.length", [i64::MAX as u64, 1]),
            Err(DecodeError::Overflow("info.files.length"))
        );
        assert_matches!(
            sum_with_overflow_guard("info.files.length", [u64::MAX]),
            Err(DecodeError::Overflow("info.files.length"))
        );
    }

    #[test]
    fn reject_negative_size() {
        assert_ok_eq!(non_negative("info.length", 0), 0);
        assert_matches!(
            non_negative("info.length", -1),
            Err(DecodeError::Overflow("info.length"))
        );
    }

    #[test]
    fn check_alignment() {
        assert!(is_aligned(0, 20));
        assert!(is_aligned(40, 20));
        assert!(!is_aligned(39, 20));
        assert!(!is_aligned(13, 6));
    }
}
