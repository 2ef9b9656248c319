//! Storage key validation.
//!
//! Keys map directly onto file names inside a backend's root directory, so
//! they must be a single, portable path component.

use crate::error::{ErrorKind, Result};

/// Longest key accepted by any backend, in bytes. Most filesystems cap a
/// single file name at 255 bytes; the rest is headroom for temporary-file
/// suffixes used during atomic writes.
pub const MAX_KEY_LENGTH: usize = 200;

/// Validates a storage key.
///
/// A key is valid when it is non-empty, at most [`MAX_KEY_LENGTH`] bytes,
/// does not start with a dot (dot-files are reserved for in-flight writes),
/// and only contains ASCII alphanumerics, `-`, `_`, `.` or `%`.
///
/// # Examples
///
/// ```
/// use marquee_storage::validate_key;
/// assert!(validate_key("GET%20https%3A%2F%2Fexample.com.json").is_ok());
/// assert!(validate_key("../etc/passwd").is_err());
/// assert!(validate_key("a/b").is_err());
/// assert!(validate_key(".hidden").is_err());
/// ```
pub fn validate(key: &str) -> Result<&str> {
    let allowed = |b: u8| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'%');
    if key.is_empty() || key.len() > MAX_KEY_LENGTH || key.starts_with('.') || !key.bytes().all(allowed) {
        exn::bail!(ErrorKind::InvalidKey(key.to_string()));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("simple")]
    #[case("entry.json")]
    #[case("GET%20https%3A%2F%2Fapi.example.com%2F3%2Fmovie%2F954.json")]
    #[case("with-dash_and_underscore")]
    fn test_valid_keys(#[case] key: &str) {
        assert_eq!(validate(key).unwrap(), key);
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("..")]
    #[case(".tmp-entry")]
    #[case("a/b")]
    #[case("a\\b")]
    #[case("../escape")]
    #[case("nul\0byte")]
    #[case("spaces are not allowed")]
    #[case("ünïcödé")]
    fn test_invalid_keys(#[case] key: &str) {
        let err = validate(key).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidKey(k) if k == key));
    }

    #[test]
    fn test_length_limit() {
        let longest = "a".repeat(MAX_KEY_LENGTH);
        assert!(validate(&longest).is_ok());
        let too_long = "a".repeat(MAX_KEY_LENGTH + 1);
        assert!(validate(&too_long).is_err());
    }
}
