//! Human-readable sizes ("512MB") and durations ("30m").

use std::time::Duration;
use thiserror::Error;

/// Error parsing a size string.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid size '{input}' - expected format like '2GB', '512MB', or '64KB'")]
pub struct SizeParseError {
    input: String,
}

/// Error parsing a duration string.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid duration '{input}' - expected seconds or a value like '90s', '30m', '2h'")]
pub struct DurationParseError {
    input: String,
}

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;
const GB: u64 = 1024 * MB;

/// Splits `"512 MB"` into `("512", "MB")`, uppercasing the suffix.
fn split_number(s: &str) -> (&str, String) {
    let s = s.trim();
    let end = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    (&s[..end], s[end..].trim().to_ascii_uppercase())
}

/// Parses a byte count with an optional binary suffix.
///
/// Bare numbers are bytes; `K`/`KB`, `M`/`MB` and `G`/`GB` are powers of
/// 1024. Case and inner whitespace are ignored.
///
/// ```
/// use tilewright::config::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("512MB").unwrap(), 512 * 1024 * 1024);
/// assert_eq!(parse_size("2 gb").unwrap(), 2 * 1024 * 1024 * 1024);
/// ```
pub fn parse_size(s: &str) -> Result<u64, SizeParseError> {
    let error = || SizeParseError {
        input: s.to_string(),
    };

    let (number, suffix) = split_number(s);
    let multiplier = match suffix.as_str() {
        "" | "B" => 1,
        "K" | "KB" => KB,
        "M" | "MB" => MB,
        "G" | "GB" => GB,
        _ => return Err(error()),
    };
    let value: u64 = number.parse().map_err(|_| error())?;
    value.checked_mul(multiplier).ok_or_else(error)
}

/// Formats a byte count using the largest exact suffix.
///
/// ```
/// use tilewright::config::format_size;
///
/// assert_eq!(format_size(512 * 1024 * 1024), "512MB");
/// assert_eq!(format_size(1500), "1500");
/// ```
pub fn format_size(bytes: u64) -> String {
    for (unit, suffix) in [(GB, "GB"), (MB, "MB"), (KB, "KB")] {
        if bytes >= unit && bytes % unit == 0 {
            return format!("{}{}", bytes / unit, suffix);
        }
    }
    bytes.to_string()
}

/// Parses a duration given in seconds or with an `s`/`m`/`h` suffix.
///
/// ```
/// use std::time::Duration;
/// use tilewright::config::parse_duration;
///
/// assert_eq!(parse_duration("3600").unwrap(), Duration::from_secs(3600));
/// assert_eq!(parse_duration("30m").unwrap(), Duration::from_secs(1800));
/// ```
pub fn parse_duration(s: &str) -> Result<Duration, DurationParseError> {
    let error = || DurationParseError {
        input: s.to_string(),
    };

    let (number, suffix) = split_number(s);
    let multiplier = match suffix.as_str() {
        "" | "S" => 1,
        "M" => 60,
        "H" => 3600,
        _ => return Err(error()),
    };
    let value: u64 = number.parse().map_err(|_| error())?;
    value
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size_suffixes() {
        assert_eq!(parse_size("0").unwrap(), 0);
        assert_eq!(parse_size("100B").unwrap(), 100);
        assert_eq!(parse_size("64k").unwrap(), 64 * KB);
        assert_eq!(parse_size("64KB").unwrap(), 64 * KB);
        assert_eq!(parse_size(" 512 MB ").unwrap(), 512 * MB);
        assert_eq!(parse_size("2G").unwrap(), 2 * GB);
    }

    #[test]
    fn test_parse_size_rejects_garbage() {
        assert!(parse_size("").is_err());
        assert!(parse_size("MB").is_err());
        assert!(parse_size("12TB").is_err());
        assert!(parse_size("-5MB").is_err());
        assert!(parse_size("1.5GB").is_err());
    }

    #[test]
    fn test_parse_size_overflow() {
        assert!(parse_size("99999999999999999999GB").is_err());
        assert!(parse_size("18446744073709551615GB").is_err());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(GB), "1GB");
        assert_eq!(format_size(3 * MB), "3MB");
        assert_eq!(format_size(KB), "1KB");
        assert_eq!(format_size(1000), "1000");
        assert_eq!(parse_size(&format_size(512 * MB)).unwrap(), 512 * MB);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_duration("2H").unwrap(), Duration::from_secs(7200));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("5d").is_err());
    }
}
