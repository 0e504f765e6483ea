//! Formatting and conversion helpers for telemetry values.
//!
//! Instruments exchange numbers as ASCII text. These helpers cover the few
//! places where the library itself has to produce or rescale a number.

use crate::error::Error;

/// Prefix of the sentinel written into a telemetry field whose query failed.
pub const ERROR_MARKER_PREFIX: &str = "error: ";

/// Format a number the way the instruments echo it back.
///
/// Integral values keep one decimal place (`10.0`), everything else uses
/// the shortest representation that round-trips.
///
/// # Example
///
/// ```
/// use instrlib_core::format_number;
///
/// assert_eq!(format_number(10.0), "10.0");
/// assert_eq!(format_number(-0.4), "-0.4");
/// assert_eq!(format_number(99.55), "99.55");
/// ```
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

/// Parse `raw` as a number and multiply it by `factor`, formatting the
/// result with [`format_number`].
///
/// Returns `None` when `raw` is not a number.
///
/// # Example
///
/// ```
/// use instrlib_core::scale_number;
///
/// // Amps to milliamps.
/// assert_eq!(scale_number("0.0125", 1000.0).as_deref(), Some("12.5"));
/// assert_eq!(scale_number("OVLD", 1000.0), None);
/// ```
pub fn scale_number(raw: &str, factor: f64) -> Option<String> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .map(|v| format_number(v * factor))
}

/// The sentinel stored in a telemetry field when its query failed.
pub fn error_marker(err: &Error) -> String {
    format!("{ERROR_MARKER_PREFIX}{}", err.kind_name())
}

/// Whether a telemetry value is a failed-query sentinel.
pub fn is_error_marker(value: &str) -> bool {
    value.starts_with(ERROR_MARKER_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_integral() {
        assert_eq!(format_number(10.0), "10.0");
        assert_eq!(format_number(0.0), "0.0");
        assert_eq!(format_number(-3.0), "-3.0");
    }

    #[test]
    fn format_number_fractional() {
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(-0.4), "-0.4");
    }

    #[test]
    fn scale_number_milliamps() {
        assert_eq!(scale_number("1.0E-02", 1000.0).as_deref(), Some("10.0"));
        assert_eq!(scale_number(" 0.5 ", 2.0).as_deref(), Some("1.0"));
    }

    #[test]
    fn scale_number_rejects_text() {
        assert_eq!(scale_number("", 1000.0), None);
        assert_eq!(scale_number("abc", 1000.0), None);
    }

    #[test]
    fn error_marker_uses_kind_name() {
        assert_eq!(error_marker(&Error::Timeout), "error: Timeout");
        assert_eq!(
            error_marker(&Error::Malformed("x".into())),
            "error: Malformed"
        );
    }

    #[test]
    fn error_marker_detection() {
        assert!(is_error_marker("error: Timeout"));
        assert!(!is_error_marker("12345"));
        assert!(!is_error_marker(""));
    }
}
