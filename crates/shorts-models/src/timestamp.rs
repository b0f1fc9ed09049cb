//! Subtitle timecode formatting.
//!
//! ASS scripts use `H:MM:SS.CC`: unpadded hours and centiseconds.

/// Format seconds as an ASS timecode (`H:MM:SS.CC`).
///
/// Centiseconds are truncated, not rounded, so a cue never starts later than
/// the word it belongs to. Negative and non-finite input clamps to zero.
///
/// # Examples
/// ```
/// use shorts_models::timestamp::seconds_to_timecode;
/// assert_eq!(seconds_to_timecode(0.0), "0:00:00.00");
/// assert_eq!(seconds_to_timecode(3661.5), "1:01:01.50");
/// ```
pub fn seconds_to_timecode(seconds: f64) -> String {
    let seconds = if seconds.is_finite() && seconds > 0.0 {
        seconds
    } else {
        0.0
    };

    // Nudge before truncating so 1.1 (stored as 1.0999...) stays 110cs
    let total_cs = (seconds * 100.0 + 1e-6).floor() as u64;
    let hours = total_cs / 360_000;
    let minutes = (total_cs % 360_000) / 6_000;
    let secs = (total_cs % 6_000) / 100;
    let cs = total_cs % 100;

    format!("{}:{:02}:{:02}.{:02}", hours, minutes, secs, cs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero() {
        assert_eq!(seconds_to_timecode(0.0), "0:00:00.00");
    }

    #[test]
    fn test_fractional_centiseconds_truncate() {
        assert_eq!(seconds_to_timecode(1.239), "0:00:01.23");
        assert_eq!(seconds_to_timecode(1.1), "0:00:01.10");
        assert_eq!(seconds_to_timecode(0.999), "0:00:00.99");
        assert_eq!(seconds_to_timecode(0.005), "0:00:00.00");
    }

    #[test]
    fn test_minute_and_hour_rollover() {
        assert_eq!(seconds_to_timecode(59.99), "0:00:59.99");
        assert_eq!(seconds_to_timecode(60.0), "0:01:00.00");
        assert_eq!(seconds_to_timecode(3599.99), "0:59:59.99");
        assert_eq!(seconds_to_timecode(3600.0), "1:00:00.00");
        assert_eq!(seconds_to_timecode(36_000.0 + 61.5), "10:01:01.50");
    }

    #[test]
    fn test_negative_and_nan_clamp() {
        assert_eq!(seconds_to_timecode(-5.0), "0:00:00.00");
        assert_eq!(seconds_to_timecode(f64::NAN), "0:00:00.00");
        assert_eq!(seconds_to_timecode(f64::INFINITY), "0:00:00.00");
    }
}
