//! Timestamp unit detection
//!
//! Fetch timings are reported either in milliseconds or in microseconds
//! depending on the browser. The unit is inferred once per recording
//! session from the first non-zero request time and then fixed.

use std::cell::OnceCell;

use chrono::{DateTime, SecondsFormat, Utc};

/// A raw value larger than wall-clock milliseconds times this factor is
/// taken to be in microseconds.
pub const MICROSECONDS_THRESHOLD_FACTOR: f64 = 100.0;

/// Unit of raw fetch timings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    /// Milliseconds since the epoch
    Milliseconds,
    /// Microseconds since the epoch
    Microseconds,
}

impl TimeUnit {
    fn divisor(self) -> f64 {
        match self {
            Self::Milliseconds => 1.0,
            Self::Microseconds => 1000.0,
        }
    }
}

/// Converts raw timings to milliseconds with a unit fixed on first use
#[derive(Debug, Default)]
pub struct TimeNormalizer {
    unit: OnceCell<TimeUnit>,
    reference_ms: Option<f64>,
}

impl TimeNormalizer {
    /// Create a normalizer comparing against the current wall-clock time
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a normalizer comparing against a fixed reference time (ms)
    #[must_use]
    pub fn with_reference(reference_ms: f64) -> Self {
        Self {
            unit: OnceCell::new(),
            reference_ms: Some(reference_ms),
        }
    }

    /// The inferred unit, if already decided
    #[must_use]
    pub fn unit(&self) -> Option<TimeUnit> {
        self.unit.get().copied()
    }

    /// Convert a raw instant to milliseconds.
    ///
    /// Zero means "unset" and is returned as is without fixing the unit.
    pub fn to_millis(&self, raw: f64) -> f64 {
        if raw == 0.0 {
            return 0.0;
        }

        let unit = *self.unit.get_or_init(|| self.infer(raw));
        raw / unit.divisor()
    }

    /// Convert a raw duration to milliseconds, using milliseconds if the
    /// unit is still undecided
    #[must_use]
    pub fn duration_to_millis(&self, raw: f64) -> f64 {
        raw / self.unit().unwrap_or(TimeUnit::Milliseconds).divisor()
    }

    fn infer(&self, raw: f64) -> TimeUnit {
        let reference = self
            .reference_ms
            .unwrap_or_else(|| Utc::now().timestamp_millis() as f64);

        if raw > reference * MICROSECONDS_THRESHOLD_FACTOR {
            TimeUnit::Microseconds
        } else {
            TimeUnit::Milliseconds
        }
    }
}

/// Format epoch milliseconds as an ISO-8601 string with millisecond precision
#[must_use]
pub fn iso_date_time(epoch_ms: f64) -> String {
    DateTime::from_timestamp_millis(epoch_ms as i64)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Round to one decimal place
#[must_use]
pub fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW_MS: f64 = 1_700_000_000_000.0;

    #[test]
    fn test_detects_microseconds() {
        let time = TimeNormalizer::with_reference(NOW_MS);

        assert_eq!(time.to_millis(NOW_MS * 1000.0 + 500.0), NOW_MS + 0.5);
        assert_eq!(time.unit(), Some(TimeUnit::Microseconds));
        assert_eq!(time.duration_to_millis(100.0), 0.1);
    }

    #[test]
    fn test_detects_milliseconds() {
        let time = TimeNormalizer::with_reference(NOW_MS);

        assert_eq!(time.to_millis(NOW_MS + 50.0), NOW_MS + 50.0);
        assert_eq!(time.unit(), Some(TimeUnit::Milliseconds));
        assert_eq!(time.duration_to_millis(100.0), 100.0);
    }

    #[test]
    fn test_unit_fixed_after_first_use() {
        let time = TimeNormalizer::with_reference(NOW_MS);

        time.to_millis(NOW_MS);
        // A later microsecond value is still read as milliseconds
        assert_eq!(time.to_millis(NOW_MS * 1000.0), NOW_MS * 1000.0);
    }

    #[test]
    fn test_zero_does_not_fix_unit() {
        let time = TimeNormalizer::with_reference(NOW_MS);

        assert_eq!(time.to_millis(0.0), 0.0);
        assert_eq!(time.unit(), None);
    }

    #[test]
    fn test_iso_date_time() {
        assert_eq!(iso_date_time(0.0), "1970-01-01T00:00:00.000Z");
        assert_eq!(iso_date_time(1_676_929_932_123.0), "2023-02-20T21:52:12.123Z");
    }

    #[test]
    fn test_round_tenth() {
        assert_eq!(round_tenth(4.94), 4.9);
        assert_eq!(round_tenth(5.0), 5.0);
        assert_eq!(round_tenth(-0.26), -0.3);
    }
}
