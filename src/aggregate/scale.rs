//! Display windows and the window-to-level mapping.
//!
//! Level 0 is sized so the whole asset fills the requested output count.
//! Each halving of the visible window moves one level up the ladder, so a
//! window of length `1 / 2^i` reads level `i`.

use serde::Serialize;

use crate::error::RangeError;

// Tolerates rounding in `location + length` sums computed by callers.
const RANGE_EPSILON: f64 = 1e-12;

/// Fraction of the asset's duration currently displayed.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DataRange {
    location: f64,
    length: f64,
}

impl DataRange {
    /// Validated window: `location` in `[0, 1)`, `length` in `(0, 1]`,
    /// `location + length <= 1`.
    pub fn new(location: f64, length: f64) -> Result<Self, RangeError> {
        if !(0.0..1.0).contains(&location) {
            return Err(RangeError::Location(location));
        }
        if !(length > 0.0 && length <= 1.0) {
            return Err(RangeError::Length(length));
        }
        if location + length > 1.0 + RANGE_EPSILON {
            return Err(RangeError::Overrun { location, length });
        }
        Ok(Self { location, length })
    }

    /// Like [`new`](Self::new), but pulls `location` back so the window ends
    /// at or before the end of the asset.
    pub fn clamped(location: f64, length: f64) -> Result<Self, RangeError> {
        if !(length > 0.0 && length <= 1.0) {
            return Err(RangeError::Length(length));
        }
        if location.is_nan() || location < 0.0 {
            return Err(RangeError::Location(location));
        }
        Ok(Self {
            location: location.min(1.0 - length),
            length,
        })
    }

    pub fn full() -> Self {
        Self {
            location: 0.0,
            length: 1.0,
        }
    }

    pub fn location(&self) -> f64 {
        self.location
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn end(&self) -> f64 {
        self.location + self.length
    }

    /// Zoom factor of this window.
    pub fn scale(&self) -> f64 {
        1.0 / self.length
    }
}

impl Default for DataRange {
    fn default() -> Self {
        Self::full()
    }
}

/// `clamp(floor(log2(1 / length)), 0, level_count - 1)`.
pub fn level_for_length(length: f64, level_count: usize) -> usize {
    let max_level = level_count.saturating_sub(1);
    let raw = (1.0 / length).log2().floor();
    if !(raw > 0.0) {
        return 0;
    }
    (raw as usize).min(max_level)
}

pub fn level_for_range(range: &DataRange, level_count: usize) -> usize {
    level_for_length(range.length(), level_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_selection_with_four_levels() {
        assert_eq!(level_for_length(1.0, 4), 0);
        assert_eq!(level_for_length(0.5, 4), 1);
        assert_eq!(level_for_length(0.25, 4), 2);
        assert_eq!(level_for_length(0.1, 4), 3);
        assert_eq!(level_for_length(0.001, 4), 3);
    }

    #[test]
    fn in_between_lengths_round_down() {
        assert_eq!(level_for_length(0.75, 10), 0);
        assert_eq!(level_for_length(0.3, 10), 1);
        assert_eq!(level_for_length(0.2, 10), 2);
    }

    #[test]
    fn single_level_always_zero() {
        assert_eq!(level_for_length(0.01, 1), 0);
        assert_eq!(level_for_length(0.01, 0), 0);
    }

    #[test]
    fn narrower_windows_never_select_lower_levels() {
        let mut previous = 0;
        for step in 1..=1000 {
            let length = 1.0 - step as f64 / 1001.0;
            let level = level_for_length(length, 10);
            assert!(level >= previous);
            previous = level;
        }
    }

    #[test]
    fn range_validation() {
        assert!(DataRange::new(0.0, 1.0).is_ok());
        assert!(DataRange::new(0.5, 0.5).is_ok());
        assert_eq!(DataRange::new(1.0, 0.1), Err(RangeError::Location(1.0)));
        assert_eq!(DataRange::new(-0.1, 0.1), Err(RangeError::Location(-0.1)));
        assert_eq!(DataRange::new(0.0, 0.0), Err(RangeError::Length(0.0)));
        assert_eq!(DataRange::new(0.0, 1.5), Err(RangeError::Length(1.5)));
        assert!(matches!(
            DataRange::new(0.6, 0.5),
            Err(RangeError::Overrun { .. })
        ));
    }

    #[test]
    fn clamped_pulls_location_back() {
        let range = DataRange::clamped(0.9, 0.25).unwrap();
        assert_eq!(range.location(), 0.75);
        assert_eq!(range.end(), 1.0);
        assert!(DataRange::clamped(0.2, 0.0).is_err());
    }

    #[test]
    fn default_is_full_view() {
        let range = DataRange::default();
        assert_eq!(range.scale(), 1.0);
        assert_eq!(level_for_range(&range, 10), 0);
    }
}
