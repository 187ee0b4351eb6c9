//! Sentinel-aware duration values

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const INVALID: i64 = i64::MIN + 10;

/// A signed duration in nanoseconds with reserved "not recorded" values.
///
/// Every value at or below [`Measure::NOT_STARTED`] is invalid. Arithmetic
/// helpers propagate invalidity instead of producing garbage, so optional
/// spans (TLS on plain HTTP, QUIC on TCP) can be folded into aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Measure(i64);

impl Measure {
    /// The span was never started
    pub const NOT_STARTED: Measure = Measure(INVALID);
    /// The span was started but never stopped
    pub const NOT_STOPPED: Measure = Measure(INVALID - 1);
    /// Nothing was ever recorded for the span
    pub const NOT_INITIALIZED: Measure = Measure(INVALID - 2);
    /// A valid zero duration
    pub const ZERO: Measure = Measure(0);

    /// Build a measure from raw nanoseconds
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Raw nanosecond value, sentinels included
    pub const fn as_nanos(&self) -> i64 {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0 > INVALID
    }

    /// Valid and non-negative
    pub fn is_success(&self) -> bool {
        self.0 >= 0
    }

    /// Sum two measures, ignoring whichever operand is invalid.
    ///
    /// When both are invalid the first operand is returned unchanged.
    pub fn sum_if_valid(self, other: Measure) -> Measure {
        match (self.is_valid(), other.is_valid()) {
            (true, true) => Measure(self.0.saturating_add(other.0)),
            (true, false) => self,
            (false, true) => other,
            (false, false) => self,
        }
    }

    /// Integer division; invalid stays invalid and a zero divisor yields `NOT_INITIALIZED`
    pub fn divide(self, n: i64) -> Measure {
        if !self.is_valid() {
            return self;
        }
        if n == 0 {
            return Measure::NOT_INITIALIZED;
        }
        Measure(self.0 / n)
    }

    /// Value in the given unit, `NaN` when invalid
    pub fn to_float(&self, unit: Duration) -> f64 {
        if !self.is_valid() {
            return f64::NAN;
        }
        self.0 as f64 / unit.as_nanos() as f64
    }

    /// Milliseconds as a float, `NaN` when invalid
    pub fn as_millis_f64(&self) -> f64 {
        self.to_float(Duration::from_millis(1))
    }

    /// Convert to a `Duration` when valid and non-negative
    pub fn to_duration(&self) -> Option<Duration> {
        if self.is_success() {
            Some(Duration::from_nanos(self.0 as u64))
        } else {
            None
        }
    }
}

impl Default for Measure {
    fn default() -> Self {
        Measure::NOT_INITIALIZED
    }
}

impl From<Duration> for Measure {
    fn from(duration: Duration) -> Self {
        Measure(i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX))
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Measure::NOT_STARTED => write!(f, "not started"),
            Measure::NOT_STOPPED => write!(f, "not stopped"),
            Measure::NOT_INITIALIZED => write!(f, "n/a"),
            m if !m.is_valid() => write!(f, "invalid"),
            m => write!(f, "{:.3} ms", m.as_millis_f64()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sentinels_are_invalid() {
        assert!(!Measure::NOT_STARTED.is_valid());
        assert!(!Measure::NOT_STOPPED.is_valid());
        assert!(!Measure::NOT_INITIALIZED.is_valid());
        assert!(Measure::ZERO.is_valid());
        assert!(Measure::ZERO.is_success());
        assert!(Measure::from_nanos(-5).is_valid());
        assert!(!Measure::from_nanos(-5).is_success());
    }

    #[test]
    fn test_sum_if_valid() {
        let five = Measure::from_nanos(5);
        assert_eq!(five.sum_if_valid(Measure::NOT_INITIALIZED), five);
        assert_eq!(Measure::NOT_STOPPED.sum_if_valid(five), five);
        assert!(!Measure::NOT_STARTED.sum_if_valid(Measure::NOT_INITIALIZED).is_valid());
        assert_eq!(
            Measure::from_nanos(3).sum_if_valid(Measure::from_nanos(4)),
            Measure::from_nanos(7)
        );
    }

    #[test]
    fn test_divide() {
        assert_eq!(Measure::from_nanos(10).divide(2), Measure::from_nanos(5));
        assert_eq!(Measure::NOT_STARTED.divide(3), Measure::NOT_STARTED);
        assert_eq!(Measure::from_nanos(10).divide(0), Measure::NOT_INITIALIZED);
    }

    #[test]
    fn test_to_float() {
        let m = Measure::from(Duration::from_millis(1500));
        assert_eq!(m.to_float(Duration::from_secs(1)), 1.5);
        assert_eq!(m.as_millis_f64(), 1500.0);
        assert!(Measure::NOT_INITIALIZED.to_float(Duration::from_millis(1)).is_nan());
    }

    #[test]
    fn test_display() {
        assert_eq!(Measure::from(Duration::from_millis(2)).to_string(), "2.000 ms");
        assert_eq!(Measure::NOT_INITIALIZED.to_string(), "n/a");
    }

    fn any_measure() -> impl Strategy<Value = Measure> {
        prop_oneof![
            Just(Measure::NOT_STARTED),
            Just(Measure::NOT_STOPPED),
            Just(Measure::NOT_INITIALIZED),
            (0i64..1_000_000_000_000).prop_map(Measure::from_nanos),
        ]
    }

    proptest! {
        #[test]
        fn prop_sum_valid_iff_any_operand_valid(a in any_measure(), b in any_measure()) {
            let sum = a.sum_if_valid(b);
            prop_assert_eq!(sum.is_valid(), a.is_valid() || b.is_valid());
        }

        #[test]
        fn prop_sum_is_commutative_for_valid(a in 0i64..1_000_000_000, b in 0i64..1_000_000_000) {
            let (a, b) = (Measure::from_nanos(a), Measure::from_nanos(b));
            prop_assert_eq!(a.sum_if_valid(b), b.sum_if_valid(a));
        }

        #[test]
        fn prop_divide_preserves_validity(m in any_measure(), n in 1i64..1000) {
            prop_assert_eq!(m.divide(n).is_valid(), m.is_valid());
        }
    }
}
