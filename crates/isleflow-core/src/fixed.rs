use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits. All rates
/// (units per minute), building counts and multipliers use this type.
pub type Fixed64 = I32F32;

/// Milliseconds on the session clock.
pub type Millis = u64;

/// Seconds per minute; rates are per minute, cycle times in seconds.
pub const SECONDS_PER_MINUTE: i32 = 60;

/// Convert an f64 to Fixed64. Use only for initialization and data loading.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

/// Convert Fixed64 to f64. Use only for display and persistence.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// Convert an untrusted f64 (persisted or user supplied) to Fixed64.
/// NaN, infinities and out-of-range values clamp to zero.
#[inline]
pub fn f64_to_fixed64_lossy(v: f64) -> Fixed64 {
    if !v.is_finite() {
        return Fixed64::ZERO;
    }
    Fixed64::checked_from_num(v).unwrap_or(Fixed64::ZERO)
}

/// Division that returns zero instead of panicking on a zero divisor or
/// overflowing.
#[inline]
pub fn div_or_zero(a: Fixed64, b: Fixed64) -> Fixed64 {
    a.checked_div(b).unwrap_or(Fixed64::ZERO)
}

/// Multiplication that saturates instead of panicking on overflow.
#[inline]
pub fn mul_sat(a: Fixed64, b: Fixed64) -> Fixed64 {
    a.saturating_mul(b)
}

/// Convert a percentage (e.g. 50 for +50%) into a fraction (0.5).
#[inline]
pub fn percent(v: Fixed64) -> Fixed64 {
    div_or_zero(v, Fixed64::from_num(100))
}

/// `|a - b| < epsilon`.
#[inline]
pub fn within(a: Fixed64, b: Fixed64, epsilon: Fixed64) -> bool {
    a.saturating_sub(b).saturating_abs() < epsilon.saturating_abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed64_basic_arithmetic() {
        let a = f64_to_fixed64(1.5);
        let b = f64_to_fixed64(2.0);
        assert_eq!(fixed64_to_f64(a + b), 3.5);
    }

    #[test]
    fn lossy_conversion_clamps_nan() {
        assert_eq!(f64_to_fixed64_lossy(f64::NAN), Fixed64::ZERO);
        assert_eq!(f64_to_fixed64_lossy(f64::INFINITY), Fixed64::ZERO);
        assert_eq!(f64_to_fixed64_lossy(1e30), Fixed64::ZERO);
        assert_eq!(f64_to_fixed64_lossy(2.5), f64_to_fixed64(2.5));
    }

    #[test]
    fn div_or_zero_by_zero() {
        let a = f64_to_fixed64(1.0);
        assert_eq!(div_or_zero(a, Fixed64::ZERO), Fixed64::ZERO);
        assert_eq!(div_or_zero(a, f64_to_fixed64(4.0)), f64_to_fixed64(0.25));
    }

    #[test]
    fn mul_sat_does_not_overflow() {
        assert_eq!(mul_sat(Fixed64::MAX, f64_to_fixed64(2.0)), Fixed64::MAX);
    }

    #[test]
    fn percent_to_fraction() {
        assert_eq!(percent(Fixed64::from_num(50)), f64_to_fixed64(0.5));
    }

    #[test]
    fn within_is_strict() {
        let eps = f64_to_fixed64(0.25);
        assert!(within(f64_to_fixed64(1.0), f64_to_fixed64(1.2), eps));
        assert!(!within(f64_to_fixed64(1.0), f64_to_fixed64(1.25), eps));
        assert!(within(f64_to_fixed64(1.2), f64_to_fixed64(1.0), eps));
    }
}
