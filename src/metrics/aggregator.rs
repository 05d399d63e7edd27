// =============================================================================
// Time-series aggregation (SMA / EMA)
// =============================================================================
//
// All arithmetic runs on `Decimal` so currency-like inputs never pick up
// binary floating-point drift. Nothing here rounds; callers round the final
// value once.
//
// EMA:
//   alpha = 2 / (window + 1)
//   seed  = mean(values[..window])
//   ema'  = value * alpha + ema * (1 - alpha)      for each later value
//
// With exactly `window` values the seed is returned untouched, so
// `ema(v, n) == sma(v, n)` whenever `v.len() == n`.
// =============================================================================

use rust_decimal::Decimal;

/// Arithmetic mean. `None` for an empty slice or when the sum overflows.
pub fn mean(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let sum = values
        .iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v))?;
    sum.checked_div(Decimal::from(values.len()))
}

/// Mean of the last `window` values.
///
/// Returns `None` when `values.len() < window` or `window == 0`.
pub fn sma(values: &[Decimal], window: usize) -> Option<Decimal> {
    if window == 0 || values.len() < window {
        return None;
    }
    mean(&values[values.len() - window..])
}

/// EMA with the conventional smoothing factor `2 / (window + 1)`.
pub fn ema(values: &[Decimal], window: usize) -> Option<Decimal> {
    let alpha = Decimal::TWO.checked_div(Decimal::from(window) + Decimal::ONE)?;
    ema_with_alpha(values, window, alpha)
}

/// EMA seeded with the mean of the first `window` values, then folded over the
/// remaining values in order.
///
/// Returns `None` when `values.len() < window`, `window == 0`, or the fold overflows.
pub fn ema_with_alpha(values: &[Decimal], window: usize, alpha: Decimal) -> Option<Decimal> {
    if window == 0 || values.len() < window {
        return None;
    }
    let seed = mean(&values[..window])?;
    let keep = Decimal::ONE - alpha;

    values[window..].iter().try_fold(seed, |prev, &v| {
        v.checked_mul(alpha)?.checked_add(prev.checked_mul(keep)?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn vols() -> Vec<Decimal> {
        vec![dec!(100), dec!(110), dec!(105), dec!(115), dec!(120), dec!(118), dec!(122)]
    }

    #[test]
    fn sma_none_iff_too_short() {
        let v = vols();
        for window in 1..=10 {
            assert_eq!(sma(&v, window).is_none(), v.len() < window, "window={window}");
            assert_eq!(ema(&v, window).is_none(), v.len() < window, "window={window}");
        }
    }

    #[test]
    fn zero_window_has_no_value() {
        assert!(sma(&vols(), 0).is_none());
        assert!(ema(&vols(), 0).is_none());
    }

    #[test]
    fn sma_uses_last_window_values() {
        let v = vec![dec!(1), dec!(2), dec!(3), dec!(4)];
        assert_eq!(sma(&v, 2), Some(dec!(3.5)));
        assert_eq!(sma(&v, 4), Some(dec!(2.5)));
    }

    #[test]
    fn ema_equals_sma_at_window_boundary() {
        let v = vols();
        let e = ema(&v, 7).unwrap();
        let s = sma(&v, 7).unwrap();
        let m = mean(&v).unwrap();
        assert_eq!(e, s);
        assert_eq!(s, m);
        assert_eq!(e.round_dp(3), dec!(112.857));
    }

    #[test]
    fn ema_applies_recurrence_after_seed() {
        // window 2 -> alpha = 2/3, seed = mean(10, 20) = 15
        // next value 30: 30 * 2/3 + 15 * 1/3 = 25
        let v = vec![dec!(10), dec!(20), dec!(30)];
        let e = ema(&v, 2).unwrap();
        assert_eq!(e.round_dp(10), dec!(25));
    }

    #[test]
    fn ema_weights_recent_values_more_than_sma() {
        let v = vec![dec!(1), dec!(1), dec!(1), dec!(10)];
        let e = ema_with_alpha(&v, 3, dec!(0.5)).unwrap();
        assert_eq!(e, dec!(5.5));
        assert!(e > sma(&v, 4).unwrap());
    }

    #[test]
    fn mean_of_empty_is_none() {
        assert!(mean(&[]).is_none());
    }

    #[test]
    fn overflowing_sum_has_no_value() {
        // 5e28 + 5e28 exceeds Decimal::MAX (~7.9e28).
        let big = dec!(50000000000000000000000000000);
        let v = vec![big, big, dec!(1)];
        assert!(mean(&v).is_none());
        assert!(sma(&v, 3).is_none());
        assert!(ema(&v, 3).is_none());
        assert_eq!(sma(&v, 1), Some(dec!(1)));
    }
}
