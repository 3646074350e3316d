//! Population statistics over decimal samples.

use crate::dec::Dec;
use crate::error::{MathError, Result};

/// Divides `numerator` by `denominator`, replacing a denominator whose
/// magnitude is below `epsilon` with `epsilon` (keeping its sign).
///
/// Fails with [`MathError::SafeDivByZero`] only when the effective
/// denominator is still zero, i.e. both inputs are zero.
pub fn safe_div(numerator: Dec, denominator: Dec, epsilon: Dec) -> Result<Dec> {
    let floor = epsilon.abs();
    let effective = if denominator.abs() < floor {
        if denominator.is_negative() {
            floor.checked_neg()?
        } else {
            floor
        }
    } else {
        denominator
    };
    if effective.is_zero() {
        return Err(MathError::SafeDivByZero);
    }
    numerator.checked_div(effective)
}

/// Linear-interpolated quantile (`h = (n - 1) * q`) of an unordered sample.
pub fn quantile(values: &[Dec], q: Dec) -> Result<Dec> {
    if values.is_empty() {
        return Err(MathError::EmptyInput);
    }
    if q.is_negative() || q > Dec::ONE {
        return Err(MathError::InvalidQuantile(q.to_string()));
    }
    let mut sorted = values.to_vec();
    sorted.sort();
    let n = sorted.len();
    if n == 1 {
        return Ok(sorted[0]);
    }

    let h = Dec::from_u64((n - 1) as u64).checked_mul(q)?;
    let lower = h.floor_int() as usize;
    if lower + 1 >= n {
        return Ok(sorted[n - 1]);
    }
    let fraction = h.checked_sub(h.floor())?;
    let span = sorted[lower + 1].checked_sub(sorted[lower])?;
    sorted[lower].checked_add(fraction.checked_mul(span)?)
}

pub fn sum(values: &[Dec]) -> Result<Dec> {
    values
        .iter()
        .try_fold(Dec::ZERO, |acc, v| acc.checked_add(*v))
}

pub fn mean(values: &[Dec]) -> Result<Dec> {
    if values.is_empty() {
        return Err(MathError::EmptyInput);
    }
    sum(values)?.checked_div_int(values.len() as i128)
}

/// Population standard deviation.
pub fn std_dev(values: &[Dec]) -> Result<Dec> {
    let avg = mean(values)?;
    let mut squares = Dec::ZERO;
    for v in values {
        let diff = v.checked_sub(avg)?;
        squares = squares.checked_add(diff.checked_mul(diff)?)?;
    }
    squares.checked_div_int(values.len() as i128)?.sqrt()
}

/// Mean of `(value, weight)` pairs. Zero total weight is a division error.
pub fn weighted_mean(samples: &[(Dec, Dec)]) -> Result<Dec> {
    if samples.is_empty() {
        return Err(MathError::EmptyInput);
    }
    let mut weighted = Dec::ZERO;
    let mut total = Dec::ZERO;
    for (value, weight) in samples {
        weighted = weighted.checked_add(value.checked_mul(*weight)?)?;
        total = total.checked_add(*weight)?;
    }
    weighted.checked_div(total)
}

/// `(|a|^p + |b|^p)^(1/p)`.
pub fn p_norm(values: &[Dec], p: Dec) -> Result<Dec> {
    if !p.is_positive() {
        return Err(MathError::InvalidExponent(format!("p-norm order {}", p)));
    }
    let mut total = Dec::ZERO;
    for v in values {
        total = total.checked_add(v.abs().pow(p)?)?;
    }
    if total.is_zero() {
        return Ok(Dec::ZERO);
    }
    total.pow(Dec::ONE.checked_div(p)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Dec {
        s.parse().unwrap()
    }

    fn ds(values: &[&str]) -> Vec<Dec> {
        values.iter().map(|v| d(v)).collect()
    }

    #[test]
    fn test_safe_div_clamps_small_denominators() {
        assert_eq!(safe_div(d("1"), d("0"), d("0.5")).unwrap(), d("2"));
        assert_eq!(safe_div(d("1"), d("-0.1"), d("0.5")).unwrap(), d("-2"));
        assert_eq!(safe_div(d("1"), d("4"), d("0.5")).unwrap(), d("0.25"));
        assert_eq!(safe_div(d("1"), d("0"), d("0")), Err(MathError::SafeDivByZero));
    }

    #[test]
    fn test_quantile_interpolates() {
        let values = ds(&["4", "1", "3", "2"]);
        assert_eq!(quantile(&values, d("0")).unwrap(), d("1"));
        assert_eq!(quantile(&values, d("1")).unwrap(), d("4"));
        assert_eq!(quantile(&values, d("0.5")).unwrap(), d("2.5"));
        assert_eq!(quantile(&values, d("0.25")).unwrap(), d("1.75"));
    }

    #[test]
    fn test_quantile_edge_cases() {
        assert_eq!(quantile(&[], d("0.5")), Err(MathError::EmptyInput));
        assert_eq!(quantile(&ds(&["7"]), d("0.9")).unwrap(), d("7"));
        assert!(quantile(&ds(&["1", "2"]), d("1.5")).is_err());
    }

    #[test]
    fn test_mean_and_std_dev() {
        let values = ds(&["2", "4", "4", "4", "5", "5", "7", "9"]);
        assert_eq!(mean(&values).unwrap(), d("5"));
        assert_eq!(std_dev(&values).unwrap(), d("2"));
        assert!(mean(&[]).is_err());
    }

    #[test]
    fn test_weighted_mean() {
        let samples = vec![(d("1"), d("3")), (d("5"), d("1"))];
        assert_eq!(weighted_mean(&samples).unwrap(), d("2"));
        assert!(weighted_mean(&[(d("1"), Dec::ZERO)]).is_err());
    }

    #[test]
    fn test_p_norm() {
        let norm = p_norm(&ds(&["3", "-4"]), d("2")).unwrap();
        assert!((norm.to_f64_lossy() - 5.0).abs() < 1e-9);
        assert_eq!(p_norm(&ds(&["0", "0"]), d("3")).unwrap(), Dec::ZERO);
    }
}
