use crate::dec::Dec;
use crate::error::{MathError, Result};

/// One exponential-moving-average step: `alpha * sample + (1 - alpha) * previous`.
pub fn ema(alpha: Dec, sample: Dec, previous: Dec) -> Result<Dec> {
    check_alpha(alpha)?;
    let keep = Dec::ONE.checked_sub(alpha)?;
    alpha
        .checked_mul(sample)?
        .checked_add(keep.checked_mul(previous)?)
}

/// Closed form of `n` EMA steps from `current` toward a constant `target`:
/// `target + (current - target) * (1 - alpha)^n`.
pub fn n_calc_ema(alpha: Dec, target: Dec, current: Dec, n: u64) -> Result<Dec> {
    check_alpha(alpha)?;
    let retained = Dec::ONE.checked_sub(alpha)?.pow_u64(n)?;
    target.checked_add(current.checked_sub(target)?.checked_mul(retained)?)
}

fn check_alpha(alpha: Dec) -> Result<()> {
    if alpha.is_negative() || alpha > Dec::ONE {
        return Err(MathError::InvalidExponent(format!(
            "EMA alpha {} outside [0, 1]",
            alpha
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Dec {
        s.parse().unwrap()
    }

    #[test]
    fn test_ema_step() {
        assert_eq!(ema(d("0.1"), d("10"), d("0")).unwrap(), d("1"));
        assert_eq!(ema(d("1"), d("3"), d("100")).unwrap(), d("3"));
        assert!(ema(d("1.5"), d("1"), d("1")).is_err());
    }

    #[test]
    fn test_n_calc_ema_matches_iteration() {
        let alpha = d("0.1");
        let target = d("200");
        let mut iterated = d("300");
        for _ in 0..4 {
            iterated = ema(alpha, target, iterated).unwrap();
        }
        let closed = n_calc_ema(alpha, target, d("300"), 4).unwrap();
        assert_eq!(closed, d("265.61"));
        assert_eq!(iterated, closed);
    }

    #[test]
    fn test_n_calc_ema_zero_steps_is_identity() {
        assert_eq!(n_calc_ema(d("0.3"), d("1"), d("42.5"), 0).unwrap(), d("42.5"));
    }
}
