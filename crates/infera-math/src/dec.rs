//! Signed fixed-point decimal with 18 fractional digits.
//!
//! Every operation truncates toward zero so that all validators derive the
//! same bits. Products and quotients that do not fit the `i128` backing are
//! recomputed through `num_bigint` before being narrowed back.

use crate::error::{MathError, Result};
use num_bigint::{BigInt, BigUint};
use num_traits::ToPrimitive;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Number of fractional decimal digits.
pub const DECIMALS: u32 = 18;

const SCALE: i128 = 1_000_000_000_000_000_000;

/// ln(2) truncated to 18 digits.
const LN2_RAW: i128 = 693_147_180_559_945_309;

const SERIES_LIMIT: u32 = 200;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Dec(i128);

impl Dec {
    pub const ZERO: Dec = Dec(0);
    pub const ONE: Dec = Dec(SCALE);
    pub const MAX: Dec = Dec(i128::MAX);
    pub const MIN: Dec = Dec(i128::MIN);

    pub const fn from_raw(raw: i128) -> Self {
        Dec(raw)
    }

    pub const fn raw(self) -> i128 {
        self.0
    }

    pub const fn from_i64(value: i64) -> Self {
        Dec(value as i128 * SCALE)
    }

    pub const fn from_u64(value: u64) -> Self {
        Dec(value as i128 * SCALE)
    }

    pub fn from_u128(value: u128) -> Result<Self> {
        let value = i128::try_from(value).map_err(|_| MathError::Overflow)?;
        value.checked_mul(SCALE).map(Dec).ok_or(MathError::Overflow)
    }

    /// Exact `numerator / denominator`, truncated.
    pub fn from_ratio(numerator: i128, denominator: i128) -> Result<Self> {
        if denominator == 0 {
            return Err(MathError::DivisionByZero);
        }
        match numerator.checked_mul(SCALE) {
            Some(scaled) => Ok(Dec(scaled / denominator)),
            None => wide_mul_div(numerator, SCALE, denominator).map(Dec),
        }
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_integer(self) -> bool {
        self.0 % SCALE == 0
    }

    pub fn abs(self) -> Self {
        Dec(self.0.saturating_abs())
    }

    pub fn checked_neg(self) -> Result<Self> {
        self.0.checked_neg().map(Dec).ok_or(MathError::Overflow)
    }

    pub fn checked_add(self, rhs: Dec) -> Result<Self> {
        self.0.checked_add(rhs.0).map(Dec).ok_or(MathError::Overflow)
    }

    pub fn checked_sub(self, rhs: Dec) -> Result<Self> {
        self.0.checked_sub(rhs.0).map(Dec).ok_or(MathError::Overflow)
    }

    pub fn checked_mul(self, rhs: Dec) -> Result<Self> {
        match self.0.checked_mul(rhs.0) {
            Some(product) => Ok(Dec(product / SCALE)),
            None => wide_mul_div(self.0, rhs.0, SCALE).map(Dec),
        }
    }

    pub fn checked_div(self, rhs: Dec) -> Result<Self> {
        if rhs.0 == 0 {
            return Err(MathError::DivisionByZero);
        }
        match self.0.checked_mul(SCALE) {
            Some(scaled) => Ok(Dec(scaled / rhs.0)),
            None => wide_mul_div(self.0, SCALE, rhs.0).map(Dec),
        }
    }

    pub fn checked_mul_int(self, rhs: i128) -> Result<Self> {
        self.0.checked_mul(rhs).map(Dec).ok_or(MathError::Overflow)
    }

    pub fn checked_div_int(self, rhs: i128) -> Result<Self> {
        if rhs == 0 {
            return Err(MathError::DivisionByZero);
        }
        Ok(Dec(self.0 / rhs))
    }

    /// Largest integer not greater than `self`.
    pub fn floor(self) -> Self {
        let rem = self.0 % SCALE;
        if rem < 0 {
            Dec(self.0 - rem - SCALE)
        } else {
            Dec(self.0 - rem)
        }
    }

    /// Integer part as `i128`, rounding toward negative infinity.
    pub fn floor_int(self) -> i128 {
        self.floor().0 / SCALE
    }

    /// Smallest integer not less than `self`.
    pub fn ceil(self) -> Result<Self> {
        let floored = self.floor();
        if floored == self {
            Ok(self)
        } else {
            floored.checked_add(Dec::ONE)
        }
    }

    /// `self^n` by repeated squaring.
    pub fn pow_u64(self, mut n: u64) -> Result<Self> {
        let mut base = self;
        let mut acc = Dec::ONE;
        while n > 0 {
            if n & 1 == 1 {
                acc = acc.checked_mul(base)?;
            }
            n >>= 1;
            if n > 0 {
                base = base.checked_mul(base)?;
            }
        }
        Ok(acc)
    }

    pub fn sqrt(self) -> Result<Self> {
        if self.0 < 0 {
            return Err(MathError::NegativeRoot(self.to_string()));
        }
        let radicand = BigUint::from(self.0 as u128) * BigUint::from(SCALE as u128);
        radicand
            .sqrt()
            .to_i128()
            .map(Dec)
            .ok_or(MathError::Overflow)
    }

    /// Natural logarithm.
    pub fn ln(self) -> Result<Self> {
        if self.0 <= 0 {
            return Err(MathError::NonPositiveLogarithm(self.to_string()));
        }
        // Reduce to m in [1, 2) with self = m * 2^k.
        let mut mantissa = self.0;
        let mut k: i128 = 0;
        while mantissa >= 2 * SCALE {
            mantissa >>= 1;
            k += 1;
        }
        while mantissa < SCALE {
            mantissa <<= 1;
            k -= 1;
        }
        let ln_mantissa = ln_near_one(Dec(mantissa))?;
        Dec(LN2_RAW).checked_mul_int(k)?.checked_add(ln_mantissa)
    }

    /// Natural exponential.
    pub fn exp(self) -> Result<Self> {
        if self.0 == 0 {
            return Ok(Dec::ONE);
        }
        let k = self.0 / LN2_RAW;
        let remainder = self.checked_sub(Dec(LN2_RAW).checked_mul_int(k)?)?;

        let mut sum = Dec::ONE;
        let mut term = Dec::ONE;
        for i in 1..SERIES_LIMIT {
            term = term.checked_mul(remainder)?.checked_div_int(i as i128)?;
            if term.is_zero() {
                break;
            }
            sum = sum.checked_add(term)?;
        }

        match k.cmp(&0) {
            Ordering::Equal => Ok(sum),
            Ordering::Greater => {
                if k >= 127 {
                    return Err(MathError::Overflow);
                }
                sum.checked_mul_int(1i128 << k)
            }
            Ordering::Less => {
                let shift = -k;
                if shift >= 127 {
                    Ok(Dec::ZERO)
                } else {
                    Ok(Dec(sum.0 >> shift))
                }
            }
        }
    }

    /// `self^exponent` for a non-negative base.
    pub fn pow(self, exponent: Dec) -> Result<Self> {
        if exponent.is_integer() && !exponent.is_negative() {
            let n = u64::try_from(exponent.0 / SCALE).map_err(|_| MathError::Overflow)?;
            return self.pow_u64(n);
        }
        if self.is_zero() {
            return if exponent.is_positive() {
                Ok(Dec::ZERO)
            } else {
                Err(MathError::InvalidExponent(format!(
                    "0 raised to {}",
                    exponent
                )))
            };
        }
        if self.is_negative() {
            return Err(MathError::InvalidExponent(format!(
                "negative base {} with fractional exponent {}",
                self, exponent
            )));
        }
        exponent.checked_mul(self.ln()?)?.exp()
    }

    /// Truncates the decimal to its `u128` integer part; negative values map to zero.
    pub fn to_u128_floor(self) -> u128 {
        if self.0 <= 0 {
            0
        } else {
            (self.0 / SCALE) as u128
        }
    }

    /// `floor(amount * self)` for a non-negative factor, computed without overflow.
    pub fn mul_amount_floor(self, amount: u128) -> Result<u128> {
        if self.0 < 0 {
            return Err(MathError::InvalidExponent(format!(
                "negative factor {} applied to amount",
                self
            )));
        }
        let product = BigUint::from(amount) * BigUint::from(self.0 as u128) / BigUint::from(SCALE as u128);
        product.to_u128().ok_or(MathError::Overflow)
    }

    /// Lossy conversion for log fields and diagnostics only.
    pub fn to_f64_lossy(self) -> f64 {
        self.0 as f64 / SCALE as f64
    }
}

/// Natural logarithm of an integer amount that may exceed the `Dec` range.
pub fn ln_u128(value: u128) -> Result<Dec> {
    if value == 0 {
        return Err(MathError::NonPositiveLogarithm("0".to_string()));
    }
    let bits = 128 - value.leading_zeros();
    if bits <= 64 {
        return Dec::from_u128(value)?.ln();
    }
    let shift = bits - 64;
    let reduced = Dec::from_u128(value >> shift)?.ln()?;
    Dec(LN2_RAW)
        .checked_mul_int(shift as i128)?
        .checked_add(reduced)
}

/// ln(m) for m in [1, 2) via the atanh series of (m-1)/(m+1).
fn ln_near_one(m: Dec) -> Result<Dec> {
    let z = m.checked_sub(Dec::ONE)?.checked_div(m.checked_add(Dec::ONE)?)?;
    let z2 = z.checked_mul(z)?;
    let mut term = z;
    let mut sum = z;
    let mut n: i128 = 3;
    while n < 2 * SERIES_LIMIT as i128 {
        term = term.checked_mul(z2)?;
        let contribution = term.checked_div_int(n)?;
        if contribution.is_zero() {
            break;
        }
        sum = sum.checked_add(contribution)?;
        n += 2;
    }
    sum.checked_mul_int(2)
}

fn wide_mul_div(a: i128, b: i128, c: i128) -> Result<i128> {
    if c == 0 {
        return Err(MathError::DivisionByZero);
    }
    let quotient = BigInt::from(a) * BigInt::from(b) / BigInt::from(c);
    quotient.to_i128().ok_or(MathError::Overflow)
}

impl fmt::Display for Dec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let negative = self.0 < 0;
        let magnitude = self.0.unsigned_abs();
        let scale = SCALE as u128;
        let int_part = magnitude / scale;
        let frac_part = magnitude % scale;
        if negative {
            write!(f, "-")?;
        }
        if frac_part == 0 {
            write!(f, "{}", int_part)
        } else {
            let digits = format!("{:018}", frac_part);
            write!(f, "{}.{}", int_part, digits.trim_end_matches('0'))
        }
    }
}

impl fmt::Debug for Dec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dec({})", self)
    }
}

impl FromStr for Dec {
    type Err = MathError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        let (int_str, frac_str) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        if (int_str.is_empty() && frac_str.is_empty())
            || !int_str.chars().all(|c| c.is_ascii_digit())
            || !frac_str.chars().all(|c| c.is_ascii_digit())
            || frac_str.len() > DECIMALS as usize
        {
            return Err(MathError::Parse(s.to_string()));
        }

        let int_value: i128 = if int_str.is_empty() {
            0
        } else {
            int_str
                .parse::<i128>()
                .map_err(|_| MathError::Parse(s.to_string()))?
        };
        let mut frac_value: i128 = 0;
        if !frac_str.is_empty() {
            let parsed = frac_str
                .parse::<i128>()
                .map_err(|_| MathError::Parse(s.to_string()))?;
            frac_value = parsed * 10i128.pow(DECIMALS - frac_str.len() as u32);
        }
        let magnitude = int_value
            .checked_mul(SCALE)
            .and_then(|v| v.checked_add(frac_value))
            .ok_or(MathError::Overflow)?;
        Ok(Dec(if negative { -magnitude } else { magnitude }))
    }
}

impl Serialize for Dec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct DecVisitor;

impl<'de> Visitor<'de> for DecVisitor {
    type Value = Dec;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a decimal string such as \"0.25\"")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Dec, E> {
        Dec::from_str(v).map_err(E::custom)
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<Dec, E> {
        self.visit_str(&v)
    }
}

impl<'de> Deserialize<'de> for Dec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Dec, D::Error> {
        deserializer.deserialize_str(DecVisitor)
    }
}
