//! Deterministic numerics for regret and reputation scoring.
//!
//! All values are [`Dec`] fixed-point decimals so that replays on every node
//! produce identical bits; there is no floating point on the scoring path.

pub mod dec;
pub mod ema;
pub mod error;
pub mod stats;

pub use dec::{ln_u128, Dec, DECIMALS};
pub use ema::{ema, n_calc_ema};
pub use error::{MathError, Result};
pub use stats::{mean, p_norm, quantile, safe_div, std_dev, sum, weighted_mean};
