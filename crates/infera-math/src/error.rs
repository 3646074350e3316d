use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MathError {
    #[error("Safe division by zero: denominator and epsilon are both zero")]
    SafeDivByZero,

    #[error("Overflow in calculation")]
    Overflow,

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Empty input set")]
    EmptyInput,

    #[error("Invalid quantile {0}: must be within [0, 1]")]
    InvalidQuantile(String),

    #[error("Logarithm of non-positive value {0}")]
    NonPositiveLogarithm(String),

    #[error("Square root of negative value {0}")]
    NegativeRoot(String),

    #[error("Invalid exponent: {0}")]
    InvalidExponent(String),

    #[error("Cannot parse decimal '{0}'")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, MathError>;
