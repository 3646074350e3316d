use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    #[error("Unknown actor role code {0}")]
    UnknownRole(u8),

    #[error("Unknown regret kind code {0}")]
    UnknownRegretKind(u8),
}

pub type Result<T> = std::result::Result<T, TypesError>;
