use infera_math::MathError;
use infera_storage::StorageError;
use infera_types::{ActorId, BlockHeight, TokenAmount, TopicId, TypesError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmissionsError {
    #[error("Topic {0} not found")]
    TopicNotFound(TopicId),

    #[error("{actor} is not registered as {kind} in topic {topic_id}")]
    NotRegistered {
        topic_id: TopicId,
        actor: ActorId,
        kind: &'static str,
    },

    #[error("{actor} is already registered as {kind} in topic {topic_id}")]
    AlreadyRegistered {
        topic_id: TopicId,
        actor: ActorId,
        kind: &'static str,
    },

    #[error("{actor} is not permitted to {action}")]
    NotPermitted {
        actor: ActorId,
        action: &'static str,
    },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient stake: requested {requested}, available {available}")]
    InsufficientStake {
        requested: TokenAmount,
        available: TokenAmount,
    },

    #[error("Insufficient regret data: {0}")]
    InsufficientRegretData(String),

    #[error("No open cycle for topic {topic_id} at nonce {nonce}")]
    CycleNotFound { topic_id: TopicId, nonce: BlockHeight },

    #[error("Submission window for topic {topic_id} nonce {nonce} is not open at height {height}")]
    WindowClosed {
        topic_id: TopicId,
        nonce: BlockHeight,
        height: BlockHeight,
    },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Whitelist input of {len} entries exceeds maximum {max}")]
    WhitelistInputTooLong { len: usize, max: u64 },

    #[error("Stake underflow: {0}")]
    StakeUnderflow(String),

    #[error("Bank error: {0}")]
    Bank(String),

    #[error("Invalid genesis: {0}")]
    InvalidGenesis(String),

    #[error(transparent)]
    Types(#[from] TypesError),

    #[error(transparent)]
    Math(#[from] MathError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl EmissionsError {
    /// Ledger corruption and storage failures abort the whole block.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EmissionsError::StakeUnderflow(_) | EmissionsError::Storage(_)
        )
    }

    /// Scoring could not proceed for lack of data; never silently defaulted.
    pub fn is_insufficient_data(&self) -> bool {
        matches!(
            self,
            EmissionsError::InsufficientRegretData(_)
                | EmissionsError::Math(MathError::SafeDivByZero)
        )
    }
}

pub type Result<T> = std::result::Result<T, EmissionsError>;
