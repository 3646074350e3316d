//! Shared domain types for the infera emissions keeper: validated account
//! addresses, token amounts, topics, module parameters, persisted records and
//! the payloads workers and reputers submit.

pub mod address;
pub mod amount;
pub mod error;
pub mod params;
pub mod payload;
pub mod records;
pub mod role;
pub mod topic;

pub use address::{ActorId, ACCOUNT_HRP};
pub use amount::TokenAmount;
pub use error::{Result, TypesError};
pub use params::Params;
pub use payload::{
    Forecast, ForecastElement, Inference, OneInForecasterValue, ReputerValueBundle,
    WorkerAttributedValue, WorkerPayload,
};
pub use records::{
    CyclePhase, DelegateStakeRemovalInfo, EpochCycle, FeeRevenue, Score, StakeRemovalInfo,
    TimestampedValue, TopicWeight,
};
pub use role::{ActorRole, RegistrationKind, RegretKind};
pub use topic::Topic;

pub type TopicId = u64;
pub type BlockHeight = u64;
