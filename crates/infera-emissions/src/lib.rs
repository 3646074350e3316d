//! Regret tracking, reputation scoring, staking and topic churn.
//!
//! [`EmissionsKeeper`] owns the table layout; every state transition takes an
//! [`ExecutionContext`] carrying the block height and the store. Inbound
//! messages enter through [`msg_server`], block-level work through
//! [`abci::end_block`].

pub mod abci;
pub mod active_set;
pub mod bank;
pub mod churn;
pub mod context;
pub mod error;
pub mod genesis;
pub mod keeper;
pub mod liveness;
pub mod msg_server;
pub mod permissions;
pub mod regret;
pub mod rewards;
pub mod scoring;
pub mod stake;
pub mod topic_weight;

pub use abci::{end_block, EndBlockReport};
pub use active_set::{select_active, ActiveSetRefresh};
pub use bank::{BankKeeper, MemoryBank, ModuleAccount};
pub use churn::{ActiveTopicWeights, CycleSweep};
pub use context::ExecutionContext;
pub use error::{EmissionsError, Result};
pub use genesis::GenesisState;
pub use keeper::{EmissionsKeeper, GenesisTables, Tables};
pub use liveness::{count_missed_epochs, may_penalise, missed_epochs_since};
pub use msg_server::{Msg, MsgCreateNewTopic};
pub use permissions::{OpenPermissions, PermissionOracle, WhitelistPermissions};
pub use regret::{calc_topic_initial_regret, normalized_regret_sample, RegretLookup};
pub use rewards::RewardDistribution;
pub use scoring::{NetworkLosses, RoundOutcome};
pub use topic_weight::{decayed_revenue, topic_log_weight, topic_weight, TopicWeighting};
