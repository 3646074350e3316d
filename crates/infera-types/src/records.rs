use crate::address::ActorId;
use crate::amount::TokenAmount;
use crate::{BlockHeight, TopicId};
use infera_math::Dec;
use serde::{Deserialize, Serialize};

/// A value tagged with the height at which it was last written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampedValue {
    pub block_height: BlockHeight,
    pub value: Dec,
}

/// An actor's exponential-moving-average performance score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub topic_id: TopicId,
    pub address: ActorId,
    pub block_height: BlockHeight,
    pub score: Dec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeRemovalInfo {
    pub block_removal_started: BlockHeight,
    pub block_removal_completed: BlockHeight,
    pub topic_id: TopicId,
    pub reputer: ActorId,
    pub amount: TokenAmount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateStakeRemovalInfo {
    pub block_removal_started: BlockHeight,
    pub block_removal_completed: BlockHeight,
    pub topic_id: TopicId,
    pub delegator: ActorId,
    pub reputer: ActorId,
    pub amount: TokenAmount,
}

/// Fee revenue credited to a topic, decaying per block since `last_drip_block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeeRevenue {
    pub amount: TokenAmount,
    pub last_drip_block: BlockHeight,
}

/// Weight of a topic when it last churned. `weight` saturates at `Dec::MAX`;
/// `log_weight` is exact and is what topics are compared by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicWeight {
    pub weight: Dec,
    #[serde(default)]
    pub log_weight: Option<Dec>,
    pub block_height: BlockHeight,
}

/// Phase of an open epoch cycle. A topic with no open cycle is dormant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CyclePhase {
    WindowOpen,
    AwaitingReputers,
    RewardReady,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochCycle {
    pub topic_id: TopicId,
    pub worker_nonce: BlockHeight,
    pub phase: CyclePhase,
}
