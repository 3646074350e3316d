use crate::address::ActorId;
use crate::{BlockHeight, TopicId};
use infera_math::Dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inference {
    pub topic_id: TopicId,
    pub block_height: BlockHeight,
    pub inferer: ActorId,
    pub value: Dec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastElement {
    pub inferer: ActorId,
    pub value: Dec,
}

/// A forecaster's predicted losses for the inferers of the same epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Forecast {
    pub topic_id: TopicId,
    pub block_height: BlockHeight,
    pub forecaster: ActorId,
    pub elements: Vec<ForecastElement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPayload {
    pub topic_id: TopicId,
    pub worker_nonce: BlockHeight,
    pub inference: Option<Inference>,
    pub forecast: Option<Forecast>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerAttributedValue {
    pub worker: ActorId,
    pub value: Dec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneInForecasterValue {
    pub forecaster: ActorId,
    pub inferer: ActorId,
    pub value: Dec,
}

/// Losses a reputer measured once ground truth for `worker_nonce` became available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputerValueBundle {
    pub topic_id: TopicId,
    pub worker_nonce: BlockHeight,
    pub reputer: ActorId,
    pub combined_value: Dec,
    pub naive_value: Dec,
    pub inferer_values: Vec<WorkerAttributedValue>,
    pub forecaster_values: Vec<WorkerAttributedValue>,
    pub one_out_inferer_values: Vec<WorkerAttributedValue>,
    pub one_out_forecaster_values: Vec<WorkerAttributedValue>,
    pub one_in_forecaster_values: Vec<OneInForecasterValue>,
}
