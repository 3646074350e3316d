use crate::address::ActorId;
use crate::error::{Result, TypesError};
use crate::params::{open_unit, Params};
use crate::role::ActorRole;
use crate::{BlockHeight, TopicId};
use infera_math::Dec;
use serde::{Deserialize, Serialize};

/// One inference market and its scoring configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: TopicId,
    pub creator: ActorId,
    pub metadata: String,
    pub loss_method: String,
    /// Height at which the last epoch was churned (or the topic was created)
    pub epoch_last_ended: BlockHeight,
    pub epoch_length: u64,
    pub ground_truth_lag: u64,
    pub worker_submission_window: u64,
    pub p_norm: Dec,
    pub alpha_regret: Dec,
    pub allow_negative: bool,
    pub epsilon: Dec,
    /// Starting regret for actors without history; written by bootstrap only
    pub initial_regret: Dec,
    pub merit_sortition_alpha: Dec,
    pub active_inferer_quantile: Dec,
    pub active_forecaster_quantile: Dec,
    pub active_reputer_quantile: Dec,
    pub enable_worker_whitelist: bool,
    pub enable_reputer_whitelist: bool,
}

impl Topic {
    pub fn validate(&self, params: &Params) -> Result<()> {
        if self.epoch_length == 0 || self.epoch_length < params.min_epoch_length {
            return Err(TypesError::InvalidTopic(format!(
                "epoch length {} below minimum {}",
                self.epoch_length,
                params.min_epoch_length.max(1)
            )));
        }
        if self.worker_submission_window == 0 || self.worker_submission_window > self.epoch_length {
            return Err(TypesError::InvalidTopic(format!(
                "worker submission window {} must be within [1, {}]",
                self.worker_submission_window, self.epoch_length
            )));
        }
        if self.ground_truth_lag < self.worker_submission_window {
            return Err(TypesError::InvalidTopic(format!(
                "ground truth lag {} shorter than worker submission window {}",
                self.ground_truth_lag, self.worker_submission_window
            )));
        }
        if self.metadata.len() as u64 > params.max_string_length {
            return Err(TypesError::InvalidTopic("metadata too long".to_string()));
        }
        if self.loss_method.is_empty() || self.loss_method.len() as u64 > params.max_string_length {
            return Err(TypesError::InvalidTopic(
                "loss method must be a non-empty short string".to_string(),
            ));
        }
        if self.p_norm < Dec::ONE {
            return Err(TypesError::InvalidTopic(format!(
                "p-norm {} must be at least 1",
                self.p_norm
            )));
        }
        unit_alpha("alpha_regret", self.alpha_regret)?;
        unit_alpha("merit_sortition_alpha", self.merit_sortition_alpha)?;
        if !self.epsilon.is_positive() {
            return Err(TypesError::InvalidTopic("epsilon must be positive".to_string()));
        }
        open_unit("active_inferer_quantile", self.active_inferer_quantile)?;
        open_unit("active_forecaster_quantile", self.active_forecaster_quantile)?;
        open_unit("active_reputer_quantile", self.active_reputer_quantile)?;
        Ok(())
    }

    pub fn active_quantile(&self, role: ActorRole) -> Dec {
        match role {
            ActorRole::Inferer => self.active_inferer_quantile,
            ActorRole::Forecaster => self.active_forecaster_quantile,
            ActorRole::Reputer => self.active_reputer_quantile,
        }
    }

    /// Last height at which worker payloads for `nonce` are accepted.
    pub fn worker_window_end(&self, nonce: BlockHeight) -> BlockHeight {
        nonce.saturating_add(self.worker_submission_window)
    }

    /// First height at which reputer payloads for `nonce` are accepted.
    pub fn reputer_window_start(&self, nonce: BlockHeight) -> BlockHeight {
        nonce.saturating_add(self.ground_truth_lag)
    }

    /// Last height at which reputer payloads for `nonce` are accepted.
    pub fn reputer_window_end(&self, nonce: BlockHeight) -> BlockHeight {
        self.reputer_window_start(nonce)
            .saturating_add(self.worker_submission_window)
    }
}

fn unit_alpha(name: &'static str, alpha: Dec) -> Result<()> {
    if !alpha.is_positive() || alpha > Dec::ONE {
        return Err(TypesError::InvalidParameter {
            name,
            reason: "must be within (0, 1]".to_string(),
        });
    }
    Ok(())
}
