use crate::amount::TokenAmount;
use crate::error::{Result, TypesError};
use infera_math::Dec;
use serde::{Deserialize, Serialize};

/// Module-wide parameters of the emissions keeper.
/// Updated only through `update_params` by a permitted sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Params {
    /// Topics whose weight falls below this are deactivated
    pub min_topic_weight: Dec,

    /// Minimum reputer authority stake to submit payloads, and topic stake to activate
    pub required_minimum_stake: TokenAmount,

    /// Blocks between a removal request and its completion
    pub remove_stake_delay_window: u64,

    /// Removal requests processed per block, shared between the reputer and delegate queues
    pub max_stake_removals_per_block: u64,

    /// Cap on topics churned in a single block
    pub max_active_topics_per_block: u64,

    pub min_epoch_length: u64,

    pub max_string_length: u64,

    pub max_elements_per_forecast: u64,

    /// Exponent applied to topic stake in the weight formula
    pub topic_reward_stake_importance: Dec,

    /// Exponent applied to decayed fee revenue in the weight formula
    pub topic_reward_fee_revenue_importance: Dec,

    /// Fraction of topic fee revenue lost per block
    pub topic_fee_revenue_decay_rate: Dec,

    pub create_topic_fee: TokenAmount,

    pub registration_fee: TokenAmount,

    /// Scale of the normalized regret mapping
    pub c_norm: Dec,

    /// Denominator floor for safe division in regret normalization
    pub epsilon_safe_div: Dec,

    /// Quantile used to bootstrap a topic's initial regret
    pub initial_regret_quantile: Dec,

    /// Experienced actors required before the offset bootstrap formula is used
    pub min_experienced_worker_regrets: u64,

    /// Population above which bootstrap falls back to the raw all-actor quantile
    pub initial_regret_fallback_population: u64,

    pub max_whitelist_input_array_length: u64,

    /// Tokens paid out of the rewards account per block
    pub emission_per_block: TokenAmount,

    pub inferer_reward_fraction: Dec,
    pub forecaster_reward_fraction: Dec,
    pub reputer_reward_fraction: Dec,

    pub max_top_inferers_to_reward: u64,
    pub max_top_forecasters_to_reward: u64,
    pub max_top_reputers_to_reward: u64,

    /// Smoothing term for reputer consensus distances and reward shares
    pub epsilon_reputer: Dec,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            min_topic_weight: Dec::from_u64(100),
            required_minimum_stake: TokenAmount::new(10_000),
            remove_stake_delay_window: 120,
            max_stake_removals_per_block: 1_000,
            max_active_topics_per_block: 128,
            min_epoch_length: 1,
            max_string_length: 255,
            max_elements_per_forecast: 64,
            topic_reward_stake_importance: Dec::from_raw(500_000_000_000_000_000),
            topic_reward_fee_revenue_importance: Dec::from_raw(500_000_000_000_000_000),
            topic_fee_revenue_decay_rate: Dec::from_raw(2_500_000_000_000_000),
            create_topic_fee: TokenAmount::new(10),
            registration_fee: TokenAmount::new(10),
            c_norm: Dec::from_raw(750_000_000_000_000_000),
            epsilon_safe_div: Dec::from_raw(100_000_000_000),
            initial_regret_quantile: Dec::from_raw(250_000_000_000_000_000),
            min_experienced_worker_regrets: 5,
            initial_regret_fallback_population: 10,
            max_whitelist_input_array_length: 10,
            emission_per_block: TokenAmount::new(1_000_000),
            inferer_reward_fraction: Dec::from_raw(400_000_000_000_000_000),
            forecaster_reward_fraction: Dec::from_raw(200_000_000_000_000_000),
            reputer_reward_fraction: Dec::from_raw(400_000_000_000_000_000),
            max_top_inferers_to_reward: 48,
            max_top_forecasters_to_reward: 24,
            max_top_reputers_to_reward: 24,
            epsilon_reputer: Dec::from_raw(10_000_000_000_000_000),
        }
    }
}

impl Params {
    /// Validate parameter bounds
    pub fn validate(&self) -> Result<()> {
        non_negative("min_topic_weight", self.min_topic_weight)?;
        positive_u64("remove_stake_delay_window", self.remove_stake_delay_window)?;
        positive_u64("max_stake_removals_per_block", self.max_stake_removals_per_block)?;
        positive_u64("max_active_topics_per_block", self.max_active_topics_per_block)?;
        positive_u64("min_epoch_length", self.min_epoch_length)?;
        positive_u64("max_string_length", self.max_string_length)?;
        positive_u64("max_elements_per_forecast", self.max_elements_per_forecast)?;
        non_negative("topic_reward_stake_importance", self.topic_reward_stake_importance)?;
        non_negative(
            "topic_reward_fee_revenue_importance",
            self.topic_reward_fee_revenue_importance,
        )?;
        if self.topic_fee_revenue_decay_rate.is_negative()
            || self.topic_fee_revenue_decay_rate >= Dec::ONE
        {
            return Err(invalid(
                "topic_fee_revenue_decay_rate",
                "must be within [0, 1)",
            ));
        }
        positive("c_norm", self.c_norm)?;
        positive("epsilon_safe_div", self.epsilon_safe_div)?;
        open_unit("initial_regret_quantile", self.initial_regret_quantile)?;
        positive_u64(
            "min_experienced_worker_regrets",
            self.min_experienced_worker_regrets,
        )?;
        positive_u64(
            "max_whitelist_input_array_length",
            self.max_whitelist_input_array_length,
        )?;
        positive_u64("max_top_inferers_to_reward", self.max_top_inferers_to_reward)?;
        positive_u64("max_top_forecasters_to_reward", self.max_top_forecasters_to_reward)?;
        positive_u64("max_top_reputers_to_reward", self.max_top_reputers_to_reward)?;
        positive("epsilon_reputer", self.epsilon_reputer)?;

        for (name, fraction) in [
            ("inferer_reward_fraction", self.inferer_reward_fraction),
            ("forecaster_reward_fraction", self.forecaster_reward_fraction),
            ("reputer_reward_fraction", self.reputer_reward_fraction),
        ] {
            if fraction.is_negative() || fraction > Dec::ONE {
                return Err(invalid(name, "must be within [0, 1]"));
            }
        }
        let total = self
            .inferer_reward_fraction
            .checked_add(self.forecaster_reward_fraction)
            .and_then(|t| t.checked_add(self.reputer_reward_fraction))
            .map_err(|e| invalid("reward fractions", &e.to_string()))?;
        if total != Dec::ONE {
            return Err(invalid(
                "reward fractions",
                &format!("must sum to 1, got {}", total),
            ));
        }
        Ok(())
    }

    /// Removal cap for one of the two queues; the per-block budget is split evenly.
    pub fn half_max_stake_removals_per_block(&self) -> u64 {
        (self.max_stake_removals_per_block / 2).max(1)
    }
}

fn invalid(name: &'static str, reason: &str) -> TypesError {
    TypesError::InvalidParameter {
        name,
        reason: reason.to_string(),
    }
}

fn positive_u64(name: &'static str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(invalid(name, "must be greater than zero"));
    }
    Ok(())
}

fn positive(name: &'static str, value: Dec) -> Result<()> {
    if !value.is_positive() {
        return Err(invalid(name, "must be greater than zero"));
    }
    Ok(())
}

fn non_negative(name: &'static str, value: Dec) -> Result<()> {
    if value.is_negative() {
        return Err(invalid(name, "must not be negative"));
    }
    Ok(())
}

pub(crate) fn open_unit(name: &'static str, value: Dec) -> Result<()> {
    if !value.is_positive() || value >= Dec::ONE {
        return Err(invalid(name, "must be within (0, 1)"));
    }
    Ok(())
}
