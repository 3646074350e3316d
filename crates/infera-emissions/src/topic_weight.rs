//! Topic weight from stake and decaying fee revenue, and topic activation.

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::keeper::EmissionsKeeper;
use infera_math::{ln_u128, Dec, MathError};
use infera_storage::Result as StorageResult;
use infera_types::{BlockHeight, FeeRevenue, Params, TokenAmount, TopicId};
use tracing::{debug, info};

/// Revenue left at `now` after per-block decay since the last drip.
pub fn decayed_revenue(revenue: &FeeRevenue, decay_rate: Dec, now: BlockHeight) -> Result<TokenAmount> {
    let elapsed = now.saturating_sub(revenue.last_drip_block);
    if elapsed == 0 || revenue.amount.is_zero() {
        return Ok(revenue.amount);
    }
    let retained = Dec::ONE.checked_sub(decay_rate)?.pow_u64(elapsed)?;
    Ok(TokenAmount::new(retained.mul_amount_floor(revenue.amount.units())?))
}

/// `a ln stake + b ln revenue`, or `None` when either side is zero.
pub fn topic_log_weight(
    stake: TokenAmount,
    revenue: TokenAmount,
    stake_importance: Dec,
    fee_importance: Dec,
) -> Result<Option<Dec>> {
    if stake.is_zero() || revenue.is_zero() {
        return Ok(None);
    }
    let exponent = stake_importance
        .checked_mul(ln_u128(stake.units())?)?
        .checked_add(fee_importance.checked_mul(ln_u128(revenue.units())?)?)?;
    Ok(Some(exponent))
}

/// `exp(log_weight)`, saturating at `Dec::MAX`.
pub fn weight_from_log(log_weight: Option<Dec>) -> Result<Dec> {
    match log_weight.map(Dec::exp) {
        None => Ok(Dec::ZERO),
        Some(Ok(weight)) => Ok(weight),
        Some(Err(MathError::Overflow)) => Ok(Dec::MAX),
        Some(Err(e)) => Err(e.into()),
    }
}

/// `stake^a * revenue^b`, saturating at `Dec::MAX`.
pub fn topic_weight(
    stake: TokenAmount,
    revenue: TokenAmount,
    stake_importance: Dec,
    fee_importance: Dec,
) -> Result<Dec> {
    weight_from_log(topic_log_weight(stake, revenue, stake_importance, fee_importance)?)
}

/// A topic's weight at the current block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopicWeighting {
    pub weight: Dec,
    pub log_weight: Option<Dec>,
    pub revenue: TokenAmount,
}

impl TopicWeighting {
    /// Compared in log space so weights beyond decimal range still rank.
    pub fn meets(&self, min_weight: Dec) -> Result<bool> {
        if !min_weight.is_positive() {
            return Ok(true);
        }
        match self.log_weight {
            Some(log_weight) => Ok(log_weight >= min_weight.ln()?),
            None => Ok(false),
        }
    }
}

impl EmissionsKeeper {
    pub fn get_fee_revenue(&self, ctx: &ExecutionContext, topic_id: TopicId) -> Result<FeeRevenue> {
        Ok(self
            .tables
            .fee_revenue
            .get(ctx.store(), &topic_id)?
            .unwrap_or_default())
    }

    /// Apply decay up to the current block and persist the drip point.
    pub fn drip_topic_fee_revenue(
        &self,
        ctx: &mut ExecutionContext,
        topic_id: TopicId,
        params: &Params,
    ) -> Result<TokenAmount> {
        let revenue = self.get_fee_revenue(ctx, topic_id)?;
        let now = ctx.block_height();
        let amount = decayed_revenue(&revenue, params.topic_fee_revenue_decay_rate, now)?;
        if revenue.amount.is_zero() && revenue.last_drip_block == now {
            return Ok(amount);
        }
        self.tables.fee_revenue.set(
            ctx.store_mut(),
            &topic_id,
            &FeeRevenue {
                amount,
                last_drip_block: now,
            },
        )?;
        Ok(amount)
    }

    pub fn add_topic_fee_revenue(
        &self,
        ctx: &mut ExecutionContext,
        topic_id: TopicId,
        amount: TokenAmount,
    ) -> Result<TokenAmount> {
        let params = self.params(ctx)?;
        let current = self.drip_topic_fee_revenue(ctx, topic_id, &params)?;
        let updated = current.saturating_add(amount);
        let now = ctx.block_height();
        self.tables.fee_revenue.set(
            ctx.store_mut(),
            &topic_id,
            &FeeRevenue {
                amount: updated,
                last_drip_block: now,
            },
        )?;
        debug!(topic_id, added = %amount, revenue = %updated, "Topic fee revenue credited");
        Ok(updated)
    }

    /// Weight at the current block; drips revenue as a side effect.
    pub fn compute_topic_weight(
        &self,
        ctx: &mut ExecutionContext,
        topic_id: TopicId,
        params: &Params,
    ) -> Result<TopicWeighting> {
        let revenue = self.drip_topic_fee_revenue(ctx, topic_id, params)?;
        let stake = self.get_topic_stake(ctx, topic_id)?;
        let log_weight = topic_log_weight(
            stake,
            revenue,
            params.topic_reward_stake_importance,
            params.topic_reward_fee_revenue_importance,
        )?;
        Ok(TopicWeighting {
            weight: weight_from_log(log_weight)?,
            log_weight,
            revenue,
        })
    }

    pub fn is_topic_active(&self, ctx: &ExecutionContext, topic_id: TopicId) -> Result<bool> {
        Ok(self.tables.active_topics.has(ctx.store(), &topic_id)?)
    }

    pub fn active_topic_ids(&self, ctx: &ExecutionContext) -> Result<Vec<TopicId>> {
        Ok(self
            .tables
            .active_topics
            .iter(ctx.store())?
            .map(|r| r.map(|(id, ())| id))
            .collect::<StorageResult<Vec<_>>>()?)
    }

    pub fn next_churn_block(&self, ctx: &ExecutionContext, topic_id: TopicId) -> Result<Option<BlockHeight>> {
        Ok(self.tables.next_churn.get(ctx.store(), &topic_id)?)
    }

    /// Move the topic's churn slot, keeping the by-height index in step.
    pub fn set_next_churn(
        &self,
        ctx: &mut ExecutionContext,
        topic_id: TopicId,
        height: BlockHeight,
    ) -> Result<()> {
        if let Some(previous) = self.next_churn_block(ctx, topic_id)? {
            self.tables
                .churn_index
                .remove(ctx.store_mut(), &(previous, topic_id))?;
        }
        self.tables.next_churn.set(ctx.store_mut(), &topic_id, &height)?;
        self.tables
            .churn_index
            .set(ctx.store_mut(), &(height, topic_id), &())?;
        Ok(())
    }

    /// Mark the topic active when both its weight and stake clear the minimums.
    pub fn activate_topic_if_eligible(
        &self,
        ctx: &mut ExecutionContext,
        topic_id: TopicId,
        params: &Params,
    ) -> Result<bool> {
        if self.is_topic_active(ctx, topic_id)? {
            return Ok(true);
        }
        let topic = self.get_topic(ctx, topic_id)?;
        let weighting = self.compute_topic_weight(ctx, topic_id, params)?;
        let weight = weighting.weight;
        let stake = self.get_topic_stake(ctx, topic_id)?;
        if !weighting.meets(params.min_topic_weight)? || stake < params.required_minimum_stake {
            debug!(topic_id, weight = %weight, stake = %stake, "Topic not yet eligible");
            return Ok(false);
        }

        self.tables.active_topics.set(ctx.store_mut(), &topic_id, &())?;
        let next = ctx
            .block_height()
            .max(topic.epoch_last_ended.saturating_add(topic.epoch_length));
        self.set_next_churn(ctx, topic_id, next)?;
        info!(topic_id, weight = %weight, stake = %stake, next_churn = next, "🟢 Topic activated");
        Ok(true)
    }

    pub fn deactivate_topic(&self, ctx: &mut ExecutionContext, topic_id: TopicId) -> Result<()> {
        self.tables.active_topics.remove(ctx.store_mut(), &topic_id)?;
        if let Some(previous) = self.next_churn_block(ctx, topic_id)? {
            self.tables
                .churn_index
                .remove(ctx.store_mut(), &(previous, topic_id))?;
            self.tables.next_churn.remove(ctx.store_mut(), &topic_id)?;
        }
        info!(topic_id, "🔴 Topic deactivated");
        Ok(())
    }
}
