//! Per-block emission paid to the active sets of the topics scored this block.

use crate::active_set::max_active;
use crate::bank::ModuleAccount;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::keeper::EmissionsKeeper;
use infera_math::Dec;
use infera_types::{ActorId, ActorRole, Params, TokenAmount, TopicId, TopicWeight};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RewardDistribution {
    pub budget: TokenAmount,
    pub payouts: Vec<(TopicId, ActorRole, ActorId, TokenAmount)>,
    pub total_paid: TokenAmount,
}

fn role_fraction(params: &Params, role: ActorRole) -> Dec {
    match role {
        ActorRole::Inferer => params.inferer_reward_fraction,
        ActorRole::Forecaster => params.forecaster_reward_fraction,
        ActorRole::Reputer => params.reputer_reward_fraction,
    }
}

/// `floor(amount * part / whole)`; zero when `whole` is zero.
fn pro_rata(amount: TokenAmount, part: Dec, whole: Dec) -> Result<TokenAmount> {
    if !whole.is_positive() || amount.is_zero() {
        return Ok(TokenAmount::ZERO);
    }
    let ratio = part.checked_div(whole)?;
    Ok(TokenAmount::new(ratio.mul_amount_floor(amount.units())?))
}

/// Log weight of a stored record; records written without one fall back to `ln(weight)`.
fn record_log_weight(record: &TopicWeight) -> Result<Option<Dec>> {
    match record.log_weight {
        Some(log_weight) => Ok(Some(log_weight)),
        None if record.weight.is_positive() => Ok(Some(record.weight.ln()?)),
        None => Ok(None),
    }
}

impl EmissionsKeeper {
    /// Share of a topic's role budget for each active member, proportional
    /// to how far its score sits above the weakest member.
    fn member_shares(
        &self,
        ctx: &ExecutionContext,
        topic_id: TopicId,
        role: ActorRole,
        budget: TokenAmount,
        params: &Params,
    ) -> Result<Vec<(ActorId, TokenAmount)>> {
        let mut scores = self.active_scores(ctx, topic_id, role)?;
        scores.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.address.cmp(&b.address)));
        scores.truncate(usize::try_from(max_active(params, role)).unwrap_or(usize::MAX));
        let Some(min) = scores.iter().map(|s| s.score).min() else {
            return Ok(Vec::new());
        };

        let mut weights = Vec::with_capacity(scores.len());
        let mut total = Dec::ZERO;
        for score in scores {
            let weight = score.score.checked_sub(min)?.checked_add(params.epsilon_reputer)?;
            total = total.checked_add(weight)?;
            weights.push((score.address, weight));
        }
        weights
            .into_iter()
            .map(|(actor, weight)| Ok((actor, pro_rata(budget, weight, total)?)))
            .collect()
    }

    /// Pay this block's emission across `topics` by stored topic weight.
    pub fn distribute_rewards(
        &mut self,
        ctx: &mut ExecutionContext,
        topics: &[TopicId],
    ) -> Result<RewardDistribution> {
        let params = self.params(ctx)?;
        let available = self.bank().module_balance(ModuleAccount::Rewards);
        let budget = params.emission_per_block.min(available);
        let mut distribution = RewardDistribution {
            budget,
            ..RewardDistribution::default()
        };
        if budget.is_zero() || topics.is_empty() {
            return Ok(distribution);
        }

        let mut logs = Vec::with_capacity(topics.len());
        for topic_id in topics {
            if let Some(record) = self.topic_weight_record(ctx, *topic_id)? {
                logs.push((*topic_id, record_log_weight(&record)?));
            }
        }
        // shares are exp(l - max) so weights beyond decimal range still split exactly
        let Some(max_log) = logs.iter().filter_map(|(_, l)| *l).max() else {
            return Ok(distribution);
        };
        let mut weighted = Vec::with_capacity(logs.len());
        let mut sum_weight = Dec::ZERO;
        for (topic_id, log_weight) in logs {
            let relative = match log_weight {
                Some(l) => l.checked_sub(max_log)?.exp()?,
                None => Dec::ZERO,
            };
            sum_weight = sum_weight.checked_add(relative)?;
            weighted.push((topic_id, relative));
        }

        for (topic_id, weight) in weighted {
            let topic_budget = pro_rata(budget, weight, sum_weight)?;
            for role in ActorRole::ALL {
                let role_budget = TokenAmount::new(
                    role_fraction(&params, role).mul_amount_floor(topic_budget.units())?,
                );
                for (actor, amount) in self.member_shares(ctx, topic_id, role, role_budget, &params)? {
                    if amount.is_zero() {
                        continue;
                    }
                    self.bank_mut()
                        .send_from_module(ModuleAccount::Rewards, &actor, amount)?;
                    distribution.total_paid = distribution.total_paid.saturating_add(amount);
                    debug!(topic_id, role = %role, actor = %actor, amount = %amount, "Reward paid");
                    distribution.payouts.push((topic_id, role, actor, amount));
                }
            }
        }

        info!(
            budget = %budget,
            paid = %distribution.total_paid,
            recipients = distribution.payouts.len(),
            "🎁 Rewards distributed"
        );
        Ok(distribution)
    }
}
