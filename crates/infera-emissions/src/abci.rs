//! End-of-block hook.

use crate::churn::{ActiveTopicWeights, CycleSweep};
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::keeper::EmissionsKeeper;
use crate::rewards::RewardDistribution;
use crate::scoring::RoundOutcome;
use infera_types::{BlockHeight, TopicId};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EndBlockReport {
    pub block_height: BlockHeight,
    pub stake_removals: usize,
    pub delegate_stake_removals: usize,
    pub topic_weights: ActiveTopicWeights,
    pub sweep: CycleSweep,
    pub rounds: Vec<RoundOutcome>,
    pub scoring_failures: Vec<(TopicId, BlockHeight, String)>,
    pub rewards: RewardDistribution,
}

/// Runs, in order: due stake removals, topic weights and churn, window
/// closing, scoring of reward-ready cycles and reward emission.
///
/// Errors confined to one topic are logged and skipped. Ledger corruption
/// and storage failures abort the block.
pub fn end_block(keeper: &mut EmissionsKeeper, ctx: &mut ExecutionContext) -> Result<EndBlockReport> {
    let _guard = ctx.span().clone().entered();
    let params = keeper.params(ctx)?;
    let cap = params.half_max_stake_removals_per_block();
    let mut report = EndBlockReport {
        block_height: ctx.block_height(),
        ..EndBlockReport::default()
    };

    report.stake_removals = ctx
        .in_transaction(|ctx| keeper.process_due_stake_removals(ctx, cap))
        .map_err(|e| {
            error!(error = %e, "❌ Stake removal processing failed");
            e
        })?;
    report.delegate_stake_removals = ctx
        .in_transaction(|ctx| keeper.process_due_delegate_stake_removals(ctx, cap))
        .map_err(|e| {
            error!(error = %e, "❌ Delegate stake removal processing failed");
            e
        })?;

    report.topic_weights = keeper.get_and_update_active_topic_weights(ctx)?;
    report.sweep = keeper.close_due_windows(ctx)?;

    let mut scored: Vec<TopicId> = Vec::new();
    for cycle in report.sweep.reward_ready.clone() {
        let (topic_id, nonce) = (cycle.topic_id, cycle.worker_nonce);
        match ctx.in_transaction(|ctx| keeper.run_scoring_round(ctx, topic_id, nonce)) {
            Ok(outcome) => {
                if !scored.contains(&topic_id) {
                    scored.push(topic_id);
                }
                report.rounds.push(outcome);
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(topic_id, nonce, error = %e, "⚠️ Scoring round skipped");
                report.scoring_failures.push((topic_id, nonce, e.to_string()));
            }
        }
        keeper.prune_cycle(ctx, topic_id, nonce)?;
    }

    if !scored.is_empty() {
        match ctx.in_transaction(|ctx| keeper.distribute_rewards(ctx, &scored)) {
            Ok(rewards) => report.rewards = rewards,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!(error = %e, "⚠️ Reward distribution skipped"),
        }
    }

    info!(
        height = report.block_height,
        stake_removals = report.stake_removals,
        delegate_stake_removals = report.delegate_stake_removals,
        churned = report.topic_weights.churned.len(),
        scored = report.rounds.len(),
        paid = %report.rewards.total_paid,
        "📦 End block complete"
    );
    Ok(report)
}
