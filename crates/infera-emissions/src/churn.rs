//! Per-block churn: which topics open a new epoch, and how open epoch
//! cycles move through their worker and reputer windows.

use crate::context::ExecutionContext;
use crate::error::{EmissionsError, Result};
use crate::keeper::EmissionsKeeper;
use crate::topic_weight::TopicWeighting;
use infera_math::Dec;
use infera_storage::{KeyCodec, Result as StorageResult, Table};
use infera_types::{BlockHeight, CyclePhase, EpochCycle, TokenAmount, TopicId, TopicWeight};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActiveTopicWeights {
    /// Weights of the topics churned this block
    pub weights: BTreeMap<TopicId, Dec>,
    pub sum_weight: Dec,
    pub total_revenue: TokenAmount,
    pub churned: Vec<TopicId>,
    /// Due and eligible but over the per-block cap; retried next block
    pub deferred: Vec<TopicId>,
    pub deactivated: Vec<TopicId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleSweep {
    pub awaiting_reputers: Vec<EpochCycle>,
    pub reward_ready: Vec<EpochCycle>,
    pub discarded: Vec<EpochCycle>,
    pub failures: Vec<(TopicId, BlockHeight, String)>,
}

struct Candidate {
    topic_id: TopicId,
    weighting: TopicWeighting,
}

fn has_prefix<V>(
    table: &Table<(TopicId, BlockHeight, infera_types::ActorId), V>,
    ctx: &ExecutionContext,
    topic_id: TopicId,
    nonce: BlockHeight,
) -> Result<bool>
where
    V: Serialize + DeserializeOwned + 'static,
{
    Ok(table
        .iter_prefix(ctx.store(), &(topic_id, nonce))?
        .next()
        .is_some())
}

fn clear_prefix<K, V, P>(table: &Table<K, V>, ctx: &mut ExecutionContext, partial: &P) -> Result<usize>
where
    K: KeyCodec + 'static,
    V: Serialize + DeserializeOwned + 'static,
    P: KeyCodec,
{
    let keys: Vec<K> = table
        .iter_prefix(ctx.store(), partial)?
        .map(|r| r.map(|(k, _)| k))
        .collect::<StorageResult<Vec<_>>>()?;
    for key in &keys {
        table.remove(ctx.store_mut(), key)?;
    }
    Ok(keys.len())
}

impl EmissionsKeeper {
    pub fn get_cycle(
        &self,
        ctx: &ExecutionContext,
        topic_id: TopicId,
        nonce: BlockHeight,
    ) -> Result<Option<EpochCycle>> {
        Ok(self.tables.cycles.get(ctx.store(), &(topic_id, nonce))?)
    }

    pub fn open_cycles(&self, ctx: &ExecutionContext) -> Result<Vec<EpochCycle>> {
        Ok(self
            .tables
            .cycles
            .iter(ctx.store())?
            .map(|r| r.map(|(_, cycle)| cycle))
            .collect::<StorageResult<Vec<_>>>()?)
    }

    pub fn topic_weight_record(
        &self,
        ctx: &ExecutionContext,
        topic_id: TopicId,
    ) -> Result<Option<TopicWeight>> {
        Ok(self.tables.topic_weights.get(ctx.store(), &topic_id)?)
    }

    /// Topic ids whose churn slot is due at or before the current height.
    fn due_topics(&self, ctx: &mut ExecutionContext) -> Result<Vec<TopicId>> {
        let height = ctx.block_height();
        let mut due = Vec::new();
        let mut stale = Vec::new();
        for record in self.tables.churn_index.iter(ctx.store())? {
            let ((block, topic_id), ()) = record?;
            if block > height {
                break;
            }
            let current = self.tables.next_churn.get(ctx.store(), &topic_id)?;
            if current == Some(block) && self.tables.active_topics.has(ctx.store(), &topic_id)? {
                due.push(topic_id);
            } else {
                stale.push((block, topic_id));
            }
        }
        for key in &stale {
            self.tables.churn_index.remove(ctx.store_mut(), key)?;
        }
        Ok(due)
    }

    /// Weigh every due topic, deactivate the ones below the minimum weight
    /// and open a new epoch for the heaviest ones within the per-block cap.
    pub fn get_and_update_active_topic_weights(
        &self,
        ctx: &mut ExecutionContext,
    ) -> Result<ActiveTopicWeights> {
        let params = self.params(ctx)?;
        let height = ctx.block_height();
        let mut result = ActiveTopicWeights::default();

        let mut candidates = Vec::new();
        for topic_id in self.due_topics(ctx)? {
            match self.compute_topic_weight(ctx, topic_id, &params) {
                Ok(weighting) if !weighting.meets(params.min_topic_weight)? => {
                    self.deactivate_topic(ctx, topic_id)?;
                    result.deactivated.push(topic_id);
                }
                Ok(weighting) => candidates.push(Candidate { topic_id, weighting }),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(topic_id, error = %e, "⚠️ Skipping topic weight this block");
                }
            }
        }

        candidates.sort_by(|a, b| {
            b.weighting
                .log_weight
                .cmp(&a.weighting.log_weight)
                .then_with(|| a.topic_id.cmp(&b.topic_id))
        });
        let cap = usize::try_from(params.max_active_topics_per_block).unwrap_or(usize::MAX);
        let deferred = if candidates.len() > cap {
            candidates.split_off(cap)
        } else {
            Vec::new()
        };
        result.deferred = deferred.iter().map(|c| c.topic_id).collect();

        for candidate in candidates {
            let weight = candidate.weighting.weight;
            let mut topic = self.get_topic(ctx, candidate.topic_id)?;
            topic.epoch_last_ended = height;
            self.set_topic(ctx, &topic)?;
            self.set_next_churn(ctx, topic.id, height.saturating_add(topic.epoch_length))?;
            self.tables.cycles.set(
                ctx.store_mut(),
                &(topic.id, height),
                &EpochCycle {
                    topic_id: topic.id,
                    worker_nonce: height,
                    phase: CyclePhase::WindowOpen,
                },
            )?;
            self.tables.topic_weights.set(
                ctx.store_mut(),
                &topic.id,
                &TopicWeight {
                    weight,
                    log_weight: candidate.weighting.log_weight,
                    block_height: height,
                },
            )?;

            result.sum_weight = result.sum_weight.checked_add(weight).unwrap_or(Dec::MAX);
            result.total_revenue = result.total_revenue.saturating_add(candidate.weighting.revenue);
            result.weights.insert(topic.id, weight);
            result.churned.push(topic.id);
            debug!(topic_id = topic.id, weight = %weight, nonce = height, "🔁 Topic churned");
        }

        if !result.churned.is_empty() || !result.deferred.is_empty() {
            info!(
                churned = result.churned.len(),
                deferred = result.deferred.len(),
                deactivated = result.deactivated.len(),
                sum_weight = %result.sum_weight,
                "⚖️ Active topic weights updated"
            );
        }
        Ok(result)
    }

    /// Remove a cycle and every payload submitted for it.
    pub fn prune_cycle(
        &self,
        ctx: &mut ExecutionContext,
        topic_id: TopicId,
        nonce: BlockHeight,
    ) -> Result<()> {
        let partial = (topic_id, nonce);
        let inferences = clear_prefix(&self.tables.inferences, ctx, &partial)?;
        let forecasts = clear_prefix(&self.tables.forecasts, ctx, &partial)?;
        let bundles = clear_prefix(&self.tables.reputer_bundles, ctx, &partial)?;
        self.tables.cycles.remove(ctx.store_mut(), &partial)?;
        debug!(topic_id, nonce, inferences, forecasts, bundles, "🧹 Cycle pruned");
        Ok(())
    }

    fn advance_cycle(&self, ctx: &mut ExecutionContext, cycle: &EpochCycle, sweep: &mut CycleSweep) -> Result<()> {
        let height = ctx.block_height();
        let topic = self.get_topic(ctx, cycle.topic_id)?;
        let nonce = cycle.worker_nonce;
        match cycle.phase {
            CyclePhase::WindowOpen if height >= topic.worker_window_end(nonce) => {
                if has_prefix(&self.tables.inferences, ctx, topic.id, nonce)? {
                    let next = EpochCycle {
                        phase: CyclePhase::AwaitingReputers,
                        ..cycle.clone()
                    };
                    self.tables.cycles.set(ctx.store_mut(), &(topic.id, nonce), &next)?;
                    sweep.awaiting_reputers.push(next);
                } else {
                    self.prune_cycle(ctx, topic.id, nonce)?;
                    sweep.discarded.push(cycle.clone());
                }
            }
            CyclePhase::AwaitingReputers if height >= topic.reputer_window_end(nonce) => {
                if has_prefix(&self.tables.reputer_bundles, ctx, topic.id, nonce)? {
                    let next = EpochCycle {
                        phase: CyclePhase::RewardReady,
                        ..cycle.clone()
                    };
                    self.tables.cycles.set(ctx.store_mut(), &(topic.id, nonce), &next)?;
                    sweep.reward_ready.push(next);
                } else {
                    self.prune_cycle(ctx, topic.id, nonce)?;
                    sweep.discarded.push(cycle.clone());
                }
            }
            CyclePhase::RewardReady => sweep.reward_ready.push(cycle.clone()),
            _ => {}
        }
        Ok(())
    }

    /// Close the worker and reputer windows that end at this height.
    pub fn close_due_windows(&self, ctx: &mut ExecutionContext) -> Result<CycleSweep> {
        let mut sweep = CycleSweep::default();
        for cycle in self.open_cycles(ctx)? {
            let outcome = ctx.in_transaction(|ctx| self.advance_cycle(ctx, &cycle, &mut sweep));
            match outcome {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(
                        topic_id = cycle.topic_id,
                        nonce = cycle.worker_nonce,
                        error = %e,
                        "⚠️ Failed to advance cycle"
                    );
                    sweep
                        .failures
                        .push((cycle.topic_id, cycle.worker_nonce, e.to_string()));
                }
            }
        }
        if !sweep.discarded.is_empty() {
            info!(discarded = sweep.discarded.len(), "🗑️ Cycles discarded without submissions");
        }
        Ok(sweep)
    }

    pub(crate) fn require_cycle(
        &self,
        ctx: &ExecutionContext,
        topic_id: TopicId,
        nonce: BlockHeight,
        phase: CyclePhase,
    ) -> Result<EpochCycle> {
        match self.get_cycle(ctx, topic_id, nonce)? {
            Some(cycle) if cycle.phase == phase => Ok(cycle),
            _ => Err(EmissionsError::CycleNotFound { topic_id, nonce }),
        }
    }
}
