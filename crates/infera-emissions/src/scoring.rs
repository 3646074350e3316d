//! Scoring round for an epoch whose reputer window has closed.
//!
//! Reputer bundles are folded into stake-weighted network losses, which then
//! drive regret updates, EMA scores, liveness penalties for absent members
//! and the active-set refresh for all three roles.

use crate::active_set::ActiveSetRefresh;
use crate::context::ExecutionContext;
use crate::error::{EmissionsError, Result};
use crate::keeper::EmissionsKeeper;
use infera_math::{ema, mean, safe_div, weighted_mean, Dec};
use infera_storage::Result as StorageResult;
use infera_types::{
    ActorId, ActorRole, BlockHeight, RegretKind, ReputerValueBundle, Score, Topic, TopicId,
    WorkerAttributedValue,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// Consensus losses of one epoch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkLosses {
    pub combined: Dec,
    pub naive: Dec,
    pub inferers: BTreeMap<ActorId, Dec>,
    pub forecasters: BTreeMap<ActorId, Dec>,
    pub one_out_inferers: BTreeMap<ActorId, Dec>,
    pub one_out_forecasters: BTreeMap<ActorId, Dec>,
    /// Keyed by (forecaster, inferer)
    pub one_in_forecasters: BTreeMap<(ActorId, ActorId), Dec>,
}

/// Stake-weighted mean; falls back to a plain mean when no sample carries stake.
fn stake_weighted(samples: &[(Dec, Dec)]) -> Result<Dec> {
    let total = samples
        .iter()
        .try_fold(Dec::ZERO, |acc, (_, w)| acc.checked_add(*w))?;
    if total.is_zero() {
        let values: Vec<Dec> = samples.iter().map(|(v, _)| *v).collect();
        return Ok(mean(&values)?);
    }
    Ok(weighted_mean(samples)?)
}

fn collect_attributed(
    target: &mut BTreeMap<ActorId, Vec<(Dec, Dec)>>,
    values: &[WorkerAttributedValue],
    weight: Dec,
) {
    for v in values {
        target
            .entry(v.worker.clone())
            .or_default()
            .push((v.value, weight));
    }
}

fn reduce<K: Ord>(grouped: BTreeMap<K, Vec<(Dec, Dec)>>) -> Result<BTreeMap<K, Dec>> {
    grouped
        .into_iter()
        .map(|(k, samples)| Ok((k, stake_weighted(&samples)?)))
        .collect()
}

impl NetworkLosses {
    /// Combine bundles weighted by each reputer's authority stake.
    pub fn aggregate(bundles: &[(ReputerValueBundle, Dec)]) -> Result<Self> {
        if bundles.is_empty() {
            return Err(EmissionsError::InsufficientRegretData(
                "no reputer bundles to aggregate".to_string(),
            ));
        }
        let combined: Vec<(Dec, Dec)> = bundles.iter().map(|(b, w)| (b.combined_value, *w)).collect();
        let naive: Vec<(Dec, Dec)> = bundles.iter().map(|(b, w)| (b.naive_value, *w)).collect();

        let mut inferers = BTreeMap::new();
        let mut forecasters = BTreeMap::new();
        let mut one_out_inferers = BTreeMap::new();
        let mut one_out_forecasters = BTreeMap::new();
        let mut one_in: BTreeMap<(ActorId, ActorId), Vec<(Dec, Dec)>> = BTreeMap::new();
        for (bundle, weight) in bundles {
            collect_attributed(&mut inferers, &bundle.inferer_values, *weight);
            collect_attributed(&mut forecasters, &bundle.forecaster_values, *weight);
            collect_attributed(&mut one_out_inferers, &bundle.one_out_inferer_values, *weight);
            collect_attributed(&mut one_out_forecasters, &bundle.one_out_forecaster_values, *weight);
            for v in &bundle.one_in_forecaster_values {
                one_in
                    .entry((v.forecaster.clone(), v.inferer.clone()))
                    .or_default()
                    .push((v.value, *weight));
            }
        }

        Ok(Self {
            combined: stake_weighted(&combined)?,
            naive: stake_weighted(&naive)?,
            inferers: reduce(inferers)?,
            forecasters: reduce(forecasters)?,
            one_out_inferers: reduce(one_out_inferers)?,
            one_out_forecasters: reduce(one_out_forecasters)?,
            one_in_forecasters: reduce(one_in)?,
        })
    }

    /// Marginal value of a worker: how much worse the network does without it.
    fn worker_sample(&self, role: ActorRole, worker: &ActorId) -> Result<Option<Dec>> {
        let (own, one_out) = match role {
            ActorRole::Inferer => (&self.inferers, &self.one_out_inferers),
            ActorRole::Forecaster => (&self.forecasters, &self.one_out_forecasters),
            ActorRole::Reputer => return Ok(None),
        };
        if let Some(without) = one_out.get(worker) {
            return Ok(Some(without.checked_sub(self.combined)?));
        }
        match own.get(worker) {
            Some(loss) => Ok(Some(self.combined.checked_sub(*loss)?)),
            None => Ok(None),
        }
    }

    /// Negative mean relative distance of a bundle from consensus.
    fn reputer_sample(&self, bundle: &ReputerValueBundle, epsilon: Dec, floor: Dec) -> Result<Dec> {
        let relative = |value: Dec, consensus: Dec| -> Result<Dec> {
            let distance = value.checked_sub(consensus)?.abs();
            Ok(safe_div(distance, consensus.abs().checked_add(epsilon)?, floor)?)
        };
        let mut distances = vec![relative(bundle.combined_value, self.combined)?];
        for v in &bundle.inferer_values {
            if let Some(consensus) = self.inferers.get(&v.worker) {
                distances.push(relative(v.value, *consensus)?);
            }
        }
        Ok(mean(&distances)?.checked_neg()?)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundOutcome {
    pub topic_id: TopicId,
    pub worker_nonce: BlockHeight,
    pub losses: NetworkLosses,
    pub scores: Vec<(ActorRole, Score)>,
    pub penalised: Vec<(ActorRole, ActorId)>,
    pub refreshes: Vec<ActiveSetRefresh>,
    pub initial_regret: Option<Dec>,
}

impl EmissionsKeeper {
    pub fn reputer_bundles(
        &self,
        ctx: &ExecutionContext,
        topic_id: TopicId,
        nonce: BlockHeight,
    ) -> Result<Vec<ReputerValueBundle>> {
        Ok(self
            .tables
            .reputer_bundles
            .iter_prefix(ctx.store(), &(topic_id, nonce))?
            .map(|r| r.map(|(_, bundle)| bundle))
            .collect::<StorageResult<Vec<_>>>()?)
    }

    fn cycle_submitters(
        &self,
        ctx: &ExecutionContext,
        topic_id: TopicId,
        nonce: BlockHeight,
    ) -> Result<(BTreeSet<ActorId>, BTreeSet<ActorId>)> {
        let inferers = self
            .tables
            .inferences
            .iter_prefix(ctx.store(), &(topic_id, nonce))?
            .map(|r| r.map(|((_, _, actor), _)| actor))
            .collect::<StorageResult<BTreeSet<_>>>()?;
        let forecasters = self
            .tables
            .forecasts
            .iter_prefix(ctx.store(), &(topic_id, nonce))?
            .map(|r| r.map(|((_, _, actor), _)| actor))
            .collect::<StorageResult<BTreeSet<_>>>()?;
        Ok((inferers, forecasters))
    }

    /// Fold a sample for the epoch at `nonce` into the actor's score.
    ///
    /// The stored score is stamped with `nonce`, the epoch the actor last
    /// submitted for, so later liveness checks count missed epochs from it.
    pub fn update_score(
        &self,
        ctx: &mut ExecutionContext,
        topic: &Topic,
        role: ActorRole,
        actor: &ActorId,
        nonce: BlockHeight,
        sample: Dec,
    ) -> Result<Score> {
        let floor = self.initial_ema_score(ctx, topic.id, role)?;
        // only epochs before the one being scored count against a participant
        let as_opened = Topic {
            epoch_last_ended: nonce,
            ..topic.clone()
        };
        let previous = match self.get_score(ctx, topic.id, role, actor)? {
            Some(existing) => {
                crate::liveness::may_penalise(&as_opened, role, ctx.block_height(), &existing, floor)?.score
            }
            None => floor,
        };
        let score = Score {
            topic_id: topic.id,
            address: actor.clone(),
            block_height: nonce,
            score: ema(topic.merit_sortition_alpha, sample, previous)?,
        };
        self.set_score(ctx, role, &score)?;
        Ok(score)
    }

    fn update_worker_regrets(
        &self,
        ctx: &mut ExecutionContext,
        topic: &Topic,
        losses: &NetworkLosses,
        inferers: &BTreeSet<ActorId>,
        forecasters: &BTreeSet<ActorId>,
    ) -> Result<()> {
        for (inferer, loss) in &losses.inferers {
            if !inferers.contains(inferer) {
                continue;
            }
            self.update_regret(ctx, topic, RegretKind::InfererNetwork, inferer, None, *loss, losses.combined)?;
            self.update_regret(ctx, topic, RegretKind::NaiveInfererNetwork, inferer, None, *loss, losses.naive)?;
            self.increment_inclusion_count(ctx, topic.id, ActorRole::Inferer, inferer)?;
        }
        for (forecaster, loss) in &losses.forecasters {
            if !forecasters.contains(forecaster) {
                continue;
            }
            self.update_regret(ctx, topic, RegretKind::ForecasterNetwork, forecaster, None, *loss, losses.combined)?;
            self.increment_inclusion_count(ctx, topic.id, ActorRole::Forecaster, forecaster)?;
        }
        for ((forecaster, inferer), loss) in &losses.one_in_forecasters {
            if !forecasters.contains(forecaster) {
                continue;
            }
            if let Some(inferer_loss) = losses.inferers.get(inferer) {
                self.update_regret(
                    ctx,
                    topic,
                    RegretKind::OneInForecaster,
                    forecaster,
                    Some(inferer),
                    *loss,
                    *inferer_loss,
                )?;
            }
        }
        Ok(())
    }

    /// Score one reward-ready epoch. The cycle itself is left for the caller to prune.
    pub fn run_scoring_round(
        &self,
        ctx: &mut ExecutionContext,
        topic_id: TopicId,
        nonce: BlockHeight,
    ) -> Result<RoundOutcome> {
        let params = self.params(ctx)?;
        let topic = self.get_topic(ctx, topic_id)?;
        let bundles = self.reputer_bundles(ctx, topic_id, nonce)?;
        let mut weighted = Vec::with_capacity(bundles.len());
        for bundle in bundles {
            let authority = self.get_reputer_authority(ctx, topic_id, &bundle.reputer)?;
            weighted.push((bundle, authority.to_dec()?));
        }
        let losses = NetworkLosses::aggregate(&weighted)?;
        let (inferers, forecasters) = self.cycle_submitters(ctx, topic_id, nonce)?;

        self.update_worker_regrets(ctx, &topic, &losses, &inferers, &forecasters)?;

        let mut outcome = RoundOutcome {
            topic_id,
            worker_nonce: nonce,
            ..RoundOutcome::default()
        };
        let mut participants: BTreeMap<ActorRole, BTreeSet<ActorId>> = BTreeMap::new();
        for (role, workers) in [(ActorRole::Inferer, &inferers), (ActorRole::Forecaster, &forecasters)] {
            for worker in workers {
                let Some(sample) = losses.worker_sample(role, worker)? else {
                    continue;
                };
                if !participants.entry(role).or_default().insert(worker.clone()) {
                    continue;
                }
                let score = self.update_score(ctx, &topic, role, worker, nonce, sample)?;
                outcome.scores.push((role, score));
            }
        }
        for (bundle, _) in &weighted {
            let sample = losses.reputer_sample(bundle, params.epsilon_reputer, params.epsilon_safe_div)?;
            if !participants
                .entry(ActorRole::Reputer)
                .or_default()
                .insert(bundle.reputer.clone())
            {
                continue;
            }
            let score = self.update_score(ctx, &topic, ActorRole::Reputer, &bundle.reputer, nonce, sample)?;
            outcome.scores.push((ActorRole::Reputer, score));
        }

        for role in ActorRole::ALL {
            let present = participants.get(&role);
            for member in self.active_members(ctx, topic_id, role)? {
                if present.is_some_and(|p| p.contains(&member)) {
                    continue;
                }
                let before = self.get_score(ctx, topic_id, role, &member)?;
                let after = self.apply_liveness_penalty(ctx, topic_id, role, &member)?;
                if after.is_some() && after != before {
                    outcome.penalised.push((role, member));
                }
            }
        }

        for role in ActorRole::ALL {
            outcome.refreshes.push(self.refresh_active_set(ctx, &topic, role)?);
        }

        outcome.initial_regret = match self.bootstrap_topic_initial_regret(ctx, topic_id) {
            Ok(value) => value,
            Err(e) if e.is_insufficient_data() => None,
            Err(e) => return Err(e),
        };
        outcome.losses = losses;

        info!(
            topic_id,
            nonce,
            combined_loss = %outcome.losses.combined,
            scored = outcome.scores.len(),
            penalised = outcome.penalised.len(),
            "📊 Scoring round complete"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{actor, dec};

    fn attributed(byte: u8, value: &str) -> WorkerAttributedValue {
        WorkerAttributedValue {
            worker: actor(byte),
            value: dec(value),
        }
    }

    fn bundle(reputer: u8, combined: &str, inferer_loss: &str) -> ReputerValueBundle {
        ReputerValueBundle {
            topic_id: 1,
            worker_nonce: 10,
            reputer: actor(reputer),
            combined_value: dec(combined),
            naive_value: dec("2"),
            inferer_values: vec![attributed(1, inferer_loss)],
            forecaster_values: vec![],
            one_out_inferer_values: vec![],
            one_out_forecaster_values: vec![],
            one_in_forecaster_values: vec![],
        }
    }

    #[test]
    fn test_aggregate_is_stake_weighted() {
        let bundles = vec![
            (bundle(20, "1", "3"), dec("3")),
            (bundle(21, "5", "7"), dec("1")),
        ];
        let losses = NetworkLosses::aggregate(&bundles).unwrap();
        assert_eq!(losses.combined, dec("2"));
        assert_eq!(losses.inferers[&actor(1)], dec("4"));
    }

    #[test]
    fn test_aggregate_without_stake_uses_equal_weights() {
        let bundles = vec![
            (bundle(20, "1", "3"), Dec::ZERO),
            (bundle(21, "5", "7"), Dec::ZERO),
        ];
        let losses = NetworkLosses::aggregate(&bundles).unwrap();
        assert_eq!(losses.combined, dec("3"));
        assert!(NetworkLosses::aggregate(&[]).unwrap_err().is_insufficient_data());
    }

    #[test]
    fn test_worker_sample_prefers_one_out_loss() {
        let mut losses = NetworkLosses {
            combined: dec("2"),
            ..NetworkLosses::default()
        };
        losses.inferers.insert(actor(1), dec("1.5"));
        assert_eq!(
            losses.worker_sample(ActorRole::Inferer, &actor(1)).unwrap(),
            Some(dec("0.5"))
        );
        losses.one_out_inferers.insert(actor(1), dec("2.8"));
        assert_eq!(
            losses.worker_sample(ActorRole::Inferer, &actor(1)).unwrap(),
            Some(dec("0.8"))
        );
        assert_eq!(losses.worker_sample(ActorRole::Forecaster, &actor(1)).unwrap(), None);
    }

    #[test]
    fn test_reputer_closer_to_consensus_scores_higher() {
        let bundles = vec![
            (bundle(20, "2", "4"), dec("10")),
            (bundle(21, "2.1", "4.1"), dec("10")),
            (bundle(22, "9", "1"), dec("1")),
        ];
        let losses = NetworkLosses::aggregate(&bundles).unwrap();
        let eps = dec("0.01");
        let floor = dec("0.0000001");
        let close = losses.reputer_sample(&bundles[0].0, eps, floor).unwrap();
        let far = losses.reputer_sample(&bundles[2].0, eps, floor).unwrap();
        assert!(close > far);
        assert!(!close.is_positive());
    }
}
