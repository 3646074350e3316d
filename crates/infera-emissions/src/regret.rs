//! Per-actor regret: how much better (positive) or worse the network did
//! with an actor than without it, smoothed by an EMA.

use crate::context::ExecutionContext;
use crate::error::{EmissionsError, Result};
use crate::keeper::EmissionsKeeper;
use infera_math::{p_norm, quantile, safe_div, std_dev, Dec};
use infera_storage::Result as StorageResult;
use infera_types::{ActorId, ActorRole, RegretKind, TimestampedValue, Topic, TopicId};
use tracing::{debug, info};

/// Lower bound on the largest normalized regret when deriving the mapping scale.
const MIN_MAPPING_MAX: Dec = Dec::from_raw(10_000_000_000_000_000);

/// A stored regret, or the topic default when the actor has none yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegretLookup {
    pub value: TimestampedValue,
    pub no_prior: bool,
}

/// `c * (other - self) / (‖(self, other)‖_p + epsilon)`.
pub fn normalized_regret_sample(
    self_loss: Dec,
    other_loss: Dec,
    p: Dec,
    c_norm: Dec,
    epsilon: Dec,
    safe_div_floor: Dec,
) -> Result<Dec> {
    let numerator = c_norm.checked_mul(other_loss.checked_sub(self_loss)?)?;
    let denominator = p_norm(&[self_loss, other_loss], p)?.checked_add(epsilon)?;
    Ok(safe_div(numerator, denominator, safe_div_floor)?)
}

/// Inclusions an actor needs before its regret counts as experienced.
pub fn experience_threshold(alpha_regret: Dec) -> Result<u64> {
    let inverse = safe_div(Dec::ONE, alpha_regret, Dec::ZERO)?;
    let steps = inverse.ceil()?.floor_int();
    Ok(u64::try_from(steps).unwrap_or(u64::MAX))
}

/// Initial regret for newcomers derived from existing regrets.
///
/// Regrets are normalized by their spread, mapped with the same scale the
/// weighting step uses, and the requested quantile is shifted down by the
/// experience offset `1 / p` before being mapped back.
pub fn calc_topic_initial_regret(
    regrets: &[Dec],
    epsilon: Dec,
    p: Dec,
    c_norm: Dec,
    q: Dec,
    safe_div_floor: Dec,
) -> Result<Dec> {
    if regrets.is_empty() {
        return Err(EmissionsError::InsufficientRegretData(
            "no regrets to bootstrap from".to_string(),
        ));
    }
    let sigma = std_dev(regrets)?.checked_add(epsilon)?;
    let normalized = regrets
        .iter()
        .map(|r| safe_div(*r, sigma, safe_div_floor))
        .collect::<infera_math::Result<Vec<_>>>()?;

    let max = normalized
        .iter()
        .copied()
        .max()
        .unwrap_or(Dec::ZERO)
        .max(MIN_MAPPING_MAX);
    let scale = safe_div(c_norm, max, safe_div_floor)?;
    let q_hat = quantile(&normalized, q)?;
    let offset = safe_div(Dec::ONE, p, safe_div_floor)?;

    let shifted = scale.checked_mul(q_hat)?.checked_sub(offset)?;
    Ok(safe_div(shifted, scale, safe_div_floor)?.checked_mul(sigma)?)
}

impl EmissionsKeeper {
    pub fn get_regret(
        &self,
        ctx: &ExecutionContext,
        topic: &Topic,
        kind: RegretKind,
        actor: &ActorId,
        counterpart: Option<&ActorId>,
    ) -> Result<RegretLookup> {
        let key = (topic.id, kind, actor.clone(), counterpart.cloned());
        Ok(match self.tables.regrets.get(ctx.store(), &key)? {
            Some(value) => RegretLookup {
                value,
                no_prior: false,
            },
            None => RegretLookup {
                value: TimestampedValue {
                    block_height: 0,
                    value: topic.initial_regret,
                },
                no_prior: true,
            },
        })
    }

    pub fn set_regret(
        &self,
        ctx: &mut ExecutionContext,
        topic_id: TopicId,
        kind: RegretKind,
        actor: &ActorId,
        counterpart: Option<&ActorId>,
        value: Dec,
    ) -> Result<()> {
        let record = TimestampedValue {
            block_height: ctx.block_height(),
            value,
        };
        self.tables.regrets.set(
            ctx.store_mut(),
            &(topic_id, kind, actor.clone(), counterpart.cloned()),
            &record,
        )?;
        Ok(())
    }

    /// Fold one loss comparison into the actor's regret and store it.
    #[allow(clippy::too_many_arguments)]
    pub fn update_regret(
        &self,
        ctx: &mut ExecutionContext,
        topic: &Topic,
        kind: RegretKind,
        actor: &ActorId,
        counterpart: Option<&ActorId>,
        self_loss: Dec,
        other_loss: Dec,
    ) -> Result<Dec> {
        let params = self.params(ctx)?;
        let sample = normalized_regret_sample(
            self_loss,
            other_loss,
            topic.p_norm,
            params.c_norm,
            topic.epsilon,
            params.epsilon_safe_div,
        )?;
        let previous = self.get_regret(ctx, topic, kind, actor, counterpart)?;
        let mut updated = infera_math::ema(topic.alpha_regret, sample, previous.value.value)?;
        if !topic.allow_negative && updated.is_negative() {
            updated = Dec::ZERO;
        }
        self.set_regret(ctx, topic.id, kind, actor, counterpart, updated)?;
        debug!(
            topic_id = topic.id,
            actor = %actor,
            kind = ?kind,
            sample = %sample,
            regret = %updated,
            "Regret updated"
        );
        Ok(updated)
    }

    pub fn inclusion_count(
        &self,
        ctx: &ExecutionContext,
        topic_id: TopicId,
        role: ActorRole,
        actor: &ActorId,
    ) -> Result<u64> {
        Ok(self
            .tables
            .inclusion_counts
            .get(ctx.store(), &(topic_id, role, actor.clone()))?
            .unwrap_or(0))
    }

    pub fn increment_inclusion_count(
        &self,
        ctx: &mut ExecutionContext,
        topic_id: TopicId,
        role: ActorRole,
        actor: &ActorId,
    ) -> Result<u64> {
        let count = self.inclusion_count(ctx, topic_id, role, actor)?.saturating_add(1);
        self.tables
            .inclusion_counts
            .set(ctx.store_mut(), &(topic_id, role, actor.clone()), &count)?;
        Ok(count)
    }

    /// Network regrets of one worker role with each actor's inclusion count.
    fn network_regrets(
        &self,
        ctx: &ExecutionContext,
        topic_id: TopicId,
        kind: RegretKind,
        role: ActorRole,
    ) -> Result<Vec<(Dec, u64)>> {
        let stored = self
            .tables
            .regrets
            .iter_prefix(ctx.store(), &(topic_id, kind))?
            .collect::<StorageResult<Vec<_>>>()?;
        stored
            .into_iter()
            .map(|((_, _, actor, _), regret)| {
                let count = self.inclusion_count(ctx, topic_id, role, &actor)?;
                Ok((regret.value, count))
            })
            .collect()
    }

    /// Recompute the topic's initial regret from its worker population.
    ///
    /// Returns `Ok(None)` when the population is too small to say anything and
    /// the stored value is left as is.
    pub fn bootstrap_topic_initial_regret(
        &self,
        ctx: &mut ExecutionContext,
        topic_id: TopicId,
    ) -> Result<Option<Dec>> {
        let params = self.params(ctx)?;
        let mut topic = self.get_topic(ctx, topic_id)?;

        let mut population =
            self.network_regrets(ctx, topic_id, RegretKind::InfererNetwork, ActorRole::Inferer)?;
        population.extend(self.network_regrets(
            ctx,
            topic_id,
            RegretKind::ForecasterNetwork,
            ActorRole::Forecaster,
        )?);
        if population.is_empty() {
            return Err(EmissionsError::InsufficientRegretData(format!(
                "topic {} has no worker regrets",
                topic_id
            )));
        }

        let threshold = experience_threshold(topic.alpha_regret)?;
        let experienced: Vec<Dec> = population
            .iter()
            .filter(|(_, count)| *count > threshold)
            .map(|(value, _)| *value)
            .collect();

        let initial = if !experienced.is_empty()
            && experienced.len() as u64 >= params.min_experienced_worker_regrets
        {
            calc_topic_initial_regret(
                &experienced,
                topic.epsilon,
                topic.p_norm,
                params.c_norm,
                params.initial_regret_quantile,
                params.epsilon_safe_div,
            )?
        } else if population.len() as u64 > params.initial_regret_fallback_population {
            let all: Vec<Dec> = population.iter().map(|(value, _)| *value).collect();
            quantile(&all, params.initial_regret_quantile)?
        } else {
            debug!(
                topic_id,
                population = population.len(),
                experienced = experienced.len(),
                "Initial regret left unchanged"
            );
            return Ok(None);
        };

        topic.initial_regret = initial;
        self.set_topic(ctx, &topic)?;
        info!(
            topic_id,
            initial_regret = %initial,
            experienced = experienced.len(),
            population = population.len(),
            "🧭 Topic initial regret bootstrapped"
        );
        Ok(Some(initial))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{actor, dec, new_keeper, sample_topic};
    use infera_storage::MemoryBackend;

    fn ds(values: &[&str]) -> Vec<Dec> {
        values.iter().map(|v| dec(v)).collect()
    }

    #[test]
    fn test_sample_sign_follows_loss_difference() {
        let floor = dec("0.0000001");
        let better = normalized_regret_sample(dec("1"), dec("2"), dec("3"), dec("0.75"), dec("0.01"), floor).unwrap();
        let worse = normalized_regret_sample(dec("2"), dec("1"), dec("3"), dec("0.75"), dec("0.01"), floor).unwrap();
        assert!(better.is_positive());
        assert_eq!(worse, better.checked_neg().unwrap());
        let equal = normalized_regret_sample(dec("0"), dec("0"), dec("3"), dec("0.75"), dec("0.01"), floor).unwrap();
        assert_eq!(equal, Dec::ZERO);
    }

    #[test]
    fn test_experience_threshold() {
        assert_eq!(experience_threshold(dec("0.1")).unwrap(), 10);
        assert_eq!(experience_threshold(dec("0.3")).unwrap(), 4);
        assert_eq!(experience_threshold(Dec::ONE).unwrap(), 1);
    }

    #[test]
    fn test_initial_regret_empty_is_an_error() {
        let err = calc_topic_initial_regret(&[], dec("0.01"), dec("3"), dec("0.75"), dec("0.25"), dec("0.0000001"))
            .unwrap_err();
        assert!(err.is_insufficient_data());
    }

    #[test]
    fn test_initial_regret_uniform_population() {
        let regrets = ds(&["1", "1", "1", "1", "1"]);
        let initial = calc_topic_initial_regret(&regrets, dec("0.01"), dec("3"), dec("0.75"), dec("0.25"), dec("0.0000001"))
            .unwrap();
        // (q - offset / scale) * sigma = (100 - 44.44..) * 0.01
        assert!((initial.to_f64_lossy() - 0.555_555_555_5).abs() < 1e-9);
    }

    #[test]
    fn test_initial_regret_is_deterministic() {
        let regrets = ds(&["0.4", "-0.2", "1.3", "0.05", "0.9", "0.7"]);
        let args = (dec("0.01"), dec("3"), dec("0.75"), dec("0.25"), dec("0.0000001"));
        let first = calc_topic_initial_regret(&regrets, args.0, args.1, args.2, args.3, args.4).unwrap();
        let second = calc_topic_initial_regret(&regrets, args.0, args.1, args.2, args.3, args.4).unwrap();
        assert_eq!(first, second);
        assert!(first < quantile(&regrets, args.3).unwrap());
    }

    #[test]
    fn test_update_regret_clamps_without_negative() {
        let keeper = new_keeper();
        let mut store = MemoryBackend::new();
        let mut ctx = ExecutionContext::new(20, &mut store);
        let topic = sample_topic(1);
        keeper.set_topic(&mut ctx, &topic).unwrap();

        // actor worse than the network: negative sample, clamped to zero
        let regret = keeper
            .update_regret(&mut ctx, &topic, RegretKind::InfererNetwork, &actor(1), None, dec("5"), dec("1"))
            .unwrap();
        assert_eq!(regret, Dec::ZERO);

        let lookup = keeper
            .get_regret(&ctx, &topic, RegretKind::InfererNetwork, &actor(1), None)
            .unwrap();
        assert!(!lookup.no_prior);
        assert_eq!(lookup.value.block_height, 20);

        let mut signed = topic.clone();
        signed.allow_negative = true;
        let negative = keeper
            .update_regret(&mut ctx, &signed, RegretKind::InfererNetwork, &actor(2), None, dec("5"), dec("1"))
            .unwrap();
        assert!(negative.is_negative());
    }

    #[test]
    fn test_missing_regret_falls_back_to_topic_default() {
        let keeper = new_keeper();
        let mut store = MemoryBackend::new();
        let ctx = ExecutionContext::new(1, &mut store);
        let mut topic = sample_topic(1);
        topic.initial_regret = dec("0.3");
        let lookup = keeper
            .get_regret(&ctx, &topic, RegretKind::OneInForecaster, &actor(1), Some(&actor(2)))
            .unwrap();
        assert!(lookup.no_prior);
        assert_eq!(lookup.value.value, dec("0.3"));
    }

    #[test]
    fn test_bootstrap_population_rules() {
        let keeper = new_keeper();
        let mut store = MemoryBackend::new();
        let mut ctx = ExecutionContext::new(50, &mut store);
        let topic = sample_topic(1);
        keeper.set_topic(&mut ctx, &topic).unwrap();

        assert!(keeper
            .bootstrap_topic_initial_regret(&mut ctx, 1)
            .unwrap_err()
            .is_insufficient_data());

        // three fresh inferers: too few for either rule
        for byte in 1..=3u8 {
            keeper
                .set_regret(&mut ctx, 1, RegretKind::InfererNetwork, &actor(byte), None, dec("0.5"))
                .unwrap();
        }
        assert_eq!(keeper.bootstrap_topic_initial_regret(&mut ctx, 1).unwrap(), None);
        assert_eq!(keeper.get_topic(&ctx, 1).unwrap().initial_regret, Dec::ZERO);

        // eleven actors in total, none experienced: raw quantile fallback
        for byte in 4..=11u8 {
            keeper
                .set_regret(&mut ctx, 1, RegretKind::ForecasterNetwork, &actor(byte), None, dec("0.5"))
                .unwrap();
        }
        assert_eq!(
            keeper.bootstrap_topic_initial_regret(&mut ctx, 1).unwrap(),
            Some(dec("0.5"))
        );

        // five experienced inferers switch to the offset formula
        for byte in 1..=3u8 {
            for _ in 0..11 {
                keeper.increment_inclusion_count(&mut ctx, 1, ActorRole::Inferer, &actor(byte)).unwrap();
            }
        }
        for byte in 4..=5u8 {
            for _ in 0..11 {
                keeper.increment_inclusion_count(&mut ctx, 1, ActorRole::Forecaster, &actor(byte)).unwrap();
            }
        }
        let first = keeper.bootstrap_topic_initial_regret(&mut ctx, 1).unwrap().unwrap();
        assert!(first < dec("0.5"));
        let second = keeper.bootstrap_topic_initial_regret(&mut ctx, 1).unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(keeper.get_topic(&ctx, 1).unwrap().initial_regret, first);
    }
}
