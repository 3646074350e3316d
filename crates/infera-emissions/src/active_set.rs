//! Quantile-based active sets per topic and role.
//!
//! Membership is rebuilt at every scoring round and can be joined between
//! rounds through [`EmissionsKeeper::try_admit`], which only compares against
//! the stored lowest active score.

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::keeper::EmissionsKeeper;
use infera_math::{quantile, Dec};
use infera_storage::Result as StorageResult;
use infera_types::{ActorId, ActorRole, Params, Score, Topic, TopicId};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSetRefresh {
    pub role: ActorRole,
    pub threshold: Option<Dec>,
    pub active: Vec<ActorId>,
    pub admitted: Vec<ActorId>,
    pub evicted: Vec<ActorId>,
}

/// Highest score first, ties broken by address.
fn rank(a: &Score, b: &Score) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.address.cmp(&b.address))
}

/// Pick the actors scoring at or above the `q` quantile of `candidates`,
/// best first, at most `cap` of them unless the cap falls inside a group of
/// equal scores, in which case the whole group stays.
pub fn select_active(candidates: &[Score], q: Dec, cap: u64) -> Result<(Dec, Vec<Score>)> {
    let values: Vec<Dec> = candidates.iter().map(|s| s.score).collect();
    let threshold = quantile(&values, q)?;

    let mut active: Vec<Score> = candidates
        .iter()
        .filter(|s| s.score >= threshold)
        .cloned()
        .collect();
    active.sort_by(rank);

    let cap = usize::try_from(cap).unwrap_or(usize::MAX);
    if active.len() > cap && cap > 0 {
        let boundary = active[cap - 1].score;
        let keep = active
            .iter()
            .position(|s| s.score < boundary)
            .unwrap_or(active.len());
        active.truncate(keep.max(cap));
    } else if cap == 0 {
        active.clear();
    }
    Ok((threshold, active))
}

pub(crate) fn max_active(params: &Params, role: ActorRole) -> u64 {
    match role {
        ActorRole::Inferer => params.max_top_inferers_to_reward,
        ActorRole::Forecaster => params.max_top_forecasters_to_reward,
        ActorRole::Reputer => params.max_top_reputers_to_reward,
    }
}

impl EmissionsKeeper {
    pub fn get_score(
        &self,
        ctx: &ExecutionContext,
        topic_id: TopicId,
        role: ActorRole,
        actor: &ActorId,
    ) -> Result<Option<Score>> {
        Ok(self
            .tables
            .scores
            .get(ctx.store(), &(topic_id, role, actor.clone()))?)
    }

    pub fn set_score(&self, ctx: &mut ExecutionContext, role: ActorRole, score: &Score) -> Result<()> {
        self.tables.scores.set(
            ctx.store_mut(),
            &(score.topic_id, role, score.address.clone()),
            score,
        )?;
        Ok(())
    }

    /// Penalty floor and starting score for the role; zero until first refresh.
    pub fn initial_ema_score(
        &self,
        ctx: &ExecutionContext,
        topic_id: TopicId,
        role: ActorRole,
    ) -> Result<Dec> {
        Ok(self
            .tables
            .initial_ema_scores
            .get(ctx.store(), &(topic_id, role))?
            .unwrap_or(Dec::ZERO))
    }

    pub fn lowest_active_score(
        &self,
        ctx: &ExecutionContext,
        topic_id: TopicId,
        role: ActorRole,
    ) -> Result<Option<Score>> {
        Ok(self
            .tables
            .lowest_active_scores
            .get(ctx.store(), &(topic_id, role))?)
    }

    pub fn is_active(
        &self,
        ctx: &ExecutionContext,
        topic_id: TopicId,
        role: ActorRole,
        actor: &ActorId,
    ) -> Result<bool> {
        Ok(self
            .tables
            .active_set
            .has(ctx.store(), &(topic_id, role, actor.clone()))?)
    }

    pub fn active_members(
        &self,
        ctx: &ExecutionContext,
        topic_id: TopicId,
        role: ActorRole,
    ) -> Result<Vec<ActorId>> {
        Ok(self
            .tables
            .active_set
            .iter_prefix(ctx.store(), &(topic_id, role))?
            .map(|r| r.map(|((_, _, actor), ())| actor))
            .collect::<StorageResult<Vec<_>>>()?)
    }

    /// Scores of current members; members without a score are skipped.
    pub fn active_scores(
        &self,
        ctx: &ExecutionContext,
        topic_id: TopicId,
        role: ActorRole,
    ) -> Result<Vec<Score>> {
        let mut scores = Vec::new();
        for member in self.active_members(ctx, topic_id, role)? {
            if let Some(score) = self.get_score(ctx, topic_id, role, &member)? {
                scores.push(score);
            }
        }
        Ok(scores)
    }

    fn candidate_scores(
        &self,
        ctx: &ExecutionContext,
        topic: &Topic,
        role: ActorRole,
    ) -> Result<Vec<Score>> {
        let mut candidates = Vec::new();
        for actor in self.registered_actors(ctx, topic.id, role)? {
            let permitted = if role.is_worker() {
                self.permissions().can_submit_worker_payload(topic, &actor)
            } else {
                self.permissions().can_submit_reputer_payload(topic, &actor)
            };
            if !permitted {
                continue;
            }
            if let Some(score) = self.get_score(ctx, topic.id, role, &actor)? {
                candidates.push(score);
            }
        }
        Ok(candidates)
    }

    /// Store the minimum of the current members as the admission bar.
    fn write_lowest(&self, ctx: &mut ExecutionContext, topic_id: TopicId, role: ActorRole) -> Result<Option<Score>> {
        let lowest = self
            .active_scores(ctx, topic_id, role)?
            .into_iter()
            .max_by(rank);
        match &lowest {
            Some(score) => self
                .tables
                .lowest_active_scores
                .set(ctx.store_mut(), &(topic_id, role), score)?,
            None => self
                .tables
                .lowest_active_scores
                .remove(ctx.store_mut(), &(topic_id, role))?,
        }
        Ok(lowest)
    }

    /// Rebuild the active set for `role` from all permitted, scored candidates.
    pub fn refresh_active_set(
        &self,
        ctx: &mut ExecutionContext,
        topic: &Topic,
        role: ActorRole,
    ) -> Result<ActiveSetRefresh> {
        let params = self.params(ctx)?;
        let candidates = self.candidate_scores(ctx, topic, role)?;
        let previous: BTreeSet<ActorId> =
            self.active_members(ctx, topic.id, role)?.into_iter().collect();

        let (threshold, selected) = if candidates.is_empty() {
            (None, Vec::new())
        } else {
            let (threshold, selected) = select_active(
                &candidates,
                topic.active_quantile(role),
                max_active(&params, role),
            )?;
            (Some(threshold), selected)
        };
        let active: Vec<ActorId> = selected.iter().map(|s| s.address.clone()).collect();
        let next: BTreeSet<ActorId> = active.iter().cloned().collect();

        let evicted: Vec<ActorId> = previous.difference(&next).cloned().collect();
        let admitted: Vec<ActorId> = next.difference(&previous).cloned().collect();
        for actor in &evicted {
            self.tables
                .active_set
                .remove(ctx.store_mut(), &(topic.id, role, actor.clone()))?;
        }
        for actor in &admitted {
            self.tables
                .active_set
                .set(ctx.store_mut(), &(topic.id, role, actor.clone()), &())?;
        }
        self.write_lowest(ctx, topic.id, role)?;
        if let Some(threshold) = threshold {
            self.tables
                .initial_ema_scores
                .set(ctx.store_mut(), &(topic.id, role), &threshold)?;
        }

        info!(
            topic_id = topic.id,
            role = %role,
            threshold = ?threshold.map(|t| t.to_string()),
            active = active.len(),
            admitted = admitted.len(),
            evicted = evicted.len(),
            "🎯 Active set refreshed"
        );
        Ok(ActiveSetRefresh {
            role,
            threshold,
            active,
            admitted,
            evicted,
        })
    }

    /// Admit an actor between refreshes if it beats the current bar.
    /// Returns whether the actor is a member afterwards.
    pub fn try_admit(
        &self,
        ctx: &mut ExecutionContext,
        topic: &Topic,
        role: ActorRole,
        score: &Score,
    ) -> Result<bool> {
        let key = (topic.id, role, score.address.clone());
        if self.tables.active_set.has(ctx.store(), &key)? {
            let lowest = self.lowest_active_score(ctx, topic.id, role)?;
            if lowest.map_or(true, |l| l.address == score.address || score.score < l.score) {
                self.write_lowest(ctx, topic.id, role)?;
            }
            return Ok(true);
        }

        let lowest = self.lowest_active_score(ctx, topic.id, role)?;
        if let Some(bar) = &lowest {
            if score.score <= bar.score {
                return Ok(false);
            }
        }
        self.tables.active_set.set(ctx.store_mut(), &key, &())?;

        let params = self.params(ctx)?;
        let cap = max_active(&params, role) as usize;
        let members = self.active_scores(ctx, topic.id, role)?;
        if members.len() > cap {
            if let Some(weakest) = members.iter().max_by(|a, b| rank(a, b)) {
                self.tables.active_set.remove(
                    ctx.store_mut(),
                    &(topic.id, role, weakest.address.clone()),
                )?;
                debug!(
                    topic_id = topic.id,
                    role = %role,
                    evicted = %weakest.address,
                    "Active set over capacity, evicted weakest"
                );
            }
        }
        self.write_lowest(ctx, topic.id, role)?;
        let admitted = self.tables.active_set.has(ctx.store(), &key)?;
        if admitted {
            debug!(topic_id = topic.id, role = %role, actor = %score.address, score = %score.score, "➕ Admitted to active set");
        }
        Ok(admitted)
    }

    pub fn remove_from_active_set(
        &self,
        ctx: &mut ExecutionContext,
        topic_id: TopicId,
        role: ActorRole,
        actor: &ActorId,
    ) -> Result<()> {
        let key = (topic_id, role, actor.clone());
        if self.tables.active_set.has(ctx.store(), &key)? {
            self.tables.active_set.remove(ctx.store_mut(), &key)?;
            self.write_lowest(ctx, topic_id, role)?;
        }
        Ok(())
    }
}
