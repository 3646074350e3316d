//! Decay of scores for actors that stopped submitting.
//!
//! An actor that skipped whole epochs is pulled toward the topic's penalty
//! floor as if it had received the floor as a sample once per missed epoch.

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::keeper::EmissionsKeeper;
use infera_math::{n_calc_ema, Dec};
use infera_types::{ActorId, ActorRole, BlockHeight, Score, Topic, TopicId};
use tracing::debug;

/// Whole epochs between `last_submitted` and `prev_epoch_start`.
pub fn missed_epochs_since(
    prev_epoch_start: BlockHeight,
    epoch_length: u64,
    last_submitted: BlockHeight,
) -> u64 {
    if epoch_length == 0 || last_submitted >= prev_epoch_start {
        return 0;
    }
    (prev_epoch_start - 1 - last_submitted) / epoch_length + 1
}

/// Missed epochs measured from the start of the epoch before `epoch_last_ended`,
/// shifted back by `lag` for actors that answer late.
pub fn count_missed_epochs(
    epoch_last_ended: BlockHeight,
    epoch_length: u64,
    lag: u64,
    last_submitted: BlockHeight,
) -> u64 {
    let prev_epoch_start = epoch_last_ended
        .saturating_sub(epoch_length)
        .saturating_sub(lag);
    missed_epochs_since(prev_epoch_start, epoch_length, last_submitted)
}

pub fn worker_missed_epochs(topic: &Topic, last_submitted: BlockHeight) -> u64 {
    count_missed_epochs(topic.epoch_last_ended, topic.epoch_length, 0, last_submitted)
}

pub fn reputer_missed_epochs(topic: &Topic, last_submitted: BlockHeight) -> u64 {
    count_missed_epochs(
        topic.epoch_last_ended,
        topic.epoch_length,
        topic.ground_truth_lag,
        last_submitted,
    )
}

/// Returns the score after applying missed-epoch decay toward `floor`.
///
/// With nothing missed the input is returned unchanged, including its height.
/// Scores already at or below the floor keep their value but are re-stamped.
pub fn may_penalise(
    topic: &Topic,
    role: ActorRole,
    current_block: BlockHeight,
    score: &Score,
    floor: Dec,
) -> Result<Score> {
    let missed = match role {
        ActorRole::Reputer => reputer_missed_epochs(topic, score.block_height),
        ActorRole::Inferer | ActorRole::Forecaster => {
            worker_missed_epochs(topic, score.block_height)
        }
    };
    if missed == 0 {
        return Ok(score.clone());
    }

    let value = if score.score > floor {
        n_calc_ema(topic.merit_sortition_alpha, floor, score.score, missed)?
    } else {
        score.score
    };
    debug!(
        topic_id = topic.id,
        address = %score.address,
        role = %role,
        missed,
        before = %score.score,
        after = %value,
        "📉 Liveness penalty applied"
    );
    Ok(Score {
        topic_id: score.topic_id,
        address: score.address.clone(),
        block_height: current_block,
        score: value,
    })
}

impl EmissionsKeeper {
    /// Penalise a stored score in place, using the topic's initial EMA score
    /// for `role` as the floor. Returns the (possibly unchanged) score.
    pub fn apply_liveness_penalty(
        &self,
        ctx: &mut ExecutionContext,
        topic_id: TopicId,
        role: ActorRole,
        actor: &ActorId,
    ) -> Result<Option<Score>> {
        let Some(score) = self.get_score(ctx, topic_id, role, actor)? else {
            return Ok(None);
        };
        let topic = self.get_topic(ctx, topic_id)?;
        let floor = self.initial_ema_score(ctx, topic_id, role)?;
        let penalised = may_penalise(&topic, role, ctx.block_height(), &score, floor)?;
        if penalised != score {
            self.set_score(ctx, role, &penalised)?;
        }
        Ok(Some(penalised))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{actor, dec, sample_topic};

    fn score_at(height: BlockHeight, value: &str) -> Score {
        Score {
            topic_id: 1,
            address: actor(1),
            block_height: height,
            score: dec(value),
        }
    }

    #[test]
    fn test_worker_missed_epoch_counts() {
        assert_eq!(count_missed_epochs(100, 10, 0, 95), 0);
        assert_eq!(count_missed_epochs(100, 10, 0, 85), 1);
        assert_eq!(count_missed_epochs(100, 10, 0, 55), 4);
        assert_eq!(count_missed_epochs(100, 10, 0, 90), 0);
    }

    #[test]
    fn test_reputer_missed_epochs_subtract_lag() {
        assert_eq!(count_missed_epochs(110, 10, 10, 55), 4);
        let mut topic = sample_topic(1);
        topic.epoch_last_ended = 110;
        assert_eq!(reputer_missed_epochs(&topic, 55), 4);
        assert_eq!(worker_missed_epochs(&topic, 55), 5);
    }

    #[test]
    fn test_early_heights_do_not_underflow() {
        assert_eq!(count_missed_epochs(5, 10, 10, 0), 0);
        assert_eq!(missed_epochs_since(10, 0, 0), 0);
    }

    #[test]
    fn test_no_missed_epochs_returns_input_untouched() {
        let mut topic = sample_topic(1);
        topic.epoch_last_ended = 100;
        let score = score_at(95, "300");
        let out = may_penalise(&topic, ActorRole::Inferer, 100, &score, dec("200")).unwrap();
        assert_eq!(out, score);
        assert_eq!(out.score.raw(), score.score.raw());
    }

    #[test]
    fn test_reputer_penalty_reference() {
        let mut topic = sample_topic(1);
        topic.epoch_last_ended = 110;
        topic.merit_sortition_alpha = dec("0.1");
        let score = score_at(55, "300");
        let out = may_penalise(&topic, ActorRole::Reputer, 110, &score, dec("200")).unwrap();
        assert_eq!(out.score, dec("265.61"));
        assert_eq!(out.block_height, 110);
        // input left alone
        assert_eq!(score.score, dec("300"));
    }

    #[test]
    fn test_scores_below_floor_are_not_raised() {
        let mut topic = sample_topic(1);
        topic.epoch_last_ended = 100;
        let score = score_at(10, "50");
        let out = may_penalise(&topic, ActorRole::Forecaster, 100, &score, dec("200")).unwrap();
        assert_eq!(out.score, dec("50"));
        assert_eq!(out.block_height, 100);
    }
}
