mod common;

use common::{actor, dec, topic_msg, Chain};
use infera_emissions::ModuleAccount;
use infera_math::Dec;
use infera_storage::KvBackend;
use infera_types::{ActorRole, Params, RegistrationKind, Score, TokenAmount};
use proptest::prelude::*;

fn staking_totals(chain: &mut Chain, topic_id: u64) -> (u128, u128, u128, u128, u128) {
    chain.at(|keeper, ctx| {
        let store: &dyn KvBackend = ctx.store();
        let own: u128 = keeper
            .tables()
            .stake_reputer
            .iter(store)
            .unwrap()
            .map(|r| r.unwrap().1.units())
            .sum();
        let delegated: u128 = keeper
            .tables()
            .stake_delegated
            .iter(store)
            .unwrap()
            .map(|r| r.unwrap().1.units())
            .sum();
        let topic = keeper.get_topic_stake(ctx, topic_id).unwrap().units();
        let total = keeper.get_total_stake(ctx).unwrap().units();
        let escrow = keeper.bank().module_balance(ModuleAccount::Staking).units();
        (own, delegated, topic, total, escrow)
    })
}

#[derive(Debug, Clone)]
enum StakeOp {
    Stake { reputer: u8, amount: u128 },
    Delegate { delegator: u8, reputer: u8, amount: u128 },
    Unstake { reputer: u8, amount: u128 },
    Undelegate { delegator: u8, reputer: u8, amount: u128 },
    CancelUnstake { reputer: u8 },
    CancelUndelegate { delegator: u8, reputer: u8 },
    Advance { blocks: u64 },
}

fn arb_stake_op() -> impl Strategy<Value = StakeOp> {
    let reputer = 1u8..=2;
    let delegator = 3u8..=5;
    let amount = 1u128..5_000;
    prop_oneof![
        (reputer.clone(), amount.clone()).prop_map(|(reputer, amount)| StakeOp::Stake { reputer, amount }),
        (delegator.clone(), reputer.clone(), amount.clone())
            .prop_map(|(delegator, reputer, amount)| StakeOp::Delegate { delegator, reputer, amount }),
        (reputer.clone(), amount.clone()).prop_map(|(reputer, amount)| StakeOp::Unstake { reputer, amount }),
        (delegator.clone(), reputer.clone(), amount)
            .prop_map(|(delegator, reputer, amount)| StakeOp::Undelegate { delegator, reputer, amount }),
        reputer.clone().prop_map(|reputer| StakeOp::CancelUnstake { reputer }),
        (delegator, reputer).prop_map(|(delegator, reputer)| StakeOp::CancelUndelegate { delegator, reputer }),
        (1u64..8).prop_map(|blocks| StakeOp::Advance { blocks }),
    ]
}

fn apply(chain: &mut Chain, topic_id: u64, op: &StakeOp) {
    // rejected operations are part of the exercise
    let _ = match op.clone() {
        StakeOp::Stake { reputer, amount } => chain.at(|k, ctx| {
            k.add_stake(ctx, &actor(reputer), topic_id, TokenAmount::new(amount))
        }),
        StakeOp::Delegate { delegator, reputer, amount } => chain.at(|k, ctx| {
            k.add_delegate_stake(ctx, &actor(delegator), topic_id, &actor(reputer), TokenAmount::new(amount))
        }),
        StakeOp::Unstake { reputer, amount } => chain.at(|k, ctx| {
            k.remove_stake(ctx, &actor(reputer), topic_id, TokenAmount::new(amount))
                .map(|_| ())
        }),
        StakeOp::Undelegate { delegator, reputer, amount } => chain.at(|k, ctx| {
            k.remove_delegate_stake(ctx, &actor(delegator), topic_id, &actor(reputer), TokenAmount::new(amount))
                .map(|_| ())
        }),
        StakeOp::CancelUnstake { reputer } => chain.at(|k, ctx| {
            k.cancel_remove_stake(ctx, &actor(reputer), topic_id).map(|_| ())
        }),
        StakeOp::CancelUndelegate { delegator, reputer } => chain.at(|k, ctx| {
            k.cancel_remove_delegate_stake(ctx, &actor(delegator), topic_id, &actor(reputer))
                .map(|_| ())
        }),
        StakeOp::Advance { blocks } => {
            let target = chain.height + blocks;
            chain.advance_to(target);
            Ok(())
        }
    };
}

fn staking_chain() -> (Chain, u64) {
    let params = Params {
        remove_stake_delay_window: 5,
        max_stake_removals_per_block: 2,
        ..Params::default()
    };
    let mut chain = Chain::new().with_params(params);
    let topic_id = chain.at(|k, ctx| {
        let id = k.create_new_topic(ctx, &actor(50), topic_msg()).unwrap();
        k.register(ctx, &actor(1), id, RegistrationKind::Reputer).unwrap();
        k.register(ctx, &actor(2), id, RegistrationKind::Reputer).unwrap();
        id
    });
    (chain, topic_id)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_stake_aggregates_match_positions(ops in prop::collection::vec(arb_stake_op(), 1..40)) {
        let (mut chain, topic_id) = staking_chain();
        for op in &ops {
            apply(&mut chain, topic_id, op);
            let (own, delegated, topic, total, escrow) = staking_totals(&mut chain, topic_id);
            prop_assert_eq!(own + delegated, topic, "after {:?}", op);
            prop_assert_eq!(topic, total);
            prop_assert_eq!(total, escrow);
        }
    }

    #[test]
    fn prop_select_active_threshold_holds(
        values in prop::collection::vec(0u64..1_000, 1..30),
        q in 1u64..99,
        cap in 1u64..40,
    ) {
        let candidates: Vec<Score> = values
            .iter()
            .enumerate()
            .map(|(i, v)| Score {
                topic_id: 1,
                address: actor(i as u8 + 1),
                block_height: 1,
                score: Dec::from_u64(*v),
            })
            .collect();
        let (threshold, active) =
            infera_emissions::select_active(&candidates, Dec::from_ratio(q as i128, 100).unwrap(), cap).unwrap();
        prop_assert!(!active.is_empty());
        let lowest = active.iter().map(|s| s.score).min().unwrap();
        prop_assert!(lowest >= threshold);
        for candidate in &candidates {
            let member = active.iter().any(|s| s.address == candidate.address);
            prop_assert_eq!(member, candidate.score >= lowest);
        }
    }
}

#[test]
fn test_cancellation_restores_pre_request_state() {
    let (mut chain, topic_id) = staking_chain();
    println!("\n=== Testing Removal Cancellation ===");

    chain.at(|k, ctx| {
        k.add_stake(ctx, &actor(1), topic_id, TokenAmount::new(4_000)).unwrap();
        k.add_delegate_stake(ctx, &actor(3), topic_id, &actor(1), TokenAmount::new(1_000))
            .unwrap();
    });
    let before = staking_totals(&mut chain, topic_id);

    chain.at(|k, ctx| {
        k.remove_stake(ctx, &actor(1), topic_id, TokenAmount::new(4_000)).unwrap();
        k.remove_delegate_stake(ctx, &actor(3), topic_id, &actor(1), TokenAmount::new(1_000))
            .unwrap();
    });
    chain.advance_to(chain.height + 2);
    chain.at(|k, ctx| {
        assert!(k.cancel_remove_stake(ctx, &actor(1), topic_id).unwrap());
        assert!(k.cancel_remove_delegate_stake(ctx, &actor(3), topic_id, &actor(1)).unwrap());
    });
    println!("✓ Pending removals cancelled before completion");

    // well past the original completion height
    chain.advance_to(chain.height + 20);
    assert_eq!(staking_totals(&mut chain, topic_id), before);
    chain.at(|k, ctx| {
        assert!(k.get_stake_removal(ctx, &actor(1), topic_id).unwrap().is_none());
        assert!(k
            .get_delegate_stake_removal(ctx, &actor(3), topic_id, &actor(1))
            .unwrap()
            .is_none());
        assert!(k.stake_removals_due(ctx, u64::MAX, 100).unwrap().is_empty());
    });
    println!("✓ Stake unchanged and no queue entries remain");

    // cancelling again is a successful no-op
    chain.at(|k, ctx| {
        assert!(!k.cancel_remove_stake(ctx, &actor(1), topic_id).unwrap());
    });
    println!("✓ Repeated cancel is a no-op");
}

#[test]
fn test_reputer_liveness_penalty_end_to_end() {
    let mut chain = Chain::new();
    chain.advance_to(110);
    println!("\n=== Testing Reputer Liveness Penalty ===");

    let penalised = chain.at(|k, ctx| {
        let id = k.create_new_topic(ctx, &actor(50), topic_msg()).unwrap();
        assert_eq!(k.get_topic(ctx, id).unwrap().epoch_last_ended, 110);
        k.tables()
            .initial_ema_scores
            .set(ctx.store_mut(), &(id, ActorRole::Reputer), &Dec::from_u64(200))
            .unwrap();
        let stale = Score {
            topic_id: id,
            address: actor(7),
            block_height: 55,
            score: Dec::from_u64(300),
        };
        let fresh = Score {
            topic_id: id,
            address: actor(8),
            block_height: 95,
            score: Dec::from_u64(300),
        };
        k.set_score(ctx, ActorRole::Reputer, &stale).unwrap();
        k.set_score(ctx, ActorRole::Reputer, &fresh).unwrap();

        let untouched = k
            .apply_liveness_penalty(ctx, id, ActorRole::Reputer, &actor(8))
            .unwrap()
            .unwrap();
        assert_eq!(untouched, fresh);
        k.apply_liveness_penalty(ctx, id, ActorRole::Reputer, &actor(7))
            .unwrap()
            .unwrap()
    });

    let expected = dec("265.61");
    let diff = penalised.score.checked_sub(expected).unwrap().abs();
    assert!(diff <= dec("0.0001"), "got {}", penalised.score);
    assert_eq!(penalised.block_height, 110);
    println!("✓ Four missed epochs decay 300 toward 200: {}", penalised.score);

    let stored = chain.at(|k, ctx| k.get_score(ctx, 1, ActorRole::Reputer, &actor(7)).unwrap());
    assert_eq!(stored, Some(penalised));
    println!("✓ Penalised score persisted");
}

#[test]
fn test_topic_weight_ordering_by_recency() {
    let params = Params {
        topic_fee_revenue_decay_rate: dec("0.01"),
        ..Params::default()
    };
    let mut chain = Chain::new().with_params(params);
    println!("\n=== Testing Topic Weight Recency ===");

    let (a, b) = chain.at(|k, ctx| {
        let a = k.create_new_topic(ctx, &actor(50), topic_msg()).unwrap();
        let b = k.create_new_topic(ctx, &actor(51), topic_msg()).unwrap();
        for id in [a, b] {
            k.register(ctx, &actor(1), id, RegistrationKind::Reputer).unwrap();
            k.add_stake(ctx, &actor(1), id, TokenAmount::new(50_000)).unwrap();
        }
        (a, b)
    });

    chain.advance_to(10);
    chain.at(|k, ctx| k.fund_topic(ctx, &actor(2), b, TokenAmount::new(5_000)).unwrap());
    chain.advance_to(50);
    chain.at(|k, ctx| k.fund_topic(ctx, &actor(2), a, TokenAmount::new(5_000)).unwrap());
    chain.advance_to(60);

    let (weight_a, weight_b) = chain.at(|k, ctx| {
        let params = k.params(ctx).unwrap();
        let wa = k.compute_topic_weight(ctx, a, &params).unwrap().weight;
        let wb = k.compute_topic_weight(ctx, b, &params).unwrap().weight;
        (wa, wb)
    });
    assert!(weight_a >= weight_b, "{} < {}", weight_a, weight_b);
    assert!(weight_a > weight_b);
    println!("✓ Recently funded topic outweighs stale one: {} vs {}", weight_a, weight_b);
}
