mod common;

use common::{actor, dec, topic_msg, Chain, STARTING_BALANCE};
use infera_emissions::{ExecutionContext, GenesisState, Msg};
use infera_math::Dec;
use infera_storage::{state_hash, MemoryBackend};
use infera_types::{
    ActorRole, CyclePhase, Forecast, ForecastElement, Inference, OneInForecasterValue,
    RegistrationKind, RegretKind, ReputerValueBundle, TokenAmount, WorkerAttributedValue,
    WorkerPayload,
};

fn attributed(pairs: &[(u8, &str)], skew: Dec) -> Vec<WorkerAttributedValue> {
    pairs
        .iter()
        .map(|(byte, value)| WorkerAttributedValue {
            worker: actor(*byte),
            value: dec(value).checked_add(skew).unwrap(),
        })
        .collect()
}

/// Reputer losses for the epoch at `nonce`, every value shifted by `skew`.
fn bundle(reputer: u8, nonce: u64, skew: &str) -> ReputerValueBundle {
    let skew = dec(skew);
    let shifted = |v: &str| dec(v).checked_add(skew).unwrap();
    ReputerValueBundle {
        topic_id: 1,
        worker_nonce: nonce,
        reputer: actor(reputer),
        combined_value: shifted("0.7"),
        naive_value: shifted("0.9"),
        inferer_values: attributed(&[(2, "0.5"), (3, "1.0"), (4, "2.0")], skew),
        forecaster_values: attributed(&[(4, "0.8")], skew),
        one_out_inferer_values: attributed(&[(2, "0.9"), (3, "0.75"), (4, "0.7")], skew),
        one_out_forecaster_values: attributed(&[(4, "0.75")], skew),
        one_in_forecaster_values: vec![OneInForecasterValue {
            forecaster: actor(4),
            inferer: actor(2),
            value: shifted("0.6"),
        }],
    }
}

fn inference(worker: u8, nonce: u64, value: &str) -> Inference {
    Inference {
        topic_id: 1,
        block_height: nonce,
        inferer: actor(worker),
        value: dec(value),
    }
}

/// Builds a topic with three workers and two staked reputers at height 1.
fn populated_chain() -> Chain {
    let mut chain = Chain::new();
    chain.at(|k, ctx| {
        let creator = actor(1);
        k.dispatch(ctx, &creator, Msg::CreateNewTopic(topic_msg())).unwrap();
        for worker in [2u8, 3, 4] {
            k.dispatch(ctx, &actor(worker), Msg::Register { topic_id: 1, kind: RegistrationKind::Worker })
                .unwrap();
        }
        for reputer in [10u8, 11] {
            k.dispatch(ctx, &actor(reputer), Msg::Register { topic_id: 1, kind: RegistrationKind::Reputer })
                .unwrap();
            k.dispatch(ctx, &actor(reputer), Msg::AddStake { topic_id: 1, amount: TokenAmount::new(20_000) })
                .unwrap();
        }
        assert!(k.is_topic_active(ctx, 1).unwrap());
        assert_eq!(k.next_churn_block(ctx, 1).unwrap(), Some(11));
    });
    chain
}

#[test]
fn test_full_epoch_cycle() {
    let mut chain = populated_chain();
    println!("\n=== Testing Full Epoch Cycle ===");

    let reports = chain.advance_to(12);
    let churn = &reports.last().unwrap().topic_weights;
    assert_eq!(churn.churned, vec![1]);
    chain.at(|k, ctx| {
        assert_eq!(k.get_topic(ctx, 1).unwrap().epoch_last_ended, 11);
        assert_eq!(k.get_cycle(ctx, 1, 11).unwrap().unwrap().phase, CyclePhase::WindowOpen);
    });
    println!("✓ Topic churned at 11 and opened a worker window");

    chain.at(|k, ctx| {
        for (worker, value) in [(2u8, "101.5"), (3, "99.0"), (4, "100.2")] {
            let forecast = (worker == 4).then(|| Forecast {
                topic_id: 1,
                block_height: 11,
                forecaster: actor(4),
                elements: vec![
                    ForecastElement { inferer: actor(2), value: dec("0.4") },
                    ForecastElement { inferer: actor(3), value: dec("1.1") },
                ],
            });
            let payload = WorkerPayload {
                topic_id: 1,
                worker_nonce: 11,
                inference: Some(inference(worker, 11, value)),
                forecast,
            };
            k.dispatch(ctx, &actor(worker), Msg::InsertWorkerPayload(payload)).unwrap();
        }
    });
    println!("✓ Worker payloads accepted inside the window");

    chain.advance_to(17);
    chain.at(|k, ctx| {
        assert_eq!(
            k.get_cycle(ctx, 1, 11).unwrap().unwrap().phase,
            CyclePhase::AwaitingReputers
        );
        // reputer window has not opened yet
        assert!(k
            .insert_reputer_payload(ctx, &actor(10), bundle(10, 11, "0"))
            .is_err());
    });
    println!("✓ Worker window closed, waiting for reputers");

    chain.advance_to(21);
    chain.at(|k, ctx| {
        k.dispatch(ctx, &actor(10), Msg::InsertReputerPayload(bundle(10, 11, "0")))
            .unwrap();
        k.dispatch(ctx, &actor(11), Msg::InsertReputerPayload(bundle(11, 11, "0.02")))
            .unwrap();
    });
    println!("✓ Reputer bundles accepted");

    let reports = chain.advance_to(27);
    let scored = reports.last().unwrap();
    assert_eq!(scored.block_height, 26);
    assert_eq!(scored.rounds.len(), 1);
    let round = &scored.rounds[0];
    assert_eq!(round.worker_nonce, 11);
    assert!(round.scores.iter().any(|(role, s)| *role == ActorRole::Forecaster && s.address == actor(4)));
    assert_eq!(
        round.scores.iter().filter(|(role, _)| *role == ActorRole::Reputer).count(),
        2
    );
    println!("✓ Epoch scored at 26 with {} score updates", round.scores.len());

    chain.at(|k, ctx| {
        assert!(k.get_cycle(ctx, 1, 11).unwrap().is_none());
        assert!(k.reputer_bundles(ctx, 1, 11).unwrap().is_empty());

        let best = k.get_score(ctx, 1, ActorRole::Inferer, &actor(2)).unwrap().unwrap();
        let worst = k.get_score(ctx, 1, ActorRole::Inferer, &actor(4)).unwrap().unwrap();
        assert!(best.score > worst.score);
        assert!(k.is_active(ctx, 1, ActorRole::Inferer, &actor(2)).unwrap());
        assert!(!k.is_active(ctx, 1, ActorRole::Inferer, &actor(4)).unwrap());

        // equal stake puts consensus halfway between the two reputers
        let low = k.get_score(ctx, 1, ActorRole::Reputer, &actor(10)).unwrap().unwrap();
        let high = k.get_score(ctx, 1, ActorRole::Reputer, &actor(11)).unwrap().unwrap();
        assert_eq!(low.score, high.score);
        assert!(low.score.is_negative());

        let topic = k.get_topic(ctx, 1).unwrap();
        let regret = k
            .get_regret(ctx, &topic, RegretKind::InfererNetwork, &actor(2), None)
            .unwrap();
        assert!(!regret.no_prior);
        assert!(regret.value.value.is_positive());
        let one_in = k
            .get_regret(ctx, &topic, RegretKind::OneInForecaster, &actor(4), Some(&actor(2)))
            .unwrap();
        assert!(!one_in.no_prior);
        assert_eq!(k.inclusion_count(ctx, 1, ActorRole::Inferer, &actor(3)).unwrap(), 1);
    });
    println!("✓ Scores, regrets and active sets updated");

    assert!(scored.rewards.total_paid.units() > 0);
    assert!(scored.rewards.total_paid <= scored.rewards.budget);
    chain.at(|k, _| {
        // registration fee paid, reward received
        assert!(k.bank().balance(&actor(2)).units() > STARTING_BALANCE - 10);
    });
    println!("✓ Rewards paid: {}", scored.rewards.total_paid);
}

fn submit_inferences(chain: &mut Chain, nonce: u64, workers: &[u8]) {
    chain.at(|k, ctx| {
        for worker in workers {
            let payload = WorkerPayload {
                topic_id: 1,
                worker_nonce: nonce,
                inference: Some(inference(*worker, nonce, "100.0")),
                forecast: None,
            };
            k.dispatch(ctx, &actor(*worker), Msg::InsertWorkerPayload(payload))
                .unwrap();
        }
    });
}

fn submit_bundles(chain: &mut Chain, nonce: u64) {
    chain.at(|k, ctx| {
        for (reputer, skew) in [(10u8, "0"), (11, "0.02")] {
            k.dispatch(ctx, &actor(reputer), Msg::InsertReputerPayload(bundle(reputer, nonce, skew)))
                .unwrap();
        }
    });
}

#[test]
fn test_worker_skipping_an_epoch_is_penalised() {
    let mut chain = populated_chain();
    println!("\n=== Testing Worker Liveness Across Epochs ===");

    let mut reports = chain.advance_to(12);
    submit_inferences(&mut chain, 11, &[2, 3, 4]);
    reports.extend(chain.advance_to(21));
    submit_bundles(&mut chain, 11);
    reports.extend(chain.advance_to(22));
    submit_inferences(&mut chain, 21, &[2, 3, 4]);
    reports.extend(chain.advance_to(31));
    submit_bundles(&mut chain, 21);
    reports.extend(chain.advance_to(32));
    // worker 3 sits out the epoch at 31
    submit_inferences(&mut chain, 31, &[2, 4]);
    reports.extend(chain.advance_to(41));
    submit_bundles(&mut chain, 31);

    let before = chain.at(|k, ctx| {
        assert!(k.is_active(ctx, 1, ActorRole::Inferer, &actor(3)).unwrap());
        k.get_score(ctx, 1, ActorRole::Inferer, &actor(3)).unwrap().unwrap()
    });
    assert_eq!(before.block_height, 21);
    println!("✓ Worker 3 active with its last submission at nonce 21");

    reports.extend(chain.advance_to(47));
    let round = |nonce: u64| {
        reports
            .iter()
            .flat_map(|r| r.rounds.iter())
            .find(|round| round.worker_nonce == nonce)
            .unwrap()
            .clone()
    };
    assert!(round(11).penalised.is_empty());
    assert!(round(21).penalised.is_empty());
    assert_eq!(round(31).penalised, vec![(ActorRole::Inferer, actor(3))]);
    println!("✓ Only the absent worker was penalised");

    chain.at(|k, ctx| {
        let after = k.get_score(ctx, 1, ActorRole::Inferer, &actor(3)).unwrap().unwrap();
        assert_eq!(after.block_height, 46);
        assert!(after.score < before.score, "{} >= {}", after.score, before.score);
        let present = k.get_score(ctx, 1, ActorRole::Inferer, &actor(2)).unwrap().unwrap();
        assert_eq!(present.block_height, 31);
    });
    println!("✓ One missed epoch decayed the score toward the floor");
}

#[test]
fn test_epoch_without_workers_is_discarded() {
    let mut chain = populated_chain();
    let reports = chain.advance_to(17);
    let discarded: usize = reports.iter().map(|r| r.sweep.discarded.len()).sum();
    assert_eq!(discarded, 1);
    chain.at(|k, ctx| assert!(k.open_cycles(ctx).unwrap().is_empty()));
}

#[test]
fn test_genesis_round_trip_through_json() {
    let mut chain = populated_chain();
    chain.advance_to(14);
    println!("\n=== Testing Genesis Round Trip ===");

    let exported = chain.at(|k, ctx| k.export_genesis(ctx).unwrap());
    let json = serde_json::to_string_pretty(&exported).unwrap();
    let imported: GenesisState = serde_json::from_str(&json).unwrap();
    assert_eq!(imported, exported);
    println!("✓ Genesis survives JSON encoding ({} bytes)", json.len());

    let mut fresh = MemoryBackend::new();
    chain.at(|k, _| {
        let mut ctx = ExecutionContext::new(imported.block_height, &mut fresh);
        k.init_genesis(&mut ctx, &imported).unwrap();
    });
    assert_eq!(state_hash(&fresh).unwrap(), state_hash(&chain.store).unwrap());
    println!("✓ Restored store hashes identically");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("genesis.json");
    std::fs::write(&path, &json).unwrap();
    let from_disk: GenesisState =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    from_disk.validate().unwrap();
    println!("✓ Genesis file validates after reload");
}
