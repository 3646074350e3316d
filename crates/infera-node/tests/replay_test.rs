use infera_node::{NodeGenesis, Replayer};
use infera_storage::state_hash;
use infera_types::ActorRole;

#[test]
fn test_devnet_replay_scores_first_epoch() {
    println!("\n=== Testing Devnet Replay ===");
    let genesis = NodeGenesis::devnet().unwrap();
    let mut replayer = Replayer::from_genesis(&genesis).unwrap();

    let mut scored_at = None;
    while replayer.height() <= 26 {
        let block = replayer.run_block().unwrap();
        assert!(block.rejected.is_empty(), "block {} rejected {:?}", block.height, block.rejected);
        if !block.report.rounds.is_empty() {
            scored_at = Some(block.height);
            assert!(block.report.rewards.total_paid.units() > 0);
        }
    }
    assert_eq!(scored_at, Some(26));
    println!("✓ First epoch scored at height 26");

    // registration fee paid; the two better inferers share the reward
    let bank = replayer.keeper().bank();
    let workers: Vec<_> = genesis.accounts[1..4].iter().map(|(a, _)| a.clone()).collect();
    assert!(bank.balance(&workers[0]).units() > 999_990);
    assert!(bank.balance(&workers[1]).units() > 999_990);
    assert_eq!(bank.balance(&workers[2]).units(), 999_990);
    println!("✓ Rewards reached the active inferers only");
}

#[test]
fn test_replay_is_deterministic() {
    let genesis = NodeGenesis::devnet().unwrap();
    let first = Replayer::from_genesis(&genesis).unwrap().run(Some(30)).unwrap();
    let second = Replayer::from_genesis(&genesis).unwrap().run(Some(30)).unwrap();

    assert_eq!(first.state_hash, second.state_hash);
    assert_eq!(first.applied, second.applied);
    assert_eq!(first.rewards_paid, second.rewards_paid);
    assert_eq!(first.scoring_rounds, 1);
    assert_eq!(first.final_height, 30);
    println!("✓ Two replays agree on state hash {}", first.state_hash);
}

#[test]
fn test_exported_state_resumes_with_same_hash() {
    let genesis = NodeGenesis::devnet().unwrap();
    let mut replayer = Replayer::from_genesis(&genesis).unwrap();
    replayer.run(Some(26)).unwrap();
    let exported = replayer.export().unwrap();
    assert_eq!(exported.block_height, 27);

    let resumed_genesis = NodeGenesis {
        initial_height: exported.block_height,
        emissions: exported,
        txs: Vec::new(),
        ..genesis
    };
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("resumed.json");
    resumed_genesis.save_to_file(&path).unwrap();
    let reloaded = NodeGenesis::from_file(&path).unwrap();

    let resumed = Replayer::from_genesis(&reloaded).unwrap();
    assert_eq!(
        state_hash(resumed.store()).unwrap(),
        state_hash(replayer.store()).unwrap()
    );
    println!("✓ Exported state restores to the same hash");

    let topic_id: u64 = 1;
    let keeper = resumed.keeper();
    let store = resumed.store();
    let has_scores = keeper
        .tables()
        .scores
        .iter_prefix(store, &(topic_id, ActorRole::Inferer))
        .unwrap()
        .count();
    assert_eq!(has_scores, 3);
}
