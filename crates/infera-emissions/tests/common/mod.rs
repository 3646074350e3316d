#![allow(dead_code)]

use infera_emissions::{
    end_block, EmissionsKeeper, EndBlockReport, ExecutionContext, MemoryBank, ModuleAccount,
    MsgCreateNewTopic, OpenPermissions,
};
use infera_math::Dec;
use infera_storage::MemoryBackend;
use infera_types::{ActorId, Params, TokenAmount};

pub const STARTING_BALANCE: u128 = 10_000_000;
pub const REWARD_POOL: u128 = 50_000_000;

pub fn actor(byte: u8) -> ActorId {
    ActorId::from_bytes(&[byte; 20]).unwrap()
}

pub fn dec(s: &str) -> Dec {
    s.parse().unwrap()
}

pub fn topic_msg() -> MsgCreateNewTopic {
    MsgCreateNewTopic {
        metadata: "ETH/USD 10 block horizon".to_string(),
        loss_method: "mse".to_string(),
        epoch_length: 10,
        ground_truth_lag: 10,
        worker_submission_window: 5,
        p_norm: dec("3"),
        alpha_regret: dec("0.1"),
        allow_negative: false,
        epsilon: dec("0.01"),
        merit_sortition_alpha: dec("0.1"),
        active_inferer_quantile: dec("0.25"),
        active_forecaster_quantile: dec("0.25"),
        active_reputer_quantile: dec("0.25"),
        enable_worker_whitelist: false,
        enable_reputer_whitelist: false,
    }
}

/// A keeper, its store and the height of the block being built.
pub struct Chain {
    pub store: MemoryBackend,
    pub keeper: EmissionsKeeper,
    pub height: u64,
}

impl Chain {
    /// Actors 1..=60 start with [`STARTING_BALANCE`]; the rewards pool is prefunded.
    pub fn new() -> Self {
        let mut bank = MemoryBank::new();
        for byte in 1..=60u8 {
            bank.credit(&actor(byte), TokenAmount::new(STARTING_BALANCE))
                .unwrap();
        }
        bank.credit_module(ModuleAccount::Rewards, TokenAmount::new(REWARD_POOL))
            .unwrap();
        Self {
            store: MemoryBackend::new(),
            keeper: EmissionsKeeper::new(Box::new(bank), Box::new(OpenPermissions::new())),
            height: 1,
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.at(|keeper, ctx| keeper.set_params(ctx, &params).unwrap());
        self
    }

    /// Run `f` against the block currently being built.
    pub fn at<T>(&mut self, f: impl FnOnce(&mut EmissionsKeeper, &mut ExecutionContext) -> T) -> T {
        let mut ctx = ExecutionContext::new(self.height, &mut self.store);
        f(&mut self.keeper, &mut ctx)
    }

    /// Close the current block and move to the next one.
    pub fn finish_block(&mut self) -> EndBlockReport {
        let report = self.at(|keeper, ctx| end_block(keeper, ctx).unwrap());
        self.height += 1;
        report
    }

    /// Finish blocks until `height` is the block being built.
    pub fn advance_to(&mut self, height: u64) -> Vec<EndBlockReport> {
        let mut reports = Vec::new();
        while self.height < height {
            reports.push(self.finish_block());
        }
        reports
    }
}
