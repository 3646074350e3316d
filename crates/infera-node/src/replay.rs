//! Block-by-block replay of a genesis file against an in-memory store.

use crate::genesis::{NodeGenesis, ScheduledTx};
use anyhow::{bail, Context, Result};
use infera_emissions::{
    end_block, EmissionsKeeper, EndBlockReport, ExecutionContext, GenesisState, OpenPermissions,
};
use infera_storage::{state_hash, MemoryBackend};
use infera_types::{BlockHeight, TokenAmount};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// What one replayed block did.
#[derive(Debug, Clone)]
pub struct BlockSummary {
    pub height: BlockHeight,
    pub applied: usize,
    pub rejected: Vec<(String, String)>,
    pub report: EndBlockReport,
    pub state_hash: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReplaySummary {
    pub blocks: u64,
    pub applied: usize,
    pub rejected: usize,
    pub scoring_rounds: usize,
    pub rewards_paid: TokenAmount,
    pub final_height: BlockHeight,
    pub state_hash: String,
}

pub struct Replayer {
    store: MemoryBackend,
    keeper: EmissionsKeeper,
    height: BlockHeight,
    pending: BTreeMap<BlockHeight, Vec<ScheduledTx>>,
    halt_on_rejected_tx: bool,
}

impl Replayer {
    pub fn from_genesis(genesis: &NodeGenesis) -> Result<Self> {
        genesis.verify()?;
        let bank = genesis.build_bank()?;
        let mut permissions = OpenPermissions::new();
        for admin in &genesis.admins {
            permissions = permissions.with_admin(admin.clone());
        }

        let mut store = MemoryBackend::new();
        let keeper = EmissionsKeeper::new(Box::new(bank), Box::new(permissions));
        let records = {
            let mut ctx = ExecutionContext::new(genesis.initial_height, &mut store);
            keeper
                .init_genesis(&mut ctx, &genesis.emissions)
                .context("restoring emissions state")?
        };

        let mut pending: BTreeMap<BlockHeight, Vec<ScheduledTx>> = BTreeMap::new();
        for tx in &genesis.txs {
            pending.entry(tx.height).or_default().push(tx.clone());
        }

        info!(
            chain_id = %genesis.chain_id,
            initial_height = genesis.initial_height,
            records,
            txs = genesis.txs.len(),
            supply = genesis.total_supply(),
            "🧬 Genesis loaded"
        );
        Ok(Self {
            store,
            keeper,
            height: genesis.initial_height,
            pending,
            halt_on_rejected_tx: false,
        })
    }

    pub fn halt_on_rejected_tx(mut self, halt: bool) -> Self {
        self.halt_on_rejected_tx = halt;
        self
    }

    /// Height of the block the next call to [`Replayer::run_block`] builds.
    pub fn height(&self) -> BlockHeight {
        self.height
    }

    pub fn keeper(&self) -> &EmissionsKeeper {
        &self.keeper
    }

    pub fn store(&self) -> &MemoryBackend {
        &self.store
    }

    pub fn last_scheduled_height(&self) -> Option<BlockHeight> {
        self.pending.keys().next_back().copied()
    }

    /// Deliver the block's transactions in order, then run the end-of-block hook.
    pub fn run_block(&mut self) -> Result<BlockSummary> {
        let height = self.height;
        let txs = self.pending.remove(&height).unwrap_or_default();
        let mut ctx = ExecutionContext::new(height, &mut self.store);

        let mut applied = 0;
        let mut rejected = Vec::new();
        for tx in txs {
            let name = tx.msg.name();
            match self.keeper.dispatch(&mut ctx, &tx.sender, tx.msg) {
                Ok(()) => {
                    applied += 1;
                    debug!(height, msg = name, sender = %tx.sender, "✅ Transaction applied");
                }
                Err(e) if self.halt_on_rejected_tx || e.is_fatal() => {
                    bail!("{} from {} failed at height {}: {}", name, tx.sender, height, e);
                }
                Err(e) => {
                    warn!(height, msg = name, sender = %tx.sender, error = %e, "⚠️ Transaction rejected");
                    rejected.push((name.to_string(), e.to_string()));
                }
            }
        }

        let report = end_block(&mut self.keeper, &mut ctx)
            .with_context(|| format!("end block {}", height))?;
        drop(ctx);
        let hash = state_hash(&self.store)?;
        self.height += 1;

        debug!(height, applied, rejected = rejected.len(), state_hash = %hash, "📦 Block replayed");
        Ok(BlockSummary {
            height,
            applied,
            rejected,
            report,
            state_hash: hash,
        })
    }

    /// Replay `blocks` blocks, or up to the last scheduled transaction when `None`.
    pub fn run(&mut self, blocks: Option<u64>) -> Result<ReplaySummary> {
        let start = self.height;
        let end = match blocks {
            Some(n) => start.saturating_add(n),
            None => self
                .last_scheduled_height()
                .map_or(start, |h| h.saturating_add(1)),
        };

        let mut summary = ReplaySummary::default();
        while self.height < end {
            let block = self.run_block()?;
            summary.blocks += 1;
            summary.applied += block.applied;
            summary.rejected += block.rejected.len();
            summary.scoring_rounds += block.report.rounds.len();
            summary.rewards_paid = summary
                .rewards_paid
                .saturating_add(block.report.rewards.total_paid);
            summary.final_height = block.height;
            summary.state_hash = block.state_hash;
        }
        if summary.blocks == 0 {
            summary.final_height = start.saturating_sub(1);
            summary.state_hash = state_hash(&self.store)?;
        }

        info!(
            blocks = summary.blocks,
            applied = summary.applied,
            rejected = summary.rejected,
            scoring_rounds = summary.scoring_rounds,
            rewards_paid = %summary.rewards_paid,
            state_hash = %summary.state_hash,
            "🏁 Replay finished"
        );
        Ok(summary)
    }

    /// Current keeper state as a genesis dump.
    pub fn export(&mut self) -> Result<GenesisState> {
        let ctx = ExecutionContext::new(self.height, &mut self.store);
        Ok(self.keeper.export_genesis(&ctx)?)
    }
}
