//! Genesis import and export of the full keeper state.

use crate::context::ExecutionContext;
use crate::error::{EmissionsError, Result};
use crate::keeper::{EmissionsKeeper, GenesisTables};
use infera_types::{ActorId, BlockHeight, Params, TokenAmount, TopicId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

pub const GENESIS_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisState {
    pub version: u32,
    #[serde(default)]
    pub block_height: BlockHeight,
    #[serde(default)]
    pub tables: GenesisTables,
}

impl Default for GenesisState {
    fn default() -> Self {
        Self {
            version: GENESIS_VERSION,
            block_height: 0,
            tables: GenesisTables::default(),
        }
    }
}

fn add(
    totals: &mut BTreeMap<TopicId, TokenAmount>,
    topic_id: TopicId,
    amount: TokenAmount,
) -> Result<()> {
    let entry = totals.entry(topic_id).or_default();
    *entry = entry
        .checked_add(amount)
        .ok_or_else(|| EmissionsError::InvalidGenesis(format!("stake overflow in topic {}", topic_id)))?;
    Ok(())
}

impl GenesisState {
    pub fn params(&self) -> Params {
        self.tables
            .params
            .first()
            .map(|(_, p)| p.clone())
            .unwrap_or_default()
    }

    /// Check that the dump is internally consistent before it is written.
    pub fn validate(&self) -> Result<()> {
        if self.version != GENESIS_VERSION {
            return Err(EmissionsError::InvalidGenesis(format!(
                "unsupported genesis version {} (expected {})",
                self.version, GENESIS_VERSION
            )));
        }
        if self.tables.params.len() > 1 {
            return Err(EmissionsError::InvalidGenesis(
                "more than one params record".to_string(),
            ));
        }
        let params = self.params();
        params.validate()?;
        for (id, topic) in &self.tables.topics {
            if *id != topic.id {
                return Err(EmissionsError::InvalidGenesis(format!(
                    "topic stored under id {} claims id {}",
                    id, topic.id
                )));
            }
            topic.validate(&params)?;
        }

        let mut per_topic = BTreeMap::new();
        for ((topic_id, _), amount) in &self.tables.stake_reputer {
            add(&mut per_topic, *topic_id, *amount)?;
        }
        let mut upon: BTreeMap<(TopicId, ActorId), TokenAmount> = BTreeMap::new();
        for ((topic_id, _, reputer), amount) in &self.tables.stake_delegated {
            add(&mut per_topic, *topic_id, *amount)?;
            let entry = upon.entry((*topic_id, reputer.clone())).or_default();
            *entry = entry.saturating_add(*amount);
        }

        let declared: BTreeMap<TopicId, TokenAmount> = self.tables.topic_stake.iter().cloned().collect();
        let nonzero: BTreeMap<TopicId, TokenAmount> =
            per_topic.into_iter().filter(|(_, a)| !a.is_zero()).collect();
        if declared != nonzero {
            return Err(EmissionsError::InvalidGenesis(
                "topic stake does not match the sum of stake positions".to_string(),
            ));
        }
        let declared_upon: BTreeMap<(TopicId, ActorId), TokenAmount> =
            self.tables.stake_upon_reputer.iter().cloned().collect();
        if declared_upon != upon {
            return Err(EmissionsError::InvalidGenesis(
                "stake upon reputer does not match delegated positions".to_string(),
            ));
        }

        let total = nonzero
            .values()
            .try_fold(TokenAmount::ZERO, |acc, a| acc.checked_add(*a))
            .ok_or_else(|| EmissionsError::InvalidGenesis("total stake overflow".to_string()))?;
        let declared_total = self
            .tables
            .total_stake
            .first()
            .map(|(_, a)| *a)
            .unwrap_or(TokenAmount::ZERO);
        if total != declared_total {
            return Err(EmissionsError::InvalidGenesis(format!(
                "total stake {} does not match sum of topic stake {}",
                declared_total, total
            )));
        }
        Ok(())
    }
}

impl EmissionsKeeper {
    pub fn export_genesis(&self, ctx: &ExecutionContext) -> Result<GenesisState> {
        let tables = self.tables.export(ctx.store())?;
        info!(
            block_height = ctx.block_height(),
            topics = tables.topics.len(),
            "📤 Genesis exported"
        );
        Ok(GenesisState {
            version: GENESIS_VERSION,
            block_height: ctx.block_height(),
            tables,
        })
    }

    /// Validate and load a genesis dump, replacing every keeper table.
    pub fn init_genesis(&self, ctx: &mut ExecutionContext, state: &GenesisState) -> Result<usize> {
        state.validate()?;
        let written = ctx.in_transaction(|ctx| Ok(self.tables.restore(ctx.store_mut(), &state.tables)?))?;
        info!(
            block_height = state.block_height,
            records = written,
            topics = state.tables.topics.len(),
            "🧬 Genesis loaded"
        );
        Ok(written)
    }
}
