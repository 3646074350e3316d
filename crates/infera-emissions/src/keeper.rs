use crate::bank::BankKeeper;
use crate::context::ExecutionContext;
use crate::error::{EmissionsError, Result};
use crate::permissions::PermissionOracle;
use infera_math::Dec;
use infera_storage::{KvBackend, Result as StorageResult, Table};
use infera_types::{
    ActorId, ActorRole, BlockHeight, DelegateStakeRemovalInfo, EpochCycle, FeeRevenue, Forecast,
    Inference, Params, RegretKind, ReputerValueBundle, Score, StakeRemovalInfo, TimestampedValue,
    TokenAmount, Topic, TopicId, TopicWeight,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Declares every keeper table once; the table name is the field name.
/// Generates the [`Tables`] handle set and the matching [`GenesisTables`] dump.
macro_rules! keeper_tables {
    ($($(#[$doc:meta])* $field:ident : $key:ty => $value:ty),* $(,)?) => {
        pub struct Tables {
            $($(#[$doc])* pub $field: Table<$key, $value>,)*
        }

        impl Tables {
            pub fn new() -> Self {
                Self {
                    $($field: Table::new(stringify!($field)),)*
                }
            }

            pub fn names() -> Vec<&'static str> {
                vec![$(stringify!($field)),*]
            }

            /// Enumerate every table into an ordered record list.
            pub fn export(&self, store: &dyn KvBackend) -> StorageResult<GenesisTables> {
                Ok(GenesisTables {
                    $($field: self.$field.enumerate(store)?.collect::<StorageResult<Vec<_>>>()?,)*
                })
            }

            /// Restore every table from its record list. Returns records written.
            pub fn restore(&self, store: &mut dyn KvBackend, state: &GenesisTables) -> StorageResult<usize> {
                let mut written = 0;
                $(written += self.$field.restore(store, state.$field.iter().cloned())?;)*
                Ok(written)
            }
        }

        /// Per-table record lists, in key order.
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        pub struct GenesisTables {
            $(#[serde(default)] pub $field: Vec<($key, $value)>,)*
        }
    };
}

keeper_tables! {
    params: () => Params,
    next_topic_id: () => TopicId,
    topics: TopicId => Topic,
    topic_workers: (TopicId, ActorId) => (),
    topic_reputers: (TopicId, ActorId) => (),

    /// Reputer self stake
    stake_reputer: (TopicId, ActorId) => TokenAmount,
    /// (topic, delegator, reputer)
    stake_delegated: (TopicId, ActorId, ActorId) => TokenAmount,
    /// Sum delegated onto a reputer
    stake_upon_reputer: (TopicId, ActorId) => TokenAmount,
    /// Sum a delegator has placed in a topic
    stake_from_delegator: (TopicId, ActorId) => TokenAmount,
    topic_stake: TopicId => TokenAmount,
    total_stake: () => TokenAmount,

    /// (completion block, topic, reputer)
    stake_removals_by_block: (BlockHeight, TopicId, ActorId) => StakeRemovalInfo,
    /// (reputer, topic) -> completion block
    stake_removals_by_actor: (ActorId, TopicId) => BlockHeight,
    /// (completion block, topic, delegator, reputer)
    delegate_removals_by_block: (BlockHeight, TopicId, ActorId, ActorId) => DelegateStakeRemovalInfo,
    /// (delegator, topic, reputer) -> completion block
    delegate_removals_by_actor: (ActorId, TopicId, ActorId) => BlockHeight,

    /// (topic, kind, actor, counterpart)
    regrets: (TopicId, RegretKind, ActorId, Option<ActorId>) => TimestampedValue,
    inclusion_counts: (TopicId, ActorRole, ActorId) => u64,
    scores: (TopicId, ActorRole, ActorId) => Score,
    initial_ema_scores: (TopicId, ActorRole) => Dec,
    active_set: (TopicId, ActorRole, ActorId) => (),
    lowest_active_scores: (TopicId, ActorRole) => Score,

    fee_revenue: TopicId => FeeRevenue,
    topic_weights: TopicId => TopicWeight,
    active_topics: TopicId => (),
    next_churn: TopicId => BlockHeight,
    /// (next churn block, topic)
    churn_index: (BlockHeight, TopicId) => (),

    /// (topic, worker nonce)
    cycles: (TopicId, BlockHeight) => EpochCycle,
    inferences: (TopicId, BlockHeight, ActorId) => Inference,
    forecasts: (TopicId, BlockHeight, ActorId) => Forecast,
    reputer_bundles: (TopicId, BlockHeight, ActorId) => ReputerValueBundle,
}

impl Default for Tables {
    fn default() -> Self {
        Self::new()
    }
}

/// State owner of the emissions module.
///
/// Chain state lives in the store carried by [`ExecutionContext`]; the keeper
/// itself only holds table descriptors and its two external collaborators.
pub struct EmissionsKeeper {
    pub(crate) tables: Tables,
    bank: Box<dyn BankKeeper>,
    permissions: Box<dyn PermissionOracle>,
}

impl EmissionsKeeper {
    pub fn new(bank: Box<dyn BankKeeper>, permissions: Box<dyn PermissionOracle>) -> Self {
        Self {
            tables: Tables::new(),
            bank,
            permissions,
        }
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    pub fn bank(&self) -> &dyn BankKeeper {
        self.bank.as_ref()
    }

    pub(crate) fn bank_mut(&mut self) -> &mut dyn BankKeeper {
        self.bank.as_mut()
    }

    pub fn permissions(&self) -> &dyn PermissionOracle {
        self.permissions.as_ref()
    }

    pub fn set_permissions(&mut self, permissions: Box<dyn PermissionOracle>) {
        self.permissions = permissions;
    }

    pub fn params(&self, ctx: &ExecutionContext) -> Result<Params> {
        Ok(self
            .tables
            .params
            .get(ctx.store(), &())?
            .unwrap_or_default())
    }

    pub fn set_params(&self, ctx: &mut ExecutionContext, params: &Params) -> Result<()> {
        params.validate()?;
        self.tables.params.set(ctx.store_mut(), &(), params)?;
        info!(block_height = ctx.block_height(), "⚙️ Module params updated");
        Ok(())
    }

    pub fn get_topic(&self, ctx: &ExecutionContext, topic_id: TopicId) -> Result<Topic> {
        self.tables
            .topics
            .get(ctx.store(), &topic_id)?
            .ok_or(EmissionsError::TopicNotFound(topic_id))
    }

    pub fn topic_exists(&self, ctx: &ExecutionContext, topic_id: TopicId) -> Result<bool> {
        Ok(self.tables.topics.has(ctx.store(), &topic_id)?)
    }

    pub(crate) fn set_topic(&self, ctx: &mut ExecutionContext, topic: &Topic) -> Result<()> {
        self.tables.topics.set(ctx.store_mut(), &topic.id, topic)?;
        Ok(())
    }

    /// Topic ids start at 1.
    pub fn next_topic_id(&self, ctx: &ExecutionContext) -> Result<TopicId> {
        Ok(self
            .tables
            .next_topic_id
            .get(ctx.store(), &())?
            .unwrap_or(1))
    }

    pub(crate) fn claim_topic_id(&self, ctx: &mut ExecutionContext) -> Result<TopicId> {
        let id = self.next_topic_id(ctx)?;
        self.tables.next_topic_id.set(ctx.store_mut(), &(), &(id + 1))?;
        Ok(id)
    }

    pub fn all_topics(&self, ctx: &ExecutionContext) -> Result<Vec<Topic>> {
        Ok(self
            .tables
            .topics
            .iter(ctx.store())?
            .map(|r| r.map(|(_, topic)| topic))
            .collect::<StorageResult<Vec<_>>>()?)
    }

    pub fn is_worker_registered(
        &self,
        ctx: &ExecutionContext,
        topic_id: TopicId,
        actor: &ActorId,
    ) -> Result<bool> {
        Ok(self
            .tables
            .topic_workers
            .has(ctx.store(), &(topic_id, actor.clone()))?)
    }

    pub fn is_reputer_registered(
        &self,
        ctx: &ExecutionContext,
        topic_id: TopicId,
        actor: &ActorId,
    ) -> Result<bool> {
        Ok(self
            .tables
            .topic_reputers
            .has(ctx.store(), &(topic_id, actor.clone()))?)
    }

    /// Registered actors able to act in `role`, in key order.
    pub fn registered_actors(
        &self,
        ctx: &ExecutionContext,
        topic_id: TopicId,
        role: ActorRole,
    ) -> Result<Vec<ActorId>> {
        let table = if role.is_worker() {
            &self.tables.topic_workers
        } else {
            &self.tables.topic_reputers
        };
        Ok(table
            .iter_prefix(ctx.store(), &topic_id)?
            .map(|r| r.map(|((_, actor), ())| actor))
            .collect::<StorageResult<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{new_keeper, sample_topic};
    use infera_storage::MemoryBackend;
    use std::collections::HashSet;

    #[test]
    fn test_table_names_and_prefixes_unique() {
        let names = Tables::names();
        let unique: HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
        let prefixes: HashSet<_> = names
            .iter()
            .map(|n| infera_storage::hash_prefix(n))
            .collect();
        assert_eq!(prefixes.len(), names.len());
    }

    #[test]
    fn test_params_default_until_set() {
        let keeper = new_keeper();
        let mut store = MemoryBackend::new();
        let mut ctx = ExecutionContext::new(1, &mut store);
        assert_eq!(keeper.params(&ctx).unwrap(), Params::default());

        let mut params = Params::default();
        params.max_active_topics_per_block = 3;
        keeper.set_params(&mut ctx, &params).unwrap();
        assert_eq!(keeper.params(&ctx).unwrap().max_active_topics_per_block, 3);

        params.c_norm = Dec::ZERO;
        assert!(keeper.set_params(&mut ctx, &params).is_err());
    }

    #[test]
    fn test_topic_lookup_and_ids() {
        let keeper = new_keeper();
        let mut store = MemoryBackend::new();
        let mut ctx = ExecutionContext::new(1, &mut store);
        assert_eq!(
            keeper.get_topic(&ctx, 7),
            Err(EmissionsError::TopicNotFound(7))
        );
        assert_eq!(keeper.claim_topic_id(&mut ctx).unwrap(), 1);
        assert_eq!(keeper.claim_topic_id(&mut ctx).unwrap(), 2);
        keeper.set_topic(&mut ctx, &sample_topic(1)).unwrap();
        assert_eq!(keeper.get_topic(&ctx, 1).unwrap().id, 1);
        assert_eq!(keeper.all_topics(&ctx).unwrap().len(), 1);
    }
}
