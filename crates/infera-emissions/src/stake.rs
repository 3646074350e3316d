//! Stake ledger: immediate deposits, delayed and cancellable withdrawals.
//!
//! Aggregates (stake upon reputer, stake from delegator, topic stake, total
//! stake) are only ever moved by the same delta as the position they
//! summarise, so every operation is O(1) in the number of positions.

use crate::bank::ModuleAccount;
use crate::context::ExecutionContext;
use crate::error::{EmissionsError, Result};
use crate::keeper::EmissionsKeeper;
use infera_storage::{KeyCodec, Result as StorageResult, Table};
use infera_types::{
    ActorId, BlockHeight, DelegateStakeRemovalInfo, StakeRemovalInfo, TokenAmount, TopicId,
};
use tracing::{debug, info};

fn increase<K: KeyCodec + 'static>(
    ctx: &mut ExecutionContext,
    table: &Table<K, TokenAmount>,
    key: &K,
    amount: TokenAmount,
) -> Result<TokenAmount> {
    let current = table.get(ctx.store(), key)?.unwrap_or(TokenAmount::ZERO);
    let updated = current.checked_add(amount).ok_or_else(|| {
        EmissionsError::InvalidAmount(format!("{} overflows {} + {}", table.name(), current, amount))
    })?;
    table.set(ctx.store_mut(), key, &updated)?;
    Ok(updated)
}

fn decrease<K: KeyCodec + 'static>(
    ctx: &mut ExecutionContext,
    table: &Table<K, TokenAmount>,
    key: &K,
    amount: TokenAmount,
) -> Result<TokenAmount> {
    let current = table.get(ctx.store(), key)?.unwrap_or(TokenAmount::ZERO);
    let updated = current.checked_sub(amount).ok_or_else(|| {
        EmissionsError::StakeUnderflow(format!(
            "{} would go negative: {} - {}",
            table.name(),
            current,
            amount
        ))
    })?;
    if updated.is_zero() {
        table.remove(ctx.store_mut(), key)?;
    } else {
        table.set(ctx.store_mut(), key, &updated)?;
    }
    Ok(updated)
}

fn require_positive(amount: TokenAmount) -> Result<()> {
    if amount.is_zero() {
        return Err(EmissionsError::InvalidAmount(
            "amount must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

impl EmissionsKeeper {
    pub fn get_reputer_stake(
        &self,
        ctx: &ExecutionContext,
        topic_id: TopicId,
        reputer: &ActorId,
    ) -> Result<TokenAmount> {
        Ok(self
            .tables
            .stake_reputer
            .get(ctx.store(), &(topic_id, reputer.clone()))?
            .unwrap_or(TokenAmount::ZERO))
    }

    pub fn get_delegate_stake(
        &self,
        ctx: &ExecutionContext,
        topic_id: TopicId,
        delegator: &ActorId,
        reputer: &ActorId,
    ) -> Result<TokenAmount> {
        Ok(self
            .tables
            .stake_delegated
            .get(ctx.store(), &(topic_id, delegator.clone(), reputer.clone()))?
            .unwrap_or(TokenAmount::ZERO))
    }

    pub fn get_stake_upon_reputer(
        &self,
        ctx: &ExecutionContext,
        topic_id: TopicId,
        reputer: &ActorId,
    ) -> Result<TokenAmount> {
        Ok(self
            .tables
            .stake_upon_reputer
            .get(ctx.store(), &(topic_id, reputer.clone()))?
            .unwrap_or(TokenAmount::ZERO))
    }

    pub fn get_stake_from_delegator(
        &self,
        ctx: &ExecutionContext,
        topic_id: TopicId,
        delegator: &ActorId,
    ) -> Result<TokenAmount> {
        Ok(self
            .tables
            .stake_from_delegator
            .get(ctx.store(), &(topic_id, delegator.clone()))?
            .unwrap_or(TokenAmount::ZERO))
    }

    /// Self stake plus everything delegated onto the reputer.
    pub fn get_reputer_authority(
        &self,
        ctx: &ExecutionContext,
        topic_id: TopicId,
        reputer: &ActorId,
    ) -> Result<TokenAmount> {
        let own = self.get_reputer_stake(ctx, topic_id, reputer)?;
        let delegated = self.get_stake_upon_reputer(ctx, topic_id, reputer)?;
        own.checked_add(delegated).ok_or_else(|| {
            EmissionsError::InvalidAmount(format!("authority overflow for {}", reputer))
        })
    }

    pub fn get_topic_stake(&self, ctx: &ExecutionContext, topic_id: TopicId) -> Result<TokenAmount> {
        Ok(self
            .tables
            .topic_stake
            .get(ctx.store(), &topic_id)?
            .unwrap_or(TokenAmount::ZERO))
    }

    pub fn get_total_stake(&self, ctx: &ExecutionContext) -> Result<TokenAmount> {
        Ok(self
            .tables
            .total_stake
            .get(ctx.store(), &())?
            .unwrap_or(TokenAmount::ZERO))
    }

    pub fn get_stake_removal(
        &self,
        ctx: &ExecutionContext,
        reputer: &ActorId,
        topic_id: TopicId,
    ) -> Result<Option<StakeRemovalInfo>> {
        let Some(block) = self
            .tables
            .stake_removals_by_actor
            .get(ctx.store(), &(reputer.clone(), topic_id))?
        else {
            return Ok(None);
        };
        Ok(self
            .tables
            .stake_removals_by_block
            .get(ctx.store(), &(block, topic_id, reputer.clone()))?)
    }

    pub fn get_delegate_stake_removal(
        &self,
        ctx: &ExecutionContext,
        delegator: &ActorId,
        topic_id: TopicId,
        reputer: &ActorId,
    ) -> Result<Option<DelegateStakeRemovalInfo>> {
        let Some(block) = self.tables.delegate_removals_by_actor.get(
            ctx.store(),
            &(delegator.clone(), topic_id, reputer.clone()),
        )?
        else {
            return Ok(None);
        };
        Ok(self.tables.delegate_removals_by_block.get(
            ctx.store(),
            &(block, topic_id, delegator.clone(), reputer.clone()),
        )?)
    }

    /// Removal requests completing at or before `height`, in processing order.
    pub fn stake_removals_due(
        &self,
        ctx: &ExecutionContext,
        height: BlockHeight,
        limit: usize,
    ) -> Result<Vec<StakeRemovalInfo>> {
        let mut due = Vec::new();
        for record in self.tables.stake_removals_by_block.iter(ctx.store())? {
            let ((block, _, _), info) = record?;
            if block > height || due.len() >= limit {
                break;
            }
            due.push(info);
        }
        Ok(due)
    }

    pub fn delegate_stake_removals_due(
        &self,
        ctx: &ExecutionContext,
        height: BlockHeight,
        limit: usize,
    ) -> Result<Vec<DelegateStakeRemovalInfo>> {
        let mut due = Vec::new();
        for record in self.tables.delegate_removals_by_block.iter(ctx.store())? {
            let ((block, _, _, _), info) = record?;
            if block > height || due.len() >= limit {
                break;
            }
            due.push(info);
        }
        Ok(due)
    }

    /// Deposit self stake for a registered reputer.
    pub fn add_stake(
        &mut self,
        ctx: &mut ExecutionContext,
        reputer: &ActorId,
        topic_id: TopicId,
        amount: TokenAmount,
    ) -> Result<()> {
        ctx.in_transaction(|ctx| {
            require_positive(amount)?;
            self.get_topic(ctx, topic_id)?;
            if !self.is_reputer_registered(ctx, topic_id, reputer)? {
                return Err(EmissionsError::NotRegistered {
                    topic_id,
                    actor: reputer.clone(),
                    kind: "reputer",
                });
            }

            let tables = &self.tables;
            let position = increase(ctx, &tables.stake_reputer, &(topic_id, reputer.clone()), amount)?;
            let topic_total = increase(ctx, &tables.topic_stake, &topic_id, amount)?;
            increase(ctx, &tables.total_stake, &(), amount)?;

            info!(
                topic_id,
                reputer = %reputer,
                amount = %amount,
                position = %position,
                topic_stake = %topic_total,
                "💰 Stake added"
            );

            let params = self.params(ctx)?;
            self.activate_topic_if_eligible(ctx, topic_id, &params)?;
            // last, so a failed ledger step never moves funds
            self.bank_mut()
                .send_to_module(reputer, ModuleAccount::Staking, amount)?;
            Ok(())
        })
    }

    /// Queue a self-stake withdrawal, replacing any pending one for this topic.
    pub fn remove_stake(
        &mut self,
        ctx: &mut ExecutionContext,
        reputer: &ActorId,
        topic_id: TopicId,
        amount: TokenAmount,
    ) -> Result<StakeRemovalInfo> {
        ctx.in_transaction(|ctx| {
            require_positive(amount)?;
            self.get_topic(ctx, topic_id)?;
            let available = self.get_reputer_stake(ctx, topic_id, reputer)?;
            if amount > available {
                return Err(EmissionsError::InsufficientStake {
                    requested: amount,
                    available,
                });
            }

            let params = self.params(ctx)?;
            let started = ctx.block_height();
            let info = StakeRemovalInfo {
                block_removal_started: started,
                block_removal_completed: started.saturating_add(params.remove_stake_delay_window),
                topic_id,
                reputer: reputer.clone(),
                amount,
            };

            let actor_key = (reputer.clone(), topic_id);
            if let Some(previous) = self
                .tables
                .stake_removals_by_actor
                .get(ctx.store(), &actor_key)?
            {
                self.tables
                    .stake_removals_by_block
                    .remove(ctx.store_mut(), &(previous, topic_id, reputer.clone()))?;
                debug!(topic_id, reputer = %reputer, previous_completion = previous, "🔄 Replacing pending stake removal");
            }
            self.tables.stake_removals_by_block.set(
                ctx.store_mut(),
                &(info.block_removal_completed, topic_id, reputer.clone()),
                &info,
            )?;
            self.tables
                .stake_removals_by_actor
                .set(ctx.store_mut(), &actor_key, &info.block_removal_completed)?;

            info!(
                topic_id,
                reputer = %reputer,
                amount = %amount,
                completes_at = info.block_removal_completed,
                "⏳ Stake removal queued"
            );
            Ok(info)
        })
    }

    /// Drop a pending self-stake withdrawal. No-op when none is pending.
    pub fn cancel_remove_stake(
        &mut self,
        ctx: &mut ExecutionContext,
        reputer: &ActorId,
        topic_id: TopicId,
    ) -> Result<bool> {
        ctx.in_transaction(|ctx| {
            let actor_key = (reputer.clone(), topic_id);
            let Some(block) = self
                .tables
                .stake_removals_by_actor
                .get(ctx.store(), &actor_key)?
            else {
                debug!(topic_id, reputer = %reputer, "No pending stake removal to cancel");
                return Ok(false);
            };
            self.tables
                .stake_removals_by_block
                .remove(ctx.store_mut(), &(block, topic_id, reputer.clone()))?;
            self.tables
                .stake_removals_by_actor
                .remove(ctx.store_mut(), &actor_key)?;
            info!(topic_id, reputer = %reputer, completion_block = block, "🔓 Stake removal cancelled");
            Ok(true)
        })
    }

    /// Delegate stake onto a registered reputer.
    pub fn add_delegate_stake(
        &mut self,
        ctx: &mut ExecutionContext,
        delegator: &ActorId,
        topic_id: TopicId,
        reputer: &ActorId,
        amount: TokenAmount,
    ) -> Result<()> {
        ctx.in_transaction(|ctx| {
            require_positive(amount)?;
            self.get_topic(ctx, topic_id)?;
            if !self.is_reputer_registered(ctx, topic_id, reputer)? {
                return Err(EmissionsError::NotRegistered {
                    topic_id,
                    actor: reputer.clone(),
                    kind: "reputer",
                });
            }

            let tables = &self.tables;
            let position = increase(
                ctx,
                &tables.stake_delegated,
                &(topic_id, delegator.clone(), reputer.clone()),
                amount,
            )?;
            increase(ctx, &tables.stake_upon_reputer, &(topic_id, reputer.clone()), amount)?;
            increase(ctx, &tables.stake_from_delegator, &(topic_id, delegator.clone()), amount)?;
            let topic_total = increase(ctx, &tables.topic_stake, &topic_id, amount)?;
            increase(ctx, &tables.total_stake, &(), amount)?;

            info!(
                topic_id,
                delegator = %delegator,
                reputer = %reputer,
                amount = %amount,
                position = %position,
                topic_stake = %topic_total,
                "💰 Delegate stake added"
            );

            let params = self.params(ctx)?;
            self.activate_topic_if_eligible(ctx, topic_id, &params)?;
            self.bank_mut()
                .send_to_module(delegator, ModuleAccount::Staking, amount)?;
            Ok(())
        })
    }

    pub fn remove_delegate_stake(
        &mut self,
        ctx: &mut ExecutionContext,
        delegator: &ActorId,
        topic_id: TopicId,
        reputer: &ActorId,
        amount: TokenAmount,
    ) -> Result<DelegateStakeRemovalInfo> {
        ctx.in_transaction(|ctx| {
            require_positive(amount)?;
            self.get_topic(ctx, topic_id)?;
            let available = self.get_delegate_stake(ctx, topic_id, delegator, reputer)?;
            if amount > available {
                return Err(EmissionsError::InsufficientStake {
                    requested: amount,
                    available,
                });
            }

            let params = self.params(ctx)?;
            let started = ctx.block_height();
            let info = DelegateStakeRemovalInfo {
                block_removal_started: started,
                block_removal_completed: started.saturating_add(params.remove_stake_delay_window),
                topic_id,
                delegator: delegator.clone(),
                reputer: reputer.clone(),
                amount,
            };

            let actor_key = (delegator.clone(), topic_id, reputer.clone());
            if let Some(previous) = self
                .tables
                .delegate_removals_by_actor
                .get(ctx.store(), &actor_key)?
            {
                self.tables.delegate_removals_by_block.remove(
                    ctx.store_mut(),
                    &(previous, topic_id, delegator.clone(), reputer.clone()),
                )?;
            }
            self.tables.delegate_removals_by_block.set(
                ctx.store_mut(),
                &(
                    info.block_removal_completed,
                    topic_id,
                    delegator.clone(),
                    reputer.clone(),
                ),
                &info,
            )?;
            self.tables.delegate_removals_by_actor.set(
                ctx.store_mut(),
                &actor_key,
                &info.block_removal_completed,
            )?;

            info!(
                topic_id,
                delegator = %delegator,
                reputer = %reputer,
                amount = %amount,
                completes_at = info.block_removal_completed,
                "⏳ Delegate stake removal queued"
            );
            Ok(info)
        })
    }

    pub fn cancel_remove_delegate_stake(
        &mut self,
        ctx: &mut ExecutionContext,
        delegator: &ActorId,
        topic_id: TopicId,
        reputer: &ActorId,
    ) -> Result<bool> {
        ctx.in_transaction(|ctx| {
            let actor_key = (delegator.clone(), topic_id, reputer.clone());
            let Some(block) = self
                .tables
                .delegate_removals_by_actor
                .get(ctx.store(), &actor_key)?
            else {
                return Ok(false);
            };
            self.tables.delegate_removals_by_block.remove(
                ctx.store_mut(),
                &(block, topic_id, delegator.clone(), reputer.clone()),
            )?;
            self.tables
                .delegate_removals_by_actor
                .remove(ctx.store_mut(), &actor_key)?;
            info!(
                topic_id,
                delegator = %delegator,
                reputer = %reputer,
                "🔓 Delegate stake removal cancelled"
            );
            Ok(true)
        })
    }

    /// Complete up to `cap` due self-stake removals in FIFO order.
    /// A position smaller than its request is fatal.
    pub fn process_due_stake_removals(
        &mut self,
        ctx: &mut ExecutionContext,
        cap: u64,
    ) -> Result<usize> {
        let due = self.stake_removals_due(ctx, ctx.block_height(), cap as usize)?;
        for removal in &due {
            let tables = &self.tables;
            decrease(
                ctx,
                &tables.stake_reputer,
                &(removal.topic_id, removal.reputer.clone()),
                removal.amount,
            )?;
            decrease(ctx, &tables.topic_stake, &removal.topic_id, removal.amount)?;
            decrease(ctx, &tables.total_stake, &(), removal.amount)?;
            tables.stake_removals_by_block.remove(
                ctx.store_mut(),
                &(
                    removal.block_removal_completed,
                    removal.topic_id,
                    removal.reputer.clone(),
                ),
            )?;
            tables
                .stake_removals_by_actor
                .remove(ctx.store_mut(), &(removal.reputer.clone(), removal.topic_id))?;

            self.bank_mut()
                .send_from_module(ModuleAccount::Staking, &removal.reputer, removal.amount)
                .map_err(|e| EmissionsError::StakeUnderflow(e.to_string()))?;

            info!(
                topic_id = removal.topic_id,
                reputer = %removal.reputer,
                amount = %removal.amount,
                "💸 Stake removed"
            );
        }
        Ok(due.len())
    }

    /// Complete up to `cap` due delegate-stake removals in FIFO order.
    pub fn process_due_delegate_stake_removals(
        &mut self,
        ctx: &mut ExecutionContext,
        cap: u64,
    ) -> Result<usize> {
        let due = self.delegate_stake_removals_due(ctx, ctx.block_height(), cap as usize)?;
        for removal in &due {
            let tables = &self.tables;
            decrease(
                ctx,
                &tables.stake_delegated,
                &(
                    removal.topic_id,
                    removal.delegator.clone(),
                    removal.reputer.clone(),
                ),
                removal.amount,
            )?;
            decrease(
                ctx,
                &tables.stake_upon_reputer,
                &(removal.topic_id, removal.reputer.clone()),
                removal.amount,
            )?;
            decrease(
                ctx,
                &tables.stake_from_delegator,
                &(removal.topic_id, removal.delegator.clone()),
                removal.amount,
            )?;
            decrease(ctx, &tables.topic_stake, &removal.topic_id, removal.amount)?;
            decrease(ctx, &tables.total_stake, &(), removal.amount)?;
            tables.delegate_removals_by_block.remove(
                ctx.store_mut(),
                &(
                    removal.block_removal_completed,
                    removal.topic_id,
                    removal.delegator.clone(),
                    removal.reputer.clone(),
                ),
            )?;
            tables.delegate_removals_by_actor.remove(
                ctx.store_mut(),
                &(
                    removal.delegator.clone(),
                    removal.topic_id,
                    removal.reputer.clone(),
                ),
            )?;

            self.bank_mut()
                .send_from_module(ModuleAccount::Staking, &removal.delegator, removal.amount)
                .map_err(|e| EmissionsError::StakeUnderflow(e.to_string()))?;

            info!(
                topic_id = removal.topic_id,
                delegator = %removal.delegator,
                reputer = %removal.reputer,
                amount = %removal.amount,
                "💸 Delegate stake removed"
            );
        }
        Ok(due.len())
    }

    /// All self-stake positions of a topic.
    pub fn reputer_stakes(
        &self,
        ctx: &ExecutionContext,
        topic_id: TopicId,
    ) -> Result<Vec<(ActorId, TokenAmount)>> {
        Ok(self
            .tables
            .stake_reputer
            .iter_prefix(ctx.store(), &topic_id)?
            .map(|r| r.map(|((_, reputer), amount)| (reputer, amount)))
            .collect::<StorageResult<Vec<_>>>()?)
    }
}
