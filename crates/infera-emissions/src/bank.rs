use crate::error::{EmissionsError, Result};
use infera_types::{ActorId, TokenAmount};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Accounts owned by the emissions module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModuleAccount {
    /// Escrow for self and delegated stake
    Staking,
    /// Topic creation, registration and funding fees
    EcosystemFees,
    /// Pool that per-block emissions are paid from
    Rewards,
}

/// Token movements the keeper depends on. Calls either fully succeed or
/// fail without moving anything.
pub trait BankKeeper {
    fn balance(&self, account: &ActorId) -> TokenAmount;

    fn module_balance(&self, module: ModuleAccount) -> TokenAmount;

    fn send_to_module(
        &mut self,
        from: &ActorId,
        module: ModuleAccount,
        amount: TokenAmount,
    ) -> Result<()>;

    fn send_from_module(
        &mut self,
        module: ModuleAccount,
        to: &ActorId,
        amount: TokenAmount,
    ) -> Result<()>;
}

/// Balance book kept in memory; used by the replay node and tests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryBank {
    accounts: BTreeMap<ActorId, TokenAmount>,
    modules: BTreeMap<ModuleAccount, TokenAmount>,
}

impl MemoryBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint `amount` into an account.
    pub fn credit(&mut self, account: &ActorId, amount: TokenAmount) -> Result<()> {
        let current = self.balance(account);
        let updated = current
            .checked_add(amount)
            .ok_or_else(|| EmissionsError::Bank(format!("balance overflow for {}", account)))?;
        self.accounts.insert(account.clone(), updated);
        info!(
            address = %account,
            amount = %amount,
            balance_after = %updated,
            "💰 Balance credited"
        );
        Ok(())
    }

    /// Mint `amount` into a module account.
    pub fn credit_module(&mut self, module: ModuleAccount, amount: TokenAmount) -> Result<()> {
        let updated = self
            .module_balance(module)
            .checked_add(amount)
            .ok_or_else(|| EmissionsError::Bank(format!("balance overflow for {:?}", module)))?;
        self.modules.insert(module, updated);
        Ok(())
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&ActorId, &TokenAmount)> {
        self.accounts.iter()
    }

    pub fn modules(&self) -> impl Iterator<Item = (&ModuleAccount, &TokenAmount)> {
        self.modules.iter()
    }

    pub fn total_supply(&self) -> u128 {
        self.accounts
            .values()
            .chain(self.modules.values())
            .map(|a| a.units())
            .sum()
    }
}

impl BankKeeper for MemoryBank {
    fn balance(&self, account: &ActorId) -> TokenAmount {
        self.accounts.get(account).copied().unwrap_or(TokenAmount::ZERO)
    }

    fn module_balance(&self, module: ModuleAccount) -> TokenAmount {
        self.modules.get(&module).copied().unwrap_or(TokenAmount::ZERO)
    }

    fn send_to_module(
        &mut self,
        from: &ActorId,
        module: ModuleAccount,
        amount: TokenAmount,
    ) -> Result<()> {
        let balance = self.balance(from);
        let remaining = balance.checked_sub(amount).ok_or_else(|| {
            EmissionsError::Bank(format!(
                "insufficient balance for {}: has {}, needs {}",
                from, balance, amount
            ))
        })?;
        let module_after = self
            .module_balance(module)
            .checked_add(amount)
            .ok_or_else(|| EmissionsError::Bank(format!("balance overflow for {:?}", module)))?;

        self.accounts.insert(from.clone(), remaining);
        self.modules.insert(module, module_after);
        debug!(
            from = %from,
            module = ?module,
            amount = %amount,
            "💸 Sent to module"
        );
        Ok(())
    }

    fn send_from_module(
        &mut self,
        module: ModuleAccount,
        to: &ActorId,
        amount: TokenAmount,
    ) -> Result<()> {
        let module_balance = self.module_balance(module);
        let module_after = module_balance.checked_sub(amount).ok_or_else(|| {
            EmissionsError::Bank(format!(
                "insufficient module balance for {:?}: has {}, needs {}",
                module, module_balance, amount
            ))
        })?;
        let recipient_after = self
            .balance(to)
            .checked_add(amount)
            .ok_or_else(|| EmissionsError::Bank(format!("balance overflow for {}", to)))?;

        self.modules.insert(module, module_after);
        self.accounts.insert(to.clone(), recipient_after);
        debug!(
            module = ?module,
            to = %to,
            amount = %amount,
            "💰 Sent from module"
        );
        Ok(())
    }
}
