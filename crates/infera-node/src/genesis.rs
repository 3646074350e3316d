//! Replay genesis: opening balances, keeper state and the transactions to
//! replay, keyed by the height they are delivered at.

use anyhow::{bail, Context, Result};
use infera_emissions::{GenesisState, MemoryBank, ModuleAccount, Msg, MsgCreateNewTopic};
use infera_math::Dec;
use infera_types::{
    ActorId, BlockHeight, Inference, RegistrationKind, ReputerValueBundle, TokenAmount,
    WorkerAttributedValue, WorkerPayload,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// A message delivered by `sender` in block `height`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTx {
    pub height: BlockHeight,
    pub sender: ActorId,
    pub msg: Msg,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeGenesis {
    pub chain_id: String,
    /// First block that is built on top of the genesis state
    pub initial_height: BlockHeight,
    pub accounts: Vec<(ActorId, TokenAmount)>,
    #[serde(default)]
    pub modules: Vec<(ModuleAccount, TokenAmount)>,
    /// Senders allowed to update module params
    #[serde(default)]
    pub admins: Vec<ActorId>,
    #[serde(default)]
    pub emissions: GenesisState,
    #[serde(default)]
    pub txs: Vec<ScheduledTx>,
}

impl NodeGenesis {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading genesis {}", path.display()))?;
        let genesis: Self = serde_json::from_str(&content)
            .with_context(|| format!("parsing genesis {}", path.display()))?;
        Ok(genesis)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn verify(&self) -> Result<()> {
        if self.chain_id.is_empty() {
            bail!("chain id must not be empty");
        }
        if self.initial_height == 0 {
            bail!("initial height must be at least 1");
        }
        let mut seen = BTreeSet::new();
        for (account, _) in &self.accounts {
            if !seen.insert(account) {
                bail!("account {} allocated twice", account);
            }
        }
        let mut modules = BTreeSet::new();
        for (module, _) in &self.modules {
            if !modules.insert(module) {
                bail!("module account {:?} allocated twice", module);
            }
        }
        self.emissions
            .validate()
            .context("emissions genesis state is inconsistent")?;
        if let Some(tx) = self.txs.iter().find(|tx| tx.height < self.initial_height) {
            bail!(
                "{} from {} scheduled at {} before initial height {}",
                tx.msg.name(),
                tx.sender,
                tx.height,
                self.initial_height
            );
        }
        Ok(())
    }

    /// Opening balances as an in-memory bank.
    pub fn build_bank(&self) -> Result<MemoryBank> {
        let mut bank = MemoryBank::new();
        for (account, amount) in &self.accounts {
            bank.credit(account, *amount)?;
        }
        for (module, amount) in &self.modules {
            bank.credit_module(*module, *amount)?;
        }
        Ok(bank)
    }

    pub fn total_supply(&self) -> u128 {
        self.accounts
            .iter()
            .map(|(_, a)| a.units())
            .chain(self.modules.iter().map(|(_, a)| a.units()))
            .sum()
    }

    /// Height of the last scheduled transaction, if any.
    pub fn last_tx_height(&self) -> Option<BlockHeight> {
        self.txs.iter().map(|tx| tx.height).max()
    }

    pub fn calculate_hash(&self) -> Result<String> {
        let encoded = serde_json::to_vec(self)?;
        Ok(hex::encode(blake3::hash(&encoded).as_bytes()))
    }

    /// A small local network: one topic, three workers and two reputers
    /// driven through a full epoch with prefunded rewards.
    pub fn devnet() -> Result<Self> {
        let account = |byte: u8| ActorId::from_bytes(&[byte; 20]);
        let creator = account(1)?;
        let workers = [account(2)?, account(3)?, account(4)?];
        let reputers = [account(10)?, account(11)?];

        let mut accounts = vec![(creator.clone(), TokenAmount::new(1_000_000))];
        for actor in workers.iter().chain(reputers.iter()) {
            accounts.push((actor.clone(), TokenAmount::new(1_000_000)));
        }

        let dec = |s: &str| -> Result<Dec> { Ok(s.parse::<Dec>()?) };
        let topic = MsgCreateNewTopic {
            metadata: "devnet price feed".to_string(),
            loss_method: "mse".to_string(),
            epoch_length: 10,
            ground_truth_lag: 10,
            worker_submission_window: 5,
            p_norm: dec("3")?,
            alpha_regret: dec("0.1")?,
            allow_negative: false,
            epsilon: dec("0.01")?,
            merit_sortition_alpha: dec("0.1")?,
            active_inferer_quantile: dec("0.25")?,
            active_forecaster_quantile: dec("0.25")?,
            active_reputer_quantile: dec("0.25")?,
            enable_worker_whitelist: false,
            enable_reputer_whitelist: false,
        };

        let mut txs = vec![ScheduledTx {
            height: 1,
            sender: creator.clone(),
            msg: Msg::CreateNewTopic(topic),
        }];
        for worker in &workers {
            txs.push(ScheduledTx {
                height: 1,
                sender: worker.clone(),
                msg: Msg::Register {
                    topic_id: 1,
                    kind: RegistrationKind::Worker,
                },
            });
        }
        for reputer in &reputers {
            txs.push(ScheduledTx {
                height: 1,
                sender: reputer.clone(),
                msg: Msg::Register {
                    topic_id: 1,
                    kind: RegistrationKind::Reputer,
                },
            });
            txs.push(ScheduledTx {
                height: 1,
                sender: reputer.clone(),
                msg: Msg::AddStake {
                    topic_id: 1,
                    amount: TokenAmount::new(20_000),
                },
            });
        }

        // first epoch opens at 11; ground truth arrives ten blocks later
        for (worker, value) in workers.iter().zip(["101.5", "99.0", "100.2"]) {
            txs.push(ScheduledTx {
                height: 12,
                sender: worker.clone(),
                msg: Msg::InsertWorkerPayload(WorkerPayload {
                    topic_id: 1,
                    worker_nonce: 11,
                    inference: Some(Inference {
                        topic_id: 1,
                        block_height: 11,
                        inferer: worker.clone(),
                        value: dec(value)?,
                    }),
                    forecast: None,
                }),
            });
        }
        let losses = |pairs: [&str; 3]| -> Result<Vec<WorkerAttributedValue>> {
            workers
                .iter()
                .zip(pairs)
                .map(|(worker, value)| {
                    Ok(WorkerAttributedValue {
                        worker: worker.clone(),
                        value: dec(value)?,
                    })
                })
                .collect()
        };
        for (reputer, combined) in reputers.iter().zip(["0.70", "0.72"]) {
            txs.push(ScheduledTx {
                height: 21,
                sender: reputer.clone(),
                msg: Msg::InsertReputerPayload(ReputerValueBundle {
                    topic_id: 1,
                    worker_nonce: 11,
                    reputer: reputer.clone(),
                    combined_value: dec(combined)?,
                    naive_value: dec("0.9")?,
                    inferer_values: losses(["0.5", "1.0", "2.0"])?,
                    forecaster_values: Vec::new(),
                    one_out_inferer_values: losses(["0.9", "0.75", "0.7"])?,
                    one_out_forecaster_values: Vec::new(),
                    one_in_forecaster_values: Vec::new(),
                }),
            });
        }

        Ok(Self {
            chain_id: "infera-devnet".to_string(),
            initial_height: 1,
            accounts,
            modules: vec![(ModuleAccount::Rewards, TokenAmount::new(50_000_000))],
            admins: vec![creator],
            emissions: GenesisState::default(),
            txs,
        })
    }
}
