//! Inbound message handlers.
//!
//! Each handler validates its input, asks the permission oracle and runs
//! inside a store transaction. Funds move through the bank as the last
//! fallible step, so a rejected message neither writes state nor moves funds.

use crate::bank::ModuleAccount;
use crate::context::ExecutionContext;
use crate::error::{EmissionsError, Result};
use crate::keeper::EmissionsKeeper;
use infera_math::Dec;
use infera_types::{
    ActorId, ActorRole, CyclePhase, Params, RegistrationKind, ReputerValueBundle, TokenAmount,
    Topic, TopicId, WorkerAttributedValue, WorkerPayload,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgCreateNewTopic {
    pub metadata: String,
    pub loss_method: String,
    pub epoch_length: u64,
    pub ground_truth_lag: u64,
    pub worker_submission_window: u64,
    pub p_norm: Dec,
    pub alpha_regret: Dec,
    pub allow_negative: bool,
    pub epsilon: Dec,
    pub merit_sortition_alpha: Dec,
    pub active_inferer_quantile: Dec,
    pub active_forecaster_quantile: Dec,
    pub active_reputer_quantile: Dec,
    #[serde(default)]
    pub enable_worker_whitelist: bool,
    #[serde(default)]
    pub enable_reputer_whitelist: bool,
}

impl MsgCreateNewTopic {
    fn into_topic(self, id: TopicId, creator: ActorId, height: u64) -> Topic {
        Topic {
            id,
            creator,
            metadata: self.metadata,
            loss_method: self.loss_method,
            epoch_last_ended: height,
            epoch_length: self.epoch_length,
            ground_truth_lag: self.ground_truth_lag,
            worker_submission_window: self.worker_submission_window,
            p_norm: self.p_norm,
            alpha_regret: self.alpha_regret,
            allow_negative: self.allow_negative,
            epsilon: self.epsilon,
            initial_regret: Dec::ZERO,
            merit_sortition_alpha: self.merit_sortition_alpha,
            active_inferer_quantile: self.active_inferer_quantile,
            active_forecaster_quantile: self.active_forecaster_quantile,
            active_reputer_quantile: self.active_reputer_quantile,
            enable_worker_whitelist: self.enable_worker_whitelist,
            enable_reputer_whitelist: self.enable_reputer_whitelist,
        }
    }
}

/// Every message the module accepts, as carried in a replayed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Msg {
    CreateNewTopic(MsgCreateNewTopic),
    FundTopic {
        topic_id: TopicId,
        amount: TokenAmount,
    },
    Register {
        topic_id: TopicId,
        kind: RegistrationKind,
    },
    RemoveRegistration {
        topic_id: TopicId,
        kind: RegistrationKind,
    },
    AddStake {
        topic_id: TopicId,
        amount: TokenAmount,
    },
    RemoveStake {
        topic_id: TopicId,
        amount: TokenAmount,
    },
    CancelRemoveStake {
        topic_id: TopicId,
    },
    DelegateStake {
        topic_id: TopicId,
        reputer: ActorId,
        amount: TokenAmount,
    },
    RemoveDelegateStake {
        topic_id: TopicId,
        reputer: ActorId,
        amount: TokenAmount,
    },
    CancelRemoveDelegateStake {
        topic_id: TopicId,
        reputer: ActorId,
    },
    InsertWorkerPayload(WorkerPayload),
    InsertReputerPayload(ReputerValueBundle),
    UpdateParams(Params),
}

impl Msg {
    pub fn name(&self) -> &'static str {
        match self {
            Msg::CreateNewTopic(_) => "create_new_topic",
            Msg::FundTopic { .. } => "fund_topic",
            Msg::Register { .. } => "register",
            Msg::RemoveRegistration { .. } => "remove_registration",
            Msg::AddStake { .. } => "add_stake",
            Msg::RemoveStake { .. } => "remove_stake",
            Msg::CancelRemoveStake { .. } => "cancel_remove_stake",
            Msg::DelegateStake { .. } => "delegate_stake",
            Msg::RemoveDelegateStake { .. } => "remove_delegate_stake",
            Msg::CancelRemoveDelegateStake { .. } => "cancel_remove_delegate_stake",
            Msg::InsertWorkerPayload(_) => "insert_worker_payload",
            Msg::InsertReputerPayload(_) => "insert_reputer_payload",
            Msg::UpdateParams(_) => "update_params",
        }
    }
}

fn kind_label(kind: RegistrationKind) -> &'static str {
    match kind {
        RegistrationKind::Worker => "worker",
        RegistrationKind::Reputer => "reputer",
    }
}

fn reject_duplicates(label: &str, values: &[WorkerAttributedValue]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for v in values {
        if !seen.insert(&v.worker) {
            return Err(EmissionsError::InvalidPayload(format!(
                "{} lists {} more than once",
                label, v.worker
            )));
        }
    }
    Ok(())
}

impl EmissionsKeeper {
    pub fn create_new_topic(
        &mut self,
        ctx: &mut ExecutionContext,
        creator: &ActorId,
        msg: MsgCreateNewTopic,
    ) -> Result<TopicId> {
        ctx.in_transaction(|ctx| {
            if !self.permissions().can_create_topic(creator) {
                return Err(EmissionsError::NotPermitted {
                    actor: creator.clone(),
                    action: "create topics",
                });
            }
            let params = self.params(ctx)?;
            let id = self.next_topic_id(ctx)?;
            let topic = msg.into_topic(id, creator.clone(), ctx.block_height());
            topic.validate(&params)?;

            self.claim_topic_id(ctx)?;
            self.set_topic(ctx, &topic)?;
            self.add_topic_fee_revenue(ctx, id, params.create_topic_fee)?;
            self.activate_topic_if_eligible(ctx, id, &params)?;
            self.bank_mut()
                .send_to_module(creator, ModuleAccount::EcosystemFees, params.create_topic_fee)?;
            info!(
                topic_id = id,
                creator = %creator,
                epoch_length = topic.epoch_length,
                "🆕 Topic created"
            );
            Ok(id)
        })
    }

    pub fn fund_topic(
        &mut self,
        ctx: &mut ExecutionContext,
        sender: &ActorId,
        topic_id: TopicId,
        amount: TokenAmount,
    ) -> Result<()> {
        ctx.in_transaction(|ctx| {
            if amount.is_zero() {
                return Err(EmissionsError::InvalidAmount(
                    "funding must be greater than zero".to_string(),
                ));
            }
            self.get_topic(ctx, topic_id)?;
            let revenue = self.add_topic_fee_revenue(ctx, topic_id, amount)?;
            let params = self.params(ctx)?;
            self.activate_topic_if_eligible(ctx, topic_id, &params)?;
            self.bank_mut()
                .send_to_module(sender, ModuleAccount::EcosystemFees, amount)?;
            info!(topic_id, sender = %sender, amount = %amount, revenue = %revenue, "💵 Topic funded");
            Ok(())
        })
    }

    pub fn register(
        &mut self,
        ctx: &mut ExecutionContext,
        sender: &ActorId,
        topic_id: TopicId,
        kind: RegistrationKind,
    ) -> Result<()> {
        ctx.in_transaction(|ctx| {
            let topic = self.get_topic(ctx, topic_id)?;
            let (permitted, registered) = match kind {
                RegistrationKind::Worker => (
                    self.permissions().can_register_worker(&topic, sender),
                    self.is_worker_registered(ctx, topic_id, sender)?,
                ),
                RegistrationKind::Reputer => (
                    self.permissions().can_register_reputer(&topic, sender),
                    self.is_reputer_registered(ctx, topic_id, sender)?,
                ),
            };
            if !permitted {
                return Err(EmissionsError::NotPermitted {
                    actor: sender.clone(),
                    action: "register in this topic",
                });
            }
            if registered {
                return Err(EmissionsError::AlreadyRegistered {
                    topic_id,
                    actor: sender.clone(),
                    kind: kind_label(kind),
                });
            }

            let params = self.params(ctx)?;
            let table = match kind {
                RegistrationKind::Worker => &self.tables.topic_workers,
                RegistrationKind::Reputer => &self.tables.topic_reputers,
            };
            table.set(ctx.store_mut(), &(topic_id, sender.clone()), &())?;
            self.add_topic_fee_revenue(ctx, topic_id, params.registration_fee)?;
            self.activate_topic_if_eligible(ctx, topic_id, &params)?;
            self.bank_mut()
                .send_to_module(sender, ModuleAccount::EcosystemFees, params.registration_fee)?;
            info!(topic_id, actor = %sender, kind = kind_label(kind), "📝 Registered");
            Ok(())
        })
    }

    /// Drop a registration. Stake and pending removals are untouched.
    pub fn remove_registration(
        &mut self,
        ctx: &mut ExecutionContext,
        sender: &ActorId,
        topic_id: TopicId,
        kind: RegistrationKind,
    ) -> Result<()> {
        ctx.in_transaction(|ctx| {
            self.get_topic(ctx, topic_id)?;
            let (table, roles) = match kind {
                RegistrationKind::Worker => (
                    &self.tables.topic_workers,
                    &[ActorRole::Inferer, ActorRole::Forecaster][..],
                ),
                RegistrationKind::Reputer => (&self.tables.topic_reputers, &[ActorRole::Reputer][..]),
            };
            let key = (topic_id, sender.clone());
            if !table.has(ctx.store(), &key)? {
                return Err(EmissionsError::NotRegistered {
                    topic_id,
                    actor: sender.clone(),
                    kind: kind_label(kind),
                });
            }
            table.remove(ctx.store_mut(), &key)?;
            for role in roles {
                self.remove_from_active_set(ctx, topic_id, *role, sender)?;
            }
            info!(topic_id, actor = %sender, kind = kind_label(kind), "👋 Registration removed");
            Ok(())
        })
    }

    pub fn insert_worker_payload(
        &mut self,
        ctx: &mut ExecutionContext,
        sender: &ActorId,
        payload: WorkerPayload,
    ) -> Result<()> {
        ctx.in_transaction(|ctx| {
            let height = ctx.block_height();
            let topic = self.get_topic(ctx, payload.topic_id)?;
            let nonce = payload.worker_nonce;
            self.require_cycle(ctx, topic.id, nonce, CyclePhase::WindowOpen)?;
            if height < nonce || height > topic.worker_window_end(nonce) {
                return Err(EmissionsError::WindowClosed {
                    topic_id: topic.id,
                    nonce,
                    height,
                });
            }
            if !self.is_worker_registered(ctx, topic.id, sender)? {
                return Err(EmissionsError::NotRegistered {
                    topic_id: topic.id,
                    actor: sender.clone(),
                    kind: "worker",
                });
            }
            if !self.permissions().can_submit_worker_payload(&topic, sender) {
                return Err(EmissionsError::NotPermitted {
                    actor: sender.clone(),
                    action: "submit worker payloads",
                });
            }
            if payload.inference.is_none() && payload.forecast.is_none() {
                return Err(EmissionsError::InvalidPayload(
                    "payload carries neither an inference nor a forecast".to_string(),
                ));
            }

            let params = self.params(ctx)?;
            let key = (topic.id, nonce, sender.clone());
            let mut roles = Vec::new();
            if let Some(mut inference) = payload.inference {
                if inference.inferer != *sender || inference.topic_id != topic.id {
                    return Err(EmissionsError::InvalidPayload(
                        "inference must be signed by the sender for this topic".to_string(),
                    ));
                }
                inference.block_height = nonce;
                self.tables.inferences.set(ctx.store_mut(), &key, &inference)?;
                roles.push(ActorRole::Inferer);
            }
            if let Some(mut forecast) = payload.forecast {
                if forecast.forecaster != *sender || forecast.topic_id != topic.id {
                    return Err(EmissionsError::InvalidPayload(
                        "forecast must be signed by the sender for this topic".to_string(),
                    ));
                }
                if forecast.elements.is_empty()
                    || forecast.elements.len() as u64 > params.max_elements_per_forecast
                {
                    return Err(EmissionsError::InvalidPayload(format!(
                        "forecast must have between 1 and {} elements",
                        params.max_elements_per_forecast
                    )));
                }
                let mut seen = BTreeSet::new();
                if !forecast.elements.iter().all(|e| seen.insert(&e.inferer)) {
                    return Err(EmissionsError::InvalidPayload(
                        "forecast names an inferer more than once".to_string(),
                    ));
                }
                forecast.block_height = nonce;
                self.tables.forecasts.set(ctx.store_mut(), &key, &forecast)?;
                roles.push(ActorRole::Forecaster);
            }

            for role in roles {
                if let Some(score) = self.get_score(ctx, topic.id, role, sender)? {
                    self.try_admit(ctx, &topic, role, &score)?;
                }
            }
            info!(topic_id = topic.id, nonce, worker = %sender, "📨 Worker payload stored");
            Ok(())
        })
    }

    pub fn insert_reputer_payload(
        &mut self,
        ctx: &mut ExecutionContext,
        sender: &ActorId,
        bundle: ReputerValueBundle,
    ) -> Result<()> {
        ctx.in_transaction(|ctx| {
            let height = ctx.block_height();
            let topic = self.get_topic(ctx, bundle.topic_id)?;
            let nonce = bundle.worker_nonce;
            match self.get_cycle(ctx, topic.id, nonce)? {
                Some(cycle) if cycle.phase != CyclePhase::RewardReady => {}
                _ => {
                    return Err(EmissionsError::CycleNotFound {
                        topic_id: topic.id,
                        nonce,
                    })
                }
            }
            if height < topic.reputer_window_start(nonce) || height > topic.reputer_window_end(nonce) {
                return Err(EmissionsError::WindowClosed {
                    topic_id: topic.id,
                    nonce,
                    height,
                });
            }
            if bundle.reputer != *sender {
                return Err(EmissionsError::InvalidPayload(
                    "bundle must be signed by the sending reputer".to_string(),
                ));
            }
            if !self.is_reputer_registered(ctx, topic.id, sender)? {
                return Err(EmissionsError::NotRegistered {
                    topic_id: topic.id,
                    actor: sender.clone(),
                    kind: "reputer",
                });
            }
            if !self.permissions().can_submit_reputer_payload(&topic, sender) {
                return Err(EmissionsError::NotPermitted {
                    actor: sender.clone(),
                    action: "submit reputer payloads",
                });
            }
            let params = self.params(ctx)?;
            let authority = self.get_reputer_authority(ctx, topic.id, sender)?;
            if authority < params.required_minimum_stake {
                return Err(EmissionsError::InsufficientStake {
                    requested: params.required_minimum_stake,
                    available: authority,
                });
            }
            reject_duplicates("inferer values", &bundle.inferer_values)?;
            reject_duplicates("forecaster values", &bundle.forecaster_values)?;
            reject_duplicates("one-out inferer values", &bundle.one_out_inferer_values)?;
            reject_duplicates("one-out forecaster values", &bundle.one_out_forecaster_values)?;

            self.tables
                .reputer_bundles
                .set(ctx.store_mut(), &(topic.id, nonce, sender.clone()), &bundle)?;
            if let Some(score) = self.get_score(ctx, topic.id, ActorRole::Reputer, sender)? {
                self.try_admit(ctx, &topic, ActorRole::Reputer, &score)?;
            }
            info!(topic_id = topic.id, nonce, reputer = %sender, "📨 Reputer bundle stored");
            Ok(())
        })
    }

    pub fn update_params(
        &mut self,
        ctx: &mut ExecutionContext,
        sender: &ActorId,
        params: Params,
    ) -> Result<()> {
        ctx.in_transaction(|ctx| {
            if !self.permissions().can_update_params(sender) {
                return Err(EmissionsError::NotPermitted {
                    actor: sender.clone(),
                    action: "update module params",
                });
            }
            self.set_params(ctx, &params)
        })
    }

    /// Route a decoded message from `sender` to its handler.
    pub fn dispatch(&mut self, ctx: &mut ExecutionContext, sender: &ActorId, msg: Msg) -> Result<()> {
        match msg {
            Msg::CreateNewTopic(m) => self.create_new_topic(ctx, sender, m).map(|_| ()),
            Msg::FundTopic { topic_id, amount } => self.fund_topic(ctx, sender, topic_id, amount),
            Msg::Register { topic_id, kind } => self.register(ctx, sender, topic_id, kind),
            Msg::RemoveRegistration { topic_id, kind } => {
                self.remove_registration(ctx, sender, topic_id, kind)
            }
            Msg::AddStake { topic_id, amount } => self.add_stake(ctx, sender, topic_id, amount),
            Msg::RemoveStake { topic_id, amount } => {
                self.remove_stake(ctx, sender, topic_id, amount).map(|_| ())
            }
            Msg::CancelRemoveStake { topic_id } => {
                self.cancel_remove_stake(ctx, sender, topic_id).map(|_| ())
            }
            Msg::DelegateStake {
                topic_id,
                reputer,
                amount,
            } => self.add_delegate_stake(ctx, sender, topic_id, &reputer, amount),
            Msg::RemoveDelegateStake {
                topic_id,
                reputer,
                amount,
            } => self
                .remove_delegate_stake(ctx, sender, topic_id, &reputer, amount)
                .map(|_| ()),
            Msg::CancelRemoveDelegateStake { topic_id, reputer } => self
                .cancel_remove_delegate_stake(ctx, sender, topic_id, &reputer)
                .map(|_| ()),
            Msg::InsertWorkerPayload(payload) => self.insert_worker_payload(ctx, sender, payload),
            Msg::InsertReputerPayload(bundle) => self.insert_reputer_payload(ctx, sender, bundle),
            Msg::UpdateParams(params) => self.update_params(ctx, sender, params),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{actor, dec, new_keeper, FUNDED_BALANCE};
    use infera_storage::MemoryBackend;
    use infera_types::{EpochCycle, Forecast, ForecastElement, Inference};

    fn topic_msg() -> MsgCreateNewTopic {
        MsgCreateNewTopic {
            metadata: "BTC 24h".to_string(),
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

    #[test]
    fn test_create_topic_charges_fee_and_records_revenue() {
        let mut keeper = new_keeper();
        let mut store = MemoryBackend::new();
        let mut ctx = ExecutionContext::new(7, &mut store);
        let id = keeper.create_new_topic(&mut ctx, &actor(1), topic_msg()).unwrap();
        assert_eq!(id, 1);
        let topic = keeper.get_topic(&ctx, id).unwrap();
        assert_eq!(topic.epoch_last_ended, 7);
        assert_eq!(topic.creator, actor(1));
        assert_eq!(keeper.bank().balance(&actor(1)), TokenAmount::new(FUNDED_BALANCE - 10));
        assert_eq!(keeper.get_fee_revenue(&ctx, id).unwrap().amount, TokenAmount::new(10));

        let mut bad = topic_msg();
        bad.worker_submission_window = 0;
        assert!(keeper.create_new_topic(&mut ctx, &actor(1), bad).is_err());
        // failed creation neither charges nor burns an id
        assert_eq!(keeper.next_topic_id(&ctx).unwrap(), 2);
        assert_eq!(keeper.bank().balance(&actor(1)), TokenAmount::new(FUNDED_BALANCE - 10));
    }

    #[test]
    fn test_registration_rules() {
        let mut keeper = new_keeper();
        let mut store = MemoryBackend::new();
        let mut ctx = ExecutionContext::new(7, &mut store);
        let id = keeper.create_new_topic(&mut ctx, &actor(1), topic_msg()).unwrap();
        keeper.register(&mut ctx, &actor(2), id, RegistrationKind::Worker).unwrap();
        assert!(matches!(
            keeper.register(&mut ctx, &actor(2), id, RegistrationKind::Worker),
            Err(EmissionsError::AlreadyRegistered { .. })
        ));
        keeper.register(&mut ctx, &actor(2), id, RegistrationKind::Reputer).unwrap();
        keeper
            .remove_registration(&mut ctx, &actor(2), id, RegistrationKind::Worker)
            .unwrap();
        assert!(!keeper.is_worker_registered(&ctx, id, &actor(2)).unwrap());
        assert!(keeper.is_reputer_registered(&ctx, id, &actor(2)).unwrap());
        assert!(keeper
            .remove_registration(&mut ctx, &actor(2), id, RegistrationKind::Worker)
            .is_err());
    }

    #[test]
    fn test_worker_payload_validation() {
        let mut keeper = new_keeper();
        let mut store = MemoryBackend::new();
        let mut ctx = ExecutionContext::new(10, &mut store);
        let id = keeper.create_new_topic(&mut ctx, &actor(1), topic_msg()).unwrap();
        keeper.register(&mut ctx, &actor(2), id, RegistrationKind::Worker).unwrap();

        let payload = WorkerPayload {
            topic_id: id,
            worker_nonce: 10,
            inference: Some(Inference { topic_id: id, block_height: 0, inferer: actor(2), value: dec("1.5") }),
            forecast: None,
        };
        assert!(matches!(
            keeper.insert_worker_payload(&mut ctx, &actor(2), payload.clone()),
            Err(EmissionsError::CycleNotFound { .. })
        ));

        keeper
            .tables
            .cycles
            .set(
                ctx.store_mut(),
                &(id, 10),
                &EpochCycle { topic_id: id, worker_nonce: 10, phase: CyclePhase::WindowOpen },
            )
            .unwrap();
        assert!(matches!(
            keeper.insert_worker_payload(&mut ctx, &actor(3), payload.clone()),
            Err(EmissionsError::NotRegistered { .. })
        ));
        keeper.insert_worker_payload(&mut ctx, &actor(2), payload).unwrap();
        let stored = keeper.tables.inferences.get(ctx.store(), &(id, 10, actor(2))).unwrap().unwrap();
        assert_eq!(stored.block_height, 10);

        let duplicate = WorkerPayload {
            topic_id: id,
            worker_nonce: 10,
            inference: None,
            forecast: Some(Forecast {
                topic_id: id,
                block_height: 10,
                forecaster: actor(2),
                elements: vec![
                    ForecastElement { inferer: actor(5), value: dec("1") },
                    ForecastElement { inferer: actor(5), value: dec("2") },
                ],
            }),
        };
        assert!(matches!(
            keeper.insert_worker_payload(&mut ctx, &actor(2), duplicate),
            Err(EmissionsError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_worker_window_closes() {
        let mut keeper = new_keeper();
        let mut store = MemoryBackend::new();
        let id;
        {
            let mut ctx = ExecutionContext::new(10, &mut store);
            id = keeper.create_new_topic(&mut ctx, &actor(1), topic_msg()).unwrap();
            keeper.register(&mut ctx, &actor(2), id, RegistrationKind::Worker).unwrap();
            keeper
                .tables
                .cycles
                .set(
                    ctx.store_mut(),
                    &(id, 10),
                    &EpochCycle { topic_id: id, worker_nonce: 10, phase: CyclePhase::WindowOpen },
                )
                .unwrap();
        }
        let mut ctx = ExecutionContext::new(16, &mut store);
        let payload = WorkerPayload {
            topic_id: id,
            worker_nonce: 10,
            inference: Some(Inference { topic_id: id, block_height: 10, inferer: actor(2), value: dec("1") }),
            forecast: None,
        };
        assert!(matches!(
            keeper.insert_worker_payload(&mut ctx, &actor(2), payload),
            Err(EmissionsError::WindowClosed { height: 16, .. })
        ));
    }

    #[test]
    fn test_update_params_requires_permission() {
        let mut keeper = new_keeper();
        let mut store = MemoryBackend::new();
        let mut ctx = ExecutionContext::new(1, &mut store);
        let params = Params::default();
        assert!(matches!(
            keeper.update_params(&mut ctx, &actor(1), params.clone()),
            Err(EmissionsError::NotPermitted { .. })
        ));
        keeper.set_permissions(Box::new(crate::OpenPermissions::new().with_admin(actor(1))));
        keeper.update_params(&mut ctx, &actor(1), params).unwrap();
    }

    #[test]
    fn test_msg_json_shape() {
        let msg = Msg::AddStake { topic_id: 3, amount: TokenAmount::new(50) };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "add_stake");
        assert_eq!(json["amount"], "50");
        let back: Msg = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
        assert_eq!(back.name(), "add_stake");

        // amounts past u64 go through the tagged-enum buffer as strings
        let big = Msg::DelegateStake {
            topic_id: 3,
            reputer: actor(9),
            amount: TokenAmount::new(5 * 10u128.pow(24)),
        };
        let text = serde_json::to_string(&big).unwrap();
        assert_eq!(serde_json::from_str::<Msg>(&text).unwrap(), big);
        let params = Msg::UpdateParams(Params::default());
        let text = serde_json::to_string(&params).unwrap();
        assert_eq!(serde_json::from_str::<Msg>(&text).unwrap(), params);
    }
}
