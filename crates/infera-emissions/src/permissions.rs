//! Permission decisions consumed by the keeper.
//!
//! The keeper never reads whitelist tables itself; it asks a
//! [`PermissionOracle`] and receives a yes/no answer per action.

use crate::error::{EmissionsError, Result};
use infera_types::{ActorId, Topic, TopicId};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

pub trait PermissionOracle {
    fn can_create_topic(&self, actor: &ActorId) -> bool;

    fn can_update_params(&self, actor: &ActorId) -> bool;

    fn can_register_worker(&self, topic: &Topic, actor: &ActorId) -> bool;

    fn can_register_reputer(&self, topic: &Topic, actor: &ActorId) -> bool;

    fn can_submit_worker_payload(&self, topic: &Topic, actor: &ActorId) -> bool;

    fn can_submit_reputer_payload(&self, topic: &Topic, actor: &ActorId) -> bool;
}

/// Everyone may do everything except update params, which is reserved to admins.
#[derive(Debug, Clone, Default)]
pub struct OpenPermissions {
    admins: BTreeSet<ActorId>,
}

impl OpenPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_admin(mut self, admin: ActorId) -> Self {
        self.admins.insert(admin);
        self
    }
}

impl PermissionOracle for OpenPermissions {
    fn can_create_topic(&self, _actor: &ActorId) -> bool {
        true
    }

    fn can_update_params(&self, actor: &ActorId) -> bool {
        self.admins.contains(actor)
    }

    fn can_register_worker(&self, _topic: &Topic, _actor: &ActorId) -> bool {
        true
    }

    fn can_register_reputer(&self, _topic: &Topic, _actor: &ActorId) -> bool {
        true
    }

    fn can_submit_worker_payload(&self, _topic: &Topic, _actor: &ActorId) -> bool {
        true
    }

    fn can_submit_reputer_payload(&self, _topic: &Topic, _actor: &ActorId) -> bool {
        true
    }
}

/// Whitelist-backed decisions.
///
/// Topic creation is gated by the creator whitelist when enabled; worker and
/// reputer actions are gated per topic when the topic enables its whitelist.
#[derive(Debug, Clone, Default)]
pub struct WhitelistPermissions {
    admins: BTreeSet<ActorId>,
    creator_whitelist_enabled: bool,
    topic_creators: BTreeSet<ActorId>,
    topic_workers: BTreeMap<TopicId, BTreeSet<ActorId>>,
    topic_reputers: BTreeMap<TopicId, BTreeSet<ActorId>>,
    max_input_length: u64,
}

impl WhitelistPermissions {
    pub fn new(max_input_length: u64) -> Self {
        Self {
            max_input_length,
            ..Self::default()
        }
    }

    fn check_input(&self, len: usize) -> Result<()> {
        if len as u64 > self.max_input_length {
            return Err(EmissionsError::WhitelistInputTooLong {
                len,
                max: self.max_input_length,
            });
        }
        Ok(())
    }

    pub fn add_admins(&mut self, admins: &[ActorId]) -> Result<()> {
        self.check_input(admins.len())?;
        self.admins.extend(admins.iter().cloned());
        Ok(())
    }

    pub fn enable_creator_whitelist(&mut self, enabled: bool) {
        self.creator_whitelist_enabled = enabled;
    }

    pub fn add_topic_creators(&mut self, creators: &[ActorId]) -> Result<()> {
        self.check_input(creators.len())?;
        self.topic_creators.extend(creators.iter().cloned());
        info!(count = creators.len(), "📝 Topic creators whitelisted");
        Ok(())
    }

    pub fn add_topic_workers(&mut self, topic_id: TopicId, workers: &[ActorId]) -> Result<()> {
        self.check_input(workers.len())?;
        self.topic_workers
            .entry(topic_id)
            .or_default()
            .extend(workers.iter().cloned());
        info!(topic_id, count = workers.len(), "📝 Topic workers whitelisted");
        Ok(())
    }

    pub fn add_topic_reputers(&mut self, topic_id: TopicId, reputers: &[ActorId]) -> Result<()> {
        self.check_input(reputers.len())?;
        self.topic_reputers
            .entry(topic_id)
            .or_default()
            .extend(reputers.iter().cloned());
        info!(topic_id, count = reputers.len(), "📝 Topic reputers whitelisted");
        Ok(())
    }

    pub fn remove_topic_workers(&mut self, topic_id: TopicId, workers: &[ActorId]) -> Result<()> {
        self.check_input(workers.len())?;
        if let Some(set) = self.topic_workers.get_mut(&topic_id) {
            for worker in workers {
                set.remove(worker);
            }
        }
        Ok(())
    }

    pub fn remove_topic_reputers(&mut self, topic_id: TopicId, reputers: &[ActorId]) -> Result<()> {
        self.check_input(reputers.len())?;
        if let Some(set) = self.topic_reputers.get_mut(&topic_id) {
            for reputer in reputers {
                set.remove(reputer);
            }
        }
        Ok(())
    }

    fn listed(map: &BTreeMap<TopicId, BTreeSet<ActorId>>, topic_id: TopicId, actor: &ActorId) -> bool {
        map.get(&topic_id).is_some_and(|set| set.contains(actor))
    }
}

impl PermissionOracle for WhitelistPermissions {
    fn can_create_topic(&self, actor: &ActorId) -> bool {
        !self.creator_whitelist_enabled || self.topic_creators.contains(actor)
    }

    fn can_update_params(&self, actor: &ActorId) -> bool {
        self.admins.contains(actor)
    }

    fn can_register_worker(&self, topic: &Topic, actor: &ActorId) -> bool {
        self.can_submit_worker_payload(topic, actor)
    }

    fn can_register_reputer(&self, topic: &Topic, actor: &ActorId) -> bool {
        self.can_submit_reputer_payload(topic, actor)
    }

    fn can_submit_worker_payload(&self, topic: &Topic, actor: &ActorId) -> bool {
        !topic.enable_worker_whitelist || Self::listed(&self.topic_workers, topic.id, actor)
    }

    fn can_submit_reputer_payload(&self, topic: &Topic, actor: &ActorId) -> bool {
        !topic.enable_reputer_whitelist || Self::listed(&self.topic_reputers, topic.id, actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{actor, sample_topic};

    #[test]
    fn test_input_length_is_capped() {
        let mut perms = WhitelistPermissions::new(2);
        let too_many = vec![actor(1), actor(2), actor(3)];
        assert_eq!(
            perms.add_topic_workers(1, &too_many),
            Err(EmissionsError::WhitelistInputTooLong { len: 3, max: 2 })
        );
        perms.add_topic_workers(1, &too_many[..2]).unwrap();
    }

    #[test]
    fn test_topic_whitelist_only_applies_when_enabled() {
        let mut perms = WhitelistPermissions::new(10);
        let mut topic = sample_topic(1);
        assert!(perms.can_submit_worker_payload(&topic, &actor(9)));

        topic.enable_worker_whitelist = true;
        assert!(!perms.can_submit_worker_payload(&topic, &actor(9)));
        perms.add_topic_workers(1, &[actor(9)]).unwrap();
        assert!(perms.can_submit_worker_payload(&topic, &actor(9)));
        perms.remove_topic_workers(1, &[actor(9)]).unwrap();
        assert!(!perms.can_register_worker(&topic, &actor(9)));
    }

    #[test]
    fn test_creator_whitelist() {
        let mut perms = WhitelistPermissions::new(10);
        perms.enable_creator_whitelist(true);
        assert!(!perms.can_create_topic(&actor(4)));
        perms.add_topic_creators(&[actor(4)]).unwrap();
        assert!(perms.can_create_topic(&actor(4)));
        assert!(!perms.can_update_params(&actor(4)));
    }
}
