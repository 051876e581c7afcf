//! Process-wide table of live raid instances, keyed by the join message id.
//! Injected into the event handler and commands rather than held in a
//! global, so tests can stand up isolated registries.

use crate::raid::instance::RaidInstance;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct RaidRegistry {
    by_message: DashMap<u64, Arc<RaidInstance>>,
}

impl RaidRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers an instance under its join message id and hands it a weak
    /// handle back so cleanup can deregister itself.
    pub fn insert(self: &Arc<Self>, message_id: u64, instance: Arc<RaidInstance>) {
        instance.attach_registry(self);
        self.by_message.insert(message_id, instance);
    }

    pub fn get(&self, message_id: u64) -> Option<Arc<RaidInstance>> {
        self.by_message.get(&message_id).map(|e| e.value().clone())
    }

    /// Drops the table entry only; resource teardown stays with the
    /// instance.
    pub fn remove(&self, message_id: u64) -> Option<Arc<RaidInstance>> {
        self.by_message.remove(&message_id).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.by_message.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_message.is_empty()
    }

    pub fn all(&self) -> Vec<Arc<RaidInstance>> {
        self.by_message.iter().map(|e| e.value().clone()).collect()
    }

    pub fn for_guild(&self, guild_id: u64) -> Vec<Arc<RaidInstance>> {
        self.by_message
            .iter()
            .filter(|e| e.value().guild_id == guild_id)
            .map(|e| e.value().clone())
            .collect()
    }

    pub async fn find_by_voice_channel(&self, channel_id: u64) -> Option<Arc<RaidInstance>> {
        for entry in self.by_message.iter() {
            let inst = entry.value().clone();
            if inst.voice_channel_id().await == Some(channel_id) {
                return Some(inst);
            }
        }
        None
    }
}
