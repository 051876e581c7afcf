//! In-memory stand-ins for the platform and storage ports, shared by the
//! integration suites.

#![allow(dead_code)]

use async_trait::async_trait;
use raidcoord::config::GuildConfig;
use raidcoord::ports::{GuildStateRepo, OverwriteSpec, QuotaSurface, RaidGateway, Surface};
use raidcoord::quota::QuotaLedger;
use raidcoord::raid::{RaidSnapshot, RaidView};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct MemoryRepo {
    pub configs: Mutex<HashMap<u64, GuildConfig>>,
    pub raids: Mutex<HashMap<(u64, u64), RaidSnapshot>>,
    pub claims: Mutex<Vec<(u64, u64, String, u64)>>,
    pub quotas: Mutex<HashMap<(u64, u64), QuotaLedger>>,
}

impl MemoryRepo {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn raid_count(&self) -> usize {
        self.raids.lock().unwrap().len()
    }
}

#[async_trait]
impl GuildStateRepo for MemoryRepo {
    async fn get_or_create_config(&self, guild_id: u64) -> anyhow::Result<GuildConfig> {
        Ok(self.configs.lock().unwrap().entry(guild_id).or_default().clone())
    }

    async fn save_config(&self, guild_id: u64, cfg: &GuildConfig) -> anyhow::Result<()> {
        self.configs.lock().unwrap().insert(guild_id, cfg.clone());
        Ok(())
    }

    async fn upsert_raid(&self, guild_id: u64, snap: &RaidSnapshot) -> anyhow::Result<()> {
        self.raids.lock().unwrap().insert((guild_id, snap.message_id), snap.clone());
        // The snapshot folds in journaled claims, mirroring the database.
        self.claims
            .lock()
            .unwrap()
            .retain(|(g, m, _, _)| !(*g == guild_id && *m == snap.message_id));
        Ok(())
    }

    async fn remove_raid(&self, guild_id: u64, message_id: u64) -> anyhow::Result<bool> {
        self.claims
            .lock()
            .unwrap()
            .retain(|(g, m, _, _)| !(*g == guild_id && *m == message_id));
        Ok(self.raids.lock().unwrap().remove(&(guild_id, message_id)).is_some())
    }

    async fn append_claim(
        &self,
        guild_id: u64,
        message_id: u64,
        key: &str,
        member_id: u64,
    ) -> anyhow::Result<bool> {
        if !self.raids.lock().unwrap().contains_key(&(guild_id, message_id)) {
            return Ok(false);
        }
        self.claims.lock().unwrap().push((guild_id, message_id, key.to_string(), member_id));
        Ok(true)
    }

    async fn load_raids(&self, guild_id: u64) -> anyhow::Result<Vec<RaidSnapshot>> {
        Ok(self
            .raids
            .lock()
            .unwrap()
            .iter()
            .filter(|((g, _), _)| *g == guild_id)
            .map(|(_, s)| s.clone())
            .collect())
    }

    async fn load_claims(
        &self,
        guild_id: u64,
        message_id: u64,
    ) -> anyhow::Result<Vec<(String, u64)>> {
        Ok(self
            .claims
            .lock()
            .unwrap()
            .iter()
            .filter(|(g, m, _, _)| *g == guild_id && *m == message_id)
            .map(|(_, _, k, u)| (k.clone(), *u))
            .collect())
    }

    async fn load_quotas(&self, guild_id: u64) -> anyhow::Result<Vec<QuotaLedger>> {
        Ok(self
            .quotas
            .lock()
            .unwrap()
            .iter()
            .filter(|((g, _), _)| *g == guild_id)
            .map(|(_, l)| l.clone())
            .collect())
    }

    async fn save_quota(&self, guild_id: u64, ledger: &QuotaLedger) -> anyhow::Result<()> {
        self.quotas.lock().unwrap().insert((guild_id, ledger.role_id), ledger.clone());
        Ok(())
    }

    async fn delete_quota(&self, guild_id: u64, role_id: u64) -> anyhow::Result<bool> {
        Ok(self.quotas.lock().unwrap().remove(&(guild_id, role_id)).is_some())
    }
}

/// Fake chat platform for raid lifecycle tests. Channels and messages are
/// sequential ids; voice membership is poked directly by tests.
pub struct FakeGateway {
    next_id: AtomicU64,
    pub channels: Mutex<HashSet<u64>>,
    pub vc_members: Mutex<HashMap<u64, Vec<u64>>>,
    /// message id -> (channel, surface)
    pub messages: Mutex<HashMap<u64, (u64, Surface)>>,
    pub pinned: Mutex<HashSet<u64>>,
    pub roles: Mutex<HashSet<u64>>,
    pub overwrites: Mutex<HashMap<u64, Vec<OverwriteSpec>>>,
    pub notifications: Mutex<Vec<(u64, String)>>,
    pub reaction_clears: Mutex<Vec<u64>>,
    pub fallback: Mutex<Option<u64>>,
    /// Members that refuse to be moved out of voice.
    pub stuck: Mutex<HashSet<u64>>,
    /// `Some(n)`: allow n message sends, then fail. For partial-resource
    /// tests.
    pub send_budget: Mutex<Option<u32>>,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1000),
            channels: Mutex::new(HashSet::new()),
            vc_members: Mutex::new(HashMap::new()),
            messages: Mutex::new(HashMap::new()),
            pinned: Mutex::new(HashSet::new()),
            roles: Mutex::new(HashSet::new()),
            overwrites: Mutex::new(HashMap::new()),
            notifications: Mutex::new(Vec::new()),
            reaction_clears: Mutex::new(Vec::new()),
            fallback: Mutex::new(None),
            stuck: Mutex::new(HashSet::new()),
            send_budget: Mutex::new(None),
        })
    }

    pub fn allow_sends(&self, n: u32) {
        *self.send_budget.lock().unwrap() = Some(n);
    }

    pub fn add_role(&self, role: u64) {
        self.roles.lock().unwrap().insert(role);
    }

    pub fn join_voice(&self, channel: u64, member: u64) {
        self.vc_members.lock().unwrap().entry(channel).or_default().push(member);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.lock().unwrap().len()
    }

    pub fn message_count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

#[async_trait]
impl RaidGateway for FakeGateway {
    async fn create_voice_channel(
        &self,
        _name: &str,
        _category: Option<u64>,
        _user_limit: u32,
        overwrites: &[OverwriteSpec],
    ) -> anyhow::Result<u64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.channels.lock().unwrap().insert(id);
        self.overwrites.lock().unwrap().insert(id, overwrites.to_vec());
        Ok(id)
    }

    async fn replace_overwrites(
        &self,
        channel: u64,
        overwrites: &[OverwriteSpec],
    ) -> anyhow::Result<()> {
        self.overwrites.lock().unwrap().insert(channel, overwrites.to_vec());
        Ok(())
    }

    async fn delete_channel(&self, channel: u64) -> anyhow::Result<()> {
        self.channels.lock().unwrap().remove(&channel);
        self.vc_members.lock().unwrap().remove(&channel);
        Ok(())
    }

    async fn channel_members(&self, channel: u64) -> Vec<u64> {
        self.vc_members.lock().unwrap().get(&channel).cloned().unwrap_or_default()
    }

    async fn move_member(&self, member: u64, to_channel: u64) -> anyhow::Result<()> {
        if self.stuck.lock().unwrap().contains(&member) {
            return Ok(());
        }
        let mut vc = self.vc_members.lock().unwrap();
        for members in vc.values_mut() {
            members.retain(|m| *m != member);
        }
        vc.entry(to_channel).or_default().push(member);
        Ok(())
    }

    async fn fallback_channel(&self, _near: u64) -> Option<u64> {
        *self.fallback.lock().unwrap()
    }

    async fn send_surface(
        &self,
        channel: u64,
        surface: Surface,
        _view: &RaidView,
    ) -> anyhow::Result<u64> {
        if let Some(budget) = self.send_budget.lock().unwrap().as_mut() {
            if *budget == 0 {
                anyhow::bail!("send rejected");
            }
            *budget -= 1;
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.messages.lock().unwrap().insert(id, (channel, surface));
        Ok(id)
    }

    async fn edit_surface(
        &self,
        _channel: u64,
        message: u64,
        _surface: Surface,
        _view: &RaidView,
    ) -> anyhow::Result<()> {
        if !self.messages.lock().unwrap().contains_key(&message) {
            anyhow::bail!("unknown message");
        }
        Ok(())
    }

    async fn delete_message(&self, _channel: u64, message: u64) -> anyhow::Result<()> {
        self.messages.lock().unwrap().remove(&message);
        Ok(())
    }

    async fn pin_message(&self, _channel: u64, message: u64) -> anyhow::Result<()> {
        self.pinned.lock().unwrap().insert(message);
        Ok(())
    }

    async fn unpin_message(&self, _channel: u64, message: u64) -> anyhow::Result<()> {
        self.pinned.lock().unwrap().remove(&message);
        Ok(())
    }

    async fn clear_reactions(&self, _channel: u64, message: u64) -> anyhow::Result<()> {
        self.reaction_clears.lock().unwrap().push(message);
        Ok(())
    }

    fn role_exists(&self, role: u64) -> bool {
        self.roles.lock().unwrap().contains(&role)
    }

    async fn notify_member(&self, member: u64, text: &str) {
        self.notifications.lock().unwrap().push((member, text.to_string()));
    }
}

/// Fake quota surface: role membership and message history, all poked by the
/// tests.
pub struct FakeQuotaSurface {
    next_id: AtomicU64,
    /// (guild, role) -> members; a present key means the role exists.
    pub roles: Mutex<HashMap<(u64, u64), Vec<u64>>>,
    pub names: Mutex<HashMap<u64, String>>,
    /// message id -> (channel, latest text)
    pub messages: Mutex<HashMap<u64, (u64, String)>>,
    pub dead_messages: Mutex<HashSet<u64>>,
    pub archives: Mutex<Vec<(u64, String)>>,
    pub posts: Mutex<Vec<(u64, u64)>>,
}

impl FakeQuotaSurface {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(5000),
            roles: Mutex::new(HashMap::new()),
            names: Mutex::new(HashMap::new()),
            messages: Mutex::new(HashMap::new()),
            dead_messages: Mutex::new(HashSet::new()),
            archives: Mutex::new(Vec::new()),
            posts: Mutex::new(Vec::new()),
        })
    }

    pub fn add_role(&self, guild: u64, role: u64, members: Vec<u64>) {
        self.roles.lock().unwrap().insert((guild, role), members);
    }

    pub fn drop_role(&self, guild: u64, role: u64) {
        self.roles.lock().unwrap().remove(&(guild, role));
    }

    pub fn kill_message(&self, message: u64) {
        self.dead_messages.lock().unwrap().insert(message);
        self.messages.lock().unwrap().remove(&message);
    }
}

#[async_trait]
impl QuotaSurface for FakeQuotaSurface {
    fn role_exists(&self, guild_id: u64, role: u64) -> bool {
        self.roles.lock().unwrap().contains_key(&(guild_id, role))
    }

    async fn role_members(&self, guild_id: u64, role: u64) -> Vec<u64> {
        self.roles.lock().unwrap().get(&(guild_id, role)).cloned().unwrap_or_default()
    }

    async fn display_name(&self, _guild_id: u64, member: u64) -> String {
        self.names
            .lock()
            .unwrap()
            .get(&member)
            .cloned()
            .unwrap_or_else(|| format!("user {member}"))
    }

    async fn post_message(&self, channel: u64, text: &str) -> anyhow::Result<u64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.messages.lock().unwrap().insert(id, (channel, text.to_string()));
        self.posts.lock().unwrap().push((channel, id));
        Ok(id)
    }

    async fn edit_message(&self, _channel: u64, message: u64, text: &str) -> anyhow::Result<bool> {
        if self.dead_messages.lock().unwrap().contains(&message) {
            return Ok(false);
        }
        match self.messages.lock().unwrap().get_mut(&message) {
            Some((_, body)) => {
                *body = text.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn archive_report(
        &self,
        guild_id: u64,
        storage_channel: Option<u64>,
        text: &str,
    ) -> bool {
        if storage_channel.is_none() {
            return false;
        }
        self.archives.lock().unwrap().push((guild_id, text.to_string()));
        true
    }
}
