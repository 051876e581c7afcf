//! Narrow collaborator contracts the core depends on. The serenity/sqlx
//! adapters in `discord/` and `db/` implement these for production; the
//! integration tests drive the core through in-memory fakes.

use crate::config::GuildConfig;
use crate::quota::QuotaLedger;
use crate::raid::{RaidSnapshot, RaidView};
use async_trait::async_trait;

/// One computed permission overwrite, role-targeted, as raw permission bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverwriteSpec {
    pub role_id: u64,
    pub allow: u64,
    pub deny: u64,
}

/// Which of the two display surfaces a message operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Join,
    Panel,
}

/// Everything a raid instance needs from the chat platform. Implementations
/// are expected to be cheap to clone behind an `Arc` and safe to call from
/// background tasks.
#[async_trait]
pub trait RaidGateway: Send + Sync {
    async fn create_voice_channel(
        &self,
        name: &str,
        category: Option<u64>,
        user_limit: u32,
        overwrites: &[OverwriteSpec],
    ) -> anyhow::Result<u64>;

    /// Fully replaces the channel's role overwrites; never patches.
    async fn replace_overwrites(&self, channel: u64, overwrites: &[OverwriteSpec])
        -> anyhow::Result<()>;

    async fn delete_channel(&self, channel: u64) -> anyhow::Result<()>;

    /// Members currently connected to the voice channel.
    async fn channel_members(&self, channel: u64) -> Vec<u64>;

    async fn move_member(&self, member: u64, to_channel: u64) -> anyhow::Result<()>;

    /// A queue/lounge channel in the same category as `near`, else the
    /// guild's AFK channel, else nothing.
    async fn fallback_channel(&self, near: u64) -> Option<u64>;

    async fn send_surface(&self, channel: u64, surface: Surface, view: &RaidView)
        -> anyhow::Result<u64>;

    async fn edit_surface(
        &self,
        channel: u64,
        message: u64,
        surface: Surface,
        view: &RaidView,
    ) -> anyhow::Result<()>;

    async fn delete_message(&self, channel: u64, message: u64) -> anyhow::Result<()>;
    async fn pin_message(&self, channel: u64, message: u64) -> anyhow::Result<()>;
    async fn unpin_message(&self, channel: u64, message: u64) -> anyhow::Result<()>;

    /// Removes the cosmetic reactions from the join announcement.
    async fn clear_reactions(&self, channel: u64, message: u64) -> anyhow::Result<()>;

    fn role_exists(&self, role: u64) -> bool;

    /// Best-effort direct notification; failures are the gateway's problem.
    async fn notify_member(&self, member: u64, text: &str);
}

/// Persistent guild state. Memory is authoritative for the running process;
/// this store is a write-behind journal for crash recovery. Update-style
/// calls return `false` when the matched row no longer exists, which callers
/// treat as recoverable, never fatal.
#[async_trait]
pub trait GuildStateRepo: Send + Sync {
    async fn get_or_create_config(&self, guild_id: u64) -> anyhow::Result<GuildConfig>;
    async fn save_config(&self, guild_id: u64, cfg: &GuildConfig) -> anyhow::Result<()>;

    async fn upsert_raid(&self, guild_id: u64, snap: &RaidSnapshot) -> anyhow::Result<()>;
    async fn remove_raid(&self, guild_id: u64, message_id: u64) -> anyhow::Result<bool>;
    /// Journals one claim, conditional on the raid row still existing.
    async fn append_claim(
        &self,
        guild_id: u64,
        message_id: u64,
        key: &str,
        member_id: u64,
    ) -> anyhow::Result<bool>;
    async fn load_raids(&self, guild_id: u64) -> anyhow::Result<Vec<RaidSnapshot>>;
    /// Claims journaled after the last snapshot write, per reaction key.
    async fn load_claims(
        &self,
        guild_id: u64,
        message_id: u64,
    ) -> anyhow::Result<Vec<(String, u64)>>;

    async fn load_quotas(&self, guild_id: u64) -> anyhow::Result<Vec<QuotaLedger>>;
    async fn save_quota(&self, guild_id: u64, ledger: &QuotaLedger) -> anyhow::Result<()>;
    async fn delete_quota(&self, guild_id: u64, role_id: u64) -> anyhow::Result<bool>;
}

/// What the quota reset/reporting cycle needs from the chat platform.
#[async_trait]
pub trait QuotaSurface: Send + Sync {
    fn role_exists(&self, guild_id: u64, role: u64) -> bool;
    async fn role_members(&self, guild_id: u64, role: u64) -> Vec<u64>;
    async fn display_name(&self, guild_id: u64, member: u64) -> String;

    async fn post_message(&self, channel: u64, text: &str) -> anyhow::Result<u64>;
    /// `Ok(false)` means the message could not be found anymore.
    async fn edit_message(&self, channel: u64, message: u64, text: &str) -> anyhow::Result<bool>;

    /// Archives a reset report to the configured storage location. Returns
    /// `false` when no sink is configured or the write failed; the caller
    /// then embeds the report directly.
    async fn archive_report(&self, guild_id: u64, storage_channel: Option<u64>, text: &str)
        -> bool;
}

/// Opaque external screenshot parser: URL in, name list out. `None` or an
/// empty list means unparseable.
#[async_trait]
pub trait ScreenshotParser: Send + Sync {
    async fn parse(&self, image_url: &str) -> Option<Vec<String>>;
}
