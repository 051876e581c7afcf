pub mod components;

use crate::catalog;
use crate::discord::DiscordGateway;
use crate::ports::{GuildStateRepo, QuotaSurface, ScreenshotParser};
use crate::quota::QuotaManager;
use crate::raid::{RaidCreation, RaidInstance, RaidRegistry};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use serenity::all::{
    ChannelId, Context, EventHandler, GuildChannel, GuildId, Interaction, Message, MessageId,
    Ready, RoleId, VoiceState,
};
use serenity::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Claim confirmation window for categories that require one.
pub const CONFIRM_WINDOW: Duration = Duration::from_secs(15);
/// Interactive quota award selection window.
pub const AWARD_WINDOW: Duration = Duration::from_secs(30);

/// A claim waiting on the member's explicit confirmation press.
pub struct PendingClaim {
    pub raid_message: u64,
    pub key: String,
    pub expires: Instant,
}

/// A manual award waiting on a ledger choice from the select menu.
pub struct PendingAward {
    pub guild_id: u64,
    pub target: u64,
    pub log_type: String,
    pub amount: i64,
    pub expires: Instant,
}

/// Everything the event and command layers share. Built once in `main` and
/// injected; nothing here is a process global.
pub struct Services {
    pub repo: Arc<dyn GuildStateRepo>,
    pub registry: Arc<RaidRegistry>,
    pub quota: Arc<QuotaManager>,
    pub parser: Arc<dyn ScreenshotParser>,
    /// Keyed by the claiming user id; one pending confirmation per user.
    pub pending_claims: DashMap<u64, PendingClaim>,
    /// Keyed by (invoking user, interaction id).
    pub pending_awards: DashMap<(u64, u64), PendingAward>,
    /// Installed at `ready`, once the gateway's http/cache exist.
    quota_surface: OnceCell<Arc<dyn QuotaSurface>>,
    loops_started: AtomicBool,
}

impl Services {
    pub fn new(repo: Arc<dyn GuildStateRepo>, parser: Arc<dyn ScreenshotParser>) -> Arc<Self> {
        Arc::new(Self {
            repo: repo.clone(),
            registry: RaidRegistry::new(),
            quota: QuotaManager::new(repo),
            parser,
            pending_claims: DashMap::new(),
            pending_awards: DashMap::new(),
            quota_surface: OnceCell::new(),
            loops_started: AtomicBool::new(false),
        })
    }

    pub fn install_surface(&self, surface: Arc<dyn QuotaSurface>) {
        let _ = self.quota_surface.set(surface);
    }

    /// Queues a claim confirmation. Expired leftovers are swept here; an
    /// abandoned prompt never gets a removing press.
    pub fn queue_claim(&self, user: u64, claim: PendingClaim) {
        let now = Instant::now();
        self.pending_claims.retain(|_, p| p.expires > now);
        self.pending_claims.insert(user, claim);
    }

    /// Queues an award prompt; same sweep as [`Self::queue_claim`].
    pub fn queue_award(&self, user: u64, token: u64, award: PendingAward) {
        let now = Instant::now();
        self.pending_awards.retain(|_, p| p.expires > now);
        self.pending_awards.insert((user, token), award);
    }

    /// Interactions only arrive after `ready`, so this only fails on misuse.
    pub fn surface(&self) -> anyhow::Result<Arc<dyn QuotaSurface>> {
        self.quota_surface
            .get()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("gateway session not ready yet"))
    }
}

pub struct Handler {
    services: Arc<Services>,
}

impl Handler {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        tracing::info!("{} is connected", ready.user.name);
        {
            let mut data = ctx.data.write().await;
            data.insert::<ServicesKey>(self.services.clone());
        }

        if let Err(e) = crate::commands::register_commands(&ctx).await {
            tracing::error!("failed to register commands: {e:#}");
        }

        let surface: Arc<dyn QuotaSurface> =
            crate::discord::DiscordQuotaSurface::new(ctx.http.clone(), ctx.cache.clone());
        self.services.install_surface(surface.clone());
        if !self.services.loops_started.swap(true, Ordering::SeqCst) {
            self.services.quota.spawn_loops(surface);
        }

        // Restore persisted state per guild, off the gateway task.
        let services = self.services.clone();
        let guilds: Vec<u64> = ready.guilds.iter().map(|g| g.id.get()).collect();
        tokio::spawn(async move {
            for guild in guilds {
                if let Err(e) = restore_guild(&ctx, &services, guild).await {
                    tracing::error!(guild, "guild restore failed: {e:#}");
                }
            }
        });
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(cmd) => {
                if let Err(e) = crate::commands::dispatch(&ctx, &cmd).await {
                    tracing::error!(command = %cmd.data.name, "command error: {e:#}");
                }
            }
            Interaction::Component(comp) => {
                if let Err(e) = components::handle_component(&ctx, &self.services, &comp).await {
                    tracing::error!(id = %comp.data.custom_id, "component error: {e:#}");
                }
            }
            _ => {}
        }
    }

    async fn voice_state_update(&self, _ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let mut channels: Vec<u64> = Vec::new();
        if let Some(ch) = old.as_ref().and_then(|o| o.channel_id) {
            channels.push(ch.get());
        }
        if let Some(ch) = new.channel_id {
            if !channels.contains(&ch.get()) {
                channels.push(ch.get());
            }
        }
        for ch in channels {
            if let Some(inst) = self.services.registry.find_by_voice_channel(ch).await {
                inst.voice_state_changed().await;
            }
        }
    }

    /// A raid's display message deleted out from under it ends the raid.
    async fn message_delete(
        &self,
        _ctx: Context,
        _channel_id: ChannelId,
        deleted_message_id: MessageId,
        _guild_id: Option<GuildId>,
    ) {
        let mid = deleted_message_id.get();
        if let Some(inst) = self.services.registry.get(mid) {
            tracing::warn!(raid = mid, "join message deleted externally, ending raid");
            inst.cleanup().await;
            return;
        }
        for inst in self.services.registry.all() {
            if inst.panel_message_id().await == Some(mid) {
                tracing::warn!("panel message deleted externally, ending raid");
                inst.cleanup().await;
                return;
            }
        }
    }

    async fn channel_delete(
        &self,
        _ctx: Context,
        channel: GuildChannel,
        _messages: Option<Vec<Message>>,
    ) {
        if let Some(inst) = self.services.registry.find_by_voice_channel(channel.id.get()).await {
            tracing::warn!(channel = channel.id.get(), "raid voice channel deleted externally");
            inst.cleanup().await;
        }
    }

    async fn guild_role_delete(
        &self,
        _ctx: Context,
        guild_id: GuildId,
        role_id: RoleId,
        _role: Option<serenity::all::Role>,
    ) {
        self.services.quota.handle_role_deleted(guild_id.get(), role_id.get()).await;
    }
}

/// Reload one guild: config, quota ledgers, then every persisted raid whose
/// resources we can still drive.
async fn restore_guild(ctx: &Context, services: &Arc<Services>, guild: u64) -> anyhow::Result<()> {
    let cfg = services.repo.get_or_create_config(guild).await?;
    services.quota.load_guild(guild, &cfg).await?;

    let snapshots = services.repo.load_raids(guild).await?;
    for snap in snapshots {
        let Some(section) = cfg.section_by_name(&snap.section_name).cloned() else {
            tracing::warn!(guild, raid = snap.message_id, "dropping raid with unknown section");
            let _ = services.repo.remove_raid(guild, snap.message_id).await;
            continue;
        };
        let Some(dungeon) = catalog::find_dungeon(&snap.dungeon_code) else {
            tracing::warn!(guild, raid = snap.message_id, "dropping raid with unknown dungeon");
            let _ = services.repo.remove_raid(guild, snap.message_id).await;
            continue;
        };
        let journal = services.repo.load_claims(guild, snap.message_id).await.unwrap_or_default();
        let gateway = DiscordGateway::new(ctx.http.clone(), ctx.cache.clone(), guild);
        let creation = RaidCreation {
            guild_id: guild,
            cfg: cfg.clone(),
            section: section.clone(),
            dungeon: dungeon.clone(),
            leader: snap.leader,
            location: snap.location.clone(),
            user_limit: section.voice_user_limit,
            open_window: Duration::from_secs(cfg.open_window_secs),
        };
        let message_id = snap.message_id;
        let inst =
            RaidInstance::restore(creation, snap, &journal, gateway, services.repo.clone()).await;
        services.registry.insert(message_id, inst);
        tracing::info!(guild, raid = message_id, "raid restored");
    }
    Ok(())
}

/* Context data access */
use serenity::prelude::TypeMapKey;
struct ServicesKey;
impl TypeMapKey for ServicesKey {
    type Value = Arc<Services>;
}

pub async fn services_from_ctx(ctx: &Context) -> anyhow::Result<Arc<Services>> {
    let data = ctx.data.read().await;
    data.get::<ServicesKey>().cloned().ok_or_else(|| anyhow::anyhow!("services not initialized"))
}
