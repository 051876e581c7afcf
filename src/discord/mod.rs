//! Serenity-backed implementations of the platform ports. Everything here
//! translates between raw u64 ids at the core boundary and serenity's typed
//! ids; no raid or quota logic lives in this module.

use crate::ports::{OverwriteSpec, QuotaSurface, RaidGateway, ScreenshotParser, Surface};
use crate::raid::RaidView;
use crate::ui::{embeds, menus};
use crate::utils::dm_user;
use async_trait::async_trait;
use dashmap::DashMap;
use serenity::all::{
    Cache, ChannelId, ChannelType, GuildId, Http, MessageId, PermissionOverwrite,
    PermissionOverwriteType, Permissions, RoleId, UserId,
};
use serenity::builder::{CreateChannel, CreateMessage, EditChannel, EditMember, EditMessage};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn to_overwrites(specs: &[OverwriteSpec]) -> Vec<PermissionOverwrite> {
    specs
        .iter()
        .map(|s| PermissionOverwrite {
            allow: Permissions::from_bits_truncate(s.allow),
            deny: Permissions::from_bits_truncate(s.deny),
            kind: PermissionOverwriteType::Role(RoleId::new(s.role_id)),
        })
        .collect()
}

fn message_gone(err: &serenity::Error) -> bool {
    matches!(
        err,
        serenity::Error::Http(serenity::http::HttpError::UnsuccessfulRequest(resp))
            if resp.status_code.as_u16() == 404
    )
}

/// One guild's raid gateway.
pub struct DiscordGateway {
    http: Arc<Http>,
    cache: Arc<Cache>,
    guild_id: GuildId,
}

impl DiscordGateway {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>, guild_id: u64) -> Arc<Self> {
        Arc::new(Self { http, cache, guild_id: GuildId::new(guild_id) })
    }

    fn build_message(surface: Surface, view: &RaidView) -> CreateMessage {
        match surface {
            Surface::Join => CreateMessage::new()
                .embed(embeds::render_join_embed(view))
                .components(menus::claim_rows(view)),
            Surface::Panel => CreateMessage::new()
                .embed(embeds::render_panel_embed(view))
                .components(menus::panel_rows(view)),
        }
    }

    fn build_edit(surface: Surface, view: &RaidView) -> EditMessage {
        match surface {
            Surface::Join => EditMessage::new()
                .embed(embeds::render_join_embed(view))
                .components(menus::claim_rows(view)),
            Surface::Panel => EditMessage::new()
                .embed(embeds::render_panel_embed(view))
                .components(menus::panel_rows(view)),
        }
    }
}

#[async_trait]
impl RaidGateway for DiscordGateway {
    async fn create_voice_channel(
        &self,
        name: &str,
        category: Option<u64>,
        user_limit: u32,
        overwrites: &[OverwriteSpec],
    ) -> anyhow::Result<u64> {
        let mut builder = CreateChannel::new(name)
            .kind(ChannelType::Voice)
            .user_limit(user_limit)
            .permissions(to_overwrites(overwrites));
        if let Some(cat) = category {
            builder = builder.category(ChannelId::new(cat));
        }
        let channel = self.guild_id.create_channel(&self.http, builder).await?;
        Ok(channel.id.get())
    }

    async fn replace_overwrites(
        &self,
        channel: u64,
        overwrites: &[OverwriteSpec],
    ) -> anyhow::Result<()> {
        ChannelId::new(channel)
            .edit(&self.http, EditChannel::new().permissions(to_overwrites(overwrites)))
            .await?;
        Ok(())
    }

    async fn delete_channel(&self, channel: u64) -> anyhow::Result<()> {
        ChannelId::new(channel).delete(&self.http).await?;
        Ok(())
    }

    async fn channel_members(&self, channel: u64) -> Vec<u64> {
        let Some(guild) = self.cache.guild(self.guild_id) else {
            return Vec::new();
        };
        guild
            .voice_states
            .values()
            .filter(|vs| vs.channel_id.map(|c| c.get()) == Some(channel))
            .map(|vs| vs.user_id.get())
            .collect()
    }

    async fn move_member(&self, member: u64, to_channel: u64) -> anyhow::Result<()> {
        self.guild_id
            .edit_member(
                &self.http,
                UserId::new(member),
                EditMember::new().voice_channel(ChannelId::new(to_channel)),
            )
            .await?;
        Ok(())
    }

    async fn fallback_channel(&self, near: u64) -> Option<u64> {
        let guild = self.cache.guild(self.guild_id)?;
        let near_category =
            guild.channels.get(&ChannelId::new(near)).and_then(|c| c.parent_id);
        let by_name = guild
            .channels
            .values()
            .filter(|c| c.kind == ChannelType::Voice && c.id.get() != near)
            .filter(|c| c.parent_id == near_category)
            .find(|c| {
                let name = c.name.to_lowercase();
                name.contains("queue") || name.contains("lounge")
            })
            .map(|c| c.id.get());
        by_name.or_else(|| guild.afk_metadata.as_ref().map(|m| m.afk_channel_id.get()))
    }

    async fn send_surface(
        &self,
        channel: u64,
        surface: Surface,
        view: &RaidView,
    ) -> anyhow::Result<u64> {
        let msg = ChannelId::new(channel)
            .send_message(&self.http, Self::build_message(surface, view))
            .await?;
        Ok(msg.id.get())
    }

    async fn edit_surface(
        &self,
        channel: u64,
        message: u64,
        surface: Surface,
        view: &RaidView,
    ) -> anyhow::Result<()> {
        ChannelId::new(channel)
            .edit_message(&self.http, MessageId::new(message), Self::build_edit(surface, view))
            .await?;
        Ok(())
    }

    async fn delete_message(&self, channel: u64, message: u64) -> anyhow::Result<()> {
        ChannelId::new(channel).delete_message(&self.http, MessageId::new(message)).await?;
        Ok(())
    }

    async fn pin_message(&self, channel: u64, message: u64) -> anyhow::Result<()> {
        ChannelId::new(channel).pin(&self.http, MessageId::new(message)).await?;
        Ok(())
    }

    async fn unpin_message(&self, channel: u64, message: u64) -> anyhow::Result<()> {
        ChannelId::new(channel).unpin(&self.http, MessageId::new(message)).await?;
        Ok(())
    }

    async fn clear_reactions(&self, channel: u64, message: u64) -> anyhow::Result<()> {
        let msg = ChannelId::new(channel).message(&self.http, MessageId::new(message)).await?;
        msg.delete_reactions(&self.http).await?;
        Ok(())
    }

    fn role_exists(&self, role: u64) -> bool {
        self.cache
            .guild(self.guild_id)
            .map(|g| g.roles.contains_key(&RoleId::new(role)))
            .unwrap_or(false)
    }

    async fn notify_member(&self, member: u64, text: &str) {
        dm_user(&self.http, member, text.to_string()).await;
    }
}

/// Display names resolved over REST stay warm this long; the leaderboard
/// loop would otherwise refetch uncached members every tick.
const NAME_TTL: Duration = Duration::from_secs(600);

/// Process-wide quota surface, shared by the background loops.
pub struct DiscordQuotaSurface {
    http: Arc<Http>,
    cache: Arc<Cache>,
    names: DashMap<(u64, u64), (String, Instant)>,
}

impl DiscordQuotaSurface {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>) -> Arc<Self> {
        Arc::new(Self { http, cache, names: DashMap::new() })
    }
}

#[async_trait]
impl QuotaSurface for DiscordQuotaSurface {
    fn role_exists(&self, guild_id: u64, role: u64) -> bool {
        self.cache
            .guild(GuildId::new(guild_id))
            .map(|g| g.roles.contains_key(&RoleId::new(role)))
            .unwrap_or(false)
    }

    async fn role_members(&self, guild_id: u64, role: u64) -> Vec<u64> {
        let gid = GuildId::new(guild_id);
        let role_id = RoleId::new(role);
        let mut out = Vec::new();
        let mut after: Option<UserId> = None;
        loop {
            let chunk = match gid.members(&self.http, Some(1000), after).await {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(guild = guild_id, "member page fetch failed: {e}");
                    break;
                }
            };
            let Some(last) = chunk.last().map(|m| m.user.id) else { break };
            out.extend(
                chunk.iter().filter(|m| m.roles.contains(&role_id)).map(|m| m.user.id.get()),
            );
            if chunk.len() < 1000 {
                break;
            }
            after = Some(last);
        }
        out
    }

    async fn display_name(&self, guild_id: u64, member: u64) -> String {
        let gid = GuildId::new(guild_id);
        let uid = UserId::new(member);
        if let Some(g) = self.cache.guild(gid) {
            if let Some(m) = g.members.get(&uid) {
                return m
                    .nick
                    .clone()
                    .filter(|s| !s.is_empty())
                    .or_else(|| m.user.global_name.clone().filter(|s| !s.is_empty()))
                    .unwrap_or_else(|| m.user.name.clone());
            }
        }
        if let Some(hit) = self.names.get(&(guild_id, member)) {
            let (name, stamp) = hit.value();
            if stamp.elapsed() < NAME_TTL {
                return name.clone();
            }
        }
        let name = match gid.member(&self.http, uid).await {
            Ok(m) => m
                .nick
                .filter(|s| !s.is_empty())
                .or_else(|| m.user.global_name.clone().filter(|s| !s.is_empty()))
                .unwrap_or(m.user.name),
            Err(_) => return format!("user {member}"),
        };
        self.names.insert((guild_id, member), (name.clone(), Instant::now()));
        name
    }

    async fn post_message(&self, channel: u64, text: &str) -> anyhow::Result<u64> {
        let msg = ChannelId::new(channel).say(&self.http, text).await?;
        Ok(msg.id.get())
    }

    async fn edit_message(&self, channel: u64, message: u64, text: &str) -> anyhow::Result<bool> {
        let res = ChannelId::new(channel)
            .edit_message(&self.http, MessageId::new(message), EditMessage::new().content(text))
            .await;
        match res {
            Ok(_) => Ok(true),
            Err(e) if message_gone(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn archive_report(
        &self,
        guild_id: u64,
        storage_channel: Option<u64>,
        text: &str,
    ) -> bool {
        let Some(channel) = storage_channel else { return false };
        match ChannelId::new(channel).say(&self.http, text).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(guild = guild_id, channel, "report archive failed: {e}");
                false
            }
        }
    }
}

/// External screenshot parser over HTTP: POST the image URL, get a JSON name
/// list back. Any transport or decode failure reads as unparseable.
pub struct HttpScreenshotParser {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpScreenshotParser {
    pub fn new(endpoint: String) -> Self {
        Self { client: reqwest::Client::new(), endpoint }
    }
}

#[derive(serde::Deserialize)]
struct ParseResponse {
    names: Vec<String>,
}

#[async_trait]
impl ScreenshotParser for HttpScreenshotParser {
    async fn parse(&self, image_url: &str) -> Option<Vec<String>> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "url": image_url }))
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let parsed: ParseResponse = resp.json().await.ok()?;
        Some(parsed.names)
    }
}

/// Stands in when no parser endpoint is configured; every screenshot reads
/// as unparseable, which the reconciliation layer reports as invalid.
pub struct NullScreenshotParser;

#[async_trait]
impl ScreenshotParser for NullScreenshotParser {
    async fn parse(&self, _image_url: &str) -> Option<Vec<String>> {
        None
    }
}
