//! Per-guild configuration document. Stored as one JSON payload in the guild
//! state repository; every field has a workable default so a fresh guild can
//! run commands before staff touch anything.

use crate::catalog::ReactionDef;
use crate::quota::ResetAnchor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Permission bits we care about for voice channels (Discord bit positions).
pub mod bits {
    pub const VIEW_CHANNEL: u64 = 1 << 10;
    pub const CONNECT: u64 = 1 << 20;
    pub const SPEAK: u64 = 1 << 21;
    pub const MUTE_MEMBERS: u64 = 1 << 22;
    pub const DEAFEN_MEMBERS: u64 = 1 << 23;
    pub const MOVE_MEMBERS: u64 = 1 << 24;
}

/// The fixed set of well-known staff roles a guild can map to concrete role
/// ids, guild-wide or per section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KnownRole {
    Member,
    Security,
    Officer,
    Moderator,
    TrialLeader,
    Leader,
    HeadLeader,
}

pub const LEADER_TIERS: [KnownRole; 3] =
    [KnownRole::TrialLeader, KnownRole::Leader, KnownRole::HeadLeader];

/// Target of one allow/deny entry: a well-known role resolved through the
/// guild/section mapping, or a raw role id straight from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PermTarget {
    Known(KnownRole),
    Raw(u64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionEntry {
    pub target: PermTarget,
    pub allow: u64,
    pub deny: u64,
}

impl PermissionEntry {
    pub fn known(role: KnownRole, allow: u64, deny: u64) -> Self {
        Self { target: PermTarget::Known(role), allow, deny }
    }
}

/// Allow/deny lists for each overwrite set the raid lifecycle applies. Each
/// set fully replaces the channel's overwrites when applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoicePermissions {
    pub pre_open: Vec<PermissionEntry>,
    pub open: Vec<PermissionEntry>,
    pub locked: Vec<PermissionEntry>,
}

impl Default for VoicePermissions {
    fn default() -> Self {
        use bits::*;
        let staff = |r| PermissionEntry::known(r, CONNECT | SPEAK | MOVE_MEMBERS | MUTE_MEMBERS, 0);
        let mut pre_open = vec![PermissionEntry::known(
            KnownRole::Member,
            VIEW_CHANNEL,
            CONNECT,
        )];
        let mut open = vec![PermissionEntry::known(
            KnownRole::Member,
            VIEW_CHANNEL | CONNECT | SPEAK,
            0,
        )];
        let mut locked = vec![PermissionEntry::known(
            KnownRole::Member,
            VIEW_CHANNEL,
            CONNECT,
        )];
        for tier in [
            KnownRole::Security,
            KnownRole::Officer,
            KnownRole::Moderator,
            KnownRole::TrialLeader,
            KnownRole::Leader,
            KnownRole::HeadLeader,
        ] {
            pre_open.push(staff(tier));
            open.push(staff(tier));
            locked.push(staff(tier));
        }
        Self { pre_open, open, locked }
    }
}

/// A scoped configuration/permission domain within the guild: one category of
/// channels with its own verified role and display surfaces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectionConfig {
    pub name: String,
    pub category: Option<u64>,
    /// Members must hold this to participate; `start()` refuses to run
    /// without it.
    pub verified_role: Option<u64>,
    /// Channel carrying the join announcement.
    pub status_channel: u64,
    /// Channel carrying the control panel.
    pub control_channel: u64,
    /// Default voice channel user limit for raids in this section.
    pub voice_user_limit: u32,
    /// Section-scoped overrides of the well-known role mapping.
    #[serde(default)]
    pub role_overrides: HashMap<KnownRole, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildConfig {
    #[serde(default)]
    pub sections: Vec<SectionConfig>,
    /// Guild-wide mapping of well-known roles to concrete role ids.
    #[serde(default)]
    pub roles: HashMap<KnownRole, u64>,
    /// Complete-replacement reaction lists per dungeon code.
    #[serde(default)]
    pub dungeon_overrides: HashMap<String, Vec<(String, u32)>>,
    /// Guild-defined reactions, consulted after the global catalog.
    #[serde(default)]
    pub custom_reactions: HashMap<String, ReactionDef>,
    /// Early-location slots granted to server boosters; 0 disables.
    #[serde(default)]
    pub nitro_early_count: u32,
    #[serde(default)]
    pub booster_role: Option<u64>,
    #[serde(default)]
    pub voice_perms: VoicePermissions,
    /// Channel the quota leaderboards live in.
    #[serde(default)]
    pub quota_channel: Option<u64>,
    /// Optional archive sink for reset reports.
    #[serde(default)]
    pub storage_channel: Option<u64>,
    #[serde(default)]
    pub quota_anchor: ResetAnchor,
    /// Claim-collection window applied when the command does not override it.
    #[serde(default = "default_open_window_secs")]
    pub open_window_secs: u64,
}

fn default_open_window_secs() -> u64 {
    6 * 60
}

impl Default for GuildConfig {
    fn default() -> Self {
        Self {
            sections: Vec::new(),
            roles: HashMap::new(),
            dungeon_overrides: HashMap::new(),
            custom_reactions: HashMap::new(),
            nitro_early_count: 0,
            booster_role: None,
            voice_perms: VoicePermissions::default(),
            quota_channel: None,
            storage_channel: None,
            quota_anchor: ResetAnchor::default(),
            open_window_secs: default_open_window_secs(),
        }
    }
}

impl GuildConfig {
    /// Resolve a well-known role for a section: section override first, then
    /// the guild-wide mapping.
    pub fn resolve_role(&self, section: &SectionConfig, role: KnownRole) -> Option<u64> {
        section
            .role_overrides
            .get(&role)
            .or_else(|| self.roles.get(&role))
            .copied()
    }

    pub fn section_by_name(&self, name: &str) -> Option<&SectionConfig> {
        self.sections.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Role ids allowed to drive the control panel.
    pub fn staff_roles(&self, section: &SectionConfig) -> Vec<u64> {
        let mut out = Vec::new();
        for r in [
            KnownRole::Security,
            KnownRole::Officer,
            KnownRole::Moderator,
            KnownRole::TrialLeader,
            KnownRole::Leader,
            KnownRole::HeadLeader,
        ] {
            if let Some(id) = self.resolve_role(section, r) {
                out.push(id);
            }
        }
        out
    }
}
