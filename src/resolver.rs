//! Reaction catalog resolver: merges a dungeon definition with guild-level
//! overrides into the effective, ordered reaction set for one raid. Pure
//! function of its inputs; nothing here touches Discord or the database.

use crate::catalog::{
    find_dungeon, Dungeon, DungeonKind, ReactionCategory, ReactionDef, GLOBAL_REACTIONS, NITRO_KEY,
};
use crate::config::GuildConfig;

/// Resolve one (key, cap) pair against the global catalog, then the guild's
/// custom reactions. Unknown keys resolve to `None` and are silently skipped.
fn resolve_pair(key: &str, cap: u32, cfg: &GuildConfig) -> Option<ReactionDef> {
    if let Some(entry) = GLOBAL_REACTIONS.get(key) {
        return Some(ReactionDef {
            key: key.to_string(),
            name: entry.name.to_string(),
            category: entry.category,
            emoji: entry.emoji.map(str::to_string),
            cap,
        });
    }
    cfg.custom_reactions.get(key).map(|def| ReactionDef { cap, ..def.clone() })
}

fn builtin_list(dungeon: &Dungeon, cfg: &GuildConfig) -> Vec<ReactionDef> {
    dungeon
        .react_pairs()
        .filter_map(|(key, cap)| resolve_pair(key, *cap, cfg))
        .collect()
}

/// Produce the effective reaction set for `dungeon` under `cfg`.
///
/// Order of precedence:
/// 1. A guild override record for this dungeon replaces the list wholesale.
/// 2. Built-in and derived dungeons use their built-in list (the derived
///    variant borrows its base's list).
/// 3. Custom dungeons resolve each listed key; unresolvable keys are dropped.
///
/// Reactions whose backing emoji is not resolvable are always dropped so the
/// UI never renders a dead control. When boost-based early location is on and
/// the guild has a booster role, a synthetic NITRO reaction is appended.
pub fn resolve(dungeon: &Dungeon, cfg: &GuildConfig) -> Vec<ReactionDef> {
    let mut out: Vec<ReactionDef> = if let Some(over) = cfg.dungeon_overrides.get(&dungeon.code) {
        over.iter()
            .filter_map(|(key, cap)| resolve_pair(key, *cap, cfg))
            .collect()
    } else {
        match &dungeon.kind {
            DungeonKind::Builtin => builtin_list(dungeon, cfg),
            DungeonKind::Derived { base } => match find_dungeon(base) {
                Some(base_dungeon) => builtin_list(base_dungeon, cfg),
                None => Vec::new(),
            },
            DungeonKind::Custom => builtin_list(dungeon, cfg),
        }
    };

    out.retain(|r| r.emoji.is_some());

    if cfg.nitro_early_count > 0 && cfg.booster_role.is_some() {
        out.push(ReactionDef {
            key: NITRO_KEY.to_string(),
            name: "Server Booster".to_string(),
            category: ReactionCategory::EarlyLocation,
            emoji: Some("🚀".to_string()),
            cap: cfg.nitro_early_count,
        });
    }

    out
}
