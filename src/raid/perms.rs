//! Voice-channel permission computation. Each phase transition fully
//! replaces the channel's overwrites with the set computed here, so stale
//! entries cannot accumulate.

use crate::config::{GuildConfig, PermTarget, SectionConfig};
use crate::ports::OverwriteSpec;
use std::collections::HashMap;

/// Which overwrite set to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermSet {
    PreOpen,
    Open,
    Locked,
}

/// Merge the configured allow/deny lists for `set` into concrete role
/// overwrites. Entries for well-known roles resolve through the section then
/// guild mapping; entries that resolve to no role, target a role that no
/// longer exists, or carry no permission bits are dropped. Multiple entries
/// landing on the same role merge their bits.
pub fn compute_overwrites(
    set: PermSet,
    cfg: &GuildConfig,
    section: &SectionConfig,
    role_exists: impl Fn(u64) -> bool,
) -> Vec<OverwriteSpec> {
    let entries = match set {
        PermSet::PreOpen => &cfg.voice_perms.pre_open,
        PermSet::Open => &cfg.voice_perms.open,
        PermSet::Locked => &cfg.voice_perms.locked,
    };

    let mut merged: Vec<u64> = Vec::new(); // insertion order of role ids
    let mut bits: HashMap<u64, (u64, u64)> = HashMap::new();

    for e in entries {
        if e.allow == 0 && e.deny == 0 {
            continue;
        }
        let role_id = match &e.target {
            PermTarget::Known(known) => match cfg.resolve_role(section, *known) {
                Some(id) => id,
                None => continue,
            },
            PermTarget::Raw(id) => *id,
        };
        if !role_exists(role_id) {
            continue;
        }
        let slot = bits.entry(role_id).or_insert_with(|| {
            merged.push(role_id);
            (0, 0)
        });
        slot.0 |= e.allow;
        slot.1 |= e.deny;
    }

    merged
        .into_iter()
        .map(|role_id| {
            let (allow, deny) = bits[&role_id];
            OverwriteSpec { role_id, allow, deny }
        })
        .collect()
}
