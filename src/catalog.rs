//! Static reference data: the built-in dungeon table and the global reaction
//! catalog. Read-only lookup tables; guild-level customization lives in
//! [`crate::config::GuildConfig`].

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Synthetic reaction key granted to server boosters when the guild enables
/// boost-based early location.
pub const NITRO_KEY: &str = "NITRO";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReactionCategory {
    Key,
    Class,
    Item,
    StatusEffect,
    Special,
    EarlyLocation,
}

impl ReactionCategory {
    /// Early-location claims commit directly; everything else goes through the
    /// timed "will you actually bring it" confirmation.
    pub fn needs_confirmation(self) -> bool {
        !matches!(self, ReactionCategory::EarlyLocation)
    }
}

/// One effective reaction on a raid, after resolution against the catalogs.
/// `cap == 0` marks a cosmetic, unlimited reaction that never participates in
/// early-location accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionDef {
    pub key: String,
    pub name: String,
    pub category: ReactionCategory,
    pub emoji: Option<String>,
    pub cap: u32,
}

impl ReactionDef {
    pub fn is_essential(&self) -> bool {
        self.cap > 0
    }
}

/// Catalog entry before a capacity is attached.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub name: &'static str,
    pub category: ReactionCategory,
    pub emoji: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DungeonKind {
    /// Ships with the bot; reaction list is authoritative as written.
    Builtin,
    /// Built on another dungeon's reaction list (e.g. a hard-mode variant).
    Derived { base: String },
    /// Fully guild-defined; keys resolve against the global catalog first,
    /// then the guild's custom reactions.
    Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dungeon {
    pub code: String,
    pub name: String,
    pub kind: DungeonKind,
    /// (reaction key, capacity) pairs for the "key" category slots.
    pub key_reacts: Vec<(String, u32)>,
    /// (reaction key, capacity) pairs for everything else; cap 0 = cosmetic.
    pub other_reacts: Vec<(String, u32)>,
    pub color: u32,
    pub icon: String,
}

impl Dungeon {
    pub fn react_pairs(&self) -> impl Iterator<Item = &(String, u32)> {
        self.key_reacts.iter().chain(self.other_reacts.iter())
    }
}

fn entry(name: &'static str, category: ReactionCategory, emoji: Option<&'static str>) -> CatalogEntry {
    CatalogEntry { name, category, emoji }
}

/// Global built-in reaction catalog keyed by reaction key.
pub static GLOBAL_REACTIONS: Lazy<HashMap<&'static str, CatalogEntry>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("KEY", entry("Key", ReactionCategory::Key, Some("🗝️")));
    m.insert("VIAL", entry("Vial", ReactionCategory::Key, Some("🧪")));
    m.insert("RUNE_SWORD", entry("Sword Rune", ReactionCategory::Key, Some("⚔️")));
    m.insert("RUNE_SHIELD", entry("Shield Rune", ReactionCategory::Key, Some("🛡️")));
    m.insert("RUNE_HELM", entry("Helm Rune", ReactionCategory::Key, Some("🪖")));
    m.insert("WARRIOR", entry("Warrior", ReactionCategory::Class, Some("🗡️")));
    m.insert("KNIGHT", entry("Knight", ReactionCategory::Class, Some("🛡️")));
    m.insert("PALADIN", entry("Paladin", ReactionCategory::Class, Some("✨")));
    m.insert("TRICKSTER", entry("Trickster", ReactionCategory::Class, Some("🎭")));
    m.insert("MYSTIC", entry("Mystic", ReactionCategory::Class, Some("🔮")));
    m.insert("MSEAL", entry("Marble Seal", ReactionCategory::Item, Some("📿")));
    m.insert("SLOW", entry("Slow", ReactionCategory::StatusEffect, Some("🐌")));
    m.insert("ARMOR_BREAK", entry("Armor Break", ReactionCategory::StatusEffect, Some("💥")));
    m.insert("FUNGAL_TOME", entry("Fungal Tome", ReactionCategory::Item, Some("🍄")));
    m.insert("BRAIN_PRISM", entry("Brain of the Golem", ReactionCategory::Item, Some("🧠")));
    m.insert(NITRO_KEY, entry("Server Booster", ReactionCategory::EarlyLocation, Some("🚀")));
    // Deliberately emoji-less; anything resolving here is dropped from the UI.
    m.insert("RETIRED", entry("Retired", ReactionCategory::Special, None));
    m
});

/// Built-in dungeon table.
pub static DUNGEONS: Lazy<Vec<Dungeon>> = Lazy::new(|| {
    vec![
        Dungeon {
            code: "SHATTERS".into(),
            name: "The Shatters".into(),
            kind: DungeonKind::Builtin,
            key_reacts: vec![("KEY".into(), 2)],
            other_reacts: vec![
                ("WARRIOR".into(), 0),
                ("KNIGHT".into(), 0),
                ("PALADIN".into(), 0),
                ("SLOW".into(), 2),
                ("ARMOR_BREAK".into(), 2),
                ("FUNGAL_TOME".into(), 1),
            ],
            color: 0x4DEEEA,
            icon: "https://i.imgur.com/vatlKfa.png".into(),
        },
        Dungeon {
            code: "VOID".into(),
            name: "The Void".into(),
            kind: DungeonKind::Builtin,
            key_reacts: vec![("KEY".into(), 2), ("VIAL".into(), 2)],
            other_reacts: vec![
                ("WARRIOR".into(), 0),
                ("PALADIN".into(), 0),
                ("MSEAL".into(), 1),
                ("ARMOR_BREAK".into(), 2),
            ],
            color: 0x13A8FE,
            icon: "https://i.imgur.com/kbzthE4.png".into(),
        },
        Dungeon {
            code: "CULT".into(),
            name: "Cultist Hideout".into(),
            kind: DungeonKind::Builtin,
            key_reacts: vec![("KEY".into(), 2)],
            other_reacts: vec![
                ("WARRIOR".into(), 0),
                ("TRICKSTER".into(), 1),
                ("SLOW".into(), 1),
            ],
            color: 0xE54B4B,
            icon: "https://i.imgur.com/nPkovWR.png".into(),
        },
        Dungeon {
            code: "O3".into(),
            name: "Oryx Sanctuary".into(),
            kind: DungeonKind::Builtin,
            key_reacts: vec![
                ("RUNE_SWORD".into(), 1),
                ("RUNE_SHIELD".into(), 1),
                ("RUNE_HELM".into(), 1),
            ],
            other_reacts: vec![
                ("WARRIOR".into(), 0),
                ("PALADIN".into(), 0),
                ("MYSTIC".into(), 1),
                ("MSEAL".into(), 1),
                ("SLOW".into(), 2),
                ("BRAIN_PRISM".into(), 1),
            ],
            color: 0xF1C40F,
            icon: "https://i.imgur.com/3Biywi7.png".into(),
        },
        Dungeon {
            code: "HARD_SHATTERS".into(),
            name: "Hardmode Shatters".into(),
            kind: DungeonKind::Derived { base: "SHATTERS".into() },
            key_reacts: vec![],
            other_reacts: vec![],
            color: 0x9B59B6,
            icon: "https://i.imgur.com/vatlKfa.png".into(),
        },
    ]
});

pub fn find_dungeon(code: &str) -> Option<&'static Dungeon> {
    DUNGEONS.iter().find(|d| d.code.eq_ignore_ascii_case(code))
}
