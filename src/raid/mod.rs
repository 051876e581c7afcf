//! The raid lifecycle core: phase machine, early-location accounting, the
//! per-raid instance, and the process-wide registry of live instances.

pub mod instance;
pub mod ledger;
pub mod perms;
pub mod phase;
pub mod registry;

pub use instance::{ClaimGate, RaidCreation, RaidInstance};
pub use ledger::{ClaimOutcome, EarlyLocationLedger};
pub use phase::Phase;
pub use registry::RaidRegistry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors the state machine surfaces across its public boundary. Everything
/// else is absorbed locally per the error-handling policy.
#[derive(Debug, Error)]
pub enum RaidError {
    #[error("section `{0}` has no usable verified role; configure one before starting raids")]
    MissingVerifiedRole(String),
    #[error("raid is not in a phase that allows this action")]
    WrongPhase,
}

/// Serializable snapshot of an instance, written behind every meaningful
/// mutation and used for crash recovery. Only exists once all required live
/// resources do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaidSnapshot {
    pub guild_id: u64,
    /// Join-announcement message id; the instance's durable identity.
    pub message_id: u64,
    pub panel_message_id: u64,
    pub voice_channel_id: u64,
    pub dungeon_code: String,
    pub section_name: String,
    pub leader: u64,
    pub location: String,
    pub phase: Phase,
    pub claims: Vec<(String, Vec<u64>)>,
    pub joined: Vec<u64>,
    pub open_deadline: Option<DateTime<Utc>>,
}

/// Per-reaction display state for the UI layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionView {
    pub key: String,
    pub name: String,
    pub emoji: Option<String>,
    pub claimed: u32,
    pub cap: u32,
    pub claimants: Vec<u64>,
    /// Cosmetic reactions render but never disable.
    pub essential: bool,
}

/// Render-ready view of one raid; the gateway turns this into embeds and
/// component rows without reaching back into the instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaidView {
    pub guild_id: u64,
    pub message_id: Option<u64>,
    pub phase: Phase,
    pub dungeon_code: String,
    pub dungeon_name: String,
    pub color: u32,
    pub icon: String,
    pub section_name: String,
    pub leader: u64,
    /// Shown on the control panel only; the join surface never renders it.
    pub location: String,
    pub voice_channel: Option<u64>,
    pub reactions: Vec<ReactionView>,
    pub joined_count: usize,
    pub open_deadline: Option<DateTime<Utc>>,
    pub locked: bool,
    pub aborted: bool,
}
