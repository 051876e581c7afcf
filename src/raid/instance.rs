//! One raid's lifecycle: resource ownership, phase transitions, claim
//! routing and teardown. All Discord traffic goes through the
//! [`RaidGateway`] port; all persistence through [`GuildStateRepo`].

use crate::catalog::Dungeon;
use crate::config::{GuildConfig, SectionConfig};
use crate::ports::{GuildStateRepo, RaidGateway, Surface};
use crate::raid::ledger::{ClaimOutcome, EarlyLocationLedger};
use crate::raid::perms::{compute_overwrites, PermSet};
use crate::raid::phase::Phase;
use crate::raid::registry::RaidRegistry;
use crate::raid::{RaidError, RaidSnapshot, RaidView, ReactionView};
use crate::resolver;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, sleep_until, Instant, MissedTickBehavior};
use uuid::Uuid;

/// Join announcement refresh cadence while collecting.
const JOIN_REFRESH: Duration = Duration::from_secs(4);
/// Control panel refresh cadence in all non-terminal phases.
const PANEL_REFRESH: Duration = Duration::from_secs(5);
/// Bounded wait for the voice channel to drain during cleanup: linear
/// backoff, then give up and delete anyway.
const EVAC_ATTEMPTS: u32 = 8;
const EVAC_BASE_DELAY: Duration = Duration::from_millis(500);

/// Outcome of the claim pre-check, before any confirmation round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimGate {
    /// Claim collection is not running (wrong phase or no channel yet).
    Closed,
    /// Member is not connected to the raid voice channel.
    NotInVoice,
    /// Member already holds this key.
    Duplicate,
    /// Capacity already reached; the reaction may still be used cosmetically.
    SlotGone,
    /// Essential slot free, but the category requires a timed confirmation.
    NeedsConfirmation,
    /// Essential slot free, commit directly.
    Ready,
}

/// Everything needed to construct an instance before any resource exists.
pub struct RaidCreation {
    pub guild_id: u64,
    pub cfg: GuildConfig,
    pub section: SectionConfig,
    pub dungeon: Dungeon,
    pub leader: u64,
    pub location: String,
    pub user_limit: u32,
    pub open_window: Duration,
}

struct RaidState {
    phase: Phase,
    ledger: EarlyLocationLedger,
    /// Full resolved set including cosmetic reactions, for display.
    resolved: Vec<crate::catalog::ReactionDef>,
    location: String,
    voice_channel: Option<u64>,
    join_msg: Option<u64>,
    panel_msg: Option<u64>,
    joined: Vec<u64>,
    vc_count: usize,
    open_deadline: Option<DateTime<Utc>>,
    locked: bool,
    aborted: bool,
}

pub struct RaidInstance {
    pub guild_id: u64,
    wizard_id: Uuid,
    cfg: GuildConfig,
    section: SectionConfig,
    dungeon: Dungeon,
    leader: u64,
    user_limit: u32,
    open_window: Duration,
    gateway: Arc<dyn RaidGateway>,
    repo: Arc<dyn GuildStateRepo>,
    state: Mutex<RaidState>,
    registry: StdMutex<Option<Weak<RaidRegistry>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

fn channel_slug(name: &str) -> String {
    name.to_lowercase().replace([' ', '_'], "-")
}

impl RaidInstance {
    pub fn new(
        creation: RaidCreation,
        gateway: Arc<dyn RaidGateway>,
        repo: Arc<dyn GuildStateRepo>,
    ) -> Arc<Self> {
        let resolved = resolver::resolve(&creation.dungeon, &creation.cfg);
        let ledger = EarlyLocationLedger::new(&resolved);
        Arc::new(Self {
            guild_id: creation.guild_id,
            wizard_id: Uuid::new_v4(),
            state: Mutex::new(RaidState {
                phase: Phase::Pending,
                ledger,
                resolved,
                location: creation.location,
                voice_channel: None,
                join_msg: None,
                panel_msg: None,
                joined: Vec::new(),
                vc_count: 0,
                open_deadline: None,
                locked: false,
                aborted: false,
            }),
            cfg: creation.cfg,
            section: creation.section,
            dungeon: creation.dungeon,
            leader: creation.leader,
            user_limit: creation.user_limit,
            open_window: creation.open_window,
            gateway,
            repo,
            registry: StdMutex::new(None),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn leader(&self) -> u64 {
        self.leader
    }

    pub fn section(&self) -> &SectionConfig {
        &self.section
    }

    pub fn config(&self) -> &GuildConfig {
        &self.cfg
    }

    pub fn dungeon(&self) -> &Dungeon {
        &self.dungeon
    }

    pub async fn phase(&self) -> Phase {
        self.state.lock().await.phase
    }

    pub async fn message_id(&self) -> Option<u64> {
        self.state.lock().await.join_msg
    }

    pub async fn voice_channel_id(&self) -> Option<u64> {
        self.state.lock().await.voice_channel
    }

    pub async fn panel_message_id(&self) -> Option<u64> {
        self.state.lock().await.panel_msg
    }

    pub async fn joined(&self) -> Vec<u64> {
        self.state.lock().await.joined.clone()
    }

    pub(crate) fn attach_registry(&self, registry: &Arc<RaidRegistry>) {
        *self.registry.lock().expect("registry slot") = Some(Arc::downgrade(registry));
    }

    /// Creates the voice channel and both control messages, persists the
    /// instance and begins refresh. Fails with a configuration error and no
    /// leaked resources when the section's verified role is unusable.
    pub async fn start(self: &Arc<Self>) -> anyhow::Result<u64> {
        match self.section.verified_role {
            Some(role) if self.gateway.role_exists(role) => {}
            _ => return Err(RaidError::MissingVerifiedRole(self.section.name.clone()).into()),
        }
        {
            let st = self.state.lock().await;
            if st.phase != Phase::Pending {
                return Err(RaidError::WrongPhase.into());
            }
        }

        let overwrites = compute_overwrites(PermSet::PreOpen, &self.cfg, &self.section, |r| {
            self.gateway.role_exists(r)
        });
        let name = format!("{}-{}", channel_slug(&self.dungeon.name), &self.wizard_id.as_simple().to_string()[..6]);
        let user_limit = self.user_limit.max(1);
        let vc = self
            .gateway
            .create_voice_channel(&name, self.section.category, user_limit, &overwrites)
            .await?;

        let view = {
            let mut st = self.state.lock().await;
            st.voice_channel = Some(vc);
            Self::view_locked(self, &st)
        };
        let join_msg = match self
            .gateway
            .send_surface(self.section.status_channel, Surface::Join, &view)
            .await
        {
            Ok(m) => m,
            Err(e) => {
                let _ = self.gateway.delete_channel(vc).await;
                return Err(e);
            }
        };
        let _ = self.gateway.pin_message(self.section.status_channel, join_msg).await;

        let view = {
            let mut st = self.state.lock().await;
            st.join_msg = Some(join_msg);
            Self::view_locked(self, &st)
        };
        let panel_msg = match self
            .gateway
            .send_surface(self.section.control_channel, Surface::Panel, &view)
            .await
        {
            Ok(m) => m,
            Err(e) => {
                let _ = self
                    .gateway
                    .delete_message(self.section.status_channel, join_msg)
                    .await;
                let _ = self.gateway.delete_channel(vc).await;
                return Err(e);
            }
        };

        {
            let mut st = self.state.lock().await;
            st.panel_msg = Some(panel_msg);
            st.phase = Phase::PreOpen;
        }
        self.persist().await;
        self.spawn_refresh_tasks().await;

        tracing::info!(guild = self.guild_id, raid = join_msg, dungeon = %self.dungeon.code, "raid started");
        Ok(join_msg)
    }

    /// `PreOpen -> Open`: replace the permission set, start the countdown.
    pub async fn open(self: &Arc<Self>) -> Result<(), RaidError> {
        let vc = {
            let mut st = self.state.lock().await;
            if st.phase != Phase::PreOpen {
                return Err(RaidError::WrongPhase);
            }
            st.phase = Phase::Open;
            st.open_deadline = Some(Utc::now() + chrono::Duration::from_std(self.open_window).unwrap_or_else(|_| chrono::Duration::seconds(360)));
            st.voice_channel
        };
        if let Some(vc) = vc {
            let overwrites = compute_overwrites(PermSet::Open, &self.cfg, &self.section, |r| {
                self.gateway.role_exists(r)
            });
            let _ = self.gateway.replace_overwrites(vc, &overwrites).await;
        }
        self.persist().await;
        self.refresh_surfaces().await;

        // Natural expiry of the window forces activation; manual paths abort
        // this task during cleanup.
        let weak = Arc::downgrade(self);
        let deadline = Instant::now() + self.open_window;
        let handle = tokio::spawn(async move {
            sleep_until(deadline).await;
            if let Some(inst) = weak.upgrade() {
                if inst.activate().await.is_ok() {
                    tracing::info!(guild = inst.guild_id, "open window expired, auto-activated");
                }
            }
        });
        self.tasks.lock().await.push(handle);
        Ok(())
    }

    /// `Open -> Active`: no-op unless currently open with live resources.
    /// Locks the channel, snapshots membership, stops claim collection.
    pub async fn activate(&self) -> Result<(), RaidError> {
        let (vc, join_msg) = {
            let st = self.state.lock().await;
            match (st.phase, st.voice_channel, st.join_msg, st.panel_msg) {
                (Phase::Open, Some(vc), Some(jm), Some(_)) => (vc, jm),
                _ => return Err(RaidError::WrongPhase),
            }
        };

        let overwrites = compute_overwrites(PermSet::Locked, &self.cfg, &self.section, |r| {
            self.gateway.role_exists(r)
        });
        let _ = self.gateway.replace_overwrites(vc, &overwrites).await;
        let members = self.gateway.channel_members(vc).await;

        {
            let mut st = self.state.lock().await;
            // Guard again: another transition may have won while we awaited.
            if st.phase != Phase::Open {
                return Err(RaidError::WrongPhase);
            }
            st.phase = Phase::Active;
            st.locked = true;
            st.joined = members;
            st.vc_count = st.joined.len();
        }
        let _ = self
            .gateway
            .clear_reactions(self.section.status_channel, join_msg)
            .await;
        self.persist().await;
        self.refresh_surfaces().await;
        tracing::info!(guild = self.guild_id, "raid activated");
        Ok(())
    }

    /// Terminates directly from a collecting phase.
    pub async fn abort(&self, actor: u64) -> Result<(), RaidError> {
        {
            let mut st = self.state.lock().await;
            if !st.phase.is_collecting() {
                return Err(RaidError::WrongPhase);
            }
            st.aborted = true;
        }
        tracing::info!(guild = self.guild_id, actor, "raid aborted");
        self.cleanup().await;
        Ok(())
    }

    /// Ends an active raid and tears everything down.
    pub async fn end(&self, actor: u64) -> Result<(), RaidError> {
        {
            let st = self.state.lock().await;
            if st.phase != Phase::Active {
                return Err(RaidError::WrongPhase);
            }
        }
        tracing::info!(guild = self.guild_id, actor, "raid ended");
        self.cleanup().await;
        Ok(())
    }

    /// Lock or unlock entry while active. The overwrite set is replaced
    /// wholesale either way.
    pub async fn set_locked(&self, locked: bool) -> Result<(), RaidError> {
        let vc = {
            let mut st = self.state.lock().await;
            if st.phase != Phase::Active {
                return Err(RaidError::WrongPhase);
            }
            st.locked = locked;
            st.voice_channel
        };
        if let Some(vc) = vc {
            let set = if locked { PermSet::Locked } else { PermSet::Open };
            let overwrites = compute_overwrites(set, &self.cfg, &self.section, |r| {
                self.gateway.role_exists(r)
            });
            let _ = self.gateway.replace_overwrites(vc, &overwrites).await;
        }
        self.refresh_surfaces().await;
        Ok(())
    }

    /// Changes the target location and tells everyone already holding an
    /// early slot, since they were given the old one.
    pub async fn set_location(&self, location: String) {
        let holders: Vec<u64> = {
            let mut st = self.state.lock().await;
            st.location = location.clone();
            let mut seen = Vec::new();
            for (_, members) in st.ledger.dump() {
                for m in members {
                    if !seen.contains(&m) {
                        seen.push(m);
                    }
                }
            }
            seen
        };
        self.persist().await;
        for member in holders {
            self.gateway
                .notify_member(member, &format!("Location changed: **{location}**"))
                .await;
        }
    }

    /// The target location, revealed only to members holding an early slot,
    /// or to anyone in the activation roster once active.
    pub async fn location_for(&self, member: u64) -> Option<String> {
        let st = self.state.lock().await;
        let entitled = st.ledger.has_any_claim(member)
            || (st.phase == Phase::Active && st.joined.contains(&member));
        entitled.then(|| st.location.clone())
    }

    /// Claim pre-check; see [`ClaimGate`]. Checks run in a fixed order:
    /// presence, idempotence, capacity, confirmation category.
    pub async fn claim_gate(&self, member: u64, key: &str) -> ClaimGate {
        let (collecting, vc, dup, needs, category) = {
            let st = self.state.lock().await;
            (
                st.phase.is_collecting(),
                st.voice_channel,
                st.ledger.has_claimed(member, key),
                st.ledger.still_needs(key),
                st.ledger.definition(key).map(|d| d.category),
            )
        };
        if !collecting {
            return ClaimGate::Closed;
        }
        let Some(vc) = vc else { return ClaimGate::Closed };
        if !self.gateway.channel_members(vc).await.contains(&member) {
            return ClaimGate::NotInVoice;
        }
        if dup {
            return ClaimGate::Duplicate;
        }
        if !needs {
            return ClaimGate::SlotGone;
        }
        match category {
            Some(c) if c.needs_confirmation() => ClaimGate::NeedsConfirmation,
            Some(_) => ClaimGate::Ready,
            None => ClaimGate::SlotGone,
        }
    }

    /// Commits one claim. Capacity is re-checked inside the ledger, closing
    /// the window between a confirmation round-trip and this call. The
    /// persisted mirror is advisory; memory wins on divergence.
    pub async fn commit_claim(&self, member: u64, key: &str) -> ClaimOutcome {
        let (outcome, join_msg) = {
            let mut st = self.state.lock().await;
            if !st.phase.is_collecting() {
                return ClaimOutcome::SlotGone;
            }
            (st.ledger.claim(member, key), st.join_msg)
        };
        if let ClaimOutcome::Claimed { .. } = outcome {
            if let Some(mid) = join_msg {
                match self.repo.append_claim(self.guild_id, mid, key, member).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::warn!(guild = self.guild_id, raid = mid, "claim journal target vanished")
                    }
                    Err(e) => tracing::warn!(guild = self.guild_id, "claim journal write failed: {e:#}"),
                }
            }
        }
        outcome
    }

    /// External voice-state change routed here by the registry; keeps the
    /// panel's live membership count warm between refresh ticks.
    pub async fn voice_state_changed(&self) {
        let vc = {
            let st = self.state.lock().await;
            if st.phase.is_terminal() {
                return;
            }
            st.voice_channel
        };
        if let Some(vc) = vc {
            let count = self.gateway.channel_members(vc).await.len();
            let mut st = self.state.lock().await;
            st.vc_count = count;
        }
        self.refresh_panel().await;
    }

    /// Releases every owned resource. Idempotent; safe to call from any
    /// phase and from external-deletion event handlers.
    pub async fn cleanup(&self) {
        let (join_msg, panel_msg, vc) = {
            let mut st = self.state.lock().await;
            if st.phase.is_terminal() {
                return;
            }
            st.phase = Phase::Ended;
            (st.join_msg, st.panel_msg, st.voice_channel.take())
        };

        for handle in self.tasks.lock().await.drain(..) {
            handle.abort();
        }

        if let Some(mid) = join_msg {
            match self.repo.remove_raid(self.guild_id, mid).await {
                Ok(_) => {}
                Err(e) => tracing::warn!(guild = self.guild_id, "raid record removal failed: {e:#}"),
            }
        }
        if let Some(pm) = panel_msg {
            let _ = self.gateway.delete_message(self.section.control_channel, pm).await;
        }
        if let Some(jm) = join_msg {
            let _ = self.gateway.unpin_message(self.section.status_channel, jm).await;
            let view = { Self::view_locked(self, &*self.state.lock().await) };
            let _ = self
                .gateway
                .edit_surface(self.section.status_channel, jm, Surface::Join, &view)
                .await;
        }

        if let Some(vc) = vc {
            self.drain_and_delete(vc).await;
        }

        let registry = self.registry.lock().expect("registry slot").clone();
        if let (Some(weak), Some(mid)) = (registry, join_msg) {
            if let Some(reg) = weak.upgrade() {
                reg.remove(mid);
            }
        }
        tracing::info!(guild = self.guild_id, "raid cleaned up");
    }

    /// Evacuates members to a fallback channel, then waits (bounded, linear
    /// backoff) for the channel to drain before deleting it. Gives up and
    /// deletes anyway after the bound.
    async fn drain_and_delete(&self, vc: u64) {
        let fallback = self.gateway.fallback_channel(vc).await;
        for member in self.gateway.channel_members(vc).await {
            if let Some(dest) = fallback {
                let _ = self.gateway.move_member(member, dest).await;
            }
        }
        let mut drained = false;
        for attempt in 1..=EVAC_ATTEMPTS {
            if self.gateway.channel_members(vc).await.is_empty() {
                drained = true;
                break;
            }
            sleep(EVAC_BASE_DELAY * attempt).await;
        }
        if !drained {
            tracing::warn!(guild = self.guild_id, channel = vc, "voice channel never drained, deleting anyway");
        }
        let _ = self.gateway.delete_channel(vc).await;
    }

    /// Serializable snapshot; `None` until every required live resource
    /// exists.
    pub async fn snapshot(&self) -> Option<RaidSnapshot> {
        let st = self.state.lock().await;
        let (vc, jm, pm) = match (st.voice_channel, st.join_msg, st.panel_msg) {
            (Some(a), Some(b), Some(c)) => (a, b, c),
            _ => return None,
        };
        Some(RaidSnapshot {
            guild_id: self.guild_id,
            message_id: jm,
            panel_message_id: pm,
            voice_channel_id: vc,
            dungeon_code: self.dungeon.code.clone(),
            section_name: self.section.name.clone(),
            leader: self.leader,
            location: st.location.clone(),
            phase: st.phase,
            claims: st.ledger.dump(),
            joined: st.joined.clone(),
            open_deadline: st.open_deadline,
        })
    }

    /// Rebuilds an instance from a persisted snapshot plus the claim journal
    /// written after it. Refresh tasks resume; an in-flight open window
    /// picks its timer back up.
    pub async fn restore(
        creation: RaidCreation,
        snap: RaidSnapshot,
        journal: &[(String, u64)],
        gateway: Arc<dyn RaidGateway>,
        repo: Arc<dyn GuildStateRepo>,
    ) -> Arc<Self> {
        let inst = Self::new(creation, gateway, repo);
        {
            let mut st = inst.state.lock().await;
            st.phase = snap.phase;
            st.location = snap.location.clone();
            st.voice_channel = Some(snap.voice_channel_id);
            st.join_msg = Some(snap.message_id);
            st.panel_msg = Some(snap.panel_message_id);
            st.joined = snap.joined.clone();
            st.vc_count = snap.joined.len();
            st.open_deadline = snap.open_deadline;
            st.locked = snap.phase == Phase::Active;
            let flat: Vec<(String, u64)> = snap
                .claims
                .iter()
                .flat_map(|(k, members)| members.iter().map(move |m| (k.clone(), *m)))
                .collect();
            st.ledger.restore(&flat);
            st.ledger.restore(journal);
        }
        inst.spawn_refresh_tasks().await;
        if snap.phase == Phase::Open {
            let remaining = snap
                .open_deadline
                .and_then(|d| (d - Utc::now()).to_std().ok())
                .unwrap_or(Duration::ZERO);
            let weak = Arc::downgrade(&inst);
            let deadline = Instant::now() + remaining;
            let handle = tokio::spawn(async move {
                sleep_until(deadline).await;
                if let Some(inst) = weak.upgrade() {
                    let _ = inst.activate().await;
                }
            });
            inst.tasks.lock().await.push(handle);
        }
        inst
    }

    pub async fn view(&self) -> RaidView {
        let st = self.state.lock().await;
        Self::view_locked(self, &st)
    }

    fn view_locked(&self, st: &RaidState) -> RaidView {
        let reactions = st
            .resolved
            .iter()
            .map(|r| ReactionView {
                key: r.key.clone(),
                name: r.name.clone(),
                emoji: r.emoji.clone(),
                claimed: st.ledger.claimants(&r.key).len() as u32,
                cap: r.cap,
                claimants: st.ledger.claimants(&r.key).to_vec(),
                essential: r.is_essential(),
            })
            .collect();
        RaidView {
            guild_id: self.guild_id,
            message_id: st.join_msg,
            phase: st.phase,
            dungeon_code: self.dungeon.code.clone(),
            dungeon_name: self.dungeon.name.clone(),
            color: self.dungeon.color,
            icon: self.dungeon.icon.clone(),
            section_name: self.section.name.clone(),
            leader: self.leader,
            location: st.location.clone(),
            voice_channel: st.voice_channel,
            reactions,
            joined_count: if st.phase == Phase::Active { st.joined.len() } else { st.vc_count },
            open_deadline: st.open_deadline,
            locked: st.locked,
            aborted: st.aborted,
        }
    }

    async fn persist(&self) {
        if let Some(snap) = self.snapshot().await {
            if let Err(e) = self.repo.upsert_raid(self.guild_id, &snap).await {
                tracing::warn!(guild = self.guild_id, "raid snapshot write failed: {e:#}");
            }
        }
    }

    async fn refresh_surfaces(&self) {
        self.refresh_join().await;
        self.refresh_panel().await;
    }

    async fn refresh_join(&self) {
        let (view, jm) = {
            let st = self.state.lock().await;
            (Self::view_locked(self, &st), st.join_msg)
        };
        if let Some(jm) = jm {
            let _ = self
                .gateway
                .edit_surface(self.section.status_channel, jm, Surface::Join, &view)
                .await;
        }
    }

    async fn refresh_panel(&self) {
        let (view, pm) = {
            let st = self.state.lock().await;
            (Self::view_locked(self, &st), st.panel_msg)
        };
        if let Some(pm) = pm {
            let _ = self
                .gateway
                .edit_surface(self.section.control_channel, pm, Surface::Panel, &view)
                .await;
        }
    }

    /// Periodic display refresh, owned by the instance and stopped with it.
    /// Failures are swallowed; the next tick overwrites.
    async fn spawn_refresh_tasks(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let join_task = tokio::spawn(async move {
            let mut tick = interval(JOIN_REFRESH);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let Some(inst) = weak.upgrade() else { break };
                let phase = inst.phase().await;
                if phase.is_terminal() {
                    break;
                }
                if phase.is_collecting() {
                    inst.refresh_join().await;
                }
            }
        });

        let weak = Arc::downgrade(self);
        let panel_task = tokio::spawn(async move {
            let mut tick = interval(PANEL_REFRESH);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let Some(inst) = weak.upgrade() else { break };
                if inst.phase().await.is_terminal() {
                    break;
                }
                let vc = inst.voice_channel_id().await;
                if let Some(vc) = vc {
                    let count = inst.gateway.channel_members(vc).await.len();
                    inst.state.lock().await.vc_count = count;
                }
                inst.refresh_panel().await;
            }
        });

        let mut tasks = self.tasks.lock().await;
        tasks.push(join_task);
        tasks.push(panel_task);
    }
}
