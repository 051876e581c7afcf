//! Quota orchestration: ledger registry, best-ledger routing for awards,
//! the reset sweep, and the live leaderboard refresh loop.

use crate::config::GuildConfig;
use crate::ports::{GuildStateRepo, QuotaSurface};
use crate::quota::report::{render_leaderboard, render_reset_report, Row};
use crate::quota::{QuotaLedger, ResetAnchor};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Reset sweep cadence; cheap, so coarse is fine.
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);
/// Leaderboard refresh cadence.
const LEADERBOARD_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default)]
struct GuildQuotaSettings {
    anchor: ResetAnchor,
    quota_channel: Option<u64>,
    storage_channel: Option<u64>,
}

pub struct QuotaManager {
    repo: Arc<dyn GuildStateRepo>,
    ledgers: Mutex<HashMap<(u64, u64), QuotaLedger>>,
    settings: Mutex<HashMap<u64, GuildQuotaSettings>>,
}

impl QuotaManager {
    pub fn new(repo: Arc<dyn GuildStateRepo>) -> Arc<Self> {
        Arc::new(Self {
            repo,
            ledgers: Mutex::new(HashMap::new()),
            settings: Mutex::new(HashMap::new()),
        })
    }

    /// Pulls a guild's persisted ledgers into memory and records its reset
    /// anchor and channels. Called at startup and after config changes.
    pub async fn load_guild(&self, guild_id: u64, cfg: &GuildConfig) -> anyhow::Result<()> {
        let loaded = self.repo.load_quotas(guild_id).await?;
        {
            let mut ledgers = self.ledgers.lock().await;
            for ledger in loaded {
                ledgers.insert((guild_id, ledger.role_id), ledger);
            }
        }
        self.apply_settings(guild_id, cfg).await;
        Ok(())
    }

    pub async fn apply_settings(&self, guild_id: u64, cfg: &GuildConfig) {
        self.settings.lock().await.insert(
            guild_id,
            GuildQuotaSettings {
                anchor: cfg.quota_anchor.clone(),
                quota_channel: cfg.quota_channel,
                storage_channel: cfg.storage_channel,
            },
        );
    }

    /// Creates or reshapes the ledger for a role. Existing log entries
    /// survive a threshold or value change within the cycle.
    pub async fn configure(
        &self,
        guild_id: u64,
        role_id: u64,
        threshold: i64,
        values: Vec<(String, i64)>,
    ) -> anyhow::Result<()> {
        let snapshot = {
            let mut ledgers = self.ledgers.lock().await;
            let ledger = ledgers
                .entry((guild_id, role_id))
                .or_insert_with(|| QuotaLedger::new(guild_id, role_id, threshold));
            ledger.threshold = threshold;
            for (k, v) in values {
                ledger.point_values.insert(k, v);
            }
            ledger.clone()
        };
        self.repo.save_quota(guild_id, &snapshot).await
    }

    /// Ledgers that could absorb an award of `log_type` for this member:
    /// member holds the role, threshold set, and the type is worth points
    /// there. Paired with the member's current completion ratio.
    pub async fn eligible_ledgers(
        &self,
        surface: &dyn QuotaSurface,
        guild_id: u64,
        member: u64,
        log_type: &str,
    ) -> Vec<(u64, f64)> {
        let candidates: Vec<(u64, f64)> = {
            let ledgers = self.ledgers.lock().await;
            ledgers
                .values()
                .filter(|l| l.guild_id == guild_id)
                .filter(|l| l.threshold > 0 && l.point_value(log_type) > 0)
                .map(|l| (l.role_id, l.ratio(member)))
                .collect()
        };
        let mut out = Vec::new();
        for (role_id, ratio) in candidates {
            if surface.role_members(guild_id, role_id).await.contains(&member) {
                out.push((role_id, ratio));
            }
        }
        out
    }

    /// Routes an award to the ledger where the member is furthest from
    /// completion. Ties break toward the lower role id for determinism.
    pub async fn find_best_ledger(
        &self,
        surface: &dyn QuotaSurface,
        guild_id: u64,
        member: u64,
        log_type: &str,
    ) -> Option<u64> {
        let mut eligible = self.eligible_ledgers(surface, guild_id, member, log_type).await;
        eligible.sort_by(|a, b| {
            a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0))
        });
        eligible.first().map(|(role, _)| *role)
    }

    /// Appends a log entry and persists. Returns the member's new total, or
    /// `None` when no such ledger exists.
    pub async fn credit(
        &self,
        guild_id: u64,
        role_id: u64,
        member: u64,
        log_type: &str,
        amount: i64,
    ) -> Option<i64> {
        let (snapshot, total) = {
            let mut ledgers = self.ledgers.lock().await;
            let ledger = ledgers.get_mut(&(guild_id, role_id))?;
            ledger.credit(member, log_type, amount);
            (ledger.clone(), ledger.total_points(member))
        };
        if let Err(e) = self.repo.save_quota(guild_id, &snapshot).await {
            tracing::warn!(guild = guild_id, role = role_id, "quota persist failed: {e:#}");
        }
        Some(total)
    }

    pub async fn total_points(&self, guild_id: u64, role_id: u64, member: u64) -> Option<i64> {
        let ledgers = self.ledgers.lock().await;
        ledgers.get(&(guild_id, role_id)).map(|l| l.total_points(member))
    }

    pub async fn breakdown(
        &self,
        guild_id: u64,
        role_id: u64,
        member: u64,
    ) -> Option<Vec<(String, i64, i64)>> {
        let ledgers = self.ledgers.lock().await;
        ledgers.get(&(guild_id, role_id)).map(|l| l.breakdown(member))
    }

    pub async fn tracked_roles(&self, guild_id: u64) -> Vec<u64> {
        let ledgers = self.ledgers.lock().await;
        let mut roles: Vec<u64> = ledgers
            .values()
            .filter(|l| l.guild_id == guild_id)
            .map(|l| l.role_id)
            .collect();
        roles.sort_unstable();
        roles
    }

    /// Tracked role deleted out from under us: the ledger goes with it.
    pub async fn handle_role_deleted(&self, guild_id: u64, role_id: u64) {
        let removed = self.ledgers.lock().await.remove(&(guild_id, role_id)).is_some();
        if removed {
            match self.repo.delete_quota(guild_id, role_id).await {
                Ok(_) => tracing::info!(guild = guild_id, role = role_id, "dropped quota ledger for deleted role"),
                Err(e) => tracing::warn!(guild = guild_id, role = role_id, "quota delete failed: {e:#}"),
            }
        }
    }

    async fn rows_for(
        &self,
        surface: &dyn QuotaSurface,
        ledger: &QuotaLedger,
    ) -> Vec<Row> {
        let mut members: BTreeSet<u64> =
            surface.role_members(ledger.guild_id, ledger.role_id).await.into_iter().collect();
        members.extend(ledger.members_logged());
        let mut rows = Vec::with_capacity(members.len());
        for m in members {
            rows.push(Row {
                name: surface.display_name(ledger.guild_id, m).await,
                points: ledger.total_points(m),
            });
        }
        rows
    }

    /// Closes one ledger's cycle immediately: report, archive or embed,
    /// clear the log, advance the anchor, repaint the leaderboard.
    pub async fn reset_quota(
        &self,
        surface: &dyn QuotaSurface,
        guild_id: u64,
        role_id: u64,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if !surface.role_exists(guild_id, role_id) {
            self.handle_role_deleted(guild_id, role_id).await;
            return Ok(());
        }
        let settings = self.settings.lock().await.get(&guild_id).cloned().unwrap_or_default();
        let before = {
            let ledgers = self.ledgers.lock().await;
            match ledgers.get(&(guild_id, role_id)) {
                Some(l) => l.clone(),
                None => return Ok(()),
            }
        };

        let role_name = format!("<@&{role_id}>");
        let rows = self.rows_for(surface, &before).await;
        let report = render_reset_report(&role_name, &before, rows, now);
        if !surface.archive_report(guild_id, settings.storage_channel, &report).await {
            if let Some(ch) = settings.quota_channel {
                if let Err(e) = surface.post_message(ch, &report).await {
                    tracing::warn!(guild = guild_id, "reset report post failed: {e:#}");
                }
            }
        }

        let snapshot = {
            let mut ledgers = self.ledgers.lock().await;
            let Some(ledger) = ledgers.get_mut(&(guild_id, role_id)) else { return Ok(()) };
            ledger.log.clear();
            // Advance the cycle mark to the most recent anchor at or before
            // now, so a late sweep does not fire twice.
            let mut mark = ledger.last_reset;
            loop {
                let next = settings.anchor.next_reset_after(mark);
                if next <= now {
                    mark = next;
                } else {
                    break;
                }
            }
            ledger.last_reset = if mark > ledger.last_reset { mark } else { now };
            ledger.clone()
        };
        self.repo.save_quota(guild_id, &snapshot).await?;
        self.repaint_leaderboard(surface, guild_id, role_id).await;
        tracing::info!(guild = guild_id, role = role_id, "quota cycle reset");
        Ok(())
    }

    /// One pass over every ledger, resetting those whose anchor has passed.
    pub async fn sweep(&self, surface: &dyn QuotaSurface, now: DateTime<Utc>) {
        let due: Vec<(u64, u64)> = {
            let settings = self.settings.lock().await;
            let ledgers = self.ledgers.lock().await;
            ledgers
                .values()
                .filter(|l| {
                    settings
                        .get(&l.guild_id)
                        .map(|s| s.anchor.due(l.last_reset, now))
                        .unwrap_or(false)
                })
                .map(|l| (l.guild_id, l.role_id))
                .collect()
        };
        for (guild, role) in due {
            if let Err(e) = self.reset_quota(surface, guild, role, now).await {
                tracing::warn!(guild, role, "quota reset failed: {e:#}");
            }
        }
    }

    /// Renders and writes one ledger's leaderboard, recreating the message
    /// if the old one is gone.
    async fn repaint_leaderboard(&self, surface: &dyn QuotaSurface, guild_id: u64, role_id: u64) {
        let settings = self.settings.lock().await.get(&guild_id).cloned().unwrap_or_default();
        let Some(channel) = settings.quota_channel else { return };
        let ledger = {
            let ledgers = self.ledgers.lock().await;
            match ledgers.get(&(guild_id, role_id)) {
                Some(l) => l.clone(),
                None => return,
            }
        };
        if !surface.role_exists(guild_id, role_id) {
            return;
        }
        let rows = self.rows_for(surface, &ledger).await;
        let next = settings.anchor.next_reset_after(ledger.last_reset);
        let text = render_leaderboard(&format!("<@&{role_id}>"), &ledger, rows, next);

        let existing = ledger.leaderboard_msg;
        let still_there = match existing {
            Some((ch, msg)) => surface.edit_message(ch, msg, &text).await.unwrap_or(false),
            None => false,
        };
        if still_there {
            return;
        }
        match surface.post_message(channel, &text).await {
            Ok(msg) => {
                let snapshot = {
                    let mut ledgers = self.ledgers.lock().await;
                    match ledgers.get_mut(&(guild_id, role_id)) {
                        Some(l) => {
                            l.leaderboard_msg = Some((channel, msg));
                            Some(l.clone())
                        }
                        None => None,
                    }
                };
                if let Some(snap) = snapshot {
                    if let Err(e) = self.repo.save_quota(guild_id, &snap).await {
                        tracing::warn!(guild = guild_id, "leaderboard pointer persist failed: {e:#}");
                    }
                }
            }
            Err(e) => tracing::warn!(guild = guild_id, "leaderboard post failed: {e:#}"),
        }
    }

    pub async fn refresh_leaderboards(&self, surface: &dyn QuotaSurface) {
        let keys: Vec<(u64, u64)> = {
            let ledgers = self.ledgers.lock().await;
            ledgers.keys().copied().collect()
        };
        for (guild, role) in keys {
            self.repaint_leaderboard(surface, guild, role).await;
        }
    }

    /// Background loops, started once the gateway session is ready.
    pub fn spawn_loops(self: &Arc<Self>, surface: Arc<dyn QuotaSurface>) {
        let mgr = self.clone();
        let sweep_surface = surface.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(SWEEP_INTERVAL);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                mgr.sweep(sweep_surface.as_ref(), Utc::now()).await;
            }
        });

        let mgr = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(LEADERBOARD_INTERVAL);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                mgr.refresh_leaderboards(surface.as_ref()).await;
            }
        });
    }
}
