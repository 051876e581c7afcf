//! Quota ledger routing, the reset cycle, and leaderboard upkeep against the
//! in-memory store and surface.

mod common;

use chrono::{TimeZone, Utc};
use common::{FakeQuotaSurface, MemoryRepo};
use raidcoord::config::GuildConfig;
use raidcoord::discord::NullScreenshotParser;
use raidcoord::handlers::{PendingAward, Services, AWARD_WINDOW};
use raidcoord::ports::GuildStateRepo;
use raidcoord::quota::{QuotaLedger, QuotaManager};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const GUILD: u64 = 1;
const MEMBER: u64 = 42;

#[tokio::test]
async fn best_ledger_is_the_furthest_from_completion() {
    let repo = MemoryRepo::new();
    let mgr = QuotaManager::new(repo.clone());
    let surface = FakeQuotaSurface::new();

    for role in [1u64, 2, 3] {
        mgr.configure(GUILD, role, 10, vec![("Run".into(), 1)]).await.unwrap();
        surface.add_role(GUILD, role, vec![MEMBER]);
    }
    mgr.credit(GUILD, 1, MEMBER, "Run", 2).await.unwrap();
    mgr.credit(GUILD, 2, MEMBER, "Run", 5).await.unwrap();
    mgr.credit(GUILD, 3, MEMBER, "Run", 9).await.unwrap();

    let best = mgr.find_best_ledger(surface.as_ref(), GUILD, MEMBER, "Run").await;
    assert_eq!(best, Some(1));
}

#[tokio::test]
async fn best_ledger_ties_break_toward_lower_role_id() {
    let repo = MemoryRepo::new();
    let mgr = QuotaManager::new(repo.clone());
    let surface = FakeQuotaSurface::new();

    for role in [8u64, 7] {
        mgr.configure(GUILD, role, 10, vec![("Run".into(), 1)]).await.unwrap();
        surface.add_role(GUILD, role, vec![MEMBER]);
    }
    let best = mgr.find_best_ledger(surface.as_ref(), GUILD, MEMBER, "Run").await;
    assert_eq!(best, Some(7));
}

#[tokio::test]
async fn eligibility_excludes_unheld_thresholdless_and_worthless() {
    let repo = MemoryRepo::new();
    let mgr = QuotaManager::new(repo.clone());
    let surface = FakeQuotaSurface::new();

    // Qualifies.
    mgr.configure(GUILD, 1, 10, vec![("Run".into(), 1)]).await.unwrap();
    surface.add_role(GUILD, 1, vec![MEMBER]);
    // Member does not hold the role.
    mgr.configure(GUILD, 2, 10, vec![("Run".into(), 1)]).await.unwrap();
    surface.add_role(GUILD, 2, vec![99]);
    // No threshold set.
    mgr.configure(GUILD, 3, 0, vec![("Run".into(), 1)]).await.unwrap();
    surface.add_role(GUILD, 3, vec![MEMBER]);
    // Log type worth nothing there.
    mgr.configure(GUILD, 4, 10, vec![("Assist".into(), 1)]).await.unwrap();
    surface.add_role(GUILD, 4, vec![MEMBER]);

    let eligible = mgr.eligible_ledgers(surface.as_ref(), GUILD, MEMBER, "Run").await;
    assert_eq!(eligible.len(), 1);
    assert_eq!(eligible[0].0, 1);
}

#[tokio::test]
async fn qualified_log_types_beat_the_bare_fallback() {
    let repo = MemoryRepo::new();
    let mgr = QuotaManager::new(repo.clone());
    mgr.configure(GUILD, 1, 10, vec![("Run".into(), 1), ("Run:SHATTERS".into(), 5)])
        .await
        .unwrap();

    mgr.credit(GUILD, 1, MEMBER, "Run:SHATTERS", 1).await.unwrap();
    assert_eq!(mgr.total_points(GUILD, 1, MEMBER).await, Some(5));
    // Unconfigured qualifier falls back to the bare type.
    mgr.credit(GUILD, 1, MEMBER, "Run:CULT", 1).await.unwrap();
    assert_eq!(mgr.total_points(GUILD, 1, MEMBER).await, Some(6));
    // Unknown type logs but scores nothing.
    mgr.credit(GUILD, 1, MEMBER, "Mystery", 1).await.unwrap();
    assert_eq!(mgr.total_points(GUILD, 1, MEMBER).await, Some(6));
}

#[tokio::test]
async fn credit_persists_the_ledger() {
    let repo = MemoryRepo::new();
    let mgr = QuotaManager::new(repo.clone());
    mgr.configure(GUILD, 1, 10, vec![("Run".into(), 2)]).await.unwrap();
    mgr.credit(GUILD, 1, MEMBER, "Run", 3).await.unwrap();

    let stored = repo.quotas.lock().unwrap().get(&(GUILD, 1)).cloned().unwrap();
    assert_eq!(stored.log.len(), 1);
    assert_eq!(stored.total_points(MEMBER), 6);
}

#[tokio::test]
async fn reset_archives_report_clears_log_and_advances_the_cycle() {
    let repo = MemoryRepo::new();
    let mgr = QuotaManager::new(repo.clone());
    let surface = FakeQuotaSurface::new();
    surface.add_role(GUILD, 1, vec![MEMBER]);

    let cfg = GuildConfig {
        quota_channel: Some(99),
        storage_channel: Some(77),
        ..Default::default()
    };
    mgr.apply_settings(GUILD, &cfg).await;
    mgr.configure(GUILD, 1, 10, vec![("Run".into(), 1)]).await.unwrap();
    mgr.credit(GUILD, 1, MEMBER, "Run", 12).await.unwrap();
    let before = repo.quotas.lock().unwrap().get(&(GUILD, 1)).cloned().unwrap();

    mgr.reset_quota(surface.as_ref(), GUILD, 1, Utc::now()).await.unwrap();

    // Storage sink configured, so the report is archived, not posted.
    assert_eq!(surface.archives.lock().unwrap().len(), 1);
    assert_eq!(mgr.total_points(GUILD, 1, MEMBER).await, Some(0));
    let after = repo.quotas.lock().unwrap().get(&(GUILD, 1)).cloned().unwrap();
    assert!(after.log.is_empty());
    assert!(after.last_reset > before.last_reset);
    // Leaderboard repainted into the quota channel.
    assert!(surface.posts.lock().unwrap().iter().any(|(ch, _)| *ch == 99));
}

#[tokio::test]
async fn reset_without_archive_sink_posts_the_report() {
    let repo = MemoryRepo::new();
    let mgr = QuotaManager::new(repo.clone());
    let surface = FakeQuotaSurface::new();
    surface.add_role(GUILD, 1, vec![MEMBER]);

    let cfg = GuildConfig { quota_channel: Some(99), ..Default::default() };
    mgr.apply_settings(GUILD, &cfg).await;
    mgr.configure(GUILD, 1, 10, vec![("Run".into(), 1)]).await.unwrap();
    mgr.credit(GUILD, 1, MEMBER, "Run", 4).await.unwrap();

    mgr.reset_quota(surface.as_ref(), GUILD, 1, Utc::now()).await.unwrap();

    assert!(surface.archives.lock().unwrap().is_empty());
    // Report and leaderboard both land in the quota channel.
    assert!(surface.posts.lock().unwrap().iter().filter(|(ch, _)| *ch == 99).count() >= 2);
}

#[tokio::test]
async fn sweep_resets_due_ledgers_exactly_once() {
    let repo = MemoryRepo::new();
    let mgr = QuotaManager::new(repo.clone());
    let surface = FakeQuotaSurface::new();
    surface.add_role(GUILD, 1, vec![MEMBER]);

    // A ledger whose last reset predates the most recent Sunday anchor.
    let mut ledger = QuotaLedger::new(GUILD, 1, 10);
    ledger.point_values.insert("Run".into(), 1);
    ledger.last_reset = Utc.with_ymd_and_hms(2026, 8, 12, 0, 0, 0).unwrap();
    ledger.credit(MEMBER, "Run", 3);
    repo.save_quota(GUILD, &ledger).await.unwrap();

    let cfg = GuildConfig { storage_channel: Some(77), ..Default::default() };
    mgr.load_guild(GUILD, &cfg).await.unwrap();

    // Wednesday after the 2026-08-23 anchor.
    let now = Utc.with_ymd_and_hms(2026, 8, 26, 12, 0, 0).unwrap();
    mgr.sweep(surface.as_ref(), now).await;
    assert_eq!(surface.archives.lock().unwrap().len(), 1);
    let after = repo.quotas.lock().unwrap().get(&(GUILD, 1)).cloned().unwrap();
    assert_eq!(after.last_reset, Utc.with_ymd_and_hms(2026, 8, 23, 0, 0, 0).unwrap());

    // Same instant again: the cycle mark already advanced.
    mgr.sweep(surface.as_ref(), now).await;
    assert_eq!(surface.archives.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn deleted_role_drops_the_ledger() {
    let repo = MemoryRepo::new();
    let mgr = QuotaManager::new(repo.clone());
    let surface = FakeQuotaSurface::new();

    mgr.configure(GUILD, 1, 10, vec![("Run".into(), 1)]).await.unwrap();
    mgr.credit(GUILD, 1, MEMBER, "Run", 2).await.unwrap();
    // Role never existed on the surface, so a reset treats it as deleted.
    mgr.reset_quota(surface.as_ref(), GUILD, 1, Utc::now()).await.unwrap();

    assert!(mgr.tracked_roles(GUILD).await.is_empty());
    assert!(repo.quotas.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn abandoned_award_prompts_are_swept_on_the_next_queue() {
    let services = Services::new(MemoryRepo::new(), Arc::new(NullScreenshotParser));
    let award = || PendingAward {
        guild_id: GUILD,
        target: MEMBER,
        log_type: "Run".into(),
        amount: 1,
        expires: Instant::now() + AWARD_WINDOW,
    };

    services.queue_award(1, 100, award());
    services.queue_award(2, 200, award());
    assert_eq!(services.pending_awards.len(), 2);

    // Both prompts expire unanswered; the next queue purges them.
    tokio::time::sleep(AWARD_WINDOW + Duration::from_secs(1)).await;
    services.queue_award(3, 300, award());
    assert_eq!(services.pending_awards.len(), 1);
    assert!(services.pending_awards.contains_key(&(3, 300)));
}

#[tokio::test]
async fn leaderboard_is_recreated_when_its_message_dies() {
    let repo = MemoryRepo::new();
    let mgr = QuotaManager::new(repo.clone());
    let surface = FakeQuotaSurface::new();
    surface.add_role(GUILD, 1, vec![MEMBER]);

    let cfg = GuildConfig { quota_channel: Some(99), ..Default::default() };
    mgr.apply_settings(GUILD, &cfg).await;
    mgr.configure(GUILD, 1, 10, vec![("Run".into(), 1)]).await.unwrap();

    mgr.refresh_leaderboards(surface.as_ref()).await;
    assert_eq!(surface.posts.lock().unwrap().len(), 1);
    let first = repo
        .quotas
        .lock()
        .unwrap()
        .get(&(GUILD, 1))
        .cloned()
        .unwrap()
        .leaderboard_msg
        .unwrap();

    // A later refresh edits in place.
    mgr.refresh_leaderboards(surface.as_ref()).await;
    assert_eq!(surface.posts.lock().unwrap().len(), 1);

    surface.kill_message(first.1);
    mgr.refresh_leaderboards(surface.as_ref()).await;
    assert_eq!(surface.posts.lock().unwrap().len(), 2);
    let second = repo
        .quotas
        .lock()
        .unwrap()
        .get(&(GUILD, 1))
        .cloned()
        .unwrap()
        .leaderboard_msg
        .unwrap();
    assert_ne!(first.1, second.1);
}
