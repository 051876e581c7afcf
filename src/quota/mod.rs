//! Quota point ledgers: per-(guild, role) point accounting over a repeating
//! reset cycle anchored to a wall-clock instant in a configured timezone.

pub mod report;
pub mod service;

pub use service::QuotaManager;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// One credited action. `log_type` may carry a dungeon qualifier after a
/// colon, e.g. `RunComplete:SHATTERS`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaLogEntry {
    pub member: u64,
    pub log_type: String,
    pub amount: i64,
    pub at: DateTime<Utc>,
}

/// Point ledger for one tracked role. The log is the source of truth;
/// totals are always recomputed from it so point-value edits apply
/// retroactively within the cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaLedger {
    pub guild_id: u64,
    pub role_id: u64,
    /// Points per log type; a `Type:DUNGEON` key beats the bare `Type` key.
    pub point_values: HashMap<String, i64>,
    pub threshold: i64,
    pub last_reset: DateTime<Utc>,
    #[serde(default)]
    pub log: Vec<QuotaLogEntry>,
    /// (channel, message) of the live leaderboard, if one was posted.
    #[serde(default)]
    pub leaderboard_msg: Option<(u64, u64)>,
}

impl QuotaLedger {
    pub fn new(guild_id: u64, role_id: u64, threshold: i64) -> Self {
        Self {
            guild_id,
            role_id,
            point_values: HashMap::new(),
            threshold,
            last_reset: Utc::now(),
            log: Vec::new(),
            leaderboard_msg: None,
        }
    }

    /// Dungeon-qualified lookup with fallback to the unqualified type.
    /// Types with no configured value are worth nothing.
    pub fn point_value(&self, log_type: &str) -> i64 {
        if let Some(v) = self.point_values.get(log_type) {
            return *v;
        }
        match log_type.split_once(':') {
            Some((base, _)) => self.point_values.get(base).copied().unwrap_or(0),
            None => 0,
        }
    }

    pub fn credit(&mut self, member: u64, log_type: &str, amount: i64) {
        self.log.push(QuotaLogEntry {
            member,
            log_type: log_type.to_string(),
            amount,
            at: Utc::now(),
        });
    }

    pub fn total_points(&self, member: u64) -> i64 {
        self.log
            .iter()
            .filter(|e| e.member == member)
            .map(|e| self.point_value(&e.log_type) * e.amount)
            .sum()
    }

    /// Per-type totals for one member, for the points breakdown view.
    pub fn breakdown(&self, member: u64) -> Vec<(String, i64, i64)> {
        let mut order: Vec<String> = Vec::new();
        let mut acc: HashMap<String, (i64, i64)> = HashMap::new();
        for e in self.log.iter().filter(|e| e.member == member) {
            let slot = acc.entry(e.log_type.clone()).or_insert_with(|| {
                order.push(e.log_type.clone());
                (0, 0)
            });
            slot.0 += e.amount;
            slot.1 += self.point_value(&e.log_type) * e.amount;
        }
        order
            .into_iter()
            .map(|t| {
                let (count, points) = acc[&t];
                (t, count, points)
            })
            .collect()
    }

    /// Everyone with at least one log entry this cycle, whether or not they
    /// still hold the role.
    pub fn members_logged(&self) -> Vec<u64> {
        let set: BTreeSet<u64> = self.log.iter().map(|e| e.member).collect();
        set.into_iter().collect()
    }

    /// Completion fraction against the threshold, clamped at zero below.
    /// Ledgers with no threshold are never selectable, so callers check
    /// `threshold > 0` first.
    pub fn ratio(&self, member: u64) -> f64 {
        if self.threshold <= 0 {
            return f64::INFINITY;
        }
        self.total_points(member).max(0) as f64 / self.threshold as f64
    }
}

/// Wall-clock anchor for the repeating reset: a weekday + time of day in a
/// named timezone. Stored by name so DST shifts track the zone's rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetAnchor {
    pub weekday: Weekday,
    pub hour: u32,
    pub minute: u32,
    pub tz: String,
}

impl Default for ResetAnchor {
    fn default() -> Self {
        Self { weekday: Weekday::Sun, hour: 0, minute: 0, tz: "UTC".to_string() }
    }
}

impl ResetAnchor {
    fn zone(&self) -> Tz {
        self.tz.parse().unwrap_or(chrono_tz::UTC)
    }

    /// First anchor instant strictly after `after`. Skipped local times
    /// (spring-forward gaps) roll to the next day's anchor; ambiguous times
    /// take the earlier offset.
    pub fn next_reset_after(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let tz = self.zone();
        let local = after.with_timezone(&tz);
        let mut day = local.date_naive();
        for _ in 0..14 {
            if day.weekday() == self.weekday {
                let naive = day.and_hms_opt(self.hour, self.minute, 0);
                let candidate = naive.and_then(|n| match tz.from_local_datetime(&n) {
                    chrono::LocalResult::Single(dt) => Some(dt),
                    chrono::LocalResult::Ambiguous(a, _) => Some(a),
                    chrono::LocalResult::None => None,
                });
                if let Some(dt) = candidate {
                    let utc = dt.with_timezone(&Utc);
                    if utc > after {
                        return utc;
                    }
                }
            }
            day = day.succ_opt().unwrap_or(day);
        }
        // Unreachable with a sane anchor; fall back to a flat week.
        after + Duration::weeks(1)
    }

    pub fn due(&self, last_reset: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.next_reset_after(last_reset) <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ledger() -> QuotaLedger {
        let mut l = QuotaLedger::new(1, 10, 20);
        l.point_values.insert("RunComplete".into(), 2);
        l.point_values.insert("RunComplete:SHATTERS".into(), 5);
        l.point_values.insert("KeyPop".into(), 3);
        l
    }

    #[test]
    fn qualified_value_beats_unqualified_fallback() {
        let l = ledger();
        assert_eq!(l.point_value("RunComplete:SHATTERS"), 5);
        assert_eq!(l.point_value("RunComplete:VOID"), 2);
        assert_eq!(l.point_value("RunComplete"), 2);
        assert_eq!(l.point_value("Mystery"), 0);
        assert_eq!(l.point_value("Mystery:VOID"), 0);
    }

    #[test]
    fn totals_recompute_from_the_log() {
        let mut l = ledger();
        l.credit(7, "RunComplete:SHATTERS", 1);
        l.credit(7, "RunComplete:SHATTERS", 1);
        l.credit(7, "KeyPop", 2);
        l.credit(8, "RunComplete", 1);
        assert_eq!(l.total_points(7), 5 + 5 + 6);
        assert_eq!(l.total_points(8), 2);
        assert_eq!(l.total_points(9), 0);

        // A later value edit applies retroactively.
        l.point_values.insert("KeyPop".into(), 1);
        assert_eq!(l.total_points(7), 5 + 5 + 2);
    }

    #[test]
    fn breakdown_groups_by_type() {
        let mut l = ledger();
        l.credit(7, "RunComplete:SHATTERS", 1);
        l.credit(7, "KeyPop", 1);
        l.credit(7, "RunComplete:SHATTERS", 2);
        let rows = l.breakdown(7);
        assert_eq!(rows[0], ("RunComplete:SHATTERS".into(), 3, 15));
        assert_eq!(rows[1], ("KeyPop".into(), 1, 3));
    }

    #[test]
    fn members_logged_survive_role_loss() {
        let mut l = ledger();
        l.credit(3, "KeyPop", 1);
        l.credit(1, "KeyPop", 1);
        l.credit(3, "KeyPop", 1);
        assert_eq!(l.members_logged(), vec![1, 3]);
    }

    #[test]
    fn next_reset_lands_on_the_anchor() {
        let anchor = ResetAnchor {
            weekday: Weekday::Sun,
            hour: 0,
            minute: 0,
            tz: "America/New_York".into(),
        };
        // Wednesday 2026-08-26 12:00 UTC.
        let now = Utc.with_ymd_and_hms(2026, 8, 26, 12, 0, 0).unwrap();
        let next = anchor.next_reset_after(now);
        // Sunday 2026-08-30 00:00 EDT == 04:00 UTC.
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 8, 30, 4, 0, 0).unwrap());
        assert!(next > now);

        // The anchor instant itself is not "after" itself.
        let following = anchor.next_reset_after(next);
        assert_eq!(following, Utc.with_ymd_and_hms(2026, 9, 6, 4, 0, 0).unwrap());
    }

    #[test]
    fn due_once_per_cycle() {
        let anchor = ResetAnchor::default();
        let last = Utc.with_ymd_and_hms(2026, 8, 24, 0, 0, 0).unwrap(); // Monday
        assert!(!anchor.due(last, Utc.with_ymd_and_hms(2026, 8, 29, 23, 0, 0).unwrap()));
        assert!(anchor.due(last, Utc.with_ymd_and_hms(2026, 8, 30, 0, 0, 0).unwrap()));
    }
}
