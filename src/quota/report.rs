//! Pure rendering for the quota surfaces: the live leaderboard and the
//! end-of-cycle reset report. Kept free of Discord types so the cycle tests
//! can assert on exact text.

use crate::quota::QuotaLedger;
use chrono::{DateTime, Utc};

/// Where a member stands against the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Standing {
    Complete,
    Partial,
    Untouched,
}

pub fn classify(points: i64, threshold: i64) -> Standing {
    if threshold > 0 && points >= threshold {
        Standing::Complete
    } else if points > 0 {
        Standing::Partial
    } else {
        Standing::Untouched
    }
}

fn marker(s: Standing) -> &'static str {
    match s {
        Standing::Complete => "✅",
        Standing::Partial => "🔸",
        Standing::Untouched => "❌",
    }
}

/// One leaderboard row input: member display name and their cycle total.
pub struct Row {
    pub name: String,
    pub points: i64,
}

/// Live leaderboard text: highest totals first, completion marker per row,
/// next reset stamped in the footer.
pub fn render_leaderboard(
    role_name: &str,
    ledger: &QuotaLedger,
    mut rows: Vec<Row>,
    next_reset: DateTime<Utc>,
) -> String {
    rows.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| a.name.cmp(&b.name)));
    let mut out = format!("**Quota — {role_name}** (threshold {})\n", ledger.threshold);
    if rows.is_empty() {
        out.push_str("_nobody tracked this cycle_\n");
    }
    for (i, row) in rows.iter().enumerate() {
        let standing = classify(row.points, ledger.threshold);
        out.push_str(&format!(
            "`{:>2}.` {} {} — **{}**\n",
            i + 1,
            marker(standing),
            row.name,
            row.points
        ));
    }
    out.push_str(&format!("\nResets <t:{}:R>", next_reset.timestamp()));
    out
}

/// Final report for the cycle being closed; same rows, but grouped by
/// standing so staff can scan who missed.
pub fn render_reset_report(
    role_name: &str,
    ledger: &QuotaLedger,
    rows: Vec<Row>,
    closed_at: DateTime<Utc>,
) -> String {
    let mut complete = Vec::new();
    let mut partial = Vec::new();
    let mut untouched = Vec::new();
    for row in rows {
        match classify(row.points, ledger.threshold) {
            Standing::Complete => complete.push(row),
            Standing::Partial => partial.push(row),
            Standing::Untouched => untouched.push(row),
        }
    }
    for group in [&mut complete, &mut partial] {
        group.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| a.name.cmp(&b.name)));
    }
    untouched.sort_by(|a, b| a.name.cmp(&b.name));

    let mut out = format!(
        "**Quota report — {role_name}** (threshold {}, closed <t:{}:f>)\n",
        ledger.threshold,
        closed_at.timestamp()
    );
    let section = |out: &mut String, title: &str, rows: &[Row]| {
        if rows.is_empty() {
            return;
        }
        out.push_str(&format!("\n__{title}__\n"));
        for row in rows {
            out.push_str(&format!("{} — {}\n", row.name, row.points));
        }
    };
    section(&mut out, "Met quota", &complete);
    section(&mut out, "Partial", &partial);
    section(&mut out, "No activity", &untouched);
    out
}
