use crate::raid::{Phase, RaidView};
use serenity::all::CreateEmbed;

fn essentials_block(view: &RaidView) -> String {
    view.reactions
        .iter()
        .filter(|r| r.essential)
        .map(|r| {
            format!("{} **{}** {}/{}", r.emoji.as_deref().unwrap_or(""), r.name, r.claimed, r.cap)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Public join announcement. Never carries the location.
pub fn render_join_embed(view: &RaidView) -> CreateEmbed {
    let status = match view.phase {
        Phase::Pending => "Setting up...".to_string(),
        Phase::PreOpen => "Pre-open: priority claimants may connect now.".to_string(),
        Phase::Open => match view.open_deadline {
            Some(d) => format!("Open! Locks <t:{}:R>.", d.timestamp()),
            None => "Open!".to_string(),
        },
        Phase::Active => format!("Running with {} raiders.", view.joined_count),
        Phase::Ended if view.aborted => "Aborted.".to_string(),
        Phase::Ended => "Finished. Thanks for raiding!".to_string(),
    };

    let mut e = CreateEmbed::new()
        .title(format!("{} {} — {}", view.icon, view.dungeon_name, view.section_name))
        .color(view.color)
        .description(format!("Led by <@{}>\n{}", view.leader, status));

    if !view.phase.is_terminal() {
        if let Some(vc) = view.voice_channel {
            e = e.field("Voice", format!("<#{vc}>"), true);
        }
        let essentials = essentials_block(view);
        if !essentials.is_empty() {
            e = e.field("Needed", essentials, false);
        }
    }
    e
}

/// Staff control panel. Location and claimant identities live here only.
pub fn render_panel_embed(view: &RaidView) -> CreateEmbed {
    let mut e = CreateEmbed::new()
        .title(format!("{} panel — {}", view.dungeon_name, view.section_name))
        .color(view.color)
        .description(format!(
            "Phase: **{}**{}\nLeader: <@{}>\nIn voice: **{}**",
            view.phase.label(),
            if view.locked && view.phase == Phase::Active { " (locked)" } else { "" },
            view.leader,
            view.joined_count
        ))
        .field("Location", &view.location, false);

    let mut claim_lines = Vec::new();
    for r in view.reactions.iter().filter(|r| r.essential) {
        let who = if r.claimants.is_empty() {
            "_none_".to_string()
        } else {
            r.claimants.iter().map(|m| format!("<@{m}>")).collect::<Vec<_>>().join(" ")
        };
        claim_lines.push(format!(
            "{} {} {}/{}: {}",
            r.emoji.as_deref().unwrap_or(""),
            r.name,
            r.claimed,
            r.cap,
            who
        ));
    }
    if !claim_lines.is_empty() {
        e = e.field("Claims", claim_lines.join("\n"), false);
    }
    if view.phase == Phase::Open {
        if let Some(d) = view.open_deadline {
            e = e.field("Auto-lock", format!("<t:{}:R>", d.timestamp()), true);
        }
    }
    e
}
