use crate::raid::{Phase, RaidView};
use serenity::all::{ButtonStyle, ReactionType};
use serenity::builder::{CreateActionRow, CreateButton};

/* Claim buttons on the join announcement, chunked five to a row */
pub fn claim_rows(view: &RaidView) -> Vec<CreateActionRow> {
    let mid = view.message_id.unwrap_or(0);
    let mut buttons = Vec::new();
    for r in view.reactions.iter().filter(|r| r.essential) {
        let mut b = CreateButton::new(format!("rd:c:{mid}:{}", r.key))
            .label(format!("{} {}/{}", r.name, r.claimed, r.cap))
            .style(ButtonStyle::Secondary)
            .disabled(!view.phase.is_collecting() || r.claimed >= r.cap);
        if let Some(emoji) = &r.emoji {
            b = b.emoji(ReactionType::Unicode(emoji.clone()));
        }
        buttons.push(b);
    }
    buttons
        .chunks(5)
        .map(|chunk| CreateActionRow::Buttons(chunk.to_vec()))
        .collect()
}

/* Staff controls on the panel, per phase */
pub fn panel_rows(view: &RaidView) -> Vec<CreateActionRow> {
    let mid = view.message_id.unwrap_or(0);
    let row = match view.phase {
        Phase::PreOpen => CreateActionRow::Buttons(vec![
            CreateButton::new(format!("rd:o:{mid}"))
                .label("Open")
                .style(ButtonStyle::Success),
            CreateButton::new(format!("rd:x:{mid}"))
                .label("Abort")
                .style(ButtonStyle::Danger),
        ]),
        Phase::Open => CreateActionRow::Buttons(vec![
            CreateButton::new(format!("rd:a:{mid}"))
                .label("Activate now")
                .style(ButtonStyle::Success),
            CreateButton::new(format!("rd:x:{mid}"))
                .label("Abort")
                .style(ButtonStyle::Danger),
        ]),
        Phase::Active => CreateActionRow::Buttons(vec![
            CreateButton::new(format!("rd:l:{mid}"))
                .label(if view.locked { "Unlock" } else { "Lock" })
                .style(ButtonStyle::Primary),
            CreateButton::new(format!("rd:e:{mid}"))
                .label("End raid")
                .style(ButtonStyle::Danger),
        ]),
        Phase::Pending | Phase::Ended => return Vec::new(),
    };
    vec![row]
}

/* Ephemeral confirm/cancel row for the timed claim confirmation */
pub fn confirm_row(message_id: u64, key: &str) -> CreateActionRow {
    CreateActionRow::Buttons(vec![
        CreateButton::new(format!("rd:ok:{message_id}:{key}"))
            .label("Confirm")
            .style(ButtonStyle::Success),
        CreateButton::new(format!("rd:no:{message_id}:{key}"))
            .label("Cancel")
            .style(ButtonStyle::Secondary),
    ])
}
