//! Component interaction routing for the raid surfaces: claim buttons on
//! the join message, the staff control panel, the ephemeral claim
//! confirmation, and the quota award select menu.

use crate::handlers::{PendingClaim, Services, CONFIRM_WINDOW};
use crate::raid::{ClaimGate, ClaimOutcome, RaidInstance};
use crate::ui::menus;
use crate::utils::parse_component_id;
use serenity::all::{
    ComponentInteraction, ComponentInteractionDataKind, Context, CreateInteractionResponse,
    CreateInteractionResponseMessage,
};
use std::sync::Arc;
use tokio::time::Instant;

async fn ephemeral(ctx: &Context, it: &ComponentInteraction, text: &str) -> anyhow::Result<()> {
    it.create_response(
        &ctx.http,
        CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new().content(text).ephemeral(true),
        ),
    )
    .await?;
    Ok(())
}

async fn update(ctx: &Context, it: &ComponentInteraction, text: &str) -> anyhow::Result<()> {
    it.create_response(
        &ctx.http,
        CreateInteractionResponse::UpdateMessage(
            CreateInteractionResponseMessage::new().content(text).components(Vec::new()),
        ),
    )
    .await?;
    Ok(())
}

pub async fn handle_component(
    ctx: &Context,
    services: &Arc<Services>,
    it: &ComponentInteraction,
) -> anyhow::Result<()> {
    let Some(id) = parse_component_id(&it.data.custom_id) else {
        // Quota award menus carry their own scheme.
        if let Some(rest) = it.data.custom_id.strip_prefix("rd:qa:") {
            return handle_award_pick(ctx, services, it, rest).await;
        }
        return Ok(());
    };

    let user = it.user.id.get();
    match id.op.as_str() {
        "c" => {
            let Some(inst) = services.registry.get(id.message_id) else {
                return ephemeral(ctx, it, "This raid is no longer active.").await;
            };
            let key = id.key.unwrap_or_default();
            handle_claim_press(ctx, services, it, &inst, user, &key).await
        }
        "ok" | "no" => handle_claim_confirm(ctx, services, it, user, &id.op, id.message_id).await,
        "o" | "a" | "x" | "l" | "e" => {
            let Some(inst) = services.registry.get(id.message_id) else {
                return ephemeral(ctx, it, "This raid is no longer active.").await;
            };
            handle_panel_press(ctx, it, &inst, user, &id.op).await
        }
        _ => Ok(()),
    }
}

async fn handle_claim_press(
    ctx: &Context,
    services: &Arc<Services>,
    it: &ComponentInteraction,
    inst: &Arc<RaidInstance>,
    user: u64,
    key: &str,
) -> anyhow::Result<()> {
    let name = inst
        .view()
        .await
        .reactions
        .iter()
        .find(|r| r.key == key)
        .map(|r| r.name.clone())
        .unwrap_or_else(|| key.to_string());

    match inst.claim_gate(user, key).await {
        ClaimGate::Closed => ephemeral(ctx, it, "Claims are closed for this raid.").await,
        ClaimGate::NotInVoice => {
            ephemeral(ctx, it, "Join the raid voice channel first, then claim.").await
        }
        ClaimGate::Duplicate => {
            ephemeral(ctx, it, &format!("You already claimed **{name}**.")).await
        }
        ClaimGate::SlotGone => {
            ephemeral(ctx, it, &format!("All **{name}** slots are taken.")).await
        }
        ClaimGate::Ready => {
            finish_claim(ctx, it, inst, user, key, &name, false).await
        }
        ClaimGate::NeedsConfirmation => {
            services.queue_claim(
                user,
                PendingClaim {
                    raid_message: inst.message_id().await.unwrap_or_default(),
                    key: key.to_string(),
                    expires: Instant::now() + CONFIRM_WINDOW,
                },
            );
            it.create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content(format!(
                            "Confirm your **{name}** claim within {}s.",
                            CONFIRM_WINDOW.as_secs()
                        ))
                        .components(vec![menus::confirm_row(
                            inst.message_id().await.unwrap_or_default(),
                            key,
                        )])
                        .ephemeral(true),
                ),
            )
            .await?;
            Ok(())
        }
    }
}

async fn handle_claim_confirm(
    ctx: &Context,
    services: &Arc<Services>,
    it: &ComponentInteraction,
    user: u64,
    op: &str,
    message_id: u64,
) -> anyhow::Result<()> {
    let Some((_, pending)) = services.pending_claims.remove(&user) else {
        return update(ctx, it, "Nothing pending to confirm.").await;
    };
    if op == "no" {
        return update(ctx, it, "Claim cancelled.").await;
    }
    if pending.raid_message != message_id || Instant::now() > pending.expires {
        return update(ctx, it, "That confirmation expired.").await;
    }
    let Some(inst) = services.registry.get(message_id) else {
        return update(ctx, it, "This raid is no longer active.").await;
    };
    let name = inst
        .view()
        .await
        .reactions
        .iter()
        .find(|r| r.key == pending.key)
        .map(|r| r.name.clone())
        .unwrap_or_else(|| pending.key.clone());
    finish_claim(ctx, it, &inst, user, &pending.key, &name, true).await
}

/// Commit path shared by direct and confirmed claims. Capacity is
/// re-checked at commit, so a slot that filled during the confirmation
/// round-trip reads as gone here.
async fn finish_claim(
    ctx: &Context,
    it: &ComponentInteraction,
    inst: &Arc<RaidInstance>,
    user: u64,
    key: &str,
    name: &str,
    is_update: bool,
) -> anyhow::Result<()> {
    let respond = |text: String| async move {
        if is_update {
            update(ctx, it, &text).await
        } else {
            ephemeral(ctx, it, &text).await
        }
    };
    match inst.commit_claim(user, key).await {
        ClaimOutcome::Claimed { .. } => {
            let location = inst
                .location_for(user)
                .await
                .unwrap_or_else(|| "to be announced".to_string());
            respond(format!("**{name}** locked in. Location: **{location}**")).await
        }
        ClaimOutcome::Duplicate => respond(format!("You already claimed **{name}**.")).await,
        ClaimOutcome::SlotGone => {
            respond(format!("Too slow, **{name}** slots filled up.")).await
        }
        ClaimOutcome::UnknownKey => respond("That reaction no longer exists.".to_string()).await,
    }
}

/// Panel buttons are staff-or-leader only.
async fn handle_panel_press(
    ctx: &Context,
    it: &ComponentInteraction,
    inst: &Arc<RaidInstance>,
    user: u64,
    op: &str,
) -> anyhow::Result<()> {
    let is_leader = user == inst.leader();
    let is_staff = it
        .member
        .as_ref()
        .map(|m| {
            let staff = inst.config().staff_roles(inst.section());
            m.roles.iter().any(|r| staff.contains(&r.get()))
        })
        .unwrap_or(false);
    if !is_leader && !is_staff {
        return ephemeral(ctx, it, "Only the leader or staff can drive the panel.").await;
    }

    let result = match op {
        "o" => inst.open().await,
        "a" => inst.activate().await,
        "x" => inst.abort(user).await,
        "e" => inst.end(user).await,
        "l" => {
            let locked = inst.view().await.locked;
            inst.set_locked(!locked).await
        }
        _ => return Ok(()),
    };
    match result {
        Ok(()) => {
            it.create_response(&ctx.http, CreateInteractionResponse::Acknowledge).await?;
            Ok(())
        }
        Err(e) => ephemeral(ctx, it, &format!("{e}")).await,
    }
}

/// Quota award disambiguation: the invoker picked a ledger from the menu.
async fn handle_award_pick(
    ctx: &Context,
    services: &Arc<Services>,
    it: &ComponentInteraction,
    token: &str,
) -> anyhow::Result<()> {
    let Ok(token) = token.parse::<u64>() else { return Ok(()) };
    let user = it.user.id.get();
    let Some((_, pending)) = services.pending_awards.remove(&(user, token)) else {
        return update(ctx, it, "That award prompt is no longer valid.").await;
    };
    if Instant::now() > pending.expires {
        return update(ctx, it, "Selection window expired; nothing was credited.").await;
    }
    let role: u64 = match &it.data.kind {
        ComponentInteractionDataKind::StringSelect { values } => {
            match values.first().and_then(|v| v.parse().ok()) {
                Some(r) => r,
                None => return update(ctx, it, "Bad selection; nothing was credited.").await,
            }
        }
        _ => return Ok(()),
    };
    match services
        .quota
        .credit(pending.guild_id, role, pending.target, &pending.log_type, pending.amount)
        .await
    {
        Some(total) => {
            update(
                ctx,
                it,
                &format!(
                    "Credited **{}** x{} to <@{}> on <@&{role}>; they now have **{total}** points.",
                    pending.log_type, pending.amount, pending.target
                ),
            )
            .await
        }
        None => update(ctx, it, "That ledger disappeared; nothing was credited.").await,
    }
}
