use crate::commands::reply;
use crate::handlers::{services_from_ctx, PendingAward, AWARD_WINDOW};
use serenity::all::{
    Command, CommandDataOptionValue, CommandInteraction, CommandOptionType, Context,
    CreateCommand, CreateCommandOption, CreateInteractionResponse,
    CreateInteractionResponseMessage, CreateSelectMenuOption,
};
use serenity::builder::{CreateActionRow, CreateSelectMenu, CreateSelectMenuKind};
use tokio::time::Instant;

pub async fn register(ctx: &Context) -> anyhow::Result<()> {
    Command::create_global_command(
        &ctx.http,
        CreateCommand::new("quota_set")
            .description("Create or adjust the quota for a role (manage-server only)")
            .add_option(
                CreateCommandOption::new(CommandOptionType::Role, "role", "Tracked role")
                    .required(true),
            )
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::Integer,
                    "threshold",
                    "Points required per cycle",
                )
                .required(true),
            )
            .add_option(CreateCommandOption::new(
                CommandOptionType::String,
                "log_type",
                "Log type to value, e.g. RunComplete or RunComplete:SHATTERS",
            ))
            .add_option(CreateCommandOption::new(
                CommandOptionType::Integer,
                "points",
                "Points for that log type",
            )),
    )
    .await?;

    Command::create_global_command(
        &ctx.http,
        CreateCommand::new("quota_award")
            .description("Credit quota points to a member")
            .add_option(
                CreateCommandOption::new(CommandOptionType::User, "member", "Who to credit")
                    .required(true),
            )
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "log_type",
                    "What they did, e.g. RunComplete:SHATTERS",
                )
                .required(true),
            )
            .add_option(CreateCommandOption::new(
                CommandOptionType::Integer,
                "amount",
                "How many times (default 1)",
            ))
            .add_option(CreateCommandOption::new(
                CommandOptionType::Role,
                "role",
                "Force a specific ledger instead of the best match",
            )),
    )
    .await?;

    Command::create_global_command(
        &ctx.http,
        CreateCommand::new("quota_points")
            .description("Show quota standing")
            .add_option(CreateCommandOption::new(
                CommandOptionType::User,
                "member",
                "Whose points (defaults to you)",
            ))
            .add_option(CreateCommandOption::new(
                CommandOptionType::Role,
                "role",
                "Which ledger (defaults to all)",
            )),
    )
    .await?;

    Command::create_global_command(
        &ctx.http,
        CreateCommand::new("quota_reset")
            .description("Close a role's quota cycle now (manage-server only)")
            .add_option(
                CreateCommandOption::new(CommandOptionType::Role, "role", "Tracked role")
                    .required(true),
            ),
    )
    .await?;
    Ok(())
}

fn has_manage_guild(cmd: &CommandInteraction) -> bool {
    cmd.member
        .as_ref()
        .and_then(|m| m.permissions)
        .map(|p| p.contains(serenity::all::Permissions::MANAGE_GUILD))
        .unwrap_or(false)
}

pub async fn handle_set(ctx: &Context, cmd: &CommandInteraction) -> anyhow::Result<()> {
    let services = services_from_ctx(ctx).await?;
    let Some(gid) = cmd.guild_id else {
        return reply(ctx, cmd, "Use this in a server.").await;
    };
    if !has_manage_guild(cmd) {
        return reply(ctx, cmd, "Manage-server permission required.").await;
    }

    let mut role = 0u64;
    let mut threshold = 0i64;
    let mut log_type: Option<String> = None;
    let mut points: Option<i64> = None;
    for opt in &cmd.data.options {
        match (opt.name.as_str(), &opt.value) {
            ("role", CommandDataOptionValue::Role(r)) => role = r.get(),
            ("threshold", CommandDataOptionValue::Integer(n)) => threshold = *n,
            ("log_type", CommandDataOptionValue::String(s)) => log_type = Some(s.clone()),
            ("points", CommandDataOptionValue::Integer(n)) => points = Some(*n),
            _ => {}
        }
    }
    let values = match (log_type, points) {
        (Some(t), Some(p)) => vec![(t, p)],
        (Some(_), None) | (None, Some(_)) => {
            return reply(ctx, cmd, "Provide `log_type` and `points` together.").await
        }
        (None, None) => Vec::new(),
    };
    services.quota.configure(gid.get(), role, threshold, values).await?;
    reply(ctx, cmd, format!("Quota for <@&{role}> saved (threshold {threshold}).")).await
}

pub async fn handle_award(ctx: &Context, cmd: &CommandInteraction) -> anyhow::Result<()> {
    let services = services_from_ctx(ctx).await?;
    let Some(gid) = cmd.guild_id else {
        return reply(ctx, cmd, "Use this in a server.").await;
    };
    if !has_manage_guild(cmd) {
        return reply(ctx, cmd, "Manage-server permission required.").await;
    }

    let mut target = 0u64;
    let mut log_type = String::new();
    let mut amount = 1i64;
    let mut forced_role: Option<u64> = None;
    for opt in &cmd.data.options {
        match (opt.name.as_str(), &opt.value) {
            ("member", CommandDataOptionValue::User(u)) => target = u.get(),
            ("log_type", CommandDataOptionValue::String(s)) => log_type = s.clone(),
            ("amount", CommandDataOptionValue::Integer(n)) => amount = (*n).max(1),
            ("role", CommandDataOptionValue::Role(r)) => forced_role = Some(r.get()),
            _ => {}
        }
    }

    if let Some(role) = forced_role {
        return match services.quota.credit(gid.get(), role, target, &log_type, amount).await {
            Some(total) => {
                reply(
                    ctx,
                    cmd,
                    format!("Credited <@{target}> on <@&{role}>; now at **{total}** points."),
                )
                .await
            }
            None => reply(ctx, cmd, "No quota ledger exists for that role.").await,
        };
    }

    let surface = services.surface()?;
    let eligible =
        services.quota.eligible_ledgers(surface.as_ref(), gid.get(), target, &log_type).await;
    match eligible.len() {
        0 => {
            reply(ctx, cmd, "No ledger can take that award: wrong roles or worthless log type.")
                .await
        }
        1 => {
            let role = eligible[0].0;
            match services.quota.credit(gid.get(), role, target, &log_type, amount).await {
                Some(total) => {
                    reply(
                        ctx,
                        cmd,
                        format!("Credited <@{target}> on <@&{role}>; now at **{total}** points."),
                    )
                    .await
                }
                None => reply(ctx, cmd, "That ledger disappeared mid-award.").await,
            }
        }
        _ => {
            // Several ledgers qualify; the invoker picks one. No pick within
            // the window means nothing is credited.
            let token = cmd.id.get();
            services.queue_award(
                cmd.user.id.get(),
                token,
                PendingAward {
                    guild_id: gid.get(),
                    target,
                    log_type: log_type.clone(),
                    amount,
                    expires: Instant::now() + AWARD_WINDOW,
                },
            );
            let options: Vec<CreateSelectMenuOption> = eligible
                .iter()
                .map(|(role, ratio)| {
                    CreateSelectMenuOption::new(
                        format!("role {role} ({:.0}% of quota)", ratio * 100.0),
                        role.to_string(),
                    )
                })
                .collect();
            let menu = CreateSelectMenu::new(
                format!("rd:qa:{token}"),
                CreateSelectMenuKind::String { options },
            )
            .placeholder("Pick the ledger to credit")
            .min_values(1)
            .max_values(1);
            cmd.create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content(format!(
                            "<@{target}> qualifies on several ledgers. Pick one within {}s.",
                            AWARD_WINDOW.as_secs()
                        ))
                        .components(vec![CreateActionRow::SelectMenu(menu)])
                        .ephemeral(true),
                ),
            )
            .await?;
            Ok(())
        }
    }
}

pub async fn handle_points(ctx: &Context, cmd: &CommandInteraction) -> anyhow::Result<()> {
    let services = services_from_ctx(ctx).await?;
    let Some(gid) = cmd.guild_id else {
        return reply(ctx, cmd, "Use this in a server.").await;
    };

    let mut member = cmd.user.id.get();
    let mut role: Option<u64> = None;
    for opt in &cmd.data.options {
        match (opt.name.as_str(), &opt.value) {
            ("member", CommandDataOptionValue::User(u)) => member = u.get(),
            ("role", CommandDataOptionValue::Role(r)) => role = Some(r.get()),
            _ => {}
        }
    }

    if let Some(role) = role {
        let Some(rows) = services.quota.breakdown(gid.get(), role, member).await else {
            return reply(ctx, cmd, "No quota ledger exists for that role.").await;
        };
        if rows.is_empty() {
            return reply(ctx, cmd, format!("<@{member}> has no points on <@&{role}> yet."))
                .await;
        }
        let total: i64 = rows.iter().map(|(_, _, p)| p).sum();
        let lines: Vec<String> = rows
            .iter()
            .map(|(t, count, pts)| format!("{t} x{count} — {pts}"))
            .collect();
        return reply(
            ctx,
            cmd,
            format!("<@{member}> on <@&{role}>: **{total}**\n{}", lines.join("\n")),
        )
        .await;
    }

    let roles = services.quota.tracked_roles(gid.get()).await;
    if roles.is_empty() {
        return reply(ctx, cmd, "No quota ledgers configured here.").await;
    }
    let mut lines = Vec::new();
    for r in roles {
        if let Some(total) = services.quota.total_points(gid.get(), r, member).await {
            lines.push(format!("<@&{r}>: **{total}**"));
        }
    }
    reply(ctx, cmd, format!("Points for <@{member}>:\n{}", lines.join("\n"))).await
}

pub async fn handle_reset(ctx: &Context, cmd: &CommandInteraction) -> anyhow::Result<()> {
    let services = services_from_ctx(ctx).await?;
    let Some(gid) = cmd.guild_id else {
        return reply(ctx, cmd, "Use this in a server.").await;
    };
    if !has_manage_guild(cmd) {
        return reply(ctx, cmd, "Manage-server permission required.").await;
    }
    let mut role = 0u64;
    for opt in &cmd.data.options {
        if opt.name == "role" {
            if let CommandDataOptionValue::Role(r) = &opt.value {
                role = r.get();
            }
        }
    }
    cmd.defer_ephemeral(&ctx.http).await?;
    let surface = services.surface()?;
    services.quota.reset_quota(surface.as_ref(), gid.get(), role, chrono::Utc::now()).await?;
    cmd.edit_response(
        &ctx.http,
        serenity::all::EditInteractionResponse::new()
            .content(format!("Quota cycle for <@&{role}> closed and reset.")),
    )
    .await?;
    Ok(())
}
