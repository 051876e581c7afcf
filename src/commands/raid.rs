use crate::catalog::{self, DUNGEONS};
use crate::commands::reply;
use crate::config::LEADER_TIERS;
use crate::discord::DiscordGateway;
use crate::handlers::services_from_ctx;
use crate::raid::{Phase, RaidCreation, RaidInstance};
use crate::reconcile::{reconcile_with_parser, VcMember};
use crate::utils::{aliases_from_names, parse_window};
use serenity::all::{
    Command, CommandDataOptionValue, CommandInteraction, CommandOptionType, Context,
    CreateCommand, CreateCommandOption, EditInteractionResponse, Permissions,
};
use std::time::Duration;

pub async fn register(ctx: &Context) -> anyhow::Result<()> {
    let mut dungeon_opt =
        CreateCommandOption::new(CommandOptionType::String, "dungeon", "Which dungeon to run")
            .required(true);
    for d in DUNGEONS.iter() {
        dungeon_opt = dungeon_opt.add_string_choice(&d.name, &d.code);
    }
    Command::create_global_command(
        &ctx.http,
        CreateCommand::new("raid")
            .description("Start a raid")
            .add_option(dungeon_opt)
            .add_option(
                CreateCommandOption::new(CommandOptionType::String, "location", "Target location")
                    .required(true),
            )
            .add_option(CreateCommandOption::new(
                CommandOptionType::String,
                "section",
                "Section to run in (defaults to the first configured)",
            ))
            .add_option(CreateCommandOption::new(
                CommandOptionType::Integer,
                "cap",
                "Voice channel user limit override",
            ))
            .add_option(CreateCommandOption::new(
                CommandOptionType::String,
                "window",
                "Open window length, e.g. 6m or 90s",
            )),
    )
    .await?;

    Command::create_global_command(
        &ctx.http,
        CreateCommand::new("raid_location")
            .description("Change your running raid's location")
            .add_option(
                CreateCommandOption::new(CommandOptionType::String, "location", "New location")
                    .required(true),
            ),
    )
    .await?;

    Command::create_global_command(
        &ctx.http,
        CreateCommand::new("raid_parse")
            .description("Check a run screenshot against the voice channel roster")
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::Attachment,
                    "screenshot",
                    "The /who screenshot",
                )
                .required(true),
            ),
    )
    .await?;

    Command::create_global_command(
        &ctx.http,
        CreateCommand::new("raid_section")
            .description("Create or update a raiding section (manage-server only)")
            .add_option(
                CreateCommandOption::new(CommandOptionType::String, "name", "Section name")
                    .required(true),
            )
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::Channel,
                    "status_channel",
                    "Channel for join announcements",
                )
                .required(true),
            )
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::Channel,
                    "control_channel",
                    "Channel for control panels",
                )
                .required(true),
            )
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::Role,
                    "verified_role",
                    "Role required to participate",
                )
                .required(true),
            )
            .add_option(CreateCommandOption::new(
                CommandOptionType::Channel,
                "category",
                "Category raid channels are created under",
            ))
            .add_option(CreateCommandOption::new(
                CommandOptionType::Integer,
                "user_limit",
                "Default voice user limit",
            )),
    )
    .await?;

    Command::create_global_command(
        &ctx.http,
        CreateCommand::new("raid_config")
            .description("Guild-wide raid settings (manage-server only)")
            .add_option(CreateCommandOption::new(
                CommandOptionType::Channel,
                "quota_channel",
                "Channel for quota leaderboards",
            ))
            .add_option(CreateCommandOption::new(
                CommandOptionType::Channel,
                "storage_channel",
                "Archive channel for quota reports",
            ))
            .add_option(CreateCommandOption::new(
                CommandOptionType::Integer,
                "nitro_early",
                "Early slots for boosters (0 disables)",
            ))
            .add_option(CreateCommandOption::new(
                CommandOptionType::Role,
                "booster_role",
                "The booster role",
            ))
            .add_option(CreateCommandOption::new(
                CommandOptionType::String,
                "window",
                "Default open window, e.g. 6m",
            ))
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "reset_day",
                    "Quota reset weekday",
                )
                .add_string_choice("Monday", "Mon")
                .add_string_choice("Tuesday", "Tue")
                .add_string_choice("Wednesday", "Wed")
                .add_string_choice("Thursday", "Thu")
                .add_string_choice("Friday", "Fri")
                .add_string_choice("Saturday", "Sat")
                .add_string_choice("Sunday", "Sun"),
            )
            .add_option(CreateCommandOption::new(
                CommandOptionType::String,
                "reset_time",
                "Quota reset time, HH:MM",
            ))
            .add_option(CreateCommandOption::new(
                CommandOptionType::String,
                "reset_tz",
                "Timezone name, e.g. America/New_York",
            )),
    )
    .await?;
    Ok(())
}

fn has_manage_guild(cmd: &CommandInteraction) -> bool {
    cmd.member
        .as_ref()
        .and_then(|m| m.permissions)
        .map(|p| p.contains(Permissions::MANAGE_GUILD))
        .unwrap_or(false)
}

pub async fn handle_create(ctx: &Context, cmd: &CommandInteraction) -> anyhow::Result<()> {
    let services = services_from_ctx(ctx).await?;
    let Some(gid) = cmd.guild_id else {
        return reply(ctx, cmd, "Use this in a server.").await;
    };

    let mut dungeon_code = String::new();
    let mut location = String::new();
    let mut section_name: Option<String> = None;
    let mut cap: Option<i64> = None;
    let mut window_str: Option<String> = None;
    for opt in &cmd.data.options {
        match opt.name.as_str() {
            "dungeon" => {
                if let CommandDataOptionValue::String(s) = &opt.value {
                    dungeon_code = s.clone();
                }
            }
            "location" => {
                if let CommandDataOptionValue::String(s) = &opt.value {
                    location = s.clone();
                }
            }
            "section" => {
                if let CommandDataOptionValue::String(s) = &opt.value {
                    section_name = Some(s.clone());
                }
            }
            "cap" => {
                if let CommandDataOptionValue::Integer(n) = &opt.value {
                    cap = Some(*n);
                }
            }
            "window" => {
                if let CommandDataOptionValue::String(s) = &opt.value {
                    window_str = Some(s.clone());
                }
            }
            _ => {}
        }
    }

    let cfg = services.repo.get_or_create_config(gid.get()).await?;
    let section = match &section_name {
        Some(name) => cfg.section_by_name(name).cloned(),
        None => cfg.sections.first().cloned(),
    };
    let Some(section) = section else {
        return reply(ctx, cmd, "No matching section. Set one up with `/raid_section` first.")
            .await;
    };

    let leader_roles: Vec<u64> =
        LEADER_TIERS.iter().filter_map(|r| cfg.resolve_role(&section, *r)).collect();
    let may_lead = cmd
        .member
        .as_ref()
        .map(|m| m.roles.iter().any(|r| leader_roles.contains(&r.get())))
        .unwrap_or(false);
    if !may_lead {
        return reply(ctx, cmd, "Only members with a leader role can start raids.").await;
    }

    let Some(dungeon) = catalog::find_dungeon(&dungeon_code) else {
        return reply(ctx, cmd, "Unknown dungeon.").await;
    };
    let window = match &window_str {
        Some(s) => match parse_window(s) {
            Some(w) => w,
            None => return reply(ctx, cmd, "Bad window. Try `6m` or `90s`.").await,
        },
        None => Duration::from_secs(cfg.open_window_secs),
    };

    cmd.defer_ephemeral(&ctx.http).await?;
    let gateway = DiscordGateway::new(ctx.http.clone(), ctx.cache.clone(), gid.get());
    let user_limit = cap.map(|c| c.max(1) as u32).unwrap_or(section.voice_user_limit);
    let status_channel = section.status_channel;
    let inst = RaidInstance::new(
        RaidCreation {
            guild_id: gid.get(),
            cfg,
            section,
            dungeon: dungeon.clone(),
            leader: cmd.user.id.get(),
            location,
            user_limit,
            open_window: window,
        },
        gateway,
        services.repo.clone(),
    );
    match inst.start().await {
        Ok(mid) => {
            services.registry.insert(mid, inst);
            cmd.edit_response(
                &ctx.http,
                EditInteractionResponse::new()
                    .content(format!("Raid is up in <#{status_channel}>.")),
            )
            .await?;
        }
        Err(e) => {
            cmd.edit_response(
                &ctx.http,
                EditInteractionResponse::new().content(format!("Could not start the raid: {e:#}")),
            )
            .await?;
        }
    }
    Ok(())
}

/// The caller's most recent live raid in this guild.
async fn own_raid(
    services: &crate::handlers::Services,
    guild: u64,
    leader: u64,
) -> Option<std::sync::Arc<RaidInstance>> {
    for inst in services.registry.for_guild(guild) {
        if inst.leader() == leader && !inst.phase().await.is_terminal() {
            return Some(inst);
        }
    }
    None
}

pub async fn handle_location(ctx: &Context, cmd: &CommandInteraction) -> anyhow::Result<()> {
    let services = services_from_ctx(ctx).await?;
    let Some(gid) = cmd.guild_id else {
        return reply(ctx, cmd, "Use this in a server.").await;
    };
    let mut location = String::new();
    for opt in &cmd.data.options {
        if opt.name == "location" {
            if let CommandDataOptionValue::String(s) = &opt.value {
                location = s.clone();
            }
        }
    }
    let Some(inst) = own_raid(&services, gid.get(), cmd.user.id.get()).await else {
        return reply(ctx, cmd, "You have no running raid here.").await;
    };
    inst.set_location(location.clone()).await;
    reply(ctx, cmd, format!("Location updated to **{location}**. Claim holders were told."))
        .await
}

pub async fn handle_parse(ctx: &Context, cmd: &CommandInteraction) -> anyhow::Result<()> {
    let services = services_from_ctx(ctx).await?;
    let Some(gid) = cmd.guild_id else {
        return reply(ctx, cmd, "Use this in a server.").await;
    };
    let mut url: Option<String> = None;
    for opt in &cmd.data.options {
        if opt.name == "screenshot" {
            if let CommandDataOptionValue::Attachment(att_id) = &opt.value {
                url = cmd.data.resolved.attachments.get(att_id).map(|a| a.url.clone());
            }
        }
    }
    let Some(url) = url else {
        return reply(ctx, cmd, "Attach a screenshot.").await;
    };
    let Some(inst) = own_raid(&services, gid.get(), cmd.user.id.get()).await else {
        return reply(ctx, cmd, "You have no running raid here.").await;
    };
    if inst.phase().await != Phase::Active {
        return reply(ctx, cmd, "Activate the raid first; parsing runs against the roster.")
            .await;
    }

    cmd.defer_ephemeral(&ctx.http).await?;
    let mut members = Vec::new();
    for uid in inst.joined().await {
        let aliases = match gid.member(&ctx.http, serenity::all::UserId::new(uid)).await {
            Ok(m) => aliases_from_names(m.nick.as_deref(), &m.user.name),
            Err(_) => Vec::new(),
        };
        members.push(VcMember { id: uid, aliases });
    }
    let report = reconcile_with_parser(services.parser.as_ref(), &url, &members).await;

    let text = if !report.valid {
        "Could not read that screenshot; the run was **not** validated.".to_string()
    } else {
        let mut parts = Vec::new();
        if report.in_vc_unparsed.is_empty() && report.parsed_not_in_vc.is_empty() {
            parts.push("Everyone is accounted for.".to_string());
        }
        if !report.in_vc_unparsed.is_empty() {
            let who: Vec<String> =
                report.in_vc_unparsed.iter().map(|m| format!("<@{m}>")).collect();
            parts.push(format!("In voice but not in the screenshot: {}", who.join(" ")));
        }
        if !report.parsed_not_in_vc.is_empty() {
            parts.push(format!(
                "In the screenshot but not in voice: {}",
                report.parsed_not_in_vc.join(", ")
            ));
        }
        parts.join("\n")
    };
    cmd.edit_response(&ctx.http, EditInteractionResponse::new().content(text)).await?;
    Ok(())
}

pub async fn handle_section(ctx: &Context, cmd: &CommandInteraction) -> anyhow::Result<()> {
    let services = services_from_ctx(ctx).await?;
    let Some(gid) = cmd.guild_id else {
        return reply(ctx, cmd, "Use this in a server.").await;
    };
    if !has_manage_guild(cmd) {
        return reply(ctx, cmd, "Manage-server permission required.").await;
    }

    let mut name = String::new();
    let mut status_channel = 0u64;
    let mut control_channel = 0u64;
    let mut verified_role: Option<u64> = None;
    let mut category: Option<u64> = None;
    let mut user_limit: u32 = 50;
    for opt in &cmd.data.options {
        match (opt.name.as_str(), &opt.value) {
            ("name", CommandDataOptionValue::String(s)) => name = s.clone(),
            ("status_channel", CommandDataOptionValue::Channel(c)) => status_channel = c.get(),
            ("control_channel", CommandDataOptionValue::Channel(c)) => control_channel = c.get(),
            ("verified_role", CommandDataOptionValue::Role(r)) => verified_role = Some(r.get()),
            ("category", CommandDataOptionValue::Channel(c)) => category = Some(c.get()),
            ("user_limit", CommandDataOptionValue::Integer(n)) => user_limit = (*n).max(1) as u32,
            _ => {}
        }
    }

    let mut cfg = services.repo.get_or_create_config(gid.get()).await?;
    match cfg.sections.iter_mut().find(|s| s.name.eq_ignore_ascii_case(&name)) {
        Some(existing) => {
            existing.status_channel = status_channel;
            existing.control_channel = control_channel;
            existing.verified_role = verified_role;
            existing.category = category;
            existing.voice_user_limit = user_limit;
        }
        None => cfg.sections.push(crate::config::SectionConfig {
            name: name.clone(),
            category,
            verified_role,
            status_channel,
            control_channel,
            voice_user_limit: user_limit,
            role_overrides: Default::default(),
        }),
    }
    services.repo.save_config(gid.get(), &cfg).await?;
    reply(ctx, cmd, format!("Section **{name}** saved.")).await
}

pub async fn handle_config(ctx: &Context, cmd: &CommandInteraction) -> anyhow::Result<()> {
    let services = services_from_ctx(ctx).await?;
    let Some(gid) = cmd.guild_id else {
        return reply(ctx, cmd, "Use this in a server.").await;
    };
    if !has_manage_guild(cmd) {
        return reply(ctx, cmd, "Manage-server permission required.").await;
    }

    let mut cfg = services.repo.get_or_create_config(gid.get()).await?;
    let mut changed = Vec::new();
    for opt in &cmd.data.options {
        match (opt.name.as_str(), &opt.value) {
            ("quota_channel", CommandDataOptionValue::Channel(c)) => {
                cfg.quota_channel = Some(c.get());
                changed.push("quota channel");
            }
            ("storage_channel", CommandDataOptionValue::Channel(c)) => {
                cfg.storage_channel = Some(c.get());
                changed.push("storage channel");
            }
            ("nitro_early", CommandDataOptionValue::Integer(n)) => {
                cfg.nitro_early_count = (*n).max(0) as u32;
                changed.push("nitro early slots");
            }
            ("booster_role", CommandDataOptionValue::Role(r)) => {
                cfg.booster_role = Some(r.get());
                changed.push("booster role");
            }
            ("window", CommandDataOptionValue::String(s)) => match parse_window(s) {
                Some(w) => {
                    cfg.open_window_secs = w.as_secs();
                    changed.push("open window");
                }
                None => return reply(ctx, cmd, "Bad window. Try `6m` or `90s`.").await,
            },
            ("reset_day", CommandDataOptionValue::String(s)) => {
                if let Ok(day) = s.parse() {
                    cfg.quota_anchor.weekday = day;
                    changed.push("reset day");
                }
            }
            ("reset_time", CommandDataOptionValue::String(s)) => {
                let Some((h, m)) = s
                    .split_once(':')
                    .and_then(|(h, m)| Some((h.parse::<u32>().ok()?, m.parse::<u32>().ok()?)))
                    .filter(|(h, m)| *h < 24 && *m < 60)
                else {
                    return reply(ctx, cmd, "Bad reset time. Use `HH:MM`.").await;
                };
                cfg.quota_anchor.hour = h;
                cfg.quota_anchor.minute = m;
                changed.push("reset time");
            }
            ("reset_tz", CommandDataOptionValue::String(s)) => {
                if s.parse::<chrono_tz::Tz>().is_err() {
                    return reply(ctx, cmd, "Unknown timezone name.").await;
                }
                cfg.quota_anchor.tz = s.clone();
                changed.push("reset timezone");
            }
            _ => {}
        }
    }
    if changed.is_empty() {
        return reply(ctx, cmd, "Nothing to change.").await;
    }
    services.repo.save_config(gid.get(), &cfg).await?;
    services.quota.apply_settings(gid.get(), &cfg).await;
    reply(ctx, cmd, format!("Updated: {}.", changed.join(", "))).await
}
