pub mod quota;
pub mod raid;

use serenity::all::{
    CommandInteraction, Context, CreateInteractionResponse, CreateInteractionResponseMessage,
};

pub async fn register_commands(ctx: &Context) -> anyhow::Result<()> {
    raid::register(ctx).await?;
    quota::register(ctx).await?;
    Ok(())
}

pub async fn dispatch(ctx: &Context, cmd: &CommandInteraction) -> anyhow::Result<()> {
    match cmd.data.name.as_str() {
        "raid" => raid::handle_create(ctx, cmd).await,
        "raid_location" => raid::handle_location(ctx, cmd).await,
        "raid_parse" => raid::handle_parse(ctx, cmd).await,
        "raid_section" => raid::handle_section(ctx, cmd).await,
        "raid_config" => raid::handle_config(ctx, cmd).await,
        "quota_set" => quota::handle_set(ctx, cmd).await,
        "quota_award" => quota::handle_award(ctx, cmd).await,
        "quota_points" => quota::handle_points(ctx, cmd).await,
        "quota_reset" => quota::handle_reset(ctx, cmd).await,
        _ => Ok(()),
    }
}

pub(crate) async fn reply(
    ctx: &Context,
    cmd: &CommandInteraction,
    text: impl Into<String>,
) -> anyhow::Result<()> {
    cmd.create_response(
        &ctx.http,
        CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new().content(text.into()).ephemeral(true),
        ),
    )
    .await?;
    Ok(())
}
