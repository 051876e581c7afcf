use dotenvy::dotenv;
use raidcoord::db::PgRepo;
use raidcoord::discord::{HttpScreenshotParser, NullScreenshotParser};
use raidcoord::handlers::{Handler, Services};
use raidcoord::ports::ScreenshotParser;
use serenity::all::{Client, GatewayIntents};
use std::env;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let token = env::var("DISCORD_TOKEN").expect("DISCORD_TOKEN not set");
    let db_url = env::var("DATABASE_URL").expect("DATABASE_URL not set");

    let repo = PgRepo::connect(&db_url).await?;
    repo.ensure_schema().await?;
    let repo = Arc::new(repo);

    let parser: Arc<dyn ScreenshotParser> = match env::var("PARSER_ENDPOINT") {
        Ok(endpoint) => Arc::new(HttpScreenshotParser::new(endpoint)),
        Err(_) => {
            tracing::warn!("PARSER_ENDPOINT not set; screenshot parsing disabled");
            Arc::new(NullScreenshotParser)
        }
    };

    let services = Services::new(repo, parser);

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGE_REACTIONS;

    let mut client = Client::builder(&token, intents)
        .event_handler(Handler::new(services))
        .await?;

    client.start().await?;
    Ok(())
}
