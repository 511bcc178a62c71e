mod chatlog;
mod completion;
mod config;
mod context;
mod convo;
mod event;
mod handler;
mod helper;
mod intro;
mod logging;
mod moderation;
mod plugin;
mod response;
mod retrieval;
mod thread;

use serenity::{all::GatewayIntents, Client};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = crate::config::Config::load().await?;
    let intro = crate::intro::IntroDetector::load(&cfg.retrieval.intro_examples_path).await?;
    let token = cfg.general.discord_token.clone();
    let handler = handler::Handler::new(cfg, intro);

    // Things we want discord to tell us about.
    let intents =
        GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT;

    Client::builder(&token, intents)
        .event_handler(handler)
        .await?
        .start()
        .await
        .map_err(Into::into)
}
