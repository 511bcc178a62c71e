use crate::{event::*, log_internal, plugin::*};
use anyhow::Result;
use serenity::all::{Command, CommandOptionType, CreateCommand, CreateCommandOption};

/// Registers slash commands and logs the invite URL once connected
pub struct ReadyPlugin;

#[serenity::async_trait]
impl Plugin for ReadyPlugin {
    fn name(&self) -> &'static str {
        "ready"
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Event::Ready(_) = event else {
            return Ok(EventHandled::No);
        };

        log_internal!("Invite URL: {}", ctx.cfg.general.invite_url());

        Command::create_global_command(
            ctx.cache_http,
            CreateCommand::new("chat")
                .description("Create a new thread for conversation")
                .add_option(
                    CreateCommandOption::new(
                        CommandOptionType::String,
                        "message",
                        "Your opening message",
                    )
                    .required(true),
                ),
        )
        .await?;

        Command::create_global_command(
            ctx.cache_http,
            CreateCommand::new("ask")
                .description("Ask a question about the document index")
                .add_option(
                    CreateCommandOption::new(
                        CommandOptionType::String,
                        "question",
                        "The question to ask",
                    )
                    .required(true),
                ),
        )
        .await?;

        Ok(EventHandled::Yes)
    }
}
