use crate::plugin::chat::{notify_failure, option_str};
use crate::{convo, event::*, helper::truncate_chars, log_event, log_internal, plugin::*};
use crate::{response, retrieval};
use anyhow::Result;
use serenity::all::CommandInteraction;

/// `/ask` - answers a question from the document index
pub struct Ask;

#[serenity::async_trait]
impl Plugin for Ask {
    fn name(&self) -> &'static str {
        "ask"
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Event::Interaction(cmd) = event else {
            return Ok(EventHandled::No);
        };
        if cmd.data.name != "ask" {
            return Ok(EventHandled::No);
        }

        if let Err(err) = run(ctx, cmd).await {
            log_internal!("/ask by {} failed: {}", cmd.user.name, err);
            notify_failure(ctx, cmd, "Failed to answer question", &err).await;
        }

        Ok(EventHandled::Yes)
    }
}

async fn run(ctx: &Context<'_>, cmd: &CommandInteraction) -> Result<()> {
    let question = convo::sanitize(option_str(cmd, "question").unwrap_or_default());
    log_event!("/ask by {}: {}", cmd.user.name, truncate_chars(&question, 20));

    let data = retrieval::generate_retrieval_response(ctx, &question, &cmd.user.name).await;
    response::respond_to_interaction(ctx, cmd, &data).await
}
