use crate::convo::{self, Conversation, Message};
use crate::helper::truncate_chars;
use crate::{completion, event::*, log_event, log_internal, moderation, plugin::*, response};
use anyhow::Result;
use serenity::all::{
    AutoArchiveDuration, ChannelType, Colour, CommandInteraction, CreateEmbed,
    CreateInteractionResponse, CreateInteractionResponseMessage, CreateThread, ResolvedValue,
};

/// `/chat` - opens a conversation thread seeded with the user's message
pub struct Chat;

#[serenity::async_trait]
impl Plugin for Chat {
    fn name(&self) -> &'static str {
        "chat"
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Event::Interaction(cmd) = event else {
            return Ok(EventHandled::No);
        };
        if cmd.data.name != "chat" {
            return Ok(EventHandled::No);
        }

        if let Err(err) = run(ctx, cmd).await {
            log_internal!("/chat by {} failed: {}", cmd.user.name, err);
            notify_failure(ctx, cmd, "Failed to start chat", &err).await;
        }

        Ok(EventHandled::Yes)
    }
}

pub(super) fn option_str<'a>(cmd: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    cmd.data.options().into_iter().find_map(|opt| {
        if opt.name != name {
            return None;
        }
        match opt.value {
            ResolvedValue::String(s) => Some(s),
            _ => None,
        }
    })
}

/// Best-effort ephemeral failure notice; the failure itself was already logged.
pub(super) async fn notify_failure(
    ctx: &Context<'_>,
    cmd: &CommandInteraction,
    what: &str,
    err: &anyhow::Error,
) {
    let notice = CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new()
            .content(format!("{} - {}", what, err))
            .ephemeral(true),
    );
    if let Err(err) = cmd.create_response(ctx.cache_http, notice).await {
        log_internal!("Could not deliver failure notice: {}", err);
    }
}

async fn run(ctx: &Context<'_>, cmd: &CommandInteraction) -> Result<()> {
    // Threads can only be spawned from a regular text channel
    let Some(channel) = cmd.channel_id.to_channel(ctx.cache_http).await?.guild() else {
        return Ok(());
    };
    if channel.kind != ChannelType::Text {
        return Ok(());
    }

    let message = convo::sanitize(option_str(cmd, "message").unwrap_or_default());
    let user = &cmd.user;
    log_event!("/chat by {}: {}", user.name, truncate_chars(&message, 20));

    // Moderation pre-check on the prompt before anything is visible
    let verdict = moderation::classify(ctx, &message).await?;
    moderation::send_blocked_notice(ctx, cmd.guild_id, &user.name, &verdict.blocked_str(), &message)
        .await;
    if verdict.is_blocked() {
        cmd.create_response(
            ctx.cache_http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(format!(
                        "Your prompt has been blocked by moderation.\n{}",
                        message
                    ))
                    .ephemeral(true),
            ),
        )
        .await?;
        return Ok(());
    }

    let mut embed = CreateEmbed::new()
        .description(format!("<@{}> wants to chat! 🤖💬", user.id))
        .colour(Colour::DARK_GREEN)
        .field(user.name.clone(), message.clone(), false);
    if verdict.is_flagged() {
        embed = embed
            .colour(Colour::GOLD)
            .title("⚠️ This prompt was flagged by moderation.");
    }
    cmd.create_response(
        ctx.cache_http,
        CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
    )
    .await?;
    let opener = cmd.get_response(ctx.cache_http).await?;

    moderation::send_flagged_notice(
        ctx,
        cmd.guild_id,
        &user.name,
        &verdict.flagged_str(),
        &message,
        Some(&opener.link()),
    )
    .await;

    // The conversation lives in a thread hanging off the opener embed
    let thread_name = format!(
        "{} {} - {}",
        ctx.cfg.thread.active_prefix,
        truncate_chars(&user.name, 20),
        truncate_chars(&message, 30),
    );
    let thread = cmd
        .channel_id
        .create_thread_from_message(
            ctx.cache_http,
            opener.id,
            CreateThread::new(thread_name)
                .auto_archive_duration(AutoArchiveDuration::OneHour)
                .rate_limit_per_user(1),
        )
        .await?;

    let typing = thread.id.start_typing(ctx.http);
    let convo = Conversation::new(vec![Message::new(user.name.clone(), message)]);
    let data = completion::generate_completion_response(ctx, convo, &user.name).await;
    typing.stop();

    response::respond_in_thread(ctx, thread.id, cmd.guild_id, &user.name, &data).await
}
