use crate::convo::{self, Conversation};
use crate::thread::{self, GateDecision, ThreadGate};
use crate::{completion, event::*, helper::truncate_chars, log_event, moderation, plugin::*};
use crate::{response, log_internal};
use anyhow::Result;
use serenity::all::{Colour, CreateEmbed, CreateMessage};

/// Continues conversations in threads the bot opened via `/chat`
pub struct ThreadReply;

#[serenity::async_trait]
impl Plugin for ThreadReply {
    fn name(&self) -> &'static str {
        "thread_reply"
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Event::Message(msg) = event else {
            return Ok(EventHandled::No);
        };

        let Some(thread) = msg.channel(ctx.cache_http).await?.guild() else {
            return Ok(EventHandled::No);
        };
        let bot_id = ctx.cache.current_user().id;

        // Lifecycle gate: only open conversation threads of ours are answered
        let gate = ThreadGate::snapshot(&thread, bot_id, &ctx.cfg.thread.active_prefix);
        match gate.decide(ctx.cfg.thread.max_thread_messages) {
            GateDecision::Ignore => return Ok(EventHandled::No),
            GateDecision::Close => {
                // Too many messages; no longer going to reply
                thread::close_thread(ctx, thread.id).await?;
                return Ok(EventHandled::Yes);
            }
            GateDecision::Process => {}
        }

        // Moderation pre-check on the raw inbound message
        let verdict = moderation::classify(ctx, &msg.content).await?;
        moderation::send_blocked_notice(
            ctx,
            msg.guild_id,
            &msg.author.name,
            &verdict.blocked_str(),
            &msg.content,
        )
        .await;
        if verdict.is_blocked() {
            let notice = match msg.delete(ctx.cache_http).await {
                Ok(()) => format!(
                    "❌ **{}'s message has been deleted by moderation.**",
                    msg.author.name
                ),
                // Permission failure degrades to a notice
                Err(_) => format!(
                    "❌ **{}'s message has been blocked by moderation but could not be deleted. Missing Manage Messages permission in this Channel.**",
                    msg.author.name
                ),
            };
            thread
                .id
                .send_message(
                    ctx.cache_http,
                    CreateMessage::new()
                        .embed(CreateEmbed::new().description(notice).colour(Colour::RED)),
                )
                .await?;
            return Ok(EventHandled::Yes);
        }

        moderation::send_flagged_notice(
            ctx,
            msg.guild_id,
            &msg.author.name,
            &verdict.flagged_str(),
            &msg.content,
            Some(&msg.link()),
        )
        .await;
        if verdict.is_flagged() {
            thread
                .id
                .send_message(
                    ctx.cache_http,
                    CreateMessage::new().embed(
                        CreateEmbed::new()
                            .description(format!(
                                "⚠️ **{}'s message has been flagged by moderation.**",
                                msg.author.name
                            ))
                            .colour(Colour::GOLD),
                    ),
                )
                .await?;
        }

        // Wait in case the user has more messages coming; if something newer
        // arrived, this one is superseded and intentionally gets no response.
        thread::settle_delay(ctx).await;
        let last = thread::latest_message(ctx, thread.id).await?;
        if thread::is_last_message_stale(msg.id, last, bot_id) {
            return Ok(EventHandled::Yes);
        }

        log_event!(
            "Thread message to process - {}: {} - {}",
            msg.author.name,
            truncate_chars(&msg.content, 50),
            thread.name,
        );

        // Rebuild the conversation from the thread history, oldest first
        let fetched =
            thread::fetch_history(ctx, thread.id, ctx.cfg.thread.max_thread_messages).await?;
        let mut messages = Vec::new();
        for m in &fetched {
            if let Some(message) = convo::discord_message_to_message(ctx, m).await {
                messages.push(message);
            }
        }

        let typing = thread.id.start_typing(ctx.http);
        let data =
            completion::generate_completion_response(ctx, Conversation::new(messages), &msg.author.name)
                .await;
        typing.stop();

        // The completion may have raced a newer message; a completed but
        // superseded response is discarded, not delivered.
        let last = thread::latest_message(ctx, thread.id).await?;
        if thread::is_last_message_stale(msg.id, last, bot_id) {
            log_internal!("Discarding superseded response in {}", thread.name);
            return Ok(EventHandled::Yes);
        }

        response::respond_in_thread(ctx, thread.id, msg.guild_id, &msg.author.name, &data).await?;
        Ok(EventHandled::Yes)
    }
}
