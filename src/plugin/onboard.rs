use crate::{chatlog, convo, event::*, intro, log_event, plugin::*, response, retrieval};
use anyhow::Result;
use serenity::all::GetMessages;

/// How much channel history goes into the onboarding audit log.
const AUDIT_LOG_FETCH_LIMIT: u8 = 50;

/// Watches the intro channel for self-introductions and replies with
/// project suggestions from the document index
pub struct Onboard;

#[serenity::async_trait]
impl Plugin for Onboard {
    fn name(&self) -> &'static str {
        "onboard"
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Event::Message(msg) = event else {
            return Ok(EventHandled::No);
        };
        if msg.channel_id.get() != ctx.cfg.retrieval.intro_listen_channel_id {
            return Ok(EventHandled::No);
        }

        let text = convo::sanitize(&msg.content);
        if text.is_empty() {
            return Ok(EventHandled::No);
        }

        // The classifier call is a network round-trip; we only continue for
        // actual introductions.
        if !ctx.intro.is_intro(ctx, &text).await? {
            return Ok(EventHandled::No);
        }
        log_event!("Intro detected from {}", msg.author.name);

        // Snapshot the channel into the audit log before replying
        let fetched = msg
            .channel_id
            .messages(
                ctx.cache_http,
                GetMessages::new().limit(AUDIT_LOG_FETCH_LIMIT),
            )
            .await
            .unwrap_or_default();
        let entries: Vec<(String, String)> = fetched
            .iter()
            .rev()
            .map(|m| (m.author.name.clone(), m.content.clone()))
            .collect();
        chatlog::save_channel_log(&ctx.cfg.general.chat_log_dir, msg.channel_id, &entries).await?;

        let query = intro::intro_to_query(&text);
        let typing = msg.channel_id.start_typing(ctx.http);
        let data = retrieval::generate_retrieval_response(ctx, &query, &msg.author.name).await;
        typing.stop();

        response::respond_onboard(ctx, msg, &data).await?;
        Ok(EventHandled::Yes)
    }
}
