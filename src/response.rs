//! Response dispatcher: one outcome-to-action policy, three delivery
//! surfaces.  The policy is computed as a pure plan so it can be tested
//! without a Discord connection; the surfaces only differ in which transport
//! call carries each step.

use crate::completion::{CompletionData, CompletionOutcome};
use crate::context::Context;
use crate::{moderation, thread};
use anyhow::Result;
use serenity::all::{
    ChannelId, Colour, CommandInteraction, CreateEmbed, CreateInteractionResponse,
    CreateInteractionResponseFollowup, CreateInteractionResponseMessage, CreateMessage, GuildId,
    Mentionable,
};

/// One user-visible effect of dispatching an outcome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlanStep {
    /// Deliver the reply, pre-split into transport-sized chunks.
    SendChunks(Vec<String>),
    /// The completion succeeded but produced no text.
    EmptyNotice,
    /// Visible flagged warning plus a moderation-channel notice.
    FlaggedWarning,
    /// Visible blocked notice plus a moderation-channel notice.  The reply is
    /// never delivered as the answer.
    BlockedNotice,
    /// Thread hit its context limit.
    CloseThread,
    InvalidRequestNotice(String),
    ErrorNotice(String),
}

/// Fixed-size slicing into windows of `max_len` characters.  No word-boundary
/// awareness: a long word may split across chunks.  Deliberate simplicity,
/// covered by tests as a known limitation.
pub fn split_into_chunks(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;

    for ch in text.chars() {
        current.push(ch);
        count += 1;
        if count == max_len {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Map an outcome to its ordered list of effects.  Identical for every
/// surface.
pub fn plan(data: &CompletionData, max_chunk: usize) -> Vec<PlanStep> {
    let status_text = || data.status_text.clone().unwrap_or_default();

    match data.outcome {
        CompletionOutcome::Ok | CompletionOutcome::ModerationFlagged => {
            let mut steps = match &data.reply_text {
                Some(reply) if !reply.is_empty() => {
                    vec![PlanStep::SendChunks(split_into_chunks(reply, max_chunk))]
                }
                _ => vec![PlanStep::EmptyNotice],
            };
            if data.outcome == CompletionOutcome::ModerationFlagged {
                steps.push(PlanStep::FlaggedWarning);
            }
            steps
        }
        CompletionOutcome::ModerationBlocked => vec![PlanStep::BlockedNotice],
        CompletionOutcome::TooLong => vec![PlanStep::CloseThread],
        CompletionOutcome::InvalidRequest => vec![PlanStep::InvalidRequestNotice(status_text())],
        CompletionOutcome::OtherError => vec![PlanStep::ErrorNotice(status_text())],
    }
}

fn embed(description: impl Into<String>, colour: Colour) -> CreateMessage {
    CreateMessage::new().embed(CreateEmbed::new().description(description).colour(colour))
}

/// In-channel notice text for the non-delivery steps.  Shared across surfaces
/// so the outcome policy reads identically everywhere.
fn notice_text(step: &PlanStep) -> Option<String> {
    match step {
        PlanStep::EmptyNotice => Some("**Invalid response** - empty response".to_string()),
        PlanStep::InvalidRequestNotice(status) => {
            Some(format!("**Invalid request** - {}", status))
        }
        PlanStep::ErrorNotice(status) => Some(format!("**Error** - {}", status)),
        _ => None,
    }
}

/// Deliver an outcome into the thread the conversation lives in.
pub async fn respond_in_thread(
    ctx: &Context<'_>,
    thread_id: ChannelId,
    guild_id: Option<GuildId>,
    user: &str,
    data: &CompletionData,
) -> Result<()> {
    let mut last_sent_url = None;

    for step in plan(data, ctx.cfg.thread.max_chars_per_reply) {
        match step {
            PlanStep::SendChunks(chunks) => {
                for chunk in chunks {
                    let sent = thread_id.say(ctx.cache_http, chunk).await?;
                    last_sent_url = Some(sent.link());
                }
            }
            PlanStep::FlaggedWarning => {
                moderation::send_flagged_notice(
                    ctx,
                    guild_id,
                    user,
                    &data.status_text.clone().unwrap_or_default(),
                    data.reply_text.as_deref().unwrap_or_default(),
                    last_sent_url.as_deref(),
                )
                .await;
                thread_id
                    .send_message(
                        ctx.cache_http,
                        embed(
                            "⚠️ **This conversation has been flagged by moderation.**",
                            Colour::GOLD,
                        ),
                    )
                    .await?;
            }
            PlanStep::BlockedNotice => {
                moderation::send_blocked_notice(
                    ctx,
                    guild_id,
                    user,
                    &data.status_text.clone().unwrap_or_default(),
                    data.reply_text.as_deref().unwrap_or_default(),
                )
                .await;
                thread_id
                    .send_message(
                        ctx.cache_http,
                        embed(
                            "❌ **The response has been blocked by moderation.**",
                            Colour::RED,
                        ),
                    )
                    .await?;
            }
            PlanStep::CloseThread => {
                thread::close_thread(ctx, thread_id).await?;
            }
            step @ (PlanStep::EmptyNotice
            | PlanStep::InvalidRequestNotice(_)
            | PlanStep::ErrorNotice(_)) => {
                if let Some(text) = notice_text(&step) {
                    thread_id
                        .send_message(ctx.cache_http, embed(text, Colour::GOLD))
                        .await?;
                }
            }
        }
    }

    Ok(())
}

/// Deliver an outcome as a slash-command response.  The first visible text
/// uses the interaction response slot; everything after goes out as
/// follow-ups.  There is no thread here, so a context-limit outcome degrades
/// to an error notice.
pub async fn respond_to_interaction(
    ctx: &Context<'_>,
    cmd: &CommandInteraction,
    data: &CompletionData,
) -> Result<()> {
    let mut responded = false;
    let user = cmd.user.name.as_str();

    for step in plan(data, ctx.cfg.thread.max_chars_per_reply) {
        match step {
            PlanStep::SendChunks(chunks) => {
                for chunk in chunks {
                    if responded {
                        cmd.create_followup(
                            ctx.cache_http,
                            CreateInteractionResponseFollowup::new().content(chunk),
                        )
                        .await?;
                    } else {
                        cmd.create_response(
                            ctx.cache_http,
                            CreateInteractionResponse::Message(
                                CreateInteractionResponseMessage::new().content(chunk),
                            ),
                        )
                        .await?;
                        responded = true;
                    }
                }
            }
            PlanStep::EmptyNotice => {
                cmd.create_response(
                    ctx.cache_http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content("No response generated.")
                            .ephemeral(true),
                    ),
                )
                .await?;
                responded = true;
            }
            PlanStep::FlaggedWarning => {
                let url = match cmd.get_response(ctx.cache_http).await {
                    Ok(sent) => Some(sent.link()),
                    Err(_) => None,
                };
                moderation::send_flagged_notice(
                    ctx,
                    cmd.guild_id,
                    user,
                    &data.status_text.clone().unwrap_or_default(),
                    data.reply_text.as_deref().unwrap_or_default(),
                    url.as_deref(),
                )
                .await;
                cmd.channel_id
                    .send_message(
                        ctx.cache_http,
                        embed(
                            "⚠️ **This conversation has been flagged by moderation.**",
                            Colour::GOLD,
                        ),
                    )
                    .await?;
            }
            PlanStep::BlockedNotice => {
                moderation::send_blocked_notice(
                    ctx,
                    cmd.guild_id,
                    user,
                    &data.status_text.clone().unwrap_or_default(),
                    data.reply_text.as_deref().unwrap_or_default(),
                )
                .await;
                cmd.create_response(
                    ctx.cache_http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content("❌ **The response has been blocked by moderation.**"),
                    ),
                )
                .await?;
                responded = true;
            }
            PlanStep::CloseThread => {
                // No thread to close on this surface; degrade to an error notice
                send_ephemeral(ctx, cmd, "**Error** - context limit reached".to_string()).await?;
                responded = true;
            }
            PlanStep::InvalidRequestNotice(status) => {
                send_ephemeral(ctx, cmd, format!("**Invalid request** - {}", status)).await?;
                responded = true;
            }
            PlanStep::ErrorNotice(status) => {
                send_ephemeral(ctx, cmd, format!("**Error** - {}", status)).await?;
                responded = true;
            }
        }
    }

    Ok(())
}

async fn send_ephemeral(
    ctx: &Context<'_>,
    cmd: &CommandInteraction,
    content: String,
) -> Result<()> {
    cmd.create_response(
        ctx.cache_http,
        CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .content(content)
                .ephemeral(true),
        ),
    )
    .await?;
    Ok(())
}

/// Deliver an outcome as an onboarding reply to the member's intro message.
pub async fn respond_onboard(
    ctx: &Context<'_>,
    intro_msg: &serenity::all::Message,
    data: &CompletionData,
) -> Result<()> {
    let user = intro_msg.author.name.as_str();
    let mut greeted = false;

    for step in plan(data, ctx.cfg.thread.max_chars_per_reply) {
        match step {
            PlanStep::SendChunks(chunks) => {
                for chunk in chunks {
                    if greeted {
                        intro_msg.channel_id.say(ctx.cache_http, chunk).await?;
                    } else {
                        let greeting =
                            format!("Hey {}!\n\n{}", intro_msg.author.mention(), chunk);
                        intro_msg.reply(ctx.cache_http, greeting).await?;
                        greeted = true;
                    }
                }
            }
            PlanStep::FlaggedWarning => {
                moderation::send_flagged_notice(
                    ctx,
                    intro_msg.guild_id,
                    user,
                    &data.status_text.clone().unwrap_or_default(),
                    data.reply_text.as_deref().unwrap_or_default(),
                    Some(&intro_msg.link()),
                )
                .await;
                intro_msg
                    .channel_id
                    .send_message(
                        ctx.cache_http,
                        embed(
                            "⚠️ **This conversation has been flagged by moderation.**",
                            Colour::GOLD,
                        ),
                    )
                    .await?;
            }
            PlanStep::BlockedNotice => {
                moderation::send_blocked_notice(
                    ctx,
                    intro_msg.guild_id,
                    user,
                    &data.status_text.clone().unwrap_or_default(),
                    data.reply_text.as_deref().unwrap_or_default(),
                )
                .await;
                intro_msg
                    .channel_id
                    .send_message(
                        ctx.cache_http,
                        embed(
                            "❌ **The response has been blocked by moderation.**",
                            Colour::RED,
                        ),
                    )
                    .await?;
            }
            PlanStep::CloseThread => {
                // No thread to close on this surface; degrade to an error notice
                intro_msg
                    .channel_id
                    .send_message(
                        ctx.cache_http,
                        embed("**Error** - context limit reached", Colour::GOLD),
                    )
                    .await?;
            }
            step @ (PlanStep::EmptyNotice
            | PlanStep::InvalidRequestNotice(_)
            | PlanStep::ErrorNotice(_)) => {
                if let Some(text) = notice_text(&step) {
                    intro_msg
                        .channel_id
                        .send_message(ctx.cache_http, embed(text, Colour::GOLD))
                        .await?;
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionData;

    fn data(outcome: CompletionOutcome, reply: Option<&str>, status: Option<&str>) -> CompletionData {
        CompletionData {
            outcome,
            reply_text: reply.map(String::from),
            status_text: status.map(String::from),
        }
    }

    #[test]
    fn chunks_concatenate_to_original() {
        let text = "The quick brown fox jumps over the lazy dog";
        for max_len in [1, 2, 7, 100] {
            let chunks = split_into_chunks(text, max_len);
            assert_eq!(chunks.concat(), text);
            // Every chunk but the last is exactly max_len characters
            for chunk in &chunks[..chunks.len() - 1] {
                assert_eq!(chunk.chars().count(), max_len);
            }
            assert!(chunks.last().is_some_and(|c| c.chars().count() <= max_len));
        }
    }

    #[test]
    fn chunking_splits_mid_word() {
        // No word-boundary awareness; this is the documented behavior.
        let chunks = split_into_chunks("wordwrap", 5);
        assert_eq!(chunks, vec!["wordw", "rap"]);
    }

    #[test]
    fn chunking_empty_string() {
        assert!(split_into_chunks("", 10).is_empty());
    }

    #[test]
    fn ok_with_reply_sends_chunks() {
        let steps = plan(&data(CompletionOutcome::Ok, Some("hello world"), None), 5);
        assert_eq!(
            steps,
            vec![PlanStep::SendChunks(vec![
                "hello".to_string(),
                " worl".to_string(),
                "d".to_string()
            ])]
        );
    }

    #[test]
    fn ok_without_reply_sends_empty_notice() {
        let steps = plan(&data(CompletionOutcome::Ok, None, None), 100);
        assert_eq!(steps, vec![PlanStep::EmptyNotice]);
    }

    #[test]
    fn flagged_delivers_then_warns() {
        let steps = plan(
            &data(
                CompletionOutcome::ModerationFlagged,
                Some("hi"),
                Some("from_response:violence"),
            ),
            100,
        );
        assert_eq!(
            steps,
            vec![
                PlanStep::SendChunks(vec!["hi".to_string()]),
                PlanStep::FlaggedWarning
            ]
        );
    }

    #[test]
    fn blocked_never_delivers_reply() {
        let steps = plan(
            &data(
                CompletionOutcome::ModerationBlocked,
                Some("withheld"),
                Some("from_response:violence"),
            ),
            100,
        );
        assert_eq!(steps, vec![PlanStep::BlockedNotice]);
        assert!(!steps
            .iter()
            .any(|step| matches!(step, PlanStep::SendChunks(_))));
    }

    #[test]
    fn too_long_closes_thread() {
        let steps = plan(&data(CompletionOutcome::TooLong, None, Some("ctx")), 100);
        assert_eq!(steps, vec![PlanStep::CloseThread]);
    }

    #[test]
    fn invalid_request_carries_status() {
        let steps = plan(
            &data(CompletionOutcome::InvalidRequest, None, Some("bad param")),
            100,
        );
        assert_eq!(
            steps,
            vec![PlanStep::InvalidRequestNotice("bad param".to_string())]
        );
    }

    #[test]
    fn other_error_carries_status() {
        let steps = plan(&data(CompletionOutcome::OtherError, None, Some("boom")), 100);
        assert_eq!(steps, vec![PlanStep::ErrorNotice("boom".to_string())]);
    }

    #[test]
    fn notice_steps_carry_visible_text() {
        assert_eq!(
            notice_text(&PlanStep::EmptyNotice).as_deref(),
            Some("**Invalid response** - empty response")
        );
        assert_eq!(
            notice_text(&PlanStep::InvalidRequestNotice("bad param".to_string())).as_deref(),
            Some("**Invalid request** - bad param")
        );
        assert_eq!(
            notice_text(&PlanStep::ErrorNotice("boom".to_string())).as_deref(),
            Some("**Error** - boom")
        );
        assert!(notice_text(&PlanStep::BlockedNotice).is_none());
    }

    #[test]
    fn onboarding_error_rows_are_never_silent() {
        // Empty, invalid-request, and error outcomes all plan a step with
        // in-channel notice text; only superseded messages go unanswered.
        for data in [
            data(CompletionOutcome::Ok, None, None),
            data(CompletionOutcome::InvalidRequest, None, Some("bad param")),
            data(CompletionOutcome::OtherError, None, Some("boom")),
        ] {
            for step in plan(&data, 100) {
                assert!(notice_text(&step).is_some(), "silent step: {:?}", step);
            }
        }
    }
}
