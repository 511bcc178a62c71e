//! Thread lifecycle: whether an inbound thread message should be processed at
//! all, and the one-way active -> closed transition.

use crate::context::Context;
use anyhow::Result;
use serenity::all::{
    ChannelId, ChannelType, Colour, CreateEmbed, CreateMessage, EditThread, GetMessages,
    GuildChannel, Message, MessageId, UserId,
};
use std::time::Duration;

/// What to do with a message that arrived in some channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateDecision {
    /// Ours, open, and under the ceiling: answer it.
    Process,
    /// Not a conversation thread of ours (or already closed).
    Ignore,
    /// Ours but over the message ceiling: close instead of answering.
    Close,
}

/// Snapshot of the thread fields the gate looks at, so the decision itself is
/// a pure function.
#[derive(Clone, Debug)]
pub struct ThreadGate {
    pub is_thread: bool,
    pub owned_by_bot: bool,
    pub archived: bool,
    pub locked: bool,
    pub active_title: bool,
    pub message_count: Option<u32>,
}

impl ThreadGate {
    pub fn snapshot(thread: &GuildChannel, bot_id: UserId, active_prefix: &str) -> Self {
        let metadata = thread.thread_metadata.as_ref();
        Self {
            is_thread: matches!(
                thread.kind,
                ChannelType::PublicThread | ChannelType::PrivateThread
            ),
            owned_by_bot: thread.owner_id == Some(bot_id),
            archived: metadata.map(|m| m.archived).unwrap_or(false),
            locked: metadata.map(|m| m.locked).unwrap_or(false),
            active_title: thread.name.starts_with(active_prefix),
            message_count: thread.message_count,
        }
    }

    pub fn decide(&self, ceiling: u32) -> GateDecision {
        if !self.is_thread
            || !self.owned_by_bot
            || self.archived
            || self.locked
            || !self.active_title
        {
            return GateDecision::Ignore;
        }
        if self.message_count.is_some_and(|count| count > ceiling) {
            return GateDecision::Close;
        }
        GateDecision::Process
    }
}

/// True when another user message arrived after `current_id`, meaning the
/// in-flight response for `current_id` is superseded and must be discarded.
/// A newer message from the bot itself does not supersede anything.
pub fn is_last_message_stale(
    current_id: MessageId,
    last: Option<(MessageId, UserId)>,
    bot_id: UserId,
) -> bool {
    match last {
        Some((last_id, last_author)) => last_id != current_id && last_author != bot_id,
        None => false,
    }
}

/// Discord caps a single history fetch at 100 messages.
const HISTORY_FETCH_PAGE: usize = 100;

fn history_page_limit(fetched: usize, max: u32) -> u8 {
    (max as usize)
        .saturating_sub(fetched)
        .min(HISTORY_FETCH_PAGE) as u8
}

/// Fetch up to `max` messages of thread history, oldest first, paginating
/// past the per-fetch cap so long threads keep their oldest context.
pub async fn fetch_history(
    ctx: &Context<'_>,
    channel_id: ChannelId,
    max: u32,
) -> Result<Vec<Message>> {
    let mut collected: Vec<Message> = Vec::new();

    loop {
        let limit = history_page_limit(collected.len(), max);
        if limit == 0 {
            break;
        }
        let mut request = GetMessages::new().limit(limit);
        if let Some(oldest) = collected.last() {
            request = request.before(oldest.id);
        }
        let batch = channel_id.messages(ctx.cache_http, request).await?;
        if batch.is_empty() {
            break;
        }
        // Batches arrive newest first, so the last entry anchors the next page
        collected.extend(batch);
    }

    collected.reverse();
    Ok(collected)
}

/// Fetch the newest message in the channel as an `(id, author)` pair for the
/// staleness check.
pub async fn latest_message(
    ctx: &Context<'_>,
    channel_id: ChannelId,
) -> Result<Option<(MessageId, UserId)>> {
    let messages = channel_id
        .messages(ctx.cache_http, GetMessages::new().limit(1))
        .await?;
    Ok(messages.first().map(|msg| (msg.id, msg.author.id)))
}

/// Wait out the settle window before responding, so a rapid burst of messages
/// coalesces into a single response to the newest one.
pub async fn settle_delay(ctx: &Context<'_>) {
    let seconds = ctx.cfg.thread.settle_delay_seconds;
    if seconds > 0 {
        tokio::time::sleep(Duration::from_secs(seconds)).await;
    }
}

/// Close a conversation thread: rewrite the title to the inactive marker,
/// announce the closure, then archive and lock.  Archiving before the notice
/// would make the notice undeliverable in some client views.
pub async fn close_thread(ctx: &Context<'_>, thread_id: ChannelId) -> Result<()> {
    let inactive_prefix = ctx.cfg.thread.inactive_prefix.clone();

    thread_id
        .edit_thread(ctx.cache_http, EditThread::new().name(inactive_prefix))
        .await?;

    thread_id
        .send_message(
            ctx.cache_http,
            CreateMessage::new().embed(
                CreateEmbed::new()
                    .description("**Thread closed** - Context limit reached, closing...")
                    .colour(Colour::BLUE),
            ),
        )
        .await?;

    thread_id
        .edit_thread(
            ctx.cache_http,
            EditThread::new().archived(true).locked(true),
        )
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn open_gate() -> ThreadGate {
        ThreadGate {
            is_thread: true,
            owned_by_bot: true,
            archived: false,
            locked: false,
            active_title: true,
            message_count: Some(10),
        }
    }

    #[test]
    fn open_thread_is_processed() {
        assert_eq!(open_gate().decide(200), GateDecision::Process);
    }

    #[test]
    fn over_ceiling_closes_without_processing() {
        let gate = ThreadGate {
            message_count: Some(201),
            ..open_gate()
        };
        assert_eq!(gate.decide(200), GateDecision::Close);
    }

    #[test]
    fn at_ceiling_still_processes() {
        let gate = ThreadGate {
            message_count: Some(200),
            ..open_gate()
        };
        assert_eq!(gate.decide(200), GateDecision::Process);
    }

    #[test]
    fn foreign_or_closed_threads_are_ignored() {
        for gate in [
            ThreadGate {
                is_thread: false,
                ..open_gate()
            },
            ThreadGate {
                owned_by_bot: false,
                ..open_gate()
            },
            ThreadGate {
                archived: true,
                ..open_gate()
            },
            ThreadGate {
                locked: true,
                ..open_gate()
            },
            ThreadGate {
                active_title: false,
                ..open_gate()
            },
        ] {
            assert_eq!(gate.decide(200), GateDecision::Ignore);
        }
    }

    #[test]
    fn history_pagination_covers_the_full_ceiling() {
        // A 200-message ceiling needs two full pages
        assert_eq!(history_page_limit(0, 200), 100);
        assert_eq!(history_page_limit(100, 200), 100);
        assert_eq!(history_page_limit(200, 200), 0);
        // Partial last page
        assert_eq!(history_page_limit(100, 150), 50);
        // Small ceilings fetch once
        assert_eq!(history_page_limit(0, 42), 42);
        assert_eq!(history_page_limit(42, 42), 0);
    }

    #[test]
    fn staleness_predicate() {
        let bot = UserId::new(1);
        let alice = UserId::new(2);
        let first = MessageId::new(100);
        let second = MessageId::new(101);

        // Same message is still the newest: not stale
        assert!(!is_last_message_stale(first, Some((first, alice)), bot));
        // A newer user message supersedes
        assert!(is_last_message_stale(first, Some((second, alice)), bot));
        // A newer bot message does not
        assert!(!is_last_message_stale(first, Some((second, bot)), bot));
        // Empty channel: nothing to supersede
        assert!(!is_last_message_stale(first, None, bot));
    }

    /// Two messages inside the settle window: only the newest survives the
    /// staleness check, so exactly one response is delivered.
    #[tokio::test(start_paused = true)]
    async fn burst_produces_single_response() {
        let bot = UserId::new(1);
        let alice = UserId::new(2);
        let settle = Duration::from_secs(3);

        // The channel's newest message, as the staleness check would fetch it
        let newest = Arc::new(Mutex::new(None::<(MessageId, UserId)>));
        let delivered = Arc::new(Mutex::new(Vec::new()));

        let handle = |msg_id: u64, arrival: Duration| {
            let newest = Arc::clone(&newest);
            let delivered = Arc::clone(&delivered);
            async move {
                tokio::time::sleep(arrival).await;
                let id = MessageId::new(msg_id);
                *newest.lock().unwrap() = Some((id, alice));

                tokio::time::sleep(settle).await;
                let last = *newest.lock().unwrap();
                if !is_last_message_stale(id, last, bot) {
                    delivered.lock().unwrap().push(msg_id);
                }
            }
        };

        // 1 second apart, within the 3 second settle window
        tokio::join!(
            handle(100, Duration::from_secs(0)),
            handle(101, Duration::from_secs(1))
        );

        assert_eq!(*delivered.lock().unwrap(), vec![101]);
    }
}
