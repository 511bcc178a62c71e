use crate::context::Context;
use crate::event::EventHandled;
use anyhow::Result;

mod allow_list;
mod ask;
mod chat;
mod debug;
mod ignore_bots;
mod onboard;
mod ready;
mod thread_reply;

#[serenity::async_trait]
pub trait Plugin: Sync + Send {
    /// Plugin name.  Used for debug
    fn name(&self) -> &'static str;

    /// Initialize state information once the Discord connection is ready
    async fn init(&self, _ctx: &Context) -> Result<()> {
        Ok(())
    }

    /// Potentially handle event.  Returns:
    /// - Ok(EventHandled::Yes) if the event has been handled and no other plugin should attempt to
    ///   handle it
    /// - Ok(EventHandled::No) if another plugin should attempt to handle the event
    /// - Err if an error occurred
    async fn handle(&self, ctx: &Context, event: &crate::event::Event) -> Result<EventHandled>;
}

/// Ordered list of available plugins
pub fn plugins() -> Vec<Box<dyn Plugin>> {
    use crate::plugin::*;

    vec![
        // Core bot operations
        Box::new(debug::Debug),
        Box::new(ignore_bots::IgnoreBots),
        Box::new(allow_list::AllowList),
        Box::new(ready::ReadyPlugin),
        // Slash commands
        Box::new(chat::Chat),
        Box::new(ask::Ask),
        // Onboarding intro listener
        Box::new(onboard::Onboard),
        // Open-thread conversations, used if no other plugin handles the message.
        // Keep last.
        Box::new(thread_reply::ThreadReply),
    ]
}
