use crate::{event::*, plugin::*};
use anyhow::Result;

/// Drops message and command events from guilds outside the configured
/// allow-list.  DMs have no guild and are dropped too.
pub struct AllowList;

#[serenity::async_trait]
impl Plugin for AllowList {
    fn name(&self) -> &'static str {
        "allow_list"
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let guild_id = match event {
            Event::Message(msg) => msg.guild_id,
            Event::Interaction(cmd) => cmd.guild_id,
            _ => return Ok(EventHandled::No),
        };

        if ctx.cfg.general.guild_allowed(guild_id) {
            Ok(EventHandled::No)
        } else {
            // Swallow the event so nothing downstream responds
            Ok(EventHandled::Yes)
        }
    }
}
