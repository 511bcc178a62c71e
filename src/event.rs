//! The Serenity crate we're using for the Discord API is designed around callbacks to handle
//! events.  However, this does not mesh well with our plugin framework here.  To resolve this,
//! this module translates the callbacks to a distinct Event enum.

use crate::context::Context;
use serenity::all::{CommandInteraction, Message, Ready};

/// A Discord event
pub enum Event {
    Ready(Ready),
    Message(Message),
    /// A slash-command invocation
    Interaction(CommandInteraction),
}

pub enum EventHandled {
    Yes,
    No,
}

impl Event {
    // When an event occurs, iterate over all the plugins to see if any can/should handle it.
    //
    // A failure in one plugin must never take down the event loop: errors are
    // logged and the remaining plugins still get a look at the event.
    pub async fn handle(self, ctx: Context<'_>) {
        if let Event::Ready(_) = &self {
            // Serenity is connected and usable.  Initialize plugin states.
            for plugin in crate::plugin::plugins() {
                if let Err(err) = plugin.init(&ctx).await {
                    eprintln!("Error initializing plugin {}: {}", plugin.name(), err);
                }
            }
        }

        // Have plugins handle the event
        for plugin in crate::plugin::plugins() {
            match plugin.handle(&ctx, &self).await {
                Ok(EventHandled::Yes) => return,
                Ok(EventHandled::No) => continue,
                Err(err) => eprintln!("Error in plugin {}: {}", plugin.name(), err),
            }
        }
    }
}
