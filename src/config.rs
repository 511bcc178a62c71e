use crate::convo::{Conversation, Message};
use anyhow::{anyhow, Result};
use serenity::all::{ChannelId, GuildId};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;

const CONFIG_PATH_REL_HOME: &str = ".config/leobot/config.toml";

/// Placeholder in persona examples and instructions that is substituted with
/// the configured bot name.
const BOT_NAME_PLACEHOLDER: &str = "{{bot}}";

/// Bot configuration.  Loaded once at startup and immutable afterwards; every
/// component receives it by reference through the event context.
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Config {
    pub general: General,
    pub thread: Thread,
    pub completion: Completion,
    pub retrieval: Retrieval,
    pub persona: Persona,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct General {
    pub discord_token: String,
    pub client_id: u64,
    /// Guild allow-list.  Events from any other guild (or from DMs) are
    /// dropped.
    pub allowed_server_ids: Vec<u64>,
    /// Guild id (as a string, since TOML table keys are strings) to
    /// moderation channel id.
    pub moderation_channels: HashMap<String, u64>,
    /// Directory for per-channel onboarding chat logs.
    pub chat_log_dir: String,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct Thread {
    /// Wait this long after a thread message before responding, so a rapid
    /// burst of messages coalesces into one response.
    pub settle_delay_seconds: u64,
    /// Threads with more messages than this are closed instead of answered.
    /// Also bounds how much history is fetched for conversation context.
    pub max_thread_messages: u32,
    /// Replies longer than this are split into multiple messages.
    pub max_chars_per_reply: usize,
    pub active_prefix: String,
    pub inactive_prefix: String,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct Completion {
    pub completion_url: String,
    pub moderation_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: usize,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct Retrieval {
    pub search_url: String,
    pub top_k: usize,
    /// Channel watched for self-introductions.
    pub intro_listen_channel_id: u64,
    /// CSV of few-shot intro classification examples (`message,class`).
    pub intro_examples_path: String,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct Persona {
    pub name: String,
    pub instructions: String,
    pub examples: Vec<ExampleConversation>,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct ExampleConversation {
    pub messages: Vec<ExampleMessage>,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct ExampleMessage {
    pub user: String,
    pub text: String,
}

impl Config {
    fn config_path() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|p| p.join(CONFIG_PATH_REL_HOME))
            .ok_or(anyhow!("Could not find home directory"))
    }

    pub async fn load() -> Result<Self> {
        let path = Self::config_path()?;

        let mut file = tokio::fs::File::open(&path).await.map_err(|e| {
            anyhow!(
                "Could not open configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        let mut contents = String::new();
        file.read_to_string(&mut contents).await.map_err(|e| {
            anyhow!(
                "Could not read configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        let config: Config = toml::from_str(&contents).map_err(|e| {
            anyhow!(
                "Could not parse configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        Ok(config)
    }
}

impl General {
    pub fn guild_allowed(&self, guild_id: Option<GuildId>) -> bool {
        match guild_id {
            Some(id) => self.allowed_server_ids.contains(&id.get()),
            // DMs are not supported
            None => false,
        }
    }

    pub fn moderation_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.moderation_channels
            .get(&guild_id.get().to_string())
            .map(|id| ChannelId::new(*id))
    }

    pub fn invite_url(&self) -> String {
        format!(
            "https://discord.com/api/oauth2/authorize?client_id={}&permissions=328565073920&scope=bot",
            self.client_id
        )
    }
}

impl Persona {
    /// Example conversations with the bot-name placeholder substituted, ready
    /// for prompt assembly.
    pub fn example_conversations(&self) -> Vec<Conversation> {
        self.examples
            .iter()
            .map(|example| {
                let messages = example
                    .messages
                    .iter()
                    .map(|m| {
                        Message::new(
                            m.user.replace(BOT_NAME_PLACEHOLDER, &self.name),
                            m.text.replace(BOT_NAME_PLACEHOLDER, &self.name),
                        )
                    })
                    .collect();
                Conversation::new(messages)
            })
            .collect()
    }

    pub fn rendered_instructions(&self) -> String {
        self.instructions.replace(BOT_NAME_PLACEHOLDER, &self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persona() -> Persona {
        Persona {
            name: "leo".to_string(),
            instructions: "You are {{bot}}, a helpful community bot.".to_string(),
            examples: vec![ExampleConversation {
                messages: vec![
                    ExampleMessage {
                        user: "alice".to_string(),
                        text: "hi {{bot}}".to_string(),
                    },
                    ExampleMessage {
                        user: "{{bot}}".to_string(),
                        text: "hello!".to_string(),
                    },
                ],
            }],
        }
    }

    #[test]
    fn persona_substitutes_bot_name() {
        let convos = persona().example_conversations();
        assert_eq!(convos.len(), 1);
        assert_eq!(convos[0].messages[0].render(), "alice: hi leo");
        assert_eq!(convos[0].messages[1].render(), "leo: hello!");
        assert_eq!(
            persona().rendered_instructions(),
            "You are leo, a helpful community bot."
        );
    }

    #[test]
    fn guild_allow_list() {
        let general = General {
            discord_token: String::new(),
            client_id: 1,
            allowed_server_ids: vec![42],
            moderation_channels: HashMap::from([("42".to_string(), 7_u64)]),
            chat_log_dir: String::new(),
        };

        assert!(general.guild_allowed(Some(GuildId::new(42))));
        assert!(!general.guild_allowed(Some(GuildId::new(43))));
        assert!(!general.guild_allowed(None));
        assert_eq!(
            general.moderation_channel(GuildId::new(42)),
            Some(ChannelId::new(7))
        );
        assert_eq!(general.moderation_channel(GuildId::new(43)), None);
    }
}
