//! Per-channel chat log files for onboarding audit.  Plain text, one
//! `author: text` line per message, overwritten on each fetch.

use anyhow::{anyhow, Result};
use serenity::all::ChannelId;
use std::path::{Path, PathBuf};

pub fn log_path(dir: &str, channel_id: ChannelId) -> PathBuf {
    Path::new(dir).join(format!("{}.txt", channel_id.get()))
}

pub async fn save_channel_log(
    dir: &str,
    channel_id: ChannelId,
    entries: &[(String, String)],
) -> Result<()> {
    let path = log_path(dir, channel_id);

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            anyhow!(
                "Could not create chat log directory `{}`: {}",
                parent.to_string_lossy(),
                e
            )
        })?;
    }

    let mut contents = String::new();
    for (author, text) in entries {
        contents.push_str(author);
        contents.push_str(": ");
        contents.push_str(text);
        contents.push('\n');
    }

    tokio::fs::write(&path, contents).await.map_err(|e| {
        anyhow!(
            "Could not write chat log `{}`: {}",
            path.to_string_lossy(),
            e
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_and_overwrites_channel_log() {
        let dir = std::env::temp_dir().join("leobot_chatlog_test");
        let dir = dir.to_str().unwrap();
        let channel = ChannelId::new(12345);

        let entries = vec![
            ("alice".to_string(), "hi everyone".to_string()),
            ("bob".to_string(), "welcome!".to_string()),
        ];
        save_channel_log(dir, channel, &entries).await.unwrap();

        let contents = tokio::fs::read_to_string(log_path(dir, channel))
            .await
            .unwrap();
        assert_eq!(contents, "alice: hi everyone\nbob: welcome!\n");

        // A later fetch replaces the file rather than appending
        let entries = vec![("carol".to_string(), "hello".to_string())];
        save_channel_log(dir, channel, &entries).await.unwrap();

        let contents = tokio::fs::read_to_string(log_path(dir, channel))
            .await
            .unwrap();
        assert_eq!(contents, "carol: hello\n");
    }
}
