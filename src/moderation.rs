//! Moderation classifier: scores text against per-category threshold tables
//! and notifies the per-guild moderation channel.

use crate::context::Context;
use crate::helper::{tail_chars, truncate_chars};
use crate::log_internal;
use anyhow::{anyhow, Result};
use serenity::all::{CreateEmbed, CreateMessage, GuildId};
use std::collections::HashMap;

/// How many trailing characters of the input are classified.  The most recent
/// content is the actionable part, and the window bounds API cost.
pub const MODERATION_WINDOW_CHARS: usize = 500;

/// `(category, flagged threshold, blocked threshold)`.
///
/// Invariant: blocked threshold >= flagged threshold for every category, so a
/// blocked category is always flag-eligible.  Callers check blocked first.
pub const MODERATION_THRESHOLDS: [(&str, f64, f64); 7] = [
    ("hate", 0.4, 0.5),
    ("hate/threatening", 0.05, 0.1),
    ("self-harm", 0.1, 0.2),
    ("sexual", 0.3, 0.5),
    ("sexual/minors", 0.1, 0.2),
    ("violence", 0.1, 0.7),
    ("violence/graphic", 0.1, 0.8),
];

/// Which categories tripped which threshold table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModerationVerdict {
    pub flagged: Vec<&'static str>,
    pub blocked: Vec<&'static str>,
}

impl ModerationVerdict {
    pub fn is_flagged(&self) -> bool {
        !self.flagged.is_empty()
    }

    pub fn is_blocked(&self) -> bool {
        !self.blocked.is_empty()
    }

    pub fn flagged_str(&self) -> String {
        self.flagged.join(",")
    }

    pub fn blocked_str(&self) -> String {
        self.blocked.join(",")
    }
}

/// Compare per-category scores against both threshold tables.  Deterministic:
/// same scores, same verdict.
pub fn verdict_from_scores(scores: &HashMap<String, f64>) -> ModerationVerdict {
    let mut verdict = ModerationVerdict::default();

    for (category, flagged_threshold, blocked_threshold) in MODERATION_THRESHOLDS {
        let Some(score) = scores.get(category) else {
            continue;
        };
        if *score > flagged_threshold {
            verdict.flagged.push(category);
        }
        if *score > blocked_threshold {
            verdict.blocked.push(category);
        }
    }

    verdict
}

#[derive(serde::Serialize)]
struct ModerationRequest<'a> {
    input: &'a str,
}

#[derive(serde::Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationResult>,
}

#[derive(serde::Deserialize)]
struct ModerationResult {
    category_scores: HashMap<String, f64>,
}

/// Score the trailing [`MODERATION_WINDOW_CHARS`] of `text` through the
/// moderation capability and classify against the threshold tables.
pub async fn classify(ctx: &Context<'_>, text: &str) -> Result<ModerationVerdict> {
    let completion = &ctx.cfg.completion;
    let input = tail_chars(text, MODERATION_WINDOW_CHARS);

    let client = reqwest::Client::new();
    let response = client
        .post(&completion.moderation_url)
        .bearer_auth(&completion.api_key)
        .json(&ModerationRequest { input })
        .send()
        .await?
        .error_for_status()?
        .json::<ModerationResponse>()
        .await?;

    let result = response
        .results
        .first()
        .ok_or(anyhow!("Moderation endpoint returned no results"))?;

    Ok(verdict_from_scores(&result.category_scores))
}

/// Notify the guild's moderation channel about a flagged text.  Fire and
/// forget: failures and unconfigured channels are logged, never propagated.
pub async fn send_flagged_notice(
    ctx: &Context<'_>,
    guild_id: Option<GuildId>,
    user: &str,
    flagged_str: &str,
    message: &str,
    url: Option<&str>,
) {
    if flagged_str.is_empty() {
        return;
    }

    let description = format!(
        "⚠️ **{}** flagged for `{}`\n{}\n{}",
        user,
        flagged_str,
        truncate_chars(message, 500),
        url.unwrap_or("no url"),
    );
    send_notice(ctx, guild_id, description, serenity::all::Colour::GOLD).await;
}

/// Notify the guild's moderation channel about a blocked text.  The withheld
/// content is included here (and only here) for audit.
pub async fn send_blocked_notice(
    ctx: &Context<'_>,
    guild_id: Option<GuildId>,
    user: &str,
    blocked_str: &str,
    message: &str,
) {
    if blocked_str.is_empty() {
        return;
    }

    let description = format!(
        "❌ **{}** blocked for `{}`\n{}",
        user,
        blocked_str,
        truncate_chars(message, 500),
    );
    send_notice(ctx, guild_id, description, serenity::all::Colour::RED).await;
}

async fn send_notice(
    ctx: &Context<'_>,
    guild_id: Option<GuildId>,
    description: String,
    colour: serenity::all::Colour,
) {
    let Some(guild_id) = guild_id else {
        return;
    };
    let Some(channel_id) = ctx.cfg.general.moderation_channel(guild_id) else {
        return;
    };

    let builder =
        CreateMessage::new().embed(CreateEmbed::new().description(description).colour(colour));
    if let Err(err) = channel_id.send_message(ctx.cache_http, builder).await {
        log_internal!("Failed to notify moderation channel: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs
            .iter()
            .map(|(category, score)| (category.to_string(), *score))
            .collect()
    }

    #[test]
    fn blocked_threshold_at_least_flagged_threshold() {
        for (category, flagged, blocked) in MODERATION_THRESHOLDS {
            assert!(
                blocked >= flagged,
                "category {} has blocked threshold {} below flagged threshold {}",
                category,
                blocked,
                flagged
            );
        }
    }

    #[test]
    fn clean_scores_trip_nothing() {
        let verdict = verdict_from_scores(&scores(&[("hate", 0.0), ("violence", 0.05)]));
        assert!(!verdict.is_flagged());
        assert!(!verdict.is_blocked());
    }

    #[test]
    fn flagged_without_blocked() {
        // Above violence flagged threshold (0.1), below blocked (0.7)
        let verdict = verdict_from_scores(&scores(&[("violence", 0.5)]));
        assert_eq!(verdict.flagged, vec!["violence"]);
        assert!(verdict.blocked.is_empty());
    }

    #[test]
    fn blocked_implies_flagged() {
        let verdict = verdict_from_scores(&scores(&[("violence", 0.71)]));
        assert_eq!(verdict.blocked, vec!["violence"]);
        assert_eq!(verdict.flagged, vec!["violence"]);
    }

    #[test]
    fn unknown_categories_ignored() {
        let verdict = verdict_from_scores(&scores(&[("spam", 0.99)]));
        assert!(!verdict.is_flagged());
        assert!(!verdict.is_blocked());
    }

    #[test]
    fn classification_is_idempotent() {
        let input = scores(&[("hate", 0.45), ("sexual", 0.31)]);
        assert_eq!(verdict_from_scores(&input), verdict_from_scores(&input));
    }

    #[test]
    fn verdict_strings_join_categories() {
        let verdict = verdict_from_scores(&scores(&[("hate", 0.6), ("sexual", 0.6)]));
        assert_eq!(verdict.blocked_str(), "hate,sexual");
        assert_eq!(verdict.flagged_str(), "hate,sexual");
    }
}
