//! Client for the document similarity-search capability, wrapped in the same
//! outcome contract the completion pipeline uses.  The index and the search
//! algorithm live behind the HTTP endpoint and are opaque here.

use crate::completion::{CompletionData, CompletionOutcome};
use crate::context::Context;
use crate::{log_internal, moderation};
use anyhow::Result;

#[derive(serde::Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    top_k: usize,
}

/// One ranked fragment from the document index.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct SearchHit {
    pub text: String,
    pub score: f64,
}

#[derive(serde::Deserialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
}

/// Query the similarity-search endpoint; results come back ranked best-first.
pub async fn search(ctx: &Context<'_>, query: &str) -> Result<Vec<SearchHit>> {
    let retrieval = &ctx.cfg.retrieval;

    log_internal!("Searching document index for query ({} chars)...", query.len());
    let client = reqwest::Client::new();
    let response = client
        .post(&retrieval.search_url)
        .json(&SearchRequest {
            query,
            top_k: retrieval.top_k,
        })
        .send()
        .await?
        .error_for_status()?
        .json::<SearchResponse>()
        .await?;

    Ok(response.results)
}

/// Results come back ranked best-first, but the score field is authoritative
/// for which fragment gets delivered.
fn best_hit(hits: Vec<SearchHit>) -> Option<SearchHit> {
    hits.into_iter().max_by(|a, b| a.score.total_cmp(&b.score))
}

/// Run a retrieval query and fold the result into a [`CompletionData`], so QA
/// and onboarding flow through the same dispatcher as completions.  The top
/// fragment is moderated before it can be delivered.
pub async fn generate_retrieval_response(
    ctx: &Context<'_>,
    query: &str,
    user: &str,
) -> CompletionData {
    let hits = match search(ctx, query).await {
        Ok(hits) => hits,
        Err(err) => {
            log_internal!("Retrieval for {} failed: {}", user, err);
            return CompletionData::error(CompletionOutcome::OtherError, err.to_string());
        }
    };

    let Some(top) = best_hit(hits) else {
        return CompletionData::ok(None);
    };
    log_internal!("Top retrieval hit for {} scored {:.3}", user, top.score);

    match moderation::classify(ctx, &top.text).await {
        Ok(verdict) if verdict.is_blocked() => CompletionData {
            outcome: CompletionOutcome::ModerationBlocked,
            reply_text: Some(top.text),
            status_text: Some(format!("from_response:{}", verdict.blocked_str())),
        },
        Ok(verdict) if verdict.is_flagged() => CompletionData {
            outcome: CompletionOutcome::ModerationFlagged,
            reply_text: Some(top.text),
            status_text: Some(format!("from_response:{}", verdict.flagged_str())),
        },
        Ok(_) => CompletionData::ok(Some(top.text)),
        Err(err) => {
            log_internal!("Moderation of retrieval for {} failed: {}", user, err);
            CompletionData::error(CompletionOutcome::OtherError, err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(text: &str, score: f64) -> SearchHit {
        SearchHit {
            text: text.to_string(),
            score,
        }
    }

    #[test]
    fn best_hit_prefers_highest_score() {
        let hits = vec![hit("second", 0.4), hit("first", 0.9), hit("third", 0.1)];
        let top = best_hit(hits).unwrap();
        assert_eq!(top.text, "first");
        assert_eq!(top.score, 0.9);
    }

    #[test]
    fn best_hit_of_nothing_is_none() {
        assert!(best_hit(Vec::new()).is_none());
    }
}
