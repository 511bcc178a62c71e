//! Completion orchestrator: renders the prompt, calls the completion
//! capability, and folds every failure and moderation result into one closed
//! outcome type.  No raw error crosses into the dispatcher.

use crate::context::Context;
use crate::convo::{Conversation, Message, Prompt, SEPARATOR_TOKEN};
use crate::{log_internal, moderation};

/// Substring the completion endpoint uses in its 400 message when the prompt
/// exceeded the model's context window.
const CONTEXT_LENGTH_MARKER: &str = "maximum context length";

/// Closed enumeration of everything a completion attempt can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionOutcome {
    Ok,
    TooLong,
    InvalidRequest,
    OtherError,
    ModerationFlagged,
    ModerationBlocked,
}

/// Outcome plus the texts that go with it.  `reply_text` on a blocked outcome
/// is kept for the moderation audit trail and never delivered as the answer.
#[derive(Clone, Debug)]
pub struct CompletionData {
    pub outcome: CompletionOutcome,
    pub reply_text: Option<String>,
    pub status_text: Option<String>,
}

impl CompletionData {
    pub fn ok(reply_text: Option<String>) -> Self {
        Self {
            outcome: CompletionOutcome::Ok,
            reply_text,
            status_text: None,
        }
    }

    pub fn error(outcome: CompletionOutcome, status_text: String) -> Self {
        Self {
            outcome,
            reply_text: None,
            status_text: Some(status_text),
        }
    }

    /// Map the typed API failure onto the outcome enumeration.
    pub fn from_api_error(err: ApiError) -> Self {
        match err {
            ApiError::ContextLength(msg) => Self::error(CompletionOutcome::TooLong, msg),
            ApiError::InvalidRequest(msg) => Self::error(CompletionOutcome::InvalidRequest, msg),
            ApiError::Other(msg) => Self::error(CompletionOutcome::OtherError, msg),
        }
    }
}

/// Failure classes of the completion capability.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("context length exceeded: {0}")]
    ContextLength(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Other(err.to_string())
    }
}

#[derive(serde::Serialize)]
pub struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    temperature: f32,
    top_p: f32,
    max_tokens: usize,
    stop: [&'a str; 1],
}

#[derive(serde::Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(serde::Deserialize)]
struct CompletionChoice {
    text: String,
}

#[derive(serde::Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    message: String,
}

impl<'a> CompletionRequest<'a> {
    /// Conversation completion with the configured sampling parameters.  The
    /// separator token is the stop sequence, so generation ends at the turn
    /// boundary.
    pub fn new(cfg: &'a crate::config::Completion, prompt: &'a str) -> Self {
        Self {
            model: &cfg.model,
            prompt,
            temperature: cfg.temperature,
            top_p: cfg.top_p,
            max_tokens: cfg.max_tokens,
            stop: [SEPARATOR_TOKEN],
        }
    }

    /// Single-shot classification completion: greedy, short, stops at the
    /// line break.  Used by the intro detector.
    pub fn classification(cfg: &'a crate::config::Completion, prompt: &'a str) -> Self {
        Self {
            model: &cfg.model,
            prompt,
            temperature: 0.0,
            top_p: 1.0,
            max_tokens: 8,
            stop: ["\n"],
        }
    }

    pub async fn post(&self, cfg: &crate::config::Completion) -> Result<String, ApiError> {
        let url = cfg.completion_url.as_str();

        log_internal!("Sending request to completion endpoint {}... ", url);
        let client = reqwest::Client::new();
        let response = client
            .post(url)
            .bearer_auth(&cfg.api_key)
            .json(self)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST {
            let message = response
                .json::<ErrorResponse>()
                .await
                .map(|body| body.error.message)
                .unwrap_or_else(|_| "malformed error response".to_string());
            if message.contains(CONTEXT_LENGTH_MARKER) {
                return Err(ApiError::ContextLength(message));
            }
            return Err(ApiError::InvalidRequest(message));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Other(format!(
                "completion endpoint returned {}: {}",
                status, body
            )));
        }

        let completion = response.json::<CompletionResponse>().await?;
        log_internal!("Sending request to completion endpoint {}... done", url);

        let text = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.text)
            .unwrap_or_default();
        Ok(text.trim().to_string())
    }
}

/// Run the full pipeline for `convo`: prompt assembly, completion call, and
/// post-moderation of the combined prompt tail + reply.
pub async fn generate_completion_response(
    ctx: &Context<'_>,
    convo: Conversation,
    user: &str,
) -> CompletionData {
    let persona = &ctx.cfg.persona;
    let prompt = Prompt {
        header: Message::new(
            "System",
            format!(
                "Instructions for {}: {}",
                persona.name,
                persona.rendered_instructions()
            ),
        ),
        examples: persona.example_conversations(),
        // The bot's empty turn at the end is what the model completes.
        convo: convo.append(Message::opening(persona.name.clone())),
    };
    let rendered = prompt.render();

    let request = CompletionRequest::new(&ctx.cfg.completion, &rendered);
    let reply = match request.post(&ctx.cfg.completion).await {
        Ok(reply) => reply,
        Err(err) => {
            log_internal!("Completion for {} failed: {}", user, err);
            return CompletionData::from_api_error(err);
        }
    };

    if reply.is_empty() {
        // "No content"; the dispatcher turns this into an empty-response notice.
        return CompletionData::ok(None);
    }

    // Moderate the prompt tail together with the reply.  A jailbreak may only
    // be evident in context, not in the reply alone.
    let combined = format!("{}{}", rendered, reply);
    match moderation::classify(ctx, &combined).await {
        Ok(verdict) if verdict.is_blocked() => CompletionData {
            outcome: CompletionOutcome::ModerationBlocked,
            reply_text: Some(reply),
            status_text: Some(format!("from_response:{}", verdict.blocked_str())),
        },
        Ok(verdict) if verdict.is_flagged() => CompletionData {
            outcome: CompletionOutcome::ModerationFlagged,
            reply_text: Some(reply),
            status_text: Some(format!("from_response:{}", verdict.flagged_str())),
        },
        Ok(_) => CompletionData::ok(Some(reply)),
        Err(err) => {
            log_internal!("Moderation of completion for {} failed: {}", user, err);
            CompletionData::error(CompletionOutcome::OtherError, err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_length_error_becomes_too_long() {
        let err = ApiError::ContextLength(
            "This model's maximum context length is 4097 tokens".to_string(),
        );
        let data = CompletionData::from_api_error(err);
        assert_eq!(data.outcome, CompletionOutcome::TooLong);
        assert!(data.reply_text.is_none());
        assert!(data.status_text.is_some());
    }

    #[test]
    fn invalid_request_error_keeps_upstream_message() {
        let data = CompletionData::from_api_error(ApiError::InvalidRequest(
            "unknown parameter".to_string(),
        ));
        assert_eq!(data.outcome, CompletionOutcome::InvalidRequest);
        assert_eq!(data.status_text.as_deref(), Some("unknown parameter"));
    }

    #[test]
    fn other_error_becomes_other_outcome() {
        let data = CompletionData::from_api_error(ApiError::Other("connection reset".to_string()));
        assert_eq!(data.outcome, CompletionOutcome::OtherError);
    }

    #[test]
    fn empty_ok_carries_no_reply() {
        let data = CompletionData::ok(None);
        assert_eq!(data.outcome, CompletionOutcome::Ok);
        assert!(data.reply_text.is_none());
        assert!(data.status_text.is_none());
    }
}
