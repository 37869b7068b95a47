//! OpenAI-compatible chat-completions client used as the rating oracle.

use std::time::Duration;

use async_trait::async_trait;
use reviewrate_core::Verdict;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::prompt::{SYSTEM_PROMPT, build_user_prompt};
use crate::{OracleError, RatingOracle, RatingRequest};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "o4-mini";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Rating oracle backed by a chat-completions endpoint.
pub struct OpenAiOracle {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    model: Option<String>,
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenAiOracle {
    /// Create a client for `base_url` (e.g. `https://api.openai.com/v1`, no trailing slash needed).
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| OracleError::Unknown(format!("build http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

#[async_trait]
impl RatingOracle for OpenAiOracle {
    fn model(&self) -> &str {
        &self.model
    }

    async fn probe(&self) -> Result<(), OracleError> {
        let url = self.url("models");
        info!(url = %url, "probing rating oracle");
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(transport_error)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), body));
        }
        Ok(())
    }

    async fn rate(&self, request: &RatingRequest) -> Result<Verdict, OracleError> {
        let prompt = build_user_prompt(request);
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
        };

        let resp = self
            .client
            .post(self.url("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), body));
        }

        let text = resp.text().await.map_err(transport_error)?;
        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| OracleError::Unknown(format!("decode response: {e}")))?;
        let verdict = into_verdict(parsed, &self.model)?;
        debug!(property = %request.property_name, verdict = %verdict.text, "rated");
        Ok(verdict)
    }
}

fn into_verdict(resp: ChatResponse, fallback_model: &str) -> Result<Verdict, OracleError> {
    let content = resp
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(OracleError::EmptyResponse)?;
    let model = resp.model.unwrap_or_else(|| fallback_model.to_string());
    Ok(Verdict::new(content, model))
}

fn transport_error(err: reqwest::Error) -> OracleError {
    if err.is_timeout() {
        OracleError::Timeout(err.to_string())
    } else if err.is_connect() || err.is_request() {
        OracleError::Network(err.to_string())
    } else if let Some(status) = err.status() {
        status_error(status.as_u16(), err.to_string())
    } else {
        OracleError::from_message(err.to_string())
    }
}

fn status_error(status: u16, body: String) -> OracleError {
    match status {
        429 => OracleError::RateLimited(body),
        400 | 413 | 422 => OracleError::MalformedInput(body),
        408 | 504 => OracleError::Timeout(format!("{status}: {body}")),
        _ => OracleError::Server { status, body },
    }
}
