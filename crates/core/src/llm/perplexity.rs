use crate::config::{non_blank_env, parse_env, Settings};
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::{CompletionRequest, LlmClient, Provider};
use anyhow::Context;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;

type RpmLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

const DEFAULT_BASE_URL: &str = "https://api.perplexity.ai";
const DEFAULT_MODEL: &str = "sonar";
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 4000;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_RPM: u32 = 10;

#[derive(Debug)]
pub struct PerplexityClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,

    // None when PERPLEXITY_MAX_RPM=0.
    rate_limiter: Option<RpmLimiter>,
}

impl PerplexityClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_perplexity_api_key()?.to_string();
        let base_url =
            non_blank_env("PERPLEXITY_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = non_blank_env("PERPLEXITY_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let temperature = parse_env::<f32>("PERPLEXITY_TEMPERATURE")?.unwrap_or(DEFAULT_TEMPERATURE);
        let max_tokens = parse_env::<u32>("PERPLEXITY_MAX_TOKENS")?.unwrap_or(DEFAULT_MAX_TOKENS);
        let timeout_secs =
            parse_env::<u64>("PERPLEXITY_TIMEOUT_SECS")?.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let max_rpm = parse_env::<u32>("PERPLEXITY_MAX_RPM")?.unwrap_or(DEFAULT_MAX_RPM);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            temperature,
            max_tokens,
            rate_limiter: rpm_limiter(max_rpm),
        })
    }

    async fn pace(&self) {
        if let Some(limiter) = &self.rate_limiter {
            if limiter.check().is_err() {
                tracing::debug!("Perplexity rpm quota exhausted; waiting");
                limiter.until_ready().await;
            }
        }
    }

    async fn create_completion(
        &self,
        req: &ChatCompletionRequest<'_>,
    ) -> anyhow::Result<ChatCompletionResponse> {
        self.pace().await;

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(req)
            .send()
            .await
            .context("Perplexity request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Perplexity response body")?;
        if !status.is_success() {
            return Err(LlmDiagnosticsError::http(Provider::Perplexity, status.as_u16(), text).into());
        }

        serde_json::from_str::<ChatCompletionResponse>(&text)
            .with_context(|| format!("failed to decode Perplexity response: {text}"))
    }

    fn build_request<'a>(&'a self, request: &'a CompletionRequest, max_tokens: u32) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: &request.system,
                },
                Message {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: self.temperature,
            max_tokens,
        }
    }
}

fn rpm_limiter(max_rpm: u32) -> Option<RpmLimiter> {
    NonZeroU32::new(max_rpm).map(|rpm| RateLimiter::direct(Quota::per_minute(rpm)))
}

/// Text of the first choice, or an error when the model returned nothing usable.
fn completion_text(res: &ChatCompletionResponse) -> anyhow::Result<String> {
    let choice = res.choices.first();
    let text = choice
        .and_then(|c| c.message.content.as_deref())
        .map(str::trim)
        .unwrap_or_default();
    if text.is_empty() {
        let finish_reason = choice.and_then(|c| c.finish_reason.as_deref());
        return Err(LlmDiagnosticsError::empty_completion(Provider::Perplexity, finish_reason).into());
    }
    Ok(text.to_string())
}

fn hit_length_limit(res: &ChatCompletionResponse) -> bool {
    res.choices
        .first()
        .and_then(|c| c.finish_reason.as_deref())
        .is_some_and(|r| r == "length")
}

#[async_trait::async_trait]
impl LlmClient for PerplexityClient {
    fn provider(&self) -> Provider {
        Provider::Perplexity
    }

    async fn complete(&self, request: CompletionRequest) -> anyhow::Result<String> {
        let mut res = self
            .create_completion(&self.build_request(&request, self.max_tokens))
            .await?;

        // If the model hit max_tokens, retry once with a higher ceiling.
        if hit_length_limit(&res) {
            let bumped = self.max_tokens.saturating_mul(2);
            tracing::warn!(
                from = self.max_tokens,
                to = bumped,
                "Perplexity finish_reason=length; retrying once with higher max_tokens"
            );
            res = self
                .create_completion(&self.build_request(&request, bumped))
                .await?;
        }

        tracing::debug!(
            model = %self.model,
            citations = res.citations.len(),
            usage = ?res.usage,
            "Perplexity completion received"
        );
        completion_text(&res)
    }
}

// Perplexity rejects stop sequences, so the request type has no field for them.
#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,

    #[serde(default)]
    citations: Vec<String>,

    #[serde(default)]
    usage: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ChoiceMessage,

    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> PerplexityClient {
        PerplexityClient {
            http: reqwest::Client::new(),
            api_key: "pplx-test".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            rate_limiter: None,
        }
    }

    #[test]
    fn request_never_carries_stop_sequences() {
        let client = client();
        let request = CompletionRequest {
            system: "You are a Financial Analyst.".to_string(),
            user: "Analyze Infosys.".to_string(),
        };
        let body = serde_json::to_value(client.build_request(&request, 4000)).unwrap();

        assert_eq!(
            body,
            json!({
                "model": "sonar",
                "messages": [
                    {"role": "system", "content": "You are a Financial Analyst."},
                    {"role": "user", "content": "Analyze Infosys."},
                ],
                "temperature": 0.7f32,
                "max_tokens": 4000,
            })
        );
        assert!(body.get("stop").is_none());
    }

    #[test]
    fn parses_completion_text_and_citations() {
        let res: ChatCompletionResponse = serde_json::from_value(json!({
            "id": "abc",
            "model": "sonar",
            "citations": ["https://example.com/q3"],
            "choices": [{
                "index": 0,
                "finish_reason": "stop",
                "message": {"role": "assistant", "content": "  Revenue grew [1].  "}
            }]
        }))
        .unwrap();

        assert_eq!(res.citations.len(), 1);
        assert!(!hit_length_limit(&res));
        assert_eq!(completion_text(&res).unwrap(), "Revenue grew [1].");
    }

    #[test]
    fn empty_completion_is_an_error() {
        let res: ChatCompletionResponse = serde_json::from_value(json!({
            "choices": [{"finish_reason": "length", "message": {"role": "assistant", "content": ""}}]
        }))
        .unwrap();

        assert!(hit_length_limit(&res));
        let err = completion_text(&res).unwrap_err();
        let diag = err.downcast_ref::<LlmDiagnosticsError>().unwrap();
        assert_eq!(diag.stage, "empty_completion");
    }

    #[test]
    fn rpm_zero_disables_pacing() {
        assert!(rpm_limiter(0).is_none());
    }

    #[test]
    fn rpm_quota_admits_max_rpm_then_blocks() {
        let limiter = rpm_limiter(2).unwrap();
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }

    #[tokio::test]
    async fn pace_waits_once_the_quota_is_spent() {
        let mut client = client();
        client.rate_limiter = rpm_limiter(1);

        client.pace().await;
        let waited = tokio::time::timeout(Duration::from_millis(50), client.pace()).await;
        assert!(waited.is_err(), "second request inside the same minute must wait");
    }
}
