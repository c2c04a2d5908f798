use crate::llm::Provider;
use std::fmt;

/// Provider failure with enough context to debug it from the logs. Callers never
/// branch on it: every LLM failure is retried the same way.
#[derive(Debug, Clone)]
pub struct LlmDiagnosticsError {
    pub provider: Provider,
    pub stage: &'static str,
    pub status: Option<u16>,
    pub detail: String,
    pub raw_output: Option<String>,
}

impl LlmDiagnosticsError {
    pub fn http(provider: Provider, status: u16, body: String) -> Self {
        Self {
            provider,
            stage: "http",
            status: Some(status),
            detail: truncate(&body, 300),
            raw_output: Some(body),
        }
    }

    pub fn empty_completion(provider: Provider, finish_reason: Option<&str>) -> Self {
        Self {
            provider,
            stage: "empty_completion",
            status: None,
            detail: format!(
                "completion had no text (finish_reason={})",
                finish_reason.unwrap_or("none")
            ),
            raw_output: None,
        }
    }
}

impl fmt::Display for LlmDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} failed", self.provider, self.stage)?;
        if let Some(status) = self.status {
            write!(f, " (status {status})")?;
        }
        write!(f, ": {}", self.detail)
    }
}

impl std::error::Error for LlmDiagnosticsError {}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
