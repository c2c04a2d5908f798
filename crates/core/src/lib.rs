pub mod domain;
pub mod llm;
pub mod pipeline;
pub mod render;
pub mod search;
pub mod storage;

pub mod config {
    use anyhow::Context;
    use serde::Serialize;

    #[derive(Debug, Clone, Default)]
    pub struct Settings {
        pub perplexity_api_key: Option<String>,
        pub tavily_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub report_max_attempts: Option<u32>,
        pub report_retry_delay_secs: Option<u64>,
    }

    /// Which provider keys are present, as shown in the UI sidebar.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
    pub struct ApiKeyStatus {
        pub perplexity_api_key: bool,
        pub tavily_api_key: bool,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                perplexity_api_key: non_blank_env("PERPLEXITY_API_KEY"),
                tavily_api_key: non_blank_env("TAVILY_API_KEY"),
                sentry_dsn: non_blank_env("SENTRY_DSN"),
                report_max_attempts: parse_env("REPORT_MAX_ATTEMPTS")?,
                report_retry_delay_secs: parse_env("REPORT_RETRY_DELAY_SECS")?,
            })
        }

        pub fn require_perplexity_api_key(&self) -> anyhow::Result<&str> {
            self.perplexity_api_key
                .as_deref()
                .context("PERPLEXITY_API_KEY is required")
        }

        pub fn require_tavily_api_key(&self) -> anyhow::Result<&str> {
            self.tavily_api_key
                .as_deref()
                .context("TAVILY_API_KEY is required")
        }

        pub fn api_key_status(&self) -> ApiKeyStatus {
            ApiKeyStatus {
                perplexity_api_key: self.perplexity_api_key.is_some(),
                tavily_api_key: self.tavily_api_key.is_some(),
            }
        }
    }

    /// The variable's value, or `None` when it is unset or blank.
    pub fn non_blank_env(key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }

    /// Parses an optional tunable. Unset or blank is `None`; anything that does
    /// not parse is an error naming the variable.
    pub fn parse_env<T>(key: &str) -> anyhow::Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        parse_value(key, non_blank_env(key).as_deref())
    }

    fn parse_value<T>(key: &str, raw: Option<&str>) -> anyhow::Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match raw.map(str::trim).filter(|v| !v.is_empty()) {
            Some(raw) => raw
                .parse::<T>()
                .map(Some)
                .with_context(|| format!("{key} has an invalid value: {raw}")),
            None => Ok(None),
        }
    }

}
