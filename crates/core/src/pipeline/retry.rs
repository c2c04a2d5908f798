use crate::config::Settings;
use crate::pipeline::progress::{PipelineEvent, ProgressSink};
use std::future::Future;
use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Bounded retry. Every error counts as retryable; the pause between attempts
/// is fixed (zero by default).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_attempts: settings
                .report_max_attempts
                .filter(|n| *n >= 1)
                .unwrap_or(DEFAULT_MAX_ATTEMPTS),
            delay: Duration::from_secs(settings.report_retry_delay_secs.unwrap_or(0)),
        }
    }
}

/// Runs `op` until it succeeds or `policy.max_attempts` attempts have failed.
/// `op` receives the 1-based attempt number. On exhaustion the last error is
/// returned with the attempt count as context.
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    company_name: &str,
    progress: &dyn ProgressSink,
    mut op: F,
) -> anyhow::Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        progress.on_event(&PipelineEvent::AttemptStarted {
            attempt,
            max_attempts,
            company_name: company_name.to_string(),
        });

        match op(attempt).await {
            Ok(value) => {
                progress.on_event(&PipelineEvent::Completed { attempt });
                return Ok(value);
            }
            Err(err) => {
                progress.on_event(&PipelineEvent::AttemptFailed {
                    attempt,
                    max_attempts,
                    error: format!("{err:#}"),
                });
                if attempt >= max_attempts {
                    return Err(err.context(format!("all {max_attempts} attempts failed")));
                }
                if !policy.delay.is_zero() {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }
}
