use crate::pipeline::agents::AgentKind;
use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    AttemptStarted {
        attempt: u32,
        max_attempts: u32,
        company_name: String,
    },
    Searching {
        agent: AgentKind,
        query: String,
    },
    StepStarted {
        agent: AgentKind,
    },
    AttemptFailed {
        attempt: u32,
        max_attempts: u32,
        error: String,
    },
    Completed {
        attempt: u32,
    },
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineEvent::AttemptStarted {
                attempt,
                max_attempts,
                company_name,
            } => write!(f, "Attempt {attempt}/{max_attempts} - Analyzing {company_name}..."),
            PipelineEvent::Searching { query, .. } => write!(f, "Searching the web: {query}"),
            PipelineEvent::StepStarted { agent } => match agent {
                AgentKind::FinancialAnalyst => f.write_str("Gathering financial data..."),
                AgentKind::StrategyAnalyst => f.write_str("Evaluating strategic outlook..."),
                AgentKind::InvestmentAdvisor => f.write_str("Writing investment recommendation..."),
            },
            PipelineEvent::AttemptFailed { attempt, error, .. } => {
                write!(f, "Attempt {attempt} failed: {error}")
            }
            PipelineEvent::Completed { .. } => f.write_str("Analysis completed successfully!"),
        }
    }
}

/// Receives status updates while a report is generated.
pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: &PipelineEvent);
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn on_event(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::AttemptFailed {
                attempt,
                max_attempts,
                error,
            } => tracing::warn!(attempt, max_attempts, %error, "report attempt failed"),
            PipelineEvent::Searching { agent, query } => {
                tracing::info!(%agent, %query, "running search")
            }
            PipelineEvent::StepStarted { agent } => tracing::info!(%agent, "agent step started"),
            other => tracing::info!("{other}"),
        }
    }
}

/// Keeps status lines for display and forwards each event to tracing.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events().iter().map(ToString::to_string).collect()
    }
}

impl ProgressSink for RecordingProgress {
    fn on_event(&self, event: &PipelineEvent) {
        TracingProgress.on_event(event);
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}
