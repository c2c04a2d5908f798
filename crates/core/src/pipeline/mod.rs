pub mod agents;
pub mod progress;
pub mod retry;

use crate::config::Settings;
use crate::domain::contract::AgentOutputs;
use crate::domain::report::Report;
use crate::llm::perplexity::PerplexityClient;
use crate::llm::{CompletionRequest, LlmClient};
use crate::search::tavily::TavilyClient;
use crate::search::SearchClient;
use agents::{Agent, AgentKind, AGENTS, FINANCIAL_ANALYST, INVESTMENT_ADVISOR, STRATEGY_ANALYST};
use anyhow::Context;
use progress::{PipelineEvent, ProgressSink};
use retry::RetryPolicy;
use std::sync::Arc;

/// Financial analyst, then strategy analyst, then investment advisor, each one
/// LLM call. The whole sequence is retried as a unit.
#[derive(Clone)]
pub struct ReportPipeline {
    llm: Arc<dyn LlmClient>,
    search: Option<Arc<dyn SearchClient>>,
    retry: RetryPolicy,
}

impl ReportPipeline {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        search: Option<Arc<dyn SearchClient>>,
        retry: RetryPolicy,
    ) -> Self {
        Self { llm, search, retry }
    }

    /// Perplexity is required; without a Tavily key the analysts run without
    /// search context.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let llm = PerplexityClient::from_settings(settings)?;
        let search: Option<Arc<dyn SearchClient>> = match settings.tavily_api_key {
            Some(_) => Some(Arc::new(TavilyClient::from_settings(settings)?)),
            None => {
                tracing::warn!("TAVILY_API_KEY missing; analysts will run without web search");
                None
            }
        };
        Ok(Self::new(
            Arc::new(llm),
            search,
            RetryPolicy::from_settings(settings),
        ))
    }

    /// Whether the analysts get web search context.
    pub fn has_search(&self) -> bool {
        self.search.is_some()
    }

    /// Generates a report, retrying the whole pipeline on any failure.
    pub async fn generate(
        &self,
        company_name: &str,
        progress: &dyn ProgressSink,
    ) -> anyhow::Result<Report> {
        let company_name = company_name.trim();
        anyhow::ensure!(!company_name.is_empty(), "company name must be non-empty");

        retry::with_retry(self.retry, company_name, progress, |attempt| async move {
            self.run_once(company_name, progress)
                .await
                .with_context(|| format!("report attempt {attempt} for {company_name} failed"))
        })
        .await
    }

    /// One pass through the three agents with no retry.
    pub async fn run_once(
        &self,
        company_name: &str,
        progress: &dyn ProgressSink,
    ) -> anyhow::Result<Report> {
        let financial = self.run_analyst(&FINANCIAL_ANALYST, company_name, progress).await?;
        let strategic = self.run_analyst(&STRATEGY_ANALYST, company_name, progress).await?;

        progress.on_event(&PipelineEvent::StepStarted {
            agent: AgentKind::InvestmentAdvisor,
        });
        let synthesis = self
            .llm
            .complete(INVESTMENT_ADVISOR.request(
                company_name,
                &[
                    ("Financial analysis", financial.as_str()),
                    ("Strategy analysis", strategic.as_str()),
                ],
            ))
            .await
            .context("investment advisor step failed")?;

        AgentOutputs {
            financial,
            strategic,
            synthesis,
        }
        .validate_and_into_report(company_name, chrono::Utc::now())
    }

    async fn run_analyst(
        &self,
        agent: &Agent,
        company_name: &str,
        progress: &dyn ProgressSink,
    ) -> anyhow::Result<String> {
        progress.on_event(&PipelineEvent::StepStarted { agent: agent.kind });

        let mut context = None;
        if let (Some(search), Some(query)) = (&self.search, agent.search_query(company_name)) {
            progress.on_event(&PipelineEvent::Searching {
                agent: agent.kind,
                query: query.clone(),
            });
            let result = search
                .search(&query)
                .await
                .with_context(|| format!("{} search failed", agent.kind))?;
            context = Some(result.as_context());
        }

        let request = match context.as_deref() {
            Some(ctx) => agent.request(company_name, &[("Search results", ctx)]),
            None => agent.request(company_name, &[]),
        };
        self.llm
            .complete(request)
            .await
            .with_context(|| format!("{} step failed", agent.kind))
    }

    /// The prompts each agent would receive, without search context or earlier
    /// outputs filled in.
    pub fn preview_prompts(company_name: &str) -> Vec<(AgentKind, CompletionRequest)> {
        AGENTS
            .iter()
            .map(|agent| (agent.kind, agent.request(company_name.trim(), &[])))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::report::Verdict;
    use crate::llm::Provider;
    use crate::pipeline::progress::RecordingProgress;
    use crate::render;
    use crate::search::types::{SearchResult, Snippet};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Answers by persona; the first `fail_first` calls return an error.
    #[derive(Default)]
    pub struct ScriptedLlm {
        pub fail_first: u32,
        pub calls: AtomicU32,
        pub requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedLlm {
        pub fn failing(fail_first: u32) -> Self {
            Self {
                fail_first,
                ..Default::default()
            }
        }
    }

    #[async_trait::async_trait]
    impl LlmClient for ScriptedLlm {
        fn provider(&self) -> Provider {
            Provider::Perplexity
        }

        async fn complete(&self, request: CompletionRequest) -> anyhow::Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.requests.lock().unwrap().push(request.clone());
            anyhow::ensure!(n > self.fail_first, "simulated provider failure #{n}");

            let text = if request.system.contains("Financial Analyst") {
                "Revenue grew 9% YoY [1]. EBITDA margin 21%. Debt-to-equity 0.4."
            } else if request.system.contains("Strategy Analyst") {
                "Management guided to 8-10% growth [2]. Analysts who rate it SELL cite pricing pressure."
            } else {
                "## Executive Summary\nA steady compounder.\n\n## Competitive Moat\nScale and client stickiness.\n\n\
                 ## Investment Recommendation\nAccumulate; BUY on dips is reasonable [3].\n\nVERDICT: HOLD"
            };
            Ok(text.to_string())
        }
    }

    #[derive(Default)]
    pub struct FakeSearch {
        pub fail: bool,
        pub queries: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl SearchClient for FakeSearch {
        fn provider_name(&self) -> &'static str {
            "fake"
        }

        async fn search(&self, query: &str) -> anyhow::Result<SearchResult> {
            self.queries.lock().unwrap().push(query.to_string());
            anyhow::ensure!(!self.fail, "search provider HTTP 432");
            Ok(SearchResult {
                query: query.to_string(),
                answer: None,
                snippets: vec![Snippet {
                    title: "Results".to_string(),
                    url: "https://news.example/q".to_string(),
                    content: "Quarterly revenue beat estimates.".to_string(),
                }],
            })
        }
    }

    fn pipeline(llm: Arc<ScriptedLlm>, search: Option<Arc<FakeSearch>>) -> ReportPipeline {
        ReportPipeline::new(
            llm,
            search.map(|s| s as Arc<dyn SearchClient>),
            RetryPolicy::default(),
        )
    }

    #[tokio::test]
    async fn three_failures_produce_no_report() {
        let llm = Arc::new(ScriptedLlm::failing(3));
        let progress = RecordingProgress::new();

        let res = pipeline(llm.clone(), None).generate("Infosys", &progress).await;

        assert!(res.is_err());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 3);
        assert!(progress
            .events()
            .iter()
            .all(|e| !matches!(e, PipelineEvent::Completed { .. })));
    }

    #[tokio::test]
    async fn recovers_when_a_later_attempt_succeeds() {
        let llm = Arc::new(ScriptedLlm::failing(2));
        let report = pipeline(llm.clone(), None)
            .generate("Infosys", &RecordingProgress::new())
            .await
            .unwrap();

        // Two failed first steps, then one full pass of three calls.
        assert_eq!(llm.calls.load(Ordering::SeqCst), 5);
        assert_eq!(report.verdict, Verdict::Hold);
        assert_eq!(render::count_verdict_tokens(&report.text), 1);
        assert!(report.text.contains("**Verdict: HOLD**"));
        assert!(!report.text.contains("[1]"));
    }

    #[tokio::test]
    async fn same_responses_give_identical_text() {
        let first = pipeline(Arc::new(ScriptedLlm::default()), None)
            .generate("Infosys", &RecordingProgress::new())
            .await
            .unwrap();
        let second = pipeline(Arc::new(ScriptedLlm::default()), None)
            .generate("Infosys", &RecordingProgress::new())
            .await
            .unwrap();
        assert_eq!(first.text.as_bytes(), second.text.as_bytes());
    }

    #[tokio::test]
    async fn analysts_get_search_context_and_advisor_gets_analyses() {
        let llm = Arc::new(ScriptedLlm::default());
        let search = Arc::new(FakeSearch::default());

        pipeline(llm.clone(), Some(search.clone()))
            .generate("Infosys", &RecordingProgress::new())
            .await
            .unwrap();

        assert_eq!(search.queries.lock().unwrap().len(), 2);
        let requests = llm.requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].user.contains("Quarterly revenue beat estimates."));
        assert!(requests[1].user.contains("--- Search results ---"));
        assert!(!requests[2].user.contains("--- Search results ---"));
        assert!(requests[2].user.contains("--- Financial analysis ---\nRevenue grew 9% YoY"));
        assert!(requests[2].user.contains("--- Strategy analysis ---\nManagement guided"));
    }

    #[tokio::test]
    async fn search_failure_fails_the_attempt_and_is_retried() {
        let llm = Arc::new(ScriptedLlm::default());
        let search = Arc::new(FakeSearch {
            fail: true,
            ..Default::default()
        });
        let progress = RecordingProgress::new();

        let err = pipeline(llm.clone(), Some(search.clone()))
            .generate("Infosys", &progress)
            .await
            .unwrap_err();

        assert_eq!(search.queries.lock().unwrap().len(), 3);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
        assert!(format!("{err:#}").contains("financial_analyst search failed"));
        assert!(progress.messages().iter().any(|m| m.starts_with("Attempt 3 failed")));
    }

    #[test]
    fn missing_tavily_key_runs_without_search() {
        let settings = Settings {
            perplexity_api_key: Some("pplx-test".to_string()),
            ..Default::default()
        };
        let pipeline = ReportPipeline::from_settings(&settings).unwrap();
        assert!(!pipeline.has_search());

        let with_search = ReportPipeline::from_settings(&Settings {
            tavily_api_key: Some("tvly-test".to_string()),
            ..settings
        })
        .unwrap();
        assert!(with_search.has_search());

        assert!(ReportPipeline::from_settings(&Settings::default()).is_err());
    }

    #[tokio::test]
    async fn blank_company_is_rejected_before_any_call() {
        let llm = Arc::new(ScriptedLlm::default());
        let res = pipeline(llm.clone(), None)
            .generate("   ", &RecordingProgress::new())
            .await;
        assert!(res.is_err());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn preview_lists_agents_in_order() {
        let kinds: Vec<_> = ReportPipeline::preview_prompts("Infosys")
            .into_iter()
            .map(|(kind, _)| kind)
            .collect();
        assert_eq!(
            kinds,
            [
                AgentKind::FinancialAnalyst,
                AgentKind::StrategyAnalyst,
                AgentKind::InvestmentAdvisor
            ]
        );
    }
}
