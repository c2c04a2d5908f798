use crate::llm::CompletionRequest;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    FinancialAnalyst,
    StrategyAnalyst,
    InvestmentAdvisor,
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AgentKind::FinancialAnalyst => "financial_analyst",
            AgentKind::StrategyAnalyst => "strategy_analyst",
            AgentKind::InvestmentAdvisor => "investment_advisor",
        })
    }
}

/// A persona plus the single task it performs. `{company_name}` is substituted
/// in every text field.
#[derive(Debug, Clone, Copy)]
pub struct Agent {
    pub kind: AgentKind,
    pub role: &'static str,
    pub goal: &'static str,
    pub backstory: &'static str,
    pub task: &'static [&'static str],
    pub expected_output: &'static str,
    /// Query sent to the search tool before prompting; `None` means no search.
    pub search_query: Option<&'static str>,
}

pub const FINANCIAL_ANALYST: Agent = Agent {
    kind: AgentKind::FinancialAnalyst,
    role: "Financial Analyst",
    goal: "Analyze {company_name} financial metrics including revenue, profit margins, and debt.",
    backstory: "You analyze company financials and extract key performance indicators.",
    task: &[
        "Research and analyze {company_name}'s latest financial performance:",
        "1. Revenue growth (YoY)",
        "2. Profit margins (EBITDA, Net)",
        "3. Debt-to-equity ratio",
        "4. Key financial highlights from latest quarterly/annual report",
    ],
    expected_output: "Financial summary with key metrics and trends for {company_name}.",
    search_query: Some("{company_name} latest quarterly results revenue growth profit margin debt to equity"),
};

pub const STRATEGY_ANALYST: Agent = Agent {
    kind: AgentKind::StrategyAnalyst,
    role: "Strategy Analyst",
    goal: "Research {company_name} competitive position, management guidance, and industry trends.",
    backstory: "You evaluate business strategy and competitive advantages.",
    task: &[
        "Analyze {company_name}'s strategic position:",
        "1. Recent management guidance from earnings calls",
        "2. Industry outlook and trends",
        "3. Competitive advantages (moat)",
        "4. Major risks and opportunities",
    ],
    expected_output:
        "Strategic assessment covering guidance, industry trends, and competitive position.",
    search_query: Some("{company_name} management guidance earnings call industry outlook competitors"),
};

pub const INVESTMENT_ADVISOR: Agent = Agent {
    kind: AgentKind::InvestmentAdvisor,
    role: "Investment Advisor",
    goal: "Create investment report for {company_name} with BUY/SELL/HOLD recommendation.",
    backstory:
        "You synthesize financial and strategic analysis into actionable investment advice.",
    task: &[
        "Using the financial and strategy analyses above, write the advisory part of an investment report for {company_name} with these sections:",
        "## Executive Summary (2-3 sentences)",
        "## Competitive Moat (strengths vs competitors)",
        "## Investment Recommendation (BUY/SELL/HOLD with clear justification)",
        "End with a final line of the form `VERDICT: BUY`, `VERDICT: SELL` or `VERDICT: HOLD`.",
    ],
    expected_output: "Professional investment advice with one clear recommendation.",
    search_query: None,
};

/// Pipeline order. Later agents see the output of earlier ones.
pub const AGENTS: [Agent; 3] = [FINANCIAL_ANALYST, STRATEGY_ANALYST, INVESTMENT_ADVISOR];

fn fill(template: &str, company_name: &str) -> String {
    template.replace("{company_name}", company_name)
}

impl Agent {
    pub fn search_query(&self, company_name: &str) -> Option<String> {
        self.search_query.map(|q| fill(q, company_name))
    }

    pub fn system_prompt(&self, company_name: &str) -> String {
        [
            format!("You are the {} of an equity research team.", self.role),
            fill(self.backstory, company_name),
            format!("Your goal: {}", fill(self.goal, company_name)),
            "Write plain Markdown prose. Be factual and concise; say so when data is unavailable."
                .to_string(),
        ]
        .join("\n")
    }

    /// `context` blocks are `(label, text)` pairs appended after the task.
    pub fn request(&self, company_name: &str, context: &[(&str, &str)]) -> CompletionRequest {
        let mut user = self
            .task
            .iter()
            .map(|line| fill(line, company_name))
            .collect::<Vec<_>>()
            .join("\n");
        user.push_str("\n\nExpected output: ");
        user.push_str(&fill(self.expected_output, company_name));

        for (label, text) in context {
            user.push_str("\n\n--- ");
            user.push_str(label);
            user.push_str(" ---\n");
            user.push_str(text.trim());
        }

        CompletionRequest {
            system: self.system_prompt(company_name),
            user,
        }
    }
}
