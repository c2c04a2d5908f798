use crate::domain::report::Report;
use crate::render;
use anyhow::ensure;
use chrono::{DateTime, Utc};

/// Raw text produced by the three agents for one pipeline run.
#[derive(Debug, Clone)]
pub struct AgentOutputs {
    pub financial: String,
    pub strategic: String,
    pub synthesis: String,
}

impl AgentOutputs {
    pub fn validate_and_into_report(
        self,
        company_name: &str,
        generated_at: DateTime<Utc>,
    ) -> anyhow::Result<Report> {
        let company_name = company_name.trim().to_string();
        ensure!(!company_name.is_empty(), "company name must be non-empty");

        let financial = render::strip_citations(&self.financial);
        ensure!(!financial.is_empty(), "financial analysis is empty");

        let strategic = render::strip_citations(&self.strategic);
        ensure!(!strategic.is_empty(), "strategy analysis is empty");

        let synthesis_text = render::strip_citations(&self.synthesis);
        ensure!(!synthesis_text.is_empty(), "investment advice is empty");

        let verdict = render::extract_verdict(&synthesis_text)?;
        let synthesis = render::split_synthesis(&synthesis_text);

        let text = render::render_report(&company_name, &financial, &strategic, &synthesis, verdict);
        ensure!(
            render::count_verdict_tokens(&text) == 1,
            "rendered report must carry exactly one verdict token"
        );

        Ok(Report {
            company_name,
            financial,
            strategic,
            synthesis,
            verdict,
            generated_at,
            text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::report::Verdict;
    use chrono::TimeZone;

    fn outputs(synthesis: &str) -> AgentOutputs {
        AgentOutputs {
            financial: "Revenue grew 8% YoY [1]. Net margin 11%.".to_string(),
            strategic: "Management guided to double-digit growth [2].".to_string(),
            synthesis: synthesis.to_string(),
        }
    }

    #[test]
    fn builds_report_with_clean_sections() {
        let at = Utc.with_ymd_and_hms(2026, 1, 28, 9, 0, 0).unwrap();
        let report = outputs("## Executive Summary\nGood value [3].\n\nVERDICT: BUY")
            .validate_and_into_report("  Infosys ", at)
            .unwrap();

        assert_eq!(report.company_name, "Infosys");
        assert_eq!(report.verdict, Verdict::Buy);
        assert_eq!(report.financial, "Revenue grew 8% YoY. Net margin 11%.");
        assert_eq!(report.synthesis.executive_summary, "Good value.");
        assert!(!report.text.contains("[1]"));
        assert_eq!(report.generated_at, at);
    }

    #[test]
    fn rejects_empty_agent_output() {
        let mut out = outputs("VERDICT: HOLD");
        out.strategic = "  [4] ".to_string();
        assert!(out.validate_and_into_report("Infosys", Utc::now()).is_err());
    }

    #[test]
    fn rejects_synthesis_without_verdict() {
        assert!(outputs("Nice company.")
            .validate_and_into_report("Infosys", Utc::now())
            .is_err());
    }

    #[test]
    fn rendered_text_does_not_depend_on_generated_at() {
        let a = outputs("Recommendation: SELL")
            .validate_and_into_report("Infosys", Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())
            .unwrap();
        let b = outputs("Recommendation: SELL")
            .validate_and_into_report("Infosys", Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap())
            .unwrap();
        assert_eq!(a.text, b.text);
    }
}
