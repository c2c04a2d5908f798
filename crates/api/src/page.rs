use invest_core::config::ApiKeyStatus;
use invest_core::domain::report::{Report, Verdict};
use invest_core::render::{download_file_name, DownloadFormat};
use minijinja::Environment;
use serde::Serialize;

const INDEX_TEMPLATE: &str = include_str!("../templates/index.html");

/// Renders the single application page. The template name ends in `.html`, so
/// every interpolated value is HTML-escaped.
pub struct PageRenderer {
    env: Environment<'static>,
}

impl PageRenderer {
    pub fn new() -> anyhow::Result<Self> {
        let mut env = Environment::new();
        env.add_template("index.html", INDEX_TEMPLATE)?;
        Ok(Self { env })
    }

    pub fn render(&self, view: &PageView<'_>) -> anyhow::Result<String> {
        let template = self.env.get_template("index.html")?;
        Ok(template.render(view)?)
    }
}

#[derive(Debug, Serialize)]
pub struct PageView<'a> {
    pub company_name: &'a str,
    pub api_status: ApiKeyStatus,
    /// False when the pipeline runs without Tavily context.
    pub web_search: bool,
    pub report: Option<ReportView<'a>>,
    pub notice: Option<String>,
    pub error: Option<String>,
    pub status_log: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ReportView<'a> {
    pub company_name: &'a str,
    pub verdict: Verdict,
    pub text: &'a str,
    pub txt_file_name: String,
    pub md_file_name: String,
}

impl<'a> ReportView<'a> {
    pub fn new(report: &'a Report) -> Self {
        Self {
            company_name: &report.company_name,
            verdict: report.verdict,
            text: &report.text,
            txt_file_name: download_file_name(&report.company_name, DownloadFormat::PlainText),
            md_file_name: download_file_name(&report.company_name, DownloadFormat::Markdown),
        }
    }
}
