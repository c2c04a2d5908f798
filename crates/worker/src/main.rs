use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use invest_core::pipeline::progress::TracingProgress;
use invest_core::pipeline::ReportPipeline;
use invest_core::render::{download_file_name, DownloadFormat};

#[derive(Debug, Parser)]
#[command(name = "invest_worker", about = "Generate an investment report without the web UI")]
struct Args {
    /// Company to analyze, e.g. "Tata Motors".
    #[arg(long)]
    company: String,

    /// Directory the report files are written to.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Both)]
    format: OutputFormat,

    /// Print the agent prompts and exit without calling any provider.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Txt,
    Md,
    Both,
}

impl OutputFormat {
    fn downloads(self) -> &'static [DownloadFormat] {
        match self {
            OutputFormat::Txt => &[DownloadFormat::PlainText],
            OutputFormat::Md => &[DownloadFormat::Markdown],
            OutputFormat::Both => &[DownloadFormat::PlainText, DownloadFormat::Markdown],
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = invest_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    let company = args.company.trim();
    anyhow::ensure!(!company.is_empty(), "--company must be non-empty");

    if args.dry_run {
        for (agent, prompt) in ReportPipeline::preview_prompts(company) {
            println!("=== {agent} (system) ===\n{}\n", prompt.system);
            println!("=== {agent} (user) ===\n{}\n", prompt.user);
        }
        tracing::info!(company, dry_run = true, "printed agent prompts");
        return Ok(());
    }

    let pipeline = ReportPipeline::from_settings(&settings)?;
    let report = match pipeline.generate(company, &TracingProgress).await {
        Ok(report) => report,
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(company, error = %format!("{err:#}"), "report generation failed");
            return Err(err);
        }
    };

    for format in args.format.downloads() {
        let path = write_report(&args.out_dir, &report.company_name, *format, &report.text)?;
        tracing::info!(company, verdict = %report.verdict, path = %path.display(), "wrote report");
    }

    Ok(())
}

fn write_report(
    out_dir: &Path,
    company_name: &str,
    format: DownloadFormat,
    text: &str,
) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let path = out_dir.join(download_file_name(company_name, format));
    std::fs::write(&path, text).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

fn init_sentry(settings: &invest_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_defaults() {
        let args = Args::try_parse_from(["invest_worker", "--company", "Infosys"]).unwrap();
        assert_eq!(args.format, OutputFormat::Both);
        assert_eq!(args.out_dir, PathBuf::from("."));
        assert!(!args.dry_run);
        assert_eq!(args.format.downloads().len(), 2);
    }

    #[test]
    fn writes_identical_text_for_each_format() {
        let dir = std::env::temp_dir().join(format!("invest_worker_test_{}", std::process::id()));
        let text = "# Investment Report: Infosys\n";
        let txt = write_report(&dir, "Infosys", DownloadFormat::PlainText, text).unwrap();
        let md = write_report(&dir, "Infosys", DownloadFormat::Markdown, text).unwrap();

        assert!(txt.ends_with("Infosys_Investment_Report.txt"));
        assert_eq!(std::fs::read_to_string(&txt).unwrap(), std::fs::read_to_string(&md).unwrap());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
