use crate::domain::report::{Synthesis, Verdict};
use regex::Regex;
use std::sync::OnceLock;

const NOT_COVERED: &str = "_Not covered by the analysis._";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadFormat {
    PlainText,
    Markdown,
}

impl DownloadFormat {
    pub fn extension(self) -> &'static str {
        match self {
            DownloadFormat::PlainText => "txt",
            DownloadFormat::Markdown => "md",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            DownloadFormat::PlainText => "text/plain; charset=utf-8",
            DownloadFormat::Markdown => "text/markdown; charset=utf-8",
        }
    }
}

pub fn download_file_name(company_name: &str, format: DownloadFormat) -> String {
    let stem: String = company_name
        .trim()
        .chars()
        .map(|c| match c {
            ' ' => '_',
            '/' | '\\' | '"' | ':' | '*' | '?' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect();
    format!("{stem}_Investment_Report.{}", format.extension())
}

fn citation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[ \t]*\[\^?\d{1,3}(?:\s*[,\-–]\s*\d{1,3})*\]").expect("citation regex is valid")
    })
}

fn verdict_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(BUY|SELL|HOLD)\b").expect("verdict token regex is valid"))
}

fn labelled_verdict_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?im)\b(?:verdict|recommendation|rating)\b[\s:*_\-–]*\b(buy|sell|hold)\b(?:[*_]+|[.,;!)]|[ \t]*$)",
        )
            .expect("labelled verdict regex is valid")
    })
}

fn verdict_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^[\s#*_>-]*verdict[\s*_]*:?[\s*_]*(buy|sell|hold)[\s*_.!]*$")
            .expect("verdict line regex is valid")
    })
}

/// Removes inline citation markers such as `[1]`, `[2][3]`, `[1, 4]` or `[^5]`,
/// together with the whitespace in front of them. Markdown links (`[1](...)`),
/// reference definitions (`[1]: ...`) and bracketed years (`FY[2024]`) are kept.
pub fn strip_citations(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in citation_re().find_iter(text) {
        let next = text[m.end()..].chars().next();
        if matches!(next, Some('(') | Some(':')) {
            continue;
        }
        out.push_str(&text[last..m.start()]);
        last = m.end();
    }
    out.push_str(&text[last..]);

    out.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Number of standalone uppercase verdict tokens in `text`.
pub fn count_verdict_tokens(text: &str) -> usize {
    verdict_token_re().find_iter(text).count()
}

/// Rewrites standalone `BUY`/`SELL`/`HOLD` to title case so the only uppercase
/// verdict token in a rendered report is the verdict line itself.
pub fn neutralize_verdict_tokens(text: &str) -> String {
    verdict_token_re()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let token = &caps[1];
            let mut out = String::with_capacity(token.len());
            out.push_str(&token[..1]);
            out.push_str(&token[1..].to_ascii_lowercase());
            out
        })
        .into_owned()
}

/// Picks the verdict from the advisor's text: the last labelled verdict
/// (`VERDICT: BUY`, `Recommendation: **HOLD**`, ...) wins, otherwise the last
/// standalone uppercase token. A labelled token counts only when it ends the
/// line or is followed by punctuation or emphasis, so "Rating: sell-side" and
/// "Recommendation: hold off" are prose.
pub fn extract_verdict(synthesis: &str) -> anyhow::Result<Verdict> {
    if let Some(caps) = labelled_verdict_re().captures_iter(synthesis).last() {
        return caps[1].parse();
    }
    if let Some(m) = verdict_token_re().find_iter(synthesis).last() {
        return m.as_str().parse();
    }
    anyhow::bail!("advisor output contains no BUY/SELL/HOLD verdict")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SynthesisPart {
    Summary,
    Moat,
    Recommendation,
}

fn classify_heading(label: &str) -> Option<SynthesisPart> {
    let label = label.to_ascii_lowercase();
    if label.contains("executive summary") || label == "summary" {
        Some(SynthesisPart::Summary)
    } else if label.contains("moat") {
        Some(SynthesisPart::Moat)
    } else if label.contains("recommendation") {
        Some(SynthesisPart::Recommendation)
    } else {
        None
    }
}

/// Returns the section a heading-like line opens, plus any content that follows
/// an inline `Label:` on the same line.
fn parse_heading(line: &str) -> Option<(SynthesisPart, String)> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let is_hash = trimmed.starts_with('#');
    let body = trimmed.trim_start_matches('#').trim();
    let body = body
        .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')')
        .trim();

    let (label, rest) = match body.split_once(':') {
        Some((label, rest)) => (label, rest.trim().trim_start_matches(['*', '_']).trim()),
        None => (body, ""),
    };
    let label = label.trim_matches(|c: char| c == '*' || c == '_' || c.is_whitespace());

    let is_bold = body.starts_with("**") || body.starts_with("__");
    let has_colon = body.contains(':');
    if !(is_hash || is_bold || has_colon) || label.len() > 60 {
        return None;
    }
    if !is_hash && !is_bold && !rest.is_empty() && label.split_whitespace().count() > 4 {
        return None;
    }

    classify_heading(label).map(|part| (part, rest.to_string()))
}

/// Splits the advisor's text into summary, moat and recommendation. Text before
/// any recognised heading belongs to the recommendation; bare `VERDICT:` lines
/// are dropped because the verdict is rendered separately.
pub fn split_synthesis(text: &str) -> Synthesis {
    let mut summary = Vec::new();
    let mut moat = Vec::new();
    let mut recommendation = Vec::new();
    let mut current = SynthesisPart::Recommendation;

    for line in text.lines() {
        if verdict_line_re().is_match(line) {
            continue;
        }
        if let Some((part, rest)) = parse_heading(line) {
            current = part;
            if rest.is_empty() {
                continue;
            }
            push_line(&mut summary, &mut moat, &mut recommendation, current, rest);
            continue;
        }
        push_line(&mut summary, &mut moat, &mut recommendation, current, line.to_string());
    }

    Synthesis {
        executive_summary: join_block(&summary),
        competitive_moat: join_block(&moat),
        recommendation: join_block(&recommendation),
    }
}

fn push_line(
    summary: &mut Vec<String>,
    moat: &mut Vec<String>,
    recommendation: &mut Vec<String>,
    part: SynthesisPart,
    line: String,
) {
    match part {
        SynthesisPart::Summary => summary.push(line),
        SynthesisPart::Moat => moat.push(line),
        SynthesisPart::Recommendation => recommendation.push(line),
    }
}

fn join_block(lines: &[String]) -> String {
    lines.join("\n").trim().to_string()
}

/// Pushes `#` and `##` headings inside a section body down to `###`, so only
/// the report's own headings sit at levels one and two.
fn demote_headings(body: &str) -> String {
    body.lines()
        .map(|line| {
            let trimmed = line.trim_start();
            let level = trimmed.chars().take_while(|c| *c == '#').count();
            let rest = &trimmed[level..];
            if (level == 1 || level == 2) && (rest.is_empty() || rest.starts_with([' ', '\t'])) {
                format!("###{rest}")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn section_body(body: &str) -> String {
    neutralize_verdict_tokens(&demote_headings(body))
}

fn section(out: &mut String, heading: &str, body: &str) {
    out.push_str("## ");
    out.push_str(heading);
    out.push_str("\n\n");
    let body = body.trim();
    if body.is_empty() {
        out.push_str(NOT_COVERED);
    } else {
        out.push_str(&section_body(body));
    }
    out.push_str("\n\n");
}

/// Renders the fixed-heading report. Pure: identical inputs give identical bytes.
pub fn render_report(
    company_name: &str,
    financial: &str,
    strategic: &str,
    synthesis: &Synthesis,
    verdict: Verdict,
) -> String {
    let mut out = String::new();
    out.push_str("# Investment Report: ");
    out.push_str(&neutralize_verdict_tokens(company_name.trim()));
    out.push_str("\n\n");

    section(&mut out, "Executive Summary", &synthesis.executive_summary);
    section(&mut out, "Financial Performance", financial);
    section(&mut out, "Strategic Outlook", strategic);
    section(&mut out, "Competitive Moat", &synthesis.competitive_moat);

    out.push_str("## Recommendation\n\n**Verdict: ");
    out.push_str(verdict.as_str());
    out.push_str("**\n");
    let recommendation = synthesis.recommendation.trim();
    if !recommendation.is_empty() {
        out.push('\n');
        out.push_str(&section_body(recommendation));
        out.push('\n');
    }
    out
}
