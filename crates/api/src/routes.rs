use axum::{
    extract::{Form, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use invest_core::config::ApiKeyStatus;
use invest_core::pipeline::progress::RecordingProgress;
use invest_core::pipeline::ReportPipeline;
use invest_core::render::{download_file_name, DownloadFormat};
use invest_core::storage::session::{SessionId, SessionStore};

use crate::page::{PageRenderer, PageView, ReportView};

pub const SESSION_COOKIE: &str = "invest_session";

#[derive(Clone)]
pub struct AppState {
    /// `None` when PERPLEXITY_API_KEY is missing; the page still renders.
    pub pipeline: Option<ReportPipeline>,
    pub api_status: ApiKeyStatus,
    pub sessions: Arc<SessionStore>,
    pub page: Arc<PageRenderer>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/report", post(generate_report))
        .route("/reset", post(reset))
        .route("/report.txt", get(download_txt))
        .route("/report.md", get(download_md))
        .route("/api/status", get(api_status))
        .route("/healthz", get(healthz))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn api_status(State(state): State<AppState>) -> Json<ApiKeyStatus> {
    Json(state.api_status)
}

/// The session named by the request cookie, or a fresh one that the response
/// must set.
fn session(headers: &HeaderMap) -> (SessionId, bool) {
    match existing_session(headers) {
        Some(id) => (id, false),
        None => (SessionId::new(), true),
    }
}

fn existing_session(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| value.parse().ok())
}

fn set_cookie_header(session: SessionId) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE}={session}; Path=/; HttpOnly; SameSite=Lax"
    ))
    .ok()
}

struct PageOutcome {
    status: StatusCode,
    company_name: String,
    notice: Option<String>,
    error: Option<String>,
    status_log: Vec<String>,
}

impl PageOutcome {
    fn ok() -> Self {
        Self {
            status: StatusCode::OK,
            company_name: String::new(),
            notice: None,
            error: None,
            status_log: Vec::new(),
        }
    }

    fn error(status: StatusCode, company_name: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            company_name: company_name.to_string(),
            error: Some(message.into()),
            ..Self::ok()
        }
    }
}

fn render_page(state: &AppState, session: SessionId, new_session: bool, outcome: PageOutcome) -> Response {
    let report = state.sessions.get(session);
    let view = PageView {
        company_name: &outcome.company_name,
        api_status: state.api_status,
        web_search: state.pipeline.as_ref().is_some_and(ReportPipeline::has_search),
        report: report.as_ref().map(ReportView::new),
        notice: outcome.notice,
        error: outcome.error,
        status_log: outcome.status_log,
    };

    let html = match state.page.render(&view) {
        Ok(html) => html,
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "page render failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut response = (outcome.status, Html(html)).into_response();
    if new_session {
        if let Some(cookie) = set_cookie_header(session) {
            response.headers_mut().insert(header::SET_COOKIE, cookie);
        }
    }
    response
}

async fn index(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (session, new_session) = session(&headers);
    render_page(&state, session, new_session, PageOutcome::ok())
}

#[derive(Debug, Deserialize)]
struct GenerateForm {
    #[serde(default)]
    company_name: String,
}

async fn generate_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<GenerateForm>,
) -> Response {
    let (session, new_session) = session(&headers);
    let company_name = form.company_name.trim();

    if company_name.is_empty() {
        let outcome = PageOutcome::error(StatusCode::BAD_REQUEST, "", "Please enter a company name");
        return render_page(&state, session, new_session, outcome);
    }

    let Some(pipeline) = &state.pipeline else {
        let outcome = PageOutcome::error(
            StatusCode::SERVICE_UNAVAILABLE,
            company_name,
            "PERPLEXITY_API_KEY not found in environment variables",
        );
        return render_page(&state, session, new_session, outcome);
    };

    let progress = RecordingProgress::new();
    let outcome = match pipeline.generate(company_name, &progress).await {
        Ok(report) => {
            tracing::info!(%session, company = %report.company_name, verdict = %report.verdict, "report generated");
            state.sessions.store(session, report);
            PageOutcome {
                status: StatusCode::OK,
                company_name: company_name.to_string(),
                notice: Some(format!("Report generated for {company_name}!")),
                error: None,
                status_log: progress.messages(),
            }
        }
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(%session, company = %company_name, error = %format!("{err:#}"), "report generation failed");
            PageOutcome {
                status_log: progress.messages(),
                ..PageOutcome::error(
                    StatusCode::BAD_GATEWAY,
                    company_name,
                    "Failed to generate report. Try the 'Reset Application' button in the sidebar.",
                )
            }
        }
    };

    render_page(&state, session, new_session, outcome)
}

async fn reset(State(state): State<AppState>, headers: HeaderMap) -> Redirect {
    if let Some(session) = existing_session(&headers) {
        let cleared = state.sessions.reset(session);
        tracing::info!(
            %session,
            cleared,
            active_sessions = state.sessions.active_sessions(),
            "session reset"
        );
    }
    Redirect::to("/")
}

async fn download_txt(State(state): State<AppState>, headers: HeaderMap) -> Response {
    download(&state, &headers, DownloadFormat::PlainText)
}

async fn download_md(State(state): State<AppState>, headers: HeaderMap) -> Response {
    download(&state, &headers, DownloadFormat::Markdown)
}

fn download(state: &AppState, headers: &HeaderMap, format: DownloadFormat) -> Response {
    let Some(report) = existing_session(headers).and_then(|s| state.sessions.get(s)) else {
        return (StatusCode::NOT_FOUND, "No report generated yet").into_response();
    };

    // Header values must be visible ASCII.
    let file_name: String = download_file_name(&report.company_name, format)
        .chars()
        .map(|c| if c.is_ascii_graphic() { c } else { '_' })
        .collect();
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{file_name}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(format.mime())),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        report.text,
    )
        .into_response()
}
