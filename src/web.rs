use crate::chart;
use crate::database::{ReferenceStore, StoreError};
use crate::formatting::{format_count, format_currency, format_optional_number, format_text};
use crate::market_data::MarketDataProvider;
use crate::models::{KeywordColumn, Timeframe};
use crate::pipeline::{
    run_search, KeywordSection, MarketSection, MetricTable, PipelineError, RenderModel,
    SearchRequest,
};
use crate::report::render_pdf;
use anyhow::{Context, Result};
use askama::Template;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::{error, info};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

const CHART_WIDTH: f64 = 800.0;
const CHART_HEIGHT: f64 = 240.0;
const START_PROMPT: &str = "Please enter search values in the left sidebar to begin.";

pub struct AppState {
    pub store: ReferenceStore,
    pub provider: Arc<dyn MarketDataProvider>,
    pub market_timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };
        let body = Json(json!({
            "error": message,
            "status": status.as_u16()
        }));
        (status, body).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Invalid(validation) => ApiError::BadRequest(validation.message),
            other => {
                error!("Search failed: {}", other);
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        error!("Reference store error: {}", err);
        ApiError::Internal(err.to_string())
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/search", get(search))
        .route("/report.pdf", get(report))
        .route("/health", get(health))
        .with_state(state)
}

pub async fn serve(state: Arc<AppState>, bind_addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    info!(
        "Dashboard listening on http://{}",
        listener.local_addr().unwrap_or(bind_addr)
    );
    axum::serve(listener, router(state))
        .await
        .context("dashboard server stopped")
}

fn render_template<T: Template>(template: &T) -> Response {
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!("Template render error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Template error: {}", e),
            )
                .into_response()
        }
    }
}

#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardPage {
    pub form: FormView,
    pub prompt: Option<String>,
    pub error: Option<String>,
    pub results: Option<ResultsView>,
}

pub struct FormView {
    pub ticker: String,
    pub sectors: Vec<SelectOption>,
    pub timeframes: Vec<SelectOption>,
    pub subindustries: Vec<SelectOption>,
    pub screens: Vec<SelectOption>,
}

pub struct SelectOption {
    pub value: String,
    pub selected: bool,
}

pub struct ResultsView {
    pub title: String,
    pub market_error: Option<String>,
    pub chart_points: String,
    pub chart_caption: String,
    pub tables: Vec<MetricTable>,
    pub recent_bars: Vec<BarRow>,
    pub sectors: Vec<SectorView>,
    pub keyword: KeywordView,
    pub generated_at: String,
    pub disclaimer: String,
    pub report_href: String,
}

pub struct BarRow {
    pub date: String,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
}

pub struct SectorView {
    pub sector: String,
    pub description: String,
    pub primary_subsector: String,
    pub subsector_weight: String,
    pub scores: Vec<ScoreView>,
    pub total_score: String,
}

pub struct ScoreView {
    pub label: String,
    pub code: String,
    pub explanation: String,
}

pub struct KeywordView {
    pub subindustry: String,
    pub screen: String,
    pub response: Option<String>,
    pub message: Option<String>,
}

struct FormOptions {
    sectors: Vec<String>,
    subindustries: Vec<String>,
    screens: Vec<String>,
}

async fn load_form_options(store: &ReferenceStore) -> Result<FormOptions, ApiError> {
    let store = store.clone();
    let options = tokio::task::spawn_blocking(move || -> Result<FormOptions, StoreError> {
        Ok(FormOptions {
            sectors: store.list_distinct_sectors()?,
            subindustries: store.list_distinct_values(KeywordColumn::Subindustry)?,
            screens: store.list_distinct_values(KeywordColumn::Screen)?,
        })
    })
    .await
    .map_err(|err| ApiError::Internal(format!("lookup task failed: {}", err)))??;
    Ok(options)
}

fn select_options(values: &[String], selected: Option<&str>) -> Vec<SelectOption> {
    let selected = selected.map(str::trim).unwrap_or_default();
    values
        .iter()
        .map(|value| SelectOption {
            value: value.clone(),
            selected: value == selected,
        })
        .collect()
}

fn form_view(options: &FormOptions, request: &SearchRequest) -> FormView {
    let timeframes: Vec<String> = Timeframe::ALL
        .iter()
        .map(|timeframe| timeframe.label().to_string())
        .collect();
    FormView {
        ticker: request.ticker.trim().to_string(),
        sectors: select_options(&options.sectors, Some(&request.sector)),
        timeframes: select_options(
            &timeframes,
            Some(request.timeframe().unwrap_or_default().label()),
        ),
        subindustries: select_options(&options.subindustries, request.keyword1.as_deref()),
        screens: select_options(&options.screens, request.keyword2.as_deref()),
    }
}

fn results_view(model: &RenderModel, request: &SearchRequest) -> ResultsView {
    let (market_error, chart_points, chart_caption, tables, recent_bars) = match &model.market {
        MarketSection::Available(view) => {
            let caption = match chart::close_range(&view.snapshot.bars) {
                Some((low, high)) => format!(
                    "{} Stock Price ({}): {} - {}",
                    model.ticker,
                    model.timeframe,
                    format_currency(Some(low)),
                    format_currency(Some(high))
                ),
                None => "No historical data available for the selected period.".to_string(),
            };
            let rows = view
                .recent_bars
                .iter()
                .map(|bar| BarRow {
                    date: bar.date.format("%Y-%m-%d").to_string(),
                    open: format_currency(bar.open),
                    high: format_currency(bar.high),
                    low: format_currency(bar.low),
                    close: format_currency(Some(bar.close)),
                    volume: format_count(bar.volume),
                })
                .collect();
            (
                None,
                chart::svg_points(&view.snapshot.bars, CHART_WIDTH, CHART_HEIGHT),
                caption,
                view.tables().into_iter().cloned().collect(),
                rows,
            )
        }
        MarketSection::Unavailable { message } => (
            Some(message.clone()),
            String::new(),
            String::new(),
            Vec::new(),
            Vec::new(),
        ),
    };

    let sectors = model
        .sectors
        .iter()
        .map(|entry| SectorView {
            sector: entry.record.sector.clone(),
            description: format_text(entry.record.description.as_deref()),
            primary_subsector: format_text(entry.record.primary_subsector.as_deref()),
            subsector_weight: format_optional_number(entry.record.subsector_weight),
            scores: entry
                .explanations
                .iter()
                .map(|explanation| ScoreView {
                    label: explanation.category.label().to_string(),
                    code: format_count(explanation.code),
                    explanation: explanation.text.clone(),
                })
                .collect(),
            total_score: format_optional_number(entry.record.total_score),
        })
        .collect();

    let keyword = match &model.keyword {
        KeywordSection::Resolved {
            subindustry,
            screen,
            response,
        } => KeywordView {
            subindustry: subindustry.clone(),
            screen: screen.clone(),
            response: Some(response.clone()),
            message: None,
        },
        KeywordSection::Incomplete { message } => KeywordView {
            subindustry: String::new(),
            screen: String::new(),
            response: None,
            message: Some(message.clone()),
        },
    };

    ResultsView {
        title: model.title(),
        market_error,
        chart_points,
        chart_caption,
        tables,
        recent_bars,
        sectors,
        keyword,
        generated_at: model.generated_at.clone(),
        disclaimer: model.disclaimer.clone(),
        report_href: format!("/report.pdf?{}", encode_request(request)),
    }
}

fn encode_request(request: &SearchRequest) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    serializer.append_pair("ticker", request.ticker.trim());
    serializer.append_pair("sector", request.sector.trim());
    serializer.append_pair("timeframe", request.timeframe.trim());
    if let Some(keyword1) = request.keyword1.as_deref() {
        serializer.append_pair("keyword1", keyword1);
    }
    if let Some(keyword2) = request.keyword2.as_deref() {
        serializer.append_pair("keyword2", keyword2);
    }
    serializer.finish()
}

async fn index(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let options = load_form_options(&state.store).await?;
    let page = DashboardPage {
        form: form_view(&options, &SearchRequest::default()),
        prompt: Some(START_PROMPT.to_string()),
        error: None,
        results: None,
    };
    Ok(render_template(&page))
}

async fn search(
    State(state): State<Arc<AppState>>,
    Query(request): Query<SearchRequest>,
) -> Result<Response, ApiError> {
    let options = load_form_options(&state.store).await?;
    let form = form_view(&options, &request);

    let outcome = run_search(
        &state.store,
        state.provider.as_ref(),
        &request,
        state.market_timeout,
    )
    .await;
    let page = match outcome {
        Ok(model) => DashboardPage {
            form,
            prompt: None,
            error: None,
            results: Some(results_view(&model, &request)),
        },
        Err(PipelineError::Invalid(validation)) => DashboardPage {
            form,
            prompt: None,
            error: Some(validation.message),
            results: None,
        },
        Err(other) => return Err(other.into()),
    };
    Ok(render_template(&page))
}

async fn report(
    State(state): State<Arc<AppState>>,
    Query(request): Query<SearchRequest>,
) -> Result<Response, ApiError> {
    let model = run_search(
        &state.store,
        state.provider.as_ref(),
        &request,
        state.market_timeout,
    )
    .await?;
    let file_name = model.report_file_name();
    let bytes = tokio::task::spawn_blocking(move || render_pdf(&model))
        .await
        .map_err(|err| ApiError::Internal(format!("report task failed: {}", err)))?
        .map_err(|err| {
            error!("Report rendering failed: {:#}", err);
            ApiError::Internal(format!("failed to render report: {}", err))
        })?;

    info!("Serving {} ({} bytes)", file_name, bytes.len());
    let headers = [
        (header::CONTENT_TYPE, "application/pdf".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file_name),
        ),
    ];
    Ok((headers, bytes).into_response())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
