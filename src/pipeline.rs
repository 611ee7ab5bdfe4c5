use crate::database::{ReferenceStore, StoreError};
use crate::formatting::*;
use crate::market_data::MarketDataProvider;
use crate::models::*;
use chrono::{DateTime, Utc};
use chrono_tz::US::Eastern;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const MISSING_INPUT_MESSAGE: &str =
    "Please provide both a stock ticker and select a sector to search.";
pub const INVALID_TICKER_MESSAGE: &str =
    "Ticker symbols may only contain letters, digits and the characters . - ^ =";
pub const KEYWORD_PROMPT_MESSAGE: &str =
    "Please select both Subindustry and Social Justice Screen to see results.";
pub const DISCLAIMER: &str = "The data and information presented are intended for informational \
     purposes only and should not be construed as financial, investment, or professional advice. \
     Users should conduct their own research and consult qualified professionals before making \
     any financial or investment decisions. No representation or warranty is made regarding the \
     accuracy, completeness, or reliability of the data provided, and no liability is accepted \
     for losses arising from its use.";
const RECENT_BAR_COUNT: usize = 5;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("reference lookup task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
}

/// Form submission driving one dashboard pass.
///
/// Fields stay raw text until `validate`, so a bad value is reported
/// through `ValidationError` rather than a deserialization failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub ticker: String,
    #[serde(default)]
    pub sector: String,
    #[serde(default)]
    pub timeframe: String,
    #[serde(default)]
    pub keyword1: Option<String>,
    #[serde(default)]
    pub keyword2: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSearch {
    pub ticker: String,
    pub sector: String,
    pub timeframe: Timeframe,
    pub keywords: Option<(String, String)>,
}

impl SearchRequest {
    pub fn validate(&self) -> Result<ValidatedSearch, ValidationError> {
        let ticker = self.ticker.trim().to_uppercase();
        let sector = self.sector.trim().to_string();
        if ticker.is_empty() || sector.is_empty() {
            return Err(ValidationError {
                message: MISSING_INPUT_MESSAGE.to_string(),
            });
        }
        if !ticker.chars().all(is_ticker_char) {
            return Err(ValidationError {
                message: format!("{} (value: {})", INVALID_TICKER_MESSAGE, ticker),
            });
        }
        let timeframe = self.timeframe()?;
        let keyword1 = non_empty(self.keyword1.as_deref());
        let keyword2 = non_empty(self.keyword2.as_deref());
        let keywords = match (keyword1, keyword2) {
            (Some(first), Some(second)) => Some((first, second)),
            _ => None,
        };
        Ok(ValidatedSearch {
            ticker,
            sector,
            timeframe,
            keywords,
        })
    }

    /// Selected timeframe; blank means the default.
    pub fn timeframe(&self) -> Result<Timeframe, ValidationError> {
        match self.timeframe.trim() {
            "" => Ok(Timeframe::default()),
            raw => Timeframe::parse(raw).map_err(|err| ValidationError {
                message: format!("Please choose a valid timeframe: {}", err),
            }),
        }
    }
}

// Exchange suffixes, index carets and currency pairs: BRK.B, ^GSPC, EURUSD=X, BTC-USD.
fn is_ticker_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '=')
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRow {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricTable {
    pub heading: String,
    pub rows: Vec<MetricRow>,
}

impl MetricTable {
    fn new(heading: &str, rows: Vec<(&str, String)>) -> Self {
        Self {
            heading: heading.to_string(),
            rows: rows
                .into_iter()
                .map(|(label, value)| MetricRow {
                    label: label.to_string(),
                    value,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketView {
    pub snapshot: MarketSnapshot,
    pub stock_info: MetricTable,
    pub price_info: MetricTable,
    pub business_metrics: MetricTable,
    pub recent_bars: Vec<PriceBar>,
}

impl MarketView {
    pub fn from_snapshot(snapshot: MarketSnapshot) -> Self {
        let profile = &snapshot.profile;
        let stock_info = MetricTable::new(
            "Stock Info",
            vec![
                ("Country", format_text(profile.country.as_deref())),
                ("Sector", format_text(profile.sector.as_deref())),
                ("Industry", format_text(profile.industry.as_deref())),
                ("Market Cap", format_magnitude(profile.market_cap)),
                ("Enterprise Value", format_magnitude(profile.enterprise_value)),
                ("Employees", format_count(profile.full_time_employees)),
            ],
        );
        let price_info = MetricTable::new(
            "Price Info",
            vec![
                ("Current Price", format_currency(profile.current_price)),
                ("Previous Close", format_currency(profile.previous_close)),
                ("Day High", format_currency(profile.day_high)),
                ("Day Low", format_currency(profile.day_low)),
                ("52 Week High", format_currency(profile.fifty_two_week_high)),
                ("52 Week Low", format_currency(profile.fifty_two_week_low)),
            ],
        );
        let business_metrics = MetricTable::new(
            "Business Metrics",
            vec![
                ("EPS (FWD)", format_decimal(profile.forward_eps)),
                ("P/E (FWD)", format_decimal(profile.forward_pe)),
                ("PEG Ratio", format_decimal(profile.peg_ratio)),
                ("Div Rate (FWD)", format_currency(profile.dividend_rate)),
                ("Div Yield (FWD)", format_percent(profile.dividend_yield)),
                (
                    "Recommendation",
                    capitalize(profile.recommendation_key.as_deref()),
                ),
            ],
        );
        let recent_bars = snapshot.bars.iter().take(RECENT_BAR_COUNT).cloned().collect();
        Self {
            snapshot,
            stock_info,
            price_info,
            business_metrics,
            recent_bars,
        }
    }

    pub fn tables(&self) -> [&MetricTable; 3] {
        [&self.stock_info, &self.price_info, &self.business_metrics]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum MarketSection {
    Available(Box<MarketView>),
    Unavailable { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum KeywordSection {
    Resolved {
        subindustry: String,
        screen: String,
        response: String,
    },
    Incomplete { message: String },
}

/// Everything one dashboard pass renders, independent of the output medium.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderModel {
    pub ticker: String,
    pub sector_query: String,
    pub timeframe: Timeframe,
    pub market: MarketSection,
    pub sectors: Vec<ExplainedSectorRecord>,
    pub keyword: KeywordSection,
    pub generated_at: String,
    pub disclaimer: String,
}

impl RenderModel {
    pub fn title(&self) -> String {
        let name = match &self.market {
            MarketSection::Available(view) => view.snapshot.profile.long_name.as_deref(),
            MarketSection::Unavailable { .. } => None,
        };
        format!("{} - {}", self.ticker, format_text(name))
    }

    pub fn report_file_name(&self) -> String {
        format!("{}_report.pdf", self.ticker)
    }

    pub fn market_view(&self) -> Option<&MarketView> {
        match &self.market {
            MarketSection::Available(view) => Some(view),
            MarketSection::Unavailable { .. } => None,
        }
    }
}

/// Runs one search: validation, market data, sector lookups, keyword lookup.
///
/// Market data failures never fail the pass; they replace only the market
/// section. Reference store failures propagate.
pub async fn run_search(
    store: &ReferenceStore,
    provider: &dyn MarketDataProvider,
    request: &SearchRequest,
    market_timeout: Duration,
) -> Result<RenderModel, PipelineError> {
    let search = request.validate()?;
    info!(
        "Running search for ticker={} sector={:?} timeframe={}",
        search.ticker, search.sector, search.timeframe
    );

    let market = fetch_market_section(provider, &search, market_timeout).await;

    let lookup_store = store.clone();
    let sector = search.sector.clone();
    let keywords = search.keywords.clone();
    let (sectors, keyword) = tokio::task::spawn_blocking(move || {
        lookup_reference_sections(&lookup_store, &sector, keywords)
    })
    .await??;

    Ok(RenderModel {
        ticker: search.ticker,
        sector_query: search.sector,
        timeframe: search.timeframe,
        market,
        sectors,
        keyword,
        generated_at: eastern_timestamp(Utc::now()),
        disclaimer: DISCLAIMER.to_string(),
    })
}

async fn fetch_market_section(
    provider: &dyn MarketDataProvider,
    search: &ValidatedSearch,
    market_timeout: Duration,
) -> MarketSection {
    let fetch = provider.fetch_snapshot(&search.ticker, search.timeframe);
    match tokio::time::timeout(market_timeout, fetch).await {
        Ok(Ok(snapshot)) => MarketSection::Available(Box::new(MarketView::from_snapshot(snapshot))),
        Ok(Err(err)) => {
            warn!("Market data fetch failed for {}: {:#}", search.ticker, err);
            MarketSection::Unavailable {
                message: format!("An error occurred while fetching stock data: {:#}", err),
            }
        }
        Err(_) => {
            warn!(
                "Market data fetch for {} timed out after {:?}",
                search.ticker, market_timeout
            );
            MarketSection::Unavailable {
                message: format!(
                    "An error occurred while fetching stock data: request timed out after {}s",
                    market_timeout.as_secs_f64()
                ),
            }
        }
    }
}

fn lookup_reference_sections(
    store: &ReferenceStore,
    sector: &str,
    keywords: Option<(String, String)>,
) -> Result<(Vec<ExplainedSectorRecord>, KeywordSection), StoreError> {
    let records = store.fetch_sector_records(sector)?;
    let mut explained = Vec::with_capacity(records.len());
    for record in &records {
        explained.push(store.explain_record(record)?);
    }

    let keyword = match keywords {
        Some((subindustry, screen)) => {
            let response = store.resolve_keyword_response(&subindustry, &screen)?;
            KeywordSection::Resolved {
                subindustry,
                screen,
                response,
            }
        }
        None => KeywordSection::Incomplete {
            message: KEYWORD_PROMPT_MESSAGE.to_string(),
        },
    };

    Ok((explained, keyword))
}

pub fn eastern_timestamp(now: DateTime<Utc>) -> String {
    now.with_timezone(&Eastern).format("%I:%M %p %Z").to_string()
}
