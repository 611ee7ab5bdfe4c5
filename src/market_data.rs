use crate::models::{CompanyProfile, MarketSnapshot, PriceBar, Timeframe};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::de::{self, DeserializeOwned, Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::fmt;
use tokio::sync::Mutex;
use url::Url;

const CHART_INTERVAL: &str = "1d";
const QUOTE_SUMMARY_MODULES: &str =
    "price,summaryProfile,summaryDetail,defaultKeyStatistics,financialData";

/// Source of ticker metadata and price history.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn fetch_snapshot(&self, ticker: &str, timeframe: Timeframe) -> Result<MarketSnapshot>;
}

pub struct YahooFinanceClient {
    http: Client,
    base_url: Url,
    cookie_url: Url,
    crumb: Mutex<Option<String>>,
}

impl YahooFinanceClient {
    /// `http` must keep a cookie store; the crumb is bound to the session
    /// cookie set by `cookie_url`.
    pub fn new(http: Client, base_url: &str, cookie_url: &str) -> Result<Self> {
        let base_url = parse_http_url(base_url, "market data base URL")?;
        let cookie_url = parse_http_url(cookie_url, "market data cookie URL")?;
        Ok(Self {
            http,
            base_url,
            cookie_url,
            crumb: Mutex::new(None),
        })
    }

    /// Joins `segments` onto the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("market data base URL cannot carry a path: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn fetch_chart(&self, ticker: &str, timeframe: Timeframe) -> Result<ChartResult> {
        let url = self.endpoint(&["v8", "finance", "chart", ticker])?;
        let query = [
            ("range", timeframe.provider_range()),
            ("interval", CHART_INTERVAL),
            ("includePrePost", "false"),
        ];
        let envelope: ChartEnvelope = self.get_with_query(url, &query).await?;
        if let Some(error) = envelope.chart.error {
            return Err(anyhow!(
                "market data provider rejected {}: {}",
                ticker,
                error.describe()
            ));
        }
        envelope
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .ok_or_else(|| anyhow!("market data provider returned no chart for {}", ticker))
    }

    async fn fetch_quote_summary(&self, ticker: &str) -> Result<QuoteSummaryResult> {
        let crumb = self.crumb().await?;
        let envelope = match self.request_quote_summary(ticker, &crumb).await {
            Err(err) if is_unauthorized(&err) => {
                debug!("Crumb rejected for {}, starting a new session", ticker);
                self.crumb.lock().await.take();
                let crumb = self.crumb().await?;
                self.request_quote_summary(ticker, &crumb).await?
            }
            other => other?,
        };
        if let Some(error) = envelope.quote_summary.error {
            return Err(anyhow!(
                "quote summary rejected {}: {}",
                ticker,
                error.describe()
            ));
        }
        envelope
            .quote_summary
            .result
            .and_then(|results| results.into_iter().next())
            .ok_or_else(|| anyhow!("quote summary returned no result for {}", ticker))
    }

    async fn request_quote_summary(
        &self,
        ticker: &str,
        crumb: &str,
    ) -> Result<QuoteSummaryEnvelope> {
        let url = self.endpoint(&["v10", "finance", "quoteSummary", ticker])?;
        let query = [("modules", QUOTE_SUMMARY_MODULES), ("crumb", crumb)];
        self.get_with_query(url, &query).await
    }

    /// Session crumb, fetched once and reused until the provider rejects it.
    async fn crumb(&self) -> Result<String> {
        let mut cached = self.crumb.lock().await;
        if let Some(crumb) = cached.as_ref() {
            return Ok(crumb.clone());
        }

        // Only the Set-Cookie header matters; the status is usually 404.
        self.http
            .get(self.cookie_url.clone())
            .send()
            .await
            .with_context(|| format!("GET {} failed", self.cookie_url))?;

        let url = self.endpoint(&["v1", "test", "getcrumb"])?;
        let body = self
            .http
            .get(url.clone())
            .header(ACCEPT, "text/plain")
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?
            .error_for_status()
            .with_context(|| format!("GET {} returned error", url))?
            .text()
            .await
            .context("failed to read crumb")?;
        let crumb = body.trim();
        if crumb.is_empty() || crumb.contains(char::is_whitespace) || crumb.starts_with('<') {
            return Err(anyhow!("market data provider returned no usable crumb"));
        }

        debug!("Obtained market data crumb from {}", url);
        *cached = Some(crumb.to_string());
        Ok(crumb.to_string())
    }

    async fn get_with_query<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let response = self
            .http
            .get(url.clone())
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        let status = response.status();
        // Unknown symbols come back as 404 with a JSON error envelope.
        if status == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return serde_json::from_str::<T>(&body)
                .with_context(|| format!("GET {} returned 404", url));
        }

        let response = response
            .error_for_status()
            .with_context(|| format!("GET {} returned error", url))?;
        response
            .json::<T>()
            .await
            .context("failed to parse market data response")
    }
}

fn parse_http_url(raw: &str, what: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(anyhow!("{} must not be empty", what));
    }
    let url = Url::parse(raw).with_context(|| format!("invalid {}: {}", what, raw))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(anyhow!("{} must be an http(s) URL: {}", what, raw));
    }
    Ok(url)
}

fn is_unauthorized(err: &anyhow::Error) -> bool {
    err.downcast_ref::<reqwest::Error>()
        .and_then(reqwest::Error::status)
        .is_some_and(|status| status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN)
}

#[async_trait]
impl MarketDataProvider for YahooFinanceClient {
    async fn fetch_snapshot(&self, ticker: &str, timeframe: Timeframe) -> Result<MarketSnapshot> {
        let chart = self.fetch_chart(ticker, timeframe).await?;
        let mut profile = chart.meta.to_profile();

        match self.fetch_quote_summary(ticker).await {
            Ok(summary) => summary.merge_into(&mut profile),
            Err(err) => warn!("Quote summary unavailable for {}: {:#}", ticker, err),
        }

        let bars = chart.into_bars();
        debug!(
            "Fetched {} price bar(s) for {} over {}",
            bars.len(),
            ticker,
            timeframe
        );

        Ok(MarketSnapshot {
            ticker: ticker.to_string(),
            profile,
            bars,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ProviderError>,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl ProviderError {
    fn describe(&self) -> String {
        match (self.code.as_deref(), self.description.as_deref()) {
            (Some(code), Some(description)) => format!("{} ({})", description, code),
            (None, Some(description)) => description.to_string(),
            (Some(code), None) => code.to_string(),
            (None, None) => "unknown error".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    indicators: ChartIndicators,
}

impl ChartResult {
    fn into_bars(self) -> Vec<PriceBar> {
        let Some(quote) = self.indicators.quote.into_iter().next() else {
            return Vec::new();
        };
        self.timestamp
            .iter()
            .enumerate()
            .filter_map(|(idx, &seconds)| {
                let close = quote.close.get(idx).copied().flatten()?;
                let date = DateTime::<Utc>::from_timestamp(seconds, 0)?;
                Some(PriceBar {
                    date,
                    open: quote.open.get(idx).copied().flatten(),
                    high: quote.high.get(idx).copied().flatten(),
                    low: quote.low.get(idx).copied().flatten(),
                    close,
                    volume: quote.volume.get(idx).copied().flatten(),
                })
            })
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    long_name: Option<String>,
    #[serde(default)]
    short_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_f64_opt")]
    regular_market_price: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_opt")]
    previous_close: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_opt")]
    chart_previous_close: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_opt")]
    regular_market_day_high: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_opt")]
    regular_market_day_low: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_opt")]
    fifty_two_week_high: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_opt")]
    fifty_two_week_low: Option<f64>,
}

impl ChartMeta {
    fn to_profile(&self) -> CompanyProfile {
        CompanyProfile {
            long_name: self.long_name.clone().or_else(|| self.short_name.clone()),
            currency: self.currency.clone(),
            current_price: self.regular_market_price,
            previous_close: self.previous_close.or(self.chart_previous_close),
            day_high: self.regular_market_day_high,
            day_low: self.regular_market_day_low,
            fifty_two_week_high: self.fifty_two_week_high,
            fifty_two_week_low: self.fifty_two_week_low,
            ..CompanyProfile::default()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryEnvelope {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummaryBody,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryBody {
    #[serde(default)]
    result: Option<Vec<QuoteSummaryResult>>,
    #[serde(default)]
    error: Option<ProviderError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResult {
    #[serde(default)]
    price: Option<PriceModule>,
    #[serde(default)]
    summary_profile: Option<SummaryProfileModule>,
    #[serde(default)]
    summary_detail: Option<SummaryDetailModule>,
    #[serde(default)]
    default_key_statistics: Option<KeyStatisticsModule>,
    #[serde(default)]
    financial_data: Option<FinancialDataModule>,
}

impl QuoteSummaryResult {
    /// Fills profile fields the chart metadata does not carry; chart values win.
    fn merge_into(self, profile: &mut CompanyProfile) {
        if let Some(price) = self.price {
            if price.long_name.is_some() {
                profile.long_name = price.long_name;
            }
            profile.market_cap = price.market_cap;
        }
        if let Some(summary) = self.summary_profile {
            profile.country = summary.country;
            profile.sector = summary.sector;
            profile.industry = summary.industry;
            profile.full_time_employees = summary.full_time_employees.map(|v| v.round() as i64);
        }
        if let Some(detail) = self.summary_detail {
            profile.previous_close = profile.previous_close.or(detail.previous_close);
            profile.day_high = profile.day_high.or(detail.day_high);
            profile.day_low = profile.day_low.or(detail.day_low);
            profile.fifty_two_week_high = profile.fifty_two_week_high.or(detail.fifty_two_week_high);
            profile.fifty_two_week_low = profile.fifty_two_week_low.or(detail.fifty_two_week_low);
            profile.forward_pe = detail.forward_pe;
            profile.dividend_rate = detail.dividend_rate;
            profile.dividend_yield = detail.dividend_yield;
            profile.market_cap = profile.market_cap.or(detail.market_cap);
        }
        if let Some(stats) = self.default_key_statistics {
            profile.enterprise_value = stats.enterprise_value;
            profile.forward_eps = stats.forward_eps;
            profile.peg_ratio = stats.peg_ratio;
        }
        if let Some(financial) = self.financial_data {
            profile.current_price = profile.current_price.or(financial.current_price);
            profile.recommendation_key = financial.recommendation_key;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceModule {
    #[serde(default)]
    long_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_f64_opt")]
    market_cap: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryProfileModule {
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    sector: Option<String>,
    #[serde(default)]
    industry: Option<String>,
    #[serde(default, deserialize_with = "deserialize_f64_opt")]
    full_time_employees: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryDetailModule {
    #[serde(default, deserialize_with = "deserialize_f64_opt")]
    previous_close: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_opt")]
    day_high: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_opt")]
    day_low: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_opt")]
    fifty_two_week_high: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_opt")]
    fifty_two_week_low: Option<f64>,
    #[serde(rename = "forwardPE", default, deserialize_with = "deserialize_f64_opt")]
    forward_pe: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_opt")]
    dividend_rate: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_opt")]
    dividend_yield: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_opt")]
    market_cap: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyStatisticsModule {
    #[serde(default, deserialize_with = "deserialize_f64_opt")]
    enterprise_value: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_opt")]
    forward_eps: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_opt")]
    peg_ratio: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinancialDataModule {
    #[serde(default, deserialize_with = "deserialize_f64_opt")]
    current_price: Option<f64>,
    #[serde(default)]
    recommendation_key: Option<String>,
}

/// Accepts plain numbers, numeric strings and `{"raw": n, "fmt": ".."}` wrappers.
fn deserialize_f64_opt<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    struct F64OptVisitor;

    impl<'de> Visitor<'de> for F64OptVisitor {
        type Value = Option<f64>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a number, numeric string or raw/fmt object")
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value).filter(|v| v.is_finite()))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value as f64))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value as f64))
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut raw = None;
            while let Some(key) = map.next_key::<String>()? {
                if key == "raw" {
                    raw = map.next_value_seed(RawValueSeed)?;
                } else {
                    map.next_value::<de::IgnoredAny>()?;
                }
            }
            Ok(raw)
        }
    }

    struct RawValueSeed;

    impl<'de> de::DeserializeSeed<'de> for RawValueSeed {
        type Value = Option<f64>;

        fn deserialize<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserializer.deserialize_any(F64OptVisitor)
        }
    }

    deserializer.deserialize_any(F64OptVisitor)
}
