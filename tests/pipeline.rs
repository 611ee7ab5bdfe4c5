mod common;

use anyhow::Result;
use common::{
    init_logging, seed_reference_db, MarketDataStub, CHART_ONLY_TICKER, KNOWN_TICKER,
    SLOW_TICKER, STUB_CRUMB,
};
use screener::config::DashboardSettings;
use screener::context::AppContext;
use screener::http_client::build_async_client;
use screener::market_data::{MarketDataProvider, YahooFinanceClient};
use screener::models::{ExplanationCategory, Timeframe, CODE_NOT_FOUND};
use screener::pipeline::{run_search, KeywordSection, MarketSection, SearchRequest};
use screener::report::render_pdf;
use std::time::Duration;
use tempfile::TempDir;

fn app_context(stub: &MarketDataStub, dir: &TempDir, timeout: Duration) -> Result<AppContext> {
    let settings = DashboardSettings {
        database_path: seed_reference_db(dir)?,
        market_data_url: stub.base_url.clone(),
        market_data_cookie_url: stub.cookie_url(),
        market_data_timeout: timeout,
        bind_addr: "127.0.0.1:0".parse()?,
    };
    AppContext::initialize(settings)
}

fn request(ticker: &str, sector: &str) -> SearchRequest {
    SearchRequest {
        ticker: ticker.to_string(),
        sector: sector.to_string(),
        ..SearchRequest::default()
    }
}

#[tokio::test]
async fn known_ticker_builds_full_render_model() -> Result<()> {
    init_logging();
    let stub = MarketDataStub::start()?;
    let dir = TempDir::new()?;
    let app = app_context(&stub, &dir, Duration::from_secs(5))?;

    let mut req = request("xom", "Ener");
    req.timeframe = "1Y".to_string();
    req.keyword1 = Some("Oil & Gas".to_string());
    req.keyword2 = Some("Environmental Justice".to_string());

    let provider = app.market_data_provider();
    let model = run_search(
        &app.reference_store(),
        provider.as_ref(),
        &req,
        app.settings().market_data_timeout,
    )
    .await?;

    assert_eq!(model.title(), "XOM - Example Energy Corp");
    let view = model.market_view().expect("market data should be available");
    assert_eq!(view.snapshot.bars.len(), 7);
    assert_eq!(view.recent_bars.len(), 5);
    assert_eq!(view.stock_info.rows[0].value, "United States");
    assert_eq!(view.stock_info.rows[3].value, "$45.6B");
    assert_eq!(view.stock_info.rows[4].value, "$470.0B");
    assert_eq!(view.price_info.rows[0].value, "$106.00");
    assert_eq!(view.business_metrics.rows[5].value, "Hold");

    assert_eq!(model.sectors.len(), 1);
    let energy = &model.sectors[0];
    assert_eq!(
        energy
            .explanation(ExplanationCategory::HarmMagnitude)
            .map(|e| e.text.as_str()),
        Some("Medium risk")
    );
    assert_eq!(
        energy
            .explanation(ExplanationCategory::DirectionalMovement)
            .map(|e| e.text.as_str()),
        Some("Improving")
    );
    assert_eq!(
        model.keyword,
        KeywordSection::Resolved {
            subindustry: "Oil & Gas".to_string(),
            screen: "Environmental Justice".to_string(),
            response: "Excluded by the screen.".to_string(),
        }
    );

    let requests = stub.requests();
    assert!(requests
        .iter()
        .any(|target| target.starts_with(&format!("/v8/finance/chart/{}", KNOWN_TICKER))
            && target.contains("range=1y")
            && target.contains("interval=1d")));
    assert!(requests.iter().any(|target| target == "/consent"));
    assert!(requests.iter().any(|target| target == "/v1/test/getcrumb"));
    assert!(requests.iter().any(|target| {
        target.starts_with("/v10/finance/quoteSummary/XOM")
            && target.contains(&format!("crumb={}", STUB_CRUMB))
    }));

    let pdf = render_pdf(&model)?;
    assert!(pdf.starts_with(b"%PDF"));
    Ok(())
}

#[tokio::test]
async fn unknown_ticker_keeps_reference_sections() -> Result<()> {
    init_logging();
    let stub = MarketDataStub::start()?;
    let dir = TempDir::new()?;
    let app = app_context(&stub, &dir, Duration::from_secs(5))?;

    let mut req = request("ZZZZ", "Utilities");
    req.keyword1 = Some("Banks".to_string());
    req.keyword2 = Some("Economic Justice".to_string());
    let provider = app.market_data_provider();
    let model = run_search(
        &app.reference_store(),
        provider.as_ref(),
        &req,
        Duration::from_secs(5),
    )
    .await?;

    match &model.market {
        MarketSection::Unavailable { message } => {
            assert!(message.starts_with("An error occurred while fetching stock data"));
            assert!(message.contains("No data found"));
        }
        other => panic!("expected unavailable market data, got {:?}", other),
    }
    assert_eq!(model.title(), "ZZZZ - N/A");

    // Harm code 9 has no explanation row.
    let utilities = &model.sectors[0];
    assert_eq!(
        utilities
            .explanation(ExplanationCategory::HarmMagnitude)
            .map(|e| e.text.as_str()),
        Some(CODE_NOT_FOUND)
    );
    assert!(matches!(model.keyword, KeywordSection::Resolved { .. }));

    let pdf = render_pdf(&model)?;
    assert!(pdf.starts_with(b"%PDF"));
    Ok(())
}

#[tokio::test]
async fn slow_provider_times_out_without_failing_search() -> Result<()> {
    init_logging();
    let stub = MarketDataStub::start()?;
    let dir = TempDir::new()?;
    let app = app_context(&stub, &dir, Duration::from_secs(1))?;

    let provider = app.market_data_provider();
    let model = run_search(
        &app.reference_store(),
        provider.as_ref(),
        &request(SLOW_TICKER, "Financials"),
        Duration::from_secs(1),
    )
    .await?;

    assert!(matches!(model.market, MarketSection::Unavailable { .. }));
    assert_eq!(model.sectors.len(), 1);
    assert_eq!(model.sectors[0].record.sector, "Financials");
    Ok(())
}

fn count_targets(stub: &MarketDataStub, path: &str) -> usize {
    stub.requests()
        .iter()
        .filter(|target| target.as_str() == path)
        .count()
}

#[tokio::test]
async fn crumb_is_reused_across_searches() -> Result<()> {
    init_logging();
    let stub = MarketDataStub::start()?;
    let dir = TempDir::new()?;
    let app = app_context(&stub, &dir, Duration::from_secs(5))?;
    let provider = app.market_data_provider();

    for _ in 0..2 {
        let model = run_search(
            &app.reference_store(),
            provider.as_ref(),
            &request(KNOWN_TICKER, "Energy"),
            Duration::from_secs(5),
        )
        .await?;
        let view = model.market_view().expect("market data should be available");
        assert_eq!(view.stock_info.rows[0].value, "United States");
    }

    assert_eq!(count_targets(&stub, "/consent"), 1);
    assert_eq!(count_targets(&stub, "/v1/test/getcrumb"), 1);
    Ok(())
}

#[tokio::test]
async fn refused_quote_summary_keeps_chart_data() -> Result<()> {
    init_logging();
    let stub = MarketDataStub::start()?;
    let dir = TempDir::new()?;
    let app = app_context(&stub, &dir, Duration::from_secs(5))?;

    let provider = app.market_data_provider();
    let model = run_search(
        &app.reference_store(),
        provider.as_ref(),
        &request(CHART_ONLY_TICKER, "Energy"),
        Duration::from_secs(5),
    )
    .await?;

    let view = match &model.market {
        MarketSection::Available(view) => view,
        other => panic!("expected chart data to survive, got {:?}", other),
    };
    assert_eq!(view.snapshot.bars.len(), 7);
    assert_eq!(view.price_info.rows[0].value, "$106.00");
    for row in &view.stock_info.rows {
        assert_eq!(row.value, "N/A", "{} should fall back", row.label);
    }
    assert_eq!(view.business_metrics.rows[5].value, "N/A");

    // One fresh session is tried after the first refusal.
    assert_eq!(count_targets(&stub, "/v1/test/getcrumb"), 2);
    Ok(())
}

#[tokio::test]
async fn ticker_is_sent_as_a_single_path_segment() -> Result<()> {
    init_logging();
    let stub = MarketDataStub::start()?;
    let http = build_async_client(Some(Duration::from_secs(5)))?;
    let client = YahooFinanceClient::new(http, &stub.base_url, &stub.cookie_url())?;

    let result = client
        .fetch_snapshot("MSFT?range=max&x=", Timeframe::OneMonth)
        .await;
    assert!(result.is_err());

    let requests = stub.requests();
    assert_eq!(requests.len(), 1);
    let (path, query) = requests[0]
        .split_once('?')
        .expect("chart request should carry a query");
    assert_eq!(path, "/v8/finance/chart/MSFT%3Frange=max&x=");
    assert_eq!(query, "range=1mo&interval=1d&includePrePost=false");
    Ok(())
}
