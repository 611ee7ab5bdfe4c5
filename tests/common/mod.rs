#![allow(dead_code)]

use anyhow::Result;
use rusqlite::Connection;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

pub const KNOWN_TICKER: &str = "XOM";
pub const UNKNOWN_TICKER: &str = "ZZZZ";
pub const SLOW_TICKER: &str = "SLOW";
/// Chart is served, quote summary is always refused.
pub const CHART_ONLY_TICKER: &str = "CHRT";
pub const STUB_CRUMB: &str = "stub-crumb";
const SESSION_COOKIE: &str = "A3=stub-session";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn seed_reference_db(dir: &TempDir) -> Result<PathBuf> {
    let path = dir.path().join("reference.db");
    let conn = Connection::open(&path)?;
    conn.execute_batch(
        "CREATE TABLE stockracialharm (
            Sector TEXT, Description TEXT, Primary_Subsector TEXT, Subsector_Weight REAL,
            Harm_Magnitude INTEGER, Population_Impact INTEGER, Directional_Movement INTEGER,
            Total_Score REAL
         );
         INSERT INTO stockracialharm VALUES
            ('Energy', 'Oil, gas and coal', 'Oil & Gas', 0.6, 2, 1, 3, 6.0),
            ('Financials', 'Banks and lenders', 'Banks', 0.8, 1, 1, 2, 8.0),
            ('Utilities', 'Power and water', 'Electric', 0.5, 9, 1, 1, 3.0);
         CREATE TABLE stockharmdef2 (
            Key INTEGER, \"Harm-Magnitude\" TEXT, \"Pop-Impact\" TEXT, \"Directional-Trend\" TEXT
         );
         INSERT INTO stockharmdef2 VALUES
            (1, 'High risk', 'Broad impact', 'Worsening'),
            (2, 'Medium risk', 'Moderate impact', 'Stable'),
            (3, 'Low risk', 'Narrow impact', 'Improving');
         CREATE TABLE adasina (Keyword1 TEXT, Keyword2 TEXT, Response TEXT);
         INSERT INTO adasina VALUES
            ('Oil & Gas', 'Environmental Justice', 'Excluded by the screen.'),
            ('Banks', 'Economic Justice', 'Flagged for predatory lending review.');",
    )?;
    Ok(path)
}

/// Minimal stand-in for the cookie, crumb, chart and quote summary endpoints.
pub struct MarketDataStub {
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
    shutdown: mpsc::Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl MarketDataStub {
    pub fn start() -> Result<Self> {
        let mut listener: Option<TcpListener> = None;
        for _ in 0..64 {
            let port = fastrand::u16(40_000..60_000);
            if let Ok(bound) = TcpListener::bind(("127.0.0.1", port)) {
                listener = Some(bound);
                break;
            }
        }
        let listener = match listener {
            Some(listener) => listener,
            None => TcpListener::bind("127.0.0.1:0")?,
        };
        listener.set_nonblocking(true)?;
        let base_url = format!("http://{}", listener.local_addr()?);
        let (shutdown, shutdown_rx) = mpsc::channel();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);

        let handle = thread::spawn(move || loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }
            match listener.accept() {
                Ok((stream, _)) => {
                    let log = Arc::clone(&log);
                    let _ = stream.set_nonblocking(false);
                    thread::spawn(move || {
                        let _ = handle_request(stream, &log);
                    });
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => {
                    thread::sleep(Duration::from_millis(10));
                }
            }
        });

        Ok(Self {
            base_url,
            requests,
            shutdown,
            handle: Some(handle),
        })
    }

    /// URL that hands out the session cookie.
    pub fn cookie_url(&self) -> String {
        format!("{}/consent", self.base_url)
    }

    /// Request targets seen so far, including query strings.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl Drop for MarketDataStub {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn handle_request(
    mut stream: std::net::TcpStream,
    log: &Mutex<Vec<String>>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line)? == 0 {
        return Ok(());
    }
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        return Ok(());
    }
    let method = parts[0];
    let target = parts[1];
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    if let Ok(mut guard) = log.lock() {
        guard.push(target.to_string());
    }

    let mut has_session = false;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header)? == 0 || header == "\r\n" {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.trim().eq_ignore_ascii_case("cookie")
                && value.split(';').any(|pair| pair.trim() == SESSION_COOKIE)
            {
                has_session = true;
            }
        }
    }

    if method != "GET" {
        return write_response(&mut stream, "405 Method Not Allowed", &[], "");
    }

    let chart_prefix = "/v8/finance/chart/";
    let summary_prefix = "/v10/finance/quoteSummary/";
    if path == "/consent" {
        let cookie = format!("{}; Path=/", SESSION_COOKIE);
        write_response(&mut stream, "404 Not Found", &[("Set-Cookie", &cookie)], "")
    } else if path == "/v1/test/getcrumb" {
        if has_session {
            write_response(
                &mut stream,
                "200 OK",
                &[("Content-Type", "text/plain")],
                STUB_CRUMB,
            )
        } else {
            write_json_response(&mut stream, "401 Unauthorized", &unauthorized_json())
        }
    } else if let Some(ticker) = path.strip_prefix(chart_prefix) {
        match ticker {
            KNOWN_TICKER | CHART_ONLY_TICKER => {
                write_json_response(&mut stream, "200 OK", &chart_json())
            }
            SLOW_TICKER => {
                thread::sleep(Duration::from_secs(3));
                write_json_response(&mut stream, "200 OK", &chart_json())
            }
            _ => write_json_response(&mut stream, "404 Not Found", &not_found_json("chart")),
        }
    } else if let Some(ticker) = path.strip_prefix(summary_prefix) {
        let crumb = format!("crumb={}", STUB_CRUMB);
        let has_crumb = query.split('&').any(|pair| pair == crumb);
        match ticker {
            _ if !has_crumb => {
                write_json_response(&mut stream, "401 Unauthorized", &unauthorized_json())
            }
            KNOWN_TICKER => write_json_response(&mut stream, "200 OK", &summary_json()),
            CHART_ONLY_TICKER => {
                write_json_response(&mut stream, "401 Unauthorized", &unauthorized_json())
            }
            _ => write_json_response(
                &mut stream,
                "404 Not Found",
                &not_found_json("quoteSummary"),
            ),
        }
    } else {
        write_response(&mut stream, "404 Not Found", &[], "")
    }
}

fn write_json_response(
    stream: &mut std::net::TcpStream,
    status: &str,
    body: &str,
) -> std::io::Result<()> {
    write_response(stream, status, &[("Content-Type", "application/json")], body)
}

fn write_response(
    stream: &mut std::net::TcpStream,
    status: &str,
    headers: &[(&str, &str)],
    body: &str,
) -> std::io::Result<()> {
    let mut response = format!("HTTP/1.1 {}\r\n", status);
    for (name, value) in headers {
        response.push_str(&format!("{}: {}\r\n", name, value));
    }
    response.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    ));
    stream.write_all(response.as_bytes())
}

fn unauthorized_json() -> String {
    serde_json::json!({
        "finance": {
            "result": null,
            "error": {
                "code": "Unauthorized",
                "description": "Invalid Crumb"
            }
        }
    })
    .to_string()
}

fn chart_json() -> String {
    let timestamps: Vec<i64> = (0..7).map(|day| 1_704_205_800 + day * 86_400).collect();
    let closes: Vec<f64> = (0..7).map(|day| 100.0 + day as f64).collect();
    serde_json::json!({
        "chart": {
            "result": [{
                "meta": {
                    "currency": "USD",
                    "symbol": KNOWN_TICKER,
                    "longName": "Example Energy Corp",
                    "regularMarketPrice": 106.0,
                    "chartPreviousClose": 99.5,
                    "regularMarketDayHigh": 107.0,
                    "regularMarketDayLow": 105.0,
                    "fiftyTwoWeekHigh": 120.0,
                    "fiftyTwoWeekLow": 90.0
                },
                "timestamp": timestamps,
                "indicators": {
                    "quote": [{
                        "open": closes,
                        "high": closes,
                        "low": closes,
                        "close": closes,
                        "volume": [1000, 1100, 1200, 1300, 1400, 1500, 1600]
                    }]
                }
            }],
            "error": null
        }
    })
    .to_string()
}

fn summary_json() -> String {
    serde_json::json!({
        "quoteSummary": {
            "result": [{
                "price": {
                    "longName": "Example Energy Corp",
                    "marketCap": { "raw": 45_600_000_000.0_f64, "fmt": "45.6B" }
                },
                "summaryProfile": {
                    "country": "United States",
                    "sector": "Energy",
                    "industry": "Oil & Gas Integrated",
                    "fullTimeEmployees": 61500
                },
                "summaryDetail": {
                    "forwardPE": { "raw": 12.5, "fmt": "12.50" },
                    "dividendRate": { "raw": 3.8, "fmt": "3.80" },
                    "dividendYield": { "raw": 0.031, "fmt": "3.10%" }
                },
                "defaultKeyStatistics": {
                    "enterpriseValue": { "raw": 470_000_000_000.0_f64 },
                    "forwardEps": { "raw": 8.4 },
                    "pegRatio": { "raw": 1.7 }
                },
                "financialData": {
                    "recommendationKey": "hold"
                }
            }],
            "error": null
        }
    })
    .to_string()
}

fn not_found_json(root: &str) -> String {
    let mut body = serde_json::Map::new();
    body.insert(
        root.to_string(),
        serde_json::json!({
            "result": null,
            "error": {
                "code": "Not Found",
                "description": "No data found, symbol may be delisted"
            }
        }),
    );
    serde_json::Value::Object(body).to_string()
}
