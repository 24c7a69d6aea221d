use super::MarketData;
use crate::error::TraderError;
use crate::models::Bar;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::time::{sleep, Duration};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 2000; // Start with 2 seconds
// The chart endpoint rejects requests without a browser-like agent
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) lstm-trader/0.1";

/// Client for the Yahoo Finance chart API (daily bars)
#[derive(Clone)]
pub struct YahooClient {
    client: Client,
    base_url: String,
    initial_backoff: Duration,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize, Default)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// Outcome of a single attempt, split so the retry loop knows what to repeat
enum Attempt {
    Retry(TraderError),
    Fail(TraderError),
}

impl YahooClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// Override the first retry delay (doubles on each further attempt)
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    async fn fetch_once(&self, url: &str) -> std::result::Result<ChartResponse, Attempt> {
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => return Err(Attempt::Retry(e.into())),
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(Attempt::Retry(TraderError::MarketData(format!(
                "Yahoo Finance returned {}",
                status
            ))));
        }

        // 404 still carries a JSON chart error describing the bad symbol
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return Err(Attempt::Fail(TraderError::MarketData(format!(
                "Yahoo Finance error ({}): {}",
                status, body
            ))));
        }

        response
            .json::<ChartResponse>()
            .await
            .map_err(|e| Attempt::Fail(e.into()))
    }

    fn to_bars(symbol: &str, response: ChartResponse) -> Result<Vec<Bar>> {
        if let Some(err) = response.chart.error {
            return Err(TraderError::MarketData(format!(
                "{} for {}: {}",
                err.code, symbol, err.description
            )));
        }

        let Some(result) = response.chart.result.and_then(|r| r.into_iter().next()) else {
            return Ok(Vec::new());
        };
        let quote = result.indicators.quote.into_iter().next().unwrap_or_default();

        let mut bars = Vec::with_capacity(result.timestamp.len());
        for (i, &ts) in result.timestamp.iter().enumerate() {
            let field = |v: &Vec<Option<f64>>| v.get(i).copied().flatten();

            // Halted or partial days come back as nulls
            let (Some(high), Some(low), Some(close)) =
                (field(&quote.high), field(&quote.low), field(&quote.close))
            else {
                tracing::debug!("Skipping incomplete bar for {} at {}", symbol, ts);
                continue;
            };
            let Some(timestamp) = DateTime::<Utc>::from_timestamp(ts, 0) else {
                continue;
            };

            bars.push(Bar {
                timestamp,
                open: field(&quote.open).unwrap_or(close),
                high,
                low,
                close,
                volume: field(&quote.volume).unwrap_or(0.0),
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }
}

#[async_trait]
impl MarketData for YahooClient {
    /// Endpoint: GET /v8/finance/chart/{symbol}?period1=..&period2=..&interval=1d
    /// Includes retry logic with exponential backoff for transient failures
    async fn daily_bars(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<Bar>> {
        let period1 = start.and_hms_opt(0, 0, 0).map(|d| d.and_utc().timestamp());
        let period2 = end.and_hms_opt(0, 0, 0).map(|d| d.and_utc().timestamp());
        let (Some(period1), Some(period2)) = (period1, period2) else {
            return Err(TraderError::MarketData("invalid date range".into()));
        };

        let url = format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval=1d&events=history",
            self.base_url,
            urlencoding::encode(symbol),
            period1,
            period2
        );

        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            match self.fetch_once(&url).await {
                Ok(response) => {
                    if attempt > 1 {
                        tracing::info!(
                            "✓ Fetched {} bars after {} attempts",
                            symbol,
                            attempt
                        );
                    }
                    let bars = Self::to_bars(symbol, response)?;
                    tracing::debug!("Fetched {} daily bars for {}", bars.len(), symbol);
                    return Ok(bars);
                }
                Err(Attempt::Fail(e)) => return Err(e),
                Err(Attempt::Retry(e)) => {
                    if attempt < MAX_RETRIES {
                        let backoff = self.initial_backoff * 2_u32.pow(attempt - 1);
                        tracing::warn!(
                            "Attempt {}/{} failed for {}: {}. Retrying in {:?}...",
                            attempt,
                            MAX_RETRIES,
                            symbol,
                            e,
                            backoff
                        );
                        sleep(backoff).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        // All retries exhausted
        Err(last_error.unwrap_or_else(|| {
            TraderError::MarketData("all retry attempts failed".into())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn test_client(server: &mockito::Server) -> YahooClient {
        YahooClient::new(&server.url(), Duration::from_secs(5))
            .unwrap()
            .with_initial_backoff(Duration::from_millis(1))
    }

    fn range() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 11).unwrap(),
        )
    }

    fn chart_body() -> String {
        json!({
            "chart": {
                "result": [{
                    "meta": {"symbol": "AAPL", "currency": "USD"},
                    "timestamp": [1704205800, 1704292200, 1704378600],
                    "indicators": {
                        "quote": [{
                            "open": [187.15, 184.22, null],
                            "high": [188.44, 185.88, 183.09],
                            "low": [183.89, 183.43, 180.88],
                            "close": [185.64, null, 181.91],
                            "volume": [82488700, 58414500, 71983600]
                        }]
                    }
                }],
                "error": null
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_daily_bars_parses_and_skips_incomplete_rows() {
        let mut server = mockito::Server::new_async().await;
        let (start, end) = range();
        let mock = server
            .mock("GET", "/v8/finance/chart/AAPL")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("interval".into(), "1d".into()),
                Matcher::UrlEncoded("period1".into(), "1704067200".into()),
                Matcher::UrlEncoded("period2".into(), "1710115200".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(chart_body())
            .create_async()
            .await;

        let client = test_client(&server);
        let bars = client.daily_bars("AAPL", start, end).await.unwrap();

        mock.assert_async().await;
        // Second row has a null close
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].features(), [188.44, 183.89, 185.64]);
        assert_eq!(bars[1].close, 181.91);
        // Missing open falls back to close
        assert_eq!(bars[1].open, 181.91);
        assert!(bars[0].timestamp < bars[1].timestamp);
    }

    #[tokio::test]
    async fn test_daily_bars_retries_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let (start, end) = range();
        let failing = server
            .mock("GET", "/v8/finance/chart/AAPL")
            .match_query(Matcher::Any)
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let client = test_client(&server);
        let result = client.daily_bars("AAPL", start, end).await;

        failing.assert_async().await;
        assert!(matches!(result, Err(TraderError::MarketData(_))));
    }

    #[tokio::test]
    async fn test_unknown_symbol_reports_chart_error() {
        let mut server = mockito::Server::new_async().await;
        let (start, end) = range();
        let _mock = server
            .mock("GET", "/v8/finance/chart/NOPE")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "chart": {
                        "result": null,
                        "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}
                    }
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let client = test_client(&server);
        let err = client.daily_bars("NOPE", start, end).await.unwrap_err();

        assert!(err.to_string().contains("delisted"));
    }

    #[tokio::test]
    async fn test_index_symbol_is_escaped_in_path() {
        let mut server = mockito::Server::new_async().await;
        let (start, end) = range();
        let mock = server
            .mock("GET", "/v8/finance/chart/%5EGSPC")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(chart_body())
            .expect(1)
            .create_async()
            .await;

        let client = test_client(&server);
        let bars = client.daily_bars("^GSPC", start, end).await.unwrap();

        mock.assert_async().await;
        assert_eq!(bars.len(), 2);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let (start, end) = range();
        let mock = server
            .mock("GET", "/v8/finance/chart/AAPL")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body("bad request")
            .expect(1)
            .create_async()
            .await;

        let client = test_client(&server);
        let result = client.daily_bars("AAPL", start, end).await;

        mock.assert_async().await;
        assert!(result.is_err());
    }
}
