//! Quote fetching
//!
//! `HttpQuoteFetcher` knows each exchange's ticker endpoint and response
//! shape and normalizes everything to a `Quote`. Rate limiting is handled
//! here, behind the `QuoteFetcher` seam, so updater loops stay oblivious
//! to it.

use std::future::Future;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::{debug, warn};

use ratewatch_core::{FetchError, FetchResult, Quote, Source, WatchConfig};

/// Seam between the polling loops and the network.
#[async_trait::async_trait]
pub trait QuoteFetcher: Send + Sync {
    async fn fetch(&self, source: Source) -> FetchResult<Quote>;
}

/// Bounded backoff for rate-limited sources
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Wait before attempt `attempt + 1`: base * 2^attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(31))
    }
}

/// Retries `op` on rate-limit signals only, with exponential backoff.
///
/// Any other failure is returned as-is on the first occurrence. Exhausting
/// the attempt budget yields `RateLimitExhausted` rather than the last error.
pub async fn retry_rate_limited<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> FetchResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = FetchResult<T>>,
{
    for attempt in 0..policy.max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_rate_limit() => {
                let delay = policy.delay_for(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, "rate limited, backing off");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }

    Err(FetchError::RateLimitExhausted {
        attempts: policy.max_attempts,
    })
}

/// HTTP ticker fetcher for the five known exchanges
pub struct HttpQuoteFetcher {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpQuoteFetcher {
    pub fn new(config: &WatchConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout())
            .build()?;

        Ok(Self {
            client,
            retry: RetryPolicy {
                max_attempts: config.max_retry_attempts,
                base_delay: config.retry_base_delay(),
            },
        })
    }

    async fn get_json(&self, url: &str) -> FetchResult<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.starts_with("application/json") {
            return Err(FetchError::UnsupportedContentType(content_type));
        }

        resp.text().await.map_err(map_reqwest_error)
    }

    async fn fetch_once(&self, source: Source) -> FetchResult<Quote> {
        let price = match source {
            Source::Binance => {
                let body = self
                    .get_json("https://api.binance.com/api/v3/ticker/price?symbol=ETHBTC")
                    .await?;
                last_price(source, &body)?
            }
            Source::Kucoin => {
                let body = self
                    .get_json("https://api.kucoin.com/api/v1/market/stats?symbol=ETH-BTC")
                    .await?;
                last_price(source, &body)?
            }
            Source::Wazirx => {
                let body = self
                    .get_json("https://api.wazirx.com/sapi/v1/ticker/24hr?symbol=ethbtc")
                    .await?;
                last_price(source, &body)?
            }
            Source::Coinhar => {
                let body = self
                    .get_json("https://api.coinhar.io/api/v3/ticker?symbol=ETHBTC")
                    .await?;
                last_price(source, &body)?
            }
            Source::Indodax => {
                // No direct ETH/BTC market; derive it from the two IDR books
                let eth = self
                    .get_json("https://indodax.com/api/ticker/ethidr")
                    .await?;
                let btc = self
                    .get_json("https://indodax.com/api/ticker/btcidr")
                    .await?;
                indodax_rate(&eth, &btc)?
            }
        };

        let now_ms = chrono::Utc::now().timestamp_millis() as u64;
        let quote = Quote::new(source, price, now_ms)?;
        debug!(source = %source, price, "fetched quote");
        Ok(quote)
    }
}

#[async_trait::async_trait]
impl QuoteFetcher for HttpQuoteFetcher {
    async fn fetch(&self, source: Source) -> FetchResult<Quote> {
        retry_rate_limited(&self.retry, || self.fetch_once(source)).await
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(err.to_string())
    }
}

#[derive(Deserialize)]
struct PriceField {
    price: String,
}

#[derive(Deserialize)]
struct KucoinStats {
    data: KucoinData,
}

#[derive(Deserialize)]
struct KucoinData {
    last: String,
}

#[derive(Deserialize)]
struct WazirxTicker {
    #[serde(rename = "lastPrice")]
    last_price: String,
}

#[derive(Deserialize)]
struct IndodaxTicker {
    ticker: IndodaxBook,
}

#[derive(Deserialize)]
struct IndodaxBook {
    sell: String,
    buy: String,
}

fn malformed(err: impl std::fmt::Display) -> FetchError {
    FetchError::MalformedBody(err.to_string())
}

fn parse_price(raw: &str) -> FetchResult<f64> {
    raw.parse::<f64>().map_err(malformed)
}

/// Extracts the last-trade price from a single-endpoint source's body.
fn last_price(source: Source, body: &str) -> FetchResult<f64> {
    match source {
        Source::Binance | Source::Coinhar => {
            let ticker: PriceField = serde_json::from_str(body).map_err(malformed)?;
            parse_price(&ticker.price)
        }
        Source::Kucoin => {
            let stats: KucoinStats = serde_json::from_str(body).map_err(malformed)?;
            parse_price(&stats.data.last)
        }
        Source::Wazirx => {
            let ticker: WazirxTicker = serde_json::from_str(body).map_err(malformed)?;
            parse_price(&ticker.last_price)
        }
        Source::Indodax => Err(FetchError::MalformedBody(
            "indodax needs two books".to_string(),
        )),
    }
}

/// ETH/BTC via the IDR books: what ETH sells for over what BTC buys for.
fn indodax_rate(eth_body: &str, btc_body: &str) -> FetchResult<f64> {
    let eth: IndodaxTicker = serde_json::from_str(eth_body).map_err(malformed)?;
    let btc: IndodaxTicker = serde_json::from_str(btc_body).map_err(malformed)?;
    let sell = parse_price(&eth.ticker.sell)?;
    let buy = parse_price(&btc.ticker.buy)?;
    if buy == 0.0 {
        return Err(FetchError::MalformedBody("zero btc buy price".to_string()));
    }
    Ok(sell / buy)
}
