//! Settlement price fetching and fixed-point scaling
//!
//! The ticker endpoint returns `{"symbol": "...", "price": "<decimal>"}`.
//! The klines endpoint returns an array of candles whose second element is
//! the open price as a decimal string.

use crate::errors::{OperatorError, OperatorResult};
use alloy::primitives::U256;
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_TICKER_URL: &str = "https://api.binance.com/api/v3/ticker/price";
pub const DEFAULT_KLINES_URL: &str = "https://api.binance.com/api/v3/klines";

/// Largest decimal count accepted by `PriceScaling::FixedDecimals`
const MAX_FIXED_DECIMALS: u32 = 18;

/// Last millisecond of the 1m candle opening at `start_ms`
pub fn kline_end_time(start_ms: u64) -> OperatorResult<u64> {
    start_ms
        .checked_add(59_999)
        .ok_or_else(|| OperatorError::ResponseShape(format!("kline start {} out of range", start_ms)))
}

/// Source of decimal price strings for a symbol
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Instantaneous ticker price
    async fn ticker_price(&self, symbol: &str) -> OperatorResult<String>;

    /// Open price of the 1-minute candle starting at `start_ms`
    async fn kline_open_price(&self, symbol: &str, start_ms: u64) -> OperatorResult<String>;
}

/// Which endpoint supplies the settlement price
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSource {
    /// Latest ticker price at execution time
    Ticker,
    /// Open of the 1m candle at the current round's end timestamp
    Kline,
}

impl FromStr for PriceSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ticker" => Ok(PriceSource::Ticker),
            "kline" | "klines" => Ok(PriceSource::Kline),
            other => Err(format!("unknown price source {:?} (expected ticker or kline)", other)),
        }
    }
}

/// How a decimal price string becomes the contract's integer price
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PriceScaling {
    /// Drop the decimal point and keep every digit. The integer's implied
    /// precision is whatever number of decimals the API returned.
    #[default]
    StripDecimalPoint,
    /// Multiply by `10^n`, truncating digits beyond `n` decimals
    FixedDecimals(u32),
}

impl FromStr for PriceScaling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s == "strip" {
            return Ok(PriceScaling::StripDecimalPoint);
        }
        let decimals = s
            .strip_prefix("fixed:")
            .ok_or_else(|| format!("unknown price scaling {:?} (expected strip or fixed:<decimals>)", s))?;
        let decimals: u32 = decimals
            .parse()
            .map_err(|_| format!("invalid decimal count {:?}", decimals))?;
        if decimals > MAX_FIXED_DECIMALS {
            return Err(format!("decimal count {} exceeds {}", decimals, MAX_FIXED_DECIMALS));
        }
        Ok(PriceScaling::FixedDecimals(decimals))
    }
}

impl fmt::Display for PriceScaling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceScaling::StripDecimalPoint => write!(f, "strip"),
            PriceScaling::FixedDecimals(n) => write!(f, "fixed:{}", n),
        }
    }
}

impl PriceScaling {
    pub fn scale(&self, raw: &str) -> OperatorResult<U256> {
        match self {
            PriceScaling::StripDecimalPoint => strip_decimal_point(raw),
            PriceScaling::FixedDecimals(n) => scale_fixed(raw, *n),
        }
    }
}

fn strip_decimal_point(raw: &str) -> OperatorResult<U256> {
    let raw = raw.trim();
    let points = raw.chars().filter(|c| *c == '.').count();
    let digits: String = raw.chars().filter(|c| *c != '.').collect();

    if points > 1 || digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(OperatorError::ResponseShape(format!("price {:?} is not a plain decimal", raw)));
    }

    U256::from_str_radix(&digits, 10)
        .map_err(|e| OperatorError::ResponseShape(format!("price {:?}: {}", raw, e)))
}

fn scale_fixed(raw: &str, decimals: u32) -> OperatorResult<U256> {
    let price = Decimal::from_str(raw.trim())
        .map_err(|e| OperatorError::ResponseShape(format!("price {:?}: {}", raw, e)))?;
    if price.is_sign_negative() {
        return Err(OperatorError::ResponseShape(format!("price {:?} is negative", raw)));
    }

    let factor = Decimal::from(10u64.pow(decimals));
    let scaled = price
        .checked_mul(factor)
        .ok_or_else(|| OperatorError::ResponseShape(format!("price {:?} overflows at {} decimals", raw, decimals)))?
        .trunc();

    scaled
        .to_u128()
        .map(U256::from)
        .ok_or_else(|| OperatorError::ResponseShape(format!("price {:?} out of range", raw)))
}

#[derive(Debug, Deserialize)]
struct TickerResponse {
    price: String,
}

/// Price API client over HTTP
pub struct HttpPriceFeed {
    client: reqwest::Client,
    ticker_url: String,
    klines_url: String,
}

impl HttpPriceFeed {
    pub fn new(ticker_url: &str, klines_url: &str) -> OperatorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| OperatorError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            ticker_url: ticker_url.to_string(),
            klines_url: klines_url.to_string(),
        })
    }

    async fn get_json(&self, url: &str, params: &[(&str, String)]) -> OperatorResult<serde_json::Value> {
        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| OperatorError::from_network_error(&e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(OperatorError::Http { status, body });
        }

        response
            .json()
            .await
            .map_err(|e| OperatorError::ResponseShape(format!("price response: {}", e)))
    }
}

#[async_trait]
impl PriceFeed for HttpPriceFeed {
    async fn ticker_price(&self, symbol: &str) -> OperatorResult<String> {
        let json = self
            .get_json(&self.ticker_url, &[("symbol", symbol.to_string())])
            .await?;
        debug!("Ticker response: {}", json);
        parse_ticker(json)
    }

    async fn kline_open_price(&self, symbol: &str, start_ms: u64) -> OperatorResult<String> {
        let end_ms = kline_end_time(start_ms)?;
        let params = [
            ("symbol", symbol.to_string()),
            ("interval", "1m".to_string()),
            ("limit", "1".to_string()),
            ("startTime", start_ms.to_string()),
            ("endTime", end_ms.to_string()),
        ];
        let json = self.get_json(&self.klines_url, &params).await?;
        debug!("Kline response: {}", json);
        parse_kline_open(&json)
    }
}

fn parse_ticker(json: serde_json::Value) -> OperatorResult<String> {
    serde_json::from_value::<TickerResponse>(json)
        .map(|t| t.price)
        .map_err(|e| OperatorError::ResponseShape(format!("ticker response: {}", e)))
}

fn parse_kline_open(json: &serde_json::Value) -> OperatorResult<String> {
    json.get(0)
        .and_then(|candle| candle.get(1))
        .and_then(|open| open.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| OperatorError::ResponseShape(format!("no candle open price in {}", json)))
}
