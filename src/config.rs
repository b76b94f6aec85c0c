//! Configuration management for the round operator
//!
//! Everything, secrets included, comes from the environment (optionally via
//! a `.env` file). Nothing is embedded in source.

use crate::errors::{OperatorError, OperatorResult};
use crate::price::{PriceScaling, PriceSource, DEFAULT_KLINES_URL, DEFAULT_TICKER_URL};
use crate::retry::RetryConfig;
use crate::transactor::{GasEnvelope, ReceiptWait};
use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const WEI_PER_GWEI: u64 = 1_000_000_000;

/// Default house bet: 0.01 native token
const DEFAULT_HOUSE_BET_WEI: u64 = 10_000_000_000_000_000;

/// Price fetching settings
#[derive(Debug, Clone)]
pub struct PriceConfig {
    pub source: PriceSource,
    pub ticker_url: String,
    pub klines_url: String,
    pub symbol: String,
    pub scaling: PriceScaling,
}

/// Operator configuration loaded from environment
#[derive(Clone)]
pub struct Config {
    /// Node JSON-RPC endpoint
    pub rpc_url: String,

    /// Operator key; the operator address is derived from it
    pub signer: PrivateKeySigner,

    /// Operator account address
    pub operator: Address,

    /// Prediction contract address
    pub contract: Address,

    pub price: PriceConfig,

    /// Gas limit/price for genesis transactions
    pub genesis_gas: GasEnvelope,

    /// Gas limit/price for round execution and house bets
    pub round_gas: GasEnvelope,

    /// Start-time argument passed to `genesisCreateRound`
    pub genesis_start_offset: U256,

    /// Pause between executing a round and reading the new round id
    pub settle_delay: Duration,

    /// Value attached to each house bet, in wei
    pub house_bet_wei: U256,

    pub receipt: ReceiptWait,

    pub retry: RetryConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("rpc_url", &self.rpc_url)
            .field("signer", &"<redacted>")
            .field("operator", &self.operator)
            .field("contract", &self.contract)
            .field("price", &self.price)
            .field("genesis_gas", &self.genesis_gas)
            .field("round_gas", &self.round_gas)
            .field("genesis_start_offset", &self.genesis_start_offset)
            .field("settle_delay", &self.settle_delay)
            .field("house_bet_wei", &self.house_bet_wei)
            .field("receipt", &self.receipt)
            .field("retry", &self.retry)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> OperatorResult<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> OperatorResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| get(key).ok_or_else(|| missing(key));

        let rpc_url = required("RPC_URL")?;
        if !(rpc_url.starts_with("http://") || rpc_url.starts_with("https://")) {
            return Err(invalid("RPC_URL", "must be an http(s) URL"));
        }

        let signer: PrivateKeySigner = required("OPERATOR_PRIVATE_KEY")?
            .parse()
            .map_err(|_| invalid("OPERATOR_PRIVATE_KEY", "not a valid secp256k1 private key"))?;
        let operator = signer.address();

        if let Some(configured) = get("OPERATOR_ADDRESS") {
            let configured: Address = configured
                .parse()
                .map_err(|_| invalid("OPERATOR_ADDRESS", "not a valid address"))?;
            if configured != operator {
                return Err(invalid(
                    "OPERATOR_ADDRESS",
                    &format!("{:?} does not match the private key's address {:?}", configured, operator),
                ));
            }
        }

        let contract: Address = required("PREDICTION_CONTRACT")?
            .parse()
            .map_err(|_| invalid("PREDICTION_CONTRACT", "not a valid address"))?;

        let price = PriceConfig {
            source: parse_or("PRICE_SOURCE", get("PRICE_SOURCE"), PriceSource::Ticker)?,
            ticker_url: get("PRICE_URL").unwrap_or_else(|| DEFAULT_TICKER_URL.to_string()),
            klines_url: get("KLINES_URL").unwrap_or_else(|| DEFAULT_KLINES_URL.to_string()),
            symbol: get("PRICE_SYMBOL").unwrap_or_else(|| "BTCUSDT".to_string()),
            scaling: parse_or("PRICE_SCALING", get("PRICE_SCALING"), PriceScaling::default())?,
        };

        let genesis_gas = GasEnvelope {
            gas_limit: parse_or("GENESIS_GAS_LIMIT", get("GENESIS_GAS_LIMIT"), 100_000)?,
            gas_price_wei: gwei_or("GENESIS_GAS_PRICE_GWEI", get("GENESIS_GAS_PRICE_GWEI"), 10)?,
        };

        let round_gas = GasEnvelope {
            gas_limit: parse_or("ROUND_GAS_LIMIT", get("ROUND_GAS_LIMIT"), 500_000)?,
            gas_price_wei: gwei_or("ROUND_GAS_PRICE_GWEI", get("ROUND_GAS_PRICE_GWEI"), 50)?,
        };

        let genesis_start_offset = u256_or("GENESIS_START_OFFSET", get("GENESIS_START_OFFSET"), U256::from(1000))?;

        let settle_delay = Duration::from_secs(parse_or(
            "ROUND_SETTLE_DELAY_SECS",
            get("ROUND_SETTLE_DELAY_SECS"),
            10,
        )?);

        let house_bet_wei = u256_or("HOUSE_BET_WEI", get("HOUSE_BET_WEI"), U256::from(DEFAULT_HOUSE_BET_WEI))?;

        let receipt = ReceiptWait {
            poll_interval: Duration::from_millis(parse_or(
                "RECEIPT_POLL_INTERVAL_MS",
                get("RECEIPT_POLL_INTERVAL_MS"),
                2000,
            )?),
            timeout: Duration::from_secs(parse_or("RECEIPT_TIMEOUT_SECS", get("RECEIPT_TIMEOUT_SECS"), 300)?),
        };
        if receipt.poll_interval.is_zero() {
            return Err(invalid("RECEIPT_POLL_INTERVAL_MS", "must be greater than zero"));
        }
        if receipt.timeout.is_zero() {
            return Err(invalid("RECEIPT_TIMEOUT_SECS", "must be greater than zero"));
        }

        let retry = RetryConfig {
            max_attempts: parse_or("RETRY_MAX_ATTEMPTS", get("RETRY_MAX_ATTEMPTS"), 3)?,
            ..Default::default()
        };
        if retry.max_attempts == 0 {
            return Err(invalid("RETRY_MAX_ATTEMPTS", "must be at least 1"));
        }

        Ok(Self {
            rpc_url,
            signer,
            operator,
            contract,
            price,
            genesis_gas,
            round_gas,
            genesis_start_offset,
            settle_delay,
            house_bet_wei,
            receipt,
            retry,
        })
    }
}

fn missing(key: &str) -> OperatorError {
    OperatorError::Config(format!("{} is required", key))
}

fn invalid(key: &str, reason: &str) -> OperatorError {
    OperatorError::Config(format!("{}: {}", key, reason))
}

fn parse_or<T>(key: &str, value: Option<String>, default: T) -> OperatorResult<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match value {
        Some(v) => v.parse().map_err(|e: T::Err| invalid(key, &e.to_string())),
        None => Ok(default),
    }
}

fn u256_or(key: &str, value: Option<String>, default: U256) -> OperatorResult<U256> {
    match value {
        Some(v) => U256::from_str_radix(&v, 10).map_err(|e| invalid(key, &e.to_string())),
        None => Ok(default),
    }
}

/// Gas price given in (possibly fractional) gwei, returned in wei
fn gwei_or(key: &str, value: Option<String>, default_gwei: u64) -> OperatorResult<u128> {
    let gwei = match value {
        Some(v) => Decimal::from_str(&v).map_err(|e| invalid(key, &e.to_string()))?,
        None => Decimal::from(default_gwei),
    };
    if gwei.is_sign_negative() {
        return Err(invalid(key, "must not be negative"));
    }
    gwei.checked_mul(Decimal::from(WEI_PER_GWEI))
        .and_then(|wei| wei.trunc().to_u128())
        .ok_or_else(|| invalid(key, "out of range"))
}
