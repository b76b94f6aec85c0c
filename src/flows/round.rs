//! Round execution and house betting
//!
//! Fetch the settlement price, execute the round, wait a fixed settle delay,
//! read `currentRoundId()` and place one bull and one bear house bet on the
//! next round. Each transaction is mined before the next nonce is fetched.
//!
//! The `+1` assumes the contract advances round ids by exactly one per
//! execution and that the next round is open for betting by the time the
//! settle delay has passed. Neither is checked here.

use crate::config::PriceConfig;
use crate::contract::{self, ContractCall};
use crate::errors::{OperatorError, OperatorResult};
use crate::price::{kline_end_time, PriceFeed, PriceSource};
use crate::retry::with_retry;
use crate::transactor::{GasEnvelope, Transactor, TxOutcome};
use alloy::primitives::{I256, U256};
use std::time::Duration;
use tracing::{info, warn};

/// Per-run round parameters
#[derive(Debug, Clone)]
pub struct RoundPlan {
    pub gas: GasEnvelope,
    pub settle_delay: Duration,
    pub house_bet_wei: U256,
    /// Skip the run when the current round has not reached its end timestamp
    pub require_round_ended: bool,
    pub skip_house_bets: bool,
}

/// Price as returned by the API and as sent to the contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementPrice {
    pub raw: String,
    pub scaled: U256,
}

#[derive(Debug, Clone)]
pub struct HouseBets {
    pub round_id: U256,
    pub bull: TxOutcome,
    pub bear: TxOutcome,
}

#[derive(Debug, Clone)]
pub enum RoundReport {
    /// Current round has not ended; nothing was broadcast
    NotDue { round_end: U256, now: u64 },
    Executed {
        price: SettlementPrice,
        execute: TxOutcome,
        house_bets: Option<HouseBets>,
    },
}

/// Fetch and scale the price the round is settled with
pub async fn fetch_settlement_price(
    transactor: &Transactor,
    feed: &dyn PriceFeed,
    price: &PriceConfig,
) -> OperatorResult<SettlementPrice> {
    let retry = transactor.retry();
    let raw = match price.source {
        PriceSource::Ticker => {
            with_retry(retry, "ticker price", || feed.ticker_price(&price.symbol)).await?
        }
        PriceSource::Kline => {
            let round_end = read_current_round_end(transactor).await?;
            let start_ms = round_end
                .checked_mul(U256::from(1000))
                .and_then(|ms| u64::try_from(ms).ok())
                .filter(|ms| kline_end_time(*ms).is_ok())
                .ok_or_else(|| {
                    OperatorError::ResponseShape(format!("round end timestamp {} out of range", round_end))
                })?;
            with_retry(retry, "kline price", || feed.kline_open_price(&price.symbol, start_ms)).await?
        }
    };

    let scaled = price.scaling.scale(&raw)?;
    info!(
        "Price {} = {} (scaled {} with {})",
        price.symbol, raw, scaled, price.scaling
    );
    Ok(SettlementPrice { raw, scaled })
}

pub async fn read_current_round_id(transactor: &Transactor) -> OperatorResult<U256> {
    let output = transactor.read(contract::current_round_id_calldata()).await?;
    contract::decode_current_round_id(&output)
}

pub async fn read_current_round_end(transactor: &Transactor) -> OperatorResult<U256> {
    let output = transactor.read(contract::current_round_end_calldata()).await?;
    contract::decode_current_round_end(&output)
}

pub async fn run_round(
    transactor: &Transactor,
    feed: &dyn PriceFeed,
    price_config: &PriceConfig,
    plan: &RoundPlan,
) -> OperatorResult<RoundReport> {
    if plan.require_round_ended {
        let round_end = read_current_round_end(transactor).await?;
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        if round_end > U256::from(now) {
            info!("Round not due: ends at {}, now {}", round_end, now);
            return Ok(RoundReport::NotDue { round_end, now });
        }
    }

    // 1. Execute the round with the fetched price
    let price = fetch_settlement_price(transactor, feed, price_config).await?;
    if price.scaled > I256::MAX.into_raw() {
        return Err(OperatorError::ResponseShape(format!(
            "price {} does not fit int256",
            price.scaled
        )));
    }
    let contract_price = I256::from_raw(price.scaled);
    let execute = transactor
        .submit(&ContractCall::execute_round(contract_price), plan.gas)
        .await?;

    if plan.skip_house_bets {
        info!("House bets skipped");
        return Ok(RoundReport::Executed {
            price,
            execute,
            house_bets: None,
        });
    }

    // 2. Let contract state settle
    if !plan.settle_delay.is_zero() {
        info!("Waiting {:?} before house bets", plan.settle_delay);
        tokio::time::sleep(plan.settle_delay).await;
    }

    // 3. Both bets target the round after the current one
    let current = read_current_round_id(transactor).await?;
    let round_id = contract::next_round_id(current)?;
    info!("Current round {}, placing house bets on {}", current, round_id);

    // 4-5. Bull then bear
    let bull = transactor
        .submit(&ContractCall::bet_bull(round_id, plan.house_bet_wei), plan.gas)
        .await?;
    let bear = match transactor
        .submit(&ContractCall::bet_bear(round_id, plan.house_bet_wei), plan.gas)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(
                "Round {} has a house bull bet ({:?}) but no bear bet",
                round_id, bull.tx_hash
            );
            return Err(e);
        }
    };

    Ok(RoundReport::Executed {
        price,
        execute,
        house_bets: Some(HouseBets { round_id, bull, bear }),
    })
}
