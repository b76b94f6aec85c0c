//! Genesis round bootstrap
//!
//! Two dependent transactions: `genesisCreateRound(startTime)` then
//! `genesisStartRound()`, each awaited to a successful receipt before the
//! next step. There is no local idempotence guard; running this against a
//! contract that already ran genesis fails with a revert from the contract.

use crate::contract::ContractCall;
use crate::errors::OperatorResult;
use crate::transactor::{GasEnvelope, Transactor, TxOutcome};
use alloy::primitives::U256;
use tracing::{error, info};

/// Contract-side genesis progress, as confirmed by receipts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenesisState {
    Created,
    Started,
}

#[derive(Debug, Clone)]
pub struct GenesisReport {
    pub create: TxOutcome,
    pub start: TxOutcome,
}

pub async fn run_genesis(
    transactor: &Transactor,
    gas: GasEnvelope,
    start_offset: U256,
) -> OperatorResult<GenesisReport> {
    info!("Genesis: creating round with start offset {}", start_offset);
    let create = transactor
        .submit(&ContractCall::genesis_create_round(start_offset), gas)
        .await?;
    info!("Genesis: {:?} (tx {:?})", GenesisState::Created, create.tx_hash);

    let start = match transactor.submit(&ContractCall::genesis_start_round(), gas).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(
                "Genesis round created by {:?} but not started: {}",
                create.tx_hash, e
            );
            return Err(e);
        }
    };
    info!("Genesis: {:?} (tx {:?})", GenesisState::Started, start.tx_hash);

    Ok(GenesisReport { create, start })
}
