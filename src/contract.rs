//! Prediction contract call surface
//!
//! The contract is an opaque remote procedure surface: this module only
//! ABI-encodes the calls the operator makes and decodes the two views it reads.

use crate::errors::{OperatorError, OperatorResult};
use alloy::primitives::{Bytes, I256, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

// Prediction contract function signatures for ABI encoding
sol! {
    function genesisCreateRound(uint256 startTime) external;
    function genesisStartRound() external;
    function executeRound(int256 price) external;
    function betBull(uint256 roundId) external payable;
    function betBear(uint256 roundId) external payable;

    function currentRoundId() external view returns (uint256);
    function getCurrentRoundEndTimestamp() external view returns (uint256);
}

/// A state-changing contract call, ready to be wrapped in a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    /// Label printed next to the transaction hash
    pub label: &'static str,
    /// ABI-encoded calldata (selector + arguments)
    pub calldata: Bytes,
    /// Value attached to the transaction, in wei
    pub value: U256,
}

impl ContractCall {
    fn new<C: SolCall>(label: &'static str, call: C, value: U256) -> Self {
        Self {
            label,
            calldata: Bytes::from(call.abi_encode()),
            value,
        }
    }

    pub fn genesis_create_round(start_time: U256) -> Self {
        Self::new("Genesis Create", genesisCreateRoundCall { startTime: start_time }, U256::ZERO)
    }

    pub fn genesis_start_round() -> Self {
        Self::new("Genesis Start", genesisStartRoundCall {}, U256::ZERO)
    }

    pub fn execute_round(price: I256) -> Self {
        Self::new("Execute Round", executeRoundCall { price }, U256::ZERO)
    }

    /// House bet on the bull side; payable
    pub fn bet_bull(round_id: U256, value: U256) -> Self {
        Self::new("House BetBull", betBullCall { roundId: round_id }, value)
    }

    /// House bet on the bear side; payable
    pub fn bet_bear(round_id: U256, value: U256) -> Self {
        Self::new("House BetBear", betBearCall { roundId: round_id }, value)
    }
}

pub fn current_round_id_calldata() -> Bytes {
    Bytes::from(currentRoundIdCall {}.abi_encode())
}

pub fn current_round_end_calldata() -> Bytes {
    Bytes::from(getCurrentRoundEndTimestampCall {}.abi_encode())
}

pub fn decode_current_round_id(output: &[u8]) -> OperatorResult<U256> {
    currentRoundIdCall::abi_decode_returns(output)
        .map_err(|e| OperatorError::ResponseShape(format!("currentRoundId() output: {}", e)))
}

pub fn decode_current_round_end(output: &[u8]) -> OperatorResult<U256> {
    getCurrentRoundEndTimestampCall::abi_decode_returns(output).map_err(|e| {
        OperatorError::ResponseShape(format!("getCurrentRoundEndTimestamp() output: {}", e))
    })
}

/// Round the house bets target: the one after the round currently being played
pub fn next_round_id(current: U256) -> OperatorResult<U256> {
    current
        .checked_add(U256::from(1))
        .ok_or_else(|| OperatorError::ResponseShape("currentRoundId() is at U256::MAX".to_string()))
}
