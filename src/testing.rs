//! Scripted in-memory collaborators for tests
//!
//! `MockNode` decodes every signed raw transaction and enforces strict
//! sequencing: a broadcast must use the confirmed transaction count as its
//! nonce, and is refused while another operator transaction is unmined.
//! The reported transaction count only advances when a receipt is produced.

use crate::contract::{
    betBearCall, betBullCall, currentRoundIdCall, executeRoundCall, genesisCreateRoundCall,
    genesisStartRoundCall, getCurrentRoundEndTimestampCall,
};
use crate::errors::{OperatorError, OperatorResult};
use crate::price::PriceFeed;
use crate::rpc::{Node, TxReceipt};
use alloy::consensus::TxEnvelope;
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{address, Address, Bytes, B256, I256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

pub const CONTRACT: Address = address!("5fd735492e5eb7f023effb885b2c6344b3d0402a");

const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub fn dev_signer() -> PrivateKeySigner {
    DEV_KEY.parse().unwrap()
}

/// A decoded contract call seen by the mock node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    GenesisCreateRound(U256),
    GenesisStartRound,
    ExecuteRound(I256),
    BetBull(U256),
    BetBear(U256),
}

impl MockCall {
    fn decode(input: &[u8]) -> Option<Self> {
        let selector = input.get(..4)?;
        if selector == genesisCreateRoundCall::SELECTOR {
            genesisCreateRoundCall::abi_decode(input)
                .ok()
                .map(|c| MockCall::GenesisCreateRound(c.startTime))
        } else if selector == genesisStartRoundCall::SELECTOR {
            Some(MockCall::GenesisStartRound)
        } else if selector == executeRoundCall::SELECTOR {
            executeRoundCall::abi_decode(input).ok().map(|c| MockCall::ExecuteRound(c.price))
        } else if selector == betBullCall::SELECTOR {
            betBullCall::abi_decode(input).ok().map(|c| MockCall::BetBull(c.roundId))
        } else if selector == betBearCall::SELECTOR {
            betBearCall::abi_decode(input).ok().map(|c| MockCall::BetBear(c.roundId))
        } else {
            None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MockCall::GenesisCreateRound(_) => "genesisCreateRound",
            MockCall::GenesisStartRound => "genesisStartRound",
            MockCall::ExecuteRound(_) => "executeRound",
            MockCall::BetBull(_) => "betBull",
            MockCall::BetBear(_) => "betBear",
        }
    }
}

/// Observable node activity, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    Broadcast { call: MockCall, nonce: u64, value: U256 },
    Mined { call: MockCall, nonce: u64 },
    Read(&'static str),
}

struct PendingTx {
    hash: B256,
    call: MockCall,
    nonce: u64,
    polls_left: u32,
}

#[derive(Default)]
struct MockState {
    confirmed: u64,
    pending: Vec<PendingTx>,
    receipts: HashMap<B256, TxReceipt>,
    events: Vec<NodeEvent>,
    receipt_polls: u32,
    genesis_created: bool,
}

pub struct MockNode {
    chain_id: u64,
    current_round_id: U256,
    current_round_end: U256,
    mining_delay: u32,
    never_mine: bool,
    revert_fn: Option<&'static str>,
    broadcast_error: Option<String>,
    state: Mutex<MockState>,
}

impl MockNode {
    pub fn new() -> Self {
        Self {
            chain_id: 1337,
            current_round_id: U256::ZERO,
            current_round_end: U256::ZERO,
            mining_delay: 0,
            never_mine: false,
            revert_fn: None,
            broadcast_error: None,
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn with_current_round_id(mut self, id: u64) -> Self {
        self.current_round_id = U256::from(id);
        self
    }

    pub fn with_current_round_end(mut self, timestamp: u64) -> Self {
        self.current_round_end = U256::from(timestamp);
        self
    }

    /// Number of empty receipt polls before each transaction is mined
    pub fn with_mining_delay(mut self, polls: u32) -> Self {
        self.mining_delay = polls;
        self
    }

    pub fn never_mining(mut self) -> Self {
        self.never_mine = true;
        self
    }

    /// Mine calls to `function` with a failed status
    pub fn reverting(mut self, function: &'static str) -> Self {
        self.revert_fn = Some(function);
        self
    }

    pub fn rejecting_broadcast(mut self, message: &str) -> Self {
        self.broadcast_error = Some(message.to_string());
        self
    }

    pub fn events(&self) -> Vec<NodeEvent> {
        self.state.lock().unwrap().events.clone()
    }

    /// Broadcast calls, in order
    pub fn broadcasts(&self) -> Vec<(MockCall, u64, U256)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                NodeEvent::Broadcast { call, nonce, value } => Some((call, nonce, value)),
                _ => None,
            })
            .collect()
    }

    pub fn receipt_polls(&self) -> u32 {
        self.state.lock().unwrap().receipt_polls
    }

    pub fn confirmed_count(&self) -> u64 {
        self.state.lock().unwrap().confirmed
    }

    fn rpc_error(message: &str) -> OperatorError {
        OperatorError::Rpc {
            code: -32000,
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl Node for MockNode {
    async fn chain_id(&self) -> OperatorResult<u64> {
        Ok(self.chain_id)
    }

    async fn transaction_count(&self, _address: Address) -> OperatorResult<u64> {
        Ok(self.state.lock().unwrap().confirmed)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> OperatorResult<B256> {
        if let Some(message) = &self.broadcast_error {
            return Err(Self::rpc_error(message));
        }

        let envelope = TxEnvelope::decode_2718(&mut &raw[..])
            .map_err(|e| Self::rpc_error(&format!("rlp: {}", e)))?;
        let legacy = envelope
            .as_legacy()
            .ok_or_else(|| Self::rpc_error("expected legacy transaction"))?;
        let tx = legacy.tx();
        if tx.chain_id != Some(self.chain_id) {
            return Err(Self::rpc_error("invalid chain id"));
        }
        let call = MockCall::decode(&tx.input)
            .ok_or_else(|| Self::rpc_error("execution reverted: unknown selector"))?;

        let mut state = self.state.lock().unwrap();
        if !state.pending.is_empty() {
            return Err(Self::rpc_error("operator has an unmined transaction"));
        }
        if tx.nonce < state.confirmed {
            return Err(Self::rpc_error("nonce too low"));
        }
        if tx.nonce > state.confirmed {
            return Err(Self::rpc_error("nonce too high"));
        }
        if call == MockCall::GenesisStartRound && !state.genesis_created {
            return Err(Self::rpc_error("execution reverted: genesis round not created"));
        }

        let hash = *legacy.hash();
        state.events.push(NodeEvent::Broadcast {
            call: call.clone(),
            nonce: tx.nonce,
            value: tx.value,
        });
        state.pending.push(PendingTx {
            hash,
            call,
            nonce: tx.nonce,
            polls_left: self.mining_delay,
        });
        Ok(hash)
    }

    async fn transaction_receipt(&self, hash: B256) -> OperatorResult<Option<TxReceipt>> {
        let mut state = self.state.lock().unwrap();
        state.receipt_polls += 1;

        if let Some(receipt) = state.receipts.get(&hash) {
            return Ok(Some(receipt.clone()));
        }
        let Some(index) = state.pending.iter().position(|p| p.hash == hash) else {
            return Ok(None);
        };
        if self.never_mine {
            return Ok(None);
        }
        if state.pending[index].polls_left > 0 {
            state.pending[index].polls_left -= 1;
            return Ok(None);
        }

        let mined = state.pending.remove(index);
        let success = self.revert_fn != Some(mined.call.name());
        state.confirmed += 1;
        if success && matches!(mined.call, MockCall::GenesisCreateRound(_)) {
            state.genesis_created = true;
        }
        state.events.push(NodeEvent::Mined {
            call: mined.call,
            nonce: mined.nonce,
        });

        let receipt = TxReceipt {
            transaction_hash: hash,
            block_number: Some(state.confirmed),
            status: Some(success),
            gas_used: Some(21_000),
        };
        state.receipts.insert(hash, receipt.clone());
        Ok(Some(receipt))
    }

    async fn call(&self, to: Address, data: &[u8]) -> OperatorResult<Bytes> {
        if to != CONTRACT {
            return Err(Self::rpc_error("execution reverted"));
        }
        let selector = data.get(..4).ok_or_else(|| Self::rpc_error("execution reverted"))?;
        let (name, value) = if selector == currentRoundIdCall::SELECTOR {
            ("currentRoundId", self.current_round_id)
        } else if selector == getCurrentRoundEndTimestampCall::SELECTOR {
            ("getCurrentRoundEndTimestamp", self.current_round_end)
        } else {
            return Err(Self::rpc_error("execution reverted"));
        };
        self.state.lock().unwrap().events.push(NodeEvent::Read(name));
        Ok(Bytes::from(value.to_be_bytes::<32>().to_vec()))
    }
}

/// Price feed returning fixed answers and recording requests
pub struct MockPriceFeed {
    ticker: OperatorResult<String>,
    kline: OperatorResult<String>,
    requests: Mutex<Vec<(String, Option<u64>)>>,
}

impl MockPriceFeed {
    pub fn ticker(price: &str) -> Self {
        Self {
            ticker: Ok(price.to_string()),
            kline: Err(OperatorError::Http { status: 404, body: "no klines".into() }),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn kline(price: &str) -> Self {
        Self {
            ticker: Err(OperatorError::Http { status: 404, body: "no ticker".into() }),
            kline: Ok(price.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(err: OperatorError) -> Self {
        Self {
            ticker: Err(err.clone()),
            kline: Err(err),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// `(symbol, kline start ms)` per request
    pub fn requests(&self) -> Vec<(String, Option<u64>)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PriceFeed for MockPriceFeed {
    async fn ticker_price(&self, symbol: &str) -> OperatorResult<String> {
        self.requests.lock().unwrap().push((symbol.to_string(), None));
        self.ticker.clone()
    }

    async fn kline_open_price(&self, symbol: &str, start_ms: u64) -> OperatorResult<String> {
        self.requests.lock().unwrap().push((symbol.to_string(), Some(start_ms)));
        self.kline.clone()
    }
}
