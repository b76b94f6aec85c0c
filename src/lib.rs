//! Prediction Round Operator Library
//!
//! Drives the round lifecycle of a prediction-market contract from the
//! operator account:
//!
//! 1. **Genesis**: create and then start the contract's first round.
//! 2. **Round**: settle the current round with an externally fetched price,
//!    then seed the next round with one bull and one bear house bet.
//!
//! Each run is a short sequence of fetch nonce → sign → broadcast → wait for
//! receipt steps. The contract, node and price API are external.

pub mod config;
pub mod contract;
pub mod errors;
pub mod flows;
pub mod price;
pub mod retry;
pub mod rpc;
pub mod transactor;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{Config, PriceConfig};
pub use errors::{OperatorError, OperatorResult};
pub use flows::{run_genesis, run_round, GenesisReport, RoundPlan, RoundReport};
pub use price::{HttpPriceFeed, PriceFeed, PriceScaling, PriceSource};
pub use rpc::{JsonRpcNode, Node};
pub use transactor::{GasEnvelope, ReceiptWait, Transactor, TxOutcome};
