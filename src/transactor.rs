//! Transaction building, signing and submission
//!
//! Every state-changing call goes through the same sequence: fetch the
//! pending nonce, build a legacy EIP-155 transaction, sign it with the
//! operator key, broadcast, print the hash, then poll for the receipt.
//!
//! The nonce is fetched from the node before every transaction and never
//! cached. Correct sequencing relies on `submit` only returning once the
//! previous transaction is mined.

use crate::contract::ContractCall;
use crate::errors::{OperatorError, OperatorResult};
use crate::retry::{with_retry, RetryConfig};
use crate::rpc::{Node, TxReceipt};
use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, Bytes, TxKind, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Gas limit and price applied to a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasEnvelope {
    pub gas_limit: u64,
    pub gas_price_wei: u128,
}

/// Bounded receipt polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptWait {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for ReceiptWait {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Signed transaction ready for broadcast
#[derive(Debug, Clone)]
pub struct SignedTx {
    /// EIP-2718 encoded payload
    pub raw: Vec<u8>,
    pub hash: B256,
    pub nonce: u64,
}

/// A mined, successful transaction
#[derive(Debug, Clone)]
pub struct TxOutcome {
    pub label: &'static str,
    pub tx_hash: B256,
    pub nonce: u64,
    pub receipt: TxReceipt,
}

/// Submits contract calls from the operator account
pub struct Transactor {
    node: Arc<dyn Node>,
    signer: PrivateKeySigner,
    contract: Address,
    chain_id: u64,
    receipt_wait: ReceiptWait,
    retry: RetryConfig,
}

impl Transactor {
    /// Create a transactor, reading the chain id from the node
    pub async fn connect(
        node: Arc<dyn Node>,
        signer: PrivateKeySigner,
        contract: Address,
        receipt_wait: ReceiptWait,
        retry: RetryConfig,
    ) -> OperatorResult<Self> {
        let chain_id = with_retry(&retry, "eth_chainId", || node.chain_id()).await?;
        info!(
            "Connected: chain_id={} operator={:?} contract={:?}",
            chain_id,
            signer.address(),
            contract
        );

        Ok(Self {
            node,
            signer,
            contract,
            chain_id,
            receipt_wait,
            retry,
        })
    }

    pub fn operator(&self) -> Address {
        self.signer.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Pending-inclusive transaction count of the operator account
    pub async fn nonce(&self) -> OperatorResult<u64> {
        let operator = self.operator();
        with_retry(&self.retry, "eth_getTransactionCount", || {
            self.node.transaction_count(operator)
        })
        .await
    }

    /// Read-only call against the contract
    pub async fn read(&self, data: Bytes) -> OperatorResult<Bytes> {
        with_retry(&self.retry, "eth_call", || self.node.call(self.contract, &data)).await
    }

    /// Build and sign a transaction for `call` without sending it
    pub fn sign(&self, call: &ContractCall, gas: GasEnvelope, nonce: u64) -> OperatorResult<SignedTx> {
        let tx = TxLegacy {
            chain_id: Some(self.chain_id),
            nonce,
            gas_price: gas.gas_price_wei,
            gas_limit: gas.gas_limit,
            to: TxKind::Call(self.contract),
            value: call.value,
            input: call.calldata.clone(),
        };

        let signature = self
            .signer
            .sign_hash_sync(&tx.signature_hash())
            .map_err(|e| OperatorError::Signing(e.to_string()))?;
        let signed = tx.into_signed(signature);
        let hash = *signed.hash();
        let raw = TxEnvelope::Legacy(signed).encoded_2718();

        Ok(SignedTx { raw, hash, nonce })
    }

    /// Sign, broadcast and wait for `call` to be mined
    pub async fn submit(&self, call: &ContractCall, gas: GasEnvelope) -> OperatorResult<TxOutcome> {
        let nonce = self.nonce().await?;
        let signed = self.sign(call, gas, nonce)?;
        debug!(
            "{}: nonce={} gas_limit={} gas_price={} value={} raw_len={}",
            call.label,
            nonce,
            gas.gas_limit,
            gas.gas_price_wei,
            call.value,
            signed.raw.len()
        );

        let tx_hash = self.broadcast(call.label, &signed).await?;
        println!(
            "{} | {} Tx Hash = {:?}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.6f"),
            call.label,
            tx_hash
        );

        let receipt = self.wait_for_receipt(call.label, tx_hash).await?;
        if !receipt.succeeded() {
            return Err(OperatorError::Reverted {
                label: call.label.to_string(),
                tx_hash: format!("{:?}", tx_hash),
            });
        }

        info!(
            "{} mined: tx={:?} block={:?} gas_used={:?}",
            call.label, tx_hash, receipt.block_number, receipt.gas_used
        );

        Ok(TxOutcome {
            label: call.label,
            tx_hash,
            nonce,
            receipt,
        })
    }

    /// Broadcast a signed payload. Retries re-send the identical bytes, so a
    /// node that already holds the transaction counts as accepted.
    async fn broadcast(&self, label: &str, signed: &SignedTx) -> OperatorResult<B256> {
        let result = with_retry(&self.retry, "eth_sendRawTransaction", || {
            self.node.send_raw_transaction(&signed.raw)
        })
        .await;

        match result {
            Ok(hash) => {
                if hash != signed.hash {
                    warn!(
                        "{}: node reported hash {:?}, locally computed {:?}",
                        label, hash, signed.hash
                    );
                }
                Ok(hash)
            }
            Err(err) if err.is_already_known() => {
                info!("{}: node already knows tx {:?}", label, signed.hash);
                Ok(signed.hash)
            }
            Err(err) => Err(err),
        }
    }

    /// Poll for a receipt until the configured deadline
    pub async fn wait_for_receipt(&self, label: &str, tx_hash: B256) -> OperatorResult<TxReceipt> {
        let waited = self.receipt_wait.timeout;
        match tokio::time::timeout(waited, self.poll_receipt(label, tx_hash)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("{}: no receipt for {:?} after {:?}", label, tx_hash, waited);
                Err(OperatorError::Timeout {
                    label: label.to_string(),
                    tx_hash: format!("{:?}", tx_hash),
                    waited,
                })
            }
        }
    }

    async fn poll_receipt(&self, label: &str, tx_hash: B256) -> OperatorResult<TxReceipt> {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            let receipt = with_retry(&self.retry, "eth_getTransactionReceipt", || {
                self.node.transaction_receipt(tx_hash)
            })
            .await?;

            if let Some(receipt) = receipt {
                return Ok(receipt);
            }

            if attempt % 5 == 1 {
                debug!("{}: waiting for receipt of {:?}, poll {}", label, tx_hash, attempt);
            }
            sleep(self.receipt_wait.poll_interval).await;
        }
    }
}
