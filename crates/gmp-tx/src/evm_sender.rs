//! EVM transaction sender built on an alloy HTTP provider.
//!
//! - Sign with a local private key
//! - Broadcast `to`/`data` with recommended fillers (nonce, gas, chain id)
//! - Poll for the receipt until included or attempts run out

use std::time::Duration;

use alloy_network::{EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy_primitives::{Address, Bytes, B256};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types_eth::{TransactionReceipt, TransactionRequest};
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use gmp_types::{ChainConfig, RelayError, Result};

use crate::{TransactionSender, TxReceipt};

/// Signs and broadcasts transactions on one EVM chain.
pub struct EvmSender {
    provider: DynProvider,
    address: Address,
    confirmation_attempts: u32,
    confirmation_poll: Duration,
}

impl std::fmt::Debug for EvmSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmSender")
            .field("address", &self.address)
            .field("confirmation_attempts", &self.confirmation_attempts)
            .field("confirmation_poll", &self.confirmation_poll)
            .finish()
    }
}

impl EvmSender {
    pub fn new(
        rpc_url: &str,
        private_key: &str,
        confirmation_attempts: u32,
        confirmation_poll_ms: u64,
    ) -> Result<Self> {
        let url: Url = rpc_url
            .parse()
            .map_err(|e| RelayError::Config(format!("invalid rpc url {}: {}", rpc_url, e)))?;
        let signer: PrivateKeySigner = private_key
            .trim()
            .parse()
            .map_err(|e| RelayError::Config(format!("invalid private key: {}", e)))?;
        let address = signer.address();

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(url)
            .erased();

        Ok(Self {
            provider,
            address,
            confirmation_attempts: confirmation_attempts.max(1),
            confirmation_poll: Duration::from_millis(confirmation_poll_ms),
        })
    }

    /// Sender for `chain` using its RPC endpoint and confirmation settings.
    pub fn from_chain(chain: &ChainConfig, private_key: &str) -> Result<Self> {
        Self::new(
            &chain.rpc_url,
            private_key,
            chain.confirmation_attempts,
            chain.confirmation_poll_ms,
        )
    }

    /// Address of the signing account.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Poll for the receipt of `tx_hash`, waiting between attempts.
    pub async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TransactionReceipt> {
        for attempt in 0..self.confirmation_attempts {
            match self.provider.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => debug!(%tx_hash, attempt, "receipt not available yet"),
                Err(e) => warn!(%tx_hash, attempt, error = %e, "receipt lookup failed"),
            }
            if attempt + 1 < self.confirmation_attempts {
                tokio::time::sleep(self.confirmation_poll).await;
            }
        }
        Err(RelayError::Submission(format!(
            "transaction {} not confirmed after {} attempts",
            tx_hash, self.confirmation_attempts
        )))
    }
}

/// Parse a destination address.
pub fn parse_address(to: &str) -> Result<Address> {
    to.parse()
        .map_err(|e| RelayError::Submission(format!("invalid destination address {}: {}", to, e)))
}

#[async_trait]
impl TransactionSender for EvmSender {
    async fn send_transaction(&self, to: &str, data: &[u8]) -> Result<TxReceipt> {
        let to = parse_address(to)?;
        let tx = TransactionRequest::default()
            .with_from(self.address)
            .with_to(to)
            .with_input(Bytes::copy_from_slice(data));

        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|e| RelayError::Submission(format!("broadcast rejected: {}", e)))?;
        let tx_hash = *pending.tx_hash();
        info!(%tx_hash, %to, "transaction sent");

        let receipt = self.wait_for_receipt(tx_hash).await?;
        if !ReceiptResponse::status(&receipt) {
            return Err(RelayError::Submission(format!("transaction {} reverted", tx_hash)));
        }

        Ok(TxReceipt {
            tx_hash: tx_hash.to_string(),
            block_number: ReceiptResponse::block_number(&receipt),
        })
    }
}
