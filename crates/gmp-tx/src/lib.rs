//! Chain submission for the GMP relayer.
//!
//! - Dry run: log the intended transaction and report it confirmed
//! - Live: sign and broadcast through a `TransactionSender`, wait for the
//!   receipt, then fire the completion callback

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use gmp_types::{bytes_to_hex, ChainConfig, Hex, RelayError, Result};

pub mod evm_sender;

pub use evm_sender::EvmSender;

/// Inclusion receipt of a relayed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: Hex,
    pub block_number: Option<u64>,
}

/// Outcome of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Logged only; nothing was broadcast.
    DryRun,
    /// Broadcast and included on the destination chain.
    Confirmed(TxReceipt),
}

impl Submission {
    pub fn tx_hash(&self) -> Option<&str> {
        match self {
            Submission::DryRun => None,
            Submission::Confirmed(receipt) => Some(&receipt.tx_hash),
        }
    }
}

/// Sign-and-send capability for one destination chain.
///
/// Implementations return only once the transaction is included, or fail
/// with `RelayError::Submission`.
#[async_trait]
pub trait TransactionSender: Send + Sync {
    async fn send_transaction(&self, to: &str, data: &[u8]) -> Result<TxReceipt>;
}

/// Submits relay transactions to one chain.
pub struct ChainSubmitter {
    chain: String,
    dry_run: bool,
    sender: Option<Arc<dyn TransactionSender>>,
}

impl ChainSubmitter {
    /// Live mode requires a sender; dry run ignores it.
    pub fn new(
        chain: &ChainConfig,
        dry_run: bool,
        sender: Option<Arc<dyn TransactionSender>>,
    ) -> Result<Self> {
        if !dry_run && sender.is_none() {
            return Err(RelayError::Config(format!(
                "chain {} is live but has no transaction sender",
                chain.name
            )));
        }
        Ok(Self {
            chain: chain.name.clone(),
            dry_run,
            sender,
        })
    }

    pub fn dry_run(chain: &ChainConfig) -> Self {
        Self { chain: chain.name.clone(), dry_run: true, sender: None }
    }

    pub fn live(chain: &ChainConfig, sender: Arc<dyn TransactionSender>) -> Self {
        Self { chain: chain.name.clone(), dry_run: false, sender: Some(sender) }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Send `payload` as call data to `destination`.
    ///
    /// `on_confirmed` runs exactly once, after confirmation (or immediately in
    /// dry run), and never on failure.
    pub async fn submit<F>(
        &self,
        destination: &str,
        payload: &[u8],
        on_confirmed: F,
    ) -> Result<Submission>
    where
        F: FnOnce() + Send,
    {
        if self.dry_run {
            info!(
                chain = %self.chain,
                destination,
                payload = %bytes_to_hex(payload),
                "dry run: skipping broadcast"
            );
            on_confirmed();
            return Ok(Submission::DryRun);
        }

        let sender = self.sender.as_ref().ok_or_else(|| {
            RelayError::Config(format!("chain {} has no transaction sender", self.chain))
        })?;

        info!(chain = %self.chain, destination, bytes = payload.len(), "relaying payload");
        let receipt = sender.send_transaction(destination, payload).await?;
        info!(
            chain = %self.chain,
            tx_hash = %receipt.tx_hash,
            block = ?receipt.block_number,
            "transaction confirmed"
        );

        on_confirmed();
        Ok(Submission::Confirmed(receipt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, Vec<u8>)>>,
        fail: bool,
    }

    #[async_trait]
    impl TransactionSender for RecordingSender {
        async fn send_transaction(&self, to: &str, data: &[u8]) -> Result<TxReceipt> {
            self.sent.lock().unwrap().push((to.to_string(), data.to_vec()));
            if self.fail {
                return Err(RelayError::Submission("nonce too low".into()));
            }
            Ok(TxReceipt { tx_hash: "0x01".into(), block_number: Some(7) })
        }
    }

    fn chain() -> ChainConfig {
        ChainConfig::new("ethereum", "http://localhost:8545", "0xgateway")
    }

    #[tokio::test]
    async fn test_dry_run_never_touches_sender() {
        let sender = Arc::new(RecordingSender::default());
        let submitter = ChainSubmitter::new(&chain(), true, Some(sender.clone())).unwrap();
        let calls = AtomicUsize::new(0);

        let outcome = submitter
            .submit("0xdead", &[0xcd], || {
                calls.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();

        assert_eq!(outcome, Submission::DryRun);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_live_sends_then_confirms() {
        let sender = Arc::new(RecordingSender::default());
        let submitter = ChainSubmitter::live(&chain(), sender.clone());
        let calls = AtomicUsize::new(0);

        let outcome = submitter
            .submit("0xgateway", &[0xab], || {
                calls.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();

        assert_eq!(outcome.tx_hash(), Some("0x01"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            sender.sent.lock().unwrap().as_slice(),
            &[("0xgateway".to_string(), vec![0xab])]
        );
    }

    #[tokio::test]
    async fn test_failed_send_skips_callback() {
        let sender = Arc::new(RecordingSender { fail: true, ..Default::default() });
        let submitter = ChainSubmitter::live(&chain(), sender);
        let calls = AtomicUsize::new(0);

        let err = submitter
            .submit("0xgateway", &[0xab], || {
                calls.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::Submission(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_live_without_sender_is_rejected() {
        assert!(matches!(
            ChainSubmitter::new(&chain(), false, None),
            Err(RelayError::Config(_))
        ));
        assert!(ChainSubmitter::new(&chain(), true, None).unwrap().is_dry_run());
    }
}
