use std::future::Future;
use std::time::Duration;

use anchor_lang::prelude::Pubkey;
use solana_sdk::hash::Hash;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use tracing::debug;

use crate::BALANCE_RETRY_STEP_MS;

/// Provider failures, already sorted into the classes the controller reacts
/// to differently.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The provider is throttling us (HTTP 429 and friends).
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// The account does not exist or its data is not what we expect.
    #[error("account not found: {0}")]
    NotFound(String),
    /// The transaction landed and the program rejected it.
    #[error("transaction failed: {0}")]
    Execution(String),
    #[error("{0}")]
    Other(String),
}

impl LedgerError {
    /// Sort a provider message into a class by the markers RPC nodes put in
    /// their error text.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        if is_rate_limited(&message) {
            Self::RateLimited(message)
        } else if is_account_missing(&message) {
            Self::NotFound(message)
        } else {
            Self::Other(message)
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::RateLimited(m) | Self::NotFound(m) | Self::Execution(m) | Self::Other(m) => m,
        }
    }
}

pub fn is_rate_limited(message: &str) -> bool {
    message.contains("429")
        || message.contains("Too Many Requests")
        || message.contains("Too many requests")
        || message.contains("rate limit")
}

pub fn is_account_missing(message: &str) -> bool {
    message.contains("Account does not exist")
        || message.contains("no data")
        || message.contains("Trying to access beyond buffer length")
        || message.contains("Invalid account data")
        || message.contains("could not find account")
}

/// The slice of a Solana RPC provider the controller depends on.
pub trait Ledger: Send + Sync + 'static {
    /// Raw account data, `None` when the account does not exist.
    fn account_data(
        &self,
        address: &Pubkey,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, LedgerError>> + Send;

    /// Token amount held by an SPL token account, `None` when the account
    /// does not exist.
    fn token_balance(
        &self,
        token_account: &Pubkey,
    ) -> impl Future<Output = Result<Option<u64>, LedgerError>> + Send;

    fn latest_blockhash(&self) -> impl Future<Output = Result<Hash, LedgerError>> + Send;

    /// Submit a signed transaction (with preflight) and return its signature.
    fn send_transaction(
        &self,
        transaction: &Transaction,
    ) -> impl Future<Output = Result<Signature, LedgerError>> + Send;

    /// Wait until the transaction reaches the provider's commitment.
    /// [`LedgerError::Execution`] means it landed and failed.
    fn confirm(&self, signature: &Signature) -> impl Future<Output = Result<(), LedgerError>> + Send;
}

/// Run `op` up to `attempts` times, sleeping 1s, 2s, ... between tries, but
/// only while it fails with [`LedgerError::RateLimited`].
pub async fn with_rate_limit_retries<T, F, Fut>(attempts: u32, mut op: F) -> Result<T, LedgerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(LedgerError::RateLimited(msg)) if attempt < attempts => {
                let wait = Duration::from_millis(BALANCE_RETRY_STEP_MS * attempt as u64);
                debug!(attempt, wait_ms = wait.as_millis() as u64, %msg, "throttled, retrying");
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn classifies_provider_messages() {
        assert!(matches!(
            LedgerError::classify("HTTP status client error (429 Too Many Requests)"),
            LedgerError::RateLimited(_)
        ));
        assert!(matches!(
            LedgerError::classify("you hit the rate limit"),
            LedgerError::RateLimited(_)
        ));
        assert!(matches!(
            LedgerError::classify("Invalid param: could not find account"),
            LedgerError::NotFound(_)
        ));
        assert!(matches!(
            LedgerError::classify("Account does not exist 9xQ..."),
            LedgerError::NotFound(_)
        ));
        assert_eq!(
            LedgerError::classify("connection reset"),
            LedgerError::Other("connection reset".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retries_only_throttling_with_growing_waits() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();
        let result = with_rate_limit_retries(3, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(LedgerError::RateLimited("429".into()))
                } else {
                    Ok(42u64)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_millis(3_000));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_last_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<u64, _> = with_rate_limit_retries(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LedgerError::RateLimited("429".into())) }
        })
        .await;
        assert!(matches!(result, Err(LedgerError::RateLimited(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        calls.store(0, Ordering::SeqCst);
        let result: Result<u64, _> = with_rate_limit_retries(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LedgerError::Other("boom".into())) }
        })
        .await;
        assert_eq!(result, Err(LedgerError::Other("boom".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
