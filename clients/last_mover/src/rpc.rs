use std::time::Duration;

use anchor_lang::prelude::Pubkey;
use solana_client::client_error::ClientError;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use tracing::trace;

use crate::config::SyncConfig;
use crate::ledger::{Ledger, LedgerError};

const SIGNATURE_POLL_MS: u64 = 500;

fn ledger_error(err: ClientError) -> LedgerError {
    LedgerError::classify(err.to_string())
}

/// [`Ledger`] backed by a JSON-RPC node at `confirmed` commitment.
pub struct RpcLedger {
    client:     RpcClient,
    commitment: CommitmentConfig,
}

impl RpcLedger {
    pub fn new(url: impl Into<String>) -> Self {
        let commitment = CommitmentConfig::confirmed();
        Self {
            client: RpcClient::new_with_commitment(url.into(), commitment),
            commitment,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.rpc_url.clone())
    }

    pub fn url(&self) -> String {
        self.client.url()
    }
}

/// Token amounts come back as decimal strings of the raw integer amount.
fn parse_amount(raw: &str) -> Result<u64, LedgerError> {
    raw.parse()
        .map_err(|_| LedgerError::Other(format!("unexpected token amount {raw:?}")))
}

impl Ledger for RpcLedger {
    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, LedgerError> {
        let response = self
            .client
            .get_account_with_commitment(address, self.commitment)
            .await
            .map_err(ledger_error)?;
        Ok(response.value.map(|account| account.data))
    }

    async fn token_balance(&self, token_account: &Pubkey) -> Result<Option<u64>, LedgerError> {
        match self.client.get_token_account_balance(token_account).await {
            Ok(amount) => parse_amount(&amount.amount).map(Some),
            Err(err) => match ledger_error(err) {
                LedgerError::NotFound(_) => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn latest_blockhash(&self) -> Result<Hash, LedgerError> {
        self.client.get_latest_blockhash().await.map_err(ledger_error)
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, LedgerError> {
        self.client.send_transaction(transaction).await.map_err(ledger_error)
    }

    /// Polls until the node reports a status. Runs until the caller gives up.
    /// A status carrying a transaction error is an execution failure.
    async fn confirm(&self, signature: &Signature) -> Result<(), LedgerError> {
        loop {
            let status = self
                .client
                .get_signature_status_with_commitment(signature, self.commitment)
                .await
                .map_err(ledger_error)?;
            match status {
                Some(Ok(())) => return Ok(()),
                Some(Err(err)) => return Err(LedgerError::Execution(err.to_string())),
                None => {
                    trace!(%signature, "not yet confirmed");
                    tokio::time::sleep(Duration::from_millis(SIGNATURE_POLL_MS)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_client::client_error::ClientErrorKind;

    #[test]
    fn client_errors_are_classified_by_text() {
        let throttled = ClientError::from(ClientErrorKind::Custom(
            "HTTP status client error (429 Too Many Requests)".into(),
        ));
        assert!(matches!(ledger_error(throttled), LedgerError::RateLimited(_)));

        let missing = ClientError::from(ClientErrorKind::Custom(
            "Invalid param: could not find account".into(),
        ));
        assert!(matches!(ledger_error(missing), LedgerError::NotFound(_)));
    }

    #[test]
    fn token_amounts_parse_from_strings() {
        assert_eq!(parse_amount("2500000"), Ok(2_500_000));
        assert!(parse_amount("2.5").is_err());
    }

    #[test]
    fn endpoint_comes_from_config() {
        let config = SyncConfig { rpc_url: "http://127.0.0.1:8899".into(), ..SyncConfig::default() };
        assert_eq!(RpcLedger::from_config(&config).url(), "http://127.0.0.1:8899");
    }
}
