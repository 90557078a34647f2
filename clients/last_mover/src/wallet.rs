use anchor_lang::prelude::Pubkey;
use solana_sdk::hash::Hash;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use solana_sdk::transaction::Transaction;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum WalletError {
    /// The actor looked at the transaction and refused to sign it.
    #[error("User declined: {0}")]
    Declined(String),
    #[error("{0}")]
    Failed(String),
}

/// Markers wallets use when the user refuses a signature request.
const DECLINE_MARKERS: [&str; 7] = [
    "User rejected",
    "User cancelled",
    "User canceled",
    "reject",
    "denied",
    "4001",
    "User declined",
];

pub fn is_user_declined(message: &str) -> bool {
    DECLINE_MARKERS.iter().any(|marker| message.contains(marker))
}

/// The authenticated actor behind a mutating action.
pub trait Wallet: Send + Sync {
    fn pubkey(&self) -> Pubkey;

    /// Sign `transaction` as fee payer against `blockhash`. May refuse.
    fn sign(&self, transaction: &mut Transaction, blockhash: Hash) -> Result<(), WalletError>;
}

/// Signs everything it is handed.
pub struct KeypairWallet {
    keypair: Keypair,
}

impl KeypairWallet {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }
}

impl Wallet for KeypairWallet {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    fn sign(&self, transaction: &mut Transaction, blockhash: Hash) -> Result<(), WalletError> {
        transaction
            .try_sign(&[&self.keypair], blockhash)
            .map_err(|e| WalletError::Failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor_lang::solana_program::instruction::{AccountMeta, Instruction};

    #[test]
    fn recognises_decline_markers() {
        assert!(is_user_declined("WalletSignTransactionError: User rejected the request."));
        assert!(is_user_declined("code 4001"));
        assert!(is_user_declined("Request denied by user"));
        assert!(!is_user_declined("Blockhash not found"));
    }

    #[test]
    fn keypair_wallet_signs_as_payer() {
        let wallet = KeypairWallet::new(Keypair::new());
        let ix = Instruction::new_with_bytes(
            Pubkey::new_unique(),
            &[1, 2, 3],
            vec![AccountMeta::new(wallet.pubkey(), true)],
        );
        let mut tx = Transaction::new_with_payer(&[ix], Some(&wallet.pubkey()));
        wallet.sign(&mut tx, Hash::new_unique()).unwrap();
        assert!(tx.is_signed());
    }
}
