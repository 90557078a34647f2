use std::time::Duration;

use anchor_lang::error_code;

use crate::ledger::LedgerError;
use crate::wallet::{is_user_declined, WalletError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("account data shorter than the discriminator")]
    TooShort,
    #[error("account discriminator does not match")]
    WrongDiscriminator,
    #[error("account body could not be decoded")]
    Malformed,
}

/// Local precondition failures. Raised before anything is submitted; the
/// program runs its own checks regardless.
#[error_code]
pub enum GuardError {
    #[msg("Game not initialized")]
    GameNotInitialized,
    #[msg("Game is already initialized")]
    AlreadyInitialized,
    #[msg("Only admin can perform this action")]
    NotAdmin,
    #[msg("Game is already active")]
    AlreadyActive,
    #[msg("Game active but timer expired. The last player must claim the win first")]
    AwaitingClaim,
    #[msg("Game is not active")]
    GameNotActive,
    #[msg("Game is paused")]
    GamePaused,
    #[msg("Game is not paused")]
    GameNotPaused,
    #[msg("Timer has not expired yet")]
    TimerRunning,
    #[msg("You are not the previous winner")]
    NotPreviousWinner,
    #[msg("You are not the winner")]
    NotWinner,
    #[msg("Name must be 1-30 characters")]
    InvalidName,
}

/// Everything a controller call can report back to its caller.
#[derive(Clone, Debug, thiserror::Error)]
pub enum SyncError {
    /// The singleton game account does not exist (or is not a game account).
    /// Offer setup, not a retry.
    #[error("Game not initialized. Please initialize the game first.")]
    Uninitialized,
    #[error("Rate limit exceeded. Retrying in {}s...", .retry_in.as_secs())]
    RateLimited { retry_in: Duration },
    #[error("Transaction cancelled. Please try again when ready.")]
    UserDeclined,
    #[error("{0}")]
    Rejected(GuardError),
    #[error(
        "Insufficient USDC for move. Required: {required} ({} USDC), available: {available}",
        .required / crate::FEE_UNIT
    )]
    InsufficientBalance { required: u64, available: u64 },
    /// Anything else the provider or wallet reported, verbatim.
    #[error("{0}")]
    Ledger(String),
}

impl SyncError {
    /// Map a submission failure, letting a decline marker anywhere in the
    /// provider's text win over the raw error.
    pub fn from_submission(err: LedgerError) -> Self {
        let message = err.message();
        if is_user_declined(message) {
            Self::UserDeclined
        } else {
            Self::Ledger(message.to_string())
        }
    }

    pub fn is_user_declined(&self) -> bool {
        matches!(self, Self::UserDeclined)
    }
}

impl From<GuardError> for SyncError {
    fn from(err: GuardError) -> Self {
        Self::Rejected(err)
    }
}

impl From<WalletError> for SyncError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::Declined(_) => Self::UserDeclined,
            WalletError::Failed(msg) if is_user_declined(&msg) => Self::UserDeclined,
            WalletError::Failed(msg) => Self::Ledger(msg),
        }
    }
}
