use anchor_lang::prelude::*;

// Program the client talks to. The account mirrors in `state` take their
// owner from this id, so it must match the deployed program.
declare_id!("AY4ggjnoRccQxDcjpWXbzhpD3DtXS8f7U6qQQsSEfADa");

pub mod clock;
pub mod config;
pub mod countdown;
pub mod error;
pub mod guard;
pub mod instructions;
pub mod ledger;
pub mod names;
pub mod pda;
pub mod retry;
pub mod rpc;
pub mod state;
pub mod sync;
pub mod wallet;

#[cfg(test)]
pub(crate) mod testing;

pub use config::SyncConfig;
pub use error::{DecodeError, GuardError, SyncError};
pub use ledger::{Ledger, LedgerError};
pub use rpc::RpcLedger;
pub use state::{GamePhase, GameSnapshot};
pub use sync::{Balances, FetchOutcome, GameStateSync, PollHandle, SyncState};
pub use wallet::{KeypairWallet, Wallet, WalletError};

// ── Seeds ─────────────────────────────────────────────────────────────────
pub const GAME_SEED:   &[u8] = b"game";     // singleton game account
pub const PLAYER_SEED: &[u8] = b"player";   // per-player profile account

// ── Fee Schedule ──────────────────────────────────────────────────────────
// Mirrors the program's step function for display and the local balance
// pre-check: cost = (floor((round - 1) / ROUNDS_PER_STAGE) + 1) * FEE_UNIT.
// Test deployments stage every 5 rounds, production every 50.
pub const ROUNDS_PER_STAGE: u64 = 5;
pub const FEE_UNIT:         u64 = 1_000_000;   // 1 USDC (6 decimals)
pub const USDC_DECIMALS:    u32 = 6;

// ── Game Defaults ─────────────────────────────────────────────────────────
pub const DEFAULT_TIMER_SECS: i64   = 43_200;  // 12h countdown at initialize
pub const MAX_NAME_LEN:       usize = 30;      // player display name, in chars

// ── Polling & Backoff (milliseconds) ──────────────────────────────────────
// Sized for throttled public RPC endpoints.
// Backoff is linear: min(BACKOFF_CEILING_MS, BACKOFF_BASE_MS * errors).
pub const POLL_INTERVAL_ACTIVE_MS:   u64 = 60_000;   // game running
pub const POLL_INTERVAL_INACTIVE_MS: u64 = 120_000;  // game closed / not started
pub const BACKOFF_BASE_MS:           u64 = 60_000;   // 1 min per consecutive 429
pub const BACKOFF_CEILING_MS:        u64 = 300_000;  // 5 min cap
pub const CONFIRM_TIMEOUT_MS:        u64 = 60_000;   // wait for confirmation, then move on

// ── Token-account Lookups ─────────────────────────────────────────────────
pub const BALANCE_LOOKUP_ATTEMPTS: u32 = 3;      // 1s, then 2s between attempts
pub const BALANCE_RETRY_STEP_MS:   u64 = 1_000;

// ── Deployment ────────────────────────────────────────────────────────────
pub const DEFAULT_RPC_URL: &str    = "https://api.devnet.solana.com";
pub const DEFAULT_ADMIN:   Pubkey  = solana_sdk::pubkey!("AmHrVCiySjeSvcDgYDXeE7PVojuTC7oyUbjovW5nrpn7");
