//! The game-state controller.
//!
//! [`GameStateSync`] keeps a read replica of the singleton game account,
//! polls it on a single cooperative timer, and wraps every mutating action
//! as guard, sign, submit, confirm, re-fetch. Consumers watch
//! [`SyncState`] through [`GameStateSync::subscribe`].
//!
//! Fetches are serialized by `try_lock`; mutating actions are not serialized
//! against each other or against polls. The replica is last-write-wins by
//! fetch completion.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anchor_lang::prelude::Pubkey;
use anchor_lang::solana_program::instruction::Instruction;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::clock::{SystemClock, TimeSource};
use crate::config::SyncConfig;
use crate::error::{GuardError, SyncError};
use crate::guard;
use crate::instructions;
use crate::ledger::{with_rate_limit_retries, Ledger, LedgerError};
use crate::names::{self, NameCache};
use crate::pda::{game_address, token_account};
use crate::retry::RetryPolicy;
use crate::state::GameSnapshot;
use crate::wallet::Wallet;
use crate::{BALANCE_LOOKUP_ATTEMPTS, DEFAULT_TIMER_SECS};

/// What consumers see.
#[derive(Clone, Debug, Default)]
pub struct SyncState {
    pub snapshot: Option<GameSnapshot>,
    pub error:    Option<SyncError>,
    /// True until the first fetch resolves.
    pub loading:  bool,
}

/// Result of one [`GameStateSync::fetch`]. Fetches never fail outward.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Another fetch was in flight, or a backoff pause is in effect.
    Skipped,
    Updated { changed: bool },
    Uninitialized,
    RateLimited { retry_in: Duration },
    Failed(String),
}

/// Token balances shown next to the game, read at call time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Balances {
    /// `None` when no player was given.
    pub player:      Option<Result<Option<u64>, LedgerError>>,
    /// The token account of the fee wallet recorded in the game.
    pub fee_account: Result<Option<u64>, LedgerError>,
}

pub struct GameStateSync<L> {
    ledger:    L,
    config:    SyncConfig,
    game:      Pubkey,
    clock:     Arc<dyn TimeSource>,
    in_flight: tokio::sync::Mutex<()>,
    retry:     Mutex<RetryPolicy>,
    state:     watch::Sender<SyncState>,
    names:     Mutex<NameCache>,
}

impl<L: Ledger> GameStateSync<L> {
    pub fn new(ledger: L, config: SyncConfig) -> Self {
        Self::with_clock(ledger, config, Arc::new(SystemClock))
    }

    pub fn with_clock(ledger: L, config: SyncConfig, clock: Arc<dyn TimeSource>) -> Self {
        let names = match &config.name_cache {
            Some(path) => NameCache::load(path).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "name cache unreadable, starting empty");
                NameCache::in_memory()
            }),
            None => NameCache::in_memory(),
        };
        let (state, _) = watch::channel(SyncState { loading: true, ..SyncState::default() });
        Self {
            game: game_address(&config.program_id).0,
            retry: Mutex::new(RetryPolicy::new(&config)),
            in_flight: tokio::sync::Mutex::new(()),
            names: Mutex::new(names),
            ledger,
            config,
            clock,
            state,
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn game_address(&self) -> Pubkey {
        self.game
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    pub fn snapshot(&self) -> Option<GameSnapshot> {
        self.state.borrow().snapshot.clone()
    }

    pub fn now(&self) -> i64 {
        self.clock.unix_seconds()
    }

    fn retry(&self) -> MutexGuard<'_, RetryPolicy> {
        self.retry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn names(&self) -> MutexGuard<'_, NameCache> {
        self.names.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Reads ─────────────────────────────────────────────────────────────

    /// Read the game account once and publish the result.
    pub async fn fetch(&self) -> FetchOutcome {
        let Ok(_in_flight) = self.in_flight.try_lock() else {
            tracing::trace!("fetch already in flight");
            return FetchOutcome::Skipped;
        };
        let admitted = self.retry().begin(self.clock.now_ms());
        if !admitted {
            tracing::debug!("backing off, fetch skipped");
            return FetchOutcome::Skipped;
        }

        let result = self.ledger.account_data(&self.game).await;
        let fetched_at = self.clock.unix_seconds();
        match result {
            Ok(Some(data)) => match GameSnapshot::decode(&data, fetched_at) {
                Ok(snapshot) => self.commit(snapshot),
                Err(e) => {
                    tracing::warn!(game = %self.game, error = %e, "game account does not decode");
                    self.mark_uninitialized()
                }
            },
            Ok(None) | Err(LedgerError::NotFound(_)) => self.mark_uninitialized(),
            Err(LedgerError::RateLimited(message)) => {
                let (retry_in, errors) = {
                    let mut retry = self.retry();
                    let delay = retry.on_rate_limited(self.clock.now_ms());
                    (delay, retry.consecutive_errors())
                };
                tracing::warn!(
                    retry_in_s = retry_in.as_secs(),
                    consecutive_errors = errors,
                    %message,
                    "rate limited, pausing polls"
                );
                self.state.send_modify(|s| {
                    s.error = Some(SyncError::RateLimited { retry_in });
                    s.loading = false;
                });
                FetchOutcome::RateLimited { retry_in }
            }
            Err(LedgerError::Execution(message) | LedgerError::Other(message)) => {
                self.retry().on_failure();
                tracing::error!(%message, "fetching game failed");
                self.state.send_modify(|s| {
                    s.snapshot = None;
                    s.error = Some(SyncError::Ledger(message.clone()));
                    s.loading = false;
                });
                FetchOutcome::Failed(message)
            }
        }
    }

    fn commit(&self, snapshot: GameSnapshot) -> FetchOutcome {
        self.retry().on_success();
        let (round, jackpot, active) = (snapshot.current_round, snapshot.jackpot_amount, snapshot.is_active);
        let mut changed = false;
        self.state.send_if_modified(|s| {
            changed = s.snapshot.as_ref().map(|old| old.fingerprint) != Some(snapshot.fingerprint);
            let recovered = s.error.is_some() || s.loading;
            s.snapshot = Some(snapshot);
            s.error = None;
            s.loading = false;
            changed || recovered
        });
        if changed {
            tracing::info!(round, jackpot, active, "game state changed");
        }
        FetchOutcome::Updated { changed }
    }

    fn mark_uninitialized(&self) -> FetchOutcome {
        self.retry().on_failure();
        tracing::info!(game = %self.game, "game account not initialized");
        self.state.send_modify(|s| {
            s.snapshot = None;
            s.error = Some(SyncError::Uninitialized);
            s.loading = false;
        });
        FetchOutcome::Uninitialized
    }

    /// Delay before the next poll: the remaining backoff pause if one is in
    /// effect, otherwise the cadence for the current liveness.
    pub fn next_delay(&self) -> Duration {
        let active = self.state.borrow().snapshot.as_ref().is_some_and(|s| s.is_active);
        self.retry().next_delay(self.clock.now_ms(), active)
    }

    /// On-chain profile name first, then the local cache.
    pub async fn player_name(&self, player: &Pubkey) -> Option<String> {
        match names::profile_name(&self.ledger, &self.config.program_id, player).await {
            Ok(Some(name)) => return Some(name),
            Ok(None) | Err(LedgerError::RateLimited(_)) => {}
            Err(e) => tracing::debug!(%player, error = %e, "profile lookup failed"),
        }
        self.names().get(player).map(str::to_string)
    }

    /// Balances of `player` and of the fee account. `None` without a replica.
    pub async fn balances(&self, player: Option<&Pubkey>) -> Option<Balances> {
        let game = self.snapshot()?;
        let player = match player {
            Some(player) => Some(self.ledger.token_balance(&token_account(player, &game.usdc_mint)).await),
            None => None,
        };
        let fee_account = self
            .ledger
            .token_balance(&token_account(&game.platform_fee_account, &game.usdc_mint))
            .await;
        Some(Balances { player, fee_account })
    }

    // ── Poll Loop ─────────────────────────────────────────────────────────

    /// Fetch now, then keep polling until the handle is shut down or dropped.
    pub fn spawn(self: &Arc<Self>) -> PollHandle {
        let (stop, mut stopped) = watch::channel(false);
        let sync = Arc::clone(self);
        let task = tokio::spawn(async move {
            loop {
                let outcome = sync.fetch().await;
                let delay = sync.next_delay();
                tracing::debug!(?outcome, next_poll_ms = delay.as_millis() as u64, "poll cycle");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = stopped.changed() => break,
                }
            }
            tracing::debug!("poll loop stopped");
        });
        PollHandle { stop, task }
    }

    // ── Actions ───────────────────────────────────────────────────────────

    fn rejected(&self, action: &'static str, err: GuardError) -> SyncError {
        tracing::info!(action, reason = %err, "refused locally");
        SyncError::Rejected(err)
    }

    /// Create the game account. `timer` defaults to twelve hours.
    pub async fn initialize(
        &self,
        wallet: &dyn Wallet,
        usdc_mint: Pubkey,
        timer: Option<i64>,
    ) -> Result<Signature, SyncError> {
        const ACTION: &str = "initialize";
        let admin = wallet.pubkey();
        guard::check_initialize(self.snapshot().as_ref(), &admin, &self.config.admin)
            .map_err(|e| self.rejected(ACTION, e))?;

        let program_id = &self.config.program_id;
        let ixs = vec![
            instructions::create_token_account(&admin, &self.game, &usdc_mint),
            instructions::create_token_account(&admin, &admin, &usdc_mint),
            instructions::initialize(program_id, &admin, &usdc_mint, timer.unwrap_or(DEFAULT_TIMER_SECS))
                .map_err(encoding_failed)?,
        ];
        self.submit(wallet, ACTION, ixs).await
    }

    /// Open a new epoch. `carry_over` defaults to the jackpot on record.
    pub async fn start_game(&self, wallet: &dyn Wallet, carry_over: Option<u64>) -> Result<Signature, SyncError> {
        const ACTION: &str = "start_game";
        let admin = wallet.pubkey();
        let game = self.snapshot();
        guard::check_start(game.as_ref(), &admin, &self.config.admin, self.now())
            .map_err(|e| self.rejected(ACTION, e))?;

        let carry_over = carry_over.unwrap_or_else(|| game.as_ref().map_or(0, |g| g.jackpot_amount));
        tracing::info!(carry_over, "starting epoch");
        let ix = instructions::start_game(&self.config.program_id, &admin, carry_over).map_err(encoding_failed)?;
        self.submit(wallet, ACTION, vec![ix]).await
    }

    /// Pay the current fee and become the last mover.
    pub async fn make_move(&self, wallet: &dyn Wallet) -> Result<Signature, SyncError> {
        const ACTION: &str = "make_move";
        let player = wallet.pubkey();
        let game = self.snapshot();
        guard::check_move(game.as_ref()).map_err(|e| self.rejected(ACTION, e))?;
        let game = game.ok_or(SyncError::Uninitialized)?;

        let mint = game.usdc_mint;
        let cost = game.move_cost(self.config.rounds_per_stage);
        let player_tokens = token_account(&player, &mint);
        let mut ixs = Vec::with_capacity(2);

        let ledger = &self.ledger;
        let lookup = &player_tokens;
        match with_rate_limit_retries(BALANCE_LOOKUP_ATTEMPTS, move || ledger.token_balance(lookup)).await {
            Ok(Some(available)) if available < cost => {
                tracing::info!(%player, required = cost, available, "insufficient balance for move");
                return Err(SyncError::InsufficientBalance { required: cost, available });
            }
            Ok(Some(_)) => {}
            Ok(None) | Err(LedgerError::NotFound(_)) => {
                tracing::debug!(%player, "player token account missing, bundling its creation");
                ixs.push(instructions::create_token_account(&player, &player, &mint));
            }
            Err(LedgerError::RateLimited(_)) => {
                tracing::warn!(%player, "balance lookup throttled, leaving the funds check to the program");
                ixs.push(instructions::create_token_account(&player, &player, &mint));
            }
            Err(LedgerError::Execution(message) | LedgerError::Other(message)) => {
                tracing::error!(%player, %message, "balance lookup failed");
                return Err(SyncError::Ledger(format!("Error checking USDC balance: {message}")));
            }
        }

        ixs.push(instructions::make_move(
            &self.config.program_id,
            &player,
            &mint,
            &game.platform_fee_account,
        ));
        self.submit(wallet, ACTION, ixs).await
    }

    /// Withdraw the carried-over payout or, failing that, the expired
    /// epoch's jackpot.
    pub async fn claim_win(&self, wallet: &dyn Wallet) -> Result<Signature, SyncError> {
        const ACTION: &str = "claim_win";
        let winner = wallet.pubkey();
        let game = self.snapshot();
        let target = guard::check_claim(game.as_ref(), &winner, self.now())
            .map_err(|e| self.rejected(ACTION, e))?;
        let game = game.ok_or(SyncError::Uninitialized)?;

        let mint = game.usdc_mint;
        let mut ixs = Vec::with_capacity(2);
        match self.ledger.token_balance(&token_account(&winner, &mint)).await {
            Ok(Some(_)) => {}
            Ok(None) | Err(LedgerError::NotFound(_)) | Err(LedgerError::RateLimited(_)) => {
                ixs.push(instructions::create_token_account(&winner, &winner, &mint));
            }
            Err(LedgerError::Execution(message) | LedgerError::Other(message)) => {
                tracing::error!(%winner, %message, "winner token account lookup failed");
                return Err(SyncError::Ledger(message));
            }
        }

        tracing::info!(%winner, ?target, "claiming");
        ixs.push(instructions::claim_win(&self.config.program_id, &winner, &mint));
        self.submit(wallet, ACTION, ixs).await
    }

    /// `pause == false` resumes.
    pub async fn pause_game(&self, wallet: &dyn Wallet, pause: bool) -> Result<Signature, SyncError> {
        const ACTION: &str = "pause_game";
        let admin = wallet.pubkey();
        guard::check_pause(self.snapshot().as_ref(), &admin, &self.config.admin, pause)
            .map_err(|e| self.rejected(ACTION, e))?;
        let ix = instructions::pause_game(&self.config.program_id, &admin, pause).map_err(encoding_failed)?;
        self.submit(wallet, ACTION, vec![ix]).await
    }

    pub async fn close_game(&self, wallet: &dyn Wallet) -> Result<Signature, SyncError> {
        const ACTION: &str = "close_game";
        let admin = wallet.pubkey();
        guard::check_close(self.snapshot().as_ref(), &admin, &self.config.admin)
            .map_err(|e| self.rejected(ACTION, e))?;
        let ix = instructions::close_game(&self.config.program_id, &admin);
        self.submit(wallet, ACTION, vec![ix]).await
    }

    /// Store a display name on-chain and in the local cache.
    pub async fn set_player_name(&self, wallet: &dyn Wallet, name: &str) -> Result<Signature, SyncError> {
        const ACTION: &str = "set_player_name";
        let name = guard::validate_name(name).map_err(|e| self.rejected(ACTION, e))?;
        let player = wallet.pubkey();
        let ix = instructions::set_player_name(&self.config.program_id, &player, &name).map_err(encoding_failed)?;
        let signature = self.submit(wallet, ACTION, vec![ix]).await?;

        if let Err(e) = self.names().insert(&player, &name) {
            tracing::warn!(%player, error = %e, "could not persist name");
        }
        Ok(signature)
    }

    // ── Submission ────────────────────────────────────────────────────────

    async fn submit(
        &self,
        wallet: &dyn Wallet,
        action: &'static str,
        instructions: Vec<Instruction>,
    ) -> Result<Signature, SyncError> {
        let result = self.sign_and_send(wallet, action, &instructions).await;
        match &result {
            Ok(signature) => {
                tracing::info!(action, %signature, "transaction submitted");
                self.refresh_after(action).await;
            }
            Err(e) if e.is_user_declined() => tracing::info!(action, "declined in wallet"),
            Err(e) => tracing::error!(action, error = %e, "transaction failed"),
        }
        result
    }

    async fn sign_and_send(
        &self,
        wallet: &dyn Wallet,
        action: &'static str,
        instructions: &[Instruction],
    ) -> Result<Signature, SyncError> {
        let blockhash = self
            .ledger
            .latest_blockhash()
            .await
            .map_err(SyncError::from_submission)?;
        let mut transaction = Transaction::new_with_payer(instructions, Some(&wallet.pubkey()));
        wallet.sign(&mut transaction, blockhash)?;

        let signature = self
            .ledger
            .send_transaction(&transaction)
            .await
            .map_err(SyncError::from_submission)?;

        let timeout = self.config.confirm_timeout();
        match tokio::time::timeout(timeout, self.ledger.confirm(&signature)).await {
            Ok(Ok(())) => tracing::debug!(action, %signature, "confirmed"),
            Ok(Err(LedgerError::Execution(message))) => return Err(SyncError::Ledger(message)),
            Ok(Err(e)) => tracing::warn!(action, %signature, error = %e, "confirmation failed, continuing"),
            Err(_) => tracing::warn!(
                action,
                %signature,
                timeout_s = timeout.as_secs(),
                "confirmation timed out, continuing"
            ),
        }
        Ok(signature)
    }

    /// Re-read after a successful action. Its outcome never changes the
    /// action's result.
    async fn refresh_after(&self, action: &'static str) {
        match self.fetch().await {
            FetchOutcome::Updated { .. } => {}
            outcome => tracing::debug!(action, ?outcome, "refresh after action did not update"),
        }
    }
}

fn encoding_failed(err: std::io::Error) -> SyncError {
    SyncError::Ledger(format!("encoding instruction: {err}"))
}

/// Owner of the poll loop. Dropping it stops the loop too.
pub struct PollHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Cancel the pending timer and wait for the loop to exit. A fetch that
    /// is already in flight runs to completion and may still publish.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "poll loop ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
