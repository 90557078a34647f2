//! Fixtures shared by the unit tests: canned accounts and a scripted ledger.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anchor_lang::prelude::*;
use solana_sdk::hash::Hash;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use tokio::sync::Notify;

use crate::ledger::{Ledger, LedgerError};
use crate::state::{Game, PlayerProfile, NO_PLAYER};
use crate::DEFAULT_TIMER_SECS;

/// Active, unpaused game three moves into its epoch.
pub(crate) fn sample_game() -> Game {
    Game {
        current_round:           3,
        jackpot_amount:          12_000_000,
        last_move_timestamp:     1_700_000_000,
        last_player:             Pubkey::new_unique(),
        timer_duration:          DEFAULT_TIMER_SECS,
        is_active:               true,
        is_paused:               false,
        platform_fee_account:    Pubkey::new_unique(),
        usdc_mint:               Pubkey::new_unique(),
        bump:                    254,
        previous_winner:         NO_PLAYER,
        previous_winner_amount:  0,
        previous_winner_claimed: true,
    }
}

/// Raw account bytes (discriminator + body) for `sample_game` after `f`.
pub(crate) fn game_account(f: impl FnOnce(&mut Game)) -> Vec<u8> {
    let mut game = sample_game();
    f(&mut game);
    let mut data = Vec::with_capacity(8 + Game::LEN);
    game.try_serialize(&mut data).unwrap();
    data
}

pub(crate) fn profile_account(player: Pubkey, name: &str) -> Vec<u8> {
    let profile = PlayerProfile { player, name: name.to_string(), bump: 255 };
    let mut data = Vec::new();
    profile.try_serialize(&mut data).unwrap();
    data
}

/// In-memory ledger. Reads come from a script first, then from the account
/// map; every call is counted.
#[derive(Default)]
pub(crate) struct MockLedger {
    accounts:         Mutex<HashMap<Pubkey, Vec<u8>>>,
    balances:         Mutex<HashMap<Pubkey, u64>>,
    script:           Mutex<VecDeque<std::result::Result<Option<Vec<u8>>, LedgerError>>>,
    balance_errors:   Mutex<VecDeque<LedgerError>>,
    send_error:       Mutex<Option<LedgerError>>,
    confirm_delay:    Mutex<Option<Duration>>,
    confirm_error:    Mutex<Option<LedgerError>>,
    gate:             Mutex<Option<Arc<Notify>>>,
    sent:             Mutex<Vec<Transaction>>,
    account_calls:    AtomicUsize,
    balance_calls:    AtomicUsize,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_account(&self, address: Pubkey, data: Vec<u8>) {
        self.accounts.lock().unwrap().insert(address, data);
    }

    pub fn remove_account(&self, address: &Pubkey) {
        self.accounts.lock().unwrap().remove(address);
    }

    pub fn set_balance(&self, token_account: Pubkey, amount: u64) {
        self.balances.lock().unwrap().insert(token_account, amount);
    }

    /// Queue a one-shot answer for the next account read.
    pub fn push_read(&self, result: std::result::Result<Option<Vec<u8>>, LedgerError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn push_balance_error(&self, err: LedgerError) {
        self.balance_errors.lock().unwrap().push_back(err);
    }

    pub fn fail_sends_with(&self, err: LedgerError) {
        *self.send_error.lock().unwrap() = Some(err);
    }

    pub fn delay_confirmations(&self, delay: Duration) {
        *self.confirm_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_confirmations_with(&self, err: LedgerError) {
        *self.confirm_error.lock().unwrap() = Some(err);
    }

    /// Hold every account read until the returned handle is notified.
    pub fn gate_reads(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(notify.clone());
        notify
    }

    pub fn account_calls(&self) -> usize {
        self.account_calls.load(Ordering::SeqCst)
    }

    pub fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Transaction> {
        self.sent.lock().unwrap().clone()
    }
}

impl Ledger for MockLedger {
    async fn account_data(
        &self,
        address: &Pubkey,
    ) -> std::result::Result<Option<Vec<u8>>, LedgerError> {
        self.account_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(self.accounts.lock().unwrap().get(address).cloned()),
        }
    }

    async fn token_balance(
        &self,
        token_account: &Pubkey,
    ) -> std::result::Result<Option<u64>, LedgerError> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.balance_errors.lock().unwrap().pop_front();
        match scripted {
            Some(err) => Err(err),
            None => Ok(self.balances.lock().unwrap().get(token_account).copied()),
        }
    }

    async fn latest_blockhash(&self) -> std::result::Result<Hash, LedgerError> {
        Ok(Hash::new_unique())
    }

    async fn send_transaction(
        &self,
        transaction: &Transaction,
    ) -> std::result::Result<Signature, LedgerError> {
        let failure = self.send_error.lock().unwrap().clone();
        if let Some(err) = failure {
            return Err(err);
        }
        self.sent.lock().unwrap().push(transaction.clone());
        Ok(transaction.signatures.first().copied().unwrap_or_default())
    }

    async fn confirm(&self, _signature: &Signature) -> std::result::Result<(), LedgerError> {
        let delay = *self.confirm_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.confirm_error.lock().unwrap().clone();
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
