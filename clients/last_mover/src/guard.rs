//! Local preconditions for each action.
//!
//! These only save the actor a doomed signature prompt. The program checks
//! everything again on-chain; nothing here is an authorization boundary.

use anchor_lang::prelude::Pubkey;

use crate::countdown;
use crate::error::GuardError;
use crate::state::GameSnapshot;
use crate::MAX_NAME_LEN;

type Check<T = ()> = std::result::Result<T, GuardError>;

/// Which payout a claim would withdraw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimTarget {
    /// The unclaimed payout carried over from the prior epoch.
    PreviousEpoch { amount: u64 },
    /// The jackpot of the epoch that just timed out.
    CurrentEpoch,
}

fn live(snapshot: Option<&GameSnapshot>) -> Check<&GameSnapshot> {
    snapshot.ok_or(GuardError::GameNotInitialized)
}

fn require_admin(actor: &Pubkey, admin: &Pubkey) -> Check {
    if actor != admin {
        return Err(GuardError::NotAdmin);
    }
    Ok(())
}

fn timer_expired(snapshot: &GameSnapshot, now: i64) -> bool {
    countdown::time_remaining(snapshot, now).is_some_and(|c| c.expired)
}

pub fn check_initialize(snapshot: Option<&GameSnapshot>, actor: &Pubkey, admin: &Pubkey) -> Check {
    require_admin(actor, admin)?;
    if snapshot.is_some() {
        return Err(GuardError::AlreadyInitialized);
    }
    Ok(())
}

/// Admin only. A running timer blocks a restart; an expired one blocks it
/// too unless nobody ever moved, since otherwise the winner has not been
/// paid yet.
pub fn check_start(snapshot: Option<&GameSnapshot>, actor: &Pubkey, admin: &Pubkey, now: i64) -> Check {
    let game = live(snapshot)?;
    require_admin(actor, admin)?;
    if game.is_active {
        if !timer_expired(game, now) {
            return Err(GuardError::AlreadyActive);
        }
        if !game.is_untouched() {
            return Err(GuardError::AwaitingClaim);
        }
    }
    Ok(())
}

pub fn check_move(snapshot: Option<&GameSnapshot>) -> Check {
    let game = live(snapshot)?;
    if !game.is_active {
        return Err(GuardError::GameNotActive);
    }
    if game.is_paused {
        return Err(GuardError::GamePaused);
    }
    Ok(())
}

/// The carried-over payout takes priority and stays claimable while a new
/// epoch runs. Otherwise the current epoch must be over and the actor must
/// be its last mover.
pub fn check_claim(snapshot: Option<&GameSnapshot>, actor: &Pubkey, now: i64) -> Check<ClaimTarget> {
    let game = live(snapshot)?;
    if game.has_unclaimed_previous_win() {
        if *actor != game.previous_winner {
            return Err(GuardError::NotPreviousWinner);
        }
        return Ok(ClaimTarget::PreviousEpoch { amount: game.previous_winner_amount });
    }
    if !game.is_active {
        return Err(GuardError::GameNotActive);
    }
    if *actor != game.last_player {
        return Err(GuardError::NotWinner);
    }
    if !timer_expired(game, now) {
        return Err(GuardError::TimerRunning);
    }
    Ok(ClaimTarget::CurrentEpoch)
}

/// `pause == true` needs a running game, `false` needs a paused one.
pub fn check_pause(snapshot: Option<&GameSnapshot>, actor: &Pubkey, admin: &Pubkey, pause: bool) -> Check {
    let game = live(snapshot)?;
    require_admin(actor, admin)?;
    if pause {
        if !game.is_active {
            return Err(GuardError::GameNotActive);
        }
        if game.is_paused {
            return Err(GuardError::GamePaused);
        }
    } else if !game.is_paused {
        return Err(GuardError::GameNotPaused);
    }
    Ok(())
}

pub fn check_close(snapshot: Option<&GameSnapshot>, actor: &Pubkey, admin: &Pubkey) -> Check {
    live(snapshot)?;
    require_admin(actor, admin)
}

/// Trimmed name, 1 to 30 characters.
pub fn validate_name(raw: &str) -> Check<String> {
    let name = raw.trim();
    let len = name.chars().count();
    if len == 0 || len > MAX_NAME_LEN {
        return Err(GuardError::InvalidName);
    }
    Ok(name.to_string())
}
