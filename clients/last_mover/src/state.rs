use anchor_lang::prelude::*;
use anchor_lang::Discriminator;

use crate::countdown;
use crate::error::DecodeError;
use crate::FEE_UNIT;

/// The program writes the system program id (all zero bytes) wherever no
/// player has been recorded yet.
pub const NO_PLAYER: Pubkey = Pubkey::new_from_array([0u8; 32]);

// ══════════════════════════════════════════════════════════════════════════
//  ACCOUNT MIRRORS
// ══════════════════════════════════════════════════════════════════════════
// Byte-for-byte copies of the program's accounts. Field order is the wire
// order; do not reorder.

// ── Game PDA ── seeds: ["game"]
#[account]
#[derive(Debug)]
pub struct Game {
    pub current_round:           u64,     // 8
    pub jackpot_amount:          u64,     // 8
    pub last_move_timestamp:     i64,     // 8, zero until the first move of an epoch
    pub last_player:             Pubkey,  // 32, NO_PLAYER until the first move
    pub timer_duration:          i64,     // 8
    pub is_active:               bool,    // 1
    pub is_paused:               bool,    // 1
    pub platform_fee_account:    Pubkey,  // 32
    pub usdc_mint:               Pubkey,  // 32
    pub bump:                    u8,      // 1
    // ── Carry-over from the previous epoch ──
    pub previous_winner:         Pubkey,  // 32
    pub previous_winner_amount:  u64,     // 8
    pub previous_winner_claimed: bool,    // 1
}
impl Game {
    pub const LEN:        usize = 8 + 8 + 8 + 32 + 8 + 1 + 1 + 32 + 32 + 1 + 32 + 8 + 1;
    pub const LEGACY_LEN: usize = 8 + 8 + 8 + 32 + 8 + 1 + 1 + 32 + 32 + 1;
}

/// Layout deployed before the carry-over fields existed. Same discriminator,
/// shorter body.
#[derive(AnchorDeserialize)]
struct LegacyGame {
    current_round:        u64,
    jackpot_amount:       u64,
    last_move_timestamp:  i64,
    last_player:          Pubkey,
    timer_duration:       i64,
    is_active:            bool,
    is_paused:            bool,
    platform_fee_account: Pubkey,
    usdc_mint:            Pubkey,
    bump:                 u8,
}

impl From<LegacyGame> for Game {
    fn from(old: LegacyGame) -> Self {
        Self {
            current_round:           old.current_round,
            jackpot_amount:          old.jackpot_amount,
            last_move_timestamp:     old.last_move_timestamp,
            last_player:             old.last_player,
            timer_duration:          old.timer_duration,
            is_active:               old.is_active,
            is_paused:               old.is_paused,
            platform_fee_account:    old.platform_fee_account,
            usdc_mint:               old.usdc_mint,
            bump:                    old.bump,
            previous_winner:         NO_PLAYER,
            previous_winner_amount:  0,
            previous_winner_claimed: true,
        }
    }
}

/// Decode a raw `Game` account, accepting both the current and the legacy
/// layout.
pub fn decode_game(data: &[u8]) -> std::result::Result<Game, DecodeError> {
    if data.len() < 8 {
        return Err(DecodeError::TooShort);
    }
    if data[..8] != Game::DISCRIMINATOR[..] {
        return Err(DecodeError::WrongDiscriminator);
    }
    let mut body = &data[8..];
    if body.len() >= Game::LEN {
        Game::deserialize(&mut body).map_err(|_| DecodeError::Malformed)
    } else {
        LegacyGame::deserialize(&mut body)
            .map(Game::from)
            .map_err(|_| DecodeError::Malformed)
    }
}

// ── PlayerProfile PDA ── seeds: ["player", player]
#[account]
#[derive(Debug)]
pub struct PlayerProfile {
    pub player: Pubkey,  // 32
    pub name:   String,  // 4 + up to 30 chars
    pub bump:   u8,      // 1
}

pub fn decode_profile(data: &[u8]) -> std::result::Result<PlayerProfile, DecodeError> {
    if data.len() < 8 {
        return Err(DecodeError::TooShort);
    }
    if data[..8] != PlayerProfile::DISCRIMINATOR[..] {
        return Err(DecodeError::WrongDiscriminator);
    }
    PlayerProfile::deserialize(&mut &data[8..]).map_err(|_| DecodeError::Malformed)
}

// ══════════════════════════════════════════════════════════════════════════
//  SNAPSHOT
// ══════════════════════════════════════════════════════════════════════════

/// Read replica of the singleton game account as of `fetched_at`.
/// Replaced wholesale on every successful poll; never mutated in place.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameSnapshot {
    pub current_round:           u64,
    pub jackpot_amount:          u64,
    pub last_move_timestamp:     i64,
    pub timer_duration:          i64,
    pub last_player:             Pubkey,
    pub is_active:               bool,
    pub is_paused:               bool,
    pub platform_fee_account:    Pubkey,
    pub usdc_mint:               Pubkey,
    pub bump:                    u8,
    pub previous_winner:         Pubkey,
    pub previous_winner_amount:  u64,
    pub previous_winner_claimed: bool,
    /// Unix seconds when the account was read.
    pub fetched_at:              i64,
    /// blake3 of the raw account bytes.
    pub fingerprint:             [u8; 32],
}

impl GameSnapshot {
    pub fn decode(data: &[u8], fetched_at: i64) -> std::result::Result<Self, DecodeError> {
        let game = decode_game(data)?;
        Ok(Self::from_game(game, fetched_at, *blake3::hash(data).as_bytes()))
    }

    pub fn from_game(game: Game, fetched_at: i64, fingerprint: [u8; 32]) -> Self {
        Self {
            current_round:           game.current_round,
            jackpot_amount:          game.jackpot_amount,
            last_move_timestamp:     game.last_move_timestamp,
            timer_duration:          game.timer_duration,
            last_player:             game.last_player,
            is_active:               game.is_active,
            is_paused:               game.is_paused,
            platform_fee_account:    game.platform_fee_account,
            usdc_mint:               game.usdc_mint,
            bump:                    game.bump,
            previous_winner:         game.previous_winner,
            previous_winner_amount:  game.previous_winner_amount,
            previous_winner_claimed: game.previous_winner_claimed,
            fetched_at,
            fingerprint,
        }
    }

    /// Someone has moved in the current epoch.
    pub fn has_last_player(&self) -> bool {
        self.last_player != NO_PLAYER
    }

    /// The epoch was started but nobody has moved yet.
    pub fn is_untouched(&self) -> bool {
        self.current_round == 0 && !self.has_last_player()
    }

    /// The previous epoch's payout is still waiting to be withdrawn.
    pub fn has_unclaimed_previous_win(&self) -> bool {
        !self.previous_winner_claimed
            && self.previous_winner_amount > 0
            && self.previous_winner != NO_PLAYER
    }

    pub fn fee_tier(&self, rounds_per_stage: u64) -> u64 {
        fee_tier(self.current_round, rounds_per_stage)
    }

    /// Cost of the next move in the token's smallest unit.
    pub fn move_cost(&self, rounds_per_stage: u64) -> u64 {
        self.fee_tier(rounds_per_stage).saturating_mul(FEE_UNIT)
    }

    pub fn stage(&self, rounds_per_stage: u64) -> u64 {
        self.current_round / rounds_per_stage.max(1)
    }

    pub fn phase(&self, now: i64) -> GamePhase {
        if !self.is_active {
            return GamePhase::Inactive;
        }
        if self.is_paused {
            return GamePhase::Paused;
        }
        match countdown::time_remaining(self, now) {
            Some(c) if c.expired => GamePhase::Expired,
            _ => GamePhase::Active,
        }
    }
}

/// Entry cost in fee units: floor((round - 1) / rounds_per_stage) + 1.
/// Round 0 (no move yet) costs one unit.
pub fn fee_tier(current_round: u64, rounds_per_stage: u64) -> u64 {
    current_round.saturating_sub(1) / rounds_per_stage.max(1) + 1
}

/// Lifecycle of the externally-owned game as seen from one snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GamePhase {
    Uninitialized,
    /// Closed, or finished and waiting for the admin to start the next epoch.
    Inactive,
    Active,
    Paused,
    /// Timer ran out; the last mover may claim.
    Expired,
}

impl GamePhase {
    pub fn of(snapshot: Option<&GameSnapshot>, now: i64) -> Self {
        snapshot.map_or(Self::Uninitialized, |s| s.phase(now))
    }
}

impl std::fmt::Display for GamePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Uninitialized => "uninitialized",
            Self::Inactive      => "inactive",
            Self::Active        => "active",
            Self::Paused        => "paused",
            Self::Expired       => "expired",
        };
        f.write_str(label)
    }
}
