//! Builders for the program's instruction set.
//!
//! Data is `sha256("global:<name>")[..8]` followed by the Borsh-encoded
//! arguments; account order follows the program's account structs.

use anchor_lang::prelude::*;
use anchor_lang::solana_program::hash::hash;
use anchor_lang::solana_program::instruction::{AccountMeta, Instruction};
use anchor_lang::solana_program::system_program;
use anchor_spl::associated_token::spl_associated_token_account::instruction::create_associated_token_account_idempotent;

use crate::pda::{game_address, player_profile_address, token_account};

fn sighash(name: &str) -> [u8; 8] {
    let preimage = format!("global:{name}");
    let mut out = [0u8; 8];
    out.copy_from_slice(&hash(preimage.as_bytes()).to_bytes()[..8]);
    out
}

fn data(name: &str) -> Vec<u8> {
    sighash(name).to_vec()
}

fn data_with<T: AnchorSerialize>(name: &str, args: &T) -> std::io::Result<Vec<u8>> {
    let mut out = data(name);
    args.serialize(&mut out)?;
    Ok(out)
}

// ── Args ──────────────────────────────────────────────────────────────────

#[derive(AnchorSerialize)]
struct InitializeArgs {
    timer:     i64,
    usdc_mint: Pubkey,
}

#[derive(AnchorSerialize)]
struct StartGameArgs {
    carry_over: u64,
}

#[derive(AnchorSerialize)]
struct PauseGameArgs {
    pause: bool,
}

#[derive(AnchorSerialize)]
struct SetPlayerNameArgs {
    name: String,
}

// ── Instructions ──────────────────────────────────────────────────────────

/// One-time setup of the game account and its jackpot vault.
pub fn initialize(program_id: &Pubkey, admin: &Pubkey, usdc_mint: &Pubkey, timer: i64) -> std::io::Result<Instruction> {
    let (game, _) = game_address(program_id);
    Ok(Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(game, false),
            AccountMeta::new(token_account(&game, usdc_mint), false),
            AccountMeta::new_readonly(*usdc_mint, false),
            AccountMeta::new(*admin, true),
            AccountMeta::new_readonly(anchor_spl::token::ID, false),
            AccountMeta::new_readonly(anchor_spl::associated_token::ID, false),
            AccountMeta::new_readonly(system_program::ID, false),
        ],
        data: data_with("initialize", &InitializeArgs { timer, usdc_mint: *usdc_mint })?,
    })
}

pub fn start_game(program_id: &Pubkey, admin: &Pubkey, carry_over: u64) -> std::io::Result<Instruction> {
    let (game, _) = game_address(program_id);
    Ok(Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(game, false),
            AccountMeta::new_readonly(*admin, true),
        ],
        data: data_with("start_game", &StartGameArgs { carry_over })?,
    })
}

/// `platform_fee_wallet` is the wallet recorded in the game account; the
/// fee goes to its associated token account.
pub fn make_move(
    program_id: &Pubkey,
    player: &Pubkey,
    usdc_mint: &Pubkey,
    platform_fee_wallet: &Pubkey,
) -> Instruction {
    let (game, _) = game_address(program_id);
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(game, false),
            AccountMeta::new(token_account(player, usdc_mint), false),
            AccountMeta::new(token_account(&game, usdc_mint), false),
            AccountMeta::new(token_account(platform_fee_wallet, usdc_mint), false),
            AccountMeta::new_readonly(*player, true),
            AccountMeta::new_readonly(anchor_spl::token::ID, false),
        ],
        data: data("make_move"),
    }
}

pub fn claim_win(program_id: &Pubkey, winner: &Pubkey, usdc_mint: &Pubkey) -> Instruction {
    let (game, _) = game_address(program_id);
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(game, false),
            AccountMeta::new(token_account(&game, usdc_mint), false),
            AccountMeta::new(token_account(winner, usdc_mint), false),
            AccountMeta::new_readonly(*winner, true),
            AccountMeta::new_readonly(anchor_spl::token::ID, false),
        ],
        data: data("claim_win"),
    }
}

pub fn pause_game(program_id: &Pubkey, admin: &Pubkey, pause: bool) -> std::io::Result<Instruction> {
    let (game, _) = game_address(program_id);
    Ok(Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(game, false),
            AccountMeta::new_readonly(*admin, true),
        ],
        data: data_with("pause_game", &PauseGameArgs { pause })?,
    })
}

pub fn close_game(program_id: &Pubkey, admin: &Pubkey) -> Instruction {
    let (game, _) = game_address(program_id);
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(game, false),
            AccountMeta::new(*admin, true),
            AccountMeta::new_readonly(system_program::ID, false),
        ],
        data: data("close_game"),
    }
}

pub fn set_player_name(program_id: &Pubkey, player: &Pubkey, name: &str) -> std::io::Result<Instruction> {
    let (profile, _) = player_profile_address(program_id, player);
    Ok(Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(profile, false),
            AccountMeta::new(*player, true),
            AccountMeta::new_readonly(system_program::ID, false),
        ],
        data: data_with("set_player_name", &SetPlayerNameArgs { name: name.to_string() })?,
    })
}

/// Create `owner`'s token account for `mint` if it is missing, paid by
/// `payer`. Idempotent, so bundling it in front of an action is always safe.
pub fn create_token_account(payer: &Pubkey, owner: &Pubkey, mint: &Pubkey) -> Instruction {
    create_associated_token_account_idempotent(payer, owner, mint, &anchor_spl::token::ID)
}
