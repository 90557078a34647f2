use anchor_lang::prelude::Pubkey;
use anchor_spl::associated_token::get_associated_token_address;

use crate::{GAME_SEED, PLAYER_SEED};

/// The singleton game account.
pub fn game_address(program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[GAME_SEED], program_id)
}

pub fn player_profile_address(program_id: &Pubkey, player: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[PLAYER_SEED, player.as_ref()], program_id)
}

/// Associated token account of `owner` for `mint`. Works for PDA owners too
/// (the jackpot vault is owned by the game PDA).
pub fn token_account(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    get_associated_token_address(owner, mint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_address_is_stable_and_off_curve() {
        let (a, bump_a) = game_address(&crate::ID);
        let (b, bump_b) = game_address(&crate::ID);
        assert_eq!((a, bump_a), (b, bump_b));
        assert!(!a.is_on_curve());
        assert_ne!(game_address(&Pubkey::new_unique()).0, a);
    }

    #[test]
    fn profiles_are_per_player() {
        let alice = Pubkey::new_unique();
        let bob = Pubkey::new_unique();
        let (pa, _) = player_profile_address(&crate::ID, &alice);
        let (pb, _) = player_profile_address(&crate::ID, &bob);
        assert_ne!(pa, pb);
        assert_ne!(pa, game_address(&crate::ID).0);
    }

    #[test]
    fn vault_and_wallet_token_accounts_differ() {
        let mint = Pubkey::new_unique();
        let (game, _) = game_address(&crate::ID);
        let player = Pubkey::new_unique();
        assert_ne!(token_account(&game, &mint), token_account(&player, &mint));
        assert_eq!(token_account(&player, &mint), token_account(&player, &mint));
    }
}
