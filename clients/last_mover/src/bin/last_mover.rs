use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::read_keypair_file;
use solana_sdk::transaction::Transaction;
use tracing_subscriber::EnvFilter;

use last_mover_client::countdown::{format_remaining, split_hms, time_remaining};
use last_mover_client::{
    GamePhase, GameStateSync, KeypairWallet, LedgerError, RpcLedger, SyncConfig, SyncState, Wallet,
    WalletError, USDC_DECIMALS,
};

// ──────────────────────────────────── CLI ────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "last-mover",
    about = "Watch and play the last-mover jackpot game",
    long_about = "Every move pays the current entry fee and restarts the countdown.\n\
                  Whoever moved last when the timer runs out claims the jackpot.\n\n\
                  Read-only commands need no keypair; every other command signs with\n\
                  --keypair and asks before signing unless --yes is given."
)]
struct Cli {
    /// JSON config file; LAST_MOVER_* environment variables override it
    #[arg(long, env = "LAST_MOVER_CONFIG")]
    config: Option<PathBuf>,

    /// Signing keypair (defaults to ~/.config/solana/id.json)
    #[arg(long, env = "LAST_MOVER_KEYPAIR")]
    keypair: Option<PathBuf>,

    /// Sign without asking
    #[arg(long, short = 'y')]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the game until interrupted
    Watch,
    /// Print the current state once, with your balance and the fee account's
    Status,
    /// Look up a player's display name (yours by default)
    Name { player: Option<Pubkey> },
    #[command(flatten)]
    Action(Action),
}

/// Commands that sign a transaction.
#[derive(Subcommand)]
enum Action {
    /// Create the game account (admin)
    Init {
        /// Mint of the token the game is played in
        mint: Pubkey,
        /// Countdown length in seconds
        #[arg(long)]
        timer: Option<i64>,
    },
    /// Start a new epoch (admin)
    Start {
        /// Jackpot carried into the new epoch, in base units; defaults to the jackpot on record
        #[arg(long)]
        carry_over: Option<u64>,
    },
    /// Pay the entry fee and become the last mover
    Move,
    /// Claim the jackpot, or a payout left over from the previous epoch
    Claim,
    /// Pause the countdown (admin)
    Pause,
    /// Resume a paused game (admin)
    Resume,
    /// Close the game account (admin)
    Close,
    /// Set your display name (1-30 characters)
    SetName { name: String },
}

// ─────────────────────────────────── Wallet ──────────────────────────────────

/// Keypair signer that shows the transaction and asks first.
struct PromptingWallet {
    inner:      KeypairWallet,
    assume_yes: bool,
}

impl Wallet for PromptingWallet {
    fn pubkey(&self) -> Pubkey {
        self.inner.pubkey()
    }

    fn sign(&self, transaction: &mut Transaction, blockhash: Hash) -> Result<(), WalletError> {
        if !self.assume_yes {
            let prompt = format!(
                "Sign transaction with {} instruction(s) as {}?",
                transaction.message.instructions.len(),
                self.pubkey()
            );
            let approved = Confirm::new()
                .with_prompt(prompt)
                .default(false)
                .interact()
                .map_err(|e| WalletError::Failed(e.to_string()))?;
            if !approved {
                return Err(WalletError::Declined("User declined".to_string()));
            }
        }
        self.inner.sign(transaction, blockhash)
    }
}

fn load_wallet(path: Option<PathBuf>, assume_yes: bool) -> anyhow::Result<PromptingWallet> {
    let path = match path {
        Some(path) => path,
        None => {
            let home = std::env::var("HOME").context("HOME not set; pass --keypair")?;
            PathBuf::from(home).join(".config/solana/id.json")
        }
    };
    let keypair = read_keypair_file(&path)
        .map_err(|e| anyhow!("reading keypair {}: {e}", path.display()))?;
    Ok(PromptingWallet { inner: KeypairWallet::new(keypair), assume_yes })
}

// ─────────────────────────────────── Output ──────────────────────────────────

fn usdc(amount: u64) -> String {
    let unit = 10u64.pow(USDC_DECIMALS);
    format!("{}.{:02} USDC", amount / unit, (amount % unit) / (unit / 100))
}

fn print_status(state: &SyncState, now: i64, rounds_per_stage: u64) {
    if state.loading {
        println!("loading...");
        return;
    }
    if let Some(err) = &state.error {
        println!("! {err}");
    }
    let Some(game) = &state.snapshot else {
        println!("phase:        {}", GamePhase::Uninitialized);
        return;
    };
    let countdown = time_remaining(game, now);
    let (h, m, s) = split_hms(countdown.map_or(0, |c| c.remaining));
    println!("phase:        {}", game.phase(now));
    println!("round:        {} (stage {})", game.current_round, game.stage(rounds_per_stage));
    println!("jackpot:      {}", usdc(game.jackpot_amount));
    println!("next move:    {}", usdc(game.move_cost(rounds_per_stage)));
    println!("time left:    {} ({h}h {m}m {s}s)", format_remaining(countdown));
    if game.has_last_player() {
        println!("last mover:   {}", game.last_player);
    }
    if game.has_unclaimed_previous_win() {
        println!(
            "unclaimed:    {} for {}",
            usdc(game.previous_winner_amount),
            game.previous_winner
        );
    }
}

fn balance_line(label: &str, balance: &Result<Option<u64>, LedgerError>) {
    let shown = match balance {
        Ok(Some(amount)) => usdc(*amount),
        Ok(None) => "no token account".to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "balance lookup failed");
            "unavailable".to_string()
        }
    };
    println!("{label:<14}{shown}");
}

// ─────────────────────────────────── Main ────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = SyncConfig::load(cli.config.as_deref())?;
    tracing::debug!(rpc = %config.rpc_url, program = %config.program_id, "configured");

    let sync = Arc::new(GameStateSync::new(RpcLedger::from_config(&config), config));

    match cli.command {
        Commands::Watch => watch(sync).await,
        Commands::Status => {
            sync.fetch().await;
            println!("game:         {}", sync.game_address());
            print_status(&sync.state(), sync.now(), sync.config().rounds_per_stage);
            let player = match load_wallet(cli.keypair, true) {
                Ok(wallet) => Some(wallet.pubkey()),
                Err(e) => {
                    tracing::debug!(error = %e, "no keypair, skipping player balance");
                    None
                }
            };
            if let Some(balances) = sync.balances(player.as_ref()).await {
                if let Some(balance) = &balances.player {
                    balance_line("your balance:", balance);
                }
                balance_line("fee account:", &balances.fee_account);
            }
            Ok(())
        }
        Commands::Name { player } => {
            let player = match player {
                Some(player) => player,
                None => load_wallet(cli.keypair, true)?.pubkey(),
            };
            match sync.player_name(&player).await {
                Some(name) => println!("{name}"),
                None => println!("(no name set for {player})"),
            }
            Ok(())
        }
        Commands::Action(action) => {
            let wallet = load_wallet(cli.keypair, cli.yes)?;
            run_action(&sync, &wallet, action).await
        }
    }
}

async fn run_action(
    sync: &GameStateSync<RpcLedger>,
    wallet: &PromptingWallet,
    action: Action,
) -> anyhow::Result<()> {
    // guards need a fresh replica
    sync.fetch().await;

    let result = match action {
        Action::Init { mint, timer } => sync.initialize(wallet, mint, timer).await,
        Action::Start { carry_over } => sync.start_game(wallet, carry_over).await,
        Action::Move => sync.make_move(wallet).await,
        Action::Claim => sync.claim_win(wallet).await,
        Action::Pause => sync.pause_game(wallet, true).await,
        Action::Resume => sync.pause_game(wallet, false).await,
        Action::Close => sync.close_game(wallet).await,
        Action::SetName { name } => sync.set_player_name(wallet, &name).await,
    };

    match result {
        Ok(signature) => {
            println!("{signature}");
            print_status(&sync.state(), sync.now(), sync.config().rounds_per_stage);
            Ok(())
        }
        Err(e) if e.is_user_declined() => {
            println!("{e}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn watch(sync: Arc<GameStateSync<RpcLedger>>) -> anyhow::Result<()> {
    let rounds_per_stage = sync.config().rounds_per_stage;
    let mut updates = sync.subscribe();
    let poller = sync.spawn();
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                print_status(&state, sync.now(), rounds_per_stage);
                println!();
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, stopping");
                break;
            }
        }
    }
    poller.shutdown().await;
    Ok(())
}
