use anyhow::{bail, Context, Result};
use bleep_jurors::{
    Caller, DraftParams, InMemoryCustody, JurorAddress, JurorsRegistry, LedgerState, ManualClock,
    RegistryConfig, TermClock, U256,
};
use clap::{Parser, Subcommand};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "court_admin")]
#[command(about = "BLEEP court juror registry operator tool", long_about = None)]
struct Cli {
    /// Registry configuration file (TOML, YAML or JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Ledger snapshot file
    #[arg(long, default_value = "court_state.bin")]
    state: PathBuf,

    /// Current court term
    #[arg(long, default_value_t = 0)]
    term: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty ledger snapshot
    Init {
        #[arg(long)]
        force: bool,
    },

    /// Credit tokens to a juror wallet
    Fund {
        juror: String,
        #[arg(value_parser = parse_amount)]
        amount: U256,
    },

    /// Stake tokens from the juror's wallet
    Stake {
        juror: String,
        #[arg(value_parser = parse_amount)]
        amount: U256,
        /// Activate the staked amount right away
        #[arg(long)]
        activate: bool,
    },

    /// Withdraw available tokens to the juror's wallet
    Unstake {
        juror: String,
        #[arg(value_parser = parse_amount)]
        amount: U256,
    },

    /// Activate stake from the next term (0 activates everything available)
    Activate {
        juror: String,
        #[arg(value_parser = parse_amount, default_value = "0")]
        amount: U256,
    },

    /// Schedule stake to leave the active pool (0 deactivates everything unlocked)
    Deactivate {
        juror: String,
        #[arg(value_parser = parse_amount, default_value = "0")]
        amount: U256,
    },

    /// Show a juror's balances
    Balance { juror: String },

    /// Show a juror's active balance at a term
    ActiveAt { juror: String, at_term: u64 },

    /// Draft jurors for a finished term as the court
    Draft {
        draft_term: u64,
        draws: u64,
        #[arg(value_parser = parse_amount)]
        lock_per_draw: U256,
        #[arg(long, default_value_t = 0)]
        dispute: u64,
    },

    /// Show registry totals
    Totals,
}

/// Ledger plus the wallets it moves tokens between.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    ledger: LedgerState,
    custody: InMemoryCustody,
}

type Registry = JurorsRegistry<ManualClock, InMemoryCustody>;

fn parse_amount(raw: &str) -> Result<U256, String> {
    U256::from_dec_str(raw.trim()).map_err(|e| format!("invalid amount {:?}: {:?}", raw, e))
}

fn load_snapshot(path: &Path) -> Result<Snapshot> {
    let bytes = fs::read(path)
        .with_context(|| format!("reading {} (run `court_admin init` first)", path.display()))?;
    bincode::deserialize(&bytes).with_context(|| format!("decoding snapshot {}", path.display()))
}

fn save_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let bytes = bincode::serialize(snapshot).context("encoding snapshot")?;
    fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
    info!("Snapshot saved to {}", path.display());
    Ok(())
}

fn print(value: serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn balances_json(registry: &Registry, juror: &JurorAddress) -> serde_json::Value {
    let balances = registry.balance_of(juror);
    json!({
        "juror": juror.as_str(),
        "active": balances.active.to_string(),
        "available": balances.available.to_string(),
        "locked": balances.locked.to_string(),
        "pending_deactivation": balances.pending_deactivation.to_string(),
        "wallet": registry.custody().balance_of(juror).to_string(),
    })
}

fn init(path: &Path, config: &RegistryConfig, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists, pass --force to overwrite", path.display());
    }
    let snapshot = Snapshot {
        ledger: LedgerState::genesis(config)?,
        custody: InMemoryCustody::new(),
    };
    save_snapshot(path, &snapshot)?;
    print(json!({ "initialized": path.display().to_string() }))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let config = RegistryConfig::load(cli.config.as_deref())?;

    let command = match cli.command {
        Commands::Init { force } => return init(&cli.state, &config, force),
        command => command,
    };

    let snapshot = load_snapshot(&cli.state)?;
    let mut registry: Registry = JurorsRegistry::with_state(
        config.clone(),
        snapshot.ledger,
        ManualClock::new(cli.term),
        snapshot.custody,
    );

    let output = match command {
        Commands::Init { .. } => bail!("init takes no registry"),
        Commands::Fund { juror, amount } => {
            let juror = JurorAddress::new(juror);
            registry.custody_mut().fund(&juror, amount)?;
            balances_json(&registry, &juror)
        }
        Commands::Stake { juror, amount, activate } => {
            let caller = Caller::juror(juror);
            if activate {
                registry.stake_and_activate(&caller, amount)?;
            } else {
                registry.stake(&caller, amount)?;
            }
            balances_json(&registry, &caller.address)
        }
        Commands::Unstake { juror, amount } => {
            let caller = Caller::juror(juror);
            registry.unstake(&caller, amount)?;
            balances_json(&registry, &caller.address)
        }
        Commands::Activate { juror, amount } => {
            let caller = Caller::juror(juror);
            registry.activate(&caller, amount)?;
            balances_json(&registry, &caller.address)
        }
        Commands::Deactivate { juror, amount } => {
            let caller = Caller::juror(juror);
            registry.deactivate(&caller, amount)?;
            let request = registry.deactivation_request(&caller.address);
            let mut output = balances_json(&registry, &caller.address);
            output["available_term_id"] = json!(request.map(|r| r.available_term_id));
            output
        }
        Commands::Balance { juror } => balances_json(&registry, &JurorAddress::new(juror)),
        Commands::ActiveAt { juror, at_term } => {
            let juror = JurorAddress::new(juror);
            json!({
                "juror": juror.as_str(),
                "term": at_term,
                "active_balance": registry.active_balance_at(&juror, at_term).to_string(),
            })
        }
        Commands::Draft { draft_term, draws, lock_per_draw, dispute } => {
            let randomness = match registry.clock().term_randomness(draft_term) {
                Some(randomness) => randomness,
                None => bail!("term {} has not finished at term {}", draft_term, cli.term),
            };
            let mut params = DraftParams::single_batch(randomness, draft_term, draws, lock_per_draw);
            params.dispute_id = dispute;

            let court = Caller::court(config.court.clone());
            let result = registry.draft(&court, &params)?;
            json!({
                "term": draft_term,
                "filled": result.filled,
                "iterations": result.iterations,
                "jurors": result
                    .jurors
                    .iter()
                    .map(|d| json!({ "juror": d.juror.as_str(), "weight": d.weight }))
                    .collect::<Vec<_>>(),
            })
        }
        Commands::Totals => json!({
            "term": cli.term,
            "total_staked": registry.total_staked().to_string(),
            "total_active_balance": registry.total_active_balance().to_string(),
            "next_term_active_balance": registry.total_active_balance_at(cli.term + 1).to_string(),
            "total_active_balance_limit": registry.total_active_balance_limit().to_string(),
            "min_active_balance": registry.min_active_balance_at(cli.term).to_string(),
            "vault": registry.custody().vault().to_string(),
        }),
    };

    let (ledger, _, custody) = registry.into_parts();
    save_snapshot(&cli.state, &Snapshot { ledger, custody })?;
    print(output)
}
