//! `fundme` CLI: deploy a FundMe ledger into a state file and call it.

use std::{
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};

use fundme::{
    config::FundMeConfig,
    oracle::{eth_price, PriceFeed},
    store::Deployment,
    units::{format_ether, format_units, parse_ether, parse_units},
};

/// FundMe crowdfunding ledger
///
/// Every command loads the state file, applies one call and writes the
/// state back. Accounts can be given as a named account (`deployer`,
/// `user`), a derived index (`#3`) or a hex address.
#[derive(Parser)]
#[command(name = "fundme")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true, env = "FUNDME_CONFIG")]
    config: Option<PathBuf>,

    /// State file path
    #[arg(
        short,
        long,
        global = true,
        env = "FUNDME_STATE",
        default_value = "fundme.state.json"
    )]
    state: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the derived accounts and their native balances
    Accounts,

    /// Deploy a new ledger with a mock price feed
    Deploy {
        /// Owner of the new ledger
        #[arg(long, default_value = "deployer")]
        owner: String,

        /// Overwrite an existing state file
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Contribute to the ledger
    Fund {
        /// Calling account
        #[arg(long, default_value = "deployer")]
        from: String,

        /// Amount in ETH, e.g. `0.1`
        #[arg(long)]
        value: String,
    },

    /// Withdraw the whole balance to the owner
    Withdraw {
        /// Calling account
        #[arg(long, default_value = "deployer")]
        from: String,
    },

    /// Print ledger state
    Show {
        #[arg(short, long, value_enum, default_value_t = Format::Human)]
        format: Format,
    },

    /// Print the funder at a sequence index
    Funder { index: usize },

    /// Print how much an account has funded
    Amount { account: String },

    /// Move the mock price feed to a new USD price
    SetPrice {
        /// USD per ETH, e.g. `1850.25`
        price: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Human,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = FundMeConfig::load(cli.config.as_deref()).context("loading config")?;
    debug!(config = ?cli.config, state = %cli.state.display(), "starting");

    match cli.command {
        Commands::Accounts => accounts_cmd(&config, &cli.state),
        Commands::Deploy { owner, force } => deploy_cmd(&config, &cli.state, &owner, force),
        Commands::Fund { from, value } => fund_cmd(&config, &cli.state, &from, &value),
        Commands::Withdraw { from } => withdraw_cmd(&config, &cli.state, &from),
        Commands::Show { format } => show_cmd(&cli.state, format),
        Commands::Funder { index } => funder_cmd(&cli.state, index),
        Commands::Amount { account } => amount_cmd(&config, &cli.state, &account),
        Commands::SetPrice { price } => set_price_cmd(&cli.state, &price),
    }
}

fn load(state: &Path) -> Result<Deployment> {
    Deployment::load(state).with_context(|| {
        format!(
            "loading {} (run `fundme deploy` first?)",
            state.display()
        )
    })
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn accounts_cmd(config: &FundMeConfig, state: &Path) -> Result<()> {
    let deployment = if state.exists() {
        Some(load(state)?)
    } else {
        None
    };
    for (idx, account) in config.accounts().iter().enumerate() {
        let names: Vec<&str> = config
            .named_accounts
            .iter()
            .filter(|(_, i)| **i as usize == idx)
            .map(|(name, _)| name.as_str())
            .collect();
        let balance = match &deployment {
            Some(d) => format!("{} ETH", format_ether(d.accounts.balance_of(account))),
            None => "-".to_string(),
        };
        println!("#{idx:<3} {account}  {balance:>24}  {}", names.join(","));
    }
    Ok(())
}

fn deploy_cmd(config: &FundMeConfig, state: &Path, owner: &str, force: bool) -> Result<()> {
    let owner = config.resolve_account(owner)?;
    let deployment = Deployment::deploy(config, owner)?;
    if force {
        deployment.save(state)?;
    } else {
        deployment.save_new(state)?;
    }
    info!(
        %owner,
        price_feed = %deployment.ledger.price_feed_address(),
        minimum = %deployment.ledger.minimum(),
        "deployed FundMe"
    );
    println!("Deployed → {}", state.display());
    Ok(())
}

fn fund_cmd(config: &FundMeConfig, state: &Path, from: &str, value: &str) -> Result<()> {
    let caller = config.resolve_account(from)?;
    let value = parse_ether(value).with_context(|| format!("invalid --value {value:?}"))?;
    let mut deployment = load(state)?;
    deployment.fund(&caller, value)?;
    deployment.save(state)?;
    info!(%caller, value = %format_ether(value), "funded");
    println!(
        "{} funded {} ETH (total {} ETH)",
        caller,
        format_ether(value),
        format_ether(deployment.ledger.amount_funded_by(&caller))
    );
    Ok(())
}

fn withdraw_cmd(config: &FundMeConfig, state: &Path, from: &str) -> Result<()> {
    let caller = config.resolve_account(from)?;
    let mut deployment = load(state)?;
    let sent = deployment.withdraw(&caller)?;
    deployment.save(state)?;
    info!(%caller, amount = %format_ether(sent), "withdrawn");
    println!("Withdrew {} ETH → {}", format_ether(sent), caller);
    Ok(())
}

fn show_cmd(state: &Path, format: Format) -> Result<()> {
    let deployment = load(state)?;
    let ledger = &deployment.ledger;
    match format {
        Format::Json => {
            println!("{}", serde_json::to_string_pretty(&ledger.snapshot())?);
        }
        Format::Human => {
            let feed = ledger.price_feed();
            let price = eth_price(feed)
                .map(|p| format!("{} USD", format_ether(p)))
                .unwrap_or_else(|e| format!("unavailable ({e})"));
            println!("owner:       {}", ledger.owner());
            println!("price feed:  {} (v{})", ledger.price_feed_address(), ledger.version());
            println!("eth price:   {price} (round {})", feed.round_id);
            println!("minimum:     {}", ledger.minimum());
            println!("balance:     {} ETH", format_ether(ledger.balance()));
            println!("height:      {}", ledger.height());
            println!("state root:  {}", hex::encode(ledger.state_root()));
            println!("funders:     {}", ledger.funder_count());
            for (idx, funder) in ledger.funders().iter().enumerate() {
                println!("  [{idx}] {funder}");
            }
            println!("contributors:");
            for (address, amount) in ledger.contributors() {
                println!("  {address}  {} ETH", format_ether(*amount));
            }
        }
    }
    Ok(())
}

fn funder_cmd(state: &Path, index: usize) -> Result<()> {
    let deployment = load(state)?;
    println!("{}", deployment.ledger.funder_at(index)?);
    Ok(())
}

fn amount_cmd(config: &FundMeConfig, state: &Path, account: &str) -> Result<()> {
    let account = config.resolve_account(account)?;
    let deployment = load(state)?;
    println!("{} ETH", format_ether(deployment.ledger.amount_funded_by(&account)));
    Ok(())
}

fn set_price_cmd(state: &Path, price: &str) -> Result<()> {
    let mut deployment = load(state)?;
    let decimals = deployment.ledger.price_feed().decimals();
    let scaled = parse_units(price, u32::from(decimals))
        .with_context(|| format!("invalid price {price:?}"))?;
    let Ok(answer) = i128::try_from(scaled) else {
        bail!("price {price:?} too large");
    };
    if answer == 0 {
        bail!("price must be positive");
    }
    deployment.set_price(answer, now_secs());
    deployment.save(state)?;
    info!(price = %format_units(scaled, u32::from(decimals)), "price updated");
    println!(
        "price feed at {} USD (round {})",
        format_units(scaled, u32::from(decimals)),
        deployment.ledger.price_feed().round_id
    );
    Ok(())
}
