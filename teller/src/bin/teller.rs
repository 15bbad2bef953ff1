//! Interactive teller console

use bank_core::{spawn_bank_actor, Bank, BankHandle, Config, Currency, Direction};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use teller::{command::USAGE, Command, Error, Teller};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// TOML configuration file (environment variables otherwise)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory, overrides the configuration
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }

    tracing::info!(data_dir = ?config.data_dir, "Starting teller");

    let bank = Arc::new(Bank::open(&config)?);
    for account in bank.quarantined() {
        println!(
            "Account {} ({}) is unavailable: {}",
            account.account_id, account.display_name, account.reason
        );
    }

    let reference = bank.reference_currency();
    let handle = spawn_bank_actor(bank, &config.actor);
    let mut teller = Teller::new(
        handle.clone(),
        reference.clone(),
        config.accounts.max_login_attempts,
    );

    let outcome = console(&mut teller, &handle, &reference).await;

    // Flush whatever the session changed, however it ended
    tracing::info!("Shutting down teller");
    let shutdown = handle.shutdown().await;
    outcome?;
    shutdown?;
    Ok(())
}

/// Read commands from stdin until `quit`, end of input or ctrl-c
async fn console(
    teller: &mut Teller,
    handle: &BankHandle,
    reference: &Currency,
) -> teller::Result<()> {
    println!("Welcome to the bank. Type `help` for commands.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let command = match Command::parse(&line, reference) {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        match execute(teller, handle, command).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(Error::LockedOut) => {
                println!("{}", Error::LockedOut);
                break;
            }
            Err(e @ (Error::Bank(_) | Error::Io(_))) => return Err(e),
            Err(e) => println!("{}", e),
        }
    }

    Ok(())
}

/// Run one command; `Ok(false)` ends the session
async fn execute(teller: &mut Teller, bank: &BankHandle, command: Command) -> teller::Result<bool> {
    match command {
        Command::Open { name } => {
            let opened = teller.open_account(&name).await?;
            println!(
                "Account {} opened. Your PIN is {}; keep it safe.",
                opened.account_id, opened.pin
            );
        }
        Command::LogIn { account_id, pin } => println!("{}", teller.log_in(account_id, &pin).await?),
        Command::LogOut => println!("{}", teller.log_out()),
        Command::Balance => println!("Balance: {}", teller.balance().await?),
        Command::Statement => {
            let active = teller.active().cloned().ok_or(Error::NotLoggedIn)?;
            let history = teller.statement().await?;
            if history.is_empty() {
                println!("No transactions yet");
            }
            for tx in history {
                let sign = match tx.direction_for(&active) {
                    Some(Direction::Credit) => '+',
                    _ => '-',
                };
                println!("{} {}", sign, tx);
            }
        }
        Command::Deposit {
            amount,
            description,
        } => println!("{}", teller.receive(amount, None, &description).await?),
        Command::Withdraw {
            amount,
            description,
        } => println!("{}", teller.pay(None, amount, None, &description).await?),
        Command::Pay {
            to,
            amount,
            description,
        } => println!("{}", teller.pay(Some(to), amount, None, &description).await?),
        Command::Rename { name } => println!("{}", teller.rename(&name).await?),
        Command::ChangePin { pin } => println!("{}", teller.change_pin(&pin).await?),
        Command::Close => println!("{}", teller.delete_account().await?),
        Command::Accounts => {
            for account in bank.accounts().await? {
                println!(
                    "{}  {:<24} {}  ({} transactions)",
                    account.account_id, account.name, account.balance, account.transaction_count
                );
            }
        }
        Command::Help => println!("{}", USAGE),
        Command::Quit => return Ok(false),
    }

    Ok(true)
}
