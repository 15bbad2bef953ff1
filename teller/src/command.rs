//! Line commands understood by the teller console

use crate::{Error, Result};
use bank_core::{AccountId, Currency, Money};
use rust_decimal::Decimal;

/// One console command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `open <name>`
    Open { name: String },
    /// `login <account> <pin>`
    LogIn { account_id: AccountId, pin: String },
    /// `logout`
    LogOut,
    /// `balance`
    Balance,
    /// `statement`
    Statement,
    /// `deposit <amount> [description]`
    Deposit { amount: Money, description: String },
    /// `withdraw <amount> [description]`
    Withdraw { amount: Money, description: String },
    /// `pay <account> <amount> [description]`
    Pay {
        to: AccountId,
        amount: Money,
        description: String,
    },
    /// `rename <name>`
    Rename { name: String },
    /// `pin <new pin>`
    ChangePin { pin: String },
    /// `close`
    Close,
    /// `accounts`
    Accounts,
    /// `help`
    Help,
    /// `quit`
    Quit,
}

/// Usage text for `help`
pub const USAGE: &str = "\
open <name>                      open an account and log in
login <account> <pin>            log in
logout                           log out
balance                          show balance
statement                        list transactions
deposit <amount> [description]   receive money from outside the bank
withdraw <amount> [description]  pay money to outside the bank
pay <account> <amount> [desc]    pay another account
rename <name>                    rename the account
pin <new pin>                    change the PIN
close                            pay out the balance and close the account
accounts                         list all accounts
quit                             exit";

impl Command {
    /// Parse one input line; amounts are in `currency`
    pub fn parse(line: &str, currency: &Currency) -> Result<Self> {
        let line = line.trim();
        let (verb, rest) = line
            .split_once(char::is_whitespace)
            .map(|(verb, rest)| (verb, rest.trim()))
            .unwrap_or((line, ""));

        let command = match verb.to_ascii_lowercase().as_str() {
            "open" => Command::Open {
                name: required(rest, "name")?.to_string(),
            },
            "login" => {
                let (account, pin) = split_first(rest);
                Command::LogIn {
                    account_id: account_id(account)?,
                    pin: required(pin, "PIN")?.to_string(),
                }
            }
            "logout" => Command::LogOut,
            "balance" => Command::Balance,
            "statement" => Command::Statement,
            "deposit" => {
                let (amount, description) = split_first(rest);
                Command::Deposit {
                    amount: money(amount, currency)?,
                    description: description.to_string(),
                }
            }
            "withdraw" => {
                let (amount, description) = split_first(rest);
                Command::Withdraw {
                    amount: money(amount, currency)?,
                    description: description.to_string(),
                }
            }
            "pay" => {
                let (to, rest) = split_first(rest);
                let (amount, description) = split_first(rest);
                Command::Pay {
                    to: account_id(to)?,
                    amount: money(amount, currency)?,
                    description: description.to_string(),
                }
            }
            "rename" => Command::Rename {
                name: required(rest, "name")?.to_string(),
            },
            "pin" => Command::ChangePin {
                pin: required(rest, "PIN")?.to_string(),
            },
            "close" => Command::Close,
            "accounts" => Command::Accounts,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            "" => return Err(Error::InvalidInput("empty command".to_string())),
            other => return Err(Error::InvalidInput(format!("unknown command {:?}", other))),
        };

        Ok(command)
    }
}

fn split_first(input: &str) -> (&str, &str) {
    input
        .split_once(char::is_whitespace)
        .map(|(first, rest)| (first, rest.trim()))
        .unwrap_or((input, ""))
}

fn required<'a>(value: &'a str, what: &str) -> Result<&'a str> {
    if value.is_empty() {
        return Err(Error::InvalidInput(format!("missing {}", what)));
    }
    Ok(value)
}

fn account_id(value: &str) -> Result<AccountId> {
    AccountId::parse(required(value, "account number")?)
        .ok_or_else(|| Error::InvalidInput(format!("{:?} is not a 10-digit account number", value)))
}

fn money(value: &str, currency: &Currency) -> Result<Money> {
    let amount: Decimal = required(value, "amount")?
        .trim_start_matches('$')
        .parse()
        .map_err(|_| Error::InvalidInput(format!("{:?} is not an amount", value)))?;
    if amount <= Decimal::ZERO {
        return Err(Error::InvalidInput(format!("{} must be greater than zero", amount)));
    }
    Ok(Money::new(amount, currency.clone()))
}
