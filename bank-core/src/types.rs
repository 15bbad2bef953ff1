//! Core value types for the bank
//!
//! All types are designed for:
//! - Exact arithmetic (Decimal for money, never floats)
//! - Immutability (new values instead of mutation)
//! - Explicit currency handling (no implicit cross-currency maths)

use crate::{Error, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Number of digits in an account number
pub const ACCOUNT_ID_DIGITS: usize = 10;

/// Exclusive upper bound for numeric account ids
pub const ACCOUNT_ID_SPACE: u64 = 10_000_000_000;

/// Reference currency for balances and `usd_equivalent`
pub const REFERENCE_CURRENCY: &str = "USD";

/// Precision used for currencies without a meaningful minor unit
pub const NO_MINOR_UNIT_PRECISION: u32 = 10;

/// Account identifier (10-digit account number)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create from a number, zero padded to ten digits
    pub fn from_number(number: u64) -> Self {
        Self(format!("{:0width$}", number % ACCOUNT_ID_SPACE, width = ACCOUNT_ID_DIGITS))
    }

    /// Parse a user-supplied account number
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.len() == ACCOUNT_ID_DIGITS && s.bytes().all(|b| b.is_ascii_digit()) {
            Some(Self(s.to_string()))
        } else {
            None
        }
    }

    /// Id of the house account
    pub fn house() -> Self {
        Self::from_number(0)
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated currency: ISO 4217 code plus minor-unit precision
///
/// Only obtainable through [`CurrencyTable::get`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Currency {
    code: String,
    minor_units: u32,
}

impl Currency {
    /// ISO 4217 code
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Decimal places of the smallest denomination
    pub fn minor_units(&self) -> u32 {
        self.minor_units
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)
    }
}

/// Read-only mapping from currency code to minor-unit precision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyTable {
    minor_units: BTreeMap<String, u32>,
}

impl CurrencyTable {
    /// Active ISO 4217 codes with their minor units
    ///
    /// Precious metals and fund codes without a minor unit get
    /// [`NO_MINOR_UNIT_PRECISION`].
    pub fn iso4217() -> Self {
        const ENTRIES: &[(&str, u32)] = &[
            ("AED", 2),
            ("AFN", 2),
            ("ALL", 2),
            ("AMD", 2),
            ("ANG", 2),
            ("AOA", 2),
            ("ARS", 2),
            ("AUD", 2),
            ("AWG", 2),
            ("AZN", 2),
            ("BAM", 2),
            ("BBD", 2),
            ("BDT", 2),
            ("BGN", 2),
            ("BHD", 3),
            ("BIF", 0),
            ("BMD", 2),
            ("BND", 2),
            ("BOB", 2),
            ("BOV", 2),
            ("BRL", 2),
            ("BSD", 2),
            ("BTN", 2),
            ("BWP", 2),
            ("BYN", 2),
            ("BZD", 2),
            ("CAD", 2),
            ("CDF", 2),
            ("CHE", 2),
            ("CHF", 2),
            ("CHW", 2),
            ("CLF", 4),
            ("CLP", 0),
            ("CNY", 2),
            ("COP", 2),
            ("COU", 2),
            ("CRC", 2),
            ("CUC", 2),
            ("CUP", 2),
            ("CVE", 2),
            ("CZK", 2),
            ("DJF", 0),
            ("DKK", 2),
            ("DOP", 2),
            ("DZD", 2),
            ("EGP", 2),
            ("ERN", 2),
            ("ETB", 2),
            ("EUR", 2),
            ("FJD", 2),
            ("FKP", 2),
            ("GBP", 2),
            ("GEL", 2),
            ("GHS", 2),
            ("GIP", 2),
            ("GMD", 2),
            ("GNF", 0),
            ("GTQ", 2),
            ("GYD", 2),
            ("HKD", 2),
            ("HNL", 2),
            ("HTG", 2),
            ("HUF", 2),
            ("IDR", 2),
            ("ILS", 2),
            ("INR", 2),
            ("IQD", 3),
            ("IRR", 2),
            ("ISK", 0),
            ("JMD", 2),
            ("JOD", 3),
            ("JPY", 0),
            ("KES", 2),
            ("KGS", 2),
            ("KHR", 2),
            ("KMF", 0),
            ("KPW", 2),
            ("KRW", 0),
            ("KWD", 3),
            ("KYD", 2),
            ("KZT", 2),
            ("LAK", 2),
            ("LBP", 2),
            ("LKR", 2),
            ("LRD", 2),
            ("LSL", 2),
            ("LYD", 3),
            ("MAD", 2),
            ("MDL", 2),
            ("MGA", 2),
            ("MKD", 2),
            ("MMK", 2),
            ("MNT", 2),
            ("MOP", 2),
            ("MRU", 2),
            ("MUR", 2),
            ("MVR", 2),
            ("MWK", 2),
            ("MXN", 2),
            ("MXV", 2),
            ("MYR", 2),
            ("MZN", 2),
            ("NAD", 2),
            ("NGN", 2),
            ("NIO", 2),
            ("NOK", 2),
            ("NPR", 2),
            ("NZD", 2),
            ("OMR", 3),
            ("PAB", 2),
            ("PEN", 2),
            ("PGK", 2),
            ("PHP", 2),
            ("PKR", 2),
            ("PLN", 2),
            ("PYG", 0),
            ("QAR", 2),
            ("RON", 2),
            ("RSD", 2),
            ("RUB", 2),
            ("RWF", 0),
            ("SAR", 2),
            ("SBD", 2),
            ("SCR", 2),
            ("SDG", 2),
            ("SEK", 2),
            ("SGD", 2),
            ("SHP", 2),
            ("SLE", 2),
            ("SLL", 2),
            ("SOS", 2),
            ("SRD", 2),
            ("SSP", 2),
            ("STN", 2),
            ("SVC", 2),
            ("SYP", 2),
            ("SZL", 2),
            ("THB", 2),
            ("TJS", 2),
            ("TMT", 2),
            ("TND", 3),
            ("TOP", 2),
            ("TRY", 2),
            ("TTD", 2),
            ("TWD", 2),
            ("TZS", 2),
            ("UAH", 2),
            ("UGX", 0),
            ("USD", 2),
            ("USN", 2),
            ("UYI", 0),
            ("UYU", 2),
            ("UYW", 4),
            ("UZS", 2),
            ("VED", 2),
            ("VES", 2),
            ("VND", 0),
            ("VUV", 0),
            ("WST", 2),
            ("XAF", 0),
            ("XAG", NO_MINOR_UNIT_PRECISION),
            ("XAU", NO_MINOR_UNIT_PRECISION),
            ("XBA", NO_MINOR_UNIT_PRECISION),
            ("XBB", NO_MINOR_UNIT_PRECISION),
            ("XBC", NO_MINOR_UNIT_PRECISION),
            ("XBD", NO_MINOR_UNIT_PRECISION),
            ("XCD", 2),
            ("XDR", NO_MINOR_UNIT_PRECISION),
            ("XOF", 0),
            ("XPD", NO_MINOR_UNIT_PRECISION),
            ("XPF", 0),
            ("XPT", NO_MINOR_UNIT_PRECISION),
            ("XSU", NO_MINOR_UNIT_PRECISION),
            ("XUA", NO_MINOR_UNIT_PRECISION),
            ("YER", 2),
            ("ZAR", 2),
            ("ZMW", 2),
            ("ZWL", 2),
        ];

        Self {
            minor_units: ENTRIES
                .iter()
                .map(|(code, units)| (code.to_string(), *units))
                .collect(),
        }
    }

    /// Build a table from explicit entries
    pub fn from_entries<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, u32)>,
        S: AsRef<str>,
    {
        let mut minor_units = BTreeMap::new();
        for (code, units) in entries {
            let code = normalize_code(code.as_ref())
                .ok_or_else(|| Error::InvalidCurrency(code.as_ref().to_string()))?;
            if units > NO_MINOR_UNIT_PRECISION {
                return Err(Error::Config(format!(
                    "Minor units for {} must be at most {}, got {}",
                    code, NO_MINOR_UNIT_PRECISION, units
                )));
            }
            minor_units.insert(code, units);
        }

        if !minor_units.contains_key(REFERENCE_CURRENCY) {
            return Err(Error::Config(format!(
                "Currency table must contain the reference currency {}",
                REFERENCE_CURRENCY
            )));
        }

        Ok(Self { minor_units })
    }

    /// Parse a TOML table of `CODE = minor_units` lines
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let entries: BTreeMap<String, u32> = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse currency table: {}", e)))?;
        Self::from_entries(entries)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Look up a currency code
    pub fn get(&self, code: &str) -> Result<Currency> {
        let normalized =
            normalize_code(code).ok_or_else(|| Error::InvalidCurrency(code.to_string()))?;

        self.minor_units
            .get(&normalized)
            .map(|&minor_units| Currency {
                code: normalized.clone(),
                minor_units,
            })
            .ok_or(Error::InvalidCurrency(normalized))
    }

    /// The reference (USD) currency
    pub fn reference(&self) -> Currency {
        // Presence is checked at construction.
        Currency {
            code: REFERENCE_CURRENCY.to_string(),
            minor_units: self.minor_units.get(REFERENCE_CURRENCY).copied().unwrap_or(2),
        }
    }

    /// Create money in the given currency code
    pub fn money(&self, amount: Decimal, code: &str) -> Result<Money> {
        Ok(Money::new(amount, self.get(code)?))
    }

    /// Check whether a code is known
    pub fn contains(&self, code: &str) -> bool {
        self.get(code).is_ok()
    }

    /// Number of currencies in the table
    pub fn len(&self) -> usize {
        self.minor_units.len()
    }

    /// True if the table is empty
    pub fn is_empty(&self) -> bool {
        self.minor_units.is_empty()
    }
}

impl Default for CurrencyTable {
    fn default() -> Self {
        Self::iso4217()
    }
}

fn normalize_code(code: &str) -> Option<String> {
    let code = code.trim();
    if code.len() == 3 && code.bytes().all(|b| b.is_ascii_alphabetic()) {
        Some(code.to_ascii_uppercase())
    } else {
        None
    }
}

/// Exact decimal amount tagged with a currency
///
/// The amount is always quantized to the currency's minor units with
/// round-half-even, so `Money::new(10, USD)` holds `10.00`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    /// Create money, quantizing the amount
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self {
            amount: quantize(amount, currency.minor_units),
            currency,
        }
    }

    /// Parse a decimal string
    pub fn parse(amount: &str, currency: Currency) -> Result<Self> {
        let decimal: Decimal = amount
            .trim()
            .parse()
            .map_err(|_| Error::InvalidAmount(amount.to_string()))?;
        Ok(Self::new(decimal, currency))
    }

    /// Zero in the given currency
    pub fn zero(currency: Currency) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    /// Quantized amount
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Currency
    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    /// Amount > 0
    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    /// Amount == 0
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Convert into another currency at `rate` target units per source unit
    pub fn convert(&self, target: &Currency, rate: Decimal) -> Result<Money> {
        if rate <= Decimal::ZERO {
            return Err(Error::InvalidRate(rate));
        }

        let converted = self.amount.checked_mul(rate).ok_or(Error::Overflow)?;
        Ok(Money::new(converted, target.clone()))
    }

    /// Compare within the same currency
    pub fn try_cmp(&self, other: &Money) -> Result<Ordering> {
        self.ensure_same_currency(other)?;
        Ok(self.amount.cmp(&other.amount))
    }

    /// Add within the same currency
    pub fn checked_add(&self, other: &Money) -> Result<Money> {
        self.ensure_same_currency(other)?;
        let sum = self.amount.checked_add(other.amount).ok_or(Error::Overflow)?;
        Ok(Money::new(sum, self.currency.clone()))
    }

    /// Subtract within the same currency
    pub fn checked_sub(&self, other: &Money) -> Result<Money> {
        self.ensure_same_currency(other)?;
        let difference = self.amount.checked_sub(other.amount).ok_or(Error::Overflow)?;
        Ok(Money::new(difference, self.currency.clone()))
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<()> {
        if self.currency.code != other.currency.code {
            return Err(Error::CurrencyMismatch {
                left: self.currency.code.clone(),
                right: other.currency.code.clone(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

/// Round half-even to `minor_units` and fix the scale
pub(crate) fn quantize(amount: Decimal, minor_units: u32) -> Decimal {
    let mut quantized =
        amount.round_dp_with_strategy(minor_units, RoundingStrategy::MidpointNearestEven);
    quantized.rescale(minor_units);
    quantized
}

/// Account balance as reported to callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Balance {
    /// House account: no limit
    Unbounded,
    /// Regular account
    Finite(Money),
}

impl Balance {
    /// True if the balance can cover `amount` (exact zero-out allowed)
    pub fn covers(&self, amount: &Money) -> bool {
        match self {
            Balance::Unbounded => true,
            Balance::Finite(balance) => balance
                .try_cmp(amount)
                .map(|ordering| ordering != Ordering::Less)
                .unwrap_or(false),
        }
    }

    /// Finite amount, if any
    pub fn as_money(&self) -> Option<&Money> {
        match self {
            Balance::Unbounded => None,
            Balance::Finite(money) => Some(money),
        }
    }

    /// True for the house account
    pub fn is_unbounded(&self) -> bool {
        matches!(self, Balance::Unbounded)
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Balance::Unbounded => write!(f, "unlimited"),
            Balance::Finite(money) => write!(f, "{}", money),
        }
    }
}
