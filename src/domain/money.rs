//! Money type
//!
//! Domain primitive for monetary values held as integer minor units.
//! A `Money` is always bound to a `Currency` looked up from an explicit
//! `CurrencyTable`, so cross-currency arithmetic is rejected at the value
//! level instead of at the database boundary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Largest minor-unit value accepted from clients (2^53 - 1, the largest
/// integer a JSON number carries exactly).
pub const MAX_MINOR_UNITS: i64 = 9_007_199_254_740_991;

/// Errors that can occur when creating or combining Money values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(i64),

    #[error("Amount must not be negative (got {0})")]
    Negative(i64),

    #[error("Amount must be an integer number of minor units")]
    NotIntegral,

    #[error("Amount exceeds maximum allowed value ({MAX_MINOR_UNITS})")]
    Overflow,

    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("Currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: String, right: String },
}

/// Currency metadata: ISO code and the number of minor-unit digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency {
    code: String,
    exponent: u8,
}

impl Currency {
    pub fn new(code: impl Into<String>, exponent: u8) -> Self {
        Self {
            code: code.into().to_ascii_uppercase(),
            exponent,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn exponent(&self) -> u8 {
        self.exponent
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

/// The set of currencies the service accepts.
///
/// Built from configuration at startup and passed to whoever constructs
/// Money; there is no process-wide registry.
#[derive(Debug, Clone, Default)]
pub struct CurrencyTable {
    currencies: BTreeMap<String, Currency>,
}

impl CurrencyTable {
    pub fn new(currencies: impl IntoIterator<Item = Currency>) -> Self {
        Self {
            currencies: currencies
                .into_iter()
                .map(|c| (c.code.clone(), c))
                .collect(),
        }
    }

    /// Parse a table from `CODE:EXPONENT` pairs separated by commas,
    /// e.g. `USD:2,JPY:0`.
    pub fn parse(spec: &str) -> Option<Self> {
        let mut currencies = Vec::new();
        for pair in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (code, exponent) = pair.split_once(':')?;
            let code = code.trim();
            if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphabetic()) {
                return None;
            }
            let exponent: u8 = exponent.trim().parse().ok()?;
            currencies.push(Currency::new(code, exponent));
        }
        if currencies.is_empty() {
            return None;
        }
        Some(Self::new(currencies))
    }

    /// Look up a currency by code (case-insensitive)
    pub fn get(&self, code: &str) -> Result<&Currency, MoneyError> {
        self.currencies
            .get(&code.to_ascii_uppercase())
            .ok_or_else(|| MoneyError::UnknownCurrency(code.to_string()))
    }

    /// Build a non-negative Money value in the given currency
    pub fn money(&self, code: &str, minor_units: i64) -> Result<Money, MoneyError> {
        Money::new(minor_units, self.get(code)?.clone())
    }

    /// Build a strictly positive Money value in the given currency
    pub fn positive(&self, code: &str, minor_units: i64) -> Result<Money, MoneyError> {
        Money::positive(minor_units, self.get(code)?.clone())
    }
}

/// Money represents an amount of minor units in a single currency.
///
/// # Invariants
/// - Construction never yields a negative value; only `subtract` can
/// - Both operands of a binary operation share the same currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Money {
    minor_units: i64,
    currency: Currency,
}

impl Money {
    /// Create a zero-or-positive Money value.
    ///
    /// # Errors
    /// - `MoneyError::Negative` if value < 0
    /// - `MoneyError::Overflow` if value exceeds `MAX_MINOR_UNITS`
    pub fn new(minor_units: i64, currency: Currency) -> Result<Self, MoneyError> {
        if minor_units < 0 {
            return Err(MoneyError::Negative(minor_units));
        }
        if minor_units > MAX_MINOR_UNITS {
            return Err(MoneyError::Overflow);
        }
        Ok(Self {
            minor_units,
            currency,
        })
    }

    /// Create a Money value that must be strictly positive.
    pub fn positive(minor_units: i64, currency: Currency) -> Result<Self, MoneyError> {
        if minor_units <= 0 {
            return Err(MoneyError::NotPositive(minor_units));
        }
        Self::new(minor_units, currency)
    }

    pub fn zero(currency: Currency) -> Self {
        Self {
            minor_units: 0,
            currency,
        }
    }

    pub fn minor_units(&self) -> i64 {
        self.minor_units
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency.code != other.currency.code {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency.code.clone(),
                right: other.currency.code.clone(),
            });
        }
        Ok(())
    }

    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        let minor_units = self
            .minor_units
            .checked_add(other.minor_units)
            .filter(|sum| *sum <= MAX_MINOR_UNITS)
            .ok_or(MoneyError::Overflow)?;
        Ok(Money {
            minor_units,
            currency: self.currency.clone(),
        })
    }

    /// Subtract `other`. The result may be negative; callers must check
    /// `is_negative()` before committing it anywhere.
    pub fn subtract(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        let minor_units = self
            .minor_units
            .checked_sub(other.minor_units)
            .ok_or(MoneyError::Overflow)?;
        Ok(Money {
            minor_units,
            currency: self.currency.clone(),
        })
    }

    pub fn less_than(&self, other: &Money) -> Result<bool, MoneyError> {
        self.ensure_same_currency(other)?;
        Ok(self.minor_units < other.minor_units)
    }

    pub fn greater_than(&self, other: &Money) -> Result<bool, MoneyError> {
        self.ensure_same_currency(other)?;
        Ok(self.minor_units > other.minor_units)
    }

    pub fn equals(&self, other: &Money) -> Result<bool, MoneyError> {
        self.ensure_same_currency(other)?;
        Ok(self.minor_units == other.minor_units)
    }

    pub fn is_zero(&self) -> bool {
        self.minor_units == 0
    }

    pub fn is_negative(&self) -> bool {
        self.minor_units < 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exponent = u32::from(self.currency.exponent);
        let sign = if self.minor_units < 0 { "-" } else { "" };
        let abs = self.minor_units.unsigned_abs();
        if exponent == 0 {
            return write!(f, "{}{} {}", sign, abs, self.currency.code);
        }
        let scale = 10u64.pow(exponent);
        write!(
            f,
            "{}{}.{:0width$} {}",
            sign,
            abs / scale,
            abs % scale,
            self.currency.code,
            width = exponent as usize
        )
    }
}

/// Convert a JSON number into minor units.
///
/// Integral floats such as `100.0` are accepted; fractional values, NaN and
/// anything outside the i64 range are rejected.
pub fn minor_units_from_json(number: &serde_json::Number) -> Result<i64, MoneyError> {
    if let Some(value) = number.as_i64() {
        return Ok(value);
    }
    if number.as_u64().is_some() {
        return Err(MoneyError::Overflow);
    }
    let value = number.as_f64().ok_or(MoneyError::NotIntegral)?;
    if !value.is_finite() || value.fract() != 0.0 {
        return Err(MoneyError::NotIntegral);
    }
    if value.abs() > MAX_MINOR_UNITS as f64 {
        return Err(MoneyError::Overflow);
    }
    Ok(value as i64)
}
