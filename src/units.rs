//! Exact micro-unit arithmetic
//!
//! Fees, burns, and balances are indivisible on-chain micro-units (mutez).
//! All monetary math happens on integer micro-units; decimal tez strings are
//! parsed and formatted without ever touching floating point.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Fractional digits of the tez unit
pub const TEZ_DECIMALS: u32 = 6;

/// Micro-units per tez
pub const MUTEZ_PER_TEZ: u64 = 1_000_000;

/// Amount parsing errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseMutezError {
    #[error("Empty amount")]
    Empty,
    #[error("Invalid digit in amount: {0}")]
    InvalidDigit(String),
    #[error("Too many fractional digits: {0}")]
    TooManyFractionalDigits(String),
    #[error("Amount out of range: {0}")]
    Overflow(String),
}

/// An exact amount of micro-units
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Mutez(u64);

impl Mutez {
    /// Zero micro-units
    pub const ZERO: Mutez = Mutez(0);

    /// Wrap a raw micro-unit count
    pub const fn new(value: u64) -> Self {
        Mutez(value)
    }

    /// Raw micro-unit count
    pub const fn get(self) -> u64 {
        self.0
    }

    /// True for an exact-zero amount
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Exact addition, saturating at the numeric ceiling
    pub fn saturating_add(self, other: Mutez) -> Mutez {
        Mutez(self.0.saturating_add(other.0))
    }

    /// Scale by an integer factor, saturating at the numeric ceiling
    pub fn saturating_mul(self, factor: u64) -> Mutez {
        Mutez(self.0.saturating_mul(factor))
    }

    /// Parse an integer base-unit string, e.g. `"1000000"` micro-units
    pub fn from_base_str(value: &str) -> Result<Mutez, ParseMutezError> {
        if value.is_empty() {
            return Err(ParseMutezError::Empty);
        }
        if !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseMutezError::InvalidDigit(value.to_string()));
        }
        value
            .parse::<u64>()
            .map(Mutez)
            .map_err(|_| ParseMutezError::Overflow(value.to_string()))
    }

    /// Parse a decimal tez string with at most six fractional digits,
    /// e.g. `"1.42"` is 1_420_000 micro-units
    pub fn from_tez_str(value: &str) -> Result<Mutez, ParseMutezError> {
        if value.is_empty() {
            return Err(ParseMutezError::Empty);
        }
        let (int_part, frac_part) = match value.split_once('.') {
            Some((i, f)) => (i, f),
            None => (value, ""),
        };
        if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseMutezError::InvalidDigit(value.to_string()));
        }
        if frac_part.len() > TEZ_DECIMALS as usize {
            return Err(ParseMutezError::TooManyFractionalDigits(value.to_string()));
        }
        if value.contains('.') && (frac_part.is_empty() || !frac_part.bytes().all(|b| b.is_ascii_digit())) {
            return Err(ParseMutezError::InvalidDigit(value.to_string()));
        }

        let whole: u64 = int_part
            .parse()
            .map_err(|_| ParseMutezError::Overflow(value.to_string()))?;
        let mut frac: u64 = 0;
        if !frac_part.is_empty() {
            frac = frac_part
                .parse()
                .map_err(|_| ParseMutezError::InvalidDigit(value.to_string()))?;
            for _ in frac_part.len()..TEZ_DECIMALS as usize {
                frac *= 10;
            }
        }
        whole
            .checked_mul(MUTEZ_PER_TEZ)
            .and_then(|w| w.checked_add(frac))
            .map(Mutez)
            .ok_or_else(|| ParseMutezError::Overflow(value.to_string()))
    }

    /// Format as a decimal tez string with trailing zeros trimmed,
    /// e.g. 1_420_000 renders as `"1.42"`
    pub fn to_tez_string(self) -> String {
        let whole = self.0 / MUTEZ_PER_TEZ;
        let frac = self.0 % MUTEZ_PER_TEZ;
        if frac == 0 {
            return whole.to_string();
        }
        let mut out = format!("{}.{:06}", whole, frac);
        while out.ends_with('0') {
            out.pop();
        }
        out
    }
}

impl fmt::Display for Mutez {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
