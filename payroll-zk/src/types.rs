//! Value types shared between sealing, attestation and the payroll core.

use crate::constants::{AMOUNT_DECIMALS, BASE_UNITS_PER_WHOLE};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,

    #[error("amount must be a non-negative decimal number, got {0:?}")]
    NotANumber(String),

    #[error("amount has more than {AMOUNT_DECIMALS} decimal places")]
    TooPrecise,

    #[error("amount is too large")]
    Overflow,
}

/// An exact, non-negative currency quantity with eight decimal places.
///
/// Stored as integer base units so aggregates never pick up floating-point drift.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_base_units(units: u64) -> Self {
        Self(units)
    }

    pub const fn base_units(self) -> u64 {
        self.0
    }

    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    /// Sum in iteration order, `None` on overflow.
    pub fn checked_sum<I: IntoIterator<Item = Amount>>(iter: I) -> Option<Amount> {
        iter.into_iter().try_fold(Amount::ZERO, Amount::checked_add)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AmountError::Empty);
        }

        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };

        let digits_only = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if (whole.is_empty() && frac.is_empty()) || !digits_only(whole) || !digits_only(frac) {
            return Err(AmountError::NotANumber(s.to_string()));
        }
        if frac.len() > AMOUNT_DECIMALS as usize {
            return Err(AmountError::TooPrecise);
        }

        let whole_units = if whole.is_empty() {
            0
        } else {
            whole.parse::<u64>().map_err(|_| AmountError::Overflow)?
        };

        // Right-pad the fraction to exactly AMOUNT_DECIMALS digits.
        let frac_units = if frac.is_empty() {
            0
        } else {
            let scale = 10u64.pow(AMOUNT_DECIMALS - frac.len() as u32);
            frac.parse::<u64>().map_err(|_| AmountError::NotANumber(s.to_string()))? * scale
        };

        whole_units
            .checked_mul(BASE_UNITS_PER_WHOLE)
            .and_then(|w| w.checked_add(frac_units))
            .map(Amount)
            .ok_or(AmountError::Overflow)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / BASE_UNITS_PER_WHOLE;
        let frac = self.0 % BASE_UNITS_PER_WHOLE;
        if frac == 0 {
            return write!(f, "{whole}");
        }
        let frac = format!("{frac:0width$}", width = AMOUNT_DECIMALS as usize);
        write!(f, "{whole}.{}", frac.trim_end_matches('0'))
    }
}

impl TryFrom<String> for Amount {
    type Error = AmountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Amount> for String {
    fn from(value: Amount) -> Self {
        value.to_string()
    }
}

/// Opaque output of sealing an amount for one owner identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SealedValue(pub String);

impl SealedValue {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SealedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque attestation that a verifier can check without learning the attested amounts.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProofToken(pub String);

impl ProofToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProofToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What an attestation commits to.
///
/// `context` identifies the record the proof is issued for. It is public, and a verifier holding the
/// same bytes can confirm the proof was issued for that record and no other.
#[derive(Clone, Copy, Debug)]
pub enum Statement<'a> {
    /// A single salary. Nothing about the amount is disclosed.
    Salary { amount: Amount, context: &'a [u8] },
    /// Every amount of a payroll batch. Only their total is disclosed.
    Batch { amounts: &'a [Amount], context: &'a [u8] },
}
