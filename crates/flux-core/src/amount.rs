//! Fixed-point monetary amounts.
//!
//! PayPal reports amounts as decimal strings (`mc_gross=10.00`). They are held
//! as integer cents so credit exchange never depends on float rounding.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FluxError;

/// A monetary amount with two decimal places, stored as cents.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(i64);

impl Amount {
    /// The zero amount.
    pub const ZERO: Self = Self(0);

    /// Create an amount from integer cents.
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Return the amount in cents.
    #[must_use]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Whether the amount is strictly positive.
    #[must_use]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

impl FromStr for Amount {
    type Err = FluxError;

    /// Parse a decimal string such as `10`, `10.5`, `-3.25` or `.99`.
    ///
    /// Digits beyond the second decimal place are truncated.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FluxError::InvalidAmount(s.to_string());
        let trimmed = s.trim();

        let (negative, digits) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            Some(_) => (false, trimmed),
            None => return Err(invalid()),
        };

        let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit())
            || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };

        let mut fraction_cents = 0i64;
        for (i, b) in fraction.bytes().take(2).enumerate() {
            let digit = i64::from(b - b'0');
            fraction_cents += if i == 0 { digit * 10 } else { digit };
        }

        let cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(fraction_cents))
            .ok_or_else(invalid)?;

        Ok(Self(if negative { -cents } else { cents }))
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({self})")
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl TryFrom<String> for Amount {
    type Error = FluxError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        amount.to_string()
    }
}
