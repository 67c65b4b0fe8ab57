//! Donation credit balances.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, Amount};

/// Per-account donation credit record.
///
/// Created lazily the first time an account donates. Only the notification
/// processor changes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationCredit {
    /// The credited game account.
    pub account_id: AccountId,

    /// Credits available to spend in-game.
    pub balance: i64,

    /// When the last credited donation was processed.
    pub last_donation_date: Option<DateTime<Utc>>,

    /// Gross amount of the last credited donation.
    pub last_donation_amount: Amount,
}

impl DonationCredit {
    /// Create an empty record for a first-time donor.
    #[must_use]
    pub const fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            balance: 0,
            last_donation_date: None,
            last_donation_amount: Amount::ZERO,
        }
    }

    /// Apply a deposit and return the new balance.
    pub fn deposit(&mut self, credits: i64, amount: Amount, at: DateTime<Utc>) -> i64 {
        self.balance += credits;
        self.last_donation_amount = amount;
        self.last_donation_date = Some(at);
        self.balance
    }
}

/// Exchange a gross donation for credits: `floor(gross / rate)`.
///
/// Returns 0 for non-positive amounts or rates, so the result is never
/// negative (refund notifications carry negative gross amounts).
#[must_use]
pub fn compute_credits(gross: Amount, rate: Amount) -> i64 {
    if !gross.is_positive() || !rate.is_positive() {
        return 0;
    }
    gross.cents() / rate.cents()
}
