//! In-memory ledger, used for tests and local development.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use flux_core::{AccountId, Amount, DonationCredit, PaypalTransaction};

use crate::error::{Result, StoreError};
use crate::LedgerStore;

#[derive(Default)]
struct Inner {
    accounts: HashSet<AccountId>,
    credits: HashMap<AccountId, DonationCredit>,
    transactions: Vec<PaypalTransaction>,
}

/// In-memory implementation of [`LedgerStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a game account, standing in for a row in the login table.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn register_account(&self, account_id: AccountId) -> Result<()> {
        self.lock()?.accounts.insert(account_id);
        Ok(())
    }

    /// Snapshot of every audit row in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn transactions(&self) -> Result<Vec<PaypalTransaction>> {
        Ok(self.lock()?.transactions.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Database("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn account_exists(&self, account_id: AccountId) -> Result<bool> {
        Ok(self.lock()?.accounts.contains(&account_id))
    }

    async fn get_donation_credit(&self, account_id: AccountId) -> Result<Option<DonationCredit>> {
        Ok(self.lock()?.credits.get(&account_id).cloned())
    }

    async fn create_donation_credit(&self, account_id: AccountId) -> Result<DonationCredit> {
        let mut inner = self.lock()?;
        Ok(inner
            .credits
            .entry(account_id)
            .or_insert_with(|| DonationCredit::new(account_id))
            .clone())
    }

    async fn deposit_credits(
        &self,
        account_id: AccountId,
        credits: i64,
        amount: Amount,
        at: DateTime<Utc>,
    ) -> Result<i64> {
        let mut inner = self.lock()?;
        let record = inner
            .credits
            .get_mut(&account_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "donation credit",
                id: account_id.to_string(),
            })?;

        Ok(record.deposit(credits, amount, at))
    }

    async fn put_paypal_transaction(&self, transaction: &PaypalTransaction) -> Result<()> {
        self.lock()?.transactions.push(transaction.clone());
        Ok(())
    }

    async fn has_credited_transaction(&self, txn_id: &str) -> Result<bool> {
        Ok(self
            .lock()?
            .transactions
            .iter()
            .any(|tx| tx.txn_id == txn_id && tx.credits > 0))
    }

    async fn list_paypal_transactions(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PaypalTransaction>> {
        Ok(self
            .lock()?
            .transactions
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}
