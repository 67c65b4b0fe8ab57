//! MySQL ledger backed by a server group's login database.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::Row;

use flux_core::{AccountId, Amount, AuditId, DonationCredit, PaypalTransaction};

use crate::error::{Result, StoreError};
use crate::schema::{self, AUDIT_TEXT_COLUMNS, DONATION_CREDITS, LOGIN, PAYPAL_TRANSACTIONS};
use crate::LedgerStore;

/// MySQL-backed ledger for one server group.
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
    database: String,
}

impl MySqlStore {
    /// Connect to the server group's database server.
    ///
    /// `database` is the login database holding the `login` table; tables
    /// are always qualified with it, so the connection URL may point at any
    /// database on the same server.
    ///
    /// # Errors
    ///
    /// Returns an error if `database` is not a plain identifier or the
    /// connection cannot be established.
    pub async fn connect(url: &str, database: &str) -> Result<Self> {
        schema::validate_identifier(database)?;

        let pool = MySqlPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await?;

        Ok(Self::from_pool(pool, database.to_string()))
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: MySqlPool, database: String) -> Self {
        Self { pool, database }
    }

    /// The login database name.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Create the Flux tables if they do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the DDL fails.
    pub async fn ensure_schema(&self) -> Result<()> {
        schema::validate_identifier(&self.database)?;

        sqlx::query(&schema::create_donation_credits(&self.database))
            .execute(&self.pool)
            .await?;
        sqlx::query(&schema::create_paypal_transactions(&self.database))
            .execute(&self.pool)
            .await?;

        tracing::info!(database = %self.database, "Donation ledger schema ready");
        Ok(())
    }

    fn table(&self, name: &str) -> String {
        schema::qualified(&self.database, name)
    }

    fn credit_from_row(row: &MySqlRow) -> Result<DonationCredit> {
        let account_id: i64 = row.try_get("account_id")?;
        let last_date: Option<NaiveDateTime> = row.try_get("last_donation_date")?;
        let last_amount: String = row.try_get("last_donation_amount")?;

        Ok(DonationCredit {
            account_id: AccountId::new(account_id)
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
            balance: row.try_get("balance")?,
            last_donation_date: last_date.map(|d| d.and_utc()),
            last_donation_amount: last_amount
                .parse()
                .map_err(|e: flux_core::FluxError| StoreError::Serialization(e.to_string()))?,
        })
    }

    fn transaction_from_row(row: &MySqlRow) -> Result<PaypalTransaction> {
        let id: String = row.try_get("id")?;
        let account_id: Option<i64> = row.try_get("account_id")?;
        let process_date: NaiveDateTime = row.try_get("process_date")?;
        let text = |column: &str| -> Result<String> { Ok(row.try_get(column)?) };

        Ok(PaypalTransaction {
            id: id
                .parse::<AuditId>()
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
            account_id: account_id.and_then(|id| AccountId::new(id).ok()),
            server_name: row.try_get("server_name")?,
            credits: row.try_get("credits")?,
            receiver_email: text("receiver_email")?,
            item_name: text("item_name")?,
            item_number: text("item_number")?,
            quantity: text("quantity")?,
            payment_status: text("payment_status")?,
            pending_reason: text("pending_reason")?,
            payment_date: text("payment_date")?,
            mc_gross: text("mc_gross")?,
            mc_fee: text("mc_fee")?,
            tax: text("tax")?,
            mc_currency: text("mc_currency")?,
            txn_id: text("txn_id")?,
            txn_type: text("txn_type")?,
            first_name: text("first_name")?,
            last_name: text("last_name")?,
            address_street: text("address_street")?,
            address_city: text("address_city")?,
            address_state: text("address_state")?,
            address_zip: text("address_zip")?,
            address_country: text("address_country")?,
            address_status: text("address_status")?,
            payer_email: text("payer_email")?,
            payer_status: text("payer_status")?,
            payment_type: text("payment_type")?,
            notify_version: text("notify_version")?,
            verify_sign: text("verify_sign")?,
            receiver_id: text("receiver_id")?,
            process_date: process_date.and_utc(),
        })
    }
}

/// Text columns of an audit row, in `AUDIT_TEXT_COLUMNS` order.
fn audit_text_values(tx: &PaypalTransaction) -> [&str; 27] {
    [
        &tx.receiver_email,
        &tx.item_name,
        &tx.item_number,
        &tx.quantity,
        &tx.payment_status,
        &tx.pending_reason,
        &tx.payment_date,
        &tx.mc_gross,
        &tx.mc_fee,
        &tx.tax,
        &tx.mc_currency,
        &tx.txn_id,
        &tx.txn_type,
        &tx.first_name,
        &tx.last_name,
        &tx.address_street,
        &tx.address_city,
        &tx.address_state,
        &tx.address_zip,
        &tx.address_country,
        &tx.address_status,
        &tx.payer_email,
        &tx.payer_status,
        &tx.payment_type,
        &tx.notify_version,
        &tx.verify_sign,
        &tx.receiver_id,
    ]
}

const CREDIT_COLUMNS: &str = "account_id, balance, last_donation_date, \
     CAST(last_donation_amount AS CHAR) AS last_donation_amount";

#[async_trait]
impl LedgerStore for MySqlStore {
    async fn account_exists(&self, account_id: AccountId) -> Result<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE sex <> 'S' AND level >= 0 AND account_id = ?",
            self.table(LOGIN)
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(account_id.get())
            .fetch_one(&self.pool)
            .await?;

        Ok(count > 0)
    }

    async fn get_donation_credit(&self, account_id: AccountId) -> Result<Option<DonationCredit>> {
        let sql = format!(
            "SELECT {CREDIT_COLUMNS} FROM {} WHERE account_id = ?",
            self.table(DONATION_CREDITS)
        );
        sqlx::query(&sql)
            .bind(account_id.get())
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(Self::credit_from_row)
            .transpose()
    }

    async fn create_donation_credit(&self, account_id: AccountId) -> Result<DonationCredit> {
        let sql = format!(
            "INSERT IGNORE INTO {} (account_id, balance, last_donation_date, last_donation_amount) \
             VALUES (?, 0, NULL, 0)",
            self.table(DONATION_CREDITS)
        );
        sqlx::query(&sql)
            .bind(account_id.get())
            .execute(&self.pool)
            .await?;

        self.get_donation_credit(account_id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: "donation credit",
                id: account_id.to_string(),
            })
    }

    async fn deposit_credits(
        &self,
        account_id: AccountId,
        credits: i64,
        amount: Amount,
        at: DateTime<Utc>,
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let update = format!(
            "UPDATE {} SET balance = balance + ?, last_donation_amount = ?, last_donation_date = ? \
             WHERE account_id = ?",
            self.table(DONATION_CREDITS)
        );
        let result = sqlx::query(&update)
            .bind(credits)
            .bind(amount.to_string())
            .bind(at.naive_utc())
            .bind(account_id.get())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "donation credit",
                id: account_id.to_string(),
            });
        }

        let select = format!(
            "SELECT balance FROM {} WHERE account_id = ?",
            self.table(DONATION_CREDITS)
        );
        let balance: i64 = sqlx::query_scalar(&select)
            .bind(account_id.get())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(balance)
    }

    async fn put_paypal_transaction(&self, transaction: &PaypalTransaction) -> Result<()> {
        let columns = AUDIT_TEXT_COLUMNS.join(", ");
        let placeholders = vec!["?"; AUDIT_TEXT_COLUMNS.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} (id, account_id, server_name, credits, {columns}, process_date) \
             VALUES (?, ?, ?, ?, {placeholders}, ?)",
            self.table(PAYPAL_TRANSACTIONS)
        );

        let mut query = sqlx::query(&sql)
            .bind(transaction.id.to_string())
            .bind(transaction.account_id.map(|id| id.get()))
            .bind(transaction.server_name.as_deref())
            .bind(transaction.credits);
        for value in audit_text_values(transaction) {
            query = query.bind(value);
        }
        query
            .bind(transaction.process_date.naive_utc())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn has_credited_transaction(&self, txn_id: &str) -> Result<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE txn_id = ? AND credits > 0",
            self.table(PAYPAL_TRANSACTIONS)
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(txn_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count > 0)
    }

    async fn list_paypal_transactions(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PaypalTransaction>> {
        let sql = format!(
            "SELECT * FROM {} ORDER BY process_date DESC, id DESC LIMIT ? OFFSET ?",
            self.table(PAYPAL_TRANSACTIONS)
        );
        let rows = sqlx::query(&sql)
            .bind(u64::try_from(limit).unwrap_or(u64::MAX))
            .bind(u64::try_from(offset).unwrap_or(u64::MAX))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::transaction_from_row).collect()
    }
}
