//! Table names and DDL for the donation ledger.
//!
//! Every server group's login database carries the same two Flux tables next
//! to the game server's own `login` table.

use crate::error::{Result, StoreError};

/// Game server accounts (owned by the game server, read-only here).
pub const LOGIN: &str = "login";

/// Credit balance per account.
pub const DONATION_CREDITS: &str = "flux_donation_credits";

/// Append-only PayPal audit rows.
pub const PAYPAL_TRANSACTIONS: &str = "flux_paypal_transactions";

/// Notification fields mirrored verbatim into the audit table, in column
/// order.
pub const AUDIT_TEXT_COLUMNS: [&str; 27] = [
    "receiver_email",
    "item_name",
    "item_number",
    "quantity",
    "payment_status",
    "pending_reason",
    "payment_date",
    "mc_gross",
    "mc_fee",
    "tax",
    "mc_currency",
    "txn_id",
    "txn_type",
    "first_name",
    "last_name",
    "address_street",
    "address_city",
    "address_state",
    "address_zip",
    "address_country",
    "address_status",
    "payer_email",
    "payer_status",
    "payment_type",
    "notify_version",
    "verify_sign",
    "receiver_id",
];

/// Check that a database name is safe to splice into SQL.
///
/// # Errors
///
/// Returns `StoreError::InvalidIdentifier` unless the name is non-empty and
/// made of ASCII letters, digits, `_` and `$`.
pub fn validate_identifier(name: &str) -> Result<&str> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'$');

    if valid {
        Ok(name)
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

/// Fully qualified table name, e.g. `` `ragnarok`.flux_donation_credits ``.
#[must_use]
pub fn qualified(database: &str, table: &str) -> String {
    format!("`{database}`.{table}")
}

/// DDL for the donation credits table.
#[must_use]
pub fn create_donation_credits(database: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
            account_id BIGINT NOT NULL,
            balance BIGINT NOT NULL DEFAULT 0,
            last_donation_date DATETIME NULL,
            last_donation_amount DECIMAL(12, 2) NOT NULL DEFAULT 0,
            PRIMARY KEY (account_id)
        ) ENGINE=InnoDB",
        qualified(database, DONATION_CREDITS)
    )
}

/// DDL for the PayPal transactions audit table.
#[must_use]
pub fn create_paypal_transactions(database: &str) -> String {
    let text_columns: String = AUDIT_TEXT_COLUMNS
        .iter()
        .map(|c| format!("            {c} VARCHAR(255) NOT NULL DEFAULT '',\n"))
        .collect();

    format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id CHAR(26) NOT NULL,
            account_id BIGINT NULL,
            server_name VARCHAR(255) NULL,
            credits BIGINT NOT NULL DEFAULT 0,
{text_columns}            process_date DATETIME NOT NULL,
            PRIMARY KEY (id),
            KEY txn_id (txn_id)
        ) ENGINE=InnoDB",
        qualified(database, PAYPAL_TRANSACTIONS)
    )
}
