//! PayPal transaction audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, AuditId, IpnNotification};

/// One row of the PayPal transactions audit table.
///
/// Mirrors the notification fields plus what the processor resolved from
/// them. Rows are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct PaypalTransaction {
    /// Audit row ID.
    pub id: AuditId,
    /// Account the donation was for, if the custom payload named a valid one.
    pub account_id: Option<AccountId>,
    /// Server name from the custom payload, if any.
    pub server_name: Option<String>,
    /// Credits granted for this notification.
    pub credits: i64,

    pub receiver_email: String,
    pub item_name: String,
    pub item_number: String,
    pub quantity: String,
    pub payment_status: String,
    pub pending_reason: String,
    pub payment_date: String,
    pub mc_gross: String,
    pub mc_fee: String,
    pub tax: String,
    pub mc_currency: String,
    pub txn_id: String,
    pub txn_type: String,
    pub first_name: String,
    pub last_name: String,
    pub address_street: String,
    pub address_city: String,
    pub address_state: String,
    pub address_zip: String,
    pub address_country: String,
    pub address_status: String,
    pub payer_email: String,
    pub payer_status: String,
    pub payment_type: String,
    pub notify_version: String,
    pub verify_sign: String,
    pub receiver_id: String,

    /// When the processor wrote this row.
    pub process_date: DateTime<Utc>,
}

impl PaypalTransaction {
    /// Build an audit row from a notification and what was resolved from it.
    #[must_use]
    pub fn from_notification(
        ipn: &IpnNotification,
        account_id: Option<AccountId>,
        server_name: Option<&str>,
        credits: i64,
        process_date: DateTime<Utc>,
    ) -> Self {
        let field = |key: &str| ipn.get_or_empty(key).to_string();

        Self {
            id: AuditId::generate(),
            account_id,
            server_name: server_name.map(str::to_string),
            credits,
            receiver_email: field("receiver_email"),
            item_name: field("item_name"),
            item_number: field("item_number"),
            quantity: field("quantity"),
            payment_status: field("payment_status"),
            pending_reason: field("pending_reason"),
            payment_date: field("payment_date"),
            mc_gross: field("mc_gross"),
            mc_fee: field("mc_fee"),
            tax: field("tax"),
            mc_currency: field("mc_currency"),
            txn_id: field("txn_id"),
            txn_type: field("txn_type"),
            first_name: field("first_name"),
            last_name: field("last_name"),
            address_street: field("address_street"),
            address_city: field("address_city"),
            address_state: field("address_state"),
            address_zip: field("address_zip"),
            address_country: field("address_country"),
            address_status: field("address_status"),
            payer_email: field("payer_email"),
            payer_status: field("payer_status"),
            payment_type: field("payment_type"),
            notify_version: field("notify_version"),
            verify_sign: field("verify_sign"),
            receiver_id: field("receiver_id"),
            process_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirrors_notification_fields() {
        let ipn: IpnNotification = [
            ("txn_id", "8XJ12345"),
            ("payment_status", "Completed"),
            ("mc_gross", "10.00"),
            ("payer_email", "donor@example.com"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let account_id = AccountId::new(2_000_001).ok();
        let row = PaypalTransaction::from_notification(&ipn, account_id, Some("FluxRO"), 2, Utc::now());

        assert_eq!(row.txn_id, "8XJ12345");
        assert_eq!(row.payment_status, "Completed");
        assert_eq!(row.mc_gross, "10.00");
        assert_eq!(row.payer_email, "donor@example.com");
        assert_eq!(row.item_name, "");
        assert_eq!(row.server_name.as_deref(), Some("FluxRO"));
        assert_eq!(row.credits, 2);
    }
}
