//! PayPal Instant Payment Notification payloads.

use encoding_rs::{Encoding, UTF_8};
use percent_encoding::percent_decode;
use serde::{Deserialize, Serialize};

use crate::Amount;

/// `payment_status` value for a settled payment.
pub const PAYMENT_COMPLETED: &str = "Completed";

/// `txn_type` value for a single "Buy Now"/donate button payment.
pub const WEB_ACCEPT: &str = "web_accept";

/// The fields of one IPN webhook, in the order PayPal sent them.
///
/// Order matters: the verification call-back must echo the fields exactly as
/// received. A notification parsed from a webhook body keeps that body so the
/// echo is byte-for-byte, whatever `charset` PayPal used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IpnNotification {
    fields: Vec<(String, String)>,
    #[serde(skip)]
    raw_body: Option<Vec<u8>>,
}

impl IpnNotification {
    /// Build a notification from decoded form pairs.
    #[must_use]
    pub fn from_pairs(fields: Vec<(String, String)>) -> Self {
        Self {
            fields,
            raw_body: None,
        }
    }

    /// Parse an `application/x-www-form-urlencoded` webhook body.
    ///
    /// Values are decoded with the encoding named by the notification's own
    /// `charset` field (PayPal's default is `windows-1252`). A missing or
    /// unknown charset decodes as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn from_form_body(body: &[u8]) -> Self {
        let pairs: Vec<(Vec<u8>, Vec<u8>)> = body
            .split(|&b| b == b'&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let mut parts = pair.splitn(2, |&b| b == b'=');
                let key = parts.next().unwrap_or_default();
                let value = parts.next().unwrap_or_default();
                (form_decode(key), form_decode(value))
            })
            .collect();

        let encoding = pairs
            .iter()
            .rev()
            .find(|(key, _)| key == b"charset")
            .and_then(|(_, label)| Encoding::for_label(label))
            .unwrap_or(UTF_8);

        let fields = pairs
            .iter()
            .map(|(key, value)| (decode_text(encoding, key), decode_text(encoding, value)))
            .collect();

        Self {
            fields,
            raw_body: Some(body.to_vec()),
        }
    }

    /// The webhook body exactly as received, when parsed from one.
    #[must_use]
    pub fn raw_body(&self) -> Option<&[u8]> {
        self.raw_body.as_deref()
    }

    /// All fields in arrival order.
    #[must_use]
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the notification carries no fields at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Look up a field. When a key repeats, the last value wins.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Look up a field, treating absent as empty.
    #[must_use]
    pub fn get_or_empty(&self, key: &str) -> &str {
        self.get(key).unwrap_or_default()
    }

    /// PayPal transaction ID (`txn_id`).
    #[must_use]
    pub fn txn_id(&self) -> &str {
        self.get_or_empty("txn_id")
    }

    /// Transaction type (`txn_type`).
    #[must_use]
    pub fn txn_type(&self) -> &str {
        self.get_or_empty("txn_type")
    }

    /// Payment status (`payment_status`).
    #[must_use]
    pub fn payment_status(&self) -> &str {
        self.get_or_empty("payment_status")
    }

    /// Whether the payment has settled.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.payment_status() == PAYMENT_COMPLETED
    }

    /// Receiving PayPal account (`receiver_email`).
    #[must_use]
    pub fn receiver_email(&self) -> &str {
        self.get_or_empty("receiver_email")
    }

    /// Currency code: the first three characters of `mc_currency`, upper-cased.
    #[must_use]
    pub fn currency_code(&self) -> String {
        self.get_or_empty("mc_currency")
            .chars()
            .take(3)
            .collect::<String>()
            .to_uppercase()
    }

    /// Raw gross amount as sent (`mc_gross`).
    #[must_use]
    pub fn gross_text(&self) -> &str {
        self.get_or_empty("mc_gross")
    }

    /// Parsed gross amount. Unparseable or missing amounts are zero.
    #[must_use]
    pub fn gross(&self) -> Amount {
        self.gross_text().parse().unwrap_or(Amount::ZERO)
    }

    /// Amount and currency deposited into the PayPal account, when PayPal
    /// converted the payment.
    #[must_use]
    pub fn settlement(&self) -> Option<(&str, &str)> {
        let amount = self.get("settle_amount").filter(|s| !s.is_empty())?;
        let currency = self.get("settle_currency").filter(|s| !s.is_empty())?;
        Some((amount, currency))
    }

    /// Opaque `custom` field echoed back from the donation form.
    #[must_use]
    pub fn custom(&self) -> &str {
        self.get_or_empty("custom")
    }
}

/// Undo form encoding: `+` is a space, `%XX` an arbitrary byte.
fn form_decode(bytes: &[u8]) -> Vec<u8> {
    let spaced: Vec<u8> = bytes
        .iter()
        .map(|&b| if b == b'+' { b' ' } else { b })
        .collect();
    percent_decode(&spaced).collect()
}

fn decode_text(encoding: &'static Encoding, bytes: &[u8]) -> String {
    encoding.decode_without_bom_handling(bytes).0.into_owned()
}

impl FromIterator<(String, String)> for IpnNotification {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self::from_pairs(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(pairs: &[(&str, &str)]) -> IpnNotification {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn form_body_is_decoded_with_its_charset() {
        let body = b"first_name=Ren%E9&last_name=M%FCller+Jr&charset=windows-1252";
        let ipn = IpnNotification::from_form_body(body);

        assert_eq!(ipn.get("first_name"), Some("Ren\u{e9}"));
        assert_eq!(ipn.get("last_name"), Some("M\u{fc}ller Jr"));
        assert_eq!(ipn.raw_body(), Some(&body[..]));
    }

    #[test]
    fn form_body_defaults_to_utf8() {
        let ipn = IpnNotification::from_form_body(b"first_name=Ren%C3%A9&custom=YToxOnt9&flag");

        assert_eq!(ipn.get("first_name"), Some("Ren\u{e9}"));
        assert_eq!(ipn.custom(), "YToxOnt9");
        assert_eq!(ipn.get("flag"), Some(""));
        assert_eq!(ipn.len(), 3);
    }

    #[test]
    fn form_body_with_unknown_charset_is_lossy_utf8() {
        let ipn = IpnNotification::from_form_body(b"first_name=Ren%E9&charset=klingon");
        assert_eq!(ipn.get("first_name"), Some("Ren\u{fffd}"));
    }

    #[test]
    fn pairs_have_no_raw_body() {
        assert_eq!(notification(&[("txn_id", "A")]).raw_body(), None);
    }

    #[test]
    fn last_duplicate_wins() {
        let ipn = notification(&[("txn_id", "A"), ("txn_id", "B")]);
        assert_eq!(ipn.txn_id(), "B");
    }

    #[test]
    fn currency_code_is_truncated_and_uppercased() {
        let ipn = notification(&[("mc_currency", "usdollars")]);
        assert_eq!(ipn.currency_code(), "USD");

        let empty = notification(&[]);
        assert_eq!(empty.currency_code(), "");
    }

    #[test]
    fn gross_defaults_to_zero() {
        assert_eq!(notification(&[("mc_gross", "12.50")]).gross().cents(), 1250);
        assert_eq!(notification(&[("mc_gross", "n/a")]).gross(), Amount::ZERO);
        assert_eq!(notification(&[]).gross(), Amount::ZERO);
    }

    #[test]
    fn settlement_requires_both_fields() {
        let ipn = notification(&[("settle_amount", "8.10"), ("settle_currency", "USD")]);
        assert_eq!(ipn.settlement(), Some(("8.10", "USD")));

        let partial = notification(&[("settle_amount", "8.10")]);
        assert_eq!(partial.settlement(), None);
    }

    #[test]
    fn completed_status_is_case_sensitive() {
        assert!(notification(&[("payment_status", "Completed")]).is_completed());
        assert!(!notification(&[("payment_status", "completed")]).is_completed());
    }
}
