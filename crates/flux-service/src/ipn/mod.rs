//! PayPal Instant Payment Notification processing.
//!
//! A notification is verified with PayPal, checked against the configured
//! receivers, and then exchanged for donation credits when it is a completed
//! `web_accept` payment in the donation currency for a known account.
//! Every verified notification from an authorized receiver is audited in the
//! ledger and archived to disk, whether or not it earned credits.

pub mod archive;
pub mod error;
pub mod log;
pub mod processor;

pub use error::IpnError;
pub use log::PaypalLog;
pub use processor::{NoCreditReason, NotificationOutcome, NotificationProcessor, ProcessorSettings};
