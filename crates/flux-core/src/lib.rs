//! Core types for the Flux donation service.
//!
//! This crate provides the foundational types shared by the store and the
//! HTTP service:
//!
//! - **Identifiers**: `AccountId`, `AuditId`
//! - **Money**: `Amount` (fixed-point, two decimals)
//! - **Notifications**: `IpnNotification`, `CustomData`
//! - **Ledger**: `DonationCredit`, `PaypalTransaction`
//!
//! # Credits
//!
//! Donations are exchanged for in-game credits at a configured rate:
//!
//! - Rate 5.00, donation 10.00 → 2 credits
//! - Rate 5.00, donation 14.99 → 2 credits (always rounded down)
//! - Amounts are held as integer cents to avoid floating point drift

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod amount;
pub mod credits;
pub mod custom;
pub mod error;
pub mod ids;
pub mod notification;
pub mod transaction;

pub use amount::Amount;
pub use credits::{compute_credits, DonationCredit};
pub use custom::CustomData;
pub use error::{FluxError, Result};
pub use ids::{AccountId, AuditId, IdError};
pub use notification::{IpnNotification, PAYMENT_COMPLETED, WEB_ACCEPT};
pub use transaction::PaypalTransaction;
