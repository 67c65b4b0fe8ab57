//! PayPal call-back verification.

pub mod verifier;

pub use verifier::{NotificationVerifier, PaypalVerifier, Verification, VERIFY_COMMAND};
