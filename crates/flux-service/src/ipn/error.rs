//! Conditions met while processing a notification.

use flux_core::AccountId;

/// Something that went wrong with a notification.
///
/// None of these escape the processor; each is written to the PayPal log
/// and narrows what the rest of the notification is allowed to do.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IpnError {
    /// PayPal could not be reached for verification.
    #[error("Failed to connect to PayPal server: {reason}")]
    ConnectionFailure {
        /// Transport error.
        reason: String,
    },

    /// PayPal answered something other than `VERIFIED`.
    #[error("Notification failed to verify. (recv: {response})")]
    VerificationRejected {
        /// Last response line, upper-cased.
        response: String,
    },

    /// The payment went to an address this panel does not own.
    #[error("Receiver e-mail ({receiver_email}) is not recognized, unauthorized to continue.")]
    UnauthorizedReceiver {
        /// The notification's `receiver_email`.
        receiver_email: String,
    },

    /// The `custom` field could not be decoded.
    #[error("Custom data could not be decoded, ignoring it. ({reason})")]
    DecodeFailure {
        /// Decoder error.
        reason: String,
    },

    /// The account does not exist on the resolved server.
    #[error("Unknown account #{account_id} on server {server_name}, cannot exchange for credits.")]
    UnknownAccount {
        /// Account from the `custom` field.
        account_id: AccountId,
        /// Server the account was looked up on.
        server_name: String,
    },

    /// No server group carries the requested name.
    #[error("Unknown game server \"{server_name}\", cannot process donation for credits.")]
    UnknownServer {
        /// Server name from the `custom` field.
        server_name: String,
    },

    /// The payment is not in the donation currency.
    #[error("Transaction currency not exchangeable, accepting anyways. (recv: {received}, expected: {expected})")]
    CurrencyMismatch {
        /// Currency code of the payment.
        received: String,
        /// Configured donation currency.
        expected: String,
    },

    /// The archive file could not be written.
    #[error("Failed to save transaction details for {txn_id} to file. ({reason})")]
    FileWriteFailure {
        /// Transaction being archived.
        txn_id: String,
        /// I/O error.
        reason: String,
    },

    /// A ledger statement failed.
    #[error("Failed to {operation} on server {server_name}. ({reason})")]
    DatabaseWriteFailure {
        /// What was being done, e.g. "deposit credits".
        operation: &'static str,
        /// Server group whose ledger failed.
        server_name: String,
        /// Store error.
        reason: String,
    },
}

impl IpnError {
    /// Short machine-readable name, used as a log field.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionFailure { .. } => "connection_failure",
            Self::VerificationRejected { .. } => "verification_rejected",
            Self::UnauthorizedReceiver { .. } => "unauthorized_receiver",
            Self::DecodeFailure { .. } => "decode_failure",
            Self::UnknownAccount { .. } => "unknown_account",
            Self::UnknownServer { .. } => "unknown_server",
            Self::CurrencyMismatch { .. } => "currency_mismatch",
            Self::FileWriteFailure { .. } => "file_write_failure",
            Self::DatabaseWriteFailure { .. } => "database_write_failure",
        }
    }
}
