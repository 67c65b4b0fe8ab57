//! The notification state machine.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use flux_core::{
    compute_credits, AccountId, Amount, CustomData, IpnNotification, PaypalTransaction, WEB_ACCEPT,
};

use super::archive;
use super::error::IpnError;
use super::log::PaypalLog;
use crate::config::DuplicatePolicy;
use crate::paypal::NotificationVerifier;
use crate::servers::{ServerGroup, ServerRegistry};

/// What the processor needs to know about the panel's PayPal setup.
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    /// Primary PayPal business email.
    pub business_email: String,
    /// Additional accepted receiver emails.
    pub receiver_emails: Vec<String>,
    /// Donation currency code, upper-case.
    pub currency: String,
    /// Amount of `currency` per credit.
    pub exchange_rate: Amount,
    /// Replay handling.
    pub duplicate_policy: DuplicatePolicy,
    /// Root for log and archive files.
    pub data_dir: PathBuf,
}

impl ProcessorSettings {
    fn is_authorized_receiver(&self, email: &str) -> bool {
        !email.is_empty()
            && (email == self.business_email || self.receiver_emails.iter().any(|e| e == email))
    }
}

/// Why a recorded notification earned no credits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoCreditReason {
    /// `account_id` or `server_name` missing from the custom payload.
    MissingCustomData,
    /// Not a `web_accept` transaction.
    NotWebAccept,
    /// `server_name` matches no server group.
    UnknownServer,
    /// Paid in a currency other than the donation currency.
    CurrencyMismatch,
    /// `payment_status` is not `Completed`.
    PaymentIncomplete,
    /// The account does not exist on the server.
    UnknownAccount,
    /// This `txn_id` was already credited and replays are skipped.
    DuplicateTransaction,
    /// The gross amount is worth less than one credit.
    ZeroCredits,
    /// A ledger statement failed.
    StoreFailure,
}

/// What became of a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotificationOutcome {
    /// PayPal did not confirm the notification; nothing was written.
    Unverified,
    /// The payment went to an unknown receiver; nothing was written.
    UnauthorizedReceiver {
        /// The rejected `receiver_email`.
        receiver_email: String,
    },
    /// Credits were deposited.
    Credited {
        /// PayPal transaction id.
        txn_id: String,
        /// Credited account.
        account_id: AccountId,
        /// Server group holding the account.
        server_name: String,
        /// Credits deposited.
        credits: i64,
        /// Balance after the deposit.
        balance: i64,
    },
    /// Audited and archived without credits.
    Recorded {
        /// PayPal transaction id.
        txn_id: String,
        /// Why no credits were granted.
        reason: NoCreditReason,
    },
}

/// A credit deposit that went through.
struct Deposit {
    credits: i64,
    balance: i64,
}

/// Processes PayPal notifications against the registered server groups.
pub struct NotificationProcessor {
    settings: ProcessorSettings,
    servers: Arc<ServerRegistry>,
    verifier: Arc<dyn NotificationVerifier>,
    log: PaypalLog,
}

impl NotificationProcessor {
    /// Create a processor logging to `{data_dir}/logs/paypal.log`.
    #[must_use]
    pub fn new(
        settings: ProcessorSettings,
        servers: Arc<ServerRegistry>,
        verifier: Arc<dyn NotificationVerifier>,
    ) -> Self {
        let log = PaypalLog::in_data_dir(&settings.data_dir);
        Self {
            settings,
            servers,
            verifier,
            log,
        }
    }

    /// The PayPal audit log.
    #[must_use]
    pub fn log(&self) -> &PaypalLog {
        &self.log
    }

    /// Processor settings.
    #[must_use]
    pub fn settings(&self) -> &ProcessorSettings {
        &self.settings
    }

    /// Run one notification to completion.
    #[tracing::instrument(skip_all, fields(txn_id = %ipn.txn_id()))]
    pub async fn process(
        &self,
        ipn: &IpnNotification,
        source: Option<SocketAddr>,
    ) -> NotificationOutcome {
        let log = &self.log;
        match source {
            Some(addr) => log.puts(format!("Received notification from {addr}")).await,
            None => log.puts("Received notification from (unknown)").await,
        }

        if !self.verifier.verify(ipn, log).await.is_verified() {
            log.puts("Transaction invalid, aborting.").await;
            return NotificationOutcome::Unverified;
        }

        log.puts("Proceeding to validate the authenticity of the transaction...")
            .await;
        let txn_id = ipn.txn_id();
        log.puts(format!("Transaction identified as {txn_id}.")).await;

        let receiver_email = ipn.receiver_email();
        if !self.settings.is_authorized_receiver(receiver_email) {
            log.report(&IpnError::UnauthorizedReceiver {
                receiver_email: receiver_email.to_string(),
            })
            .await;
            return NotificationOutcome::UnauthorizedReceiver {
                receiver_email: receiver_email.to_string(),
            };
        }

        let custom = self.decode_custom(ipn).await;
        let account_id = self.parse_account_id(custom.account_id()).await;
        let server_name = custom.server_name();

        let currency = ipn.currency_code();
        let exchangeable = currency == self.settings.currency;
        if !exchangeable {
            log.report(&IpnError::CurrencyMismatch {
                received: currency.clone(),
                expected: self.settings.currency.clone(),
            })
            .await;
        }

        log.puts(format!("Received {} ({currency}).", ipn.gross_text()))
            .await;
        if let Some((amount, settle_currency)) = ipn.settlement() {
            log.puts(format!(
                "Deposited into PayPal account: {amount} {settle_currency}."
            ))
            .await;
        }
        log.puts(format!(
            "Game server name: {}, account ID: {}",
            server_name.unwrap_or("(absent)"),
            account_id.map_or_else(|| "(absent)".to_string(), |id| id.to_string()),
        ))
        .await;

        let mut reason: Option<NoCreditReason> = None;

        let target = match (account_id, server_name) {
            (Some(account_id), Some(server_name)) => {
                if ipn.txn_type() == WEB_ACCEPT {
                    if let Some(group) = self.servers.get(server_name) {
                        Some((group, account_id))
                    } else {
                        log.report(&IpnError::UnknownServer {
                            server_name: server_name.to_string(),
                        })
                        .await;
                        reason = Some(NoCreditReason::UnknownServer);
                        None
                    }
                } else {
                    log.puts(
                        "Transaction type is not web_accept, amount will not be exchanged for credits.",
                    )
                    .await;
                    reason = Some(NoCreditReason::NotWebAccept);
                    None
                }
            }
            _ => {
                log.puts(
                    "Account ID and/or game server name absent, cannot exchange for credits.",
                )
                .await;
                reason = Some(NoCreditReason::MissingCustomData);
                None
            }
        };

        if !exchangeable {
            reason.get_or_insert(NoCreditReason::CurrencyMismatch);
        }

        let mut deposit = None;
        if ipn.is_completed() {
            log.puts(format!("Payment for txn_id#{txn_id} has been completed."))
                .await;

            if let (Some((group, account_id)), true) = (target, exchangeable) {
                match self.exchange(group, account_id, ipn).await {
                    Ok(done) => deposit = Some(done),
                    Err(why) => {
                        reason.get_or_insert(why);
                    }
                }
            }
        } else {
            log.puts(format!(
                "Incomplete payment status: {} (exchanging for credits will not take place)",
                ipn.payment_status()
            ))
            .await;
            reason.get_or_insert(NoCreditReason::PaymentIncomplete);
        }

        let credits = deposit.as_ref().map_or(0, |d| d.credits);
        match target {
            Some((group, _)) => {
                self.store_audit(group, ipn, account_id, server_name, credits)
                    .await;
            }
            None => {
                for group in self.servers.iter() {
                    self.store_audit(group, ipn, account_id, server_name, 0)
                        .await;
                }
            }
        }

        self.archive(ipn).await;
        log.puts(format!("Done processing {txn_id}.")).await;

        match (deposit, target) {
            (Some(Deposit { credits, balance }), Some((group, account_id))) => {
                tracing::info!(
                    account_id = %account_id,
                    server = %group.name,
                    credits,
                    balance,
                    "Donation credited"
                );
                NotificationOutcome::Credited {
                    txn_id: txn_id.to_string(),
                    account_id,
                    server_name: group.name.clone(),
                    credits,
                    balance,
                }
            }
            _ => NotificationOutcome::Recorded {
                txn_id: txn_id.to_string(),
                reason: reason.unwrap_or(NoCreditReason::ZeroCredits),
            },
        }
    }

    async fn decode_custom(&self, ipn: &IpnNotification) -> CustomData {
        let raw = ipn.custom();
        if raw.trim().is_empty() {
            return CustomData::default();
        }

        match CustomData::decode(raw) {
            Ok(custom) => custom,
            Err(e) => {
                self.log
                    .report(&IpnError::DecodeFailure {
                        reason: e.to_string(),
                    })
                    .await;
                CustomData::default()
            }
        }
    }

    async fn parse_account_id(&self, raw: Option<&str>) -> Option<AccountId> {
        let raw = raw?;
        match raw.parse() {
            Ok(id) => Some(id),
            Err(e) => {
                self.log
                    .report(&IpnError::DecodeFailure {
                        reason: format!("account_id {raw:?}: {e}"),
                    })
                    .await;
                None
            }
        }
    }

    /// Deposit credits for a completed, exchangeable payment.
    async fn exchange(
        &self,
        group: &ServerGroup,
        account_id: AccountId,
        ipn: &IpnNotification,
    ) -> Result<Deposit, NoCreditReason> {
        let log = &self.log;
        let store = &group.store;

        if self.settings.duplicate_policy == DuplicatePolicy::Skip {
            match store.has_credited_transaction(ipn.txn_id()).await {
                Ok(false) => {}
                Ok(true) => {
                    log.puts(format!(
                        "Transaction {} was already credited, skipping.",
                        ipn.txn_id()
                    ))
                    .await;
                    return Err(NoCreditReason::DuplicateTransaction);
                }
                Err(e) => {
                    self.store_failed(group, "check for earlier credits", &e)
                        .await;
                    return Err(NoCreditReason::StoreFailure);
                }
            }
        }

        match store.account_exists(account_id).await {
            Ok(true) => {}
            Ok(false) => {
                log.report(&IpnError::UnknownAccount {
                    account_id,
                    server_name: group.name.clone(),
                })
                .await;
                return Err(NoCreditReason::UnknownAccount);
            }
            Err(e) => {
                self.store_failed(group, "look up account", &e).await;
                return Err(NoCreditReason::StoreFailure);
            }
        }

        let record = match store.get_donation_credit(account_id).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) => {
                log.puts("Identified as first-time donation to the server from this account.")
                    .await;
                store.create_donation_credit(account_id).await
            }
            Err(e) => Err(e),
        };
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                self.store_failed(group, "load donation credits", &e).await;
                return Err(NoCreditReason::StoreFailure);
            }
        };

        let amount = ipn.gross();
        let credits = compute_credits(amount, self.settings.exchange_rate);
        log.puts(format!(
            "Updating account credit balance from {} to {}",
            record.balance,
            record.balance + credits
        ))
        .await;

        let balance = match store
            .deposit_credits(account_id, credits, amount, Utc::now())
            .await
        {
            Ok(balance) => balance,
            Err(e) => {
                log.puts("Failed to deposit credits.").await;
                self.store_failed(group, "deposit credits", &e).await;
                return Err(NoCreditReason::StoreFailure);
            }
        };
        log.puts("Deposited credits.").await;

        if credits > 0 {
            Ok(Deposit { credits, balance })
        } else {
            Err(NoCreditReason::ZeroCredits)
        }
    }

    async fn store_audit(
        &self,
        group: &ServerGroup,
        ipn: &IpnNotification,
        account_id: Option<AccountId>,
        server_name: Option<&str>,
        credits: i64,
    ) {
        self.log
            .puts("Saving transaction details to PayPal transactions table...")
            .await;

        let row =
            PaypalTransaction::from_notification(ipn, account_id, server_name, credits, Utc::now());
        match group.store.put_paypal_transaction(&row).await {
            Ok(()) => {
                self.log
                    .puts(format!(
                        "Stored information in PayPal transactions table for server {}.",
                        group.name
                    ))
                    .await;
            }
            Err(e) => self.store_failed(group, "store PayPal transaction", &e).await,
        }
    }

    async fn archive(&self, ipn: &IpnNotification) {
        let txn_id = ipn.txn_id();
        self.log
            .puts(format!("Saving transaction details for {txn_id}..."))
            .await;

        match archive::save_details(&self.settings.data_dir, ipn).await {
            Ok(path) => {
                self.log
                    .puts(format!(
                        "Saved transaction details for {txn_id} to: {}",
                        path.display()
                    ))
                    .await;
            }
            Err(e) => {
                self.log
                    .report(&IpnError::FileWriteFailure {
                        txn_id: txn_id.to_string(),
                        reason: e.to_string(),
                    })
                    .await;
            }
        }
    }

    async fn store_failed(
        &self,
        group: &ServerGroup,
        operation: &'static str,
        error: &flux_store::StoreError,
    ) {
        self.log
            .report(&IpnError::DatabaseWriteFailure {
                operation,
                server_name: group.name.clone(),
                reason: error.to_string(),
            })
            .await;
    }
}
