//! Verify notifications by echoing them back to PayPal.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

use flux_core::IpnNotification;

use crate::ipn::{IpnError, PaypalLog};

/// Command prepended to the echoed notification.
pub const VERIFY_COMMAND: (&str, &str) = ("cmd", "_notify-validate");

/// PayPal's answer for a genuine notification.
const VERIFIED: &str = "VERIFIED";

/// Result of a verification call-back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// PayPal confirmed the notification.
    Verified,
    /// PayPal answered something else.
    Rejected {
        /// Last non-empty response line, upper-cased.
        response: String,
    },
    /// PayPal could not be asked.
    Failed {
        /// Transport error.
        reason: String,
    },
}

impl Verification {
    /// Whether the notification may be trusted.
    #[must_use]
    pub const fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }
}

/// Confirms a notification really came from PayPal.
#[async_trait]
pub trait NotificationVerifier: Send + Sync {
    /// Verify a notification, recording each step in `log`.
    async fn verify(&self, notification: &IpnNotification, log: &PaypalLog) -> Verification;
}

/// HTTP client for PayPal's IPN verification endpoint.
#[derive(Debug, Clone)]
pub struct PaypalVerifier {
    client: reqwest::Client,
    endpoint: String,
}

impl PaypalVerifier {
    /// Create a verifier for a PayPal host such as `www.paypal.com` or
    /// `www.sandbox.paypal.com`.
    ///
    /// A host with a scheme (`http://127.0.0.1:8081`) is used as the base
    /// URL as-is.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(host: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint_for(host),
        })
    }

    /// The verification URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn endpoint_for(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.contains("://") {
        format!("{host}/cgi-bin/webscr")
    } else {
        format!("http://{host}/cgi-bin/webscr")
    }
}

/// The last non-empty line of a response body, trimmed and upper-cased.
fn last_line(body: &str) -> String {
    body.lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .unwrap_or_default()
        .to_uppercase()
}

async fn connection_failed(log: &PaypalLog, error: &reqwest::Error) -> Verification {
    let reason = error.to_string();
    log.report(&IpnError::ConnectionFailure {
        reason: reason.clone(),
    })
    .await;
    Verification::Failed { reason }
}

#[async_trait]
impl NotificationVerifier for PaypalVerifier {
    async fn verify(&self, notification: &IpnNotification, log: &PaypalLog) -> Verification {
        let request = match notification.raw_body() {
            Some(raw) => {
                let (command, value) = VERIFY_COMMAND;
                let mut body = format!("{command}={value}").into_bytes();
                if !raw.is_empty() {
                    body.push(b'&');
                    body.extend_from_slice(raw);
                }
                self.client
                    .post(&self.endpoint)
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(body)
            }
            None => {
                let fields: Vec<(&str, &str)> = std::iter::once(VERIFY_COMMAND)
                    .chain(
                        notification
                            .fields()
                            .iter()
                            .map(|(k, v)| (k.as_str(), v.as_str())),
                    )
                    .collect();
                self.client.post(&self.endpoint).form(&fields)
            }
        };

        let request = match request.build() {
            Ok(request) => request,
            Err(e) => return connection_failed(log, &e).await,
        };

        let (sent_len, query) = request
            .body()
            .and_then(reqwest::Body::as_bytes)
            .map_or((0, String::new()), |sent| {
                (sent.len(), String::from_utf8_lossy(sent).into_owned())
            });
        log.puts(format!("Query string: {query}")).await;

        log.puts(format!(
            "Establishing connection to PayPal server at {}...",
            self.endpoint
        ))
        .await;

        let response = match self.client.execute(request).await {
            Ok(response) => response,
            Err(e) => return connection_failed(log, &e).await,
        };

        log.puts(format!(
            "Connected. Sent {} bytes of transaction data. (HTTP {})",
            sent_len,
            response.status()
        ))
        .await;
        log.puts("Reading back response from PayPal...").await;

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return connection_failed(log, &e).await,
        };

        let line = last_line(&body);
        if line == VERIFIED {
            log.puts("Notification verified. (recv: VERIFIED)").await;
            Verification::Verified
        } else {
            log.report(&IpnError::VerificationRejected {
                response: line.clone(),
            })
            .await;
            Verification::Rejected { response: line }
        }
    }
}
