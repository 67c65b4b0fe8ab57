//! Common test utilities for Flux service integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum_test::TestServer;
use chrono::Duration;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use tempfile::TempDir;

use flux_core::{AccountId, Amount, CustomData, IpnNotification, PaypalTransaction};
use flux_service::{
    create_router, AppState, DuplicatePolicy, NotificationProcessor, NotificationVerifier,
    PaypalLog, PaypalVerifier, ServerGroup, ServerRegistry, ServiceConfig, SessionClaims,
    Verification,
};
use flux_store::{LedgerStore, MemoryStore};

pub const BUSINESS_EMAIL: &str = "donate@example.com";
pub const ALT_RECEIVER: &str = "payments@example.com";
pub const ADMIN_KEY: &str = "test-admin-key";
pub const SESSION_SECRET: &str = "test-session-secret";

/// Account registered on the `FluxRO` login table.
pub const ACCOUNT: i64 = 2_000_001;

/// Verifier answering the same way every time.
pub struct StubVerifier {
    answer: Verification,
    calls: AtomicUsize,
}

impl StubVerifier {
    pub fn new(answer: Verification) -> Self {
        Self {
            answer,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationVerifier for StubVerifier {
    async fn verify(&self, _notification: &IpnNotification, log: &PaypalLog) -> Verification {
        self.calls.fetch_add(1, Ordering::SeqCst);
        log.puts(format!("Stub verifier answering {:?}", self.answer))
            .await;
        self.answer.clone()
    }
}

/// Builder for [`TestHarness`].
pub struct HarnessBuilder {
    verification: Verification,
    paypal_host: Option<String>,
    duplicate_policy: DuplicatePolicy,
    use_clean_urls: bool,
}

impl HarnessBuilder {
    pub fn verification(mut self, verification: Verification) -> Self {
        self.verification = verification;
        self
    }

    /// Verify against a real PayPal endpoint instead of the stub.
    pub fn paypal_host(mut self, host: impl Into<String>) -> Self {
        self.paypal_host = Some(host.into());
        self
    }

    pub fn duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    pub fn clean_urls(mut self) -> Self {
        self.use_clean_urls = true;
        self
    }

    pub fn build(self) -> TestHarness {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");

        let flux = Arc::new(MemoryStore::new());
        flux.register_account(account())
            .expect("Failed to register account");
        let test = Arc::new(MemoryStore::new());

        let servers = ServerRegistry::new(vec![
            ServerGroup {
                name: "FluxRO".into(),
                store: flux.clone(),
            },
            ServerGroup {
                name: "TestRO".into(),
                store: test.clone(),
            },
        ]);

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            paypal_business_email: BUSINESS_EMAIL.into(),
            paypal_receiver_emails: vec![ALT_RECEIVER.into()],
            donation_currency: "USD".into(),
            credit_exchange_rate: Amount::from_cents(500),
            duplicate_policy: self.duplicate_policy,
            use_clean_urls: self.use_clean_urls,
            base_uri: "/".into(),
            admin_api_key: Some(ADMIN_KEY.into()),
            session_secret: Some(SESSION_SECRET.into()),
            ..ServiceConfig::default()
        };
        config.validate().expect("Test configuration is invalid");

        let verifier = Arc::new(StubVerifier::new(self.verification));
        let active: Arc<dyn NotificationVerifier> = match &self.paypal_host {
            Some(host) => Arc::new(
                PaypalVerifier::new(host, std::time::Duration::from_secs(5))
                    .expect("Failed to build verifier"),
            ),
            None => verifier.clone(),
        };
        let state = AppState::new(config, servers, active);
        let processor = Arc::clone(&state.processor);

        let router: Router = create_router(state);
        let server = TestServer::new(router).expect("Failed to create test server");

        TestHarness {
            server,
            temp_dir,
            flux,
            test,
            verifier,
            processor,
        }
    }
}

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Data directory (kept alive for test duration).
    pub temp_dir: TempDir,
    /// Ledger of the `FluxRO` server group.
    pub flux: Arc<MemoryStore>,
    /// Ledger of the `TestRO` server group.
    pub test: Arc<MemoryStore>,
    /// The stub verifier (idle when a PayPal host is configured).
    pub verifier: Arc<StubVerifier>,
    /// The processor behind the webhook.
    pub processor: Arc<NotificationProcessor>,
}

impl TestHarness {
    /// Harness whose verifier confirms every notification.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            verification: Verification::Verified,
            paypal_host: None,
            duplicate_policy: DuplicatePolicy::Allow,
            use_clean_urls: false,
        }
    }

    /// POST a notification to the webhook and check it was acknowledged.
    pub async fn notify(&self, fields: &[(String, String)]) {
        let response = self
            .server
            .post("/paypal/notify")
            .form(&fields.to_vec())
            .await;

        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["received"], true);
    }

    /// POST an already-encoded form body to the webhook.
    pub async fn notify_raw(&self, body: &str) {
        let response = self
            .server
            .post("/paypal/notify")
            .text(body)
            .content_type("application/x-www-form-urlencoded")
            .await;

        response.assert_status_ok();
    }

    /// Current balance on `FluxRO`, if a credit record exists.
    pub async fn balance(&self) -> Option<i64> {
        self.flux
            .get_donation_credit(account())
            .await
            .expect("store read failed")
            .map(|credit| credit.balance)
    }

    pub fn flux_rows(&self) -> Vec<PaypalTransaction> {
        self.flux.transactions().expect("store read failed")
    }

    pub fn test_rows(&self) -> Vec<PaypalTransaction> {
        self.test.transactions().expect("store read failed")
    }

    /// Contents of the PayPal log file.
    pub fn paypal_log(&self) -> String {
        std::fs::read_to_string(self.temp_dir.path().join("logs").join("paypal.log"))
            .unwrap_or_default()
    }

    /// Path a notification is archived at.
    pub fn archive(&self, txn_type: &str, status: &str, txn_id: &str) -> PathBuf {
        self.temp_dir
            .path()
            .join("logs")
            .join("transactions")
            .join(txn_type)
            .join(status)
            .join(format!("{txn_id}.log"))
    }

    pub fn admin_header() -> String {
        ADMIN_KEY.to_string()
    }

    /// Bearer header for a session at the given level.
    pub fn session_header(level: i32) -> String {
        let token = SessionClaims::new(account(), level, Duration::hours(1))
            .encode(SESSION_SECRET)
            .expect("Failed to sign session token");
        format!("Bearer {token}")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

pub fn account() -> AccountId {
    AccountId::new(ACCOUNT).expect("valid account id")
}

/// A completed `web_accept` donation of 10.00 USD to `FluxRO`.
pub fn donation(txn_id: &str) -> Vec<(String, String)> {
    let custom = CustomData::for_donation(ACCOUNT.to_string(), "FluxRO").encode();
    [
        ("mc_gross", "10.00"),
        ("protection_eligibility", "Ineligible"),
        ("payer_id", "LPLWNMTBWMFAY"),
        ("tax", "0.00"),
        ("payment_date", "20:12:59 Jan 13, 2009 PST"),
        ("payment_status", "Completed"),
        ("first_name", "Test"),
        ("mc_fee", "0.59"),
        ("notify_version", "2.6"),
        ("custom", custom.as_str()),
        ("payer_status", "verified"),
        ("business", BUSINESS_EMAIL),
        ("quantity", "1"),
        ("verify_sign", "AtkOfCXbDm2hu0ZELryHFjY-Vb7PAUvS6nMXgysbElEn9v-1XcmSoGtf"),
        ("payer_email", "buyer@example.com"),
        ("txn_id", txn_id),
        ("payment_type", "instant"),
        ("last_name", "User"),
        ("receiver_email", BUSINESS_EMAIL),
        ("receiver_id", "S8XGHLYDW9T3S"),
        ("txn_type", "web_accept"),
        ("item_name", "Donation"),
        ("mc_currency", "USD"),
        ("item_number", ""),
        ("residence_country", "US"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Form-encode fields, escaping everything but ASCII letters and digits.
pub fn encode_form(fields: &[(String, String)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{k}={}", utf8_percent_encode(v, NON_ALPHANUMERIC)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Replace (or append) one field of a notification.
pub fn with_field(mut fields: Vec<(String, String)>, key: &str, value: &str) -> Vec<(String, String)> {
    match fields.iter_mut().find(|(k, _)| k == key) {
        Some(entry) => entry.1 = value.to_string(),
        None => fields.push((key.to_string(), value.to_string())),
    }
    fields
}
