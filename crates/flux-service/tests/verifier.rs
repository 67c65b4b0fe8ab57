//! PayPal verification call-back tests against a mock PayPal.

use std::time::Duration;

use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use flux_core::IpnNotification;
use flux_service::{NotificationVerifier, PaypalLog, PaypalVerifier, Verification};

fn notification() -> IpnNotification {
    [
        ("txn_id", "TXN 1"),
        ("mc_gross", "10.00"),
        ("payer_email", "buyer@example.com"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

async fn paypal_answering(body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/cgi-bin/webscr"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;
    server
}

async fn verify_against(server: &MockServer, log: &PaypalLog) -> Verification {
    let verifier = PaypalVerifier::new(&server.uri(), Duration::from_secs(5))
        .expect("Failed to build verifier");
    verifier.verify(&notification(), log).await
}

#[tokio::test]
async fn verified_response_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let log = PaypalLog::in_data_dir(dir.path());
    let server = paypal_answering("VERIFIED").await;

    assert_eq!(verify_against(&server, &log).await, Verification::Verified);

    let contents = std::fs::read_to_string(log.path()).unwrap();
    assert!(contents.contains("Query string: cmd=_notify-validate&txn_id=TXN+1"));
    assert!(contents.contains("Notification verified. (recv: VERIFIED)"));
}

#[tokio::test]
async fn fields_are_echoed_in_order_after_command() {
    let dir = tempfile::tempdir().unwrap();
    let log = PaypalLog::in_data_dir(dir.path());

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/cgi-bin/webscr"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string(
            "cmd=_notify-validate&txn_id=TXN+1&mc_gross=10.00&payer_email=buyer%40example.com",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_string("VERIFIED"))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(verify_against(&server, &log).await, Verification::Verified);
}

#[tokio::test]
async fn webhook_body_is_echoed_byte_for_byte() {
    let dir = tempfile::tempdir().unwrap();
    let log = PaypalLog::in_data_dir(dir.path());
    let raw = "mc_gross=10.00&first_name=Ren%E9&address_street=1+Rue+de+l%27%C9glise&charset=windows-1252";

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/cgi-bin/webscr"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string(format!("cmd=_notify-validate&{raw}")))
        .respond_with(ResponseTemplate::new(200).set_body_string("VERIFIED"))
        .expect(1)
        .mount(&server)
        .await;

    let ipn = IpnNotification::from_form_body(raw.as_bytes());
    assert_eq!(ipn.get("first_name"), Some("Ren\u{e9}"));

    let verifier = PaypalVerifier::new(&server.uri(), Duration::from_secs(5))
        .expect("Failed to build verifier");
    assert_eq!(verifier.verify(&ipn, &log).await, Verification::Verified);
}

#[tokio::test]
async fn invalid_response_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let log = PaypalLog::in_data_dir(dir.path());
    let server = paypal_answering("INVALID").await;

    assert_eq!(
        verify_against(&server, &log).await,
        Verification::Rejected {
            response: "INVALID".into()
        }
    );

    let contents = std::fs::read_to_string(log.path()).unwrap();
    assert!(contents.contains("Notification failed to verify. (recv: INVALID)"));
}

#[tokio::test]
async fn last_non_empty_line_decides() {
    let dir = tempfile::tempdir().unwrap();
    let log = PaypalLog::in_data_dir(dir.path());

    let server = paypal_answering("INVALID\r\nverified\r\n\r\n").await;
    assert_eq!(verify_against(&server, &log).await, Verification::Verified);

    let server = paypal_answering("VERIFIED\nINVALID\n").await;
    assert!(!verify_against(&server, &log).await.is_verified());
}

#[tokio::test]
async fn empty_response_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let log = PaypalLog::in_data_dir(dir.path());
    let server = paypal_answering("").await;

    assert_eq!(
        verify_against(&server, &log).await,
        Verification::Rejected {
            response: String::new()
        }
    );
}

#[tokio::test]
async fn unreachable_paypal_fails_closed() {
    let dir = tempfile::tempdir().unwrap();
    let log = PaypalLog::in_data_dir(dir.path());

    // Nothing listens on the discard port.
    let verifier = PaypalVerifier::new("http://127.0.0.1:9", Duration::from_secs(2))
        .expect("Failed to build verifier");
    let result = verifier.verify(&notification(), &log).await;

    assert!(matches!(result, Verification::Failed { .. }));
    let contents = std::fs::read_to_string(log.path()).unwrap();
    assert!(contents.contains("Failed to connect to PayPal server"));
}
