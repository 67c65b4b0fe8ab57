//! Admin endpoint integration tests.

mod common;

use common::{donation, TestHarness, ACCOUNT};

#[tokio::test]
async fn admin_key_is_required() {
    let harness = TestHarness::new();

    let response = harness.server.get("/v1/servers").await;
    response.assert_status_unauthorized();

    let response = harness
        .server
        .get("/v1/servers")
        .add_header("x-admin-key", "wrong-key")
        .await;
    response.assert_status_unauthorized();
}

#[tokio::test]
async fn lists_servers_in_registration_order() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/servers")
        .add_header("x-admin-key", TestHarness::admin_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["servers"], serde_json::json!(["FluxRO", "TestRO"]));
}

#[tokio::test]
async fn credits_default_to_zero_then_follow_donations() {
    let harness = TestHarness::new();
    let uri = format!("/v1/servers/FluxRO/accounts/{ACCOUNT}/credits");

    let response = harness
        .server
        .get(&uri)
        .add_header("x-admin-key", TestHarness::admin_header())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["balance"], 0);
    assert_eq!(body["account_id"], ACCOUNT);

    harness.notify(&donation("TXN-1")).await;

    let response = harness
        .server
        .get(&uri)
        .add_header("x-admin-key", TestHarness::admin_header())
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["balance"], 2);
    assert_eq!(body["last_donation_amount"], "10.00");
}

#[tokio::test]
async fn credits_reject_bad_input() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/servers/NoSuchRO/accounts/2000001/credits")
        .add_header("x-admin-key", TestHarness::admin_header())
        .await;
    response.assert_status_not_found();

    let response = harness
        .server
        .get("/v1/servers/FluxRO/accounts/abc/credits")
        .add_header("x-admin-key", TestHarness::admin_header())
        .await;
    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn transactions_are_newest_first_and_paginated() {
    let harness = TestHarness::new();
    for txn in ["TXN-1", "TXN-2", "TXN-3"] {
        harness.notify(&donation(txn)).await;
    }

    let response = harness
        .server
        .get("/v1/servers/FluxRO/transactions?limit=2")
        .add_header("x-admin-key", TestHarness::admin_header())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["server"], "FluxRO");
    assert_eq!(body["has_more"], true);
    let ids: Vec<_> = body["transactions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|tx| tx["txn_id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, ["TXN-3", "TXN-2"]);

    let response = harness
        .server
        .get("/v1/servers/FluxRO/transactions?limit=2&offset=2")
        .add_header("x-admin-key", TestHarness::admin_header())
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["has_more"], false);
    assert_eq!(body["transactions"][0]["txn_id"], "TXN-1");
    assert_eq!(body["transactions"][0]["credits"], 2);
}

#[tokio::test]
async fn transactions_of_other_group_are_separate() {
    let harness = TestHarness::new();
    harness.notify(&donation("TXN-1")).await;

    let response = harness
        .server
        .get("/v1/servers/TestRO/transactions")
        .add_header("x-admin-key", TestHarness::admin_header())
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["transactions"], serde_json::json!([]));
}
