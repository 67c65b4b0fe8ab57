//! PayPal IPN webhook.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, RawForm, State};
use axum::Json;
use serde::Serialize;

use flux_core::IpnNotification;

use crate::state::AppState;

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the notification was received.
    pub received: bool,
}

/// Handle a PayPal Instant Payment Notification.
///
/// The body is kept raw: PayPal sends it in the account's charset and the
/// verification call-back must echo it unchanged.
///
/// PayPal only needs to know the notification arrived; what became of it is
/// recorded in the PayPal log and the ledger. Processing runs in its own task
/// so a dropped connection cannot interrupt a ledger update half-way.
pub async fn paypal_notify(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    RawForm(body): RawForm,
) -> Json<WebhookResponse> {
    let ipn = IpnNotification::from_form_body(&body);
    let source = connect_info.map(|ConnectInfo(addr)| addr);

    tracing::debug!(
        source = ?source,
        fields = ipn.len(),
        txn_id = %ipn.txn_id(),
        "PayPal notification received"
    );

    let processor = Arc::clone(&state.processor);
    let task = tokio::spawn(async move { processor.process(&ipn, source).await });

    match task.await {
        Ok(outcome) => tracing::info!(outcome = ?outcome, "PayPal notification processed"),
        Err(e) => tracing::error!(error = %e, "PayPal notification task failed"),
    }

    Json(WebhookResponse { received: true })
}
