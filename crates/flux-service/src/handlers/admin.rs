//! Admin endpoints over the donation ledger.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use flux_core::{AccountId, DonationCredit, PaypalTransaction};

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::servers::ServerGroup;
use crate::state::AppState;

/// Registered server groups.
#[derive(Debug, Serialize)]
pub struct ServersResponse {
    /// Server names in registration order.
    pub servers: Vec<String>,
}

/// List registered server groups.
pub async fn list_servers(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
) -> Json<ServersResponse> {
    Json(ServersResponse {
        servers: state.servers.names().into_iter().map(String::from).collect(),
    })
}

/// Donation credit balance of one account.
///
/// Accounts that never donated report a zero balance.
pub async fn get_credits(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path((server, account_id)): Path<(String, String)>,
) -> Result<Json<DonationCredit>, ApiError> {
    let group = find_group(&state, &server)?;
    let account_id: AccountId = account_id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid account id: {account_id}")))?;

    let credit = group
        .store
        .get_donation_credit(account_id)
        .await?
        .unwrap_or_else(|| DonationCredit::new(account_id));

    Ok(Json(credit))
}

/// Transaction list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    /// Maximum number of transactions to return (default: 50).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// List transactions response.
#[derive(Debug, Serialize)]
pub struct ListTransactionsResponse {
    /// Server group the rows belong to.
    pub server: String,
    /// Audit rows (newest first).
    pub transactions: Vec<PaypalTransaction>,
    /// Whether there are more rows.
    pub has_more: bool,
}

/// List PayPal audit rows of one server group.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(server): Path<String>,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<ListTransactionsResponse>, ApiError> {
    let group = find_group(&state, &server)?;

    // Fetch one more than requested to determine has_more
    let limit = query.limit.min(200);
    let mut transactions = group
        .store
        .list_paypal_transactions(limit + 1, query.offset)
        .await?;

    let has_more = transactions.len() > limit;
    transactions.truncate(limit);

    Ok(Json(ListTransactionsResponse {
        server: group.name.clone(),
        transactions,
        has_more,
    }))
}

fn find_group<'a>(state: &'a AppState, server: &str) -> Result<&'a ServerGroup, ApiError> {
    state
        .servers
        .get(server)
        .ok_or_else(|| ApiError::NotFound(format!("unknown server: {server}")))
}
