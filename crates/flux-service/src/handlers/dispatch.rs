//! Panel request dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{Method, Uri};
use axum::Json;

use crate::auth::Session;
use crate::dispatcher::{resolve_route, DispatchRequest, Route};
use crate::error::ApiError;
use crate::state::AppState;

/// Resolve any unmatched `GET` to a panel module and action.
///
/// Rendering happens in the view layer, which receives the route as JSON.
pub async fn dispatch(
    State(state): State<Arc<AppState>>,
    session: Session,
    method: Method,
    uri: Uri,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Route>, ApiError> {
    if method != Method::GET && method != Method::HEAD {
        return Err(ApiError::NotFound(format!("{method} {}", uri.path())));
    }

    let request_uri = uri.path_and_query().map_or(uri.path(), |pq| pq.as_str());
    let request = DispatchRequest {
        uri: request_uri,
        params: &params,
    };

    let route = resolve_route(
        &request,
        &state.config.dispatch(),
        state.access.as_ref(),
        &session,
    )?;

    tracing::debug!(
        module = %route.module,
        action = %route.action,
        logged_in = session.is_logged_in(),
        "Dispatched request"
    );

    Ok(Json(route))
}
