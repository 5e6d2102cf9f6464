use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::access_gate::AccessOutcome;
use crate::auth::CurrentUser;
use crate::endpoints::parse_page;
use crate::error::{Error, ErrorDetails};
use crate::gateway_util::AppState;
use crate::listing::ContactFilter;
use crate::quota::QuotaStatus;

#[derive(Debug, Default, Deserialize)]
pub struct ContactsQuery {
    pub page: Option<String>,
    pub search: Option<String>,
    pub state: Option<String>,
    pub department: Option<String>,
}

/// `GET /contacts`: the quota-gated contact listing.
#[instrument(skip_all, fields(page = params.page.as_deref()))]
pub async fn list_contacts_handler(
    State(app_state): AppState,
    current_user: CurrentUser,
    Query(params): Query<ContactsQuery>,
) -> Result<AccessOutcome, Error> {
    let page = parse_page(params.page.as_deref())?;
    let filter = ContactFilter::new(params.search, params.state, params.department);
    app_state
        .access_gate
        .evaluate(current_user.user_id(), page, &filter)
        .await
}

/// `GET /contacts/limit`: today's usage without charging anything.
pub async fn contact_limit_handler(
    State(app_state): AppState,
    current_user: CurrentUser,
) -> Result<Json<QuotaStatus>, Error> {
    let status = app_state.quota.check_limit(current_user.user_id()).await?;
    Ok(Json(status))
}

/// `POST /api/contacts/increment-view`: charge one view credit for a rendered page.
///
/// `GET /contacts` already charges the page it serves. Only clients that render contact
/// pages from another source call this; calling it after `/contacts` charges twice.
pub async fn increment_view_handler(
    State(app_state): AppState,
    current_user: CurrentUser,
) -> Response {
    match app_state.quota.record_view(current_user.user_id()).await {
        Ok(_) => Json(json!({ "success": true })).into_response(),
        Err(e) if matches!(e.get_details(), ErrorDetails::Unauthorized { .. }) => {
            e.into_response()
        }
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Failed to increment view" })),
        )
            .into_response(),
    }
}
