use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::CurrentUser;
use crate::endpoints::parse_positive_page;
use crate::error::{Error, ErrorDetails};
use crate::gateway_util::AppState;
use crate::listing::{listing_unavailable, total_pages, Agency, AgencyFilter};

/// Agencies are not quota-gated, but are paged the same way as contacts.
pub const AGENCY_PAGE_SIZE: u64 = 50;

#[derive(Debug, Default, Deserialize)]
pub struct AgenciesQuery {
    pub page: Option<String>,
    pub search: Option<String>,
    pub state: Option<String>,
    #[serde(rename = "type")]
    pub agency_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgenciesPage {
    pub agencies: Vec<Agency>,
    pub page: u64,
    pub total: u64,
    pub total_pages: u64,
}

/// `GET /agencies`
pub async fn list_agencies_handler(
    State(app_state): AppState,
    current_user: CurrentUser,
    Query(params): Query<AgenciesQuery>,
) -> Result<Json<AgenciesPage>, Error> {
    if current_user.user_id().is_none() {
        return Err(Error::new(ErrorDetails::Unauthenticated));
    }

    let page = parse_positive_page(params.page.as_deref())?;
    let filter = AgencyFilter::new(params.search, params.state, params.agency_type);

    let (agencies, total) = tokio::try_join!(
        app_state
            .listing
            .fetch_agencies(&filter, page, AGENCY_PAGE_SIZE),
        app_state.listing.count_agencies(&filter),
    )
    .map_err(listing_unavailable)?;

    Ok(Json(AgenciesPage {
        agencies,
        page,
        total,
        total_pages: total_pages(total, AGENCY_PAGE_SIZE),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    use crate::testing::{
        get_unit_test_app_state_data, test_user, CountingQuotaStore, RecordingListingService,
    };

    fn query(search: Option<&str>, state: Option<&str>) -> Query<AgenciesQuery> {
        Query(AgenciesQuery {
            search: search.map(str::to_string),
            state: state.map(str::to_string),
            ..AgenciesQuery::default()
        })
    }

    #[tokio::test]
    async fn test_list_agencies_does_not_charge_quota() {
        let state = get_unit_test_app_state_data(
            Arc::new(CountingQuotaStore::default()),
            Arc::new(RecordingListingService::new(10)),
        );

        let Json(page) = list_agencies_handler(
            State(state.clone()),
            CurrentUser(Some(test_user())),
            query(None, None),
        )
        .await
        .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.agencies[0].name, "Austin Public Works");

        let Json(page) = list_agencies_handler(
            State(state.clone()),
            CurrentUser(Some(test_user())),
            query(None, Some("IL")),
        )
        .await
        .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.agencies[0].state_code, "IL");

        let status = state.quota.check_limit(Some(&test_user())).await.unwrap();
        assert_eq!(status.viewed_today, 0);
    }

    #[tokio::test]
    async fn test_list_agencies_requires_user() {
        let state = get_unit_test_app_state_data(
            Arc::new(CountingQuotaStore::default()),
            Arc::new(RecordingListingService::new(1)),
        );
        let err = list_agencies_handler(State(state), CurrentUser(None), query(None, None))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_list_agencies_listing_down() {
        let state = get_unit_test_app_state_data(
            Arc::new(CountingQuotaStore::default()),
            Arc::new(RecordingListingService::failing()),
        );
        let err = list_agencies_handler(
            State(state),
            CurrentUser(Some(test_user())),
            query(Some("cook"), None),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
