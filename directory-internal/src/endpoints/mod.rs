use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::auth::attach_current_user;
use crate::error::{Error, ErrorDetails};
use crate::gateway_util::AppStateData;
use crate::observability::RouterExt;

pub mod agencies;
pub mod contacts;
pub mod fallback;
pub mod stats;
pub mod status;

/// Parse the `page` query parameter. Missing or empty means page 1; the sign is checked
/// by the caller.
pub fn parse_page(raw: Option<&str>) -> Result<i64, Error> {
    match raw.map(str::trim) {
        None | Some("") => Ok(1),
        Some(raw) => raw.parse::<i64>().map_err(|_| {
            Error::new(ErrorDetails::InvalidRequest {
                message: format!("Invalid page number `{raw}`"),
            })
        }),
    }
}

pub fn parse_positive_page(raw: Option<&str>) -> Result<u64, Error> {
    let page = parse_page(raw)?;
    u64::try_from(page)
        .ok()
        .filter(|p| *p >= 1)
        .ok_or_else(|| {
            Error::new(ErrorDetails::InvalidRequest {
                message: format!("Page must be a positive integer, got {page}"),
            })
        })
}

/// All gateway routes. Directory routes see the `CurrentUser` resolved from request
/// headers; operational routes do not.
pub fn build_router(app_state: AppStateData, metrics_handle: PrometheusHandle) -> Router {
    let directory_routes = Router::new()
        .route("/contacts", get(contacts::list_contacts_handler))
        .route("/contacts/limit", get(contacts::contact_limit_handler))
        .route(
            "/api/contacts/increment-view",
            post(contacts::increment_view_handler),
        )
        .route("/agencies", get(agencies::list_agencies_handler))
        .route("/api/stats", get(stats::stats_handler))
        .layer(axum::middleware::from_fn_with_state(
            app_state.authentication_info.clone(),
            attach_current_user,
        ));

    let operational_routes = Router::new()
        .route("/status", get(status::status_handler))
        .route("/health", get(status::health_handler))
        .route(
            "/metrics",
            get(move || std::future::ready(metrics_handle.render())),
        );

    Router::new()
        .merge(directory_routes)
        .merge(operational_routes)
        .fallback(fallback::handle_404)
        .with_request_tracing()
        .with_state(app_state)
}
